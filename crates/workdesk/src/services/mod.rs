//! Services module - business logic layer
//!
//! Each service is a stateless handle over a `SqlitePool`. Ownership and
//! visibility checks happen here, before any mutation.

pub mod calendar_service;
pub mod document_service;
pub mod file_service;
pub mod folder_service;
pub mod message_service;
pub mod notification_service;
pub mod permission_service;
pub mod role_service;
pub mod share_service;
pub mod team_service;
pub mod user_service;

pub use calendar_service::CalendarService;
pub use document_service::DocumentService;
pub use file_service::FileService;
pub use folder_service::{build_tree, FolderService};
pub use message_service::MessageService;
pub use notification_service::NotificationService;
pub use permission_service::PermissionService;
pub use role_service::RoleService;
pub use share_service::ShareService;
pub use team_service::TeamService;
pub use user_service::UserService;
