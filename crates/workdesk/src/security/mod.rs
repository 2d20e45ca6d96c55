//! Security module - access control, credentials and input validation

pub mod access;
pub mod password;
pub mod validator;

pub use self::access::*;
pub use self::password::*;
pub use self::validator::*;
