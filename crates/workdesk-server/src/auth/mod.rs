//! Authentication for the Workdesk server

pub mod jwt;
pub mod middleware;
pub mod migrations;
pub mod routes;
pub mod service;
