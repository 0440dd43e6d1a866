//! Management API served over actix-web

pub mod handlers;
pub mod models;
pub mod server;
