pub mod config;
pub mod error;
pub mod http;
pub mod inbox;
pub mod link;
pub mod readwise;
pub mod reddit;
pub mod server;
pub mod store;
