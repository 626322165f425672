pub mod app_state;
pub mod config;
pub mod feed;
pub mod generate;
pub mod guard;
pub mod server;
