pub mod broadcast;
pub mod codec;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
