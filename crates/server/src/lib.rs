pub mod config;
pub mod error;
pub mod frame_message;
pub mod health;
pub mod registry;
pub mod server;
pub mod session;
pub mod single_frame;
