//! CLI Commands

mod auth;
mod demo;
mod init;

pub use auth::AuthCommand;
pub use demo::DemoCommand;
pub use init::InitCommand;
