pub mod auth_cmd;
pub mod backup;
pub mod common;
pub mod history;
pub mod resolve;
pub mod show;
pub mod write;
