pub mod cli_client;
pub mod common;
pub mod server;
pub mod tui_client;
