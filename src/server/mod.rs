pub mod cli;
pub mod clock;
pub mod command;
pub mod config;
pub mod connection;
pub mod connection_manager;
pub mod entry;
pub mod expiry;
pub mod kv_store;
pub mod server;
