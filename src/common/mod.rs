pub mod codec;
pub mod command_line;
pub mod error;
pub mod resp3;
