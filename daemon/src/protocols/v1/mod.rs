mod commands;
mod protocol;

pub use commands::*;
pub use protocol::parse_action;
