mod config;
mod connection;
mod driver;
mod hub;

pub use config::WsDriverConfig;
pub use connection::*;
pub use driver::WsDriver;
pub use hub::BroadcastHub;
