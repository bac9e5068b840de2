mod config;
mod secret;

pub use config::AuthConfig;
