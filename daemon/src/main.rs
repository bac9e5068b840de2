use crate::app::run_app;

mod app;
mod auth;
pub mod config;
mod drivers;
mod management;
mod protocols;
mod storage;
mod utils;

fn init_logger() {
    if std::env::var_os("RUST_LOG").is_none() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    pretty_env_logger::init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();
    run_app().await
}
