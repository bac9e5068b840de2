use log::{debug, error, info, warn};
use tokio::select;
use tokio::task::JoinSet;

use super::driver::Driver;
use std::sync::Arc;
use tokio::sync::Notify;

pub struct GracefulShutdown {
    drivers: Vec<Arc<dyn Driver>>,
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl GracefulShutdown {
    pub fn new() -> Self {
        Self { drivers: vec![] }
    }
}

impl GracefulShutdown {
    pub fn add_driver(&mut self, driver: impl Driver + 'static) {
        self.drivers.push(Arc::new(driver));
    }

    /// Runs the drivers until ctrl+c or until one of them gives up, then
    /// notifies `stop_notify` and waits for the rest.
    pub async fn watch(mut self, stop_notify: Arc<Notify>) {
        let mut join_set = JoinSet::new();
        for driver in self.drivers.drain(..) {
            join_set.spawn(async move {
                let driver_type = driver.get_driver_type();
                driver.run().await;
                driver_type
            });
        }

        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("ctrl+c received, shutting down"),
                Err(err) => {
                    error!("graceful shutdown can't install ctrl+c signal handler: {}", err);
                    std::future::pending::<()>().await;
                }
            }
        };

        debug!("graceful shutdown start watching");
        select! {
            _ = ctrl_c => {}
            stopped = join_set.join_next() => match stopped {
                Some(Ok(driver_type)) => warn!("{:?} driver stopped, shutting down", driver_type),
                Some(Err(err)) => error!("driver task failed: {}", err),
                None => warn!("no driver enabled, shutting down"),
            }
        }

        stop_notify.notify_waiters();
        while let Some(stopped) = join_set.join_next().await {
            if let Err(err) = stopped {
                error!("driver task failed: {}", err);
            }
        }
    }
}
