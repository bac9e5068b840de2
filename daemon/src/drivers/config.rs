use super::Drivers;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use super::websocket::WsDriverConfig;

/// The `drivers` section of `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriversConfig {
    pub enabled: Cow<'static, [Drivers]>,
    pub websocket: WsDriverConfig,
}

impl Default for DriversConfig {
    fn default() -> Self {
        Self {
            enabled: Cow::Borrowed(&[Drivers::Websocket]),
            websocket: WsDriverConfig::default(),
        }
    }
}

/// Listen address shared by every network driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UniDriverConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for UniDriverConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
        }
    }
}

impl UniDriverConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
