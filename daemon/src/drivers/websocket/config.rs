use crate::drivers::UniDriverConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WsDriverConfig {
    #[serde(flatten)]
    pub uni_config: UniDriverConfig,
    /// allowed CORS origins, empty means any
    pub allowed_origins: Vec<String>,
}
