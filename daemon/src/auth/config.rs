use crate::auth::secret::generate_secret_string;
use log::warn;
use serde::{Deserialize, Serialize};

const FALLBACK_PASSWORD: &str = "change-me";

/// Single shared secret every subscriber must present before it receives
/// any state. An empty password means none was configured yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub password: String,
}

impl AuthConfig {
    /// A fresh random password.
    pub fn generate() -> Self {
        let password = generate_secret_string(16).unwrap_or_else(|_| {
            warn!("could not generate a random password, using the fallback one");
            FALLBACK_PASSWORD.to_string()
        });
        AuthConfig { password }
    }

    pub fn is_configured(&self) -> bool {
        !self.password.is_empty()
    }

    pub fn verify(&self, candidate: &str) -> bool {
        self.is_configured() && self.password == candidate
    }
}
