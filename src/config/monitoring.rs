use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Metrics and admin HTTP server
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    #[serde(default = "default_server_enabled")]
    pub server_enabled: bool,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
}
impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            server_enabled: default_server_enabled(),
            server_port: default_server_port(),
        }
    }
}
impl MonitoringConfig {
    /// Validates monitoring configuration
    /// # Errors
    /// Returns `Error::Config` when the server is enabled with an invalid or
    /// privileged port
    pub fn validate(&self) -> Result<()> {
        if self.server_enabled {
            if self.server_port == 0 {
                return Err(Error::Config(config::ConfigError::Message(
                    "server_port cannot be 0 when enabled".into(),
                )));
            }

            // Check privileged ports (requires root)
            if self.server_port < 1024 {
                return Err(Error::Config(config::ConfigError::Message(format!(
                    "server_port {} is a privileged port (requires root)",
                    self.server_port
                ))));
            }
        } else {
            // Warn about unused port configuration
            #[cfg(debug_assertions)]
            if self.server_port != default_server_port() {
                tracing::warn!(
                    "server_port configured to {} but the server is disabled",
                    self.server_port
                );
            }
        }

        Ok(())
    }
}
fn default_server_enabled() -> bool {
    true
}

fn default_server_port() -> u16 {
    8080
}
