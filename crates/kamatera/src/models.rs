//! Kamatera API request and response models.

use serde::{Deserialize, Serialize};

/// Power state reported for a running server.
pub const POWER_ON: &str = "on";

/// Request body for `POST /service/server/info`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfoRequest<'a> {
    /// Server name; nodes are named after their server.
    pub name: &'a str,
}

/// Server info record returned by `POST /service/server/info`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    /// Power state, `"on"` when running.
    pub power: String,
    /// Server name as reported by the API.
    #[serde(default)]
    pub name: Option<String>,
}

impl ServerInfo {
    /// Whether the server is powered on.
    #[must_use]
    pub fn is_powered_on(&self) -> bool {
        self.power == POWER_ON
    }
}
