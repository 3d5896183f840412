use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterServerReq {
    pub hostname: String,
    pub ip_address: String,
    pub port: u16,
}

/// One reading as the server emits it on `/api/monitor/stream`, both values
/// in percent.
///
/// Clients should not decode stream messages into this type directly: a
/// message with one unusable field still carries a usable reading for the
/// other series, so the client reads the fields one at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorMessage {
    pub cpu: f64,
    pub ram: f64,
}
