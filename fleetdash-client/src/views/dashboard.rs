use std::fmt;

use fleetdash_proto::ServerInformation;
use futures_util::future::join_all;

use super::Card;
use crate::api::{ApiClient, ApiError};

#[derive(Debug, Clone, PartialEq)]
pub struct ServerStatus {
    pub info: ServerInformation,
    pub online: bool,
}

/// Server list joined with one health probe per server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetSummary {
    pub servers: Vec<ServerStatus>,
}

impl FleetSummary {
    pub async fn fetch(api: &ApiClient) -> Result<Self, ApiError> {
        let servers = api.list_servers().await?;
        let checks = servers.into_iter().map(|info| async move {
            let online = api.server_health(&info.id).await;
            ServerStatus { info, online }
        });

        Ok(Self {
            servers: join_all(checks).await,
        })
    }

    pub fn online_count(&self) -> usize {
        self.servers.iter().filter(|s| s.online).count()
    }

    /// Share of online servers, rounded to a whole percent. 0 for an empty
    /// fleet.
    pub fn uptime_percent(&self) -> u32 {
        if self.servers.is_empty() {
            return 0;
        }
        (self.online_count() as f64 / self.servers.len() as f64 * 100.0).round() as u32
    }
}

impl fmt::Display for FleetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uptime = Card::new("Uptime", format!("{}%", self.uptime_percent())).line(format!(
            "{}/{} servers online",
            self.online_count(),
            self.servers.len()
        ));
        write!(f, "{uptime}")?;
        writeln!(f, "{}", "-".repeat(40))?;

        for status in &self.servers {
            let card = Card::new(&status.info.hostname, &status.info.ip_address)
                .line(format!("UUID: {}", status.info.id))
                .line(if status.online { "online" } else { "offline" });
            write!(f, "{card}")?;
        }
        Ok(())
    }
}
