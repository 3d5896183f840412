use fleetdash_proto::{ServerInformation, msg::RegisterServerReq};

use crate::api::{ApiClient, ApiError};

const COLUMNS: [&str; 3] = ["Hostname", "IP address", "UUID"];

/// Renders the server table, or a "No results." row for an empty fleet.
pub fn render_table(servers: &[ServerInformation]) -> String {
    let rows: Vec<[&str; 3]> = servers
        .iter()
        .map(|s| [s.hostname.as_str(), s.ip_address.as_str(), s.id.as_str()])
        .collect();

    let mut widths = COLUMNS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let format_row = |cells: [&str; 3]| {
        let line = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ");
        format!("{}\n", line.trim_end())
    };

    let mut out = format_row(COLUMNS);
    out.push_str(&format!(
        "{}\n",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-")
    ));
    if rows.is_empty() {
        out.push_str("No results.\n");
    }
    for row in rows {
        out.push_str(&format_row(row));
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("invalid SSH port {0:?}")]
    InvalidPort(String),
}

/// The registration dialog's fields as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterForm {
    pub hostname: String,
    pub ip_address: String,
    pub port: String,
}

impl RegisterForm {
    pub fn into_request(self) -> Result<RegisterServerReq, FormError> {
        let hostname = self.hostname.trim();
        let ip_address = self.ip_address.trim();
        if hostname.is_empty() {
            return Err(FormError::Empty("hostname"));
        }
        if ip_address.is_empty() {
            return Err(FormError::Empty("IP address"));
        }
        let port = self
            .port
            .trim()
            .parse()
            .map_err(|_| FormError::InvalidPort(self.port.clone()))?;

        Ok(RegisterServerReq {
            hostname: hostname.to_owned(),
            ip_address: ip_address.to_owned(),
            port,
        })
    }
}

/// Posts the registration and, on success, reloads the list.
pub async fn register_and_refresh(
    api: &ApiClient,
    req: &RegisterServerReq,
) -> Result<Vec<ServerInformation>, ApiError> {
    api.register_server(req).await?;
    api.list_servers().await
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::sample_server;

    #[test]
    fn test_table_layout() {
        let servers = vec![sample_server("1f3a", "web-1"), sample_server("77", "database")];

        assert_eq!(
            render_table(&servers),
            "Hostname | IP address | UUID\n\
             ---------+------------+-----\n\
             web-1    | 10.0.0.5   | 1f3a\n\
             database | 10.0.0.5   | 77\n"
        );
    }

    #[test]
    fn test_empty_table() {
        assert!(render_table(&[]).ends_with("No results.\n"));
    }

    #[test]
    fn test_form_coerces_port() {
        let form = RegisterForm {
            hostname: " web-3 ".to_owned(),
            ip_address: "10.0.0.7".to_owned(),
            port: " 2222".to_owned(),
        };

        assert_eq!(
            form.into_request(),
            Ok(RegisterServerReq {
                hostname: "web-3".to_owned(),
                ip_address: "10.0.0.7".to_owned(),
                port: 2222,
            })
        );
    }

    #[test]
    fn test_form_rejects_bad_input() {
        let form = RegisterForm {
            hostname: "web-3".to_owned(),
            ip_address: "10.0.0.7".to_owned(),
            port: "ssh".to_owned(),
        };
        assert_eq!(
            form.clone().into_request(),
            Err(FormError::InvalidPort("ssh".to_owned()))
        );

        let form = RegisterForm {
            hostname: "  ".to_owned(),
            ..form
        };
        assert_eq!(form.into_request(), Err(FormError::Empty("hostname")));
    }
}
