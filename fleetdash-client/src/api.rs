use bytes::Bytes;
use fleetdash_proto::{FullSpec, ServerInformation, msg::RegisterServerReq};
use http::{Method, header};
use log::{debug, info};
use serde::de::DeserializeOwned;

use crate::http_util;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("failed to reach server: {0}")]
    Transport(String),
    #[error("server responded with [{status}] {body}")]
    Status { status: u16, body: String },
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("invalid server id {0:?}")]
    InvalidId(String),
}

/// Client for the fleet REST API under `/api/v1`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    prefer_ipv6: bool,
}

impl ApiClient {
    pub fn new(server_addr: &str, tls: bool, prefer_ipv6: bool) -> Self {
        Self {
            base_url: format!("{}://{server_addr}", if tls { "https" } else { "http" }),
            prefer_ipv6,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn list_servers(&self) -> Result<Vec<ServerInformation>, ApiError> {
        self.get_json("/api/v1/servers").await
    }

    /// A 2xx answer means online; anything else, including a failed request,
    /// means offline.
    pub async fn server_health(&self, id: &str) -> bool {
        let Ok(path) = server_path(id, "health") else {
            return false;
        };
        match self.send(Method::GET, &path, None).await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("health check for {id} failed: {e}");
                false
            }
        }
    }

    pub async fn server_specs(&self, id: &str) -> Result<FullSpec, ApiError> {
        self.get_json(&server_path(id, "specs")?).await
    }

    pub async fn register_server(&self, req: &RegisterServerReq) -> Result<(), ApiError> {
        let body = serde_json::to_vec(req).map_err(|e| ApiError::Decode(e.to_string()))?;
        let resp = self
            .send(Method::POST, "/api/v1/servers", Some(Bytes::from(body)))
            .await?;
        check_status(&resp)?;

        info!("registered server {} ({})", req.hostname, req.ip_address);
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self.send(Method::GET, path, None).await?;
        check_status(&resp)?;

        serde_json::from_slice(resp.body()).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        json_body: Option<Bytes>,
    ) -> Result<http::Response<Bytes>, ApiError> {
        let res: anyhow::Result<http::Response<Bytes>> = async {
            let builder = http_util::basic_request_builder(&self.url(path), method)?
                .header(header::ACCEPT, "application/json");
            let req = match json_body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::CONTENT_LENGTH, body.len())
                    .body(body)?,
                None => builder.body(Bytes::new())?,
            };

            http_util::send_http_request(req, self.prefer_ipv6).await
        }
        .await;

        res.map_err(|e| ApiError::Transport(format!("{e:#}")))
    }
}

fn check_status(resp: &http::Response<Bytes>) -> Result<(), ApiError> {
    if resp.status().is_success() {
        return Ok(());
    }
    Err(ApiError::Status {
        status: resp.status().as_u16(),
        body: String::from_utf8_lossy(resp.body()).into_owned(),
    })
}

fn server_path(id: &str, resource: &str) -> Result<String, ApiError> {
    let valid = !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if !valid {
        return Err(ApiError::InvalidId(id.to_owned()));
    }
    Ok(format!("/api/v1/servers/{id}/{resource}"))
}
