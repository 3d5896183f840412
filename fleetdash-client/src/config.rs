use confique::Config;

#[derive(Config, Debug)]
pub struct Conf {
    /// Address of the fleet API server
    #[config(env = "FLEETDASH_SERVER_ADDR", default = "127.0.0.1:8000")]
    pub server_addr: String,

    /// Use https for REST and the push stream
    #[config(env = "FLEETDASH_TLS", default = false)]
    pub tls: bool,

    /// Prefer IPv6 when resolving the server address
    #[config(env = "FLEETDASH_PREFER_IPV6", default = false)]
    pub prefer_ipv6: bool,

    /// Path of the monitor push stream
    #[config(env = "FLEETDASH_STREAM_PATH", default = "/api/monitor/stream")]
    pub stream_path: String,

    /// `Authorization` header value sent on streams opened with credentials
    #[config(env = "FLEETDASH_CREDENTIALS")]
    pub credentials: Option<String>,
}

pub fn load(path: &str) -> anyhow::Result<Conf> {
    Conf::builder()
        .env()
        .file(path)
        .load()
        .map_err(|e| e.into())
}
