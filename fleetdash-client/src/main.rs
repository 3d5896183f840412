#![forbid(unsafe_code)]

use std::{io::Write, time::Duration};

use argh::FromArgs;
use http::{HeaderName, HeaderValue};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

use crate::{
    api::ApiClient,
    routes::View,
    stream::{SseConnector, SubscribeOptions},
    views::{
        dashboard::FleetSummary,
        monitor::MonitorView,
        server_list::{self, RegisterForm},
    },
};

mod api;
mod config;
mod http_util;
mod rolling;
mod routes;
mod stream;
#[cfg(test)]
mod testing;
mod views;

#[derive(FromArgs, Debug)]
#[argh(description = "A terminal dashboard for a small server fleet.")]
struct Cli {
    #[argh(
        option,
        default = "\"fleetdash.toml\".to_string()",
        description = "configuration file"
    )]
    pub config: String,
    #[argh(
        option,
        short = 'a',
        description = "server address to connect to (overrides the config file)"
    )]
    pub server_addr: Option<String>,
    #[argh(
        switch,
        short = 't',
        description = "use TLS to connect to server (https instead of http)"
    )]
    pub tls: bool,
    #[argh(
        switch,
        short = '6',
        description = "prefer IPv6 when resolving server address"
    )]
    pub prefer_ipv6: bool,
    #[argh(subcommand)]
    pub command: Command,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Command {
    Dashboard(DashboardCmd),
    List(ListCmd),
    Register(RegisterCmd),
    Info(InfoCmd),
    Monitor(MonitorCmd),
    Routes(RoutesCmd),
    Open(OpenCmd),
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "dashboard", description = "fleet uptime and server cards")]
struct DashboardCmd {}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "list", description = "list registered servers")]
struct ListCmd {}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "register", description = "register a new server")]
struct RegisterCmd {
    #[argh(positional, description = "hostname of the server")]
    pub hostname: String,
    #[argh(positional, description = "IP address of the server")]
    pub ip_address: String,
    #[argh(positional, description = "SSH port of the server")]
    pub port: String,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "info", description = "device information of one server")]
struct InfoCmd {
    #[argh(positional, description = "server id")]
    pub server_id: String,
}

#[derive(FromArgs, Debug, Default)]
#[argh(subcommand, name = "monitor", description = "live CPU and RAM charts")]
struct MonitorCmd {
    #[argh(
        option,
        description = "reconnect after this many seconds when the stream fails"
    )]
    pub retry_interval: Option<u64>,
    #[argh(
        switch,
        description = "send the configured credentials with the stream request"
    )]
    pub with_credentials: bool,
    #[argh(
        option,
        from_str_fn(parse_header),
        description = "extra request header for the stream, as NAME:VALUE (repeatable)"
    )]
    pub header: Vec<(HeaderName, HeaderValue)>,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "routes", description = "print the view table")]
struct RoutesCmd {}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "open", description = "open the view at a path, e.g. /servers/<id>")]
struct OpenCmd {
    #[argh(positional, description = "view path")]
    pub path: String,
}

/// Everything a view needs after config and flags are merged.
struct Context {
    api: ApiClient,
    prefer_ipv6: bool,
    stream_path: String,
    credentials: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .env()
        .init()?;

    let cli: Cli = argh::from_env();
    log::debug!("Cli args: {cli:#?}");

    let conf = config::load(&cli.config)?;
    log::debug!("Config: {conf:#?}");

    let server_addr = cli.server_addr.unwrap_or(conf.server_addr);
    let prefer_ipv6 = cli.prefer_ipv6 || conf.prefer_ipv6;
    let ctx = Context {
        api: ApiClient::new(&server_addr, cli.tls || conf.tls, prefer_ipv6),
        prefer_ipv6,
        stream_path: conf.stream_path,
        credentials: conf.credentials,
    };

    match cli.command {
        Command::Dashboard(_) => show(&ctx, View::Dashboard, "/", None).await,
        Command::List(_) => show(&ctx, View::ServerList, "/list", None).await,
        Command::Register(cmd) => register(&ctx, cmd).await,
        Command::Info(cmd) => {
            let path = format!("/servers/{}", cmd.server_id);
            show(&ctx, View::DeviceInfo, &path, Some(cmd.server_id.as_str())).await
        }
        Command::Monitor(cmd) => monitor(&ctx, cmd).await,
        Command::Routes(_) => {
            print_routes();
            Ok(())
        }
        Command::Open(cmd) => match routes::resolve(&cmd.path) {
            Some(resolved) => {
                let server_id = resolved.param("serverId");
                show(&ctx, resolved.route.view, &cmd.path, server_id).await
            }
            None => anyhow::bail!("no view at {:?}; try `fleetdash routes`", cmd.path),
        },
    }
}

async fn show(
    ctx: &Context,
    view: View,
    path: &str,
    server_id: Option<&str>,
) -> anyhow::Result<()> {
    let body = match view {
        View::Monitor => return monitor(ctx, MonitorCmd::default()).await,
        View::Dashboard => FleetSummary::fetch(&ctx.api).await.map(|s| s.to_string()),
        View::ServerList => ctx
            .api
            .list_servers()
            .await
            .map(|servers| server_list::render_table(&servers)),
        View::DeviceInfo => {
            let Some(id) = server_id else {
                anyhow::bail!("device info needs a server id");
            };
            ctx.api
                .server_specs(id)
                .await
                .map(|spec| views::device_info::render(&spec))
        }
    };

    println!("{}\n", routes::title_for(path));
    match body {
        Ok(text) => print!("{text}"),
        Err(e) => println!("{}", views::error_text(&e)),
    }
    Ok(())
}

async fn register(ctx: &Context, cmd: RegisterCmd) -> anyhow::Result<()> {
    println!("{}\n", routes::title_for("/list"));

    let form = RegisterForm {
        hostname: cmd.hostname,
        ip_address: cmd.ip_address,
        port: cmd.port,
    };
    let req = match form.into_request() {
        Ok(req) => req,
        Err(e) => {
            println!("{}", views::error_text(&e));
            return Ok(());
        }
    };

    match server_list::register_and_refresh(&ctx.api, &req).await {
        Ok(servers) => print!("{}", server_list::render_table(&servers)),
        Err(e) => println!("{}", views::error_text(&e)),
    }
    Ok(())
}

async fn monitor(ctx: &Context, cmd: MonitorCmd) -> anyhow::Result<()> {
    println!("{}\n", routes::title_for("/monitor"));

    let credentials = ctx
        .credentials
        .as_deref()
        .map(HeaderValue::from_str)
        .transpose()?;
    let connector = SseConnector::new(ctx.prefer_ipv6).with_credentials(credentials);
    let options = cmd.header.into_iter().fold(
        SubscribeOptions::default()
            .with_credentials(cmd.with_credentials)
            .on_open(|| log::info!("monitor stream open"))
            .on_error(|e| log::warn!("monitor stream error: {e}")),
        |options, (name, value)| options.header(name, value),
    );

    let mut view = MonitorView::mount(connector, ctx.api.url(&ctx.stream_path), options);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => shutdown.cancel(),
                Err(e) => log::warn!("failed to install Ctrl-C handler: {e}"),
            }
        }
    });

    let mut out = std::io::stdout();
    let retry = cmd.retry_interval.map(Duration::from_secs);
    if let Err(e) = view.run(&mut out, retry, shutdown).await {
        writeln!(out, "{}", views::error_text(&e))?;
    }
    Ok(())
}

fn print_routes() {
    for route in routes::sidebar() {
        println!("{:<10} {}", route.path, route.title);
    }
    for route in routes::ROUTES.iter().filter(|r| !r.show_in_sidebar) {
        println!("{:<10} {} (hidden)", route.path, route.title);
    }
}

fn parse_header(arg: &str) -> Result<(HeaderName, HeaderValue), String> {
    let (name, value) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got {arg:?}"))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|e| format!("invalid header name {name:?}: {e}"))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| format!("invalid header value for {name}: {e}"))?;
    Ok((name, value))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_header() {
        let (name, value) = parse_header("X-Dashboard: fleetdash").unwrap();

        assert_eq!(name, "x-dashboard");
        assert_eq!(value, "fleetdash");
        assert!(parse_header("no-separator").is_err());
        assert!(parse_header("bad name: x").is_err());
    }

    #[test]
    fn test_monitor_flags() {
        let cmd = MonitorCmd::from_args(
            &["monitor"],
            &["--header", "x-a:1", "--header", "x-b:2", "--retry-interval", "5"],
        )
        .unwrap();

        assert_eq!(cmd.retry_interval, Some(5));
        let names: Vec<_> = cmd.header.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["x-a", "x-b"]);
    }
}
