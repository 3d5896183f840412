//! Loopback fixtures shared by the async tests.

use axum::Router;
use fleetdash_proto::{CpuSpec, DeviceInfo, FullSpec, GpuSpec, RamSpec, ServerInformation, StorageSpec};
use tokio::net::TcpListener;

/// Serves `router` on an ephemeral loopback port and returns `host:port`.
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    addr.to_string()
}

/// An address nothing is listening on.
pub async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

pub fn sample_server(id: &str, hostname: &str) -> ServerInformation {
    ServerInformation {
        id: id.to_owned(),
        hostname: hostname.to_owned(),
        ip_address: "10.0.0.5".to_owned(),
        os_type: "linux".to_owned(),
        tags: None,
        auth_profile_id: "default".to_owned(),
        port: 22,
        bastion_server_id: None,
        wol_mac_address: None,
    }
}

pub fn sample_spec() -> FullSpec {
    FullSpec {
        device: DeviceInfo {
            hostname: "DESKTOP".to_owned(),
            os: "Debian GNU/Linux 12".to_owned(),
            kernel_version: "6.1.0-18-amd64".to_owned(),
        },
        cpu: CpuSpec {
            name: "AMD Ryzen 5 5600X".to_owned(),
            base_freq_ghz: 3.7,
            cores: 6,
            threads: 12,
        },
        ram: RamSpec {
            capacity_gb: 31.3,
            speed_mhz: 3200,
        },
        storage: vec![
            StorageSpec {
                model: "/".to_owned(),
                capacity_gb: 256,
                kind: None,
            },
            StorageSpec {
                model: "/data".to_owned(),
                capacity_gb: 512,
                kind: Some("SSD".to_owned()),
            },
        ],
        gpu: GpuSpec {
            name: "NVIDIA GeForce RTX 3060".to_owned(),
            vram_gb: 12.0,
        },
    }
}
