use serde::{Deserialize, Serialize};

pub mod msg;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInformation {
    pub id: String,
    pub hostname: String,
    pub ip_address: String,
    pub os_type: String,
    pub tags: Option<String>,
    pub auth_profile_id: String,
    pub port: u16,
    pub bastion_server_id: Option<String>,
    pub wol_mac_address: Option<String>,
}

/// Hardware summary served by `/api/v1/servers/{id}/specs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullSpec {
    pub device: DeviceInfo,
    pub cpu: CpuSpec,
    pub ram: RamSpec,
    pub storage: Vec<StorageSpec>,
    pub gpu: GpuSpec,
}

impl FullSpec {
    pub fn storage_capacity_gb(&self) -> u64 {
        self.storage.iter().map(|disk| disk.capacity_gb).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub hostname: String,
    pub os: String,
    pub kernel_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuSpec {
    pub name: String,
    pub base_freq_ghz: f64,
    pub cores: u32,
    pub threads: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RamSpec {
    pub capacity_gb: f64,
    pub speed_mhz: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSpec {
    pub model: String,
    pub capacity_gb: u64,
    // older agents don't report the medium
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSpec {
    pub name: String,
    pub vram_gb: f64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_server_information_nullable_fields() {
        let json = r#"{
            "id": "5f0c",
            "hostname": "web-1",
            "ip_address": "10.0.0.5",
            "os_type": "linux",
            "tags": null,
            "auth_profile_id": "default",
            "port": 22,
            "bastion_server_id": null,
            "wol_mac_address": "aa:bb:cc:dd:ee:ff"
        }"#;

        let info: ServerInformation = serde_json::from_str(json).expect("valid server json");
        assert_eq!(info.hostname, "web-1");
        assert_eq!(info.port, 22);
        assert!(info.tags.is_none());
        assert_eq!(info.wol_mac_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_full_spec_storage_total() {
        let json = r#"{
            "device": {"hostname": "DESKTOP", "os": "Linux 6.1", "kernel_version": "6.1.0"},
            "cpu": {"name": "Ryzen 5", "base_freq_ghz": 3.6, "cores": 6, "threads": 12},
            "ram": {"capacity_gb": 31.3, "speed_mhz": 3200},
            "storage": [
                {"model": "/", "capacity_gb": 256},
                {"model": "/data", "capacity_gb": 512, "type": "SSD"}
            ],
            "gpu": {"name": "RTX 3060", "vram_gb": 12.0}
        }"#;

        let spec: FullSpec = serde_json::from_str(json).expect("valid spec json");
        assert_eq!(spec.storage_capacity_gb(), 768);
        assert_eq!(spec.storage[0].kind, None);
        assert_eq!(spec.storage[1].kind.as_deref(), Some("SSD"));
    }
}
