use fleetdash_proto::FullSpec;

use super::{Card, section};

pub fn render(spec: &FullSpec) -> String {
    let cpu = Card::new("CPU", &spec.cpu.name)
        .line(format!("{}GHz", spec.cpu.base_freq_ghz))
        .line(format!(
            "{} Cores / {} Threads",
            spec.cpu.cores, spec.cpu.threads
        ));
    let ram = Card::new("RAM", format!("{}GB", spec.ram.capacity_gb))
        .line(format!("{}MHz", spec.ram.speed_mhz));
    let storage = spec.storage.iter().fold(
        Card::new("Storage", format!("{}GB", spec.storage_capacity_gb())),
        |card, disk| match &disk.kind {
            Some(kind) => card.line(format!("{} ({}GB, {kind})", disk.model, disk.capacity_gb)),
            None => card.line(format!("{} ({}GB)", disk.model, disk.capacity_gb)),
        },
    );
    let gpu = Card::new("GPU", &spec.gpu.name).line(format!("{}GB", spec.gpu.vram_gb));

    let mut out = format!("{cpu}{ram}{storage}{gpu}\n{}\n\n", spec.device.hostname);
    out.push_str(&section(
        "Device Information",
        &[
            ("Device Name", spec.device.hostname.clone()),
            ("Processor", spec.cpu.name.clone()),
            ("RAM", format!("{}GB", spec.ram.capacity_gb)),
        ],
    ));
    out.push_str(&section(
        "System Information",
        &[
            ("OS", spec.device.os.clone()),
            ("Kernel Version", spec.device.kernel_version.clone()),
        ],
    ));
    out
}
