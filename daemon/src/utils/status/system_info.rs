use mcpanel_protocol::status::{CpuInfo, HostInfo, MemInfo};
use sysinfo::System;

/// Keeps one `sysinfo::System` alive between samples so CPU usage is measured
/// over the interval since the previous sample.
pub struct HostSampler {
    system: System,
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self { system }
    }

    pub fn sample(&mut self) -> HostInfo {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        HostInfo {
            cpu: self.cpu_info(),
            memory: self.mem_info(),
            uptime: System::uptime(),
            platform: std::env::consts::OS.to_string(),
            hostname: System::host_name().unwrap_or_default(),
        }
    }

    fn cpu_info(&self) -> CpuInfo {
        let cpus = self.system.cpus();
        CpuInfo {
            model: cpus
                .first()
                .map(|cpu| cpu.brand().trim().to_string())
                .filter(|brand| !brand.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            cores: cpus.len() as u32,
            usage: self.system.global_cpu_usage().round().clamp(0.0, 100.0) as u32,
        }
    }

    fn mem_info(&self) -> MemInfo {
        mem_info_from(self.system.total_memory(), self.system.available_memory())
    }
}

fn mem_info_from(total: u64, available: u64) -> MemInfo {
    let free = available.min(total);
    let used = total - free;
    let percent = if total == 0 {
        0
    } else {
        ((used as f64 / total as f64) * 100.0).round() as u32
    };
    MemInfo {
        total,
        used,
        free,
        percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_info_percent() {
        let mem = mem_info_from(1000, 250);
        assert_eq!(mem.used, 750);
        assert_eq!(mem.free, 250);
        assert_eq!(mem.percent, 75);
        assert_eq!(mem_info_from(0, 0).percent, 0);
    }

    #[test]
    fn test_sample_host() {
        let mut sampler = HostSampler::new();
        let host = sampler.sample();
        assert!(!host.platform.is_empty());
        assert!(host.cpu.usage <= 100);
        assert!(host.memory.free <= host.memory.total);
    }
}
