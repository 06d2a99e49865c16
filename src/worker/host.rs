use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use sysinfo::{Disks, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tokio::time::sleep;

/// Host utilisation, all values in percent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HostMetrics {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
}

/// Source of host utilisation samples
#[async_trait]
pub trait HostSampler: Send {
    async fn sample(&mut self) -> HostMetrics;
}

/// Reads CPU, memory and root disk usage of the local machine
pub struct SystemStatsService {
    system: System,
}

impl SystemStatsService {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self { system }
    }

    /// Average usage across all cores
    fn cpu_usage(&self) -> f64 {
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return 0.0;
        }
        cpus.iter().map(|cpu| cpu.cpu_usage() as f64).sum::<f64>() / cpus.len() as f64
    }

    fn memory_usage(&self) -> f64 {
        let total = self.system.total_memory();
        if total == 0 {
            return 0.0;
        }
        self.system.used_memory() as f64 / total as f64 * 100.0
    }

    /// Usage of the disk mounted at `/`, or of the largest disk when there is
    /// no root mount
    fn disk_usage() -> f64 {
        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"))
            .or_else(|| disks.list().iter().max_by_key(|disk| disk.total_space()));

        match disk {
            Some(disk) if disk.total_space() > 0 => {
                let used = disk.total_space().saturating_sub(disk.available_space());
                used as f64 / disk.total_space() as f64 * 100.0
            }
            _ => 0.0,
        }
    }
}

impl Default for SystemStatsService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostSampler for SystemStatsService {
    async fn sample(&mut self) -> HostMetrics {
        // CPU usage is a delta between two refreshes
        self.system.refresh_cpu();
        sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
        self.system.refresh_cpu();
        self.system.refresh_memory();

        HostMetrics {
            cpu: self.cpu_usage(),
            memory: self.memory_usage(),
            disk: Self::disk_usage(),
        }
    }
}
