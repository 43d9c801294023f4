//! Diagnostics command - displays system and Docker connectivity information

use anyhow::Result;
use sysinfo::System;

use crate::host::bollard_client::BollardHostClient;
use crate::host::HostClient;

/// Run diagnostics and display system information
pub async fn run(socket: Option<&str>) -> Result<()> {
    println!("Sentinel Diagnostics");
    println!("====================\n");

    println!("System Information:");
    println!("-------------------");

    let mut sys = System::new_all();
    sys.refresh_all();

    println!("  OS: {} {}", System::name().unwrap_or_default(), System::os_version().unwrap_or_default());
    println!("  Kernel: {}", System::kernel_version().unwrap_or_default());
    println!("  Hostname: {}", System::host_name().unwrap_or_default());
    println!("  CPUs: {}", sys.cpus().len());
    println!("  Total Memory: {} MB", sys.total_memory() / 1024 / 1024);
    println!("  Used Memory: {} MB", sys.used_memory() / 1024 / 1024);
    println!("  Uptime: {} seconds", System::uptime());

    println!("\nDocker Information:");
    println!("-------------------");

    match BollardHostClient::connect(socket, false) {
        Ok(client) => {
            match client.version().await {
                Ok(version) => {
                    println!("  Version: {}", version.version);
                    println!("  API Version: {}", version.api_version);
                    println!("  OS/Arch: {}/{}", version.os, version.arch);
                }
                Err(e) => println!("  Error getting version: {e}"),
            }

            match client.host_info().await {
                Ok(info) => {
                    println!("  Running containers: {}", info.containers_running);
                    println!("  Stopped containers: {}", info.containers_stopped);
                    println!("  Images: {}", info.images);
                    println!("  Storage driver: {}", info.driver);
                }
                Err(e) => println!("  Error getting info: {e}"),
            }

            match client.disk_usage().await {
                Ok(usage) => {
                    println!(
                        "  Disk usage: images={}MB containers={}MB volumes={}MB",
                        usage.images_size / 1024 / 1024,
                        usage.containers_size / 1024 / 1024,
                        usage.volumes_size / 1024 / 1024
                    );
                }
                Err(e) => println!("  Error getting disk usage: {e}"),
            }
        }
        Err(e) => {
            println!("  Error connecting to Docker: {e}");
            println!("  Make sure Docker is running and accessible.");
        }
    }

    println!("\nDiagnostics complete.");
    Ok(())
}
