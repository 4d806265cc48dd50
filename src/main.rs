//! IOShelfer CLI - main entry point.

use clap::{Parser, Subcommand};
use ioshelfer::config::IoShelferConfig;
use ioshelfer::scheduler::DeviceSpec;
use ioshelfer::types::DeviceKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ioshelfer", version, about = "I/O sub-health observer and self-healer")]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the observer daemon.
    Server {
        /// Path to a JSON configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Devices to watch, as kind:id:group triples
        /// (e.g. raid:raid-0:storage,disk:sda:storage,network:eth0:frontend).
        #[arg(long)]
        devices: Option<String>,
    },

    /// Run one detection pass over the inventory and print the verdicts.
    Check {
        /// Path to a JSON configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Devices to check, as kind:id:group triples.
        #[arg(long)]
        devices: Option<String>,
    },

    /// Print version information.
    Version,
}

fn load_config(path: &Option<PathBuf>) -> anyhow::Result<IoShelferConfig> {
    match path {
        Some(path) => Ok(IoShelferConfig::from_file(path)?),
        None => Ok(IoShelferConfig::development()),
    }
}

fn parse_devices(spec: &Option<String>) -> anyhow::Result<Vec<DeviceSpec>> {
    let Some(spec) = spec else {
        // A small default inventory for development runs.
        return Ok(vec![
            DeviceSpec {
                id: "raid-0".into(),
                kind: DeviceKind::Raid,
                group: "storage".into(),
            },
            DeviceSpec {
                id: "sda".into(),
                kind: DeviceKind::Disk,
                group: "storage".into(),
            },
            DeviceSpec {
                id: "eth0".into(),
                kind: DeviceKind::Network,
                group: "frontend".into(),
            },
        ]);
    };

    spec.split(',')
        .map(|triple| {
            let parts: Vec<&str> = triple.trim().split(':').collect();
            if parts.len() != 3 {
                anyhow::bail!("expected kind:id:group, got '{}'", triple);
            }
            let kind = match parts[0] {
                "raid" => DeviceKind::Raid,
                "disk" => DeviceKind::Disk,
                "network" => DeviceKind::Network,
                other => anyhow::bail!("unknown device kind '{}'", other),
            };
            Ok(DeviceSpec {
                id: parts[1].to_string(),
                kind,
                group: parts[2].to_string(),
            })
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server { config, devices } => {
            let mut config = load_config(&config)?;
            config.observability.log_level = cli.log_level;
            let devices = parse_devices(&devices)?;
            ioshelfer::run(config, devices).await?;
        }

        Commands::Check { config, devices } => {
            let config = load_config(&config)?;
            let devices = parse_devices(&devices)?;
            check_once(config, devices).await?;
        }

        Commands::Version => {
            println!("ioshelfer v{}", env!("CARGO_PKG_VERSION"));
            println!("I/O sub-health observer and self-healer");
        }
    }

    Ok(())
}

/// Feed the simulated probes once, tick every device, and print verdicts.
async fn check_once(config: IoShelferConfig, devices: Vec<DeviceSpec>) -> anyhow::Result<()> {
    use ioshelfer::adapter::{DiskAdapter, NetworkAdapter, RaidAdapter};
    use ioshelfer::events::EventBus;
    use ioshelfer::history::MemoryHistory;
    use ioshelfer::probe::{ProbeHub, SimulatedProbe};
    use ioshelfer::remediation::LoggingActuator;
    use ioshelfer::scheduler::Pipeline;
    use ioshelfer::shutdown::ShutdownCoordinator;
    use std::sync::Arc;

    let hub = ProbeHub::new();
    let mut raid_ids = Vec::new();
    let mut disk_ids = Vec::new();
    let mut network_ids = Vec::new();
    for device in &devices {
        match device.kind {
            DeviceKind::Raid => {
                hub.register_raid(&device.id);
                raid_ids.push(device.id.clone());
            }
            DeviceKind::Disk => {
                hub.register_disk(&device.id);
                disk_ids.push(device.id.clone());
            }
            DeviceKind::Network => {
                hub.register_network(&device.id);
                network_ids.push(device.id.clone());
            }
        }
    }
    SimulatedProbe::new(hub.clone()).feed_once(&raid_ids, &disk_ids, &network_ids);

    let pipeline = Pipeline::new(
        config,
        Arc::new(MemoryHistory::new()),
        Arc::new(LoggingActuator),
        Arc::new(EventBus::new()),
        ShutdownCoordinator::new(),
    );
    pipeline.register_source(Arc::new(RaidAdapter::new(hub.clone())));
    pipeline.register_source(Arc::new(DiskAdapter::new(hub.clone())));
    pipeline.register_source(Arc::new(NetworkAdapter::new(hub)));

    for device in &devices {
        pipeline.add_device(device.clone());
    }

    for device in &devices {
        match pipeline.tick_device(&device.id).await {
            Ok(health) => {
                println!("{}", serde_json::to_string_pretty(&health)?);
            }
            Err(e) => {
                eprintln!("{}: check failed: {}", device.id, e);
            }
        }
    }

    Ok(())
}
