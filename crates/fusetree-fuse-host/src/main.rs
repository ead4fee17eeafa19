//! FuseTree FUSE Host — mounts a sample tree over FUSE
//!
//! This binary builds the demo node tree and serves it through libfuse
//! (Linux) or macFUSE (macOS).

#[cfg(feature = "fuse")]
mod adapter;
mod demo;

#[cfg(feature = "fuse")]
use adapter::FuseTree;
use anyhow::{Context, Result};
use clap::Parser;
use fusetree_core::{Dispatcher, FsConfig};
use std::fs;
use std::path::PathBuf;
use tracing::info;
#[cfg(not(feature = "fuse"))]
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Args {
    /// Mount point for the filesystem
    mount_point: PathBuf,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Allow other users to access the filesystem
    #[arg(long)]
    allow_other: bool,

    /// Allow root to access the filesystem
    #[arg(long)]
    allow_root: bool,

    /// Auto unmount on process exit
    #[arg(long)]
    auto_unmount: bool,

    /// Log every filesystem operation
    #[arg(short, long)]
    debug: bool,
}

fn load_config(config_path: Option<PathBuf>) -> Result<FsConfig> {
    match config_path {
        Some(path) => {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config = FsConfig::from_json(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        }
        None => {
            // Default configuration
            Ok(FsConfig::default())
        }
    }
}

fn init_logging(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    info!("Starting FuseTree FUSE Host");
    info!("Mount point: {}", args.mount_point.display());

    let config = load_config(args.config)?;
    info!("Configuration loaded: {:?}", config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let dispatcher = Dispatcher::new(demo::build_tree()).with_config(&config);

    #[cfg(feature = "fuse")]
    {
        let filesystem = FuseTree::new(dispatcher, &config, runtime.handle().clone());

        let mut mount_options = vec![
            fuser::MountOption::FSName(config.fsname.clone()),
            fuser::MountOption::Subtype("fusetree".to_string()),
        ];

        if args.allow_other {
            mount_options.push(fuser::MountOption::AllowOther);
        }

        if args.allow_root {
            mount_options.push(fuser::MountOption::AllowRoot);
        }

        if args.auto_unmount {
            mount_options.push(fuser::MountOption::AutoUnmount);
        }

        info!("Mounting filesystem...");
        fuser::mount2(filesystem, &args.mount_point, &mount_options)
            .with_context(|| format!("mounting at {}", args.mount_point.display()))?;
    }

    #[cfg(not(feature = "fuse"))]
    {
        warn!("FUSE support not compiled in. This binary is for testing only.");
        let root = runtime.block_on(dispatcher.getattr("/"))?;
        info!("Demo tree built (root mode {:o})", root.mode());
        info!("To enable FUSE support, compile with: cargo build --features fuse");
    }

    Ok(())
}
