use anyhow::Context;
use autotagfs::config::Config;
use autotagfs::fuse;
use autotagfs::tag::FrameLayout;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Mount a music library with ID3 tags synthesized from its directory layout.
#[derive(Parser, Debug)]
#[command(name = "autotagfs", version)]
struct Args {
    /// Library root holding `<artist>/<album>/<title>.<ext>`
    source: Option<PathBuf>,

    /// Where to mount the overlay
    mountpoint: Option<PathBuf>,

    /// Configuration file (default: ./autotagfs.toml when present)
    #[arg(short, long, env = "AUTOTAGFS_CONFIG")]
    config: Option<PathBuf>,

    /// Allow other users to access the mount
    #[arg(long, conflicts_with = "allow_root")]
    allow_other: bool,

    /// Allow root to access the mount
    #[arg(long)]
    allow_root: bool,

    /// Maximum number of cached tags
    #[arg(long)]
    capacity: Option<u64>,

    /// Frame layout of synthesized tags (compact or id3v24)
    #[arg(long)]
    layout: Option<FrameLayout>,

    /// Extensions that receive a synthesized tag, comma separated; `*` for all files
    #[arg(long, value_delimiter = ',')]
    extensions: Option<Vec<String>>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "AUTOTAGFS_LOG_FORMAT")]
    log_format: LogFormat,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,

    /// Unmount a mount left behind at the mountpoint and exit
    ///
    /// `autotagfs --unmount <MOUNTPOINT>` takes the single path given.
    #[arg(long)]
    unmount: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(source) = &self.source {
            config.source = source.display().to_string();
        }
        if let Some(mountpoint) = &self.mountpoint {
            config.fuse.mount_point = mountpoint.display().to_string();
        }
        if self.allow_other {
            config.fuse.allow_other = true;
        }
        if self.allow_root {
            config.fuse.allow_root = true;
        }
        if let Some(capacity) = self.capacity {
            config.cache.max_entries = capacity;
        }
        if let Some(layout) = self.layout {
            config.tag.layout = layout;
        }
        if let Some(extensions) = &self.extensions {
            config.tag.extensions = extensions.clone();
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "autotagfs=debug,info".into());

    match format {
        LogFormat::Text => {
            tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init()
        }
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn shutdown_signal() -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);

    if args.dump_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    if args.unmount {
        let target = match (&args.source, &args.mountpoint) {
            (Some(only), None) => only.clone(),
            _ => PathBuf::from(&config.fuse.mount_point),
        };
        return fuse::unmount(target);
    }

    if config.source.is_empty() {
        anyhow::bail!("No source directory given (argument or `source` in the configuration)");
    }

    tracing::info!(
        source = %config.source,
        mountpoint = %config.fuse.mount_point,
        capacity = config.cache.max_entries,
        "Starting autotagfs"
    );

    let session = fuse::mount(&config)?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create signal runtime")?
        .block_on(shutdown_signal())
        .context("Failed to wait for shutdown signal")?;

    tracing::info!("Shutting down");
    session.join();

    Ok(())
}
