use anyhow::{Context, Result};
use clap::Parser;
use jesd_status::*;
use log::{info, warn, LevelFilter};
use simplelog::{ConfigBuilder, WriteLogger};
use std::{fs::File, path::PathBuf, time::Duration};

/// JESD204 link status monitor
#[derive(Parser, Debug)]
#[command(name = "jesd-status", version, about, long_about = None)]
struct Cli {
    /// Filesystem root prefix in front of /sys/bus/platform/drivers
    #[arg(short, long, value_name = "PATH")]
    path: Option<String>,

    /// Device-management API context URI (e.g. ip:192.168.2.1)
    #[arg(short, long)]
    uri: Option<String>,

    /// Draw without window borders
    #[arg(short, long)]
    simple: bool,

    /// Use j/k to move between devices
    #[arg(short, long)]
    vim: bool,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log file, overrides the configuration
    #[arg(long, value_name = "FILE")]
    log_file: Option<String>,

    /// Log level, overrides the configuration
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut conf = Conf::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(path) = cli.path {
        conf.source.root = path;
    }
    if let Some(uri) = cli.uri {
        conf.source.uri = uri;
    }
    conf.display.simple |= cli.simple;
    conf.display.vim_keys |= cli.vim;
    if let Some(file) = cli.log_file {
        conf.log.file = file;
    }

    if let Some(level) = cli.log_level {
        conf.log.level = level;
    }

    let level = LevelFilter::from(conf.log.level);
    let log_file = File::create(&conf.log.file)
        .with_context(|| format!("creating log file {}", conf.log.file))?;
    WriteLogger::init(level, ConfigBuilder::new().build(), log_file)?;

    let jesd = open_backend(&conf)?;
    let devices = match jesd.devices() {
        Ok(devices) => devices,
        Err(e) => {
            eprintln!("{e}");
            if let Some(api) = jesd.api() {
                eprintln!("device API reports {} transceivers", api.xcvr_devices().len());
            } else {
                eprintln!("searched {}", jesd.sysfs().basedir().display());
            }
            std::process::exit(libc::EXIT_FAILURE);
        }
    };
    info!("found {} devices: {devices:?}", devices.len());
    let xcvr_count = jesd.xcvr_devices().len();

    let mut monitor = Monitor::new(
        devices,
        xcvr_count,
        Duration::from_millis(conf.poll.interval_ms),
        conf.display.clone(),
    );

    let mut terminal = ratatui::init();
    let result = monitor.run(jesd, &mut terminal);
    ratatui::restore();
    result
}

/// Filesystem backend always, plus the device-API backend when a URI is
/// configured or the device API is requested.
fn open_backend(conf: &Conf) -> Result<Jesd> {
    let sysfs = SysfsBackend::new(&conf.source.root);
    if !conf.wants_device_api() {
        return Ok(Jesd::new(sysfs));
    }

    let uri = Some(conf.source.uri.as_str()).filter(|u| !u.is_empty());
    match IioContext::new(uri) {
        Ok(ctx) => Ok(Jesd::with_api(sysfs, ApiBackend::new(Box::new(ctx)))),
        Err(e @ JesdError::Unsupported(_)) => {
            warn!("{e}, falling back to {}", sysfs.basedir().display());
            eprintln!("{e}, using the filesystem backend");
            Ok(Jesd::new(sysfs))
        }
        Err(e) => Err(e).with_context(|| {
            format!("creating device API context {}", uri.unwrap_or("(local)"))
        }),
    }
}
