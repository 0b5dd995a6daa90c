use clap::ValueEnum;
use confique::Config;
use serde::Deserialize;
use std::path::Path;

#[derive(Config, Debug, Clone)]
pub struct Conf {
    #[config(nested)]
    pub source: SourceSettings,
    #[config(nested)]
    pub poll: PollSettings,
    #[config(nested)]
    pub display: DisplaySettings,
    #[config(nested)]
    pub log: LogSettings,
}

#[derive(Config, Debug, Clone)]
pub struct SourceSettings {
    /// Prefix put in front of `/sys/bus/platform/drivers`
    #[config(default = "")]
    pub root: String,
    /// Device-management API URI; empty opens the local context
    #[config(default = "")]
    pub uri: String,
    #[config(default = false)]
    pub use_device_api: bool,
}

#[derive(Config, Debug, Clone)]
pub struct PollSettings {
    #[config(default = 250)]
    pub interval_ms: u64,
}

#[derive(Config, Debug, Clone)]
pub struct DisplaySettings {
    /// Draw without window borders
    #[config(default = false)]
    pub simple: bool,
    /// j/k instead of a/d to move between devices
    #[config(default = false)]
    pub vim_keys: bool,
}

#[derive(Config, Debug, Clone)]
pub struct LogSettings {
    #[config(default = "jesd_status.log")]
    pub file: String,
    #[config(default = "info")]
    pub level: LogLevel,
}

#[derive(Deserialize, ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => Self::Off,
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}

impl Conf {
    /// Loads `file` when given, layered over the defaults.
    pub fn load(file: Option<&Path>) -> Result<Self, confique::Error> {
        let mut builder = Conf::builder();
        if let Some(file) = file {
            builder = builder.file(file);
        }
        builder.load()
    }

    pub fn wants_device_api(&self) -> bool {
        self.source.use_device_api || !self.source.uri.is_empty()
    }
}
