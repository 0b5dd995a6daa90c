mod backend;
mod config;
mod device_api;
mod encoding;
mod error;
mod eyescan;
mod health;
mod iio;
mod lane;
mod scan;
mod status;
mod sysfs;
mod sysfs_string;
mod tui;

pub use backend::*;
pub use config::*;
pub use device_api::*;
pub use encoding::*;
pub use error::*;
pub use eyescan::*;
pub use health::*;
pub use iio::*;
pub use lane::*;
pub use scan::*;
pub use status::*;
pub use sysfs::*;
pub use sysfs_string::*;
pub use tui::*;
