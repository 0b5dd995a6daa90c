use crate::{
    lane::lane_attr, status::STATUS_ATTR, DeviceId, Encoding, JesdError, LaneInfo, LinkStatus,
    Result, StatusSource, ENCODER_ATTR,
};
use log::{debug, error, warn};
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Platform driver directory, relative to the filesystem root.
pub const DRIVERS_DIR: &str = "sys/bus/platform/drivers";

pub const JESD_RX_DRIVER: &str = "axi-jesd204-rx";
pub const JESD_TX_DRIVER: &str = "axi-jesd204-tx";
pub const XCVR_DRIVERS: [&str; 2] = ["axi_adxcvr", "axi_adxcvr_drv"];

/// Upper bound on devices collected by one enumeration.
pub const MAX_DEVICES: usize = 8;

/// Backend over the sysfs attribute files of the platform drivers.
#[derive(Clone, Debug)]
pub struct SysfsBackend {
    basedir: PathBuf,
}

impl SysfsBackend {
    /// Backend rooted at `root`, which is `/` on target and a copy of the
    /// sysfs tree elsewhere. An empty root means `/`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let root = if root.as_os_str().is_empty() {
            Path::new("/")
        } else {
            root
        };
        Self::with_basedir(root.join(DRIVERS_DIR))
    }

    /// Backend over a drivers directory given directly.
    pub fn with_basedir(basedir: impl Into<PathBuf>) -> Self {
        Self {
            basedir: basedir.into(),
        }
    }

    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    fn attr_path(&self, device: &str, attr: &str) -> PathBuf {
        self.basedir.join(device).join(attr)
    }

    /// Appends the devices bound to `driver` to `devices`, up to
    /// [`MAX_DEVICES`] in total, and returns how many were added.
    ///
    /// Only symbolic links count as devices. With `file_exists` set, a device
    /// is kept only when that file exists inside the link target. Entries
    /// that cannot be inspected are skipped. Fails only when the driver
    /// directory itself cannot be read.
    pub fn find_devices(
        &self,
        driver: &str,
        file_exists: Option<&str>,
        devices: &mut Vec<DeviceId>,
    ) -> Result<usize> {
        let dir = self.basedir.join(driver);
        let entries = fs::read_dir(&dir).map_err(|e| {
            error!("could not open {}: {e}", dir.display());
            JesdError::io(dir.display().to_string(), e)
        })?;

        let start = devices.len();
        for entry in entries.filter_map(|e| e.ok()) {
            if devices.len() >= MAX_DEVICES {
                break;
            }
            let Ok(meta) = fs::symlink_metadata(entry.path()) else {
                continue;
            };
            if !meta.file_type().is_symlink() {
                continue;
            }
            if let Some(file) = file_exists {
                if fs::metadata(entry.path().join(file)).is_err() {
                    debug!("skipping {}: no {file}", entry.path().display());
                    continue;
                }
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            devices.push(DeviceId::new(format!("{driver}/{name}")));
        }

        Ok(devices.len() - start)
    }

    /// RX then TX link-layer devices with a `status` attribute.
    pub fn jesd_devices(&self) -> Vec<DeviceId> {
        self.collect(&[JESD_RX_DRIVER, JESD_TX_DRIVER], Some(STATUS_ATTR))
    }

    pub fn xcvr_devices(&self) -> Vec<DeviceId> {
        self.collect(&XCVR_DRIVERS, None)
    }

    fn collect(&self, drivers: &[&str], file_exists: Option<&str>) -> Vec<DeviceId> {
        let mut devices = Vec::new();
        for driver in drivers {
            // a driver that is not loaded has no directory
            if let Err(e) = self.find_devices(driver, file_exists, &mut devices) {
                debug!("{driver}: {e}");
            }
        }
        devices
    }

    fn read_raw(&self, device: &str, attr: &str) -> Result<String> {
        let path = self.attr_path(device, attr);
        let bytes = fs::read(&path).map_err(|e| JesdError::io(path.display().to_string(), e))?;
        if bytes.is_empty() {
            return Err(JesdError::io(
                path.display().to_string(),
                io::Error::from_raw_os_error(libc::EIO),
            ));
        }
        // invalid UTF-8 decodes to U+FFFD
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl StatusSource for SysfsBackend {
    fn encoding(&self, device: &str) -> Encoding {
        match self.read_raw(device, ENCODER_ATTR) {
            Ok(text) => Encoding::from_attr(&text),
            // firmware without the attribute predates 64b66b support
            Err(JesdError::NotFound(_)) => Encoding::B8b10b,
            Err(e) => {
                warn!("{device}: reading encoder failed, assuming 8b10b: {e}");
                Encoding::B8b10b
            }
        }
    }

    fn read_attr(&self, device: &str, attr: &str) -> Result<String> {
        let mut text = self.read_raw(device, attr)?;
        if text.ends_with('\n') {
            text.pop();
        }
        Ok(text)
    }

    fn write_attr(&self, device: &str, attr: &str, value: &str) -> Result<()> {
        let path = self.attr_path(device, attr);
        let map = |e| JesdError::io(path.display().to_string(), e);
        let mut file = fs::OpenOptions::new().write(true).open(&path).map_err(map)?;
        file.write_all(value.as_bytes()).map_err(map)
    }

    fn read_status(&self, device: &str, encoding: Encoding) -> Result<LinkStatus> {
        let text = self.read_raw(device, STATUS_ATTR)?;
        let status = LinkStatus::parse(&text, encoding);
        if !status.is_trained() {
            debug!("{device}: link not trained, external reset is {}", status.external_reset);
        }
        Ok(status)
    }

    fn read_lane_with(&self, device: &str, lane: usize, encoding: Encoding) -> Result<LaneInfo> {
        let text = self.read_raw(device, &lane_attr(lane))?;
        LaneInfo::parse(&text, encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_root_is_filesystem_root() {
        let backend = SysfsBackend::new("");
        assert_eq!(backend.basedir(), Path::new("/sys/bus/platform/drivers"));

        let backend = SysfsBackend::new("/tmp/board");
        assert_eq!(
            backend.basedir(),
            Path::new("/tmp/board/sys/bus/platform/drivers")
        );
    }

    #[test]
    fn missing_driver_dir_is_an_error() {
        let backend = SysfsBackend::with_basedir("/nonexistent/jesd/drivers");
        let mut devices = Vec::new();
        let err = backend
            .find_devices(JESD_RX_DRIVER, Some(STATUS_ATTR), &mut devices)
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(devices.is_empty());
        assert!(backend.jesd_devices().is_empty());
    }
}
