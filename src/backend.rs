use crate::{
    evaluate_lanes, lane::MAX_LANES, ApiBackend, Encoding, JesdError, LaneHealth, LaneInfo,
    LinkStatus, Result, StatusHealth, SysfsBackend,
};
use log::{debug, warn};
use std::fmt;
use time::OffsetDateTime;

/// Prefix marking a device served by the device-management API.
pub const API_PREFIX: &str = "iio:";

/// Opaque name of a discovered device.
///
/// Filesystem devices are `<driver>/<device>` relative to the drivers
/// directory; device-API devices are `iio:<label or name or id>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn api(name: &str) -> Self {
        Self(format!("{API_PREFIX}{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn target(&self) -> Target<'_> {
        Target::classify(&self.0)
    }

    /// Last path component, used as a short display name.
    pub fn short_name(&self) -> &str {
        match self.target() {
            Target::Api(name) => name,
            Target::Path(path) => path.rsplit('/').next().unwrap_or(path),
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Which backend a device identifier belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target<'a> {
    /// Device-API device, carrying the name without the prefix.
    Api(&'a str),
    /// Filesystem device, relative to the drivers directory.
    Path(&'a str),
}

impl<'a> Target<'a> {
    pub fn classify(id: &'a str) -> Self {
        match id.strip_prefix(API_PREFIX) {
            Some(name) => Self::Api(name),
            None => Self::Path(id),
        }
    }
}

/// Capabilities every backend provides for one JESD204 device.
///
/// `device` is the backend-local name: a path relative to the drivers
/// directory, or the API display name without [`API_PREFIX`].
pub trait StatusSource {
    /// Line coding of the link. Never fails: anything unreadable is 8b10b.
    fn encoding(&self, device: &str) -> Encoding;

    /// Reads an attribute with one trailing newline removed.
    fn read_attr(&self, device: &str, attr: &str) -> Result<String>;

    fn write_attr(&self, device: &str, attr: &str, value: &str) -> Result<()>;

    fn read_status(&self, device: &str, encoding: Encoding) -> Result<LinkStatus>;

    fn read_lane_with(&self, device: &str, lane: usize, encoding: Encoding) -> Result<LaneInfo>;

    fn read_lane(&self, device: &str, lane: usize) -> Result<LaneInfo> {
        self.read_lane_with(device, lane, self.encoding(device))
    }

    /// Reads lanes from index 0 up, stopping at the first lane that cannot be
    /// read. A link with fewer lanes than [`MAX_LANES`] is the normal case.
    fn read_all_lanes(&self, device: &str, encoding: Encoding) -> Vec<LaneInfo> {
        let mut lanes = Vec::new();
        for lane in 0..MAX_LANES {
            match self.read_lane_with(device, lane, encoding) {
                Ok(info) => lanes.push(info),
                Err(e) => {
                    if e.is_permission_denied() {
                        warn!("{device}: {e}, try running as root");
                    } else {
                        debug!("{device}: lane {lane} stops the lane scan: {e}");
                    }
                    break;
                }
            }
        }
        lanes
    }
}

/// Result of one poll cycle on one device.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub device: DeviceId,
    pub encoding: Encoding,
    pub status: LinkStatus,
    pub lanes: Vec<LaneInfo>,
    pub status_health: StatusHealth,
    pub lane_health: Vec<LaneHealth>,
    pub taken_at: OffsetDateTime,
}

/// Entry point over both backends.
///
/// The filesystem backend is always present. The device-API backend is
/// present when a context was opened at startup; identifiers carrying
/// [`API_PREFIX`] that it knows are routed to it, everything else goes to
/// the filesystem.
pub struct Jesd {
    sysfs: SysfsBackend,
    api: Option<ApiBackend>,
}

impl Jesd {
    pub fn new(sysfs: SysfsBackend) -> Self {
        Self { sysfs, api: None }
    }

    pub fn with_api(sysfs: SysfsBackend, api: ApiBackend) -> Self {
        Self {
            sysfs,
            api: Some(api),
        }
    }

    pub fn sysfs(&self) -> &SysfsBackend {
        &self.sysfs
    }

    pub fn api(&self) -> Option<&ApiBackend> {
        self.api.as_ref()
    }

    /// Picks the backend serving `device` and the name to hand it.
    fn route<'a>(&self, device: &'a str) -> (&dyn StatusSource, &'a str) {
        if let (Target::Api(name), Some(api)) = (Target::classify(device), &self.api) {
            if api.lookup(name).is_some() {
                return (api as &dyn StatusSource, name);
            }
            debug!("{device} is not a device-API device, trying the filesystem");
        }
        (&self.sysfs as &dyn StatusSource, device)
    }

    /// Link-layer devices, from the device API when one is open and from the
    /// RX then TX driver directories otherwise.
    pub fn devices(&self) -> Result<Vec<DeviceId>> {
        let devices = match &self.api {
            Some(api) => api.jesd_devices(),
            None => self.sysfs.jesd_devices(),
        };
        if devices.is_empty() {
            return Err(JesdError::NoDevices);
        }
        Ok(devices)
    }

    /// Transceiver devices.
    pub fn xcvr_devices(&self) -> Vec<DeviceId> {
        match &self.api {
            Some(api) => api.xcvr_devices(),
            None => self.sysfs.xcvr_devices(),
        }
    }

    /// Detects the encoding, reads status and lanes and evaluates them.
    pub fn poll(&self, device: &DeviceId) -> Result<Snapshot> {
        let encoding = self.encoding(device.as_str());
        let status = self.read_status(device.as_str(), encoding)?;
        let lanes = self.read_all_lanes(device.as_str(), encoding);

        let status_health = StatusHealth::evaluate(&status, encoding);
        let lane_health = evaluate_lanes(&lanes, encoding);

        Ok(Snapshot {
            device: device.clone(),
            encoding,
            status,
            lanes,
            status_health,
            lane_health,
            taken_at: OffsetDateTime::now_utc(),
        })
    }
}

impl StatusSource for Jesd {
    fn encoding(&self, device: &str) -> Encoding {
        let (source, name) = self.route(device);
        source.encoding(name)
    }

    fn read_attr(&self, device: &str, attr: &str) -> Result<String> {
        let (source, name) = self.route(device);
        source.read_attr(name, attr)
    }

    fn write_attr(&self, device: &str, attr: &str, value: &str) -> Result<()> {
        let (source, name) = self.route(device);
        source.write_attr(name, attr, value)
    }

    fn read_status(&self, device: &str, encoding: Encoding) -> Result<LinkStatus> {
        let (source, name) = self.route(device);
        source.read_status(name, encoding)
    }

    fn read_lane_with(&self, device: &str, lane: usize, encoding: Encoding) -> Result<LaneInfo> {
        let (source, name) = self.route(device);
        source.read_lane_with(name, lane, encoding)
    }

    fn read_all_lanes(&self, device: &str, encoding: Encoding) -> Vec<LaneInfo> {
        let (source, name) = self.route(device);
        source.read_all_lanes(name, encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_identifiers() {
        assert_eq!(
            Target::classify("iio:axi-jesd204-rx"),
            Target::Api("axi-jesd204-rx")
        );
        assert_eq!(
            Target::classify("axi-jesd204-rx/84aa0000.axi-jesd204-rx"),
            Target::Path("axi-jesd204-rx/84aa0000.axi-jesd204-rx")
        );
    }

    #[test]
    fn short_names() {
        let dev = DeviceId::new("axi-jesd204-tx/84a90000.axi-jesd204-tx");
        assert_eq!(dev.short_name(), "84a90000.axi-jesd204-tx");
        assert_eq!(DeviceId::api("axi-jesd204-rx-mxfe").short_name(), "axi-jesd204-rx-mxfe");
        assert_eq!(DeviceId::api("x").to_string(), "iio:x");
    }
}
