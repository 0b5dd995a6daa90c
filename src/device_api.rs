use crate::{
    lane::lane_attr, status::STATUS_ATTR, sysfs::MAX_DEVICES, DeviceId, Encoding, JesdError,
    LaneInfo, LinkStatus, Result, StatusSource, ENCODER_ATTR,
};
use log::{debug, info, warn};

/// Substring marking a JESD204 link-layer device.
pub const JESD_MARKER: &str = "axi-jesd204-";
/// Substrings marking a transceiver device.
pub const XCVR_MARKERS: [&str; 2] = ["axi-adxcvr", "axi_adxcvr"];

/// One device as listed by a device-management context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiDevice {
    /// Position in the context's device table.
    pub index: usize,
    pub id: String,
    pub name: Option<String>,
    pub label: Option<String>,
}

impl ApiDevice {
    /// Label, falling back to name, falling back to id.
    pub fn display_name(&self) -> &str {
        self.label
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Device table and attribute access of a device-management context.
///
/// Attribute reads return the raw attribute text.
pub trait DeviceApi: Send {
    fn devices(&self) -> Vec<ApiDevice>;
    fn attr_read(&self, index: usize, attr: &str) -> Result<String>;
    fn attr_write(&self, index: usize, attr: &str, value: &str) -> Result<()>;
}

/// Backend over an open device-management context.
///
/// The context is owned here and released when the backend is dropped.
/// Devices are classified once, at construction.
pub struct ApiBackend {
    api: Box<dyn DeviceApi>,
    jesd: Vec<ApiDevice>,
    xcvr: Vec<ApiDevice>,
}

impl ApiBackend {
    pub fn new(api: Box<dyn DeviceApi>) -> Self {
        let mut jesd = Vec::new();
        let mut xcvr = Vec::new();

        for dev in api.devices() {
            let name = dev.display_name();
            if name.contains(JESD_MARKER) {
                if jesd.len() < MAX_DEVICES {
                    jesd.push(dev);
                }
            } else if XCVR_MARKERS.iter().any(|m| name.contains(m)) && xcvr.len() < MAX_DEVICES {
                xcvr.push(dev);
            }
        }
        info!(
            "device API: {} link-layer devices, {} transceivers",
            jesd.len(),
            xcvr.len()
        );

        Self { api, jesd, xcvr }
    }

    /// Finds a link-layer device, then a transceiver, by display name.
    pub fn lookup(&self, name: &str) -> Option<&ApiDevice> {
        self.jesd
            .iter()
            .chain(self.xcvr.iter())
            .find(|dev| dev.display_name() == name)
    }

    pub fn jesd_devices(&self) -> Vec<DeviceId> {
        self.jesd.iter().map(|d| DeviceId::api(d.display_name())).collect()
    }

    pub fn xcvr_devices(&self) -> Vec<DeviceId> {
        self.xcvr.iter().map(|d| DeviceId::api(d.display_name())).collect()
    }

    fn index_of(&self, device: &str) -> Result<usize> {
        self.lookup(device)
            .map(|dev| dev.index)
            .ok_or_else(|| JesdError::NotFound(DeviceId::api(device).to_string()))
    }
}

impl StatusSource for ApiBackend {
    fn encoding(&self, device: &str) -> Encoding {
        match self.read_attr(device, ENCODER_ATTR) {
            Ok(text) => Encoding::from_attr(&text),
            Err(e) => {
                debug!("{device}: no encoder attribute, assuming 8b10b: {e}");
                Encoding::B8b10b
            }
        }
    }

    fn read_attr(&self, device: &str, attr: &str) -> Result<String> {
        let mut text = self.api.attr_read(self.index_of(device)?, attr)?;
        if text.ends_with('\n') {
            text.pop();
        }
        Ok(text)
    }

    fn write_attr(&self, device: &str, attr: &str, value: &str) -> Result<()> {
        self.api.attr_write(self.index_of(device)?, attr, value)
    }

    fn read_status(&self, device: &str, _encoding: Encoding) -> Result<LinkStatus> {
        let text = self.read_attr(device, STATUS_ATTR)?;
        Ok(LinkStatus::parse_keyed(&text))
    }

    /// Only an empty record is rejected. Unlike the sysfs backend, a record
    /// without any recognised field still yields a zeroed lane.
    fn read_lane_with(&self, device: &str, lane: usize, encoding: Encoding) -> Result<LaneInfo> {
        let text = self.read_attr(device, &lane_attr(lane))?;
        if text.trim().is_empty() {
            warn!("{device}: lane {lane} attribute is empty");
            return Err(JesdError::FormatIncomplete(format!("empty lane {lane} record")));
        }
        Ok(LaneInfo::parse_keyed(&text, encoding))
    }
}


#[cfg(test)]
mod tests {
    use super::{mock::MockApi, *};
    use crate::{Health, Jesd, StatusHealth, SysfsBackend};

    const STATUS: &str = "Link is enabled\n\
        Measured Link Clock: 250.000 MHz\n\
        Reported Link Clock: 250.000 MHz\n\
        Lane rate: 10000.000 MHz\n\
        Lane rate / 40: 250.000 MHz\n\
        LMFC rate: 7.812 MHz\n\
        Link status: DATA\n\
        SYSREF captured: Yes\n\
        SYSREF alignment error: No\n";

    const LANE: &str = "Errors: 0\n\
        CGS state: DATA\n\
        Initial Frame Synchronization: Yes\n\
        Lane Latency: 1 Multi-frames and 40 Octets\n\
        Initial Lane Alignment Sequence: Yes\n\
        DID: 0, BID: 0, LID: 1, L: 4, SCR: 1, F: 1\n\
        K: 32, M: 2, N: 16, CS: 0, N': 16, S: 1, HD: 1\n\
        FCHK: 0x3D, CF: 0\n\
        ADJCNT: 0, PHADJ: 0, ADJDIR: 0, JESDV: 1, SUBCLASS: 1\n\
        FC: 250000000\n";

    fn context() -> MockApi {
        MockApi::default()
            .device("iio:device0", Some("axi-jesd204-rx"), Some("axi-jesd204-rx-mxfe"))
            .device("iio:device1", Some("axi-adxcvr-rx"), None)
            .device("iio:device2", Some("ad9081"), None)
            .device("iio:device3", None, None)
            .attr(0, "encoder", "8b10b\n")
            .attr(0, "status", STATUS)
            .attr(0, "lane0_info", LANE)
            .attr(0, "lane1_info", LANE)
    }

    #[test]
    fn display_name_fallbacks() {
        let ctx = context();
        assert_eq!(ctx.devices[0].display_name(), "axi-jesd204-rx-mxfe");
        assert_eq!(ctx.devices[1].display_name(), "axi-adxcvr-rx");
        assert_eq!(ctx.devices[3].display_name(), "iio:device3");
    }

    #[test]
    fn classifies_device_sets() {
        let backend = ApiBackend::new(Box::new(context()));
        assert_eq!(backend.jesd_devices(), vec![DeviceId::api("axi-jesd204-rx-mxfe")]);
        assert_eq!(backend.xcvr_devices(), vec![DeviceId::api("axi-adxcvr-rx")]);
        assert!(backend.lookup("ad9081").is_none());
    }

    #[test]
    fn device_set_is_capped() {
        let mut ctx = MockApi::default();
        for i in 0..12 {
            ctx = ctx.device(&format!("iio:device{i}"), Some(&format!("axi-jesd204-rx{i}")), None);
        }
        assert_eq!(ApiBackend::new(Box::new(ctx)).jesd_devices().len(), MAX_DEVICES);
    }

    #[test]
    fn reads_through_keyed_parsers() {
        let backend = ApiBackend::new(Box::new(context()));
        let dev = "axi-jesd204-rx-mxfe";
        assert_eq!(backend.encoding(dev), Encoding::B8b10b);

        let status = backend.read_status(dev, Encoding::B8b10b).unwrap();
        assert_eq!(status.link_status, "DATA");
        assert!(status.measured_device_clock.is_not_available());

        let lanes = backend.read_all_lanes(dev, Encoding::B8b10b);
        assert_eq!(lanes.len(), 2);
        assert_eq!(lanes[1].lid, 1);
        assert_eq!(lanes[1].fc, 250_000_000);
    }

    #[test]
    fn only_empty_lane_records_are_rejected() {
        let ctx = context().attr(0, "lane0_info", "\n").attr(0, "lane1_info", "garbage\n");
        let backend = ApiBackend::new(Box::new(ctx));
        let dev = "axi-jesd204-rx-mxfe";

        let err = backend.read_lane(dev, 0).unwrap_err();
        assert!(matches!(err, JesdError::FormatIncomplete(_)));
        assert_eq!(backend.read_lane(dev, 1).unwrap(), LaneInfo::default());
    }

    #[test]
    fn missing_encoder_defaults_to_8b10b() {
        let ctx = MockApi::default().device("iio:device0", Some("axi-jesd204-tx"), None);
        let backend = ApiBackend::new(Box::new(ctx));
        assert_eq!(backend.encoding("axi-jesd204-tx"), Encoding::B8b10b);
    }

    #[test]
    fn writes_reach_the_context() {
        let ctx = context();
        let attrs = ctx.attrs.clone();
        let backend = ApiBackend::new(Box::new(ctx));
        backend.write_attr("axi-adxcvr-rx", "prescale", "3").unwrap();
        assert_eq!(
            attrs.lock().unwrap().get(&(1, "prescale".to_owned())).cloned(),
            Some("3".to_owned())
        );
        assert!(backend.write_attr("nope", "prescale", "3").unwrap_err().is_not_found());
    }

    #[test]
    fn facade_routes_prefixed_identifiers() {
        let jesd = Jesd::with_api(
            SysfsBackend::with_basedir("/nonexistent"),
            ApiBackend::new(Box::new(context())),
        );
        let devices = jesd.devices().unwrap();
        assert_eq!(devices.len(), 1);

        let snapshot = jesd.poll(&devices[0]).unwrap();
        assert_eq!(snapshot.lanes.len(), 2);
        assert_eq!(snapshot.status_health.link_state, Health::Good);
        assert_eq!(snapshot.status_health, StatusHealth::evaluate(&snapshot.status, Encoding::B8b10b));
        assert!(snapshot.lane_health.iter().all(|h| h.overall().is_ok()));

        // unknown API names fall through to the filesystem
        let err = jesd.read_attr("iio:missing", "status").unwrap_err();
        assert!(err.is_not_found());
    }
}
