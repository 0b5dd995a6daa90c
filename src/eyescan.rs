use crate::{scan::parse_u32, JesdError, LaneInfo, Result, Scanner};

/// Transceiver attribute describing the eye scan geometry.
pub const XCVR_INFO_ATTR: &str = "info";
/// Per-lane eye scan control attributes.
pub const LANE_ENABLE_ATTR: &str = "enable";
pub const PRESCALE_ATTR: &str = "prescale";
pub const EYE_DATA_ATTR: &str = "eye_data";

pub const MAX_PRESCALE: u32 = 31;

/// Sample value with both error counters empty and both sample counters
/// saturated: the best BER a given prescale can resolve.
pub const SATURATED_SAMPLE: u64 = 0xFFFF_0000_FFFF_0000;

/// Eye scan geometry of one transceiver, fixed until another device is
/// selected.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EyescanInfo {
    pub es_hsize: u32,
    pub es_vsize: u32,
    pub cdr_data_width: u64,
    pub num_lanes: u32,
    /// Low power mode equalizer: one error/sample counter pair per point.
    pub lpm: bool,
    /// Lane rate in bit/s.
    pub lane_rate: u64,
}

impl EyescanInfo {
    /// Parses the transceiver `info` attribute,
    /// `x<h>,y<v> CDRDW: <width> LPM: <0|1>`. Older drivers omit `LPM`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut scanner = Scanner::new(text);
        let (fields, lpm) = match scanner.scan("x%u,y%u CDRDW: %u LPM: %u") {
            Some(f) => {
                let lpm = parse_u32(f[3]) != 0;
                (f, lpm)
            }
            None => match scanner.scan("x%u,y%u CDRDW: %u") {
                Some(f) => (f, false),
                None => {
                    return Err(JesdError::FormatIncomplete(format!(
                        "unrecognised transceiver info {:?}",
                        text.trim()
                    )))
                }
            },
        };

        let info = Self {
            es_hsize: parse_u32(fields[0]),
            es_vsize: parse_u32(fields[1]),
            cdr_data_width: u64::from(parse_u32(fields[2])),
            lpm,
            ..Self::default()
        };

        if info.es_hsize == 0 || info.es_vsize == 0 || info.cdr_data_width == 0 {
            return Err(JesdError::FormatIncomplete(
                "zero eye scan dimensions, kernel driver may be too old".into(),
            ));
        }
        Ok(info)
    }

    /// Fills lane count and rate from the lanes of the link the transceiver
    /// serves.
    pub fn with_lanes(mut self, lanes: &[LaneInfo]) -> Self {
        self.num_lanes = lanes.len() as u32;
        self.lane_rate = lanes.first().map(lane_rate).unwrap_or_default();
        self
    }

    /// Number of points in one eye scan.
    pub fn points(&self) -> usize {
        self.es_hsize as usize * self.es_vsize as usize
    }

    /// Bytes per point in the `eye_data` dump.
    pub fn sample_size(&self) -> usize {
        if self.lpm {
            4
        } else {
            8
        }
    }

    pub fn ber(&self, sample: u64, prescale: u32) -> f64 {
        calc_ber(sample, prescale, self.cdr_data_width, self.lpm)
    }

    /// Lowest BER each prescale setting can resolve.
    pub fn ber_floor(&self) -> Vec<f64> {
        (0..=MAX_PRESCALE)
            .map(|p| self.ber(SATURATED_SAMPLE, p))
            .collect()
    }
}

/// Bit error ratio of one eye scan point.
///
/// A DFE sample holds two (errors, count) pairs of 16 bit counters:
/// errors UT0 in bits 0..16, count UT0 in 16..32, errors UT1 in 32..48 and
/// count UT1 in 48..64. An LPM sample only has the UT0 pair. With no errors
/// the result is the resolution limit, one error over the sampled bits.
pub fn calc_ber(sample: u64, prescale: u32, width: u64, lpm: bool) -> f64 {
    let prescale = prescale.min(MAX_PRESCALE);
    let bits_per_count = width as f64 * 2f64.powi(1 + prescale as i32);

    let err_ut0 = (sample & 0xFFFF) as f64;
    let cnt_ut0 = ((sample >> 16) & 0xFFFF) as f64;

    if lpm {
        let errors = if err_ut0 == 0.0 { 1.0 } else { err_ut0 };
        return errors / (bits_per_count * cnt_ut0);
    }

    let err_ut1 = ((sample >> 32) & 0xFFFF) as f64;
    let cnt_ut1 = ((sample >> 48) & 0xFFFF) as f64;

    if err_ut0 + err_ut1 == 0.0 {
        1.0 / (bits_per_count * (cnt_ut0 + cnt_ut1))
    } else {
        (err_ut0 * cnt_ut1 + err_ut1 * cnt_ut0) / (2.0 * bits_per_count * cnt_ut0 * cnt_ut1)
    }
}

/// Serial lane rate in bit/s derived from the ILAS configuration and the
/// frame clock: `M * S * N' * 10 * FC / (8 * L)`, with `S` taken as one in
/// high density mode. Zero when the configuration is unknown or the rate does
/// not fit in a `u64`.
pub fn lane_rate(lane: &LaneInfo) -> u64 {
    if lane.l == 0 {
        return 0;
    }
    let s = if lane.hd != 0 { 1 } else { u128::from(lane.s) };
    let bits = [s, u128::from(lane.nd), 10, u128::from(lane.fc)]
        .into_iter()
        .try_fold(u128::from(lane.m), u128::checked_mul);
    bits.map(|b| b / (8 * u128::from(lane.l)))
        .and_then(|rate| u64::try_from(rate).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_info_with_lpm() {
        let info = EyescanInfo::parse("x65,y255 CDRDW: 40 LPM: 1\n").unwrap();
        assert_eq!(info.es_hsize, 65);
        assert_eq!(info.es_vsize, 255);
        assert_eq!(info.cdr_data_width, 40);
        assert!(info.lpm);
        assert_eq!(info.points(), 65 * 255);
        assert_eq!(info.sample_size(), 4);
    }

    #[test]
    fn parses_legacy_info() {
        let info = EyescanInfo::parse("x65,y255 CDRDW: 40\n").unwrap();
        assert!(!info.lpm);
        assert_eq!(info.sample_size(), 8);
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(EyescanInfo::parse("x0,y255 CDRDW: 40 LPM: 0").is_err());
        assert!(EyescanInfo::parse("garbage").is_err());
    }

    #[test]
    fn ber_resolution_limit() {
        let dfe = calc_ber(SATURATED_SAMPLE, 0, 40, false);
        let expected = 1.0 / (80.0 * 2.0 * 65535.0);
        assert!((dfe - expected).abs() < expected * 1e-12);

        // each prescale step halves the floor
        let next = calc_ber(SATURATED_SAMPLE, 1, 40, false);
        assert!((dfe / next - 2.0).abs() < 1e-12);
    }

    #[test]
    fn ber_with_errors() {
        // 10 errors in UT0 and UT1, 100 samples each
        let sample = 10 | (100 << 16) | (10 << 32) | (100 << 48);
        let ber = calc_ber(sample, 0, 40, false);
        let expected = (10.0 * 100.0 + 10.0 * 100.0) / (2.0 * 80.0 * 100.0 * 100.0);
        assert!((ber - expected).abs() < 1e-15);

        let lpm = calc_ber(10 | (100 << 16), 0, 40, true);
        assert!((lpm - 10.0 / (80.0 * 100.0)).abs() < 1e-15);
    }

    #[test]
    fn lane_rate_from_ilas() {
        // M=4, S=1, N'=16, L=4, FC=500 MHz -> 10 Gbps
        let lane = LaneInfo {
            m: 4,
            s: 1,
            nd: 16,
            l: 4,
            fc: 500_000_000,
            ..LaneInfo::default()
        };
        assert_eq!(lane_rate(&lane), 10_000_000_000);

        let hd = LaneInfo { s: 2, hd: 1, ..lane.clone() };
        assert_eq!(lane_rate(&hd), 10_000_000_000);
        assert_eq!(lane_rate(&LaneInfo::default()), 0);
    }

    #[test]
    fn saturated_ilas_fields_do_not_overflow() {
        let lane = LaneInfo {
            m: u32::MAX,
            s: u32::MAX,
            nd: u32::MAX,
            l: 1,
            fc: u64::MAX,
            ..LaneInfo::default()
        };
        assert_eq!(lane_rate(&lane), 0);

        // fits in u128 but not in the u64 result
        let lane = LaneInfo { fc: 1, ..lane };
        assert_eq!(lane_rate(&lane), 0);
    }

    #[test]
    fn ber_floor_covers_every_prescale() {
        let info = EyescanInfo::parse("x65,y255 CDRDW: 40 LPM: 0").unwrap();
        let floor = info.ber_floor();
        assert_eq!(floor.len(), MAX_PRESCALE as usize + 1);
        assert!(floor.windows(2).all(|w| w[1] < w[0]));
    }
}
