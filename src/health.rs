//! Pass/fail judgements over parsed status records. Nothing here does I/O.

use crate::{Encoding, LaneInfo, LinkStatus};

/// Allowed deviation between a measured and a reported clock, in ppm.
pub const CLOCK_ACCURACY: f64 = 200.0;

pub fn ppm(x: f64) -> f64 {
    x / 1_000_000.0
}

/// Classification of one field or lane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Health {
    Good,
    Marginal,
    Error,
    /// The check does not apply: the value is not reported, or the driver
    /// left the bounds unpopulated.
    #[default]
    NotApplicable,
}

impl Health {
    /// Good or not applicable.
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Good | Self::NotApplicable)
    }

    /// The worse of two classifications.
    pub fn worst(self, other: Self) -> Self {
        fn rank(h: Health) -> u8 {
            match h {
                Health::NotApplicable => 0,
                Health::Good => 1,
                Health::Marginal => 2,
                Health::Error => 3,
            }
        }
        if rank(other) > rank(self) {
            other
        } else {
            self
        }
    }
}

/// Checks `measured` against `reference` with a `tolerance_ppm` band.
/// Both ends of the band are inclusive.
pub fn clock_tolerance(measured: f64, reference: f64, tolerance_ppm: f64) -> Health {
    let low = reference * (1.0 - ppm(tolerance_ppm));
    let high = reference * (1.0 + ppm(tolerance_ppm));
    if measured > high || measured < low {
        Health::Error
    } else {
        Health::Good
    }
}

/// Clock check with the default [`CLOCK_ACCURACY`].
pub fn clock_health(measured: f64, reference: f64) -> Health {
    clock_tolerance(measured, reference, CLOCK_ACCURACY)
}

/// Reads a clock value in MHz. Anything that is not a number reads as zero.
pub fn parse_mhz(value: &str) -> f64 {
    value.trim().parse().unwrap_or(0.0)
}

/// Expected content of a state string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expect {
    /// Good when the value equals the token.
    Equal(&'static str),
    /// Good when the value differs from the token.
    NotEqual(&'static str),
}

impl Expect {
    pub fn check(self, value: &str) -> Health {
        let good = match self {
            Self::Equal(token) => value == token,
            Self::NotEqual(token) => value != token,
        };
        if good {
            Health::Good
        } else {
            Health::Error
        }
    }
}

pub const LINK_STATE: Expect = Expect::Equal("enabled");
pub const LINK_STATUS: Expect = Expect::Equal("DATA");
pub const SYSREF_CAPTURED: Expect = Expect::NotEqual("No");
pub const SYSREF_ALIGNMENT_ERROR: Expect = Expect::NotEqual("Yes");
pub const SYNC_STATE: Expect = Expect::Equal("deasserted");
pub const CGS_STATE: Expect = Expect::Equal("DATA");
pub const INIT_FRAME_SYNC: Expect = Expect::Equal("Yes");
pub const INIT_LANE_ALIGN_SEQ: Expect = Expect::Equal("Yes");
pub const EXT_MULTIBLOCK_ALIGN: Expect = Expect::Equal("EMB_LOCK");

/// Health of the link-level fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusHealth {
    pub link_state: Health,
    pub link_status: Health,
    /// Measured against reported link clock.
    pub measured_link_clock: Health,
    /// Reported link clock against lane rate / divider.
    pub lane_rate_div: Health,
    /// Measured against reported device clock.
    pub measured_device_clock: Health,
    /// Reported against desired device clock.
    pub reported_device_clock: Health,
    pub sysref_captured: Health,
    pub sysref_alignment_error: Health,
    /// 8b10b only.
    pub sync_state: Health,
}

impl StatusHealth {
    pub fn evaluate(status: &LinkStatus, encoding: Encoding) -> Self {
        let measured = parse_mhz(&status.measured_link_clock);
        let reported = parse_mhz(&status.reported_link_clock);

        let lane_rate_div = if status.lane_rate_div.is_empty() {
            Health::NotApplicable
        } else {
            clock_health(reported, parse_mhz(&status.lane_rate_div))
        };

        let (measured_device_clock, reported_device_clock) = if status.has_device_clock() {
            let measured = parse_mhz(&status.measured_device_clock);
            let reported = parse_mhz(&status.reported_device_clock);
            let desired = parse_mhz(&status.desired_device_clock);
            (
                clock_health(measured, reported),
                clock_health(reported, desired),
            )
        } else {
            (Health::NotApplicable, Health::NotApplicable)
        };

        let trained = status.is_trained();
        let when_trained = |expect: Expect, value: &str| {
            if trained {
                expect.check(value)
            } else {
                Health::NotApplicable
            }
        };

        Self {
            link_state: LINK_STATE.check(&status.link_state),
            link_status: when_trained(LINK_STATUS, status.link_status.as_str()),
            measured_link_clock: clock_health(measured, reported),
            lane_rate_div,
            measured_device_clock,
            reported_device_clock,
            sysref_captured: when_trained(SYSREF_CAPTURED, status.sysref_captured.as_str()),
            sysref_alignment_error: when_trained(
                SYSREF_ALIGNMENT_ERROR,
                status.sysref_alignment_error.as_str(),
            ),
            sync_state: match encoding {
                Encoding::B8b10b if !status.sync_state.is_empty() => {
                    SYNC_STATE.check(&status.sync_state)
                }
                _ => Health::NotApplicable,
            },
        }
    }

    pub fn overall(&self) -> Health {
        [
            self.link_state,
            self.link_status,
            self.measured_link_clock,
            self.lane_rate_div,
            self.measured_device_clock,
            self.reported_device_clock,
            self.sysref_captured,
            self.sysref_alignment_error,
            self.sync_state,
        ]
        .into_iter()
        .fold(Health::NotApplicable, Health::worst)
    }
}

/// Classifies every lane's 8b10b latency against the earliest lane.
///
/// A lane a full multiframe (`K * F` octets) or more behind the earliest one
/// is an error, more than half a multiframe is marginal. Lanes with unknown
/// frame geometry are not classified.
pub fn latency_skew(lanes: &[LaneInfo]) -> Vec<Health> {
    let Some(latency_min) = lanes.iter().map(LaneInfo::latency_octets).min() else {
        return Vec::new();
    };

    lanes
        .iter()
        .map(|lane| {
            let octets_per_multiframe = u64::from(lane.octets_per_multiframe());
            if octets_per_multiframe == 0 {
                return Health::NotApplicable;
            }
            let skew = lane.latency_octets() - latency_min;
            if skew >= octets_per_multiframe {
                Health::Error
            } else if skew > octets_per_multiframe / 2 {
                Health::Marginal
            } else {
                Health::Good
            }
        })
        .collect()
}

/// Classifies a 64b66b lane latency against the bounds the driver reports.
pub fn latency_bounds(lane: &LaneInfo) -> Health {
    let (octets, min, max) = (
        lane.lane_latency_octets,
        lane.lane_latency_min,
        lane.lane_latency_max,
    );
    if octets == 0 && min == 0 && max == 0 {
        Health::NotApplicable
    } else if octets < min || octets > max {
        Health::Error
    } else {
        Health::Good
    }
}

/// Health of one lane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LaneHealth {
    pub errors: Health,
    pub latency: Health,
    pub cgs_state: Health,
    pub init_frame_sync: Health,
    pub init_lane_align_seq: Health,
    pub ext_multiblock_align: Health,
}

impl LaneHealth {
    pub fn overall(&self) -> Health {
        [
            self.errors,
            self.latency,
            self.cgs_state,
            self.init_frame_sync,
            self.init_lane_align_seq,
            self.ext_multiblock_align,
        ]
        .into_iter()
        .fold(Health::NotApplicable, Health::worst)
    }
}

/// Evaluates every lane of one link. The result has one entry per lane.
pub fn evaluate_lanes(lanes: &[LaneInfo], encoding: Encoding) -> Vec<LaneHealth> {
    let errors = |lane: &LaneInfo| {
        if lane.lane_errors == 0 {
            Health::Good
        } else {
            Health::Error
        }
    };

    match encoding {
        Encoding::B8b10b => lanes
            .iter()
            .zip(latency_skew(lanes))
            .map(|(lane, latency)| LaneHealth {
                errors: errors(lane),
                latency,
                cgs_state: CGS_STATE.check(&lane.cgs_state),
                init_frame_sync: INIT_FRAME_SYNC.check(&lane.init_frame_sync),
                init_lane_align_seq: INIT_LANE_ALIGN_SEQ.check(&lane.init_lane_align_seq),
                ext_multiblock_align: Health::NotApplicable,
            })
            .collect(),
        Encoding::B64b66b => lanes
            .iter()
            .map(|lane| LaneHealth {
                errors: errors(lane),
                latency: latency_bounds(lane),
                ext_multiblock_align: EXT_MULTIBLOCK_ALIGN.check(&lane.ext_multiblock_align_state),
                ..LaneHealth::default()
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SysfsString;

    fn lane_8b10b(multiframes: u32, octets: u32) -> LaneInfo {
        LaneInfo {
            k: 32,
            f: 4,
            lane_latency_multiframes: multiframes,
            lane_latency_octets: octets,
            ..LaneInfo::default()
        }
    }

    fn lane_64b66b(octets: u32, min: u32, max: u32) -> LaneInfo {
        LaneInfo {
            lane_latency_octets: octets,
            lane_latency_min: min,
            lane_latency_max: max,
            ..LaneInfo::default()
        }
    }

    #[test]
    fn skew_against_earliest_lane() {
        // latencies 100, 104, 228 with K*F = 128
        let lanes = [lane_8b10b(0, 100), lane_8b10b(0, 104), lane_8b10b(1, 100)];
        assert_eq!(
            latency_skew(&lanes),
            vec![Health::Good, Health::Good, Health::Error]
        );
    }

    #[test]
    fn skew_beyond_half_multiframe_is_marginal() {
        let lanes = [lane_8b10b(0, 10), lane_8b10b(0, 74), lane_8b10b(0, 75)];
        assert_eq!(
            latency_skew(&lanes),
            vec![Health::Good, Health::Good, Health::Marginal]
        );
    }

    #[test]
    fn skew_without_geometry_is_not_classified() {
        let lanes = [LaneInfo::default()];
        assert_eq!(latency_skew(&lanes), vec![Health::NotApplicable]);
        assert!(latency_skew(&[]).is_empty());
    }

    #[test]
    fn bounds_for_64b66b() {
        assert_eq!(latency_bounds(&lane_64b66b(0, 0, 0)), Health::NotApplicable);
        assert_eq!(latency_bounds(&lane_64b66b(42, 40, 48)), Health::Good);
        assert_eq!(latency_bounds(&lane_64b66b(40, 40, 48)), Health::Good);
        assert_eq!(latency_bounds(&lane_64b66b(49, 40, 48)), Health::Error);
        assert_eq!(latency_bounds(&lane_64b66b(39, 40, 48)), Health::Error);
    }

    #[test]
    fn tolerance_band_is_inclusive() {
        let reported = 250.0;
        let edge = reported * (1.0 + ppm(CLOCK_ACCURACY));
        assert_eq!(clock_health(edge, reported), Health::Good);
        assert_eq!(clock_health(edge + 1e-6, reported), Health::Error);
        let low = reported * (1.0 - ppm(CLOCK_ACCURACY));
        assert_eq!(clock_health(low, reported), Health::Good);
        assert_eq!(clock_health(low - 1e-6, reported), Health::Error);
    }

    #[test]
    fn state_expectations() {
        assert_eq!(LINK_STATE.check("enabled"), Health::Good);
        assert_eq!(LINK_STATE.check("disabled"), Health::Error);
        assert_eq!(SYSREF_CAPTURED.check("Yes"), Health::Good);
        assert_eq!(SYSREF_CAPTURED.check("No"), Health::Error);
        assert_eq!(SYSREF_ALIGNMENT_ERROR.check("No"), Health::Good);
        assert_eq!(SYSREF_ALIGNMENT_ERROR.check("Yes"), Health::Error);
    }

    fn trained_status() -> LinkStatus {
        LinkStatus {
            link_state: "enabled".into(),
            measured_link_clock: "250.010".into(),
            reported_link_clock: "250.000".into(),
            measured_device_clock: SysfsString::not_available(),
            reported_device_clock: SysfsString::not_available(),
            desired_device_clock: SysfsString::not_available(),
            lane_rate: "10000.000".into(),
            lane_rate_div: "250.000".into(),
            lmfc_rate: "7.812".into(),
            link_status: "DATA".into(),
            sysref_captured: "Yes".into(),
            sysref_alignment_error: "No".into(),
            ..LinkStatus::default()
        }
    }

    #[test]
    fn device_clock_not_available_is_neutral() {
        let health = StatusHealth::evaluate(&trained_status(), Encoding::B8b10b);
        assert_eq!(health.measured_device_clock, Health::NotApplicable);
        assert_eq!(health.reported_device_clock, Health::NotApplicable);
        assert_eq!(health.measured_link_clock, Health::Good);
        assert_eq!(health.lane_rate_div, Health::Good);
        assert_eq!(health.sync_state, Health::NotApplicable);
        assert_eq!(health.overall(), Health::Good);
    }

    #[test]
    fn device_clock_checks() {
        let status = LinkStatus {
            measured_device_clock: "250.500".into(),
            reported_device_clock: "250.000".into(),
            desired_device_clock: "250.000".into(),
            ..trained_status()
        };
        let health = StatusHealth::evaluate(&status, Encoding::B8b10b);
        assert_eq!(health.measured_device_clock, Health::Error);
        assert_eq!(health.reported_device_clock, Health::Good);
        assert_eq!(health.overall(), Health::Error);
    }

    #[test]
    fn tx_sync_state_checked_for_8b10b() {
        let status = LinkStatus {
            sync_state: "asserted".into(),
            ..trained_status()
        };
        let health = StatusHealth::evaluate(&status, Encoding::B8b10b);
        assert_eq!(health.sync_state, Health::Error);
        let health = StatusHealth::evaluate(&status, Encoding::B64b66b);
        assert_eq!(health.sync_state, Health::NotApplicable);
    }

    #[test]
    fn untrained_link_fields_are_not_classified() {
        let status = LinkStatus {
            link_state: "disabled".into(),
            measured_link_clock: "0.000".into(),
            reported_link_clock: "250.000".into(),
            external_reset: "asserted".into(),
            ..LinkStatus::default()
        };
        let health = StatusHealth::evaluate(&status, Encoding::B8b10b);
        assert_eq!(health.link_state, Health::Error);
        assert_eq!(health.measured_link_clock, Health::Error);
        assert_eq!(health.lane_rate_div, Health::NotApplicable);
        assert_eq!(health.link_status, Health::NotApplicable);
        assert_eq!(health.sysref_captured, Health::NotApplicable);
    }

    #[test]
    fn lanes_for_each_dialect() {
        let mut good = lane_8b10b(0, 100);
        good.cgs_state = "DATA".into();
        good.init_frame_sync = "Yes".into();
        good.init_lane_align_seq = "Yes".into();
        let mut bad = good.clone();
        bad.lane_errors = 7;
        bad.cgs_state = "CGS".into();

        let health = evaluate_lanes(&[good, bad], Encoding::B8b10b);
        assert_eq!(health[0].overall(), Health::Good);
        assert_eq!(health[1].errors, Health::Error);
        assert_eq!(health[1].cgs_state, Health::Error);
        assert_eq!(health[1].ext_multiblock_align, Health::NotApplicable);

        let mut lane = lane_64b66b(0, 0, 0);
        lane.ext_multiblock_align_state = "EMB_LOCK".into();
        let health = evaluate_lanes(&[lane], Encoding::B64b66b);
        assert_eq!(health[0].latency, Health::NotApplicable);
        assert_eq!(health[0].ext_multiblock_align, Health::Good);
        assert_eq!(health[0].cgs_state, Health::NotApplicable);
        assert_eq!(health[0].overall(), Health::Good);
    }
}
