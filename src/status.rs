use crate::{Encoding, JesdError, Result, Scanner, SysfsString};
use log::debug;

/// Name of the link status attribute.
pub const STATUS_ATTR: &str = "status";

/// Link-level status of one JESD204 peripheral, as read in a single poll.
///
/// Every field is the literal token the driver printed. Fields the driver
/// does not emit in the current mode stay empty, except the device clock
/// triad which is set to `N/A` when the driver has no device clock support.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub link_state: SysfsString,
    pub measured_link_clock: SysfsString,
    pub reported_link_clock: SysfsString,
    pub measured_device_clock: SysfsString,
    pub reported_device_clock: SysfsString,
    pub desired_device_clock: SysfsString,
    pub lane_rate: SysfsString,
    /// Lane rate divided by 40 (8b10b) or 66 (64b66b).
    pub lane_rate_div: SysfsString,
    /// LMFC rate for 8b10b, LEMC rate for 64b66b.
    pub lmfc_rate: SysfsString,
    /// TX only.
    pub sync_state: SysfsString,
    pub link_status: SysfsString,
    pub sysref_captured: SysfsString,
    pub sysref_alignment_error: SysfsString,
    pub external_reset: SysfsString,
}

impl LinkStatus {
    /// Parses the status attribute in the order the driver writes it.
    ///
    /// Optional lines are attempted at a saved mark and the cursor is put
    /// back when they are absent, so a missing line never shifts the fields
    /// that follow. A block without a lane rate is an untrained link: only
    /// the external reset line follows and the rest of the record stays empty.
    pub fn parse(text: &str, encoding: Encoding) -> Self {
        let mut status = Self::default();
        let mut scanner = Scanner::new(text);

        read_into(&mut scanner, "Link is %s\n", &mut status.link_state);
        read_into(
            &mut scanner,
            "Measured Link Clock: %s MHz\n",
            &mut status.measured_link_clock,
        );
        read_into(
            &mut scanner,
            "Reported Link Clock: %s MHz\n",
            &mut status.reported_link_clock,
        );

        let mark = scanner.mark();
        if read_into(
            &mut scanner,
            "Measured Device Clock: %s MHz\n",
            &mut status.measured_device_clock,
        ) {
            read_into(
                &mut scanner,
                "Reported Device Clock: %s MHz\n",
                &mut status.reported_device_clock,
            );
            read_into(
                &mut scanner,
                "Desired Device Clock: %s MHz\n",
                &mut status.desired_device_clock,
            );
        } else {
            status.set_device_clock_not_available();
            scanner.reset(mark);
        }

        let mark = scanner.mark();
        if !read_into(&mut scanner, "Lane rate: %s MHz\n", &mut status.lane_rate) {
            scanner.reset(mark);
            read_into(
                &mut scanner,
                "External reset is %s\n",
                &mut status.external_reset,
            );
            debug!("status block without lane rate, link not trained");
            return status;
        }

        match encoding {
            Encoding::B8b10b => {
                read_into(
                    &mut scanner,
                    "Lane rate / 40: %s MHz\n",
                    &mut status.lane_rate_div,
                );
                read_into(&mut scanner, "LMFC rate: %s MHz\n", &mut status.lmfc_rate);
                let mark = scanner.mark();
                if !read_into(&mut scanner, "SYNC~: %s\n", &mut status.sync_state) {
                    scanner.reset(mark);
                }
            }
            Encoding::B64b66b => {
                read_into(
                    &mut scanner,
                    "Lane rate / 66: %s MHz\n",
                    &mut status.lane_rate_div,
                );
                read_into(&mut scanner, "LEMC rate: %s MHz\n", &mut status.lmfc_rate);
            }
        }

        read_into(&mut scanner, "Link status: %s\n", &mut status.link_status);
        read_into(
            &mut scanner,
            "SYSREF captured: %s\n",
            &mut status.sysref_captured,
        );
        read_into(
            &mut scanner,
            "SYSREF alignment error: %s\n",
            &mut status.sysref_alignment_error,
        );

        status
    }

    /// Parses a status block line by line, classifying each line by the label
    /// it contains. Line order does not matter.
    pub fn parse_keyed(text: &str) -> Self {
        let mut status = Self::default();

        for line in text.lines() {
            let Some((label, slot)) = status.slot_for(line) else {
                continue;
            };
            let Some(at) = line.find(label) else {
                continue;
            };
            let format = format!("{label} %s");
            if let Some(fields) = Scanner::new(&line[at..]).scan(&format) {
                slot.set(fields[0]);
            }
        }

        for clock in [
            &mut status.measured_device_clock,
            &mut status.reported_device_clock,
            &mut status.desired_device_clock,
        ] {
            if clock.is_empty() {
                *clock = SysfsString::not_available();
            }
        }

        status
    }

    fn slot_for(&mut self, line: &str) -> Option<(&'static str, &mut SysfsString)> {
        let slot = if line.contains("Link is") {
            ("Link is", &mut self.link_state)
        } else if line.contains("Measured Link Clock:") {
            ("Measured Link Clock:", &mut self.measured_link_clock)
        } else if line.contains("Reported Link Clock:") {
            ("Reported Link Clock:", &mut self.reported_link_clock)
        } else if line.contains("Measured Device Clock:") {
            ("Measured Device Clock:", &mut self.measured_device_clock)
        } else if line.contains("Reported Device Clock:") {
            ("Reported Device Clock:", &mut self.reported_device_clock)
        } else if line.contains("Desired Device Clock:") {
            ("Desired Device Clock:", &mut self.desired_device_clock)
        } else if line.contains("Lane rate:") {
            ("Lane rate:", &mut self.lane_rate)
        } else if line.contains("Lane rate / 40:") {
            ("Lane rate / 40:", &mut self.lane_rate_div)
        } else if line.contains("Lane rate / 66:") {
            ("Lane rate / 66:", &mut self.lane_rate_div)
        } else if line.contains("LMFC rate:") {
            ("LMFC rate:", &mut self.lmfc_rate)
        } else if line.contains("LEMC rate:") {
            ("LEMC rate:", &mut self.lmfc_rate)
        } else if line.contains("SYNC~:") {
            ("SYNC~:", &mut self.sync_state)
        } else if line.contains("Link status:") {
            ("Link status:", &mut self.link_status)
        } else if line.contains("SYSREF captured:") {
            ("SYSREF captured:", &mut self.sysref_captured)
        } else if line.contains("SYSREF alignment error:") {
            ("SYSREF alignment error:", &mut self.sysref_alignment_error)
        } else if line.contains("External reset is") {
            ("External reset is", &mut self.external_reset)
        } else {
            return None;
        };
        Some(slot)
    }

    fn set_device_clock_not_available(&mut self) {
        self.measured_device_clock = SysfsString::not_available();
        self.reported_device_clock = SysfsString::not_available();
        self.desired_device_clock = SysfsString::not_available();
    }

    /// Whether the driver reports device clocks at all.
    pub fn has_device_clock(&self) -> bool {
        !self.measured_device_clock.is_not_available()
    }

    /// False for the short block an untrained link reports.
    pub fn is_trained(&self) -> bool {
        !self.lane_rate.is_empty()
    }

    /// Fails with [`JesdError::FormatIncomplete`] for an untrained link.
    pub fn check_complete(&self) -> Result<()> {
        if self.is_trained() {
            Ok(())
        } else {
            Err(JesdError::FormatIncomplete(format!(
                "no lane rate, external reset is {}",
                if self.external_reset.is_empty() {
                    "unknown"
                } else {
                    self.external_reset.as_str()
                }
            )))
        }
    }
}

fn read_into(scanner: &mut Scanner<'_>, format: &str, slot: &mut SysfsString) -> bool {
    match scanner.scan(format) {
        Some(fields) => {
            slot.set(fields[0]);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RX_8B10B: &str = "\
Link is enabled
Measured Link Clock: 250.000 MHz
Reported Link Clock: 250.000 MHz
Measured Device Clock: 250.012 MHz
Reported Device Clock: 250.000 MHz
Desired Device Clock: 250.000 MHz
Lane rate: 10000.000 MHz
Lane rate / 40: 250.000 MHz
LMFC rate: 7.812 MHz
Link status: DATA
SYSREF captured: Yes
SYSREF alignment error: No
";

    const TX_8B10B_NO_DEVICE_CLOCK: &str = "\
Link is enabled
Measured Link Clock: 250.000 MHz
Reported Link Clock: 250.000 MHz
Lane rate: 10000.000 MHz
Lane rate / 40: 250.000 MHz
LMFC rate: 7.812 MHz
SYNC~: deasserted
Link status: DATA
SYSREF captured: Yes
SYSREF alignment error: No
";

    const RX_64B66B: &str = "\
Link is enabled
Measured Link Clock: 375.000 MHz
Reported Link Clock: 375.000 MHz
Lane rate: 24750.000 MHz
Lane rate / 66: 375.000 MHz
LEMC rate: 5.859 MHz
Link status: DATA
SYSREF captured: Yes
SYSREF alignment error: No
";

    const UNTRAINED: &str = "\
Link is disabled
Measured Link Clock: 0.000 MHz
Reported Link Clock: 250.000 MHz
External reset is asserted
";

    #[test]
    fn parses_full_8b10b_block() {
        let s = LinkStatus::parse(RX_8B10B, Encoding::B8b10b);
        assert_eq!(s.link_state, "enabled");
        assert_eq!(s.measured_link_clock, "250.000");
        assert_eq!(s.reported_link_clock, "250.000");
        assert_eq!(s.measured_device_clock, "250.012");
        assert_eq!(s.reported_device_clock, "250.000");
        assert_eq!(s.desired_device_clock, "250.000");
        assert_eq!(s.lane_rate, "10000.000");
        assert_eq!(s.lane_rate_div, "250.000");
        assert_eq!(s.lmfc_rate, "7.812");
        assert_eq!(s.sync_state, "");
        assert_eq!(s.link_status, "DATA");
        assert_eq!(s.sysref_captured, "Yes");
        assert_eq!(s.sysref_alignment_error, "No");
        assert!(s.is_trained());
    }

    #[test]
    fn serializing_fields_back_reproduces_block() {
        let s = LinkStatus::parse(RX_8B10B, Encoding::B8b10b);
        let rebuilt = format!(
            "Link is {}\nMeasured Link Clock: {} MHz\nReported Link Clock: {} MHz\n\
             Measured Device Clock: {} MHz\nReported Device Clock: {} MHz\n\
             Desired Device Clock: {} MHz\nLane rate: {} MHz\nLane rate / 40: {} MHz\n\
             LMFC rate: {} MHz\nLink status: {}\nSYSREF captured: {}\n\
             SYSREF alignment error: {}\n",
            s.link_state,
            s.measured_link_clock,
            s.reported_link_clock,
            s.measured_device_clock,
            s.reported_device_clock,
            s.desired_device_clock,
            s.lane_rate,
            s.lane_rate_div,
            s.lmfc_rate,
            s.link_status,
            s.sysref_captured,
            s.sysref_alignment_error,
        );
        assert_eq!(rebuilt, RX_8B10B);
    }

    #[test]
    fn missing_device_clock_does_not_shift_fields() {
        let with = LinkStatus::parse(RX_8B10B, Encoding::B8b10b);
        let without_text: String = RX_8B10B
            .lines()
            .filter(|l| !l.contains("Device Clock"))
            .map(|l| format!("{l}\n"))
            .collect();
        let without = LinkStatus::parse(&without_text, Encoding::B8b10b);

        assert_eq!(without.lane_rate, with.lane_rate);
        assert_eq!(without.lane_rate_div, with.lane_rate_div);
        assert_eq!(without.lmfc_rate, with.lmfc_rate);
        assert_eq!(without.link_status, with.link_status);
        assert_eq!(without.sysref_captured, with.sysref_captured);
        assert_eq!(without.sysref_alignment_error, with.sysref_alignment_error);

        assert_eq!(without.measured_device_clock, "N/A");
        assert_eq!(without.reported_device_clock, "N/A");
        assert_eq!(without.desired_device_clock, "N/A");
        assert!(!without.has_device_clock());
    }

    #[test]
    fn tx_sync_line_is_optional() {
        let s = LinkStatus::parse(TX_8B10B_NO_DEVICE_CLOCK, Encoding::B8b10b);
        assert_eq!(s.sync_state, "deasserted");
        assert_eq!(s.link_status, "DATA");
        assert_eq!(s.sysref_alignment_error, "No");
    }

    #[test]
    fn parses_64b66b_block() {
        let s = LinkStatus::parse(RX_64B66B, Encoding::B64b66b);
        assert_eq!(s.lane_rate, "24750.000");
        assert_eq!(s.lane_rate_div, "375.000");
        assert_eq!(s.lmfc_rate, "5.859");
        assert_eq!(s.link_status, "DATA");
        assert_eq!(s.sync_state, "");
    }

    #[test]
    fn untrained_link_is_degraded_not_an_error() {
        let s = LinkStatus::parse(UNTRAINED, Encoding::B8b10b);
        assert_eq!(s.link_state, "disabled");
        assert_eq!(s.measured_link_clock, "0.000");
        assert_eq!(s.reported_link_clock, "250.000");
        assert_eq!(s.external_reset, "asserted");
        assert_eq!(s.lane_rate, "");
        assert_eq!(s.lane_rate_div, "");
        assert_eq!(s.link_status, "");
        assert_eq!(s.sysref_captured, "");
        assert!(!s.is_trained());
        assert!(matches!(
            s.check_complete(),
            Err(JesdError::FormatIncomplete(_))
        ));
    }

    #[test]
    fn keyed_parse_matches_sequential_parse() {
        for (text, encoding) in [
            (RX_8B10B, Encoding::B8b10b),
            (TX_8B10B_NO_DEVICE_CLOCK, Encoding::B8b10b),
            (RX_64B66B, Encoding::B64b66b),
            (UNTRAINED, Encoding::B8b10b),
        ] {
            assert_eq!(
                LinkStatus::parse_keyed(text),
                LinkStatus::parse(text, encoding),
                "{text}"
            );
        }
    }

    #[test]
    fn keyed_parse_ignores_line_order() {
        let mut lines: Vec<&str> = RX_8B10B.lines().collect();
        lines.reverse();
        let shuffled = lines.join("\n");
        assert_eq!(
            LinkStatus::parse_keyed(&shuffled),
            LinkStatus::parse(RX_8B10B, Encoding::B8b10b)
        );
    }
}
