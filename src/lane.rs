use crate::{
    scan::{after_label, parse_hex, parse_u32, parse_u64, token_after},
    Encoding, JesdError, Result, Scanner, SysfsString,
};
use log::debug;

/// Upper bound on lanes per link.
pub const MAX_LANES: usize = 32;

/// Attribute name holding the status of `lane`.
pub fn lane_attr(lane: usize) -> String {
    format!("lane{lane}_info")
}

/// Per-lane status and ILAS configuration as reported by the link layer.
///
/// 8b10b lanes carry the ILAS fields, the CGS/frame sync states and a
/// multiframe + octet latency. 64b66b lanes carry the extended multiblock
/// alignment state and an octet latency with min/max bounds. Fields that do
/// not belong to the active dialect stay zero/empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaneInfo {
    /// DID device ID
    pub did: u32,
    /// BID bank ID
    pub bid: u32,
    /// LID lane ID
    pub lid: u32,
    /// Lanes per device
    pub l: u32,
    /// Scrambling enabled
    pub scr: u32,
    /// Octets per frame
    pub f: u32,
    /// Frames per multiframe
    pub k: u32,
    /// Converters per device
    pub m: u32,
    /// Converter resolution
    pub n: u32,
    /// Control bits per sample
    pub cs: u32,
    /// Samples per converter per frame cycle
    pub s: u32,
    /// Total bits per sample (N')
    pub nd: u32,
    /// High density format
    pub hd: u32,
    pub fchk: u32,
    /// Control words per frame cycle per link
    pub cf: u32,
    pub adjcnt: u32,
    pub phyadj: u32,
    pub adjdir: u32,
    pub jesdv: u32,
    pub subclassv: u32,

    pub fc: u64,

    pub lane_errors: u32,
    pub lane_latency_multiframes: u32,
    pub lane_latency_octets: u32,
    /// 64b66b only
    pub lane_latency_min: u32,
    /// 64b66b only
    pub lane_latency_max: u32,

    pub cgs_state: SysfsString,
    pub init_frame_sync: SysfsString,
    pub init_lane_align_seq: SysfsString,
    pub ext_multiblock_align_state: SysfsString,
}

const ERRORS_FMT: &str = "Errors: %u\n";
const IDENTITY_FMT: &str = "DID: %u, BID: %u, LID: %u, L: %u, SCR: %u, F: %u\n";
const GEOMETRY_FMT: &str = "K: %u, M: %u, N: %u, CS: %u, N': %u, S: %u, HD: %u\n";
const CHECKSUM_FMT: &str = "FCHK: 0x%x, CF: %u\n";
const ADJUST_FMT: &str = "ADJCNT: %u, PHADJ: %u, ADJDIR: %u, JESDV: %u, SUBCLASS: %u\n";
const LATENCY_8B10B_FMT: &str = "%u Multi-frames and %u Octets";
const LATENCY_64B66B_FMT: &str = "%u (min/max %u/%u)";

impl LaneInfo {
    /// Octets in one multiframe (`K * F`).
    pub fn octets_per_multiframe(&self) -> u32 {
        self.k.saturating_mul(self.f)
    }

    /// Latency in octets, folding multiframes into octets.
    pub fn latency_octets(&self) -> u64 {
        u64::from(self.octets_per_multiframe()) * u64::from(self.lane_latency_multiframes)
            + u64::from(self.lane_latency_octets)
    }

    /// Parses a lane attribute in the order the driver writes it.
    ///
    /// For 8b10b the `DID/BID/LID` line is mandatory: without it the lane is
    /// rejected with [`JesdError::FormatIncomplete`]. The lines after it are
    /// taken when they match and left zero when they don't.
    pub fn parse(text: &str, encoding: Encoding) -> Result<Self> {
        let mut info = Self::default();
        let mut scanner = Scanner::new(text);

        let mut scanned = 0;
        if let Some(f) = scanner.scan(ERRORS_FMT) {
            info.lane_errors = parse_u32(f[0]);
            scanned += 1;
        }

        if encoding == Encoding::B64b66b {
            if let Some(f) = scanner.scan("State of Extended multiblock alignment:%s\n") {
                info.ext_multiblock_align_state.set(f[0]);
                scanned += 1;
            }
            if let Some(f) = scanner.scan_optional(&format!("Lane Latency: {LATENCY_64B66B_FMT}\n")) {
                info.set_latency_64b66b(&f);
            }
            if scanned == 0 {
                return Err(JesdError::FormatIncomplete("empty lane record".into()));
            }
            return Ok(info);
        }

        if let Some(f) = scanner.scan("CGS state: %s\n") {
            info.cgs_state.set(f[0]);
        }
        if let Some(f) = scanner.scan("Initial Frame Synchronization: %s\n") {
            info.init_frame_sync.set(f[0]);
        }
        if let Some(f) = scanner.scan(&format!("Lane Latency: {LATENCY_8B10B_FMT}\n")) {
            info.set_latency_8b10b(&f);
        }
        if let Some(f) = scanner.scan("Initial Lane Alignment Sequence: %s\n") {
            info.init_lane_align_seq.set(f[0]);
        }

        let Some(f) = scanner.scan(IDENTITY_FMT) else {
            debug!("lane record stops before the ILAS identity line");
            return Err(JesdError::FormatIncomplete(
                "missing DID/BID/LID line".into(),
            ));
        };
        info.set_identity(&f);

        if let Some(f) = scan_group(&mut scanner, GEOMETRY_FMT) {
            info.set_geometry(&f);
        }
        if let Some(f) = scan_group(&mut scanner, CHECKSUM_FMT) {
            info.fchk = parse_hex(f[0]);
            info.cf = parse_u32(f[1]);
        }
        let adjust = match scanner.scan(ADJUST_FMT) {
            Some(f) => Some(f),
            None => scan_group(&mut scanner, &ADJUST_FMT.replace("PHADJ", "PHYADJ")),
        };
        if let Some(f) = adjust {
            info.set_adjust(&f);
        }
        if let Some(f) = scan_group(&mut scanner, "FC: %u\n") {
            info.fc = parse_u64(f[0]);
        }

        Ok(info)
    }

    /// Parses a lane attribute by label, independent of line order.
    pub fn parse_keyed(text: &str, encoding: Encoding) -> Self {
        let mut info = Self::default();
        let value = |label: &str| token_after(text, label).map(parse_u32).unwrap_or_default();

        info.lane_errors = value("Errors:");

        if encoding == Encoding::B64b66b {
            if let Some(state) = token_after(text, "State of Extended multiblock alignment:") {
                info.ext_multiblock_align_state.set(state);
            }
            if let Some(f) = latency_fields(text, LATENCY_64B66B_FMT) {
                info.set_latency_64b66b(&f);
            }
            return info;
        }

        info.did = value("DID:");
        info.bid = value("BID:");
        info.lid = value("LID:");
        info.l = value("L:");
        info.scr = value("SCR:");
        info.f = value("F:");
        info.k = value("K:");
        info.m = value("M:");
        info.n = value("N:");
        info.cs = value("CS:");
        info.nd = value("N':");
        info.s = value("S:");
        info.hd = value("HD:");
        info.fchk = token_after(text, "FCHK:").map(parse_hex).unwrap_or_default();
        info.cf = value("CF:");
        info.adjcnt = value("ADJCNT:");
        info.phyadj = token_after(text, "PHADJ:")
            .or_else(|| token_after(text, "PHYADJ:"))
            .map(parse_u32)
            .unwrap_or_default();
        info.adjdir = value("ADJDIR:");
        info.jesdv = value("JESDV:");
        info.subclassv = token_after(text, "SUBCLASS:")
            .or_else(|| token_after(text, "SUBCLASSV:"))
            .map(parse_u32)
            .unwrap_or_default();
        info.fc = token_after(text, "FC:").map(parse_u64).unwrap_or_default();

        if let Some(state) = token_after(text, "CGS state:") {
            info.cgs_state.set(state);
        }
        if let Some(state) = token_after(text, "Initial Frame Synchronization:") {
            info.init_frame_sync.set(state);
        }
        if let Some(state) = token_after(text, "Initial Lane Alignment Sequence:") {
            info.init_lane_align_seq.set(state);
        }
        if let Some(f) = latency_fields(text, LATENCY_8B10B_FMT) {
            info.set_latency_8b10b(&f);
        }

        info
    }

    fn set_latency_8b10b(&mut self, f: &[&str]) {
        self.lane_latency_multiframes = parse_u32(f[0]);
        self.lane_latency_octets = parse_u32(f[1]);
    }

    fn set_latency_64b66b(&mut self, f: &[&str]) {
        self.lane_latency_octets = parse_u32(f[0]);
        self.lane_latency_min = parse_u32(f[1]);
        self.lane_latency_max = parse_u32(f[2]);
    }

    fn set_identity(&mut self, f: &[&str]) {
        self.did = parse_u32(f[0]);
        self.bid = parse_u32(f[1]);
        self.lid = parse_u32(f[2]);
        self.l = parse_u32(f[3]);
        self.scr = parse_u32(f[4]);
        self.f = parse_u32(f[5]);
    }

    fn set_geometry(&mut self, f: &[&str]) {
        self.k = parse_u32(f[0]);
        self.m = parse_u32(f[1]);
        self.n = parse_u32(f[2]);
        self.cs = parse_u32(f[3]);
        self.nd = parse_u32(f[4]);
        self.s = parse_u32(f[5]);
        self.hd = parse_u32(f[6]);
    }

    fn set_adjust(&mut self, f: &[&str]) {
        self.adjcnt = parse_u32(f[0]);
        self.phyadj = parse_u32(f[1]);
        self.adjdir = parse_u32(f[2]);
        self.jesdv = parse_u32(f[3]);
        self.subclassv = parse_u32(f[4]);
    }
}

/// Scans one ILAS group line. A line that carries the group's label but
/// does not match is skipped so the groups after it still line up.
fn scan_group<'a>(scanner: &mut Scanner<'a>, format: &str) -> Option<Vec<&'a str>> {
    let fields = scanner.scan(format);
    if fields.is_none() {
        let label = format.split(':').next().unwrap_or_default();
        if scanner.rest().trim_start().starts_with(label) {
            scanner.skip_line();
        }
    }
    fields
}

/// Re-parses the text following `Lane Latency:` with `format`.
fn latency_fields<'a>(text: &'a str, format: &str) -> Option<Vec<&'a str>> {
    let rest = after_label(text, "Lane Latency:")?;
    let line = rest.lines().next()?;
    Scanner::new(line).scan(&format!(" {format}"))
}
