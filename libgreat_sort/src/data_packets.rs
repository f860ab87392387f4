//! Unpacked data records produced by the converter.
//!
//! A CAEN hit arrives on the wire as several 64-bit sub-items (Qlong,
//! Qshort, baseline or fine time, trace) which the converter assembles
//! into a single [`CaenData`]. Non-ADC words become [`InfoData`]. Both
//! are stored behind the [`DataPacket`] tag so that the time sorter and
//! event builder can treat the stream uniformly.

use crate::settings::FirmwareFamily;

/// A fully assembled CAEN hit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaenData {
    pub module: u8,
    pub channel: u8,
    /// Coarse timestamp in ns, time offset already applied
    pub timestamp: u64,
    /// Sub-ns CFD interpolation, in ns
    pub finetime: f32,
    pub baseline: f32,
    pub qlong: u16,
    pub qshort: u16,
    pub trace: Vec<u16>,
    /// Calibrated energy from the per-channel quantity selector
    pub energy: f32,
    pub over_threshold: bool,
}

impl CaenData {
    /// Full hit time in ns, coarse plus fine
    pub fn time(&self) -> f64 {
        self.timestamp as f64 + self.finetime as f64
    }

    /// Difference of the long and short integration gates
    pub fn qdiff(&self) -> u16 {
        self.qlong.saturating_sub(self.qshort)
    }

    pub fn clear(&mut self) {
        *self = CaenData::default();
    }
}

/// A non-ADC information record with its rolling full timestamp
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoData {
    pub module: u8,
    pub code: u8,
    pub timestamp: u64,
}

impl InfoData {
    pub fn time(&self) -> f64 {
        self.timestamp as f64
    }
}

/// Tagged union of everything the converter emits
#[derive(Debug, Clone, PartialEq)]
pub enum DataPacket {
    Caen(CaenData),
    Info(InfoData),
}

impl DataPacket {
    /// Sort key used by the global time ordering
    pub fn time(&self) -> f64 {
        match self {
            DataPacket::Caen(c) => c.time(),
            DataPacket::Info(i) => i.time(),
        }
    }

    pub fn as_caen(&self) -> Option<&CaenData> {
        match self {
            DataPacket::Caen(c) => Some(c),
            DataPacket::Info(_) => None,
        }
    }

    pub fn as_info(&self) -> Option<&InfoData> {
        match self {
            DataPacket::Caen(_) => None,
            DataPacket::Info(i) => Some(i),
        }
    }
}

/// Which sub-items of the currently assembling CAEN record have arrived
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordProgress {
    pub qlong: bool,
    pub qshort: bool,
    pub baseline: bool,
    pub finetime: bool,
    pub trace: bool,
}

impl RecordProgress {
    pub fn any(&self) -> bool {
        self.qlong || self.qshort || self.baseline || self.finetime || self.trace
    }

    /// A saturated record has every mandatory sub-item the firmware
    /// produces, except the trace. The next sub-item belongs to a new
    /// hit and the open record must be finalized with an empty trace.
    pub fn is_saturated(&self, firmware: FirmwareFamily) -> bool {
        match firmware {
            FirmwareFamily::Psd => self.qlong && self.qshort && (self.baseline || self.finetime),
            FirmwareFamily::Pha => self.qlong,
        }
    }

    /// A record may only be emitted once all its parts are present
    pub fn is_complete(&self, firmware: FirmwareFamily) -> bool {
        match firmware {
            FirmwareFamily::Psd => {
                self.qlong && self.qshort && (self.baseline || self.finetime) && self.trace
            }
            FirmwareFamily::Pha => self.qlong && self.trace,
        }
    }

    /// Human-readable list of the missing parts, for the drop log
    pub fn missing_parts(&self) -> String {
        let mut missing = Vec::new();
        if !self.qlong {
            missing.push("Qlong");
        }
        if !self.qshort {
            missing.push("Qshort");
        }
        if !self.baseline && !self.finetime {
            missing.push("baseline/finetime");
        }
        if !self.trace {
            missing.push("trace");
        }
        missing.join(", ")
    }

    pub fn reset(&mut self) {
        *self = RecordProgress::default();
    }
}
