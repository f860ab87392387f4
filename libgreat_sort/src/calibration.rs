use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::CalibrationError;
use super::settings::Settings;

/// Which integrated charge is used as the energy of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyType {
    Qlong,
    Qshort,
    Qdiff,
}

/// Calibration parameters of one CAEN channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalChannel {
    pub module: u8,
    pub channel: u8,
    pub offset: f32,
    pub gain: f32,
    pub gain_quadr: f32,
    pub threshold: u32,
    /// Time alignment offset in ns
    pub time_offset: f64,
    pub energy_type: String,
}

impl Default for CalChannel {
    fn default() -> Self {
        Self {
            module: 0,
            channel: 0,
            offset: 0.0,
            gain: 1.0,
            gain_quadr: 0.0,
            threshold: 0,
            time_offset: 0.0,
            energy_type: String::from("Qlong"),
        }
    }
}

/// Per-channel energy calibration, thresholds and time offsets for all
/// CAEN channels. Channels not listed in the input file keep defaults
/// (energy passthrough, zero threshold and offset).
#[derive(Debug, Clone)]
pub struct Calibration {
    n_modules: u8,
    n_channels: u8,
    table: Vec<Vec<CalChannel>>,
}

impl Calibration {
    /// A calibration where every channel has default parameters
    pub fn default_for(set: &Settings) -> Self {
        let table = (0..set.n_caen_modules)
            .map(|m| {
                (0..set.n_caen_channels)
                    .map(|c| CalChannel {
                        module: m,
                        channel: c,
                        ..Default::default()
                    })
                    .collect()
            })
            .collect();
        Self {
            n_modules: set.n_caen_modules,
            n_channels: set.n_caen_channels,
            table,
        }
    }

    /// Read per-channel parameters from a YAML file. The file holds a
    /// list of [`CalChannel`] entries; out-of-range entries are
    /// reported and skipped.
    pub fn read_calibration_file(
        cal_path: &Path,
        set: &Settings,
    ) -> Result<Self, CalibrationError> {
        if !cal_path.exists() {
            return Err(CalibrationError::BadFilePath(cal_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(cal_path)?;
        let entries = serde_yaml::from_str::<Vec<CalChannel>>(&yaml_str)?;

        let mut cal = Self::default_for(set);
        for entry in entries {
            if entry.module < cal.n_modules && entry.channel < cal.n_channels {
                let (m, c) = (entry.module as usize, entry.channel as usize);
                cal.table[m][c] = entry;
            } else {
                log::error!(
                    "Dodgy calibration entry: module = {} channel = {}",
                    entry.module,
                    entry.channel
                );
            }
        }
        Ok(cal)
    }

    fn get(&self, module: u8, channel: u8) -> Option<&CalChannel> {
        self.table
            .get(module as usize)
            .and_then(|m| m.get(channel as usize))
    }

    /// Calibrated energy of a raw ADC value. A small random number is
    /// folded in to remove binning artefacts of the quadratic. Channels
    /// with default parameters return the raw value unchanged and
    /// out-of-range channels return -1.
    pub fn energy(&self, module: u8, channel: u8, raw: u16) -> f32 {
        let Some(ch) = self.get(module, channel) else {
            return -1.0;
        };

        if ch.gain_quadr.abs() < 1e-6 && (ch.gain - 1.0).abs() < 1e-6 && ch.offset.abs() < 1e-6 {
            return raw as f32;
        }

        let raw_rand = raw as f32 + 0.5 - rand::thread_rng().gen::<f32>();
        ch.gain_quadr * raw_rand * raw_rand + ch.gain * raw_rand + ch.offset
    }

    /// Software threshold of a channel, in raw ADC units. Out-of-range
    /// channels get an unreachable threshold.
    pub fn threshold(&self, module: u8, channel: u8) -> u32 {
        self.get(module, channel)
            .map(|ch| ch.threshold)
            .unwrap_or(u32::MAX)
    }

    /// Time alignment offset of a channel in ns
    pub fn time_offset(&self, module: u8, channel: u8) -> f64 {
        self.get(module, channel)
            .map(|ch| ch.time_offset)
            .unwrap_or(0.0)
    }

    /// Energy quantity selector of a channel. Unrecognized selectors
    /// are reported and fall back to Qlong.
    pub fn energy_type(&self, module: u8, channel: u8) -> EnergyType {
        let name = self
            .get(module, channel)
            .map(|ch| ch.energy_type.as_str())
            .unwrap_or("Qlong");
        match name {
            "Qlong" => EnergyType::Qlong,
            "Qshort" => EnergyType::Qshort,
            "Qdiff" => EnergyType::Qdiff,
            other => {
                log::error!(
                    "Incorrect CAEN energy type {other}, must be Qlong, Qshort or Qdiff"
                );
                EnergyType::Qlong
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_passthrough() {
        let set = Settings::default();
        let cal = Calibration::default_for(&set);
        assert_eq!(cal.energy(0, 0, 1234), 1234.0);
        assert_eq!(cal.threshold(0, 0), 0);
        assert_eq!(cal.time_offset(0, 0), 0.0);
        assert_eq!(cal.energy_type(0, 0), EnergyType::Qlong);
    }

    #[test]
    fn test_out_of_range() {
        let set = Settings::default();
        let cal = Calibration::default_for(&set);
        assert_eq!(cal.energy(9, 0, 100), -1.0);
        assert_eq!(cal.threshold(9, 0), u32::MAX);
        assert_eq!(cal.time_offset(9, 0), 0.0);
    }

    #[test]
    fn test_quadratic_with_dither() {
        let set = Settings::default();
        let mut cal = Calibration::default_for(&set);
        cal.table[0][3] = CalChannel {
            module: 0,
            channel: 3,
            offset: 10.0,
            gain: 2.0,
            gain_quadr: 0.0,
            ..Default::default()
        };
        // Dither is bounded by +-0.5 on the raw value
        let e = cal.energy(0, 3, 100);
        assert!(e > 10.0 + 2.0 * 99.5 - 1e-3);
        assert!(e < 10.0 + 2.0 * 100.5 + 1e-3);
    }

    #[test]
    fn test_energy_type_fallback() {
        let set = Settings::default();
        let mut cal = Calibration::default_for(&set);
        cal.table[0][0].energy_type = String::from("Qshort");
        cal.table[0][1].energy_type = String::from("Banana");
        assert_eq!(cal.energy_type(0, 0), EnergyType::Qshort);
        assert_eq!(cal.energy_type(0, 1), EnergyType::Qlong);
    }

    #[test]
    fn test_read_calibration_file() {
        let set = Settings::default();
        let cal_file = std::env::temp_dir().join("great_sort_cal_read_test.yml");
        std::fs::write(
            &cal_file,
            "- { module: 0, channel: 2, gain: 2.0, threshold: 150, energy_type: Qdiff }\n\
             - { module: 9, channel: 0, gain: 3.0 }",
        )
        .unwrap();
        let cal = Calibration::read_calibration_file(&cal_file, &set).unwrap();
        assert_eq!(cal.threshold(0, 2), 150);
        assert_eq!(cal.energy_type(0, 2), EnergyType::Qdiff);
        // The out-of-range entry is skipped, other channels keep defaults
        assert_eq!(cal.threshold(0, 3), 0);
        assert_eq!(cal.energy(0, 0, 500), 500.0);
    }

    #[test]
    fn test_read_entries_yaml() {
        let yaml = r#"
- module: 0
  channel: 2
  threshold: 150
  energy_type: Qdiff
"#;
        let entries: Vec<CalChannel> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].threshold, 150);
        assert_eq!(entries[0].gain, 1.0);
    }
}
