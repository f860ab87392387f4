use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::SettingsError;

/// CAEN firmware families. PSD produces Qlong, Qshort and a baseline or
/// fine-time item per hit; PHA only a Qlong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FirmwareFamily {
    #[default]
    Psd,
    Pha,
}

/// One CAEN digitizer module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaenModule {
    #[serde(default = "default_model")]
    pub model: u16,
    #[serde(default)]
    pub firmware: FirmwareFamily,
}

fn default_model() -> u16 {
    1725
}

impl Default for CaenModule {
    fn default() -> Self {
        Self {
            model: default_model(),
            firmware: FirmwareFamily::default(),
        }
    }
}

/// A (module, channel) pair on a CAEN digitizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub module: u8,
    pub channel: u8,
}

/// An HPGe detector: the first entry is the core contact, the rest are
/// the segments in order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HpgeDetector {
    pub segments: Vec<ChannelRef>,
}

/// Structure representing the experiment layout: modules, info codes,
/// event building windows and the detector channel maps. Settings are
/// serializable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub n_caen_modules: u8,
    pub n_caen_channels: u8,
    pub modules: Vec<CaenModule>,
    pub sync_code: u8,
    pub timestamp_code: u8,
    /// Event building window in ns
    pub event_window: f64,
    /// Coincidence window between CeBr3 hits in ns
    pub cebr3_hit_window: f64,
    /// Coincidence window between HPGe hits in ns
    pub hpge_hit_window: f64,
    pub tacs: Vec<ChannelRef>,
    pub cebr3: Vec<ChannelRef>,
    pub hpge: Vec<HpgeDetector>,

    #[serde(skip)]
    tac_map: FxHashMap<(u8, u8), i16>,
    #[serde(skip)]
    cebr3_map: FxHashMap<(u8, u8), i16>,
    #[serde(skip)]
    hpge_map: FxHashMap<(u8, u8), (i16, i16)>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut set = Self {
            n_caen_modules: 2,
            n_caen_channels: 16,
            modules: vec![CaenModule::default(); 2],
            sync_code: 4,
            timestamp_code: 5,
            event_window: 3.0e3,
            cebr3_hit_window: 500.0,
            hpge_hit_window: 500.0,
            tacs: Vec::new(),
            cebr3: Vec::new(),
            hpge: Vec::new(),
            tac_map: FxHashMap::default(),
            cebr3_map: FxHashMap::default(),
            hpge_map: FxHashMap::default(),
        };
        set.build_maps();
        set
    }
}

impl Settings {
    /// Read the settings in a YAML file
    /// Returns Settings if successful
    pub fn read_settings_file(settings_path: &Path) -> Result<Self, SettingsError> {
        if !settings_path.exists() {
            return Err(SettingsError::BadFilePath(settings_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(settings_path)?;
        let mut set = serde_yaml::from_str::<Self>(&yaml_str)?;
        set.build_maps();
        Ok(set)
    }

    /// Rebuild the detector lookup maps from the channel lists. Entries
    /// pointing outside the module/channel range are reported and skipped.
    pub fn build_maps(&mut self) {
        self.tac_map.clear();
        self.cebr3_map.clear();
        self.hpge_map.clear();

        for (i, t) in self.tacs.iter().enumerate() {
            if t.module < self.n_caen_modules && t.channel < self.n_caen_channels {
                self.tac_map.insert((t.module, t.channel), i as i16);
            } else {
                log::error!(
                    "Dodgy TAC settings: module = {} channel = {}",
                    t.module,
                    t.channel
                );
            }
        }

        for (i, c) in self.cebr3.iter().enumerate() {
            if c.module < self.n_caen_modules && c.channel < self.n_caen_channels {
                self.cebr3_map.insert((c.module, c.channel), i as i16);
            } else {
                log::error!(
                    "Dodgy CeBr3 settings: module = {} channel = {}",
                    c.module,
                    c.channel
                );
            }
        }

        for (i, det) in self.hpge.iter().enumerate() {
            for (j, s) in det.segments.iter().enumerate() {
                if s.module < self.n_caen_modules && s.channel < self.n_caen_channels {
                    self.hpge_map
                        .insert((s.module, s.channel), (i as i16, j as i16));
                } else {
                    log::error!(
                        "Dodgy HPGe settings: module = {} channel = {}",
                        s.module,
                        s.channel
                    );
                }
            }
        }
    }

    /// Timestamp tick in ns: 2 ns for the V1730, 4 ns for the V1725 and
    /// anything unrecognized
    pub fn tick_ns(&self, module: u8) -> u64 {
        match self.modules.get(module as usize).map(|m| m.model) {
            Some(1730) => 2,
            _ => 4,
        }
    }

    pub fn firmware(&self, module: u8) -> FirmwareFamily {
        self.modules
            .get(module as usize)
            .map(|m| m.firmware)
            .unwrap_or_default()
    }

    pub fn is_tac(&self, module: u8, channel: u8) -> bool {
        self.tac_map.contains_key(&(module, channel))
    }

    /// TAC ID by module and channel number, -1 if unmapped
    pub fn tac_id(&self, module: u8, channel: u8) -> i16 {
        *self.tac_map.get(&(module, channel)).unwrap_or(&-1)
    }

    pub fn is_cebr3(&self, module: u8, channel: u8) -> bool {
        self.cebr3_map.contains_key(&(module, channel))
    }

    /// CeBr3 detector ID by module and channel number, -1 if unmapped
    pub fn cebr3_detector(&self, module: u8, channel: u8) -> i16 {
        *self.cebr3_map.get(&(module, channel)).unwrap_or(&-1)
    }

    pub fn is_hpge(&self, module: u8, channel: u8) -> bool {
        self.hpge_map.contains_key(&(module, channel))
    }

    /// HPGe detector ID by module and channel number, -1 if unmapped
    pub fn hpge_detector(&self, module: u8, channel: u8) -> i16 {
        self.hpge_map.get(&(module, channel)).map(|v| v.0).unwrap_or(-1)
    }

    /// HPGe segment ID by module and channel number, 0 is the core,
    /// -1 if unmapped
    pub fn hpge_segment(&self, module: u8, channel: u8) -> i16 {
        self.hpge_map.get(&(module, channel)).map(|v| v.1).unwrap_or(-1)
    }

    pub fn n_tacs(&self) -> usize {
        self.tacs.len()
    }

    pub fn n_cebr3(&self) -> usize {
        self.cebr3.len()
    }

    pub fn n_hpge(&self) -> usize {
        self.hpge.len()
    }
}
