//! Windowed event building over the time-sorted packet stream.
//!
//! A window opens on the first above-threshold hit and accumulates
//! detector hits until the next packet falls outside the build window
//! (or the time jumps backwards, or the stream ends). Closed windows
//! are handed to the per-detector finders which produce the typed
//! sub-events of one [`PhysicsEvent`].

use super::calibration::{Calibration, EnergyType};
use super::constants::TIME_ORDER_SLACK;
use super::data_packets::{CaenData, DataPacket};
use super::event::{DetectorEvt, GammaFamily, PhysicsEvent};
use super::histogram::{Hist1D, Hist2D};
use super::settings::Settings;
use super::sink::{EventStore, PacketStore};

/// Diagnostic spectra filled while building events
#[derive(Debug)]
pub struct BuilderMonitor {
    /// Time difference of each packet to the window opener
    pub tdiff: Hist1D,
    /// Same, only for above-threshold packets
    pub tdiff_clean: Hist1D,
    /// TAC singles, one per TAC id
    pub htac: Vec<Hist1D>,
    pub cebr3_e: Hist1D,
    pub cebr3_e_vs_det: Hist2D,
    /// Prompt gamma-gamma coincidence matrix for the CeBr3 array
    pub cebr3_gg: Hist2D,
    pub cebr3_td: Hist1D,
    pub hpge_e: Hist1D,
    pub hpge_e_vs_det: Hist2D,
    /// Prompt gamma-gamma coincidence matrix for the HPGe array
    pub hpge_gg: Hist2D,
    pub hpge_td: Hist1D,
    /// Core-segment time differences, one per HPGe detector
    pub hpge_seg_td: Vec<Hist1D>,
}

impl BuilderMonitor {
    fn new(set: &Settings) -> Self {
        let td_low = -set.event_window - 20.0;
        let td_high = set.event_window + 20.0;
        let n_cebr3 = set.n_cebr3() as f64;
        let n_hpge = set.n_hpge() as f64;
        Self {
            tdiff: Hist1D::new(1500, -0.5e5, 1.0e5),
            tdiff_clean: Hist1D::new(1500, -0.5e5, 1.0e5),
            htac: (0..set.n_tacs())
                .map(|_| Hist1D::new(16384, -16384.0, 16384.0))
                .collect(),
            cebr3_e: Hist1D::new(4000, 0.0, 8000.0),
            cebr3_e_vs_det: Hist2D::new(
                set.n_cebr3() + 1,
                -0.5,
                n_cebr3 + 0.5,
                4000,
                0.0,
                8000.0,
            ),
            cebr3_gg: Hist2D::new(2000, 0.0, 8000.0, 2000, 0.0, 8000.0),
            cebr3_td: Hist1D::new(600, td_low, td_high),
            hpge_e: Hist1D::new(4000, 0.0, 4000.0),
            hpge_e_vs_det: Hist2D::new(set.n_hpge() + 1, -0.5, n_hpge + 0.5, 4000, 0.0, 4000.0),
            hpge_gg: Hist2D::new(2000, 0.0, 4000.0, 2000, 0.0, 4000.0),
            hpge_td: Hist1D::new(600, td_low, td_high),
            hpge_seg_td: (0..set.n_hpge())
                .map(|_| Hist1D::new(600, td_low, td_high))
                .collect(),
        }
    }
}

/// Builds physics events from a time-sorted packet store
pub struct EventBuilder<'a> {
    set: &'a Settings,
    /// Optional recalibration applied in place of the stored energies
    recal: Option<&'a Calibration>,
    build_window: f64,

    // Window state
    event_open: bool,
    flag_close_event: bool,
    hit_ctr: u64,
    time_first: f64,
    time_min: f64,
    time_max: f64,
    time_prev: f64,

    tac_td_list: Vec<f32>,
    tac_ts_list: Vec<f64>,
    tac_id_list: Vec<i16>,
    cebr3_en_list: Vec<f32>,
    cebr3_ts_list: Vec<f64>,
    cebr3_id_list: Vec<i16>,
    hpge_en_list: Vec<f32>,
    hpge_ts_list: Vec<f64>,
    hpge_id_list: Vec<i16>,
    hpge_seg_list: Vec<i16>,
    write_evts: PhysicsEvent,

    caen_time_start: Vec<f64>,
    caen_time_stop: Vec<f64>,
    n_caen_data: u64,
    n_info_data: u64,
    tac_ctr: u64,
    cebr3_ctr: u64,
    hpge_ctr: u64,

    monitor: BuilderMonitor,
}

impl<'a> EventBuilder<'a> {
    pub fn new(set: &'a Settings) -> Self {
        let n_mod = set.n_caen_modules as usize;
        Self {
            set,
            recal: None,
            build_window: set.event_window,
            event_open: false,
            flag_close_event: false,
            hit_ctr: 0,
            time_first: 0.0,
            time_min: 0.0,
            time_max: 0.0,
            time_prev: 0.0,
            tac_td_list: Vec::new(),
            tac_ts_list: Vec::new(),
            tac_id_list: Vec::new(),
            cebr3_en_list: Vec::new(),
            cebr3_ts_list: Vec::new(),
            cebr3_id_list: Vec::new(),
            hpge_en_list: Vec::new(),
            hpge_ts_list: Vec::new(),
            hpge_id_list: Vec::new(),
            hpge_seg_list: Vec::new(),
            write_evts: PhysicsEvent::default(),
            caen_time_start: vec![0.0; n_mod],
            caen_time_stop: vec![0.0; n_mod],
            n_caen_data: 0,
            n_info_data: 0,
            tac_ctr: 0,
            cebr3_ctr: 0,
            hpge_ctr: 0,
            monitor: BuilderMonitor::new(set),
        }
    }

    /// Recalibrate energies and thresholds instead of trusting the
    /// values stored at conversion time
    pub fn with_recalibration(mut self, cal: &'a Calibration) -> Self {
        self.recal = Some(cal);
        self
    }

    /// Reset per-file counters and live time tracking
    fn start_file(&mut self) {
        self.time_prev = 0.0;
        self.time_min = 0.0;
        self.time_max = 0.0;
        self.time_first = 0.0;
        self.n_caen_data = 0;
        self.n_info_data = 0;
        self.tac_ctr = 0;
        self.cebr3_ctr = 0;
        self.hpge_ctr = 0;
        self.caen_time_start.iter_mut().for_each(|t| *t = 0.0);
        self.caen_time_stop.iter_mut().for_each(|t| *t = 0.0);
    }

    /// Clear the window accumulation state, called after every close
    fn initialise(&mut self) {
        self.flag_close_event = false;
        self.event_open = false;
        self.hit_ctr = 0;
        self.tac_td_list.clear();
        self.tac_ts_list.clear();
        self.tac_id_list.clear();
        self.cebr3_en_list.clear();
        self.cebr3_ts_list.clear();
        self.cebr3_id_list.clear();
        self.hpge_en_list.clear();
        self.hpge_ts_list.clear();
        self.hpge_id_list.clear();
        self.hpge_seg_list.clear();
        self.write_evts = PhysicsEvent::default();
    }

    /// Loop over the time-ordered packets and build events. The order
    /// slice comes from [`PacketStore::build_time_index`]. The progress
    /// callback receives the fraction of packets done.
    pub fn build_events<F: FnMut(f32)>(
        &mut self,
        store: &PacketStore,
        order: &[usize],
        mut progress: F,
    ) -> EventStore {
        let mut events = EventStore::new();
        self.start_file();
        self.initialise();

        let n_entries = order.len();
        if n_entries == 0 {
            log::info!("Event building: nothing to do");
            return events;
        }
        log::info!("Event building: number of packets = {n_entries}");
        let flush = if n_entries < 200 { 1 } else { n_entries / 100 };

        for (i, &idx) in order.iter().enumerate() {
            let Some(packet) = store.get(idx) else {
                continue;
            };
            let mytime = packet.time();

            // Time must increase monotonically, give or take fine time
            if self.time_prev > packet.time() + TIME_ORDER_SLACK {
                log::warn!(
                    "Out of order packet: time {mytime} after {}",
                    self.time_prev
                );
            }
            self.time_prev = mytime;

            // Assume this is above threshold initially
            let mut mythres = true;

            match packet {
                DataPacket::Caen(caen) => {
                    self.n_caen_data += 1;
                    let (myenergy, thres) = self.energy_and_threshold(caen);
                    mythres = thres;

                    // Below-threshold data never opens a window
                    if mythres {
                        self.event_open = true;
                    }

                    self.dispatch_hit(caen, myenergy, mythres, mytime);

                    // Live time bookkeeping per module
                    let module = caen.module as usize;
                    if module < self.caen_time_start.len() {
                        if self.caen_time_start[module] == 0.0 {
                            self.caen_time_start[module] = mytime;
                        }
                        self.caen_time_stop[module] = mytime;
                    }

                    // First real hit anchors the window
                    if self.hit_ctr == 1 && mythres {
                        self.time_min = mytime;
                        self.time_max = mytime;
                        self.time_first = mytime;
                    }
                    if mytime > self.time_max {
                        self.time_max = mytime;
                    } else if mytime < self.time_min {
                        self.time_min = mytime;
                    }
                }
                DataPacket::Info(_) => {
                    self.n_info_data += 1;
                    // With no hits yet, keep moving the window anchor up
                    if self.hit_ctr == 0 {
                        self.time_first = mytime;
                    }
                }
            }

            // Check the next packet to decide whether to close the window
            if let Some(next) = order.get(i + 1).and_then(|&j| store.get(j)) {
                let time_diff = next.time() - self.time_first;

                if time_diff > self.build_window {
                    self.flag_close_event = true;
                } else if time_diff < 0.0 {
                    // Stream discontinuity, e.g. a chained file boundary
                    self.flag_close_event = true;
                }

                if next.as_caen().is_some() {
                    self.monitor.tdiff.fill(time_diff);
                    if mythres {
                        self.monitor.tdiff_clean.fill(time_diff);
                    }
                }
            }

            if self.flag_close_event || i + 1 == n_entries {
                if self.event_open {
                    self.tac_finder();
                    self.cebr3_finder();
                    self.hpge_finder();

                    if !self.write_evts.is_empty() {
                        events.push(std::mem::take(&mut self.write_evts));
                    }
                }
                self.initialise();
            }

            if i % flush == 0 || i + 1 == n_entries {
                progress((i + 1) as f32 / n_entries as f32);
            }
        }

        log::info!("Event builder finished...");
        log::info!("  CAEN data packets = {}", self.n_caen_data);
        for module in 0..self.set.n_caen_modules {
            log::info!(
                "   Module {module} live time = {} s",
                self.live_time(module) / 1e9
            );
        }
        log::info!("  Info data packets = {}", self.n_info_data);
        log::info!("   TAC events = {}", self.tac_ctr);
        log::info!("   CeBr3 events = {}", self.cebr3_ctr);
        log::info!("   HPGe events = {}", self.hpge_ctr);
        log::info!("  Physics events = {}", events.len());

        events
    }

    fn energy_and_threshold(&self, caen: &CaenData) -> (f32, bool) {
        match self.recal {
            Some(cal) => {
                let adc_value = match cal.energy_type(caen.module, caen.channel) {
                    EnergyType::Qlong => caen.qlong,
                    EnergyType::Qshort => caen.qshort,
                    EnergyType::Qdiff => caen.qdiff(),
                };
                let energy = cal.energy(caen.module, caen.channel, adc_value);
                let thres = adc_value as u32 > cal.threshold(caen.module, caen.channel);
                (energy, thres)
            }
            None => (caen.energy, caen.over_threshold),
        }
    }

    /// Sort an above-threshold hit into the per-detector lists
    fn dispatch_hit(&mut self, caen: &CaenData, energy: f32, thres: bool, time: f64) {
        let module = caen.module;
        let channel = caen.channel;

        if self.set.is_tac(module, channel) && thres {
            self.tac_td_list.push(energy);
            self.tac_ts_list.push(time);
            self.tac_id_list.push(self.set.tac_id(module, channel));
            self.hit_ctr += 1;
        } else if self.set.is_cebr3(module, channel) && thres {
            self.cebr3_en_list.push(energy);
            self.cebr3_ts_list.push(time);
            self.cebr3_id_list
                .push(self.set.cebr3_detector(module, channel));
            self.hit_ctr += 1;
        } else if self.set.is_hpge(module, channel) && thres {
            self.hpge_en_list.push(energy);
            self.hpge_ts_list.push(time);
            self.hpge_id_list
                .push(self.set.hpge_detector(module, channel));
            self.hpge_seg_list
                .push(self.set.hpge_segment(module, channel));
            self.hit_ctr += 1;
        }
    }

    /// One sub-event per TAC hit in the window
    fn tac_finder(&mut self) {
        for i in 0..self.tac_td_list.len() {
            let id = self.tac_id_list[i];
            self.monitor.htac[id as usize].fill(self.tac_td_list[i] as f64);

            self.write_evts.add_evt(DetectorEvt::Tac {
                id,
                tac_time: self.tac_td_list[i],
                time: self.tac_ts_list[i],
            });
            self.tac_ctr += 1;
        }
    }

    /// One sub-event per CeBr3 hit; prompt pairs fill the symmetric
    /// gamma-gamma matrix
    fn cebr3_finder(&mut self) {
        for i in 0..self.cebr3_en_list.len() {
            self.monitor.cebr3_e.fill(self.cebr3_en_list[i] as f64);
            self.monitor
                .cebr3_e_vs_det
                .fill(self.cebr3_id_list[i] as f64, self.cebr3_en_list[i] as f64);

            for j in i + 1..self.cebr3_en_list.len() {
                let tdiff = self.cebr3_ts_list[j] - self.cebr3_ts_list[i];
                self.monitor.cebr3_td.fill(tdiff);
                self.monitor.cebr3_td.fill(-tdiff);

                // Just prompt hits for now in a gg matrix
                if tdiff.abs() < self.set.cebr3_hit_window {
                    self.monitor
                        .cebr3_gg
                        .fill(self.cebr3_en_list[i] as f64, self.cebr3_en_list[j] as f64);
                    self.monitor
                        .cebr3_gg
                        .fill(self.cebr3_en_list[j] as f64, self.cebr3_en_list[i] as f64);
                }
            }

            self.write_evts.add_evt(DetectorEvt::Gamma {
                family: GammaFamily::CeBr3,
                id: self.cebr3_id_list[i],
                segment: 0,
                energy: self.cebr3_en_list[i],
                time: self.cebr3_ts_list[i],
            });
            self.cebr3_ctr += 1;
        }
    }

    /// Core hits seed HPGe sub-events; the highest-energy prompt hit in
    /// the same detector names the representative segment, and prompt
    /// cross-detector pairs fill the gamma-gamma matrix
    fn hpge_finder(&mut self) {
        for i in 0..self.hpge_en_list.len() {
            // Skip if we don't have a core
            if self.hpge_seg_list[i] != 0 {
                continue;
            }

            let mut seg_id_max: i16 = 0;
            let mut seg_en_max: f32 = -1.0;

            self.monitor.hpge_e.fill(self.hpge_en_list[i] as f64);
            self.monitor
                .hpge_e_vs_det
                .fill(self.hpge_id_list[i] as f64, self.hpge_en_list[i] as f64);

            for j in 0..self.hpge_en_list.len() {
                if i == j {
                    continue;
                }

                let tdiff = self.hpge_ts_list[j] - self.hpge_ts_list[i];

                if self.hpge_id_list[i] == self.hpge_id_list[j] {
                    self.monitor.hpge_seg_td[self.hpge_id_list[i] as usize].fill(tdiff);

                    if self.hpge_en_list[j] > seg_en_max && tdiff.abs() < self.set.hpge_hit_window
                    {
                        seg_en_max = self.hpge_en_list[j];
                        seg_id_max = self.hpge_seg_list[j];
                    }
                } else {
                    self.monitor.hpge_td.fill(tdiff);

                    if tdiff.abs() < self.set.hpge_hit_window {
                        self.monitor
                            .hpge_gg
                            .fill(self.hpge_en_list[i] as f64, self.hpge_en_list[j] as f64);
                        self.monitor
                            .hpge_gg
                            .fill(self.hpge_en_list[j] as f64, self.hpge_en_list[i] as f64);
                    }
                }
            }

            self.write_evts.add_evt(DetectorEvt::Gamma {
                family: GammaFamily::HpGe,
                id: self.hpge_id_list[i],
                segment: seg_id_max,
                energy: self.hpge_en_list[i],
                time: self.hpge_ts_list[i],
            });
            self.hpge_ctr += 1;
        }
    }

    /// Time between the first and last hit seen on a module, in ns
    pub fn live_time(&self, module: u8) -> f64 {
        self.caen_time_stop[module as usize] - self.caen_time_start[module as usize]
    }

    pub fn n_caen_data(&self) -> u64 {
        self.n_caen_data
    }

    pub fn n_info_data(&self) -> u64 {
        self.n_info_data
    }

    pub fn tac_count(&self) -> u64 {
        self.tac_ctr
    }

    pub fn cebr3_count(&self) -> u64 {
        self.cebr3_ctr
    }

    pub fn hpge_count(&self) -> u64 {
        self.hpge_ctr
    }

    pub fn monitor(&self) -> &BuilderMonitor {
        &self.monitor
    }
}
