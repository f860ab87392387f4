//! Decoder for CAEN data in GREAT/MIDAS block format.
//!
//! Blocks are read one at a time and unpacked into 64-bit words. ADC
//! words carry one sub-item of a hit each (Qlong, Qshort, baseline or
//! fine time), trace headers carry the sampled waveform, and info words
//! carry the high bits of the timestamp plus DAQ bookkeeping. The
//! converter assembles the sub-items into [`CaenData`] records and
//! pushes them to a [`PacketStore`] in file order.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use human_bytes::human_bytes;

use super::block::{BlockHeader, BlockView, SwapMode};
use super::calibration::{Calibration, EnergyType};
use super::constants::*;
use super::data_packets::{CaenData, DataPacket, InfoData, RecordProgress};
use super::error::{BlockError, ConverterError};
use super::histogram::Hist1D;
use super::settings::Settings;
use super::sink::PacketStore;

/// Per-module rolling timestamp state. The CAEN 28-bit coarse counter
/// wraps quickly, so the DAQ interleaves info words carrying the middle
/// (sync/extended timestamp) and high bits. The full timestamp is
/// hsb(16) | msb(20) | lsb(28).
#[derive(Debug, Clone)]
pub struct TimestampState {
    hsb: Vec<u64>,
    msb: Vec<u64>,
}

impl TimestampState {
    pub fn new(n_modules: usize) -> Self {
        Self {
            hsb: vec![0; n_modules],
            msb: vec![0; n_modules],
        }
    }

    pub fn reset(&mut self) {
        self.hsb.iter_mut().for_each(|v| *v = 0);
        self.msb.iter_mut().for_each(|v| *v = 0);
    }

    pub fn set_high(&mut self, module: u8, field: u64) {
        self.hsb[module as usize] = field & 0xFFFF;
    }

    pub fn set_mid(&mut self, module: u8, field: u64) {
        self.msb[module as usize] = field & 0x000F_FFFF;
    }

    /// Full 64-bit timestamp in ticks for an info record
    pub fn full(&self, module: u8, lsb: u64) -> u64 {
        (self.hsb[module as usize] << 48)
            | (self.msb[module as usize] << 28)
            | (lsb & 0x0FFF_FFFF)
    }

    /// Coarse ADC timestamp in ticks, middle bits extended
    pub fn ticks(&self, module: u8, lsb: u64) -> u64 {
        (self.msb[module as usize] << 28) | (lsb & 0x0FFF_FFFF)
    }
}

/// Raw and calibrated energy spectra filled during conversion
#[derive(Debug)]
pub struct ConverterMonitor {
    qlong: Vec<Vec<Hist1D>>,
    qshort: Vec<Vec<Hist1D>>,
    qdiff: Vec<Vec<Hist1D>>,
    cal: Vec<Vec<Hist1D>>,
}

impl ConverterMonitor {
    fn new(n_modules: usize, n_channels: usize) -> Self {
        let grid = |bins: usize, high: f64| -> Vec<Vec<Hist1D>> {
            (0..n_modules)
                .map(|_| (0..n_channels).map(|_| Hist1D::new(bins, 0.0, high)).collect())
                .collect()
        };
        Self {
            qlong: grid(65536, 65536.0),
            qshort: grid(32768, 32768.0),
            qdiff: grid(65536, 65536.0),
            cal: grid(4096, 16384.0),
        }
    }

    pub fn qlong(&self, module: u8, channel: u8) -> &Hist1D {
        &self.qlong[module as usize][channel as usize]
    }

    pub fn qshort(&self, module: u8, channel: u8) -> &Hist1D {
        &self.qshort[module as usize][channel as usize]
    }

    pub fn qdiff(&self, module: u8, channel: u8) -> &Hist1D {
        &self.qdiff[module as usize][channel as usize]
    }

    pub fn cal(&self, module: u8, channel: u8) -> &Hist1D {
        &self.cal[module as usize][channel as usize]
    }
}

/// Converts GREAT/MIDAS blocks into time-stamped data packets
pub struct Converter<'a> {
    set: &'a Settings,
    cal: &'a Calibration,
    swap: SwapMode,
    timestamps: TimestampState,
    caen_data: CaenData,
    record: RecordProgress,
    /// Timestamp of the word being processed, in ns
    word_time: u64,
    ctr_hit: Vec<u64>,
    ctr_ext: Vec<u64>,
    ctr_dropped: Vec<u64>,
    monitor: ConverterMonitor,
}

impl<'a> Converter<'a> {
    pub fn new(set: &'a Settings, cal: &'a Calibration) -> Self {
        let n_mod = set.n_caen_modules as usize;
        let n_ch = set.n_caen_channels as usize;
        Self {
            set,
            cal,
            swap: SwapMode::Unknown,
            timestamps: TimestampState::new(n_mod),
            caen_data: CaenData::default(),
            record: RecordProgress::default(),
            word_time: 0,
            ctr_hit: vec![0; n_mod],
            ctr_ext: vec![0; n_mod],
            ctr_dropped: vec![0; n_mod],
            monitor: ConverterMonitor::new(n_mod, n_ch),
        }
    }

    /// Reset all per-file state before a new input stream
    pub fn start_file(&mut self) {
        self.swap = SwapMode::Unknown;
        self.timestamps.reset();
        self.caen_data.clear();
        self.record.reset();
        self.word_time = 0;
        self.ctr_hit.iter_mut().for_each(|c| *c = 0);
        self.ctr_ext.iter_mut().for_each(|c| *c = 0);
        self.ctr_dropped.iter_mut().for_each(|c| *c = 0);
    }

    /// Convert a whole MIDAS file, pushing decoded packets to the store.
    /// Blocks before `start_block` and after `end_block` are skipped.
    /// The progress callback receives the fraction of blocks done.
    pub fn convert_file<F: FnMut(f32)>(
        &mut self,
        path: &Path,
        start_block: u64,
        end_block: Option<u64>,
        store: &mut PacketStore,
        mut progress: F,
    ) -> Result<u64, ConverterError> {
        if !path.exists() {
            return Err(ConverterError::BadFilePath(path.to_path_buf()));
        }
        self.start_file();

        let file_size = path.metadata()?.len();
        let total_blocks = file_size / DATA_BLOCK_SIZE as u64;
        let remainder = file_size % DATA_BLOCK_SIZE as u64;
        if remainder != 0 {
            log::warn!(
                "File {path:?} is not block aligned, ignoring the trailing {remainder} bytes"
            );
        }
        log::info!(
            "Converting {path:?}: {} in {total_blocks} blocks",
            human_bytes(file_size as f64)
        );

        let mut file = BufReader::new(File::open(path)?);
        let mut block = vec![0u8; DATA_BLOCK_SIZE];
        let end = end_block.unwrap_or(total_blocks).min(total_blocks);
        let flush_blocks = (end / 100).max(1);

        let mut converted = 0u64;
        for nblock in 0..end {
            file.read_exact(&mut block)?;
            if nblock < start_block {
                continue;
            }
            self.convert_block(&block, nblock, store)?;
            converted += 1;
            if nblock % flush_blocks == 0 {
                progress(nblock as f32 / end as f32);
            }
        }

        for module in 0..self.set.n_caen_modules as usize {
            log::info!(
                "CAEN module {module}: {} hits, {} sync pulses, {} dropped records",
                self.ctr_hit[module],
                self.ctr_ext[module],
                self.ctr_dropped[module]
            );
        }
        Ok(converted)
    }

    /// Decode one block. The block number is used for the warm-up skip
    /// and for error reporting.
    pub fn convert_block(
        &mut self,
        block: &[u8],
        nblock: u64,
        store: &mut PacketStore,
    ) -> Result<(), ConverterError> {
        let header = BlockHeader::read(block, nblock)?;

        // Records never span blocks, drop anything still in flight
        if self.record.any() {
            log::debug!("Dropping partial CAEN record at block {nblock} boundary");
            self.ctr_dropped[self.caen_data.module as usize] += 1;
            self.record.reset();
            self.caen_data.clear();
        }

        // The DAQ pads out the first blocks of a file while it warms up
        if nblock < WARMUP_BLOCKS {
            return Ok(());
        }

        let payload = &block[HEADER_SIZE..];
        if !self.swap.is_known() {
            self.swap = SwapMode::detect(header.data_endian, payload);
        }

        let view = BlockView::scan(payload, self.swap, header.data_len);
        if !view.terminated {
            return Err(BlockError::Unterminated(nblock).into());
        }

        let mut i = 0;
        while i < view.words.len() {
            let word = view.words[i];
            let word_0 = (word >> 32) as u32;
            let word_1 = word as u32;

            // Data type is the highest two bits
            match (word_0 >> 30) & 0x3 {
                0x3 => self.process_adc(word_0, word_1, store),
                0x2 => self.process_info(word_0, word_1, store),
                0x1 => {
                    i = self.process_trace(&view.words, i, word_0, word_1);
                    self.finish_record(store);
                }
                _ => {
                    log::warn!("Wrong data type in block {nblock}: word_0 = {word_0:#010x}");
                }
            }
            i += 1;
        }
        Ok(())
    }

    /// ADCchanIdent is bits 28:16 of word_0:
    /// mod_id bits 12:8, data_id bits 7:6, ch_id bits 5:0.
    /// data_id: Qlong = 0, Qshort = 1, baseline = 2, fine timing = 3
    fn chan_id(&self, word_0: u32) -> Option<(u8, u8, u8)> {
        let ident = (word_0 >> 16) & 0x1FFF;
        let module = ((ident >> 8) & 0x1F) as u8;
        let data_id = ((ident >> 6) & 0x3) as u8;
        let channel = (ident & 0x3F) as u8;
        if module < self.set.n_caen_modules && channel < self.set.n_caen_channels {
            Some((module, data_id, channel))
        } else {
            None
        }
    }

    fn process_adc(&mut self, word_0: u32, word_1: u32, store: &mut PacketStore) {
        let adc_data = (word_0 & 0xFFFF) as u16;
        let Some((module, data_id, channel)) = self.chan_id(word_0) else {
            log::warn!(
                "Bad CAEN event with ident {:#06x}, out of range",
                (word_0 >> 16) & 0x1FFF
            );
            return;
        };

        // Reconstruct the timestamp and scale to ns
        let lsb = (word_1 & 0x0FFF_FFFF) as u64;
        let tm_stp = self.timestamps.ticks(module, lsb) * self.set.tick_ns(module);
        self.word_time = tm_stp;

        let firmware = self.set.firmware(module);
        if !self.record.any() {
            // First sub-item stamps the record
            self.caen_data.timestamp = tm_stp;
            self.caen_data.module = module;
            self.caen_data.channel = channel;
        } else if self.record.is_saturated(firmware) {
            // All data items are here but the next hit arrived before a
            // trace: there is no trace data. Finish the open record with
            // an empty trace, then re-open for this sub-item.
            self.record.trace = true;
            self.finish_record(store);
            self.caen_data.timestamp = tm_stp;
            self.caen_data.module = module;
            self.caen_data.channel = channel;
        } else {
            let duplicate = match data_id {
                0 => self.record.qlong,
                1 => self.record.qshort,
                2 => self.record.baseline,
                _ => self.record.finetime,
            };
            if duplicate && tm_stp == self.caen_data.timestamp {
                // Same hit sent the same item twice, drop the word
                log::warn!(
                    "Duplicate CAEN data item {data_id} on module {module} channel {channel}"
                );
                return;
            } else if duplicate {
                // A repeated data kind at a new timestamp means the open
                // record was abandoned mid-assembly
                self.finish_record(store);
                self.caen_data.timestamp = tm_stp;
                self.caen_data.module = module;
                self.caen_data.channel = channel;
            }
        }

        match data_id {
            // Qlong, full 16 bits with an overflow marker
            0 => {
                self.monitor.qlong[module as usize][channel as usize].fill(adc_data as f64);
                self.caen_data.qlong = if adc_data == 0xFFFF { 0 } else { adc_data };
                self.record.qlong = true;
            }
            // Qshort, 15 bits
            1 => {
                let adc_data = adc_data & 0x7FFF;
                self.monitor.qshort[module as usize][channel as usize].fill(adc_data as f64);
                self.caen_data.qshort = if adc_data == 0x7FFF { 0 } else { adc_data };
                self.record.qshort = true;
            }
            // Baseline, in quarter ADC units
            2 => {
                self.caen_data.baseline = adc_data as f32 / 4.0;
                self.caen_data.finetime = 0.0;
                self.record.baseline = true;
            }
            // Fine timing, 10 bits in units of tick/1000
            _ => {
                let adc_data = adc_data & 0x03FF;
                self.caen_data.finetime =
                    adc_data as f32 * self.set.tick_ns(module) as f32 / 1000.0;
                self.caen_data.baseline = 0.0;
                self.record.finetime = true;
            }
        }

        self.finish_record(store);
    }

    /// Unpack the trace samples following a trace header. Returns the
    /// index of the last word consumed; a word that is not a trace
    /// sample backs up so the caller reprocesses it.
    fn process_trace(&mut self, words: &[u64], mut pos: usize, word_0: u32, word_1: u32) -> usize {
        let Some((module, _data_id, channel)) = self.chan_id(word_0) else {
            return pos;
        };

        let nsamples = (word_0 & 0xFFFF) as usize;
        let lsb = (word_1 & 0x0FFF_FFFF) as u64;
        let tm_stp = self.timestamps.ticks(module, lsb) * self.set.tick_ns(module);
        self.word_time = tm_stp;

        self.caen_data.timestamp = tm_stp;
        self.caen_data.module = module;
        self.caen_data.channel = channel;

        for j in 0..nsamples / 4 {
            pos += 1;
            let sample_packet = match words.get(pos) {
                Some(&w) if (w >> 32) as u32 != PADDING => w,
                _ => {
                    log::warn!("Trace ended early at sample {} of {nsamples}", j * 4);
                    pos -= 1;
                    break;
                }
            };

            // Sample pairs are stored swapped within the word
            self.caen_data
                .trace
                .push(((sample_packet >> 32) & 0x3FFF) as u16);
            self.caen_data
                .trace
                .push(((sample_packet >> 48) & 0x3FFF) as u16);
            self.caen_data.trace.push((sample_packet & 0x3FFF) as u16);
            self.caen_data
                .trace
                .push(((sample_packet >> 16) & 0x3FFF) as u16);
        }

        self.record.trace = true;
        pos
    }

    fn process_info(&mut self, word_0: u32, word_1: u32, store: &mut PacketStore) {
        let module = ((word_0 >> 24) & 0x3F) as u8;
        let field = (word_0 & 0x000F_FFFF) as u64;
        let code = ((word_0 >> 20) & 0xF) as u8;
        let lsb = (word_1 & 0x0FFF_FFFF) as u64;

        if module >= self.set.n_caen_modules {
            log::warn!("Bad info event with module {module}, out of range");
            return;
        }

        if code == self.set.timestamp_code {
            // High bits of the timestamp
            self.timestamps.set_high(module, field);
        } else if code == self.set.sync_code {
            // Middle bits: the CAEN extended timestamp from the sync pulse
            self.timestamps.set_mid(module, field);
            self.ctr_ext[module as usize] += 1;
        } else {
            // Anything else is bookkeeping worth keeping in the stream
            store.push(DataPacket::Info(InfoData {
                module,
                code,
                timestamp: self.timestamps.full(module, lsb),
            }));
        }
    }

    /// Close out the record under assembly if it can be. A complete
    /// record is calibrated and emitted; an incomplete record whose
    /// timestamp no longer matches the last word belongs to a hit that
    /// will never finish and is dropped.
    fn finish_record(&mut self, store: &mut PacketStore) {
        let module = self.caen_data.module;
        let channel = self.caen_data.channel;
        let firmware = self.set.firmware(module);

        if self.record.is_complete(firmware) {
            self.monitor.qdiff[module as usize][channel as usize]
                .fill(self.caen_data.qdiff() as f64);

            // Choose the energy we want to use
            let adc_value = match self.cal.energy_type(module, channel) {
                EnergyType::Qlong => self.caen_data.qlong,
                EnergyType::Qshort => self.caen_data.qshort,
                EnergyType::Qdiff => self.caen_data.qdiff(),
            };
            let energy = self.cal.energy(module, channel, adc_value);
            self.caen_data.energy = energy;
            self.monitor.cal[module as usize][channel as usize].fill(energy as f64);

            self.caen_data.over_threshold =
                adc_value as u32 > self.cal.threshold(module, channel);

            // Time alignment happens here so the sort sees aligned stamps
            let aligned =
                self.caen_data.timestamp as f64 + self.cal.time_offset(module, channel);
            self.caen_data.timestamp = if aligned > 0.0 { aligned as u64 } else { 0 };

            store.push(DataPacket::Caen(self.caen_data.clone()));
        } else if self.word_time != self.caen_data.timestamp {
            log::warn!(
                "Missing {} in CAEN record on module {module} channel {channel}, dropped",
                self.record.missing_parts()
            );
            self.ctr_dropped[module as usize] += 1;
        } else {
            // Not finished yet, keep assembling
            return;
        }

        // Count the hit, even if it was bad
        self.ctr_hit[module as usize] += 1;
        self.record.reset();
        self.caen_data.clear();
    }

    pub fn hit_count(&self, module: u8) -> u64 {
        self.ctr_hit[module as usize]
    }

    pub fn ext_count(&self, module: u8) -> u64 {
        self.ctr_ext[module as usize]
    }

    pub fn dropped_count(&self, module: u8) -> u64 {
        self.ctr_dropped[module as usize]
    }

    pub fn monitor(&self) -> &ConverterMonitor {
        &self.monitor
    }
}
