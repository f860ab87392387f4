//! End-to-end check of the conversion, time sorting and event building
//! chain on a synthetic MIDAS block.

use libgreat_sort::calibration::Calibration;
use libgreat_sort::constants::{BLOCK_MAGIC, DATA_BLOCK_SIZE, ENDIAN_TAG, WARMUP_BLOCKS};
use libgreat_sort::converter::Converter;
use libgreat_sort::event::{DetectorEvt, GammaFamily};
use libgreat_sort::event_builder::EventBuilder;
use libgreat_sort::settings::{ChannelRef, Settings};
use libgreat_sort::sink::PacketStore;

fn adc_word(module: u8, channel: u8, data_id: u8, adc: u16, ts_lsb: u32) -> u64 {
    let ident = ((module as u32) << 8) | ((data_id as u32) << 6) | channel as u32;
    let word_0 = (0x3u32 << 30) | (ident << 16) | adc as u32;
    ((word_0 as u64) << 32) | (ts_lsb & 0x0FFF_FFFF) as u64
}

fn trace_word(module: u8, channel: u8, nsamples: u16, ts_lsb: u32) -> u64 {
    let ident = ((module as u32) << 8) | channel as u32;
    let word_0 = (0x1u32 << 30) | (ident << 16) | nsamples as u32;
    ((word_0 as u64) << 32) | (ts_lsb & 0x0FFF_FFFF) as u64
}

fn sample_word(s: [u16; 4]) -> u64 {
    ((s[0] as u64 & 0x3FFF) << 32)
        | ((s[1] as u64 & 0x3FFF) << 48)
        | (s[2] as u64 & 0x3FFF)
        | ((s[3] as u64 & 0x3FFF) << 16)
}

fn full_hit(module: u8, channel: u8, qlong: u16, qshort: u16, finetime: u16, ts: u32) -> Vec<u64> {
    vec![
        adc_word(module, channel, 0, qlong, ts),
        adc_word(module, channel, 1, qshort, ts),
        adc_word(module, channel, 3, finetime, ts),
        trace_word(module, channel, 4, ts),
        sample_word([10, 11, 12, 13]),
    ]
}

fn make_block(words: &[u64]) -> Vec<u8> {
    let data_len = (words.len() * 8) as u32;
    let mut block = Vec::with_capacity(DATA_BLOCK_SIZE);
    block.extend_from_slice(BLOCK_MAGIC);
    block.extend_from_slice(&0u32.to_be_bytes());
    block.extend_from_slice(&0u16.to_be_bytes());
    block.extend_from_slice(&0u16.to_be_bytes());
    block.extend_from_slice(&1u16.to_be_bytes());
    block.extend_from_slice(&ENDIAN_TAG.to_be_bytes());
    block.extend_from_slice(&data_len.to_le_bytes());
    for w in words {
        block.extend_from_slice(&w.to_le_bytes());
    }
    block.extend_from_slice(&0xFFFF_FFFF_FFFF_FFFFu64.to_le_bytes());
    block.resize(DATA_BLOCK_SIZE, 0x5E);
    block
}

fn test_settings() -> Settings {
    let mut set = Settings::default();
    set.cebr3 = vec![ChannelRef {
        module: 0,
        channel: 3,
    }];
    set.tacs = vec![ChannelRef {
        module: 0,
        channel: 5,
    }];
    set.build_maps();
    set
}

fn run_pipeline(set: &Settings, words: &[u64]) -> libgreat_sort::sink::EventStore {
    let cal = Calibration::default_for(set);
    let mut store = PacketStore::new();
    let mut conv = Converter::new(set, &cal);
    conv.convert_block(&make_block(words), WARMUP_BLOCKS, &mut store)
        .unwrap();
    let order = store.build_time_index();
    let mut builder = EventBuilder::new(set);
    builder.build_events(&store, &order, |_| {})
}

#[test]
fn test_gamma_and_tac_in_one_event() {
    let set = test_settings();
    // A CeBr3 hit at tick 1000 and a TAC hit at tick 1050 are 200 ns
    // apart on a 4 ns digitizer and belong to the same event
    let mut words = full_hit(0, 3, 100, 40, 5, 1000);
    words.extend(full_hit(0, 5, 3000, 1000, 0, 1050));

    let events = run_pipeline(&set, &words);
    assert_eq!(events.len(), 1);
    let event = events.get(0).unwrap();
    assert_eq!(event.gamma_multiplicity(GammaFamily::CeBr3), 1);
    assert_eq!(event.tac_multiplicity(), 1);

    for evt in &event.evts {
        match evt {
            DetectorEvt::Gamma {
                family: GammaFamily::CeBr3,
                id,
                energy,
                time,
                ..
            } => {
                assert_eq!(*id, 0);
                // Default calibration passes the Qlong through
                assert_eq!(*energy, 100.0);
                // Coarse time 4000 ns plus 5/1000 of a tick of fine time
                assert!((time - 4000.02).abs() < 1e-6);
            }
            DetectorEvt::Tac { id, time, .. } => {
                assert_eq!(*id, 0);
                assert_eq!(*time, 4200.0);
            }
            other => panic!("unexpected sub-event {other:?}"),
        }
    }
}

#[test]
fn test_hits_outside_window_split() {
    let set = test_settings();
    // Tick 2000 is 4000 ns after tick 1000, outside the 3000 ns window
    let mut words = full_hit(0, 3, 100, 40, 0, 1000);
    words.extend(full_hit(0, 5, 3000, 1000, 0, 2000));

    let events = run_pipeline(&set, &words);
    assert_eq!(events.len(), 2);
    assert_eq!(
        events.get(0).unwrap().gamma_multiplicity(GammaFamily::CeBr3),
        1
    );
    assert_eq!(events.get(1).unwrap().tac_multiplicity(), 1);
}

#[test]
fn test_file_order_does_not_matter() {
    let set = test_settings();
    // The TAC hit arrives first in the file but later in time
    let mut words = full_hit(0, 5, 3000, 1000, 0, 1050);
    words.extend(full_hit(0, 3, 100, 40, 0, 1000));

    let events = run_pipeline(&set, &words);
    assert_eq!(events.len(), 1);
    let event = events.get(0).unwrap();
    assert_eq!(event.gamma_multiplicity(GammaFamily::CeBr3), 1);
    assert_eq!(event.tac_multiplicity(), 1);
}
