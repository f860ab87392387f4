use serde::Serialize;
use std::sync::mpsc::Sender;

use super::calibration::Calibration;
use super::config::Config;
use super::converter::Converter;
use super::error::ProcessorError;
use super::event_builder::EventBuilder;
use super::settings::Settings;
use super::sink::PacketStore;
use super::worker_status::{BarColor, WorkerStatus};

/// Per-module statistics written to the run summary file
#[derive(Debug, Serialize)]
struct ModuleSummary {
    module: u8,
    hits: u64,
    dropped: u64,
    sync_items: u64,
    live_time_s: f64,
}

/// Statistics of one processed run, serialized to YAML next to the data
#[derive(Debug, Serialize)]
struct RunSummary {
    run_number: i32,
    blocks_converted: u64,
    packets: usize,
    events: usize,
    tac_events: u64,
    cebr3_events: u64,
    hpge_events: u64,
    modules: Vec<ModuleSummary>,
}

fn load_settings(config: &Config) -> Result<Settings, ProcessorError> {
    match &config.settings_path {
        Some(path) => Ok(Settings::read_settings_file(path)?),
        None => {
            log::warn!("No settings file given, using the default layout");
            Ok(Settings::default())
        }
    }
}

fn load_calibration(config: &Config, set: &Settings) -> Result<Calibration, ProcessorError> {
    match &config.calibration_path {
        Some(path) => Ok(Calibration::read_calibration_file(path, set)?),
        None => {
            log::warn!("No calibration file given, energies are raw ADC values");
            Ok(Calibration::default_for(set))
        }
    }
}

/// The main loop of great_sort.
///
/// Converts the MIDAS file of one run, time sorts the decoded packets,
/// builds physics events and writes the run summary. Progress of each
/// stage is reported over the status channel with a stage color.
pub fn process_run(
    config: &Config,
    run_number: i32,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<(), ProcessorError> {
    let run_file = config.get_run_file(run_number)?;
    let set = load_settings(config)?;
    let cal = load_calibration(config, &set)?;

    // Stage one: decode the MIDAS blocks into packets
    let mut converter = Converter::new(&set, &cal);
    let mut store = PacketStore::new();
    tx.send(WorkerStatus::new(
        0.0,
        run_number,
        *worker_id,
        BarColor::CYAN,
    ))?;
    let blocks_converted = converter.convert_file(
        &run_file,
        config.start_block,
        config.end_block,
        &mut store,
        |frac| {
            let _ = tx.send(WorkerStatus::new(
                frac,
                run_number,
                *worker_id,
                BarColor::CYAN,
            ));
        },
    )?;
    tx.send(WorkerStatus::new(
        1.0,
        run_number,
        *worker_id,
        BarColor::CYAN,
    ))?;
    log::info!(
        "Converted {blocks_converted} blocks into {} packets",
        store.len()
    );

    // Stage two: global time ordering
    tx.send(WorkerStatus::new(
        0.0,
        run_number,
        *worker_id,
        BarColor::MAGENTA,
    ))?;
    let order = store.build_time_index();
    tx.send(WorkerStatus::new(
        1.0,
        run_number,
        *worker_id,
        BarColor::MAGENTA,
    ))?;

    // Stage three: windowed event building
    tx.send(WorkerStatus::new(
        0.0,
        run_number,
        *worker_id,
        BarColor::GREEN,
    ))?;
    let mut builder = EventBuilder::new(&set);
    let events = builder.build_events(&store, &order, |frac| {
        let _ = tx.send(WorkerStatus::new(
            frac,
            run_number,
            *worker_id,
            BarColor::GREEN,
        ));
    });
    tx.send(WorkerStatus::new(
        1.0,
        run_number,
        *worker_id,
        BarColor::GREEN,
    ))?;

    let summary = RunSummary {
        run_number,
        blocks_converted,
        packets: store.len(),
        events: events.len(),
        tac_events: builder.tac_count(),
        cebr3_events: builder.cebr3_count(),
        hpge_events: builder.hpge_count(),
        modules: (0..set.n_caen_modules)
            .map(|m| ModuleSummary {
                module: m,
                hits: converter.hit_count(m),
                dropped: converter.dropped_count(m),
                sync_items: converter.ext_count(m),
                live_time_s: builder.live_time(m) / 1.0e9,
            })
            .collect(),
    };
    let summary_path = config.get_summary_file_name(run_number)?;
    std::fs::write(&summary_path, serde_yaml::to_string(&summary)?)?;
    log::info!("Wrote run summary to {:?}", summary_path);

    Ok(())
}

/// The function to be called by a separate thread (typically the UI).
/// This particular flavor is unused by the default tool (great_sort_cli)
/// but could be useful to someone else
/// Allows multiple runs to be processed
pub fn process(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<(), ProcessorError> {
    for run in config.first_run_number..(config.last_run_number + 1) {
        if config.does_run_exist(run) {
            log::info!("Processing run {}...", run);
            process_run(&config, run, &tx, &worker_id)?;
            log::info!("Finished processing run {}.", run);
        } else {
            log::info!("Run {} does not exist, skipping...", run);
        }
    }
    Ok(())
}

/// Process a subset of runs
pub fn process_subset(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<i32>,
) -> Result<(), ProcessorError> {
    for run in subset {
        if config.does_run_exist(run) {
            log::info!("Processing run {}...", run);
            process_run(&config, run, &tx, &worker_id)?;
            log::info!("Finished processing run {}.", run);
        } else {
            log::info!("Run {} does not exist, skipping...", run);
        }
    }
    Ok(())
}

/// Divide a run range in to a set of subranges (per thread/worker)
pub fn create_subsets(config: &Config) -> Vec<Vec<i32>> {
    let mut subsets: Vec<Vec<i32>> = vec![Vec::new(); config.n_threads as usize];
    let n_subsets = subsets.len();

    for (idx, run) in (config.first_run_number..(config.last_run_number + 1)).enumerate() {
        subsets[idx % n_subsets].push(run)
    }

    subsets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_subsets_round_robin() {
        let config = Config {
            first_run_number: 1,
            last_run_number: 5,
            n_threads: 2,
            ..Default::default()
        };
        let subsets = create_subsets(&config);
        assert_eq!(subsets.len(), 2);
        assert_eq!(subsets[0], vec![1, 3, 5]);
        assert_eq!(subsets[1], vec![2, 4]);
    }

    #[test]
    fn test_create_subsets_more_threads_than_runs() {
        let config = Config {
            first_run_number: 10,
            last_run_number: 10,
            n_threads: 4,
            ..Default::default()
        };
        let subsets = create_subsets(&config);
        assert_eq!(subsets.len(), 4);
        assert_eq!(subsets[0], vec![10]);
        assert!(subsets[1].is_empty());
    }
}
