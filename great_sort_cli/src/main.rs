use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;

use libgreat_sort::config::Config;
use libgreat_sort::process::{create_subsets, process_subset};
use libgreat_sort::worker_status::{BarColor, WorkerStatus};

fn make_template_config(path: &Path) {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config).unwrap();
    let mut file = File::create(path).expect("Could create template config file!");
    file.write_all(yaml_str.as_bytes())
        .expect("Failed to write yaml data to file!");
}

fn bar_color_name(color: &BarColor) -> &'static str {
    match color {
        BarColor::CYAN => "cyan",
        BarColor::MAGENTA => "magenta",
        BarColor::RED => "red",
        BarColor::GREEN => "green",
    }
}

fn style_bar(bar: &ProgressBar, run_number: i32, color: &BarColor) {
    let template = format!(
        "[{{elapsed_precise}}] {{bar:40.{}}} {{percent:>3}}% Run {}",
        bar_color_name(color),
        run_number
    );
    bar.set_style(
        ProgressStyle::with_template(&template).expect("Could not create progress bar style!"),
    );
}

fn main() {
    // Create a cli
    let matches = Command::new("great_sort_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to the file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    // Parse the cli
    let config_path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );

        make_template_config(&config_path);
        log::info!("Done.");
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("MIDAS Path: {}", config.midas_path.to_string_lossy());
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    log::info!(
        "Settings Path: {}",
        config
            .settings_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("default"))
    );
    log::info!(
        "Calibration Path: {}",
        config
            .calibration_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("default"))
    );
    log::info!(
        "First Run: {} Last Run: {}",
        config.first_run_number,
        config.last_run_number
    );

    if !config.is_n_threads_valid() {
        log::error!("Number of threads must be at least 1!");
        return;
    }

    // One worker per non-empty run subset
    let subsets = create_subsets(&config);
    let (tx, rx) = channel::<WorkerStatus>();
    let mut handles = Vec::new();
    for (worker_id, subset) in subsets.into_iter().enumerate() {
        if subset.is_empty() {
            continue;
        }
        let worker_config = config.clone();
        let worker_tx = tx.clone();
        handles.push(std::thread::spawn(move || {
            process_subset(worker_config, worker_tx, worker_id, subset)
        }));
    }
    // The receive loop below ends once every worker has hung up
    drop(tx);

    let mut bars: HashMap<usize, ProgressBar> = HashMap::new();
    let mut bar_states: HashMap<usize, (i32, std::mem::Discriminant<BarColor>)> = HashMap::new();
    while let Ok(status) = rx.recv() {
        let bar = bars
            .entry(status.worker_id)
            .or_insert_with(|| pb_manager.add(ProgressBar::new(100)));
        let state = (status.run_number, std::mem::discriminant(&status.color));
        if bar_states.get(&status.worker_id) != Some(&state) {
            style_bar(bar, status.run_number, &status.color);
            bar_states.insert(status.worker_id, state);
        }
        bar.set_position((status.progress * 100.0) as u64);
    }

    for handle in handles {
        match handle.join() {
            Ok(Ok(_)) => (),
            Ok(Err(e)) => log::error!("Sorting failed with error: {e}"),
            Err(_) => log::error!("Failed to join sorting task!"),
        }
    }

    for bar in bars.values() {
        bar.finish();
    }

    log::info!("Done.");
}
