//! # great_sort
//!
//! great_sort is the sort engine for GREAT-style spectrometer data, written in Rust. It
//! takes MIDAS tape-server files produced by CAEN digitizer modules (V1725/V1730 with
//! PSD or PHA firmware), decodes the 64-bit word stream into hits, time sorts the hits
//! across all modules and builds physics events by coincidence window, with TAC, CeBr3
//! and HPGe detector finders.
//!
//! ## Installation
//!
//! In the future we may deploy to crates.io, but currently the only method of install is
//! from source, which is laid out below.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### Building & Install
//!
//! To build and install the CLI sorter use `cargo install --path ./great_sort_cli` from
//! the top level great_sort repository.
//!
//! The binary will be installed to your cargo install location (typically something
//! like `~/.cargo/bin/`). It can be uninstalled by running
//! `cargo uninstall great_sort_cli`. Once installed it will be in your path, so you can
//! simply invoke it from the command line.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! midas_path: None
//! output_path: None
//! settings_path: null
//! calibration_path: null
//! first_run_number: 0
//! last_run_number: 0
//! start_block: 0
//! end_block: null
//! n_threads: 1
//! ```
//!
//! - `midas_path`: directory holding the MIDAS run files (`R<run>.bin`)
//! - `output_path`: directory to which run summaries are written
//! - `settings_path`: optional experiment layout file; `null` uses the default layout
//! - `calibration_path`: optional per-channel calibration file; `null` leaves energies
//!   as raw ADC values
//! - `first_run_number`/`last_run_number`: the inclusive run range to sort
//! - `start_block`/`end_block`: limit the conversion to a block range of each file,
//!   `end_block: null` reads to the end
//! - `n_threads`: the number of parallel worker threads to divide the runs amongst.
//!   Each worker gets a subset of the run range. Must be at least 1.
//!
//! ### Settings Format
//!
//! The settings file describes the experiment layout: the CAEN modules with their
//! firmware, the info codes, the event building windows and the detector channel maps.
//! See [`settings::Settings`] for the full field list. A minimal example:
//!
//! ```yml
//! n_caen_modules: 2
//! n_caen_channels: 16
//! modules:
//!   - { model: 1725, firmware: Psd }
//!   - { model: 1725, firmware: Pha }
//! event_window: 3000.0
//! tacs:
//!   - { module: 0, channel: 14 }
//! cebr3:
//!   - { module: 0, channel: 0 }
//!   - { module: 0, channel: 1 }
//! hpge:
//!   - segments:
//!       - { module: 1, channel: 0 }   # core
//!       - { module: 1, channel: 1 }   # segment 1
//! ```
//!
//! ### Calibration Format
//!
//! The calibration file is a list of per-channel entries; unlisted channels keep
//! defaults (energy passthrough, zero threshold and time offset):
//!
//! ```yml
//! - module: 0
//!   channel: 0
//!   offset: 1.2
//!   gain: 0.753
//!   gain_quadr: 0.0
//!   threshold: 120
//!   time_offset: -14.0
//!   energy_type: Qlong
//! ```
//!
//! ## Output
//!
//! great_sort writes one YAML summary per run (`R<run>_events.yml`) with the block,
//! packet and event counts plus per-module hit, drop and live time statistics. Detailed
//! status of each run is logged while sorting; if an error occurs the log will contain
//! the issue that occurred.
pub mod block;
pub mod calibration;
pub mod config;
pub mod constants;
pub mod converter;
pub mod data_packets;
pub mod error;
pub mod event;
pub mod event_builder;
pub mod histogram;
pub mod process;
pub mod settings;
pub mod sink;
pub mod worker_status;
