use std::path::PathBuf;
use thiserror::Error;

use super::constants::*;
use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, Error)]
pub enum BlockError {
    #[error("Block {0} is too short: {1} bytes given, expected at least {size}", size=HEADER_SIZE)]
    ShortBlock(u64, usize),
    #[error("Block {0} does not start with the EBYEDATA marker")]
    BadMagic(u64),
    #[error("Block {0} has no terminator and no declared length boundary")]
    Unterminated(u64),
}

#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("Converter failed due to block error: {0}")]
    BadBlock(#[from] BlockError),
    #[error("Could not open input because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Converter failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load settings as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Settings failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Settings failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Failed to load calibration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Calibration failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Calibration failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Run file {0:?} does not exist")]
    BadRunPath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Converter error: {0}")]
    ConverterError(#[from] ConverterError),
    #[error("Processor failed due to Settings error: {0}")]
    SettingsError(#[from] SettingsError),
    #[error("Processor failed due to Calibration error: {0}")]
    CalibrationError(#[from] CalibrationError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed to write summary YAML: {0}")]
    SummaryError(#[from] serde_yaml::Error),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
