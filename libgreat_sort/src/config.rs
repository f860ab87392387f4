use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;

/// Structure representing the application configuration. Contains pathing and run information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub midas_path: PathBuf,
    pub output_path: PathBuf,
    pub settings_path: Option<PathBuf>,
    pub calibration_path: Option<PathBuf>,
    pub first_run_number: i32,
    pub last_run_number: i32,
    pub start_block: u64,
    pub end_block: Option<u64>,
    pub n_threads: i32,
}

impl Default for Config {
    /// Generate a new Config object. All fields will be empty/invalid
    fn default() -> Self {
        Self {
            midas_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            settings_path: None,
            calibration_path: None,
            first_run_number: 0,
            last_run_number: 0,
            start_block: 0,
            end_block: None,
            n_threads: 1,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Check if a specific run exists by evaluating the existance of its MIDAS file
    pub fn does_run_exist(&self, run_number: i32) -> bool {
        self.midas_path
            .join(format!("{}.bin", self.get_run_str(run_number)))
            .exists()
    }

    /// Get the path to the MIDAS file of a run
    pub fn get_run_file(&self, run_number: i32) -> Result<PathBuf, ConfigError> {
        let run_file: PathBuf = self
            .midas_path
            .join(format!("{}.bin", self.get_run_str(run_number)));
        if run_file.exists() {
            Ok(run_file)
        } else {
            Err(ConfigError::BadRunPath(run_file))
        }
    }

    /// Get the path to the output run summary file
    pub fn get_summary_file_name(&self, run_number: i32) -> Result<PathBuf, ConfigError> {
        let summary_path: PathBuf = self
            .output_path
            .join(format!("{}_events.yml", self.get_run_str(run_number)));
        if self.output_path.exists() {
            Ok(summary_path)
        } else {
            Err(ConfigError::BadFilePath(self.output_path.clone()))
        }
    }

    /// Construct the run string using the GREAT DAQ format
    fn get_run_str(&self, run_number: i32) -> String {
        format!("R{run_number}")
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_yaml_roundtrip() {
        let config = Config {
            midas_path: PathBuf::from("/data/midas"),
            first_run_number: 4,
            last_run_number: 7,
            n_threads: 2,
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.midas_path, config.midas_path);
        assert_eq!(back.first_run_number, 4);
        assert_eq!(back.last_run_number, 7);
        assert_eq!(back.end_block, None);
    }

    #[test]
    fn test_config_missing_file() {
        let result = Config::read_config_file(Path::new("/nonexistent/config.yml"));
        assert!(matches!(result, Err(ConfigError::BadFilePath(_))));
    }
}
