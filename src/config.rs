//! The typed settings record for a campaign, loaded from a YAML file.
//!
//! Field names follow the original key names (`CampaignName`, `Parser`, ...)
//! via `#[serde(rename = ...)]` so campaign YAML files stay close to the
//! reference implementation's configuration module, while the Rust-side
//! field names stay idiomatic `snake_case`.
use crate::error::CampaignError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn default_timeout() -> u64 {
    20
}

fn default_keep_generations() -> bool {
    false
}

/// Flat, `serde`-deserializable settings record. See SPEC_FULL.md §6.1.
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    #[serde(rename = "CampaignName")]
    pub campaign_name: String,

    #[serde(rename = "Parser")]
    pub parser: String,

    #[serde(rename = "InitialPopulation")]
    pub initial_population: PathBuf,

    #[serde(rename = "FitnessAlgorithms")]
    pub fitness_algorithms: HashMap<String, f64>,

    #[serde(rename = "Recombinators")]
    pub recombinators: Vec<String>,

    #[serde(rename = "Mutators")]
    pub mutators: Vec<String>,

    #[serde(rename = "Disassembler")]
    pub disassembler: String,

    #[serde(rename = "DisassemblerPath")]
    pub disassembler_path: PathBuf,

    #[serde(rename = "KeepGenerations", default = "default_keep_generations")]
    pub keep_generations: bool,

    #[serde(rename = "Timeout", default = "default_timeout")]
    pub timeout: u64,

    #[serde(rename = "Command")]
    pub command: String,

    #[serde(rename = "Whitelist")]
    pub whitelist: Vec<PathBuf>,

    #[serde(rename = "ChromosomeShared", default)]
    pub chromosome_shared: Option<PathBuf>,
}

impl Configuration {
    /// Loads and validates a configuration record from a YAML file.
    pub fn load(path: &Path) -> Result<Self, CampaignError> {
        if !path.exists() {
            return Err(CampaignError::Configuration(format!(
                "configuration file does not exist: {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        let config: Configuration = serde_yaml::from_str(&text)
            .map_err(|e| CampaignError::Configuration(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CampaignError> {
        if !self.initial_population.exists() {
            return Err(CampaignError::Configuration(format!(
                "InitialPopulation directory does not exist: {}",
                self.initial_population.display()
            )));
        }
        if !self.disassembler_path.exists() {
            return Err(CampaignError::Configuration(format!(
                "DisassemblerPath does not exist: {}",
                self.disassembler_path.display()
            )));
        }
        if self.recombinators.is_empty() {
            return Err(CampaignError::Configuration(
                "Recombinators must name at least one recombinator".to_string(),
            ));
        }
        if self.mutators.is_empty() {
            return Err(CampaignError::Configuration(
                "Mutators must name at least one mutator".to_string(),
            ));
        }
        if self.fitness_algorithms.is_empty() {
            return Err(CampaignError::Configuration(
                "FitnessAlgorithms must name at least one metric".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_yaml(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("campaign.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn rejects_missing_file() {
        let err = Configuration::load(Path::new("/nonexistent/campaign.yaml")).unwrap_err();
        assert!(matches!(err, CampaignError::Configuration(_)));
    }

    #[test]
    fn loads_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let seeds = dir.path().join("seeds");
        std::fs::create_dir(&seeds).unwrap();
        let disasm = dir.path().join("disasm");
        std::fs::write(&disasm, b"").unwrap();

        let yaml = format!(
            r#"
CampaignName: test
Parser: chunked
InitialPopulation: {seeds}
FitnessAlgorithms:
  BasicBlockCoverage: 1.0
Recombinators:
  - Null
Mutators:
  - Null
Disassembler: dummy
DisassemblerPath: {disasm}
Command: "target %s"
Whitelist: []
"#,
            seeds = seeds.display(),
            disasm = disasm.display(),
        );
        let path = write_yaml(dir.path(), &yaml);
        let config = Configuration::load(&path).unwrap();
        assert_eq!(config.campaign_name, "test");
        assert_eq!(config.timeout, 20);
        assert!(!config.keep_generations);
    }
}
