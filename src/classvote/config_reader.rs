use std::fs;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;
use snafu::prelude::*;

use crate::classvote::*;

/// The optional configuration file.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "databasePath")]
    pub database_path: Option<String>,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    /// Names used by `seed` instead of the built-in list.
    #[serde(rename = "sampleParents")]
    pub sample_parents: Option<Vec<String>>,
}

/// One entry of a simulation. A ballot without candidate is a skip.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ScriptBallot {
    pub voter: String,
    pub candidate: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SimulationScript {
    #[serde(rename = "className")]
    pub class_name: String,
    pub parents: Vec<String>,
    pub candidates: Vec<String>,
    pub ballots: Vec<ScriptBallot>,
    #[serde(rename = "endEarly")]
    pub end_early: Option<bool>,
}

fn read_json_file(path: &str) -> CliResult<String> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read content: {:?}", contents);
    Ok(contents)
}

pub fn read_config(path: &str) -> CliResult<AppConfig> {
    let contents = read_json_file(path)?;
    serde_json::from_str(&contents).context(ParsingJsonSnafu {})
}

pub fn read_script(path: &str) -> CliResult<SimulationScript> {
    let contents = read_json_file(path)?;
    serde_json::from_str(&contents).context(ParsingJsonSnafu {})
}

pub fn read_summary(path: &str) -> CliResult<JSValue> {
    let contents = read_json_file(path)?;
    serde_json::from_str(&contents).context(ParsingJsonSnafu {})
}
