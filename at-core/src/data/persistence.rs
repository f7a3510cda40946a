//! CSV persistence for sweep results
//!
//! One row per trial, written in the order the trials ran.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::paths;
use crate::data::types::{CandidateConfig, OutcomeTag, TrialResult};
use crate::error::{Result, TuneError};

/// On-disk row layout
#[derive(Debug, Serialize, Deserialize)]
struct ResultRow {
    timestamp: String,
    frequency_mhz: u32,
    core_voltage_mv: u32,
    hashrate_ghs: f64,
    temperature_c: f64,
    power_w: f64,
    stable: String,
    coefficient_of_variation: f64,
    outcome_tag: String,
}

impl From<&TrialResult> for ResultRow {
    fn from(r: &TrialResult) -> Self {
        Self {
            timestamp: r.timestamp.to_rfc3339(),
            frequency_mhz: r.candidate.frequency_mhz,
            core_voltage_mv: r.candidate.core_voltage_mv,
            hashrate_ghs: r.mean_hashrate_ghs,
            temperature_c: r.temperature_c,
            power_w: r.power_w,
            stable: r.stable.to_string(),
            coefficient_of_variation: r.coefficient_of_variation,
            outcome_tag: r.outcome.to_string(),
        }
    }
}

impl ResultRow {
    fn into_result(self, path: &Path, line: usize) -> Result<TrialResult> {
        let malformed = |reason: String| TuneError::ResultsFile {
            path: path.to_path_buf(),
            reason: format!("row {}: {}", line, reason),
        };

        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|t| t.with_timezone(&Local))
            .map_err(|e| malformed(format!("bad timestamp '{}': {}", self.timestamp, e)))?;
        let stable = parse_flag(&self.stable)
            .ok_or_else(|| malformed(format!("bad stable flag '{}'", self.stable)))?;
        let outcome = parse_outcome(&self.outcome_tag)
            .ok_or_else(|| malformed(format!("unknown outcome '{}'", self.outcome_tag)))?;

        Ok(TrialResult {
            timestamp,
            candidate: CandidateConfig::new(self.frequency_mhz, self.core_voltage_mv),
            mean_hashrate_ghs: self.hashrate_ghs,
            coefficient_of_variation: self.coefficient_of_variation,
            temperature_c: self.temperature_c,
            power_w: self.power_w,
            stable,
            outcome,
        })
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_outcome(s: &str) -> Option<OutcomeTag> {
    let tag = match s.trim() {
        "stable_min_voltage" => OutcomeTag::StableMinVoltage,
        "stable" => OutcomeTag::Stable,
        "freq_limit_reached" => OutcomeTag::FreqLimitReached,
        "unstable" => OutcomeTag::Unstable,
        "insufficient_data" => OutcomeTag::InsufficientData,
        "safety_abort" => OutcomeTag::SafetyAbort,
        _ => return None,
    };
    Some(tag)
}

/// Timestamped results file name for a sweep finishing at `now`
pub fn results_file_name(now: DateTime<Local>) -> String {
    format!(
        "{}{}.csv",
        paths::RESULTS_PREFIX,
        now.format(paths::RESULTS_TIMESTAMP_FORMAT)
    )
}

/// Write results to an explicit path, replacing any existing file.
pub fn write_results(path: &Path, results: &[TrialResult]) -> Result<()> {
    let io_err = |e: std::io::Error| TuneError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    };
    let file = fs::File::create(path).map_err(io_err)?;
    let mut writer = csv::Writer::from_writer(file);

    for result in results {
        writer
            .serialize(ResultRow::from(result))
            .map_err(|e| TuneError::ResultsFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
    }
    writer.flush().map_err(io_err)?;
    debug!(path = %path.display(), rows = results.len(), "Wrote results");
    Ok(())
}

/// Save results under `dir` with a timestamped name and return the path.
///
/// An empty result set writes nothing and returns `None`.
pub fn save_results(dir: &Path, results: &[TrialResult]) -> Result<Option<PathBuf>> {
    if results.is_empty() {
        warn!("No results to save");
        return Ok(None);
    }
    fs::create_dir_all(dir).map_err(|e| TuneError::FileWrite {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let path = dir.join(results_file_name(Local::now()));
    write_results(&path, results)?;
    info!(path = %path.display(), rows = results.len(), "Results saved");
    Ok(Some(path))
}

/// Read a results file written by [`write_results`].
pub fn load_results(path: &Path) -> Result<Vec<TrialResult>> {
    let file = fs::File::open(path).map_err(|e| TuneError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = csv::Reader::from_reader(file);

    let mut results = Vec::new();
    for (i, row) in reader.deserialize::<ResultRow>().enumerate() {
        let row = row.map_err(|e| TuneError::ResultsFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        // Header is line 1
        results.push(row.into_result(path, i + 2)?);
    }
    debug!(path = %path.display(), rows = results.len(), "Loaded results");
    Ok(results)
}
