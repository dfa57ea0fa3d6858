//! Run-record persistence
//!
//! Every workflow run can be written to disk as one immutable JSON record
//! carrying a content hash, so past analyses are reloadable and checkable
//! for tampering.

use crate::error::Result;
use crate::models::{AnalysisRun, RunRecord};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Builds the run record and writes it under `dir`, creating the directory
/// if needed. Returns the path of the written file.
pub fn save_run(workflow: &str, result: &AnalysisRun, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let record = RunRecord {
        run_id: Uuid::new_v4(),
        workflow: workflow.to_string(),
        timestamp: Utc::now(),
        result: result.clone(),
        result_hash: compute_result_hash(result),
    };

    // Timestamp plus run-id prefix keeps concurrent saves from colliding.
    let file_name = format!(
        "{}_{}_{}.json",
        record.workflow,
        record.timestamp.format("%Y%m%d_%H%M%S"),
        &record.run_id.to_string()[..8]
    );
    let path = dir.join(file_name);
    fs::write(&path, serde_json::to_string_pretty(&record)?)?;

    info!(run_id = %record.run_id, path = %path.display(), "run record saved");
    Ok(path)
}

/// Reads a previously saved run record back from disk.
pub fn load_run(path: &Path) -> Result<RunRecord> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Recomputes the result hash and compares it against the stored one.
pub fn verify_run_record(record: &RunRecord) -> bool {
    compute_result_hash(&record.result) == record.result_hash
}

/// Compute SHA256 hash of a run for integrity verification
/// Uses zero-copy streaming serialization into hasher
pub fn compute_result_hash(result: &AnalysisRun) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), result).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerValue, OutputRecord, StepRecord};

    fn sample_run() -> AnalysisRun {
        AnalysisRun {
            task: "What is the quick ratio?".to_string(),
            steps: vec![StepRecord {
                handler: "calculator".to_string(),
                task: "divide quick assets by current liabilities".to_string(),
                output: OutputRecord::new(
                    "divided the figures",
                    None,
                    Some(AnswerValue::Text("0.69".to_string())),
                ),
            }],
            final_answer: "The quick ratio is 0.69.".to_string(),
        }
    }

    #[test]
    fn saved_record_is_readable_and_verified() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_run("amcor_quick_ratio", &sample_run(), dir.path()).unwrap();

        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("amcor_quick_ratio_"));
        assert!(file_name.ends_with(".json"));

        let record = load_run(&path).unwrap();
        assert_eq!(record.workflow, "amcor_quick_ratio");
        assert_eq!(record.result.final_answer, "The quick ratio is 0.69.");
        assert!(verify_run_record(&record));
    }

    #[test]
    fn tampering_breaks_verification() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_run("amcor_quick_ratio", &sample_run(), dir.path()).unwrap();

        let mut record = load_run(&path).unwrap();
        record.result.final_answer = "The quick ratio is 9.99.".to_string();
        assert!(!verify_run_record(&record));
    }

    #[test]
    fn equal_runs_hash_identically() {
        assert_eq!(
            compute_result_hash(&sample_run()),
            compute_result_hash(&sample_run())
        );
    }
}
