//! Accuracy comparison of generated JSONL files against expected ones.
//!
//! Two records match when their `code` and `value`, both coerced to
//! integers, are equal; `unit` and every other field are ignored. A field
//! that is absent counts as `0`. A value that cannot be coerced (null,
//! array, object, non-numeric string) never matches anything.
//!
//! ## Output Files
//!
//! Both are truncated at the start of a run and appended to per file:
//!
//! * `matches.jsonl`: `{"filename", "generated", "expected"}` per match
//! * `accuracy.txt`: `<filename>: <pct>%` per compared file

use crate::error::ExtractError;
use crate::pipeline::jsonl::read_jsonl;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// How expected records are paired with generated ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStrategy {
    /// Each expected record takes the first equal generated record; a
    /// generated record may be taken many times.
    #[default]
    FirstMatch,
    /// Each generated record is taken at most once; the earliest unused
    /// equal record wins.
    OneToOne,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchStrategy::FirstMatch => "first-match",
            MatchStrategy::OneToOne => "one-to-one",
        })
    }
}

/// A (generated, expected) pair judged equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMatch {
    pub generated: Value,
    pub expected: Value,
}

/// Comparison result for one file name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileComparison {
    pub filename: String,
    pub matches: Vec<RecordMatch>,
    pub total_expected: usize,
    pub total_generated: usize,
}

impl FileComparison {
    /// Matched expected records as a percentage; `0.0` when nothing was expected.
    pub fn accuracy(&self) -> f64 {
        if self.total_expected == 0 {
            0.0
        } else {
            self.matches.len() as f64 / self.total_expected as f64 * 100.0
        }
    }

    /// The line written to `accuracy.txt`.
    pub fn accuracy_line(&self) -> String {
        format!("{}: {:.2}%", self.filename, self.accuracy())
    }
}

/// Where to read from and write to.
#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub generated_dir: PathBuf,
    pub expected_dir: PathBuf,
    pub matches_path: PathBuf,
    pub accuracy_path: PathBuf,
    pub strategy: MatchStrategy,
}

impl CompareOptions {
    /// Outputs go to `matches.jsonl` and `accuracy.txt` in the working directory.
    pub fn new(generated_dir: impl Into<PathBuf>, expected_dir: impl Into<PathBuf>) -> Self {
        Self {
            generated_dir: generated_dir.into(),
            expected_dir: expected_dir.into(),
            matches_path: PathBuf::from("matches.jsonl"),
            accuracy_path: PathBuf::from("accuracy.txt"),
            strategy: MatchStrategy::default(),
        }
    }
}

/// Everything a directory comparison produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub files: Vec<FileComparison>,
    /// Expected files with no generated counterpart.
    pub missing: Vec<String>,
    /// Files that could not be read or parsed, with the reason.
    pub failed: Vec<(String, String)>,
}

impl ComparisonReport {
    /// Matched over expected across every compared file.
    pub fn overall_accuracy(&self) -> f64 {
        let expected: usize = self.files.iter().map(|f| f.total_expected).sum();
        let matched: usize = self.files.iter().map(|f| f.matches.len()).sum();
        if expected == 0 {
            0.0
        } else {
            matched as f64 / expected as f64 * 100.0
        }
    }
}

/// Coerce a JSON value to an integer the way the comparison needs.
///
/// Integers pass through (the full `u64` range included), floats truncate
/// toward zero, booleans become 0/1 and strings are trimmed and parsed in
/// base 10.
pub fn coerce_int(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.trunc().abs() < i128::MAX as f64)
                    .map(|f| f.trunc() as i128)
            }),
        Value::Bool(b) => Some(i128::from(*b)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn field_int(record: &Value, field: &str) -> Option<i128> {
    match record.get(field) {
        None => Some(0),
        Some(v) => coerce_int(v),
    }
}

/// Loose equality on integer-coerced `code` and `value`.
pub fn records_match(generated: &Value, expected: &Value) -> bool {
    let pair = |r: &Value| Some((field_int(r, "code")?, field_int(r, "value")?));
    match (pair(generated), pair(expected)) {
        (Some(g), Some(e)) => g == e,
        _ => false,
    }
}

/// Pair expected records with generated ones.
pub fn match_records(
    generated: &[Value],
    expected: &[Value],
    strategy: MatchStrategy,
) -> Vec<RecordMatch> {
    let mut used = vec![false; generated.len()];
    let mut matches = Vec::new();
    for exp in expected {
        let hit = generated.iter().enumerate().position(|(i, candidate)| {
            (strategy == MatchStrategy::FirstMatch || !used[i]) && records_match(candidate, exp)
        });
        if let Some(i) = hit {
            used[i] = true;
            matches.push(RecordMatch {
                generated: generated[i].clone(),
                expected: exp.clone(),
            });
        }
    }
    matches
}

/// Compare one generated file against one expected file.
pub fn compare_files(
    filename: &str,
    generated_path: &Path,
    expected_path: &Path,
    strategy: MatchStrategy,
) -> Result<FileComparison, ExtractError> {
    let generated: Vec<Value> = read_jsonl(generated_path)?;
    let expected: Vec<Value> = read_jsonl(expected_path)?;
    let matches = match_records(&generated, &expected, strategy);
    Ok(FileComparison {
        filename: filename.to_string(),
        matches,
        total_expected: expected.len(),
        total_generated: generated.len(),
    })
}

/// Compare every `.jsonl` file of the expected directory with its
/// same-named generated file.
///
/// # Errors
/// The expected directory cannot be listed, or an output file cannot be
/// written. Per-file problems are recorded in the report instead.
pub fn compare_directories(options: &CompareOptions) -> Result<ComparisonReport, ExtractError> {
    let names = list_jsonl(&options.expected_dir)?;
    info!(
        "Comparing {} expected files ({} strategy)",
        names.len(),
        options.strategy
    );

    let mut matches_out = create_output(&options.matches_path)?;
    let mut accuracy_out = create_output(&options.accuracy_path)?;
    let mut report = ComparisonReport::default();

    for name in names {
        let generated_path = options.generated_dir.join(&name);
        if !generated_path.is_file() {
            warn!(
                "File {} not found in {}",
                name,
                options.generated_dir.display()
            );
            report.missing.push(name);
            continue;
        }

        let expected_path = options.expected_dir.join(&name);
        let comparison =
            match compare_files(&name, &generated_path, &expected_path, options.strategy) {
                Ok(c) => c,
                Err(e) => {
                    error!("Skipping {}: {}", name, e);
                    report.failed.push((name, e.to_string()));
                    continue;
                }
            };

        for m in &comparison.matches {
            let line = json!({
                "filename": comparison.filename,
                "generated": m.generated,
                "expected": m.expected,
            });
            writeln!(matches_out, "{line}").map_err(|e| write_failed(&options.matches_path, e))?;
        }
        writeln!(accuracy_out, "{}", comparison.accuracy_line())
            .map_err(|e| write_failed(&options.accuracy_path, e))?;
        info!(
            "{}: {}/{} matched",
            name,
            comparison.matches.len(),
            comparison.total_expected
        );
        report.files.push(comparison);
    }

    matches_out
        .flush()
        .map_err(|e| write_failed(&options.matches_path, e))?;
    accuracy_out
        .flush()
        .map_err(|e| write_failed(&options.accuracy_path, e))?;
    Ok(report)
}

fn list_jsonl(dir: &Path) -> Result<Vec<String>, ExtractError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ExtractError::from_read(dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ExtractError::from_read(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".jsonl") && entry.path().is_file() {
            names.push(name);
        }
    }
    names.sort();
    debug!("{} .jsonl files in {}", names.len(), dir.display());
    Ok(names)
}

fn create_output(path: &Path) -> Result<BufWriter<File>, ExtractError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| write_failed(path, e))?;
    }
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| write_failed(path, e))
}

fn write_failed(path: &Path, source: std::io::Error) -> ExtractError {
    ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    }
}
