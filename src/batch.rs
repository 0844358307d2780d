//! Regression tables over saved expression trees.
//!
//! Value tables hold `file,x,expected,tol` rows: the tree in `file` is
//! evaluated with `x` bound and must land within `tol` of `expected`.
//! Error tables hold `file,x,expected_error` rows: evaluation must fail with
//! a message containing `expected_error`. In both, `#` starts a comment and a
//! first row starting with `file` is a header. Relative paths are resolved
//! against the working directory.

use std::fmt;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::{BatchError, EvalError, JsonError};
use crate::{Bindings, Expression};

#[derive(Clone, Debug, PartialEq)]
pub struct ValueCase {
    pub line: u64,
    pub file: PathBuf,
    pub x: f64,
    pub expected: f64,
    pub tol: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ErrorCase {
    pub line: u64,
    pub file: PathBuf,
    pub x: f64,
    pub expected_error: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    Ng,
    Err,
}

/// Outcome of one row, printable as a report line.
#[derive(Clone, Debug, PartialEq)]
pub struct Verdict {
    pub status: Status,
    pub line: u64,
    pub file: PathBuf,
    pub detail: String,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.status == Status::Ok
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.status {
            Status::Ok => "OK",
            Status::Ng => "NG",
            Status::Err => "ERR",
        };
        write!(
            f,
            "[{tag}] line={} file={} {}",
            self.line,
            self.file.display(),
            self.detail
        )
    }
}

/// Pass/fail counts over a table. `Err` rows count as failures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub ok: usize,
    pub ng: usize,
}

impl Summary {
    pub fn tally<'a>(verdicts: impl IntoIterator<Item = &'a Verdict>) -> Self {
        let mut summary = Self::default();
        for verdict in verdicts {
            if verdict.passed() {
                summary.ok += 1;
            } else {
                summary.ng += 1;
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.ok + self.ng
    }

    pub fn all_passed(&self) -> bool {
        self.ng == 0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RESULT: ok={} ng={} total={}",
            self.ok,
            self.ng,
            self.total()
        )
    }
}

#[derive(thiserror::Error, Debug)]
enum CaseError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] JsonError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

fn evaluate_file(file: &Path, x: f64) -> Result<f64, CaseError> {
    let json = std::fs::read_to_string(file).map_err(|source| CaseError::Io {
        path: file.display().to_string(),
        source,
    })?;
    let tree = Expression::from_json(&json)?;
    Ok(tree.evaluate(&Bindings::new().with('x', x))?)
}

impl ValueCase {
    pub fn run(&self) -> Verdict {
        let (status, detail) = match evaluate_file(&self.file, self.x) {
            Ok(actual) => {
                let diff = (actual - self.expected).abs();
                if diff <= self.tol {
                    (
                        Status::Ok,
                        format!(
                            "x={} actual={actual:.15} expected={:.15} tol={}",
                            self.x, self.expected, self.tol
                        ),
                    )
                } else {
                    (
                        Status::Ng,
                        format!(
                            "x={} actual={actual:.15} expected={:.15} tol={} diff={diff}",
                            self.x, self.expected, self.tol
                        ),
                    )
                }
            }
            Err(err) => (Status::Err, format!(": {err}")),
        };
        Verdict {
            status,
            line: self.line,
            file: self.file.clone(),
            detail,
        }
    }
}

impl ErrorCase {
    pub fn run(&self) -> Verdict {
        let (status, detail) = match evaluate_file(&self.file, self.x) {
            Ok(actual) => (
                Status::Ng,
                format!(
                    "x={} : expected error '{}' but got result={actual:.15}",
                    self.x, self.expected_error
                ),
            ),
            Err(err) => {
                let message = err.to_string();
                if message.contains(&self.expected_error) {
                    (
                        Status::Ok,
                        format!("x={} : got expected error '{}'", self.x, self.expected_error),
                    )
                } else {
                    (
                        Status::Ng,
                        format!(
                            "x={} : expected error '{}' but got '{message}'",
                            self.x, self.expected_error
                        ),
                    )
                }
            }
        };
        Verdict {
            status,
            line: self.line,
            file: self.file.clone(),
            detail,
        }
    }
}

/// Data rows of a table with their 1-based line numbers.
fn rows(path: &Path, columns: usize) -> Result<Vec<(u64, StringRecord)>, BatchError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());
        let first = record.get(0).unwrap_or_default();
        if index == 0 && first.to_ascii_lowercase().starts_with("file") {
            continue;
        }
        if record.iter().all(str::is_empty) {
            continue;
        }
        if record.len() < columns {
            return Err(BatchError::Row {
                line,
                message: format!("expected {columns} columns, found {}", record.len()),
            });
        }
        rows.push((line, record));
    }
    Ok(rows)
}

fn number(record: &StringRecord, column: usize, line: u64) -> Result<f64, BatchError> {
    let field = record.get(column).unwrap_or_default();
    field.parse().map_err(|_| BatchError::Row {
        line,
        message: format!("column {} is not a number: '{field}'", column + 1),
    })
}

pub fn read_value_cases(path: &Path) -> Result<Vec<ValueCase>, BatchError> {
    rows(path, 4)?
        .into_iter()
        .map(|(line, record)| {
            Ok(ValueCase {
                line,
                file: PathBuf::from(record.get(0).unwrap_or_default()),
                x: number(&record, 1, line)?,
                expected: number(&record, 2, line)?,
                tol: number(&record, 3, line)?,
            })
        })
        .collect()
}

pub fn read_error_cases(path: &Path) -> Result<Vec<ErrorCase>, BatchError> {
    rows(path, 3)?
        .into_iter()
        .map(|(line, record)| {
            Ok(ErrorCase {
                line,
                file: PathBuf::from(record.get(0).unwrap_or_default()),
                x: number(&record, 1, line)?,
                expected_error: record.get(2).unwrap_or_default().to_string(),
            })
        })
        .collect()
}
