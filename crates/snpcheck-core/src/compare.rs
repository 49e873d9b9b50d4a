use crate::domain::HarnessError;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIDENCE_EPSILON: f64 = 1e-5;

// Wide on purpose: a cluster model that is read back and rewritten picks up
// round-off that is not a regression.
pub const CLUSTER_EPSILON: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Mismatch,
    Structural,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    fn warning(line: usize, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            line: Some(line),
            message: message.into(),
        }
    }

    fn mismatch(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Mismatch,
            line,
            message: message.into(),
        }
    }

    fn structural(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Structural,
            line,
            message: message.into(),
        }
    }

    pub const fn fails_comparison(&self) -> bool {
        !matches!(self.severity, Severity::Warning)
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Mismatch => "mismatch",
            Severity::Structural => "structural",
        };
        match self.line {
            Some(line) => write!(f, "{} (line {}): {}", severity, line, self.message),
            None => write!(f, "{}: {}", severity, self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub metrics: ComparisonMetrics,
}

impl Verdict {
    fn from_scan(diagnostics: Vec<Diagnostic>, metrics: ComparisonMetrics) -> Self {
        let passed = !diagnostics.iter().any(Diagnostic::fails_comparison);
        Self {
            passed,
            diagnostics,
            metrics,
        }
    }

    pub fn failing_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.fails_comparison())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComparisonMetrics {
    ExactText {
        expected_bytes: usize,
        actual_bytes: usize,
        first_mismatch_offset: Option<usize>,
    },
    NumericMatrix {
        rows_compared: usize,
        values_compared: usize,
        mismatched_values: usize,
        max_abs_diff: f64,
        epsilon: f64,
    },
    ClusterSet {
        clusters_compared: usize,
        values_compared: usize,
        mismatched_values: usize,
        name_mismatches: usize,
        max_abs_diff: f64,
        epsilon: f64,
    },
}

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("'{path}' is not valid UTF-8: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("'{path}' line {line}, token {token_index} ('{token}') is not a valid number")]
    NumericParse {
        path: PathBuf,
        line: usize,
        token_index: usize,
        token: String,
    },
}

impl From<CompareError> for HarnessError {
    fn from(error: CompareError) -> Self {
        let message = error.to_string();
        match error {
            CompareError::Read { .. } => HarnessError::io_system("IO.COMPARE_READ", message),
            CompareError::Decode { .. } | CompareError::NumericParse { .. } => {
                HarnessError::engine("RUN.COMPARE_PARSE", message)
            }
        }
    }
}

pub fn compare_calls(expected: &Path, actual: &Path) -> Result<Verdict, CompareError> {
    let expected_bytes = read_bytes(expected)?;
    let actual_bytes = read_bytes(actual)?;
    let first_mismatch_offset = first_mismatch_offset(&expected_bytes, &actual_bytes);

    let mut diagnostics = Vec::new();
    if let Some(offset) = first_mismatch_offset {
        diagnostics.push(Diagnostic::mismatch(
            None,
            format!(
                "calls differ at byte {} (expected file is {} bytes, actual file is {} bytes)",
                offset,
                expected_bytes.len(),
                actual_bytes.len()
            ),
        ));
    }

    Ok(Verdict::from_scan(
        diagnostics,
        ComparisonMetrics::ExactText {
            expected_bytes: expected_bytes.len(),
            actual_bytes: actual_bytes.len(),
            first_mismatch_offset,
        },
    ))
}

pub fn compare_confidences(
    expected: &Path,
    actual: &Path,
    epsilon: f64,
) -> Result<Verdict, CompareError> {
    let expected_text = read_utf8(expected)?;
    let actual_text = read_utf8(actual)?;
    let expected_lines: Vec<&str> = expected_text.lines().collect();
    let actual_lines: Vec<&str> = actual_text.lines().collect();

    let mut diagnostics = Vec::new();
    let mut rows_compared = 0usize;
    let mut scan = ValueScan::new(epsilon);

    let empty_metrics = ComparisonMetrics::NumericMatrix {
        rows_compared: 0,
        values_compared: 0,
        mismatched_values: 0,
        max_abs_diff: 0.0,
        epsilon,
    };

    match (expected_lines.first(), actual_lines.first()) {
        (Some(expected_header), Some(actual_header)) => {
            if expected_header != actual_header {
                diagnostics.push(Diagnostic::structural(
                    Some(1),
                    format!(
                        "header mismatch: expected '{}', actual '{}'",
                        expected_header, actual_header
                    ),
                ));
                return Ok(Verdict::from_scan(diagnostics, empty_metrics));
            }
        }
        _ => {
            diagnostics.push(Diagnostic::structural(
                Some(1),
                "missing header line in expected and/or actual file".to_string(),
            ));
            return Ok(Verdict::from_scan(diagnostics, empty_metrics));
        }
    }

    let expected_rows = &expected_lines[1..];
    let actual_rows = &actual_lines[1..];
    if expected_rows.len() != actual_rows.len() {
        diagnostics.push(Diagnostic::structural(
            None,
            format!(
                "row count mismatch: expected {} rows, actual {} rows",
                expected_rows.len(),
                actual_rows.len()
            ),
        ));
    }

    for (row_index, (expected_row, actual_row)) in
        expected_rows.iter().zip(actual_rows.iter()).enumerate()
    {
        let line_number = row_index + 2;
        let expected_values = parse_labeled_row(expected, line_number, expected_row)?;
        let actual_values = parse_labeled_row(actual, line_number, actual_row)?;

        if expected_values.len() != actual_values.len() {
            diagnostics.push(Diagnostic::structural(
                Some(line_number),
                format!(
                    "field count mismatch: expected {} values, actual {} values",
                    expected_values.len(),
                    actual_values.len()
                ),
            ));
        }

        rows_compared += 1;
        scan.scan_row(&expected_values, &actual_values, line_number, &mut diagnostics);
    }

    Ok(Verdict::from_scan(
        diagnostics,
        ComparisonMetrics::NumericMatrix {
            rows_compared,
            values_compared: scan.values_compared,
            mismatched_values: scan.mismatched_values,
            max_abs_diff: scan.max_abs_diff,
            epsilon,
        },
    ))
}

pub fn compare_clusters(
    expected: &Path,
    actual: &Path,
    epsilon: f64,
) -> Result<Verdict, CompareError> {
    let expected_text = read_utf8(expected)?;
    let actual_text = read_utf8(actual)?;
    let expected_lines: Vec<&str> = expected_text.lines().collect();
    let actual_lines: Vec<&str> = actual_text.lines().collect();

    let mut diagnostics = Vec::new();
    let mut clusters_compared = 0usize;
    let mut name_mismatches = 0usize;
    let mut scan = ValueScan::new(epsilon);

    if expected_lines.len() != actual_lines.len() {
        diagnostics.push(Diagnostic::structural(
            None,
            format!(
                "cluster count mismatch: expected {} lines, actual {} lines",
                expected_lines.len(),
                actual_lines.len()
            ),
        ));
    }

    for (line_index, (expected_line, actual_line)) in
        expected_lines.iter().zip(actual_lines.iter()).enumerate()
    {
        let line_number = line_index + 1;
        let (expected_name, expected_values) =
            parse_cluster_line(expected, line_number, expected_line)?;
        let (actual_name, actual_values) = parse_cluster_line(actual, line_number, actual_line)?;

        // Name drift is informative, not a verdict on correctness.
        if expected_name != actual_name {
            name_mismatches += 1;
            diagnostics.push(Diagnostic::warning(
                line_number,
                format!(
                    "cluster name mismatch: expected '{}', actual '{}'",
                    expected_name, actual_name
                ),
            ));
        }

        if expected_values.len() != actual_values.len() {
            diagnostics.push(Diagnostic::structural(
                Some(line_number),
                format!(
                    "parameter count mismatch: expected {} values, actual {} values",
                    expected_values.len(),
                    actual_values.len()
                ),
            ));
        }

        clusters_compared += 1;
        scan.scan_row(&expected_values, &actual_values, line_number, &mut diagnostics);
    }

    Ok(Verdict::from_scan(
        diagnostics,
        ComparisonMetrics::ClusterSet {
            clusters_compared,
            values_compared: scan.values_compared,
            mismatched_values: scan.mismatched_values,
            name_mismatches,
            max_abs_diff: scan.max_abs_diff,
            epsilon,
        },
    ))
}

// Threaded through every row so a single scan reports the full extent of
// divergence instead of the first symptom.
struct ValueScan {
    epsilon: f64,
    values_compared: usize,
    mismatched_values: usize,
    max_abs_diff: f64,
}

impl ValueScan {
    fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            values_compared: 0,
            mismatched_values: 0,
            max_abs_diff: 0.0,
        }
    }

    fn scan_row(
        &mut self,
        expected_values: &[f64],
        actual_values: &[f64],
        line_number: usize,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        for (value_index, (expected_value, actual_value)) in expected_values
            .iter()
            .zip(actual_values.iter())
            .enumerate()
        {
            let abs_diff = (expected_value - actual_value).abs();
            self.values_compared += 1;
            if abs_diff > self.max_abs_diff || abs_diff.is_nan() {
                self.max_abs_diff = abs_diff;
            }

            // Strictly greater than epsilon fails; a NaN delta always fails.
            if abs_diff > self.epsilon || abs_diff.is_nan() {
                self.mismatched_values += 1;
                diagnostics.push(Diagnostic::mismatch(
                    Some(line_number),
                    format!(
                        "value {} out of tolerance: expected {}, actual {}, |delta| {} > {}",
                        value_index + 1,
                        expected_value,
                        actual_value,
                        abs_diff,
                        self.epsilon
                    ),
                ));
            }
        }
    }
}

fn parse_labeled_row(path: &Path, line_number: usize, row: &str) -> Result<Vec<f64>, CompareError> {
    let mut values = Vec::new();
    for (token_index, token) in row.split_whitespace().enumerate().skip(1) {
        values.push(parse_value(path, line_number, token_index, token)?);
    }
    Ok(values)
}

fn parse_cluster_line<'a>(
    path: &Path,
    line_number: usize,
    line: &'a str,
) -> Result<(&'a str, Vec<f64>), CompareError> {
    let mut tokens = line.split_whitespace();
    let name = tokens.next().unwrap_or("");

    let mut values = Vec::new();
    let mut token_index = 1;
    for field in tokens {
        for group_token in field.split(';') {
            if group_token.is_empty() {
                continue;
            }
            token_index += 1;
            values.push(parse_value(path, line_number, token_index, group_token)?);
        }
    }
    Ok((name, values))
}

fn parse_value(
    path: &Path,
    line_number: usize,
    token_index: usize,
    token: &str,
) -> Result<f64, CompareError> {
    token
        .parse::<f64>()
        .map_err(|_| CompareError::NumericParse {
            path: path.to_path_buf(),
            line: line_number,
            token_index,
            token: token.to_string(),
        })
}

fn first_mismatch_offset(expected: &[u8], actual: &[u8]) -> Option<usize> {
    expected
        .iter()
        .zip(actual.iter())
        .position(|(expected_byte, actual_byte)| expected_byte != actual_byte)
        .or_else(|| (expected.len() != actual.len()).then_some(expected.len().min(actual.len())))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, CompareError> {
    fs::read(path).map_err(|source| CompareError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn read_utf8(path: &Path) -> Result<String, CompareError> {
    let bytes = read_bytes(path)?;
    String::from_utf8(bytes).map_err(|source| CompareError::Decode {
        path: path.to_path_buf(),
        source,
    })
}
