use crate::compare::{
    CLUSTER_EPSILON, CONFIDENCE_EPSILON, Severity, Verdict, compare_calls, compare_clusters,
    compare_confidences,
};
use crate::domain::{HarnessError, HarnessResult};
use crate::runner::{EngineRunner, OutputKind, RunOutcome, ScenarioOutputs};
use crate::scenario::{Expectation, Scenario};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct SuiteConfig {
    pub engine_path: PathBuf,
    pub input_dir: PathBuf,
    pub expected_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub report_path: PathBuf,
    pub chrx_snp_list: String,
    pub special_snp_list: String,
    pub priors_text: String,
    pub confidence_epsilon: f64,
    pub cluster_epsilon: f64,
    pub failure_verbosity: i32,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::from("birdseed"),
            input_dir: PathBuf::from("fixtures/inputs"),
            expected_dir: PathBuf::from("fixtures/expected"),
            scratch_dir: PathBuf::from("scratch"),
            report_path: PathBuf::from("artifacts/suite-report.json"),
            chrx_snp_list: "BI_SNP.chrx".to_string(),
            special_snp_list: "BI_SNP.special_snps".to_string(),
            priors_text: "priors.txt".to_string(),
            confidence_epsilon: CONFIDENCE_EPSILON,
            cluster_epsilon: CLUSTER_EPSILON,
            failure_verbosity: 3,
        }
    }
}

impl SuiteConfig {
    fn runner(&self) -> EngineRunner {
        EngineRunner {
            engine: self.engine_path.clone(),
            input_dir: self.input_dir.clone(),
            expected_dir: self.expected_dir.clone(),
            chrx_snp_list: self.chrx_snp_list.clone(),
            special_snp_list: self.special_snp_list.clone(),
            priors_text: self.priors_text.clone(),
            failure_verbosity: self.failure_verbosity,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub generated_at_unix_seconds: u64,
    pub passed: bool,
    pub scenario_count: usize,
    pub passed_scenario_count: usize,
    pub failed_scenario_count: usize,
    pub scenarios: Vec<ScenarioReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub reason: Option<String>,
    pub comparisons: Vec<FileComparisonReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileComparisonReport {
    pub kind: OutputKind,
    pub expected_path: String,
    pub actual_path: String,
    pub verdict: Verdict,
}

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("failed to prepare scratch directory '{path}': {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create report directory '{path}': {source}")]
    ReportDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize suite report: {source}")]
    SerializeReport {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write suite report '{path}': {source}")]
    WriteReport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<SuiteError> for HarnessError {
    fn from(error: SuiteError) -> Self {
        let message = error.to_string();
        match error {
            SuiteError::Scratch { .. }
            | SuiteError::ReportDirectory { .. }
            | SuiteError::WriteReport { .. } => HarnessError::io_system("IO.SUITE_FILESYSTEM", message),
            SuiteError::SerializeReport { .. } => {
                HarnessError::internal("SYS.SUITE_REPORT", message)
            }
        }
    }
}

pub fn run_suite(config: &SuiteConfig, scenarios: &[Scenario]) -> HarnessResult<SuiteReport> {
    let runner = config.runner();
    let mut scenario_reports = Vec::with_capacity(scenarios.len());

    for scenario in scenarios {
        let scratch = config.scratch_dir.join(scenario.id());
        prepare_scratch(&scratch).map_err(HarnessError::from)?;

        // Scratch teardown must happen whether the scenario passed, failed,
        // or the harness itself errored mid-scenario.
        let outcome = run_scenario(config, &runner, scenario, &scratch);
        remove_scratch(&scratch);

        scenario_reports.push(outcome?);
    }

    let scenario_count = scenario_reports.len();
    let passed_scenario_count = scenario_reports
        .iter()
        .filter(|report| report.passed)
        .count();
    let failed_scenario_count = scenario_count.saturating_sub(passed_scenario_count);
    let passed = failed_scenario_count == 0;

    let report = SuiteReport {
        generated_at_unix_seconds: current_unix_timestamp_seconds(),
        passed,
        scenario_count,
        passed_scenario_count,
        failed_scenario_count,
        scenarios: scenario_reports,
    };

    write_report_file(&config.report_path, &report).map_err(HarnessError::from)?;
    info!(
        passed = report.passed,
        scenarios = report.scenario_count,
        failed = report.failed_scenario_count,
        "suite complete"
    );
    Ok(report)
}

pub fn render_human_summary(report: &SuiteReport) -> String {
    let mut lines = Vec::new();
    let status = if report.passed { "PASS" } else { "FAIL" };
    lines.push(format!("Suite status: {}", status));
    lines.push(format!(
        "Scenarios: {} total ({} passed, {} failed)",
        report.scenario_count, report.passed_scenario_count, report.failed_scenario_count
    ));

    for scenario in &report.scenarios {
        let scenario_status = if scenario.passed { "PASS" } else { "FAIL" };
        lines.push(format!("Scenario {}: {}", scenario.scenario, scenario_status));

        if !scenario.passed {
            if let Some(reason) = &scenario.reason {
                lines.push(format!("  reason: {}", reason));
            }
            if let Some(first_failure) = scenario
                .comparisons
                .iter()
                .flat_map(|comparison| comparison.verdict.failing_diagnostics())
                .next()
            {
                lines.push(format!("  first diagnostic: {}", first_failure));
            }
        }
    }

    lines.join("\n")
}

fn run_scenario(
    config: &SuiteConfig,
    runner: &EngineRunner,
    scenario: &Scenario,
    scratch: &Path,
) -> HarnessResult<ScenarioReport> {
    let outputs = ScenarioOutputs::in_dir(scratch, scenario);
    info!(scenario = %scenario.id(), "running engine");
    let outcome = runner.run(scenario, &outputs).map_err(HarnessError::from)?;

    match &scenario.expectation {
        Expectation::Success => judge_success(config, scenario, &outcome),
        Expectation::Failure { stderr_contains } => {
            Ok(judge_failure(scenario, &outcome, stderr_contains))
        }
    }
}

fn judge_success(
    config: &SuiteConfig,
    scenario: &Scenario,
    outcome: &RunOutcome,
) -> HarnessResult<ScenarioReport> {
    if !outcome.succeeded() {
        let reason = format!(
            "engine exited with {:?} where success was expected; stderr: {}",
            outcome.exit_code,
            outcome.stderr.trim()
        );
        error!(scenario = %scenario.id(), "{}", reason);
        return Ok(ScenarioReport {
            scenario: scenario.id(),
            passed: false,
            exit_code: outcome.exit_code,
            reason: Some(reason),
            comparisons: Vec::new(),
        });
    }

    let comparisons = vec![
        compare_output(
            scenario,
            OutputKind::Calls,
            &config.expected_dir.join(scenario.expected_calls_file()),
            outcome.outputs.path(OutputKind::Calls),
            |expected, actual| compare_calls(expected, actual),
        )?,
        compare_output(
            scenario,
            OutputKind::Clusters,
            &config.expected_dir.join(scenario.expected_clusters_file()),
            outcome.outputs.path(OutputKind::Clusters),
            |expected, actual| compare_clusters(expected, actual, config.cluster_epsilon),
        )?,
        compare_output(
            scenario,
            OutputKind::Confidences,
            &config
                .expected_dir
                .join(scenario.expected_confidences_file()),
            outcome.outputs.path(OutputKind::Confidences),
            |expected, actual| compare_confidences(expected, actual, config.confidence_epsilon),
        )?,
    ];

    let passed = comparisons
        .iter()
        .all(|comparison| comparison.verdict.passed);
    let reason = (!passed).then(|| {
        let failing: Vec<&str> = comparisons
            .iter()
            .filter(|comparison| !comparison.verdict.passed)
            .map(|comparison| comparison.expected_path.as_str())
            .collect();
        format!("golden comparison failed for: {}", failing.join(", "))
    });

    Ok(ScenarioReport {
        scenario: scenario.id(),
        passed,
        exit_code: outcome.exit_code,
        reason,
        comparisons,
    })
}

fn judge_failure(
    scenario: &Scenario,
    outcome: &RunOutcome,
    stderr_contains: &str,
) -> ScenarioReport {
    let (passed, reason) = if outcome.succeeded() {
        (
            false,
            Some("engine exited 0 where failure was expected".to_string()),
        )
    } else {
        match outcome.stderr_occurrences(stderr_contains) {
            1 => (true, None),
            0 => (
                false,
                Some(format!(
                    "expected diagnostic '{}' missing from stderr: {}",
                    stderr_contains,
                    outcome.stderr.trim()
                )),
            ),
            count => (
                false,
                Some(format!(
                    "expected diagnostic '{}' appears {} times in stderr, expected exactly once",
                    stderr_contains, count
                )),
            ),
        }
    };

    if let Some(reason) = &reason {
        error!(scenario = %scenario.id(), "{}", reason);
    }

    ScenarioReport {
        scenario: scenario.id(),
        passed,
        exit_code: outcome.exit_code,
        reason,
        comparisons: Vec::new(),
    }
}

fn compare_output<F>(
    scenario: &Scenario,
    kind: OutputKind,
    expected: &Path,
    actual: &Path,
    compare: F,
) -> HarnessResult<FileComparisonReport>
where
    F: FnOnce(&Path, &Path) -> Result<Verdict, crate::compare::CompareError>,
{
    let verdict = compare(expected, actual).map_err(HarnessError::from)?;

    for diagnostic in &verdict.diagnostics {
        match diagnostic.severity {
            Severity::Warning => {
                warn!(scenario = %scenario.id(), kind = ?kind, "{}", diagnostic);
            }
            Severity::Mismatch | Severity::Structural => {
                error!(scenario = %scenario.id(), kind = ?kind, "{}", diagnostic);
            }
        }
    }

    Ok(FileComparisonReport {
        kind,
        expected_path: normalize_path(expected),
        actual_path: normalize_path(actual),
        verdict,
    })
}

fn prepare_scratch(scratch: &Path) -> Result<(), SuiteError> {
    if scratch.exists() {
        fs::remove_dir_all(scratch).map_err(|source| SuiteError::Scratch {
            path: scratch.to_path_buf(),
            source,
        })?;
    }
    fs::create_dir_all(scratch).map_err(|source| SuiteError::Scratch {
        path: scratch.to_path_buf(),
        source,
    })
}

fn remove_scratch(scratch: &Path) {
    if let Err(source) = fs::remove_dir_all(scratch) {
        warn!(
            "failed to remove scratch directory '{}': {}",
            scratch.display(),
            source
        );
    }
}

fn write_report_file(report_path: &Path, report: &SuiteReport) -> Result<(), SuiteError> {
    if let Some(parent_dir) = report_path.parent() {
        if !parent_dir.as_os_str().is_empty() {
            fs::create_dir_all(parent_dir).map_err(|source| SuiteError::ReportDirectory {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }
    }

    let report_json = serde_json::to_string_pretty(report)
        .map_err(|source| SuiteError::SerializeReport { source })?;
    fs::write(report_path, report_json).map_err(|source| SuiteError::WriteReport {
        path: report_path.to_path_buf(),
        source,
    })
}

fn current_unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::{
        FileComparisonReport, ScenarioReport, SuiteReport, judge_failure, render_human_summary,
    };
    use crate::compare::{ComparisonMetrics, Diagnostic, Severity, Verdict};
    use crate::runner::{OutputKind, RunOutcome, ScenarioOutputs};
    use crate::scenario::Scenario;
    use std::path::Path;

    fn outcome(exit_code: Option<i32>, stderr: &str) -> RunOutcome {
        RunOutcome {
            exit_code,
            stderr: stderr.to_string(),
            outputs: ScenarioOutputs::in_dir(
                Path::new("scratch"),
                &Scenario::success("one_sample"),
            ),
        }
    }

    #[test]
    fn failure_expectation_passes_only_on_exactly_one_occurrence() {
        let scenario = Scenario::failure("one_sample", "boom");

        let pass = judge_failure(&scenario, &outcome(Some(1), "fatal: boom\n"), "boom");
        assert!(pass.passed);

        let zero_exit = judge_failure(&scenario, &outcome(Some(0), "boom\n"), "boom");
        assert!(!zero_exit.passed);
        assert!(
            zero_exit
                .reason
                .as_deref()
                .expect("reason should be set")
                .contains("exited 0")
        );

        let missing = judge_failure(&scenario, &outcome(Some(1), "different failure\n"), "boom");
        assert!(!missing.passed);
        assert!(
            missing
                .reason
                .as_deref()
                .expect("reason should be set")
                .contains("missing")
        );

        let duplicated = judge_failure(&scenario, &outcome(Some(1), "boom boom\n"), "boom");
        assert!(!duplicated.passed);
        assert!(
            duplicated
                .reason
                .as_deref()
                .expect("reason should be set")
                .contains("2 times")
        );
    }

    #[test]
    fn human_summary_includes_first_failing_diagnostic() {
        let verdict = Verdict {
            passed: false,
            diagnostics: vec![Diagnostic {
                severity: Severity::Mismatch,
                line: Some(3),
                message: "value 2 out of tolerance".to_string(),
            }],
            metrics: ComparisonMetrics::NumericMatrix {
                rows_compared: 1,
                values_compared: 2,
                mismatched_values: 1,
                max_abs_diff: 0.5,
                epsilon: 1e-5,
            },
        };

        let report = SuiteReport {
            generated_at_unix_seconds: 0,
            passed: false,
            scenario_count: 1,
            passed_scenario_count: 0,
            failed_scenario_count: 1,
            scenarios: vec![ScenarioReport {
                scenario: "nogender".to_string(),
                passed: false,
                exit_code: Some(0),
                reason: Some("golden comparison failed for: expected/nogender.confidences".to_string()),
                comparisons: vec![FileComparisonReport {
                    kind: OutputKind::Confidences,
                    expected_path: "expected/nogender.confidences".to_string(),
                    actual_path: "scratch/nogender.confidences".to_string(),
                    verdict,
                }],
            }],
        };

        let summary = render_human_summary(&report);
        assert!(summary.contains("Suite status: FAIL"));
        assert!(summary.contains("Scenario nogender: FAIL"));
        assert!(summary.contains("value 2 out of tolerance"));
    }

    #[test]
    fn human_summary_reports_pass_counts() {
        let report = SuiteReport {
            generated_at_unix_seconds: 0,
            passed: true,
            scenario_count: 2,
            passed_scenario_count: 2,
            failed_scenario_count: 0,
            scenarios: vec![
                ScenarioReport {
                    scenario: "nogender".to_string(),
                    passed: true,
                    exit_code: Some(0),
                    reason: None,
                    comparisons: Vec::new(),
                },
                ScenarioReport {
                    scenario: "nogender_forced".to_string(),
                    passed: true,
                    exit_code: Some(0),
                    reason: None,
                    comparisons: Vec::new(),
                },
            ],
        };

        let summary = render_human_summary(&report);
        assert!(summary.contains("Suite status: PASS"));
        assert!(summary.contains("Scenarios: 2 total (2 passed, 0 failed)"));
    }
}
