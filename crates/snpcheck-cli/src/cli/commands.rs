use super::CliError;
use snpcheck_core::compare::{
    CLUSTER_EPSILON, CONFIDENCE_EPSILON, Verdict, compare_calls, compare_clusters,
    compare_confidences,
};
use snpcheck_core::domain::HarnessError;
use snpcheck_core::scenario::{Scenario, standard_matrix};
use snpcheck_core::suite::{SuiteConfig, render_human_summary, run_suite};
use std::path::PathBuf;
use tracing::info;

#[derive(clap::Args)]
pub(super) struct RunArgs {
    /// Genotype engine binary
    #[arg(long, default_value = "birdseed")]
    engine: PathBuf,

    /// Scenario input directory
    #[arg(long, default_value = "fixtures/inputs")]
    input_dir: PathBuf,

    /// Golden output directory
    #[arg(long, default_value = "fixtures/expected")]
    expected_dir: PathBuf,

    /// Scratch root for engine outputs
    #[arg(long, default_value = "scratch")]
    scratch_dir: PathBuf,

    /// JSON report output path
    #[arg(long, default_value = "artifacts/suite-report.json")]
    report: PathBuf,

    /// chrX SNP list file name under the input directory
    #[arg(long, default_value = "BI_SNP.chrx")]
    chrx_snp_list: String,

    /// Special SNP list file name under the input directory
    #[arg(long, default_value = "BI_SNP.special_snps")]
    special_snp_list: String,

    /// Priors file name under the input directory
    #[arg(long, default_value = "priors.txt")]
    priors_text: String,

    /// Absolute tolerance for confidence values
    #[arg(long, default_value_t = CONFIDENCE_EPSILON)]
    confidence_epsilon: f64,

    /// Absolute tolerance for cluster parameters
    #[arg(long, default_value_t = CLUSTER_EPSILON)]
    cluster_epsilon: f64,

    /// Engine verbosity for expected-failure runs
    #[arg(long, default_value_t = 3)]
    failure_verbosity: i32,

    /// Run only the named scenarios (repeatable)
    #[arg(long = "scenario", value_name = "ID")]
    scenarios: Vec<String>,
}

impl RunArgs {
    fn into_config(self) -> (SuiteConfig, Vec<String>) {
        let config = SuiteConfig {
            engine_path: self.engine,
            input_dir: self.input_dir,
            expected_dir: self.expected_dir,
            scratch_dir: self.scratch_dir,
            report_path: self.report,
            chrx_snp_list: self.chrx_snp_list,
            special_snp_list: self.special_snp_list,
            priors_text: self.priors_text,
            confidence_epsilon: self.confidence_epsilon,
            cluster_epsilon: self.cluster_epsilon,
            failure_verbosity: self.failure_verbosity,
        };
        (config, self.scenarios)
    }
}

#[derive(clap::Args)]
pub(super) struct CompareArgs {
    /// Output kind to compare
    #[arg(long, value_enum)]
    mode: CompareMode,

    /// Absolute tolerance override for numeric modes
    #[arg(long)]
    epsilon: Option<f64>,

    /// Golden file
    expected: PathBuf,

    /// Candidate file
    actual: PathBuf,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CompareMode {
    Calls,
    Confidences,
    Clusters,
}

pub(super) fn run_suite_command(args: RunArgs) -> Result<i32, CliError> {
    let (config, requested) = args.into_config();
    let scenarios = select_scenarios(requested)?;
    info!(
        engine = %config.engine_path.display(),
        scenarios = scenarios.len(),
        "starting suite"
    );

    let report = run_suite(&config, &scenarios).map_err(CliError::Harness)?;
    println!("{}", render_human_summary(&report));
    println!("JSON report: {}", config.report_path.display());

    if report.passed { Ok(0) } else { Ok(1) }
}

pub(super) fn run_compare_command(args: CompareArgs) -> Result<i32, CliError> {
    let verdict = match args.mode {
        CompareMode::Calls => {
            if args.epsilon.is_some() {
                return Err(CliError::Usage(
                    "--epsilon does not apply to the calls comparison, which is byte-exact"
                        .to_string(),
                ));
            }
            compare_calls(&args.expected, &args.actual)
        }
        CompareMode::Confidences => compare_confidences(
            &args.expected,
            &args.actual,
            args.epsilon.unwrap_or(CONFIDENCE_EPSILON),
        ),
        CompareMode::Clusters => compare_clusters(
            &args.expected,
            &args.actual,
            args.epsilon.unwrap_or(CLUSTER_EPSILON),
        ),
    }
    .map_err(|error| CliError::Harness(HarnessError::from(error)))?;

    print_verdict(&args.expected, &args.actual, &verdict);
    if verdict.passed { Ok(0) } else { Ok(1) }
}

pub(super) fn run_scenarios_command() -> Result<i32, CliError> {
    for scenario in standard_matrix() {
        let expectation = if scenario.expects_success() {
            "expects success"
        } else {
            "expects engine failure"
        };
        println!("{}: {}", scenario.id(), expectation);
    }
    Ok(0)
}

fn select_scenarios(requested: Vec<String>) -> Result<Vec<Scenario>, CliError> {
    let matrix = standard_matrix();
    if requested.is_empty() {
        return Ok(matrix);
    }

    let mut selected = Vec::with_capacity(requested.len());
    for id in &requested {
        let scenario = matrix
            .iter()
            .find(|scenario| scenario.id() == *id)
            .ok_or_else(|| {
                let known: Vec<String> = matrix.iter().map(Scenario::id).collect();
                CliError::Usage(format!(
                    "unknown scenario '{}'; known scenarios: {}",
                    id,
                    known.join(", ")
                ))
            })?;
        selected.push(scenario.clone());
    }
    Ok(selected)
}

fn print_verdict(expected: &std::path::Path, actual: &std::path::Path, verdict: &Verdict) {
    for diagnostic in &verdict.diagnostics {
        println!("{}", diagnostic);
    }

    let status = if verdict.passed { "PASS" } else { "FAIL" };
    println!(
        "{}: '{}' vs '{}'",
        status,
        expected.display(),
        actual.display()
    );
}
