use crate::domain::HarnessError;
use crate::scenario::Scenario;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Calls,
    Confidences,
    Clusters,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutputs {
    pub calls: PathBuf,
    pub confidences: PathBuf,
    pub clusters: PathBuf,
}

impl ScenarioOutputs {
    pub fn in_dir(dir: &Path, scenario: &Scenario) -> Self {
        Self {
            calls: dir.join(format!("{}.calls", scenario.name)),
            confidences: dir.join(format!("{}.confidences", scenario.name)),
            clusters: dir.join(format!("{}.clusters", scenario.name)),
        }
    }

    pub fn path(&self, kind: OutputKind) -> &Path {
        match kind {
            OutputKind::Calls => &self.calls,
            OutputKind::Confidences => &self.confidences,
            OutputKind::Clusters => &self.clusters,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub outputs: ScenarioOutputs,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stderr_occurrences(&self, needle: &str) -> usize {
        if needle.is_empty() {
            return 0;
        }
        let mut count = 0;
        let mut start = 0;
        while let Some(position) = self.stderr[start..].find(needle) {
            count += 1;
            start += position + needle.len();
        }
        count
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn engine '{engine}': {source}")]
    Spawn {
        engine: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<RunnerError> for HarnessError {
    fn from(error: RunnerError) -> Self {
        let message = error.to_string();
        match error {
            RunnerError::Spawn { .. } => HarnessError::io_system("IO.ENGINE_SPAWN", message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineRunner {
    pub engine: PathBuf,
    pub input_dir: PathBuf,
    pub expected_dir: PathBuf,
    pub chrx_snp_list: String,
    pub special_snp_list: String,
    pub priors_text: String,
    pub failure_verbosity: i32,
}

impl EngineRunner {
    /// Engine argument vector, in the fixed order the engine documents:
    /// positional inputs/outputs first, then optional flags.
    pub fn command_line(&self, scenario: &Scenario, outputs: &ScenarioOutputs) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        args.push(self.input_dir.join(scenario.intensities_file()).into());
        args.push(outputs.calls.clone().into());
        args.push(outputs.confidences.clone().into());

        if scenario.expects_success() {
            args.push("--write-clusters".into());
            args.push(outputs.clusters.clone().into());
        }

        if scenario.uses_special_snps {
            args.push("--special-snps".into());
            args.push(self.input_dir.join(&self.special_snp_list).into());
        } else {
            args.push("--chrX-snps".into());
            args.push(self.input_dir.join(&self.chrx_snp_list).into());
        }

        if scenario.force_clusters {
            args.push("--clusters".into());
            args.push(
                self.expected_dir
                    .join(scenario.expected_clusters_file())
                    .into(),
            );
        } else {
            args.push("--priors-text".into());
            args.push(self.input_dir.join(&self.priors_text).into());
        }

        if let Some(factor) = scenario.correction_factor {
            args.push("-c".into());
            args.push(factor.to_string().into());
        }

        if let Some(gender_file) = scenario.gender_file() {
            args.push("--gender-file".into());
            args.push(self.input_dir.join(gender_file).into());
        }

        if !scenario.expects_success() {
            args.push("-v".into());
            args.push(self.failure_verbosity.to_string().into());
        }

        args
    }

    pub fn run(
        &self,
        scenario: &Scenario,
        outputs: &ScenarioOutputs,
    ) -> Result<RunOutcome, RunnerError> {
        let args = self.command_line(scenario, outputs);
        let output = Command::new(&self.engine)
            .args(&args)
            .output()
            .map_err(|source| RunnerError::Spawn {
                engine: self.engine.clone(),
                source,
            })?;

        Ok(RunOutcome {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            outputs: outputs.clone(),
        })
    }
}
