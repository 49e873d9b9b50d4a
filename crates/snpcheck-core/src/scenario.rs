use serde::Serialize;

/// Diagnostic the engine historically emitted for single-sample clustering.
/// Kept as the failure-path oracle; revisit if the engine's minimum-sample
/// policy changes.
pub const NOT_ENOUGH_SAMPLES_DIAGNOSTIC: &str =
    "Not enough samples to clusters.  6 are needed but there are only 1.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    Success,
    Failure { stderr_contains: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scenario {
    pub name: String,
    pub uses_gender: bool,
    pub force_clusters: bool,
    pub uses_special_snps: bool,
    pub correction_factor: Option<f64>,
    pub expectation: Expectation,
}

impl Scenario {
    pub fn success(name: &str) -> Self {
        Self {
            name: name.to_string(),
            uses_gender: false,
            force_clusters: false,
            uses_special_snps: false,
            correction_factor: None,
            expectation: Expectation::Success,
        }
    }

    pub fn failure(name: &str, stderr_contains: &str) -> Self {
        Self {
            expectation: Expectation::Failure {
                stderr_contains: stderr_contains.to_string(),
            },
            ..Self::success(name)
        }
    }

    pub fn with_gender(mut self) -> Self {
        self.uses_gender = true;
        self
    }

    pub fn with_special_snps(mut self) -> Self {
        self.uses_special_snps = true;
        self
    }

    pub fn with_correction_factor(mut self, factor: f64) -> Self {
        self.correction_factor = Some(factor);
        self
    }

    /// Same inputs and goldens, but the engine is fed the golden cluster
    /// model directly instead of estimating clusters from priors.
    pub fn forced_variant(&self) -> Self {
        let mut forced = self.clone();
        forced.force_clusters = true;
        forced
    }

    /// Report/scratch identifier; distinguishes the forced re-run of a
    /// scenario from its prior-based run while both share input files.
    pub fn id(&self) -> String {
        if self.force_clusters {
            format!("{}_forced", self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn expects_success(&self) -> bool {
        matches!(self.expectation, Expectation::Success)
    }

    pub fn intensities_file(&self) -> String {
        format!("{}.intensities", self.name)
    }

    pub fn gender_file(&self) -> Option<String> {
        self.uses_gender.then(|| format!("{}.gender", self.name))
    }

    pub fn expected_calls_file(&self) -> String {
        format!("{}.calls", self.name)
    }

    pub fn expected_confidences_file(&self) -> String {
        format!("{}.confidences", self.name)
    }

    pub fn expected_clusters_file(&self) -> String {
        format!("{}.clusters", self.name)
    }
}

/// The external test matrix: prior-based rows, their forced-cluster re-runs,
/// and the single-sample failure path.
pub fn standard_matrix() -> Vec<Scenario> {
    let prior_based = vec![
        Scenario::success("nogender"),
        Scenario::success("gender_mono").with_gender(),
        Scenario::success("gender_two_cluster").with_gender(),
        Scenario::success("gender_special")
            .with_gender()
            .with_special_snps(),
    ];

    let forced: Vec<Scenario> = prior_based
        .iter()
        .map(Scenario::forced_variant)
        .collect();

    let mut scenarios = prior_based;
    scenarios.extend(forced);
    scenarios.push(Scenario::failure(
        "one_sample",
        NOT_ENOUGH_SAMPLES_DIAGNOSTIC,
    ));
    scenarios
}
