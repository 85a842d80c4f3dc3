//! The configuration surface enumerated in §6: everything the EM driver and
//! parameter initialisation need beyond the clique tree and dataset
//! themselves, collected into one struct with fluent `with_*` setters
//! (matching the workspace family's `Variable::with_name`-style construction)
//! rather than public mutable fields.

/// Selects which of §4.E's three factories seeds a clique tree's initial
/// potentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InitMode {
    Uniform,
    Random,
    Empirical,
}

/// Configuration for one [`crate::em::run`] call.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmConfig {
    /// Whether the expected-count accumulators are normalised at the end of
    /// each M-step (§4.F step 3).
    pub normalise: bool,
    /// Convergence threshold on the max potential difference between
    /// consecutive iterations (§4.F step 6). Default `1e-14`.
    pub epsilon: f64,
    /// §4.E factory selector for the caller's initial potentials; the EM
    /// driver itself does not dispatch on this (callers build the clique
    /// tree's starting potentials via [`crate::init`] directly), but it
    /// travels with the rest of the run's configuration for collaborators
    /// that script the whole pipeline from one struct.
    pub init_mode: InitMode,
    /// Concentration for [`InitMode::Random`]'s symmetric Dirichlet draw.
    /// Default `1.0` (uniform on the simplex).
    pub dirichlet_alpha: f64,
    /// Hard cap on EM iterations (§9 Open Question); exceeding it without
    /// reaching `epsilon` is reported as [`mrf_error::MrfError::NotConverged`]
    /// rather than silently returned as a fixed point.
    pub max_iterations: usize,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            normalise: false,
            epsilon: 1e-14,
            init_mode: InitMode::Uniform,
            dirichlet_alpha: 1.0,
            max_iterations: 1000,
        }
    }
}

impl EmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_normalise(mut self, normalise: bool) -> Self {
        self.normalise = normalise;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_init_mode(mut self, mode: InitMode) -> Self {
        self.init_mode = mode;
        self
    }

    pub fn with_dirichlet_alpha(mut self, alpha: f64) -> Self {
        self.dirichlet_alpha = alpha;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

#[cfg(feature = "serde")]
impl EmConfig {
    /// Serialises this configuration to JSON, so a collaborator (the CLI,
    /// a saved experiment) can persist a run's settings without the core
    /// taking on any file-format or serialisation-*policy* concerns of its
    /// own (those stay out of scope per §1 — this is just `serde_json` doing
    /// what it already does).
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EmConfig::default();
        assert_eq!(cfg.epsilon, 1e-14);
        assert_eq!(cfg.init_mode, InitMode::Uniform);
        assert_eq!(cfg.dirichlet_alpha, 1.0);
        assert_eq!(cfg.max_iterations, 1000);
        assert!(!cfg.normalise);
    }

    #[test]
    fn builder_chains() {
        let cfg = EmConfig::new()
            .with_normalise(true)
            .with_epsilon(1e-8)
            .with_init_mode(InitMode::Random)
            .with_dirichlet_alpha(0.5)
            .with_max_iterations(50);
        assert!(cfg.normalise);
        assert_eq!(cfg.epsilon, 1e-8);
        assert_eq!(cfg.init_mode, InitMode::Random);
        assert_eq!(cfg.dirichlet_alpha, 0.5);
        assert_eq!(cfg.max_iterations, 50);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_round_trips() {
        let cfg = EmConfig::new().with_epsilon(1e-10).with_init_mode(InitMode::Empirical);
        let json = cfg.to_json().unwrap();
        let back = EmConfig::from_json(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
