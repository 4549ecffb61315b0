//! Configuration for the phase pipeline.
//!
//! [`PipelineConfig`] controls controller bounds, rewrite-loop bounds, parallel
//! per-method execution and which phases run. Phase enablement set here
//! overrides the defaults declared by each phase descriptor.

use std::collections::BTreeSet;

/// Configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Maximum number of phase transitions before the controller gives up (default: 256).
    ///
    /// Exceeding it means phases keep moving backward without converging.
    pub max_phase_transitions: usize,

    /// Tighter bound on rewrite-loop iterations per method.
    ///
    /// `None` uses the natural bound of operators + variables + 1.
    pub max_rewrite_iterations: Option<usize>,

    /// Run per-method phase work on the rayon thread pool (default: true).
    pub parallel: bool,

    /// Phases to run even if their descriptor disables them by default.
    pub enabled_phases: BTreeSet<String>,

    /// Phases to skip even if their descriptor enables them.
    ///
    /// Takes precedence over `enabled_phases`.
    pub disabled_phases: BTreeSet<String>,

    /// Redo type layout once if temporary reduction removed calls (default: true).
    pub reanalyze_after_call_elimination: bool,

    /// Verify use/def consistency after every phase (slow, default: false).
    pub verify_after_each_phase: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_phase_transitions: 256,
            max_rewrite_iterations: None,
            parallel: true,
            enabled_phases: BTreeSet::new(),
            disabled_phases: BTreeSet::new(),
            reanalyze_after_call_elimination: true,
            verify_after_each_phase: false,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for quick, single-pass compilation.
    ///
    /// No reanalysis after call elimination and a tight controller bound.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_phase_transitions: 64,
            reanalyze_after_call_elimination: false,
            ..Self::default()
        }
    }

    /// Creates a configuration that verifies the IR after every phase and
    /// runs sequentially for reproducible event order.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            parallel: false,
            verify_after_each_phase: true,
            ..Self::default()
        }
    }

    /// Sets the controller transition bound.
    #[must_use]
    pub fn with_max_phase_transitions(mut self, transitions: usize) -> Self {
        self.max_phase_transitions = transitions;
        self
    }

    /// Sets an explicit rewrite-loop bound.
    #[must_use]
    pub fn with_max_rewrite_iterations(mut self, iterations: usize) -> Self {
        self.max_rewrite_iterations = Some(iterations);
        self
    }

    /// Enables or disables parallel per-method execution.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Forces a phase on.
    #[must_use]
    pub fn with_phase_enabled(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.disabled_phases.remove(&name);
        self.enabled_phases.insert(name);
        self
    }

    /// Forces a phase off.
    #[must_use]
    pub fn with_phase_disabled(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.enabled_phases.remove(&name);
        self.disabled_phases.insert(name);
        self
    }

    /// Sets whether layout is redone after calls were eliminated.
    #[must_use]
    pub fn with_reanalyze_after_call_elimination(mut self, reanalyze: bool) -> Self {
        self.reanalyze_after_call_elimination = reanalyze;
        self
    }

    /// Sets whether use/def consistency is verified after every phase.
    #[must_use]
    pub fn with_verify_after_each_phase(mut self, verify: bool) -> Self {
        self.verify_after_each_phase = verify;
        self
    }

    /// Resolves whether a phase runs, given its descriptor default.
    #[must_use]
    pub fn is_phase_enabled(&self, name: &str, default: bool) -> bool {
        if self.disabled_phases.contains(name) {
            false
        } else if self.enabled_phases.contains(name) {
            true
        } else {
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_phase_transitions, 256);
        assert!(config.max_rewrite_iterations.is_none());
        assert!(config.parallel);
        assert!(config.reanalyze_after_call_elimination);
        assert!(!config.verify_after_each_phase);
    }

    #[test]
    fn test_presets() {
        assert!(!PipelineConfig::fast().reanalyze_after_call_elimination);
        let thorough = PipelineConfig::thorough();
        assert!(thorough.verify_after_each_phase);
        assert!(!thorough.parallel);
    }

    #[test]
    fn test_phase_overrides() {
        let config = PipelineConfig::new()
            .with_phase_enabled("CollectRegisterAllocationConstraints")
            .with_phase_disabled("VerifyIr");

        assert!(config.is_phase_enabled("CollectRegisterAllocationConstraints", false));
        assert!(!config.is_phase_enabled("VerifyIr", true));
        assert!(config.is_phase_enabled("LayoutTypes", true));

        let config = config.with_phase_enabled("VerifyIr");
        assert!(config.is_phase_enabled("VerifyIr", true));
    }
}
