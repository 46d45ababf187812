//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the orchestrator.
//! Nothing in a running session reads process-wide environment variables; the binaries read
//! them and hand the raw values to the `*_from_env_value` parsers below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_TRIAGE_ATTEMPTS,
    DEFAULT_RETRY_DELAY_MS, DEFAULT_SIMULATION_SEED,
};
use crate::retry::RetryPolicy;
use crate::{SessionError, SessionResult};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    confidence_threshold: f64,
    max_iterations: u32,
    max_triage_attempts: u32,
    retry: RetryPolicy,
    simulation_seed: u64,
    archive_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_triage_attempts: DEFAULT_MAX_TRIAGE_ATTEMPTS,
            retry: RetryPolicy::default(),
            simulation_seed: DEFAULT_SIMULATION_SEED,
            archive_dir: None,
        }
    }
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidInput` if the threshold is outside (0, 1] or either
    /// iteration bound is zero.
    pub fn new(
        confidence_threshold: f64,
        max_iterations: u32,
        max_triage_attempts: u32,
        retry: RetryPolicy,
        simulation_seed: u64,
        archive_dir: Option<PathBuf>,
    ) -> SessionResult<Self> {
        validate_confidence_threshold(confidence_threshold)?;
        if max_iterations == 0 {
            return Err(SessionError::InvalidInput(
                "max_iterations must be at least 1".into(),
            ));
        }
        if max_triage_attempts == 0 {
            return Err(SessionError::InvalidInput(
                "max_triage_attempts must be at least 1".into(),
            ));
        }

        Ok(Self {
            confidence_threshold,
            max_iterations,
            max_triage_attempts,
            retry,
            simulation_seed,
            archive_dir,
        })
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn max_triage_attempts(&self) -> u32 {
        self.max_triage_attempts
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn simulation_seed(&self) -> u64 {
        self.simulation_seed
    }

    pub fn archive_dir(&self) -> Option<&Path> {
        self.archive_dir.as_deref()
    }

    /// Upper bound on `advance` calls for one session, independent of the decision policy.
    ///
    /// Covers every triage attempt, the initial differential, one refinement per iteration,
    /// each iteration itself and the finalizing step.
    pub fn max_steps(&self) -> u32 {
        self.max_triage_attempts
            .saturating_add(1)
            .saturating_add(self.max_iterations.saturating_mul(2))
            .saturating_add(1)
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> SessionResult<Self> {
        validate_confidence_threshold(threshold)?;
        self.confidence_threshold = threshold;
        Ok(self)
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> SessionResult<Self> {
        if max_iterations == 0 {
            return Err(SessionError::InvalidInput(
                "max_iterations must be at least 1".into(),
            ));
        }
        self.max_iterations = max_iterations;
        Ok(self)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_simulation_seed(mut self, seed: u64) -> Self {
        self.simulation_seed = seed;
        self
    }

    pub fn with_archive_dir(mut self, archive_dir: Option<PathBuf>) -> Self {
        self.archive_dir = archive_dir;
        self
    }
}

fn validate_confidence_threshold(threshold: f64) -> SessionResult<()> {
    if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
        return Err(SessionError::InvalidInput(format!(
            "confidence threshold must be in (0, 1], got {}",
            threshold
        )));
    }
    Ok(())
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env_value<T: std::str::FromStr>(
    name: &str,
    value: Option<String>,
    default: T,
) -> SessionResult<T> {
    match trimmed(value) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| SessionError::InvalidInput(format!("{} has invalid value '{}'", name, raw))),
    }
}

/// Parse the confidence threshold from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default.
pub fn confidence_threshold_from_env_value(value: Option<String>) -> SessionResult<f64> {
    let threshold = parse_env_value(
        "MEDAGENT_CONFIDENCE_THRESHOLD",
        value,
        DEFAULT_CONFIDENCE_THRESHOLD,
    )?;
    validate_confidence_threshold(threshold)?;
    Ok(threshold)
}

/// Parse the iteration cap from an optional string value.
pub fn max_iterations_from_env_value(value: Option<String>) -> SessionResult<u32> {
    parse_env_value("MEDAGENT_MAX_ITERATIONS", value, DEFAULT_MAX_ITERATIONS)
}

/// Parse the triage attempt cap from an optional string value.
pub fn max_triage_attempts_from_env_value(value: Option<String>) -> SessionResult<u32> {
    parse_env_value(
        "MEDAGENT_MAX_TRIAGE_ATTEMPTS",
        value,
        DEFAULT_MAX_TRIAGE_ATTEMPTS,
    )
}

/// Parse the simulator seed from an optional string value.
pub fn simulation_seed_from_env_value(value: Option<String>) -> SessionResult<u64> {
    parse_env_value("MEDAGENT_SIM_SEED", value, DEFAULT_SIMULATION_SEED)
}

/// Build a retry policy from the optional retry count and initial delay values.
pub fn retry_policy_from_env_values(
    max_retries: Option<String>,
    delay_ms: Option<String>,
) -> SessionResult<RetryPolicy> {
    let defaults = RetryPolicy::default();
    let max_unavailable_retries = parse_env_value(
        "MEDAGENT_MAX_RETRIES",
        max_retries,
        defaults.max_unavailable_retries,
    )?;
    let delay_ms = parse_env_value("MEDAGENT_RETRY_DELAY_MS", delay_ms, DEFAULT_RETRY_DELAY_MS)?;

    Ok(RetryPolicy {
        max_unavailable_retries,
        initial_delay: Duration::from_millis(delay_ms),
        ..defaults
    })
}

/// Resolve the archive directory from an optional string value.
pub fn archive_dir_from_env_value(value: Option<String>) -> Option<PathBuf> {
    trimmed(value).map(PathBuf::from)
}
