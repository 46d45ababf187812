//! Constants used throughout the MedAgent core crate.
//!
//! Configuration defaults live here so that the binaries and the tests agree on them.

/// Top-hypothesis probability at which the judge finalizes.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.9;

/// Evidence-gathering iterations allowed before the judge finalizes regardless of confidence.
pub const DEFAULT_MAX_ITERATIONS: u32 = 6;

/// Triage attempts (including clarification rounds) before proceeding with what we have.
pub const DEFAULT_MAX_TRIAGE_ATTEMPTS: u32 = 5;

/// Retries after a `SpecialistUnavailable` failure (three attempts in total).
pub const DEFAULT_MAX_UNAVAILABLE_RETRIES: u32 = 2;

/// Retries after a `MalformedSpecialistOutput` failure.
pub const DEFAULT_MAX_MALFORMED_RETRIES: u32 = 1;

/// Initial backoff between specialist attempts, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 250;

/// Upper bound on the backoff between specialist attempts, in milliseconds.
pub const MAX_RETRY_DELAY_MS: u64 = 5_000;

/// Seed for the lab and imaging simulators.
pub const DEFAULT_SIMULATION_SEED: u64 = 42;

/// Probability mass the hypothesis engine reserves for conditions it does not list.
pub const RESIDUAL_PROBABILITY_MASS: f64 = 0.05;

/// Tolerance used when checking that a differential sums to at most one.
pub const PROBABILITY_EPSILON: f64 = 1e-9;

/// Number of leading hypotheses the judge considers when picking discriminating tests.
pub const JUDGE_CONSIDERED_HYPOTHESES: usize = 3;

/// Snippets requested from the literature index per consult.
pub const LITERATURE_SNIPPET_LIMIT: usize = 3;

/// Filename for the archived patient record.
pub const RECORD_JSON_FILENAME: &str = "record.json";

/// Filename for the archived handoff report.
pub const REPORT_MARKDOWN_FILENAME: &str = "report.md";
