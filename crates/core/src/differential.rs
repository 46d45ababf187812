//! Differential diagnosis: ranked hypotheses and their version history.
//!
//! A [`Differential`] can only be constructed through validation, so every instance holds
//! finite, non-negative probabilities that sum to at most one, sorted by descending
//! probability. Deserialization goes through the same check, which is how a malformed
//! specialist reply is caught before it reaches the record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::PROBABILITY_EPSILON;
use crate::uuid::EvidenceId;
use crate::{NonEmptyText, SessionError, SessionResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub condition: NonEmptyText,
    pub probability: f64,
}

impl Hypothesis {
    pub fn new(condition: impl AsRef<str>, probability: f64) -> SessionResult<Self> {
        Ok(Self {
            condition: NonEmptyText::new(condition)?,
            probability,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Hypothesis>", into = "Vec<Hypothesis>")]
pub struct Differential(Vec<Hypothesis>);

impl Differential {
    /// Validate and rank a list of hypotheses.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidInput` if any probability is negative or not finite, a
    /// condition appears twice, or the probabilities sum above one.
    pub fn new(mut hypotheses: Vec<Hypothesis>) -> SessionResult<Self> {
        let mut total = 0.0;
        for (i, h) in hypotheses.iter().enumerate() {
            if !h.probability.is_finite() || h.probability < 0.0 {
                return Err(SessionError::InvalidInput(format!(
                    "probability for '{}' must be finite and non-negative, got {}",
                    h.condition, h.probability
                )));
            }
            if hypotheses[..i]
                .iter()
                .any(|other| other.condition.as_str().eq_ignore_ascii_case(h.condition.as_str()))
            {
                return Err(SessionError::InvalidInput(format!(
                    "condition '{}' listed more than once",
                    h.condition
                )));
            }
            total += h.probability;
        }
        if total > 1.0 + PROBABILITY_EPSILON {
            return Err(SessionError::InvalidInput(format!(
                "differential probabilities sum to {:.4}, which exceeds 1",
                total
            )));
        }

        hypotheses.sort_by(|a, b| {
            b.probability
                .total_cmp(&a.probability)
                .then_with(|| a.condition.as_str().cmp(b.condition.as_str()))
        });
        Ok(Self(hypotheses))
    }

    /// Build a differential from unnormalised non-negative weights, scaling them so that they
    /// sum to `mass` (clamped to [0, 1]). Zero-weight entries are dropped.
    pub fn from_weights(weights: Vec<(NonEmptyText, f64)>, mass: f64) -> SessionResult<Self> {
        let mass = mass.clamp(0.0, 1.0);
        let weights: Vec<_> = weights
            .into_iter()
            .filter(|(_, w)| w.is_finite() && *w > 0.0)
            .collect();
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Self::new(Vec::new());
        }

        let hypotheses = weights
            .into_iter()
            .map(|(condition, w)| Hypothesis {
                condition,
                // Scale slightly under the mass so rounding can never push the sum above it.
                probability: (w / total) * mass * (1.0 - PROBABILITY_EPSILON),
            })
            .collect();
        Self::new(hypotheses)
    }

    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.0
    }

    pub fn top(&self) -> Option<&Hypothesis> {
        self.0.first()
    }

    pub fn top_probability(&self) -> f64 {
        self.top().map(|h| h.probability).unwrap_or(0.0)
    }

    pub fn total_probability(&self) -> f64 {
        self.0.iter().map(|h| h.probability).sum()
    }

    pub fn probability_of(&self, condition: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|h| h.condition.as_str().eq_ignore_ascii_case(condition))
            .map(|h| h.probability)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl TryFrom<Vec<Hypothesis>> for Differential {
    type Error = SessionError;

    fn try_from(value: Vec<Hypothesis>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Differential> for Vec<Hypothesis> {
    fn from(value: Differential) -> Self {
        value.0
    }
}

/// One refinement of the differential.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifferentialVersion {
    /// 1-based version number.
    pub version: u32,
    pub differential: Differential,
    /// Evidence recorded since the previous version that triggered this one.
    pub triggered_by: Vec<EvidenceId>,
    /// Length of the evidence log when this version was produced.
    pub evidence_count: usize,
    pub rationale: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only history of differential versions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DifferentialHistory(Vec<DifferentialVersion>);

impl DifferentialHistory {
    pub(crate) fn push(
        &mut self,
        differential: Differential,
        triggered_by: Vec<EvidenceId>,
        evidence_count: usize,
        rationale: String,
        created_at: DateTime<Utc>,
    ) -> &DifferentialVersion {
        let version = self.0.len() as u32 + 1;
        self.0.push(DifferentialVersion {
            version,
            differential,
            triggered_by,
            evidence_count,
            rationale,
            created_at,
        });
        &self.0[self.0.len() - 1]
    }

    pub fn current(&self) -> Option<&DifferentialVersion> {
        self.0.last()
    }

    pub fn versions(&self) -> &[DifferentialVersion] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
