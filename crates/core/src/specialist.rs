//! Specialist roles, their requests and updates, and the registry the orchestrator calls.
//!
//! A specialist is a pure transformation `(record, request) -> update`. It never sees a
//! mutable record; the orchestrator validates the update and merges it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::differential::Differential;
use crate::evidence::{ImagingReport, LabResult, Modality};
use crate::record::PatientRecord;
use crate::retrieval::LiteratureSummary;
use crate::uuid::EvidenceId;
use crate::{SessionError, SessionResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialistRole {
    Triage,
    Hypothesis,
    Evidence,
    Imaging,
    Research,
}

impl SpecialistRole {
    pub const ALL: [SpecialistRole; 5] = [
        SpecialistRole::Triage,
        SpecialistRole::Hypothesis,
        SpecialistRole::Evidence,
        SpecialistRole::Imaging,
        SpecialistRole::Research,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SpecialistRole::Triage => "triage",
            SpecialistRole::Hypothesis => "hypothesis",
            SpecialistRole::Evidence => "evidence",
            SpecialistRole::Imaging => "imaging",
            SpecialistRole::Research => "research",
        }
    }
}

impl std::fmt::Display for SpecialistRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a specialist call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecialistError {
    /// Transient: the backing service could not be reached or was overloaded.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// The reply could not be interpreted as the expected update.
    #[error("malformed output: {0}")]
    Malformed(String),
    /// Permanent refusal; retrying will not help.
    #[error("rejected: {0}")]
    Rejected(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Moderate => "MODERATE",
            RiskLevel::High => "HIGH",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabOrder {
    pub test: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagingOrder {
    pub modality: Modality,
    pub region: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteratureQuery {
    pub query: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "lowercase")]
pub enum HypothesisRequest {
    /// First differential after triage.
    Initial,
    /// Re-rank in light of evidence recorded since the last version.
    Refine { evidence: Vec<EvidenceId> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpecialistRequest {
    Triage { attempt: u32 },
    Hypotheses(HypothesisRequest),
    Lab(LabOrder),
    Imaging(ImagingOrder),
    Literature(LiteratureQuery),
}

impl SpecialistRequest {
    /// The role that serves this request.
    pub fn role(&self) -> SpecialistRole {
        match self {
            SpecialistRequest::Triage { .. } => SpecialistRole::Triage,
            SpecialistRequest::Hypotheses(_) => SpecialistRole::Hypothesis,
            SpecialistRequest::Lab(_) => SpecialistRole::Evidence,
            SpecialistRequest::Imaging(_) => SpecialistRole::Imaging,
            SpecialistRequest::Literature(_) => SpecialistRole::Research,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SpecialistRequest::Triage { attempt } => format!("triage (attempt {})", attempt),
            SpecialistRequest::Hypotheses(HypothesisRequest::Initial) => {
                "generate differential".into()
            }
            SpecialistRequest::Hypotheses(HypothesisRequest::Refine { evidence }) => {
                format!("refine differential ({} new evidence)", evidence.len())
            }
            SpecialistRequest::Lab(order) => format!("order lab {}", order.test),
            SpecialistRequest::Imaging(order) => {
                format!("order imaging {} {}", order.modality, order.region)
            }
            SpecialistRequest::Literature(q) => format!("consult literature: {}", q.query),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriageUpdate {
    Assessment {
        summary: String,
        risk: RiskLevel,
        #[serde(default)]
        red_flags: Vec<String>,
    },
    Clarify {
        question: String,
    },
    Emergency {
        condition: String,
        action: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HypothesisUpdate {
    pub differential: Differential,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpecialistUpdate {
    Triage(TriageUpdate),
    Differential(HypothesisUpdate),
    Lab(LabResult),
    Imaging(ImagingReport),
    Literature(LiteratureSummary),
}

impl SpecialistUpdate {
    /// The role expected to produce this kind of update.
    pub fn role(&self) -> SpecialistRole {
        match self {
            SpecialistUpdate::Triage(_) => SpecialistRole::Triage,
            SpecialistUpdate::Differential(_) => SpecialistRole::Hypothesis,
            SpecialistUpdate::Lab(_) => SpecialistRole::Evidence,
            SpecialistUpdate::Imaging(_) => SpecialistRole::Imaging,
            SpecialistUpdate::Literature(_) => SpecialistRole::Research,
        }
    }
}

/// A narrowly scoped diagnostic function.
///
/// Implementations must be stateless with respect to sessions: the same registry is shared by
/// every session the process runs, possibly from several threads.
pub trait Specialist: Send + Sync {
    fn role(&self) -> SpecialistRole;

    fn handle(
        &self,
        record: &PatientRecord,
        request: &SpecialistRequest,
    ) -> Result<SpecialistUpdate, SpecialistError>;
}

/// Role → specialist mapping used by the orchestrator.
#[derive(Clone, Default)]
pub struct SpecialistRegistry {
    specialists: BTreeMap<SpecialistRole, Arc<dyn Specialist>>,
}

impl SpecialistRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a specialist under its own role, replacing any previous one.
    pub fn register(&mut self, specialist: Arc<dyn Specialist>) -> &mut Self {
        self.specialists.insert(specialist.role(), specialist);
        self
    }

    /// Builder form of [`SpecialistRegistry::register`].
    pub fn with(mut self, specialist: impl Specialist + 'static) -> Self {
        self.register(Arc::new(specialist));
        self
    }

    pub fn get(&self, role: SpecialistRole) -> SessionResult<&dyn Specialist> {
        self.specialists
            .get(&role)
            .map(|s| s.as_ref())
            .ok_or(SessionError::MissingSpecialist(role))
    }

    pub fn roles(&self) -> Vec<SpecialistRole> {
        self.specialists.keys().copied().collect()
    }

    /// Fail fast when a role the workflow needs has no specialist.
    pub fn ensure_complete(&self) -> SessionResult<()> {
        for role in SpecialistRole::ALL {
            self.get(role)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SpecialistRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialistRegistry")
            .field("roles", &self.roles())
            .finish()
    }
}
