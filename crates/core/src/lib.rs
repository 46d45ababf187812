//! # MedAgent Core
//!
//! Core logic for the diagnostic orchestration system.
//!
//! This crate contains the session state machine and everything it drives:
//! - The patient record, its append-only evidence log and versioned differential
//! - Specialist roles, the registry and the built-in rule-based specialists
//! - The judge that picks the next action and decides when to stop
//! - Handoff report rendering and the sharded on-disk archive
//!
//! **No I/O surfaces**: command-line handling and batch running belong in `medagent-cli` and the
//! workspace binary. Everything here is synchronous; callers that need concurrency run sessions
//! on their own threads.

pub mod archive;
pub mod case_file;
pub mod config;
pub mod constants;
pub mod differential;
pub mod error;
pub mod evidence;
pub mod intake;
pub mod interview;
pub mod judge;
pub mod knowledge;
pub mod labs;
pub mod orchestrator;
pub mod prompts;
pub mod reasoning;
pub mod record;
pub mod report;
pub mod retrieval;
pub mod retry;
pub mod specialist;
pub mod specialists;
pub mod uuid;

pub use medagent_types::NonEmptyText;

pub use archive::ArchiveService;
pub use case_file::CaseFile;
pub use config::CoreConfig;
pub use differential::{Differential, DifferentialHistory, DifferentialVersion, Hypothesis};
pub use error::{SessionError, SessionResult};
pub use evidence::{EvidenceItem, EvidenceLog, EvidencePayload, ImagingReport, LabResult, Modality};
pub use intake::{PatientIntake, Sex, Vitals};
pub use interview::{NoInterview, PatientInterview, ScriptedInterview};
pub use judge::{DecisionPolicy, NextAction, RuleBasedJudge, Termination};
pub use orchestrator::{AbortHandle, Orchestrator, SessionOutcome};
pub use record::{CaseData, PatientRecord, RecordStatus};
pub use report::{HandoffReport, ReportService};
pub use retrieval::{InMemoryLiteratureIndex, LiteratureIndex};
pub use retry::RetryPolicy;
pub use specialist::{
    Specialist, SpecialistError, SpecialistRegistry, SpecialistRequest, SpecialistRole,
    SpecialistUpdate,
};
pub use crate::uuid::{CaseId, EvidenceId};
