//! The diagnostic session loop.
//!
//! [`Orchestrator::advance`] performs exactly one step: ask the decision policy for the next
//! action, call the specialist that serves it (with bounded retries), validate the update and
//! merge it into a copy of the record. The caller's record is never touched, so a failed step
//! leaves it exactly as it was.
//!
//! [`Orchestrator::run`] repeats `advance` until the record is finalized, checking the abort
//! handle at every step boundary, then renders the handoff report and archives the session
//! when an archive directory is configured.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::Utc;

use crate::archive::ArchiveService;
use crate::case_file::CaseFile;
use crate::config::CoreConfig;
use crate::evidence::{EvidenceItem, EvidencePayload, HistoryNote};
use crate::intake::PatientIntake;
use crate::interview::{NoInterview, PatientInterview};
use crate::judge::{DecisionPolicy, NextAction, RuleBasedJudge, Termination};
use crate::labs;
use crate::record::{CaseData, PatientRecord, RecordStatus};
use crate::report::{HandoffReport, ReportService};
use crate::specialist::{
    RiskLevel, SpecialistError, SpecialistRegistry, SpecialistRequest, SpecialistRole,
    SpecialistUpdate, TriageUpdate,
};
use crate::{SessionError, SessionResult};

const UNDETERMINED_DIAGNOSIS: &str = "Undetermined";

/// Cooperative cancellation flag shared between a running session and its controller.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a completed session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub record: PatientRecord,
    pub termination: Termination,
    pub report: HandoffReport,
    pub markdown: String,
    /// Archive directory the session was written to, when archiving is configured.
    pub archived_to: Option<PathBuf>,
}

pub struct Orchestrator {
    config: CoreConfig,
    registry: SpecialistRegistry,
    policy: Box<dyn DecisionPolicy>,
    interview: Box<dyn PatientInterview>,
    reports: ReportService,
    archive: Option<ArchiveService>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("archive", &self.archive)
            .finish()
    }
}

impl Orchestrator {
    /// Build an orchestrator with the rule-based judge and no patient interview.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::MissingSpecialist` if any role has no registered specialist.
    pub fn new(config: CoreConfig, registry: SpecialistRegistry) -> SessionResult<Self> {
        registry.ensure_complete()?;
        let archive = config.archive_dir().map(ArchiveService::new);
        Ok(Self {
            config,
            registry,
            policy: Box::new(RuleBasedJudge::new()),
            interview: Box::new(NoInterview),
            reports: ReportService::new(),
            archive,
        })
    }

    pub fn with_policy(mut self, policy: impl DecisionPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn with_interview(mut self, interview: impl PatientInterview + 'static) -> Self {
        self.interview = Box::new(interview);
        self
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &SpecialistRegistry {
        &self.registry
    }

    /// Open a record for a new session.
    pub fn open(&self, intake: &PatientIntake, case_data: CaseData) -> SessionResult<PatientRecord> {
        Ok(PatientRecord::from_intake(intake, Utc::now())?.with_case_data(case_data))
    }

    /// Run a session for a bare intake with no hidden case data.
    pub fn run_session(&self, intake: &PatientIntake) -> SessionResult<SessionOutcome> {
        let record = self.open(intake, CaseData::default())?;
        self.run(record, &AbortHandle::new())
    }

    /// Run a session for a loaded case file.
    pub fn run_case(&self, case: &CaseFile, abort: &AbortHandle) -> SessionResult<SessionOutcome> {
        case.validate()?;
        let record = self.open(&case.intake, case.case_data())?;
        self.run(record, abort)
    }

    /// Drive `record` to finalization.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionAborted` if `abort` fires before the record is finalized,
    /// any fatal specialist error, or an archive error. Nothing is archived on error.
    pub fn run(&self, record: PatientRecord, abort: &AbortHandle) -> SessionResult<SessionOutcome> {
        tracing::info!(
            "session {} started: {}",
            record.id(),
            record.chief_complaint()
        );

        let mut record = record;
        while !record.is_finalized() {
            if abort.is_aborted() {
                tracing::warn!(
                    "session {} aborted at iteration {}",
                    record.id(),
                    record.iterations()
                );
                return Err(SessionError::SessionAborted {
                    case_id: record.id().to_string(),
                    iteration: record.iterations(),
                });
            }

            let (_, next) = self.advance(&record).inspect_err(|e| {
                tracing::error!("session {} failed: {}", record.id(), e);
            })?;
            record = next;
        }

        let termination = record.termination().cloned().ok_or_else(|| {
            SessionError::InvalidState(format!("record {} has no termination", record.id()))
        })?;
        let report = HandoffReport::from_record(&record, Utc::now())?;
        let markdown = self.reports.render_markdown(&report);
        let archived_to = match &self.archive {
            Some(archive) => Some(archive.store(&record, &markdown)?),
            None => None,
        };

        tracing::info!(
            "session {} finished after {} step(s): {} ({})",
            record.id(),
            record.steps(),
            record.final_diagnosis().unwrap_or(UNDETERMINED_DIAGNOSIS),
            termination
        );

        Ok(SessionOutcome {
            record,
            termination,
            report,
            markdown,
            archived_to,
        })
    }

    /// Perform one step and return the action taken with the updated record.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` for a finalized record, or the session error a
    /// specialist failure maps to once its retries are spent. `record` is left unmodified.
    pub fn advance(&self, record: &PatientRecord) -> SessionResult<(NextAction, PatientRecord)> {
        record.ensure_open()?;
        let action = self.choose_action(record)?;
        tracing::debug!(
            "session {} step {}: {}",
            record.id(),
            record.steps() + 1,
            action
        );

        let mut next = record.clone();
        next.record_step();

        match &action {
            NextAction::Finalize(termination) => self.finalize(&mut next, termination.clone()),
            _ => {
                let request = action.request(record).ok_or_else(|| {
                    SessionError::InvalidState(format!("action '{}' has no request", action))
                })?;
                let update = self.call(record, &request)?;
                self.merge(&mut next, &request, update)?;
                if action.is_evidence_action() {
                    next.record_iteration();
                }
            }
        }

        Ok((action, next))
    }

    /// Ask the policy for the next action, overriding it when a hard bound is reached.
    fn choose_action(&self, record: &PatientRecord) -> SessionResult<NextAction> {
        if record.steps() >= self.config.max_steps() {
            tracing::warn!(
                "session {} hit the step ceiling of {}",
                record.id(),
                self.config.max_steps()
            );
            return Ok(NextAction::Finalize(Termination::MaxIterationsExceeded));
        }

        let action = self.policy.next_action(record, &self.config);
        if action.is_evidence_action() && record.iterations() >= self.config.max_iterations() {
            return Ok(NextAction::Finalize(Termination::MaxIterationsExceeded));
        }
        if action == NextAction::Triage && record.status() != RecordStatus::Intake {
            return Err(SessionError::InvalidState(format!(
                "triage requested for record {} in status {}",
                record.id(),
                record.status()
            )));
        }
        Ok(action)
    }

    /// Call the specialist for `request`, retrying transient and malformed failures within
    /// the configured budgets.
    fn call(
        &self,
        record: &PatientRecord,
        request: &SpecialistRequest,
    ) -> SessionResult<SpecialistUpdate> {
        let role = request.role();
        let specialist = self.registry.get(role)?;
        let policy = self.config.retry();
        let mut attempts = 0u32;
        let mut unavailable_retries = 0u32;
        let mut malformed_retries = 0u32;

        loop {
            attempts += 1;
            let outcome = specialist
                .handle(record, request)
                .and_then(|update| validate_update(request, update));

            let retry = match outcome {
                Ok(update) => {
                    if attempts > 1 {
                        tracing::info!("{} specialist succeeded on attempt {}", role, attempts);
                    }
                    return Ok(update);
                }
                Err(SpecialistError::Unavailable(reason)) => {
                    if unavailable_retries >= policy.max_unavailable_retries {
                        return Err(SessionError::SpecialistUnavailable {
                            role,
                            attempts,
                            reason,
                        });
                    }
                    unavailable_retries += 1;
                    tracing::warn!(
                        "{} specialist unavailable (attempt {}): {}",
                        role,
                        attempts,
                        reason
                    );
                    unavailable_retries
                }
                Err(SpecialistError::Malformed(reason)) => {
                    if malformed_retries >= policy.max_malformed_retries {
                        return Err(SessionError::MalformedSpecialistOutput {
                            role,
                            attempts,
                            reason,
                        });
                    }
                    malformed_retries += 1;
                    tracing::warn!(
                        "{} specialist returned malformed output (attempt {}): {}",
                        role,
                        attempts,
                        reason
                    );
                    malformed_retries
                }
                Err(SpecialistError::Rejected(reason)) => {
                    return Err(SessionError::SpecialistRejected { role, reason });
                }
            };

            let delay = policy.delay_for(retry);
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
    }

    fn merge(
        &self,
        next: &mut PatientRecord,
        request: &SpecialistRequest,
        update: SpecialistUpdate,
    ) -> SessionResult<()> {
        next.ensure_open()?;
        let now = Utc::now();
        let role = update.role();

        match update {
            SpecialistUpdate::Triage(triage) => self.merge_triage(next, triage),
            SpecialistUpdate::Differential(update) => {
                let top = update
                    .differential
                    .top()
                    .map(|h| format!("{} ({:.0}%)", h.condition, h.probability * 100.0))
                    .unwrap_or_else(|| "empty".into());
                let version = next
                    .push_differential(update.differential, update.rationale, now)
                    .version;
                next.log(now, role.as_str(), format!("differential v{}: {}", version, top));
            }
            SpecialistUpdate::Lab(lab) => {
                let summary = lab.to_string();
                next.append_evidence(EvidenceItem::new(role, EvidencePayload::Lab(lab), now));
                next.log(now, role.as_str(), summary);
            }
            SpecialistUpdate::Imaging(report) => {
                let summary = format!(
                    "{} {}: {}",
                    report.modality, report.region, report.impression
                );
                next.append_evidence(EvidenceItem::new(
                    role,
                    EvidencePayload::Imaging(report),
                    now,
                ));
                next.log(now, role.as_str(), summary);
            }
            SpecialistUpdate::Literature(summary) => {
                next.log(now, role.as_str(), request.describe());
                next.add_research_note(summary);
            }
        }
        Ok(())
    }

    fn merge_triage(&self, next: &mut PatientRecord, update: TriageUpdate) {
        let now = Utc::now();
        let actor = SpecialistRole::Triage.as_str();
        next.record_triage_attempt();

        match update {
            TriageUpdate::Assessment {
                summary,
                risk,
                red_flags,
            } => {
                next.log(now, actor, format!("triage complete, risk {}", risk));
                next.complete_triage(summary, risk, red_flags);
            }
            TriageUpdate::Emergency { condition, action } => {
                tracing::warn!("session {} escalated: {}", next.id(), condition);
                next.log(now, actor, format!("EMERGENCY: {}", condition));
                self.finalize(
                    next,
                    Termination::EmergencyEscalation { condition, action },
                );
            }
            TriageUpdate::Clarify { question } => {
                next.log(now, actor, format!("asked: {}", question));
                let answer = self.interview.ask(&question);
                if let Some(answer) = &answer {
                    next.extend_complaint(answer);
                    next.append_evidence(EvidenceItem::new(
                        SpecialistRole::Triage,
                        EvidencePayload::History(HistoryNote {
                            question: Some(question),
                            answer: answer.clone(),
                        }),
                        now,
                    ));
                    next.log(now, "patient", answer.clone());
                }

                let attempts_spent = next.triage_attempts() >= self.config.max_triage_attempts();
                if answer.is_none() || attempts_spent {
                    tracing::warn!(
                        "session {} proceeding with incomplete triage after {} attempt(s)",
                        next.id(),
                        next.triage_attempts()
                    );
                    let summary = format!(
                        "{}. Triage incomplete after {} attempt(s).",
                        next.chief_complaint(),
                        next.triage_attempts()
                    );
                    let risk = if next.vitals().is_stable() {
                        RiskLevel::Moderate
                    } else {
                        RiskLevel::High
                    };
                    next.log(now, actor, "proceeding with available information");
                    next.complete_triage(summary, risk, Vec::new());
                }
            }
        }
    }

    fn finalize(&self, next: &mut PatientRecord, termination: Termination) {
        let now = Utc::now();
        let diagnosis = match &termination {
            Termination::EmergencyEscalation { condition, .. } => condition.clone(),
            _ => next
                .top_hypothesis()
                .map(|h| h.condition.to_string())
                .unwrap_or_else(|| UNDETERMINED_DIAGNOSIS.to_string()),
        };
        next.log(
            now,
            "judge",
            format!("finalized: {} ({})", diagnosis, termination),
        );
        tracing::info!(
            "session {} finalized: {} ({})",
            next.id(),
            diagnosis,
            termination
        );
        next.finalize(termination, diagnosis, now);
    }
}

/// Reject updates that do not answer the request they were produced for, and normalize the
/// ones that do so they are keyed the same way the judge and the hypothesis specialist look
/// them up.
fn validate_update(
    request: &SpecialistRequest,
    mut update: SpecialistUpdate,
) -> Result<SpecialistUpdate, SpecialistError> {
    if update.role() != request.role() {
        return Err(SpecialistError::Malformed(format!(
            "expected a {} update for '{}'",
            request.role(),
            request.describe()
        )));
    }

    match (request, &mut update) {
        (SpecialistRequest::Lab(order), SpecialistUpdate::Lab(lab)) => {
            let spec = labs::lookup(&order.test)
                .filter(|ordered| {
                    labs::lookup(&lab.test_name).is_some_and(|resulted| resulted.code == ordered.code)
                })
                .ok_or_else(|| {
                    SpecialistError::Malformed(format!(
                        "ordered {} but received {}",
                        order.test, lab.test_name
                    ))
                })?;
            if !lab.value.is_finite() {
                return Err(SpecialistError::Malformed(format!(
                    "{} value is not finite",
                    lab.test_name
                )));
            }
            if !lab.unit.trim().is_empty() && !lab.unit.trim().eq_ignore_ascii_case(spec.unit) {
                return Err(SpecialistError::Malformed(format!(
                    "{} reported in {} but the panel uses {}",
                    spec.code, lab.unit, spec.unit
                )));
            }
            lab.test_name = spec.code.to_string();
            lab.unit = spec.unit.to_string();
            lab.reference_range = spec.range;
            lab.flag = spec.classify(lab.value);
        }
        (SpecialistRequest::Imaging(order), SpecialistUpdate::Imaging(report)) => {
            if order.modality != report.modality
                || !order.region.trim().eq_ignore_ascii_case(report.region.trim())
            {
                return Err(SpecialistError::Malformed(format!(
                    "ordered {} {} but received {} {}",
                    order.modality, order.region, report.modality, report.region
                )));
            }
            report.region = order.region.clone();
        }
        (SpecialistRequest::Literature(query), SpecialistUpdate::Literature(summary)) => {
            if summary.query != query.query {
                tracing::debug!(
                    "literature reply answered '{}', recording it under '{}'",
                    summary.query,
                    query.query
                );
                summary.query = query.query.clone();
            }
        }
        _ => {}
    }
    Ok(update)
}
