//! Opaque reasoning capability and the specialist that wraps it.
//!
//! A [`ReasoningService`] turns a prompt into text; [`PromptedSpecialist`] renders the role
//! instruction and clinical summary, calls the service and parses the reply into a
//! [`SpecialistUpdate`]. Service errors are classified with [`is_retriable_error`] so the
//! orchestrator's retry budgets apply unchanged.

use crate::prompts::{self, Prompts};
use crate::record::PatientRecord;
use crate::retry::is_retriable_error;
use crate::specialist::{
    Specialist, SpecialistError, SpecialistRequest, SpecialistRole, SpecialistUpdate,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningRequest {
    pub role: SpecialistRole,
    pub system: String,
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ReasoningRequest {
    pub fn new(role: SpecialistRole, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            role,
            system: system.into(),
            prompt: prompt.into(),
            temperature: Some(0.0),
            max_tokens: Some(2048),
        }
    }
}

/// Error reported by a reasoning backend, carried as its message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ReasoningError(pub String);

pub trait ReasoningService: Send + Sync {
    fn generate(&self, request: &ReasoningRequest) -> Result<String, ReasoningError>;
}

/// Extract the JSON object from a model reply, tolerating code fences and surrounding prose.
pub fn extract_json(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// A specialist whose work is done by a [`ReasoningService`].
#[derive(Debug)]
pub struct PromptedSpecialist<R> {
    role: SpecialistRole,
    service: R,
    prompts: Prompts,
}

impl<R: ReasoningService> PromptedSpecialist<R> {
    pub fn new(role: SpecialistRole, service: R) -> Self {
        Self {
            role,
            service,
            prompts: Prompts::default(),
        }
    }

    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    fn parse(&self, reply: &str) -> Result<SpecialistUpdate, SpecialistError> {
        let json = extract_json(reply)
            .ok_or_else(|| SpecialistError::Malformed("reply contains no JSON object".into()))?;
        let update: SpecialistUpdate = serde_json::from_str(json)
            .map_err(|e| SpecialistError::Malformed(format!("unparsable reply: {}", e)))?;
        if update.role() != self.role {
            return Err(SpecialistError::Malformed(format!(
                "expected a {} update, got a {} update",
                self.role,
                update.role()
            )));
        }
        Ok(update)
    }
}

impl<R: ReasoningService> Specialist for PromptedSpecialist<R> {
    fn role(&self) -> SpecialistRole {
        self.role
    }

    fn handle(
        &self,
        record: &PatientRecord,
        request: &SpecialistRequest,
    ) -> Result<SpecialistUpdate, SpecialistError> {
        if request.role() != self.role {
            return Err(SpecialistError::Rejected(format!(
                "{} specialist cannot serve '{}'",
                self.role,
                request.describe()
            )));
        }

        let reasoning_request = ReasoningRequest::new(
            self.role,
            self.prompts.get(self.role),
            prompts::render(record, request),
        );
        let reply = self.service.generate(&reasoning_request).map_err(|e| {
            if is_retriable_error(&e.0) {
                SpecialistError::Unavailable(e.0)
            } else {
                SpecialistError::Rejected(e.0)
            }
        })?;
        self.parse(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::{PatientIntake, Sex, Vitals};
    use crate::specialist::{HypothesisRequest, TriageUpdate};
    use chrono::Utc;

    struct Canned(Result<String, ReasoningError>);

    impl ReasoningService for Canned {
        fn generate(&self, _request: &ReasoningRequest) -> Result<String, ReasoningError> {
            self.0.clone()
        }
    }

    fn record() -> PatientRecord {
        let intake = PatientIntake::new(45, Sex::Male, "", "chest pain", Vitals::default()).unwrap();
        PatientRecord::from_intake(&intake, Utc::now()).unwrap()
    }

    fn call(role: SpecialistRole, reply: Result<&str, &str>) -> Result<SpecialistUpdate, SpecialistError> {
        let service = Canned(
            reply
                .map(str::to_string)
                .map_err(|e| ReasoningError(e.to_string())),
        );
        let request = match role {
            SpecialistRole::Triage => SpecialistRequest::Triage { attempt: 1 },
            _ => SpecialistRequest::Hypotheses(HypothesisRequest::Initial),
        };
        PromptedSpecialist::new(role, service).handle(&record(), &request)
    }

    #[test]
    fn fenced_json_reply_parses() {
        let reply = "Here you go:\n```json\n{\"type\":\"differential\",\"differential\":[{\"condition\":\"ACS\",\"probability\":0.6}],\"rationale\":\"troponin\"}\n```";
        match call(SpecialistRole::Hypothesis, Ok(reply)).unwrap() {
            SpecialistUpdate::Differential(update) => {
                assert_eq!(update.differential.top_probability(), 0.6)
            }
            other => panic!("unexpected update {other:?}"),
        }
    }

    #[test]
    fn invalid_probabilities_are_malformed() {
        let reply = r#"{"type":"differential","differential":[{"condition":"A","probability":0.9},{"condition":"B","probability":0.9}]}"#;
        assert!(matches!(
            call(SpecialistRole::Hypothesis, Ok(reply)),
            Err(SpecialistError::Malformed(_))
        ));
    }

    #[test]
    fn prose_without_json_is_malformed() {
        assert!(matches!(
            call(SpecialistRole::Triage, Ok("The patient seems fine.")),
            Err(SpecialistError::Malformed(_))
        ));
    }

    #[test]
    fn wrong_update_kind_is_malformed() {
        let reply = r#"{"type":"triage","outcome":"clarify","question":"Where?"}"#;
        assert!(matches!(
            call(SpecialistRole::Hypothesis, Ok(reply)),
            Err(SpecialistError::Malformed(_))
        ));
        assert!(matches!(
            call(SpecialistRole::Triage, Ok(reply)),
            Ok(SpecialistUpdate::Triage(TriageUpdate::Clarify { .. }))
        ));
    }

    #[test]
    fn service_errors_are_classified() {
        assert!(matches!(
            call(SpecialistRole::Triage, Err("503 Service Unavailable")),
            Err(SpecialistError::Unavailable(_))
        ));
        assert!(matches!(
            call(SpecialistRole::Triage, Err("401 invalid api key")),
            Err(SpecialistError::Rejected(_))
        ));
    }
}
