//! Patient interview capability used for triage clarification.

use std::collections::VecDeque;
use std::sync::Mutex;

pub trait PatientInterview: Send + Sync {
    /// Put a question to the patient. `None` means no answer is available and triage should
    /// proceed with what it has.
    fn ask(&self, question: &str) -> Option<String>;
}

/// Non-interactive sessions: every question goes unanswered.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInterview;

impl PatientInterview for NoInterview {
    fn ask(&self, _question: &str) -> Option<String> {
        None
    }
}

/// Answers questions from a fixed script, in order.
#[derive(Debug, Default)]
pub struct ScriptedInterview {
    answers: Mutex<VecDeque<String>>,
}

impl ScriptedInterview {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
        }
    }
}

impl PatientInterview for ScriptedInterview {
    fn ask(&self, _question: &str) -> Option<String> {
        let mut answers = match self.answers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        answers
            .pop_front()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_answers_in_order_then_none() {
        let interview = ScriptedInterview::new(["since this morning", "  "]);
        assert_eq!(interview.ask("when?").as_deref(), Some("since this morning"));
        assert_eq!(interview.ask("anything else?"), None);
        assert_eq!(interview.ask("still there?"), None);
    }

    #[test]
    fn no_interview_never_answers() {
        assert_eq!(NoInterview.ask("where does it hurt?"), None);
    }
}
