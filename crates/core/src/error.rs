use crate::specialist::SpecialistRole;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid session state: {0}")]
    InvalidState(String),
    #[error("no specialist registered for role {0}")]
    MissingSpecialist(SpecialistRole),

    #[error("{role} specialist unavailable after {attempts} attempt(s): {reason}")]
    SpecialistUnavailable {
        role: SpecialistRole,
        attempts: u32,
        reason: String,
    },
    #[error("{role} specialist returned malformed output after {attempts} attempt(s): {reason}")]
    MalformedSpecialistOutput {
        role: SpecialistRole,
        attempts: u32,
        reason: String,
    },
    #[error("{role} specialist rejected the request: {reason}")]
    SpecialistRejected {
        role: SpecialistRole,
        reason: String,
    },
    #[error("session {case_id} aborted at iteration {iteration}")]
    SessionAborted { case_id: String, iteration: u32 },

    #[error("failed to create archive directory: {0}")]
    ArchiveDirCreation(std::io::Error),
    #[error("failed to write file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize JSON: {0}")]
    Deserialization(serde_json::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),

    #[error("text error: {0}")]
    Text(#[from] medagent_types::TextError),
}

impl SessionError {
    /// True for outcomes caused by a specialist rather than by the caller or the environment.
    pub fn is_specialist_failure(&self) -> bool {
        matches!(
            self,
            SessionError::SpecialistUnavailable { .. }
                | SessionError::MalformedSpecialistOutput { .. }
                | SessionError::SpecialistRejected { .. }
        )
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
