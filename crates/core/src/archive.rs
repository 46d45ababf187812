//! On-disk archive of finalized sessions.
//!
//! Each finalized record is written to a sharded directory under the archive root:
//!
//! ```text
//! <archive>/<id[0..2]>/<id[2..4]>/<id>/
//!     record.json
//!     report.md
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{RECORD_JSON_FILENAME, REPORT_MARKDOWN_FILENAME};
use crate::record::PatientRecord;
use crate::uuid::CaseId;
use crate::{SessionError, SessionResult};

#[derive(Debug, Clone)]
pub struct ArchiveService {
    root: PathBuf,
}

impl ArchiveService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn case_dir(&self, case_id: CaseId) -> PathBuf {
        case_id.sharded_dir(&self.root)
    }

    /// Write the record and its rendered report.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` for a record that is not finalized, or an I/O or
    /// serialization error if writing fails.
    pub fn store(&self, record: &PatientRecord, report_markdown: &str) -> SessionResult<PathBuf> {
        if !record.is_finalized() {
            return Err(SessionError::InvalidState(format!(
                "refusing to archive record {} before finalization",
                record.id()
            )));
        }

        let dir = self.case_dir(record.id());
        fs::create_dir_all(&dir).map_err(SessionError::ArchiveDirCreation)?;

        let json = serde_json::to_string_pretty(record).map_err(SessionError::Serialization)?;
        fs::write(dir.join(RECORD_JSON_FILENAME), json).map_err(SessionError::FileWrite)?;
        fs::write(dir.join(REPORT_MARKDOWN_FILENAME), report_markdown)
            .map_err(SessionError::FileWrite)?;

        tracing::info!("archived case {} to {}", record.id(), dir.display());
        Ok(dir)
    }

    pub fn load(&self, case_id: CaseId) -> SessionResult<PatientRecord> {
        let path = self.case_dir(case_id).join(RECORD_JSON_FILENAME);
        let json = fs::read_to_string(path).map_err(SessionError::FileRead)?;
        serde_json::from_str(&json).map_err(SessionError::Deserialization)
    }

    pub fn load_report(&self, case_id: CaseId) -> SessionResult<String> {
        let path = self.case_dir(case_id).join(REPORT_MARKDOWN_FILENAME);
        fs::read_to_string(path).map_err(SessionError::FileRead)
    }
}
