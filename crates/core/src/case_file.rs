//! Case files: an intake plus the hidden data the mock clinical tools draw on.
//!
//! ```yaml
//! intake:
//!   age: 45
//!   sex: male
//!   history: hypertension
//!   chief_complaint: chest pain radiating to the left arm
//! simulation: cardiac_ischemia
//! recorded_labs:
//!   TROPONIN: 0.31
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::intake::PatientIntake;
use crate::knowledge::KnowledgeBase;
use crate::labs;
use crate::record::CaseData;
use crate::{SessionError, SessionResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaseFile {
    pub intake: PatientIntake,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub recorded_labs: BTreeMap<String, f64>,
}

impl CaseFile {
    /// Load a case file, choosing JSON or YAML by extension.
    ///
    /// # Errors
    ///
    /// Returns a read or parse error, or `SessionError::InvalidInput` if the content fails
    /// validation.
    pub fn load(path: &Path) -> SessionResult<Self> {
        let content = fs::read_to_string(path).map_err(SessionError::FileRead)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let case: CaseFile = if is_json {
            serde_json::from_str(&content).map_err(SessionError::Deserialization)?
        } else {
            serde_yaml::from_str(&content).map_err(SessionError::YamlDeserialization)?
        };
        case.validate()?;
        Ok(case)
    }

    /// Check the intake, the simulation profile and every recorded lab.
    pub fn validate(&self) -> SessionResult<()> {
        self.intake.validate()?;

        if let Some(profile) = &self.simulation {
            if KnowledgeBase::builtin().find(profile).is_none() {
                return Err(SessionError::InvalidInput(format!(
                    "unknown simulation profile '{}'",
                    profile
                )));
            }
        }

        for (test, value) in &self.recorded_labs {
            if labs::lookup(test).is_none() {
                return Err(SessionError::InvalidInput(format!(
                    "recorded lab '{}' is not on the supported panel",
                    test
                )));
            }
            if !value.is_finite() {
                return Err(SessionError::InvalidInput(format!(
                    "recorded lab '{}' has a non-finite value",
                    test
                )));
            }
        }
        Ok(())
    }

    /// Hidden data carried on the record, with lab names normalised to panel codes.
    pub fn case_data(&self) -> CaseData {
        let recorded_labs = self
            .recorded_labs
            .iter()
            .map(|(name, value)| {
                let code = labs::lookup(name)
                    .map(|spec| spec.code.to_string())
                    .unwrap_or_else(|| name.to_uppercase());
                (code, *value)
            })
            .collect();
        CaseData {
            simulation: self.simulation.clone(),
            recorded_labs,
        }
    }
}
