//! Patient intake: demographics, vitals and the chief complaint that open a session.

use serde::{Deserialize, Serialize};

use crate::{NonEmptyText, SessionError, SessionResult};

/// Patient sex as collected at intake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl std::str::FromStr for Sex {
    type Err = SessionError;

    /// Accepts `m`, `male`, `f` and `female`, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "m" | "male" => Ok(Sex::Male),
            "f" | "female" => Ok(Sex::Female),
            other => Err(SessionError::InvalidInput(format!(
                "sex must be 'male', 'female', 'm' or 'f', got '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Sex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sex::Male => f.write_str("Male"),
            Sex::Female => f.write_str("Female"),
        }
    }
}

/// Bedside observations. Every field is optional; present values are range-checked.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bp_systolic: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bp_diastolic: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spo2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resp_rate: Option<u16>,
}

impl Vitals {
    /// Check every present value against physiological bounds.
    pub fn validate(&self) -> SessionResult<()> {
        fn check<T: PartialOrd + Copy + std::fmt::Display>(
            name: &str,
            value: Option<T>,
            low: T,
            high: T,
        ) -> SessionResult<()> {
            match value {
                Some(v) if v < low || v > high => Err(SessionError::InvalidInput(format!(
                    "{} must be between {} and {}, got {}",
                    name, low, high, v
                ))),
                _ => Ok(()),
            }
        }

        check("bp_systolic", self.bp_systolic, 0, 300)?;
        check("bp_diastolic", self.bp_diastolic, 0, 200)?;
        check("heart_rate", self.heart_rate, 0, 300)?;
        check("temp_c", self.temp_c, 20.0, 45.0)?;
        check("spo2", self.spo2, 0.0, 100.0)?;
        check("resp_rate", self.resp_rate, 0, 100)?;
        Ok(())
    }

    /// False when heart rate, oxygen saturation or systolic pressure is out of safe bounds.
    pub fn is_stable(&self) -> bool {
        if matches!(self.heart_rate, Some(hr) if !(40..=120).contains(&hr)) {
            return false;
        }
        if matches!(self.spo2, Some(spo2) if spo2 < 90.0) {
            return false;
        }
        if matches!(self.bp_systolic, Some(sbp) if sbp < 90) {
            return false;
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self == &Vitals::default()
    }

    /// Compact one-line rendering, e.g. `HR 88, SpO2 97%`.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let (Some(sys), Some(dia)) = (self.bp_systolic, self.bp_diastolic) {
            parts.push(format!("BP {}/{}", sys, dia));
        } else if let Some(sys) = self.bp_systolic {
            parts.push(format!("SBP {}", sys));
        }
        if let Some(hr) = self.heart_rate {
            parts.push(format!("HR {}", hr));
        }
        if let Some(t) = self.temp_c {
            parts.push(format!("T {:.1}C", t));
        }
        if let Some(s) = self.spo2 {
            parts.push(format!("SpO2 {}%", s));
        }
        if let Some(rr) = self.resp_rate {
            parts.push(format!("RR {}", rr));
        }
        if parts.is_empty() {
            "not recorded".into()
        } else {
            parts.join(", ")
        }
    }
}

/// Demographic block of the Patient Record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    pub age: u8,
    pub sex: Sex,
    /// Free-text past medical history.
    #[serde(default)]
    pub history: String,
}

/// Everything needed to open a diagnostic session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatientIntake {
    pub age: u8,
    pub sex: Sex,
    #[serde(default)]
    pub history: String,
    pub chief_complaint: NonEmptyText,
    #[serde(default, skip_serializing_if = "Vitals::is_empty")]
    pub vitals: Vitals,
}

impl PatientIntake {
    /// Build and validate an intake.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidInput` if the age is outside 1..=199, the complaint is
    /// blank or a vital sign is out of range.
    pub fn new(
        age: u8,
        sex: Sex,
        history: impl Into<String>,
        chief_complaint: impl AsRef<str>,
        vitals: Vitals,
    ) -> SessionResult<Self> {
        let intake = Self {
            age,
            sex,
            history: history.into(),
            chief_complaint: NonEmptyText::new(chief_complaint)?,
            vitals,
        };
        intake.validate()?;
        Ok(intake)
    }

    /// Validate an intake that was deserialized rather than built with [`PatientIntake::new`].
    pub fn validate(&self) -> SessionResult<()> {
        if !(1..200).contains(&u16::from(self.age)) {
            return Err(SessionError::InvalidInput(format!(
                "age must be between 1 and 199, got {}",
                self.age
            )));
        }
        self.vitals.validate()
    }

    pub fn demographics(&self) -> Demographics {
        Demographics {
            age: self.age,
            sex: self.sex,
            history: self.history.trim().to_string(),
        }
    }
}
