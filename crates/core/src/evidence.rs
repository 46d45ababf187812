//! Evidence items and the append-only evidence log.
//!
//! Items are immutable once recorded: the log only hands out shared references and exposes
//! no removal or mutation API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::labs::{LabFlag, ReferenceRange};
use crate::specialist::SpecialistRole;
use crate::uuid::EvidenceId;

/// Where a lab value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabSource {
    /// Produced by the lab simulator.
    Simulated,
    /// Taken from the values recorded in the case file.
    Recorded,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabResult {
    /// Canonical panel code, e.g. `TROPONIN`.
    pub test_name: String,
    pub value: f64,
    pub unit: String,
    pub reference_range: ReferenceRange,
    pub flag: LabFlag,
    pub source: LabSource,
}

impl LabResult {
    /// True when the value lies above the upper reference limit.
    pub fn is_elevated(&self) -> bool {
        self.value > self.reference_range.high
    }

    /// True when the value lies below the lower reference limit.
    pub fn is_depressed(&self) -> bool {
        self.value < self.reference_range.low
    }
}

impl std::fmt::Display for LabResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} {} (range {}) [{}]",
            self.test_name, self.value, self.unit, self.reference_range, self.flag
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Ct,
    Mri,
    Xray,
    #[serde(rename = "US")]
    Ultrasound,
}

impl std::str::FromStr for Modality {
    type Err = crate::SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace(['-', ' '], "").as_str() {
            "CT" => Ok(Modality::Ct),
            "MRI" | "MR" => Ok(Modality::Mri),
            "XRAY" | "XR" | "CXR" => Ok(Modality::Xray),
            "US" | "ULTRASOUND" => Ok(Modality::Ultrasound),
            other => Err(crate::SessionError::InvalidInput(format!(
                "unsupported imaging modality '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Modality::Ct => "CT",
            Modality::Mri => "MRI",
            Modality::Xray => "XRAY",
            Modality::Ultrasound => "US",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImagingReport {
    pub modality: Modality,
    pub region: String,
    pub findings: String,
    pub impression: String,
}

impl ImagingReport {
    /// True when the study reported nothing acute.
    pub fn is_normal(&self) -> bool {
        self.impression.trim().eq_ignore_ascii_case("normal.")
            || self.impression.trim().eq_ignore_ascii_case("normal")
    }
}

/// Patient-reported history gathered during the session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub answer: String,
}

/// Result payload of an evidence item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EvidencePayload {
    Lab(LabResult),
    Imaging(ImagingReport),
    History(HistoryNote),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Lab,
    Imaging,
    History,
}

impl std::fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EvidenceKind::Lab => "lab",
            EvidenceKind::Imaging => "imaging",
            EvidenceKind::History => "history",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: EvidenceId,
    pub ordered_by: SpecialistRole,
    pub payload: EvidencePayload,
    pub recorded_at: DateTime<Utc>,
}

impl EvidenceItem {
    pub fn new(ordered_by: SpecialistRole, payload: EvidencePayload, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: EvidenceId::new(),
            ordered_by,
            payload,
            recorded_at,
        }
    }

    pub fn kind(&self) -> EvidenceKind {
        match self.payload {
            EvidencePayload::Lab(_) => EvidenceKind::Lab,
            EvidencePayload::Imaging(_) => EvidenceKind::Imaging,
            EvidencePayload::History(_) => EvidenceKind::History,
        }
    }

    pub fn as_lab(&self) -> Option<&LabResult> {
        match &self.payload {
            EvidencePayload::Lab(lab) => Some(lab),
            _ => None,
        }
    }

    pub fn as_imaging(&self) -> Option<&ImagingReport> {
        match &self.payload {
            EvidencePayload::Imaging(report) => Some(report),
            _ => None,
        }
    }

    /// One-line description used in prompts and reports.
    pub fn describe(&self) -> String {
        match &self.payload {
            EvidencePayload::Lab(lab) => lab.to_string(),
            EvidencePayload::Imaging(report) => format!(
                "{} {}: {}",
                report.modality, report.region, report.impression
            ),
            EvidencePayload::History(note) => match &note.question {
                Some(q) => format!("Q: {} A: {}", q, note.answer),
                None => note.answer.clone(),
            },
        }
    }
}

/// Append-only, ordered collection of evidence for one session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceLog(Vec<EvidenceItem>);

impl EvidenceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item and return a reference to the stored copy.
    pub(crate) fn append(&mut self, item: EvidenceItem) -> &EvidenceItem {
        self.0.push(item);
        &self.0[self.0.len() - 1]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EvidenceItem> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[EvidenceItem] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, id: EvidenceId) -> Option<&EvidenceItem> {
        self.0.iter().find(|item| item.id == id)
    }

    pub fn labs(&self) -> impl Iterator<Item = &LabResult> {
        self.0.iter().filter_map(EvidenceItem::as_lab)
    }

    pub fn imaging(&self) -> impl Iterator<Item = &ImagingReport> {
        self.0.iter().filter_map(EvidenceItem::as_imaging)
    }

    /// True if a lab with this panel code has already been resulted.
    pub fn has_lab(&self, code: &str) -> bool {
        self.labs().any(|lab| lab.test_name.eq_ignore_ascii_case(code))
    }

    /// True if a study of this modality and region has already been reported.
    pub fn has_imaging(&self, modality: Modality, region: &str) -> bool {
        self.imaging()
            .any(|r| r.modality == modality && r.region.eq_ignore_ascii_case(region))
    }
}

impl<'a> IntoIterator for &'a EvidenceLog {
    type Item = &'a EvidenceItem;
    type IntoIter = std::slice::Iter<'a, EvidenceItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lab(code: &str, value: f64, flag: LabFlag) -> EvidenceItem {
        EvidenceItem::new(
            SpecialistRole::Evidence,
            EvidencePayload::Lab(LabResult {
                test_name: code.into(),
                value,
                unit: "ng/mL".into(),
                reference_range: ReferenceRange { low: 0.0, high: 0.04 },
                flag,
                source: LabSource::Simulated,
            }),
            Utc::now(),
        )
    }

    #[test]
    fn append_preserves_order_and_lookup() {
        let mut log = EvidenceLog::new();
        let first_id = log.append(lab("TROPONIN", 0.2, LabFlag::Critical)).id;
        log.append(lab("CRP", 3.0, LabFlag::Normal));

        assert_eq!(log.len(), 2);
        assert_eq!(log.as_slice()[0].id, first_id);
        assert!(log.get(first_id).is_some());
        assert!(log.has_lab("troponin"));
        assert!(!log.has_lab("WBC"));
    }

    #[test]
    fn payload_serializes_with_kind_tag() {
        let item = lab("TROPONIN", 0.2, LabFlag::Critical);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["payload"]["kind"], "lab");
        assert_eq!(json["payload"]["flag"], "CRITICAL");
        assert_eq!(json["ordered_by"], "evidence");
    }

    #[test]
    fn modality_parses_common_spellings() {
        assert_eq!("x-ray".parse::<Modality>().unwrap(), Modality::Xray);
        assert_eq!("ct".parse::<Modality>().unwrap(), Modality::Ct);
        assert_eq!("Ultrasound".parse::<Modality>().unwrap(), Modality::Ultrasound);
        assert!("pet".parse::<Modality>().is_err());
    }

    #[test]
    fn describe_renders_each_kind() {
        let item = lab("TROPONIN", 0.2, LabFlag::Critical);
        assert!(item.describe().starts_with("TROPONIN: 0.2 ng/mL"));
        assert!(item.as_lab().unwrap().is_elevated());

        let note = EvidenceItem::new(
            SpecialistRole::Triage,
            EvidencePayload::History(HistoryNote {
                question: Some("Where is the pain?".into()),
                answer: "Left side".into(),
            }),
            Utc::now(),
        );
        assert_eq!(note.kind(), EvidenceKind::History);
        assert_eq!(note.describe(), "Q: Where is the pain? A: Left side");
    }
}
