//! Supported laboratory panel and result flagging.

use serde::{Deserialize, Serialize};

/// Inclusive reference interval for a lab test.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRange {
    pub low: f64,
    pub high: f64,
}

impl std::fmt::Display for ReferenceRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

/// Interpretation flag attached to a lab value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabFlag {
    Normal,
    High,
    Low,
    Critical,
}

impl LabFlag {
    pub fn is_abnormal(self) -> bool {
        !matches!(self, LabFlag::Normal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LabFlag::Normal => "NORMAL",
            LabFlag::High => "HIGH",
            LabFlag::Low => "LOW",
            LabFlag::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for LabFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A test on the supported panel.
#[derive(Debug, PartialEq)]
pub struct LabSpec {
    /// Canonical upper-case code, e.g. `TROPONIN`.
    pub code: &'static str,
    pub unit: &'static str,
    pub range: ReferenceRange,
    /// Lower-case synonyms accepted when ordering.
    pub aliases: &'static [&'static str],
}

impl LabSpec {
    /// Flag `value` against this test's reference range.
    ///
    /// Values beyond twice the upper limit, or below half the lower limit, are `CRITICAL`.
    pub fn classify(&self, value: f64) -> LabFlag {
        let ReferenceRange { low, high } = self.range;
        if high > 0.0 && value > high * 2.0 {
            LabFlag::Critical
        } else if value > high {
            LabFlag::High
        } else if low > 0.0 && value < low * 0.5 {
            LabFlag::Critical
        } else if value < low {
            LabFlag::Low
        } else {
            LabFlag::Normal
        }
    }
}

const fn spec(
    code: &'static str,
    low: f64,
    high: f64,
    unit: &'static str,
    aliases: &'static [&'static str],
) -> LabSpec {
    LabSpec {
        code,
        unit,
        range: ReferenceRange { low, high },
        aliases,
    }
}

/// Supported lab panel, in the order the judge falls back to when no hypothesis-specific
/// test remains.
pub static LAB_PANEL: &[LabSpec] = &[
    spec("WBC", 4.5, 11.0, "x10^9/L", &["leukocyte", "white blood cell", "white cell"]),
    spec("CRP", 0.0, 10.0, "mg/L", &["c-reactive protein"]),
    spec("TROPONIN", 0.0, 0.04, "ng/mL", &["trop", "troponin i", "troponin t"]),
    spec("D-DIMER", 0.0, 0.5, "mg/L FEU", &["d dimer", "ddimer"]),
    spec("LACTATE", 0.5, 2.2, "mmol/L", &["lactic acid"]),
    spec("HGB", 13.5, 17.5, "g/dL", &["hemoglobin", "haemoglobin", "hb"]),
    spec("PLT", 150.0, 450.0, "x10^9/L", &["platelet", "platelets"]),
    spec("NA", 135.0, 145.0, "mmol/L", &["sodium", "na+"]),
    spec("K", 3.5, 5.0, "mmol/L", &["potassium", "k+"]),
    spec("CREATININE", 0.7, 1.3, "mg/dL", &["cr", "creat"]),
    spec("GLUCOSE", 70.0, 100.0, "mg/dL", &["blood sugar", "glu"]),
    spec("TSH", 0.4, 4.0, "mIU/L", &["thyroid stimulating hormone"]),
    spec("BNP", 0.0, 100.0, "pg/mL", &["brain natriuretic peptide"]),
    spec("LIPASE", 0.0, 160.0, "U/L", &[]),
];

/// Look up a test by code or alias, case-insensitively.
pub fn lookup(name: &str) -> Option<&'static LabSpec> {
    let wanted = name.trim();
    LAB_PANEL.iter().find(|spec| {
        spec.code.eq_ignore_ascii_case(wanted)
            || spec
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(wanted))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_accepts_codes_and_aliases() {
        assert_eq!(lookup("troponin").unwrap().code, "TROPONIN");
        assert_eq!(lookup(" Hemoglobin ").unwrap().code, "HGB");
        assert_eq!(lookup("D-Dimer").unwrap().code, "D-DIMER");
        assert!(lookup("unobtainium").is_none());
    }

    #[test]
    fn classify_covers_every_flag() {
        let wbc = lookup("WBC").unwrap();
        assert_eq!(wbc.classify(7.0), LabFlag::Normal);
        assert_eq!(wbc.classify(14.0), LabFlag::High);
        assert_eq!(wbc.classify(25.0), LabFlag::Critical);
        assert_eq!(wbc.classify(3.0), LabFlag::Low);
        assert_eq!(wbc.classify(1.0), LabFlag::Critical);
    }

    #[test]
    fn zero_lower_bound_never_flags_low() {
        let troponin = lookup("TROPONIN").unwrap();
        assert_eq!(troponin.classify(0.0), LabFlag::Normal);
        assert_eq!(troponin.classify(0.06), LabFlag::High);
        assert_eq!(troponin.classify(0.5), LabFlag::Critical);
    }

    #[test]
    fn flags_serialize_upper_case() {
        assert_eq!(serde_json::to_string(&LabFlag::Critical).unwrap(), "\"CRITICAL\"");
        assert_eq!(LabFlag::High.to_string(), "HIGH");
    }
}
