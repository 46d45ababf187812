//! End-to-end sessions over the sample case files shipped with the workspace.

use std::path::PathBuf;
use std::sync::Arc;

use medagent_core::{
    specialists, AbortHandle, ArchiveService, CaseFile, CoreConfig, InMemoryLiteratureIndex,
    Orchestrator, RetryPolicy, Termination,
};
use tempfile::TempDir;

fn cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../cases")
}

fn load(name: &str) -> CaseFile {
    CaseFile::load(&cases_dir().join(name)).expect("sample case should load")
}

fn orchestrator(config: CoreConfig) -> Orchestrator {
    let index = Arc::new(InMemoryLiteratureIndex::with_builtin_guidelines());
    let registry = specialists::default_registry(&config, index);
    Orchestrator::new(config, registry).expect("default registry is complete")
}

#[test]
fn sample_cases_validate() {
    let mut checked = 0;
    for entry in std::fs::read_dir(cases_dir()).unwrap() {
        let path = entry.unwrap().path();
        let case = CaseFile::load(&path).unwrap();
        case.validate()
            .unwrap_or_else(|e| panic!("{} failed validation: {}", path.display(), e));
        checked += 1;
    }
    assert!(checked >= 5);
}

#[test]
fn recorded_troponin_leads_to_coronary_syndrome() {
    let orchestrator = orchestrator(CoreConfig::default().with_retry(RetryPolicy::immediate()));
    let outcome = orchestrator
        .run_case(&load("chest_pain_acs.yaml"), &AbortHandle::new())
        .unwrap();

    assert_eq!(
        outcome.record.final_diagnosis(),
        Some("Acute coronary syndrome")
    );
    let versions = outcome.record.differentials().versions();
    let first = versions[0]
        .differential
        .probability_of("Acute coronary syndrome")
        .unwrap();
    let last = versions[versions.len() - 1]
        .differential
        .probability_of("Acute coronary syndrome")
        .unwrap();
    assert!(last > first);
    assert!(outcome.markdown.contains("TROPONIN"));
}

#[test]
fn thunderclap_headache_escalates() {
    let orchestrator = orchestrator(CoreConfig::default().with_retry(RetryPolicy::immediate()));
    let outcome = orchestrator
        .run_case(&load("thunderclap_headache.yaml"), &AbortHandle::new())
        .unwrap();

    match &outcome.termination {
        Termination::EmergencyEscalation { condition, .. } => {
            assert_eq!(condition, "Suspected subarachnoid hemorrhage")
        }
        other => panic!("expected escalation, got {other:?}"),
    }
    assert!(outcome.record.evidence().is_empty());
}

#[test]
fn every_sample_case_finalizes_and_archives() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = CoreConfig::default()
        .with_retry(RetryPolicy::immediate())
        .with_archive_dir(Some(temp_dir.path().to_path_buf()));
    let max_iterations = config.max_iterations();
    let orchestrator = orchestrator(config);
    let archive = ArchiveService::new(temp_dir.path());

    for name in [
        "chest_pain_acs.yaml",
        "pleuritic_chest_pain.yaml",
        "right_lower_quadrant.yaml",
        "fatigue.json",
        "thunderclap_headache.yaml",
    ] {
        let outcome = orchestrator
            .run_case(&load(name), &AbortHandle::new())
            .unwrap();
        assert!(outcome.record.is_finalized(), "{name}");
        assert!(outcome.record.iterations() <= max_iterations, "{name}");
        assert_eq!(
            outcome.report.low_confidence,
            outcome.termination.is_low_confidence(),
            "{name}"
        );

        let stored = archive.load(outcome.record.id()).unwrap();
        assert_eq!(stored.id(), outcome.record.id());
        assert_eq!(stored.termination(), outcome.record.termination());
        assert_eq!(stored.evidence().len(), outcome.record.evidence().len());
        assert_eq!(
            archive.load_report(outcome.record.id()).unwrap(),
            outcome.markdown
        );
    }
}
