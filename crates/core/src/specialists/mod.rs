//! Default, deterministic specialist implementations.

pub mod evidence;
pub mod hypothesis;
pub mod imaging;
pub mod research;
pub mod triage;

use std::sync::Arc;

pub use evidence::LabSimulator;
pub use hypothesis::BayesianHypothesisSpecialist;
pub use imaging::ImagingSimulator;
pub use research::LiteratureResearcher;
pub use triage::RuleBasedTriage;

use crate::config::CoreConfig;
use crate::retrieval::LiteratureIndex;
use crate::specialist::SpecialistRegistry;

/// Registry with one default specialist per role.
pub fn default_registry(
    config: &CoreConfig,
    index: Arc<dyn LiteratureIndex>,
) -> SpecialistRegistry {
    SpecialistRegistry::new()
        .with(RuleBasedTriage::new())
        .with(BayesianHypothesisSpecialist::new())
        .with(LabSimulator::new(config.simulation_seed()))
        .with(ImagingSimulator::new())
        .with(LiteratureResearcher::new(index))
}
