//! Literature consults over a [`LiteratureIndex`].

use std::sync::Arc;

use crate::constants::LITERATURE_SNIPPET_LIMIT;
use crate::record::PatientRecord;
use crate::retrieval::{LiteratureIndex, LiteratureSummary, Snippet};
use crate::specialist::{
    Specialist, SpecialistError, SpecialistRequest, SpecialistRole, SpecialistUpdate,
};

pub struct LiteratureResearcher {
    index: Arc<dyn LiteratureIndex>,
    limit: usize,
}

impl LiteratureResearcher {
    pub fn new(index: Arc<dyn LiteratureIndex>) -> Self {
        Self {
            index,
            limit: LITERATURE_SNIPPET_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn synthesize(query: &str, snippets: &[Snippet]) -> String {
        let Some(best) = snippets.first() else {
            return format!("No literature found for '{}'.", query);
        };
        let lead = best
            .text
            .split_inclusive(". ")
            .next()
            .unwrap_or(&best.text)
            .trim();
        format!(
            "{} source(s) reviewed for '{}'. Most relevant ({}): {}",
            snippets.len(),
            query,
            best.source,
            lead
        )
    }
}

impl std::fmt::Debug for LiteratureResearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiteratureResearcher")
            .field("limit", &self.limit)
            .finish()
    }
}

impl Specialist for LiteratureResearcher {
    fn role(&self) -> SpecialistRole {
        SpecialistRole::Research
    }

    fn handle(
        &self,
        _record: &PatientRecord,
        request: &SpecialistRequest,
    ) -> Result<SpecialistUpdate, SpecialistError> {
        let SpecialistRequest::Literature(query) = request else {
            return Err(SpecialistError::Rejected(format!(
                "research specialist cannot serve '{}'",
                request.describe()
            )));
        };
        if query.query.trim().is_empty() {
            return Err(SpecialistError::Malformed("empty literature query".into()));
        }

        let snippets = self.index.search(&query.query, self.limit);
        let synthesis = Self::synthesize(&query.query, &snippets);
        Ok(SpecialistUpdate::Literature(LiteratureSummary {
            query: query.query.clone(),
            snippets,
            synthesis,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::{PatientIntake, Sex, Vitals};
    use crate::retrieval::InMemoryLiteratureIndex;
    use crate::specialist::LiteratureQuery;
    use chrono::Utc;

    fn consult(query: &str) -> LiteratureSummary {
        let intake = PatientIntake::new(45, Sex::Male, "", "chest pain", Vitals::default()).unwrap();
        let record = PatientRecord::from_intake(&intake, Utc::now()).unwrap();
        let researcher =
            LiteratureResearcher::new(Arc::new(InMemoryLiteratureIndex::with_builtin_guidelines()));
        let request = SpecialistRequest::Literature(LiteratureQuery {
            query: query.into(),
        });
        match researcher.handle(&record, &request).unwrap() {
            SpecialistUpdate::Literature(summary) => summary,
            other => panic!("unexpected update {other:?}"),
        }
    }

    #[test]
    fn consult_summarises_best_snippet() {
        let summary = consult("Acute coronary syndrome troponin");
        assert!(!summary.snippets.is_empty());
        assert!(summary.snippets.len() <= LITERATURE_SNIPPET_LIMIT);
        assert!(summary.synthesis.contains("acs-guideline"));
    }

    #[test]
    fn consult_without_hits_says_so() {
        let summary = consult("zzzz qqqq");
        assert!(summary.snippets.is_empty());
        assert!(summary.synthesis.starts_with("No literature found"));
    }
}
