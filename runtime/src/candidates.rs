//! Candidate promotion pipeline (§4.10): promote/reject/merge a pending
//! candidate, turning a promotion into a new `Learning` row. The monotonic
//! `pending -> *` guard itself lives in the repository (backed by a SQL
//! `CHECK` in `orchestrator-db`); this layer owns the cross-repository step
//! of creating the learning a promotion produces.

use std::sync::Arc;

use orchestrator_core::{
    Candidate, CandidateRepository, CandidateTransition, Learning, LearningRepository,
    NewLearning, OrchestratorError, Result,
};

pub struct CandidatePromotionService<C, L> {
    candidates: Arc<C>,
    learnings: Arc<L>,
}

impl<C: CandidateRepository, L: LearningRepository> CandidatePromotionService<C, L> {
    pub fn new(candidates: Arc<C>, learnings: Arc<L>) -> Self {
        Self { candidates, learnings }
    }

    /// Creates the promoted `Learning` from the candidate's content, then
    /// records the transition against the candidate itself.
    pub async fn promote(&self, id: i64, reviewed_by: Option<String>) -> Result<(Candidate, Learning)> {
        let candidate = self
            .candidates
            .find_by_id(id)
            .await?
            .ok_or_else(|| OrchestratorError::CandidateNotFound { id })?;

        let learning = self
            .learnings
            .create(NewLearning {
                content: candidate.content.clone(),
                source_type: "candidate".into(),
                source_ref: Some(candidate.source_file.clone()),
                keywords: None,
                category: candidate.category.clone(),
            })
            .await?;

        let updated = self
            .candidates
            .update_status(
                id,
                CandidateTransition::Promoted { learning_id: learning.id },
                reviewed_by,
            )
            .await?;
        Ok((updated, learning))
    }

    pub async fn reject(&self, id: i64, reason: String, reviewed_by: Option<String>) -> Result<Candidate> {
        self.candidates
            .update_status(id, CandidateTransition::Rejected { reason }, reviewed_by)
            .await
    }

    pub async fn merge(
        &self,
        id: i64,
        absorbing_learning_id: Option<i64>,
        reviewed_by: Option<String>,
    ) -> Result<Candidate> {
        self.candidates
            .update_status(id, CandidateTransition::Merged { absorbing_learning_id }, reviewed_by)
            .await
    }
}
