//! Candidate promotion pipeline (§4.10). The `pending -> *` monotonic
//! guard is enforced here (re-checked under the row lock an `UPDATE ...
//! WHERE status = 'pending'` gives us) rather than relying solely on the
//! table's `CHECK` constraint, which only constrains the *set* of allowed
//! values, not the transition.

use async_trait::async_trait;

use orchestrator_core::{
    Candidate, CandidateFilter, CandidateRepository, CandidateTransition, OrchestratorError,
    Result,
};

use crate::rows::{map_sqlx_error, row_to_candidate};
use crate::SqliteStore;

#[async_trait]
impl CandidateRepository for SqliteStore {
    async fn insert(&self, candidate: orchestrator_core::NewCandidate) -> Result<Candidate> {
        let now = chrono::Utc::now();
        let result = sqlx::query(
            "INSERT INTO candidates (content, confidence, source_file, source_run_id, source_task_id, status, category, extracted_at)
             VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(&candidate.content)
        .bind(candidate.confidence.to_string())
        .bind(&candidate.source_file)
        .bind(&candidate.source_run_id)
        .bind(&candidate.source_task_id)
        .bind(&candidate.category)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.find_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| OrchestratorError::CandidateNotFound { id: result.last_insert_rowid() })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Candidate>> {
        let row = sqlx::query("SELECT * FROM candidates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_candidate).transpose()
    }

    async fn find_by_filter(&self, filter: CandidateFilter) -> Result<Vec<Candidate>> {
        let mut qb = sqlx::QueryBuilder::new("SELECT * FROM candidates");
        let mut has_conditions = false;

        macro_rules! in_clause {
            ($field:expr, $values:expr, $to_string:expr) => {
                if let Some(values) = $values {
                    if !values.is_empty() {
                        qb.push(if has_conditions { " AND " } else { " WHERE " });
                        qb.push($field);
                        qb.push(" IN (");
                        let mut sep = qb.separated(", ");
                        for v in values {
                            sep.push_bind($to_string(v));
                        }
                        qb.push(")");
                        has_conditions = true;
                    }
                }
            };
        }

        in_clause!("status", &filter.status, |s: &orchestrator_core::CandidateStatus| s.to_string());
        in_clause!("confidence", &filter.confidence, |c: &orchestrator_core::Confidence| c.to_string());
        in_clause!("category", &filter.category, |s: &String| s.clone());
        in_clause!("source_file", &filter.source_file, |s: &String| s.clone());
        in_clause!("source_run_id", &filter.source_run_id, |s: &String| s.clone());
        in_clause!("source_task_id", &filter.source_task_id, |s: &String| s.clone());

        qb.push(" ORDER BY extracted_at DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ");
            qb.push_bind(offset);
        }

        let rows = qb.build().fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        rows.iter().map(row_to_candidate).collect()
    }

    async fn update(&self, id: i64, content: Option<String>, category: Option<String>) -> Result<Candidate> {
        let existing = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| OrchestratorError::CandidateNotFound { id })?;
        let new_content = content.unwrap_or(existing.content);
        let new_category = category.or(existing.category);
        sqlx::query("UPDATE candidates SET content = ?, category = ? WHERE id = ?")
            .bind(&new_content)
            .bind(&new_category)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        self.find_by_id(id).await?.ok_or_else(|| OrchestratorError::CandidateNotFound { id })
    }

    async fn update_status(
        &self,
        id: i64,
        transition: CandidateTransition,
        reviewed_by: Option<String>,
    ) -> Result<Candidate> {
        let now = chrono::Utc::now();
        let (status, promoted_learning_id, rejection_reason) = match &transition {
            CandidateTransition::Promoted { learning_id } => ("promoted", Some(*learning_id), None),
            CandidateTransition::Rejected { reason } => ("rejected", None, Some(reason.clone())),
            CandidateTransition::Merged { absorbing_learning_id } => {
                ("merged", *absorbing_learning_id, None)
            }
        };

        let result = sqlx::query(
            "UPDATE candidates SET status = ?, promoted_learning_id = ?, rejection_reason = ?, reviewed_at = ?, reviewed_by = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(status)
        .bind(promoted_learning_id)
        .bind(&rejection_reason)
        .bind(now)
        .bind(&reviewed_by)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            let existing = self.find_by_id(id).await?;
            return match existing {
                None => Err(OrchestratorError::CandidateNotFound { id }),
                Some(c) => Err(OrchestratorError::validation(format!(
                    "candidate {id} has already been reviewed (status {})",
                    c.status
                ))),
            };
        }

        self.find_by_id(id).await?.ok_or_else(|| OrchestratorError::CandidateNotFound { id })
    }
}
