//! The learning corpus and its hybrid-retrieval search (§4.9). `create`
//! writes the corpus row and its inverted-index tokens in one transaction
//! so the two never drift; `search` issues the three progressively
//! relaxed token patterns as three plain SQL queries and hands the
//! resulting rank lists to `orchestrator_core::retrieval::fuse_and_score`,
//! which owns the actual scoring math.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use orchestrator_core::{
    retrieval::{fuse_and_score, RetrievalInput},
    Learning, LearningRepository, LearningSearchResult, NewLearning, OrchestratorError, Result,
};

use crate::rows::{map_sqlx_error, row_to_learning};
use crate::SqliteStore;

/// Positions within this many tokens of each other count as "nearby" for
/// the proximity-window pattern.
const PROXIMITY_WINDOW: i64 = 10;
/// RRF damping constant shared with `orchestrator_core::retrieval`'s tests.
const RRF_K: f64 = 60.0;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

#[async_trait]
impl LearningRepository for SqliteStore {
    async fn create(&self, learning: NewLearning) -> Result<Learning> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let now = Utc::now();
        let keywords_json = learning.keywords.as_ref().map(|k| serde_json::to_string(k).unwrap_or_else(|_| "[]".into()));

        let result = sqlx::query(
            "INSERT INTO learnings (content, source_type, source_ref, created_at, keywords, category, usage_count, outcome_score)
             VALUES (?, ?, ?, ?, ?, ?, 0, NULL)",
        )
        .bind(&learning.content)
        .bind(&learning.source_type)
        .bind(&learning.source_ref)
        .bind(now)
        .bind(&keywords_json)
        .bind(&learning.category)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let learning_id = result.last_insert_rowid();

        for (position, token) in tokenize(&learning.content).into_iter().enumerate() {
            sqlx::query("INSERT INTO learning_tokens (learning_id, position, token) VALUES (?, ?, ?)")
                .bind(learning_id)
                .bind(position as i64)
                .bind(token)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        let row = sqlx::query("SELECT * FROM learnings WHERE id = ?")
            .bind(learning_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let created = row_to_learning(&row)?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(created)
    }

    async fn get(&self, id: i64) -> Result<Option<Learning>> {
        let row = sqlx::query("SELECT * FROM learnings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_learning).transpose()
    }

    async fn list(&self) -> Result<Vec<Learning>> {
        let rows = sqlx::query("SELECT * FROM learnings ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_learning).collect()
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM learnings WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::LearningNotFound { id });
        }
        Ok(())
    }

    async fn update_outcome(&self, id: i64, score: f64) -> Result<Learning> {
        let result = sqlx::query("UPDATE learnings SET outcome_score = ? WHERE id = ?")
            .bind(score)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::LearningNotFound { id });
        }
        self.get(id).await?.ok_or(OrchestratorError::LearningNotFound { id })
    }

    async fn record_usage(&self, id: i64) -> Result<Learning> {
        let result = sqlx::query("UPDATE learnings SET usage_count = usage_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::LearningNotFound { id });
        }
        self.get(id).await?.ok_or(OrchestratorError::LearningNotFound { id })
    }

    async fn search(&self, query: &str, limit: i64, min_score: f64) -> Result<Vec<LearningSearchResult>> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let exact = self.exact_phrase_matches(&tokens).await?;
        let proximity = self.proximity_matches(&tokens).await?;
        let any_of = self.any_of_matches(&tokens).await?;

        let mut candidate_ids: Vec<i64> = Vec::new();
        for list in [&exact, &proximity, &any_of] {
            for id in list {
                if !candidate_ids.contains(id) {
                    candidate_ids.push(*id);
                }
            }
        }
        if candidate_ids.is_empty() {
            return Ok(Vec::new());
        }

        let recency_weight =
            orchestrator_core::OrchestratorStateRepository::get(self).await?.recency_weight;

        let mut qb = sqlx::QueryBuilder::new("SELECT * FROM learnings WHERE id IN (");
        {
            let mut sep = qb.separated(", ");
            for id in &candidate_ids {
                sep.push_bind(*id);
            }
        }
        qb.push(")");
        let rows = qb.build().fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        let mut learnings: HashMap<i64, Learning> = HashMap::new();
        for row in &rows {
            let learning = row_to_learning(row)?;
            learnings.insert(learning.id, learning);
        }

        let now = Utc::now();
        let inputs: Vec<RetrievalInput> = candidate_ids
            .iter()
            .filter_map(|id| learnings.get(id))
            .map(|l| RetrievalInput {
                id: l.id,
                age_days: (now - l.created_at).num_minutes() as f64 / (60.0 * 24.0),
                outcome_score: l.outcome_score,
                usage_count: l.usage_count,
            })
            .collect();

        let scored = fuse_and_score(&[exact, proximity, any_of], RRF_K, recency_weight, &inputs);

        let mut results: Vec<LearningSearchResult> = scored
            .into_iter()
            .filter(|c| c.relevance >= min_score)
            .filter_map(|c| {
                learnings.get(&c.id).map(|l| LearningSearchResult {
                    learning: l.clone(),
                    relevance: c.relevance,
                    bm25_score: c.bm25_score,
                    recency_score: c.recency_score,
                })
            })
            .collect();

        results.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));
        if limit >= 0 {
            results.truncate(limit as usize);
        }
        Ok(results)
    }
}

impl SqliteStore {
    /// Learnings whose tokens contain `tokens` as a contiguous run,
    /// ranked by how many times the phrase occurs.
    async fn exact_phrase_matches(&self, tokens: &[String]) -> Result<Vec<i64>> {
        let mut qb = sqlx::QueryBuilder::new(
            "SELECT t0.learning_id as learning_id, COUNT(*) as matches FROM learning_tokens t0",
        );
        for i in 1..tokens.len() {
            qb.push(format!(" JOIN learning_tokens t{i} ON t{i}.learning_id = t0.learning_id AND t{i}.position = t0.position + {i}"));
        }
        qb.push(" WHERE t0.token = ");
        qb.push_bind(tokens[0].clone());
        for (i, token) in tokens.iter().enumerate().skip(1) {
            qb.push(format!(" AND t{i}.token = "));
            qb.push_bind(token.clone());
        }
        qb.push(" GROUP BY t0.learning_id ORDER BY matches DESC, t0.learning_id ASC");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("learning_id")).collect())
    }

    /// Learnings where every distinct query token appears within
    /// [`PROXIMITY_WINDOW`] positions of each other (approximated over all
    /// occurrences rather than a true windowed intersection).
    async fn proximity_matches(&self, tokens: &[String]) -> Result<Vec<i64>> {
        let distinct_count = {
            let mut set = std::collections::HashSet::new();
            for t in tokens {
                set.insert(t.clone());
            }
            set.len() as i64
        };

        let mut qb = sqlx::QueryBuilder::new(
            "SELECT learning_id, (MAX(position) - MIN(position)) as span, COUNT(DISTINCT token) as distinct_matches
             FROM learning_tokens WHERE token IN (",
        );
        {
            let mut sep = qb.separated(", ");
            for token in tokens {
                sep.push_bind(token.clone());
            }
        }
        qb.push(") GROUP BY learning_id HAVING distinct_matches = ");
        qb.push_bind(distinct_count);
        qb.push(" AND span <= ");
        qb.push_bind(PROXIMITY_WINDOW);
        qb.push(" ORDER BY span ASC, distinct_matches DESC, learning_id ASC");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("learning_id")).collect())
    }

    /// Learnings matching at least one query token, ranked by how many
    /// distinct tokens matched.
    async fn any_of_matches(&self, tokens: &[String]) -> Result<Vec<i64>> {
        let mut qb = sqlx::QueryBuilder::new(
            "SELECT learning_id, COUNT(DISTINCT token) as matches FROM learning_tokens WHERE token IN (",
        );
        {
            let mut sep = qb.separated(", ");
            for token in tokens {
                sep.push_bind(token.clone());
            }
        }
        qb.push(") GROUP BY learning_id ORDER BY matches DESC, learning_id ASC");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("learning_id")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exact_phrase_outranks_scattered_token_matches() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        let phrase = store
            .create(NewLearning { content: "prefer smaller diffs over large rewrites".into(), source_type: "run".into(), ..Default::default() })
            .await
            .unwrap();
        let scattered = store
            .create(NewLearning { content: "large codebases benefit from smaller, focused diffs eventually".into(), source_type: "run".into(), ..Default::default() })
            .await
            .unwrap();

        let results = store.search("smaller diffs", 10, 0.0).await.unwrap();
        let ids: Vec<i64> = results.iter().map(|r| r.learning.id).collect();
        assert!(ids.contains(&phrase.id));
        assert!(ids.contains(&scattered.id));
        assert!(ids.iter().position(|&id| id == phrase.id) < ids.iter().position(|&id| id == scattered.id));
    }

    #[tokio::test]
    async fn search_respects_limit_and_min_score() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        for i in 0..5 {
            store
                .create(NewLearning { content: format!("retry policy note {i}"), source_type: "run".into(), ..Default::default() })
                .await
                .unwrap();
        }
        let results = store.search("retry policy", 2, 0.0).await.unwrap();
        assert_eq!(results.len(), 2);

        let none = store.search("retry policy", 10, 10.0).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn empty_query_returns_no_results() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        store.create(NewLearning { content: "something".into(), source_type: "run".into(), ..Default::default() }).await.unwrap();
        assert!(store.search("   ", 10, 0.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_usage_and_update_outcome_feed_relevance() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        let learning = store
            .create(NewLearning { content: "use feature flags sparingly".into(), source_type: "run".into(), ..Default::default() })
            .await
            .unwrap();
        let updated = store.update_outcome(learning.id, 0.9).await.unwrap();
        assert_eq!(updated.outcome_score, Some(0.9));
        let used = store.record_usage(learning.id).await.unwrap();
        assert_eq!(used.usage_count, 1);
    }

    #[tokio::test]
    async fn delete_cascades_its_tokens() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        let learning = store
            .create(NewLearning { content: "token cascade check".into(), source_type: "run".into(), ..Default::default() })
            .await
            .unwrap();
        store.delete(learning.id).await.unwrap();
        let remaining: i64 = sqlx::query("SELECT COUNT(*) as c FROM learning_tokens WHERE learning_id = ?")
            .bind(learning.id)
            .fetch_one(&store.pool)
            .await
            .unwrap()
            .get("c");
        assert_eq!(remaining, 0);
    }
}
