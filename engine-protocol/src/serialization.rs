//! Request/response DTOs for the HTTP surface (§6). Kept separate from
//! `orchestrator_core::models` because the wire shape (optional fields on
//! create, CSV status filters, pagination envelopes) is a protocol-layer
//! concern the domain types shouldn't carry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use orchestrator_core::{NewTask, Task, TaskFilter, TaskStatus, UpdateTask};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskBody {
    pub title: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub score: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

impl From<CreateTaskBody> for NewTask {
    fn from(body: CreateTaskBody) -> Self {
        NewTask {
            title: body.title,
            description: body.description,
            parent_id: body.parent_id,
            score: body.score,
            metadata: body.metadata,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskBody {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "deserialize_nested_option")]
    pub parent_id: Option<Option<String>>,
    pub score: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// Lets `parent_id: null` mean "clear the parent" while an absent key means
/// "leave it untouched" — a plain `Option<Option<String>>` field can't tell
/// those apart under serde's default behavior, so a present `null` must be
/// wrapped as `Some(None)` explicitly.
fn deserialize_nested_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

impl From<UpdateTaskBody> for UpdateTask {
    fn from(body: UpdateTaskBody) -> Self {
        UpdateTask {
            title: body.title,
            description: body.description,
            status: body.status,
            parent_id: body.parent_id,
            score: body.score,
            metadata: body.metadata,
        }
    }
}

/// Query parameters accepted by `GET /api/tasks`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskListQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub search: Option<String>,
}

impl TaskListQuery {
    /// Splits the CSV `status` param and folds the cursor's score into a
    /// filter usable by `TaskRepository::list`. The cursor's task id isn't
    /// part of the SQL filter — callers page by dropping rows at or before
    /// it from the already-sorted result, which `build_page` does.
    pub fn to_task_filter(&self) -> TaskFilter {
        let status = self.status.as_ref().map(|csv| {
            csv.split(',')
                .filter_map(|s| s.trim().parse::<TaskStatus>().ok())
                .collect::<Vec<_>>()
        });
        TaskFilter { status, search: self.search.clone(), ..Default::default() }
    }
}

const DEFAULT_PAGE_LIMIT: i64 = 50;
const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
    pub total: u64,
    pub by_status: HashMap<String, u64>,
}

/// Applies the cursor and limit to an already `score DESC, id ASC` sorted
/// full list, slicing an in-application-memory page rather than
/// re-querying per page.
pub fn build_task_page(all: Vec<Task>, query: &TaskListQuery, total: u64) -> TaskListResponse {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT) as usize;

    let start = match query.cursor.as_deref().and_then(crate::cursor::decode_task_cursor) {
        Some((score, id)) => all
            .iter()
            .position(|t| (t.score, t.id.as_str()) == (score, id.as_str()))
            .map(|idx| idx + 1)
            .unwrap_or(0),
        None => 0,
    };

    let mut by_status: HashMap<String, u64> = HashMap::new();
    for task in &all {
        *by_status.entry(task.status.to_string()).or_insert(0) += 1;
    }

    let page: Vec<Task> = all.iter().skip(start).take(limit).cloned().collect();
    let has_more = start + page.len() < all.len();
    let next_cursor = if has_more {
        page.last().map(|t| crate::cursor::encode_task_cursor(t.score, &t.id))
    } else {
        None
    };

    TaskListResponse { tasks: page, next_cursor, has_more, total, by_status }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertLabelBody {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachLabelBody {
    pub label_id: i64,
}

/// `GET /api/ralph` — liveness of the in-process orchestrator, not of any
/// individual agent subprocess (that is the external "ralph" loop's own
/// concern, which this engine doesn't track).
#[derive(Debug, Clone, Serialize)]
pub struct RalphStatusResponse {
    pub running: bool,
    pub pid: Option<i64>,
    pub current_iteration: Option<u64>,
    pub current_task: Option<String>,
    pub recent_activity: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn task(id: &str, score: i64) -> Task {
        Task {
            id: id.into(),
            title: "t".into(),
            description: None,
            status: TaskStatus::Ready,
            parent_id: None,
            score,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn first_page_starts_at_the_beginning_with_no_cursor() {
        let all = vec![task("tx-1", 10), task("tx-2", 5)];
        let query = TaskListQuery { limit: Some(1), ..Default::default() };
        let page = build_task_page(all, &query, 2);
        assert_eq!(page.tasks.len(), 1);
        assert_eq!(page.tasks[0].id, "tx-1");
        assert!(page.has_more);
        assert_eq!(page.next_cursor, Some("10:tx-1".to_string()));
    }

    #[test]
    fn cursor_resumes_after_the_given_row() {
        let all = vec![task("tx-1", 10), task("tx-2", 5), task("tx-3", 1)];
        let query = TaskListQuery { cursor: Some("10:tx-1".to_string()), limit: Some(10), ..Default::default() };
        let page = build_task_page(all, &query, 3);
        assert_eq!(page.tasks.len(), 2);
        assert_eq!(page.tasks[0].id, "tx-2");
        assert!(!page.has_more);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn limit_is_clamped_to_the_documented_maximum() {
        let all: Vec<Task> = (0..150).map(|i| task(&format!("tx-{i}"), i)).collect();
        let query = TaskListQuery { limit: Some(500), ..Default::default() };
        let page = build_task_page(all, &query, 150);
        assert_eq!(page.tasks.len(), 100);
    }

    #[test]
    fn status_csv_parses_into_a_status_set() {
        let query = TaskListQuery { status: Some("ready, active".to_string()), ..Default::default() };
        let filter = query.to_task_filter();
        assert_eq!(filter.status, Some(vec![TaskStatus::Ready, TaskStatus::Active]));
    }
}
