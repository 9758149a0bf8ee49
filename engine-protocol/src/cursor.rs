//! Pagination cursors (§6). Both cursor shapes are `<sort-key>:<id>`, split
//! at the *last* colon rather than the first — a run id carries its own
//! `run-` prefix (no colon inside it), but splitting from the front would
//! still work for runs; tasks need the last-colon split because a decimal
//! score never contains a colon either, so the split point is unambiguous
//! either way. We split from the last colon uniformly so one function
//! serves both.

/// Encodes a task list cursor: `<score>:<task id>`.
pub fn encode_task_cursor(score: i64, id: &str) -> String {
    format!("{score}:{id}")
}

/// Decodes a task list cursor, returning `(score, id)`. `None` if the
/// cursor isn't of the form `<integer>:<id>`.
pub fn decode_task_cursor(cursor: &str) -> Option<(i64, String)> {
    let (score_str, id) = split_at_last_colon(cursor)?;
    let score: i64 = score_str.parse().ok()?;
    Some((score, id.to_string()))
}

/// Encodes a run list cursor: `<RFC3339 startedAt>:<run id>`. The run id
/// keeps its `run-` prefix since it is never re-parsed as anything but an
/// opaque string.
pub fn encode_run_cursor(started_at: chrono::DateTime<chrono::Utc>, id: &str) -> String {
    format!("{}:{}", started_at.to_rfc3339(), id)
}

/// Decodes a run list cursor, returning `(startedAt, id)`. `None` if the
/// timestamp half doesn't parse as RFC3339.
pub fn decode_run_cursor(cursor: &str) -> Option<(chrono::DateTime<chrono::Utc>, String)> {
    let (timestamp_str, id) = split_at_last_colon(cursor)?;
    let started_at = chrono::DateTime::parse_from_rfc3339(timestamp_str)
        .ok()?
        .with_timezone(&chrono::Utc);
    Some((started_at, id.to_string()))
}

/// Splits a cursor at its last `:`, so an id containing no colon of its own
/// (every id this engine issues is `tx-`/`worker-`/`run-` plus hex or a
/// ULID-like token) round-trips whole on the right-hand side.
fn split_at_last_colon(cursor: &str) -> Option<(&str, &str)> {
    let idx = cursor.rfind(':')?;
    Some((&cursor[..idx], &cursor[idx + 1..]))
}
