use crate::{
    error::{OrchestratorError, Result},
    models::{NewTask, Task, TaskLabel, TaskStatus},
};

/// Validation helpers for task input. Grouped as static methods rather than
/// methods on `Task` itself since most of these run before a `Task` exists.
pub struct TaskValidator;

impl TaskValidator {
    /// Title must be non-empty after trimming; trimming itself is the
    /// caller's responsibility (the repository trims before storing).
    pub fn validate_title(title: &str) -> Result<()> {
        if title.trim().is_empty() {
            return Err(OrchestratorError::validation("task title must not be empty"));
        }
        if title.trim().len() > 500 {
            return Err(OrchestratorError::validation(
                "task title must be at most 500 characters",
            ));
        }
        Ok(())
    }

    pub fn validate_new_task(task: &NewTask) -> Result<()> {
        Self::validate_title(&task.title)
    }

    pub fn validate_state_transition(task: &Task, new_status: TaskStatus) -> Result<()> {
        if task.can_transition_to(new_status) {
            Ok(())
        } else {
            Err(OrchestratorError::validation(format!(
                "cannot transition task from {} to {new_status}",
                task.status
            )))
        }
    }
}

/// Validation for worker registration input.
pub struct WorkerValidator;

impl WorkerValidator {
    pub fn validate_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(OrchestratorError::validation("worker name must not be empty"));
        }
        Ok(())
    }
}

/// Validation for attempt-ledger input.
pub struct AttemptValidator;

impl AttemptValidator {
    /// Rejects empty or whitespace-only approaches, per the attempt ledger contract.
    pub fn validate_approach(approach: &str) -> Result<()> {
        if approach.trim().is_empty() {
            return Err(OrchestratorError::validation("attempt approach must not be empty"));
        }
        Ok(())
    }
}

/// Validation for task labels, case-insensitively unique with a `#rrggbb` color.
pub struct LabelValidator;

impl LabelValidator {
    pub fn validate_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(OrchestratorError::validation("label name must not be empty"));
        }
        Ok(())
    }

    pub fn validate_color(color: &str) -> Result<()> {
        let valid = color.len() == 7
            && color.starts_with('#')
            && color[1..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(OrchestratorError::validation(format!(
                "label color '{color}' must be a '#rrggbb' hex string"
            )));
        }
        Ok(())
    }

    pub fn validate(label: &TaskLabel) -> Result<()> {
        Self::validate_name(&label.name)?;
        Self::validate_color(&label.color)
    }
}

/// Escapes `%` and `_` in a free-text filter so it can be embedded in a
/// SQL `LIKE` pattern literally, per the store's LIKE-safety contract.
pub fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
