use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::{self, iso_date_serde};
use crate::error::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resource {
    /// Row position. Assigned from array order on load.
    #[serde(default)]
    pub index: usize,
    pub name: String,
}

impl Resource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            index: 0,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Project,
    Meeting,
    Vacation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,

    pub title: String,

    #[serde(with = "iso_date_serde")]
    pub start: NaiveDate,

    pub duration: u32,

    #[serde(with = "iso_date_serde")]
    pub end: NaiveDate,

    pub resource_index: usize,

    #[serde(rename = "type", default)]
    pub kind: TaskKind,
}

impl Task {
    /// Inclusive test `start <= date <= end`.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn has_consistent_end(&self) -> bool {
        self.end == calendar::end_date(self.start, self.duration)
    }
}

/// Host-supplied task input. Fields stay loosely typed so that malformed
/// input is reported as a validation error instead of a decode failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    #[serde(default)]
    pub id: Option<u64>,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub start: String,

    #[serde(default = "default_duration")]
    pub duration: i64,

    /// Ignored; `end` is always derived from `start` and `duration`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    #[serde(default)]
    pub resource_index: i64,

    #[serde(rename = "type", default)]
    pub kind: TaskKind,
}

fn default_duration() -> i64 {
    1
}

impl TaskDraft {
    pub fn new(
        title: impl Into<String>,
        start: NaiveDate,
        duration: u32,
        resource_index: usize,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            start: calendar::format_iso(start),
            duration: i64::from(duration),
            end: None,
            resource_index: resource_index as i64,
            kind: TaskKind::Project,
        }
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        self.checked_fields().map(|_| ())
    }

    /// Validates the draft and materializes it under `id`, deriving `end`.
    pub fn into_task(self, id: u64) -> SchedulerResult<Task> {
        if id == 0 {
            return Err(SchedulerError::validation("task id must be positive"));
        }
        let (title, start, duration, resource_index) = self.checked_fields()?;
        let end = calendar::end_date(start, duration);

        if let Some(raw_end) = self.end.as_deref()
            && raw_end != calendar::format_iso(end)
        {
            tracing::debug!(
                id,
                supplied = raw_end,
                derived = %end,
                "ignoring supplied end date; recomputed from start and duration"
            );
        }

        Ok(Task {
            id,
            title,
            start,
            duration,
            end,
            resource_index,
            kind: self.kind,
        })
    }

    fn checked_fields(&self) -> SchedulerResult<(String, NaiveDate, u32, usize)> {
        let title = check_title(&self.title)?;
        let start = calendar::parse_iso(&self.start)?;
        let duration = check_duration(self.duration)?;
        let resource_index = check_resource_index(self.resource_index)?;
        Ok((title, start, duration, resource_index))
    }
}

impl From<&Task> for TaskDraft {
    fn from(task: &Task) -> Self {
        Self {
            id: Some(task.id),
            title: task.title.clone(),
            start: calendar::format_iso(task.start),
            duration: i64::from(task.duration),
            end: Some(calendar::format_iso(task.end)),
            resource_index: task.resource_index as i64,
            kind: task.kind,
        }
    }
}

/// Partial update. Only the touched fields are revalidated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_index: Option<i64>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TaskKind>,
}

impl TaskPatch {
    pub fn moved(start: NaiveDate, resource_index: usize) -> Self {
        Self {
            start: Some(calendar::format_iso(start)),
            resource_index: Some(resource_index as i64),
            ..Self::default()
        }
    }

    pub fn resized(start: NaiveDate, duration: u32) -> Self {
        Self {
            start: Some(calendar::format_iso(start)),
            duration: Some(i64::from(duration)),
            ..Self::default()
        }
    }

    /// Returns the patched copy of `task`. `end` is always recomputed so a
    /// stale value can never survive an update.
    pub fn apply(&self, task: &Task) -> SchedulerResult<Task> {
        let mut next = task.clone();

        if let Some(title) = self.title.as_deref() {
            next.title = check_title(title)?;
        }
        if let Some(start) = self.start.as_deref() {
            next.start = calendar::parse_iso(start)?;
        }
        if let Some(duration) = self.duration {
            next.duration = check_duration(duration)?;
        }
        if let Some(resource_index) = self.resource_index {
            next.resource_index = check_resource_index(resource_index)?;
        }
        if let Some(kind) = self.kind {
            next.kind = kind;
        }

        next.end = calendar::end_date(next.start, next.duration);
        Ok(next)
    }
}

fn check_title(raw: &str) -> SchedulerResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SchedulerError::validation("task title cannot be empty"));
    }
    Ok(trimmed.to_string())
}

fn check_duration(raw: i64) -> SchedulerResult<u32> {
    if raw < 1 {
        return Err(SchedulerError::validation(format!(
            "task duration must be a positive number of days, got {raw}"
        )));
    }
    u32::try_from(raw).map_err(|_| {
        SchedulerError::validation(format!("task duration {raw} is too large"))
    })
}

fn check_resource_index(raw: i64) -> SchedulerResult<usize> {
    usize::try_from(raw).map_err(|_| {
        SchedulerError::validation(format!(
            "resource index must be a non-negative integer, got {raw}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{Task, TaskDraft, TaskKind, TaskPatch};
    use crate::error::ErrorKind;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn draft_derives_end_and_trims_title() {
        let task = TaskDraft::new("  Kickoff ", date(2024, 1, 3), 3, 1)
            .into_task(7)
            .expect("valid draft");
        assert_eq!(task.title, "Kickoff");
        assert_eq!(task.end, date(2024, 1, 5));
        assert!(task.has_consistent_end());
    }

    #[test]
    fn draft_rejects_bad_fields() {
        let base = TaskDraft::new("A", date(2024, 1, 3), 1, 0);

        let mut empty_title = base.clone();
        empty_title.title = "   ".to_string();
        let mut bad_start = base.clone();
        bad_start.start = "03/01/2024".to_string();
        let mut zero_duration = base.clone();
        zero_duration.duration = 0;
        let mut negative_row = base.clone();
        negative_row.resource_index = -1;

        for draft in [empty_title, bad_start, zero_duration, negative_row] {
            let err = draft.validate().expect_err("draft should be rejected");
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn supplied_end_is_recomputed() {
        let mut draft = TaskDraft::new("A", date(2024, 1, 3), 2, 0);
        draft.end = Some("2024-02-01".to_string());
        let task = draft.into_task(1).expect("valid draft");
        assert_eq!(task.end, date(2024, 1, 4));
    }

    #[test]
    fn patch_recomputes_end_and_keeps_untouched_fields() {
        let task = TaskDraft::new("A", date(2024, 1, 3), 3, 2)
            .with_kind(TaskKind::Meeting)
            .into_task(4)
            .expect("valid draft");

        let patched = TaskPatch::resized(date(2024, 1, 10), 5)
            .apply(&task)
            .expect("patch applies");
        assert_eq!(patched.start, date(2024, 1, 10));
        assert_eq!(patched.end, date(2024, 1, 14));
        assert_eq!(patched.resource_index, 2);
        assert_eq!(patched.kind, TaskKind::Meeting);

        let rejected = TaskPatch {
            duration: Some(-3),
            ..TaskPatch::default()
        }
        .apply(&task);
        assert!(rejected.is_err());
    }

    #[test]
    fn task_json_uses_host_field_names() {
        let task = TaskDraft::new("A", date(2024, 1, 3), 3, 1)
            .with_kind(TaskKind::Vacation)
            .into_task(9)
            .expect("valid draft");
        let value = serde_json::to_value(&task).expect("serialize task");
        assert_eq!(value["start"], "2024-01-03");
        assert_eq!(value["end"], "2024-01-05");
        assert_eq!(value["resourceIndex"], 1);
        assert_eq!(value["type"], "vacation");

        let back: Task = serde_json::from_value(value).expect("deserialize task");
        assert_eq!(back, task);
    }

    #[test]
    fn draft_decodes_with_defaults() {
        let draft: TaskDraft =
            serde_json::from_str(r#"{"title":"Review","start":"2024-01-08"}"#)
                .expect("decode draft");
        assert_eq!(draft.id, None);
        assert_eq!(draft.duration, 1);
        assert_eq!(draft.resource_index, 0);
        assert_eq!(draft.kind, TaskKind::Project);
    }
}
