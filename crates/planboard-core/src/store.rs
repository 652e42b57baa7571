use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::error::{SchedulerError, SchedulerResult};
use crate::task::{Resource, Task, TaskDraft, TaskPatch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    pub before: Task,
    pub after: Task,
}

/// Owns resources and tasks. Every read is a scan over the current
/// collection; boards hold tens to low hundreds of tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    resources: Vec<Resource>,
    tasks: Vec<Task>,
    last_id: u64,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces resources and tasks wholesale. Nothing changes unless every
    /// draft validates.
    #[instrument(skip(self, resources, drafts), fields(resources = resources.len(), tasks = drafts.len()))]
    pub fn load(&mut self, resources: Vec<Resource>, drafts: Vec<TaskDraft>) -> SchedulerResult<usize> {
        let mut seen = BTreeSet::new();
        for draft in &drafts {
            draft.validate()?;
            if let Some(id) = draft.id {
                if id == 0 {
                    return Err(SchedulerError::validation("task id must be positive"));
                }
                if !seen.insert(id) {
                    return Err(SchedulerError::validation(format!("duplicate task id {id}")));
                }
            }
        }

        let mut last_id = seen.iter().next_back().copied().unwrap_or(0);
        let mut tasks = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let id = match draft.id {
                Some(id) => id,
                None => {
                    last_id += 1;
                    last_id
                }
            };
            tasks.push(draft.into_task(id)?);
        }

        self.resources = resources
            .into_iter()
            .enumerate()
            .map(|(index, resource)| Resource { index, ..resource })
            .collect();
        self.tasks = tasks;
        self.last_id = last_id;

        info!(
            resources = self.resources.len(),
            tasks = self.tasks.len(),
            last_id = self.last_id,
            "loaded board data"
        );
        Ok(self.tasks.len())
    }

    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn add(&mut self, draft: TaskDraft) -> SchedulerResult<Task> {
        let id = match draft.id {
            Some(id) if self.get(id).is_some() => {
                return Err(SchedulerError::validation(format!("duplicate task id {id}")));
            }
            Some(id) => id,
            None => self.last_id + 1,
        };

        let task = draft.into_task(id)?;
        self.last_id = self.last_id.max(id);
        self.tasks.push(task.clone());
        debug!(id, start = %task.start, end = %task.end, "added task");
        Ok(task)
    }

    /// `Ok(None)` when `id` is unknown.
    #[instrument(skip(self, patch))]
    pub fn update(&mut self, id: u64, patch: &TaskPatch) -> SchedulerResult<Option<TaskUpdate>> {
        let Some(slot) = self.tasks.iter_mut().find(|task| task.id == id) else {
            debug!(id, "update ignored; task not found");
            return Ok(None);
        };

        let after = patch.apply(slot)?;
        let before = std::mem::replace(slot, after.clone());
        debug!(
            id,
            start = %after.start,
            duration = after.duration,
            resource = after.resource_index,
            "updated task"
        );
        Ok(Some(TaskUpdate { before, after }))
    }

    #[instrument(skip(self))]
    pub fn remove(&mut self, id: u64) -> Option<Task> {
        let idx = self.tasks.iter().position(|task| task.id == id)?;
        let removed = self.tasks.remove(idx);
        debug!(id, "removed task");
        Some(removed)
    }

    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn by_resource(&self, resource_index: usize) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| task.resource_index == resource_index)
            .collect()
    }

    pub fn by_date(&self, date: NaiveDate) -> Vec<&Task> {
        self.tasks.iter().filter(|task| task.covers(date)).collect()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    /// Drops every task whose `end` is strictly before `cutoff`.
    #[instrument(skip(self))]
    pub fn evict_ending_before(&mut self, cutoff: NaiveDate) -> Vec<Task> {
        let (kept, evicted): (Vec<Task>, Vec<Task>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|task| task.end >= cutoff);
        self.tasks = kept;
        debug!(
            evicted = evicted.len(),
            kept = self.tasks.len(),
            "evicted tasks ending before cutoff"
        );
        evicted
    }
}
