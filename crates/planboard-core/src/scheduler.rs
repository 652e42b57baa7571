//! Host-facing board. Owns the grid, window, store and gesture state, and
//! reports every mutation through its [`EventBus`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::calendar;
use crate::config::SchedulerOptions;
use crate::error::{SchedulerError, SchedulerResult};
use crate::events::{EventBus, EventKind, SchedulerEvent, SubscriptionId};
use crate::grid::{self, DayColumn, GridCell, GridMapper, TaskGeometry, VisibleRange};
use crate::interaction::{
    GestureCommit, GestureContext, GesturePhase, GesturePreview, InteractionController,
    PointerPosition, ResizeEdge,
};
use crate::store::TaskStore;
use crate::task::{Resource, Task, TaskDraft, TaskKind, TaskPatch};
use crate::window::{DateRange, DateWindow, Eviction, Extension};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskLayout {
    pub task: Task,
    pub day_offset: i64,
    pub geometry: TaskGeometry,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub resources: Vec<Resource>,
    pub tasks: Vec<Task>,
}

/// Which gesture a pointer-down started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "gesture", content = "edge", rename_all = "lowercase")]
pub enum GestureKind {
    Drag,
    Resize(ResizeEdge),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollOutcome {
    pub extension: Option<Extension>,
    pub eviction: Option<Eviction>,
    /// Pixels the host adds to its scroll offset after an eviction.
    pub scroll_adjust_px: f64,
}

#[derive(Debug)]
pub struct Scheduler {
    options: SchedulerOptions,
    grid: GridMapper,
    window: DateWindow,
    store: TaskStore,
    interaction: InteractionController,
    bus: EventBus,
    pending: Option<Extension>,
    /// Loads closed by a range change whose host fetch has not reported back.
    abandoned_loads: u32,
}

impl Scheduler {
    pub fn new(options: SchedulerOptions, anchor: NaiveDate) -> SchedulerResult<Self> {
        options.validate()?;
        let grid = GridMapper::new(options.cell_width, options.row_height)?;
        let window = DateWindow::new(anchor, options.days_visible, options.policy)?;
        let interaction = InteractionController::new(options.handle_width);
        debug!(
            start = %window.week_anchor_start(),
            days = window.days_visible(),
            "scheduler created"
        );
        Ok(Self {
            options,
            grid,
            window,
            store: TaskStore::new(),
            interaction,
            bus: EventBus::new(),
            pending: None,
            abandoned_loads: 0,
        })
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn grid(&self) -> &GridMapper {
        &self.grid
    }

    pub fn window(&self) -> &DateWindow {
        &self.window
    }

    pub fn gesture_phase(&self) -> GesturePhase {
        self.interaction.phase()
    }

    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&SchedulerEvent) + 'static,
    {
        self.bus.on(kind, handler)
    }

    pub fn on_any<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&SchedulerEvent) + 'static,
    {
        self.bus.on_any(handler)
    }

    pub fn off(&mut self, id: SubscriptionId) -> bool {
        self.bus.off(id)
    }

    // --- data -------------------------------------------------------------

    #[instrument(skip(self, resources, drafts))]
    pub fn load(&mut self, resources: Vec<Resource>, drafts: Vec<TaskDraft>) -> SchedulerResult<usize> {
        let result = self.store.load(resources, drafts);
        let count = self.report(result)?;
        info!(tasks = count, "board data loaded");
        self.bus.emit(SchedulerEvent::TasksLoaded {
            resources: self.store.resource_count(),
            tasks: count,
        });
        Ok(count)
    }

    #[instrument(skip(self, draft))]
    pub fn add_task(&mut self, draft: TaskDraft) -> SchedulerResult<Task> {
        let result = self
            .check_resource_bounds(Some(draft.resource_index))
            .and_then(|()| self.store.add(draft));
        let task = self.report(result)?;
        self.bus.emit(SchedulerEvent::TaskAdded { task: task.clone() });
        Ok(task)
    }

    /// `Ok(None)` when no task has `id`.
    #[instrument(skip(self, patch))]
    pub fn update_task(&mut self, id: u64, patch: &TaskPatch) -> SchedulerResult<Option<Task>> {
        let result = self
            .check_resource_bounds(patch.resource_index)
            .and_then(|()| self.store.update(id, patch));
        let Some(update) = self.report(result)? else {
            return Ok(None);
        };
        let after = update.after.clone();
        self.bus.emit(SchedulerEvent::TaskUpdated {
            before: update.before,
            after: update.after,
        });
        Ok(Some(after))
    }

    #[instrument(skip(self))]
    pub fn remove_task(&mut self, id: u64) -> Option<Task> {
        let removed = self.store.remove(id)?;
        self.bus.emit(SchedulerEvent::TaskRemoved {
            task: removed.clone(),
        });
        Some(removed)
    }

    pub fn get_task(&self, id: u64) -> Option<&Task> {
        self.store.get(id)
    }

    pub fn tasks_for_resource(&self, resource_index: usize) -> Vec<&Task> {
        self.store.by_resource(resource_index)
    }

    pub fn tasks_for_date(&self, date: NaiveDate) -> Vec<&Task> {
        self.store.by_date(date)
    }

    pub fn tasks(&self) -> &[Task] {
        self.store.tasks()
    }

    pub fn resources(&self) -> &[Resource] {
        self.store.resources()
    }

    pub fn get_data(&self) -> BoardSnapshot {
        BoardSnapshot {
            resources: self.store.resources().to_vec(),
            tasks: self.store.tasks().to_vec(),
        }
    }

    pub fn refresh(&mut self) {
        self.bus.emit(SchedulerEvent::Refreshed);
    }

    // --- navigation -------------------------------------------------------

    /// Re-anchors the window on the week of `anchor`. Rejected while a
    /// gesture is active. An unresolved extension is abandoned.
    #[instrument(skip(self))]
    pub fn set_date_range(&mut self, anchor: NaiveDate, days_visible: u32) -> SchedulerResult<DateRange> {
        let result = self.reset_window(anchor, days_visible);
        let range = self.report(result)?;
        info!(start = %range.start, end = %range.end, "date range changed");
        self.bus.emit(SchedulerEvent::DateRangeChanged {
            start: range.start,
            end: range.end,
            days: self.window.days_visible(),
        });
        Ok(range)
    }

    pub fn today(&self) -> NaiveDate {
        calendar::today_in(&self.options.timezone, Utc::now())
    }

    pub fn go_to_today(&mut self) -> SchedulerResult<DateRange> {
        self.go_to_today_at(Utc::now())
    }

    pub fn go_to_today_at(&mut self, now: DateTime<Utc>) -> SchedulerResult<DateRange> {
        let today = calendar::today_in(&self.options.timezone, now);
        self.set_date_range(today, self.window.days_visible())
    }

    pub fn go_to_next_week(&mut self) -> SchedulerResult<DateRange> {
        self.shift_weeks(1)
    }

    pub fn go_to_previous_week(&mut self) -> SchedulerResult<DateRange> {
        self.shift_weeks(-1)
    }

    /// `false` (plus a range `error` event) when `date` is not loaded.
    #[instrument(skip(self))]
    pub fn scroll_to_date(&mut self, date: NaiveDate) -> bool {
        let loaded = self.window.loaded_range();
        if !loaded.contains(date) {
            warn!(%date, start = %loaded.start, end = %loaded.end, "scroll target outside loaded window");
            self.emit_error(&SchedulerError::range(format!(
                "{} is outside the loaded range {}..{}",
                calendar::format_iso(date),
                calendar::format_iso(loaded.start),
                calendar::format_iso(loaded.end)
            )));
            return false;
        }

        let day_index = self.window.day_offset_of(date);
        self.bus.emit(SchedulerEvent::ScrolledToDate {
            date,
            scroll_position: self.grid.day_to_x(day_index),
            day_index,
        });
        true
    }

    // --- scrolling and loading --------------------------------------------

    /// Feeds raw scroll telemetry into the window: trims old days once the
    /// resident limit is exceeded, then grows the window when the viewport
    /// nears its end.
    #[instrument(skip(self))]
    pub fn on_scroll(&mut self, scroll_px: f64, viewport_px: f64) -> ScrollOutcome {
        let mut outcome = ScrollOutcome::default();
        if !self.options.infinite_scroll {
            return outcome;
        }

        if self.interaction.is_active() {
            debug!("eviction skipped during an active gesture");
        } else {
            let scroll_day = (scroll_px / self.grid.cell_width()).floor() as i64;
            let min_days = self.grid.columns_for(viewport_px);
            if let Some(eviction) = self.window.evict(scroll_day, min_days) {
                outcome.scroll_adjust_px = self.grid.day_to_x(eviction.scroll_adjust_days);
                self.apply_eviction(eviction, outcome.scroll_adjust_px);
                outcome.eviction = Some(eviction);
            }
        }

        let scroll_px = scroll_px + outcome.scroll_adjust_px;
        let total_px = self.grid.day_to_x(i64::from(self.window.days_visible()));
        let days_from_end = ((total_px - scroll_px - viewport_px) / self.grid.cell_width()).ceil() as i64;
        if self.window.should_extend(days_from_end) {
            outcome.extension = self.extend();
        }
        outcome
    }

    /// Grows the window by one chunk. `None` while a previous extension is
    /// unresolved or after [`Scheduler::mark_end_of_data`].
    #[instrument(skip(self))]
    pub fn extend(&mut self) -> Option<Extension> {
        let before = self.window.loaded_range();
        let extension = self.window.extend()?;

        self.bus.emit(SchedulerEvent::LoadingStart {
            current_range: before,
            requested_days: extension.new_days,
        });
        self.bus.emit(SchedulerEvent::DateRangeExtended {
            opened_start: extension.opened.start,
            old_end: extension.old_end,
            new_end: extension.new_end,
            new_days: extension.new_days,
            total_days: extension.total_days,
        });
        self.pending = Some(extension);
        Some(extension)
    }

    /// Resolves the in-flight extension with the host's fetch result. The
    /// grown columns stay either way; a failure is reported with the range
    /// to retry.
    #[instrument(skip(self))]
    pub fn finish_loading(&mut self, result: Result<(), String>) -> SchedulerResult<()> {
        if !self.window.finish_extend() {
            if self.abandoned_loads > 0 {
                self.abandoned_loads -= 1;
                debug!(?result, "late result for an abandoned extension ignored");
                return Ok(());
            }
            return self.report(Err(SchedulerError::state("no extension is loading")));
        }
        let pending = self.pending.take();

        if let Err(message) = result {
            warn!(%message, "extension data failed to load");
            self.bus.emit(SchedulerEvent::LoadingError {
                message,
                range: pending.map(|extension| extension.opened),
            });
        }
        self.bus.emit(SchedulerEvent::LoadingEnd {
            current_range: self.window.loaded_range(),
            total_days: self.window.days_visible(),
        });
        Ok(())
    }

    pub fn mark_end_of_data(&mut self) {
        self.window.mark_end_of_data();
    }

    pub fn is_loading(&self) -> bool {
        self.window.is_loading()
    }

    // --- gestures ---------------------------------------------------------

    /// Starts a resize when `offset_x` (pointer x inside the bar) lands on
    /// a handle, a drag otherwise.
    #[instrument(skip(self))]
    pub fn pointer_down(
        &mut self,
        task_id: u64,
        pointer: PointerPosition,
        offset_x: f64,
    ) -> SchedulerResult<GestureKind> {
        let result = self.find_task(task_id).map(|task| {
            let width = self.grid.task_geometry(task, self.window.week_anchor_start()).width;
            self.interaction.hit_test(offset_x, width)
        });
        let kind = match self.report(result)? {
            Some(edge) => {
                self.begin_resize(task_id, edge, pointer)?;
                GestureKind::Resize(edge)
            }
            None => {
                self.begin_drag(task_id, pointer)?;
                GestureKind::Drag
            }
        };
        Ok(kind)
    }

    pub fn begin_drag(&mut self, task_id: u64, pointer: PointerPosition) -> SchedulerResult<()> {
        let result = self.find_task(task_id).cloned().and_then(|task| {
            let ctx = GestureContext {
                grid: &self.grid,
                window: &self.window,
                resource_count: self.store.resource_count(),
            };
            self.interaction.begin_drag(&task, pointer, ctx).map(|()| task)
        });
        let task = self.report(result)?;
        self.bus.emit(SchedulerEvent::DragStarted { task });
        Ok(())
    }

    pub fn begin_resize(
        &mut self,
        task_id: u64,
        edge: ResizeEdge,
        pointer: PointerPosition,
    ) -> SchedulerResult<()> {
        let result = self.find_task(task_id).cloned().and_then(|task| {
            let ctx = GestureContext {
                grid: &self.grid,
                window: &self.window,
                resource_count: self.store.resource_count(),
            };
            self.interaction
                .begin_resize(&task, edge, pointer, ctx)
                .map(|()| task)
        });
        let task = self.report(result)?;
        self.bus.emit(SchedulerEvent::ResizeStarted { task, edge });
        Ok(())
    }

    pub fn pointer_move(&mut self, pointer: PointerPosition) -> SchedulerResult<GesturePreview> {
        let ctx = GestureContext {
            grid: &self.grid,
            window: &self.window,
            resource_count: self.store.resource_count(),
        };
        let result = self.interaction.update(pointer, ctx);
        self.report(result)
    }

    /// Commits the active gesture. `Ok(None)` when the pointer was released
    /// without crossing a cell or the task was removed mid-gesture; no
    /// events fire in either case.
    #[instrument(skip(self))]
    pub fn pointer_up(&mut self, pointer: PointerPosition) -> SchedulerResult<Option<Task>> {
        let ctx = GestureContext {
            grid: &self.grid,
            window: &self.window,
            resource_count: self.store.resource_count(),
        };
        let result = self.interaction.commit(pointer, ctx, &mut self.store);
        let Some(commit) = self.report(result)? else {
            return Ok(None);
        };

        let task = match commit {
            GestureCommit::Moved(moved) => {
                let task = moved.update.after.clone();
                self.bus.emit(SchedulerEvent::TaskUpdated {
                    before: moved.update.before,
                    after: moved.update.after,
                });
                self.bus.emit(SchedulerEvent::TaskMoved {
                    task: task.clone(),
                    old_start: moved.old_start,
                    new_start: moved.new_start,
                    old_resource_index: moved.old_resource_index,
                    new_resource_index: moved.new_resource_index,
                });
                task
            }
            GestureCommit::Resized(resized) => {
                let before = resized.update.before;
                let task = resized.update.after;
                self.bus.emit(SchedulerEvent::TaskUpdated {
                    before: before.clone(),
                    after: task.clone(),
                });
                self.bus.emit(SchedulerEvent::TaskResized {
                    task: task.clone(),
                    old_start: before.start,
                    new_start: task.start,
                    old_end: before.end,
                    new_end: task.end,
                    old_duration: before.duration,
                    new_duration: task.duration,
                });
                task
            }
        };
        Ok(Some(task))
    }

    pub fn pointer_cancel(&mut self) -> Option<u64> {
        let task_id = self.interaction.cancel()?;
        self.bus.emit(SchedulerEvent::GestureCancelled { task_id });
        Some(task_id)
    }

    // --- views ------------------------------------------------------------

    /// Geometry for every task starting inside the window.
    pub fn layout(&self) -> Vec<TaskLayout> {
        let anchor = self.window.week_anchor_start();
        self.store
            .tasks()
            .iter()
            .filter_map(|task| {
                let day_offset = calendar::day_offset(anchor, task.start);
                self.window.contains_offset(day_offset).then(|| TaskLayout {
                    task: task.clone(),
                    day_offset,
                    geometry: self.grid.task_geometry(task, anchor),
                })
            })
            .collect()
    }

    pub fn day_columns(&self, today: NaiveDate) -> Vec<DayColumn> {
        grid::day_columns(
            self.window.week_anchor_start(),
            self.window.days_visible(),
            today,
        )
    }

    pub fn visible_date_range(&self, scroll_px: f64, viewport_px: f64) -> VisibleRange {
        self.grid
            .visible_range(self.window.week_anchor_start(), scroll_px, viewport_px)
    }

    pub fn cell_at(&mut self, x: f64, y: f64) -> SchedulerResult<GridCell> {
        let result = self.grid.cell_at(
            x,
            y,
            self.window.week_anchor_start(),
            self.window.days_visible(),
            self.store.resource_count(),
        );
        self.report(result)
    }

    pub fn create_task_at_cell(
        &mut self,
        cell: GridCell,
        title: &str,
        duration: u32,
        kind: TaskKind,
    ) -> SchedulerResult<Task> {
        if !self.window.loaded_range().contains(cell.date) {
            return self.report(Err(SchedulerError::range(format!(
                "cell date {} is not loaded",
                calendar::format_iso(cell.date)
            ))));
        }
        self.add_task(TaskDraft::new(title, cell.date, duration, cell.resource_index).with_kind(kind))
    }

    // --- internals --------------------------------------------------------

    fn shift_weeks(&mut self, weeks: i64) -> SchedulerResult<DateRange> {
        let anchor = calendar::add_days(self.window.week_anchor_start(), weeks * 7);
        self.set_date_range(anchor, self.window.days_visible())
    }

    fn reset_window(&mut self, anchor: NaiveDate, days_visible: u32) -> SchedulerResult<DateRange> {
        if let Some(task_id) = self.interaction.active_task_id() {
            warn!(task_id, "range change rejected during an active gesture");
            return Err(SchedulerError::state(format!(
                "cannot change the date range while task {task_id} is being edited"
            )));
        }
        let range = self.window.set_range(anchor, days_visible)?;
        if self.window.finish_extend() {
            debug!(abandoned = ?self.pending.take(), "pending extension dropped by range change");
            self.abandoned_loads += 1;
            self.bus.emit(SchedulerEvent::LoadingEnd {
                current_range: range,
                total_days: self.window.days_visible(),
            });
        }
        Ok(range)
    }

    fn apply_eviction(&mut self, eviction: Eviction, scroll_adjust_px: f64) {
        let removed_tasks = self
            .store
            .evict_ending_before(eviction.cutoff)
            .into_iter()
            .map(|task| task.id)
            .collect();
        self.bus.emit(SchedulerEvent::DaysCleanedUp {
            removed_days: eviction.removed_days,
            removed_tasks,
            current_range: self.window.loaded_range(),
            total_days: self.window.days_visible(),
            scroll_adjust_px,
        });
    }

    fn find_task(&self, task_id: u64) -> SchedulerResult<&Task> {
        self.store
            .get(task_id)
            .ok_or_else(|| SchedulerError::range(format!("no task with id {task_id}")))
    }

    fn check_resource_bounds(&self, resource_index: Option<i64>) -> SchedulerResult<()> {
        let count = self.store.resource_count();
        match resource_index {
            Some(index) if count > 0 && index >= count as i64 => Err(SchedulerError::range(
                format!("resource index {index} is outside the {count} resources"),
            )),
            _ => Ok(()),
        }
    }

    /// Mirrors a failure onto the bus as an `error` event.
    fn report<T>(&mut self, result: SchedulerResult<T>) -> SchedulerResult<T> {
        if let Err(err) = &result {
            self.emit_error(err);
        }
        result
    }

    fn emit_error(&mut self, err: &SchedulerError) {
        debug!(kind = ?err.kind(), error = %err, "reporting error to subscribers");
        self.bus.emit(SchedulerEvent::Error {
            kind: err.kind(),
            error: err.message().to_string(),
        });
    }
}
