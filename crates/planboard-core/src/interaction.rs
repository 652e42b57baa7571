//! Drag and resize gestures over task bars.
//!
//! A gesture runs `Idle -> Active -> Committing -> Idle`. `Committing` only
//! spans the store write inside a single `commit` call, so callers observe
//! `Idle` or `Active`. Only one gesture may be in flight; pointer moves
//! produce previews and nothing touches the store until the gesture is
//! committed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{SchedulerError, SchedulerResult};
use crate::grid::{GridMapper, TaskGeometry, clamp_resource};
use crate::store::{TaskStore, TaskUpdate};
use crate::task::{Task, TaskPatch};
use crate::window::DateWindow;

pub const DEFAULT_HANDLE_WIDTH: f64 = 8.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResizeEdge {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
}

impl PointerPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn delta_from(self, origin: PointerPosition) -> (f64, f64) {
        (self.x - origin.x, self.y - origin.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GesturePhase {
    Idle,
    Active,
    /// Held only while [`InteractionController::commit`] writes to the
    /// store; callers see `Idle` again once it returns.
    Committing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub task: Task,
    pub origin: PointerPosition,
    pub origin_day_offset: i64,
    pub origin_resource_index: usize,
    pub current_resource_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResizeSession {
    pub task: Task,
    pub origin: PointerPosition,
    pub edge: ResizeEdge,
    pub origin_day_offset: i64,
    pub origin_duration: u32,
}

#[derive(Debug, Clone, PartialEq)]
enum Session {
    Drag(DragSession),
    Resize(ResizeSession),
}

impl Session {
    fn task(&self) -> &Task {
        match self {
            Session::Drag(drag) => &drag.task,
            Session::Resize(resize) => &resize.task,
        }
    }
}

/// Read-only view of the board a gesture is computed against.
#[derive(Debug, Clone, Copy)]
pub struct GestureContext<'a> {
    pub grid: &'a GridMapper,
    pub window: &'a DateWindow,
    pub resource_count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DragPreview {
    pub task_id: u64,
    /// Unclamped; the bar follows the pointer until release.
    pub day_offset: i64,
    pub resource_index: usize,
    pub geometry: TaskGeometry,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResizePreview {
    pub task_id: u64,
    pub edge: ResizeEdge,
    pub day_offset: i64,
    pub duration: u32,
    pub geometry: TaskGeometry,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(tag = "gesture", rename_all = "lowercase")]
pub enum GesturePreview {
    Drag(DragPreview),
    Resize(ResizePreview),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragCommit {
    pub update: TaskUpdate,
    pub old_start: NaiveDate,
    pub new_start: NaiveDate,
    pub old_resource_index: usize,
    pub new_resource_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResizeCommit {
    pub update: TaskUpdate,
    pub edge: ResizeEdge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureCommit {
    Moved(DragCommit),
    Resized(ResizeCommit),
}

/// Clamped drop target for a drag of `cells`/`rows` from the origin.
pub fn drag_target(
    origin_day_offset: i64,
    origin_resource_index: usize,
    cells: i64,
    rows: i64,
    days_visible: u32,
    duration: u32,
    resource_count: usize,
) -> (i64, usize) {
    let last_start = i64::from(days_visible) - i64::from(duration);
    let day_offset = (origin_day_offset + cells).min(last_start).max(0);
    let resource_index = clamp_resource(origin_resource_index as i64 + rows, resource_count);
    (day_offset, resource_index)
}

/// New `(day_offset, duration)` after moving `edge` by `cells`. The edge
/// that is not being dragged stays put and the span never drops below one
/// day.
pub fn resize_target(
    edge: ResizeEdge,
    origin_day_offset: i64,
    origin_duration: u32,
    cells: i64,
    days_visible: u32,
) -> (i64, u32) {
    let duration = i64::from(origin_duration);
    let (day_offset, new_duration) = match edge {
        ResizeEdge::Right => {
            let room = i64::from(days_visible) - origin_day_offset;
            (origin_day_offset, (duration + cells).min(room).max(1))
        }
        ResizeEdge::Left => {
            let fixed_end = origin_day_offset + duration - 1;
            let day_offset = (origin_day_offset + cells).max(0).min(fixed_end);
            (day_offset, duration - (day_offset - origin_day_offset))
        }
    };

    if new_duration < 1 {
        let pinned = match edge {
            ResizeEdge::Right => origin_day_offset,
            ResizeEdge::Left => origin_day_offset + duration - 1,
        };
        return (pinned, 1);
    }
    (day_offset, u32::try_from(new_duration).unwrap_or(u32::MAX))
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionController {
    session: Option<Session>,
    phase: GesturePhase,
    handle_width: f64,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new(DEFAULT_HANDLE_WIDTH)
    }
}

impl InteractionController {
    pub fn new(handle_width: f64) -> Self {
        Self {
            session: None,
            phase: GesturePhase::Idle,
            handle_width: handle_width.max(0.0),
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase != GesturePhase::Idle
    }

    pub fn active_task_id(&self) -> Option<u64> {
        self.session.as_ref().map(|session| session.task().id)
    }

    /// Picks a resize handle from the pointer's x offset inside a bar of
    /// `task_width` pixels. The left handle wins when both zones overlap.
    pub fn hit_test(&self, offset_x: f64, task_width: f64) -> Option<ResizeEdge> {
        if offset_x <= self.handle_width {
            Some(ResizeEdge::Left)
        } else if offset_x >= task_width - self.handle_width {
            Some(ResizeEdge::Right)
        } else {
            None
        }
    }

    #[instrument(skip(self, task, ctx), fields(task_id = task.id))]
    pub fn begin_drag(
        &mut self,
        task: &Task,
        origin: PointerPosition,
        ctx: GestureContext<'_>,
    ) -> SchedulerResult<()> {
        self.ensure_idle(task.id)?;
        let current_left = ctx
            .grid
            .task_geometry(task, ctx.window.week_anchor_start())
            .left;
        let origin_day_offset = ctx.grid.x_to_day(current_left);

        debug!(origin_day_offset, resource = task.resource_index, "drag started");
        self.session = Some(Session::Drag(DragSession {
            task: task.clone(),
            origin,
            origin_day_offset,
            origin_resource_index: task.resource_index,
            current_resource_index: task.resource_index,
        }));
        self.phase = GesturePhase::Active;
        Ok(())
    }

    #[instrument(skip(self, task, ctx), fields(task_id = task.id))]
    pub fn begin_resize(
        &mut self,
        task: &Task,
        edge: ResizeEdge,
        origin: PointerPosition,
        ctx: GestureContext<'_>,
    ) -> SchedulerResult<()> {
        self.ensure_idle(task.id)?;
        let origin_day_offset = ctx.window.day_offset_of(task.start);

        debug!(?edge, origin_day_offset, duration = task.duration, "resize started");
        self.session = Some(Session::Resize(ResizeSession {
            task: task.clone(),
            origin,
            edge,
            origin_day_offset,
            origin_duration: task.duration,
        }));
        self.phase = GesturePhase::Active;
        Ok(())
    }

    pub fn update(
        &mut self,
        pointer: PointerPosition,
        ctx: GestureContext<'_>,
    ) -> SchedulerResult<GesturePreview> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| SchedulerError::state("no gesture in progress"))?;

        let preview = match session {
            Session::Drag(drag) => {
                let (dx, dy) = pointer.delta_from(drag.origin);
                let day_offset = drag.origin_day_offset + ctx.grid.cells_in(dx);
                let resource_index = clamp_resource(
                    drag.origin_resource_index as i64 + ctx.grid.rows_in(dy),
                    ctx.resource_count,
                );
                if resource_index != drag.current_resource_index {
                    debug!(
                        task_id = drag.task.id,
                        from = drag.current_resource_index,
                        to = resource_index,
                        "drag crossed into another row"
                    );
                    drag.current_resource_index = resource_index;
                }
                GesturePreview::Drag(DragPreview {
                    task_id: drag.task.id,
                    day_offset,
                    resource_index,
                    geometry: ctx
                        .grid
                        .span_geometry(day_offset, drag.task.duration, resource_index),
                })
            }
            Session::Resize(resize) => {
                let (dx, _) = pointer.delta_from(resize.origin);
                let (day_offset, duration) = resize_target(
                    resize.edge,
                    resize.origin_day_offset,
                    resize.origin_duration,
                    ctx.grid.cells_in(dx),
                    ctx.window.days_visible(),
                );
                GesturePreview::Resize(ResizePreview {
                    task_id: resize.task.id,
                    edge: resize.edge,
                    day_offset,
                    duration,
                    geometry: ctx
                        .grid
                        .span_geometry(day_offset, duration, resize.task.resource_index),
                })
            }
        };
        Ok(preview)
    }

    /// Writes the gesture outcome into `store`. `Ok(None)` when the
    /// pointer never crossed a cell boundary (a plain click leaves the task
    /// untouched) or when the task disappeared while the gesture was in
    /// flight. The session ends either way.
    #[instrument(skip(self, ctx, store))]
    pub fn commit(
        &mut self,
        pointer: PointerPosition,
        ctx: GestureContext<'_>,
        store: &mut TaskStore,
    ) -> SchedulerResult<Option<GestureCommit>> {
        let session = self
            .session
            .take()
            .ok_or_else(|| SchedulerError::state("no gesture in progress"))?;
        self.phase = GesturePhase::Committing;

        let result = match session {
            Session::Drag(drag) => commit_drag(&drag, pointer, ctx, store),
            Session::Resize(resize) => commit_resize(&resize, pointer, ctx, store),
        };

        self.phase = GesturePhase::Idle;
        result
    }

    /// Drops the active session without touching the store.
    pub fn cancel(&mut self) -> Option<u64> {
        let session = self.session.take()?;
        self.phase = GesturePhase::Idle;
        debug!(task_id = session.task().id, "gesture cancelled");
        Some(session.task().id)
    }

    fn ensure_idle(&self, requested: u64) -> SchedulerResult<()> {
        if let Some(active) = self.active_task_id() {
            warn!(active, requested, "gesture rejected; another one is active");
            return Err(SchedulerError::state(format!(
                "a gesture on task {active} is already in progress"
            )));
        }
        Ok(())
    }
}

fn commit_drag(
    drag: &DragSession,
    pointer: PointerPosition,
    ctx: GestureContext<'_>,
    store: &mut TaskStore,
) -> SchedulerResult<Option<GestureCommit>> {
    let (dx, dy) = pointer.delta_from(drag.origin);
    let (cells, rows) = (ctx.grid.cells_in(dx), ctx.grid.rows_in(dy));
    if cells == 0 && rows == 0 {
        debug!(task_id = drag.task.id, "drag released in place; nothing to commit");
        return Ok(None);
    }
    let (day_offset, resource_index) = drag_target(
        drag.origin_day_offset,
        drag.origin_resource_index,
        cells,
        rows,
        ctx.window.days_visible(),
        drag.task.duration,
        ctx.resource_count,
    );
    let new_start = ctx.window.date_at(day_offset);

    let Some(update) = store.update(drag.task.id, &TaskPatch::moved(new_start, resource_index))?
    else {
        warn!(task_id = drag.task.id, "dragged task vanished before commit");
        return Ok(None);
    };

    debug!(
        task_id = drag.task.id,
        old_start = %update.before.start,
        new_start = %new_start,
        resource = resource_index,
        "drag committed"
    );
    Ok(Some(GestureCommit::Moved(DragCommit {
        old_start: update.before.start,
        new_start: update.after.start,
        old_resource_index: update.before.resource_index,
        new_resource_index: update.after.resource_index,
        update,
    })))
}

fn commit_resize(
    resize: &ResizeSession,
    pointer: PointerPosition,
    ctx: GestureContext<'_>,
    store: &mut TaskStore,
) -> SchedulerResult<Option<GestureCommit>> {
    let (dx, _) = pointer.delta_from(resize.origin);
    let cells = ctx.grid.cells_in(dx);
    if cells == 0 {
        debug!(task_id = resize.task.id, "resize released in place; nothing to commit");
        return Ok(None);
    }
    let (day_offset, duration) = resize_target(
        resize.edge,
        resize.origin_day_offset,
        resize.origin_duration,
        cells,
        ctx.window.days_visible(),
    );
    let new_start = ctx.window.date_at(day_offset);

    let Some(update) = store.update(resize.task.id, &TaskPatch::resized(new_start, duration))?
    else {
        warn!(task_id = resize.task.id, "resized task vanished before commit");
        return Ok(None);
    };

    debug!(
        task_id = resize.task.id,
        edge = ?resize.edge,
        start = %update.after.start,
        duration,
        "resize committed"
    );
    Ok(Some(GestureCommit::Resized(ResizeCommit {
        update,
        edge: resize.edge,
    })))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{
        GestureCommit, GestureContext, GesturePhase, GesturePreview, InteractionController,
        PointerPosition, ResizeEdge, drag_target, resize_target,
    };
    use crate::error::ErrorKind;
    use crate::grid::GridMapper;
    use crate::store::TaskStore;
    use crate::task::{Resource, TaskDraft};
    use crate::window::{DateWindow, WindowPolicy};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    struct Board {
        grid: GridMapper,
        window: DateWindow,
        store: TaskStore,
    }

    impl Board {
        fn new() -> Self {
            let mut store = TaskStore::new();
            store
                .load(
                    vec![Resource::new("a"), Resource::new("b"), Resource::new("c")],
                    vec![TaskDraft::new("A", date(2024, 1, 3), 3, 0)],
                )
                .expect("load");
            Self {
                grid: GridMapper::new(80.0, 50.0).expect("grid"),
                window: DateWindow::new(date(2024, 1, 1), 21, WindowPolicy::default())
                    .expect("window"),
                store,
            }
        }

        fn ctx(&self) -> GestureContext<'_> {
            GestureContext {
                grid: &self.grid,
                window: &self.window,
                resource_count: self.store.resource_count(),
            }
        }
    }

    #[test]
    fn drag_target_clamps_to_window_and_rows() {
        assert_eq!(drag_target(2, 0, 2, 1, 21, 3, 3), (4, 1));
        assert_eq!(drag_target(2, 0, -10, -4, 21, 3, 3), (0, 0));
        assert_eq!(drag_target(2, 2, 30, 9, 21, 3, 3), (18, 2));
        assert_eq!(drag_target(0, 0, 5, 0, 2, 3, 1), (0, 0));
    }

    #[test]
    fn resize_target_keeps_fixed_edge() {
        assert_eq!(resize_target(ResizeEdge::Right, 2, 3, 2, 21), (2, 5));
        assert_eq!(resize_target(ResizeEdge::Right, 2, 3, -9, 21), (2, 1));
        assert_eq!(resize_target(ResizeEdge::Right, 18, 3, 10, 21), (18, 3));
        assert_eq!(resize_target(ResizeEdge::Left, 2, 3, -1, 21), (1, 4));
        assert_eq!(resize_target(ResizeEdge::Left, 2, 3, 5, 21), (4, 1));
        assert_eq!(resize_target(ResizeEdge::Left, 2, 3, -9, 21), (0, 5));
    }

    #[test]
    fn hit_test_prefers_left_handle() {
        let controller = InteractionController::default();
        assert_eq!(controller.hit_test(3.0, 240.0), Some(ResizeEdge::Left));
        assert_eq!(controller.hit_test(235.0, 240.0), Some(ResizeEdge::Right));
        assert_eq!(controller.hit_test(100.0, 240.0), None);
        assert_eq!(controller.hit_test(6.0, 10.0), Some(ResizeEdge::Left));
    }

    #[test]
    fn drag_previews_then_commits() {
        let mut board = Board::new();
        let task = board.store.get(1).cloned().expect("task exists");
        let mut controller = InteractionController::default();

        controller
            .begin_drag(&task, PointerPosition::new(200.0, 20.0), board.ctx())
            .expect("drag begins");
        assert_eq!(controller.phase(), GesturePhase::Active);

        let preview = controller
            .update(PointerPosition::new(365.0, 68.0), board.ctx())
            .expect("preview");
        let GesturePreview::Drag(preview) = preview else {
            panic!("expected drag preview");
        };
        assert_eq!(preview.day_offset, 4);
        assert_eq!(preview.resource_index, 1);
        assert_eq!(preview.geometry.left, 320.0);
        assert_eq!(board.store.get(1), Some(&task));

        let ctx = GestureContext {
            grid: &board.grid,
            window: &board.window,
            resource_count: 3,
        };
        let commit = controller
            .commit(PointerPosition::new(365.0, 68.0), ctx, &mut board.store)
            .expect("commit")
            .expect("task still exists");
        let GestureCommit::Moved(moved) = commit else {
            panic!("expected drag commit");
        };
        assert_eq!(moved.new_start, date(2024, 1, 5));
        assert_eq!(moved.update.after.end, date(2024, 1, 7));
        assert_eq!(moved.new_resource_index, 1);
        assert_eq!(controller.phase(), GesturePhase::Idle);
    }

    #[test]
    fn second_gesture_is_rejected_and_cancel_reverts() {
        let board = Board::new();
        let task = board.store.get(1).cloned().expect("task exists");
        let mut controller = InteractionController::default();

        controller
            .begin_resize(&task, ResizeEdge::Right, PointerPosition::default(), board.ctx())
            .expect("resize begins");
        let err = controller
            .begin_drag(&task, PointerPosition::default(), board.ctx())
            .expect_err("second gesture rejected");
        assert_eq!(err.kind(), ErrorKind::State);

        assert_eq!(controller.cancel(), Some(1));
        assert_eq!(controller.cancel(), None);
        assert!(!controller.is_active());
        assert_eq!(board.store.get(1), Some(&task));
        assert!(
            controller
                .update(PointerPosition::default(), board.ctx())
                .is_err()
        );
    }

    #[test]
    fn release_without_crossing_a_cell_leaves_task_alone() {
        let mut board = Board::new();
        let overhanging = board
            .store
            .add(TaskDraft::new("long", date(2024, 1, 19), 10, 1))
            .expect("add");
        let mut controller = InteractionController::default();

        controller
            .begin_resize(
                &overhanging,
                ResizeEdge::Right,
                PointerPosition::new(2230.0, 60.0),
                board.ctx(),
            )
            .expect("resize begins");
        let ctx = GestureContext {
            grid: &board.grid,
            window: &board.window,
            resource_count: 3,
        };
        let commit = controller
            .commit(PointerPosition::new(2255.0, 62.0), ctx, &mut board.store)
            .expect("commit");
        assert_eq!(commit, None);
        assert_eq!(controller.phase(), GesturePhase::Idle);

        controller
            .begin_drag(&overhanging, PointerPosition::new(1500.0, 60.0), board.ctx())
            .expect("drag begins");
        let ctx = GestureContext {
            grid: &board.grid,
            window: &board.window,
            resource_count: 3,
        };
        let commit = controller
            .commit(PointerPosition::new(1530.0, 70.0), ctx, &mut board.store)
            .expect("commit");
        assert_eq!(commit, None);
        assert_eq!(board.store.get(overhanging.id), Some(&overhanging));
    }

    #[test]
    fn commit_on_vanished_task_returns_to_idle() {
        let mut board = Board::new();
        let task = board.store.get(1).cloned().expect("task exists");
        let mut controller = InteractionController::default();
        controller
            .begin_drag(&task, PointerPosition::new(200.0, 20.0), board.ctx())
            .expect("drag begins");
        assert!(board.store.remove(1).is_some());

        let ctx = GestureContext {
            grid: &board.grid,
            window: &board.window,
            resource_count: 3,
        };
        let commit = controller
            .commit(PointerPosition::new(360.0, 20.0), ctx, &mut board.store)
            .expect("commit");
        assert_eq!(commit, None);
        assert_eq!(controller.phase(), GesturePhase::Idle);
        assert!(!controller.is_active());
    }

    #[test]
    fn left_resize_commit_keeps_end() {
        let mut board = Board::new();
        let task = board.store.get(1).cloned().expect("task exists");
        let mut controller = InteractionController::default();
        controller
            .begin_resize(&task, ResizeEdge::Left, PointerPosition::new(160.0, 0.0), board.ctx())
            .expect("resize begins");

        let ctx = GestureContext {
            grid: &board.grid,
            window: &board.window,
            resource_count: 3,
        };
        let commit = controller
            .commit(PointerPosition::new(0.0, 0.0), ctx, &mut board.store)
            .expect("commit")
            .expect("task exists");
        let GestureCommit::Resized(resized) = commit else {
            panic!("expected resize commit");
        };
        assert_eq!(resized.update.after.start, date(2024, 1, 1));
        assert_eq!(resized.update.after.duration, 5);
        assert_eq!(resized.update.after.end, task.end);
    }
}
