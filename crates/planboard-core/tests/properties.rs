use chrono::NaiveDate;
use planboard_core::calendar;
use planboard_core::config::SchedulerOptions;
use planboard_core::grid::GridMapper;
use planboard_core::interaction::{PointerPosition, ResizeEdge, resize_target};
use planboard_core::store::TaskStore;
use planboard_core::task::{Resource, TaskDraft, TaskPatch};
use planboard_core::window::{DateWindow, WindowPolicy};
use planboard_core::Scheduler;
use proptest::prelude::*;

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date")
}

fn any_date() -> impl Strategy<Value = NaiveDate> {
    (-40_000i64..40_000).prop_map(|days| calendar::add_days(base(), days))
}

proptest! {
    #[test]
    fn iso_format_round_trips(date in any_date()) {
        let formatted = calendar::format_iso(date);
        let reparsed = calendar::parse_iso(&formatted).expect("formatted date parses");
        prop_assert_eq!(calendar::format_iso(reparsed), formatted);
    }

    #[test]
    fn end_follows_start_and_duration(
        start in any_date(),
        duration in 1u32..400,
        new_duration in 1i64..400,
        shift in -60i64..60,
    ) {
        let mut store = TaskStore::new();
        let task = store
            .add(TaskDraft::new("t", start, duration, 0))
            .expect("valid draft");
        prop_assert_eq!(task.end, calendar::add_days(start, i64::from(duration) - 1));

        let patch = TaskPatch {
            start: Some(calendar::format_iso(calendar::add_days(start, shift))),
            duration: Some(new_duration),
            ..TaskPatch::default()
        };
        let update = store.update(task.id, &patch).expect("valid patch").expect("known id");
        prop_assert!(update.after.has_consistent_end());
    }

    #[test]
    fn pixel_mapping_does_not_drift(offset in 0i64..400, cell_width in 1.0f64..240.0) {
        let grid = GridMapper::new(cell_width, 50.0).expect("grid");
        prop_assert_eq!(grid.x_to_day(grid.day_to_x(offset)), offset);
    }

    #[test]
    fn drag_commit_clamps_into_window(
        offset in 0i64..19,
        duration in 1u32..=3,
        resource in 0usize..3,
        days_delta in -30i64..30,
        rows_delta in -4i64..4,
    ) {
        let mut scheduler =
            Scheduler::new(SchedulerOptions::default(), base()).expect("scheduler");
        scheduler
            .load(
                vec![Resource::new("a"), Resource::new("b"), Resource::new("c")],
                vec![TaskDraft::new("t", calendar::add_days(base(), offset), duration, resource)],
            )
            .expect("load");

        scheduler
            .begin_drag(1, PointerPosition::new(10.0, 10.0))
            .expect("drag starts");
        let committed = scheduler
            .pointer_up(PointerPosition::new(
                10.0 + days_delta as f64 * 80.0,
                10.0 + rows_delta as f64 * 50.0,
            ))
            .expect("commit");
        if days_delta == 0 && rows_delta == 0 {
            prop_assert!(committed.is_none());
            return Ok(());
        }
        let moved = committed.expect("task present");

        let expected_offset = (offset + days_delta).min(21 - i64::from(duration)).max(0);
        let expected_row = (resource as i64 + rows_delta).clamp(0, 2) as usize;
        prop_assert_eq!(moved.start, calendar::add_days(base(), expected_offset));
        prop_assert_eq!(moved.resource_index, expected_row);
        prop_assert!(moved.has_consistent_end());
    }

    #[test]
    fn resize_keeps_the_fixed_edge(
        origin in 0i64..20,
        duration in 1u32..10,
        cells in -30i64..30,
    ) {
        let days_visible = 30;
        let (right_offset, right_duration) =
            resize_target(ResizeEdge::Right, origin, duration, cells, days_visible);
        prop_assert_eq!(right_offset, origin);
        prop_assert!(right_duration >= 1);

        let (left_offset, left_duration) =
            resize_target(ResizeEdge::Left, origin, duration, cells, days_visible);
        prop_assert!(left_duration >= 1);
        prop_assert!(left_offset >= 0);
        prop_assert_eq!(
            left_offset + i64::from(left_duration),
            origin + i64::from(duration)
        );
    }

    #[test]
    fn repeated_extend_while_loading_is_single(calls in 2usize..6) {
        let mut window = DateWindow::new(base(), 21, WindowPolicy::default()).expect("window");
        let started = (0..calls).filter_map(|_| window.extend()).count();
        prop_assert_eq!(started, 1);
        prop_assert_eq!(window.days_visible(), 42);
    }

    #[test]
    fn eviction_only_drops_tasks_before_cutoff(
        specs in prop::collection::vec((0i64..120, 1u32..10), 1..30),
        scroll_day in 0i64..120,
        total_days in 85u32..150,
    ) {
        let mut scheduler =
            Scheduler::new(SchedulerOptions::default(), base()).expect("scheduler");
        let drafts = specs
            .iter()
            .map(|(offset, duration)| {
                TaskDraft::new("t", calendar::add_days(base(), *offset), *duration, 0)
            })
            .collect();
        scheduler.load(vec![Resource::new("a")], drafts).expect("load");
        scheduler.set_date_range(base(), total_days).expect("grow window");
        let before: Vec<_> = scheduler.tasks().to_vec();

        let outcome = scheduler.on_scroll(scroll_day as f64 * 80.0, 800.0);
        let start = scheduler.window().loaded_range().start;
        let cutoff = calendar::add_days(start, -1);
        for task in &before {
            let still_there = scheduler.get_task(task.id).is_some();
            if outcome.eviction.is_some() {
                prop_assert_eq!(still_there, task.end >= cutoff);
            } else {
                prop_assert!(still_there);
            }
        }
        prop_assert!(scheduler.window().days_visible() >= 10);
        prop_assert!(scheduler.window().is_consistent());
    }
}
