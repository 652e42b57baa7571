use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::calendar;
use crate::cli::{Command, LayoutArgs, ReplayArgs};
use crate::config::SchedulerOptions;
use crate::events::SchedulerEvent;
use crate::grid::DayColumn;
use crate::interaction::PointerPosition;
use crate::scheduler::{Scheduler, TaskLayout};
use crate::task::{Resource, Task, TaskDraft};
use crate::window::DateRange;

/// On-disk board: the same shape `getData()` produces, with loosely typed
/// task input.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardFile {
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub tasks: Vec<TaskDraft>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub anchor: Option<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Step {
    PointerDown {
        task_id: u64,
        x: f64,
        y: f64,
        offset_x: f64,
    },
    PointerMove {
        x: f64,
        y: f64,
    },
    PointerUp {
        x: f64,
        y: f64,
    },
    PointerCancel,
    Scroll {
        scroll_px: f64,
        viewport_px: f64,
    },
    FinishLoading {
        #[serde(default)]
        error: Option<String>,
    },
    MarkEndOfData,
    SetRange {
        anchor: String,
        days: u32,
    },
    NextWeek,
    PreviousWeek,
    ScrollToDate {
        date: String,
    },
    AddTask {
        task: TaskDraft,
    },
    RemoveTask {
        task_id: u64,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LayoutReport {
    range: DateRange,
    columns: Vec<DayColumn>,
    tasks: Vec<TaskLayout>,
}

#[derive(Debug, Serialize)]
struct FinalState<'a> {
    tasks: &'a [Task],
}

#[instrument(skip(options, command, out))]
pub fn dispatch(
    options: &SchedulerOptions,
    command: Command,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match command {
        Command::Layout(args) => cmd_layout(options, &args, out),
        Command::Replay(args) => cmd_replay(options, &args, out),
    }
}

pub fn read_board(path: &Path) -> anyhow::Result<BoardFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read board file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse board file {}", path.display()))
}

pub fn read_scenario(path: &Path) -> anyhow::Result<Scenario> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse scenario {}", path.display()))
}

#[instrument(skip(options, args, out))]
fn cmd_layout(options: &SchedulerOptions, args: &LayoutArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let board = read_board(&args.data)?;
    let mut options = options.clone();
    if let Some(days) = args.days {
        options.days_visible = days;
        options.policy.max_days_resident = options.policy.max_days_resident.max(days);
    }

    let scheduler = open_scheduler(options, args.anchor.as_deref(), board)?;
    let today = match args.today.as_deref() {
        Some(raw) => parse_date_arg("--today", raw)?,
        None => scheduler.today(),
    };

    let report = LayoutReport {
        range: scheduler.window().loaded_range(),
        columns: scheduler.day_columns(today),
        tasks: scheduler.layout(),
    };
    info!(tasks = report.tasks.len(), columns = report.columns.len(), "layout computed");

    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(())
}

#[instrument(skip(options, args, out))]
fn cmd_replay(options: &SchedulerOptions, args: &ReplayArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let board = read_board(&args.data)?;
    let scenario = read_scenario(&args.script)?;
    let anchor = args.anchor.clone().or_else(|| scenario.anchor.clone());
    let mut scheduler = open_scheduler(options.clone(), anchor.as_deref(), board)?;

    info!(scenario = %scenario.name, steps = scenario.steps.len(), "replaying scenario");
    let events = replay(&mut scheduler, &scenario.steps)?;
    for event in &events {
        serde_json::to_writer(&mut *out, event)?;
        writeln!(out)?;
    }

    serde_json::to_writer(
        &mut *out,
        &FinalState {
            tasks: scheduler.tasks(),
        },
    )?;
    writeln!(out)?;
    Ok(())
}

/// Runs `steps` against `scheduler` and returns every event emitted along
/// the way. Rejected operations show up as `error` events; only malformed
/// step values abort the replay.
pub fn replay(scheduler: &mut Scheduler, steps: &[Step]) -> anyhow::Result<Vec<SchedulerEvent>> {
    let recorded = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&recorded);
    let subscription = scheduler.on_any(move |event| sink.borrow_mut().push(event.clone()));

    for (index, step) in steps.iter().enumerate() {
        debug!(index, ?step, "replay step");
        if let Err(err) = apply_step(scheduler, step).with_context(|| format!("step {index} failed")) {
            scheduler.off(subscription);
            return Err(err);
        }
    }

    scheduler.off(subscription);
    let events = recorded.borrow().clone();
    Ok(events)
}

fn apply_step(scheduler: &mut Scheduler, step: &Step) -> anyhow::Result<()> {
    match step {
        Step::PointerDown {
            task_id,
            x,
            y,
            offset_x,
        } => log_rejection(scheduler.pointer_down(*task_id, PointerPosition::new(*x, *y), *offset_x)),
        Step::PointerMove { x, y } => log_rejection(scheduler.pointer_move(PointerPosition::new(*x, *y))),
        Step::PointerUp { x, y } => log_rejection(scheduler.pointer_up(PointerPosition::new(*x, *y))),
        Step::PointerCancel => {
            scheduler.pointer_cancel();
        }
        Step::Scroll {
            scroll_px,
            viewport_px,
        } => {
            scheduler.on_scroll(*scroll_px, *viewport_px);
        }
        Step::FinishLoading { error } => {
            let result = match error {
                Some(message) => Err(message.clone()),
                None => Ok(()),
            };
            log_rejection(scheduler.finish_loading(result));
        }
        Step::MarkEndOfData => scheduler.mark_end_of_data(),
        Step::SetRange { anchor, days } => {
            let anchor = parse_date_arg("anchor", anchor)?;
            log_rejection(scheduler.set_date_range(anchor, *days));
        }
        Step::NextWeek => log_rejection(scheduler.go_to_next_week()),
        Step::PreviousWeek => log_rejection(scheduler.go_to_previous_week()),
        Step::ScrollToDate { date } => {
            let date = parse_date_arg("date", date)?;
            scheduler.scroll_to_date(date);
        }
        Step::AddTask { task } => log_rejection(scheduler.add_task(task.clone())),
        Step::RemoveTask { task_id } => {
            if scheduler.remove_task(*task_id).is_none() {
                warn!(task_id, "remove ignored; no such task");
            }
        }
    }
    Ok(())
}

fn log_rejection<T>(result: crate::error::SchedulerResult<T>) {
    if let Err(err) = result {
        warn!(error = %err, "step rejected");
    }
}

fn open_scheduler(
    options: SchedulerOptions,
    anchor: Option<&str>,
    board: BoardFile,
) -> anyhow::Result<Scheduler> {
    let anchor = match anchor {
        Some(raw) => parse_date_arg("anchor", raw)?,
        None => calendar::today_in(&options.timezone, chrono::Utc::now()),
    };
    let mut scheduler = Scheduler::new(options, anchor).map_err(|err| anyhow!("{err}"))?;
    scheduler
        .load(board.resources, board.tasks)
        .map_err(|err| anyhow!("invalid board data: {err}"))?;
    Ok(scheduler)
}

fn parse_date_arg(name: &str, raw: &str) -> anyhow::Result<NaiveDate> {
    calendar::parse_iso(raw).map_err(|err| anyhow!("invalid {name}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::{Scenario, Step, replay};
    use crate::config::SchedulerOptions;
    use crate::events::EventKind;
    use crate::scheduler::Scheduler;
    use crate::task::{Resource, TaskDraft};

    #[test]
    fn steps_deserialize_from_camel_case() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "name": "drag",
                "steps": [
                    {"step": "pointerDown", "taskId": 1, "x": 200, "y": 20, "offsetX": 40},
                    {"step": "scroll", "scrollPx": 480, "viewportPx": 800},
                    {"step": "finishLoading", "error": "offline"},
                    {"step": "nextWeek"}
                ]
            }"#,
        )
        .expect("scenario parses");

        assert_eq!(scenario.steps.len(), 4);
        assert!(matches!(
            scenario.steps[0],
            Step::PointerDown { task_id: 1, .. }
        ));
        assert!(matches!(
            &scenario.steps[2],
            Step::FinishLoading { error: Some(message) } if message == "offline"
        ));
    }

    #[test]
    fn replay_collects_events_and_keeps_going_after_rejections() {
        let anchor = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        let mut scheduler = Scheduler::new(SchedulerOptions::default(), anchor).expect("scheduler");
        scheduler
            .load(
                vec![Resource::new("a"), Resource::new("b")],
                vec![TaskDraft::new("A", anchor, 2, 0)],
            )
            .expect("load");

        let steps = vec![
            Step::PointerMove { x: 0.0, y: 0.0 },
            Step::PointerDown {
                task_id: 1,
                x: 60.0,
                y: 10.0,
                offset_x: 60.0,
            },
            Step::PointerUp { x: 140.0, y: 10.0 },
        ];
        let events = replay(&mut scheduler, &steps).expect("replay runs");
        let kinds: Vec<EventKind> = events.iter().map(|event| event.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Error,
                EventKind::DragStarted,
                EventKind::TaskUpdated,
                EventKind::TaskMoved
            ]
        );
        assert_eq!(
            scheduler.get_task(1).map(|task| task.start),
            chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        );
    }

    #[test]
    fn malformed_step_values_abort() {
        let anchor = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        let mut scheduler = Scheduler::new(SchedulerOptions::default(), anchor).expect("scheduler");
        let steps = vec![Step::ScrollToDate {
            date: "2024/01/03".to_string(),
        }];
        assert!(replay(&mut scheduler, &steps).is_err());
    }
}
