use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::calendar::iso_date_serde;
use crate::error::ErrorKind;
use crate::interaction::ResizeEdge;
use crate::task::Task;
use crate::window::DateRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    TaskAdded,
    TaskUpdated,
    TaskRemoved,
    TaskMoved,
    TaskResized,
    TasksLoaded,
    DateRangeChanged,
    DateRangeExtended,
    DaysCleanedUp,
    LoadingStart,
    LoadingEnd,
    LoadingError,
    ScrolledToDate,
    DragStarted,
    ResizeStarted,
    GestureCancelled,
    Refreshed,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 18] = [
        EventKind::TaskAdded,
        EventKind::TaskUpdated,
        EventKind::TaskRemoved,
        EventKind::TaskMoved,
        EventKind::TaskResized,
        EventKind::TasksLoaded,
        EventKind::DateRangeChanged,
        EventKind::DateRangeExtended,
        EventKind::DaysCleanedUp,
        EventKind::LoadingStart,
        EventKind::LoadingEnd,
        EventKind::LoadingError,
        EventKind::ScrolledToDate,
        EventKind::DragStarted,
        EventKind::ResizeStarted,
        EventKind::GestureCancelled,
        EventKind::Refreshed,
        EventKind::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::TaskAdded => "taskAdded",
            EventKind::TaskUpdated => "taskUpdated",
            EventKind::TaskRemoved => "taskRemoved",
            EventKind::TaskMoved => "taskMoved",
            EventKind::TaskResized => "taskResized",
            EventKind::TasksLoaded => "tasksLoaded",
            EventKind::DateRangeChanged => "dateRangeChanged",
            EventKind::DateRangeExtended => "dateRangeExtended",
            EventKind::DaysCleanedUp => "daysCleanedUp",
            EventKind::LoadingStart => "loadingStart",
            EventKind::LoadingEnd => "loadingEnd",
            EventKind::LoadingError => "loadingError",
            EventKind::ScrolledToDate => "scrolledToDate",
            EventKind::DragStarted => "dragStarted",
            EventKind::ResizeStarted => "resizeStarted",
            EventKind::GestureCancelled => "gestureCancelled",
            EventKind::Refreshed => "refreshed",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| format!("unknown event name: {s}"))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SchedulerEvent {
    TaskAdded {
        task: Task,
    },
    TaskUpdated {
        before: Task,
        after: Task,
    },
    TaskRemoved {
        task: Task,
    },
    TaskMoved {
        task: Task,
        #[serde(with = "iso_date_serde")]
        old_start: NaiveDate,
        #[serde(with = "iso_date_serde")]
        new_start: NaiveDate,
        old_resource_index: usize,
        new_resource_index: usize,
    },
    TaskResized {
        task: Task,
        #[serde(with = "iso_date_serde")]
        old_start: NaiveDate,
        #[serde(with = "iso_date_serde")]
        new_start: NaiveDate,
        #[serde(with = "iso_date_serde")]
        old_end: NaiveDate,
        #[serde(with = "iso_date_serde")]
        new_end: NaiveDate,
        old_duration: u32,
        new_duration: u32,
    },
    TasksLoaded {
        resources: usize,
        tasks: usize,
    },
    DateRangeChanged {
        #[serde(with = "iso_date_serde")]
        start: NaiveDate,
        #[serde(with = "iso_date_serde")]
        end: NaiveDate,
        days: u32,
    },
    DateRangeExtended {
        #[serde(with = "iso_date_serde")]
        opened_start: NaiveDate,
        #[serde(with = "iso_date_serde")]
        old_end: NaiveDate,
        #[serde(with = "iso_date_serde")]
        new_end: NaiveDate,
        new_days: u32,
        total_days: u32,
    },
    DaysCleanedUp {
        removed_days: u32,
        removed_tasks: Vec<u64>,
        current_range: DateRange,
        total_days: u32,
        scroll_adjust_px: f64,
    },
    LoadingStart {
        current_range: DateRange,
        requested_days: u32,
    },
    LoadingEnd {
        current_range: DateRange,
        total_days: u32,
    },
    LoadingError {
        message: String,
        range: Option<DateRange>,
    },
    ScrolledToDate {
        #[serde(with = "iso_date_serde")]
        date: NaiveDate,
        scroll_position: f64,
        day_index: i64,
    },
    DragStarted {
        task: Task,
    },
    ResizeStarted {
        task: Task,
        edge: ResizeEdge,
    },
    GestureCancelled {
        task_id: u64,
    },
    Refreshed,
    /// Serialized as `{"event": "error", "type": ..., "error": ...}`.
    Error {
        #[serde(rename = "type")]
        kind: ErrorKind,
        error: String,
    },
}

impl SchedulerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SchedulerEvent::TaskAdded { .. } => EventKind::TaskAdded,
            SchedulerEvent::TaskUpdated { .. } => EventKind::TaskUpdated,
            SchedulerEvent::TaskRemoved { .. } => EventKind::TaskRemoved,
            SchedulerEvent::TaskMoved { .. } => EventKind::TaskMoved,
            SchedulerEvent::TaskResized { .. } => EventKind::TaskResized,
            SchedulerEvent::TasksLoaded { .. } => EventKind::TasksLoaded,
            SchedulerEvent::DateRangeChanged { .. } => EventKind::DateRangeChanged,
            SchedulerEvent::DateRangeExtended { .. } => EventKind::DateRangeExtended,
            SchedulerEvent::DaysCleanedUp { .. } => EventKind::DaysCleanedUp,
            SchedulerEvent::LoadingStart { .. } => EventKind::LoadingStart,
            SchedulerEvent::LoadingEnd { .. } => EventKind::LoadingEnd,
            SchedulerEvent::LoadingError { .. } => EventKind::LoadingError,
            SchedulerEvent::ScrolledToDate { .. } => EventKind::ScrolledToDate,
            SchedulerEvent::DragStarted { .. } => EventKind::DragStarted,
            SchedulerEvent::ResizeStarted { .. } => EventKind::ResizeStarted,
            SchedulerEvent::GestureCancelled { .. } => EventKind::GestureCancelled,
            SchedulerEvent::Refreshed => EventKind::Refreshed,
            SchedulerEvent::Error { .. } => EventKind::Error,
        }
    }
}

pub type Handler = Box<dyn FnMut(&SchedulerEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    kind: Option<EventKind>,
    handler: Handler,
}

/// Synchronous pub/sub. Handlers run in subscription order on the caller's
/// thread before `emit` returns.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&SchedulerEvent) + 'static,
    {
        self.subscribe(Some(kind), Box::new(handler))
    }

    /// Receives every event regardless of kind.
    pub fn on_any<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&SchedulerEvent) + 'static,
    {
        self.subscribe(None, Box::new(handler))
    }

    pub fn off(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id != id);
        before != self.subscribers.len()
    }

    pub fn emit(&mut self, event: SchedulerEvent) {
        let kind = event.kind();
        trace!(event = %kind, "emitting event");
        for subscriber in &mut self.subscribers {
            if subscriber.kind.is_none_or(|wanted| wanted == kind) {
                (subscriber.handler)(&event);
            }
        }
    }

    fn subscribe(&mut self, kind: Option<EventKind>, handler: Handler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        debug!(?id, kind = ?kind, "registered event handler");
        self.subscribers.push(Subscriber { id, kind, handler });
        id
    }
}
