use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::calendar::{self, iso_date_serde};
use crate::error::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    #[serde(with = "iso_date_serde")]
    pub start: NaiveDate,
    #[serde(with = "iso_date_serde")]
    pub end: NaiveDate,
}

impl DateRange {
    pub fn days(&self) -> i64 {
        calendar::day_offset(self.start, self.end) + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Tuning for extension and eviction, all in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub chunk_days: u32,
    pub buffer_days: u32,
    pub max_days_resident: u32,
    pub load_threshold_days: u32,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            chunk_days: 21,
            buffer_days: 14,
            max_days_resident: 84,
            load_threshold_days: 7,
        }
    }
}

/// Outcome of a started extension; `opened` is the sub-range the host
/// should fetch data for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extension {
    pub opened: DateRange,
    pub old_end: NaiveDate,
    pub new_end: NaiveDate,
    pub new_days: u32,
    pub total_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    pub removed_days: u32,
    pub new_loaded_start: NaiveDate,
    /// Tasks ending strictly before this date are dropped.
    pub cutoff: NaiveDate,
    /// Day offsets shift left by this much; hosts move their scroll
    /// position by the same amount to avoid a visual jump.
    pub scroll_adjust_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindow {
    week_anchor_start: NaiveDate,
    days_visible: u32,
    loaded: DateRange,
    policy: WindowPolicy,
    is_loading: bool,
    reached_end: bool,
}

impl DateWindow {
    pub fn new(anchor: NaiveDate, days_visible: u32, policy: WindowPolicy) -> SchedulerResult<Self> {
        if policy.chunk_days == 0 {
            return Err(SchedulerError::validation("chunk days must be positive"));
        }
        if policy.max_days_resident < days_visible {
            return Err(SchedulerError::validation(format!(
                "max resident days ({}) cannot be smaller than the visible days ({days_visible})",
                policy.max_days_resident
            )));
        }
        let (week_anchor_start, loaded) = initial_range(anchor, days_visible)?;
        Ok(Self {
            week_anchor_start,
            days_visible,
            loaded,
            policy,
            is_loading: false,
            reached_end: false,
        })
    }

    pub fn week_anchor_start(&self) -> NaiveDate {
        self.week_anchor_start
    }

    pub fn days_visible(&self) -> u32 {
        self.days_visible
    }

    pub fn loaded_range(&self) -> DateRange {
        self.loaded
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn has_reached_end(&self) -> bool {
        self.reached_end
    }

    /// Last day of the visible span.
    pub fn visible_end(&self) -> NaiveDate {
        calendar::add_days(self.week_anchor_start, i64::from(self.days_visible) - 1)
    }

    pub fn day_offset_of(&self, date: NaiveDate) -> i64 {
        calendar::day_offset(self.week_anchor_start, date)
    }

    pub fn date_at(&self, day_offset: i64) -> NaiveDate {
        calendar::add_days(self.week_anchor_start, day_offset)
    }

    pub fn contains_offset(&self, day_offset: i64) -> bool {
        (0..i64::from(self.days_visible)).contains(&day_offset)
    }

    /// Re-initializes the window around the week of `anchor`. Clears the
    /// end-of-data flag since the host is now looking at a different span.
    #[instrument(skip(self))]
    pub fn set_range(&mut self, anchor: NaiveDate, days_visible: u32) -> SchedulerResult<DateRange> {
        let (week_anchor_start, loaded) = initial_range(anchor, days_visible)?;
        self.week_anchor_start = week_anchor_start;
        self.days_visible = days_visible;
        self.loaded = loaded;
        self.reached_end = false;
        debug!(
            start = %self.week_anchor_start,
            end = %self.loaded.end,
            days = self.days_visible,
            "window range reset"
        );
        Ok(self.loaded)
    }

    pub fn can_extend(&self) -> bool {
        !self.is_loading && !self.reached_end
    }

    /// Grows the window by one chunk and marks it loading until
    /// [`DateWindow::finish_extend`] is called. `None` while a previous
    /// extension is unresolved or after the end of data was reached.
    #[instrument(skip(self))]
    pub fn extend(&mut self) -> Option<Extension> {
        if !self.can_extend() {
            debug!(
                loading = self.is_loading,
                reached_end = self.reached_end,
                "extend ignored"
            );
            return None;
        }

        let chunk = self.policy.chunk_days;
        let old_end = self.loaded.end;
        let new_end = calendar::add_days(old_end, i64::from(chunk));
        self.is_loading = true;
        self.days_visible += chunk;
        self.loaded.end = new_end;

        debug!(
            old_end = %old_end,
            new_end = %new_end,
            total_days = self.days_visible,
            "window extended"
        );
        Some(Extension {
            opened: DateRange {
                start: calendar::add_days(old_end, 1),
                end: new_end,
            },
            old_end,
            new_end,
            new_days: chunk,
            total_days: self.days_visible,
        })
    }

    pub fn should_extend(&self, distance_from_end_days: i64) -> bool {
        distance_from_end_days <= i64::from(self.policy.load_threshold_days)
    }

    pub fn maybe_extend(&mut self, distance_from_end_days: i64) -> Option<Extension> {
        if self.should_extend(distance_from_end_days) {
            self.extend()
        } else {
            None
        }
    }

    /// Resolves the outstanding extension. Returns false when nothing was
    /// in flight.
    pub fn finish_extend(&mut self) -> bool {
        let was_loading = self.is_loading;
        self.is_loading = false;
        was_loading
    }

    pub fn mark_end_of_data(&mut self) {
        debug!(end = %self.loaded.end, "end of data reached");
        self.reached_end = true;
    }

    /// Trims days from the front once more than `max_days_resident` are
    /// loaded, keeping `buffer_days` behind the scroll position and never
    /// shrinking below `min_resident_days`.
    #[instrument(skip(self))]
    pub fn evict(&mut self, current_scroll_day_offset: i64, min_resident_days: u32) -> Option<Eviction> {
        if self.is_loading {
            debug!("eviction skipped while an extension is in flight");
            return None;
        }
        if self.days_visible <= self.policy.max_days_resident {
            return None;
        }

        let keep_from_day = (current_scroll_day_offset - i64::from(self.policy.buffer_days)).max(0);
        if keep_from_day == 0 {
            return None;
        }

        let floor = min_resident_days.max(1);
        let removable = i64::from(self.days_visible.saturating_sub(floor));
        let removed = keep_from_day.min(removable);
        if removed <= 0 {
            warn!(
                days_visible = self.days_visible,
                min_resident_days = floor,
                "eviction would shrink the window below the viewport"
            );
            return None;
        }

        let removed_days = u32::try_from(removed).ok()?;
        self.week_anchor_start = calendar::add_days(self.week_anchor_start, removed);
        self.days_visible -= removed_days;
        self.loaded.start = calendar::add_days(self.loaded.start, removed);
        let cutoff = calendar::add_days(self.loaded.start, -1);

        debug!(
            removed_days,
            new_start = %self.loaded.start,
            days_visible = self.days_visible,
            "evicted leading days"
        );
        Some(Eviction {
            removed_days,
            new_loaded_start: self.loaded.start,
            cutoff,
            scroll_adjust_days: -removed,
        })
    }

    /// `loaded.start <= anchor` and `anchor + days - 1 <= loaded.end`.
    pub fn is_consistent(&self) -> bool {
        self.days_visible >= 1
            && self.loaded.start <= self.week_anchor_start
            && self.visible_end() <= self.loaded.end
    }
}

fn initial_range(anchor: NaiveDate, days_visible: u32) -> SchedulerResult<(NaiveDate, DateRange)> {
    if days_visible == 0 {
        return Err(SchedulerError::validation("visible days must be at least 1"));
    }
    let start = calendar::monday_of(anchor);
    let end = calendar::add_days(start, i64::from(days_visible) - 1);
    Ok((start, DateRange { start, end }))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{DateWindow, WindowPolicy};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn window(days: u32) -> DateWindow {
        DateWindow::new(date(2024, 1, 3), days, WindowPolicy::default()).expect("valid window")
    }

    #[test]
    fn init_snaps_to_monday() {
        let window = window(21);
        assert_eq!(window.week_anchor_start(), date(2024, 1, 1));
        assert_eq!(window.loaded_range().start, date(2024, 1, 1));
        assert_eq!(window.loaded_range().end, date(2024, 1, 21));
        assert_eq!(window.loaded_range().days(), 21);
        assert!(window.is_consistent());
    }

    #[test]
    fn rejects_invalid_construction() {
        assert!(DateWindow::new(date(2024, 1, 1), 0, WindowPolicy::default()).is_err());
        let tight = WindowPolicy {
            max_days_resident: 7,
            ..WindowPolicy::default()
        };
        assert!(DateWindow::new(date(2024, 1, 1), 21, tight).is_err());
        let no_chunk = WindowPolicy {
            chunk_days: 0,
            ..WindowPolicy::default()
        };
        assert!(DateWindow::new(date(2024, 1, 1), 21, no_chunk).is_err());
    }

    #[test]
    fn extend_is_single_flight() {
        let mut window = window(21);
        let extension = window.maybe_extend(5).expect("within threshold");
        assert_eq!(extension.opened.start, date(2024, 1, 22));
        assert_eq!(extension.new_end, date(2024, 2, 11));
        assert_eq!(window.days_visible(), 42);
        assert!(window.is_loading());

        assert!(window.extend().is_none());
        assert!(window.maybe_extend(0).is_none());
        assert_eq!(window.days_visible(), 42);

        assert!(window.finish_extend());
        assert!(!window.finish_extend());
        assert!(window.maybe_extend(8).is_none());
        assert!(window.maybe_extend(7).is_some());
        assert_eq!(window.days_visible(), 63);
        assert!(window.is_consistent());
    }

    #[test]
    fn end_of_data_blocks_extension_until_reset() {
        let mut window = window(21);
        window.mark_end_of_data();
        assert!(window.extend().is_none());
        window
            .set_range(date(2024, 2, 7), 21)
            .expect("valid range");
        assert_eq!(window.week_anchor_start(), date(2024, 2, 5));
        assert!(window.extend().is_some());
    }

    #[test]
    fn evict_trims_front_and_reports_shift() {
        let mut window = window(21);
        window.set_range(date(2024, 1, 1), 90).expect("valid range");

        let eviction = window.evict(30, 10).expect("over the resident limit");
        assert_eq!(eviction.removed_days, 16);
        assert_eq!(eviction.scroll_adjust_days, -16);
        assert_eq!(eviction.new_loaded_start, date(2024, 1, 17));
        assert_eq!(eviction.cutoff, date(2024, 1, 16));
        assert_eq!(window.week_anchor_start(), date(2024, 1, 17));
        assert_eq!(window.days_visible(), 74);
        assert!(window.is_consistent());

        assert!(window.evict(30, 10).is_none());
    }

    #[test]
    fn evict_respects_limits() {
        let mut window = window(21);
        window.set_range(date(2024, 1, 1), 90).expect("valid range");
        assert!(window.evict(14, 10).is_none());

        let eviction = window.evict(80, 60).expect("partial eviction");
        assert_eq!(eviction.removed_days, 30);
        assert_eq!(window.days_visible(), 60);

        let mut loading = self::window(21);
        loading.set_range(date(2024, 1, 1), 90).expect("valid range");
        loading.extend().expect("starts extension");
        assert!(loading.evict(60, 10).is_none());
    }
}
