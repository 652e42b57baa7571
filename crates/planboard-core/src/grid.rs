use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar;
use crate::error::{SchedulerError, SchedulerResult};
use crate::task::Task;

/// Pixel rectangle of a task bar, relative to the grid origin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TaskGeometry {
    pub left: f64,
    pub width: f64,
    pub top: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    pub resource_index: usize,
    pub day_index: i64,
    #[serde(with = "calendar::iso_date_serde")]
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayColumn {
    pub index: i64,
    #[serde(with = "calendar::iso_date_serde")]
    pub date: NaiveDate,
    pub is_weekend: bool,
    pub is_today: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VisibleRange {
    #[serde(with = "calendar::iso_date_serde")]
    pub start: NaiveDate,
    #[serde(with = "calendar::iso_date_serde")]
    pub end: NaiveDate,
    pub start_day: i64,
    pub end_day: i64,
}

/// Converts between day offsets, resource rows and pixels. Holds no
/// mutable state, so identical inputs always produce identical outputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridMapper {
    cell_width: f64,
    row_height: f64,
}

impl GridMapper {
    pub fn new(cell_width: f64, row_height: f64) -> SchedulerResult<Self> {
        if !(cell_width.is_finite() && cell_width > 0.0) {
            return Err(SchedulerError::validation(format!(
                "cell width must be a positive number of pixels, got {cell_width}"
            )));
        }
        if !(row_height.is_finite() && row_height > 0.0) {
            return Err(SchedulerError::validation(format!(
                "row height must be a positive number of pixels, got {row_height}"
            )));
        }
        Ok(Self {
            cell_width,
            row_height,
        })
    }

    pub fn cell_width(&self) -> f64 {
        self.cell_width
    }

    pub fn row_height(&self) -> f64 {
        self.row_height
    }

    pub fn day_to_x(&self, day_offset: i64) -> f64 {
        day_offset as f64 * self.cell_width
    }

    pub fn x_to_day(&self, x: f64) -> i64 {
        (x / self.cell_width).round() as i64
    }

    /// Whole cells covered by a pointer movement of `dx` pixels.
    pub fn cells_in(&self, dx: f64) -> i64 {
        self.x_to_day(dx)
    }

    /// Whole rows covered by a pointer movement of `dy` pixels.
    pub fn rows_in(&self, dy: f64) -> i64 {
        (dy / self.row_height).round() as i64
    }

    pub fn resource_to_y(&self, resource_index: usize) -> f64 {
        resource_index as f64 * self.row_height
    }

    /// Row under `y`, clamped into `[0, resource_count - 1]`.
    pub fn y_to_resource(&self, y: f64, resource_count: usize) -> usize {
        clamp_resource(self.rows_in(y), resource_count)
    }

    pub fn task_geometry(&self, task: &Task, anchor: NaiveDate) -> TaskGeometry {
        let offset = calendar::day_offset(anchor, task.start);
        self.span_geometry(offset, task.duration, task.resource_index)
    }

    pub fn span_geometry(
        &self,
        day_offset: i64,
        duration: u32,
        resource_index: usize,
    ) -> TaskGeometry {
        TaskGeometry {
            left: self.day_to_x(day_offset),
            width: f64::from(duration) * self.cell_width,
            top: self.resource_to_y(resource_index),
        }
    }

    /// Cell under a grid-relative point. Points left of the first column,
    /// past the last loaded column, or outside every row are range errors.
    pub fn cell_at(
        &self,
        x: f64,
        y: f64,
        anchor: NaiveDate,
        days_visible: u32,
        resource_count: usize,
    ) -> SchedulerResult<GridCell> {
        let day_index = (x / self.cell_width).floor() as i64;
        let row = (y / self.row_height).floor() as i64;
        if day_index < 0 || day_index >= i64::from(days_visible) {
            return Err(SchedulerError::range(format!(
                "x={x} falls outside the {days_visible} loaded day columns"
            )));
        }
        if row < 0 || row as usize >= resource_count {
            return Err(SchedulerError::range(format!(
                "y={y} falls outside the {resource_count} resource rows"
            )));
        }
        Ok(GridCell {
            resource_index: row as usize,
            day_index,
            date: calendar::add_days(anchor, day_index),
        })
    }

    pub fn visible_range(
        &self,
        anchor: NaiveDate,
        scroll_px: f64,
        viewport_px: f64,
    ) -> VisibleRange {
        let start_day = (scroll_px / self.cell_width).floor() as i64;
        let end_day = ((scroll_px + viewport_px) / self.cell_width).ceil() as i64;
        VisibleRange {
            start: calendar::add_days(anchor, start_day),
            end: calendar::add_days(anchor, end_day),
            start_day,
            end_day,
        }
    }

    /// Number of whole columns needed to fill a viewport.
    pub fn columns_for(&self, viewport_px: f64) -> u32 {
        let columns = (viewport_px / self.cell_width).ceil();
        if columns.is_finite() && columns > 0.0 {
            columns as u32
        } else {
            0
        }
    }
}

pub fn day_columns(anchor: NaiveDate, days_visible: u32, today: NaiveDate) -> Vec<DayColumn> {
    (0..i64::from(days_visible))
        .map(|index| {
            let date = calendar::add_days(anchor, index);
            DayColumn {
                index,
                date,
                is_weekend: calendar::is_weekend(date),
                is_today: date == today,
            }
        })
        .collect()
}

/// Clamps a signed row candidate into the resource list. An empty list
/// pins everything to row 0.
pub fn clamp_resource(candidate: i64, resource_count: usize) -> usize {
    let last = resource_count.saturating_sub(1) as i64;
    candidate.min(last).max(0) as usize
}
