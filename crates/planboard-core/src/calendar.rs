use std::sync::OnceLock;

use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;

use crate::error::{
  SchedulerError,
  SchedulerResult
};

const ISO_DATE_FORMAT: &str =
  "%Y-%m-%d";

fn iso_date_regex()
-> Option<&'static Regex> {
  static ISO_DATE_RE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  ISO_DATE_RE
    .get_or_init(|| {
      Regex::new(
        r"^(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2})$"
      )
      .ok()
    })
    .as_ref()
}

/// Monday of the ISO week containing
/// `date`.
#[must_use]
pub fn monday_of(
  date: NaiveDate
) -> NaiveDate {
  let back = date
    .weekday()
    .num_days_from_monday()
    as i64;
  add_days(date, -back)
}

/// Whole days from `from` to `to`.
/// Calendar dates carry no time of
/// day, so daylight-saving shifts
/// cannot leak into the count.
#[must_use]
pub fn day_offset(
  from: NaiveDate,
  to: NaiveDate
) -> i64 {
  to.signed_duration_since(from)
    .num_days()
}

#[must_use]
pub fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or_else(|| {
      tracing::warn!(
        date = %date,
        days,
        "date shift overflowed the calendar; keeping original date"
      );
      date
    })
}

/// Last day covered by a span of
/// `duration` days starting on `start`.
#[must_use]
pub fn end_date(
  start: NaiveDate,
  duration: u32
) -> NaiveDate {
  add_days(
    start,
    i64::from(duration) - 1
  )
}

#[must_use]
pub fn format_iso(
  date: NaiveDate
) -> String {
  date
    .format(ISO_DATE_FORMAT)
    .to_string()
}

pub fn parse_iso(
  raw: &str
) -> SchedulerResult<NaiveDate> {
  let trimmed = raw.trim();
  let well_formed = iso_date_regex()
    .map(|re| re.is_match(trimmed))
    .unwrap_or(false);
  if !well_formed {
    return Err(
      SchedulerError::validation(
        format!(
          "expected a YYYY-MM-DD \
           date, got {raw:?}"
        )
      )
    );
  }

  NaiveDate::parse_from_str(
    trimmed,
    ISO_DATE_FORMAT
  )
  .map_err(|err| {
    SchedulerError::validation(
      format!(
        "invalid calendar date \
         {raw:?}: {err}"
      )
    )
  })
}

#[must_use]
pub fn is_weekend(
  date: NaiveDate
) -> bool {
  matches!(
    date.weekday(),
    Weekday::Sat | Weekday::Sun
  )
}

#[must_use]
pub fn today_in(
  timezone: &Tz,
  now: DateTime<Utc>
) -> NaiveDate {
  now
    .with_timezone(timezone)
    .date_naive()
}

pub fn parse_timezone(
  raw: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      "timezone value was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => Some(tz),
    | Err(err) => {
      tracing::error!(
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

pub mod iso_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    date: &NaiveDate,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_iso(*date)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDate, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_iso(&raw)
      .map_err(serde::de::Error::custom)
  }
}
