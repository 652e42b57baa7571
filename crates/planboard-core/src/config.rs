use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::str::FromStr;

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::calendar;
use crate::error::{
  SchedulerError,
  SchedulerResult
};
use crate::interaction::DEFAULT_HANDLE_WIDTH;
use crate::window::WindowPolicy;

const RC_ENV_VAR: &str = "PLANBOARDRC";
const RC_FILE_NAME: &str =
  ".planboardrc";

#[derive(Debug, Clone, Default)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading planboard rc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no planboard rc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) {
    self.map.insert(
      key.to_string(),
      value.to_string()
    );
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    self
      .map
      .get(key)
      .map(|raw| {
        parse_bool(raw).ok_or_else(
          || {
            anyhow!(
              "invalid boolean for \
               {key}: {raw}"
            )
          }
        )
      })
      .transpose()
  }

  /// Typed lookup; a present but
  /// unparsable value is an error
  /// naming the key.
  pub fn get_parsed<T>(
    &self,
    key: &str
  ) -> anyhow::Result<Option<T>>
  where
    T: FromStr,
    T::Err: std::fmt::Display
  {
    self
      .map
      .get(key)
      .map(|raw| {
        raw.trim().parse::<T>().map_err(
          |err| {
            anyhow!(
              "invalid value for \
               {key}: {raw} ({err})"
            )
          }
        )
      })
      .transpose()
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    if self.loaded_files.contains(&path)
    {
      warn!(file = %path.display(), "rc file already loaded; skipping include cycle");
      return Ok(());
    }

    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = raw_line
        .split_once('#')
        .map_or(raw_line, |(before, _)| {
          before
        })
        .trim();
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

/// Typed scheduler settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerOptions {
  pub cell_width:      f64,
  pub row_height:      f64,
  pub days_visible:    u32,
  pub policy:          WindowPolicy,
  pub infinite_scroll: bool,
  pub handle_width:    f64,
  pub timezone:        Tz
}

impl Default for SchedulerOptions {
  fn default() -> Self {
    Self {
      cell_width:      80.0,
      row_height:      50.0,
      days_visible:    21,
      policy:          WindowPolicy::default(),
      infinite_scroll: true,
      handle_width:
        DEFAULT_HANDLE_WIDTH,
      timezone:        chrono_tz::UTC
    }
  }
}

impl SchedulerOptions {
  #[tracing::instrument(skip(cfg))]
  pub fn from_config(
    cfg: &Config
  ) -> anyhow::Result<Self> {
    let defaults = Self::default();

    let timezone = match cfg
      .get("calendar.timezone")
    {
      | Some(raw) => {
        calendar::parse_timezone(&raw)
          .ok_or_else(|| {
            anyhow!(
              "invalid value for \
               calendar.timezone: {raw}"
            )
          })?
      }
      | None => defaults.timezone
    };

    let options = Self {
      cell_width: cfg
        .get_parsed("grid.cell_width")?
        .unwrap_or(defaults.cell_width),
      row_height: cfg
        .get_parsed("grid.row_height")?
        .unwrap_or(defaults.row_height),
      days_visible: cfg
        .get_parsed("window.days")?
        .unwrap_or(defaults.days_visible),
      policy: WindowPolicy {
        chunk_days:          cfg
          .get_parsed(
            "window.chunk_days"
          )?
          .unwrap_or(
            defaults.policy.chunk_days
          ),
        buffer_days:         cfg
          .get_parsed(
            "window.buffer_days"
          )?
          .unwrap_or(
            defaults.policy.buffer_days
          ),
        max_days_resident:   cfg
          .get_parsed(
            "window.max_days_resident"
          )?
          .unwrap_or(
            defaults
              .policy
              .max_days_resident
          ),
        load_threshold_days: cfg
          .get_parsed(
            "window.load_threshold_days"
          )?
          .unwrap_or(
            defaults
              .policy
              .load_threshold_days
          )
      },
      infinite_scroll: cfg
        .get_bool(
          "window.infinite_scroll"
        )?
        .unwrap_or(
          defaults.infinite_scroll
        ),
      handle_width: cfg
        .get_parsed(
          "interaction.handle_width"
        )?
        .unwrap_or(defaults.handle_width),
      timezone
    };

    options.validate().map_err(
      |err| anyhow!("{err}")
    )?;
    debug!(?options, "resolved scheduler options");
    Ok(options)
  }

  pub fn validate(
    &self
  ) -> SchedulerResult<()> {
    if !(self.cell_width > 0.0) {
      return Err(
        SchedulerError::validation(
          "grid.cell_width must be \
           positive"
        )
      );
    }
    if !(self.row_height > 0.0) {
      return Err(
        SchedulerError::validation(
          "grid.row_height must be \
           positive"
        )
      );
    }
    if self.days_visible == 0 {
      return Err(
        SchedulerError::validation(
          "window.days must be at \
           least 1"
        )
      );
    }
    if self.policy.chunk_days == 0 {
      return Err(
        SchedulerError::validation(
          "window.chunk_days must be \
           positive"
        )
      );
    }
    if self.policy.max_days_resident
      < self.days_visible
    {
      return Err(
        SchedulerError::validation(
          format!(
            "window.max_days_resident \
             ({}) must be at least \
             window.days ({})",
            self
              .policy
              .max_days_resident,
            self.days_visible
          )
        )
      );
    }
    if !(self.handle_width >= 0.0) {
      return Err(
        SchedulerError::validation(
          "interaction.handle_width \
           cannot be negative"
        )
      );
    }
    Ok(())
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc lookup"
    );
    return Ok(None);
  };
  let candidate =
    home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}
