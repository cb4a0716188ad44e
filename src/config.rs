use log::{debug, warn};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Furthest day offset a configuration may reach, counted from the reference date.
pub const MAX_DAY_OFFSET: u32 = 14;

/// Latest hour a configuration may reach. Hour 24 is midnight of the next day.
pub const MAX_HOUR: u32 = 24;

#[derive(Error, Debug, Eq, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Inverted {field} range: lower bound {lower} is after upper bound {upper}")]
    InvertedRange {
        field: &'static str,
        lower: u32,
        upper: u32,
    },
    #[error("The {field} range may not go past {max}, got {found}")]
    OutOfBounds {
        field: &'static str,
        max: u32,
        found: u32,
    },
    #[error("Meeting duration must span at least one slot")]
    ZeroDuration,
}

/// Inclusive [lower, upper] pair, as produced by the range sliders
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct Bounds {
    pub lower: u32,
    pub upper: u32,
}

impl Bounds {
    /// Construct new Bounds
    ///
    /// # Examples
    /// ```
    /// use whenis_libs::config::Bounds;
    ///
    /// let bounds = Bounds::new(9, 18);
    /// assert_eq!(bounds.span(), 10);
    /// ```
    pub fn new(lower: u32, upper: u32) -> Bounds {
        Bounds { lower, upper }
    }

    /// Number of integers covered, both ends included
    pub fn span(self) -> u32 {
        self.upper.saturating_sub(self.lower).saturating_add(1)
    }

    fn check(self, field: &'static str, max: u32) -> Result<(), ConfigError> {
        if self.lower > self.upper {
            Err(ConfigError::InvertedRange {
                field,
                lower: self.lower,
                upper: self.upper,
            })
        } else if self.upper > max {
            Err(ConfigError::OutOfBounds {
                field,
                max,
                found: self.upper,
            })
        } else {
            Ok(())
        }
    }
}

/// Immutable snapshot of the calendar settings shared by every participant.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct Configuration {
    /// Day offsets from the reference date
    pub days_range: Bounds,
    /// Wall-clock hours of each day, both ends included
    pub time_range: Bounds,
    pub allow_weekends: bool,
    pub half_hour_intervals: bool,
    /// Meeting length, counted in grid slots
    pub duration: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            days_range: Bounds::new(0, 4),
            time_range: Bounds::new(9, 18),
            allow_weekends: false,
            half_hour_intervals: false,
            duration: 1,
        }
    }
}

impl Configuration {
    /// Checks the range invariants and the slider limits.
    ///
    /// # Examples
    /// ```
    /// use whenis_libs::config::{Bounds, ConfigError, Configuration};
    ///
    /// let mut config = Configuration::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.time_range = Bounds::new(18, 9);
    /// assert!(matches!(
    ///     config.validate(),
    ///     Err(ConfigError::InvertedRange { field: "time", .. })
    /// ));
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.days_range.check("days", MAX_DAY_OFFSET)?;
        self.time_range.check("time", MAX_HOUR)?;

        if self.duration == 0 {
            return Err(ConfigError::ZeroDuration);
        }

        Ok(())
    }

    /// Returns a copy of self with `change` applied. The result is not validated.
    pub fn with(mut self, change: ConfigurationChange) -> Configuration {
        match change {
            ConfigurationChange::DaysRange(bounds) => self.days_range = bounds,
            ConfigurationChange::TimeRange(bounds) => self.time_range = bounds,
            ConfigurationChange::AllowWeekends(allow) => self.allow_weekends = allow,
            ConfigurationChange::HalfHourIntervals(half) => self.half_hour_intervals = half,
            ConfigurationChange::Duration(duration) => self.duration = duration,
        }
        self
    }
}

/// A single mutation emitted by the settings UI
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "kind", content = "value", rename_all = "camelCase")
)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum ConfigurationChange {
    DaysRange(Bounds),
    TimeRange(Bounds),
    AllowWeekends(bool),
    HalfHourIntervals(bool),
    Duration(u32),
}

/// Holder of the active configuration. Only valid configurations are ever active.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    active: Configuration,
}

impl Settings {
    pub fn new(initial: Configuration) -> Result<Settings, ConfigError> {
        initial.validate()?;
        Ok(Settings { active: initial })
    }

    pub fn active(&self) -> &Configuration {
        &self.active
    }

    /// Applies a change event. A change that would break an invariant is
    /// rejected and the previous configuration remains active.
    ///
    /// # Examples
    /// ```
    /// use whenis_libs::config::{Bounds, ConfigurationChange, Settings};
    ///
    /// let mut settings = Settings::default();
    ///
    /// assert!(settings
    ///     .apply(ConfigurationChange::DaysRange(Bounds::new(3, 1)))
    ///     .is_err());
    /// assert_eq!(settings.active().days_range, Bounds::new(0, 4));
    ///
    /// settings
    ///     .apply(ConfigurationChange::DaysRange(Bounds::new(1, 3)))
    ///     .unwrap();
    /// assert_eq!(settings.active().days_range, Bounds::new(1, 3));
    /// ```
    pub fn apply(&mut self, change: ConfigurationChange) -> Result<&Configuration, ConfigError> {
        let candidate = self.active.with(change);

        if let Err(e) = candidate.validate() {
            warn!("Rejected configuration change {:?}: {}", change, e);
            return Err(e);
        }

        debug!("Configuration changed: {:?}", change);
        self.active = candidate;
        Ok(&self.active)
    }
}
