use crate::config::{Bounds, ConfigError, Configuration, Settings};
use chrono::{
    DateTime, Datelike, Days, Duration, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Timelike,
    Utc, Weekday,
};
use itertools::Itertools;
use log::{trace, warn};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Absolute instant identifying a slot, with minute precision.
///
/// The identifier only depends on the instant, so the same wall-clock moment
/// gets the same id under any configuration that covers it.
///
/// # Examples
/// ```
/// use whenis_libs::grid::SlotId;
///
/// let slot: SlotId = "2021-11-11T12:00:00.000Z".parse().unwrap();
/// assert_eq!(slot.to_string(), "2021-11-11T12:00:00.000Z");
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct SlotId(DateTime<Utc>);

impl SlotId {
    pub fn new(instant: DateTime<Utc>) -> SlotId {
        let truncated = instant
            .with_nanosecond(0)
            .and_then(|t| t.with_second(0))
            .unwrap_or(instant);
        SlotId(truncated)
    }

    pub fn instant(self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl FromStr for SlotId {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateTime::parse_from_rfc3339(s).map(|t| SlotId::new(t.with_timezone(&Utc)))
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "camelCase"))]
pub enum SlotKind {
    Hour,
    HalfHour,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Slot {
    pub id: SlotId,
    pub kind: SlotKind,
    /// Wall-clock hour on the slot's day, 24 meaning midnight of the next day
    pub hour: u32,
    pub minute: u32,
}

impl Slot {
    /// Human readable wall-clock time, `9` or `9:30`
    pub fn label(&self) -> String {
        match self.kind {
            SlotKind::Hour => self.hour.to_string(),
            SlotKind::HalfHour => format!("{}:{:02}", self.hour, self.minute),
        }
    }
}

/// Layout grouping of a day's slots. A half-hour slot is paired with its hour.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SlotRow<'a> {
    Hour(&'a Slot),
    HalfHourGroup(&'a Slot, &'a Slot),
    /// Half-hour slot whose hour is not on this day
    Orphan(&'a Slot),
}

#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Day {
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
}

impl Day {
    pub fn rows(&self) -> Vec<SlotRow<'_>> {
        let mut rows = Vec::with_capacity(self.slots.len());
        let mut slots = self.slots.iter().peekable();

        while let Some(slot) = slots.next() {
            match slot.kind {
                SlotKind::Hour => match slots.peek() {
                    Some(&next) if next.kind == SlotKind::HalfHour && next.hour == slot.hour => {
                        rows.push(SlotRow::HalfHourGroup(slot, next));
                        slots.next();
                    }
                    _ => rows.push(SlotRow::Hour(slot)),
                },
                SlotKind::HalfHour => rows.push(SlotRow::Orphan(slot)),
            }
        }

        rows
    }

    pub fn slot_ids(&self) -> BTreeSet<SlotId> {
        self.slots.iter().map(|slot| slot.id).collect()
    }
}

/// Position of a rendered slot: `column` is the day index, `row` the slot index in that day
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct Cell {
    pub column: usize,
    pub row: usize,
}

impl Cell {
    pub fn new(column: usize, row: usize) -> Cell {
        Cell { column, row }
    }
}

/// Visible grid of slots for one configuration
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SlotGrid {
    days: Vec<Day>,
    #[cfg_attr(feature = "serde", serde(skip))]
    index: HashMap<SlotId, Cell>,
}

impl PartialEq for SlotGrid {
    fn eq(&self, other: &Self) -> bool {
        self.days == other.days
    }
}

impl Eq for SlotGrid {}

impl SlotGrid {
    pub fn new(days: Vec<Day>) -> SlotGrid {
        let index = days
            .iter()
            .enumerate()
            .flat_map(|(column, day)| {
                day.slots
                    .iter()
                    .enumerate()
                    .map(move |(row, slot)| (slot.id, Cell::new(column, row)))
            })
            .collect();

        SlotGrid { days, index }
    }

    pub fn days(&self) -> &[Day] {
        &self.days
    }

    pub fn column(&self, column: usize) -> Option<&Day> {
        self.days.get(column)
    }

    pub fn slot_at(&self, cell: Cell) -> Option<&Slot> {
        self.days
            .get(cell.column)
            .and_then(|day| day.slots.get(cell.row))
    }

    pub fn cell_of(&self, slot: &SlotId) -> Option<Cell> {
        self.index.get(slot).copied()
    }

    pub fn contains(&self, slot: &SlotId) -> bool {
        self.index.contains_key(slot)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Pulls a cell reported past the edges of the grid back onto it
    pub fn clamp(&self, cell: Cell) -> Option<Cell> {
        let last_column = self.days.len().checked_sub(1)?;
        let last_row = self
            .days
            .iter()
            .map(|day| day.slots.len())
            .max()?
            .checked_sub(1)?;

        Some(Cell::new(cell.column.min(last_column), cell.row.min(last_row)))
    }

    pub fn slot_ids(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.days
            .iter()
            .flat_map(|day| day.slots.iter().map(|slot| slot.id))
    }

    /// Slots inside the box spanned by two cells, both corners included.
    /// Cells of the box that hold no slot are skipped.
    ///
    /// # Examples
    /// ```
    /// use chrono::{NaiveDate, Utc};
    /// use whenis_libs::config::{Bounds, Configuration};
    /// use whenis_libs::grid::{generate, Cell};
    ///
    /// let config = Configuration {
    ///     days_range: Bounds::new(0, 2),
    ///     time_range: Bounds::new(9, 12),
    ///     ..Configuration::default()
    /// };
    /// let monday = NaiveDate::from_ymd_opt(2021, 11, 8).unwrap();
    /// let grid = generate(&config, monday, &Utc).unwrap();
    ///
    /// assert_eq!(grid.region(Cell::new(0, 1), Cell::new(1, 2)).len(), 4);
    /// assert_eq!(grid.region(Cell::new(2, 3), Cell::new(2, 3)).len(), 1);
    /// ```
    pub fn region(&self, a: Cell, b: Cell) -> BTreeSet<SlotId> {
        let (first_column, last_column) = (a.column.min(b.column), a.column.max(b.column));
        let (first_row, last_row) = (a.row.min(b.row), a.row.max(b.row));

        (first_column..=last_column)
            .cartesian_product(first_row..=last_row)
            .filter_map(|(column, row)| self.slot_at(Cell::new(column, row)))
            .map(|slot| slot.id)
            .collect()
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Calendar days starting at `first`, skipping weekends unless allowed. Skipped
/// days do not count toward `count`.
fn included_days(first: NaiveDate, count: usize, allow_weekends: bool) -> Vec<NaiveDate> {
    std::iter::successors(Some(first), |date| date.succ_opt())
        .filter(|&date| allow_weekends || !is_weekend(date))
        .take(count)
        .collect()
}

fn day_slots<Tz: TimeZone>(date: NaiveDate, hours: Bounds, half_hours: bool, tz: &Tz) -> Vec<Slot> {
    let midnight = date.and_time(NaiveTime::MIN);
    let minutes: &[u32] = if half_hours { &[0, 30] } else { &[0] };

    (hours.lower..=hours.upper)
        .cartesian_product(minutes.iter().copied())
        .filter_map(|(hour, minute)| {
            let wall = midnight + Duration::hours(hour.into()) + Duration::minutes(minute.into());

            match tz.from_local_datetime(&wall).earliest() {
                Some(instant) => Some(Slot {
                    id: SlotId::new(instant.with_timezone(&Utc)),
                    kind: if minute == 0 {
                        SlotKind::Hour
                    } else {
                        SlotKind::HalfHour
                    },
                    hour,
                    minute,
                }),
                None => {
                    trace!("Skipping non-existent local time {}", wall);
                    None
                }
            }
        })
        .collect()
}

/// Generates the visible grid for `config`, with day offsets counted from
/// `reference` and wall-clock times resolved in `tz`. Configurations that
/// break a range invariant or a slider limit are rejected.
///
/// # Examples
/// ```
/// use chrono::{NaiveDate, Utc};
/// use whenis_libs::config::{Bounds, ConfigError, Configuration};
/// use whenis_libs::grid::generate;
///
/// let config = Configuration {
///     days_range: Bounds::new(0, 1),
///     time_range: Bounds::new(9, 10),
///     ..Configuration::default()
/// };
/// let thursday = NaiveDate::from_ymd_opt(2021, 11, 11).unwrap();
///
/// let grid = generate(&config, thursday, &Utc).unwrap();
///
/// assert_eq!(grid.days().len(), 2);
/// assert_eq!(grid.len(), 4);
/// assert_eq!(
///     grid.slot_ids().map(|id| id.to_string()).collect::<Vec<_>>(),
///     vec![
///         "2021-11-11T09:00:00.000Z",
///         "2021-11-11T10:00:00.000Z",
///         "2021-11-12T09:00:00.000Z",
///         "2021-11-12T10:00:00.000Z",
///     ]
/// );
///
/// let inverted = Configuration {
///     days_range: Bounds::new(3, 1),
///     ..config
/// };
/// assert!(matches!(
///     generate(&inverted, thursday, &Utc),
///     Err(ConfigError::InvertedRange { field: "days", .. })
/// ));
/// ```
pub fn generate<Tz: TimeZone>(
    config: &Configuration,
    reference: NaiveDate,
    tz: &Tz,
) -> Result<SlotGrid, ConfigError> {
    config.validate()?;
    Ok(layout(config, reference, tz))
}

impl SlotGrid {
    /// Grid of the active configuration. Settings only ever hold valid
    /// configurations, so this cannot fail.
    pub fn for_settings<Tz: TimeZone>(
        settings: &Settings,
        reference: NaiveDate,
        tz: &Tz,
    ) -> SlotGrid {
        layout(settings.active(), reference, tz)
    }
}

fn layout<Tz: TimeZone>(config: &Configuration, reference: NaiveDate, tz: &Tz) -> SlotGrid {
    let first = match reference.checked_add_days(Days::new(config.days_range.lower.into())) {
        Some(first) => first,
        None => {
            warn!("No calendar days after {}", reference);
            return SlotGrid::default();
        }
    };
    // Hour 24 of one day is hour 0 of the next; the earlier day keeps it
    let mut seen = HashSet::new();

    let days = included_days(
        first,
        config.days_range.span() as usize,
        config.allow_weekends,
    )
    .into_iter()
    .map(|date| Day {
        date,
        slots: day_slots(date, config.time_range, config.half_hour_intervals, tz)
            .into_iter()
            .filter(|slot| seen.insert(slot.id))
            .collect(),
    })
    .collect_vec();

    trace!(
        "Generated {} days starting {} for {:?}",
        days.len(),
        first,
        config
    );

    SlotGrid::new(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use chrono_tz::America::New_York;
    use chrono_tz::Australia::Lord_Howe;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config(days: (u32, u32), hours: (u32, u32)) -> Configuration {
        Configuration {
            days_range: Bounds::new(days.0, days.1),
            time_range: Bounds::new(hours.0, hours.1),
            ..Configuration::default()
        }
    }

    #[test]
    fn skips_weekends_and_keeps_day_count() {
        // Thursday 2021-11-11
        let grid = generate(&config((0, 4), (9, 9)), date(2021, 11, 11), &Utc).unwrap();

        let dates = grid.days().iter().map(|d| d.date).collect_vec();
        assert_eq!(
            dates,
            vec![
                date(2021, 11, 11),
                date(2021, 11, 12),
                date(2021, 11, 15),
                date(2021, 11, 16),
                date(2021, 11, 17),
            ]
        );
        assert!(dates.iter().all(|&d| !is_weekend(d)));
    }

    #[test]
    fn never_ends_on_a_weekend() {
        // Friday 2021-11-12, two days requested
        let grid = generate(&config((0, 1), (9, 9)), date(2021, 11, 12), &Utc).unwrap();

        let dates = grid.days().iter().map(|d| d.date).collect_vec();
        assert_eq!(dates, vec![date(2021, 11, 12), date(2021, 11, 15)]);
    }

    #[test]
    fn includes_weekends_when_allowed() {
        let mut config = config((0, 3), (9, 9));
        config.allow_weekends = true;

        let grid = generate(&config, date(2021, 11, 11), &Utc).unwrap();

        let dates = grid.days().iter().map(|d| d.date).collect_vec();
        assert_eq!(
            dates,
            vec![
                date(2021, 11, 11),
                date(2021, 11, 12),
                date(2021, 11, 13),
                date(2021, 11, 14),
            ]
        );
    }

    #[test]
    fn day_offset_counts_calendar_days() {
        let grid = generate(&config((2, 2), (9, 9)), date(2021, 11, 11), &Utc).unwrap();

        // Thursday + 2 is Saturday, so the first weekday is Monday
        assert_eq!(grid.days()[0].date, date(2021, 11, 15));
    }

    #[test]
    fn time_range_is_inclusive() {
        let grid = generate(&config((0, 0), (9, 9)), date(2021, 11, 11), &Utc).unwrap();
        assert_eq!(grid.len(), 1);

        let grid = generate(&config((0, 0), (0, 24)), date(2021, 11, 11), &Utc).unwrap();
        assert_eq!(grid.len(), 25);
        assert_eq!(
            grid.column(0).unwrap().slots.last().unwrap().id.to_string(),
            "2021-11-12T00:00:00.000Z"
        );
    }

    #[test]
    fn half_hours_pair_with_their_hour() {
        let mut config = config((0, 0), (9, 10));
        config.half_hour_intervals = true;

        let grid = generate(&config, date(2021, 11, 11), &Utc).unwrap();
        let day = grid.column(0).unwrap();

        assert_eq!(
            day.slots.iter().map(|s| s.id.to_string()).collect_vec(),
            vec![
                "2021-11-11T09:00:00.000Z",
                "2021-11-11T09:30:00.000Z",
                "2021-11-11T10:00:00.000Z",
                "2021-11-11T10:30:00.000Z",
            ]
        );

        let rows = day.rows();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| {
            matches!(row, SlotRow::HalfHourGroup(hour, half) if hour.hour == half.hour)
        }));
        assert_eq!(day.slots[1].label(), "9:30");
    }

    #[test]
    fn slot_ids_are_absolute_instants() {
        let buenos_aires = FixedOffset::west_opt(3 * 3600).unwrap();
        let grid =
            generate(&config((0, 0), (9, 9)), date(2021, 11, 11), &buenos_aires).unwrap();

        assert_eq!(
            grid.slot_ids().next().unwrap().to_string(),
            "2021-11-11T12:00:00.000Z"
        );
    }

    #[test]
    fn overlapping_configurations_share_ids() {
        let thursday = date(2021, 11, 11);
        let narrow = generate(&config((0, 0), (10, 11)), thursday, &Utc).unwrap();
        let wide = generate(&config((0, 3), (8, 14)), thursday, &Utc).unwrap();

        assert!(narrow.slot_ids().all(|id| wide.contains(&id)));
    }

    #[test]
    fn looks_up_cells() {
        let grid = generate(&config((0, 1), (9, 10)), date(2021, 11, 11), &Utc).unwrap();
        let id: SlotId = "2021-11-12T10:00:00.000Z".parse().unwrap();

        assert_eq!(grid.cell_of(&id), Some(Cell::new(1, 1)));
        assert_eq!(grid.slot_at(Cell::new(1, 1)).map(|s| s.id), Some(id));
        assert_eq!(grid.slot_at(Cell::new(2, 0)), None);
        assert_eq!(grid.slot_at(Cell::new(0, 2)), None);
    }

    #[test]
    fn midnight_belongs_to_the_earlier_day() {
        let mut config = config((0, 1), (0, 24));
        config.allow_weekends = true;

        let grid = generate(&config, date(2021, 11, 11), &Utc).unwrap();

        assert_eq!(grid.column(0).unwrap().slots.len(), 25);
        assert_eq!(grid.column(1).unwrap().slots.len(), 24);
        assert_eq!(grid.column(1).unwrap().slots[0].hour, 1);
        assert_eq!(grid.len(), 49);
    }

    #[test]
    fn slot_id_drops_seconds() {
        let id: SlotId = "2021-11-11T12:00:42.123Z".parse().unwrap();
        assert_eq!(id.to_string(), "2021-11-11T12:00:00.000Z");
    }

    #[test]
    fn rejects_invalid_configurations() {
        let thursday = date(2021, 11, 11);

        assert_eq!(
            generate(&config((3, 1), (9, 10)), thursday, &Utc),
            Err(ConfigError::InvertedRange {
                field: "days",
                lower: 3,
                upper: 1
            })
        );
        assert_eq!(
            generate(&config((0, u32::MAX), (9, 10)), thursday, &Utc),
            Err(ConfigError::OutOfBounds {
                field: "days",
                max: crate::config::MAX_DAY_OFFSET,
                found: u32::MAX
            })
        );
        assert!(generate(&config((0, 0), (u32::MAX, u32::MAX)), thursday, &Utc).is_err());
    }

    #[test]
    fn skips_wall_times_lost_to_dst() {
        let mut config = config((0, 0), (1, 3));
        config.allow_weekends = true;
        config.half_hour_intervals = true;

        // New York springs forward from 02:00 to 03:00
        let grid = generate(&config, date(2021, 3, 14), &New_York).unwrap();
        let day = grid.column(0).unwrap();

        assert_eq!(
            day.slots.iter().map(|s| s.id.to_string()).collect_vec(),
            vec![
                "2021-03-14T06:00:00.000Z",
                "2021-03-14T06:30:00.000Z",
                "2021-03-14T07:00:00.000Z",
                "2021-03-14T07:30:00.000Z",
            ]
        );
        assert!(day.slots.iter().all(|s| s.hour != 2));

        let rows = day.rows();
        assert_eq!(rows.len(), 2);
        assert!(matches!(rows[0], SlotRow::HalfHourGroup(hour, _) if hour.hour == 1));
        assert!(matches!(rows[1], SlotRow::HalfHourGroup(hour, _) if hour.hour == 3));
    }

    #[test]
    fn half_hour_survives_a_lost_hour() {
        let mut config = config((0, 0), (2, 2));
        config.allow_weekends = true;
        config.half_hour_intervals = true;

        // Lord Howe Island springs forward half an hour, from 02:00 to 02:30
        let grid = generate(&config, date(2021, 10, 3), &Lord_Howe).unwrap();
        let day = grid.column(0).unwrap();

        assert_eq!(day.slots.len(), 1);
        assert_eq!(day.slots[0].id.to_string(), "2021-10-02T15:30:00.000Z");
        assert!(matches!(day.rows()[..], [SlotRow::Orphan(slot)] if slot.label() == "2:30"));
    }

    #[test]
    fn ambiguous_wall_times_take_the_earliest_instant() {
        let mut config = config((0, 0), (1, 2));
        config.allow_weekends = true;

        // New York falls back from 02:00 to 01:00, so 01:00 happens twice
        let grid = generate(&config, date(2021, 11, 7), &New_York).unwrap();

        assert_eq!(
            grid.slot_ids().map(|id| id.to_string()).collect_vec(),
            vec!["2021-11-07T05:00:00.000Z", "2021-11-07T07:00:00.000Z"]
        );
    }

    #[test]
    fn late_half_hour_belongs_to_the_earlier_day() {
        let mut config = config((0, 1), (0, 24));
        config.allow_weekends = true;
        config.half_hour_intervals = true;

        let grid = generate(&config, date(2021, 11, 11), &Utc).unwrap();
        let thursday = grid.column(0).unwrap();
        let friday = grid.column(1).unwrap();

        assert_eq!(thursday.slots.len(), 50);
        let last = thursday.slots.last().unwrap();
        assert_eq!(last.label(), "24:30");
        assert_eq!(last.id.to_string(), "2021-11-12T00:30:00.000Z");
        assert!(matches!(
            thursday.rows().last(),
            Some(SlotRow::HalfHourGroup(hour, half)) if hour.hour == 24 && half.hour == 24
        ));

        assert_eq!(friday.slots.len(), 48);
        assert_eq!(friday.slots[0].label(), "1");
        assert!(matches!(friday.rows()[0], SlotRow::HalfHourGroup(hour, _) if hour.hour == 1));
        assert_eq!(grid.len(), 98);
    }
}
