use crate::aggregate::{Aggregator, Candidate};
use crate::config::{ConfigError, Configuration, ConfigurationChange, Settings};
use crate::grid::SlotGrid;
use crate::store::{SelectionStore, SelectionUpdate, UserId};
use chrono::{NaiveDate, TimeZone};
use log::info;

/// Shared model every participant replicates: the settings, the grid they
/// produce and everyone's selections.
///
/// Events must be applied in the same order on every replica.
///
/// # Examples
/// ```
/// use chrono::{NaiveDate, Utc};
/// use whenis_libs::calendar::Calendar;
/// use whenis_libs::config::{Bounds, ConfigurationChange};
///
/// let thursday = NaiveDate::from_ymd_opt(2021, 11, 11).unwrap();
/// let mut calendar = Calendar::new(thursday, Utc);
/// assert_eq!(calendar.grid().days().len(), 5);
///
/// calendar
///     .apply_change(ConfigurationChange::TimeRange(Bounds::new(9, 10)))
///     .unwrap();
/// assert_eq!(calendar.grid().len(), 10);
///
/// // rejected changes leave the grid alone
/// assert!(calendar
///     .apply_change(ConfigurationChange::TimeRange(Bounds::new(10, 9)))
///     .is_err());
/// assert_eq!(calendar.grid().len(), 10);
/// ```
#[derive(Debug)]
pub struct Calendar<Tz: TimeZone> {
    settings: Settings,
    reference: NaiveDate,
    tz: Tz,
    grid: SlotGrid,
    store: SelectionStore,
}

impl<Tz: TimeZone> Calendar<Tz> {
    pub fn new(reference: NaiveDate, tz: Tz) -> Calendar<Tz> {
        let settings = Settings::default();
        let grid = SlotGrid::for_settings(&settings, reference, &tz);

        Calendar {
            settings,
            reference,
            tz,
            grid,
            store: SelectionStore::new(),
        }
    }

    pub fn with_configuration(
        configuration: Configuration,
        reference: NaiveDate,
        tz: Tz,
    ) -> Result<Calendar<Tz>, ConfigError> {
        let settings = Settings::new(configuration)?;
        let grid = SlotGrid::for_settings(&settings, reference, &tz);

        Ok(Calendar {
            settings,
            reference,
            tz,
            grid,
            store: SelectionStore::new(),
        })
    }

    pub fn configuration(&self) -> &Configuration {
        self.settings.active()
    }

    pub fn reference(&self) -> NaiveDate {
        self.reference
    }

    pub fn grid(&self) -> &SlotGrid {
        &self.grid
    }

    pub fn store(&self) -> &SelectionStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SelectionStore {
        &mut self.store
    }

    pub fn aggregator(&self) -> Aggregator<'_> {
        Aggregator::new(&self.store)
    }

    /// Applies a settings change and regenerates the grid. Invalid changes are
    /// rejected and keep the current configuration and grid.
    pub fn apply_change(&mut self, change: ConfigurationChange) -> Result<&SlotGrid, ConfigError> {
        self.settings.apply(change)?;
        self.regenerate();
        Ok(&self.grid)
    }

    /// Moves the day the grid counts from, e.g. when the date rolls over
    pub fn set_reference(&mut self, reference: NaiveDate) {
        if self.reference != reference {
            self.reference = reference;
            self.regenerate();
        }
    }

    pub fn join(&mut self, user: UserId) {
        info!("{} joined", user);
        self.store.register(user);
    }

    pub fn apply_selection(&mut self, update: SelectionUpdate) -> bool {
        self.store.apply_selection(update)
    }

    /// Best meeting windows for the configured duration
    pub fn best_candidates(&self) -> Vec<Candidate> {
        self.aggregator()
            .best_candidates(&self.grid, self.configuration().duration as usize)
    }

    fn regenerate(&mut self) {
        self.grid = SlotGrid::for_settings(&self.settings, self.reference, &self.tz);
        info!(
            "Grid regenerated with {} days and {} slots",
            self.grid.days().len(),
            self.grid.len()
        );
    }
}
