#![no_main]
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use libfuzzer_sys::fuzz_target;
use std::collections::HashSet;
use whenis_libs::{config::Configuration, grid::generate};

fuzz_target!(|data: (Configuration, u16)| {
    let (config, offset) = data;
    let reference = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Duration::days(offset.into());

    let grid = match generate(&config, reference, &Utc) {
        Ok(grid) => grid,
        Err(_) => {
            assert!(config.validate().is_err(), "Valid configuration rejected");
            return;
        }
    };

    assert_eq!(
        grid.days().len(),
        config.days_range.span() as usize,
        "Every requested day should be emitted"
    );

    if !config.allow_weekends {
        assert!(
            grid.days()
                .iter()
                .all(|day| !matches!(day.date.weekday(), Weekday::Sat | Weekday::Sun)),
            "Weekend day generated while weekends are excluded"
        );
    }

    let per_hour = if config.half_hour_intervals { 2 } else { 1 };
    let mut unique = HashSet::with_capacity(grid.len());
    for day in grid.days() {
        assert!(day.slots.len() <= config.time_range.span() as usize * per_hour);
        assert!(
            day.slots.windows(2).all(|w| w[0].id < w[1].id),
            "Slots of a day should be strictly increasing"
        );
        for slot in &day.slots {
            assert!(unique.insert(slot.id), "Duplicate slot id {}", slot.id);
        }
    }
});
