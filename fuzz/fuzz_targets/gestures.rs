#![no_main]
use arbitrary::Arbitrary;
use chrono::{NaiveDate, Utc};
use libfuzzer_sys::fuzz_target;
use std::collections::BTreeSet;
use std::time::Duration;
use whenis_libs::{
    config::{Bounds, Configuration},
    grid::{generate, Cell},
    session::{InputKind, SelectionSession},
    store::SelectionStore,
};

#[derive(Arbitrary, Debug)]
enum Step {
    Down(Option<Cell>, InputKind, u8),
    Tick(u8),
    Move(Option<Cell>),
    Up(Option<Cell>),
    Column(u8),
}

fuzz_target!(|steps: Vec<Step>| {
    #[cfg(feature = "log")]
    let _ = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Trace)
        .chain(std::io::stdout())
        .apply();

    let config = Configuration {
        days_range: Bounds::new(0, 4),
        time_range: Bounds::new(8, 12),
        half_hour_intervals: true,
        ..Configuration::default()
    };
    let grid = generate(&config, NaiveDate::from_ymd_opt(2021, 11, 11).unwrap(), &Utc)
        .expect("Fixed configuration is valid");
    let known = grid.slot_ids().collect::<BTreeSet<_>>();

    let mut store = SelectionStore::new();
    let mut session = SelectionSession::new("fuzz".into());
    let mut now = Duration::ZERO;

    for step in steps {
        let update = match step {
            Step::Down(cell, input, elapsed) => {
                now += Duration::from_millis(elapsed.into());
                session.pointer_down(&grid, &store, cell, input, now);
                None
            }
            Step::Tick(elapsed) => {
                now += Duration::from_millis(elapsed.into());
                session.tick(&grid, &store, now);
                None
            }
            Step::Move(cell) => {
                session.pointer_move(&grid, cell);
                None
            }
            Step::Up(cell) => session.pointer_up(&grid, &store, cell),
            Step::Column(column) => session.toggle_column(&grid, &store, column.into()),
        };

        if let Some(update) = update {
            assert!(
                update.slots.is_subset(&known),
                "Selection escaped the grid: {:?}",
                update.slots.difference(&known).collect::<Vec<_>>()
            );
            store.apply_selection(update);
        }

        if let Some(tentative) = session.tentative_selection() {
            assert!(tentative.is_subset(&known), "Preview escaped the grid");
        }
    }

    assert!(
        session.pointer_up(&grid, &store, None).map_or(true, |u| u.slots.is_subset(&known)),
        "Final release escaped the grid"
    );
});
