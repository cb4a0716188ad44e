pub mod aggregate;
pub mod calendar;
pub mod config;
pub mod grid;
pub mod session;
pub mod store;
#[cfg(feature = "wasm")]
pub mod wasm;

pub use aggregate::{Aggregator, Tally};
pub use calendar::Calendar;
pub use config::{Bounds, ConfigError, Configuration, ConfigurationChange};
pub use grid::{generate, Cell, SlotGrid, SlotId};
pub use session::{InputKind, SelectionSession};
pub use store::{SelectionStore, SelectionUpdate, UserId};
