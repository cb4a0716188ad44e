//! Browser bindings. The page renders the grid and forwards pointer input;
//! everything it needs back comes out as plain JS objects.

use crate::aggregate::HighlightTargets;
use crate::calendar::Calendar;
use crate::config::ConfigurationChange;
use crate::grid::{Cell, SlotId};
use crate::session::{InputKind, SelectionSession};
use crate::store::{SelectionUpdate, UserId};
use chrono::{FixedOffset, NaiveDate};
use serde::Serialize;
use serde_wasm_bindgen::Serializer;
use std::collections::HashMap;
use std::time::Duration;
use wasm_bindgen::prelude::*;

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&Serializer::new().serialize_maps_as_objects(true))
        .map_err(JsValue::from)
}

fn js_error(e: impl ToString) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn cell(column: Option<u32>, row: Option<u32>) -> Option<Cell> {
    Some(Cell::new(column? as usize, row? as usize))
}

fn timestamp(now_ms: f64) -> Duration {
    if now_ms.is_finite() && now_ms > 0.0 {
        Duration::from_secs_f64(now_ms / 1000.0)
    } else {
        Duration::ZERO
    }
}

/// One participant's view of a shared calendar
#[wasm_bindgen]
pub struct Planner {
    calendar: Calendar<FixedOffset>,
    session: SelectionSession,
    targets: HighlightTargets,
}

#[wasm_bindgen]
impl Planner {
    /// `reference` is a `YYYY-MM-DD` date, `utc_offset_minutes` the local
    /// offset east of UTC.
    #[wasm_bindgen(constructor)]
    pub fn new(reference: &str, utc_offset_minutes: i32, user: String) -> Result<Planner, JsValue> {
        let reference: NaiveDate = reference.parse().map_err(js_error)?;
        let tz = FixedOffset::east_opt(utc_offset_minutes * 60)
            .ok_or_else(|| js_error(format!("Invalid UTC offset: {}", utc_offset_minutes)))?;
        let user = UserId::from(user);

        Ok(Planner {
            calendar: Calendar::new(reference, tz),
            session: SelectionSession::new(user.clone()),
            targets: HighlightTargets::for_viewer(user),
        })
    }

    pub fn grid(&self) -> Result<JsValue, JsValue> {
        to_js(self.calendar.grid())
    }

    pub fn configuration(&self) -> Result<JsValue, JsValue> {
        to_js(self.calendar.configuration())
    }

    #[wasm_bindgen(js_name = applyChange)]
    pub fn apply_change(&mut self, change: JsValue) -> Result<JsValue, JsValue> {
        let change: ConfigurationChange = serde_wasm_bindgen::from_value(change)?;
        let grid = self.calendar.apply_change(change).map_err(js_error)?;
        to_js(grid)
    }

    #[wasm_bindgen(js_name = setReference)]
    pub fn set_reference(&mut self, reference: &str) -> Result<(), JsValue> {
        let reference: NaiveDate = reference.parse().map_err(js_error)?;
        self.calendar.set_reference(reference);
        Ok(())
    }

    pub fn join(&mut self, user: String) {
        self.calendar.join(user.into());
    }

    /// Applies a broadcast `{ user, slots }` selection. Returns whether it changed anything.
    #[wasm_bindgen(js_name = applySelection)]
    pub fn apply_selection(&mut self, update: JsValue) -> Result<bool, JsValue> {
        let update: SelectionUpdate = serde_wasm_bindgen::from_value(update)?;
        Ok(self.calendar.apply_selection(update))
    }

    #[wasm_bindgen(js_name = pointerDown)]
    pub fn pointer_down(
        &mut self,
        column: Option<u32>,
        row: Option<u32>,
        touch: bool,
        now_ms: f64,
    ) -> Result<JsValue, JsValue> {
        let input = if touch {
            InputKind::Touch
        } else {
            InputKind::Mouse
        };
        let preview = self.session.pointer_down(
            self.calendar.grid(),
            self.calendar.store(),
            cell(column, row),
            input,
            timestamp(now_ms),
        );
        to_js(&preview)
    }

    pub fn tick(&mut self, now_ms: f64) -> Result<JsValue, JsValue> {
        let preview = self
            .session
            .tick(self.calendar.grid(), self.calendar.store(), timestamp(now_ms));
        to_js(&preview)
    }

    #[wasm_bindgen(js_name = pointerMove)]
    pub fn pointer_move(
        &mut self,
        column: Option<u32>,
        row: Option<u32>,
    ) -> Result<JsValue, JsValue> {
        let preview = self
            .session
            .pointer_move(self.calendar.grid(), cell(column, row));
        to_js(&preview)
    }

    /// Finalizes the gesture. Returns the `{ user, slots }` event to broadcast, if any.
    #[wasm_bindgen(js_name = pointerUp)]
    pub fn pointer_up(
        &mut self,
        column: Option<u32>,
        row: Option<u32>,
    ) -> Result<JsValue, JsValue> {
        let update = self.session.pointer_up(
            self.calendar.grid(),
            self.calendar.store(),
            cell(column, row),
        );
        to_js(&update)
    }

    #[wasm_bindgen(js_name = toggleColumn)]
    pub fn toggle_column(&self, column: u32) -> Result<JsValue, JsValue> {
        let update = self.session.toggle_column(
            self.calendar.grid(),
            self.calendar.store(),
            column as usize,
        );
        to_js(&update)
    }

    #[wasm_bindgen(js_name = tentativeSelection)]
    pub fn tentative_selection(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session.tentative_selection())
    }

    #[wasm_bindgen(js_name = countedSlots)]
    pub fn counted_slots(&self) -> Result<JsValue, JsValue> {
        to_js(&self.calendar.aggregator().counted_slots())
    }

    /// Tooltip text for a slot; `names` maps user ids to display names
    pub fn voters(&self, slot: &str, names: JsValue) -> Result<String, JsValue> {
        let slot: SlotId = slot.parse().map_err(js_error)?;
        let names: HashMap<UserId, String> = serde_wasm_bindgen::from_value(names)?;
        Ok(self.calendar.aggregator().voters(&slot, &names))
    }

    /// Focuses or unfocuses a participant, then returns what to highlight
    #[wasm_bindgen(js_name = toggleTarget)]
    pub fn toggle_target(&mut self, user: String) -> Result<JsValue, JsValue> {
        self.targets.toggle(user.into());
        self.highlight()
    }

    pub fn highlight(&self) -> Result<JsValue, JsValue> {
        to_js(&self.calendar.aggregator().highlight(self.targets.users()))
    }

    #[wasm_bindgen(js_name = bestCandidates)]
    pub fn best_candidates(&self) -> Result<JsValue, JsValue> {
        to_js(&self.calendar.best_candidates())
    }
}
