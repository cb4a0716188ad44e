//! Gesture state machine turning pointer and touch input into selections.
//!
//! A session belongs to one participant on one client. It never mutates the
//! [`SelectionStore`] itself: finalized gestures produce a [`SelectionUpdate`]
//! carrying the participant's full selection, to be broadcast and applied by
//! the replication layer.

use crate::grid::{Cell, SlotGrid, SlotId};
use crate::store::{SelectionStore, SelectionUpdate, UserId};
use log::{debug, trace};
use std::collections::BTreeSet;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How long a single touch must stay alone before it starts a selection.
/// A second touch inside this window means the user is scrolling.
pub const SINGLE_TOUCH_DEBOUNCE: Duration = Duration::from_millis(50);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "camelCase"))]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum InputKind {
    Mouse,
    Touch,
}

/// Pending single-touch timer. It lives inside [`SessionState::PendingSingleTouch`]
/// and is dropped with it, so a consumed or canceled timer never outlives its state.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Debounce {
    deadline: Duration,
}

impl Debounce {
    fn start(now: Duration) -> Debounce {
        Debounce {
            deadline: now + SINGLE_TOUCH_DEBOUNCE,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    fn elapsed(&self, now: Duration) -> bool {
        now >= self.deadline
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Drag {
    anchor: Cell,
    pointer: Cell,
    /// Selection of the participant when the gesture started
    snapshot: BTreeSet<SlotId>,
    covered: BTreeSet<SlotId>,
}

impl Drag {
    pub fn anchor(&self) -> Cell {
        self.anchor
    }

    pub fn pointer(&self) -> Cell {
        self.pointer
    }

    pub fn covered(&self) -> &BTreeSet<SlotId> {
        &self.covered
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionState {
    Idle,
    PendingSingleTouch { anchor: Cell, debounce: Debounce },
    Dragging(Drag),
}

/// Slots whose visual state flipped since the previous pointer position
#[derive(Debug, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DragPreview {
    /// Slots that entered the covered region
    pub entered: BTreeSet<SlotId>,
    /// Slots that left the covered region
    pub left: BTreeSet<SlotId>,
}

impl DragPreview {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.left.is_empty()
    }
}

/// Outcome of one gesture against the selection it started from
#[derive(Debug, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GestureDelta {
    pub added: BTreeSet<SlotId>,
    pub removed: BTreeSet<SlotId>,
}

impl GestureDelta {
    /// Every covered slot flips: unselected ones are added, selected ones removed.
    ///
    /// # Examples
    /// ```
    /// use std::collections::BTreeSet;
    /// use whenis_libs::grid::SlotId;
    /// use whenis_libs::session::GestureDelta;
    ///
    /// let a: SlotId = "2021-11-11T09:00:00.000Z".parse().unwrap();
    /// let b: SlotId = "2021-11-11T10:00:00.000Z".parse().unwrap();
    /// let c: SlotId = "2021-11-11T11:00:00.000Z".parse().unwrap();
    ///
    /// let before = BTreeSet::from([a, b]);
    /// let covered = BTreeSet::from([b, c]);
    /// let delta = GestureDelta::between(&before, &covered);
    ///
    /// assert_eq!(delta.added, BTreeSet::from([c]));
    /// assert_eq!(delta.removed, BTreeSet::from([b]));
    /// assert_eq!(delta.resolve(&before, &covered), BTreeSet::from([a, c]));
    /// ```
    pub fn between(snapshot: &BTreeSet<SlotId>, covered: &BTreeSet<SlotId>) -> GestureDelta {
        GestureDelta {
            added: covered.difference(snapshot).copied().collect(),
            removed: covered.intersection(snapshot).copied().collect(),
        }
    }

    /// Final selection: `(previous ∪ added ∪ covered) − removed`
    pub fn resolve(
        &self,
        previous: &BTreeSet<SlotId>,
        covered: &BTreeSet<SlotId>,
    ) -> BTreeSet<SlotId> {
        previous
            .iter()
            .chain(self.added.iter())
            .chain(covered.iter())
            .filter(|slot| !self.removed.contains(slot))
            .copied()
            .collect()
    }
}

/// One participant's gesture interpreter
#[derive(Debug, Clone)]
pub struct SelectionSession {
    user: UserId,
    state: SessionState,
}

impl SelectionSession {
    pub fn new(user: UserId) -> SelectionSession {
        SelectionSession {
            user,
            state: SessionState::Idle,
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Idle
    }

    /// Selection the renderer should show while a drag is in flight
    pub fn tentative_selection(&self) -> Option<BTreeSet<SlotId>> {
        match &self.state {
            SessionState::Dragging(drag) => Some(
                drag.snapshot
                    .symmetric_difference(&drag.covered)
                    .copied()
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Pointer pressed on `target`. `None` means the press landed outside the grid.
    ///
    /// Mouse input starts dragging right away. Touch input waits for
    /// [`SINGLE_TOUCH_DEBOUNCE`]; another touch before then cancels it.
    pub fn pointer_down(
        &mut self,
        grid: &SlotGrid,
        store: &SelectionStore,
        target: Option<Cell>,
        input: InputKind,
        now: Duration,
    ) -> Option<DragPreview> {
        match self.state {
            SessionState::Idle => {
                let anchor = target.filter(|&cell| grid.slot_at(cell).is_some())?;

                match input {
                    InputKind::Mouse => self.begin(grid, store, anchor),
                    InputKind::Touch => {
                        trace!("Waiting for a second touch at {:?}", anchor);
                        self.state = SessionState::PendingSingleTouch {
                            anchor,
                            debounce: Debounce::start(now),
                        };
                        None
                    }
                }
            }
            SessionState::PendingSingleTouch { .. } => {
                trace!("Second touch, canceling pending selection");
                self.state = SessionState::Idle;
                None
            }
            SessionState::Dragging(_) => None,
        }
    }

    /// Advances the single-touch timer. Starts dragging once it has elapsed.
    pub fn tick(
        &mut self,
        grid: &SlotGrid,
        store: &SelectionStore,
        now: Duration,
    ) -> Option<DragPreview> {
        match self.state {
            SessionState::PendingSingleTouch { anchor, debounce } if debounce.elapsed(now) => {
                self.begin(grid, store, anchor)
            }
            _ => None,
        }
    }

    /// Pointer moved to `target`. Reports outside the grid keep the last
    /// valid position; positions past its edges are clamped onto it.
    pub fn pointer_move(&mut self, grid: &SlotGrid, target: Option<Cell>) -> Option<DragPreview> {
        match &mut self.state {
            SessionState::Dragging(drag) => {
                if let Some(cell) = target.and_then(|cell| grid.clamp(cell)) {
                    drag.pointer = cell;
                }

                let covered = grid.region(drag.anchor, drag.pointer);
                let preview = DragPreview {
                    entered: covered.difference(&drag.covered).copied().collect(),
                    left: drag.covered.difference(&covered).copied().collect(),
                };
                drag.covered = covered;

                Some(preview)
            }
            _ => None,
        }
    }

    /// Pointer released. Always commits; returns `None` when no gesture was
    /// in progress.
    pub fn pointer_up(
        &mut self,
        grid: &SlotGrid,
        store: &SelectionStore,
        target: Option<Cell>,
    ) -> Option<SelectionUpdate> {
        if let SessionState::Dragging(_) = self.state {
            self.pointer_move(grid, target);
        }

        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Idle => {
                trace!("Pointer released without a gesture");
                None
            }
            SessionState::PendingSingleTouch { anchor, .. } => self.tap(grid, store, anchor),
            SessionState::Dragging(drag) => {
                let delta = GestureDelta::between(&drag.snapshot, &drag.covered);
                let slots = delta.resolve(store.selection_of(&self.user), &drag.covered);

                debug!(
                    "Drag by {} added {} and removed {} slots",
                    self.user,
                    delta.added.len(),
                    delta.removed.len()
                );

                Some(SelectionUpdate::new(self.user.clone(), slots))
            }
        }
    }

    /// Toggles the single slot at `cell`
    pub fn tap(
        &self,
        grid: &SlotGrid,
        store: &SelectionStore,
        cell: Cell,
    ) -> Option<SelectionUpdate> {
        let slot = grid.slot_at(cell)?;
        let previous = store.selection_of(&self.user);

        let covered = BTreeSet::from([slot.id]);
        let slots = GestureDelta::between(previous, &covered).resolve(previous, &covered);

        debug!("Tap by {} on {}", self.user, slot.id);
        Some(SelectionUpdate::new(self.user.clone(), slots))
    }

    /// Column header click: clears the whole day if any of its slots is
    /// selected, otherwise selects all of them.
    pub fn toggle_column(
        &self,
        grid: &SlotGrid,
        store: &SelectionStore,
        column: usize,
    ) -> Option<SelectionUpdate> {
        let day = grid.column(column)?;
        let column_slots = day.slot_ids();
        let previous = store.selection_of(&self.user);

        let slots = if previous.intersection(&column_slots).next().is_some() {
            debug!("Deselecting {} for {}", day.date, self.user);
            previous.difference(&column_slots).copied().collect()
        } else {
            debug!("Selecting {} for {}", day.date, self.user);
            previous.union(&column_slots).copied().collect()
        };

        Some(SelectionUpdate::new(self.user.clone(), slots))
    }

    fn begin(
        &mut self,
        grid: &SlotGrid,
        store: &SelectionStore,
        anchor: Cell,
    ) -> Option<DragPreview> {
        let covered = grid.region(anchor, anchor);

        trace!("Drag started by {} at {:?}", self.user, anchor);
        self.state = SessionState::Dragging(Drag {
            anchor,
            pointer: anchor,
            snapshot: store.selection_of(&self.user).clone(),
            covered: covered.clone(),
        });

        Some(DragPreview {
            entered: covered,
            left: BTreeSet::new(),
        })
    }
}
