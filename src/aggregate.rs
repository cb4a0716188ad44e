use crate::grid::{SlotGrid, SlotId};
use crate::store::{SelectionStore, UserId};
use itertools::Itertools;
use log::trace;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Sparse vote count per slot. Slots nobody picked are absent.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(transparent))]
pub struct Tally(BTreeMap<SlotId, usize>);

impl Tally {
    pub fn votes(&self, slot: &SlotId) -> usize {
        self.0.get(slot).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotId, &usize)> + '_ {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn max_votes(&self) -> usize {
        self.0.values().copied().max().unwrap_or(0)
    }
}

impl From<Tally> for BTreeMap<SlotId, usize> {
    fn from(tally: Tally) -> Self {
        tally.0
    }
}

/// Display names for participants
pub trait Directory {
    fn name(&self, user: &UserId) -> String;
}

/// Falls back to the raw id for participants without a name
impl Directory for BTreeMap<UserId, String> {
    fn name(&self, user: &UserId) -> String {
        self.get(user)
            .cloned()
            .unwrap_or_else(|| user.to_string())
    }
}

impl Directory for HashMap<UserId, String> {
    fn name(&self, user: &UserId) -> String {
        self.get(user)
            .cloned()
            .unwrap_or_else(|| user.to_string())
    }
}

/// Participants a viewer currently focuses on
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct HighlightTargets {
    users: Vec<UserId>,
}

impl HighlightTargets {
    /// A viewer starts out focused on their own picks
    pub fn for_viewer(viewer: UserId) -> HighlightTargets {
        HighlightTargets {
            users: vec![viewer],
        }
    }

    /// Adds or removes `user`. Returns whether the user is focused afterwards.
    pub fn toggle(&mut self, user: UserId) -> bool {
        match self.users.iter().position(|u| *u == user) {
            Some(index) => {
                self.users.remove(index);
                false
            }
            None => {
                self.users.push(user);
                true
            }
        }
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.users.contains(user)
    }

    pub fn users(&self) -> &[UserId] {
        &self.users
    }
}

/// Slots to highlight. `matched` marks common availability of several participants.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Highlight {
    pub slots: BTreeSet<SlotId>,
    pub matched: bool,
}

/// Run of consecutive slots long enough for the meeting, with everyone free for all of it
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Candidate {
    pub slots: Vec<SlotId>,
    pub participants: Vec<UserId>,
}

impl Candidate {
    pub fn start(&self) -> SlotId {
        self.slots[0]
    }
}

/// Read-only queries over a [`SelectionStore`]. Nothing is cached: every call
/// recomputes from the current selections.
#[derive(Debug, Copy, Clone)]
pub struct Aggregator<'a> {
    store: &'a SelectionStore,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a SelectionStore) -> Aggregator<'a> {
        Aggregator { store }
    }

    /// Number of participants who picked each slot
    ///
    /// # Examples
    /// ```
    /// use std::collections::BTreeSet;
    /// use whenis_libs::aggregate::Aggregator;
    /// use whenis_libs::grid::SlotId;
    /// use whenis_libs::store::{SelectionStore, SelectionUpdate};
    ///
    /// let s1: SlotId = "2021-11-11T09:00:00.000Z".parse().unwrap();
    /// let s2: SlotId = "2021-11-11T10:00:00.000Z".parse().unwrap();
    ///
    /// let mut store = SelectionStore::new();
    /// store.apply_selection(SelectionUpdate::new("1".into(), BTreeSet::from([s1, s2])));
    /// store.apply_selection(SelectionUpdate::new("2".into(), BTreeSet::from([s2])));
    ///
    /// let tally = Aggregator::new(&store).counted_slots();
    /// assert_eq!(tally.votes(&s1), 1);
    /// assert_eq!(tally.votes(&s2), 2);
    /// ```
    pub fn counted_slots(&self) -> Tally {
        let counts = self
            .store
            .selections()
            .flat_map(|(_, selection)| selection.iter())
            .fold(BTreeMap::new(), |mut counts, &slot| {
                *counts.entry(slot).or_insert(0) += 1;
                counts
            });

        Tally(counts)
    }

    pub fn users_who_selected_slot(&self, slot: &SlotId) -> Vec<&'a UserId> {
        self.store.users_with(slot)
    }

    /// Comma separated display names of the participants who picked `slot`
    pub fn voters<D>(&self, slot: &SlotId, directory: &D) -> String
    where
        D: Directory + ?Sized,
    {
        self.users_who_selected_slot(slot)
            .into_iter()
            .map(|user| directory.name(user))
            .join(", ")
    }

    /// What to highlight for the focused participants: a single participant's
    /// own picks, or the slots every focused participant shares.
    pub fn highlight(&self, targets: &[UserId]) -> Highlight {
        match targets {
            [] => Highlight::default(),
            [user] => Highlight {
                slots: self.store.selection_of(user).clone(),
                matched: false,
            },
            users => Highlight {
                slots: self.store.common_slots(users),
                matched: true,
            },
        }
    }

    /// Windows of `duration` consecutive slots within a day of `grid`, each with
    /// the participants who picked every slot of it. Windows nobody can attend
    /// are dropped. Best attended first, earlier first on ties.
    pub fn best_candidates(&self, grid: &SlotGrid, duration: usize) -> Vec<Candidate> {
        if duration == 0 {
            return vec![];
        }

        let candidates = grid
            .days()
            .iter()
            .flat_map(|day| day.slots.windows(duration))
            .filter_map(|window| {
                let participants = self
                    .store
                    .selections()
                    .filter(|(_, selection)| window.iter().all(|slot| selection.contains(&slot.id)))
                    .map(|(user, _)| user.clone())
                    .collect_vec();

                if participants.is_empty() {
                    None
                } else {
                    Some(Candidate {
                        slots: window.iter().map(|slot| slot.id).collect(),
                        participants,
                    })
                }
            })
            .sorted_by_key(|candidate| Reverse(candidate.participants.len()))
            .collect_vec();

        trace!(
            "Found {} candidates of {} slots",
            candidates.len(),
            duration
        );

        candidates
    }
}
