use crate::grid::SlotId;
use itertools::Itertools;
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

static NO_SELECTION: BTreeSet<SlotId> = BTreeSet::new();

/// Stable participant identifier handed out by the replication layer
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct UserId(String);

impl UserId {
    pub fn new(id: &str) -> UserId {
        UserId(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        UserId::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        UserId(id)
    }
}

/// A participant's full selection, as published after every gesture
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SelectionUpdate {
    pub user: UserId,
    pub slots: BTreeSet<SlotId>,
}

impl SelectionUpdate {
    pub fn new(user: UserId, slots: BTreeSet<SlotId>) -> SelectionUpdate {
        SelectionUpdate { user, slots }
    }
}

/// Notified every time a participant's selection actually changes
pub trait SelectionObserver {
    fn selection_changed(&mut self, update: &SelectionUpdate);
}

impl<F> SelectionObserver for F
where
    F: FnMut(&SelectionUpdate),
{
    fn selection_changed(&mut self, update: &SelectionUpdate) {
        self(update)
    }
}

/// Authoritative per-participant selections.
///
/// Updates are expected to arrive in one global order from the replication
/// layer, so the store does no locking of its own.
#[derive(Default)]
pub struct SelectionStore {
    selections: BTreeMap<UserId, BTreeSet<SlotId>>,
    observers: Vec<Box<dyn SelectionObserver>>,
}

impl fmt::Debug for SelectionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionStore")
            .field("selections", &self.selections)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl SelectionStore {
    pub fn new() -> SelectionStore {
        SelectionStore::default()
    }

    pub fn subscribe<O>(&mut self, observer: O)
    where
        O: SelectionObserver + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// A participant joined. Known participants are left untouched.
    pub fn register(&mut self, user: UserId) {
        self.selections.entry(user).or_default();
    }

    /// Replaces the participant's selection wholesale. Returns whether anything
    /// changed; observers only hear about actual changes.
    ///
    /// # Examples
    /// ```
    /// use std::collections::BTreeSet;
    /// use whenis_libs::grid::SlotId;
    /// use whenis_libs::store::{SelectionStore, SelectionUpdate, UserId};
    ///
    /// let slot: SlotId = "2021-11-11T12:00:00.000Z".parse().unwrap();
    /// let update = SelectionUpdate::new(UserId::new("ana"), BTreeSet::from([slot]));
    ///
    /// let mut store = SelectionStore::new();
    /// assert!(store.apply_selection(update.clone()));
    /// assert!(!store.apply_selection(update));
    /// ```
    pub fn apply_selection(&mut self, update: SelectionUpdate) -> bool {
        let current = self.selections.entry(update.user.clone()).or_default();

        if *current == update.slots {
            trace!("Selection of {} unchanged", update.user);
            return false;
        }

        debug!(
            user = update.user.as_str(), slots = update.slots.len();
            "Applying selection"
        );
        *current = update.slots.clone();

        for observer in self.observers.iter_mut() {
            observer.selection_changed(&update);
        }

        true
    }

    /// Clears the participant's selection. The participant stays known.
    pub fn deselect_all(&mut self, user: &UserId) -> bool {
        self.apply_selection(SelectionUpdate::new(user.clone(), BTreeSet::new()))
    }

    /// The participant's selection, empty for unknown participants
    pub fn selection_of(&self, user: &UserId) -> &BTreeSet<SlotId> {
        self.selections.get(user).unwrap_or(&NO_SELECTION)
    }

    pub fn participants(&self) -> impl Iterator<Item = &UserId> + '_ {
        self.selections.keys()
    }

    pub fn selections(&self) -> impl Iterator<Item = (&UserId, &BTreeSet<SlotId>)> + '_ {
        self.selections.iter()
    }

    /// Slots selected by every one of `users`. Unknown users count as an
    /// empty selection; an empty list yields no slots.
    ///
    /// # Examples
    /// ```
    /// use std::collections::BTreeSet;
    /// use whenis_libs::grid::SlotId;
    /// use whenis_libs::store::{SelectionStore, SelectionUpdate, UserId};
    ///
    /// let a: SlotId = "2021-11-11T12:00:00.000Z".parse().unwrap();
    /// let b: SlotId = "2021-11-11T13:00:00.000Z".parse().unwrap();
    ///
    /// let mut store = SelectionStore::new();
    /// store.apply_selection(SelectionUpdate::new("ana".into(), BTreeSet::from([a, b])));
    /// store.apply_selection(SelectionUpdate::new("bo".into(), BTreeSet::from([b])));
    ///
    /// assert_eq!(
    ///     store.common_slots(&[UserId::new("ana"), UserId::new("bo")]),
    ///     BTreeSet::from([b])
    /// );
    /// assert!(store.common_slots(&[]).is_empty());
    /// ```
    pub fn common_slots(&self, users: &[UserId]) -> BTreeSet<SlotId> {
        let mut selections = users.iter().map(|user| self.selection_of(user));

        let first = match selections.next() {
            Some(first) => first.clone(),
            None => return BTreeSet::new(),
        };

        selections.fold(first, |common, selection| {
            common.intersection(selection).copied().collect()
        })
    }

    /// Participants whose selection contains `slot`, in id order
    pub fn users_with(&self, slot: &SlotId) -> Vec<&UserId> {
        self.selections
            .iter()
            .filter(|(_, selection)| selection.contains(slot))
            .map(|(user, _)| user)
            .collect_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn slot(s: &str) -> SlotId {
        s.parse().unwrap()
    }

    fn slots(ids: &[&str]) -> BTreeSet<SlotId> {
        ids.iter().map(|s| slot(s)).collect()
    }

    const S1: &str = "2021-11-11T09:00:00.000Z";
    const S2: &str = "2021-11-11T10:00:00.000Z";
    const S3: &str = "2021-11-11T11:00:00.000Z";

    #[test]
    fn unknown_users_have_empty_selection() {
        let store = SelectionStore::new();

        assert!(store.selection_of(&"ghost".into()).is_empty());
        assert!(store.common_slots(&[UserId::new("ghost")]).is_empty());
    }

    #[test]
    fn single_user_common_slots_is_their_selection() {
        let mut store = SelectionStore::new();
        store.apply_selection(SelectionUpdate::new("ana".into(), slots(&[S1, S2])));

        assert_eq!(
            &store.common_slots(&[UserId::new("ana")]),
            store.selection_of(&"ana".into())
        );
    }

    #[test]
    fn common_slots_intersects_everyone() {
        let mut store = SelectionStore::new();
        store.apply_selection(SelectionUpdate::new("1".into(), slots(&[S1, S2])));
        store.apply_selection(SelectionUpdate::new("2".into(), slots(&[S2, S3])));
        store.apply_selection(SelectionUpdate::new("3".into(), slots(&[S2])));

        assert_eq!(
            store.common_slots(&[UserId::new("1"), UserId::new("2"), UserId::new("3")]),
            slots(&[S2])
        );
        assert!(store
            .common_slots(&[UserId::new("1"), UserId::new("2"), UserId::new("left")])
            .is_empty());
    }

    #[test]
    fn observers_hear_only_changes() {
        let heard = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&heard);

        let mut store = SelectionStore::new();
        store.subscribe(move |update: &SelectionUpdate| sink.borrow_mut().push(update.clone()));

        let update = SelectionUpdate::new("ana".into(), slots(&[S1]));
        store.apply_selection(update.clone());
        store.apply_selection(update.clone());

        assert_eq!(*heard.borrow(), vec![update]);
    }

    #[test]
    fn deselect_all_keeps_participant() {
        let mut store = SelectionStore::new();
        store.apply_selection(SelectionUpdate::new("ana".into(), slots(&[S1])));

        assert!(store.deselect_all(&"ana".into()));
        assert!(store.selection_of(&"ana".into()).is_empty());
        assert_eq!(store.participants().collect_vec(), vec![&UserId::new("ana")]);
    }

    #[test]
    fn register_does_not_clear() {
        let mut store = SelectionStore::new();
        store.apply_selection(SelectionUpdate::new("ana".into(), slots(&[S1])));
        store.register("ana".into());
        store.register("bo".into());

        assert_eq!(store.selection_of(&"ana".into()), &slots(&[S1]));
        assert_eq!(store.participants().count(), 2);
    }

    #[test]
    fn lists_users_with_slot() {
        let mut store = SelectionStore::new();
        store.apply_selection(SelectionUpdate::new("bo".into(), slots(&[S1, S2])));
        store.apply_selection(SelectionUpdate::new("ana".into(), slots(&[S2])));

        assert_eq!(
            store.users_with(&slot(S2)),
            vec![&UserId::new("ana"), &UserId::new("bo")]
        );
        assert!(store.users_with(&slot(S3)).is_empty());
    }
}
