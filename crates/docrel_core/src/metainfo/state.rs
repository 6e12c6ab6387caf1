//! Change tracking for mutable snapshot nodes.

use std::fmt;

/// Lifecycle of a node in a mutable snapshot, relative to its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaElementState {
    /// Did not exist in the base snapshot.
    Added,
    /// Existed; children or attributes changed.
    Modified,
    /// Existed; deleted by this transaction.
    Removed,
    /// Existed; untouched so far.
    NotChanged,
}

impl MetaElementState {
    /// Returns true for every state except [`Self::NotChanged`].
    #[must_use]
    pub fn has_changed(self) -> bool {
        !matches!(self, Self::NotChanged)
    }

    /// Returns false only for [`Self::Removed`].
    #[must_use]
    pub fn is_alive(self) -> bool {
        !matches!(self, Self::Removed)
    }
}

impl fmt::Display for MetaElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Removed => "REMOVED",
            Self::NotChanged => "NOT_CHANGED",
        };
        f.write_str(name)
    }
}

/// Nodes that can tell whether anything below them changed.
pub trait ChangeTracked {
    /// Returns true if this node or any descendant carries a change.
    fn has_changes(&self) -> bool;
}

/// A mutable-snapshot node tagged with its lifecycle state.
#[derive(Debug, Clone)]
pub struct ChangedElement<T> {
    element: T,
    state: MetaElementState,
}

impl<T> ChangedElement<T> {
    /// Wraps an element with the given state.
    pub fn new(element: T, state: MetaElementState) -> Self {
        Self { element, state }
    }

    /// Returns the wrapped element.
    pub fn element(&self) -> &T {
        &self.element
    }

    /// Returns the state recorded by the mutation API.
    pub fn state(&self) -> MetaElementState {
        self.state
    }

    /// Returns false if the element was removed.
    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }
}

impl<T: ChangeTracked> ChangedElement<T> {
    /// Returns the state the merge should act on.
    ///
    /// An untouched container whose subtree changed counts as modified.
    pub fn effective_state(&self) -> MetaElementState {
        match self.state {
            MetaElementState::NotChanged if self.element.has_changes() => {
                MetaElementState::Modified
            }
            state => state,
        }
    }
}

/// Result of looking an element up in an [`Overlay`].
#[derive(Debug)]
pub(crate) enum Lookup<'a, T> {
    /// The overlay holds a live copy.
    Alive(&'a T),
    /// The overlay removed it; the base copy must be ignored.
    Removed,
    /// The overlay never touched it; consult the base.
    Untouched,
}

/// Outcome of removing an element through an [`Overlay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Removal {
    /// The element was added by this transaction and is now forgotten.
    Dropped,
    /// The element existed in the base and is now tagged removed.
    Marked,
    /// Nothing live matched.
    NotFound,
}

/// Ordered log of the children a mutable node has touched.
///
/// Insertion order is merge order. A removed base element may be followed
/// by a fresh entry with the same name.
#[derive(Debug, Clone)]
pub(crate) struct Overlay<T> {
    entries: Vec<ChangedElement<T>>,
}

impl<T> Default for Overlay<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> Overlay<T> {
    pub(crate) fn lookup(&self, matches: impl Fn(&T) -> bool) -> Lookup<'_, T> {
        let mut touched = false;
        for entry in &self.entries {
            if matches(&entry.element) {
                if entry.is_alive() {
                    return Lookup::Alive(&entry.element);
                }
                touched = true;
            }
        }
        if touched {
            Lookup::Removed
        } else {
            Lookup::Untouched
        }
    }

    pub(crate) fn position_alive(&self, matches: impl Fn(&T) -> bool) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.is_alive() && matches(&e.element))
    }

    pub(crate) fn is_touched(&self, matches: impl Fn(&T) -> bool) -> bool {
        self.entries.iter().any(|e| matches(&e.element))
    }

    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index).map(|e| &e.element)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index).map(|e| &mut e.element)
    }

    pub(crate) fn push(&mut self, element: T, state: MetaElementState) -> usize {
        self.entries.push(ChangedElement::new(element, state));
        self.entries.len() - 1
    }

    /// Removes the live entry matching `matches`, if any.
    pub(crate) fn remove(&mut self, matches: impl Fn(&T) -> bool) -> Removal {
        let Some(pos) = self.position_alive(matches) else {
            return Removal::NotFound;
        };
        if self.entries[pos].state == MetaElementState::Added {
            self.entries.remove(pos);
            Removal::Dropped
        } else {
            self.entries[pos].state = MetaElementState::Removed;
            Removal::Marked
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ChangedElement<T>> {
        self.entries.iter()
    }

    pub(crate) fn alive(&self) -> impl Iterator<Item = &T> {
        self.entries
            .iter()
            .filter(|e| e.is_alive())
            .map(|e| &e.element)
    }
}

impl<T: ChangeTracked> Overlay<T> {
    /// Entries the merge has to look at, with their effective state.
    pub(crate) fn changes(&self) -> impl Iterator<Item = (&T, MetaElementState)> {
        self.entries
            .iter()
            .map(|e| (&e.element, e.effective_state()))
            .filter(|(_, state)| state.has_changed())
    }

    pub(crate) fn has_changes(&self) -> bool {
        self.changes().next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Node {
        name: &'static str,
        dirty: bool,
    }

    impl ChangeTracked for Node {
        fn has_changes(&self) -> bool {
            self.dirty
        }
    }

    fn node(name: &'static str) -> Node {
        Node { name, dirty: false }
    }

    #[test]
    fn effective_state_promotes_dirty_children() {
        let clean = ChangedElement::new(node("a"), MetaElementState::NotChanged);
        assert_eq!(clean.effective_state(), MetaElementState::NotChanged);

        let dirty = ChangedElement::new(
            Node {
                name: "a",
                dirty: true,
            },
            MetaElementState::NotChanged,
        );
        assert_eq!(dirty.effective_state(), MetaElementState::Modified);

        let removed = ChangedElement::new(
            Node {
                name: "a",
                dirty: true,
            },
            MetaElementState::Removed,
        );
        assert_eq!(removed.effective_state(), MetaElementState::Removed);
    }

    #[test]
    fn removing_an_added_entry_forgets_it() {
        let mut overlay = Overlay::default();
        overlay.push(node("a"), MetaElementState::Added);
        assert_eq!(overlay.remove(|n| n.name == "a"), Removal::Dropped);
        assert_eq!(overlay.iter().count(), 0);
        assert!(matches!(overlay.lookup(|n| n.name == "a"), Lookup::Untouched));
    }

    #[test]
    fn removing_a_base_entry_marks_it() {
        let mut overlay = Overlay::default();
        overlay.push(node("a"), MetaElementState::NotChanged);
        assert_eq!(overlay.remove(|n| n.name == "a"), Removal::Marked);
        assert!(matches!(overlay.lookup(|n| n.name == "a"), Lookup::Removed));
        assert_eq!(overlay.remove(|n| n.name == "a"), Removal::NotFound);
        assert_eq!(overlay.changes().count(), 1);
    }

    #[test]
    fn re_added_entry_shadows_removal() {
        let mut overlay = Overlay::default();
        overlay.push(node("a"), MetaElementState::Removed);
        overlay.push(node("a"), MetaElementState::Added);
        assert!(matches!(overlay.lookup(|n| n.name == "a"), Lookup::Alive(_)));
        let states: Vec<_> = overlay.changes().map(|(_, s)| s).collect();
        assert_eq!(states, vec![MetaElementState::Removed, MetaElementState::Added]);
    }

    #[test]
    fn untouched_entries_are_not_changes() {
        let mut overlay = Overlay::default();
        overlay.push(node("a"), MetaElementState::NotChanged);
        assert!(!overlay.has_changes());
        assert_eq!(overlay.alive().count(), 1);
    }
}
