//! Conflict sets — groups of mutually exclusive transactions.
//!
//! Set identity is an indirection: every transaction holds a [`SetId`] handle
//! and merging two sets repoints one handle at the other (union-find with
//! union by size and path compression) instead of rewriting the handles of
//! every member.

use crate::snowball::{Phase, Snowball};
use snowstorm_types::TxId;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Handle to a conflict set. May be stale after a merge; resolve it through
/// [`ConflictSets::find`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SetId(u64);

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "set#{}", self.0)
    }
}

/// A group of transactions of which at most one may be accepted, plus the
/// confidence state shared by the group.
#[derive(Clone, Debug)]
pub struct ConflictSet {
    members: BTreeSet<TxId>,
    snowball: Snowball,
    /// Handles that were merged into this set and now link to it.
    aliases: Vec<SetId>,
}

impl ConflictSet {
    fn singleton(tx: TxId) -> Self {
        let mut members = BTreeSet::new();
        members.insert(tx);
        Self {
            members,
            snowball: Snowball::new(),
            aliases: Vec::new(),
        }
    }

    pub fn members(&self) -> &BTreeSet<TxId> {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, tx: &TxId) -> bool {
        self.members.contains(tx)
    }

    /// A set with a single member has no observed conflict.
    pub fn is_virtuous(&self) -> bool {
        self.members.len() == 1
    }

    pub fn preference(&self) -> Option<TxId> {
        self.snowball.preference()
    }

    pub fn confidence(&self) -> u32 {
        self.snowball.confidence()
    }

    pub fn is_finalized(&self) -> bool {
        self.snowball.is_finalized()
    }

    pub fn phase(&self) -> Phase {
        self.snowball.phase()
    }

    pub(crate) fn snowball_mut(&mut self) -> &mut Snowball {
        &mut self.snowball
    }
}

#[derive(Clone, Debug)]
enum Slot {
    Root(ConflictSet),
    Link(SetId),
}

/// Outcome of [`ConflictSets::join`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Join {
    /// Root of the set the transaction now belongs to.
    pub set: SetId,
    /// Whether two or more existing sets were unioned.
    pub merged: bool,
}

/// Outcome of [`ConflictSets::remove_member`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Removal {
    pub set: SetId,
    /// The set had no members left and was dissolved.
    pub dissolved: bool,
}

/// All live conflict sets.
#[derive(Clone, Debug, Default)]
pub struct ConflictSets {
    slots: HashMap<SetId, Slot>,
    next_id: u64,
    roots: usize,
}

impl ConflictSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sets.
    pub fn len(&self) -> usize {
        self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots == 0
    }

    /// Create a singleton set for a transaction with no known conflicts.
    pub fn create(&mut self, tx: TxId) -> SetId {
        let id = SetId(self.next_id);
        self.next_id += 1;
        self.slots.insert(id, Slot::Root(ConflictSet::singleton(tx)));
        self.roots += 1;
        id
    }

    /// Resolve a handle to its root without mutating the structure.
    pub fn find(&self, id: SetId) -> Option<SetId> {
        let mut current = id;
        loop {
            match self.slots.get(&current)? {
                Slot::Root(_) => return Some(current),
                Slot::Link(next) => current = *next,
            }
        }
    }

    /// Resolve a handle to its root and point every link on the way
    /// directly at that root.
    fn find_compress(&mut self, id: SetId) -> Option<SetId> {
        let root = self.find(id)?;
        let mut current = id;
        while current != root {
            match self.slots.get_mut(&current) {
                Some(Slot::Link(next)) => {
                    let following = *next;
                    *next = root;
                    current = following;
                }
                _ => break,
            }
        }
        Some(root)
    }

    pub fn get(&self, id: SetId) -> Option<&ConflictSet> {
        let root = self.find(id)?;
        match self.slots.get(&root)? {
            Slot::Root(set) => Some(set),
            Slot::Link(_) => None,
        }
    }

    pub fn get_mut(&mut self, id: SetId) -> Option<&mut ConflictSet> {
        let root = self.find_compress(id)?;
        match self.slots.get_mut(&root)? {
            Slot::Root(set) => Some(set),
            Slot::Link(_) => None,
        }
    }

    /// Live sets with their root handles, in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (SetId, &ConflictSet)> {
        let mut roots: Vec<(SetId, &ConflictSet)> = self
            .slots
            .iter()
            .filter_map(|(id, slot)| match slot {
                Slot::Root(set) => Some((*id, set)),
                Slot::Link(_) => None,
            })
            .collect();
        roots.sort_by_key(|(id, _)| *id);
        roots.into_iter()
    }

    /// Add `tx` to the union of the sets behind `handles`.
    ///
    /// With a single distinct set the transaction simply joins it. With
    /// several, the sets are unioned into the largest one (ties go to the
    /// oldest handle); the confidence streak is reset because the conflict
    /// structure changed, and the surviving set keeps its preference or
    /// inherits the first one found among the absorbed sets.
    ///
    /// Returns `None` when no handle resolves to a live set.
    pub fn join(&mut self, tx: TxId, handles: &[SetId]) -> Option<Join> {
        let mut roots: Vec<SetId> = handles
            .iter()
            .filter_map(|h| self.find_compress(*h))
            .collect();
        roots.sort();
        roots.dedup();

        let survivor = *roots.iter().max_by(|a, b| {
            let len_a = self.get(**a).map(ConflictSet::len).unwrap_or(0);
            let len_b = self.get(**b).map(ConflictSet::len).unwrap_or(0);
            len_a.cmp(&len_b).then_with(|| b.cmp(a))
        })?;

        let mut absorbed_members = BTreeSet::new();
        let mut absorbed_aliases = Vec::new();
        let mut inherited = None;
        for root in roots.iter().copied().filter(|r| *r != survivor) {
            if let Some(Slot::Root(set)) = self.slots.insert(root, Slot::Link(survivor)) {
                debug_assert!(!set.is_finalized(), "finalized sets are never merged");
                absorbed_members.extend(set.members);
                absorbed_aliases.push(root);
                absorbed_aliases.extend(set.aliases);
                if inherited.is_none() {
                    inherited = set.snowball.preference();
                }
                self.roots -= 1;
            }
        }

        let merged = roots.len() > 1;
        let set = self.get_mut(survivor)?;
        set.members.extend(absorbed_members);
        set.members.insert(tx);
        set.aliases.extend(absorbed_aliases);
        if merged {
            set.snowball.reset_confidence();
            set.snowball.inherit_preference(inherited);
        }
        Some(Join {
            set: survivor,
            merged,
        })
    }

    /// Remove a decided member from its set.
    ///
    /// If the member was the (unfinalized) preference, the preference and its
    /// streak are dropped. A set left empty is dissolved along with every
    /// handle that linked to it.
    pub fn remove_member(&mut self, handle: SetId, tx: &TxId) -> Option<Removal> {
        let root = self.find_compress(handle)?;
        let set = self.get_mut(root)?;
        set.members.remove(tx);
        if set.snowball.preference() == Some(*tx) {
            set.snowball.clear_preference();
        }
        let dissolved = set.members.is_empty();
        if dissolved {
            self.dissolve(root);
        }
        Some(Removal {
            set: root,
            dissolved,
        })
    }

    /// Drop a set and all handles that point at it.
    pub fn dissolve(&mut self, handle: SetId) -> Option<ConflictSet> {
        let root = self.find(handle)?;
        match self.slots.remove(&root)? {
            Slot::Root(set) => {
                for alias in &set.aliases {
                    self.slots.remove(alias);
                }
                self.roots -= 1;
                Some(set)
            }
            Slot::Link(_) => None,
        }
    }
}
