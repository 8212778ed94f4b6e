//! The hash-consing term store.
//!
//! The store is an arena of reference-counted slots plus an interning
//! table keyed by structural hash and content equality. Two live nodes
//! with equal content never coexist: interning an equal descriptor
//! returns the existing handle with its count bumped. Structural
//! equality between canonical terms is therefore an O(1) handle
//! comparison.
//!
//! Teardown is iterative: releasing the last reference to a node pushes
//! its children onto an explicit drain stack instead of recursing, so
//! arbitrarily deep expression chains cannot overflow the native stack.

use hashbrown::hash_map::{DefaultHashBuilder, RawEntryMut};
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::hash::BuildHasher;

use crate::handle::{TermId, WeakTerm};
use crate::node::Term;

/// One arena slot.
#[derive(Debug)]
struct Slot {
    /// The node content. `None` marks a vacant (freed) slot.
    node: Option<Term>,
    /// Structural hash, computed once at interning.
    hash: u64,
    /// Number of live references.
    refcount: u32,
    /// Bumped every time the slot is freed; stale weak handles are
    /// detected by comparing generations.
    generation: u32,
    /// Set while an auxiliary cache holds a back-reference to this
    /// node; such slots are reported on destruction so the cache can
    /// purge its entry.
    tracked: bool,
}

/// The hash-consing term store.
#[derive(Default)]
pub struct Store {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Interning table. Keys are slot handles; probing and insertion go
    /// through the raw-entry API with the memoized structural hash.
    table: HashMap<TermId, (), DefaultHashBuilder>,
    hasher: DefaultHashBuilder,
    /// Reusable drain stack for deferred release.
    drain: Vec<TermId>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("live", &self.table.len())
            .field("slots", &self.slots.len())
            .field("free", &self.free.len())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            table: HashMap::with_capacity_and_hasher(capacity, DefaultHashBuilder::default()),
            hasher: DefaultHashBuilder::default(),
            drain: Vec::new(),
        }
    }

    /// Interns a term, returning an owned handle.
    ///
    /// The descriptor transfers ownership of the child references it
    /// holds. On a hit the duplicate child references are released and
    /// the existing handle is returned with its count bumped; on a miss
    /// a slot is allocated (reusing freed slots) with count 1.
    pub fn intern(&mut self, node: Term) -> TermId {
        let hash = self.hasher.hash_one(&node);

        let hit = {
            let slots = &self.slots;
            self.table
                .raw_entry()
                .from_hash(hash, |cand| slots[cand.index()].node.as_ref() == Some(&node))
                .map(|(id, _)| *id)
        };

        if let Some(id) = hit {
            self.slots[id.index()].refcount += 1;
            // The equal resident node owns references to the same
            // children, so dropping the duplicates cannot destroy them.
            for child in node.children() {
                let dead = self.release(child);
                debug_assert!(dead.is_empty());
            }
            return id;
        }

        let id = self.allocate(node, hash);

        let slots = &self.slots;
        match self
            .table
            .raw_entry_mut()
            .from_hash(hash, |cand| *cand == id)
        {
            RawEntryMut::Vacant(entry) => {
                entry.insert_with_hasher(hash, id, (), |cand| slots[cand.index()].hash);
            }
            RawEntryMut::Occupied(_) => unreachable!("freshly allocated handle already interned"),
        }

        id
    }

    fn allocate(&mut self, node: Term, hash: u64) -> TermId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.node.is_none());
            slot.node = Some(node);
            slot.hash = hash;
            slot.refcount = 1;
            slot.tracked = false;
            return TermId::new(index);
        }

        let index = u32::try_from(self.slots.len()).expect("term store overflow");
        self.slots.push(Slot {
            node: Some(node),
            hash,
            refcount: 1,
            generation: 0,
            tracked: false,
        });
        TermId::new(index)
    }

    /// Returns the node behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle refers to a vacant slot.
    #[must_use]
    pub fn get(&self, id: TermId) -> &Term {
        self.slots[id.index()]
            .node
            .as_ref()
            .expect("stale term handle")
    }

    /// Acquires an additional reference to a term.
    pub fn retain(&mut self, id: TermId) {
        let slot = &mut self.slots[id.index()];
        assert!(slot.node.is_some(), "retain of a vacant slot");
        slot.refcount += 1;
    }

    /// Releases one reference to a term.
    ///
    /// When a count reaches zero the node is removed from the interning
    /// table and its slot freed; its children are pushed on the drain
    /// stack and processed iteratively, never recursively. Returns the
    /// handles of destroyed *tracked* nodes so the owner can purge
    /// auxiliary caches that hold back-references.
    pub fn release(&mut self, id: TermId) -> SmallVec<[TermId; 2]> {
        let mut destroyed_tracked = SmallVec::new();
        let mut stack = std::mem::take(&mut self.drain);
        stack.push(id);

        while let Some(id) = stack.pop() {
            let slot = &mut self.slots[id.index()];
            assert!(slot.node.is_some(), "release of a vacant slot");
            debug_assert!(slot.refcount > 0);
            slot.refcount -= 1;
            if slot.refcount > 0 {
                continue;
            }

            let node = slot.node.take().expect("release of a vacant slot");
            let hash = slot.hash;
            slot.generation = slot.generation.wrapping_add(1);
            if slot.tracked {
                slot.tracked = false;
                destroyed_tracked.push(id);
            }

            self.unregister(id, hash);
            self.free.push(id.index() as u32);
            stack.extend(node.children());
        }

        self.drain = stack;
        if !destroyed_tracked.is_empty() {
            log::trace!("store: destroyed {} tracked node(s)", destroyed_tracked.len());
        }
        destroyed_tracked
    }

    fn unregister(&mut self, id: TermId, hash: u64) {
        match self
            .table
            .raw_entry_mut()
            .from_hash(hash, |cand| *cand == id)
        {
            RawEntryMut::Occupied(entry) => {
                entry.remove();
            }
            RawEntryMut::Vacant(_) => unreachable!("dying node missing from intern table"),
        }
    }

    /// Current reference count of a term.
    ///
    /// # Panics
    ///
    /// Panics if the handle refers to a vacant slot.
    #[must_use]
    pub fn refcount(&self, id: TermId) -> u32 {
        let slot = &self.slots[id.index()];
        assert!(slot.node.is_some(), "refcount of a vacant slot");
        slot.refcount
    }

    /// Marks a node as tracked by an auxiliary cache.
    pub fn mark_tracked(&mut self, id: TermId) {
        let slot = &mut self.slots[id.index()];
        assert!(slot.node.is_some(), "tracking a vacant slot");
        slot.tracked = true;
    }

    /// Creates a weak handle that does not keep the term alive.
    #[must_use]
    pub fn downgrade(&self, id: TermId) -> WeakTerm {
        WeakTerm {
            id,
            generation: self.slots[id.index()].generation,
        }
    }

    /// Returns true if the weak handle's referent is still live.
    #[must_use]
    pub fn is_alive(&self, weak: WeakTerm) -> bool {
        let slot = &self.slots[weak.id.index()];
        slot.node.is_some() && slot.generation == weak.generation
    }

    /// Upgrades a weak handle to an owned strong handle, if live.
    pub fn upgrade(&mut self, weak: WeakTerm) -> Option<TermId> {
        if self.is_alive(weak) {
            self.slots[weak.id.index()].refcount += 1;
            Some(weak.id)
        } else {
            None
        }
    }

    /// Number of live nodes.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.table.len()
    }
}
