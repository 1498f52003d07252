// id_table.rs - Persistent particle identities
//
// A particle ID survives the particle moving between slots (kill reorders,
// buffers rotate). Each buffer slot owns an ID -> instance index table;
// the free list and high-water mark are shared across slots.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel for "no index" in ID tables and for an unset high-water mark.
pub const INDEX_NONE: i32 = -1;

/// Stable particle identity.
///
/// `index` is a slot in the ID table; `acquire_tag` tells apart particles
/// that reused the same slot after an earlier owner died.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Serialize, Deserialize,
)]
pub struct ParticleId {
    pub index: i32,
    pub acquire_tag: i32,
}

impl ParticleId {
    pub const INVALID: Self = Self {
        index: INDEX_NONE,
        acquire_tag: INDEX_NONE,
    };

    #[inline]
    pub const fn new(index: i32, acquire_tag: i32) -> Self {
        Self { index, acquire_tag }
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.index != INDEX_NONE
    }

    /// Pack into a single u64 (tag in the high half).
    #[inline]
    pub fn to_bits(self) -> u64 {
        ((self.acquire_tag as u32 as u64) << 32) | self.index as u32 as u64
    }

    #[inline]
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32 as i32,
            acquire_tag: (bits >> 32) as u32 as i32,
        }
    }
}

impl Default for ParticleId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for ParticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.acquire_tag)
    }
}

/// When the ID tables may give memory back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdTableShrinkPolicy {
    /// Tables stay at their historical peak size.
    #[default]
    Never,
    /// Shrink once the required size drops below half the current size.
    WhenHalfEmpty,
}

/// What an allocation did to the table size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdTableChange {
    Unchanged { size: usize },
    Grown { from: usize, to: usize },
    Shrunk { from: usize, to: usize },
}

impl IdTableChange {
    pub fn size(self) -> usize {
        match self {
            IdTableChange::Unchanged { size } => size,
            IdTableChange::Grown { to, .. } | IdTableChange::Shrunk { to, .. } => to,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IdTable {
    /// Per slot: ID index -> instance index.
    tables: Vec<Vec<i32>>,
    /// Per slot: acquire tag of the particle mapped at each ID index.
    tags: Vec<Vec<i32>>,
    free_ids: Vec<i32>,
    /// Number of ID indices handed to the free list and not shrunk away.
    size: usize,
    max_used_id: i32,
    acquire_tag: i32,
    shrink_policy: IdTableShrinkPolicy,
}

impl IdTable {
    /// One ID table per buffer slot.
    pub fn new(slots: usize, shrink_policy: IdTableShrinkPolicy) -> Self {
        Self {
            tables: vec![Vec::new(); slots],
            tags: vec![Vec::new(); slots],
            free_ids: Vec::new(),
            size: 0,
            max_used_id: INDEX_NONE,
            acquire_tag: 0,
            shrink_policy,
        }
    }

    pub fn shrink_policy(&self) -> IdTableShrinkPolicy {
        self.shrink_policy
    }

    pub fn set_shrink_policy(&mut self, policy: IdTableShrinkPolicy) {
        self.shrink_policy = policy;
    }

    /// Number of ID indices in circulation (mapped or free).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size the `curr` slot's table for `num_instances` instances.
    ///
    /// Growth pushes the new IDs onto the free list in descending order so
    /// pops hand them out ascending. Every index is pushed exactly once, so
    /// allocating several times in one tick never duplicates a free ID.
    ///
    /// Without `maintain_existing` the current table is reset to
    /// [`INDEX_NONE`] along with the high-water mark, ready to be refilled by
    /// the simulation. With it, mappings already made this tick survive and
    /// the table never shrinks.
    pub fn allocate(
        &mut self,
        curr: usize,
        num_instances: usize,
        maintain_existing: bool,
    ) -> IdTableChange {
        let existing = self.size;
        let num_used = (self.max_used_id + 1) as usize;
        let mut required = num_instances.max(num_used);

        let change = if required > existing {
            self.free_ids.reserve(required - existing);
            self.free_ids
                .extend((existing..required).rev().map(|id| id as i32));
            IdTableChange::Grown {
                from: existing,
                to: required,
            }
        } else if !maintain_existing
            && self.shrink_policy == IdTableShrinkPolicy::WhenHalfEmpty
            && required < existing / 2
        {
            let mut i = 0;
            while i < self.free_ids.len() {
                if self.free_ids[i] as usize >= required {
                    self.free_ids.swap_remove(i);
                } else {
                    i += 1;
                }
            }
            debug_assert!(self.free_ids.len() <= required);
            self.free_ids.shrink_to(required);
            IdTableChange::Shrunk {
                from: existing,
                to: required,
            }
        } else {
            required = existing;
            IdTableChange::Unchanged { size: existing }
        };
        self.size = required;

        let (table, tags) = (&mut self.tables[curr], &mut self.tags[curr]);
        if !maintain_existing {
            table.clear();
            tags.clear();
            self.max_used_id = INDEX_NONE;
        }
        table.resize(required, INDEX_NONE);
        tags.resize(required, INDEX_NONE);
        change
    }

    pub fn table(&self, slot: usize) -> &[i32] {
        &self.tables[slot]
    }

    pub fn free_ids(&self) -> &[i32] {
        &self.free_ids
    }

    pub fn num_free_ids(&self) -> usize {
        self.free_ids.len()
    }

    pub fn max_used_id(&self) -> i32 {
        self.max_used_id
    }

    pub fn acquire_tag(&self) -> i32 {
        self.acquire_tag
    }

    pub fn set_acquire_tag(&mut self, tag: i32) {
        self.acquire_tag = tag;
    }

    /// Pop a free ID for a newly spawned instance and map it in `curr`.
    ///
    /// Panics when the free list is exhausted, which means the data set was
    /// not allocated for the number of instances being spawned.
    pub fn acquire(&mut self, curr: usize, instance: usize) -> ParticleId {
        let Some(index) = self.free_ids.pop() else {
            panic!("free ID list exhausted; allocate before spawning");
        };
        let id = ParticleId::new(index, self.acquire_tag);
        self.update(curr, id, instance);
        id
    }

    /// Map a live particle to its instance index in `curr`.
    pub fn update(&mut self, curr: usize, id: ParticleId, instance: usize) {
        debug_assert!(id.is_valid());
        let table = &mut self.tables[curr];
        let slot = id.index as usize;
        assert!(
            slot < table.len(),
            "particle ID {id} outside ID table of size {}",
            table.len()
        );
        table[slot] = instance as i32;
        self.tags[curr][slot] = id.acquire_tag;
        self.max_used_id = self.max_used_id.max(id.index);
    }

    /// Return a dead particle's ID to the free list.
    pub fn release(&mut self, id: ParticleId) {
        debug_assert!(id.is_valid());
        debug_assert!(!self.free_ids.contains(&id.index), "ID {id} released twice");
        self.free_ids.push(id.index);
    }

    /// Instance index of `id` in `slot`, if mapped to that exact particle.
    ///
    /// An ID whose index was recycled by a later particle does not resolve:
    /// the acquire tags differ.
    pub fn index_of(&self, slot: usize, id: ParticleId) -> Option<usize> {
        if !id.is_valid() {
            return None;
        }
        let position = id.index as usize;
        let index = *self.tables[slot].get(position)?;
        if index == INDEX_NONE || self.tags[slot][position] != id.acquire_tag {
            return None;
        }
        Some(index as usize)
    }

    /// Forget every mapping and free ID, keeping the acquire tag.
    pub fn reset(&mut self) {
        for (table, tags) in self.tables.iter_mut().zip(&mut self.tags) {
            table.clear();
            tags.clear();
        }
        self.free_ids.clear();
        self.size = 0;
        self.max_used_id = INDEX_NONE;
    }
}
