//! Incremental append-only Merkle accumulator.
use crate::{
    backed::StorageBackedU64,
    backend::StorageBackend,
    storage::ArbosStorage,
};
use primitives::{keccak256, math::log2_ceil, Keccak256, B256};
use std::vec::Vec;

/// Interior node produced while appending a leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MerkleTreeNodeEvent {
    /// Height of the node; leaves are at level 0.
    pub level: u64,
    /// Index of the last leaf covered by the node.
    pub num_leaves: u64,
    /// Node hash.
    pub hash: B256,
}

/// Snapshot of an accumulator, enough to rebuild it with [`MerkleAccumulator::from_partials`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MerkleAccumulatorExportState {
    /// Number of leaves appended.
    pub size: u64,
    /// Current root.
    pub root: B256,
    /// Pending hash per level; zero where the level is empty.
    pub partials: Vec<B256>,
}

/// Binary Merkle tree that keeps one pending subtree hash per level.
///
/// Layout: leaf count at offset `0`, pending hash of level `l` at offset `2 + l`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MerkleAccumulator {
    backing: ArbosStorage,
    size: StorageBackedU64,
}

/// Number of levels that can hold a pending hash for a tree of `size` leaves.
#[inline]
pub const fn num_partials(size: u64) -> u64 {
    log2_ceil(size)
}

fn hash_pair(left: &B256, right: &B256) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize()
}

impl MerkleAccumulator {
    /// An empty accumulator needs no writes.
    pub fn initialize<DB: StorageBackend>(
        _db: &mut DB,
        _storage: ArbosStorage,
    ) -> Result<(), DB::Error> {
        Ok(())
    }

    /// Opens the accumulator stored in `storage`.
    pub fn open(storage: ArbosStorage) -> Self {
        Self {
            backing: storage,
            size: storage.open_u64(0),
        }
    }

    /// Writes an accumulator with the given leaf count and pending hashes into `storage`.
    pub fn from_partials<DB: StorageBackend>(
        db: &mut DB,
        storage: ArbosStorage,
        size: u64,
        partials: &[B256],
    ) -> Result<Self, DB::Error> {
        let acc = Self::open(storage);
        acc.size.set(db, size)?;
        for (level, partial) in partials.iter().enumerate() {
            acc.set_partial(db, level as u64, *partial)?;
        }
        Ok(acc)
    }

    /// Number of leaves appended so far.
    pub fn size<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.size.get(db)
    }

    fn partial<DB: StorageBackend>(&self, db: &mut DB, level: u64) -> Result<B256, DB::Error> {
        self.backing.get_by_u64(db, 2 + level)
    }

    fn set_partial<DB: StorageBackend>(
        &self,
        db: &mut DB,
        level: u64,
        value: B256,
    ) -> Result<(), DB::Error> {
        self.backing.set_by_u64(db, 2 + level, value)
    }

    /// Appends a leaf and returns the interior nodes completed by it, lowest level first.
    pub fn append<DB: StorageBackend>(
        &self,
        db: &mut DB,
        item_hash: B256,
    ) -> Result<Vec<MerkleTreeNodeEvent>, DB::Error> {
        let size = self.size.increment(db)?;
        let mut events = Vec::new();
        let mut so_far = keccak256(item_hash);
        let mut level = 0;
        loop {
            if level == num_partials(size - 1) {
                self.set_partial(db, level, so_far)?;
                return Ok(events);
            }
            let this_level = self.partial(db, level)?;
            if this_level.is_zero() {
                self.set_partial(db, level, so_far)?;
                return Ok(events);
            }
            so_far = hash_pair(&this_level, &so_far);
            self.set_partial(db, level, B256::ZERO)?;
            level += 1;
            events.push(MerkleTreeNodeEvent {
                level,
                num_leaves: size - 1,
                hash: so_far,
            });
        }
    }

    /// Computes the root, padding missing right siblings with zero hashes.
    pub fn root<DB: StorageBackend>(&self, db: &mut DB) -> Result<B256, DB::Error> {
        let size = self.size(db)?;
        if size == 0 {
            return Ok(B256::ZERO);
        }

        let mut hash_so_far: Option<B256> = None;
        let mut capacity_in_hash = 0u64;
        let mut capacity = 1u64;
        for level in 0..num_partials(size) {
            let partial = self.partial(db, level)?;
            if !partial.is_zero() {
                match hash_so_far {
                    None => {
                        hash_so_far = Some(partial);
                        capacity_in_hash = capacity;
                    }
                    Some(mut hash) => {
                        while capacity_in_hash < capacity {
                            hash = hash_pair(&hash, &B256::ZERO);
                            capacity_in_hash *= 2;
                        }
                        hash_so_far = Some(hash_pair(&partial, &hash));
                        capacity_in_hash = 2 * capacity;
                    }
                }
            }
            capacity = capacity.saturating_mul(2);
        }
        Ok(hash_so_far.unwrap_or_default())
    }

    /// Returns the leaf count, root and every pending hash.
    pub fn export_state<DB: StorageBackend>(
        &self,
        db: &mut DB,
    ) -> Result<MerkleAccumulatorExportState, DB::Error> {
        let size = self.size(db)?;
        let root = self.root(db)?;
        let partials = (0..num_partials(size))
            .map(|level| self.partial(db, level))
            .collect::<Result<_, _>>()?;
        Ok(MerkleAccumulatorExportState {
            size,
            root,
            partials,
        })
    }
}
