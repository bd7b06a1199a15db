//! Indexing policy interface and the shared geometry/grid base

pub mod dscp;
pub mod plc;
pub mod scatter_associative;

use log::warn;

use crate::bits::{floor_log2, is_pow_2};
use crate::error::{ConfigError, ConfigResult};
use crate::indexing::plc::Plc;

/// Capability set required of the entries held by the backing grid. The
/// outer cache creates entries and hands them over exactly once via
/// `set_entry`; afterwards the grid cell is their home and they report the
/// position they were informed of.
pub trait CacheEntry {
    /// Inform the entry of its position in the grid.
    fn set_position(&mut self, set: u32, way: u32);

    fn get_set(&self) -> u32;

    fn get_way(&self) -> u32;

    /// Whether the entry currently holds live data. Invalid entries still
    /// occupy their grid cell.
    fn is_valid(&self) -> bool;
}

/// A minimal cache block: a tag plus a valid flag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub tag: u64,
    pub valid: bool,

    set: u32,
    way: u32,
}

impl Block {
    /// Make a valid block with the given tag,
    /// usually when filling a line with fetched data
    pub fn make(tag: u64) -> Self {
        Self { tag, valid: true, set: 0, way: 0 }
    }
}

impl CacheEntry for Block {
    fn set_position(&mut self, set: u32, way: u32) {
        self.set = set;
        self.way = way;
    }

    fn get_set(&self) -> u32 {
        self.set
    }

    fn get_way(&self) -> u32 {
        self.way
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Geometry and capacity knobs recognized by every indexing policy.
#[derive(Clone, Copy, Debug)]
pub struct IndexingParams {
    /// Total cache bytes.
    pub size: u64,
    /// Bytes per line. Must be a power of two.
    pub entry_size: u64,
    /// Ways per set.
    pub assoc: u32,
    /// Upper bound on live PLC mappings.
    pub plc_size: u32,
}

impl Default for IndexingParams {
    fn default() -> Self {
        Self::make(16 * 1024, 64, 4, 32)
    }
}

impl IndexingParams {
    pub fn make(size: u64, entry_size: u64, assoc: u32, plc_size: u32) -> Self {
        Self { size, entry_size, assoc, plc_size }
    }
}

/// Shared state of all indexing policies: derived geometry, the backing
/// grid of entries, and the partition lookup cache.
///
/// The grid is `num_sets` rows of `assoc` cells. Cells start unfilled;
/// `set_entry` fills them and the grid owns the entries from then on.
#[derive(Debug)]
pub struct IndexingBase<E> {
    assoc: u32,
    num_sets: u64,
    set_shift: u32,
    set_mask: u64,
    tag_shift: u32,

    sets: Vec<Vec<Option<E>>>,

    plc: Plc,
}

impl<E: CacheEntry> IndexingBase<E> {
    /// Derive and validate the geometry. All failures here are final;
    /// there is no partially-built policy.
    pub fn new(params: &IndexingParams) -> ConfigResult<Self> {
        if params.assoc == 0 {
            return Err(ConfigError::ZeroAssociativity);
        }
        if !is_pow_2(params.entry_size) {
            return Err(ConfigError::EntrySizeNotPowerOfTwo);
        }

        let num_sets = params.size / (params.entry_size * params.assoc as u64);
        if !is_pow_2(num_sets) {
            return Err(ConfigError::SetsNotPowerOfTwo);
        }

        let set_shift = floor_log2(params.entry_size);
        let set_mask = num_sets - 1;
        let tag_shift = set_shift + floor_log2(num_sets);

        // The PLC keys on at most 12 set bits
        if set_mask > 0xfff {
            warn!(
                "set mask {:#x} is wider than the PLC address field; \
                 expect PLC aliasing across sets",
                set_mask
            );
        }

        let mut sets = Vec::with_capacity(num_sets as usize);
        for _ in 0..num_sets {
            sets.push((0..params.assoc).map(|_| None).collect());
        }

        Ok(Self {
            assoc: params.assoc,
            num_sets,
            set_shift,
            set_mask,
            tag_shift,
            sets,
            plc: Plc::new(params.plc_size as usize, set_shift, set_mask & 0xfff),
        })
    }

    pub fn assoc(&self) -> u32 {
        self.assoc
    }

    pub fn num_sets(&self) -> u64 {
        self.num_sets
    }

    pub fn set_shift(&self) -> u32 {
        self.set_shift
    }

    pub fn set_mask(&self) -> u64 {
        self.set_mask
    }

    pub fn tag_shift(&self) -> u32 {
        self.tag_shift
    }

    pub fn plc(&self) -> &Plc {
        &self.plc
    }

    pub fn plc_mut(&mut self) -> &mut Plc {
        &mut self.plc
    }

    /// Get an entry based on its set and way. The entry must have been
    /// installed already; an out-of-range position or an unfilled cell is
    /// a programming error.
    pub fn entry(&self, set: u32, way: u32) -> &E {
        assert!(
            (set as u64) < self.num_sets && way < self.assoc,
            "set or way out of range"
        );
        self.sets[set as usize][way as usize]
            .as_ref()
            .expect("entry has not been set")
    }

    pub fn entry_mut(&mut self, set: u32, way: u32) -> &mut E {
        assert!(
            (set as u64) < self.num_sets && way < self.assoc,
            "set or way out of range"
        );
        self.sets[set as usize][way as usize]
            .as_mut()
            .expect("entry has not been set")
    }

    /// Move an entry into the cell addressed by its linear index and
    /// inform it of its position.
    pub fn install(&mut self, mut entry: E, index: u64) {
        let set = index / self.assoc as u64;
        let way = (index % self.assoc as u64) as u32;

        assert!(set < self.num_sets, "entry index out of range");

        entry.set_position(set as u32, way);
        self.sets[set as usize][way as usize] = Some(entry);
    }

    pub fn extract_tag(&self, addr: u64) -> u64 {
        addr >> self.tag_shift
    }
}

/// Interface implemented by every concrete indexing policy.
///
/// The grid bookkeeping (`get_entry`, `set_entry`) and the default tag
/// split are provided; a policy supplies the `(address, way) -> set`
/// mapping and its inverse. The sector operations default to the
/// PLC-disabled behavior and are overridden by partitioned policies.
pub trait IndexingPolicy<E: CacheEntry> {
    fn base(&self) -> &IndexingBase<E>;

    fn base_mut(&mut self) -> &mut IndexingBase<E>;

    /// Find the candidate entries an address may occupy, one per way.
    /// Partitioned policies return an empty list when the address has no
    /// sector mapping yet; the caller must install one and retry.
    fn get_possible_entries(&self, addr: u64) -> Vec<&E>;

    /// Reconstruct an entry's address from its tag and stored position.
    fn regenerate_addr(&self, tag: u64, entry: &E) -> u64;

    fn get_entry(&self, set: u32, way: u32) -> &E {
        self.base().entry(set, way)
    }

    fn get_entry_mut(&mut self, set: u32, way: u32) -> &mut E {
        self.base_mut().entry_mut(set, way)
    }

    /// Associate an entry with the position encoded by a linear index
    /// (`set * assoc + way`).
    fn set_entry(&mut self, entry: E, index: u64) {
        self.base_mut().install(entry, index);
    }

    fn extract_tag(&self, addr: u64) -> u64 {
        self.base().extract_tag(addr)
    }

    /// All valid entries in the sector's band of sets. Policies without
    /// partitioning own no sectors.
    fn get_sector_sets(&self, _sec_id: i32) -> Vec<&E> {
        Vec::new()
    }

    /// Update a sector's replacement data on access. Returns whether the
    /// PLC is in use; the default policy has it disabled.
    fn access_sector(&mut self, _sec_id: i32) -> bool {
        false
    }

    /// Pick a sector to evict given per-sector contribution counts.
    fn get_victim_sector(&self, _contributions: &[u64]) -> i32 {
        -1
    }
}
