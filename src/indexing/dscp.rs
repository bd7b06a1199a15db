//! Partitioned scatter indexing policy (DSCP)
//!
//! Routes each address to a sector-owned band of sets via the partition
//! lookup cache, then picks the set inside the band by encrypting the
//! index bits with QARMA-64, tweaked by the tag bits and the way. An
//! address without a sector mapping has no placement at all until the
//! caller installs one.

use crate::bits::floor_log2;
use crate::error::{ConfigError, ConfigResult};
use crate::indexing::{CacheEntry, IndexingBase, IndexingParams, IndexingPolicy};
use crate::qarma::{Qarma64, SboxVariant};

/// Encryption rounds used for set scattering.
pub const NUM_ENC_ROUNDS: usize = 5;

/// Default cipher keys.
const W0: u64 = 0x84be85ce9804e94b;
const K0: u64 = 0xec2802d4e0a488e9;

#[derive(Debug)]
pub struct Dscp<E> {
    base: IndexingBase<E>,

    cipher: Qarma64,

    /// Sets per sector; zero until `init_sectors`.
    sect_sets: u64,
}

impl<E: CacheEntry> Dscp<E> {
    /// Construct with the reference cipher keys and S-box.
    pub fn new(params: &IndexingParams) -> ConfigResult<Self> {
        Self::with_cipher(params, W0, K0, SboxVariant::default())
    }

    pub fn with_cipher(
        params: &IndexingParams,
        w0: u64,
        k0: u64,
        sbox: SboxVariant,
    ) -> ConfigResult<Self> {
        let base = IndexingBase::new(params)?;

        // Same index-width constraints as the bit-hash scattering
        if base.num_sets() <= 2 {
            return Err(ConfigError::TooFewSets);
        }
        let msb_shift = floor_log2(base.num_sets()) - 1;
        if base.set_shift() + 2 * (msb_shift + 1) > 64 {
            return Err(ConfigError::ScatterWidthOverflow);
        }

        if params.plc_size == 0 {
            return Err(ConfigError::ZeroPlcSize);
        }

        Ok(Self {
            base,
            cipher: Qarma64::with_sbox(w0, k0, sbox),
            sect_sets: 0,
        })
    }

    /// Configure the sector partitioning. One-shot: drops every PLC
    /// mapping.
    pub fn init_sectors(&mut self, p_sectors: u32) -> ConfigResult<()> {
        if p_sectors == 0 || self.base.num_sets() % p_sectors as u64 != 0 {
            return Err(ConfigError::InvalidSectorCount);
        }

        self.sect_sets = self.base.num_sets() / p_sectors as u64;
        self.base.plc_mut().init_sectors(p_sectors);
        Ok(())
    }

    /// Encrypt the index bits of an offset-stripped address; the tag bits
    /// and the way form the tweak, which blunts birthday-bound index
    /// collisions compared to enciphering the whole address.
    fn scatter(&self, addr: u64, way: u32) -> u64 {
        let index_bits = addr & self.base.set_mask();
        let tweak = (addr & !self.base.set_mask()) | way as u64;
        self.cipher.enc(index_bits, tweak, NUM_ENC_ROUNDS)
    }

    /// The set for an address in a known sector.
    fn set_in_sector(&self, addr: u64, sec_id: u32, way: u32) -> u32 {
        let scattered = self.scatter(addr >> self.base.set_shift(), way);
        (sec_id as u64 * self.sect_sets + scattered % self.sect_sets) as u32
    }

    /// The set an address maps to in the given way, or None while the
    /// address has no sector mapping.
    pub fn extract_set(&self, addr: u64, way: u32) -> Option<u32> {
        let sec_id = self.base.plc().get_sector(addr);
        if sec_id < 0 {
            return None;
        }
        Some(self.set_in_sector(addr, sec_id as u32, way))
    }
}

impl<E: CacheEntry> IndexingPolicy<E> for Dscp<E> {
    fn base(&self) -> &IndexingBase<E> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut IndexingBase<E> {
        &mut self.base
    }

    /// The candidate list is empty exactly when the PLC misses; the
    /// caller must install a mapping and retry.
    fn get_possible_entries(&self, addr: u64) -> Vec<&E> {
        let sec_id = self.base.plc().get_sector(addr);
        if sec_id < 0 {
            return Vec::new();
        }

        (0..self.base.assoc())
            .map(|way| {
                self.base
                    .entry(self.set_in_sector(addr, sec_id as u32, way), way)
            })
            .collect()
    }

    /// The stored tag keeps everything above the block offset, so the
    /// address comes back without inverting the cipher.
    fn regenerate_addr(&self, tag: u64, _entry: &E) -> u64 {
        tag << self.base.set_shift()
    }

    fn extract_tag(&self, addr: u64) -> u64 {
        addr >> self.base.set_shift()
    }

    fn get_sector_sets(&self, sec_id: i32) -> Vec<&E> {
        let mut entries = Vec::new();
        if sec_id < 0 {
            return entries;
        }

        let first = sec_id as u64 * self.sect_sets;
        for set in first..first + self.sect_sets {
            for way in 0..self.base.assoc() {
                let entry = self.base.entry(set as u32, way);
                if entry.is_valid() {
                    entries.push(entry);
                }
            }
        }
        entries
    }

    /// The PLC is enabled; sector-hotness promotion is an extension
    /// point.
    fn access_sector(&mut self, _sec_id: i32) -> bool {
        true
    }

    /// A sector whose second-chance bit is clear is evicted outright;
    /// otherwise the smallest contributor loses.
    fn get_victim_sector(&self, contributions: &[u64]) -> i32 {
        let mut min_contr = u64::MAX;
        let mut victim = -1;
        for (i, &contr) in contributions.iter().enumerate() {
            if !self.base.plc().get_sc(i as i32) {
                return i as i32;
            }
            if contr < min_contr {
                min_contr = contr;
                victim = i as i32;
            }
        }
        victim
    }
}
