//! Scatter-associative indexing policy
//!
//! Maps an (address, way) pair to a set with a family of bit-hash
//! scattering functions, so the same address occupies a different set in
//! every way. Each function has an exact inverse, which lets the policy
//! regenerate an entry's address from its tag and stored position.

use log::warn;

use crate::bits::{bits, floor_log2, insert_bits};
use crate::error::{ConfigError, ConfigResult};
use crate::indexing::{CacheEntry, IndexingBase, IndexingParams, IndexingPolicy};

/// Distinct scattering functions. Ways beyond this pile up on the hash,
/// which scatters sub-optimally.
pub const NUM_SCATTERING_FUNCTIONS: u32 = 8;

#[derive(Debug)]
pub struct ScatterAssociative<E> {
    base: IndexingBase<E>,

    /// The amount to shift a set index to get its MSB.
    msb_shift: u32,
}

impl<E: CacheEntry> ScatterAssociative<E> {
    pub fn new(params: &IndexingParams) -> ConfigResult<Self> {
        let base = IndexingBase::new(params)?;

        if params.assoc > NUM_SCATTERING_FUNCTIONS {
            warn!(
                "Associativity higher than number of scattering functions. \
                 Expect sub-optimal scattering."
            );
        }

        // With two sets the MSB and LSB are the same bit and their xor is
        // always 0, so the hash stops being bijective
        if base.num_sets() <= 2 {
            return Err(ConfigError::TooFewSets);
        }
        let msb_shift = floor_log2(base.num_sets()) - 1;

        // Both halves of the scattered address must fit above the offset
        if base.set_shift() + 2 * (msb_shift + 1) > 64 {
            return Err(ConfigError::ScatterWidthOverflow);
        }

        if params.plc_size == 0 {
            return Err(ConfigError::ZeroPlcSize);
        }

        Ok(Self { base, msb_shift })
    }

    /// Seznec's hash H: shift off the LSB and set the xor of the old MSB
    /// and LSB as the new MSB. Bijective whenever the set index is wider
    /// than one bit.
    fn hash(&self, addr: u64) -> u64 {
        let lsb = bits(addr, 0, 0);
        let msb = bits(addr, self.msb_shift, self.msb_shift);
        let xor_bit = msb ^ lsb;

        insert_bits(addr >> 1, self.msb_shift, self.msb_shift, xor_bit)
    }

    /// Inverse of the hash. The original MSB sits one bit below the
    /// current MSB (the xor bit); the original LSB comes from undoing the
    /// xor.
    fn dehash(&self, addr: u64) -> u64 {
        let msb = bits(addr, self.msb_shift - 1, self.msb_shift - 1);
        let xor_bit = bits(addr, self.msb_shift, self.msb_shift);
        let lsb = msb ^ xor_bit;

        let addr_no_msb = bits(addr, self.msb_shift - 1, 0);
        insert_bits(addr_no_msb << 1, 0, 0, lsb)
    }

    /// Select and apply the scattering function for the way. The input is
    /// the address with the block offset already shifted off; its low
    /// half `addr1` holds the conventional set bits and the next half
    /// `addr2` the low tag bits.
    fn scatter(&self, addr: u64, way: u32) -> u64 {
        let mut addr1 = bits(addr, self.msb_shift, 0);
        let addr2 =
            bits(addr, 2 * (self.msb_shift + 1) - 1, self.msb_shift + 1);

        addr1 = match way % NUM_SCATTERING_FUNCTIONS {
            0 => self.hash(addr1) ^ self.hash(addr2) ^ addr2,
            1 => self.hash(addr1) ^ self.hash(addr2) ^ addr1,
            2 => self.hash(addr1) ^ self.dehash(addr2) ^ addr2,
            3 => self.hash(addr1) ^ self.dehash(addr2) ^ addr1,
            4 => self.dehash(addr1) ^ self.hash(addr2) ^ addr2,
            5 => self.dehash(addr1) ^ self.hash(addr2) ^ addr1,
            6 => self.dehash(addr1) ^ self.dehash(addr2) ^ addr2,
            7 => self.dehash(addr1) ^ self.dehash(addr2) ^ addr1,
            _ => unreachable!(),
        };

        // Ways beyond the function table pile up on the hash
        for _ in 0..way / NUM_SCATTERING_FUNCTIONS {
            addr1 = self.hash(addr1);
        }

        addr1
    }

    /// Inverse of [`scatter`] for the same way: unpile the extra hashes,
    /// then undo the selected function. The functions that folded in
    /// `addr1` are inverted by iterating the hash through its period.
    ///
    /// [`scatter`]: ScatterAssociative::scatter
    fn descatter(&self, addr: u64, way: u32) -> u64 {
        let mut addr1 = bits(addr, self.msb_shift, 0);
        let addr2 =
            bits(addr, 2 * (self.msb_shift + 1) - 1, self.msb_shift + 1);

        for _ in 0..way / NUM_SCATTERING_FUNCTIONS {
            addr1 = self.dehash(addr1);
        }

        match way % NUM_SCATTERING_FUNCTIONS {
            0 => self.dehash(addr1 ^ self.hash(addr2) ^ addr2),
            1 => {
                addr1 ^= self.hash(addr2);
                for _ in 0..self.msb_shift {
                    addr1 = self.hash(addr1);
                }
                addr1
            }
            2 => self.dehash(addr1 ^ self.dehash(addr2) ^ addr2),
            3 => {
                addr1 ^= self.dehash(addr2);
                for _ in 0..self.msb_shift {
                    addr1 = self.hash(addr1);
                }
                addr1
            }
            4 => self.hash(addr1 ^ self.hash(addr2) ^ addr2),
            5 => {
                addr1 ^= self.hash(addr2);
                for _ in 0..=self.msb_shift {
                    addr1 = self.hash(addr1);
                }
                addr1
            }
            6 => self.hash(addr1 ^ self.dehash(addr2) ^ addr2),
            7 => {
                addr1 ^= self.dehash(addr2);
                for _ in 0..=self.msb_shift {
                    addr1 = self.hash(addr1);
                }
                addr1
            }
            _ => unreachable!(),
        }
    }

    /// The set an address maps to in the given way.
    pub fn extract_set(&self, addr: u64, way: u32) -> u32 {
        (self.scatter(addr >> self.base.set_shift(), way)
            & self.base.set_mask()) as u32
    }
}

impl<E: CacheEntry> IndexingPolicy<E> for ScatterAssociative<E> {
    fn base(&self) -> &IndexingBase<E> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut IndexingBase<E> {
        &mut self.base
    }

    fn get_possible_entries(&self, addr: u64) -> Vec<&E> {
        (0..self.base.assoc())
            .map(|way| self.base.entry(self.extract_set(addr, way), way))
            .collect()
    }

    fn regenerate_addr(&self, tag: u64, entry: &E) -> u64 {
        let addr_set =
            (tag << (self.msb_shift + 1)) | entry.get_set() as u64;
        (tag << self.base.tag_shift())
            | ((self.descatter(addr_set, entry.get_way())
                & self.base.set_mask())
                << self.base.set_shift())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::Block;

    // 4 KiB, 64-byte lines, 4 ways: 16 sets, set_shift 6, tag_shift 10
    fn make_policy() -> ScatterAssociative<Block> {
        let params = IndexingParams::make(4096, 64, 4, 32);
        ScatterAssociative::new(&params).unwrap()
    }

    fn fill_grid(policy: &mut ScatterAssociative<Block>) {
        let cells =
            policy.base().num_sets() * policy.base().assoc() as u64;
        for index in 0..cells {
            policy.set_entry(Block::make(index), index);
        }
    }

    #[test]
    fn test_construction_rejects_bad_geometry() {
        // Two sets: MSB and LSB of the index coincide
        assert_eq!(
            ScatterAssociative::<Block>::new(&IndexingParams::make(
                128, 64, 1, 32
            ))
            .unwrap_err(),
            ConfigError::TooFewSets
        );
        assert_eq!(
            ScatterAssociative::<Block>::new(&IndexingParams::make(
                4096, 64, 4, 0
            ))
            .unwrap_err(),
            ConfigError::ZeroPlcSize
        );
        // 8192 sets of 2^40-byte lines: 40 + 2 * 13 bits needed
        assert_eq!(
            ScatterAssociative::<Block>::new(&IndexingParams::make(
                1 << 53,
                1 << 40,
                1,
                32
            ))
            .unwrap_err(),
            ConfigError::ScatterWidthOverflow
        );
    }

    #[test]
    fn test_hash_bijectivity() {
        let policy = make_policy();
        // All 4-bit set indices
        for x in 0..16_u64 {
            assert_eq!(policy.dehash(policy.hash(x)), x);
            assert_eq!(policy.hash(policy.dehash(x)), x);
        }
        // hash must move something
        assert!((0..16_u64).any(|x| policy.hash(x) != x));
    }

    #[test]
    fn test_scatter_roundtrip_all_cases() {
        let policy = make_policy();
        let width = 2 * (policy.msb_shift + 1);

        // Every 8-bit (addr1, addr2) pair, ways covering the function
        // table and two pile-up levels
        for addr in 0..(1_u64 << width) {
            for way in 0..24 {
                let scattered = policy.scatter(addr, way);
                let composed =
                    insert_bits(addr, policy.msb_shift, 0, scattered);
                assert_eq!(
                    policy.descatter(composed, way),
                    bits(addr, policy.msb_shift, 0),
                    "addr {:#x} way {}",
                    addr,
                    way
                );
            }
        }
    }

    #[test]
    fn test_extract_set_in_range() {
        let policy = make_policy();
        for addr in (0..0x40000_u64).step_by(64) {
            for way in 0..4 {
                assert!((policy.extract_set(addr, way) as u64) < 16);
            }
        }
    }

    #[test]
    fn test_ways_scatter_differently() {
        let policy = make_policy();
        // Not guaranteed for every address, but this one separates
        let addr = 0x1000;
        let sets: Vec<u32> =
            (0..4).map(|way| policy.extract_set(addr, way)).collect();
        assert!(sets.iter().any(|&s| s != sets[0]));
    }

    #[test]
    fn test_possible_entries_and_regeneration() {
        let mut policy = make_policy();
        fill_grid(&mut policy);

        let addr = 0x1000;
        let tag = policy.extract_tag(addr);
        assert_eq!(tag, addr >> 10);

        let entries = policy.get_possible_entries(addr);
        assert_eq!(entries.len(), 4);

        for (way, entry) in entries.iter().enumerate() {
            assert_eq!(entry.get_way(), way as u32);
            assert_eq!(entry.get_set(), policy.extract_set(addr, way as u32));

            // The offset bits are gone; everything above them comes back
            let regenerated = policy.regenerate_addr(tag, entry);
            assert_eq!(regenerated, addr);
        }
    }

    #[test]
    fn test_regeneration_drops_offset_only() {
        let mut policy = make_policy();
        fill_grid(&mut policy);

        for addr in [0x12f7_u64, 0xdead_beef, 0xffff_ffc1] {
            for way in 0..4 {
                let set = policy.extract_set(addr, way);
                let entry = policy.get_entry(set, way);
                let regenerated =
                    policy.regenerate_addr(policy.extract_tag(addr), entry);
                assert_eq!(regenerated, addr & !0x3f, "addr {:#x}", addr);
            }
        }
    }

    #[test]
    fn test_sector_interface_is_disabled() {
        let mut policy = make_policy();
        assert!(policy.get_sector_sets(0).is_empty());
        assert!(!policy.access_sector(0));
        assert_eq!(policy.get_victim_sector(&[1, 2, 3]), -1);
    }
}
