//! Partition lookup cache
//!
//! A small fully-associative table mapping an address-derived field to the
//! sector that owns the address. The PLC has its own capacity bound and
//! replacement discipline, independent of the cache grid it routes for.

use std::collections::BTreeMap;

/// Wrap-around bound for the recency counter.
const MAX_COUNT: u32 = 0x10000;

/// Live-mapping capacity installed by `init_sectors`.
const SECTOR_CAPACITY: usize = 0x1000 - 1;

/// Counter band used by the demotion-aware access mode.
const DEMOTE_STEP: u32 = 1024;
const FRESH_WINDOW: u32 = 2048;

/// Mapping from address fields to sector ids, with recency stamps for LRU
/// eviction and one second-chance bit per sector.
///
/// A miss is the in-band value `-1`, never an error; the caller reacts by
/// choosing a sector and installing a mapping. Ordered maps keep victim
/// selection deterministic when stamps tie.
#[derive(Debug)]
pub struct Plc {
    capacity: usize,

    /// Address-field derivation: `(addr >> set_shift) & field_mask`.
    set_shift: u32,
    field_mask: u64,

    /// Total number of logical sectors; zero until `init_sectors`.
    p_sectors: u32,

    m: BTreeMap<u64, i32>,
    ts: BTreeMap<u64, u32>,
    count: u32,

    sc: Vec<bool>,
}

impl Plc {
    pub fn new(capacity: usize, set_shift: u32, field_mask: u64) -> Self {
        Self {
            capacity,
            set_shift,
            field_mask,
            p_sectors: 0,
            m: BTreeMap::new(),
            ts: BTreeMap::new(),
            count: 0,
            sc: Vec::new(),
        }
    }

    /// The PLC key for an address.
    pub fn addr_field(&self, addr: u64) -> u64 {
        (addr >> self.set_shift) & self.field_mask
    }

    pub fn is_full(&self) -> bool {
        self.m.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.m.is_empty()
    }

    pub fn p_sectors(&self) -> u32 {
        self.p_sectors
    }

    /// One-shot sector configuration: fixes the mapping capacity, resets
    /// the recency counter and drops every live mapping and stamp.
    pub fn init_sectors(&mut self, p_sectors: u32) {
        self.p_sectors = p_sectors;
        self.count = 0;
        self.capacity = SECTOR_CAPACITY;
        self.m.clear();
        self.ts.clear();
        self.sc = vec![false; p_sectors as usize];
    }

    /// The sector owning the address, or -1 when unmapped.
    pub fn get_sector(&self, addr: u64) -> i32 {
        let field = self.addr_field(addr);
        self.m.get(&field).copied().unwrap_or(-1)
    }

    /// Map the address's field to a sector, overwriting any previous
    /// owner (sector reassignment). Returns false iff `sec_id` is
    /// negative. Installing a mapping marks the sector's second-chance
    /// bit.
    pub fn set_plc_entry(&mut self, addr: u64, sec_id: i32) -> bool {
        if sec_id < 0 {
            return false;
        }
        assert!((sec_id as u32) < self.p_sectors, "sector id out of range");

        let field = self.addr_field(addr);
        self.m.insert(field, sec_id);
        self.sc[sec_id as usize] = true;
        true
    }

    /// Drop the mapping and the recency stamp for an address field.
    pub fn delete_plc_entry(&mut self, addr_field: u64) {
        self.m.remove(&addr_field);
        self.ts.remove(&addr_field);
    }

    /// Purge every mapping owned by a sector and clear its second-chance
    /// bit. Collects first, erases second. Returns whether any mapping
    /// was removed.
    pub fn delete_sector_entries(&mut self, sec_id: i32) -> bool {
        if sec_id < 0 {
            return false;
        }

        let fields: Vec<u64> = self
            .m
            .iter()
            .filter(|&(_, &sec)| sec == sec_id)
            .map(|(&field, _)| field)
            .collect();
        for field in &fields {
            self.m.remove(field);
            self.ts.remove(field);
        }

        if let Some(sc) = self.sc.get_mut(sec_id as usize) {
            *sc = false;
        }
        !fields.is_empty()
    }

    /// The least recently used mapping's address field, or None when the
    /// PLC holds nothing. Mappings that were never stamped count as older
    /// than any stamped one; ties fall to the lowest field.
    pub fn get_victim_entry(&self) -> Option<u64> {
        let mut victim: Option<(u64, Option<u32>)> = None;
        for &field in self.m.keys() {
            let stamp = self.ts.get(&field).copied();
            match victim {
                Some((_, best)) if best <= stamp => {}
                _ => victim = Some((field, stamp)),
            }
        }
        victim.map(|(field, _)| field)
    }

    /// Stamp the address field with the current counter value.
    pub fn access_sector(&mut self, addr: u64) {
        let field = self.addr_field(addr);
        let stamp = self.call_counter();
        self.ts.insert(field, stamp);
    }

    /// Demotion-aware stamp update: a low-priority access is pushed back
    /// one step and does not freshen a field touched within the current
    /// window.
    pub fn access_sector_low(&mut self, addr: u64, is_low: bool) {
        let field = self.addr_field(addr);
        let mut stamp = self.call_counter();
        if is_low && stamp >= DEMOTE_STEP {
            stamp -= DEMOTE_STEP;
        }

        match self.ts.get(&field).copied() {
            Some(old) if old >= stamp && old < stamp + FRESH_WINDOW => {}
            _ => {
                self.ts.insert(field, stamp);
            }
        }
    }

    pub fn get_sc(&self, sec_id: i32) -> bool {
        assert!(
            sec_id >= 0 && (sec_id as u32) < self.p_sectors,
            "sector id out of range"
        );
        self.sc[sec_id as usize]
    }

    pub fn set_sc(&mut self, sec_id: i32, value: bool) {
        assert!(
            sec_id >= 0 && (sec_id as u32) < self.p_sectors,
            "sector id out of range"
        );
        self.sc[sec_id as usize] = value;
    }

    /// Post-increment the wrap-around call counter.
    fn call_counter(&mut self) -> u32 {
        let count = self.count;
        self.count = (self.count + 1) % MAX_COUNT;
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // set_shift 6, 6 set bits, as in a 16 KiB / 64 B / 4-way geometry
    fn make_plc() -> Plc {
        let mut plc = Plc::new(32, 6, 0x3f);
        plc.init_sectors(8);
        plc
    }

    #[test]
    fn test_addr_field() {
        let plc = Plc::new(32, 6, 0xfff);
        assert_eq!(plc.addr_field(0), 0);
        assert_eq!(plc.addr_field(1 << 6), 1);
        assert_eq!(plc.addr_field(0xabc << 6), 0xabc);
        // Bits above the field mask are ignored
        assert_eq!(plc.addr_field(0x5_abc << 6), 0xabc);
    }

    #[test]
    fn test_miss_install_hit() {
        let mut plc = make_plc();
        let addr = 0x1540;

        assert_eq!(plc.get_sector(addr), -1);
        assert!(plc.set_plc_entry(addr, 3));
        assert_eq!(plc.get_sector(addr), 3);

        // Negative ids are rejected without touching the table
        assert!(!plc.set_plc_entry(addr, -1));
        assert_eq!(plc.get_sector(addr), 3);
    }

    #[test]
    fn test_sector_reassignment() {
        let mut plc = make_plc();
        let addr = 0x80;

        assert!(plc.set_plc_entry(addr, 2));
        assert!(plc.set_plc_entry(addr, 5));
        assert_eq!(plc.get_sector(addr), 5);
        assert_eq!(plc.len(), 1);
    }

    #[test]
    fn test_delete_plc_entry() {
        let mut plc = make_plc();
        let addr = 0x80;

        plc.set_plc_entry(addr, 1);
        plc.access_sector(addr);
        let field = plc.addr_field(addr);
        assert!(plc.ts.contains_key(&field));

        plc.delete_plc_entry(field);
        assert_eq!(plc.get_sector(addr), -1);
        assert!(!plc.ts.contains_key(&field));
    }

    #[test]
    fn test_capacity_after_init() {
        let mut plc = Plc::new(2, 6, 0xfff);
        plc.init_sectors(8);

        for i in 0..0xfff_u64 {
            assert!(!plc.is_full());
            plc.set_plc_entry(i << 6, (i % 8) as i32);
        }
        assert_eq!(plc.len(), 0xfff);
        assert!(plc.is_full());
    }

    #[test]
    fn test_lru_victim() {
        let mut plc = Plc::new(32, 6, 0xfff);
        plc.init_sectors(8);

        // Fill to capacity, touching each mapping in order
        for i in 0..0xfff_u64 {
            let addr = i << 6;
            plc.set_plc_entry(addr, (i % 8) as i32);
            plc.access_sector(addr);
        }
        assert!(plc.is_full());

        // The first-touched field is the LRU victim
        assert_eq!(plc.get_victim_entry(), Some(plc.addr_field(0)));

        // Refreshing it moves the victim to the next-oldest
        plc.access_sector(0);
        assert_eq!(plc.get_victim_entry(), Some(plc.addr_field(1 << 6)));

        // Deleting the victim converges on the following field
        plc.delete_plc_entry(plc.addr_field(1 << 6));
        assert_eq!(plc.get_victim_entry(), Some(plc.addr_field(2 << 6)));
    }

    #[test]
    fn test_unstamped_mapping_is_oldest() {
        let mut plc = make_plc();

        plc.set_plc_entry(0x100, 1);
        plc.access_sector(0x100);
        // Mapped but never accessed
        plc.set_plc_entry(0x200, 2);

        assert_eq!(plc.get_victim_entry(), Some(plc.addr_field(0x200)));
        assert_eq!(plc.get_victim_entry(), Some(plc.addr_field(0x200)));
    }

    #[test]
    fn test_victim_on_empty() {
        let plc = make_plc();
        assert_eq!(plc.get_victim_entry(), None);
    }

    #[test]
    fn test_access_sector_low_inside_window() {
        let mut plc = make_plc();
        let addr = 0x40;
        let field = plc.addr_field(addr);

        // Drive the counter well past the demotion step
        for _ in 0..1500 {
            plc.call_counter();
        }

        plc.access_sector(addr);
        let fresh = plc.ts[&field];
        assert_eq!(fresh, 1500);

        // The demoted stamp (1501 - 1024) lands inside the fresh window,
        // so the low-priority access must not refresh the entry
        plc.access_sector_low(addr, true);
        assert_eq!(plc.ts[&field], fresh);

        // A high-priority access through the same entry point does
        plc.access_sector_low(addr, false);
        assert_eq!(plc.ts[&field], 1502);
    }

    #[test]
    fn test_access_sector_low_stale_entry() {
        let mut plc = make_plc();
        let addr = 0x40;
        let field = plc.addr_field(addr);

        plc.access_sector(addr);
        assert_eq!(plc.ts[&field], 0);

        for _ in 0..4000 {
            plc.call_counter();
        }

        // Stamp 0 is outside [c, c + window) for c = 4001 - 1024, so even
        // a low-priority access refreshes it
        plc.access_sector_low(addr, true);
        assert_eq!(plc.ts[&field], 4001 - 1024);
    }

    #[test]
    fn test_counter_wraps() {
        let mut plc = make_plc();
        for _ in 0..MAX_COUNT - 1 {
            plc.call_counter();
        }
        assert_eq!(plc.call_counter(), MAX_COUNT - 1);
        assert_eq!(plc.call_counter(), 0);
    }

    #[test]
    fn test_delete_sector_entries() {
        let mut plc = make_plc();

        plc.set_plc_entry(0x040, 1);
        plc.set_plc_entry(0x080, 2);
        plc.set_plc_entry(0x0c0, 1);
        plc.access_sector(0x040);

        assert!(plc.get_sc(1));
        assert!(plc.delete_sector_entries(1));
        assert_eq!(plc.get_sector(0x040), -1);
        assert_eq!(plc.get_sector(0x0c0), -1);
        assert_eq!(plc.get_sector(0x080), 2);
        assert!(plc.ts.is_empty());
        assert!(!plc.get_sc(1));

        // Nothing left to purge
        assert!(!plc.delete_sector_entries(1));
        assert!(!plc.delete_sector_entries(-1));
    }

    #[test]
    fn test_second_chance_bits() {
        let mut plc = make_plc();

        assert!(!plc.get_sc(3));
        plc.set_plc_entry(0x40, 3);
        assert!(plc.get_sc(3));
        plc.set_sc(3, false);
        assert!(!plc.get_sc(3));
    }

    #[test]
    #[should_panic(expected = "sector id out of range")]
    fn test_set_plc_entry_sector_out_of_range() {
        let mut plc = make_plc();
        plc.set_plc_entry(0x40, 8);
    }
}
