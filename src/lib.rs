//! Randomized, partitioned set-associative cache indexing.
//!
//! The crate answers one question for the outer cache: given an address and
//! a way, which set does the pair map to? Two policies are provided, a
//! bit-hash scatter policy and a cipher-based policy gated by a partition
//! lookup cache, both built on a common geometry/grid base.

pub mod bits;
pub mod error;
pub mod indexing;
pub mod qarma;
