//! Roaring-bitmap codec for the compressed integer sets stored in
//! `object_ids` / `user_ids` columns.
//!
//! The store never decodes to a dense array: union, intersection,
//! difference, membership and checked insert/remove are all provided
//! directly by `RoaringBitmap`.

use roaring::RoaringBitmap;

use crate::error::{Error, Result};

/// Compacts a set's internal containers. Must be called before every write
/// so that `to_bytes` produces the smallest stable encoding.
///
/// Unlike the CRoaring-based implementations (including the Go source this
/// store is modeled on, which calls `RunOptimize()` before `ToBytes()`),
/// the `roaring` crate has no run-container representation and no manual
/// compaction pass: a `RoaringBitmap` picks between its array and bitmap
/// container forms immediately on every insert/remove, so there is no
/// container state left to fold at serialization time. This is a no-op
/// today for that reason, not an oversight -- see DESIGN.md's bitset codec
/// entry. The call site stays in place so the codec's three-operation
/// contract holds and so this has one spot to fill in if a future
/// `roaring` release adds run containers.
pub fn optimize(set: &mut RoaringBitmap) {
    let _ = set;
}

/// Serializes a set to its on-disk byte representation. Callers must call
/// `optimize` first.
pub fn to_bytes(set: &RoaringBitmap) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(set.serialized_size());
    set.serialize_into(&mut buf).map_err(Error::CorruptBitset)?;
    Ok(buf)
}

/// Deserializes a set from its stored byte representation. An empty slice
/// decodes to an empty set (see `Store::load`, which special-cases this
/// before ever calling here).
pub fn from_bytes(bytes: &[u8]) -> Result<RoaringBitmap> {
    RoaringBitmap::deserialize_from(bytes).map_err(Error::CorruptBitset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_empty() {
        let set = RoaringBitmap::new();
        let bytes = to_bytes(&set).unwrap();
        assert_eq!(from_bytes(&bytes).unwrap(), set);
    }

    #[test]
    fn round_trip_sparse_and_dense() {
        let mut set = RoaringBitmap::new();
        for id in [1u32, 2, 3, 1_000_000, 1_000_001, 7, 4_294_967_295] {
            set.insert(id);
        }
        let mut set = set;
        optimize(&mut set);
        let bytes = to_bytes(&set).unwrap();
        assert_eq!(from_bytes(&bytes).unwrap(), set);
    }

    #[test]
    fn corrupt_payload_errors() {
        let bytes = [0xFFu8, 0x00];
        assert!(matches!(from_bytes(&bytes), Err(Error::CorruptBitset(_))));
    }

    proptest::proptest! {
        #[test]
        fn prop_round_trip(ids in proptest::collection::vec(0u32..10_000, 0..200)) {
            let mut set: RoaringBitmap = ids.into_iter().collect();
            optimize(&mut set);
            let bytes = to_bytes(&set).unwrap();
            let back = from_bytes(&bytes).unwrap();
            proptest::prop_assert_eq!(back, set);
        }
    }
}
