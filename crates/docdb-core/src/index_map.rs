//! Translation from positions inside a write sub-batch to positions in the
//! caller's original batch.

use std::collections::BTreeMap;

/// Maps a zero-based position within a sub-batch to the zero-based position
/// of the same item in the outer request batch.
///
/// Contiguous maps stay in the compact range form; adding entries at a
/// non-contiguous local position switches to an explicit table. Outer
/// positions are always handed out in increasing order, so the map is
/// monotonic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexMap {
    Range {
        offset: usize,
        count: usize,
    },
    Table {
        entries: BTreeMap<usize, usize>,
        next_outer: usize,
    },
}

impl Default for IndexMap {
    fn default() -> Self {
        Self::create()
    }
}

impl IndexMap {
    /// The empty identity map starting at outer position 0.
    pub fn create() -> Self {
        Self::Range {
            offset: 0,
            count: 0,
        }
    }

    /// A map whose `size` local entries start at outer position `offset`.
    pub fn create_at(offset: usize, size: usize) -> Self {
        Self::Range {
            offset,
            count: size,
        }
    }

    /// Extend the map by `count` one-to-one entries, local positions
    /// starting at `local_offset`, outer positions continuing after the
    /// last outer position already mapped.
    ///
    /// Local positions must be added in increasing order. Positions at or
    /// below the last one already mapped are skipped and keep their entry,
    /// so a lookup on a skipped position yields `None` rather than a
    /// reordered outer position.
    pub fn add(self, count: usize, local_offset: usize) -> Self {
        match self {
            Self::Range { offset, count: len } if local_offset == len => Self::Range {
                offset,
                count: len + count,
            },
            Self::Range { offset, count: len } => {
                let entries = (0..len).map(|i| (i, offset + i)).collect();
                Self::Table {
                    entries,
                    next_outer: offset + len,
                }
                .add(count, local_offset)
            }
            Self::Table {
                mut entries,
                mut next_outer,
            } => {
                let start = entries
                    .keys()
                    .next_back()
                    .map_or(local_offset, |last| local_offset.max(last + 1));
                for local in start..local_offset + count {
                    entries.insert(local, next_outer);
                    next_outer += 1;
                }
                Self::Table {
                    entries,
                    next_outer,
                }
            }
        }
    }

    /// Outer position for a local position, or `None` if it was never mapped.
    pub fn map(&self, local: usize) -> Option<usize> {
        match self {
            Self::Range { offset, count } => (local < *count).then_some(offset + local),
            Self::Table { entries, .. } => entries.get(&local).copied(),
        }
    }

    /// Number of mapped entries.
    pub fn len(&self) -> usize {
        match self {
            Self::Range { count, .. } => *count,
            Self::Table { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_map_maps_nothing() {
        let map = IndexMap::create();
        assert!(map.is_empty());
        assert_eq!(map.map(0), None);
    }

    #[test]
    fn shifted_single_entry() {
        let map = IndexMap::create_at(7, 1);
        assert_eq!(map.map(0), Some(7));
        assert_eq!(map.map(1), None);
    }

    #[test]
    fn contiguous_adds_stay_in_range_form() {
        let map = IndexMap::create().add(2, 0).add(3, 2);
        assert!(matches!(map, IndexMap::Range { offset: 0, count: 5 }));
        assert_eq!(map.map(4), Some(4));
    }

    #[test]
    fn gap_switches_to_table() {
        // local 0..2 -> outer 10..12, then local 5 -> outer 12
        let map = IndexMap::create_at(10, 2).add(1, 5);
        assert!(matches!(map, IndexMap::Table { .. }));
        assert_eq!(map.map(0), Some(10));
        assert_eq!(map.map(1), Some(11));
        assert_eq!(map.map(5), Some(12));
        assert_eq!(map.map(2), None);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn out_of_order_add_keeps_existing_entries() {
        let map = IndexMap::create().add(3, 0).add(2, 1);
        assert_eq!(map.len(), 3);
        assert_eq!((0..3).map(|i| map.map(i)).collect::<Vec<_>>(), vec![Some(0), Some(1), Some(2)]);

        let map = IndexMap::create().add(2, 0).add(2, 5).add(3, 5);
        assert_eq!(map.map(5), Some(2));
        assert_eq!(map.map(6), Some(3));
        assert_eq!(map.map(7), Some(4));
        assert_eq!(map.len(), 5);
    }

    proptest! {
        #[test]
        fn single_unshifted_batch_is_identity(n in 0usize..500) {
            let map = IndexMap::create_at(0, 0).add(n, 0);
            for i in 0..n {
                prop_assert_eq!(map.map(i), Some(i));
            }
            prop_assert_eq!(map.map(n), None);
        }

        #[test]
        fn outer_positions_are_monotonic(
            offset in 0usize..100,
            chunks in proptest::collection::vec((1usize..5, 0usize..3), 1..10),
        ) {
            let mut map = IndexMap::create_at(offset, 0);
            let mut local = 0;
            for (count, gap) in chunks {
                local += gap;
                map = map.add(count, local);
                local += count;
            }
            let mut previous: Option<usize> = None;
            for i in 0..local {
                if let Some(outer) = map.map(i) {
                    if let Some(prev) = previous {
                        prop_assert!(outer > prev);
                    }
                    previous = Some(outer);
                }
            }
        }
    }
}
