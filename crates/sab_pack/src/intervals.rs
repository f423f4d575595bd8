//! Size inference for tables that only store offsets.

use std::collections::{BTreeMap, BTreeSet};

/// Computes the size of every region starting at one of `offsets`.
///
/// Each region runs up to the next strictly greater offset, the last one up to `end`.
/// Repeated offsets describe the same region and yield a single entry.
///
/// ```
/// use sab_pack::intervals::interval_sizes;
///
/// let sizes = interval_sizes([100, 50, 200], 300);
/// assert_eq!(sizes.into_iter().collect::<Vec<_>>(), vec![(50, 50), (100, 100), (200, 100)]);
/// ```
pub fn interval_sizes(offsets: impl IntoIterator<Item = u64>, end: u64) -> BTreeMap<u64, u64> {
    let starts = offsets.into_iter().collect::<BTreeSet<_>>();
    let starts = starts.into_iter().collect::<Vec<_>>();

    starts
        .iter()
        .enumerate()
        .map(|(i, start)| {
            let stop = starts.get(i + 1).copied().unwrap_or(end);
            (*start, stop.saturating_sub(*start))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn sorted_gaps() {
        let sizes = interval_sizes([100, 50, 200], 300);
        assert_eq!(sizes, BTreeMap::from([(50, 50), (100, 100), (200, 100)]));
    }

    #[test]
    fn shared_offsets() {
        let sizes = interval_sizes([0, 16, 16, 40], 64);
        assert_eq!(sizes, BTreeMap::from([(0, 16), (16, 24), (40, 24)]));
        assert_eq!(sizes.values().sum::<u64>(), 64);
    }

    #[test]
    fn empty_table() {
        assert!(interval_sizes([], 10).is_empty());
    }
}
