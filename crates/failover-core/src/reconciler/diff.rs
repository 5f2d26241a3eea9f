//! Gap detection and range planning
//!
//! Pure functions over the unit-count maps the datastore adapters return.
//! No I/O in here: gap detection and range planning stay testable on
//! plain maps.

use std::collections::BTreeMap;

/// A unit whose destination copy is behind the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gap {
    /// Unit key within its collection
    pub unit: String,
    /// Source-side count
    pub source: u64,
    /// Destination-side count
    pub dest: u64,
}

/// Exact-row gaps: every source unit whose destination count is lower.
///
/// A unit absent from the destination counts as zero, so brand-new
/// partitions on the active side surface as gaps rather than being
/// silently skipped.
pub fn exact_gaps(source: &BTreeMap<String, u64>, dest: &BTreeMap<String, u64>) -> Vec<Gap> {
    source
        .iter()
        .filter_map(|(unit, &source_count)| {
            let dest_count = dest.get(unit).copied().unwrap_or(0);
            (dest_count < source_count).then(|| Gap {
                unit: unit.clone(),
                source: source_count,
                dest: dest_count,
            })
        })
        .collect()
}

/// Ratio gaps for count-bucketed units: buckets where the destination has
/// less than `threshold` of the source's samples. Buckets with an empty
/// source are never gaps. Keys are bucket start timestamps.
pub fn ratio_gaps(
    source: &BTreeMap<u64, u64>,
    dest: &BTreeMap<u64, u64>,
    threshold: f64,
) -> Vec<u64> {
    let mut gaps: Vec<u64> = source
        .iter()
        .filter(|&(_, &source_count)| source_count > 0)
        .filter(|&(ts, &source_count)| {
            let dest_count = dest.get(ts).copied().unwrap_or(0);
            (dest_count as f64) / (source_count as f64) < threshold
        })
        .map(|(&ts, _)| ts)
        .collect();
    gaps.sort_unstable();
    gaps
}

/// Merge sorted gap timestamps into contiguous `[start, end)` ranges,
/// where each timestamp covers the bucket `[t, t + step)`.
pub fn merge_consecutive(timestamps: &[u64], step: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let Some(&first) = timestamps.first() else {
        return ranges;
    };

    let mut start = first;
    let mut end = first + step;

    for &ts in &timestamps[1..] {
        if ts <= end {
            end = ts + step;
        } else {
            ranges.push((start, end));
            start = ts;
            end = ts + step;
        }
    }

    ranges.push((start, end));
    ranges
}

/// Split one range into chunks of at most `max_span` seconds
pub fn chunk_range(start: u64, end: u64, max_span: u64) -> Vec<(u64, u64)> {
    let mut chunks = Vec::new();
    if max_span == 0 {
        chunks.push((start, end));
        return chunks;
    }

    let mut chunk_start = start;
    while chunk_start < end {
        let chunk_end = (chunk_start + max_span).min(end);
        chunks.push((chunk_start, chunk_end));
        chunk_start = chunk_end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn counts(pairs: &[(&str, u64)]) -> BTreeMap<String, u64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn exact_gap_when_dest_is_behind() {
        let source = counts(&[("20240102", 1000)]);
        let dest = counts(&[("20240102", 600)]);

        let gaps = exact_gaps(&source, &dest);
        assert_eq!(
            gaps,
            vec![Gap {
                unit: "20240102".to_string(),
                source: 1000,
                dest: 600,
            }]
        );
    }

    #[test]
    fn exact_gap_for_missing_dest_unit() {
        let source = counts(&[("20240101", 10), ("20240102", 20)]);
        let dest = counts(&[("20240101", 10)]);

        let gaps = exact_gaps(&source, &dest);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].unit, "20240102");
        assert_eq!(gaps[0].dest, 0);
    }

    #[test]
    fn exact_no_gap_when_dest_matches_or_leads() {
        let source = counts(&[("a", 10), ("b", 5)]);
        let dest = counts(&[("a", 10), ("b", 7), ("c", 3)]);
        assert!(exact_gaps(&source, &dest).is_empty());
    }

    #[test]
    fn ratio_gap_below_threshold() {
        let source: BTreeMap<u64, u64> = [(100, 1000), (400, 1000)].into();
        let dest: BTreeMap<u64, u64> = [(100, 950), (400, 500)].into();

        assert_eq!(ratio_gaps(&source, &dest, 0.9), vec![400]);
    }

    #[test]
    fn ratio_ignores_empty_source_buckets() {
        let source: BTreeMap<u64, u64> = [(100, 0)].into();
        let dest: BTreeMap<u64, u64> = BTreeMap::new();
        assert!(ratio_gaps(&source, &dest, 0.9).is_empty());
    }

    #[test]
    fn merge_keeps_step_spaced_timestamps_contiguous() {
        // step == spacing, so all four buckets form one run each.
        let ranges = merge_consecutive(&[100, 400, 700, 1000], 300);
        assert_eq!(ranges, vec![(100, 1300)]);
    }

    #[test]
    fn merge_splits_on_real_holes() {
        let ranges = merge_consecutive(&[100, 400, 2000], 300);
        assert_eq!(ranges, vec![(100, 700), (2000, 2300)]);
    }

    #[test]
    fn merge_of_empty_input_is_empty() {
        assert!(merge_consecutive(&[], 300).is_empty());
    }

    #[test]
    fn merge_then_chunk_yields_step_sized_adjacent_ranges() {
        let merged = merge_consecutive(&[100, 400, 700, 1000], 300);
        let chunks: Vec<(u64, u64)> = merged
            .into_iter()
            .flat_map(|(start, end)| chunk_range(start, end, 300))
            .collect();
        assert_eq!(chunks, vec![(100, 400), (400, 700), (700, 1000), (1000, 1300)]);
    }

    #[test]
    fn chunking_respects_max_span() {
        assert_eq!(chunk_range(0, 1000, 300), vec![(0, 300), (300, 600), (600, 900), (900, 1000)]);
        assert_eq!(chunk_range(0, 200, 300), vec![(0, 200)]);
        assert!(chunk_range(100, 100, 300).is_empty());
    }

    proptest! {
        /// Merged ranges cover exactly the buckets in the input: every
        /// input bucket `[t, t+step)` lies inside some range, and every
        /// range boundary is bucket-aligned with no bucket outside the
        /// input.
        #[test]
        fn merge_covers_exactly_the_input_buckets(
            starts in proptest::collection::btree_set(0u64..10_000, 0..50),
            step in 1u64..400,
        ) {
            let timestamps: Vec<u64> = starts.iter().map(|&s| s * step).collect();
            let ranges = merge_consecutive(&timestamps, step);

            // Every input bucket is covered by exactly one range.
            for &ts in &timestamps {
                let covering = ranges
                    .iter()
                    .filter(|&&(start, end)| start <= ts && ts + step <= end)
                    .count();
                prop_assert_eq!(covering, 1);
            }

            // Ranges contain no bucket outside the input.
            let input: std::collections::BTreeSet<u64> = timestamps.iter().copied().collect();
            for &(start, end) in &ranges {
                prop_assert_eq!((end - start) % step, 0);
                let mut bucket = start;
                while bucket < end {
                    prop_assert!(input.contains(&bucket));
                    bucket += step;
                }
            }
        }

        #[test]
        fn chunks_partition_their_range(start in 0u64..10_000, len in 1u64..5_000, max_span in 1u64..700) {
            let end = start + len;
            let chunks = chunk_range(start, end, max_span);

            prop_assert_eq!(chunks.first().map(|c| c.0), Some(start));
            prop_assert_eq!(chunks.last().map(|c| c.1), Some(end));
            for window in chunks.windows(2) {
                prop_assert_eq!(window[0].1, window[1].0);
            }
            for &(s, e) in &chunks {
                prop_assert!(e - s <= max_span);
            }
        }
    }
}
