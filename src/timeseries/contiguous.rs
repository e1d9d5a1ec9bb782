//! Contiguous-block resolution across a channel pair.
//!
//! A contiguous block is a maximal gap-free time range present in *both*
//! channels' buffers; a gap in either channel breaks contiguity for the
//! pair. Rotation derivation selects the largest such block.

use super::{SampleBuffer, TimeRange};

/// Builds the list of maximal contiguous ranges shared by two buffers.
///
/// Each buffer contributes its gap-free segments; the result is every
/// non-empty pairwise intersection, sorted by start time.
pub fn common_contiguous_ranges(x: &SampleBuffer, y: &SampleBuffer) -> Vec<TimeRange> {
    let segments_x = x.contiguous_segments();
    let segments_y = y.contiguous_segments();

    let mut ranges = Vec::new();
    for sx in &segments_x {
        for sy in &segments_y {
            if let Some(shared) = sx.intersect(sy) {
                ranges.push(shared);
            }
        }
    }
    ranges.sort_by_key(|r| r.start_ms);
    ranges
}

/// Selects the range with the largest duration; ties go to the earliest
/// start time. Returns `None` for an empty list.
pub fn largest_range(ranges: &[TimeRange]) -> Option<TimeRange> {
    let mut best: Option<TimeRange> = None;
    for range in ranges {
        match best {
            None => best = Some(*range),
            Some(current) => {
                let longer = range.duration_ms() > current.duration_ms();
                let tie_earlier = range.duration_ms() == current.duration_ms()
                    && range.start_ms < current.start_ms;
                if longer || tie_earlier {
                    best = Some(*range);
                }
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with_gaps(start_ms: i64, len: usize, gaps: Vec<TimeRange>) -> SampleBuffer {
        SampleBuffer::new(vec![1.0; len], 1000, start_ms, gaps).unwrap()
    }

    #[test]
    fn test_common_ranges_broken_by_either_gap() {
        // x: [0, 10_000) with gap [4000, 6000)
        // y: [0, 10_000) with gap [7000, 8000)
        let x = buffer_with_gaps(0, 10, vec![TimeRange::new(4000, 6000)]);
        let y = buffer_with_gaps(0, 10, vec![TimeRange::new(7000, 8000)]);

        let ranges = common_contiguous_ranges(&x, &y);
        assert_eq!(
            ranges,
            vec![
                TimeRange::new(0, 4000),
                TimeRange::new(6000, 7000),
                TimeRange::new(8000, 10_000),
            ]
        );
    }

    #[test]
    fn test_largest_range_selection() {
        let ranges = vec![
            TimeRange::new(0, 100_000),
            TimeRange::new(200_000, 500_000),
        ];
        assert_eq!(
            largest_range(&ranges),
            Some(TimeRange::new(200_000, 500_000))
        );
    }

    #[test]
    fn test_largest_range_tie_goes_to_earliest() {
        let ranges = vec![
            TimeRange::new(5000, 7000),
            TimeRange::new(1000, 3000),
        ];
        assert_eq!(largest_range(&ranges), Some(TimeRange::new(1000, 3000)));
    }

    #[test]
    fn test_no_shared_range() {
        let x = buffer_with_gaps(0, 5, vec![]);
        let y = buffer_with_gaps(10_000, 5, vec![]);
        assert!(common_contiguous_ranges(&x, &y).is_empty());
        assert_eq!(largest_range(&[]), None);
    }
}
