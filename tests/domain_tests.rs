mod common;

use common::encode_runs;
use exhume::domain::entities::format_file_size;
use exhume::infrastructure::file_systems::ntfs::parse_data_runs;
use proptest::prelude::*;

#[test]
fn sizes_use_decimal_si_units() {
    assert_eq!(format_file_size(0), "0 bytes");
    assert_eq!(format_file_size(999), "999 bytes");
    assert_eq!(format_file_size(1_000), "1.00 KB");
    assert_eq!(format_file_size(999_999), "1000.00 KB");
    assert_eq!(format_file_size(1_000_000), "1.00 MB");
    assert_eq!(format_file_size(1_000_000_000), "1.00 GB");
    assert_eq!(format_file_size(2_340_000_000), "2.34 GB");
}

proptest! {
    /// Decoded-and-merged run lists cover exactly the LCNs of the source
    /// runs, and no two adjacent merged ranges touch.
    #[test]
    fn run_list_merge_preserves_coverage(
        segments in prop::collection::vec((0u64..64, 1u64..32), 1..16)
    ) {
        // Lay the segments out left to right; a zero gap produces
        // adjacent runs that must merge.
        let mut runs: Vec<(u64, u64)> = Vec::new();
        let mut next_lcn = 16u64;
        for (gap, count) in segments {
            let lcn = next_lcn + gap;
            runs.push((lcn, count));
            next_lcn = lcn + count;
        }

        let encoded = encode_runs(&runs);
        let ranges = parse_data_runs(&encoded, 4_096);

        // Same coverage.
        let expected: u64 = runs.iter().map(|&(_, count)| count).sum();
        let decoded: u64 = ranges.iter().map(|r| r.count).sum();
        prop_assert_eq!(decoded, expected);

        let first_lcn = runs.first().map(|&(lcn, _)| lcn).unwrap();
        prop_assert_eq!(ranges.first().map(|r| r.start_lcn), Some(first_lcn));
        let last_end = runs.last().map(|&(lcn, count)| lcn + count).unwrap();
        prop_assert_eq!(ranges.last().map(|r| r.end_lcn()), Some(last_end));

        // No two merged neighbours touch.
        for pair in ranges.windows(2) {
            prop_assert!(pair[0].end_lcn() < pair[1].start_lcn);
        }
    }
}

proptest! {
    /// A run list round-trips every individual LCN, not just totals.
    #[test]
    fn run_list_round_trips_every_lcn(
        segments in prop::collection::vec((1u64..32, 1u64..16), 1..8)
    ) {
        let mut runs: Vec<(u64, u64)> = Vec::new();
        let mut next_lcn = 8u64;
        for (gap, count) in segments {
            let lcn = next_lcn + gap;
            runs.push((lcn, count));
            next_lcn = lcn + count;
        }

        let expected: Vec<u64> = runs
            .iter()
            .flat_map(|&(lcn, count)| lcn..lcn + count)
            .collect();
        let decoded: Vec<u64> = parse_data_runs(&encode_runs(&runs), 4_096)
            .iter()
            .flat_map(|r| r.start_lcn..r.end_lcn())
            .collect();
        prop_assert_eq!(decoded, expected);
    }
}
