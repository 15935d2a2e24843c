//! Property tests: any input survives compression unchanged.

use bzkit_bzip2::{BlockSize, BzEncoder, compress, decompress};
use proptest::prelude::*;
use std::io::Write;

/// Inputs biased towards runs, which stress the RLE stages.
fn runs() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec((any::<u8>(), 1usize..600), 0..60).prop_map(|runs| {
        runs.into_iter()
            .flat_map(|(byte, len)| std::iter::repeat_n(byte, len))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_roundtrip_arbitrary(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        let compressed = compress(&data, BlockSize::MIN).unwrap();
        prop_assert_eq!(decompress(&compressed[..]).unwrap(), data);
    }

    #[test]
    fn test_roundtrip_runs(data in runs(), units in 1u8..=9) {
        let compressed = compress(&data, BlockSize::new(units).unwrap()).unwrap();
        prop_assert_eq!(decompress(&compressed[..]).unwrap(), data);
    }

    #[test]
    fn test_chunking_does_not_change_output(
        data in prop::collection::vec(0u8..4, 0..8192),
        chunk in 1usize..500,
    ) {
        let mut encoder = BzEncoder::new(Vec::new(), BlockSize::MIN).unwrap();
        for piece in data.chunks(chunk) {
            encoder.write_all(piece).unwrap();
        }
        let streamed = encoder.finish().unwrap();
        prop_assert_eq!(streamed, compress(&data, BlockSize::MIN).unwrap());
    }
}
