//! Property-Based Tests for Chunking
//!
//! # Test Properties
//!
//! 1. **Reassembly**: concatenating the chunks reproduces the data
//! 2. **Count**: `ceil(len / n)` chunks
//! 3. **Shape**: every chunk but the last is `n` bytes; the last is `len mod n` or `n`

#![cfg(test)]

use proptest::prelude::*;

use super::chunk::{decode_chunk_count, divide_into_chunks, encode_chunk_count};

/// Strategy for generating test data of various sizes.
fn data_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..5000)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_chunks_reassemble(data in data_strategy(), n in 1usize..600) {
        let chunks = divide_into_chunks(&data, n);
        let joined: Vec<u8> = chunks.concat();
        prop_assert_eq!(joined, data);
    }

    #[test]
    fn prop_chunk_count(data in data_strategy(), n in 1usize..600) {
        let chunks = divide_into_chunks(&data, n);
        prop_assert_eq!(chunks.len(), (data.len() + n - 1) / n);
    }

    #[test]
    fn prop_chunk_shape(data in data_strategy(), n in 1usize..600) {
        let chunks = divide_into_chunks(&data, n);
        let (last, rest) = chunks.split_last().unwrap();
        for chunk in rest {
            prop_assert_eq!(chunk.len(), n);
        }
        let expected_last = match data.len() % n {
            0 => n,
            r => r,
        };
        prop_assert_eq!(last.len(), expected_last);
    }

    #[test]
    fn prop_chunk_count_codec(count in 1u32..=i32::MAX as u32) {
        prop_assert_eq!(decode_chunk_count(&encode_chunk_count(count)).unwrap(), count);
    }
}
