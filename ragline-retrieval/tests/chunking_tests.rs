//! Property tests for chunking and embedding.

use std::sync::Arc;

use proptest::prelude::*;
use ragline_retrieval::chunking::{chunk_text, normalize_whitespace};
use ragline_retrieval::embedding::{Embedder, EmbeddingModelSpec};
use ragline_retrieval::hashing::HashingEmbedder;

/// Valid `(size, overlap)` pairs.
fn arb_params() -> impl Strategy<Value = (usize, usize)> {
    (1usize..60).prop_flat_map(|size| (Just(size), 0..size))
}

/// **Property: chunking round-trip**
/// *For any* text and valid parameters, dropping the overlap from every
/// chunk but the last and concatenating SHALL reconstruct the
/// whitespace-normalized text.
mod prop_chunk_round_trip {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_reconstruct_normalized_text(
            text in "[a-zA-Zé \t\n.]{0,300}",
            (size, overlap) in arb_params(),
        ) {
            let chunks = chunk_text(&text, size, overlap).unwrap();
            let stride = size - overlap;

            let mut rebuilt = String::new();
            for (i, chunk) in chunks.iter().enumerate() {
                if i + 1 == chunks.len() {
                    rebuilt.push_str(chunk);
                } else {
                    rebuilt.extend(chunk.chars().take(stride));
                }
            }
            prop_assert_eq!(rebuilt, normalize_whitespace(&text));
        }
    }
}

/// **Property: chunk bounds and overlap**
/// *For any* text and valid parameters, every chunk SHALL have at most `size`
/// characters, and a full-length chunk SHALL share exactly `overlap`
/// characters with its successor.
mod prop_chunk_overlap {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_bounded_and_overlapping(
            text in "[a-z \n]{0,300}",
            (size, overlap) in arb_params(),
        ) {
            let chunks = chunk_text(&text, size, overlap).unwrap();
            for chunk in &chunks {
                prop_assert!(chunk.chars().count() <= size);
            }
            for pair in chunks.windows(2) {
                let current: Vec<char> = pair[0].chars().collect();
                let next: Vec<char> = pair[1].chars().collect();
                if current.len() == size {
                    prop_assert_eq!(&current[size - overlap..], &next[..overlap]);
                }
            }
        }

        #[test]
        fn empty_text_yields_no_chunks((size, overlap) in arb_params(), blank in "[ \t\n]{0,10}") {
            prop_assert!(chunk_text(&blank, size, overlap).unwrap().is_empty());
        }
    }
}

/// **Property: embedding determinism and unit norm**
/// *For any* text, embedding it twice SHALL yield identical vectors with
/// unit L2 norm.
mod prop_embedding_norm {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn embeddings_are_deterministic_unit_vectors(text in "\\PC{0,80}") {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (first, second) = rt.block_on(async {
                let spec = EmbeddingModelSpec::new("hashing", 64);
                let embedder = Embedder::new(spec, HashingEmbedder::loader());
                let first = embedder.embed_one(&text).await.unwrap();
                let second = embedder.embed_one(&text).await.unwrap();
                (first, second)
            });
            prop_assert_eq!(&first.values, &second.values);
            prop_assert!(first.normalized);
            prop_assert!((first.norm() - 1.0).abs() < 1e-4);
        }
    }
}

#[tokio::test]
async fn test_embedder_is_shared_across_tasks() {
    let spec = EmbeddingModelSpec::new("hashing", 32);
    let embedder = Arc::new(Embedder::new(spec, HashingEmbedder::loader()));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let embedder = embedder.clone();
            tokio::spawn(async move { embedder.embed_one(&format!("question {i}")).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().dim(), 32);
    }
    assert!(embedder.is_loaded());
}
