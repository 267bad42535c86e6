//! Property tests for in-memory vector store search ordering.

use docqa_rag::document::{Chunk, Metadata};
use docqa_rag::inmemory::InMemoryVectorStore;
use docqa_rag::similarity::{Metric, cosine_similarity};
use docqa_rag::vectorstore::VectorStore;
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-3 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

fn chunk(text: String) -> Chunk {
    Chunk { content: text, metadata: Metadata::new(), document_id: "doc_1".to_string(), index: 0 }
}

/// *For any* set of records stored in an InMemoryVectorStore, searching with
/// a query embedding returns results ordered by descending cosine similarity,
/// and at most `top_k` of them.
mod prop_inmemory_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            records in proptest::collection::vec(("[a-z ]{5,30}", arb_normalized_embedding(DIM)), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                let handle = store.ensure_collection("test").await.unwrap();

                let (texts, embeddings): (Vec<String>, Vec<Vec<f32>>) = records.iter().cloned().unzip();
                let chunks: Vec<Chunk> = texts.into_iter().map(chunk).collect();
                store.add(&handle, &chunks, &embeddings, None).await.unwrap();
                store.search(&handle, &query, top_k).await.unwrap()
            });

            prop_assert_eq!(results.len(), top_k.min(records.len()));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }

            // The best result is at least as good as every stored record.
            let best = records
                .iter()
                .map(|(_, e)| cosine_similarity(&query, e))
                .fold(f32::MIN, f32::max);
            prop_assert!((results[0].score - best).abs() < 1e-5);
        }
    }
}

/// *For any* metric, the exact stored vector is its own nearest neighbour.
mod prop_self_match {
    use super::*;

    const DIM: usize = 8;

    fn arb_metric() -> impl Strategy<Value = Metric> {
        prop_oneof![Just(Metric::Cosine), Just(Metric::Euclidean)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn stored_vector_ranks_first_for_itself(
            embeddings in proptest::collection::vec(arb_normalized_embedding(DIM), 1..15),
            pick in any::<prop::sample::Index>(),
            metric in arb_metric(),
        ) {
            let target = pick.index(embeddings.len());
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                let handle = store.ensure_collection_with_metric("test", metric).await.unwrap();
                let chunks: Vec<Chunk> =
                    (0..embeddings.len()).map(|i| chunk(format!("record {i}"))).collect();
                store.add(&handle, &chunks, &embeddings, None).await.unwrap();
                store.search(&handle, &embeddings[target], 1).await.unwrap()
            });

            prop_assert_eq!(results.len(), 1);
            let expected = metric.score(&embeddings[target], &embeddings[target]);
            prop_assert!((results[0].score - expected).abs() < 1e-4);
        }
    }
}
