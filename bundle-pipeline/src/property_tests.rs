use crate::{
    block_assembler::{block_hash, BlockAssembler},
    bundle::Bundle,
    bundle_store::BundleStore,
    publisher::LogPublisher,
    ranking::rank_bundles,
};
use proptest::prelude::*;
use std::sync::Arc;

// Profits drawn from a small set so ties are common.
fn arb_bundles() -> impl Strategy<Value = Vec<Bundle>> {
    prop::collection::vec(0u8..6, 1..40).prop_map(|profits| {
        profits
            .into_iter()
            .enumerate()
            .map(|(i, p)| Bundle::new(format!("b{i}"), vec![format!("0x{i:02x}")], p as f64 * 0.001, "0x1"))
            .collect()
    })
}

fn submission_index(bundle: &Bundle) -> usize {
    bundle.id[1..].parse().unwrap()
}

proptest! {
    #[test]
    fn test_rank_is_descending_and_stable(bundles in arb_bundles()) {
        let ranked = rank_bundles(bundles.clone());

        prop_assert_eq!(ranked.len(), bundles.len());
        for pair in ranked.windows(2) {
            prop_assert!(pair[0].declared_profit >= pair[1].declared_profit);
            if pair[0].declared_profit == pair[1].declared_profit {
                prop_assert!(submission_index(&pair[0]) < submission_index(&pair[1]));
            }
        }
    }

    #[test]
    fn test_select_top_is_earliest_maximum(bundles in arb_bundles()) {
        let ranked = rank_bundles(bundles.clone());
        let winner = BlockAssembler::new().select_top(&ranked).unwrap();

        let max = bundles.iter().map(|b| b.declared_profit).fold(f64::MIN, f64::max);
        let earliest = bundles.iter().find(|b| b.declared_profit == max).unwrap();
        prop_assert_eq!(&winner.id, &earliest.id);
    }

    #[test]
    fn test_block_hash_is_pure(id in "[a-zA-Z0-9-]{1,64}") {
        prop_assert_eq!(block_hash(&id), block_hash(&id));
        prop_assert_eq!(block_hash(&id).len(), 18);
    }

    #[test]
    fn test_history_tracks_submits(bundles in arb_bundles()) {
        let store = BundleStore::new(Arc::new(LogPublisher));

        tokio_test::block_on(async {
            for (i, bundle) in bundles.iter().enumerate() {
                let result = store.submit(bundle.clone()).await.unwrap();
                assert_eq!(result.bundle_id, bundle.id);
                assert_eq!(store.history_len(), i + 1);
                assert_eq!(store.pending_len(), 0);
            }
        });
    }
}
