use crate::bundle::Bundle;

/// Orders bundles by declared profit, highest first.
///
/// The sort is stable: bundles with equal profit keep their submission order,
/// so the earliest-submitted one wins a tie.
pub fn rank_bundles(mut bundles: Vec<Bundle>) -> Vec<Bundle> {
    bundles.sort_by(|a, b| b.declared_profit.total_cmp(&a.declared_profit));
    bundles
}
