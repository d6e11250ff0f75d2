use crate::distance::CachedDistance;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;

/// The outcome of splitting an overflowing node's contents: two promoted
/// routing objects and a disjoint binary partition of the whole set, with
/// each promoted object belonging to its own side.
pub struct Split<D> {
    pub promoted: (D, D),
    pub first: BTreeSet<D>,
    pub second: BTreeSet<D>,
}

/// A complete split strategy, usually a [`SplitFunction`] composing a
/// promotion policy with a partition policy.
pub trait SplitPolicy<D> {
    fn split(&mut self, items: &BTreeSet<D>, distance: &mut CachedDistance<'_, D>) -> Split<D>;
}

/// Chooses two distinct routing objects from an overflowing node's contents.
pub trait PromotionPolicy<D> {
    fn promote(&mut self, items: &BTreeSet<D>, distance: &mut CachedDistance<'_, D>) -> (D, D);
}

/// Distributes a node's contents between the two promoted routing objects.
pub trait PartitionPolicy<D> {
    fn partition(
        &mut self,
        promoted: &(D, D),
        items: &BTreeSet<D>,
        distance: &mut CachedDistance<'_, D>,
    ) -> (BTreeSet<D>, BTreeSet<D>);
}

/// Composes a promotion policy and a partition policy into a split strategy.
pub struct SplitFunction<P, Q> {
    promotion: P,
    partition: Q,
}

impl<P, Q> SplitFunction<P, Q> {
    pub fn new(promotion: P, partition: Q) -> Self {
        SplitFunction {
            promotion,
            partition,
        }
    }
}

impl<P: Default, Q: Default> Default for SplitFunction<P, Q> {
    fn default() -> Self {
        SplitFunction::new(P::default(), Q::default())
    }
}

impl<D, P, Q> SplitPolicy<D> for SplitFunction<P, Q>
where
    P: PromotionPolicy<D>,
    Q: PartitionPolicy<D>,
{
    fn split(&mut self, items: &BTreeSet<D>, distance: &mut CachedDistance<'_, D>) -> Split<D> {
        let promoted = self.promotion.promote(items, distance);
        let (first, second) = self.partition.partition(&promoted, items, distance);
        Split {
            promoted,
            first,
            second,
        }
    }
}

/// The default split strategy: random promotion with balanced partition.
pub type DefaultSplit = SplitFunction<RandomPromotion, BalancedPartition>;

/// Promotes two distinct objects sampled uniformly without replacement.
pub struct RandomPromotion {
    rng: StdRng,
}

impl RandomPromotion {
    #[must_use]
    pub fn new() -> Self {
        RandomPromotion {
            rng: StdRng::from_entropy(),
        }
    }

    /// A promotion with a pinned seed, for reproducible tree shapes.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        RandomPromotion {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomPromotion {
    fn default() -> Self {
        RandomPromotion::new()
    }
}

impl<D: Clone + Ord> PromotionPolicy<D> for RandomPromotion {
    fn promote(&mut self, items: &BTreeSet<D>, _distance: &mut CachedDistance<'_, D>) -> (D, D) {
        let items: Vec<&D> = items.iter().collect();
        let picked = rand::seq::index::sample(&mut self.rng, items.len(), 2);
        (items[picked.index(0)].clone(), items[picked.index(1)].clone())
    }
}

/// Splits the contents evenly: sorts the set by distance to each promoted
/// object, then alternately assigns the nearest still-unassigned object to
/// each side. The two sides end up differing in size by at most one.
#[derive(Clone, Copy, Default)]
pub struct BalancedPartition;

impl<D: Clone + Ord> PartitionPolicy<D> for BalancedPartition {
    fn partition(
        &mut self,
        promoted: &(D, D),
        items: &BTreeSet<D>,
        distance: &mut CachedDistance<'_, D>,
    ) -> (BTreeSet<D>, BTreeSet<D>) {
        let queue1 = sorted_by_distance(items, &promoted.0, distance);
        let queue2 = sorted_by_distance(items, &promoted.1, distance);

        let mut first = BTreeSet::new();
        let mut second = BTreeSet::new();
        let mut i1 = 0;
        let mut i2 = 0;
        while i1 < queue1.len() || i2 < queue2.len() {
            while let Some(item) = queue1.get(i1) {
                i1 += 1;
                if !second.contains(*item) {
                    first.insert((*item).clone());
                    break;
                }
            }
            while let Some(item) = queue2.get(i2) {
                i2 += 1;
                if !first.contains(*item) {
                    second.insert((*item).clone());
                    break;
                }
            }
        }
        (first, second)
    }
}

// Sorts the set by distance to `to`, then moves `to` itself to the front.
// For a proper metric `to` is already the unique head at distance zero; the
// rotation keeps each promoted object inside its own partition even when
// every pairwise distance ties.
fn sorted_by_distance<'s, D: Clone + Ord>(
    items: &'s BTreeSet<D>,
    to: &D,
    distance: &mut CachedDistance<'_, D>,
) -> Vec<&'s D> {
    let mut queue: Vec<(OrderedFloat<f64>, &D)> = items
        .iter()
        .map(|item| (OrderedFloat(distance.distance(item, to)), item))
        .collect();
    queue.sort();
    let mut queue: Vec<&D> = queue.into_iter().map(|(_, item)| item).collect();
    if let Some(position) = queue.iter().position(|item| *item == to) {
        queue[..=position].rotate_right(1);
    }
    queue
}
