use mtree::{euclidean, BalancedPartition, MTree, RandomPromotion, SplitFunction};
use ordered_float::OrderedFloat;
use std::collections::BTreeSet;

type Point = (OrderedFloat<f64>, OrderedFloat<f64>);
type SeededTree = MTree<Point, fn(&Point, &Point) -> f64, SplitFunction<RandomPromotion, BalancedPartition>>;

fn point(x: f64, y: f64) -> Point {
    (OrderedFloat(x), OrderedFloat(y))
}

fn point_distance(a: &Point, b: &Point) -> f64 {
    euclidean(
        &[a.0.into_inner(), a.1.into_inner()],
        &[b.0.into_inner(), b.1.into_inner()],
    )
}

fn small_tree(seed: u64) -> SeededTree {
    let split = SplitFunction::new(RandomPromotion::seeded(seed), BalancedPartition);
    MTree::with_split(2, 3, point_distance as fn(&Point, &Point) -> f64, split).expect("valid capacities")
}

#[test]
fn basic_usage() {
    let mut tree = small_tree(0);
    for (x, y) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0), (5.0, 5.0)] {
        tree.add(point(x, y));
    }
    tree.check();

    let query = tree.get_nearest(&point(0.0, 0.0), f64::INFINITY, 3);
    let results: Vec<(Point, f64)> = query.iter().collect();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0], (point(0.0, 0.0), 0.0));

    // The next two tie at distance 1, in either order.
    assert_eq!(results[1].1, 1.0);
    assert_eq!(results[2].1, 1.0);
    let tail: BTreeSet<Point> = results[1..].iter().map(|(p, _)| p.clone()).collect();
    let expected: BTreeSet<Point> = [point(1.0, 0.0), point(0.0, 1.0)].into_iter().collect();
    assert_eq!(tail, expected);
}

#[test]
fn range_query() {
    let mut tree = small_tree(0);
    for (x, y) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0), (5.0, 5.0)] {
        tree.add(point(x, y));
    }

    let results: Vec<(Point, f64)> = tree
        .get_nearest_by_range(&point(5.0, 5.0), 1.0)
        .iter()
        .collect();
    assert_eq!(results, vec![(point(5.0, 5.0), 0.0)]);
}

#[test]
fn empty_tree() {
    let mut tree = small_tree(0);
    assert!(tree.is_empty());
    assert_eq!(
        tree.get_nearest(&point(0.0, 0.0), f64::INFINITY, usize::MAX)
            .iter()
            .next(),
        None
    );
    assert!(!tree.remove(&point(0.0, 0.0)));
}

#[test]
fn single_object() {
    let mut tree = small_tree(0);
    tree.add(point(3.0, 4.0));
    tree.check();

    let results: Vec<(Point, f64)> = tree
        .get_nearest(&point(0.0, 0.0), f64::INFINITY, 1)
        .iter()
        .collect();
    assert_eq!(results, vec![(point(3.0, 4.0), 5.0)]);
}

#[test]
fn limit_caps_the_result_count() {
    let mut tree = small_tree(3);
    for i in 0..12 {
        tree.add(point(f64::from(i), 0.0));
    }

    let query = tree.get_nearest(&point(0.0, 0.0), f64::INFINITY, 4);
    assert_eq!(query.iter().count(), 4);
    assert_eq!(tree.get_nearest(&point(0.0, 0.0), f64::INFINITY, 0).iter().count(), 0);
}

#[test]
fn fresh_iterators_restart_the_query() {
    let mut tree = small_tree(1);
    for i in 0..10 {
        tree.add(point(f64::from(i % 5), f64::from(i / 5)));
    }

    let query = tree.get_nearest(&point(2.0, 0.5), f64::INFINITY, 10);
    let first: Vec<(Point, f64)> = query.iter().collect();
    let second: Vec<(Point, f64)> = query.iter().collect();
    assert_eq!(first, second);

    // A partially consumed iterator does not disturb a later one.
    let mut partial = query.iter();
    partial.next();
    partial.next();
    let third: Vec<(Point, f64)> = query.iter().collect();
    assert_eq!(first, third);
}

#[test]
fn zero_distance_objects() {
    // Distinct keys whose pairwise distances all tie at zero: splits,
    // queries, and removals must still work.
    let split = SplitFunction::new(RandomPromotion::seeded(7), BalancedPartition);
    let flat = |_: &i32, _: &i32| 0.0;
    let mut tree = MTree::with_split(2, 3, flat, split).expect("valid capacities");
    for i in 0..10 {
        tree.add(i);
        tree.check();
    }

    let results: Vec<(i32, f64)> = tree
        .get_nearest(&0, f64::INFINITY, usize::MAX)
        .iter()
        .collect();
    assert_eq!(results.len(), 10);
    assert!(results.iter().all(|(_, d)| *d == 0.0));
    let found: BTreeSet<i32> = results.iter().map(|(i, _)| *i).collect();
    assert_eq!(found, (0..10).collect());

    for i in 0..10 {
        assert!(tree.remove(&i));
        tree.check();
    }
    assert!(tree.is_empty());
}
