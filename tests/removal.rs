use mtree::{euclidean, BalancedPartition, MTree, RandomPromotion, SplitFunction};
use ordered_float::OrderedFloat;
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
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

fn line_tree(seed: u64) -> SeededTree {
    let mut tree = small_tree(seed);
    for i in 0..10 {
        tree.add(point(f64::from(i), 0.0));
    }
    tree
}

#[test]
fn query_between_two_objects() {
    let tree = line_tree(0);
    tree.check();

    let results: Vec<(Point, f64)> = tree
        .get_nearest(&point(4.5, 0.0), f64::INFINITY, 2)
        .iter()
        .collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].1, 0.5);
    assert_eq!(results[1].1, 0.5);
    let found: BTreeSet<Point> = results.iter().map(|(p, _)| p.clone()).collect();
    let expected: BTreeSet<Point> = [point(4.0, 0.0), point(5.0, 0.0)].into_iter().collect();
    assert_eq!(found, expected);
}

#[test]
fn removal_shifts_the_nearest_neighbor() {
    let mut tree = line_tree(0);

    assert!(tree.remove(&point(4.0, 0.0)));
    tree.check();

    let results: Vec<(Point, f64)> = tree
        .get_nearest(&point(4.5, 0.0), f64::INFINITY, 1)
        .iter()
        .collect();
    assert_eq!(results, vec![(point(5.0, 0.0), 0.5)]);
}

#[test]
fn remove_all_in_insertion_order() {
    let mut tree = line_tree(0);

    for i in 0..10 {
        assert!(tree.remove(&point(f64::from(i), 0.0)));
        tree.check();
        assert_eq!(tree.len(), 9 - i as usize);
    }
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 0);

    // An emptied tree accepts new objects again
    tree.add(point(1.0, 2.0));
    tree.check();
    assert_eq!(tree.len(), 1);
}

#[test]
fn remove_absent_is_a_no_op() {
    let mut tree = line_tree(0);
    let before: Vec<(Point, f64)> = tree
        .get_nearest_by_limit(&point(3.3, 0.0), usize::MAX)
        .iter()
        .collect();

    assert!(!tree.remove(&point(50.0, 50.0)));
    tree.check();
    assert_eq!(tree.len(), 10);

    let after: Vec<(Point, f64)> = tree
        .get_nearest_by_limit(&point(3.3, 0.0), usize::MAX)
        .iter()
        .collect();
    assert_eq!(before, after);
}

#[test]
fn random_drain_keeps_invariants() {
    let mut tree = small_tree(5);
    let mut points = Vec::new();
    for x in 0..8 {
        for y in 0..8 {
            let p = point(f64::from(x) * 3.0, f64::from(y) * 3.0);
            tree.add(p.clone());
            points.push(p);
        }
    }
    tree.check();

    // Deleting in an order unrelated to insertion exercises both the
    // donation and the merge repair paths.
    let mut rng = StdRng::seed_from_u64(9);
    points.shuffle(&mut rng);
    for (removed, p) in points.iter().enumerate() {
        assert!(tree.remove(p));
        tree.check();
        assert_eq!(tree.len(), points.len() - removed - 1);
    }
    assert!(tree.is_empty());
}
