use crate::node::{Children, Entry, Node};
use crate::tree::MTree;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A pending nearest-neighbor query. The search runs lazily while the
/// results are iterated: by the time the n-th neighbor is produced, only the
/// work needed to identify the first n results has been done. Each call to
/// [`Query::iter`] restarts the search from scratch.
pub struct Query<'t, D, F, S> {
    pub(crate) tree: &'t MTree<D, F, S>,
    pub(crate) data: D,
    pub(crate) range: f64,
    pub(crate) limit: usize,
}

impl<'t, D, F, S> Query<'t, D, F, S>
where
    D: Clone + Ord,
    F: Fn(&D, &D) -> f64,
{
    #[must_use]
    pub fn iter(&self) -> QueryIter<'_, D, F, S> {
        QueryIter::new(self)
    }
}

impl<'q, 't, D, F, S> IntoIterator for &'q Query<'t, D, F, S>
where
    D: Clone + Ord,
    F: Fn(&D, &D) -> f64,
{
    type Item = (D, f64);
    type IntoIter = QueryIter<'q, D, F, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// Heap item carrying the real distance to the query object and the
// optimistic lower bound for the subtree (for entries the two coincide).
// Ordering is inverted so the std max-heap pops the smallest bound first.
struct ItemWithDistance<T> {
    item: T,
    distance: f64,
    min_distance: f64,
}

impl<T> PartialEq for ItemWithDistance<T> {
    fn eq(&self, other: &Self) -> bool {
        OrderedFloat(self.min_distance) == OrderedFloat(other.min_distance)
    }
}

impl<T> Eq for ItemWithDistance<T> {}

impl<T> PartialOrd for ItemWithDistance<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ItemWithDistance<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        OrderedFloat(other.min_distance).cmp(&OrderedFloat(self.min_distance))
    }
}

/// Best-first traversal yielding `(object, distance)` pairs in non-decreasing
/// distance order, at most `limit` of them, all within `range`.
pub struct QueryIter<'q, D, F, S> {
    query: &'q Query<'q, D, F, S>,
    pending: BinaryHeap<ItemWithDistance<&'q Node<D>>>,
    nearest: BinaryHeap<ItemWithDistance<&'q Entry<D>>>,
    next_pending_min: f64,
    yielded: usize,
}

impl<'q, D, F, S> QueryIter<'q, D, F, S>
where
    D: Clone + Ord,
    F: Fn(&D, &D) -> f64,
{
    fn new(query: &'q Query<'q, D, F, S>) -> Self {
        let mut iter = QueryIter {
            query,
            pending: BinaryHeap::new(),
            nearest: BinaryHeap::new(),
            next_pending_min: f64::INFINITY,
            yielded: 0,
        };
        if let Some(root) = &query.tree.root {
            let distance = (query.tree.distance)(&query.data, &root.data);
            let min_distance = (distance - root.radius).max(0.0);
            iter.pending.push(ItemWithDistance {
                item: root,
                distance,
                min_distance,
            });
            iter.next_pending_min = min_distance;
        }
        iter
    }

    /// Yields the nearest known entry if no unexplored subtree could still
    /// hold anything closer.
    fn pop_next_nearest(&mut self) -> Option<(D, f64)> {
        let head = self.nearest.peek()?;
        if head.distance > self.next_pending_min {
            return None;
        }
        let head = self.nearest.pop().unwrap();
        Some((head.item.data.clone(), head.distance))
    }

    fn expand(&mut self, parent: ItemWithDistance<&'q Node<D>>) {
        let tree = self.query.tree;
        let range = self.query.range;
        match &parent.item.children {
            Children::Entries(entries) => {
                for child in entries.values() {
                    if (parent.distance - child.distance_to_parent).abs() > range {
                        continue;
                    }
                    let distance = (tree.distance)(&self.query.data, &child.data);
                    if distance > range {
                        continue;
                    }
                    self.nearest.push(ItemWithDistance {
                        item: child,
                        distance,
                        min_distance: distance,
                    });
                }
            }
            Children::Nodes(nodes) => {
                for child in nodes.values() {
                    let to_parent = child.distance_to_parent.unwrap();
                    if (parent.distance - to_parent).abs() - child.radius > range {
                        continue;
                    }
                    let distance = (tree.distance)(&self.query.data, &child.data);
                    let min_distance = (distance - child.radius).max(0.0);
                    if min_distance > range {
                        continue;
                    }
                    self.pending.push(ItemWithDistance {
                        item: child,
                        distance,
                        min_distance,
                    });
                }
            }
        }
    }
}

impl<'q, D, F, S> Iterator for QueryIter<'q, D, F, S>
where
    D: Clone + Ord,
    F: Fn(&D, &D) -> f64,
{
    type Item = (D, f64);

    fn next(&mut self) -> Option<(D, f64)> {
        if self.yielded >= self.query.limit {
            return None;
        }
        while !self.pending.is_empty() || !self.nearest.is_empty() {
            if let Some(result) = self.pop_next_nearest() {
                self.yielded += 1;
                return Some(result);
            }

            let Some(parent) = self.pending.pop() else {
                break;
            };
            self.expand(parent);
            self.next_pending_min = self
                .pending
                .peek()
                .map_or(f64::INFINITY, |item| item.min_distance);
        }
        None
    }
}
