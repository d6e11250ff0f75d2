use crate::error::TreeError;
use crate::node::{Children, MutationCtx, Node, RemoveOutcome};
use crate::query::Query;
use crate::split::{DefaultSplit, SplitPolicy};

/// Minimum node capacity used when none is given.
pub const DEFAULT_MIN_CAPACITY: usize = 50;

/// A dynamic, balanced metric-space index.
///
/// Objects of type `D` are organized into hierarchically nested balls using
/// only a distance function, so range and nearest-neighbor queries can prune
/// whole subtrees through the triangle inequality. The distance must be
/// non-negative, symmetric, zero exactly on equal objects, and satisfy the
/// triangle inequality; none of this is verified, but pruning correctness
/// depends on it.
pub struct MTree<D, F, S = DefaultSplit> {
    pub(crate) min_capacity: usize,
    pub(crate) max_capacity: usize,
    pub(crate) root: Option<Node<D>>,
    pub(crate) distance: F,
    pub(crate) split: S,
    pub(crate) len: usize,
}

impl<D, F> MTree<D, F>
where
    D: Clone + Ord,
    F: Fn(&D, &D) -> f64,
{
    /// A tree with the default capacities and split strategy.
    #[must_use]
    pub fn new(distance: F) -> Self {
        MTree::with_capacity(DEFAULT_MIN_CAPACITY, distance).expect("default capacity is valid")
    }

    /// A tree with the given minimum node capacity (at least 2); the maximum
    /// capacity defaults to `2 * min_capacity - 1`.
    pub fn with_capacity(min_capacity: usize, distance: F) -> Result<Self, TreeError> {
        if min_capacity < 2 {
            return Err(TreeError::MinCapacity(min_capacity));
        }
        MTree::with_split(
            min_capacity,
            2 * min_capacity - 1,
            distance,
            DefaultSplit::default(),
        )
    }
}

impl<D, F, S> MTree<D, F, S>
where
    D: Clone + Ord,
    F: Fn(&D, &D) -> f64,
    S: SplitPolicy<D>,
{
    /// A tree with explicit capacities and a custom split strategy.
    pub fn with_split(
        min_capacity: usize,
        max_capacity: usize,
        distance: F,
        split: S,
    ) -> Result<Self, TreeError> {
        if min_capacity < 2 {
            return Err(TreeError::MinCapacity(min_capacity));
        }
        if max_capacity < min_capacity {
            return Err(TreeError::CapacityOrder {
                min: min_capacity,
                max: max_capacity,
            });
        }
        Ok(MTree {
            min_capacity,
            max_capacity,
            root: None,
            distance,
            split,
            len: 0,
        })
    }

    /// Indexes an object. The object must not already be indexed; duplicates
    /// are not detected.
    pub fn add(&mut self, data: D) {
        let MTree {
            root,
            distance,
            split,
            min_capacity,
            max_capacity,
            len,
        } = self;
        let mut ctx = MutationCtx {
            distance,
            split,
            min_capacity: *min_capacity,
            max_capacity: *max_capacity,
        };
        match root {
            None => {
                let mut node = Node::new_leaf(data.clone());
                node.add_data(data, 0.0, &mut ctx);
                *root = Some(node);
            }
            Some(node) => {
                let d = (ctx.distance)(&data, &node.data);
                if let Some((first, second)) = node.add_data(data, d, &mut ctx) {
                    // The tree grows a level. The old root's routing object
                    // stays at the top; it is the one already known here.
                    let mut new_root = Node::new_internal(node.data.clone());
                    let d = (ctx.distance)(&new_root.data, &first.data);
                    new_root.attach_node(first, d);
                    let d = (ctx.distance)(&new_root.data, &second.data);
                    new_root.attach_node(second, d);
                    *root = Some(new_root);
                }
            }
        }
        *len += 1;
    }

    /// Removes an object, returning whether it was indexed.
    pub fn remove(&mut self, data: &D) -> bool {
        let MTree {
            root,
            distance,
            split,
            min_capacity,
            max_capacity,
            len,
        } = self;
        let mut ctx = MutationCtx {
            distance,
            split,
            min_capacity: *min_capacity,
            max_capacity: *max_capacity,
        };
        let Some(node) = root.as_mut() else {
            return false;
        };

        let d = (ctx.distance)(data, &node.data);
        if matches!(
            node.do_remove_data(data, d, &mut ctx),
            RemoveOutcome::NotFound
        ) {
            return false;
        }

        // The root obeys its own capacity rules: a leaf root may shrink to a
        // single entry, a routing root must keep two children or hand the
        // tree over to its last child.
        let collapse = match &node.children {
            Children::Entries(entries) => entries.is_empty(),
            Children::Nodes(nodes) => nodes.len() < 2,
        };
        if collapse {
            let old = root.take().unwrap();
            *root = Self::collapse_root(old, ctx.distance);
        }
        *len -= 1;
        true
    }

    // Promotes the last child of an under-capacity routing root, rebuilding
    // its metrics from scratch; an empty leaf root empties the tree.
    fn collapse_root(old: Node<D>, distance: &F) -> Option<Node<D>> {
        match old.children {
            Children::Entries(_) => None,
            Children::Nodes(mut nodes) => {
                let (_, mut child) = nodes.pop_first().expect("a routing root keeps a child");
                child.distance_to_parent = None;
                child.radius = 0.0;
                let data = child.data.clone();
                match &mut child.children {
                    Children::Entries(entries) => {
                        for entry in entries.values_mut() {
                            entry.distance_to_parent = distance(&data, &entry.data);
                            child.radius = child.radius.max(entry.distance_to_parent);
                        }
                    }
                    Children::Nodes(grandchildren) => {
                        for node in grandchildren.values_mut() {
                            let d = distance(&data, &node.data);
                            node.distance_to_parent = Some(d);
                            child.radius = child.radius.max(d + node.radius);
                        }
                    }
                }
                Some(child)
            }
        }
    }

    /// A combined range / k-nearest-neighbor query: at most `limit` objects
    /// within `range` of `data`, iterated in non-decreasing distance order.
    #[must_use]
    pub fn get_nearest(&self, data: &D, range: f64, limit: usize) -> Query<'_, D, F, S> {
        Query {
            tree: self,
            data: data.clone(),
            range,
            limit,
        }
    }

    /// All objects within `range` of `data`.
    #[must_use]
    pub fn get_nearest_by_range(&self, data: &D, range: f64) -> Query<'_, D, F, S> {
        self.get_nearest(data, range, usize::MAX)
    }

    /// The `limit` objects nearest to `data`.
    #[must_use]
    pub fn get_nearest_by_limit(&self, data: &D, limit: usize) -> Query<'_, D, F, S> {
        self.get_nearest(data, f64::INFINITY, limit)
    }

    /// The number of indexed objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of levels, counting the leaf level; 0 for an empty tree.
    #[must_use]
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut node = self.root.as_ref();
        while let Some(current) = node {
            height += 1;
            node = match &current.children {
                Children::Nodes(nodes) => nodes.values().next(),
                Children::Entries(_) => None,
            };
        }
        height
    }

    /// Verifies every structural invariant of the tree; compiled to a no-op
    /// in release builds.
    pub fn check(&self) {
        #[cfg(debug_assertions)]
        if let Some(root) = &self.root {
            root.check(&self.distance, self.min_capacity, self.max_capacity, true);
        }
    }
}
