use crate::distance::CachedDistance;
use crate::split::{Split, SplitPolicy};
use std::collections::{BTreeMap, BTreeSet};

/// Borrowed tree state threaded through a single mutating descent.
pub(crate) struct MutationCtx<'t, F, S> {
    pub distance: &'t F,
    pub split: &'t mut S,
    pub min_capacity: usize,
    pub max_capacity: usize,
}

/// Leaf payload: an indexed object and its cached distance to the leaf's
/// routing object. An entry's covering radius is always zero.
pub(crate) struct Entry<D> {
    pub data: D,
    pub distance_to_parent: f64,
}

/// A routing node. The root carries no parent distance; every other node
/// caches its distance to the parent's routing object for pruning.
pub(crate) struct Node<D> {
    pub data: D,
    pub radius: f64,
    pub distance_to_parent: Option<f64>,
    pub children: Children<D>,
}

/// A node holds either entries (leaf level) or nodes (routing level), keyed
/// by the child's data so lookups and splits work over a totally ordered map.
pub(crate) enum Children<D> {
    Entries(BTreeMap<D, Entry<D>>),
    Nodes(BTreeMap<D, Node<D>>),
}

impl<D> Children<D> {
    pub fn len(&self) -> usize {
        match self {
            Children::Entries(entries) => entries.len(),
            Children::Nodes(nodes) => nodes.len(),
        }
    }
}

/// A child detached while rebalancing, of either kind.
pub(crate) enum ChildItem<D> {
    Entry(Entry<D>),
    Node(Node<D>),
}

impl<D> ChildItem<D> {
    fn data(&self) -> &D {
        match self {
            ChildItem::Entry(entry) => &entry.data,
            ChildItem::Node(node) => &node.data,
        }
    }

    fn distance_to_parent(&self) -> f64 {
        match self {
            ChildItem::Entry(entry) => entry.distance_to_parent,
            ChildItem::Node(node) => node.distance_to_parent.unwrap(),
        }
    }
}

/// Result of removing an object from a subtree.
pub(crate) enum RemoveOutcome {
    /// The object was removed and the node still meets its minimum capacity.
    Removed,
    /// The object is not indexed in this subtree.
    NotFound,
    /// The object was removed but the node fell under its minimum capacity;
    /// the caller must rebalance.
    Underflow,
}

impl<D: Clone + Ord> Node<D> {
    pub fn new_leaf(data: D) -> Self {
        Node {
            data,
            radius: 0.0,
            distance_to_parent: None,
            children: Children::Entries(BTreeMap::new()),
        }
    }

    pub fn new_internal(data: D) -> Self {
        Node {
            data,
            radius: 0.0,
            distance_to_parent: None,
            children: Children::Nodes(BTreeMap::new()),
        }
    }

    fn as_nodes(&self) -> &BTreeMap<D, Node<D>> {
        match &self.children {
            Children::Nodes(nodes) => nodes,
            Children::Entries(_) => unreachable!("expected a routing level"),
        }
    }

    fn as_nodes_mut(&mut self) -> &mut BTreeMap<D, Node<D>> {
        match &mut self.children {
            Children::Nodes(nodes) => nodes,
            Children::Entries(_) => unreachable!("expected a routing level"),
        }
    }

    /// Inserts `data` into this subtree, given its distance to this node's
    /// routing object. Returns the two replacement siblings if the insertion
    /// overflowed this node.
    pub fn add_data<F, S>(
        &mut self,
        data: D,
        distance: f64,
        ctx: &mut MutationCtx<'_, F, S>,
    ) -> Option<(Node<D>, Node<D>)>
    where
        F: Fn(&D, &D) -> f64,
        S: SplitPolicy<D>,
    {
        self.do_add_data(data, distance, ctx);
        self.check_overflow(ctx)
    }

    fn do_add_data<F, S>(&mut self, data: D, distance: f64, ctx: &mut MutationCtx<'_, F, S>)
    where
        F: Fn(&D, &D) -> f64,
        S: SplitPolicy<D>,
    {
        let replaced = match &mut self.children {
            Children::Entries(entries) => {
                debug_assert!(!entries.contains_key(&data));
                self.radius = self.radius.max(distance);
                entries.insert(
                    data.clone(),
                    Entry {
                        data,
                        distance_to_parent: distance,
                    },
                );
                None
            }
            Children::Nodes(nodes) => {
                // Prefer a child that already covers the object, nearest
                // first; otherwise grow the child whose radius increases the
                // least.
                let mut covering: Option<(&D, f64)> = None;
                let mut growing: Option<(&D, f64, f64)> = None;
                for (key, child) in nodes.iter() {
                    let d = (ctx.distance)(&child.data, &data);
                    if d <= child.radius {
                        if covering.map_or(true, |(_, best)| d < best) {
                            covering = Some((key, d));
                        }
                    } else {
                        let increase = d - child.radius;
                        if growing.map_or(true, |(_, _, best)| increase < best) {
                            growing = Some((key, d, increase));
                        }
                    }
                }
                let (key, delta) = match (covering, growing) {
                    (Some((key, d)), _) => (key.clone(), d),
                    (None, Some((key, d, _))) => (key.clone(), d),
                    (None, None) => unreachable!("a routing node has children"),
                };

                let child = nodes.get_mut(&key).unwrap();
                match child.add_data(data, delta, ctx) {
                    None => {
                        self.radius = self
                            .radius
                            .max(child.distance_to_parent.unwrap() + child.radius);
                        None
                    }
                    Some(pair) => {
                        nodes.remove(&key);
                        Some(pair)
                    }
                }
            }
        };

        if let Some((first, second)) = replaced {
            let d = (ctx.distance)(&self.data, &first.data);
            self.add_node_child(first, d, ctx);
            let d = (ctx.distance)(&self.data, &second.data);
            self.add_node_child(second, d, ctx);
        }
    }

    /// Splits this node if it exceeds the maximum capacity, returning the two
    /// replacement siblings.
    fn check_overflow<F, S>(
        &mut self,
        ctx: &mut MutationCtx<'_, F, S>,
    ) -> Option<(Node<D>, Node<D>)>
    where
        F: Fn(&D, &D) -> f64,
        S: SplitPolicy<D>,
    {
        if self.children.len() <= ctx.max_capacity {
            return None;
        }
        Some(self.split(ctx))
    }

    /// Promotes two routing objects and distributes every child between two
    /// fresh siblings of the same kind, draining this node.
    fn split<F, S>(&mut self, ctx: &mut MutationCtx<'_, F, S>) -> (Node<D>, Node<D>)
    where
        F: Fn(&D, &D) -> f64,
        S: SplitPolicy<D>,
    {
        let mut cached = CachedDistance::new(ctx.distance);
        let keys: BTreeSet<D> = match &self.children {
            Children::Entries(entries) => entries.keys().cloned().collect(),
            Children::Nodes(nodes) => nodes.keys().cloned().collect(),
        };
        let Split {
            promoted,
            first,
            second,
        } = ctx.split.split(&keys, &mut cached);

        match &mut self.children {
            Children::Entries(entries) => {
                let mut first_node = Node::new_leaf(promoted.0);
                let mut second_node = Node::new_leaf(promoted.1);
                for key in &first {
                    let entry = entries.remove(key).unwrap();
                    let d = cached.distance(&first_node.data, &entry.data);
                    first_node.attach_entry(entry, d);
                }
                for key in &second {
                    let entry = entries.remove(key).unwrap();
                    let d = cached.distance(&second_node.data, &entry.data);
                    second_node.attach_entry(entry, d);
                }
                debug_assert!(entries.is_empty());
                (first_node, second_node)
            }
            Children::Nodes(nodes) => {
                let mut first_node = Node::new_internal(promoted.0);
                let mut second_node = Node::new_internal(promoted.1);
                for key in &first {
                    let node = nodes.remove(key).unwrap();
                    let d = cached.distance(&first_node.data, &node.data);
                    first_node.attach_node(node, d);
                }
                for key in &second {
                    let node = nodes.remove(key).unwrap();
                    let d = cached.distance(&second_node.data, &node.data);
                    second_node.attach_node(node, d);
                }
                debug_assert!(nodes.is_empty());
                (first_node, second_node)
            }
        }
    }

    /// Attaches an entry to this leaf and maintains the covering radius.
    pub fn attach_entry(&mut self, mut entry: Entry<D>, distance: f64) {
        entry.distance_to_parent = distance;
        self.radius = self.radius.max(distance);
        let Children::Entries(entries) = &mut self.children else {
            unreachable!("expected a leaf level");
        };
        debug_assert!(!entries.contains_key(&entry.data));
        entries.insert(entry.data.clone(), entry);
    }

    /// Attaches an already-built subtree under this node. The caller must
    /// have ruled out a routing-object collision at this level.
    pub fn attach_node(&mut self, mut node: Node<D>, distance: f64) {
        node.distance_to_parent = Some(distance);
        self.radius = self.radius.max(distance + node.radius);
        let key = node.data.clone();
        debug_assert!(!self.as_nodes().contains_key(&key));
        self.as_nodes_mut().insert(key, node);
    }

    /// Attaches a node at this routing level. When a sibling with the same
    /// routing object already exists, the incoming node's children are folded
    /// into it instead; the sibling may then overflow and split, cascading.
    fn add_node_child<F, S>(
        &mut self,
        child: Node<D>,
        distance: f64,
        ctx: &mut MutationCtx<'_, F, S>,
    ) where
        F: Fn(&D, &D) -> f64,
        S: SplitPolicy<D>,
    {
        let mut incoming = vec![(child, distance)];
        while let Some((node, distance)) = incoming.pop() {
            if !self.as_nodes().contains_key(&node.data) {
                self.attach_node(node, distance);
                continue;
            }

            let key = node.data.clone();
            for item in node.into_child_items() {
                let d = item.distance_to_parent();
                let existing = self.as_nodes_mut().get_mut(&key).unwrap();
                existing.add_child_item(item, d, ctx);
            }
            let (to_parent, absorbed_radius) = {
                let existing = &self.as_nodes()[&key];
                (existing.distance_to_parent.unwrap(), existing.radius)
            };
            self.radius = self.radius.max(to_parent + absorbed_radius);

            let overflow = self
                .as_nodes_mut()
                .get_mut(&key)
                .unwrap()
                .check_overflow(ctx);
            if let Some((first, second)) = overflow {
                self.as_nodes_mut().remove(&key);
                let d = (ctx.distance)(&self.data, &first.data);
                incoming.push((first, d));
                let d = (ctx.distance)(&self.data, &second.data);
                incoming.push((second, d));
            }
        }
    }

    fn add_child_item<F, S>(
        &mut self,
        item: ChildItem<D>,
        distance: f64,
        ctx: &mut MutationCtx<'_, F, S>,
    ) where
        F: Fn(&D, &D) -> f64,
        S: SplitPolicy<D>,
    {
        match item {
            ChildItem::Entry(entry) => self.attach_entry(entry, distance),
            ChildItem::Node(node) => self.add_node_child(node, distance, ctx),
        }
    }

    fn remove_child_item(&mut self, key: &D) -> ChildItem<D> {
        match &mut self.children {
            Children::Entries(entries) => ChildItem::Entry(entries.remove(key).unwrap()),
            Children::Nodes(nodes) => ChildItem::Node(nodes.remove(key).unwrap()),
        }
    }

    fn into_child_items(self) -> Vec<ChildItem<D>> {
        match self.children {
            Children::Entries(entries) => entries.into_values().map(ChildItem::Entry).collect(),
            Children::Nodes(nodes) => nodes.into_values().map(ChildItem::Node).collect(),
        }
    }

    /// Removes `data` from this subtree and reports an underflow to the
    /// caller when the node drops below its minimum capacity.
    fn remove_data<F, S>(
        &mut self,
        data: &D,
        distance: f64,
        ctx: &mut MutationCtx<'_, F, S>,
    ) -> RemoveOutcome
    where
        F: Fn(&D, &D) -> f64,
        S: SplitPolicy<D>,
    {
        match self.do_remove_data(data, distance, ctx) {
            RemoveOutcome::Removed if self.children.len() < ctx.min_capacity => {
                RemoveOutcome::Underflow
            }
            outcome => outcome,
        }
    }

    /// Removal without the capacity check; the tree applies the root's own
    /// capacity rules instead.
    pub fn do_remove_data<F, S>(
        &mut self,
        data: &D,
        distance: f64,
        ctx: &mut MutationCtx<'_, F, S>,
    ) -> RemoveOutcome
    where
        F: Fn(&D, &D) -> f64,
        S: SplitPolicy<D>,
    {
        if let Children::Entries(entries) = &mut self.children {
            return if entries.remove(data).is_some() {
                RemoveOutcome::Removed
            } else {
                RemoveOutcome::NotFound
            };
        }

        let keys: Vec<D> = self.as_nodes().keys().cloned().collect();
        for key in keys {
            let outcome = {
                let child = self.as_nodes_mut().get_mut(&key).unwrap();
                // Prune on the cached parent distance first, then on the
                // real distance against the covering radius.
                let to_parent = child.distance_to_parent.unwrap();
                if (distance - to_parent).abs() > child.radius {
                    continue;
                }
                let delta = (ctx.distance)(data, &child.data);
                if delta > child.radius {
                    continue;
                }
                child.remove_data(data, delta, ctx)
            };
            let updated_key = match outcome {
                RemoveOutcome::NotFound => continue,
                RemoveOutcome::Removed => key,
                RemoveOutcome::Underflow => self.balance_children(&key, ctx),
            };
            let (to_parent, child_radius) = {
                let child = &self.as_nodes()[&updated_key];
                (child.distance_to_parent.unwrap(), child.radius)
            };
            self.radius = self.radius.max(to_parent + child_radius);
            return RemoveOutcome::Removed;
        }
        RemoveOutcome::NotFound
    }

    /// Repairs an under-capacity child: pull the nearest grandchild from the
    /// nearest donor sibling, or merge the child into the nearest sibling
    /// that cannot donate. Returns the key of the node left standing.
    fn balance_children<F, S>(&mut self, child_key: &D, ctx: &mut MutationCtx<'_, F, S>) -> D
    where
        F: Fn(&D, &D) -> f64,
        S: SplitPolicy<D>,
    {
        let mut nearest_donor: Option<(D, f64)> = None;
        let mut nearest_merge: Option<(D, f64)> = None;
        for (key, sibling) in self.as_nodes() {
            if key == child_key {
                continue;
            }
            let d = (ctx.distance)(child_key, &sibling.data);
            if sibling.children.len() > ctx.min_capacity {
                if nearest_donor.as_ref().map_or(true, |(_, best)| d < *best) {
                    nearest_donor = Some((key.clone(), d));
                }
            } else if nearest_merge.as_ref().map_or(true, |(_, best)| d < *best) {
                nearest_merge = Some((key.clone(), d));
            }
        }

        if let Some((donor_key, _)) = nearest_donor {
            let (grandchild_key, grandchild_distance) = {
                let donor = &self.as_nodes()[&donor_key];
                let mut nearest: Option<(D, f64)> = None;
                match &donor.children {
                    Children::Entries(entries) => {
                        for entry in entries.values() {
                            let d = (ctx.distance)(&entry.data, child_key);
                            if nearest.as_ref().map_or(true, |(_, best)| d < *best) {
                                nearest = Some((entry.data.clone(), d));
                            }
                        }
                    }
                    Children::Nodes(nodes) => {
                        for node in nodes.values() {
                            let d = (ctx.distance)(&node.data, child_key);
                            if nearest.as_ref().map_or(true, |(_, best)| d < *best) {
                                nearest = Some((node.data.clone(), d));
                            }
                        }
                    }
                }
                nearest.unwrap()
            };
            let item = self
                .as_nodes_mut()
                .get_mut(&donor_key)
                .unwrap()
                .remove_child_item(&grandchild_key);
            let child = self.as_nodes_mut().get_mut(child_key).unwrap();
            child.add_child_item(item, grandchild_distance, ctx);
            child_key.clone()
        } else {
            let (merge_key, _) =
                nearest_merge.expect("an under-capacity node has at least one sibling");
            let under = self.as_nodes_mut().remove(child_key).unwrap();
            for item in under.into_child_items() {
                let d = {
                    let target = &self.as_nodes()[&merge_key];
                    (ctx.distance)(item.data(), &target.data)
                };
                let target = self.as_nodes_mut().get_mut(&merge_key).unwrap();
                target.add_child_item(item, d, ctx);
            }
            merge_key
        }
    }

    /// Walks the subtree asserting every structural invariant; returns the
    /// subtree height so the caller can verify leaves sit at equal depth.
    #[cfg(debug_assertions)]
    pub fn check<F>(
        &self,
        distance: &F,
        min_capacity: usize,
        max_capacity: usize,
        is_root: bool,
    ) -> usize
    where
        F: Fn(&D, &D) -> f64,
    {
        const EPSILON: f64 = 1e-9;

        assert!(self.radius >= 0.0);
        if is_root {
            assert!(self.distance_to_parent.is_none());
        } else {
            assert!(self.distance_to_parent.unwrap() >= 0.0);
        }

        let min = match (is_root, &self.children) {
            (true, Children::Entries(_)) => 1,
            (true, Children::Nodes(_)) => 2,
            (false, _) => min_capacity,
        };
        let len = self.children.len();
        assert!(len >= min, "node holds {len} children, minimum is {min}");
        assert!(
            len <= max_capacity,
            "node holds {len} children, maximum is {max_capacity}"
        );

        match &self.children {
            Children::Entries(entries) => {
                for (key, entry) in entries {
                    assert!(*key == entry.data);
                    let d = distance(&entry.data, &self.data);
                    assert!((d - entry.distance_to_parent).abs() <= EPSILON);
                    assert!(entry.distance_to_parent <= self.radius + EPSILON);
                }
                1
            }
            Children::Nodes(nodes) => {
                let mut height = None;
                for (key, child) in nodes {
                    assert!(*key == child.data);
                    let d = distance(&child.data, &self.data);
                    let to_parent = child.distance_to_parent.unwrap();
                    assert!((d - to_parent).abs() <= EPSILON);
                    assert!(to_parent + child.radius <= self.radius + EPSILON);
                    let child_height = child.check(distance, min_capacity, max_capacity, false);
                    match height {
                        None => height = Some(child_height),
                        Some(h) => assert_eq!(h, child_height, "leaves sit at equal depth"),
                    }
                }
                height.unwrap() + 1
            }
        }
    }
}
