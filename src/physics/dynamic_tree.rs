//! Dynamic AABB tree.
//!
//! A binary tree of fattened bounding boxes used by the broad phase. Leaves
//! are proxies; internal nodes bound their two children. Insertion picks the
//! sibling by a surface-area heuristic and the tree is kept balanced with
//! AVL-style rotations on the way back up.
//!
//! Nodes live in a pool and are addressed by index. Freed nodes are chained
//! through their `parent` slot and reused, so a [`ProxyId`] stays valid
//! until its proxy is destroyed.

use glam::Vec2;

use super::collider::Aabb;
use super::settings::{AABB_EXTENSION, AABB_MULTIPLIER};

/// Null node sentinel.
pub const NULL_NODE: u32 = u32::MAX;

/// Handle to a proxy (a leaf) in a [`DynamicTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(pub u32);

#[derive(Debug, Clone)]
struct TreeNode<T> {
    /// Fat AABB for leaves, union of children for internal nodes.
    aabb: Aabb,
    data: Option<T>,
    /// Parent index, or next free node while on the free list.
    parent: u32,
    child1: u32,
    child2: u32,
    /// 0 for leaves, -1 for free nodes.
    height: i32,
}

impl<T> TreeNode<T> {
    fn empty() -> Self {
        Self {
            aabb: Aabb {
                min: Vec2::ZERO,
                max: Vec2::ZERO,
            },
            data: None,
            parent: NULL_NODE,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: 0,
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// Dynamic AABB tree carrying a `T` per proxy.
#[derive(Debug, Clone)]
pub struct DynamicTree<T> {
    nodes: Vec<TreeNode<T>>,
    root: u32,
    free_list: u32,
    proxy_count: usize,
    /// Bit path used by [`rebalance`](Self::rebalance) to pick leaves round-robin.
    path: u32,
    margin: f32,
    multiplier: f32,
}

impl<T: Copy> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new(AABB_EXTENSION, AABB_MULTIPLIER)
    }
}

impl<T: Copy> DynamicTree<T> {
    /// Create an empty tree fattening leaves by `margin` and predicting
    /// motion with `multiplier * displacement`.
    pub fn new(margin: f32, multiplier: f32) -> Self {
        Self {
            nodes: Vec::new(),
            root: NULL_NODE,
            free_list: NULL_NODE,
            proxy_count: 0,
            path: 0,
            margin,
            multiplier,
        }
    }

    /// Insert a proxy for `aabb`. The stored box is fattened by the margin.
    pub fn create_proxy(&mut self, aabb: Aabb, data: T) -> ProxyId {
        debug_assert!(aabb.is_valid(), "invalid proxy AABB {:?}", aabb);
        let id = self.allocate_node();
        let node = &mut self.nodes[id as usize];
        node.aabb = aabb.fattened(self.margin);
        node.data = Some(data);
        node.height = 0;
        self.insert_leaf(id);
        self.proxy_count += 1;
        ProxyId(id)
    }

    pub fn destroy_proxy(&mut self, id: ProxyId) {
        debug_assert!(self.is_proxy(id), "destroying a non-proxy node {}", id.0);
        self.remove_leaf(id.0);
        self.free_node(id.0);
        self.proxy_count -= 1;
    }

    /// Move a proxy. Returns `true` if it had to be reinserted, which only
    /// happens when `aabb` is no longer inside the fat AABB.
    pub fn move_proxy(&mut self, id: ProxyId, aabb: Aabb, displacement: Vec2) -> bool {
        debug_assert!(self.is_proxy(id), "moving a non-proxy node {}", id.0);
        debug_assert!(aabb.is_valid(), "invalid proxy AABB {:?}", aabb);

        if self.nodes[id.0 as usize].aabb.contains(&aabb) {
            return false;
        }

        self.remove_leaf(id.0);
        let fat = aabb
            .fattened(self.margin)
            .displaced(self.multiplier * displacement);
        self.nodes[id.0 as usize].aabb = fat;
        self.insert_leaf(id.0);
        true
    }

    #[inline]
    pub fn fat_aabb(&self, id: ProxyId) -> Aabb {
        self.nodes[id.0 as usize].aabb
    }

    /// User data stored with a proxy.
    #[inline]
    pub fn user_data(&self, id: ProxyId) -> Option<T> {
        self.nodes.get(id.0 as usize).and_then(|n| n.data)
    }

    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    /// Change how future insertions and moves fatten their boxes.
    pub fn set_margins(&mut self, margin: f32, multiplier: f32) {
        self.margin = margin;
        self.multiplier = multiplier;
    }

    /// Height of the tree. An empty tree and a single leaf both have height 0.
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root as usize].height
        }
    }

    /// Largest height difference between the children of any internal node.
    pub fn max_balance(&self) -> i32 {
        self.nodes
            .iter()
            .filter(|n| n.height > 1)
            .map(|n| {
                let h1 = self.nodes[n.child1 as usize].height;
                let h2 = self.nodes[n.child2 as usize].height;
                (h2 - h1).abs()
            })
            .max()
            .unwrap_or(0)
    }

    /// Ratio of the summed node perimeters to the root perimeter.
    pub fn area_ratio(&self) -> f32 {
        if self.root == NULL_NODE {
            return 0.0;
        }
        let root_area = self.nodes[self.root as usize].aabb.perimeter();
        let total: f32 = self
            .nodes
            .iter()
            .filter(|n| n.height >= 0)
            .map(|n| n.aabb.perimeter())
            .sum();
        if root_area > 0.0 {
            total / root_area
        } else {
            0.0
        }
    }

    /// Visit every proxy whose fat AABB overlaps `aabb`. Returning `false`
    /// from the callback stops the query.
    pub fn query(&self, aabb: &Aabb, mut callback: impl FnMut(ProxyId) -> bool) {
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);
        while let Some(id) = stack.pop() {
            if id == NULL_NODE {
                continue;
            }
            let node = &self.nodes[id as usize];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if !callback(ProxyId(id)) {
                    return;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Remove and reinsert `iterations` leaves, walking a different path
    /// from the root each time. Improves tree quality after heavy churn.
    pub fn rebalance(&mut self, iterations: u32) {
        if self.root == NULL_NODE {
            return;
        }
        for _ in 0..iterations {
            let mut node = self.root;
            let mut bit = 0u32;
            while !self.nodes[node as usize].is_leaf() {
                let n = &self.nodes[node as usize];
                node = if (self.path >> bit) & 1 == 0 {
                    n.child1
                } else {
                    n.child2
                };
                bit = (bit + 1) & 31;
            }
            self.path = self.path.wrapping_add(1);
            self.remove_leaf(node);
            self.insert_leaf(node);
        }
    }

    /// Translate every node by `-new_origin`.
    pub fn shift_origin(&mut self, new_origin: Vec2) {
        for node in &mut self.nodes {
            node.aabb = node.aabb.translated(-new_origin);
        }
    }

    /// Check the structural invariants. Panics on violation.
    pub fn validate(&self) {
        if self.root != NULL_NODE {
            assert_eq!(self.nodes[self.root as usize].parent, NULL_NODE);
            self.validate_node(self.root);
        }
        let mut free = 0;
        let mut id = self.free_list;
        while id != NULL_NODE {
            assert_eq!(self.nodes[id as usize].height, -1, "free node {id} in use");
            free += 1;
            id = self.nodes[id as usize].parent;
        }
        let used = self.nodes.iter().filter(|n| n.height >= 0).count();
        assert_eq!(used + free, self.nodes.len(), "leaked tree nodes");
    }

    fn validate_node(&self, id: u32) {
        let node = &self.nodes[id as usize];
        if node.is_leaf() {
            assert_eq!(node.child2, NULL_NODE);
            assert_eq!(node.height, 0);
            assert!(node.data.is_some(), "leaf {id} without user data");
            return;
        }
        let (c1, c2) = (node.child1, node.child2);
        let (n1, n2) = (&self.nodes[c1 as usize], &self.nodes[c2 as usize]);
        assert_eq!(n1.parent, id);
        assert_eq!(n2.parent, id);
        assert_eq!(node.height, 1 + n1.height.max(n2.height), "bad height at {id}");
        assert!(
            node.aabb.contains(&n1.aabb) && node.aabb.contains(&n2.aabb),
            "node {id} does not bound its children"
        );
        self.validate_node(c1);
        self.validate_node(c2);
    }

    fn is_proxy(&self, id: ProxyId) -> bool {
        self.nodes
            .get(id.0 as usize)
            .map_or(false, |n| n.height == 0 && n.is_leaf())
    }

    fn allocate_node(&mut self) -> u32 {
        if self.free_list == NULL_NODE {
            self.nodes.push(TreeNode::empty());
            return (self.nodes.len() - 1) as u32;
        }
        let id = self.free_list;
        let node = &mut self.nodes[id as usize];
        self.free_list = node.parent;
        *node = TreeNode::empty();
        id
    }

    fn free_node(&mut self, id: u32) {
        let node = &mut self.nodes[id as usize];
        node.parent = self.free_list;
        node.child1 = NULL_NODE;
        node.child2 = NULL_NODE;
        node.data = None;
        node.height = -1;
        self.free_list = id;
    }

    fn insert_leaf(&mut self, leaf: u32) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL_NODE;
            return;
        }

        // Find the best sibling.
        let leaf_aabb = self.nodes[leaf as usize].aabb;
        let mut index = self.root;
        while !self.nodes[index as usize].is_leaf() {
            let node = &self.nodes[index as usize];
            let (child1, child2) = (node.child1, node.child2);

            let area = node.aabb.perimeter();
            let combined_area = node.aabb.combine(&leaf_aabb).perimeter();

            // Cost of a new parent for this node and the leaf.
            let cost = 2.0 * combined_area;
            // Minimum cost of pushing the leaf further down.
            let inheritance_cost = 2.0 * (combined_area - area);

            let cost1 = self.descend_cost(child1, &leaf_aabb) + inheritance_cost;
            let cost2 = self.descend_cost(child2, &leaf_aabb) + inheritance_cost;

            if cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 < cost2 { child1 } else { child2 };
        }
        let sibling = index;

        // New parent for sibling and leaf.
        let old_parent = self.nodes[sibling as usize].parent;
        let new_parent = self.allocate_node();
        {
            let sibling_node = &self.nodes[sibling as usize];
            let aabb = leaf_aabb.combine(&sibling_node.aabb);
            let height = sibling_node.height + 1;
            let p = &mut self.nodes[new_parent as usize];
            p.parent = old_parent;
            p.aabb = aabb;
            p.height = height;
            p.child1 = sibling;
            p.child2 = leaf;
        }
        self.nodes[sibling as usize].parent = new_parent;
        self.nodes[leaf as usize].parent = new_parent;

        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else {
            self.replace_child(old_parent, sibling, new_parent);
        }

        // Walk back up fixing heights and boxes.
        self.refit_from(self.nodes[leaf as usize].parent);
    }

    fn descend_cost(&self, child: u32, leaf_aabb: &Aabb) -> f32 {
        let node = &self.nodes[child as usize];
        let combined = leaf_aabb.combine(&node.aabb).perimeter();
        if node.is_leaf() {
            combined
        } else {
            combined - node.aabb.perimeter()
        }
    }

    fn remove_leaf(&mut self, leaf: u32) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf as usize].parent;
        let grand_parent = self.nodes[parent as usize].parent;
        let sibling = {
            let p = &self.nodes[parent as usize];
            if p.child1 == leaf {
                p.child2
            } else {
                p.child1
            }
        };

        if grand_parent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling as usize].parent = NULL_NODE;
            self.free_node(parent);
            return;
        }

        self.replace_child(grand_parent, parent, sibling);
        self.nodes[sibling as usize].parent = grand_parent;
        self.free_node(parent);
        self.refit_from(grand_parent);
    }

    fn replace_child(&mut self, parent: u32, old: u32, new: u32) {
        let p = &mut self.nodes[parent as usize];
        if p.child1 == old {
            p.child1 = new;
        } else {
            debug_assert_eq!(p.child2, old);
            p.child2 = new;
        }
    }

    fn refit_from(&mut self, mut index: u32) {
        while index != NULL_NODE {
            index = self.balance(index);
            let (c1, c2) = {
                let n = &self.nodes[index as usize];
                (n.child1, n.child2)
            };
            debug_assert!(c1 != NULL_NODE && c2 != NULL_NODE);
            let aabb = self.nodes[c1 as usize].aabb.combine(&self.nodes[c2 as usize].aabb);
            let height = 1 + self.nodes[c1 as usize]
                .height
                .max(self.nodes[c2 as usize].height);
            let node = &mut self.nodes[index as usize];
            node.aabb = aabb;
            node.height = height;
            index = node.parent;
        }
    }

    /// Rotate the subtree at `ia` if it is imbalanced. Returns the index of
    /// the new subtree root.
    fn balance(&mut self, ia: u32) -> u32 {
        let a = &self.nodes[ia as usize];
        if a.is_leaf() || a.height < 2 {
            return ia;
        }
        let (ib, ic) = (a.child1, a.child2);
        let balance = self.nodes[ic as usize].height - self.nodes[ib as usize].height;

        if balance > 1 {
            self.rotate_up(ia, ic, ib, false)
        } else if balance < -1 {
            self.rotate_up(ia, ib, ic, true)
        } else {
            ia
        }
    }

    /// Promote child `iup` of `ia` above it. `iother` is `ia`'s other child.
    /// `up_is_child1` tells which slot of `ia` `iup` occupied.
    fn rotate_up(&mut self, ia: u32, iup: u32, iother: u32, up_is_child1: bool) -> u32 {
        let (if_, ig) = {
            let up = &self.nodes[iup as usize];
            (up.child1, up.child2)
        };

        // Swap A and the promoted node.
        let a_parent = self.nodes[ia as usize].parent;
        {
            let up = &mut self.nodes[iup as usize];
            up.child1 = ia;
            up.parent = a_parent;
        }
        self.nodes[ia as usize].parent = iup;

        if a_parent == NULL_NODE {
            self.root = iup;
        } else {
            self.replace_child(a_parent, ia, iup);
        }

        // Keep the taller grandchild under the promoted node, hand the other to A.
        let (keep, give) = if self.nodes[if_ as usize].height > self.nodes[ig as usize].height {
            (if_, ig)
        } else {
            (ig, if_)
        };

        self.nodes[iup as usize].child2 = keep;
        if up_is_child1 {
            self.nodes[ia as usize].child1 = give;
        } else {
            self.nodes[ia as usize].child2 = give;
        }
        self.nodes[give as usize].parent = ia;

        let a_aabb = self.nodes[iother as usize].aabb.combine(&self.nodes[give as usize].aabb);
        let a_height = 1 + self.nodes[iother as usize]
            .height
            .max(self.nodes[give as usize].height);
        {
            let a = &mut self.nodes[ia as usize];
            a.aabb = a_aabb;
            a.height = a_height;
        }
        let up_aabb = a_aabb.combine(&self.nodes[keep as usize].aabb);
        let up_height = 1 + a_height.max(self.nodes[keep as usize].height);
        let up = &mut self.nodes[iup as usize];
        up.aabb = up_aabb;
        up.height = up_height;
        iup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(x: f32, y: f32) -> Aabb {
        Aabb::new(Vec2::new(x, y), Vec2::new(x + 1.0, y + 1.0))
    }

    fn collect(tree: &DynamicTree<u32>, aabb: &Aabb) -> Vec<u32> {
        let mut hits = Vec::new();
        tree.query(aabb, |id| {
            hits.push(tree.user_data(id).unwrap());
            true
        });
        hits.sort_unstable();
        hits
    }

    #[test]
    fn test_create_and_query() {
        let mut tree = DynamicTree::default();
        for i in 0..10u32 {
            tree.create_proxy(unit_box(i as f32 * 3.0, 0.0), i);
        }
        tree.validate();
        assert_eq!(tree.proxy_count(), 10);
        assert_eq!(collect(&tree, &unit_box(6.2, 0.2)), vec![2]);
        assert!(collect(&tree, &unit_box(0.0, 10.0)).is_empty());
    }

    #[test]
    fn test_move_inside_fat_box_is_not_reinserted() {
        let mut tree = DynamicTree::default();
        let id = tree.create_proxy(unit_box(0.0, 0.0), 7u32);
        let jitter = Aabb::new(Vec2::new(0.05, 0.0), Vec2::new(1.05, 1.0));
        assert!(!tree.move_proxy(id, jitter, Vec2::new(0.05, 0.0)));

        let far = unit_box(5.0, 0.0);
        assert!(tree.move_proxy(id, far, Vec2::new(5.0, 0.0)));
        let fat = tree.fat_aabb(id);
        assert!(fat.contains(&far));
        assert!(fat.max.x > far.max.x + tree.margin(), "fat box should be stretched along motion");
        tree.validate();
    }

    #[test]
    fn test_destroy_reuses_nodes_and_stays_balanced() {
        let mut tree = DynamicTree::default();
        let ids: Vec<_> = (0..64u32)
            .map(|i| tree.create_proxy(unit_box(i as f32 * 1.5, 0.0), i))
            .collect();
        tree.validate();
        assert!(tree.height() < 20, "tree too tall: {}", tree.height());
        assert!(tree.area_ratio() > 1.0);

        for id in ids.iter().step_by(2) {
            tree.destroy_proxy(*id);
        }
        tree.validate();
        assert_eq!(tree.proxy_count(), 32);

        let again = tree.create_proxy(unit_box(-10.0, 0.0), 100);
        assert!(again.0 < 127, "freed nodes should be reused");
        tree.validate();
    }

    #[test]
    fn test_rebalance_keeps_every_proxy() {
        let mut tree = DynamicTree::default();
        for i in 0..32u32 {
            tree.create_proxy(unit_box((i % 8) as f32 * 2.0, (i / 8) as f32 * 2.0), i);
        }
        tree.rebalance(16);
        tree.validate();
        let everything = Aabb::new(Vec2::splat(-100.0), Vec2::splat(100.0));
        assert_eq!(collect(&tree, &everything), (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_shift_origin_translates_boxes() {
        let mut tree = DynamicTree::default();
        let id = tree.create_proxy(unit_box(10.0, 10.0), 1u32);
        let before = tree.fat_aabb(id);
        tree.shift_origin(Vec2::new(10.0, 10.0));
        let after = tree.fat_aabb(id);
        assert_eq!(after.min, before.min - Vec2::new(10.0, 10.0));
        assert_eq!(collect(&tree, &unit_box(0.0, 0.0)), vec![1]);
    }
}
