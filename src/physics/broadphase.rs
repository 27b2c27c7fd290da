//! Broad-phase collision detection over a dynamic AABB tree.
//!
//! The broad phase buffers proxies that were created, moved out of their
//! fat box or touched since the last [`BroadPhase::update_pairs`]. Pair
//! updates only query the tree for buffered proxies, so the cost per step
//! tracks the number of moving shapes rather than the total.

use glam::Vec2;

use super::collider::Aabb;
use super::dynamic_tree::{DynamicTree, ProxyId};
use super::settings::{AABB_EXTENSION, AABB_MULTIPLIER};

/// Configuration for the broad phase.
#[derive(Debug, Clone)]
pub struct BroadPhaseConf {
    /// Margin added around every proxy. Default: 0.1.
    pub aabb_extension: f32,
    /// Multiplier on displacement when predicting proxy motion. Default: 2.
    pub displace_multiplier: f32,
    /// Initial capacity of the move buffer. Default: 16.
    pub move_capacity: usize,
    /// Initial capacity of the pair buffer. Default: 16.
    pub pair_capacity: usize,
    /// Leaves reinserted by a tree rebalance after each pair update.
    /// Default: 0 (no rebalancing).
    pub rebalance_iterations: u32,
}

impl Default for BroadPhaseConf {
    fn default() -> Self {
        Self {
            aabb_extension: AABB_EXTENSION,
            displace_multiplier: AABB_MULTIPLIER,
            move_capacity: 16,
            pair_capacity: 16,
            rebalance_iterations: 0,
        }
    }
}

/// A candidate pair reported by the broad phase. Always `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProxyPair {
    pub a: ProxyId,
    pub b: ProxyId,
}

impl ProxyPair {
    #[inline]
    pub fn new(p: ProxyId, q: ProxyId) -> Self {
        Self {
            a: p.min(q),
            b: p.max(q),
        }
    }
}

/// Broad phase owning the proxy tree and its move and pair buffers.
#[derive(Debug, Clone)]
pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    /// Proxies to re-query. `None` marks a proxy destroyed after buffering.
    move_buffer: Vec<Option<ProxyId>>,
    pair_buffer: Vec<ProxyPair>,
    rebalance_iterations: u32,
}

impl<T: Copy> Default for BroadPhase<T> {
    fn default() -> Self {
        Self::new(&BroadPhaseConf::default())
    }
}

impl<T: Copy> BroadPhase<T> {
    pub fn new(conf: &BroadPhaseConf) -> Self {
        Self {
            tree: DynamicTree::new(conf.aabb_extension, conf.displace_multiplier),
            move_buffer: Vec::with_capacity(conf.move_capacity),
            pair_buffer: Vec::with_capacity(conf.pair_capacity),
            rebalance_iterations: conf.rebalance_iterations,
        }
    }

    /// Create a proxy and buffer it so it is paired on the next update.
    pub fn create_proxy(&mut self, aabb: Aabb, data: T) -> ProxyId {
        let id = self.tree.create_proxy(aabb, data);
        self.buffer_move(id);
        id
    }

    pub fn destroy_proxy(&mut self, id: ProxyId) {
        self.unbuffer_move(id);
        self.tree.destroy_proxy(id);
    }

    /// Move a proxy. It is only buffered when the tree had to reinsert it.
    pub fn move_proxy(&mut self, id: ProxyId, aabb: Aabb, displacement: Vec2) -> bool {
        let reinserted = self.tree.move_proxy(id, aabb, displacement);
        if reinserted {
            self.buffer_move(id);
        }
        reinserted
    }

    /// Force a proxy to be re-paired on the next update.
    pub fn touch_proxy(&mut self, id: ProxyId) {
        self.buffer_move(id);
    }

    /// Report every new overlapping pair once, in sorted order.
    ///
    /// `callback` receives the user data of both proxies and returns whether
    /// it accepted the pair. Returns the number of accepted pairs.
    pub fn update_pairs(&mut self, mut callback: impl FnMut(T, T) -> bool) -> usize {
        self.pair_buffer.clear();

        let tree = &self.tree;
        let pairs = &mut self.pair_buffer;
        for query_id in self.move_buffer.iter().flatten().copied() {
            // Query with the fat box so pairs are found before the fat boxes touch.
            let fat = tree.fat_aabb(query_id);
            tree.query(&fat, |id| {
                if id != query_id {
                    pairs.push(ProxyPair::new(id, query_id));
                }
                true
            });
        }
        self.move_buffer.clear();

        self.pair_buffer.sort_unstable();

        let mut accepted = 0;
        let mut previous: Option<ProxyPair> = None;
        for &pair in &self.pair_buffer {
            if previous == Some(pair) {
                continue;
            }
            previous = Some(pair);
            debug_assert!(pair.a < pair.b, "unordered pair {:?}", pair);
            let (Some(a), Some(b)) = (self.tree.user_data(pair.a), self.tree.user_data(pair.b))
            else {
                continue;
            };
            if callback(a, b) {
                accepted += 1;
            }
        }
        self.pair_buffer.clear();

        if self.rebalance_iterations > 0 {
            self.tree.rebalance(self.rebalance_iterations);
        }

        accepted
    }

    /// Whether the fat boxes of two proxies overlap.
    #[inline]
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        self.tree.fat_aabb(a).overlaps(&self.tree.fat_aabb(b))
    }

    #[inline]
    pub fn fat_aabb(&self, id: ProxyId) -> Aabb {
        self.tree.fat_aabb(id)
    }

    #[inline]
    pub fn user_data(&self, id: ProxyId) -> Option<T> {
        self.tree.user_data(id)
    }

    /// Visit every proxy overlapping `aabb`.
    pub fn query(&self, aabb: &Aabb, callback: impl FnMut(ProxyId) -> bool) {
        self.tree.query(aabb, callback);
    }

    pub fn shift_origin(&mut self, new_origin: Vec2) {
        self.tree.shift_origin(new_origin);
    }

    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    /// Number of buffered slots, tombstones included.
    pub fn move_count(&self) -> usize {
        self.move_buffer.len()
    }

    pub fn tree(&self) -> &DynamicTree<T> {
        &self.tree
    }

    /// Fattening margin and displacement multiplier for later moves.
    pub fn set_margins(&mut self, aabb_extension: f32, displace_multiplier: f32) {
        self.tree.set_margins(aabb_extension, displace_multiplier);
    }

    pub fn set_rebalance_iterations(&mut self, iterations: u32) {
        self.rebalance_iterations = iterations;
    }

    fn buffer_move(&mut self, id: ProxyId) {
        self.move_buffer.push(Some(id));
    }

    fn unbuffer_move(&mut self, id: ProxyId) {
        for slot in self.move_buffer.iter_mut() {
            if *slot == Some(id) {
                *slot = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn square(x: f32, y: f32, half: f32) -> Aabb {
        Aabb::new(Vec2::new(x - half, y - half), Vec2::new(x + half, y + half))
    }

    fn collect_pairs(bp: &mut BroadPhase<u32>) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        bp.update_pairs(|a, b| {
            out.push((a.min(b), a.max(b)));
            true
        });
        out
    }

    #[test]
    fn test_new_proxies_pair_once() {
        let mut bp = BroadPhase::default();
        bp.create_proxy(square(0.0, 0.0, 1.0), 0u32);
        bp.create_proxy(square(1.0, 0.0, 1.0), 1);
        bp.create_proxy(square(10.0, 0.0, 1.0), 2);

        // Both overlapping proxies are buffered, so the pair is found twice
        // and must be reported once.
        assert_eq!(collect_pairs(&mut bp), vec![(0, 1)]);
        assert_eq!(bp.move_count(), 0, "move buffer should be cleared");
        assert!(collect_pairs(&mut bp).is_empty(), "nothing moved since the last update");
    }

    #[test]
    fn test_small_moves_do_not_buffer() {
        let mut bp = BroadPhase::default();
        let a = bp.create_proxy(square(0.0, 0.0, 1.0), 0u32);
        collect_pairs(&mut bp);

        assert!(!bp.move_proxy(a, square(0.05, 0.0, 1.0), Vec2::new(0.05, 0.0)));
        assert_eq!(bp.move_count(), 0);
        assert!(bp.move_proxy(a, square(3.0, 0.0, 1.0), Vec2::new(3.0, 0.0)));
        assert_eq!(bp.move_count(), 1);
    }

    #[test]
    fn test_destroyed_proxy_is_tombstoned() {
        let mut bp = BroadPhase::default();
        let a = bp.create_proxy(square(0.0, 0.0, 1.0), 0u32);
        bp.create_proxy(square(0.5, 0.0, 1.0), 1);
        bp.destroy_proxy(a);
        assert_eq!(bp.move_count(), 2, "slot should be nulled, not removed");
        assert!(collect_pairs(&mut bp).is_empty());
    }

    #[test]
    fn test_touch_proxy_reports_existing_overlap() {
        let mut bp = BroadPhase::default();
        let a = bp.create_proxy(square(0.0, 0.0, 1.0), 0u32);
        bp.create_proxy(square(0.5, 0.0, 1.0), 1);
        collect_pairs(&mut bp);

        bp.touch_proxy(a);
        assert_eq!(collect_pairs(&mut bp), vec![(0, 1)]);
    }

    #[test]
    fn test_callback_rejections_are_not_counted() {
        let mut bp = BroadPhase::default();
        for i in 0..4u32 {
            bp.create_proxy(square(i as f32 * 0.5, 0.0, 1.0), i);
        }
        let accepted = bp.update_pairs(|a, b| (a + b) % 2 == 1);
        // Pairs: (0,1) (0,2) (0,3) (1,2) (1,3) (2,3); odd sums: (0,1) (0,3) (1,2) (2,3)
        assert_eq!(accepted, 4);
    }

    #[test]
    fn test_pairs_arrive_sorted_by_proxy_id() {
        let mut bp = BroadPhase::default();
        let ids: Vec<ProxyId> = (0..5u32)
            .map(|i| bp.create_proxy(square(0.0, 0.0, 1.0 + i as f32), i))
            .collect();
        let mut seen = Vec::new();
        bp.update_pairs(|a, b| {
            seen.push(ProxyPair::new(ids[a as usize], ids[b as usize]));
            true
        });
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
        assert_eq!(seen.len(), 10);
    }

    proptest! {
        #[test]
        fn prop_pairs_are_unique_and_overlapping(
            boxes in prop::collection::vec((-20.0f32..20.0, -20.0f32..20.0, 0.1f32..3.0), 1..40)
        ) {
            let mut bp = BroadPhase::default();
            let ids: Vec<ProxyId> = boxes
                .iter()
                .enumerate()
                .map(|(i, &(x, y, h))| bp.create_proxy(square(x, y, h), i as u32))
                .collect();

            let mut reported = Vec::new();
            bp.update_pairs(|a, b| {
                reported.push((a.min(b), a.max(b)));
                true
            });

            let mut dedup = reported.clone();
            dedup.sort_unstable();
            dedup.dedup();
            prop_assert_eq!(dedup.len(), reported.len());

            for &(a, b) in &reported {
                prop_assert!(a != b);
                prop_assert!(bp.test_overlap(ids[a as usize], ids[b as usize]));
            }

            // Every overlapping fat pair is found.
            let mut expected = 0;
            for i in 0..ids.len() {
                for j in (i + 1)..ids.len() {
                    if bp.test_overlap(ids[i], ids[j]) {
                        expected += 1;
                    }
                }
            }
            prop_assert_eq!(expected, reported.len());
        }
    }
}
