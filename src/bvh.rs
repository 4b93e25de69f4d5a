use glam::Vec3;
use log::debug;

use crate::aabb::Aabb;
use crate::ray::{Ray, RayCastInput};
use crate::scene::{Scene, SceneRayCastOutput};
use crate::shape::ShapeId;

/// Sentinel index for absent parent/child/shape links.
pub const NIL: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Node {
    pub aabb: Aabb,
    /// Shape array index; valid only at leaves, `NIL` on inner nodes.
    pub shape: u32,
    pub parent: u32,
    pub left: u32,
    pub right: u32,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.left == NIL
    }
}

/// Bounding-volume hierarchy stored as a flat node array ordered so that
/// every node's parent precedes it. The root is node 0.
pub struct Bvh {
    pub nodes: Vec<Node>,
    /// Maximum root-to-leaf node count; a traversal stack never needs more
    /// slots than this.
    pub depth: u32,
}

/// Verdict returned by a `ray_cast` callback for each leaf hit it is shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RayCastFlow {
    /// Keep searching with the current clip distance.
    Continue,
    /// Tighten the clip distance to this hit and keep searching.
    Clip,
    /// Unwind immediately.
    Stop,
}

// Insert two zero bits between each of the low 21 bits of `src`
// (...1011 becomes ...001_000_001_001).
fn sparsify_u21(src: u64) -> u64 {
    debug_assert_eq!(src >> 21, 0);
    let mut dst = src;
    dst = (dst | (dst << 32)) & 0x001F_0000_0000_FFFF;
    dst = (dst | (dst << 16)) & 0x001F_0000_FF00_00FF;
    dst = (dst | (dst << 8)) & 0x100F_00F0_0F00_F00F;
    dst = (dst | (dst << 4)) & 0x10C3_0C30_C30C_30C3;
    dst = (dst | (dst << 2)) & 0x1249_2492_4924_9249;
    dst
}

fn interleave_u21(a: u64, b: u64, c: u64) -> u64 {
    (sparsify_u21(a) << 2) | (sparsify_u21(b) << 1) | sparsify_u21(c)
}

/// Approximate agglomerative clustering: leaves are sorted along a Morton
/// curve, the curve recursively partitions them into spans, and within each
/// span clusters are merged greedily by minimal merged-surface-area until a
/// budget `f(n)` of clusters survives to the parent span.
const DELTA: usize = 8;

#[derive(Clone, Copy)]
struct Cluster {
    aabb: Aabb,
    z_order: u64,
    src_index: u32,
    parent: u32,
    left: u32,
    right: u32,
    // Intrusive doubly-linked list of live clusters within a span.
    prev: u32,
    next: u32,
    best_cost: f32,
    best_match: u32,
    prim_count: u32,
    // Assigned during finalization.
    depth: u32,
    remap: u32,
}

impl Cluster {
    fn empty() -> Self {
        Self {
            aabb: Aabb::invalid(),
            z_order: 0,
            src_index: NIL,
            parent: NIL,
            left: NIL,
            right: NIL,
            prev: NIL,
            next: NIL,
            best_cost: f32::MAX,
            best_match: NIL,
            prim_count: 0,
            depth: 0,
            remap: NIL,
        }
    }
}

#[derive(Clone, Copy)]
struct ClusterList {
    first: u32,
    last: u32,
    count: usize,
}

struct Builder {
    clusters: Vec<Cluster>,
    /// Next free slot for an agglomerated cluster. The vector is pre-sized to
    /// `2 * leaf_count - 1`, which is exactly the node count of a binary tree
    /// with that many leaves, so allocation cannot fail.
    node_count: usize,
}

impl Builder {
    /// Target cluster count for a span of `n` leaves: `c * n^(1/2)` with
    /// `c = sqrt(delta) / 2`.
    fn f(n: usize) -> usize {
        let a = ((n * DELTA) as f32).sqrt() * 0.5;
        (a as usize).max(1)
    }

    fn build(leaf_aabbs: &[Aabb], leaf_shape_ids: &[ShapeId]) -> Bvh {
        let leaf_count = leaf_aabbs.len();
        assert_eq!(leaf_count, leaf_shape_ids.len());
        if leaf_count == 0 {
            return Bvh {
                nodes: Vec::new(),
                depth: 0,
            };
        }

        let capacity = 2 * leaf_count - 1;
        let mut builder = Builder {
            clusters: vec![Cluster::empty(); capacity],
            node_count: leaf_count,
        };

        // Normalize centroids into the cube flush with the low corner of the
        // centroid bounds, spanning its longest axis. Assuming reasonably
        // uniform leaf distribution this biases each Morton bit split toward
        // the longest axis.
        let mut centers_aabb = Aabb::invalid();
        for aabb in leaf_aabbs {
            let center = aabb.center();
            centers_aabb.min = centers_aabb.min.min(center);
            centers_aabb.max = centers_aabb.max.max(center);
        }
        let span = centers_aabb.max - centers_aabb.min;
        let span_max = span.x.max(span.y).max(span.z);
        let inv_span = if span_max < crate::math::EPS {
            0.0
        } else {
            1.0 / span_max
        };

        let to_grid = ((1u32 << 21) - 1) as f32;
        for (i, aabb) in leaf_aabbs.iter().enumerate() {
            let norm = ((aabb.center() - centers_aabb.min) * inv_span).clamp(Vec3::ZERO, Vec3::ONE);
            let grid = norm * to_grid;
            let cluster = &mut builder.clusters[i];
            cluster.aabb = *aabb;
            cluster.z_order = interleave_u21(grid.x as u64, grid.y as u64, grid.z as u64);
            cluster.src_index = i as u32;
            cluster.prim_count = 1;
        }
        builder.clusters[..leaf_count]
            .sort_by(|a, b| (a.z_order, a.src_index).cmp(&(b.z_order, b.src_index)));

        let half_baked = builder.build_tree(0, leaf_count, 62);
        let root_list = builder.combine_clusters(half_baked, 1);
        debug_assert_eq!(root_list.count, 1);
        debug_assert_eq!(root_list.first, root_list.last);
        debug_assert_eq!(builder.clusters[root_list.first as usize].parent, NIL);
        debug_assert_eq!(builder.node_count, capacity);

        // Depth-first walk assigns output indices in parent-before-children
        // order and tracks the deepest leaf.
        let mut depth = 0u32;
        let mut stack = Vec::with_capacity(capacity);
        stack.push(root_list.first);
        builder.clusters[root_list.first as usize].depth = 0;
        let mut node_idx = 0u32;
        while let Some(cluster_idx) = stack.pop() {
            let (left, right, cluster_depth) = {
                let cluster = &mut builder.clusters[cluster_idx as usize];
                debug_assert_eq!(cluster.remap, NIL);
                cluster.remap = node_idx;
                (cluster.left, cluster.right, cluster.depth)
            };
            node_idx += 1;
            debug_assert_eq!(left == NIL, right == NIL);
            if left != NIL {
                stack.push(left);
                stack.push(right);
                builder.clusters[left as usize].depth = cluster_depth + 1;
                builder.clusters[right as usize].depth = cluster_depth + 1;
                depth = depth.max(cluster_depth + 1);
            }
        }
        depth += 1;

        let placeholder = Node {
            aabb: Aabb::invalid(),
            shape: NIL,
            parent: NIL,
            left: NIL,
            right: NIL,
        };
        let mut nodes = vec![placeholder; capacity];
        for cluster in &builder.clusters {
            let remap_of = |idx: u32| {
                if idx == NIL {
                    NIL
                } else {
                    builder.clusters[idx as usize].remap
                }
            };
            nodes[cluster.remap as usize] = Node {
                aabb: cluster.aabb,
                shape: if cluster.src_index == NIL {
                    NIL
                } else {
                    leaf_shape_ids[cluster.src_index as usize].0
                },
                parent: remap_of(cluster.parent),
                left: remap_of(cluster.left),
                right: remap_of(cluster.right),
            };
        }

        debug!("bvh built: {} nodes, depth {}", nodes.len(), depth);
        Bvh { nodes, depth }
    }

    /// Binary-search the Morton-sorted span for the index where `bit` flips
    /// from 0 to 1. `None` when the whole span agrees on that bit.
    fn make_partition(&self, begin: usize, end: usize, bit: u32) -> Option<usize> {
        debug_assert!(end - begin >= DELTA);
        let mut i = begin;
        let mut k = end;
        loop {
            let j = (i + k) / 2;
            debug_assert!(i < j && j < k);
            let bit_l = (self.clusters[j - 1].z_order >> bit) & 1 == 1;
            let bit_r = (self.clusters[j].z_order >> bit) & 1 == 1;
            debug_assert!(bit_r || !bit_l);
            if bit_l != bit_r {
                return Some(j);
            }
            if bit_l {
                k = j;
            } else {
                i = j;
            }
            if i + 1 >= k {
                return None;
            }
        }
    }

    fn link_range(&mut self, begin: usize, end: usize) -> ClusterList {
        for i in begin + 1..end {
            self.clusters[i].prev = (i - 1) as u32;
            self.clusters[i - 1].next = i as u32;
        }
        ClusterList {
            first: begin as u32,
            last: (end - 1) as u32,
            count: end - begin,
        }
    }

    fn build_tree(&mut self, begin: usize, end: usize, bit_pos: i32) -> ClusterList {
        let count = end - begin;
        debug_assert!(count > 0);
        if count < DELTA {
            let list = self.link_range(begin, end);
            return self.combine_clusters(list, Self::f(DELTA));
        }

        let mut mid = None;
        let mut bit = bit_pos;
        while mid.is_none() && bit >= 0 {
            mid = self.make_partition(begin, end, bit as u32);
            bit -= 1;
        }

        match mid {
            Some(mid) => {
                let left = self.build_tree(begin, mid, bit);
                let right = self.build_tree(mid, end, bit);
                debug_assert!(left.count > 0 && right.count > 0);
                debug_assert_eq!(self.clusters[left.last as usize].next, NIL);
                debug_assert_eq!(self.clusters[right.first as usize].prev, NIL);
                self.clusters[left.last as usize].next = right.first;
                self.clusters[right.first as usize].prev = left.last;
                let union = ClusterList {
                    first: left.first,
                    last: right.last,
                    count: left.count + right.count,
                };
                self.combine_clusters(union, Self::f(count))
            }
            None => {
                // Every leaf in the span shares one Morton code; no spatial
                // split exists, so combine the span directly.
                let list = self.link_range(begin, end);
                self.combine_clusters(list, Self::f(DELTA))
            }
        }
    }

    fn find_best_match(&mut self, cluster_idx: u32, list: &ClusterList) {
        let aabb_a = self.clusters[cluster_idx as usize].aabb;
        let mut best_cost = f32::MAX;
        let mut best_match = NIL;
        let mut other_idx = list.first;
        for _ in 0..list.count {
            if other_idx != cluster_idx {
                let merged = Aabb::merge(aabb_a, self.clusters[other_idx as usize].aabb);
                let cost = merged.half_area();
                if cost < best_cost {
                    best_cost = cost;
                    best_match = other_idx;
                }
            }
            other_idx = self.clusters[other_idx as usize].next;
        }
        debug_assert_eq!(other_idx, NIL);
        let cluster = &mut self.clusters[cluster_idx as usize];
        cluster.best_cost = best_cost;
        cluster.best_match = best_match;
    }

    fn unlink(&mut self, list: &mut ClusterList, idx: u32) {
        let (prev, next) = {
            let c = &self.clusters[idx as usize];
            (c.prev, c.next)
        };
        if prev != NIL {
            self.clusters[prev as usize].next = next;
        }
        if next != NIL {
            self.clusters[next as usize].prev = prev;
        }
        if list.first == idx {
            list.first = next;
        }
        if list.last == idx {
            list.last = prev;
        }
        let c = &mut self.clusters[idx as usize];
        c.prev = NIL;
        c.next = NIL;
        list.count -= 1;
    }

    fn append(&mut self, list: &mut ClusterList, idx: u32) {
        self.clusters[idx as usize].prev = list.last;
        if list.last != NIL {
            self.clusters[list.last as usize].next = idx;
            list.last = idx;
        } else {
            debug_assert_eq!(list.first, NIL);
            list.first = idx;
            list.last = idx;
        }
        list.count += 1;
    }

    fn combine_clusters(&mut self, list: ClusterList, target: usize) -> ClusterList {
        debug_assert!(target >= 1);
        let mut list = list;

        let mut idx = list.first;
        for _ in 0..list.count {
            self.find_best_match(idx, &list);
            idx = self.clusters[idx as usize].next;
        }
        debug_assert_eq!(idx, NIL);

        while list.count > target {
            // Cheapest pending merge across the whole list.
            let mut best_cost = f32::MAX;
            let mut idx_l = NIL;
            let mut idx_r = NIL;
            let mut idx = list.first;
            for _ in 0..list.count {
                let cluster = &self.clusters[idx as usize];
                if cluster.best_cost < best_cost {
                    best_cost = cluster.best_cost;
                    idx_l = idx;
                    idx_r = cluster.best_match;
                }
                idx = cluster.next;
            }
            debug_assert_eq!(idx, NIL);
            debug_assert!(idx_l != NIL && idx_r != NIL && idx_l != idx_r);

            debug_assert!(self.node_count < self.clusters.len());
            let idx_merged = self.node_count as u32;
            self.node_count += 1;

            let (aabb_l, prim_l) = {
                let c = &mut self.clusters[idx_l as usize];
                debug_assert_eq!(c.parent, NIL);
                c.parent = idx_merged;
                (c.aabb, c.prim_count)
            };
            let (aabb_r, prim_r) = {
                let c = &mut self.clusters[idx_r as usize];
                debug_assert_eq!(c.parent, NIL);
                c.parent = idx_merged;
                (c.aabb, c.prim_count)
            };
            {
                let merged = &mut self.clusters[idx_merged as usize];
                merged.left = idx_l;
                merged.right = idx_r;
                merged.aabb = Aabb::merge(aabb_l, aabb_r);
                merged.prim_count = prim_l + prim_r;
            }

            self.unlink(&mut list, idx_l);
            self.unlink(&mut list, idx_r);
            self.append(&mut list, idx_merged);

            self.find_best_match(idx_merged, &list);

            // Any cluster that was matched against one of the merged pair
            // needs a fresh match.
            let mut idx = list.first;
            for _ in 0..list.count {
                let best_match = self.clusters[idx as usize].best_match;
                let next = self.clusters[idx as usize].next;
                if best_match == idx_l || best_match == idx_r {
                    self.find_best_match(idx, &list);
                }
                idx = next;
            }
            debug_assert_eq!(idx, NIL);
        }

        list
    }
}

impl Bvh {
    pub fn build(leaf_aabbs: &[Aabb], leaf_shape_ids: &[ShapeId]) -> Bvh {
        let bvh = Builder::build(leaf_aabbs, leaf_shape_ids);
        #[cfg(debug_assertions)]
        bvh.validate(leaf_aabbs.len());
        bvh
    }

    /// Closest hit along the ray, if any. Unordered stack traversal; the clip
    /// distance tightens as hits are found, culling whole subtrees.
    pub fn ray_cast_closest(
        &self,
        scene: &Scene,
        input: &RayCastInput,
    ) -> Option<SceneRayCastOutput> {
        if self.nodes.is_empty() {
            return None;
        }

        let ray = Ray {
            origin: input.origin,
            direction: input.direction,
        };
        let mut max_lambda = input.max_lambda;
        let mut best: Option<SceneRayCastOutput> = None;

        let mut stack: Vec<u32> = Vec::with_capacity(self.depth as usize + 1);
        stack.push(0);
        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx as usize];
            if !node.aabb.intersects_ray(&ray, max_lambda) {
                continue;
            }
            if !node.is_leaf() {
                stack.push(node.left);
                stack.push(node.right);
                continue;
            }
            let shape = &scene.shapes[node.shape as usize];
            let leaf_input = RayCastInput {
                origin: input.origin,
                direction: input.direction,
                max_lambda,
            };
            if let Some(hit) = shape.ray_cast(scene, &leaf_input) {
                max_lambda = hit.lambda;
                best = Some(SceneRayCastOutput {
                    hit_point: hit.hit_point,
                    hit_normal: hit.hit_normal,
                    hit_tangent: hit.hit_tangent,
                    lambda: hit.lambda,
                    shape_id: ShapeId(node.shape),
                });
            }
        }
        best
    }

    /// Flow-controlled traversal: the callback sees every leaf hit within the
    /// current clip distance, in unspecified order, and steers the search.
    pub fn ray_cast<F>(&self, scene: &Scene, input: &RayCastInput, mut callback: F)
    where
        F: FnMut(&SceneRayCastOutput) -> RayCastFlow,
    {
        if self.nodes.is_empty() {
            return;
        }

        let ray = Ray {
            origin: input.origin,
            direction: input.direction,
        };
        let mut max_lambda = input.max_lambda;

        let mut stack: Vec<u32> = Vec::with_capacity(self.depth as usize + 1);
        stack.push(0);
        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx as usize];
            if !node.aabb.intersects_ray(&ray, max_lambda) {
                continue;
            }
            if !node.is_leaf() {
                stack.push(node.left);
                stack.push(node.right);
                continue;
            }
            let shape = &scene.shapes[node.shape as usize];
            let leaf_input = RayCastInput {
                origin: input.origin,
                direction: input.direction,
                max_lambda,
            };
            if let Some(hit) = shape.ray_cast(scene, &leaf_input) {
                let output = SceneRayCastOutput {
                    hit_point: hit.hit_point,
                    hit_normal: hit.hit_normal,
                    hit_tangent: hit.hit_tangent,
                    lambda: hit.lambda,
                    shape_id: ShapeId(node.shape),
                };
                match callback(&output) {
                    RayCastFlow::Continue => {}
                    RayCastFlow::Clip => max_lambda = hit.lambda,
                    RayCastFlow::Stop => return,
                }
            }
        }
    }

    #[cfg(debug_assertions)]
    fn validate(&self, leaf_count: usize) {
        assert_eq!(self.nodes.is_empty(), leaf_count == 0);
        if self.nodes.is_empty() {
            assert_eq!(self.depth, 0);
            return;
        }
        assert_eq!(self.nodes.len(), 2 * leaf_count - 1);
        assert_eq!(self.nodes[0].parent, NIL);
        for (i, node) in self.nodes.iter().enumerate() {
            assert_eq!(node.left == NIL, node.right == NIL);
            assert_eq!(node.left == NIL, node.shape != NIL);
            if i > 0 {
                assert!((node.parent as usize) < i);
                let parent = &self.nodes[node.parent as usize];
                assert!(parent.aabb.contains(&node.aabb));
                assert!(parent.left == i as u32 || parent.right == i as u32);
            }
            if node.left != NIL {
                assert!(node.left != node.right);
                assert!(i < node.left as usize && (node.left as usize) < self.nodes.len());
                assert!(i < node.right as usize && (node.right as usize) < self.nodes.len());
            }
        }
    }
}
