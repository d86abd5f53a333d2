/*
* Licensed under the Apache License, Version 2.0 (the "License");
* you may not use this file except in compliance with the License.
* You may obtain a copy of the License at
*
*  http://www.apache.org/licenses/LICENSE-2.0
*
* Unless required by applicable law or agreed to in writing,
* software distributed under the License is distributed on an
* "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
* KIND, either express or implied.  See the License for the
* specific language governing permissions and limitations
* under the License.
*/

//! DFS box/sphere traversal and best-first k-nearest search. All three
//! return row indices into the tree's own element store; the façade
//! layer turns those into whatever result flavour the caller asked for.

use crate::node::{Accuracy, NodeKind};
use crate::tree::RTree;
use sidx_elements::SidxResult;
use sidx_geometry::{Aabb, Vec3};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

impl RTree {
    pub fn query_box(&self, query: &Aabb, accuracy: Accuracy) -> Vec<usize> {
        let mut hits = Vec::new();
        self.descend_box(self.root, query, accuracy, &mut hits);
        hits
    }

    pub fn count_box(&self, query: &Aabb, accuracy: Accuracy) -> usize {
        self.query_box(query, accuracy).len()
    }

    fn descend_box(&self, node_idx: usize, query: &Aabb, accuracy: Accuracy, hits: &mut Vec<usize>) {
        let node = &self.nodes[node_idx];
        if !node.envelope.intersects(query) {
            return;
        }
        match &node.kind {
            NodeKind::Leaf { start, len } => {
                for row in *start..*start + *len {
                    let accept = match accuracy {
                        Accuracy::BoundingBox => true,
                        Accuracy::BestEffort => self.store.primitive(row).intersects_aabb(query),
                    };
                    if accept {
                        hits.push(row);
                    }
                }
            }
            NodeKind::Internal { children } => {
                for child in children {
                    if child.envelope.intersects(query) {
                        self.descend_box(child.child, query, accuracy, hits);
                    }
                }
            }
        }
    }

    pub fn query_sphere(&self, center: Vec3, radius: f32, accuracy: Accuracy) -> Vec<usize> {
        let mut hits = Vec::new();
        self.descend_sphere(self.root, center, radius, accuracy, &mut hits);
        hits
    }

    pub fn count_sphere(&self, center: Vec3, radius: f32, accuracy: Accuracy) -> usize {
        self.query_sphere(center, radius, accuracy).len()
    }

    fn descend_sphere(
        &self,
        node_idx: usize,
        center: Vec3,
        radius: f32,
        accuracy: Accuracy,
        hits: &mut Vec<usize>,
    ) {
        let node = &self.nodes[node_idx];
        if !node.envelope.intersects_sphere(center, radius) {
            return;
        }
        match &node.kind {
            NodeKind::Leaf { start, len } => {
                for row in *start..*start + *len {
                    let accept = match accuracy {
                        Accuracy::BoundingBox => true,
                        Accuracy::BestEffort => {
                            self.store.primitive(row).intersects_sphere(center, radius)
                        }
                    };
                    if accept {
                        hits.push(row);
                    }
                }
            }
            NodeKind::Internal { children } => {
                for child in children {
                    if child.envelope.intersects_sphere(center, radius) {
                        self.descend_sphere(child.child, center, radius, accuracy, hits);
                    }
                }
            }
        }
    }

    /// Groups a box query's hits by `group_by` and counts each group.
    pub fn group_count_box(
        &self,
        query: &Aabb,
        accuracy: Accuracy,
        group_by: &str,
    ) -> SidxResult<std::collections::HashMap<u64, usize>> {
        let hits = self.query_box(query, accuracy);
        self.store.group_counts(group_by, &hits)
    }

    /// Best-first k-nearest search. Ties in distance are broken by
    /// ascending row index, matching the tree's own leaf order.
    pub fn query_knn(&self, center: Vec3, k: usize) -> Vec<usize> {
        if k == 0 {
            return Vec::new();
        }
        let mut heap: BinaryHeap<QueueEntry> = BinaryHeap::new();
        heap.push(QueueEntry {
            dist: self.nodes[self.root].envelope.squared_distance_to_point(center),
            item: HeapItem::Node(self.root),
        });

        let mut results = Vec::with_capacity(k);
        while let Some(QueueEntry { item, .. }) = heap.pop() {
            match item {
                HeapItem::Row(row) => {
                    results.push(row);
                    if results.len() == k {
                        break;
                    }
                }
                HeapItem::Node(node_idx) => match &self.nodes[node_idx].kind {
                    NodeKind::Leaf { start, len } => {
                        for row in *start..*start + *len {
                            let dist = self.store.primitive(row).squared_distance_to_point(center);
                            heap.push(QueueEntry {
                                dist,
                                item: HeapItem::Row(row),
                            });
                        }
                    }
                    NodeKind::Internal { children } => {
                        for child in children {
                            heap.push(QueueEntry {
                                dist: child.envelope.squared_distance_to_point(center),
                                item: HeapItem::Node(child.child),
                            });
                        }
                    }
                },
            }
        }
        results
    }
}

#[derive(Copy, Clone, Debug)]
enum HeapItem {
    Node(usize),
    Row(usize),
}

#[derive(Debug)]
struct QueueEntry {
    dist: f32,
    item: HeapItem,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}
impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the smallest distance first.
        other
            .dist
            .partial_cmp(&self.dist)
            .unwrap_or(Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{bulk_load, DEFAULT_FANOUT, DEFAULT_LEAF_CAPACITY};
    use sidx_elements::{ElementKind, ElementStoreBuilder};

    fn three_spheres() -> RTree {
        let mut b = ElementStoreBuilder::new(ElementKind::Sphere);
        b.push_sphere(0, [0.0, 1.0, 0.0], 1.0).unwrap();
        b.push_sphere(1, [-0.70710678, -0.70710678, 0.0], 1.0)
            .unwrap();
        b.push_sphere(2, [0.70710678, -0.70710678, 0.0], 1.0)
            .unwrap();
        bulk_load(b.finish().unwrap(), DEFAULT_FANOUT, DEFAULT_LEAF_CAPACITY).unwrap()
    }

    #[test]
    fn scenario_three_spheres_sphere_query() {
        let tree = three_spheres();
        let hits = tree.query_sphere([0.0, 0.0, 0.0], 0.6, Accuracy::BestEffort);
        assert_eq!(hits.len(), 3);
        let hits = tree.query_sphere([0.0, 0.0, 0.0], 0.6, Accuracy::BoundingBox);
        assert_eq!(hits.len(), 3);
    }

    fn seven_points() -> RTree {
        let mut b = ElementStoreBuilder::new(ElementKind::Sphere);
        let points = [
            [0.0, 1.0, 0.0],
            [-0.5, -0.5, 0.0],
            [0.5, -0.5, 0.0],
            [-2.1, 0.0, 0.0],
            [0.0, 2.1, 0.0],
            [0.0, 0.0, 2.1],
            [1.0, 1.0, 1.0],
        ];
        for (i, p) in points.iter().enumerate() {
            b.push_sphere(i as u64, *p, 0.0).unwrap();
        }
        bulk_load(b.finish().unwrap(), DEFAULT_FANOUT, DEFAULT_LEAF_CAPACITY).unwrap()
    }

    #[test]
    fn scenario_seven_points_box_query() {
        let tree = seven_points();
        let query = Aabb::new([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]);
        let mut ids: Vec<u64> = tree
            .query_box(&query, Accuracy::BoundingBox)
            .into_iter()
            .map(|row| tree.store().identifier(row))
            .collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2, 6]);
    }

    #[test]
    fn knn_returns_k_smallest_ordered_by_distance() {
        let tree = seven_points();
        let hits = tree.query_knn([0.0, 0.0, 0.0], 3);
        assert_eq!(hits.len(), 3);
        let mut dists: Vec<f32> = hits
            .iter()
            .map(|&r| tree.store().primitive(r).squared_distance_to_point([0.0, 0.0, 0.0]))
            .collect();
        let sorted = {
            let mut d = dists.clone();
            d.sort_by(|a, b| a.partial_cmp(b).unwrap());
            d
        };
        dists.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(dists, sorted);
    }

    #[test]
    fn knn_zero_is_empty() {
        let tree = seven_points();
        assert!(tree.query_knn([0.0, 0.0, 0.0], 0).is_empty());
    }

    #[test]
    fn non_intersecting_box_is_empty() {
        let tree = seven_points();
        let query = Aabb::new([100.0, 100.0, 100.0], [101.0, 101.0, 101.0]);
        assert!(tree.query_box(&query, Accuracy::BoundingBox).is_empty());
    }
}
