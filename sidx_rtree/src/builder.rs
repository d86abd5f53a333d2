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

//! Sort-Tile-Recursive bulk loading. Deterministic given the input
//! order: every sort comparison that ties on coordinate falls back to
//! the row's own index, so two stores built from identical pushes in
//! identical order always produce byte-identical trees.

use crate::node::{ChildEntry, Node, NodeKind};
use crate::tree::RTree;
use rayon::prelude::*;
use sidx_elements::{ElementStore, SidxError, SidxResult};
use sidx_geometry::Aabb;

pub const DEFAULT_FANOUT: usize = 16;
pub const DEFAULT_LEAF_CAPACITY: usize = 16;

fn sort_by_axis(order: &mut [usize], centers: &[[f32; 3]], tie_break: &[u64], axis: usize) {
    order.sort_by(|&a, &b| {
        centers[a][axis]
            .partial_cmp(&centers[b][axis])
            .unwrap()
            .then_with(|| tie_break[a].cmp(&tie_break[b]))
    });
}

/// Computes the leaf order: a permutation of `0..n` such that consecutive
/// runs of `leaf_capacity` indices form envelope-correlated leaves.
fn str_order(centers: &[[f32; 3]], tie_break: &[u64], leaf_capacity: usize) -> Vec<usize> {
    let n = centers.len();
    let leaf_count = (n as f64 / leaf_capacity as f64).ceil().max(1.0);
    let slabs = leaf_count.cbrt().ceil().max(1.0) as usize;

    let mut order: Vec<usize> = (0..n).collect();
    sort_by_axis(&mut order, centers, tie_break, 0);

    let slab_size = ((n as f64 / slabs as f64).ceil() as usize)
        .max(leaf_capacity)
        .max(1);

    let mut result = Vec::with_capacity(n);
    for slab in order.chunks(slab_size) {
        let mut slab_vec = slab.to_vec();
        sort_by_axis(&mut slab_vec, centers, tie_break, 1);

        let group_size = ((slab_vec.len() as f64 / slabs as f64).ceil() as usize).max(1);
        for group in slab_vec.chunks(group_size) {
            let mut group_vec = group.to_vec();
            sort_by_axis(&mut group_vec, centers, tie_break, 2);
            result.extend(group_vec);
        }
    }
    result
}

/// Builds the leaf level from the already-ordered primitive envelopes.
fn build_leaves(envelopes: &[Aabb], leaf_capacity: usize) -> Vec<Node> {
    envelopes
        .par_chunks(leaf_capacity)
        .enumerate()
        .map(|(i, chunk)| {
            let start = i * leaf_capacity;
            let envelope = Aabb::union_all(chunk.iter())
                .expect("chunks() never yields an empty slice");
            Node {
                envelope,
                kind: NodeKind::Leaf {
                    start,
                    len: chunk.len(),
                },
            }
        })
        .collect()
}

/// Groups one level of node indices into parents of at most `fanout`
/// children each, appending the new parents to `nodes` and returning
/// their indices as the next level up.
fn build_level(nodes: &mut Vec<Node>, level: &[usize], fanout: usize) -> Vec<usize> {
    let mut parents = Vec::with_capacity((level.len() + fanout - 1) / fanout);
    for chunk in level.chunks(fanout) {
        let children: Vec<ChildEntry> = chunk
            .iter()
            .map(|&idx| ChildEntry {
                envelope: nodes[idx].envelope,
                child: idx,
            })
            .collect();
        let envelope = Aabb::union_all(children.iter().map(|c| &c.envelope))
            .expect("chunks() never yields an empty slice");
        let parent_idx = nodes.len();
        nodes.push(Node {
            envelope,
            kind: NodeKind::Internal { children },
        });
        parents.push(parent_idx);
    }
    parents
}

/// Bulk-loads an `RTree` over every element in `store`. Consumes the
/// store: once built, the tree owns its own leaf-ordered copy of the
/// element data and the original row order is no longer meaningful.
pub fn bulk_load(
    store: ElementStore,
    fanout: usize,
    leaf_capacity: usize,
) -> SidxResult<RTree> {
    if store.is_empty() {
        return Err(SidxError::InvalidInput(
            "cannot bulk-load an empty element set".into(),
        ));
    }
    if fanout < 2 || leaf_capacity < 1 {
        return Err(SidxError::InvalidInput(
            "fanout must be >= 2 and leaf_capacity >= 1".into(),
        ));
    }

    let n = store.len();
    let centers: Vec<[f32; 3]> = (0..n).map(|i| store.primitive(i).bounding_box().center()).collect();
    let tie_break: Vec<u64> = (0..n).map(|i| store.sort_key(i)).collect();
    let order = str_order(&centers, &tie_break, leaf_capacity);

    let store = store.reorder(&order);
    let envelopes: Vec<Aabb> = (0..n).map(|i| store.primitive(i).bounding_box()).collect();

    let mut nodes = build_leaves(&envelopes, leaf_capacity);
    let mut level: Vec<usize> = (0..nodes.len()).collect();
    while level.len() > 1 {
        level = build_level(&mut nodes, &level, fanout);
    }
    let root = level[0];

    Ok(RTree::from_parts(store, nodes, root, fanout, leaf_capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidx_elements::{ElementKind, ElementStoreBuilder};

    fn three_spheres() -> ElementStore {
        let mut b = ElementStoreBuilder::new(ElementKind::Sphere);
        b.push_sphere(0, [0.0, 1.0, 0.0], 1.0).unwrap();
        b.push_sphere(1, [-0.70710678, -0.70710678, 0.0], 1.0)
            .unwrap();
        b.push_sphere(2, [0.70710678, -0.70710678, 0.0], 1.0)
            .unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn bulk_load_produces_single_root_covering_everything() {
        let tree = bulk_load(three_spheres(), DEFAULT_FANOUT, DEFAULT_LEAF_CAPACITY).unwrap();
        assert_eq!(tree.element_count(), 3);
        let root_env = tree.bounds();
        assert!(root_env.min[0] <= -1.0 && root_env.max[0] >= 1.0);
    }

    #[test]
    fn rejects_empty_build() {
        let b = ElementStoreBuilder::new(ElementKind::Sphere);
        let err = b.finish();
        assert!(err.is_err());
    }

    #[test]
    fn many_leaves_build_a_multi_level_tree() {
        let mut b = ElementStoreBuilder::new(ElementKind::Sphere);
        for i in 0..500u64 {
            let x = (i % 50) as f32;
            let y = (i / 50) as f32;
            b.push_sphere(i, [x, y, 0.0], 0.1).unwrap();
        }
        let store = b.finish().unwrap();
        let tree = bulk_load(store, 4, 4).unwrap();
        assert_eq!(tree.element_count(), 500);
    }
}
