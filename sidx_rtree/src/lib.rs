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

//! The bulk-loaded R-tree core: Sort-Tile-Recursive construction, DFS
//! box/sphere traversal, best-first k-nearest search, and the byte-exact
//! single-blob serialization format the memory-mapped backing store
//! reuses verbatim.

mod builder;
mod node;
mod query;
mod serialize;
mod tree;

pub use builder::{bulk_load, DEFAULT_FANOUT, DEFAULT_LEAF_CAPACITY};
pub use node::{Accuracy, ChildEntry, Node, NodeKind};
pub use serialize::{
    element_table_offset, identifier_row_width, read_header, read_node_at, read_primitive_at,
    Header, NodeRef,
};
pub use tree::RTree;

#[cfg(test)]
mod property_tests {
    use super::*;
    use sidx_elements::{ElementKind, ElementStoreBuilder};
    use sidx_geometry::Aabb;

    fn linear_neuron() -> RTree {
        let mut b = ElementStoreBuilder::new(ElementKind::Morphology);
        b.push_soma(0, [0.0, 0.0, 0.0], 0.5).unwrap();
        for x in 0..10u32 {
            b.push_segment(
                0,
                1,
                x,
                [x as f32, 0.0, 0.0],
                [(x + 1) as f32, 0.0, 0.0],
                1.0,
            )
            .unwrap();
        }
        for (i, (p0, p1)) in [
            ([4.0, 0.0, 0.0], [5.0, 0.2, 0.0]),
            ([5.0, 0.2, 0.0], [6.0, 0.4, 0.0]),
            ([6.0, 0.4, 0.0], [7.0, 0.6, 0.0]),
            ([7.0, 0.6, 0.0], [8.0, 0.8, 0.0]),
            ([8.0, 0.8, 0.0], [9.0, 1.0, 0.0]),
        ]
        .into_iter()
        .enumerate()
        {
            b.push_segment(0, 2, i as u32, p0, p1, 1.0).unwrap();
        }
        bulk_load(b.finish().unwrap(), DEFAULT_FANOUT, DEFAULT_LEAF_CAPACITY).unwrap()
    }

    #[test]
    fn bulk_loaded_envelopes_are_tight() {
        let tree = linear_neuron();
        assert!(tree.envelopes_are_tight());
    }

    #[test]
    fn scenario_branching_neuron_box_query() {
        let tree = linear_neuron();
        let query = Aabb::new([4.1, -0.1, -0.1], [5.9, 0.1, 0.1]);
        let hits = tree.query_box(&query, Accuracy::BestEffort);
        assert_eq!(hits.len(), 4);
    }

    #[test]
    fn bounding_box_accuracy_matches_envelope_test() {
        let tree = linear_neuron();
        let query = Aabb::new([4.1, -0.1, -0.1], [5.9, 0.1, 0.1]);
        let loose = tree.query_box(&query, Accuracy::BoundingBox);
        for &row in &loose {
            assert!(tree.store().primitive(row).bounding_box().intersects(&query));
        }
    }

    #[test]
    fn best_effort_matches_exact_primitive_test() {
        let tree = linear_neuron();
        let query = Aabb::new([4.1, -0.1, -0.1], [5.9, 0.1, 0.1]);
        let exact = tree.query_box(&query, Accuracy::BestEffort);
        for row in 0..tree.element_count() {
            let expect = tree.store().primitive(row).intersects_aabb(&query);
            assert_eq!(exact.contains(&row), expect);
        }
    }

    #[test]
    fn count_matches_id_field_length() {
        let tree = linear_neuron();
        let query = Aabb::new([4.1, -0.1, -0.1], [5.9, 0.1, 0.1]);
        let hits = tree.query_box(&query, Accuracy::BestEffort);
        let count = tree.count_box(&query, Accuracy::BestEffort);
        assert_eq!(hits.len(), count);
    }
}
