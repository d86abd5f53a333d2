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

mod cache;
mod collective;
mod partition;
mod reader;
mod topindex;

pub use cache::{SubtreeCache, DEFAULT_BUDGET_BYTES};
pub use collective::{build_multi_index, MultiBuildConfig};
pub use partition::chunk_ranges;
pub use reader::{MultiIndexReader, MultiRow};
pub use topindex::TopIndex;

#[cfg(test)]
mod property_tests {
    use super::*;
    use sidx_elements::{ElementKind, ElementStoreBuilder};
    use sidx_geometry::Aabb;
    use sidx_rtree::Accuracy;

    /// A multi-index built with `W` workers over the same elements as a
    /// single-index build must answer box queries with the same set of
    /// identifiers, regardless of `W`.
    #[test]
    fn multi_index_matches_single_index_box_queries() {
        let mut b = ElementStoreBuilder::new(ElementKind::Sphere);
        for i in 0..3_000u64 {
            let x = (i % 55) as f32 * 0.3;
            let y = (i / 55) as f32 * 0.3;
            b.push_sphere(i, [x, y, 0.0], 0.15).unwrap();
        }
        let store = b.finish().unwrap();

        let single = sidx_rtree::bulk_load(store.clone(), 16, 32).unwrap();

        let dir = tempdir::TempDir::new("sidx_multi_property").unwrap();
        build_multi_index(store, 4, dir.path(), MultiBuildConfig::default()).unwrap();
        let multi = MultiIndexReader::open(dir.path()).unwrap();

        let queries = [
            Aabb::new([0.0, 0.0, -1.0], [4.0, 4.0, 1.0]),
            Aabb::new([2.0, 2.0, -1.0], [6.0, 6.0, 1.0]),
            Aabb::new([10.0, 0.0, -1.0], [12.0, 3.0, 1.0]),
            Aabb::new([-5.0, -5.0, -1.0], [-1.0, -1.0, 1.0]),
            Aabb::new([0.0, 0.0, -1.0], [20.0, 20.0, 1.0]),
        ];

        for query in queries {
            let mut single_ids: Vec<u64> = single
                .query_box(&query, Accuracy::BestEffort)
                .into_iter()
                .map(|row| single.store().identifier(row))
                .collect();
            let multi_hits = multi.query_box(&query, Accuracy::BestEffort).unwrap();
            let mut multi_ids: Vec<u64> = multi_hits
                .into_iter()
                .map(|hit| multi.identifier(hit).unwrap())
                .collect();
            single_ids.sort();
            multi_ids.sort();
            assert_eq!(single_ids, multi_ids);
        }
    }
}
