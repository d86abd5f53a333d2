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

//! Ties a `TopIndex` together with a `SubtreeCache` of lazily opened
//! `MappedIndex` mappings: the top index narrows a query down to the
//! handful of subtrees it can possibly touch, and only those get mapped.

use crate::cache::{SubtreeCache, DEFAULT_BUDGET_BYTES};
use crate::topindex::TopIndex;
use sidx_elements::{ElementKind, FieldValue, SidxResult};
use sidx_geometry::{Aabb, Vec3};
use sidx_rtree::Accuracy;
use std::cell::RefCell;
use std::collections::{BinaryHeap, HashMap};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// A single hit, identified by which subtree it came from and its row
/// within that subtree's element table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MultiRow {
    pub subtree_id: u32,
    pub row: usize,
}

pub struct MultiIndexReader {
    top: TopIndex,
    cache: RefCell<SubtreeCache>,
    element_kind: ElementKind,
}

impl MultiIndexReader {
    pub fn open(dir: &Path) -> SidxResult<MultiIndexReader> {
        Self::open_with_budget(dir, DEFAULT_BUDGET_BYTES)
    }

    pub fn open_with_budget(dir: &Path, budget_bytes: u64) -> SidxResult<MultiIndexReader> {
        let top = TopIndex::open(&dir.join("topindex.bin"))?;
        let subtrees_dir: PathBuf = dir.join("subtrees");
        let cache = SubtreeCache::new(subtrees_dir.clone(), budget_bytes);

        let element_kind = if let Some(&first) = top.subtree_ids().first() {
            let opened = sidx_mmap::MappedIndex::open(&subtrees_dir.join(format!("worker_{}.bin", first)))?;
            opened.element_kind()
        } else {
            ElementKind::Sphere
        };

        Ok(MultiIndexReader {
            top,
            cache: RefCell::new(cache),
            element_kind,
        })
    }

    pub fn element_kind(&self) -> ElementKind {
        self.element_kind
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.top.bounds()
    }

    pub fn field(&self, hit: MultiRow, field: &str) -> SidxResult<FieldValue> {
        let index = self.cache.borrow_mut().get(hit.subtree_id)?;
        index.field(hit.row, field)
    }

    pub fn identifier(&self, hit: MultiRow) -> SidxResult<u64> {
        let index = self.cache.borrow_mut().get(hit.subtree_id)?;
        Ok(index.identifier(hit.row))
    }

    pub fn primitive(&self, hit: MultiRow) -> SidxResult<sidx_geometry::Primitive> {
        let index = self.cache.borrow_mut().get(hit.subtree_id)?;
        Ok(index.primitive(hit.row))
    }

    pub fn query_box(&self, query: &Aabb, accuracy: Accuracy) -> SidxResult<Vec<MultiRow>> {
        let mut hits = Vec::new();
        for subtree_id in self.top.intersecting_box(query) {
            let index = self.cache.borrow_mut().get(subtree_id)?;
            for row in index.query_box(query, accuracy) {
                hits.push(MultiRow { subtree_id, row });
            }
        }
        Ok(hits)
    }

    pub fn count_box(&self, query: &Aabb, accuracy: Accuracy) -> SidxResult<usize> {
        Ok(self.query_box(query, accuracy)?.len())
    }

    pub fn query_sphere(
        &self,
        center: Vec3,
        radius: f32,
        accuracy: Accuracy,
    ) -> SidxResult<Vec<MultiRow>> {
        let mut hits = Vec::new();
        for subtree_id in self.top.intersecting_sphere(center, radius) {
            let index = self.cache.borrow_mut().get(subtree_id)?;
            for row in index.query_sphere(center, radius, accuracy) {
                hits.push(MultiRow { subtree_id, row });
            }
        }
        Ok(hits)
    }

    pub fn count_sphere(&self, center: Vec3, radius: f32, accuracy: Accuracy) -> SidxResult<usize> {
        Ok(self.query_sphere(center, radius, accuracy)?.len())
    }

    /// Merges the per-subtree candidate lists with a best-first search
    /// over subtree envelopes, so subtrees far from `center` are never
    /// opened at all.
    pub fn query_knn(&self, center: Vec3, k: usize) -> SidxResult<Vec<MultiRow>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut subtree_heap: BinaryHeap<SubtreeEntry> = BinaryHeap::new();
        for (envelope, id) in self.top.entries_ref() {
            subtree_heap.push(SubtreeEntry {
                dist: envelope.squared_distance_to_point(center),
                subtree_id: *id,
            });
        }

        let mut candidates: BinaryHeap<RowEntry> = BinaryHeap::new();
        while let Some(SubtreeEntry { dist, subtree_id }) = subtree_heap.pop() {
            if candidates.len() >= k {
                if let Some(worst) = candidates.peek() {
                    if dist > worst.dist {
                        break;
                    }
                }
            }
            let index = self.cache.borrow_mut().get(subtree_id)?;
            for row in index.query_knn(center, k) {
                candidates.push(RowEntry {
                    dist: index.distance_to_point(row, center),
                    hit: MultiRow { subtree_id, row },
                });
            }
            while candidates.len() > k {
                candidates.pop();
            }
        }

        let mut results: Vec<MultiRow> = candidates.into_sorted_vec().into_iter().map(|e| e.hit).collect();
        results.truncate(k);
        Ok(results)
    }

    pub fn group_count_box(
        &self,
        query: &Aabb,
        accuracy: Accuracy,
        group_by: &str,
    ) -> SidxResult<HashMap<u64, usize>> {
        let hits = self.query_box(query, accuracy)?;
        let mut counts = HashMap::new();
        for hit in hits {
            let key = match self.field(hit, group_by)? {
                FieldValue::U64(v) => v,
                FieldValue::U32(v) => v as u64,
                FieldValue::Bool(v) => v as u64,
                FieldValue::F32(_) => {
                    return Err(sidx_elements::SidxError::InvalidField(
                        "cannot group by a floating-point field".into(),
                    ))
                }
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[derive(Debug)]
struct SubtreeEntry {
    dist: f32,
    subtree_id: u32,
}
impl PartialEq for SubtreeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}
impl Eq for SubtreeEntry {}
impl PartialOrd for SubtreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for SubtreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.dist.partial_cmp(&self.dist).unwrap_or(Ordering::Equal)
    }
}

#[derive(Debug)]
struct RowEntry {
    dist: f32,
    hit: MultiRow,
}
impl PartialEq for RowEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}
impl Eq for RowEntry {}
impl PartialOrd for RowEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for RowEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.partial_cmp(&other.dist).unwrap_or(Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collective::{build_multi_index, MultiBuildConfig};
    use sidx_elements::{ElementKind as EK, ElementStoreBuilder as ESB};

    #[test]
    fn box_query_matches_across_subtrees() {
        let dir = tempdir::TempDir::new("sidx_multi_reader").unwrap();
        let mut b = ESB::new(EK::Sphere);
        for i in 0..4_000u64 {
            b.push_sphere(i, [(i % 60) as f32, (i / 60) as f32, 0.0], 0.2)
                .unwrap();
        }
        build_multi_index(b.finish().unwrap(), 4, dir.path(), MultiBuildConfig::default()).unwrap();

        let reader = MultiIndexReader::open(dir.path()).unwrap();
        let query = Aabb::new([0.0, 0.0, -1.0], [5.0, 5.0, 1.0]);
        let hits = reader.query_box(&query, Accuracy::BestEffort).unwrap();
        assert!(!hits.is_empty());
        for hit in &hits {
            reader.identifier(*hit).unwrap();
        }
    }

    #[test]
    fn knn_returns_k_nearest_across_subtrees() {
        let dir = tempdir::TempDir::new("sidx_multi_reader_knn").unwrap();
        let mut b = ESB::new(EK::Sphere);
        for i in 0..2_000u64 {
            b.push_sphere(i, [(i % 50) as f32, (i / 50) as f32, 0.0], 0.1)
                .unwrap();
        }
        build_multi_index(b.finish().unwrap(), 4, dir.path(), MultiBuildConfig::default()).unwrap();

        let reader = MultiIndexReader::open(dir.path()).unwrap();
        let knn = reader.query_knn([0.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(knn.len(), 5);
    }
}
