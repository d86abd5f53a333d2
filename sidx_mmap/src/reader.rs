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

//! A reader that never materialises the tree: every query walks node and
//! element records straight out of the mapping. All references inside
//! the mapping are byte offsets, so reopening just re-establishes the
//! base pointer — there is nothing to fix up.

use memmap2::Mmap;
use sidx_elements::{ElementKind, FieldValue, SidxError, SidxResult};
use sidx_geometry::{Aabb, Vec3};
use sidx_rtree::{Accuracy, Header, NodeRef};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fs::File;
use std::path::Path;

pub struct MappedIndex {
    mmap: Mmap,
    header: Header,
    /// Byte offset of primitive `i`, for `i` in `0..element_count`, plus
    /// one trailing entry marking where the identifier block begins.
    /// Built once at open time because morphology stores mix
    /// variable-width sphere and cylinder records.
    row_offsets: Vec<u64>,
}

impl MappedIndex {
    pub fn open(path: &Path) -> SidxResult<MappedIndex> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SidxError::NotFound(format!("{}: {}", path.display(), e))
            } else {
                SidxError::IoError(e)
            }
        })?;
        let mmap = unsafe { Mmap::map(&file)? };
        let header = sidx_rtree::read_header(&mmap)?;

        let mut cursor = sidx_rtree::element_table_offset(&mmap, &header);
        let mut row_offsets = Vec::with_capacity(header.element_count + 1);
        for _ in 0..header.element_count {
            row_offsets.push(cursor);
            let (_, size) = sidx_rtree::read_primitive_at(&mmap, cursor)?;
            cursor += size as u64;
        }
        row_offsets.push(cursor);

        Ok(MappedIndex {
            mmap,
            header,
            row_offsets,
        })
    }

    pub fn element_kind(&self) -> ElementKind {
        self.header.element_kind
    }

    pub fn element_count(&self) -> usize {
        self.header.element_count
    }

    pub fn bounds(&self) -> Aabb {
        let (envelope, _, _) = sidx_rtree::read_node_at(&self.mmap, self.header.root_offset);
        envelope
    }

    pub fn primitive(&self, row: usize) -> sidx_geometry::Primitive {
        sidx_rtree::read_primitive_at(&self.mmap, self.row_offsets[row])
            .expect("row_offsets was built from this same mapping")
            .0
    }

    /// Squared distance from `row`'s primitive to `point`, for callers
    /// (such as the multi-index reader) that merge candidates from
    /// several mappings and need comparable distances without
    /// re-deserialising a row themselves.
    pub fn distance_to_point(&self, row: usize, point: Vec3) -> f32 {
        self.primitive(row).squared_distance_to_point(point)
    }

    fn identifiers_block_start(&self) -> u64 {
        self.row_offsets[self.header.element_count]
    }

    /// Reads a named field for `row` straight out of the identifier
    /// block, without deserialising the whole row.
    pub fn field(&self, row: usize, field: &str) -> SidxResult<FieldValue> {
        let width = sidx_rtree::identifier_row_width(self.header.element_kind);
        let at = (self.identifiers_block_start() + (row as u64) * (width as u64)) as usize;
        let bytes = &self.mmap[..];
        let u64_at = |off: usize| u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        let u32_at = |off: usize| u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        match (self.header.element_kind, field) {
            (ElementKind::Morphology, "gid") => Ok(FieldValue::U64(u64_at(at))),
            (ElementKind::Morphology, "section_id") => Ok(FieldValue::U32(u32_at(at + 8))),
            (ElementKind::Morphology, "segment_id") => Ok(FieldValue::U32(u32_at(at + 12))),
            (ElementKind::Morphology, "is_soma") => Ok(FieldValue::Bool(bytes[at + 16] != 0)),
            (ElementKind::Synapse, "id") => Ok(FieldValue::U64(u64_at(at))),
            (ElementKind::Synapse, "pre_gid") => Ok(FieldValue::U64(u64_at(at + 8))),
            (ElementKind::Synapse, "post_gid") => Ok(FieldValue::U64(u64_at(at + 16))),
            (ElementKind::Sphere, "id") => Ok(FieldValue::U64(u64_at(at))),
            (kind, other) => Err(SidxError::InvalidField(format!(
                "{:?} has no field '{}'",
                kind, other
            ))),
        }
    }

    pub fn identifier(&self, row: usize) -> u64 {
        let field = match self.header.element_kind {
            ElementKind::Morphology => "gid",
            ElementKind::Synapse | ElementKind::Sphere => "id",
        };
        match self.field(row, field).unwrap() {
            FieldValue::U64(v) => v,
            _ => unreachable!(),
        }
    }

    pub fn query_box(&self, query: &Aabb, accuracy: Accuracy) -> Vec<usize> {
        let mut hits = Vec::new();
        self.descend_box(self.header.root_offset, query, accuracy, &mut hits);
        hits
    }

    pub fn count_box(&self, query: &Aabb, accuracy: Accuracy) -> usize {
        self.query_box(query, accuracy).len()
    }

    fn descend_box(&self, offset: u64, query: &Aabb, accuracy: Accuracy, hits: &mut Vec<usize>) {
        let (envelope, node, _) = sidx_rtree::read_node_at(&self.mmap, offset);
        if !envelope.intersects(query) {
            return;
        }
        match node {
            NodeRef::Leaf { start, len } => {
                for row in start..start + len {
                    let accept = match accuracy {
                        Accuracy::BoundingBox => true,
                        Accuracy::BestEffort => self.primitive(row).intersects_aabb(query),
                    };
                    if accept {
                        hits.push(row);
                    }
                }
            }
            NodeRef::Internal { children } => {
                for (child_envelope, child_offset) in children {
                    if child_envelope.intersects(query) {
                        self.descend_box(child_offset, query, accuracy, hits);
                    }
                }
            }
        }
    }

    pub fn query_sphere(&self, center: Vec3, radius: f32, accuracy: Accuracy) -> Vec<usize> {
        let mut hits = Vec::new();
        self.descend_sphere(self.header.root_offset, center, radius, accuracy, &mut hits);
        hits
    }

    pub fn count_sphere(&self, center: Vec3, radius: f32, accuracy: Accuracy) -> usize {
        self.query_sphere(center, radius, accuracy).len()
    }

    fn descend_sphere(
        &self,
        offset: u64,
        center: Vec3,
        radius: f32,
        accuracy: Accuracy,
        hits: &mut Vec<usize>,
    ) {
        let (envelope, node, _) = sidx_rtree::read_node_at(&self.mmap, offset);
        if !envelope.intersects_sphere(center, radius) {
            return;
        }
        match node {
            NodeRef::Leaf { start, len } => {
                for row in start..start + len {
                    let accept = match accuracy {
                        Accuracy::BoundingBox => true,
                        Accuracy::BestEffort => self.primitive(row).intersects_sphere(center, radius),
                    };
                    if accept {
                        hits.push(row);
                    }
                }
            }
            NodeRef::Internal { children } => {
                for (child_envelope, child_offset) in children {
                    if child_envelope.intersects_sphere(center, radius) {
                        self.descend_sphere(child_offset, center, radius, accuracy, hits);
                    }
                }
            }
        }
    }

    pub fn query_knn(&self, center: Vec3, k: usize) -> Vec<usize> {
        if k == 0 {
            return Vec::new();
        }
        let mut heap: BinaryHeap<QueueEntry> = BinaryHeap::new();
        let (root_envelope, _, _) = sidx_rtree::read_node_at(&self.mmap, self.header.root_offset);
        heap.push(QueueEntry {
            dist: root_envelope.squared_distance_to_point(center),
            item: HeapItem::Node(self.header.root_offset),
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
                HeapItem::Node(offset) => {
                    let (_, node, _) = sidx_rtree::read_node_at(&self.mmap, offset);
                    match node {
                        NodeRef::Leaf { start, len } => {
                            for row in start..start + len {
                                let dist = self.primitive(row).squared_distance_to_point(center);
                                heap.push(QueueEntry {
                                    dist,
                                    item: HeapItem::Row(row),
                                });
                            }
                        }
                        NodeRef::Internal { children } => {
                            for (child_envelope, child_offset) in children {
                                heap.push(QueueEntry {
                                    dist: child_envelope.squared_distance_to_point(center),
                                    item: HeapItem::Node(child_offset),
                                });
                            }
                        }
                    }
                }
            }
        }
        results
    }

    pub fn group_count_box(
        &self,
        query: &Aabb,
        accuracy: Accuracy,
        group_by: &str,
    ) -> SidxResult<HashMap<u64, usize>> {
        let hits = self.query_box(query, accuracy);
        let mut counts = HashMap::new();
        for row in hits {
            let key = match self.field(row, group_by)? {
                FieldValue::U64(v) => v,
                FieldValue::U32(v) => v as u64,
                FieldValue::Bool(v) => v as u64,
                FieldValue::F32(_) => {
                    return Err(SidxError::InvalidField(
                        "cannot group by a floating-point field".into(),
                    ))
                }
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[derive(Copy, Clone, Debug)]
enum HeapItem {
    Node(u64),
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
        other.dist.partial_cmp(&self.dist).unwrap_or(Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_mapped_index, MmapBuildConfig};
    use sidx_elements::{ElementKind as EK, ElementStoreBuilder as ESB};

    #[test]
    fn mapped_query_matches_in_memory_query() {
        let dir = tempdir::TempDir::new("sidx_mmap_reader").unwrap();
        let path = dir.path().join("index.bin");

        let mut b = ESB::new(EK::Sphere);
        for i in 0..60u64 {
            b.push_sphere(i, [(i % 10) as f32, (i / 10) as f32, 0.0], 0.4)
                .unwrap();
        }
        build_mapped_index(b.finish().unwrap(), 4, 4, &path, MmapBuildConfig::default()).unwrap();

        let reader = MappedIndex::open(&path).unwrap();
        assert_eq!(reader.element_count(), 60);

        let query = Aabb::new([0.0, 0.0, -1.0], [3.0, 3.0, 1.0]);
        let hits = reader.query_box(&query, Accuracy::BestEffort);
        let mut ids: Vec<u64> = hits.iter().map(|&r| reader.identifier(r)).collect();
        ids.sort();
        assert!(!ids.is_empty());

        let knn = reader.query_knn([0.0, 0.0, 0.0], 5);
        assert_eq!(knn.len(), 5);
    }

    #[test]
    fn open_missing_file_is_not_found() {
        let result = MappedIndex::open(Path::new("/nonexistent/path/index.bin"));
        assert!(matches!(result, Err(SidxError::NotFound(_))));
    }
}
