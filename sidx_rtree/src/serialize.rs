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

//! The single-blob byte format: a fixed header, a node table whose
//! internal entries store byte offsets (not array indices, so reopening
//! is a single read with no pointer fix-up), and an element table in
//! leaf order. Every scalar is written with `to_le_bytes`/read with
//! `from_le_bytes` rather than cast through a `#[repr(C)]` struct, so
//! nothing here depends on the image being aligned in memory — a
//! requirement once the same bytes are served out of a memory map that
//! may start at an arbitrary page offset.

use crate::node::{ChildEntry, Node, NodeKind};
use crate::tree::RTree;
use sidx_elements::{Column, ElementKind, ElementStoreBuilder, SidxError, SidxResult};
use sidx_geometry::{Aabb, Cylinder, Point, Primitive, Sphere};
use std::collections::HashMap;

const MAGIC: &[u8; 4] = b"SIDX";
const VERSION: u16 = 1;
const HEADER_LEN: usize = 32;

fn kind_tag(kind: ElementKind) -> u8 {
    match kind {
        ElementKind::Morphology => 0,
        ElementKind::Synapse => 1,
        ElementKind::Sphere => 2,
    }
}

fn kind_from_tag(tag: u8) -> SidxResult<ElementKind> {
    match tag {
        0 => Ok(ElementKind::Morphology),
        1 => Ok(ElementKind::Synapse),
        2 => Ok(ElementKind::Sphere),
        other => Err(SidxError::InvalidInput(format!(
            "unknown element-kind tag {}",
            other
        ))),
    }
}

fn write_aabb(buf: &mut Vec<u8>, aabb: &Aabb) {
    for v in aabb.min.iter().chain(aabb.max.iter()) {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

/// The header fields, exposed so a memory-mapped reader can validate and
/// locate the node/element tables without materialising a full `RTree`.
#[derive(Copy, Clone, Debug)]
pub struct Header {
    pub element_kind: ElementKind,
    pub node_count: usize,
    pub element_count: usize,
    pub root_offset: u64,
}

pub fn read_header(bytes: &[u8]) -> SidxResult<Header> {
    if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
        return Err(SidxError::InvalidInput(
            "not a spatial index image: bad magic".into(),
        ));
    }
    let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
    if version != VERSION {
        return Err(SidxError::Unsupported(format!(
            "unsupported index format version {}",
            version
        )));
    }
    Ok(Header {
        element_kind: kind_from_tag(bytes[6])?,
        node_count: u64::from_le_bytes(bytes[8..16].try_into().unwrap()) as usize,
        element_count: u64::from_le_bytes(bytes[16..24].try_into().unwrap()) as usize,
        root_offset: u64::from_le_bytes(bytes[24..32].try_into().unwrap()),
    })
}

/// A node read directly out of the byte image, with children addressed
/// by byte offset rather than array index.
#[derive(Clone, Debug)]
pub enum NodeRef {
    Leaf { start: usize, len: usize },
    Internal { children: Vec<(Aabb, u64)> },
}

/// Reads one node record starting at `offset`. Returns the node's own
/// envelope, its contents, and the offset just past the record (so
/// callers walking the table sequentially don't need to recompute sizes).
pub fn read_node_at(bytes: &[u8], offset: u64) -> (Aabb, NodeRef, u64) {
    let at = offset as usize;
    let tag = bytes[at];
    let envelope = read_aabb(bytes, at + 1);
    let mut cursor = at + 25;
    let node = if tag == 0 {
        let start = u64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap()) as usize;
        let len = u64::from_le_bytes(bytes[cursor + 8..cursor + 16].try_into().unwrap()) as usize;
        cursor += 16;
        NodeRef::Leaf { start, len }
    } else {
        let child_count = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        let mut children = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            let child_envelope = read_aabb(bytes, cursor);
            cursor += 24;
            let child_offset = u64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
            cursor += 8;
            children.push((child_envelope, child_offset));
        }
        NodeRef::Internal { children }
    };
    (envelope, node, cursor as u64)
}

/// Reads one primitive record at `offset`, returning it and the byte
/// size of the record (the identifier columns for that row follow
/// immediately, outside this function's concern).
pub fn read_primitive_at(bytes: &[u8], offset: u64) -> SidxResult<(Primitive, usize)> {
    read_primitive(bytes, offset as usize)
}

/// Walks the node table to find where the element table begins. Callers
/// that need random access to both tables do this once at open time.
pub fn element_table_offset(bytes: &[u8], header: &Header) -> u64 {
    let mut cursor = HEADER_LEN as u64;
    for _ in 0..header.node_count {
        let (_, _, next) = read_node_at(bytes, cursor);
        cursor = next;
    }
    cursor
}

/// The fixed width of the identifier payload that follows each
/// primitive's bytes in the element table, keyed by element kind.
pub fn identifier_row_width(kind: ElementKind) -> usize {
    match kind {
        ElementKind::Morphology => 17,
        ElementKind::Synapse => 24,
        ElementKind::Sphere => 8,
    }
}

fn read_aabb(bytes: &[u8], at: usize) -> Aabb {
    let mut f = [0f32; 6];
    for (i, slot) in f.iter_mut().enumerate() {
        let off = at + i * 4;
        *slot = f32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
    }
    Aabb::new([f[0], f[1], f[2]], [f[3], f[4], f[5]])
}

fn node_size(kind: &NodeKind) -> usize {
    match kind {
        NodeKind::Leaf { .. } => 1 + 24 + 8 + 8,
        NodeKind::Internal { children } => 1 + 24 + 4 + children.len() * (24 + 8),
    }
}

fn write_node(buf: &mut Vec<u8>, node: &Node, child_offsets: &HashMap<usize, u64>) {
    match &node.kind {
        NodeKind::Leaf { start, len } => {
            buf.push(0);
            write_aabb(buf, &node.envelope);
            buf.extend_from_slice(&(*start as u64).to_le_bytes());
            buf.extend_from_slice(&(*len as u64).to_le_bytes());
        }
        NodeKind::Internal { children } => {
            buf.push(1);
            write_aabb(buf, &node.envelope);
            buf.extend_from_slice(&(children.len() as u32).to_le_bytes());
            for child in children {
                write_aabb(buf, &child.envelope);
                let offset = child_offsets[&child.child];
                buf.extend_from_slice(&offset.to_le_bytes());
            }
        }
    }
}

fn write_primitive(buf: &mut Vec<u8>, p: &Primitive) {
    match p {
        Primitive::Sphere(s) => {
            buf.push(0);
            for v in s.center {
                buf.extend_from_slice(&v.to_le_bytes());
            }
            buf.extend_from_slice(&s.radius.to_le_bytes());
        }
        Primitive::Cylinder(c) => {
            buf.push(1);
            for v in c.p0.into_iter().chain(c.p1.into_iter()) {
                buf.extend_from_slice(&v.to_le_bytes());
            }
            buf.extend_from_slice(&c.radius.to_le_bytes());
        }
        Primitive::Point(pt) => {
            buf.push(2);
            for v in pt.position {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
}

fn read_primitive(bytes: &[u8], at: usize) -> SidxResult<(Primitive, usize)> {
    let f32_at = |off: usize| f32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
    match bytes[at] {
        0 => {
            let center = [f32_at(at + 1), f32_at(at + 5), f32_at(at + 9)];
            let radius = f32_at(at + 13);
            Ok((Primitive::Sphere(Sphere { center, radius }), 17))
        }
        1 => {
            let p0 = [f32_at(at + 1), f32_at(at + 5), f32_at(at + 9)];
            let p1 = [f32_at(at + 13), f32_at(at + 17), f32_at(at + 21)];
            let radius = f32_at(at + 25);
            Ok((Primitive::Cylinder(Cylinder { p0, p1, radius }), 29))
        }
        2 => {
            let position = [f32_at(at + 1), f32_at(at + 5), f32_at(at + 9)];
            Ok((Primitive::Point(Point { position }), 13))
        }
        other => Err(SidxError::InvalidInput(format!(
            "unknown primitive tag {}",
            other
        ))),
    }
}

fn as_u64_column(column: Column) -> Vec<u64> {
    match column {
        Column::U64(v) => v,
        _ => panic!("expected a u64 column"),
    }
}

fn as_u32_column(column: Column) -> Vec<u32> {
    match column {
        Column::U32(v) => v,
        _ => panic!("expected a u32 column"),
    }
}

fn as_bool_column(column: Column) -> Vec<bool> {
    match column {
        Column::Bool(v) => v,
        _ => panic!("expected a bool column"),
    }
}

impl RTree {
    /// Serialises the tree into a single contiguous byte image: header,
    /// node table, element table.
    pub fn to_bytes(&self) -> Vec<u8> {
        let sizes: Vec<usize> = self.nodes.iter().map(|n| node_size(&n.kind)).collect();
        let mut offsets: HashMap<usize, u64> = HashMap::with_capacity(sizes.len());
        let mut running = HEADER_LEN;
        for (i, size) in sizes.iter().enumerate() {
            offsets.insert(i, running as u64);
            running += size;
        }
        let root_offset = offsets[&self.root];

        let mut buf = Vec::with_capacity(running + self.store.len() * 32);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.push(kind_tag(self.store.kind()));
        buf.push(0); // reserved
        buf.extend_from_slice(&(self.nodes.len() as u64).to_le_bytes());
        buf.extend_from_slice(&(self.store.len() as u64).to_le_bytes());
        buf.extend_from_slice(&root_offset.to_le_bytes());
        debug_assert_eq!(buf.len(), HEADER_LEN);

        for node in &self.nodes {
            write_node(&mut buf, node, &offsets);
        }
        debug_assert_eq!(buf.len(), running);

        for primitive in self.store.primitives() {
            write_primitive(&mut buf, primitive);
        }

        let rows: Vec<usize> = (0..self.store.len()).collect();
        match self.store.kind() {
            ElementKind::Morphology => {
                let gid = as_u64_column(self.store.project("gid", &rows).unwrap());
                let section_id = as_u32_column(self.store.project("section_id", &rows).unwrap());
                let segment_id = as_u32_column(self.store.project("segment_id", &rows).unwrap());
                let is_soma = as_bool_column(self.store.project("is_soma", &rows).unwrap());
                for i in 0..rows.len() {
                    buf.extend_from_slice(&gid[i].to_le_bytes());
                    buf.extend_from_slice(&section_id[i].to_le_bytes());
                    buf.extend_from_slice(&segment_id[i].to_le_bytes());
                    buf.push(is_soma[i] as u8);
                }
            }
            ElementKind::Synapse => {
                let id = as_u64_column(self.store.project("id", &rows).unwrap());
                let pre_gid = as_u64_column(self.store.project("pre_gid", &rows).unwrap());
                let post_gid = as_u64_column(self.store.project("post_gid", &rows).unwrap());
                for i in 0..rows.len() {
                    buf.extend_from_slice(&id[i].to_le_bytes());
                    buf.extend_from_slice(&pre_gid[i].to_le_bytes());
                    buf.extend_from_slice(&post_gid[i].to_le_bytes());
                }
            }
            ElementKind::Sphere => {
                let id = as_u64_column(self.store.project("id", &rows).unwrap());
                for v in id {
                    buf.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
        buf
    }

    /// Reconstructs a tree from bytes produced by `to_bytes`.
    pub fn from_bytes(bytes: &[u8]) -> SidxResult<RTree> {
        if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
            return Err(SidxError::InvalidInput(
                "not a spatial index image: bad magic".into(),
            ));
        }
        let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        if version != VERSION {
            return Err(SidxError::Unsupported(format!(
                "unsupported index format version {}",
                version
            )));
        }
        let kind = kind_from_tag(bytes[6])?;
        let node_count = u64::from_le_bytes(bytes[8..16].try_into().unwrap()) as usize;
        let element_count = u64::from_le_bytes(bytes[16..24].try_into().unwrap()) as usize;
        let root_offset = u64::from_le_bytes(bytes[24..32].try_into().unwrap());

        let mut nodes: Vec<Node> = Vec::with_capacity(node_count);
        let mut offset_to_index: HashMap<u64, usize> = HashMap::with_capacity(node_count);
        let mut cursor = HEADER_LEN;
        for _ in 0..node_count {
            let start_offset = cursor as u64;
            let tag = bytes[cursor];
            let envelope = read_aabb(bytes, cursor + 1);
            cursor += 25;
            let kind = if tag == 0 {
                let start = u64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap()) as usize;
                let len = u64::from_le_bytes(bytes[cursor + 8..cursor + 16].try_into().unwrap()) as usize;
                cursor += 16;
                NodeKind::Leaf { start, len }
            } else if tag == 1 {
                let child_count =
                    u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
                cursor += 4;
                let mut children = Vec::with_capacity(child_count);
                for _ in 0..child_count {
                    let child_envelope = read_aabb(bytes, cursor);
                    cursor += 24;
                    let child_offset =
                        u64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
                    cursor += 8;
                    let child_index = *offset_to_index.get(&child_offset).ok_or_else(|| {
                        SidxError::InvalidInput(
                            "node table references an unknown child offset".into(),
                        )
                    })?;
                    children.push(ChildEntry {
                        envelope: child_envelope,
                        child: child_index,
                    });
                }
                NodeKind::Internal { children }
            } else {
                return Err(SidxError::InvalidInput(format!(
                    "unknown node tag {}",
                    tag
                )));
            };
            nodes.push(Node { envelope, kind });
            offset_to_index.insert(start_offset, nodes.len() - 1);
        }
        let root = *offset_to_index
            .get(&root_offset)
            .ok_or_else(|| SidxError::InvalidInput("root offset not a node boundary".into()))?;

        let mut primitives = Vec::with_capacity(element_count);
        for _ in 0..element_count {
            let (primitive, size) = read_primitive(bytes, cursor)?;
            cursor += size;
            primitives.push(primitive);
        }

        let mut builder = ElementStoreBuilder::new(kind);
        match kind {
            ElementKind::Morphology => {
                for primitive in &primitives {
                    let gid = u64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
                    let section_id =
                        u32::from_le_bytes(bytes[cursor + 8..cursor + 12].try_into().unwrap());
                    let segment_id =
                        u32::from_le_bytes(bytes[cursor + 12..cursor + 16].try_into().unwrap());
                    let is_soma = bytes[cursor + 16] != 0;
                    cursor += 17;
                    if is_soma {
                        let s = match primitive {
                            Primitive::Sphere(s) => s,
                            _ => {
                                return Err(SidxError::InvalidInput(
                                    "soma row is not a sphere".into(),
                                ))
                            }
                        };
                        builder.push_soma(gid, s.center, s.radius)?;
                    } else {
                        let c = match primitive {
                            Primitive::Cylinder(c) => c,
                            _ => {
                                return Err(SidxError::InvalidInput(
                                    "segment row is not a cylinder".into(),
                                ))
                            }
                        };
                        builder.push_segment(gid, section_id, segment_id, c.p0, c.p1, c.radius)?;
                    }
                }
            }
            ElementKind::Synapse => {
                for primitive in &primitives {
                    let id = u64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
                    let pre_gid =
                        u64::from_le_bytes(bytes[cursor + 8..cursor + 16].try_into().unwrap());
                    let post_gid =
                        u64::from_le_bytes(bytes[cursor + 16..cursor + 24].try_into().unwrap());
                    cursor += 24;
                    let center = match primitive {
                        Primitive::Point(p) => p.position,
                        _ => {
                            return Err(SidxError::InvalidInput(
                                "synapse row is not a point".into(),
                            ))
                        }
                    };
                    builder.push_synapse(id, pre_gid, post_gid, center)?;
                }
            }
            ElementKind::Sphere => {
                for primitive in &primitives {
                    let id = u64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
                    cursor += 8;
                    let s = match primitive {
                        Primitive::Sphere(s) => s,
                        _ => {
                            return Err(SidxError::InvalidInput(
                                "sphere row is not a sphere".into(),
                            ))
                        }
                    };
                    builder.push_sphere(id, s.center, s.radius)?;
                }
            }
        }
        let store = builder.finish()?;

        Ok(RTree::from_parts(store, nodes, root, 0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{bulk_load, DEFAULT_FANOUT, DEFAULT_LEAF_CAPACITY};
    use crate::node::Accuracy;
    use sidx_elements::{ElementKind as EK, ElementStoreBuilder as ESB};

    #[test]
    fn round_trip_preserves_query_results() {
        let mut b = ESB::new(EK::Sphere);
        for i in 0..40u64 {
            b.push_sphere(i, [i as f32, 0.0, 0.0], 0.5).unwrap();
        }
        let tree = bulk_load(b.finish().unwrap(), DEFAULT_FANOUT, DEFAULT_LEAF_CAPACITY).unwrap();
        let bytes = tree.to_bytes();
        let reopened = RTree::from_bytes(&bytes).unwrap();

        assert_eq!(tree.element_count(), reopened.element_count());
        assert_eq!(tree.bounds(), reopened.bounds());

        let query = Aabb::new([5.0, -1.0, -1.0], [10.0, 1.0, 1.0]);
        let mut before: Vec<u64> = tree
            .query_box(&query, Accuracy::BestEffort)
            .into_iter()
            .map(|r| tree.store().identifier(r))
            .collect();
        let mut after: Vec<u64> = reopened
            .query_box(&query, Accuracy::BestEffort)
            .into_iter()
            .map(|r| reopened.store().identifier(r))
            .collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8; 64];
        assert!(RTree::from_bytes(&bytes).is_err());
    }
}
