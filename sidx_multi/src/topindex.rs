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

//! An in-memory index over `(envelope, subtree_id)` pairs: one entry per
//! rank's subtree. Rank counts are small (tens, not millions), so rather
//! than bulk-load a full `sidx_rtree::RTree` over single-box "elements"
//! this is the one-leaf tree STR would itself produce at that scale —
//! a flat scan with the same envelope test the tree core uses.

use sidx_elements::{SidxError, SidxResult};
use sidx_geometry::{Aabb, Vec3};
use std::fs;
use std::path::Path;

const MAGIC: &[u8; 4] = b"STOP";

#[derive(Clone, Debug)]
pub struct TopIndex {
    entries: Vec<(Aabb, u32)>,
}

impl TopIndex {
    pub fn new(entries: Vec<(Aabb, u32)>) -> Self {
        TopIndex { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::union_all(self.entries.iter().map(|(e, _)| e))
    }

    /// Subtree ids whose envelope intersects `query`.
    pub fn intersecting_box(&self, query: &Aabb) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|(e, _)| e.intersects(query))
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn intersecting_sphere(&self, center: Vec3, radius: f32) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|(e, _)| e.intersects_sphere(center, radius))
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn subtree_ids(&self) -> Vec<u32> {
        self.entries.iter().map(|(_, id)| id).copied().collect()
    }

    pub fn entries_ref(&self) -> &[(Aabb, u32)] {
        &self.entries
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.entries.len() * 28);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for (envelope, id) in &self.entries {
            for v in envelope.min.iter().chain(envelope.max.iter()) {
                buf.extend_from_slice(&v.to_le_bytes());
            }
            buf.extend_from_slice(&id.to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> SidxResult<TopIndex> {
        if bytes.len() < 8 || &bytes[0..4] != MAGIC {
            return Err(SidxError::InvalidInput("bad top-index magic".into()));
        }
        let count = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let mut entries = Vec::with_capacity(count);
        let mut cursor = 8usize;
        for _ in 0..count {
            let mut f = [0f32; 6];
            for (i, slot) in f.iter_mut().enumerate() {
                let off = cursor + i * 4;
                *slot = f32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
            }
            let envelope = Aabb::new([f[0], f[1], f[2]], [f[3], f[4], f[5]]);
            let id = u32::from_le_bytes(bytes[cursor + 24..cursor + 28].try_into().unwrap());
            entries.push((envelope, id));
            cursor += 28;
        }
        Ok(TopIndex { entries })
    }

    pub fn write(&self, path: &Path) -> SidxResult<()> {
        fs::write(path, self.to_bytes())?;
        Ok(())
    }

    pub fn open(path: &Path) -> SidxResult<TopIndex> {
        let bytes = fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SidxError::NotFound(format!("{}: {}", path.display(), e))
            } else {
                SidxError::IoError(e)
            }
        })?;
        TopIndex::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let top = TopIndex::new(vec![
            (Aabb::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]), 0),
            (Aabb::new([5.0, 5.0, 5.0], [6.0, 6.0, 6.0]), 1),
        ]);
        let bytes = top.to_bytes();
        let reopened = TopIndex::from_bytes(&bytes).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(
            reopened.intersecting_box(&Aabb::new([0.5, 0.5, 0.5], [0.6, 0.6, 0.6])),
            vec![0]
        );
    }
}
