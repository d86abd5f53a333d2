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

use memmap2::MmapMut;
use sidx_elements::{ElementStore, SidxError, SidxResult};
use std::fs::{self, OpenOptions};
use std::path::Path;

/// Configuration for a memory-mapped build. `capacity_mb` pre-sizes the
/// backing file; the arena never grows past it. `shrink_on_close`
/// truncates the file to the bytes actually used once the tree is
/// finalised.
#[derive(Copy, Clone, Debug)]
pub struct MmapBuildConfig {
    pub capacity_mb: usize,
    pub shrink_on_close: bool,
}

impl Default for MmapBuildConfig {
    fn default() -> Self {
        MmapBuildConfig {
            capacity_mb: 512,
            shrink_on_close: false,
        }
    }
}

/// Bulk-loads `store` and writes the resulting tree into a memory-mapped
/// file at `path`. On `OutOfCapacity`, the partially-written file is
/// removed: no partial builds survive.
pub fn build_mapped_index(
    store: ElementStore,
    fanout: usize,
    leaf_capacity: usize,
    path: &Path,
    config: MmapBuildConfig,
) -> SidxResult<()> {
    let tree = sidx_rtree::bulk_load(store, fanout, leaf_capacity)?;
    let bytes = tree.to_bytes();
    let capacity = config.capacity_mb * 1024 * 1024;

    if bytes.len() > capacity {
        return Err(SidxError::OutOfCapacity {
            requested: bytes.len(),
            available: capacity,
        });
    }

    let result = write_image(&bytes, path, capacity, config.shrink_on_close);
    if result.is_err() {
        let _ = fs::remove_file(path);
    }
    result
}

fn write_image(bytes: &[u8], path: &Path, capacity: usize, shrink_on_close: bool) -> SidxResult<()> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.set_len(capacity as u64)?;

    {
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };
        mmap[..bytes.len()].copy_from_slice(bytes);
        mmap.flush()?;
    }

    if shrink_on_close {
        file.set_len(bytes.len() as u64)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidx_elements::{ElementKind, ElementStoreBuilder};

    fn small_store() -> ElementStore {
        let mut b = ElementStoreBuilder::new(ElementKind::Sphere);
        for i in 0..20u64 {
            b.push_sphere(i, [i as f32, 0.0, 0.0], 0.5).unwrap();
        }
        b.finish().unwrap()
    }

    #[test]
    fn build_writes_a_readable_file() {
        let dir = tempdir::TempDir::new("sidx_mmap_build").unwrap();
        let path = dir.path().join("index.bin");
        build_mapped_index(small_store(), 4, 4, &path, MmapBuildConfig::default()).unwrap();
        assert!(path.exists());
        assert!(fs::metadata(&path).unwrap().len() >= 512 * 1024 * 1024 / 1024);
    }

    #[test]
    fn shrink_on_close_truncates_to_used_bytes() {
        let dir = tempdir::TempDir::new("sidx_mmap_shrink").unwrap();
        let path = dir.path().join("index.bin");
        let config = MmapBuildConfig {
            capacity_mb: 16,
            shrink_on_close: true,
        };
        build_mapped_index(small_store(), 4, 4, &path, config).unwrap();
        let len = fs::metadata(&path).unwrap().len();
        assert!(len < 16 * 1024 * 1024);
    }

    #[test]
    fn out_of_capacity_removes_partial_file() {
        let dir = tempdir::TempDir::new("sidx_mmap_oom").unwrap();
        let path = dir.path().join("index.bin");
        let mut b = ElementStoreBuilder::new(ElementKind::Sphere);
        for i in 0..5000u64 {
            b.push_sphere(i, [i as f32, 0.0, 0.0], 0.5).unwrap();
        }
        let config = MmapBuildConfig {
            capacity_mb: 0,
            shrink_on_close: false,
        };
        let result = build_mapped_index(b.finish().unwrap(), 16, 16, &path, config);
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
