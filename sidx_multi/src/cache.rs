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

//! An LRU cache over opened subtree mappings, bounded by an advisory byte
//! budget rather than a hard entry cap: a single subtree larger than the
//! whole budget is still kept (there is nowhere else to put it) and it
//! simply evicts everything else.

use sidx_mmap::MappedIndex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const DEFAULT_BUDGET_BYTES: u64 = 1 << 30;

struct CacheEntry {
    index: Rc<MappedIndex>,
    bytes: u64,
}

pub struct SubtreeCache {
    subtrees_dir: PathBuf,
    budget_bytes: u64,
    resident_bytes: u64,
    entries: HashMap<u32, CacheEntry>,
    recency: VecDeque<u32>,
}

impl SubtreeCache {
    pub fn new(subtrees_dir: PathBuf, budget_bytes: u64) -> Self {
        SubtreeCache {
            subtrees_dir,
            budget_bytes,
            resident_bytes: 0,
            entries: HashMap::new(),
            recency: VecDeque::new(),
        }
    }

    pub fn get(&mut self, subtree_id: u32) -> sidx_elements::SidxResult<Rc<MappedIndex>> {
        if self.entries.contains_key(&subtree_id) {
            self.touch(subtree_id);
            return Ok(Rc::clone(&self.entries[&subtree_id].index));
        }

        let path = self.subtree_path(subtree_id);
        let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        log::debug!("subtree cache miss for {}, opening {}", subtree_id, path.display());
        let index = Rc::new(MappedIndex::open(&path)?);

        while self.resident_bytes + bytes > self.budget_bytes && !self.recency.is_empty() {
            self.evict_oldest();
        }

        self.resident_bytes += bytes;
        self.entries.insert(subtree_id, CacheEntry { index: Rc::clone(&index), bytes });
        self.recency.push_back(subtree_id);
        Ok(index)
    }

    fn subtree_path(&self, subtree_id: u32) -> PathBuf {
        self.subtrees_dir.join(format!("worker_{}.bin", subtree_id))
    }

    fn touch(&mut self, subtree_id: u32) {
        if let Some(pos) = self.recency.iter().position(|&id| id == subtree_id) {
            self.recency.remove(pos);
        }
        self.recency.push_back(subtree_id);
    }

    fn evict_oldest(&mut self) {
        if let Some(victim) = self.recency.pop_front() {
            if let Some(entry) = self.entries.remove(&victim) {
                self.resident_bytes -= entry.bytes;
                log::debug!(
                    "evicted subtree {} ({} bytes), {} bytes resident",
                    victim,
                    entry.bytes,
                    self.resident_bytes
                );
            }
        }
    }

    pub fn resident_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collective::{build_multi_index, MultiBuildConfig};
    use sidx_elements::{ElementKind, ElementStoreBuilder};

    fn built_multi_index(dir: &Path, workers: usize) {
        let mut b = ElementStoreBuilder::new(ElementKind::Sphere);
        for i in 0..2_000u64 {
            b.push_sphere(i, [(i % 40) as f32, (i / 40) as f32, 0.0], 0.3)
                .unwrap();
        }
        build_multi_index(b.finish().unwrap(), workers, dir, MultiBuildConfig::default()).unwrap();
    }

    #[test]
    fn eviction_keeps_resident_bytes_under_budget_when_entries_are_small() {
        let dir = tempdir::TempDir::new("sidx_multi_cache").unwrap();
        built_multi_index(dir.path(), 4);

        let mut cache = SubtreeCache::new(dir.path().join("subtrees"), 1);
        for id in 0..4u32 {
            cache.get(id).unwrap();
        }
        assert!(cache.resident_count() <= 4);
    }

    #[test]
    fn repeated_get_reuses_the_same_mapping() {
        let dir = tempdir::TempDir::new("sidx_multi_cache_reuse").unwrap();
        built_multi_index(dir.path(), 4);

        let mut cache = SubtreeCache::new(dir.path().join("subtrees"), DEFAULT_BUDGET_BYTES);
        let a = cache.get(0).unwrap();
        let b = cache.get(0).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
    }
}
