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

//! Reads a manifest and constructs the matching façade. A directory that
//! carries a populations listing instead of a single manifest resolves
//! to a map of per-population façades.

use crate::manifest::{ExtendedRecord, Manifest, PopulationListing, StorageRecord};
use sidx_elements::{ElementKind, SidxError, SidxResult};
use sidx_mmap::MappedIndex;
use sidx_multi::MultiIndexReader;
use sidx_rtree::RTree;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// The opened core index, dispatched to whichever variant the manifest
/// named. Raw-element results borrow from whichever of these is live,
/// so they cannot outlive it.
pub enum ResolvedIndex {
    InMemory(RTree),
    MemoryMapped(MappedIndex),
    MultiIndex(MultiIndexReader),
}

impl ResolvedIndex {
    pub fn element_kind(&self) -> ElementKind {
        match self {
            ResolvedIndex::InMemory(tree) => tree.store().kind(),
            ResolvedIndex::MemoryMapped(mapped) => mapped.element_kind(),
            ResolvedIndex::MultiIndex(reader) => reader.element_kind(),
        }
    }
}

/// A single-population index, decorated with an optional attribute-store
/// link for enrichment.
pub struct OpenedIndex {
    pub index: ResolvedIndex,
    pub extended: Option<ExtendedRecord>,
}

/// Opens the index directory at `dir` as a single population.
pub fn open(dir: &Path) -> SidxResult<OpenedIndex> {
    let manifest = Manifest::read(dir)?;
    log::debug!("resolved manifest at {}: {:?}", dir.display(), manifest.storage);
    let index = match &manifest.storage {
        StorageRecord::InMemory { path } => {
            let bytes = fs::read(dir.join(path))?;
            ResolvedIndex::InMemory(RTree::from_bytes(&bytes)?)
        }
        StorageRecord::MemoryMapped { path } => {
            ResolvedIndex::MemoryMapped(MappedIndex::open(&dir.join(path))?)
        }
        StorageRecord::MultiIndex { path } => {
            ResolvedIndex::MultiIndex(MultiIndexReader::open(&dir.join(path))?)
        }
    };
    Ok(OpenedIndex {
        index,
        extended: manifest.extended,
    })
}

/// A directory that may name a single population or list several.
pub enum PopulationIndex {
    Single(OpenedIndex),
    Multi(HashMap<String, OpenedIndex>),
}

/// Opens `dir`, following the populations listing when present instead
/// of a direct manifest.
pub fn open_population_aware(dir: &Path) -> SidxResult<PopulationIndex> {
    if PopulationListing::exists(dir) {
        let listing = PopulationListing::read(dir)?;
        log::info!(
            "opening multi-population directory {}: {:?}",
            dir.display(),
            listing.populations
        );
        let mut populations = HashMap::with_capacity(listing.populations.len());
        for name in listing.populations {
            let opened = open(&dir.join(&name))?;
            populations.insert(name, opened);
        }
        Ok(PopulationIndex::Multi(populations))
    } else {
        log::debug!("opening single-population directory {}", dir.display());
        Ok(PopulationIndex::Single(open(dir)?))
    }
}

/// Selects a single named population out of a resolved directory, for
/// the `population_mode = single` contract: exactly one population must
/// be named.
pub fn select_population<'a>(
    resolved: &'a mut PopulationIndex,
    name: &str,
) -> SidxResult<&'a OpenedIndex> {
    match resolved {
        PopulationIndex::Single(opened) => Ok(opened),
        PopulationIndex::Multi(map) => map.get(name).ok_or_else(|| {
            log::warn!("requested population '{}' not found in resolved directory", name);
            SidxError::InvalidInput(format!("no such population: {}", name))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidx_elements::{ElementKind as EK, ElementStoreBuilder as ESB};

    #[test]
    fn opens_an_in_memory_index_by_manifest() {
        let dir = tempdir::TempDir::new("sidx_meta_resolver_mem").unwrap();

        let mut b = ESB::new(EK::Sphere);
        for i in 0..40u64 {
            b.push_sphere(i, [(i % 10) as f32, (i / 10) as f32, 0.0], 0.3)
                .unwrap();
        }
        let tree = sidx_rtree::bulk_load(b.finish().unwrap(), 8, 8).unwrap();
        fs::write(dir.path().join("index.bin"), tree.to_bytes()).unwrap();

        Manifest::new(
            EK::Sphere,
            StorageRecord::InMemory {
                path: "index.bin".into(),
            },
        )
        .write(dir.path())
        .unwrap();

        let opened = open(dir.path()).unwrap();
        assert_eq!(opened.index.element_kind(), EK::Sphere);
        assert!(opened.extended.is_none());
    }

    #[test]
    fn opens_a_multi_population_directory() {
        let dir = tempdir::TempDir::new("sidx_meta_resolver_multipop").unwrap();

        for pop in ["PopA", "PopB"] {
            let pop_dir = dir.path().join(pop);
            fs::create_dir_all(&pop_dir).unwrap();
            let mut b = ESB::new(EK::Sphere);
            for i in 0..20u64 {
                b.push_sphere(i, [i as f32, 0.0, 0.0], 0.2).unwrap();
            }
            let tree = sidx_rtree::bulk_load(b.finish().unwrap(), 8, 8).unwrap();
            fs::write(pop_dir.join("index.bin"), tree.to_bytes()).unwrap();
            Manifest::new(
                EK::Sphere,
                StorageRecord::InMemory {
                    path: "index.bin".into(),
                },
            )
            .write(&pop_dir)
            .unwrap();
        }
        PopulationListing {
            populations: vec!["PopA".into(), "PopB".into()],
        }
        .write(dir.path())
        .unwrap();

        let mut resolved = open_population_aware(dir.path()).unwrap();
        assert!(matches!(resolved, PopulationIndex::Multi(_)));
        let pop_a = select_population(&mut resolved, "PopA").unwrap();
        assert_eq!(pop_a.index.element_kind(), EK::Sphere);
    }
}
