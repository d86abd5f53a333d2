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

//! The on-disk manifest that makes an index directory self-describing.
//! One JSON record per directory, named `manifest.json`.

use sidx_elements::{ElementKind, SidxError, SidxResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";
pub const POPULATIONS_FILE_NAME: &str = "populations.json";

/// Exactly one of these names the storage variant and where to find it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageRecord {
    InMemory { path: String },
    MemoryMapped { path: String },
    MultiIndex { path: String },
}

impl StorageRecord {
    pub fn path(&self) -> &str {
        match self {
            StorageRecord::InMemory { path }
            | StorageRecord::MemoryMapped { path }
            | StorageRecord::MultiIndex { path } => path,
        }
    }
}

/// A link to an external attribute store used to enrich query results
/// with fields that are not part of the core element payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtendedRecord {
    pub path: String,
    pub population: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub element_type: ElementKind,
    pub storage: StorageRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended: Option<ExtendedRecord>,
}

impl Manifest {
    pub fn new(element_type: ElementKind, storage: StorageRecord) -> Self {
        Manifest {
            element_type,
            storage,
            extended: None,
        }
    }

    pub fn with_extended(mut self, extended: ExtendedRecord) -> Self {
        self.extended = Some(extended);
        self
    }

    pub fn write(&self, dir: &Path) -> SidxResult<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(dir.join(MANIFEST_FILE_NAME), bytes)?;
        Ok(())
    }

    pub fn read(dir: &Path) -> SidxResult<Manifest> {
        let path = dir.join(MANIFEST_FILE_NAME);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SidxError::NotFound(format!("{}: {}", path.display(), e))
            } else {
                SidxError::IoError(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// The top-level listing for a multi-population directory: one
/// sub-directory name per population.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PopulationListing {
    pub populations: Vec<String>,
}

impl PopulationListing {
    pub fn write(&self, dir: &Path) -> SidxResult<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(dir.join(POPULATIONS_FILE_NAME), bytes)?;
        Ok(())
    }

    pub fn read(dir: &Path) -> SidxResult<PopulationListing> {
        let path = dir.join(POPULATIONS_FILE_NAME);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SidxError::NotFound(format!("{}: {}", path.display(), e))
            } else {
                SidxError::IoError(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// A directory is multi-population iff it carries a populations
    /// listing instead of (or in addition to) a manifest.
    pub fn exists(dir: &Path) -> bool {
        dir.join(POPULATIONS_FILE_NAME).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_round_trips_through_json() {
        let dir = tempdir::TempDir::new("sidx_meta_manifest").unwrap();
        let manifest = Manifest::new(
            ElementKind::Synapse,
            StorageRecord::MemoryMapped {
                path: "index.bin".into(),
            },
        )
        .with_extended(ExtendedRecord {
            path: "/data/attrs".into(),
            population: "All".into(),
        });
        manifest.write(dir.path()).unwrap();

        let reopened = Manifest::read(dir.path()).unwrap();
        assert_eq!(reopened.element_type, ElementKind::Synapse);
        assert_eq!(reopened.storage.path(), "index.bin");
        assert_eq!(reopened.extended.unwrap().population, "All");
    }

    #[test]
    fn missing_manifest_is_not_found() {
        let dir = tempdir::TempDir::new("sidx_meta_missing").unwrap();
        let result = Manifest::read(dir.path());
        assert!(matches!(result, Err(SidxError::NotFound(_))));
    }
}
