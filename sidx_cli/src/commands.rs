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

use crate::ingest::{FixtureMorphologySource, FixtureSynapseSource};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use sidx_elements::{
    ElementKind, ElementStoreBuilder, MorphologySource, SidxError, SidxResult, SynapseSource,
};
use sidx_geometry::Aabb;
use sidx_meta::{Manifest, PopulationListing, StorageRecord};
use sidx_mmap::MmapBuildConfig;
use sidx_multi::MultiBuildConfig;
use sidx_query::{QueryEngine, ResultSpec, Shape};
use sidx_rtree::Accuracy;
use std::fs;
use std::path::Path;

const DEFAULT_WORKERS: usize = 4;

fn morphology_store(source: &dyn MorphologySource) -> SidxResult<sidx_elements::ElementStore> {
    let mut builder = ElementStoreBuilder::new(ElementKind::Morphology);
    for gid in source.neuron_ids()? {
        let (center, radius) = source.soma(gid)?;
        builder.push_soma(gid, center, radius)?;
        for segment in source.segments(gid)? {
            builder.push_segment(
                gid,
                segment.section_id,
                segment.segment_id,
                segment.p1,
                segment.p2,
                segment.radius,
            )?;
        }
    }
    builder.finish()
}

fn synapse_store(source: &dyn SynapseSource) -> SidxResult<sidx_elements::ElementStore> {
    let mut builder = ElementStoreBuilder::new(ElementKind::Synapse);
    for record in source.synapses()? {
        builder.push_synapse(record.id, record.pre_gid, record.post_gid, record.center)?;
    }
    builder.finish()
}

/// Writes one single-population index directory: either a memory-mapped
/// single index (the default, since the whole point of this system is
/// datasets larger than resident memory) or a multi-index when
/// requested.
fn write_index_directory(
    store: sidx_elements::ElementStore,
    dir: &Path,
    multi_index: bool,
) -> SidxResult<()> {
    fs::create_dir_all(dir)?;
    let kind = store.kind();
    if multi_index {
        sidx_multi::build_multi_index(store, DEFAULT_WORKERS, dir, MultiBuildConfig::default())?;
        Manifest::new(kind, StorageRecord::MultiIndex { path: ".".into() }).write(dir)?;
    } else {
        let index_path = dir.join("index.bin");
        sidx_mmap::build_mapped_index(store, 16, 16, &index_path, MmapBuildConfig::default())?;
        Manifest::new(
            kind,
            StorageRecord::MemoryMapped {
                path: "index.bin".into(),
            },
        )
        .write(dir)?;
    }
    Ok(())
}

pub fn index_segments(
    circuit_config: &Path,
    out: &Path,
    multi_index: bool,
    populations: &[String],
) -> SidxResult<()> {
    let source = FixtureMorphologySource::load(circuit_config)?;

    if populations.is_empty() {
        let store = morphology_store(&source)?;
        write_index_directory(store, out, multi_index)
    } else {
        for population in populations {
            let store = morphology_store(&source)?;
            write_index_directory(store, &out.join(population), multi_index)?;
        }
        PopulationListing {
            populations: populations.to_vec(),
        }
        .write(out)
    }
}

pub fn index_synapses(
    edges_file: &Path,
    out: &Path,
    multi_index: bool,
    population: Option<&str>,
) -> SidxResult<()> {
    let source = FixtureSynapseSource::load(edges_file)?;

    match population {
        None => {
            let store = synapse_store(&source)?;
            write_index_directory(store, out, multi_index)
        }
        Some(name) => {
            let store = synapse_store(&source)?;
            write_index_directory(store, &out.join(name), multi_index)?;
            PopulationListing {
                populations: vec![name.to_string()],
            }
            .write(out)
        }
    }
}

/// A probabilistic equivalence check: sample random box queries inside
/// the intersection of both indexes' bounds and compare identifier sets
/// under `best_effort` accuracy. Returns `Ok(true)` iff every sample
/// matched.
pub fn index_compare(index_a: &Path, index_b: &Path) -> SidxResult<bool> {
    let engine_a = QueryEngine::new(sidx_meta::open(index_a)?);
    let engine_b = QueryEngine::new(sidx_meta::open(index_b)?);

    if engine_a.element_kind() != engine_b.element_kind() {
        return Ok(false);
    }

    let (bounds_a, bounds_b) = match (engine_a.bounds(), engine_b.bounds()) {
        (Some(a), Some(b)) => (a, b),
        (None, None) => return Ok(true),
        _ => return Ok(false),
    };

    let min = [
        bounds_a.min[0].max(bounds_b.min[0]),
        bounds_a.min[1].max(bounds_b.min[1]),
        bounds_a.min[2].max(bounds_b.min[2]),
    ];
    let max = [
        bounds_a.max[0].min(bounds_b.max[0]),
        bounds_a.max[1].min(bounds_b.max[1]),
        bounds_a.max[2].min(bounds_b.max[2]),
    ];
    if min[0] > max[0] || min[1] > max[1] || min[2] > max[2] {
        return Ok(false);
    }

    let mut rng = SmallRng::seed_from_u64(0xC0FFEE);
    const SAMPLES: usize = 25;
    for _ in 0..SAMPLES {
        let lo = [
            rng.gen_range(min[0]..=max[0]),
            rng.gen_range(min[1]..=max[1]),
            rng.gen_range(min[2]..=max[2]),
        ];
        let hi = [
            rng.gen_range(lo[0]..=max[0]),
            rng.gen_range(lo[1]..=max[1]),
            rng.gen_range(lo[2]..=max[2]),
        ];
        let shape = Shape::Box(Aabb::new(lo, hi));

        let mut ids_a = field_u64_values(&engine_a, shape.clone())?;
        let mut ids_b = field_u64_values(&engine_b, shape)?;
        ids_a.sort_unstable();
        ids_b.sort_unstable();
        if ids_a != ids_b {
            return Ok(false);
        }
    }
    Ok(true)
}

fn field_u64_values(engine: &QueryEngine, shape: Shape) -> SidxResult<Vec<u64>> {
    let field = match engine.element_kind() {
        ElementKind::Morphology => "gid",
        ElementKind::Synapse | ElementKind::Sphere => "id",
    };
    match engine.query(
        shape,
        Some(Accuracy::BestEffort),
        ResultSpec::Field(field.into()),
        None,
    )? {
        sidx_query::QueryResult::Field(sidx_elements::Column::U64(values)) => Ok(values),
        other => Err(SidxError::InvalidField(format!(
            "expected a u64 identifier column, got {:?}",
            other
        ))),
    }
}

