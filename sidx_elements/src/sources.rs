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

//! The seams between this crate's element store and the outside world:
//! morphology/synapse ingestion and attribute-store enrichment. Parsing
//! circuit files and joining against the scientific data container are
//! out of scope; only these contracts are fixed.

use crate::errors::SidxResult;
use crate::FieldValue;
use sidx_geometry::Vec3;

/// One non-soma segment of a neuron, already rotated and translated into
/// world coordinates by the caller.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SegmentRecord {
    pub section_id: u32,
    pub segment_id: u32,
    pub p1: Vec3,
    pub p2: Vec3,
    pub radius: f32,
}

/// Feeds neuron morphology into the builder: a soma plus a sequence of
/// segments per neuron identifier.
pub trait MorphologySource {
    fn neuron_ids(&self) -> SidxResult<Vec<u64>>;
    fn soma(&self, gid: u64) -> SidxResult<(Vec3, f32)>;
    fn segments(&self, gid: u64) -> SidxResult<Vec<SegmentRecord>>;
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SynapseRecord {
    pub id: u64,
    pub pre_gid: u64,
    pub post_gid: u64,
    pub center: Vec3,
}

/// Feeds synapse points into the builder.
pub trait SynapseSource {
    fn synapses(&self) -> SidxResult<Vec<SynapseRecord>>;
}

/// An external column store consulted by the query façade's attribute
/// enrichment decorator. `ids` and the returned column are positionally
/// aligned and of equal length.
pub trait AttributeStore: Send + Sync {
    fn fetch(&self, ids: &[u64], field: &str) -> SidxResult<Vec<FieldValue>>;
}
