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

//! A pre-sized, memory-mapped backing store for a bulk-loaded tree. The
//! byte layout is exactly `sidx_rtree`'s single-blob format; this crate's
//! job is the file lifecycle around it (sizing, the bump cursor that is
//! really just "how much of the blob did we write", shrink-on-close) and
//! a query path that walks the mapping directly instead of materialising
//! an in-memory `RTree` on open.

mod build;
mod reader;

pub use build::{build_mapped_index, MmapBuildConfig};
pub use reader::MappedIndex;
