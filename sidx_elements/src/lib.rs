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

//! The columnar element store: tagged rows of indexed primitives with
//! their identifier payload, the external source contracts that feed the
//! store, and the error type shared by every crate in the workspace.

pub mod errors;
pub mod sources;
mod store;

pub use errors::{SidxError, SidxResult};
pub use sources::{AttributeStore, MorphologySource, SegmentRecord, SynapseRecord, SynapseSource};
pub use store::{Column, ElementKind, ElementStore, ElementStoreBuilder, FieldValue};
