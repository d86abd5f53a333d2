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

use sidx_elements::Column;
use sidx_geometry::Primitive;
use std::collections::HashMap;

/// What shape of result a query should produce.
#[derive(Clone, Debug)]
pub enum ResultSpec {
    RawElements,
    Field(String),
    Fields(Vec<String>),
    Counts { group_by: Option<String> },
}

/// A self-contained copy of a hit's geometry and identifier. Raw-element
/// results borrowing straight from the index assumes one backing
/// representation; this façade fans out over three (an owned tree, a
/// byte mapping, a multi-subtree reader with its own interior-mutable
/// cache), so a borrow with one lifetime cannot name all three
/// uniformly. `Primitive` is `Copy` and `identifier` is a scalar, so the
/// owned snapshot costs one struct per hit, not a per-hit allocation
/// chain.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RawElement {
    pub primitive: Primitive,
    pub identifier: u64,
}

#[derive(Clone, Debug)]
pub enum QueryResult {
    RawElements(Vec<RawElement>),
    Field(Column),
    Fields(HashMap<String, Column>),
    Count(usize),
    GroupedCounts(HashMap<u64, usize>),
}
