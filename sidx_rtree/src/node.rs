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

use sidx_geometry::Aabb;

/// An entry in an internal node: the child's own envelope plus where to
/// find it, kept tight per the tree's envelope invariant.
#[derive(Clone, Debug, PartialEq)]
pub struct ChildEntry {
    pub envelope: Aabb,
    pub child: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// A contiguous range `[start, start + len)` into the tree's element
    /// arrays, committed to by the bulk loader.
    Leaf { start: usize, len: usize },
    Internal { children: Vec<ChildEntry> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub envelope: Aabb,
    pub kind: NodeKind,
}

/// The two geometric predicate tiers a query can run under.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Accuracy {
    /// Envelope test only; may return primitives whose exact body misses
    /// the query region. The default.
    BoundingBox,
    /// Envelope test plus the exact primitive test.
    BestEffort,
}

impl Default for Accuracy {
    fn default() -> Self {
        Accuracy::BoundingBox
    }
}
