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

use crate::node::Node;
use sidx_elements::ElementStore;
use sidx_geometry::Aabb;

/// A bulk-loaded, immutable R-tree. Owns a leaf-ordered copy of its
/// element store; row indices returned by queries index into that copy,
/// not into whatever store the caller originally built.
#[derive(Debug)]
pub struct RTree {
    pub(crate) store: ElementStore,
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: usize,
    pub(crate) fanout: usize,
    pub(crate) leaf_capacity: usize,
}

impl RTree {
    pub(crate) fn from_parts(
        store: ElementStore,
        nodes: Vec<Node>,
        root: usize,
        fanout: usize,
        leaf_capacity: usize,
    ) -> Self {
        RTree {
            store,
            nodes,
            root,
            fanout,
            leaf_capacity,
        }
    }

    pub fn element_count(&self) -> usize {
        self.store.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn fanout(&self) -> usize {
        self.fanout
    }

    pub fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    /// The envelope enclosing every element in the tree.
    pub fn bounds(&self) -> Aabb {
        self.nodes[self.root].envelope
    }

    /// Recomputes every node's envelope from its children/elements and
    /// compares it against the stored one. Used to check the tree's
    /// envelope-tightness invariant.
    pub fn envelopes_are_tight(&self) -> bool {
        self.nodes
            .iter()
            .all(|node| self.recomputed_envelope(node) == node.envelope)
    }

    fn recomputed_envelope(&self, node: &Node) -> Aabb {
        match &node.kind {
            crate::node::NodeKind::Leaf { start, len } => Aabb::union_all(
                self.store.primitives()[*start..*start + *len]
                    .iter()
                    .map(|p| p.bounding_box())
                    .collect::<Vec<_>>()
                    .iter(),
            )
            .expect("a leaf is never empty"),
            crate::node::NodeKind::Internal { children } => {
                Aabb::union_all(children.iter().map(|c| &c.envelope))
                    .expect("an internal node is never empty")
            }
        }
    }
}
