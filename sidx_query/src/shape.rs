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

use sidx_geometry::{Aabb, Vec3};

/// The three region shapes the façade accepts. k-nearest has no
/// accuracy mode of its own: ranking is always by exact distance to the
/// primitive, per 4.C.
#[derive(Clone, Debug)]
pub enum Shape {
    Box(Aabb),
    Sphere { center: Vec3, radius: f32 },
    KNearest { center: Vec3, k: usize },
}

/// `None` means "unspecified"; the façade resolves it to
/// `Accuracy::BoundingBox`.
pub type AccuracyOption = Option<sidx_rtree::Accuracy>;

pub fn resolve_accuracy(accuracy: AccuracyOption) -> sidx_rtree::Accuracy {
    accuracy.unwrap_or(sidx_rtree::Accuracy::BoundingBox)
}
