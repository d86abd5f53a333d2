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

use crate::Vec3;
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box, `min <= max` componentwise.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Aabb { min, max }
    }

    /// The degenerate box around a single point.
    pub fn from_point(p: Vec3) -> Self {
        Aabb { min: p, max: p }
    }

    pub fn center(&self) -> Vec3 {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    /// The union of `self` and `other`, i.e. the tightest box enclosing both.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: [
                self.min[0].min(other.min[0]),
                self.min[1].min(other.min[1]),
                self.min[2].min(other.min[2]),
            ],
            max: [
                self.max[0].max(other.max[0]),
                self.max[1].max(other.max[1]),
                self.max[2].max(other.max[2]),
            ],
        }
    }

    pub fn union_all<'a, I: IntoIterator<Item = &'a Aabb>>(boxes: I) -> Option<Aabb> {
        let mut iter = boxes.into_iter();
        let first = *iter.next()?;
        Some(iter.fold(first, |acc, b| acc.union(b)))
    }

    /// Conservative box/box intersection test: used both as the internal-node
    /// descend test and as the leaf test under `"bounding_box"` accuracy.
    pub fn intersects(&self, other: &Aabb) -> bool {
        for axis in 0..3 {
            if self.max[axis] < other.min[axis] || other.max[axis] < self.min[axis] {
                return false;
            }
        }
        true
    }

    /// Does this box fully contain `other`?
    pub fn contains(&self, other: &Aabb) -> bool {
        for axis in 0..3 {
            if other.min[axis] < self.min[axis] || other.max[axis] > self.max[axis] {
                return false;
            }
        }
        true
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        (0..3).all(|axis| self.min[axis] <= p[axis] && p[axis] <= self.max[axis])
    }

    /// Conservative box/sphere test used at internal nodes and for the
    /// `"bounding_box"` leaf accuracy mode.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.squared_distance_to_point(center) <= radius * radius
    }

    /// The point on (or in) this box nearest to `p`.
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        [
            p[0].clamp(self.min[0], self.max[0]),
            p[1].clamp(self.min[1], self.max[1]),
            p[2].clamp(self.min[2], self.max[2]),
        ]
    }

    /// Squared distance from `p` to the closest point on/in this box. Zero
    /// when `p` is inside. Used as the k-nearest priority key for internal
    /// nodes.
    pub fn squared_distance_to_point(&self, p: Vec3) -> f32 {
        crate::squared_distance(self.closest_point(p), p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_is_tight() {
        let a = Aabb::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = Aabb::new([2.0, -1.0, 0.5], [3.0, 0.0, 2.0]);
        let u = a.union(&b);
        assert_eq!(u.min, [0.0, -1.0, 0.0]);
        assert_eq!(u.max, [3.0, 1.0, 2.0]);
    }

    #[test]
    fn intersects_is_symmetric_and_touches_count() {
        let a = Aabb::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = Aabb::new([1.0, 1.0, 1.0], [2.0, 2.0, 2.0]);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        let c = Aabb::new([1.1, 0.0, 0.0], [2.0, 1.0, 1.0]);
        assert!(!a.intersects(&c));
    }

    #[test]
    fn closest_point_clamps_into_box() {
        let b = Aabb::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        assert_eq!(b.closest_point([2.0, 0.5, -1.0]), [1.0, 0.5, 0.0]);
        assert_eq!(b.closest_point([0.5, 0.5, 0.5]), [0.5, 0.5, 0.5]);
    }

    #[test]
    fn sphere_test_uses_squared_distance() {
        let b = Aabb::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        assert!(b.intersects_sphere([3.0, 0.5, 0.5], 2.1));
        assert!(!b.intersects_sphere([3.0, 0.5, 0.5], 1.9));
    }
}
