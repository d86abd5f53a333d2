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

//! Primitive geometry for the spatial index: spheres, capped cylinders and
//! points, their axis-aligned bounding boxes, and the exact/conservative
//! intersection tests the R-tree core needs at its two accuracy tiers.
//!
//! Everything here runs in single precision and never panics on the
//! degenerate inputs a bulk load can legitimately produce (zero radius,
//! coincident cylinder endpoints).

mod aabb;
mod primitive;

pub use aabb::Aabb;
pub use primitive::{Cylinder, Point, Primitive, Sphere};

/// A plain 3-vector. We don't pull in a linear algebra crate: every
/// operation this kernel needs is a handful of scalar ops over `[f32; 3]`.
pub type Vec3 = [f32; 3];

#[inline]
pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn scale(a: Vec3, s: f32) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

#[inline]
pub fn dot(a: Vec3, b: Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn squared_norm(a: Vec3) -> f32 {
    dot(a, a)
}

#[inline]
pub fn squared_distance(a: Vec3, b: Vec3) -> f32 {
    squared_norm(sub(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_ops() {
        assert_eq!(add([1.0, 2.0, 3.0], [1.0, 1.0, 1.0]), [2.0, 3.0, 4.0]);
        assert_eq!(sub([1.0, 2.0, 3.0], [1.0, 1.0, 1.0]), [0.0, 1.0, 2.0]);
        assert_eq!(scale([1.0, 2.0, 3.0], 2.0), [2.0, 4.0, 6.0]);
        assert_eq!(squared_distance([0.0, 0.0, 0.0], [3.0, 4.0, 0.0]), 25.0);
    }
}
