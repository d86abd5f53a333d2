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

//! A columnar store of elements: a primitive column plus identifier
//! columns, laid out in insertion order. Insertion order is the row
//! index; it is also the tie-break key the bulk loader sorts by, so the
//! tree it builds is fully determined by the order elements were pushed.

use crate::errors::{SidxError, SidxResult};
use serde::{Deserialize, Serialize};
use sidx_geometry::{Primitive, Sphere, Vec3};
use std::collections::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Morphology,
    Synapse,
    Sphere,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Morphology => "morphology",
            ElementKind::Synapse => "synapse",
            ElementKind::Sphere => "sphere",
        }
    }
}

/// A single scalar value pulled out of a columnar projection.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    U64(u64),
    U32(u32),
    Bool(bool),
    F32(f32),
}

/// A column of field values, one per requested index, positionally
/// aligned with the index list that produced it.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    U64(Vec<u64>),
    U32(Vec<u32>),
    Bool(Vec<bool>),
    F32(Vec<f32>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::U64(v) => v.len(),
            Column::U32(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_coordinate(label: &str, v: Vec3) -> SidxResult<()> {
    if v.iter().any(|c| !c.is_finite()) {
        return Err(SidxError::InvalidInput(format!(
            "{} has a non-finite coordinate: {:?}",
            label, v
        )));
    }
    Ok(())
}

fn validate_radius(label: &str, r: f32) -> SidxResult<()> {
    if !r.is_finite() || r < 0.0 {
        return Err(SidxError::InvalidInput(format!(
            "{} has an invalid radius: {}",
            label, r
        )));
    }
    Ok(())
}

/// Builds an `ElementStore` one element at a time, validating geometry as
/// it goes. Every `push_*` method appends a row; the builder guarantees
/// insertion order is preserved into the finished store.
pub struct ElementStoreBuilder {
    kind: ElementKind,
    primitives: Vec<Primitive>,
    gid: Vec<u64>,
    section_id: Vec<u32>,
    segment_id: Vec<u32>,
    is_soma: Vec<bool>,
    id: Vec<u64>,
    pre_gid: Vec<u64>,
    post_gid: Vec<u64>,
}

impl ElementStoreBuilder {
    pub fn new(kind: ElementKind) -> Self {
        ElementStoreBuilder {
            kind,
            primitives: Vec::new(),
            gid: Vec::new(),
            section_id: Vec::new(),
            segment_id: Vec::new(),
            is_soma: Vec::new(),
            id: Vec::new(),
            pre_gid: Vec::new(),
            post_gid: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Appends a soma, stored as a sphere with `section_id = segment_id = 0`.
    pub fn push_soma(&mut self, gid: u64, center: Vec3, radius: f32) -> SidxResult<()> {
        if self.kind != ElementKind::Morphology {
            return Err(SidxError::InvalidInput(
                "push_soma called on a non-morphology store".into(),
            ));
        }
        validate_coordinate("soma center", center)?;
        validate_radius("soma radius", radius)?;
        self.primitives
            .push(Primitive::Sphere(Sphere { center, radius }));
        self.gid.push(gid);
        self.section_id.push(0);
        self.segment_id.push(0);
        self.is_soma.push(true);
        Ok(())
    }

    /// Appends a non-soma segment, stored as a capped cylinder.
    pub fn push_segment(
        &mut self,
        gid: u64,
        section_id: u32,
        segment_id: u32,
        p0: Vec3,
        p1: Vec3,
        radius: f32,
    ) -> SidxResult<()> {
        if self.kind != ElementKind::Morphology {
            return Err(SidxError::InvalidInput(
                "push_segment called on a non-morphology store".into(),
            ));
        }
        if section_id == 0 {
            return Err(SidxError::InvalidInput(
                "non-soma segments must have section_id >= 1".into(),
            ));
        }
        validate_coordinate("segment p0", p0)?;
        validate_coordinate("segment p1", p1)?;
        validate_radius("segment radius", radius)?;
        self.primitives
            .push(Primitive::Cylinder(sidx_geometry::Cylinder { p0, p1, radius }));
        self.gid.push(gid);
        self.section_id.push(section_id);
        self.segment_id.push(segment_id);
        self.is_soma.push(false);
        Ok(())
    }

    pub fn push_synapse(
        &mut self,
        id: u64,
        pre_gid: u64,
        post_gid: u64,
        center: Vec3,
    ) -> SidxResult<()> {
        if self.kind != ElementKind::Synapse {
            return Err(SidxError::InvalidInput(
                "push_synapse called on a non-synapse store".into(),
            ));
        }
        validate_coordinate("synapse center", center)?;
        self.primitives
            .push(Primitive::Point(sidx_geometry::Point { position: center }));
        self.id.push(id);
        self.pre_gid.push(pre_gid);
        self.post_gid.push(post_gid);
        Ok(())
    }

    pub fn push_sphere(&mut self, id: u64, center: Vec3, radius: f32) -> SidxResult<()> {
        if self.kind != ElementKind::Sphere {
            return Err(SidxError::InvalidInput(
                "push_sphere called on a non-sphere store".into(),
            ));
        }
        validate_coordinate("sphere center", center)?;
        validate_radius("sphere radius", radius)?;
        self.primitives
            .push(Primitive::Sphere(Sphere { center, radius }));
        self.id.push(id);
        Ok(())
    }

    /// Finalises the store. Fails with `InvalidInput` if no elements were
    /// pushed: an empty build has nothing for the R-tree to index.
    pub fn finish(self) -> SidxResult<ElementStore> {
        if self.primitives.is_empty() {
            return Err(SidxError::InvalidInput(
                "element store cannot be built from an empty set".into(),
            ));
        }
        Ok(ElementStore {
            kind: self.kind,
            primitives: self.primitives,
            gid: self.gid,
            section_id: self.section_id,
            segment_id: self.segment_id,
            is_soma: self.is_soma,
            id: self.id,
            pre_gid: self.pre_gid,
            post_gid: self.post_gid,
        })
    }
}

/// The finished, immutable columnar store. Row order is the bulk
/// loader's tie-break key: two
/// stores built from the same pushes in the same order sort identically.
#[derive(Clone, Debug)]
pub struct ElementStore {
    kind: ElementKind,
    primitives: Vec<Primitive>,
    gid: Vec<u64>,
    section_id: Vec<u32>,
    segment_id: Vec<u32>,
    is_soma: Vec<bool>,
    id: Vec<u64>,
    pre_gid: Vec<u64>,
    post_gid: Vec<u64>,
}

impl ElementStore {
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn primitive(&self, row: usize) -> &Primitive {
        &self.primitives[row]
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    /// The row's own index, used as the bulk loader's deterministic
    /// sort tie-break.
    pub fn sort_key(&self, row: usize) -> u64 {
        row as u64
    }

    /// The identifier field the query façade treats as the "primary"
    /// identifier for this kind: `gid` for morphology, `id` otherwise.
    pub fn identifier(&self, row: usize) -> u64 {
        match self.kind {
            ElementKind::Morphology => self.gid[row],
            ElementKind::Synapse | ElementKind::Sphere => self.id[row],
        }
    }

    /// Returns a copy of this store with rows permuted to `order`
    /// (`order[i]` is the old row that becomes new row `i`). Used by the
    /// bulk loader to commit to the leaf order it has chosen.
    pub fn reorder(&self, order: &[usize]) -> ElementStore {
        let pick_u64 = |col: &[u64]| -> Vec<u64> { order.iter().map(|&r| col[r]).collect() };
        let pick_u32 = |col: &[u32]| -> Vec<u32> { order.iter().map(|&r| col[r]).collect() };
        let pick_bool = |col: &[bool]| -> Vec<bool> { order.iter().map(|&r| col[r]).collect() };
        ElementStore {
            kind: self.kind,
            primitives: order.iter().map(|&r| self.primitives[r]).collect(),
            gid: pick_u64(&self.gid),
            section_id: pick_u32(&self.section_id),
            segment_id: pick_u32(&self.segment_id),
            is_soma: pick_bool(&self.is_soma),
            id: pick_u64(&self.id),
            pre_gid: pick_u64(&self.pre_gid),
            post_gid: pick_u64(&self.post_gid),
        }
    }

    pub fn field_names(&self) -> &'static [&'static str] {
        match self.kind {
            ElementKind::Morphology => &["gid", "section_id", "segment_id", "is_soma"],
            ElementKind::Synapse => &["id", "pre_gid", "post_gid"],
            ElementKind::Sphere => &["id"],
        }
    }

    /// Materialises a columnar projection of `field` over `rows`.
    pub fn project(&self, field: &str, rows: &[usize]) -> SidxResult<Column> {
        if !self.field_names().contains(&field) {
            return Err(SidxError::InvalidField(format!(
                "{} has no field '{}'",
                self.kind.as_str(),
                field
            )));
        }
        Ok(match field {
            "gid" => Column::U64(rows.iter().map(|&r| self.gid[r]).collect()),
            "section_id" => Column::U32(rows.iter().map(|&r| self.section_id[r]).collect()),
            "segment_id" => Column::U32(rows.iter().map(|&r| self.segment_id[r]).collect()),
            "is_soma" => Column::Bool(rows.iter().map(|&r| self.is_soma[r]).collect()),
            "id" => Column::U64(rows.iter().map(|&r| self.id[r]).collect()),
            "pre_gid" => Column::U64(rows.iter().map(|&r| self.pre_gid[r]).collect()),
            "post_gid" => Column::U64(rows.iter().map(|&r| self.post_gid[r]).collect()),
            other => unreachable!("field '{}' passed validation but has no projection", other),
        })
    }

    /// Groups `rows` by the values of `group_by` and counts each group.
    pub fn group_counts(&self, group_by: &str, rows: &[usize]) -> SidxResult<HashMap<u64, usize>> {
        let column = self.project(group_by, rows)?;
        let keys: Vec<u64> = match column {
            Column::U64(v) => v,
            Column::U32(v) => v.into_iter().map(u64::from).collect(),
            Column::Bool(v) => v.into_iter().map(|b| b as u64).collect(),
            Column::F32(_) => {
                return Err(SidxError::InvalidField(
                    "cannot group by a floating-point field".into(),
                ))
            }
        };
        let mut counts = HashMap::new();
        for key in keys {
            *counts.entry(key).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_finite_coordinates() {
        let mut b = ElementStoreBuilder::new(ElementKind::Sphere);
        assert!(b.push_sphere(0, [f32::NAN, 0.0, 0.0], 1.0).is_err());
    }

    #[test]
    fn rejects_negative_radius() {
        let mut b = ElementStoreBuilder::new(ElementKind::Sphere);
        assert!(b.push_sphere(0, [0.0, 0.0, 0.0], -1.0).is_err());
    }

    #[test]
    fn rejects_empty_build() {
        let b = ElementStoreBuilder::new(ElementKind::Sphere);
        assert!(b.finish().is_err());
    }

    #[test]
    fn morphology_projection_round_trips() {
        let mut b = ElementStoreBuilder::new(ElementKind::Morphology);
        b.push_soma(7, [0.0, 0.0, 0.0], 1.0).unwrap();
        b.push_segment(7, 1, 0, [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], 0.5)
            .unwrap();
        let store = b.finish().unwrap();
        let rows = vec![0, 1];
        match store.project("gid", &rows).unwrap() {
            Column::U64(v) => assert_eq!(v, vec![7, 7]),
            _ => panic!("wrong column kind"),
        }
        match store.project("is_soma", &rows).unwrap() {
            Column::Bool(v) => assert_eq!(v, vec![true, false]),
            _ => panic!("wrong column kind"),
        }
    }

    #[test]
    fn unknown_field_is_invalid_field() {
        let mut b = ElementStoreBuilder::new(ElementKind::Sphere);
        b.push_sphere(0, [0.0, 0.0, 0.0], 1.0).unwrap();
        let store = b.finish().unwrap();
        assert!(matches!(
            store.project("gid", &[0]),
            Err(SidxError::InvalidField(_))
        ));
    }

    #[test]
    fn group_counts_tally_by_identifier() {
        let mut b = ElementStoreBuilder::new(ElementKind::Morphology);
        b.push_soma(1, [0.0, 0.0, 0.0], 1.0).unwrap();
        b.push_segment(1, 1, 0, [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], 0.5)
            .unwrap();
        b.push_soma(2, [5.0, 0.0, 0.0], 1.0).unwrap();
        let store = b.finish().unwrap();
        let counts = store.group_counts("gid", &[0, 1, 2]).unwrap();
        assert_eq!(counts.get(&1), Some(&2));
        assert_eq!(counts.get(&2), Some(&1));
    }
}
