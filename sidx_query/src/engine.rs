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

//! The single query entry point: resolves a shape to a hit set against
//! whichever storage variant the directory opened, then projects that
//! hit set into whichever result flavour the caller asked for.

use crate::response::{QueryResult, RawElement, ResultSpec};
use crate::shape::{resolve_accuracy, AccuracyOption, Shape};
use sidx_elements::{AttributeStore, Column, ElementKind, FieldValue, SidxError, SidxResult};
use sidx_geometry::Primitive;
use sidx_meta::{ExtendedRecord, OpenedIndex, ResolvedIndex};
use sidx_multi::MultiRow;
use std::collections::HashMap;

enum Hits {
    Single(Vec<usize>),
    Multi(Vec<MultiRow>),
}

impl Hits {
    fn len(&self) -> usize {
        match self {
            Hits::Single(v) => v.len(),
            Hits::Multi(v) => v.len(),
        }
    }
}

/// A query façade bound to one opened index directory. Construct via
/// `sidx_meta::open` and `QueryEngine::new`.
pub struct QueryEngine {
    index: ResolvedIndex,
    extended: Option<ExtendedRecord>,
}

impl QueryEngine {
    pub fn new(opened: OpenedIndex) -> Self {
        QueryEngine {
            index: opened.index,
            extended: opened.extended,
        }
    }

    pub fn element_kind(&self) -> ElementKind {
        self.index.element_kind()
    }

    pub fn extended(&self) -> Option<&ExtendedRecord> {
        self.extended.as_ref()
    }

    pub fn bounds(&self) -> Option<sidx_geometry::Aabb> {
        match &self.index {
            ResolvedIndex::InMemory(tree) => Some(tree.bounds()),
            ResolvedIndex::MemoryMapped(mapped) => Some(mapped.bounds()),
            ResolvedIndex::MultiIndex(reader) => reader.bounds(),
        }
    }

    fn hits_for_shape(&self, shape: &Shape, accuracy: AccuracyOption) -> SidxResult<Hits> {
        let accuracy = resolve_accuracy(accuracy);
        match (&self.index, shape) {
            (ResolvedIndex::InMemory(tree), Shape::Box(query)) => {
                Ok(Hits::Single(tree.query_box(query, accuracy)))
            }
            (ResolvedIndex::InMemory(tree), Shape::Sphere { center, radius }) => {
                Ok(Hits::Single(tree.query_sphere(*center, *radius, accuracy)))
            }
            (ResolvedIndex::InMemory(tree), Shape::KNearest { center, k }) => {
                Ok(Hits::Single(tree.query_knn(*center, *k)))
            }
            (ResolvedIndex::MemoryMapped(mapped), Shape::Box(query)) => {
                Ok(Hits::Single(mapped.query_box(query, accuracy)))
            }
            (ResolvedIndex::MemoryMapped(mapped), Shape::Sphere { center, radius }) => {
                Ok(Hits::Single(mapped.query_sphere(*center, *radius, accuracy)))
            }
            (ResolvedIndex::MemoryMapped(mapped), Shape::KNearest { center, k }) => {
                Ok(Hits::Single(mapped.query_knn(*center, *k)))
            }
            (ResolvedIndex::MultiIndex(reader), Shape::Box(query)) => {
                Ok(Hits::Multi(reader.query_box(query, accuracy)?))
            }
            (ResolvedIndex::MultiIndex(reader), Shape::Sphere { center, radius }) => {
                Ok(Hits::Multi(reader.query_sphere(*center, *radius, accuracy)?))
            }
            (ResolvedIndex::MultiIndex(reader), Shape::KNearest { center, k }) => {
                Ok(Hits::Multi(reader.query_knn(*center, *k)?))
            }
        }
    }

    fn identifier_at(&self, hits: &Hits, i: usize) -> SidxResult<u64> {
        match (&self.index, hits) {
            (ResolvedIndex::InMemory(tree), Hits::Single(rows)) => {
                Ok(tree.store().identifier(rows[i]))
            }
            (ResolvedIndex::MemoryMapped(mapped), Hits::Single(rows)) => {
                Ok(mapped.identifier(rows[i]))
            }
            (ResolvedIndex::MultiIndex(reader), Hits::Multi(rows)) => reader.identifier(rows[i]),
            _ => unreachable!("Hits variant always matches the backend that produced it"),
        }
    }

    fn primitive_at(&self, hits: &Hits, i: usize) -> SidxResult<Primitive> {
        match (&self.index, hits) {
            (ResolvedIndex::InMemory(tree), Hits::Single(rows)) => {
                Ok(*tree.store().primitive(rows[i]))
            }
            (ResolvedIndex::MemoryMapped(mapped), Hits::Single(rows)) => {
                Ok(mapped.primitive(rows[i]))
            }
            (ResolvedIndex::MultiIndex(reader), Hits::Multi(rows)) => reader.primitive(rows[i]),
            _ => unreachable!("Hits variant always matches the backend that produced it"),
        }
    }

    fn built_in_field_at(&self, hits: &Hits, i: usize, field: &str) -> SidxResult<FieldValue> {
        match (&self.index, hits) {
            (ResolvedIndex::InMemory(tree), Hits::Single(rows)) => {
                match tree.store().project(field, &rows[i..i + 1])? {
                    Column::U64(v) => Ok(FieldValue::U64(v[0])),
                    Column::U32(v) => Ok(FieldValue::U32(v[0])),
                    Column::Bool(v) => Ok(FieldValue::Bool(v[0])),
                    Column::F32(v) => Ok(FieldValue::F32(v[0])),
                }
            }
            (ResolvedIndex::MemoryMapped(mapped), Hits::Single(rows)) => {
                mapped.field(rows[i], field)
            }
            (ResolvedIndex::MultiIndex(reader), Hits::Multi(rows)) => reader.field(rows[i], field),
            _ => unreachable!("Hits variant always matches the backend that produced it"),
        }
    }

    fn is_built_in(&self, field: &str) -> bool {
        let names: &[&str] = match self.element_kind() {
            ElementKind::Morphology => &["gid", "section_id", "segment_id", "is_soma"],
            ElementKind::Synapse => &["id", "pre_gid", "post_gid"],
            ElementKind::Sphere => &["id"],
        };
        names.contains(&field)
    }

    /// Resolves one field over every hit, going to the external
    /// attribute store when the field is not built in.
    fn field_values(
        &self,
        hits: &Hits,
        field: &str,
        attributes: Option<&dyn AttributeStore>,
    ) -> SidxResult<Vec<FieldValue>> {
        if self.is_built_in(field) {
            (0..hits.len())
                .map(|i| self.built_in_field_at(hits, i, field))
                .collect()
        } else {
            let store = attributes.ok_or_else(|| {
                SidxError::InvalidField(format!(
                    "'{}' is not a built-in field and no attribute store was supplied",
                    field
                ))
            })?;
            let ids: SidxResult<Vec<u64>> = (0..hits.len()).map(|i| self.identifier_at(hits, i)).collect();
            store.fetch(&ids?, field)
        }
    }

    pub fn query(
        &self,
        shape: Shape,
        accuracy: AccuracyOption,
        result: ResultSpec,
        attributes: Option<&dyn AttributeStore>,
    ) -> SidxResult<QueryResult> {
        if matches!(result, ResultSpec::RawElements) && attributes.is_some() {
            return Err(SidxError::InvalidField(
                "raw_elements cannot be combined with attribute enrichment".into(),
            ));
        }

        let hits = self.hits_for_shape(&shape, accuracy)?;

        match result {
            ResultSpec::RawElements => {
                let mut elements = Vec::with_capacity(hits.len());
                for i in 0..hits.len() {
                    elements.push(RawElement {
                        primitive: self.primitive_at(&hits, i)?,
                        identifier: self.identifier_at(&hits, i)?,
                    });
                }
                Ok(QueryResult::RawElements(elements))
            }
            ResultSpec::Field(field) => {
                let values = self.field_values(&hits, &field, attributes)?;
                Ok(QueryResult::Field(column_from_values(values)))
            }
            ResultSpec::Fields(fields) => {
                let mut map = HashMap::with_capacity(fields.len());
                for field in fields {
                    let values = self.field_values(&hits, &field, attributes)?;
                    map.insert(field, column_from_values(values));
                }
                Ok(QueryResult::Fields(map))
            }
            ResultSpec::Counts { group_by: None } => Ok(QueryResult::Count(hits.len())),
            ResultSpec::Counts {
                group_by: Some(field),
            } => {
                let values = self.field_values(&hits, &field, attributes)?;
                let mut counts = HashMap::new();
                for value in values {
                    let key = match value {
                        FieldValue::U64(v) => v,
                        FieldValue::U32(v) => v as u64,
                        FieldValue::Bool(v) => v as u64,
                        FieldValue::F32(_) => {
                            return Err(SidxError::InvalidField(
                                "cannot group by a floating-point field".into(),
                            ))
                        }
                    };
                    *counts.entry(key).or_insert(0) += 1;
                }
                Ok(QueryResult::GroupedCounts(counts))
            }
        }
    }
}

fn column_from_values(values: Vec<FieldValue>) -> Column {
    match values.first() {
        None | Some(FieldValue::U64(_)) => {
            Column::U64(values.into_iter().map(as_u64).collect())
        }
        Some(FieldValue::U32(_)) => Column::U32(values.into_iter().map(as_u32).collect()),
        Some(FieldValue::Bool(_)) => Column::Bool(values.into_iter().map(as_bool).collect()),
        Some(FieldValue::F32(_)) => Column::F32(values.into_iter().map(as_f32).collect()),
    }
}

fn as_u64(v: FieldValue) -> u64 {
    match v {
        FieldValue::U64(x) => x,
        _ => panic!("mixed field-value types in one column"),
    }
}
fn as_u32(v: FieldValue) -> u32 {
    match v {
        FieldValue::U32(x) => x,
        _ => panic!("mixed field-value types in one column"),
    }
}
fn as_bool(v: FieldValue) -> bool {
    match v {
        FieldValue::Bool(x) => x,
        _ => panic!("mixed field-value types in one column"),
    }
}
fn as_f32(v: FieldValue) -> f32 {
    match v {
        FieldValue::F32(x) => x,
        _ => panic!("mixed field-value types in one column"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidx_elements::{ElementKind as EK, ElementStoreBuilder as ESB};
    use sidx_geometry::Aabb;

    fn sphere_engine() -> QueryEngine {
        let mut b = ESB::new(EK::Sphere);
        for i in 0..50u64 {
            b.push_sphere(i, [(i % 10) as f32, (i / 10) as f32, 0.0], 0.3)
                .unwrap();
        }
        let tree = sidx_rtree::bulk_load(b.finish().unwrap(), 8, 8).unwrap();
        QueryEngine::new(OpenedIndex {
            index: ResolvedIndex::InMemory(tree),
            extended: None,
        })
    }

    #[test]
    fn count_matches_identifier_field_length() {
        let engine = sphere_engine();
        let query = Shape::Box(Aabb::new([0.0, 0.0, -1.0], [3.0, 3.0, 1.0]));
        let count = engine
            .query(query.clone(), None, ResultSpec::Counts { group_by: None }, None)
            .unwrap();
        let ids = engine
            .query(query, None, ResultSpec::Field("id".into()), None)
            .unwrap();
        match (count, ids) {
            (QueryResult::Count(n), QueryResult::Field(Column::U64(v))) => assert_eq!(n, v.len()),
            other => panic!("unexpected result shapes: {:?}", other),
        }
    }

    #[test]
    fn raw_elements_rejects_attribute_store() {
        struct NullStore;
        impl AttributeStore for NullStore {
            fn fetch(&self, ids: &[u64], _field: &str) -> SidxResult<Vec<FieldValue>> {
                Ok(ids.iter().map(|&id| FieldValue::U64(id)).collect())
            }
        }
        let engine = sphere_engine();
        let result = engine.query(
            Shape::Box(Aabb::new([0.0, 0.0, -1.0], [3.0, 3.0, 1.0])),
            None,
            ResultSpec::RawElements,
            Some(&NullStore),
        );
        assert!(matches!(result, Err(SidxError::InvalidField(_))));
    }

    #[test]
    fn unknown_field_without_attribute_store_is_invalid_field() {
        let engine = sphere_engine();
        let result = engine.query(
            Shape::Box(Aabb::new([0.0, 0.0, -1.0], [3.0, 3.0, 1.0])),
            None,
            ResultSpec::Field("afferent_center_z".into()),
            None,
        );
        assert!(matches!(result, Err(SidxError::InvalidField(_))));
    }

    struct AfferentZStore;
    impl AttributeStore for AfferentZStore {
        fn fetch(&self, ids: &[u64], field: &str) -> SidxResult<Vec<FieldValue>> {
            assert_eq!(field, "afferent_center_z");
            Ok(ids.iter().map(|&id| FieldValue::F32(500.0 + id as f32)).collect())
        }
    }

    #[test]
    fn enriched_field_is_fetched_in_one_batched_call() {
        let mut b = ESB::new(EK::Synapse);
        for i in 0..20u64 {
            b.push_synapse(i, 1, 2, [200.0 + i as f32, 200.0, 500.0])
                .unwrap();
        }
        let tree = sidx_rtree::bulk_load(b.finish().unwrap(), 8, 8).unwrap();
        let engine = QueryEngine::new(OpenedIndex {
            index: ResolvedIndex::InMemory(tree),
            extended: None,
        });

        let query = Shape::Box(Aabb::new([200.0, 200.0, 480.0], [210.0, 210.0, 520.0]));
        let result = engine
            .query(
                query,
                None,
                ResultSpec::Field("afferent_center_z".into()),
                Some(&AfferentZStore),
            )
            .unwrap();
        match result {
            QueryResult::Field(Column::F32(values)) => {
                assert!(!values.is_empty());
                assert!(values.iter().all(|&z| z > 480.0 && z < 520.0));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
