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

//! Wraps one or many `QueryEngine`s behind the `population_mode`
//! contract: `single` names exactly one population and answers like a
//! single-population index; `multi` (the default for an inherently
//! multi-population directory) fans the same query out to every named
//! population.

use crate::engine::QueryEngine;
use crate::response::{QueryResult, ResultSpec};
use crate::shape::{AccuracyOption, Shape};
use sidx_elements::{AttributeStore, SidxError, SidxResult};
use sidx_meta::PopulationIndex;
use std::collections::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PopulationMode {
    Single,
    Multi,
}

pub enum PopulationResult {
    Single(QueryResult),
    Multi(HashMap<String, QueryResult>),
}

pub struct PopulationQueryEngine {
    engines: HashMap<String, QueryEngine>,
    single: Option<QueryEngine>,
}

impl PopulationQueryEngine {
    pub fn new(resolved: PopulationIndex) -> Self {
        match resolved {
            PopulationIndex::Single(opened) => PopulationQueryEngine {
                engines: HashMap::new(),
                single: Some(QueryEngine::new(opened)),
            },
            PopulationIndex::Multi(map) => PopulationQueryEngine {
                engines: map
                    .into_iter()
                    .map(|(name, opened)| (name, QueryEngine::new(opened)))
                    .collect(),
                single: None,
            },
        }
    }

    pub fn is_multi_population(&self) -> bool {
        self.single.is_none()
    }

    pub fn query(
        &self,
        shape: Shape,
        accuracy: AccuracyOption,
        result: ResultSpec,
        mode: PopulationMode,
        populations: &[String],
        attributes: Option<&dyn AttributeStore>,
    ) -> SidxResult<PopulationResult> {
        match mode {
            PopulationMode::Single => {
                let name = match populations {
                    [single] => single,
                    _ => {
                        return Err(SidxError::InvalidInput(
                            "population_mode = single requires exactly one named population"
                                .into(),
                        ))
                    }
                };
                let engine = self.engine_for(name)?;
                Ok(PopulationResult::Single(engine.query(
                    shape, accuracy, result, attributes,
                )?))
            }
            PopulationMode::Multi => {
                let names: Vec<String> = if populations.is_empty() {
                    self.engines.keys().cloned().collect()
                } else {
                    populations.to_vec()
                };
                let mut out = HashMap::with_capacity(names.len());
                for name in names {
                    let engine = self.engine_for(&name)?;
                    out.insert(
                        name,
                        engine.query(shape.clone(), accuracy, result.clone(), attributes)?,
                    );
                }
                Ok(PopulationResult::Multi(out))
            }
        }
    }

    fn engine_for(&self, name: &str) -> SidxResult<&QueryEngine> {
        if let Some(engine) = &self.single {
            return Ok(engine);
        }
        self.engines
            .get(name)
            .ok_or_else(|| SidxError::InvalidInput(format!("no such population: {}", name)))
    }
}
