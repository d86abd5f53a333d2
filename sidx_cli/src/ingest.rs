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

//! Parsing an actual circuit-config or edges file is explicitly out of
//! scope for the core; this is a minimal line-oriented fixture format
//! that drives `MorphologySource`/`SynapseSource` end to end for the
//! command-line front-end. A production front-end would replace this
//! module with a real SONATA reader behind the same two traits.
//!
//! Circuit-config lines:
//!   `NEURON <gid> <soma_x> <soma_y> <soma_z> <soma_r>`
//!   `SEGMENT <gid> <section_id> <segment_id> <x0> <y0> <z0> <x1> <y1> <z1> <r>`
//! Edges-file lines:
//!   `SYNAPSE <id> <pre_gid> <post_gid> <x> <y> <z>`

use sidx_elements::{MorphologySource, SegmentRecord, SidxError, SidxResult, SynapseRecord, SynapseSource};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

fn parse_error(line_no: usize, line: &str) -> SidxError {
    SidxError::InvalidInput(format!("malformed line {}: {}", line_no, line))
}

fn field(fields: &[&str], line_no: usize, line: &str, i: usize) -> SidxResult<f32> {
    fields
        .get(i)
        .and_then(|s| s.parse::<f32>().ok())
        .ok_or_else(|| parse_error(line_no, line))
}

fn field_u64(fields: &[&str], line_no: usize, line: &str, i: usize) -> SidxResult<u64> {
    fields
        .get(i)
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| parse_error(line_no, line))
}

fn field_u32(fields: &[&str], line_no: usize, line: &str, i: usize) -> SidxResult<u32> {
    fields
        .get(i)
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| parse_error(line_no, line))
}

pub struct FixtureMorphologySource {
    somas: HashMap<u64, ([f32; 3], f32)>,
    segments: HashMap<u64, Vec<SegmentRecord>>,
    order: Vec<u64>,
}

impl FixtureMorphologySource {
    pub fn load(path: &Path) -> SidxResult<FixtureMorphologySource> {
        let text = fs::read_to_string(path)?;
        let mut somas = HashMap::new();
        let mut segments: HashMap<u64, Vec<SegmentRecord>> = HashMap::new();
        let mut order = Vec::new();

        for (i, raw_line) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.first() {
                Some(&"NEURON") => {
                    let gid = field_u64(&fields, line_no, line, 1)?;
                    let center = [
                        field(&fields, line_no, line, 2)?,
                        field(&fields, line_no, line, 3)?,
                        field(&fields, line_no, line, 4)?,
                    ];
                    let radius = field(&fields, line_no, line, 5)?;
                    if somas.insert(gid, (center, radius)).is_none() {
                        order.push(gid);
                    }
                }
                Some(&"SEGMENT") => {
                    let gid = field_u64(&fields, line_no, line, 1)?;
                    let record = SegmentRecord {
                        section_id: field_u32(&fields, line_no, line, 2)?,
                        segment_id: field_u32(&fields, line_no, line, 3)?,
                        p1: [
                            field(&fields, line_no, line, 4)?,
                            field(&fields, line_no, line, 5)?,
                            field(&fields, line_no, line, 6)?,
                        ],
                        p2: [
                            field(&fields, line_no, line, 7)?,
                            field(&fields, line_no, line, 8)?,
                            field(&fields, line_no, line, 9)?,
                        ],
                        radius: field(&fields, line_no, line, 10)?,
                    };
                    segments.entry(gid).or_default().push(record);
                }
                _ => return Err(parse_error(line_no, line)),
            }
        }

        Ok(FixtureMorphologySource {
            somas,
            segments,
            order,
        })
    }
}

impl MorphologySource for FixtureMorphologySource {
    fn neuron_ids(&self) -> SidxResult<Vec<u64>> {
        Ok(self.order.clone())
    }

    fn soma(&self, gid: u64) -> SidxResult<([f32; 3], f32)> {
        self.somas
            .get(&gid)
            .copied()
            .ok_or_else(|| SidxError::InvalidInput(format!("no soma for gid {}", gid)))
    }

    fn segments(&self, gid: u64) -> SidxResult<Vec<SegmentRecord>> {
        Ok(self.segments.get(&gid).cloned().unwrap_or_default())
    }
}

pub struct FixtureSynapseSource {
    records: Vec<SynapseRecord>,
}

impl FixtureSynapseSource {
    pub fn load(path: &Path) -> SidxResult<FixtureSynapseSource> {
        let text = fs::read_to_string(path)?;
        let mut records = Vec::new();
        for (i, raw_line) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.first() != Some(&"SYNAPSE") {
                return Err(parse_error(line_no, line));
            }
            records.push(SynapseRecord {
                id: field_u64(&fields, line_no, line, 1)?,
                pre_gid: field_u64(&fields, line_no, line, 2)?,
                post_gid: field_u64(&fields, line_no, line, 3)?,
                center: [
                    field(&fields, line_no, line, 4)?,
                    field(&fields, line_no, line, 5)?,
                    field(&fields, line_no, line, 6)?,
                ],
            });
        }
        Ok(FixtureSynapseSource { records })
    }
}

impl SynapseSource for FixtureSynapseSource {
    fn synapses(&self) -> SidxResult<Vec<SynapseRecord>> {
        Ok(self.records.clone())
    }
}
