//----------------------------------------------------------------------------------------------
// Module daq::planner
// DAQ planner (C9): coalesce + first-fit-decreasing bin packing. Grounded directly in
// pyxcp/daq_stim/optimize/__init__.py::make_continuous_blocks (coalesce step) and
// pyxcp/daq_stim/optimize/binpacking.py::first_fit_decreasing (pack step); see spec.md section
// 4.9 and the worked example in section 8 scenario S3.

use thiserror::Error;

use crate::types::{MemoryBlock, Measurement, Odt};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("measurement block of {length} bytes exceeds the {capacity} byte ODT capacity")]
    BlockTooLarge { length: usize, capacity: usize },
}

/// Slave resource limits the planner must respect.
#[derive(Debug, Clone, Copy)]
pub struct PlannerLimits {
    /// Maximum bytes of measurement payload per ODT (`max_dto` minus the DAQ header length).
    pub bin_capacity: usize,
    /// Capacity of the first ODT of a list, smaller than `bin_capacity` when timestamps are
    /// enabled (timestamp bytes are not available to measurement data).
    pub bin_capacity_first: usize,
}

/// Step 1: sort by `(ext, address)`, keep the longer of any duplicate-address measurements, then
/// merge touching/overlapping runs into contiguous `MemoryBlock`s. A merge that would exceed
/// `limits.bin_capacity` (or `bin_capacity_first` for the very first block) starts a new block
/// instead of growing the current one.
pub fn coalesce(measurements: &[Measurement], limits: PlannerLimits) -> Vec<MemoryBlock> {
    let mut sorted: Vec<&Measurement> = measurements.iter().collect();
    sorted.sort_by_key(|m| (m.ext, m.address));

    // Keep the longer measurement when two share the same (ext, address).
    let mut deduped: Vec<&Measurement> = Vec::with_capacity(sorted.len());
    for m in sorted {
        match deduped.last_mut() {
            Some(prev) if prev.ext == m.ext && prev.address == m.address => {
                if m.length() > prev.length() {
                    *prev = m;
                }
            }
            _ => deduped.push(m),
        }
    }

    let mut blocks: Vec<MemoryBlock> = Vec::new();
    let mut first_block_emitted = false;
    for m in deduped {
        if let Some(last) = blocks.last_mut() {
            let touches = m.ext == last.ext && m.address <= last.address + last.length as u32;
            let merged_len = if touches {
                let last_end = last.address + last.length as u32;
                let m_end = m.address + m.length() as u32;
                if m_end > last_end { last.length + (m_end - last_end) as usize } else { last.length }
            } else {
                0
            };
            let cap_for_last = if blocks.len() == 1 && !first_block_emitted { limits.bin_capacity_first } else { limits.bin_capacity };
            if touches && merged_len <= cap_for_last {
                last.length = merged_len;
                last.components.push(m.clone());
                continue;
            }
        }
        if !blocks.is_empty() {
            first_block_emitted = true;
        }
        blocks.push(MemoryBlock { address: m.address, ext: m.ext, length: m.length(), components: vec![m.clone()] });
    }
    blocks
}

/// Step 2: classic first-fit-decreasing. Sort blocks by length descending, place each into the
/// first ODT with enough residual capacity, opening a new one when none fits. The first ODT uses
/// `limits.bin_capacity_first`; every subsequent ODT uses `limits.bin_capacity`.
pub fn pack(mut blocks: Vec<MemoryBlock>, limits: PlannerLimits) -> Result<Vec<Odt>, PlanError> {
    blocks.sort_by(|a, b| b.length.cmp(&a.length));
    for b in &blocks {
        if b.length > limits.bin_capacity.max(limits.bin_capacity_first) {
            return Err(PlanError::BlockTooLarge { length: b.length, capacity: limits.bin_capacity });
        }
    }

    let mut odts: Vec<Odt> = vec![Odt::new(limits.bin_capacity_first)];
    for block in blocks {
        let mut placed = false;
        for odt in odts.iter_mut() {
            if odt.residual >= block.length {
                odt.residual -= block.length;
                odt.entries.push(block.clone());
                placed = true;
                break;
            }
        }
        if !placed {
            let mut odt = Odt::new(limits.bin_capacity);
            if odt.residual < block.length {
                return Err(PlanError::BlockTooLarge { length: block.length, capacity: limits.bin_capacity });
            }
            odt.residual -= block.length;
            odt.entries.push(block);
            odts.push(odt);
        }
    }
    // Drop a leading empty ODT (possible if there were zero measurements), but always keep at
    // least the first one so an empty DAQ list still has a well-formed (if empty) ODT 0.
    if odts.len() > 1 {
        odts.retain(|o| !o.entries.is_empty());
    }
    Ok(odts)
}

/// Runs coalesce then pack, the full planning pipeline the session calls before `alloc_daq`.
pub fn plan(measurements: &[Measurement], limits: PlannerLimits) -> Result<Vec<Odt>, PlanError> {
    let blocks = coalesce(measurements, limits);
    pack(blocks, limits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn meas(name: &str, addr: u32, dt: DataType) -> Measurement {
        Measurement { name: name.into(), address: addr, ext: 0, data_type: dt }
    }

    /// Scenario S3 from spec.md section 8: A/B coalesce to one 8-byte block, C/D to a 4-byte
    /// block, packed into bins of 8 -> bin0 full, bin1 with 4 bytes residual.
    #[test]
    fn scenario_s3_plan_packing() {
        let measurements = vec![
            meas("A", 0x1000, DataType::U32),
            meas("B", 0x1004, DataType::U32),
            meas("C", 0x1010, DataType::U16),
            meas("D", 0x1012, DataType::U16),
        ];
        let limits = PlannerLimits { bin_capacity: 8, bin_capacity_first: 8 };
        let blocks = coalesce(&measurements, limits);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].address, 0x1000);
        assert_eq!(blocks[0].length, 8);
        assert_eq!(blocks[1].address, 0x1010);
        assert_eq!(blocks[1].length, 4);

        let odts = pack(blocks, limits).unwrap();
        assert_eq!(odts.len(), 2);
        assert_eq!(odts[0].residual, 0);
        assert_eq!(odts[1].residual, 4);
    }

    #[test]
    fn duplicate_address_keeps_longer_measurement() {
        let measurements = vec![meas("short", 0x2000, DataType::U8), meas("long", 0x2000, DataType::U32)];
        let limits = PlannerLimits { bin_capacity: 8, bin_capacity_first: 8 };
        let blocks = coalesce(&measurements, limits);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].length, 4);
        assert_eq!(blocks[0].components[0].name, "long");
    }

    #[test]
    fn exact_fit_in_one_odt_succeeds_one_byte_more_fails() {
        let limits = PlannerLimits { bin_capacity: 8, bin_capacity_first: 8 };
        let exact = vec![MemoryBlock { address: 0, ext: 0, length: 8, components: vec![] }];
        assert!(pack(exact, limits).is_ok());

        let too_big = vec![MemoryBlock { address: 0, ext: 0, length: 9, components: vec![] }];
        assert_eq!(pack(too_big, limits).unwrap_err(), PlanError::BlockTooLarge { length: 9, capacity: 8 });
    }

    #[test]
    fn output_component_set_equals_input_modulo_duplicate_rule() {
        let measurements = vec![
            meas("A", 0x1000, DataType::U32),
            meas("B", 0x1004, DataType::U32),
            meas("C", 0x1010, DataType::U16),
            meas("D", 0x1012, DataType::U16),
        ];
        let limits = PlannerLimits { bin_capacity: 8, bin_capacity_first: 8 };
        let odts = plan(&measurements, limits).unwrap();
        let mut names: Vec<&str> =
            odts.iter().flat_map(|o| o.entries.iter()).flat_map(|b| b.components.iter()).map(|c| c.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["A", "B", "C", "D"]);
        for odt in &odts {
            let used: usize = odt.entries.iter().map(|b| b.length).sum();
            assert!(used <= odt.capacity);
        }
    }
}
