/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Copies a linked object's sections into simulator memory. There is no
//! relocation left to do here — the linker already finalized every
//! address — so this is a straight, zero-filled-gap copy.

use crate::dulf::Object;
use crate::errors::LoaderError;
use crate::sim::Simulator;

/// Loads `object` into `sim`'s memory at each section's recorded
/// address and resets the machine to run from the object's entry point.
pub fn load(object: &Object, sim: &mut Simulator) -> Result<(), LoaderError> {
    let available = sim.memory.len() as u64;

    for section in &object.sections {
        let start = section.address;
        let end = start + section.data.len() as u64;
        if end > available {
            return Err(LoaderError::ProgramTooLarge {
                needed: end,
                available,
            });
        }
    }

    let mut occupied = vec![false; sim.memory.len()];
    for section in &object.sections {
        let start = section.address as usize;
        for (i, &word) in section.data.iter().enumerate() {
            let addr = start + i;
            if occupied[addr] {
                return Err(LoaderError::SectionOverlap);
            }
            occupied[addr] = true;
            sim.memory[addr] = word;
        }
    }

    sim.reset(object.entry_point as u16);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dulf::Section;

    fn object_with(entry: u64, sections: Vec<Section>) -> Object {
        crate::dulf::build(entry, sections, Vec::new(), Vec::new(), vec![0])
    }

    #[test]
    fn copies_section_data_into_memory() {
        let object = object_with(0, vec![Section::new(".text", 2, vec![11, 22, 33])]);
        let mut sim = Simulator::new(16);
        load(&object, &mut sim).unwrap();
        assert_eq!(&sim.memory[2..5], &[11, 22, 33]);
        assert_eq!(sim.memory[0], 0);
    }

    #[test]
    fn rejects_a_program_too_large_for_memory() {
        let object = object_with(0, vec![Section::new(".text", 0, vec![0; 32])]);
        let mut sim = Simulator::new(16);
        let err = load(&object, &mut sim).unwrap_err();
        assert!(matches!(err, LoaderError::ProgramTooLarge { .. }));
    }

    #[test]
    fn rejects_overlapping_sections() {
        let object = object_with(
            0,
            vec![
                Section::new(".text", 0, vec![1, 2, 3]),
                Section::new(".text2", 2, vec![9, 9]),
            ],
        );
        let mut sim = Simulator::new(16);
        let err = load(&object, &mut sim).unwrap_err();
        assert!(matches!(err, LoaderError::SectionOverlap));
    }

    #[test]
    fn resets_the_simulator_to_the_entry_point() {
        let object = object_with(5, vec![Section::new(".text", 0, vec![0; 8])]);
        let mut sim = Simulator::new(16);
        load(&object, &mut sim).unwrap();
        assert_eq!(sim.registers[crate::isa::PC], 5);
    }
}
