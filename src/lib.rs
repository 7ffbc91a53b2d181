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

pub mod assembler;
pub mod ast;
pub mod dulf;
pub mod errors;
pub mod file_reader;
pub mod isa;
pub mod linker;
pub mod loader;
pub mod macros;
pub mod parser;
pub mod sim;

use anyhow::{Context, Result};

extern crate pest;
extern crate pest_derive;

/// Runs one source string through macro expansion, parsing and both
/// assembler passes, producing a single-module DULF object. This is the
/// library's front door for the `assemble` stage of the pipeline; the
/// caller is responsible for reading the source text (see
/// `file_reader::FileReader`) and for linking the result with any other
/// modules.
pub fn assemble(source: &str) -> Result<dulf::Object> {
    let mut processor = macros::MacroProcessor::new();
    let mut expanded = String::new();
    for line in source.lines() {
        let out = processor
            .process_line(line)
            .context("Failed during macro expansion")?;
        for l in out {
            expanded.push_str(&l);
            expanded.push('\n');
        }
    }

    let lines = parser::parse_program(&expanded).context("Failed during parsing stage")?;

    let mut info = assembler::AssemblerInfo::new();
    info.first_pass(&lines).context("Failed during assembler phase 1")?;
    info.second_pass().context("Failed during assembler phase 2")?;

    Ok(info.to_object())
}

/// Links already-assembled objects into a single executable DULF object.
pub fn link(objects: &[dulf::Object], mode: linker::LinkerMode) -> Result<dulf::Object> {
    linker::link(objects, mode).context("Failed during linking stage")
}

/// Loads a linked object into a fresh simulator sized for `mem_size`
/// words and returns it ready to `step()`.
pub fn load(object: &dulf::Object, mem_size: usize) -> Result<sim::Simulator> {
    let mut machine = sim::Simulator::new(mem_size);
    loader::load(object, &mut machine).context("Failed during loading stage")?;
    Ok(machine)
}
