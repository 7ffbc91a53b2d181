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

use acc16::file_reader::{FileReader, MockFileReader};
use acc16::isa;
use acc16::linker::LinkerMode;
use acc16::macros::MacroProcessor;
use acc16::sim::SimState;
use acc16::{assemble, dulf, link, load};

const MEM_WORDS: usize = 256;

fn run_single_module(source: &str) -> acc16::sim::Simulator {
    let object = assemble(source).unwrap();
    let mut machine = load(&object, MEM_WORDS).unwrap();
    while machine.state != SimState::Halt {
        machine.step();
    }
    machine
}

#[test]
fn constant_and_halt() {
    // `x` is placed after the code that references it so the module's
    // entry point (word 0) lands on the first real instruction rather
    // than on `x`'s own data word.
    let machine = run_single_module("start 0\nload x\nstop\nx: const 5\n");
    assert_eq!(machine.registers[isa::ACC], 5);
    assert_eq!(machine.state, SimState::Halt);
}

#[test]
fn immediate_add_carries_the_runtime_flag_and_literal_operands() {
    let object = assemble("load 3\nadd 7\nstop\n").unwrap();
    let text = object.text().unwrap();
    let imm = isa::RuntimeFlags::IMMEDIATE.bits();
    assert_eq!(text.data[0] & imm, imm);
    assert_eq!(text.data[1], 3);
    assert_eq!(text.data[2] & imm, imm);
    assert_eq!(text.data[3], 7);

    let machine = run_single_module("load 3\nadd 7\nstop\n");
    assert_eq!(machine.registers[isa::ACC], 10);
}

#[test]
fn forward_branch_skips_a_load() {
    let machine = run_single_module("start 0\nload 1\nbrpos skip\nload 99\nskip: stop\n");
    assert_eq!(machine.registers[isa::ACC], 1);
}

#[test]
fn two_module_link_resolves_an_external_symbol() {
    let module_a = assemble("extdef entry\nentry: br helper\nhelper: extr\n").unwrap();
    let module_b = assemble("extdef helper\nhelper: const 42\n").unwrap();

    let linked = link(&[module_a, module_b], LinkerMode::Relocator).unwrap();

    let entry = linked
        .symbols
        .iter()
        .find(|s| linked.symbol_name(s).unwrap() == "entry")
        .unwrap();
    let helper = linked
        .symbols
        .iter()
        .find(|s| linked.symbol_name(s).unwrap() == "helper")
        .unwrap();
    assert_eq!(entry.value, 0);
    assert_eq!(helper.value, 2);

    // the branch operand in A's section (second word) was patched to
    // helper's resolved address in the merged section.
    assert_eq!(linked.text().unwrap().data[1], helper.value as u16);
}

#[test]
fn macro_expands_to_its_substituted_body() {
    let mut processor = MacroProcessor::new();
    let source = "MACRO\nINC X\nload X\nadd 1\nstore X\nMEND\n";
    for line in source.lines() {
        processor.process_line(line).unwrap();
    }
    let expanded = processor.process_line("INC y").unwrap();
    assert_eq!(expanded, vec!["load y", "add 1", "store y"]);
}

#[test]
fn macro_body_runs_correctly_once_assembled() {
    let source = "MACRO\nINC X\nload X\nadd 1\nstore X\nMEND\nstart 0\nINC y\nstop\ny: const 0\n";
    let machine = run_single_module(source);
    assert_eq!(machine.registers[isa::ACC], 1);
}

#[test]
fn read_blocks_until_the_host_supplies_a_word() {
    let object = assemble("read R0\nwrite R0\nstop\n").unwrap();
    let mut machine = load(&object, MEM_WORDS).unwrap();

    machine.step();
    assert_eq!(machine.state, SimState::IOBlocked);

    machine.in_queue.push_back(123);
    while machine.state != SimState::Halt {
        machine.step();
    }
    assert_eq!(machine.out_queue.into_iter().collect::<Vec<_>>(), vec![123]);
}

#[test]
fn dulf_round_trips_an_assembled_object() {
    let object = assemble("start 0\nconst 7\nstop\n").unwrap();
    let bytes = dulf::write(&object);
    let parsed = dulf::read(&bytes).unwrap();
    assert_eq!(parsed.entry_point, object.entry_point);
    assert_eq!(parsed.text().unwrap().data, object.text().unwrap().data);
}

#[test]
fn assembles_source_read_through_a_mock_file_reader() {
    let mut reader = MockFileReader::default();
    reader.add_file("main.asm", "start 0\nconst 3\nstop\n");

    let source = reader.read_to_string(std::path::Path::new("main.asm")).unwrap();
    let object = assemble(&source).unwrap();
    assert_eq!(object.text().unwrap().data[0], 3);
}

#[test]
fn unknown_operation_is_a_warning_not_a_hard_failure() {
    // "frobnicate" isn't a directive or an instruction; first_pass logs
    // and moves on rather than aborting the whole module.
    let object = assemble("frobnicate\nstop\n").unwrap();
    assert_eq!(object.text().unwrap().data.len(), 1);
}
