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

pub mod symbol_table;

use std::collections::HashSet;

use crate::ast::{AssemblyLine, Operand};
use crate::dulf;
use crate::errors::AssemblyError;
use crate::isa::{self, RuntimeFlags, Word};
use symbol_table::SymbolTable;

/// One link in the undefined-symbol chain: a placeholder word was
/// emitted at `from` for a forward reference to `name`; `prev` threads
/// together repeated forward references to the same name so the second
/// pass can walk and patch every one of them. `sign` is carried for
/// structural fidelity with the original chain-link layout; nothing in
/// this implementation reads it.
#[derive(Debug, Clone)]
pub struct UndefSymLink {
    pub addr: u64,
    pub prev: u64,
    pub from: usize,
    pub sign: u8,
    pub name: String,
}

/// Per-module assembly state, threaded through both passes.
#[derive(Default)]
pub struct AssemblerInfo {
    pub symbols: SymbolTable,
    pub undef_chain: Vec<UndefSymLink>,
    pub output: Vec<Word>,
    pub globals: HashSet<String>,
    pub externs: HashSet<String>,
    pub start_address: Option<Word>,
    pub stack_size: Option<Word>,
    pub module_ended: bool,
    chain_top: u64,
    last_link_for: std::collections::HashMap<String, u64>,
}

impl AssemblerInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the first pass over every already-parsed line: builds the
    /// symbol table, encodes instructions (leaving placeholders for
    /// forward references) and dispatches directives.
    pub fn first_pass(&mut self, lines: &[AssemblyLine]) -> Result<(), AssemblyError> {
        for line in lines {
            self.first_pass_line(line)?;
        }
        Ok(())
    }

    fn first_pass_line(&mut self, line: &AssemblyLine) -> Result<(), AssemblyError> {
        let Some(op) = &line.op else {
            if let Some(label) = &line.label {
                self.bind_label(label, line.line_number)?;
            }
            return Ok(());
        };

        if let Some(result) = dispatch_directive(self, op, line) {
            return result;
        }

        if let Some(inst) = isa::lookup(op) {
            return self.encode_instruction(line, inst);
        }

        log::warn!("line {}: unknown operation '{op}'", line.line_number);
        Ok(())
    }

    fn bind_label(&mut self, name: &str, line: usize) -> Result<(), AssemblyError> {
        let addr = self.output.len() as Word;
        symbol_table::bind(&mut self.symbols, name, addr, line)
    }

    fn emit_word(&mut self, label: Option<&str>, value: Word, line: usize) -> Result<(), AssemblyError> {
        if let Some(label) = label {
            self.bind_label(label, line)?;
        }
        self.output.push(value);
        Ok(())
    }

    fn chain_symbol(&mut self, from: usize, name: String) -> u64 {
        let addr = self.chain_top;
        self.chain_top += 1;
        let prev = self.last_link_for.get(&name).copied().unwrap_or(0);
        self.last_link_for.insert(name.clone(), addr);
        self.undef_chain.push(UndefSymLink {
            addr,
            prev,
            from,
            sign: 0,
            name,
        });
        addr
    }

    fn encode_instruction(&mut self, line: &AssemblyLine, inst: &isa::Instruction) -> Result<(), AssemblyError> {
        if line.args.len() != inst.num_args as usize {
            return Err(AssemblyError::ArityMismatch {
                line: line.line_number,
                op: inst.mnemonic.to_string(),
                expected: inst.num_args as usize,
                found: line.args.len(),
            });
        }

        let opcode_index = self.output.len();
        self.output.push(inst.opcode as Word);
        let mut opcode_word: u16 = inst.opcode as u16;

        for (i, arg) in line.args.iter().enumerate() {
            match arg {
                Operand::Integer(value) => {
                    self.output.push(*value as Word);
                    opcode_word |= RuntimeFlags::IMMEDIATE.bits();
                }
                Operand::Ident(name) => {
                    if let Some(reg) = isa::register_by_name(name) {
                        self.output.push(reg as Word);
                        opcode_word |= if i == 0 {
                            RuntimeFlags::REG_A.bits()
                        } else {
                            RuntimeFlags::REG_B.bits()
                        };
                    } else if let Some(&addr) = self.symbols.get(name) {
                        self.output.push(addr);
                    } else {
                        let from = self.output.len();
                        let placeholder = self.chain_symbol(from, name.clone());
                        self.output.push(placeholder as Word);
                    }
                }
            }
        }

        self.output[opcode_index] = opcode_word;
        if let Some(label) = &line.label {
            symbol_table::bind(&mut self.symbols, label, opcode_index as Word, line.line_number)?;
        }
        Ok(())
    }

    /// Resolves every entry in the undefined-symbol chain against the
    /// now-complete symbol table. Names declared `extr` are left as
    /// placeholders for the linker to patch via a relocation; any other
    /// still-undefined name is an error.
    pub fn second_pass(&mut self) -> Result<(), AssemblyError> {
        for link in &self.undef_chain {
            if let Some(&addr) = self.symbols.get(&link.name) {
                self.output[link.from] = addr;
            } else if !self.externs.contains(&link.name) {
                return Err(AssemblyError::UndefinedSymbol {
                    name: link.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Emits this module as a DULF object: one `.text` section holding
    /// `output`, a symbol for every defined label (`extdef`'d ones
    /// global, the rest local), an undefined symbol for every `extr`'d
    /// name not defined locally, and one relocation per unresolved
    /// chain entry.
    pub fn to_object(&self) -> dulf::Object {
        let mut strtab = dulf::StringTableBuilder::new();
        let mut symbols = Vec::new();
        let mut symbol_index: std::collections::HashMap<String, u32> = std::collections::HashMap::new();

        for (name, &addr) in &self.symbols {
            let binding = if self.globals.contains(name) {
                dulf::SymbolBinding::Global
            } else {
                dulf::SymbolBinding::Local
            };
            let name_offset = strtab.intern(name);
            symbol_index.insert(name.clone(), symbols.len() as u32);
            symbols.push(dulf::Symbol::new(
                name_offset,
                addr as u64,
                binding,
                dulf::SymbolType::NoType,
                0,
            ));
        }

        for name in &self.externs {
            if self.symbols.contains_key(name) {
                continue;
            }
            let name_offset = strtab.intern(name);
            symbol_index.insert(name.clone(), symbols.len() as u32);
            symbols.push(dulf::Symbol::new(
                name_offset,
                0,
                dulf::SymbolBinding::Global,
                dulf::SymbolType::NoType,
                dulf::SECTION_UNDEF,
            ));
        }

        let mut relocations = Vec::new();
        for link in &self.undef_chain {
            if self.symbols.contains_key(&link.name) {
                // already resolved in place by second_pass
                continue;
            }
            let Some(&index) = symbol_index.get(&link.name) else {
                continue;
            };
            relocations.push(dulf::Relocation::new(
                link.from as u64,
                index,
                dulf::RelocationType::Absolute,
                0,
            ));
        }

        let text = dulf::Section::new(".text", 0, self.output.clone());

        dulf::build(
            self.start_address.unwrap_or(0) as u64,
            vec![text],
            symbols,
            relocations,
            strtab.into_bytes(),
        )
    }
}

/// Returns `Some(result)` if `op` names a directive, dispatching and
/// running it; `None` if `op` isn't a directive at all (it's then tried
/// as an instruction mnemonic by the caller).
fn dispatch_directive(
    info: &mut AssemblerInfo,
    op: &str,
    line: &AssemblyLine,
) -> Option<Result<(), AssemblyError>> {
    Some(match op {
        "space" => directive_space(info, line),
        "const" => directive_const(info, line),
        "start" => directive_start(info, line),
        "end" => directive_end(info, line),
        "extdef" => directive_extdef(info, line),
        "extr" => directive_extr(info, line),
        "stack" => directive_stack(info, line),
        _ => return None,
    })
}

fn expect_one_integer(line: &AssemblyLine, directive: &str) -> Result<i64, AssemblyError> {
    match line.args.as_slice() {
        [Operand::Integer(v)] => Ok(*v),
        _ => Err(AssemblyError::StructuralError { line: line.line_number, reason: format!("'{directive}' expects a single integer argument") }),
    }
}

fn directive_space(info: &mut AssemblerInfo, line: &AssemblyLine) -> Result<(), AssemblyError> {
    if !line.args.is_empty() {
        return Err(AssemblyError::StructuralError { line: line.line_number, reason: "'space' takes no arguments".to_string() });
    }
    info.emit_word(line.label.as_deref(), 0, line.line_number)
}

fn directive_const(info: &mut AssemblerInfo, line: &AssemblyLine) -> Result<(), AssemblyError> {
    let value = expect_one_integer(line, "const")?;
    info.emit_word(line.label.as_deref(), value as Word, line.line_number)
}

fn directive_start(info: &mut AssemblerInfo, line: &AssemblyLine) -> Result<(), AssemblyError> {
    let value = expect_one_integer(line, "start")?;
    info.start_address = Some(value as Word);
    Ok(())
}

fn directive_end(info: &mut AssemblerInfo, _line: &AssemblyLine) -> Result<(), AssemblyError> {
    info.module_ended = true;
    Ok(())
}

fn directive_extdef(info: &mut AssemblerInfo, line: &AssemblyLine) -> Result<(), AssemblyError> {
    match line.args.as_slice() {
        [Operand::Ident(name)] => {
            info.globals.insert(name.clone());
            Ok(())
        }
        _ => Err(AssemblyError::StructuralError { line: line.line_number, reason: "'extdef' expects a single symbol name".to_string() }),
    }
}

fn directive_extr(info: &mut AssemblerInfo, line: &AssemblyLine) -> Result<(), AssemblyError> {
    let Some(label) = &line.label else {
        return Err(AssemblyError::StructuralError { line: line.line_number, reason: "'extr' requires a label naming the external symbol".to_string() });
    };
    info.externs.insert(label.clone());
    Ok(())
}

fn directive_stack(info: &mut AssemblerInfo, line: &AssemblyLine) -> Result<(), AssemblyError> {
    let value = expect_one_integer(line, "stack")?;
    info.stack_size = Some(value as Word);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn assemble_lines(source: &str) -> AssemblerInfo {
        let lines = parse_program(source).unwrap();
        let mut info = AssemblerInfo::new();
        info.first_pass(&lines).unwrap();
        info.second_pass().unwrap();
        info
    }

    #[test]
    fn encodes_a_constant_and_halt() {
        let info = assemble_lines("start: const 42\nstop\n");
        assert_eq!(info.output[0], 42);
        assert_eq!(info.output[1] & isa::OPCODE_MASK, 11);
    }

    #[test]
    fn resolves_a_forward_branch() {
        let info = assemble_lines("br target\ntarget: stop\n");
        // operand word for `br` is output[1]; it should equal `target`'s
        // bound address (2: opcode word + operand word of the branch).
        assert_eq!(info.output[1], 2);
    }

    #[test]
    fn immediate_integer_sets_the_runtime_flag() {
        let info = assemble_lines("add 5\n");
        assert_eq!(info.output[0] & RuntimeFlags::IMMEDIATE.bits(), RuntimeFlags::IMMEDIATE.bits());
        assert_eq!(info.output[1], 5);
    }

    #[test]
    fn register_operand_sets_the_reg_flag() {
        let info = assemble_lines("load ACC\n");
        assert_eq!(info.output[0] & RuntimeFlags::REG_A.bits(), RuntimeFlags::REG_A.bits());
        assert_eq!(info.output[1], isa::ACC as Word);
    }

    #[test]
    fn duplicate_label_is_multiply_defined() {
        let lines = parse_program("a: stop\na: stop\n").unwrap();
        let mut info = AssemblerInfo::new();
        let err = info.first_pass(&lines).unwrap_err();
        assert!(matches!(err, AssemblyError::MultiplyDefined { .. }));
    }

    #[test]
    fn unresolved_non_extern_symbol_fails_second_pass() {
        let lines = parse_program("br nowhere\n").unwrap();
        let mut info = AssemblerInfo::new();
        info.first_pass(&lines).unwrap();
        assert!(info.second_pass().is_err());
    }

    #[test]
    fn extern_symbol_survives_to_the_object_as_a_relocation() {
        let lines = parse_program("callee: extr\nbr callee\n").unwrap();
        let mut info = AssemblerInfo::new();
        info.first_pass(&lines).unwrap();
        info.second_pass().unwrap();
        let object = info.to_object();
        assert_eq!(object.relocations.len(), 1);
    }

    #[test]
    fn extdef_marks_a_global_symbol() {
        let lines = parse_program("extdef entry\nentry: stop\n").unwrap();
        let mut info = AssemblerInfo::new();
        info.first_pass(&lines).unwrap();
        info.second_pass().unwrap();
        let object = info.to_object();
        let sym = object.symbols.iter().find(|s| object.symbol_name(s).unwrap() == "entry").unwrap();
        assert_eq!(sym.binding(), dulf::SymbolBinding::Global);
    }
}
