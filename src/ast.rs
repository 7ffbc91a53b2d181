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

/// One source-level operand: either an integer literal or a bare
/// identifier. Whether an identifier names a register, a defined symbol
/// or a forward reference is resolved later by the assembler, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Integer(i64),
    Ident(String),
}

/// A single assembled line: an optional label, an optional operation
/// (an instruction mnemonic or a directive name — the two share a
/// grammar and are told apart by the assembler's dispatch table) and
/// its operands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyLine {
    pub line_number: usize,
    pub label: Option<String>,
    pub op: Option<String>,
    pub args: Vec<Operand>,
}
