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

use std::collections::HashMap;

use crate::errors::AssemblyError;
use crate::isa::Word;

/// Label names to the word address they were bound at. There are no
/// banks or sections here — the whole module assembles into one flat
/// address space starting at zero; the linker is what gives a module an
/// absolute or relocated base.
pub type SymbolTable = HashMap<String, Word>;

pub fn get_symbol<'a>(
    table: &'a SymbolTable,
    name: &str,
    line: usize,
) -> Result<&'a Word, AssemblyError> {
    table.get(name).ok_or_else(|| AssemblyError::SemanticError {
        line,
        reason: format!("undefined label '{name}'"),
    })
}

/// Binds `name` to `address`, rejecting a redefinition of a label
/// already present in the table.
pub fn bind(
    table: &mut SymbolTable,
    name: &str,
    address: Word,
    line: usize,
) -> Result<(), AssemblyError> {
    if table.contains_key(name) {
        return Err(AssemblyError::MultiplyDefined {
            line,
            name: name.to_string(),
        });
    }
    table.insert(name.to_string(), address);
    Ok(())
}
