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

//! Combines one or more DULF objects into a single executable object:
//! lays out each module's `.text` section one after another, builds a
//! cross-module global symbol table, then patches every relocation.
//!
//! Addresses are tracked in words throughout (matching the assembler's
//! own `output: Vec<Word>`), not bytes — there is no byte/word
//! conversion to do at link time, unlike the original format this was
//! distilled from.

use std::collections::HashMap;

use crate::dulf::{self, Object, Section, SymbolBinding, SymbolType};
use crate::errors::LinkError;
use crate::isa::Word;

#[derive(Debug, Clone, Copy)]
pub enum LinkerMode {
    /// Base address zero; the caller (the loader) decides where the
    /// result actually lands in memory.
    Relocator,
    Absolute(Word),
}

struct Layout {
    rel_base: u64,
    abs_base: u64,
}

struct ResolvedSymbol {
    rel_addr: u64,
    abs_addr: u64,
}

/// Links `objects` in order, producing a single DULF object whose
/// `.text` section is their concatenation (modulo relocation patches).
pub fn link(objects: &[Object], mode: LinkerMode) -> Result<Object, LinkError> {
    let load_address = match mode {
        LinkerMode::Relocator => 0u64,
        LinkerMode::Absolute(addr) => addr as u64,
    };

    let mut layouts = Vec::with_capacity(objects.len());
    let mut running = 0u64;
    for obj in objects {
        let text = obj.text().ok_or(LinkError::MissingTextSection)?;
        layouts.push(Layout {
            rel_base: running,
            abs_base: load_address + running,
        });
        running += text.data.len() as u64;
    }

    let global_symbols = build_global_table(objects, &layouts)?;
    verify_externals_resolved(objects, &global_symbols)?;

    let mut merged_data = Vec::with_capacity(running as usize);
    let mut object_word_offset = Vec::with_capacity(objects.len());
    for obj in objects {
        object_word_offset.push(merged_data.len());
        let text = obj.text().ok_or(LinkError::MissingTextSection)?;
        merged_data.extend_from_slice(&text.data);
    }

    for (i, obj) in objects.iter().enumerate() {
        for reloc in &obj.relocations {
            let sym = obj
                .symbols
                .get(reloc.symbol_index() as usize)
                .ok_or(LinkError::UndefinedExternal(format!(
                    "relocation references out-of-range symbol {}",
                    reloc.symbol_index()
                )))?;
            let name = obj
                .symbol_name(sym)
                .map_err(|_| LinkError::UndefinedExternal("unreadable symbol name".to_string()))?;
            let target = global_symbols
                .get(name)
                .ok_or_else(|| LinkError::UndefinedExternal(name.to_string()))?;

            let addr = match mode {
                LinkerMode::Relocator => target.rel_addr,
                LinkerMode::Absolute(_) => target.abs_addr,
            };

            let pos = object_word_offset[i] + reloc.offset as usize;
            match reloc.reloc_type() {
                Some(dulf::RelocationType::Absolute) => {
                    merged_data[pos] = addr as Word;
                }
                _ => return Err(LinkError::UnsupportedRelocation),
            }
        }
    }

    let mut strtab = dulf::StringTableBuilder::new();
    let mut entries: Vec<(&String, u64)> = global_symbols
        .iter()
        .map(|(name, resolved)| {
            let addr = match mode {
                LinkerMode::Relocator => resolved.rel_addr,
                LinkerMode::Absolute(_) => resolved.abs_addr,
            };
            (name, addr)
        })
        .collect();
    entries.sort_by_key(|(_, addr)| *addr);
    let final_symbols = entries
        .into_iter()
        .map(|(name, addr)| {
            let name_offset = strtab.intern(name);
            dulf::Symbol::new(name_offset, addr, SymbolBinding::Global, SymbolType::Func, 0)
        })
        .collect();

    let section = Section::new(".text", load_address, merged_data);

    Ok(dulf::build(
        load_address,
        vec![section],
        final_symbols,
        Vec::new(),
        strtab.into_bytes(),
    ))
}

fn build_global_table(
    objects: &[Object],
    layouts: &[Layout],
) -> Result<HashMap<String, ResolvedSymbol>, LinkError> {
    let mut table: HashMap<String, ResolvedSymbol> = HashMap::new();
    for (obj, layout) in objects.iter().zip(layouts) {
        for sym in &obj.symbols {
            if sym.is_undefined() {
                continue;
            }
            let name = obj
                .symbol_name(sym)
                .map_err(|_| LinkError::UndefinedExternal("unreadable symbol name".to_string()))?;
            if table.contains_key(name) {
                return Err(LinkError::MultiplyDefined(name.to_string()));
            }
            table.insert(
                name.to_string(),
                ResolvedSymbol {
                    rel_addr: layout.rel_base + sym.value,
                    abs_addr: layout.abs_base + sym.value,
                },
            );
        }
    }
    Ok(table)
}

fn verify_externals_resolved(
    objects: &[Object],
    global_symbols: &HashMap<String, ResolvedSymbol>,
) -> Result<(), LinkError> {
    for obj in objects {
        for sym in &obj.symbols {
            if !sym.is_undefined() {
                continue;
            }
            let name = obj
                .symbol_name(sym)
                .map_err(|_| LinkError::UndefinedExternal("unreadable symbol name".to_string()))?;
            if !global_symbols.contains_key(name) {
                return Err(LinkError::UndefinedExternal(name.to_string()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::AssemblerInfo;
    use crate::parser::parse_program;

    fn assemble(source: &str) -> Object {
        let lines = parse_program(source).unwrap();
        let mut info = AssemblerInfo::new();
        info.first_pass(&lines).unwrap();
        info.second_pass().unwrap();
        info.to_object()
    }

    #[test]
    fn concatenates_two_modules_in_relocator_mode() {
        let a = assemble("const 1\nconst 2\n");
        let b = assemble("const 3\n");
        let linked = link(&[a, b], LinkerMode::Relocator).unwrap();
        assert_eq!(linked.text().unwrap().data, vec![1, 2, 3]);
    }

    #[test]
    fn absolute_mode_offsets_symbol_addresses() {
        let a = assemble("extdef start\nstart: const 9\n");
        let linked = link(&[a], LinkerMode::Absolute(0x100)).unwrap();
        let sym = linked
            .symbols
            .iter()
            .find(|s| linked.symbol_name(s).unwrap() == "start")
            .unwrap();
        assert_eq!(sym.value, 0x100);
    }

    #[test]
    fn cross_module_extern_is_resolved() {
        let callee = assemble("extdef helper\nhelper: const 7\n");
        let caller = assemble("helper: extr\nbr helper\n");
        let linked = link(&[callee, caller], LinkerMode::Relocator).unwrap();
        // caller's br operand (second word of its section) should now
        // point at helper's address (0, the first module's base).
        assert_eq!(linked.text().unwrap().data[2], 0);
    }

    #[test]
    fn unresolved_extern_is_an_error() {
        let caller = assemble("missing: extr\nbr missing\n");
        let err = link(&[caller], LinkerMode::Relocator).unwrap_err();
        assert!(matches!(err, LinkError::UndefinedExternal(_)));
    }

    #[test]
    fn duplicate_global_symbol_is_an_error() {
        let a = assemble("extdef dup\ndup: const 1\n");
        let b = assemble("extdef dup\ndup: const 2\n");
        let err = link(&[a, b], LinkerMode::Relocator).unwrap_err();
        assert!(matches!(err, LinkError::MultiplyDefined(_)));
    }

    #[test]
    fn merged_symbol_table_is_sorted_by_address_not_name() {
        // "zz" binds to the lower address (module a, word 0) and "aa" to
        // the higher one (module b, word 1); the merged table must still
        // come out address-ordered, i.e. "zz" before "aa".
        let a = assemble("extdef zz\nzz: const 1\n");
        let b = assemble("extdef aa\nconst 0\naa: const 2\n");
        let linked = link(&[a, b], LinkerMode::Relocator).unwrap();
        let names: Vec<&str> = linked.symbols.iter().map(|s| linked.symbol_name(s).unwrap()).collect();
        assert_eq!(names, vec!["zz", "aa"]);
    }
}
