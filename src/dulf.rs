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

//! The DULF object/executable format: a small, hand-rolled, big-endian
//! binary layout. There is exactly one section kind in this system
//! (`.text`, PROGBITS), so the section table is mostly vestigial — it is
//! kept because the linker still needs per-object section bookkeeping to
//! lay modules out one after another.

use crate::errors::DulfError;
use crate::isa::Word;

pub const MAGIC: [u8; 4] = *b"DULF";

/// Marks a symbol's `section_index` as undefined — the symbol is a
/// reference to be resolved by the linker, not a definition.
pub const SECTION_UNDEF: u16 = 0xFFF1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolBinding {
    Local,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    NoType,
    Data,
    Func,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationType {
    Absolute,
    /// Declared for structural fidelity with the original format;
    /// accepted by this reader/writer but rejected by the linker's
    /// apply step (`LinkError::UnsupportedRelocation`).
    Relative,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name_offset: u32,
    pub value: u64,
    pub size: u32,
    info: u8,
    pub section_index: u16,
}

impl Symbol {
    pub fn new(name_offset: u32, value: u64, binding: SymbolBinding, ty: SymbolType, section_index: u16) -> Self {
        let mut sym = Symbol {
            name_offset,
            value,
            size: 0,
            info: 0,
            section_index,
        };
        sym.set_info(binding, ty);
        sym
    }

    pub fn set_info(&mut self, binding: SymbolBinding, ty: SymbolType) {
        let binding_bits = match binding {
            SymbolBinding::Local => 0u8,
            SymbolBinding::Global => 1u8,
        };
        let type_bits = match ty {
            SymbolType::NoType => 0u8,
            SymbolType::Data => 1u8,
            SymbolType::Func => 2u8,
        };
        self.info = (binding_bits << 4) | (type_bits & 0x0F);
    }

    pub fn binding(&self) -> SymbolBinding {
        if self.info >> 4 == 0 {
            SymbolBinding::Local
        } else {
            SymbolBinding::Global
        }
    }

    pub fn sym_type(&self) -> SymbolType {
        match self.info & 0x0F {
            1 => SymbolType::Data,
            2 => SymbolType::Func,
            _ => SymbolType::NoType,
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.section_index == SECTION_UNDEF
    }
}

#[derive(Debug, Clone)]
pub struct Relocation {
    /// Word offset, within the referencing section, of the word to patch.
    pub offset: u64,
    info: u32,
    pub addend: i64,
}

impl Relocation {
    pub fn new(offset: u64, symbol_index: u32, reloc_type: RelocationType, addend: i64) -> Self {
        let mut reloc = Relocation {
            offset,
            info: 0,
            addend,
        };
        reloc.set_info(symbol_index, reloc_type);
        reloc
    }

    pub fn set_info(&mut self, symbol_index: u32, reloc_type: RelocationType) {
        let type_bits: u32 = match reloc_type {
            RelocationType::Absolute => 1,
            RelocationType::Relative => 2,
        };
        self.info = (symbol_index << 8) | (type_bits & 0xFF);
    }

    pub fn symbol_index(&self) -> u32 {
        self.info >> 8
    }

    pub fn reloc_type(&self) -> Option<RelocationType> {
        match self.info & 0xFF {
            1 => Some(RelocationType::Absolute),
            2 => Some(RelocationType::Relative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    /// Section type, e.g. `PROGBITS` (0). Only one kind is ever emitted
    /// by this toolchain, but the field is carried for wire fidelity.
    pub section_type: u32,
    pub flags: u32,
    pub address: u64,
    pub data: Vec<Word>,
    /// Index of a related section (e.g. a relocation section's target).
    /// Unused by this format today.
    pub link: u32,
    /// Extra interpretation of `link`, meaning depends on `section_type`.
    /// Unused by this format today.
    pub info: u32,
    pub alignment: u32,
}

impl Section {
    pub fn new(name: impl Into<String>, address: u64, data: Vec<Word>) -> Self {
        Section {
            name: name.into(),
            section_type: 0,
            flags: 0,
            address,
            data,
            link: 0,
            info: 0,
            alignment: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Object {
    pub entry_point: u64,
    pub sections: Vec<Section>,
    pub symbols: Vec<Symbol>,
    pub relocations: Vec<Relocation>,
    string_table: Vec<u8>,
}

impl Object {
    pub fn symbol_name(&self, sym: &Symbol) -> Result<&str, DulfError> {
        read_str(&self.string_table, sym.name_offset)
    }

    pub fn text(&self) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == ".text")
    }
}

/// Accumulates a `\0`-terminated string table while interning names,
/// reusing an offset when the same name is interned twice.
pub struct StringTableBuilder {
    bytes: Vec<u8>,
    offsets: std::collections::HashMap<String, u32>,
}

impl StringTableBuilder {
    pub fn new() -> Self {
        StringTableBuilder {
            bytes: vec![0],
            offsets: std::collections::HashMap::new(),
        }
    }

    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(name) {
            return offset;
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(name.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(name.to_string(), offset);
        offset
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Default for StringTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn read_str(table: &[u8], offset: u32) -> Result<&str, DulfError> {
    let start = offset as usize;
    let end = table[start..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| start + p)
        .ok_or(DulfError::BadOffset)?;
    std::str::from_utf8(&table[start..end]).map_err(|_| DulfError::BadOffset)
}

const HEADER_SIZE: usize = 4 + 2 * 3 + 4 * 4 + 8 + 4;
const SECTION_HEADER_SIZE: usize = 4 + 4 + 4 + 8 + 4 + 4 + 4 + 4 + 4;
const SYMBOL_SIZE: usize = 4 + 8 + 4 + 1 + 1 + 2;
const RELOCATION_SIZE: usize = 8 + 4 + 8;

/// Serializes an in-memory object into its on-disk DULF representation.
/// Layout: header, section headers, symbols, relocations, string table,
/// then each section's word data concatenated in declaration order, all
/// big-endian.
pub fn write(obj: &Object) -> Vec<u8> {
    let mut strtab = StringTableBuilder::new();
    let section_name_offsets: Vec<u32> = obj.sections.iter().map(|s| strtab.intern(&s.name)).collect();

    let tables_size = SECTION_HEADER_SIZE * obj.sections.len()
        + SYMBOL_SIZE * obj.symbols.len()
        + RELOCATION_SIZE * obj.relocations.len();
    let strtab_offset = (HEADER_SIZE + tables_size) as u32;

    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&(obj.sections.len() as u16).to_be_bytes());
    out.extend_from_slice(&(obj.symbols.len() as u16).to_be_bytes());
    out.extend_from_slice(&(obj.relocations.len() as u16).to_be_bytes());
    out.extend_from_slice(&(HEADER_SIZE as u32).to_be_bytes());
    out.extend_from_slice(&((HEADER_SIZE + SECTION_HEADER_SIZE * obj.sections.len()) as u32).to_be_bytes());
    out.extend_from_slice(
        &((HEADER_SIZE + SECTION_HEADER_SIZE * obj.sections.len() + SYMBOL_SIZE * obj.symbols.len()) as u32)
            .to_be_bytes(),
    );
    out.extend_from_slice(&strtab_offset.to_be_bytes());
    out.extend_from_slice(&obj.entry_point.to_be_bytes());

    // section data starts right after the string table; computed below
    // once we know the string table's final size.
    let strtab_bytes = strtab.into_bytes();
    out.extend_from_slice(&(strtab_bytes.len() as u32).to_be_bytes());

    let data_region_start = strtab_offset as usize + strtab_bytes.len();
    let mut data_offset = data_region_start;
    let mut section_data_offsets = Vec::with_capacity(obj.sections.len());
    for section in &obj.sections {
        section_data_offsets.push(data_offset);
        data_offset += section.data.len() * 2;
    }

    for (i, section) in obj.sections.iter().enumerate() {
        out.extend_from_slice(&section_name_offsets[i].to_be_bytes());
        out.extend_from_slice(&section.section_type.to_be_bytes());
        out.extend_from_slice(&section.flags.to_be_bytes());
        out.extend_from_slice(&section.address.to_be_bytes());
        out.extend_from_slice(&(section_data_offsets[i] as u32).to_be_bytes());
        out.extend_from_slice(&((section.data.len() * 2) as u32).to_be_bytes());
        out.extend_from_slice(&section.link.to_be_bytes());
        out.extend_from_slice(&section.info.to_be_bytes());
        out.extend_from_slice(&section.alignment.to_be_bytes());
    }

    for sym in &obj.symbols {
        out.extend_from_slice(&sym.name_offset.to_be_bytes());
        out.extend_from_slice(&sym.value.to_be_bytes());
        out.extend_from_slice(&sym.size.to_be_bytes());
        out.push(sym.info);
        out.push(0); // other/reserved
        out.extend_from_slice(&sym.section_index.to_be_bytes());
    }

    for reloc in &obj.relocations {
        out.extend_from_slice(&reloc.offset.to_be_bytes());
        out.extend_from_slice(&reloc.info.to_be_bytes());
        out.extend_from_slice(&reloc.addend.to_be_bytes());
    }

    out.extend_from_slice(&strtab_bytes);

    for section in &obj.sections {
        for word in &section.data {
            out.extend_from_slice(&word.to_be_bytes());
        }
    }

    out
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DulfError> {
        let end = self.pos.checked_add(n).ok_or(DulfError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(DulfError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, DulfError> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32, DulfError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, DulfError> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn i64(&mut self) -> Result<i64, DulfError> {
        Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn u8(&mut self) -> Result<u8, DulfError> {
        Ok(self.take(1)?[0])
    }

    fn at(&self, offset: usize) -> Cursor<'a> {
        Cursor {
            bytes: self.bytes,
            pos: offset,
        }
    }
}

/// Parses a DULF byte stream into an in-memory `Object`.
pub fn read(bytes: &[u8]) -> Result<Object, DulfError> {
    let mut cur = Cursor::new(bytes);
    let magic = cur.take(4)?;
    if magic != MAGIC {
        return Err(DulfError::BadMagic);
    }
    let section_count = cur.u16()? as usize;
    let symbol_count = cur.u16()? as usize;
    let reloc_count = cur.u16()? as usize;
    let section_offset = cur.u32()? as usize;
    let symbol_offset = cur.u32()? as usize;
    let reloc_offset = cur.u32()? as usize;
    let strtab_offset = cur.u32()? as usize;
    let entry_point = cur.u64()?;
    let strtab_size = cur.u32()? as usize;

    let string_table = bytes
        .get(strtab_offset..strtab_offset + strtab_size)
        .ok_or(DulfError::Truncated)?
        .to_vec();

    let mut section_cur = cur.at(section_offset);
    struct RawSection {
        name_offset: u32,
        section_type: u32,
        flags: u32,
        address: u64,
        file_offset: usize,
        size: usize,
        link: u32,
        info: u32,
        alignment: u32,
    }
    let mut raw_sections = Vec::with_capacity(section_count);
    for _ in 0..section_count {
        let name_offset = section_cur.u32()?;
        let section_type = section_cur.u32()?;
        let flags = section_cur.u32()?;
        let address = section_cur.u64()?;
        let file_offset = section_cur.u32()? as usize;
        let size = section_cur.u32()? as usize;
        let link = section_cur.u32()?;
        let info = section_cur.u32()?;
        let alignment = section_cur.u32()?;
        raw_sections.push(RawSection {
            name_offset,
            section_type,
            flags,
            address,
            file_offset,
            size,
            link,
            info,
            alignment,
        });
    }

    let mut sections = Vec::with_capacity(section_count);
    for raw in &raw_sections {
        let name = read_str(&string_table, raw.name_offset)?.to_string();
        let bytes = bytes
            .get(raw.file_offset..raw.file_offset + raw.size)
            .ok_or(DulfError::Truncated)?;
        if bytes.len() % 2 != 0 {
            return Err(DulfError::Truncated);
        }
        let data = bytes
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        sections.push(Section {
            name,
            section_type: raw.section_type,
            flags: raw.flags,
            address: raw.address,
            data,
            link: raw.link,
            info: raw.info,
            alignment: raw.alignment,
        });
    }

    let mut symbol_cur = cur.at(symbol_offset);
    let mut symbols = Vec::with_capacity(symbol_count);
    for _ in 0..symbol_count {
        let name_offset = symbol_cur.u32()?;
        let value = symbol_cur.u64()?;
        let size = symbol_cur.u32()?;
        let info = symbol_cur.u8()?;
        let _other = symbol_cur.u8()?;
        let section_index = symbol_cur.u16()?;
        symbols.push(Symbol {
            name_offset,
            value,
            size,
            info,
            section_index,
        });
    }

    let mut reloc_cur = cur.at(reloc_offset);
    let mut relocations = Vec::with_capacity(reloc_count);
    for _ in 0..reloc_count {
        let offset = reloc_cur.u64()?;
        let info = reloc_cur.u32()?;
        let addend = reloc_cur.i64()?;
        relocations.push(Relocation {
            offset,
            info,
            addend,
        });
    }

    Ok(Object {
        entry_point,
        sections,
        symbols,
        relocations,
        string_table,
    })
}

/// Builds a fresh `Object` from already-resolved sections/symbols/
/// relocations plus an interned string table, for callers (the
/// assembler, the linker) that assemble the pieces themselves.
pub fn build(
    entry_point: u64,
    sections: Vec<Section>,
    symbols: Vec<Symbol>,
    relocations: Vec<Relocation>,
    string_table: Vec<u8>,
) -> Object {
    Object {
        entry_point,
        sections,
        symbols,
        relocations,
        string_table,
    }
}
