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

//! The machine model: register indices, the opcode table and the two
//! families of instruction-word flags (static, chosen by the assembler
//! from the instruction's own shape; runtime, decoded by the simulator
//! from the encoded word).

use bitflags::bitflags;

pub type Word = u16;
pub type Addr = u64;

pub const PC: usize = 0;
pub const SP: usize = 1;
pub const ACC: usize = 2;
pub const MOP: usize = 3;
pub const RI: usize = 4;
pub const RE: usize = 5;
pub const R0: usize = 6;
pub const R1: usize = 7;
pub const REGISTER_COUNT: usize = 8;

const REGISTER_NAMES: [(&str, usize); REGISTER_COUNT] = [
    ("PC", PC),
    ("SP", SP),
    ("ACC", ACC),
    ("MOP", MOP),
    ("RI", RI),
    ("RE", RE),
    ("R0", R0),
    ("R1", R1),
];

/// Looks up a register by its source-level name. Names are case-sensitive;
/// the assembler treats anything that isn't one of these eight names as a
/// symbol reference rather than a register operand.
pub fn register_by_name(name: &str) -> Option<usize> {
    REGISTER_NAMES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|&(_, idx)| idx)
}

pub fn register_name(index: usize) -> Option<&'static str> {
    REGISTER_NAMES
        .iter()
        .find(|(_, i)| *i == index)
        .map(|&(n, _)| n)
}

bitflags! {
    /// Flags fixed per instruction shape, chosen by the assembler and the
    /// simulator's addressing-mode resolver. These never appear in the
    /// encoded word; they live in the opcode table only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StaticFlags: u8 {
        /// Operand 0 may be an integer literal.
        const IMMEDIATE_A = 1 << 0;
        /// Operand 1 may be an integer literal.
        const IMMEDIATE_B = 1 << 1;
        /// A non-register, non-indirect operand is itself the value
        /// (branch targets), not a memory address to dereference.
        const DIRECT_IS_IMMEDIATE = 1 << 2;
        /// Instruction moves the stack pointer.
        const STACK = 1 << 3;
    }
}

bitflags! {
    /// Flags packed into bits 5-9 of the encoded instruction word,
    /// decoded at runtime by the simulator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RuntimeFlags: u16 {
        const INDIRECT_A = 1 << 5;
        const INDIRECT_B = 1 << 6;
        const REG_A = 1 << 7;
        const REG_B = 1 << 8;
        const IMMEDIATE = 1 << 9;
    }
}

/// Mask over the low 5 bits of an instruction word, the base opcode.
pub const OPCODE_MASK: u16 = 0x1F;

#[derive(Debug, Clone, Copy)]
pub struct Instruction {
    pub mnemonic: &'static str,
    pub opcode: u8,
    pub num_args: u8,
    pub flags: StaticFlags,
}

pub const INSTRUCTIONS: &[Instruction] = &[
    Instruction {
        mnemonic: "br",
        opcode: 0,
        num_args: 1,
        flags: StaticFlags::DIRECT_IS_IMMEDIATE,
    },
    Instruction {
        mnemonic: "brpos",
        opcode: 1,
        num_args: 1,
        flags: StaticFlags::DIRECT_IS_IMMEDIATE,
    },
    Instruction {
        mnemonic: "add",
        opcode: 2,
        num_args: 1,
        flags: StaticFlags::IMMEDIATE_A,
    },
    Instruction {
        mnemonic: "load",
        opcode: 3,
        num_args: 1,
        flags: StaticFlags::IMMEDIATE_A,
    },
    Instruction {
        mnemonic: "brzero",
        opcode: 4,
        num_args: 1,
        flags: StaticFlags::DIRECT_IS_IMMEDIATE,
    },
    Instruction {
        mnemonic: "brneg",
        opcode: 5,
        num_args: 1,
        flags: StaticFlags::DIRECT_IS_IMMEDIATE,
    },
    Instruction {
        mnemonic: "sub",
        opcode: 6,
        num_args: 1,
        flags: StaticFlags::IMMEDIATE_A,
    },
    Instruction {
        mnemonic: "store",
        opcode: 7,
        num_args: 1,
        flags: StaticFlags::empty(),
    },
    Instruction {
        mnemonic: "write",
        opcode: 8,
        num_args: 1,
        flags: StaticFlags::IMMEDIATE_A,
    },
    Instruction {
        mnemonic: "divide",
        opcode: 10,
        num_args: 1,
        flags: StaticFlags::IMMEDIATE_A,
    },
    Instruction {
        mnemonic: "stop",
        opcode: 11,
        num_args: 0,
        flags: StaticFlags::empty(),
    },
    Instruction {
        mnemonic: "read",
        opcode: 12,
        num_args: 1,
        flags: StaticFlags::empty(),
    },
    Instruction {
        mnemonic: "copy",
        opcode: 13,
        num_args: 2,
        flags: StaticFlags::IMMEDIATE_B,
    },
    Instruction {
        mnemonic: "mult",
        opcode: 14,
        num_args: 1,
        flags: StaticFlags::IMMEDIATE_A,
    },
    Instruction {
        mnemonic: "ret",
        opcode: 16,
        num_args: 0,
        flags: StaticFlags::STACK,
    },
    Instruction {
        mnemonic: "push",
        opcode: 17,
        num_args: 1,
        // union() isn't const-evaluable on older bitflags point releases;
        // spell out the bit math so this table stays a `const`.
        flags: StaticFlags::from_bits_truncate(
            StaticFlags::IMMEDIATE_A.bits() | StaticFlags::STACK.bits(),
        ),
    },
    Instruction {
        mnemonic: "pop",
        opcode: 18,
        num_args: 1,
        flags: StaticFlags::STACK,
    },
];

pub fn lookup(mnemonic: &str) -> Option<&'static Instruction> {
    INSTRUCTIONS.iter().find(|i| i.mnemonic == mnemonic)
}

pub fn instruction_by_opcode(word: Word) -> Option<&'static Instruction> {
    let opcode = (word & OPCODE_MASK) as u8;
    INSTRUCTIONS.iter().find(|i| i.opcode == opcode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_round_trip() {
        for &(name, idx) in REGISTER_NAMES.iter() {
            assert_eq!(register_by_name(name), Some(idx));
            assert_eq!(register_name(idx), Some(name));
        }
        assert_eq!(register_by_name("FOO"), None);
    }

    #[test]
    fn opcode_lookup_masks_runtime_flags() {
        let encoded = (INSTRUCTIONS[2].opcode as u16) | RuntimeFlags::IMMEDIATE.bits();
        let inst = instruction_by_opcode(encoded).unwrap();
        assert_eq!(inst.mnemonic, "add");
    }

    #[test]
    fn every_mnemonic_resolves_its_own_opcode() {
        for inst in INSTRUCTIONS {
            let found = instruction_by_opcode(inst.opcode as u16).unwrap();
            assert_eq!(found.mnemonic, inst.mnemonic);
        }
    }
}
