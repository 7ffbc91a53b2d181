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

//! The register/memory simulator. `step()` is the only execution
//! primitive; it never returns an error. Faults (an invalid opcode, a
//! PC wraparound, division by zero) are reported through `log` and
//! drive the machine to `SimState::Halt` instead — a guest program's
//! mistake is never allowed to crash the host process.

use std::collections::VecDeque;

use crate::isa::{self, Instruction, RuntimeFlags, StaticFlags, Word};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimState {
    Halt,
    Run,
    /// The machine executed one instruction since the last poll and is
    /// waiting for the host to call `step()` again.
    Pause,
    /// A `read` found the input queue empty; `PC` was rolled back so the
    /// same `read` re-executes once the host pushes a word into
    /// `in_queue`.
    IOBlocked,
}

/// Where an operand's value actually lives, resolved once per operand
/// per `step()` from the runtime flags and the instruction's static
/// flags. Holding indices rather than references keeps every handler
/// free of borrow-splitting gymnastics while still giving a single
/// uniform `read`/`write` interface over register file, memory, and
/// immediate operands.
#[derive(Debug, Clone, Copy)]
enum ResolvedOperand {
    Register(usize),
    Memory(usize),
    Immediate(Word),
}

pub struct Simulator {
    pub memory: Vec<Word>,
    pub registers: [Word; isa::REGISTER_COUNT],
    pub state: SimState,
    pub in_queue: VecDeque<Word>,
    pub out_queue: VecDeque<Word>,
}

impl Simulator {
    pub fn new(mem_size: usize) -> Self {
        let mut sim = Simulator {
            memory: vec![0; mem_size],
            registers: [0; isa::REGISTER_COUNT],
            state: SimState::Run,
            in_queue: VecDeque::new(),
            out_queue: VecDeque::new(),
        };
        sim.registers[isa::SP] = (mem_size.saturating_sub(1)) as Word;
        sim
    }

    /// Clears memory and registers, re-seeds `SP` to the top of memory,
    /// sets `PC` to `start_address` and returns the machine to `Run`.
    pub fn reset(&mut self, start_address: Word) {
        self.memory.iter_mut().for_each(|w| *w = 0);
        self.registers = [0; isa::REGISTER_COUNT];
        self.registers[isa::SP] = (self.memory.len().saturating_sub(1)) as Word;
        self.registers[isa::PC] = start_address;
        self.in_queue.clear();
        self.out_queue.clear();
        self.state = SimState::Run;
    }

    /// Runs one fetch-decode-execute cycle.
    pub fn step(&mut self) {
        if self.state == SimState::Halt {
            return;
        }

        let mem_size = self.memory.len();
        let pc = self.registers[isa::PC] as usize;
        let inst_word = self.memory[pc];
        self.registers[isa::RI] = inst_word;

        let Some(inst) = isa::instruction_by_opcode(inst_word) else {
            log::error!("invalid opcode {:#x} at pc {pc:#06x}", inst_word & isa::OPCODE_MASK);
            self.state = SimState::Halt;
            return;
        };

        let n = inst.num_args as usize;
        let mut args = [0 as Word; 2];
        for (i, slot) in args.iter_mut().take(n).enumerate() {
            *slot = self.memory[(pc + 1 + i) % mem_size];
        }

        let next_pc = (pc + 1 + n) % mem_size;
        self.registers[isa::PC] = next_pc as Word;
        if next_pc < pc {
            log::warn!("pc wraparound at {pc:#06x}, halting");
            self.state = SimState::Halt;
        }

        self.execute(inst, inst_word, &args[..n], pc);

        if self.state == SimState::IOBlocked {
            self.registers[isa::PC] = pc as Word;
        } else if self.state == SimState::Run {
            self.state = SimState::Pause;
        }
    }

    fn resolve(&self, inst: &Instruction, opword: Word, pos: usize, arg: Word) -> ResolvedOperand {
        let (reg_flag, indirect_flag, immediate_ok) = if pos == 0 {
            (
                RuntimeFlags::REG_A,
                RuntimeFlags::INDIRECT_A,
                inst.flags.contains(StaticFlags::IMMEDIATE_A),
            )
        } else {
            (
                RuntimeFlags::REG_B,
                RuntimeFlags::INDIRECT_B,
                inst.flags.contains(StaticFlags::IMMEDIATE_B),
            )
        };

        if opword & reg_flag.bits() != 0 {
            ResolvedOperand::Register(arg as usize)
        } else if opword & RuntimeFlags::IMMEDIATE.bits() != 0 && immediate_ok {
            ResolvedOperand::Immediate(arg)
        } else if opword & indirect_flag.bits() != 0 {
            ResolvedOperand::Memory(self.memory[arg as usize] as usize)
        } else if inst.flags.contains(StaticFlags::DIRECT_IS_IMMEDIATE) {
            ResolvedOperand::Immediate(arg)
        } else {
            ResolvedOperand::Memory(arg as usize)
        }
    }

    fn read_operand(&self, op: ResolvedOperand) -> Word {
        match op {
            ResolvedOperand::Register(i) => self.registers[i],
            ResolvedOperand::Memory(a) => self.memory[a],
            ResolvedOperand::Immediate(v) => v,
        }
    }

    fn write_operand(&mut self, op: ResolvedOperand, value: Word) {
        match op {
            ResolvedOperand::Register(i) => self.registers[i] = value,
            ResolvedOperand::Memory(a) => self.memory[a] = value,
            ResolvedOperand::Immediate(_) => {
                log::error!("attempted write through an immediate operand");
            }
        }
    }

    fn execute(&mut self, inst: &Instruction, opword: Word, args: &[Word], pc: usize) {
        match inst.mnemonic {
            "add" | "sub" | "mult" | "divide" => {
                let op0 = self.resolve(inst, opword, 0, args[0]);
                let value = self.read_operand(op0);
                let acc = self.registers[isa::ACC];
                let result = match inst.mnemonic {
                    "add" => acc.wrapping_add(value),
                    "sub" => acc.wrapping_sub(value),
                    "mult" => acc.wrapping_mul(value),
                    "divide" => {
                        if value == 0 {
                            log::error!("division by zero at pc {pc:#06x}");
                            self.state = SimState::Halt;
                            return;
                        }
                        acc.wrapping_div(value)
                    }
                    _ => unreachable!(),
                };
                self.registers[isa::ACC] = result;
            }
            "load" => {
                let op0 = self.resolve(inst, opword, 0, args[0]);
                self.registers[isa::ACC] = self.read_operand(op0);
            }
            "store" => {
                let op0 = self.resolve(inst, opword, 0, args[0]);
                let acc = self.registers[isa::ACC];
                self.write_operand(op0, acc);
            }
            "copy" => {
                let op0 = self.resolve(inst, opword, 0, args[0]);
                let op1 = self.resolve(inst, opword, 1, args[1]);
                let value = self.read_operand(op1);
                self.write_operand(op0, value);
            }
            "br" => {
                let op0 = self.resolve(inst, opword, 0, args[0]);
                self.registers[isa::PC] = self.read_operand(op0);
            }
            "brpos" => {
                let acc = self.registers[isa::ACC];
                if acc != 0 && acc & 0x8000 == 0 {
                    let op0 = self.resolve(inst, opword, 0, args[0]);
                    self.registers[isa::PC] = self.read_operand(op0);
                }
            }
            "brneg" => {
                if self.registers[isa::ACC] & 0x8000 != 0 {
                    let op0 = self.resolve(inst, opword, 0, args[0]);
                    self.registers[isa::PC] = self.read_operand(op0);
                }
            }
            "brzero" => {
                if self.registers[isa::ACC] == 0 {
                    let op0 = self.resolve(inst, opword, 0, args[0]);
                    self.registers[isa::PC] = self.read_operand(op0);
                }
            }
            "read" => {
                if let Some(word) = self.in_queue.pop_front() {
                    let op0 = self.resolve(inst, opword, 0, args[0]);
                    self.write_operand(op0, word);
                    self.state = SimState::Run;
                } else {
                    self.state = SimState::IOBlocked;
                }
            }
            "write" => {
                let op0 = self.resolve(inst, opword, 0, args[0]);
                let value = self.read_operand(op0);
                self.out_queue.push_back(value);
            }
            "push" => {
                let op0 = self.resolve(inst, opword, 0, args[0]);
                let value = self.read_operand(op0);
                let sp = self.registers[isa::SP] as usize;
                self.memory[sp] = value;
                self.registers[isa::SP] = self.registers[isa::SP].wrapping_sub(1);
            }
            "pop" => {
                let top = (self.memory.len() - 1) as Word;
                if self.registers[isa::SP] != top {
                    self.registers[isa::SP] = self.registers[isa::SP].wrapping_add(1);
                }
                let value = self.memory[self.registers[isa::SP] as usize];
                let op0 = self.resolve(inst, opword, 0, args[0]);
                self.write_operand(op0, value);
            }
            "stop" => {
                self.state = SimState::Halt;
            }
            "ret" => {
                log::error!("'ret' has no handler at pc {pc:#06x}; treating as an invalid opcode");
                self.state = SimState::Halt;
            }
            other => unreachable!("unhandled mnemonic '{other}'"),
        }
    }
}
