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

use std::io::{self, BufRead, Write as _};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use acc16::dulf;
use acc16::file_reader::{AsmFileReader, FileReader};
use acc16::linker::LinkerMode;
use acc16::sim::SimState;

/// Default memory size, in words, for a simulator run from the CLI.
const MEMORY_WORDS: usize = 0x10000;

#[derive(Parser)]
#[clap(version = "0.1.0", author = "Connor Nolan")]
struct Opts {
    /// Link in absolute mode at the given load address instead of relocator mode.
    #[clap(short, long, value_name = "ADDR")]
    absolute: Option<u16>,

    /// Skip assembly and linking; load this DULF file directly and run it.
    #[clap(short, long, value_name = "PATH")]
    executable: Option<PathBuf>,

    /// Reserved: would emit a listing file alongside the assembled object. No-op.
    #[clap(short = 'l', long)]
    lst: bool,

    /// Persist each module's assembled DULF object before linking.
    #[clap(short, long)]
    save_temps: bool,

    /// Where to write the final linked DULF object.
    #[clap(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Assembly source files. Ignored when `--executable` is given.
    sources: Vec<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let opts = Opts::parse();

    let reader = AsmFileReader;
    let linked = if let Some(path) = &opts.executable {
        let bytes = reader
            .read_binary(path)
            .with_context(|| format!("Failed to read executable: {}", path.display()))?;
        dulf::read(&bytes).context("Failed to parse executable as a DULF object")?
    } else {
        if opts.sources.is_empty() {
            anyhow::bail!("no source files given (pass source paths or --executable)");
        }

        let mut objects = Vec::with_capacity(opts.sources.len());
        for path in &opts.sources {
            let source = reader
                .read_to_string(path)
                .with_context(|| format!("Failed to read source: {}", path.display()))?;
            let object = acc16::assemble(&source)
                .with_context(|| format!("Failed to assemble {}", path.display()))?;

            if opts.save_temps {
                let temp_path = path.with_extension("dulf");
                std::fs::write(&temp_path, dulf::write(&object))
                    .with_context(|| format!("Failed to save temp object {}", temp_path.display()))?;
            }

            objects.push(object);
        }

        let mode = match opts.absolute {
            Some(addr) => LinkerMode::Absolute(addr),
            None => LinkerMode::Relocator,
        };
        acc16::link(&objects, mode).context("Failed to link assembled objects")?
    };

    if let Some(path) = &opts.output {
        std::fs::write(path, dulf::write(&linked))
            .with_context(|| format!("Failed to write output: {}", path.display()))?;
    }

    let mut machine = acc16::load(&linked, MEMORY_WORDS)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    while machine.state != SimState::Halt {
        machine.step();

        while let Some(word) = machine.out_queue.pop_front() {
            writeln!(stdout, "{word}")?;
        }

        if machine.state == SimState::IOBlocked {
            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                anyhow::bail!("program blocked on input but stdin is closed");
            }
            let word: u16 = line
                .trim()
                .parse()
                .with_context(|| format!("expected a 16-bit word on stdin, got '{}'", line.trim()))?;
            machine.in_queue.push_back(word);
        }
    }

    Ok(())
}
