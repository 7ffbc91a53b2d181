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

//! Text-level macro expansion. Runs over raw source lines before the
//! pest grammar ever sees them — by the time `parser::parse_program`
//! runs, no `MACRO`/`MEND` bracket or macro invocation remains.

use std::collections::HashMap;

use crate::errors::MacroError;

#[derive(Debug, Clone)]
struct Macro {
    params: Vec<String>,
    body: Vec<String>,
}

#[derive(Debug, Clone)]
struct MacroDef {
    name: String,
    params: Vec<String>,
    body: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ground,
    Meta,
    Body,
}

/// A line split into its label/op/args components by whitespace and `:`,
/// without any notion of operand types. Used only by the macro
/// processor; the assembler's own parser classifies operands properly.
pub struct RawLine<'a> {
    pub raw: &'a str,
    pub label: Option<&'a str>,
    pub op: &'a str,
    pub args: Vec<&'a str>,
}

/// Splits a line into label/op/args, stripping a `;` comment first.
/// Returns `None` for a line with no operation token (blank, or a
/// label-only line) — this is the `EmptyLine` sentinel, not an error.
pub fn split_line(raw: &str) -> Option<RawLine<'_>> {
    let without_comment = match raw.split_once(';') {
        Some((code, _)) => code,
        None => raw,
    };
    let (label, rest) = match without_comment.split_once(':') {
        Some((l, r)) => (Some(l.trim()), r),
        None => (None, without_comment),
    };
    let mut fields = rest.split_whitespace();
    let op = fields.next()?;
    let args = fields.collect();
    Some(RawLine {
        raw,
        label,
        op,
        args,
    })
}

/// The macro preprocessor's state machine: `Ground` (normal text),
/// `Meta` (the line right after `MACRO`, naming the macro and its formal
/// parameters) and `Body` (lines being collected into the definition
/// until a matching `MEND`).
#[derive(Default)]
pub struct MacroProcessor {
    macros: HashMap<String, Macro>,
    nesting: u32,
    state: StateSlot,
    def_stack: Vec<MacroDef>,
}

#[derive(Default)]
struct StateSlot(Option<State>);

impl MacroProcessor {
    pub fn new() -> Self {
        Self {
            macros: HashMap::new(),
            nesting: 0,
            state: StateSlot(Some(State::Ground)),
            def_stack: Vec::new(),
        }
    }

    fn state(&self) -> State {
        self.state.0.unwrap_or(State::Ground)
    }

    /// Feeds one raw source line through the processor. Returns the
    /// fully macro-expanded replacement lines (zero, one, or many —
    /// expansion can both consume a macro invocation and produce several
    /// lines, or consume a definition line and produce none).
    pub fn process_line(&mut self, raw: &str) -> Result<Vec<String>, MacroError> {
        let Some(parsed) = split_line(raw) else {
            return Ok(Vec::new());
        };

        if parsed.op == "MEND" && self.nesting == 0 {
            return Err(MacroError::MendWithoutMacro);
        }

        if parsed.op == "MACRO" {
            self.nesting += 1;
            self.state.0 = Some(State::Meta);
            return Ok(Vec::new());
        }

        if self.nesting > 0 {
            self.handle_definition(parsed);
            return Ok(Vec::new());
        }

        self.expand(parsed)
    }

    fn handle_definition(&mut self, parsed: RawLine) {
        match self.state() {
            State::Meta => {
                self.def_stack.push(MacroDef {
                    name: parsed.op.to_string(),
                    params: parsed.args.iter().map(|s| s.to_string()).collect(),
                    body: Vec::new(),
                });
                self.state.0 = Some(State::Body);
            }
            State::Body => {
                if parsed.op == "MEND" {
                    // `nesting > 0` is the caller's guarantee that a
                    // definition is in progress.
                    let def = self.def_stack.pop().expect("nesting implies a def_stack entry");
                    self.macros.insert(
                        def.name,
                        Macro {
                            params: def.params,
                            body: def.body,
                        },
                    );
                    self.nesting -= 1;
                    self.state.0 = Some(if self.nesting == 0 {
                        State::Ground
                    } else {
                        State::Body
                    });
                } else if let Some(def) = self.def_stack.last_mut() {
                    def.body.push(parsed.raw.to_string());
                }
            }
            State::Ground => unreachable!("nesting > 0 implies not Ground"),
        }
    }

    /// Expands a macro invocation and re-feeds each expanded line back
    /// through `process_line`, which is how a macro body invoking
    /// another macro gets resolved — nesting falls out of the recursion
    /// rather than needing its own bookkeeping.
    fn expand(&mut self, parsed: RawLine) -> Result<Vec<String>, MacroError> {
        let Some(def) = self.macros.get(parsed.op).cloned() else {
            return Ok(vec![parsed.raw.to_string()]);
        };

        if parsed.args.len() != def.params.len() {
            return Err(MacroError::ArityMismatch {
                name: parsed.op.to_string(),
                expected: def.params.len(),
                found: parsed.args.len(),
            });
        }

        let substitutions: HashMap<&str, &str> = def
            .params
            .iter()
            .map(|s| s.as_str())
            .zip(parsed.args.iter().copied())
            .collect();

        let mut expansion = Vec::with_capacity(def.body.len() + 1);
        if let Some(label) = parsed.label {
            expansion.push(format!("{label}:"));
        }
        for body_line in &def.body {
            let substituted: Vec<&str> = body_line
                .split_whitespace()
                .map(|tok| *substitutions.get(tok).unwrap_or(&tok))
                .collect();
            expansion.push(substituted.join(" "));
        }

        let mut out = Vec::new();
        for line in expansion {
            out.extend(self.process_line(&line)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand_all(proc: &mut MacroProcessor, source: &str) -> Result<Vec<String>, MacroError> {
        let mut out = Vec::new();
        for line in source.lines() {
            out.extend(proc.process_line(line)?);
        }
        Ok(out)
    }

    #[test]
    fn defines_and_expands_a_macro() {
        let mut proc = MacroProcessor::new();
        let source = "MACRO\ndouble n\nadd n\nadd n\nMEND\nstart: double 5\nstop\n";
        let out = expand_all(&mut proc, source).unwrap();
        assert_eq!(out, vec!["start:", "add 5", "add 5", "stop"]);
    }

    #[test]
    fn preserves_label_on_first_expanded_line() {
        let mut proc = MacroProcessor::new();
        expand_all(&mut proc, "MACRO\nnop1\nadd 0\nMEND\n").unwrap();
        let out = proc.process_line("here: nop1").unwrap();
        assert_eq!(out, vec!["here:", "add 0"]);
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let mut proc = MacroProcessor::new();
        expand_all(&mut proc, "MACRO\nneeds_one a\nadd a\nMEND\n").unwrap();
        let err = proc.process_line("needs_one 1, 2").unwrap_err();
        assert!(matches!(err, MacroError::ArityMismatch { .. }));
    }

    #[test]
    fn mend_without_macro_is_an_error() {
        let mut proc = MacroProcessor::new();
        let err = proc.process_line("MEND").unwrap_err();
        assert_eq!(err, MacroError::MendWithoutMacro);
    }

    #[test]
    fn nested_macro_invocation_expands_fully() {
        let mut proc = MacroProcessor::new();
        let source = "MACRO\ninner n\nadd n\nMEND\nMACRO\nouter n\ninner n\nsub n\nMEND\n";
        expand_all(&mut proc, source).unwrap();
        let out = proc.process_line("outer 3").unwrap();
        assert_eq!(out, vec!["add 3", "sub 3"]);
    }

    #[test]
    fn non_macro_lines_pass_through_unchanged() {
        let mut proc = MacroProcessor::new();
        let out = proc.process_line("loop: br loop ; spin").unwrap();
        assert_eq!(out, vec!["loop: br loop ; spin"]);
    }
}
