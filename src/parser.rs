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

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;

use crate::ast::{AssemblyLine, Operand};
use crate::errors::AssemblyError;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct LineParser;

/// Parses macro-expanded source text into a flat list of lines, skipping
/// ones with neither a label nor an operation (pure blanks).
pub fn parse_program(source: &str) -> Result<Vec<AssemblyLine>, AssemblyError> {
    let pairs = LineParser::parse(Rule::program, source)
        .map_err(|e| AssemblyError::PestError(Box::new(e)))?;

    let mut lines = Vec::new();
    for pair in pairs.flatten().filter(|p| p.as_rule() == Rule::line) {
        let line_number = pair.as_span().start_pos().line_col().0;
        let line = build_line(pair, line_number)?;
        if line.label.is_some() || line.op.is_some() {
            lines.push(line);
        }
    }
    Ok(lines)
}

fn build_line(pair: Pair<Rule>, line_number: usize) -> Result<AssemblyLine, AssemblyError> {
    let mut line = AssemblyLine {
        line_number,
        ..Default::default()
    };

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::label => {
                let name = inner.into_inner().next().unwrap();
                line.label = Some(name.as_str().to_string());
            }
            Rule::statement => {
                let mut parts = inner.into_inner();
                let op = parts.next().unwrap();
                line.op = Some(op.as_str().to_string());
                for operand_pair in parts {
                    line.args.push(build_operand(operand_pair, line_number)?);
                }
            }
            _ => {}
        }
    }
    Ok(line)
}

fn build_operand(pair: Pair<Rule>, line_number: usize) -> Result<Operand, AssemblyError> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::integer => Ok(Operand::Integer(parse_integer(inner.as_str(), line_number)?)),
        Rule::ident => Ok(Operand::Ident(inner.as_str().to_string())),
        rule => unreachable!("operand cannot contain {rule:?}"),
    }
}

/// Parses an integer literal in decimal, `0x`, `0o` or `0b` form, per the
/// grammar's `integer` rule.
pub fn parse_integer(text: &str, line_number: usize) -> Result<i64, AssemblyError> {
    let (digits, radix) = if let Some(rest) = text.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = text.strip_prefix("0o") {
        (rest, 8)
    } else if let Some(rest) = text.strip_prefix("0b") {
        (rest, 2)
    } else {
        (text, 10)
    };
    i64::from_str_radix(digits, radix).map_err(|_| AssemblyError::InvalidNumber {
        line: line_number,
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_label_instruction_and_comment() {
        let lines = parse_program("start: load 5 ; load the constant\nstop\n").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].label.as_deref(), Some("start"));
        assert_eq!(lines[0].op.as_deref(), Some("load"));
        assert_eq!(lines[0].args, vec![Operand::Integer(5)]);
        assert_eq!(lines[1].op.as_deref(), Some("stop"));
        assert!(lines[1].label.is_none());
    }

    #[test]
    fn parses_two_operand_instruction() {
        let lines = parse_program("copy R0 ACC\n").unwrap();
        assert_eq!(lines[0].op.as_deref(), Some("copy"));
        assert_eq!(
            lines[0].args,
            vec![
                Operand::Ident("R0".to_string()),
                Operand::Ident("ACC".to_string())
            ]
        );
    }

    #[test]
    fn parses_hex_octal_and_binary_literals() {
        let lines = parse_program("const 0xFF\nconst 0o17\nconst 0b101\n").unwrap();
        assert_eq!(lines[0].args, vec![Operand::Integer(0xFF)]);
        assert_eq!(lines[1].args, vec![Operand::Integer(0o17)]);
        assert_eq!(lines[2].args, vec![Operand::Integer(0b101)]);
    }

    #[test]
    fn label_only_line_has_no_op() {
        let lines = parse_program("loop:\nbr loop\n").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].label.as_deref(), Some("loop"));
        assert!(lines[0].op.is_none());
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(parse_program("load 5 5 5 5\n@@@\n").is_err());
    }
}
