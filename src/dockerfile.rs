// (C) Copyright 2024-2025 Minbase Developers

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{BufReader, Read};
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use snafu::ResultExt;

use crate::error::*;
use crate::instructions::{ArgDetails, FromDetails, RunDetails};

pub(crate) const DIRECTIVE_FROM: &str = "FROM";
pub(crate) const DIRECTIVE_RUN: &str = "RUN";
pub(crate) const DIRECTIVE_ARG: &str = "ARG";
pub(crate) const DIRECTIVE_USER: &str = "USER";
pub(crate) const KEYWORD_AS: &str = "AS";

/// The directive-specific payload of an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Details {
  From(FromDetails),
  Run(RunDetails),
  Arg(ArgDetails)
}

/// A single logical Dockerfile instruction, possibly spanning several
/// physical lines.
///
/// `raw` preserves the source text verbatim; `converted` is populated at
/// most once by conversion and takes precedence on output. `trivia`
/// carries the comments and blank lines immediately preceding the
/// instruction, reproduced verbatim by the serializer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
  pub raw: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub converted: Option<String>,

  #[serde(skip_serializing_if = "String::is_empty")]
  pub trivia: String,

  /// The 1-based build stage this instruction belongs to; 0 before the
  /// first `FROM`.
  pub stage: usize,

  #[serde(flatten)]
  pub details: Option<Details>
}

impl Instruction {
  pub fn from_details(&self) -> Option<&FromDetails> {
    match &self.details {
      Some(Details::From(details)) => Some(details),
      _ => None
    }
  }

  pub fn run_details(&self) -> Option<&RunDetails> {
    match &self.details {
      Some(Details::Run(details)) => Some(details),
      _ => None
    }
  }

  pub fn arg_details(&self) -> Option<&ArgDetails> {
    match &self.details {
      Some(Details::Arg(details)) => Some(details),
      _ => None
    }
  }

  pub(crate) fn arg_details_mut(&mut self) -> Option<&mut ArgDetails> {
    match &mut self.details {
      Some(Details::Arg(details)) => Some(details),
      _ => None
    }
  }
}

/// A parsed Dockerfile.
///
/// Parsing is best-effort and never fails: unrecognized or malformed
/// directives become payload-free instructions that round-trip
/// unchanged. The `Display` impl reproduces the source byte-for-byte
/// when nothing was converted.
///
/// # Example
/// ```
/// use dockerfile_converter::Dockerfile;
///
/// let dockerfile = Dockerfile::parse(concat!(
///   "FROM golang:1.22 AS build\n",
///   "RUN make\n",
///   "\n",
///   "FROM build\n",
/// ));
///
/// let from = dockerfile.instructions[0].from_details().unwrap();
/// assert_eq!(from.base, "golang");
/// assert_eq!(from.tag.as_deref(), Some("1.22"));
///
/// // the second FROM references the `build` stage, not an external image
/// let from = dockerfile.instructions[2].from_details().unwrap();
/// assert_eq!(from.parent, Some(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dockerfile {
  pub instructions: Vec<Instruction>
}

impl Dockerfile {
  /// Parses a Dockerfile from a string.
  pub fn parse(input: &str) -> Dockerfile {
    parse_document(input)
  }

  /// Parses a Dockerfile from a reader.
  pub fn from_reader<R>(reader: R) -> Result<Dockerfile>
  where
    R: Read
  {
    let mut buf = String::new();
    let mut buf_reader = BufReader::new(reader);
    buf_reader.read_to_string(&mut buf).context(ReadError)?;

    Ok(Dockerfile::parse(&buf))
  }

  /// The set of stages containing at least one `RUN` directive.
  pub(crate) fn stages_with_run_commands(&self) -> HashSet<usize> {
    self.instructions
      .iter()
      .filter(|ins| directive_argument(ins.raw.trim(), DIRECTIVE_RUN).is_some())
      .map(|ins| ins.stage)
      .collect()
  }
}

impl fmt::Display for Dockerfile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, ins) in self.instructions.iter().enumerate() {
      f.write_str(&ins.trivia)?;

      if let Some(converted) = &ins.converted {
        f.write_str(converted)?;
        f.write_str("\n")?;
      } else if !ins.raw.is_empty() {
        f.write_str(&ins.raw)?;

        if i < self.instructions.len() - 1 {
          f.write_str("\n")?;
        }
      }
    }

    Ok(())
  }
}

impl FromStr for Dockerfile {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Dockerfile::parse(s))
  }
}

/// Returns the argument text of `line` when it begins with `directive`
/// followed by whitespace, matched case-insensitively.
pub(crate) fn directive_argument<'a>(line: &'a str, directive: &str) -> Option<&'a str> {
  let bytes = line.as_bytes();
  let len = directive.len();

  if bytes.len() <= len || !bytes[..len].eq_ignore_ascii_case(directive.as_bytes()) {
    return None;
  }

  if !bytes[len].is_ascii_whitespace() {
    return None;
  }

  Some(line[len..].trim_start())
}

/// Drops the trailing continuation backslash from a physical line.
fn strip_continuation(line: &str) -> &str {
  let line = line.trim_end();
  line.strip_suffix('\\').unwrap_or(line)
}

fn parse_document(input: &str) -> Dockerfile {
  let mut instructions: Vec<Instruction> = Vec::new();

  // `raw` accumulates the instruction bytes verbatim; `assembled` drops
  // continuation backslashes (keeping the newlines) and is what the
  // directive-specific extractors see
  let mut raw = String::new();
  let mut assembled = String::new();
  let mut trivia = String::new();
  let mut in_continuation = false;

  let mut stage = 0;
  let mut stage_aliases: HashMap<String, usize> = HashMap::new();

  fn flush(
    instructions: &mut Vec<Instruction>,
    raw: &mut String,
    assembled: &mut String,
    trivia: &mut String,
    stage: &mut usize,
    stage_aliases: &mut HashMap<String, usize>
  ) {
    if raw.is_empty() {
      return;
    }

    let raw = std::mem::take(raw);
    let assembled = std::mem::take(assembled);
    let trivia = std::mem::take(trivia);
    let trimmed = assembled.trim();

    let details = if let Some(rest) = directive_argument(trimmed, DIRECTIVE_FROM) {
      *stage += 1;

      let details = FromDetails::parse(rest, stage_aliases);
      if let Some(alias) = &details.alias {
        stage_aliases.insert(alias.to_lowercase(), *stage);
      }

      Some(Details::From(details))
    } else if let Some(rest) = directive_argument(trimmed, DIRECTIVE_ARG) {
      Some(Details::Arg(ArgDetails::parse(rest)))
    } else if let Some(rest) = directive_argument(trimmed, DIRECTIVE_RUN) {
      RunDetails::parse(rest).map(Details::Run)
    } else {
      None
    };

    instructions.push(Instruction {
      raw,
      converted: None,
      trivia,
      stage: *stage,
      details
    });
  }

  for line in input.split('\n') {
    let trimmed = line.trim();
    let blank_or_comment = trimmed.is_empty() || trimmed.starts_with('#');

    if !in_continuation {
      if blank_or_comment {
        trivia.push_str(line);
        trivia.push('\n');
      } else if trimmed.ends_with('\\') {
        in_continuation = true;
        raw.push_str(line);
        raw.push('\n');
        assembled.push_str(strip_continuation(line));
        assembled.push('\n');
      } else {
        raw.push_str(line);
        assembled.push_str(line);
        flush(&mut instructions, &mut raw, &mut assembled, &mut trivia, &mut stage, &mut stage_aliases);
      }
    } else if blank_or_comment {
      // preserved in the instruction body; the continuation stays open
      raw.push_str(line);
      raw.push('\n');
      assembled.push_str(line);
      assembled.push('\n');
    } else if trimmed.ends_with('\\') {
      raw.push_str(line);
      raw.push('\n');
      assembled.push_str(strip_continuation(line));
      assembled.push('\n');
    } else {
      in_continuation = false;
      raw.push_str(line);
      assembled.push_str(line);
      flush(&mut instructions, &mut raw, &mut assembled, &mut trivia, &mut stage, &mut stage_aliases);
    }
  }

  if in_continuation {
    flush(&mut instructions, &mut raw, &mut assembled, &mut trivia, &mut stage, &mut stage_aliases);
  }

  // trailing comments and blank lines become a final trivia-only
  // instruction so the serializer reproduces them
  if !trivia.is_empty() {
    let trailing = trivia.strip_suffix('\n').unwrap_or(&trivia).to_string();

    instructions.push(Instruction {
      raw: trailing,
      converted: None,
      trivia: String::new(),
      stage,
      details: None
    });
  }

  mark_args_used_as_base(&mut instructions);

  Dockerfile { instructions }
}

lazy_static! {
  /// A base image that is exactly one variable reference.
  static ref BASE_VAR: Regex =
    Regex::new(r"^\$(?:([A-Za-z0-9_]+)|\{([A-Za-z0-9_]+)\})$").unwrap();
}

/// Marks every ARG declaration whose name is later used, verbatim, as a
/// base-image name.
fn mark_args_used_as_base(instructions: &mut [Instruction]) {
  let mut used: Vec<String> = Vec::new();

  for ins in instructions.iter() {
    if let Some(from) = ins.from_details() {
      if !from.base_dynamic {
        continue;
      }

      if let Some(caps) = BASE_VAR.captures(&from.base) {
        if let Some(name) = caps.get(1).or_else(|| caps.get(2)) {
          used.push(name.as_str().to_string());
        }
      }
    }
  }

  for ins in instructions.iter_mut() {
    if let Some(arg) = ins.arg_details_mut() {
      if used.iter().any(|name| *name == arg.name) {
        arg.used_as_base = true;
      }
    }
  }
}
