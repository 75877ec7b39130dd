// (C) Copyright 2024-2025 Minbase Developers

use std::fmt;

/// A shell control operator separating two commands in a `RUN` body.
///
/// Two-character operators are matched before their single-character
/// prefixes, so `&&` is never split into two `&`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
  /// `&&`
  And,
  /// `||`
  Or,
  /// `;`
  Semi,
  /// `|`
  Pipe,
  /// `&`
  Background
}

impl Delimiter {
  pub fn as_str(&self) -> &'static str {
    match self {
      Delimiter::And => "&&",
      Delimiter::Or => "||",
      Delimiter::Semi => ";",
      Delimiter::Pipe => "|",
      Delimiter::Background => "&"
    }
  }
}

impl fmt::Display for Delimiter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A single sub-command within a shell command.
///
/// `extra_pre` carries any leading environment-variable assignments
/// (`FOO=bar`) verbatim; `delimiter` is the control operator *following*
/// this part, and is `None` only on the final part of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShellPart {
  pub extra_pre: Option<String>,
  pub command: String,
  pub args: Vec<String>,
  pub delimiter: Option<Delimiter>
}

impl fmt::Display for ShellPart {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(pre) = &self.extra_pre {
      write!(f, "{} ", pre)?;
    }

    f.write_str(&self.command)?;

    if !self.args.is_empty() {
      write!(f, " {}", self.args.join(" "))?;
    }

    if let Some(delimiter) = &self.delimiter {
      write!(f, " {}", delimiter)?;
    }

    Ok(())
  }
}

/// Joins the parts of a multi-part command on output.
pub(crate) const PART_SEPARATOR: &str = " \\\n    ";

/// A parsed shell command: an ordered sequence of sub-commands joined by
/// control operators.
///
/// Parsing is deliberately shallow: it splits top-level sub-commands and
/// tokenizes their arguments, tracking quotes, parentheses, backticks and
/// `$(...)` subshells only far enough to avoid splitting inside them. The
/// `Display` impl reproduces the command up to whitespace normalization
/// and comment removal:
///
/// ```
/// use dockerfile_converter::ShellCommand;
///
/// let cmd = ShellCommand::parse("apt-get update &&   apt-get install -y curl").unwrap();
/// assert_eq!(cmd.parts.len(), 2);
/// assert_eq!(cmd.parts[1].args, vec!["install", "-y", "curl"]);
/// assert_eq!(
///   cmd.to_string(),
///   "apt-get update && \\\n    apt-get install -y curl"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShellCommand {
  pub parts: Vec<ShellPart>
}

impl ShellCommand {
  /// Parses a command string into its top-level parts.
  ///
  /// Returns `None` if the input is blank or contains only comments.
  pub fn parse(raw: &str) -> Option<ShellCommand> {
    if raw.trim().is_empty() {
      return None;
    }

    let cleaned = strip_comments(raw);
    if cleaned.is_empty() {
      return None;
    }

    let mut parts = Vec::new();
    let mut remaining = cleaned.as_str();

    while !remaining.is_empty() {
      match next_delimiter(remaining) {
        None => {
          parts.push(parse_part(remaining, None));
          break;
        },
        Some((pos, delimiter)) => {
          parts.push(parse_part(&remaining[..pos], Some(delimiter)));
          remaining = remaining[pos + delimiter.as_str().len()..].trim_start();
        }
      }
    }

    Some(ShellCommand { parts })
  }
}

impl fmt::Display for ShellCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.parts.is_empty() {
      return f.write_str("true");
    }

    for (i, part) in self.parts.iter().enumerate() {
      if i != 0 {
        f.write_str(PART_SEPARATOR)?;
      }

      write!(f, "{}", part)?;
    }

    Ok(())
  }
}

/// Quote/grouping state shared by the splitter and the tokenizer.
///
/// All state characters are ASCII, so scanning bytes is safe: UTF-8
/// continuation bytes never match any of them.
#[derive(Default)]
struct QuoteState {
  in_single: bool,
  in_double: bool,
  paren_depth: usize,
  in_backtick: bool,
  subshell_depth: usize
}

impl QuoteState {
  /// Advances the tracker over the byte at `i` and returns the index of
  /// the next byte to examine (`$(` consumes two bytes).
  fn advance(&mut self, bytes: &[u8], i: usize) -> usize {
    match bytes[i] {
      b'\'' if !self.in_double => self.in_single = !self.in_single,
      b'"' if !self.in_single => self.in_double = !self.in_double,
      _ if self.in_single || self.in_double => (),
      b'(' => self.paren_depth += 1,
      b')' if self.paren_depth > 0 => self.paren_depth -= 1,
      b')' if self.subshell_depth > 0 => self.subshell_depth -= 1,
      b'`' => self.in_backtick = !self.in_backtick,
      b'$' if i + 1 < bytes.len() && bytes[i + 1] == b'(' => {
        self.subshell_depth += 1;
        return i + 2;
      },
      _ => ()
    }

    i + 1
  }

  fn in_quotes(&self) -> bool {
    self.in_single || self.in_double
  }

  fn at_top_level(&self) -> bool {
    !self.in_single && !self.in_double
      && self.paren_depth == 0
      && !self.in_backtick
      && self.subshell_depth == 0
  }
}

/// Strips comments and re-joins continuation lines.
///
/// A `#` begins a comment only outside single and double quotes; a
/// trailing backslash joins the next physical line with a single space.
fn strip_comments(input: &str) -> String {
  let lines: Vec<&str> = input.split('\n').collect();
  let mut result = String::new();

  for (i, line) in lines.iter().enumerate() {
    let mut in_single = false;
    let mut in_double = false;
    let mut comment_pos = None;

    for (j, b) in line.bytes().enumerate() {
      match b {
        b'\'' if !in_double => in_single = !in_single,
        b'"' if !in_single => in_double = !in_double,
        b'#' if !in_single && !in_double => {
          comment_pos = Some(j);
          break;
        },
        _ => ()
      }
    }

    let processed = match comment_pos {
      Some(pos) => line[..pos].trim(),
      None => line.trim()
    };

    if processed.is_empty() {
      continue;
    }

    match processed.strip_suffix('\\') {
      Some(stripped) if i < lines.len() - 1 => {
        result.push_str(stripped.trim());
        result.push(' ');
      },
      _ => {
        result.push_str(processed);
        result.push(' ');
      }
    }
  }

  result.trim().to_string()
}

/// Finds the next control operator outside quotes, parentheses, backticks
/// and subshells. Operators are checked in the order `&& || ; | &`.
fn next_delimiter(cmd: &str) -> Option<(usize, Delimiter)> {
  let bytes = cmd.as_bytes();
  let mut state = QuoteState::default();
  let mut i = 0;

  while i < bytes.len() {
    if !state.in_quotes() && bytes[i] == b'#' {
      break;
    }

    if state.at_top_level() {
      let delimiter = if bytes[i..].starts_with(b"&&") {
        Some(Delimiter::And)
      } else if bytes[i..].starts_with(b"||") {
        Some(Delimiter::Or)
      } else if bytes[i] == b';' {
        Some(Delimiter::Semi)
      } else if bytes[i] == b'|' {
        Some(Delimiter::Pipe)
      } else if bytes[i] == b'&' {
        Some(Delimiter::Background)
      } else {
        None
      };

      if let Some(delimiter) = delimiter {
        return Some((i, delimiter));
      }
    }

    i = state.advance(bytes, i);
  }

  None
}

/// Parses one delimiter-free span into a `ShellPart`.
fn parse_part(chunk: &str, delimiter: Option<Delimiter>) -> ShellPart {
  let chunk = chunk.trim();

  // a parenthesized group is an opaque single command
  if chunk.starts_with('(') && chunk.ends_with(')') {
    return ShellPart {
      extra_pre: None,
      command: chunk.to_string(),
      args: Vec::new(),
      delimiter
    };
  }

  let tokens = tokenize(chunk);
  if tokens.is_empty() {
    return ShellPart {
      extra_pre: None,
      command: String::new(),
      args: Vec::new(),
      delimiter
    };
  }

  match tokens.iter().position(|t| !is_env_assignment(t)) {
    // every token is an assignment; treat the whole span as the command
    None => ShellPart {
      extra_pre: None,
      command: tokens.join(" "),
      args: Vec::new(),
      delimiter
    },
    Some(index) => ShellPart {
      extra_pre: if index > 0 {
        Some(tokens[..index].join(" "))
      } else {
        None
      },
      command: tokens[index].clone(),
      args: tokens[index + 1..].to_vec(),
      delimiter
    }
  }
}

/// Splits a span on unquoted whitespace, keeping whitespace literally
/// inside any open quote, parenthesis, backtick or subshell.
fn tokenize(cmd: &str) -> Vec<String> {
  let bytes = cmd.as_bytes();
  let mut tokens = Vec::new();
  let mut state = QuoteState::default();
  let mut start: Option<usize> = None;
  let mut i = 0;

  while i < bytes.len() {
    if (bytes[i] == b' ' || bytes[i] == b'\t') && state.at_top_level() {
      if let Some(s) = start.take() {
        tokens.push(cmd[s..i].to_string());
      }

      i += 1;
      continue;
    }

    if start.is_none() {
      start = Some(i);
    }

    i = state.advance(bytes, i);
  }

  if let Some(s) = start {
    tokens.push(cmd[s..].to_string());
  }

  tokens
}

/// An environment-variable assignment is `NAME=value` with at least one
/// character before the `=`.
fn is_env_assignment(token: &str) -> bool {
  match token.find('=') {
    Some(pos) => pos > 0,
    None => false
  }
}
