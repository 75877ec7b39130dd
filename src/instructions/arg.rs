// (C) Copyright 2024-2025 Minbase Developers

use serde::Serialize;

use enquote::unquote;

use crate::instructions::is_false;

/// Structured fields of an `ARG` instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgDetails {
  /// The argument name.
  pub name: String,

  /// An optional default value.
  ///
  /// This may be unset when the value is expected to be supplied at
  /// build time.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub default_value: Option<String>,

  /// True when the document later uses this variable, verbatim, as a
  /// base-image name. Set by a document-wide pass after parsing, not at
  /// extraction time.
  #[serde(skip_serializing_if = "is_false")]
  pub used_as_base: bool
}

impl ArgDetails {
  /// Extracts the name and default value from the argument text of an
  /// `ARG` instruction (split on the first `=`).
  pub(crate) fn parse(text: &str) -> ArgDetails {
    let mut parts = text.trim().splitn(2, '=');
    let name = parts.next().unwrap_or("").trim().to_string();
    let default_value = parts.next().map(|value| unquote_value(value.trim()));

    ArgDetails {
      name,
      default_value,
      used_as_base: false
    }
  }
}

/// Unquotes a quoted default value, leaving bare values untouched.
fn unquote_value(value: &str) -> String {
  if value.starts_with('"') || value.starts_with('\'') {
    unquote(value).unwrap_or_else(|_| value.to_string())
  } else {
    value.to_string()
  }
}
