// (C) Copyright 2024-2025 Minbase Developers

use serde::Serialize;

use crate::mappings::{Distro, Manager};
use crate::shell::ShellCommand;

/// Structured fields of a `RUN` instruction.
///
/// The distro, manager and package list are filled in by conversion when
/// a package-manager invocation is recognized; `after` holds the
/// rewritten shell command and is absent unless a rewrite occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunDetails {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub distro: Option<Distro>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub manager: Option<Manager>,

  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub packages: Vec<String>,

  /// The command as parsed from the source document.
  #[serde(skip)]
  pub before: ShellCommand,

  /// The command after rewriting, if any rewrite occurred.
  #[serde(skip)]
  pub after: Option<ShellCommand>
}

impl RunDetails {
  /// Parses the command text of a `RUN` instruction. Returns `None` for
  /// blank or comment-only bodies.
  pub(crate) fn parse(text: &str) -> Option<RunDetails> {
    ShellCommand::parse(text).map(|before| RunDetails {
      distro: None,
      manager: None,
      packages: Vec::new(),
      before,
      after: None
    })
  }
}
