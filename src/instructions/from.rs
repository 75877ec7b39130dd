// (C) Copyright 2024-2025 Minbase Developers

use std::collections::HashMap;

use serde::Serialize;

use crate::image::split_tag;
use crate::instructions::is_false;

/// Structured fields of a `FROM` instruction.
///
/// `orig` keeps the unparsed image reference exactly as written so that
/// custom rewrite hooks can see the user's spelling. `parent` is set when
/// the base name matches the alias of an earlier build stage; such
/// instructions reference a sibling stage rather than an external image
/// and are never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FromDetails {
  pub base: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub tag: Option<String>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub digest: Option<String>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub alias: Option<String>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub parent: Option<usize>,

  /// True when the base name contains an unresolved variable reference.
  #[serde(skip_serializing_if = "is_false")]
  pub base_dynamic: bool,

  /// True when the tag contains an unresolved variable reference.
  #[serde(skip_serializing_if = "is_false")]
  pub tag_dynamic: bool,

  pub orig: String
}

impl FromDetails {
  /// Extracts the structured fields from the argument text of a `FROM`
  /// instruction. `stage_aliases` maps lowercased aliases of previously
  /// seen stages to their stage index; the current instruction's alias
  /// must not yet be present, so a stage cannot become its own parent.
  pub(crate) fn parse(text: &str, stage_aliases: &HashMap<String, usize>) -> FromDetails {
    let text = text.trim();

    // split off a case-insensitive " AS <alias>" clause, preserving case
    // on both sides
    let upper = text.to_ascii_uppercase();
    let (image_part, alias) = match upper.find(" AS ") {
      Some(pos) => (
        text[..pos].trim(),
        Some(text[pos + 4..].trim().to_string())
      ),
      None => (text, None)
    };

    let orig = image_part.to_string();

    let (image_part, digest) = match image_part.find('@') {
      Some(at) => (
        &image_part[..at],
        Some(image_part[at + 1..].to_string())
      ),
      None => (image_part, None)
    };

    let (base, tag) = split_tag(image_part);
    let base = base.to_string();
    let tag = tag.map(String::from);

    let parent = stage_aliases.get(&base.to_lowercase()).copied();

    FromDetails {
      base_dynamic: base.contains('$'),
      tag_dynamic: tag.as_deref().map_or(false, |t| t.contains('$')),
      base,
      tag,
      digest,
      alias,
      parent,
      orig
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(text: &str) -> FromDetails {
    FromDetails::parse(text, &HashMap::new())
  }

  #[test]
  fn from_basic() {
    assert_eq!(parse("alpine:3.10"), FromDetails {
      base: "alpine".into(),
      tag: Some("3.10".into()),
      digest: None,
      alias: None,
      parent: None,
      base_dynamic: false,
      tag_dynamic: false,
      orig: "alpine:3.10".into()
    });
  }

  #[test]
  fn from_alias_case_preserved() {
    let details = parse("ubuntu:22.04 as Builder");
    assert_eq!(details.base, "ubuntu");
    assert_eq!(details.alias.as_deref(), Some("Builder"));
    assert_eq!(details.orig, "ubuntu:22.04");
  }

  #[test]
  fn from_digest() {
    let details = parse("node@sha256:deadbeef");
    assert_eq!(details.base, "node");
    assert_eq!(details.tag, None);
    assert_eq!(details.digest.as_deref(), Some("sha256:deadbeef"));
  }

  #[test]
  fn from_registry_port_is_not_a_tag() {
    let details = parse("example.com:5000/team/app");
    assert_eq!(details.base, "example.com:5000/team/app");
    assert_eq!(details.tag, None);

    let details = parse("example.com:5000/team/app:v2");
    assert_eq!(details.base, "example.com:5000/team/app");
    assert_eq!(details.tag.as_deref(), Some("v2"));
  }

  #[test]
  fn from_parent_reference() {
    let mut aliases = HashMap::new();
    aliases.insert("builder".to_string(), 1);

    let details = FromDetails::parse("Builder", &aliases);
    assert_eq!(details.parent, Some(1));

    // an alias declared by the same instruction is not a parent
    let details = FromDetails::parse("external AS external", &HashMap::new());
    assert_eq!(details.parent, None);
  }

  #[test]
  fn from_dynamic_flags() {
    let details = parse("$BASE_IMAGE");
    assert!(details.base_dynamic);
    assert!(!details.tag_dynamic);

    let details = parse("node:${NODE_VERSION}");
    assert!(!details.base_dynamic);
    assert!(details.tag_dynamic);
  }
}
