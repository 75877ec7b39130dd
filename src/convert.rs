// (C) Copyright 2024-2025 Minbase Developers

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::adduser::{convert_groupadd, convert_useradd, CMD_GROUPADD, CMD_USERADD, SHADOW_PACKAGE};
use crate::dockerfile::{
  directive_argument, Details, Dockerfile, Instruction, DIRECTIVE_ARG, DIRECTIVE_FROM,
  DIRECTIVE_RUN, DIRECTIVE_USER, KEYWORD_AS
};
use crate::error::*;
use crate::image::{basename, dockerhub_variants, normalize_image_name, split_tag};
use crate::instructions::{ArgDetails, FromDetails, RunDetails};
use crate::mappings::{Distro, Manager, MappingsConfig, PackageManagerInfo, PACKAGE_MANAGERS};
use crate::shell::{ShellCommand, ShellPart};
use crate::tar::{convert_gnu_tar, CMD_TAR};

/// Default registry domain for converted image references.
pub const DEFAULT_REGISTRY_DOMAIN: &str = "minbase.dev";

/// Placeholder organization used when none is configured.
pub const DEFAULT_ORG: &str = "ORG";

/// Suffix selecting the image variant that carries build and shell
/// tooling; applied only to stages that run commands.
pub const DEV_TAG_SUFFIX: &str = "-dev";

/// The generic minimal base image. Always pinned to `latest` and never
/// dev-suffixed.
pub const GENERIC_BASE_IMAGE: &str = "minbase";

/// The privileged user inserted ahead of rewritten RUN instructions.
pub const ROOT_USER: &str = "root";

/// The target package manager and its install invocation.
pub const TARGET_PACKAGE_MANAGER: &str = "apk";
pub(crate) const TARGET_INSTALL_ARGS: [&str; 2] = ["add", "--no-cache"];

/// Customizes the replacement reference for a base-image directive.
///
/// The hook receives the parsed details (including the reference exactly
/// as the user wrote it, in `orig`), the engine's proposed replacement,
/// and whether the enclosing stage contains any RUN directive. It
/// returns the image reference to use — not the full FROM line; `AS`
/// clauses are handled by the engine. A closure with the matching
/// signature can be used directly:
///
/// ```
/// use dockerfile_converter::*;
///
/// let options = Options {
///   from_line_converter: Some(Box::new(
///     |from: &FromDetails, proposed: &str, _stage_has_run: bool| -> Result<String> {
///       if from.base == "python" {
///         Ok(format!("registry.example.com/python:{}", from.tag.as_deref().unwrap_or("latest")))
///       } else {
///         Ok(proposed.to_string())
///       }
///     }
///   )),
///   ..Options::default()
/// };
/// # let _ = options;
/// ```
///
/// A hook error is local to the instruction: its conversion reverts to
/// the original text and the rest of the document proceeds.
pub trait FromLineConverter {
  fn convert_from(&self, from: &FromDetails, proposed: &str, stage_has_run: bool) -> Result<String>;
}

impl<F> FromLineConverter for F
where
  F: Fn(&FromDetails, &str, bool) -> Result<String>
{
  fn convert_from(&self, from: &FromDetails, proposed: &str, stage_has_run: bool) -> Result<String> {
    self(from, proposed, stage_has_run)
  }
}

/// Customizes the replacement for a RUN instruction.
///
/// The hook receives the run details with any detected
/// distro/manager/package information filled in, the engine's proposed
/// full line (the unmodified raw text when the engine made no rewrite),
/// and the stage index. It returns the full replacement line. Errors
/// follow the same local-fallback policy as [`FromLineConverter`].
pub trait RunLineConverter {
  fn convert_run(&self, run: &RunDetails, proposed: &str, stage: usize) -> Result<String>;
}

impl<F> RunLineConverter for F
where
  F: Fn(&RunDetails, &str, usize) -> Result<String>
{
  fn convert_run(&self, run: &RunDetails, proposed: &str, stage: usize) -> Result<String> {
    self(run, proposed, stage)
  }
}

/// Configuration for a conversion.
pub struct Options {
  /// Organization inserted into converted references; defaults to the
  /// `ORG` placeholder.
  pub organization: Option<String>,

  /// When set, replaces the whole `registry/organization` prefix.
  pub registry: Option<String>,

  /// Mappings merged on top of the built-in document (extra entries win
  /// on collision).
  pub extra_mappings: MappingsConfig,

  /// When true, ignore the built-in mappings entirely and use only
  /// `extra_mappings`.
  pub no_builtin: bool,

  pub from_line_converter: Option<Box<dyn FromLineConverter>>,
  pub run_line_converter: Option<Box<dyn RunLineConverter>>
}

impl Default for Options {
  fn default() -> Options {
    Options {
      organization: None,
      registry: None,
      extra_mappings: MappingsConfig::default(),
      no_builtin: false,
      from_line_converter: None,
      run_line_converter: None
    }
  }
}

impl Dockerfile {
  /// Applies the conversion and returns a new Dockerfile, leaving `self`
  /// untouched.
  ///
  /// Mapping-configuration problems surface before any instruction is
  /// converted; per-instruction rewrite failures (custom hook errors)
  /// revert that instruction to its original text without failing the
  /// call.
  ///
  /// # Example
  /// ```
  /// use dockerfile_converter::{Dockerfile, Options};
  ///
  /// let dockerfile = Dockerfile::parse(concat!(
  ///   "FROM node\n",
  ///   "RUN apt-get update && apt-get install -y nano\n",
  /// ));
  ///
  /// let converted = dockerfile.convert(&Options::default()).unwrap();
  /// assert_eq!(converted.to_string(), concat!(
  ///   "FROM minbase.dev/ORG/node:latest-dev\n",
  ///   "USER root\n",
  ///   "RUN apk add --no-cache nano\n",
  /// ));
  /// ```
  pub fn convert(&self, opts: &Options) -> Result<Dockerfile> {
    let mappings = if opts.no_builtin {
      opts.extra_mappings.clone()
    } else {
      MappingsConfig::builtin().merge(&opts.extra_mappings)
    };

    mappings.validate()?;

    let stages_with_run = self.stages_with_run_commands();

    // packages installed so far, per stage, in document order
    let mut stage_packages: HashMap<usize, Vec<String>> = HashMap::new();

    let mut instructions = Vec::with_capacity(self.instructions.len());

    for ins in &self.instructions {
      let mut new_ins = ins.clone();
      new_ins.converted = None;

      if let Some(from) = ins.from_details() {
        if should_convert_from(from) {
          new_ins.converted = Some(convert_from_line(
            ins,
            from,
            stages_with_run.contains(&ins.stage),
            &mappings,
            opts
          ));
        }
      } else if let Some(arg) = ins.arg_details() {
        if arg.used_as_base && arg.default_value.as_deref().map_or(false, |v| !v.is_empty()) {
          let (line, details) =
            convert_arg_line(ins, arg, &self.instructions, &stages_with_run, &mappings, opts);

          new_ins.converted = Some(line);
          new_ins.details = Some(Details::Arg(details));
        }
      } else if let Some(run) = ins.run_details() {
        let conversion = convert_package_manager_commands(&run.before, &mappings.packages);

        let stage_list = stage_packages.entry(ins.stage).or_insert_with(Vec::new);
        stage_list.extend(conversion.to_install.iter().cloned());

        let pm_shell = conversion.shell;
        let current = pm_shell.as_ref().unwrap_or(&run.before);
        let (busybox_modified, after) = convert_busybox_commands(current, stage_list);

        let mut details = RunDetails {
          distro: conversion.distro,
          manager: conversion.manager,
          packages: conversion.detected,
          before: run.before.clone(),
          after: None
        };

        let mut converted = None;
        if conversion.modified || busybox_modified {
          converted = Some(format!(
            "{} {}",
            original_keyword(&ins.raw, DIRECTIVE_RUN),
            after
          ));
          details.after = Some(after);
        }

        if let Some(hook) = &opts.run_line_converter {
          let proposed = converted.clone().unwrap_or_else(|| ins.raw.clone());

          match hook.convert_run(&details, &proposed, ins.stage) {
            Ok(text) => {
              converted = if text == ins.raw { None } else { Some(text) };
            },
            Err(_) => {
              // hook errors are local: this instruction reverts to its
              // original text
              converted = None;
              details.after = None;
            }
          }
        }

        new_ins.converted = converted;
        new_ins.details = Some(Details::Run(details));
      }

      instructions.push(new_ins);
    }

    add_user_root_directives(&mut instructions);

    Ok(Dockerfile { instructions })
  }
}

/// A FROM line is rewritten unless it names the empty base, builds on a
/// sibling stage, or its base contains an unresolved variable.
fn should_convert_from(from: &FromDetails) -> bool {
  from.base != "scratch" && from.parent.is_none() && !from.base_dynamic
}

/// Finds the original spelling of a directive keyword within raw
/// instruction text, defaulting to the canonical form.
fn original_keyword<'a>(raw: &'a str, directive: &'a str) -> &'a str {
  let trimmed = raw.trim_start();
  let len = directive.len();
  let bytes = trimmed.as_bytes();

  if bytes.len() >= len && bytes[..len].eq_ignore_ascii_case(directive.as_bytes()) {
    &trimmed[..len]
  } else {
    directive
  }
}

/// Looks up a mapped replacement for an image, in priority order: the
/// exact reference, its basename, its Docker Hub registry variants, its
/// registry-normalized form, and finally trailing-wildcard patterns
/// matched against the basename.
fn lookup_mapped_image<'a>(base: &str, images: &'a BTreeMap<String, String>) -> Option<&'a str> {
  if let Some(value) = images.get(base) {
    return Some(value);
  }

  let name = basename(base);
  if let Some(value) = images.get(name) {
    return Some(value);
  }

  for variant in dockerhub_variants(base) {
    if let Some(value) = images.get(&variant) {
      return Some(value);
    }
  }

  let normalized = normalize_image_name(base);
  if let Some(value) = images.get(normalized) {
    return Some(value);
  }

  if let Some(stripped) = normalized.strip_prefix("library/") {
    if let Some(value) = images.get(stripped) {
      return Some(value);
    }
  }

  lookup_glob(name, images)
}

/// Matches a basename against trailing-wildcard mapping keys. Ordered
/// map iteration makes the first match deterministic.
fn lookup_glob<'a>(name: &str, images: &'a BTreeMap<String, String>) -> Option<&'a str> {
  for (pattern, value) in images {
    if let Some(prefix) = pattern.strip_suffix('*') {
      if name.starts_with(prefix) {
        return Some(value);
      }
    }
  }

  None
}

/// Splits a mapped image value into its name and optional verbatim tag.
fn split_mapped_image(mapped: &str) -> (String, Option<String>) {
  let (name, tag) = split_tag(mapped);
  (name.to_string(), tag.map(String::from))
}

/// Computes the tag for a converted reference.
fn calculate_converted_tag(target_image: &str, tag: Option<&str>, needs_dev_suffix: bool) -> String {
  // the generic base image is always pinned to latest
  if target_image == GENERIC_BASE_IMAGE {
    return "latest".to_string();
  }

  let tag = tag.unwrap_or("");

  // unresolved variable references are preserved verbatim
  if tag.contains('$') {
    return if needs_dev_suffix && !tag.ends_with(DEV_TAG_SUFFIX) {
      format!("{}{}", tag, DEV_TAG_SUFFIX)
    } else {
      tag.to_string()
    };
  }

  let converted = convert_image_tag(tag);

  if needs_dev_suffix && !converted.ends_with(DEV_TAG_SUFFIX) {
    format!("{}{}", converted, DEV_TAG_SUFFIX)
  } else {
    converted
  }
}

/// Normalizes a source tag: variant suffixes after the first hyphen are
/// dropped, a leading `v` before a digit is stripped, numeric tags are
/// truncated to `major.minor`, and anything non-numeric collapses to
/// `latest`.
fn convert_image_tag(tag: &str) -> String {
  if tag.is_empty() {
    return "latest".to_string();
  }

  let mut tag = match tag.find('-') {
    Some(pos) => &tag[..pos],
    None => tag
  };

  let bytes = tag.as_bytes();
  if bytes.len() > 1 && bytes[0] == b'v' && bytes[1].is_ascii_digit() {
    tag = &tag[1..];
  }

  let parts: Vec<&str> = tag.split('.').collect();
  let numeric = match parts.as_slice() {
    [major] => major.parse::<u64>().is_ok(),
    [major, minor, ..] => major.parse::<u64>().is_ok() && minor.parse::<u64>().is_ok(),
    _ => false
  };

  if numeric {
    if parts.len() > 2 {
      let major: u64 = parts[0].parse().unwrap_or(0);
      let minor: u64 = parts[1].parse().unwrap_or(0);
      return format!("{}.{}", major, minor);
    }

    return tag.to_string();
  }

  if tag != "latest" {
    return "latest".to_string();
  }

  tag.to_string()
}

/// Builds the final reference: `registry/name` when a registry override
/// is set, else `DEFAULT_REGISTRY_DOMAIN/organization/name`.
fn build_image_reference(name: &str, tag: &str, opts: &Options) -> String {
  let base = match &opts.registry {
    Some(registry) => format!("{}/{}", registry, name),
    None => {
      let org = opts.organization.as_deref().unwrap_or(DEFAULT_ORG);
      format!("{}/{}/{}", DEFAULT_REGISTRY_DOMAIN, org, name)
    }
  };

  if tag.is_empty() {
    base
  } else {
    format!("{}:{}", base, tag)
  }
}

fn convert_from_line(
  ins: &Instruction,
  from: &FromDetails,
  stage_has_run: bool,
  mappings: &MappingsConfig,
  opts: &Options
) -> String {
  let name = basename(&from.base);

  let (target_image, mapped_tag) = match lookup_mapped_image(&from.base, &mappings.images) {
    Some(mapped) => split_mapped_image(mapped),
    None => (name.to_string(), None)
  };

  // a tag embedded in the mapping value is used verbatim, bypassing
  // normalization
  let tag = mapped_tag.unwrap_or_else(|| {
    calculate_converted_tag(&target_image, from.tag.as_deref(), stage_has_run)
  });

  let proposed = build_image_reference(&target_image, &tag, opts);

  let image_ref = match &opts.from_line_converter {
    Some(hook) => match hook.convert_from(from, &proposed, stage_has_run) {
      Ok(custom) => custom,
      Err(_) => from.orig.clone()
    },
    None => proposed
  };

  let mut line = format!(
    "{} {}",
    original_keyword(&ins.raw, DIRECTIVE_FROM),
    image_ref
  );

  if let Some(alias) = &from.alias {
    line.push(' ');
    line.push_str(KEYWORD_AS);
    line.push(' ');
    line.push_str(alias);
  }

  line
}

/// Rewrites an ARG declaration whose default value serves as a base
/// image. The dev-suffix decision comes from the stage of the FROM that
/// references the variable.
fn convert_arg_line(
  ins: &Instruction,
  arg: &ArgDetails,
  instructions: &[Instruction],
  stages_with_run: &HashSet<usize>,
  mappings: &MappingsConfig,
  opts: &Options
) -> (String, ArgDetails) {
  let default_value = arg.default_value.clone().unwrap_or_default();
  let (base, tag) = split_tag(&default_value);

  let from = FromDetails {
    base: base.to_string(),
    tag: tag.map(String::from),
    digest: None,
    alias: None,
    parent: None,
    base_dynamic: false,
    tag_dynamic: false,
    orig: default_value.clone()
  };

  let needs_dev_suffix = arg_needs_dev_suffix(&arg.name, instructions, stages_with_run);

  // a bare default value has no registry spelling to normalize, so only
  // the basename and wildcard lookups apply
  let name = basename(&from.base);
  let mapped = mappings.images.get(name).map(String::as_str)
    .or_else(|| lookup_glob(name, &mappings.images));

  let (target_image, mapped_tag) = match mapped {
    Some(mapped) => split_mapped_image(mapped),
    None => (name.to_string(), None)
  };

  let tag = mapped_tag.unwrap_or_else(|| {
    calculate_converted_tag(&target_image, from.tag.as_deref(), needs_dev_suffix)
  });

  let proposed = build_image_reference(&target_image, &tag, opts);

  let final_ref = match &opts.from_line_converter {
    Some(hook) => match hook.convert_from(&from, &proposed, needs_dev_suffix) {
      Ok(custom) => custom,
      Err(_) => default_value.clone()
    },
    None => proposed
  };

  let line = format!(
    "{} {}={}",
    original_keyword(&ins.raw, DIRECTIVE_ARG),
    arg.name,
    final_ref
  );

  let details = ArgDetails {
    name: arg.name.clone(),
    default_value: Some(final_ref),
    used_as_base: true
  };

  (line, details)
}

/// Whether the stage of the FROM referencing `$name` runs commands.
fn arg_needs_dev_suffix(
  name: &str,
  instructions: &[Instruction],
  stages_with_run: &HashSet<usize>
) -> bool {
  let braced = format!("${{{}}}", name);
  let plain = format!("${}", name);

  for ins in instructions {
    if let Some(from) = ins.from_details() {
      if from.base_dynamic && (from.base.contains(&braced) || from.base.contains(&plain)) {
        return stages_with_run.contains(&ins.stage);
      }
    }
  }

  false
}

/// The outcome of scanning one shell command for package-manager
/// invocations.
struct PackageConversion {
  modified: bool,
  distro: Option<Distro>,
  manager: Option<Manager>,
  /// Package names as written in the source, sorted and deduplicated.
  detected: Vec<String>,
  /// Replacement packages to install, sorted and deduplicated.
  to_install: Vec<String>,
  shell: Option<ShellCommand>
}

impl PackageConversion {
  fn unmodified(first: Option<(Manager, PackageManagerInfo)>) -> PackageConversion {
    PackageConversion {
      modified: false,
      distro: first.map(|(_, info)| info.distro),
      manager: first.map(|(manager, _)| manager),
      detected: Vec::new(),
      to_install: Vec::new(),
      shell: None
    }
  }
}

/// Translates package-manager invocations to the target manager.
///
/// The first recognized manager fixes the distro for the whole
/// instruction; mixing two different managers is ambiguous and leaves
/// the instruction unconverted. All recognized install commands collapse
/// into one `apk add --no-cache` part carrying the merged package list;
/// unrelated parts keep their position and operators.
fn convert_package_manager_commands(
  shell: &ShellCommand,
  package_map: &BTreeMap<Distro, BTreeMap<String, Vec<String>>>
) -> PackageConversion {
  let mut first: Option<(Manager, PackageManagerInfo)> = None;
  let mut first_install_index: Option<usize> = None;
  let mut detected: Vec<String> = Vec::new();
  let mut to_install: Vec<String> = Vec::new();

  for (i, part) in shell.parts.iter().enumerate() {
    let manager = match Manager::from_command(&part.command) {
      Some(manager) => manager,
      None => continue
    };

    let info = match first {
      None => {
        let info = PACKAGE_MANAGERS[&manager];
        first = Some((manager, info));
        info
      },
      Some((first_manager, _)) if first_manager != manager => {
        // two different managers in one instruction is ambiguous;
        // deliberately leave the whole instruction alone
        return PackageConversion::unmodified(first);
      },
      Some((_, info)) => info
    };

    let install_index = match part.args.iter().position(|a| a == info.install_keyword) {
      Some(index) => index,
      None => continue
    };

    if first_install_index.is_none() {
      first_install_index = Some(i);
    }

    for arg in &part.args[install_index + 1..] {
      if arg.starts_with('-') {
        continue;
      }

      detected.push(arg.clone());

      match package_map.get(&info.distro).and_then(|table| table.get(arg)) {
        Some(replacements) => to_install.extend(replacements.iter().cloned()),
        None => to_install.push(arg.clone())
      }
    }
  }

  let (first_manager, info) = match first {
    Some(first) => first,
    None => return PackageConversion::unmodified(None)
  };

  let first_install_index = match first_install_index {
    Some(index) if !to_install.is_empty() => index,
    _ => return PackageConversion::unmodified(Some((first_manager, info)))
  };

  detected.sort();
  detected.dedup();
  to_install.sort();
  to_install.dedup();

  let mut parts: Vec<ShellPart> = Vec::with_capacity(shell.parts.len());

  for part in &shell.parts[..first_install_index] {
    if Manager::from_command(&part.command) != Some(first_manager) {
      parts.push(part.clone());
    }
  }

  let install_part = &shell.parts[first_install_index];
  let mut args: Vec<String> = TARGET_INSTALL_ARGS.iter().map(|a| String::from(*a)).collect();
  args.extend(to_install.iter().cloned());

  parts.push(ShellPart {
    extra_pre: install_part.extra_pre.clone(),
    command: TARGET_PACKAGE_MANAGER.into(),
    args,
    delimiter: if first_install_index < shell.parts.len() - 1 {
      install_part.delimiter
    } else {
      None
    }
  });

  for (i, part) in shell.parts.iter().enumerate().skip(first_install_index + 1) {
    if Manager::from_command(&part.command) != Some(first_manager) {
      let mut part = part.clone();

      if i == shell.parts.len() - 1 {
        part.delimiter = None;
      }

      parts.push(part);
    }
  }

  if let Some(last) = parts.last_mut() {
    last.delimiter = None;
  }

  PackageConversion {
    modified: true,
    distro: Some(info.distro),
    manager: Some(first_manager),
    detected,
    to_install,
    shell: Some(ShellCommand { parts })
  }
}

/// Applies the busybox command-syntax rewrites to every part. The
/// user/group rewrites are suppressed when the stage installs the
/// package that ships the native tools.
fn convert_busybox_commands(
  shell: &ShellCommand,
  stage_packages: &[String]
) -> (bool, ShellCommand) {
  let has_shadow = stage_packages.iter().any(|p| p == SHADOW_PACKAGE);

  let mut parts = Vec::with_capacity(shell.parts.len());
  let mut modified = false;

  for part in &shell.parts {
    let converted = match part.command.as_str() {
      CMD_USERADD if !has_shadow => Some(convert_useradd(part)),
      CMD_GROUPADD if !has_shadow => Some(convert_groupadd(part)),
      CMD_TAR => Some(convert_gnu_tar(part)),
      _ => None
    };

    match converted {
      Some(converted) if converted != *part => {
        modified = true;
        parts.push(converted);
      },
      _ => parts.push(part.clone())
    }
  }

  (modified, ShellCommand { parts })
}

/// Inserts `USER root` after the FROM of every stage whose RUN commands
/// were rewritten, unless the stage already carries one. Checking both
/// raw and converted text keeps the pass idempotent across repeated
/// conversions.
fn add_user_root_directives(instructions: &mut [Instruction]) {
  let mut stages_with_converted_runs: HashSet<usize> = HashSet::new();
  let mut stages_with_user_root: HashSet<usize> = HashSet::new();

  for ins in instructions.iter() {
    if ins.run_details().is_some() && ins.converted.is_some() {
      stages_with_converted_runs.insert(ins.stage);
    }

    if is_user_root(&ins.raw) || ins.converted.as_deref().map_or(false, is_user_root) {
      stages_with_user_root.insert(ins.stage);
    }
  }

  if stages_with_converted_runs.is_empty() {
    return;
  }

  for ins in instructions.iter_mut() {
    if ins.from_details().is_none()
      || !stages_with_converted_runs.contains(&ins.stage)
      || stages_with_user_root.contains(&ins.stage)
    {
      continue;
    }

    if let Some(converted) = &mut ins.converted {
      converted.push('\n');
      converted.push_str(DIRECTIVE_USER);
      converted.push(' ');
      converted.push_str(ROOT_USER);
      stages_with_user_root.insert(ins.stage);
    }
  }
}

fn is_user_root(text: &str) -> bool {
  directive_argument(text.trim(), DIRECTIVE_USER).is_some()
    && text.to_lowercase().contains(ROOT_USER)
}

#[cfg(test)]
mod tests {
  use super::*;
  use indoc::indoc;
  use pretty_assertions::assert_eq;

  fn no_builtin() -> Options {
    Options {
      no_builtin: true,
      ..Options::default()
    }
  }

  fn convert_str(input: &str, opts: &Options) -> String {
    Dockerfile::parse(input).convert(opts).unwrap().to_string()
  }

  #[test]
  fn basic_scenario_with_empty_mappings() {
    assert_eq!(
      convert_str("FROM node\nRUN apt-get update && apt-get install -y nano", &no_builtin()),
      "FROM minbase.dev/ORG/node:latest-dev\nUSER root\nRUN apk add --no-cache nano\n"
    );
  }

  #[test]
  fn tag_normalization_table() {
    // concrete cases from the conversion contract
    assert_eq!(calculate_converted_tag("node", Some("14"), true), "14-dev");
    assert_eq!(calculate_converted_tag("node", Some("14.17.3"), true), "14.17-dev");
    assert_eq!(calculate_converted_tag("node", Some("v2.1"), true), "2.1-dev");
    assert_eq!(calculate_converted_tag("node", None, false), "latest");
    assert_eq!(calculate_converted_tag("node", None, true), "latest-dev");
    assert_eq!(calculate_converted_tag("node", Some("alpine"), true), "latest-dev");

    // variant suffixes drop, latest never doubles the suffix
    assert_eq!(calculate_converted_tag("node", Some("18-alpine3.19"), true), "18-dev");
    assert_eq!(calculate_converted_tag("node", Some("latest"), true), "latest-dev");
    assert_eq!(calculate_converted_tag("node", Some("18-dev"), true), "18-dev");

    // unresolved variables are preserved
    assert_eq!(
      calculate_converted_tag("node", Some("${NODE_VERSION}"), true),
      "${NODE_VERSION}-dev"
    );
    assert_eq!(
      calculate_converted_tag("node", Some("${NODE_VERSION}"), false),
      "${NODE_VERSION}"
    );

    // the generic base image pins to latest with no suffix
    assert_eq!(calculate_converted_tag(GENERIC_BASE_IMAGE, Some("12"), true), "latest");
  }

  #[test]
  fn image_tag_numeric_parsing() {
    assert_eq!(convert_image_tag(""), "latest");
    assert_eq!(convert_image_tag("9"), "9");
    assert_eq!(convert_image_tag("1.2"), "1.2");
    assert_eq!(convert_image_tag("1.2.3.4"), "1.2");
    assert_eq!(convert_image_tag("v1.21.0"), "1.21");
    assert_eq!(convert_image_tag("1.x.2"), "latest");
    assert_eq!(convert_image_tag("bookworm"), "latest");
    assert_eq!(convert_image_tag("latest"), "latest");
  }

  #[test]
  fn glob_matching() {
    let mut images = BTreeMap::new();
    images.insert("nodejs*".to_string(), "node".to_string());

    assert_eq!(lookup_glob("nodejs", &images), Some("node"));
    assert_eq!(lookup_glob("nodejs20-debian12", &images), Some("node"));
    assert_eq!(lookup_glob("my-nodejs", &images), None);
  }

  #[test]
  fn mapping_lookup_priority() {
    let mut images = BTreeMap::new();
    images.insert("docker.io/library/node".to_string(), "variant-match".to_string());
    images.insert("node".to_string(), "basename-match".to_string());

    // the exact reference wins over everything
    images.insert("registry-1.docker.io/library/node".to_string(), "exact-match".to_string());
    assert_eq!(
      lookup_mapped_image("registry-1.docker.io/library/node", &images),
      Some("exact-match")
    );

    // a short name resolves through its basename
    assert_eq!(lookup_mapped_image("node", &images), Some("basename-match"));

    // a hub-prefixed spelling resolves through its variants
    let mut images = BTreeMap::new();
    images.insert("docker.io/someorg/somerepo".to_string(), "org-match".to_string());
    assert_eq!(
      lookup_mapped_image("someorg/somerepo", &images),
      Some("org-match")
    );

    // registry normalization strips hub domains
    let mut images = BTreeMap::new();
    images.insert("someorg/somerepo".to_string(), "normalized".to_string());
    assert_eq!(
      lookup_mapped_image("index.docker.io/someorg/somerepo", &images),
      Some("normalized")
    );
  }

  #[test]
  fn mapped_tag_is_verbatim() {
    let mut opts = no_builtin();
    opts.extra_mappings.images.insert("golang".into(), "go:1.22".into());

    // the embedded tag bypasses normalization and the dev suffix, and an
    // untouched RUN triggers no privilege escalation
    assert_eq!(
      convert_str("FROM golang:1.19\nRUN make\n", &opts),
      "FROM minbase.dev/ORG/go:1.22\nRUN make\n"
    );
  }

  #[test]
  fn invalid_glob_fails_before_converting() {
    let mut opts = no_builtin();
    opts.extra_mappings.images.insert("*bad".into(), "nope".into());

    let err = Dockerfile::parse("FROM node").convert(&opts).unwrap_err();
    assert!(matches!(err, Error::InvalidMappingPattern { .. }));
  }

  #[test]
  fn mixed_package_managers_left_unconverted() {
    let input = "RUN apt-get update && apt-get install -y nginx && yum install php";
    let converted = Dockerfile::parse(input).convert(&no_builtin()).unwrap();

    assert_eq!(converted.instructions[0].converted, None);
    assert_eq!(converted.to_string(), input);

    let run = converted.instructions[0].run_details().unwrap();
    assert_eq!(run.manager, Some(Manager::AptGet));
    assert!(run.packages.is_empty());
    assert_eq!(run.after, None);
  }

  #[test]
  fn packages_are_sorted_and_deduplicated() {
    let converted = convert_str(
      "RUN apt-get install -y vim curl vim && apt-get install -y curl nano",
      &no_builtin()
    );

    assert_eq!(converted, "RUN apk add --no-cache curl nano vim\n");
  }

  #[test]
  fn non_manager_parts_keep_their_places() {
    let converted = convert_str(
      "RUN echo before && apt-get update && apt-get install -y nano && echo after",
      &no_builtin()
    );

    assert_eq!(
      converted,
      "RUN echo before && \\\n    apk add --no-cache nano && \\\n    echo after\n"
    );
  }

  #[test]
  fn fedora_and_alpine_managers() {
    assert_eq!(
      convert_str("RUN yum install -y httpd", &no_builtin()),
      "RUN apk add --no-cache httpd\n"
    );

    assert_eq!(
      convert_str("RUN microdnf install git", &no_builtin()),
      "RUN apk add --no-cache git\n"
    );

    // apk invocations are normalized to the no-cache form
    assert_eq!(
      convert_str("RUN apk update && apk add nginx", &no_builtin()),
      "RUN apk add --no-cache nginx\n"
    );
  }

  #[test]
  fn package_names_are_mapped_per_distro() {
    let mut opts = no_builtin();
    let mut debian = BTreeMap::new();
    debian.insert("build-essential".to_string(), vec!["build-base".to_string()]);
    debian.insert("fuse".to_string(), vec!["fuse2".to_string(), "fuse-common".to_string()]);
    opts.extra_mappings.packages.insert(Distro::Debian, debian);

    let converted = Dockerfile::parse("RUN apt-get install -y build-essential fuse unmapped")
      .convert(&opts)
      .unwrap();

    assert_eq!(
      converted.instructions[0].converted.as_deref(),
      Some("RUN apk add --no-cache build-base fuse-common fuse2 unmapped")
    );

    // the detected list keeps the source names
    let run = converted.instructions[0].run_details().unwrap();
    assert_eq!(run.packages, vec!["build-essential", "fuse", "unmapped"]);
    assert_eq!(run.distro, Some(Distro::Debian));
  }

  #[test]
  fn install_keyword_need_not_be_first_arg() {
    assert_eq!(
      convert_str("RUN apt-get -q install -y nano", &no_builtin()),
      "RUN apk add --no-cache nano\n"
    );
  }

  #[test]
  fn update_only_run_is_untouched() {
    let input = "RUN apt-get update";
    let converted = Dockerfile::parse(input).convert(&no_builtin()).unwrap();

    assert_eq!(converted.instructions[0].converted, None);
    let run = converted.instructions[0].run_details().unwrap();
    assert_eq!(run.manager, Some(Manager::AptGet));
    assert_eq!(run.distro, Some(Distro::Debian));
  }

  #[test]
  fn scratch_parent_and_dynamic_bases_are_skipped() {
    let converted = Dockerfile::parse(indoc!(r#"
      FROM scratch
      FROM golang:1.22 AS build
      FROM build
      FROM $BASE_IMAGE
    "#))
    .convert(&no_builtin())
    .unwrap();

    assert_eq!(converted.instructions[0].converted, None);
    assert!(converted.instructions[1].converted.is_some());
    assert_eq!(converted.instructions[2].converted, None);
    assert_eq!(converted.instructions[3].converted, None);
  }

  #[test]
  fn alias_is_preserved_on_conversion() {
    assert_eq!(
      convert_str("FROM golang:1.22.1 AS Builder", &no_builtin()),
      "FROM minbase.dev/ORG/golang:1.22 AS Builder\n"
    );
  }

  #[test]
  fn keyword_case_is_preserved() {
    assert_eq!(
      convert_str("from node:18\nrun apt-get install -y nano", &no_builtin()),
      "from minbase.dev/ORG/node:18-dev\nUSER root\nrun apk add --no-cache nano\n"
    );
  }

  #[test]
  fn digest_references_are_replaced() {
    assert_eq!(
      convert_str("FROM node@sha256:0123abcd", &no_builtin()),
      "FROM minbase.dev/ORG/node:latest\n"
    );
  }

  #[test]
  fn registry_and_organization_overrides() {
    let opts = Options {
      registry: Some("registry.example.io/base".into()),
      ..no_builtin()
    };
    assert_eq!(
      convert_str("FROM node", &opts),
      "FROM registry.example.io/base/node:latest\n"
    );

    let opts = Options {
      organization: Some("acme".into()),
      ..no_builtin()
    };
    assert_eq!(
      convert_str("FROM node", &opts),
      "FROM minbase.dev/acme/node:latest\n"
    );
  }

  #[test]
  fn arg_used_as_base_is_converted() {
    let converted = Dockerfile::parse(indoc!(r#"
      ARG BASE_IMAGE=debian:bookworm-slim
      FROM $BASE_IMAGE AS base
    "#))
    .convert(&Options::default())
    .unwrap();

    // the builtin mappings collapse debian onto the generic base image
    assert_eq!(
      converted.instructions[0].converted.as_deref(),
      Some(&format!(
        "ARG BASE_IMAGE={}/{}/{}:latest",
        DEFAULT_REGISTRY_DOMAIN, DEFAULT_ORG, GENERIC_BASE_IMAGE
      )[..])
    );

    let arg = converted.instructions[0].arg_details().unwrap();
    assert!(arg.used_as_base);
    assert!(arg.default_value.as_deref().unwrap().ends_with(":latest"));

    // the dynamic FROM itself is untouched
    assert_eq!(converted.instructions[1].converted, None);
  }

  #[test]
  fn arg_dev_suffix_follows_referencing_stage() {
    let converted = Dockerfile::parse(indoc!(r#"
      ARG BASE=node:18
      FROM ${BASE}
      RUN npm ci
    "#))
    .convert(&no_builtin())
    .unwrap();

    assert_eq!(
      converted.instructions[0].converted.as_deref(),
      Some("ARG BASE=minbase.dev/ORG/node:18-dev")
    );
  }

  #[test]
  fn unused_arg_defaults_are_untouched() {
    let converted = Dockerfile::parse(indoc!(r#"
      ARG NODE_VERSION=18
      FROM node:${NODE_VERSION}
      RUN npm ci
    "#))
    .convert(&no_builtin())
    .unwrap();

    assert_eq!(converted.instructions[0].converted, None);

    // the dynamic tag is preserved verbatim, with the dev suffix
    assert_eq!(
      converted.instructions[1].converted.as_deref(),
      Some("FROM minbase.dev/ORG/node:${NODE_VERSION}-dev")
    );
  }

  #[test]
  fn useradd_is_rewritten_without_package_manager() {
    assert_eq!(
      convert_str("RUN useradd -m -s /bin/bash -u 1001 myuser", &no_builtin()),
      "RUN adduser --shell /bin/bash --uid 1001 myuser\n"
    );
  }

  #[test]
  fn shadow_package_suppresses_user_rewrites() {
    // shadow installed on the same line
    assert_eq!(
      convert_str(
        "RUN apt-get install -y shadow && useradd -m myuser && groupadd grp",
        &no_builtin()
      ),
      "RUN apk add --no-cache shadow && \\\n    useradd -m myuser && \\\n    groupadd grp\n"
    );

    // shadow installed earlier in the same stage
    let converted = convert_str(
      indoc!(r#"
        FROM debian
        RUN apt-get install -y shadow
        RUN useradd -m myuser
      "#),
      &no_builtin()
    );
    assert!(converted.contains("RUN useradd -m myuser"));
    assert!(!converted.contains("adduser"));

    // a package that maps onto shadow counts too
    let converted = convert_str(
      indoc!(r#"
        FROM debian
        RUN apt-get install -y passwd
        RUN useradd -m myuser
      "#),
      &Options::default()
    );
    assert!(converted.contains("apk add --no-cache shadow"));
    assert!(converted.contains("RUN useradd -m myuser"));
  }

  #[test]
  fn tar_invocations_are_canonicalized() {
    assert_eq!(
      convert_str("RUN tar xvf /tmp/app.tar -C /opt", &no_builtin()),
      "RUN tar -x -v -C /opt -f /tmp/app.tar\n"
    );
  }

  #[test]
  fn user_root_inserted_once_per_stage() {
    let converted = convert_str(
      indoc!(r#"
        FROM node AS build
        RUN apt-get install -y git
        RUN apt-get install -y curl

        FROM node
        COPY --from=build /src /src
      "#),
      &no_builtin()
    );

    assert_eq!(converted.matches("USER root").count(), 1);
    assert!(converted.starts_with(
      "FROM minbase.dev/ORG/node:latest-dev AS build\nUSER root\n"
    ));

    // the second stage has no rewritten RUN and stays root-free
    assert!(converted.contains("\nFROM minbase.dev/ORG/node:latest\nCOPY"));
  }

  #[test]
  fn existing_user_root_is_respected() {
    let converted = convert_str(
      indoc!(r#"
        FROM node
        USER root
        RUN apt-get install -y git
      "#),
      &no_builtin()
    );

    assert_eq!(converted.matches("USER root").count(), 1);

    let converted = convert_str(
      indoc!(r#"
        FROM node
        user ROOT
        RUN apt-get install -y git
      "#),
      &no_builtin()
    );

    assert_eq!(converted.to_lowercase().matches("user root").count(), 1);
  }

  #[test]
  fn conversion_is_idempotent() {
    let inputs = [
      "FROM node\nRUN apt-get update && apt-get install -y nano\n",
      indoc!(r#"
        # build stage
        FROM golang:1.21.5 AS build
        RUN yum install -y git make
        RUN useradd -m builder

        FROM scratch
        COPY --from=build /out /out
      "#),
      "ARG BASE=debian\nFROM $BASE\nRUN apt-get install -y curl\n"
    ];

    for input in &inputs {
      let once = Dockerfile::parse(input)
        .convert(&Options::default())
        .unwrap()
        .to_string();
      let twice = Dockerfile::parse(&once)
        .convert(&Options::default())
        .unwrap()
        .to_string();

      assert_eq!(once, twice, "input: {:?}", input);
    }
  }

  #[test]
  fn convert_does_not_mutate_input() {
    let dockerfile = Dockerfile::parse("FROM node\nRUN apt-get install -y nano");
    let before = dockerfile.clone();

    dockerfile.convert(&no_builtin()).unwrap();
    assert_eq!(dockerfile, before);
  }

  #[test]
  fn trivia_survives_conversion() {
    let converted = convert_str(
      indoc!(r#"
        # syntax=docker/dockerfile:1

        # the base
        FROM node

        # tools
        RUN apt-get install -y git
      "#),
      &no_builtin()
    );

    assert_eq!(converted, indoc!(r#"
      # syntax=docker/dockerfile:1

      # the base
      FROM minbase.dev/ORG/node:latest-dev
      USER root

      # tools
      RUN apk add --no-cache git
    "#));
  }

  #[test]
  fn from_hook_overrides_and_falls_back() {
    let opts = Options {
      from_line_converter: Some(Box::new(
        |from: &FromDetails, proposed: &str, _stage_has_run: bool| -> Result<String> {
          if from.base == "node" {
            Ok("registry.example.com/node:pinned".to_string())
          } else {
            Ok(proposed.to_string())
          }
        }
      )),
      ..no_builtin()
    };

    assert_eq!(
      convert_str("FROM node:18 AS app\nFROM golang:1.22", &opts),
      "FROM registry.example.com/node:pinned AS app\nFROM minbase.dev/ORG/golang:1.22\n"
    );

    // a hook error reverts the instruction to the original reference
    let opts = Options {
      from_line_converter: Some(Box::new(
        |_from: &FromDetails, _proposed: &str, _stage_has_run: bool| -> Result<String> {
          Err(Error::RewriteHookError {
            message: "refused".into()
          })
        }
      )),
      ..no_builtin()
    };

    assert_eq!(
      convert_str("FROM node:18 AS app", &opts),
      "FROM node:18 AS app\n"
    );
  }

  #[test]
  fn run_hook_overrides_and_falls_back() {
    let opts = Options {
      run_line_converter: Some(Box::new(
        |run: &RunDetails, proposed: &str, _stage: usize| -> Result<String> {
          if run.manager == Some(Manager::AptGet) {
            Ok("RUN echo 'apt-get is not allowed!'".to_string())
          } else {
            Ok(proposed.to_string())
          }
        }
      )),
      ..no_builtin()
    };

    let converted = convert_str(
      "FROM node\nRUN apt-get update && apt-get install -y nano\nRUN echo hello world",
      &opts
    );

    assert!(converted.contains("RUN echo 'apt-get is not allowed!'"));
    assert!(converted.contains("RUN echo hello world"));

    // a hook error reverts the instruction to its original text
    let opts = Options {
      run_line_converter: Some(Box::new(
        |_run: &RunDetails, _proposed: &str, _stage: usize| -> Result<String> {
          Err(Error::RewriteHookError {
            message: "refused".into()
          })
        }
      )),
      ..no_builtin()
    };

    let converted = Dockerfile::parse("FROM node\nRUN apt-get install -y nano")
      .convert(&opts)
      .unwrap();

    assert_eq!(converted.instructions[1].converted, None);
    assert_eq!(converted.instructions[1].run_details().unwrap().after, None);

    // no rewritten RUN means no privilege escalation either
    assert!(!converted.to_string().contains("USER root"));
  }

  #[test]
  fn structured_tree_serialization() {
    let converted = Dockerfile::parse("FROM node:18\nRUN apt-get install -y nano vim")
      .convert(&no_builtin())
      .unwrap();

    let tree = serde_json::to_value(&converted).unwrap();
    let instructions = tree["instructions"].as_array().unwrap();

    assert_eq!(instructions[0]["raw"], "FROM node:18");
    assert_eq!(instructions[0]["stage"], 1);
    assert_eq!(instructions[0]["from"]["base"], "node");
    assert_eq!(instructions[0]["from"]["tag"], "18");
    assert!(instructions[0]["converted"]
      .as_str()
      .unwrap()
      .starts_with("FROM minbase.dev/ORG/node:18-dev"));

    assert_eq!(instructions[1]["run"]["distro"], "debian");
    assert_eq!(instructions[1]["run"]["manager"], "apt-get");
    assert_eq!(instructions[1]["run"]["packages"][0], "nano");
    assert_eq!(instructions[1]["run"]["packages"][1], "vim");

    // unset fields are omitted, and shell structures stay internal
    assert!(instructions[0]["from"].get("digest").is_none());
    assert!(instructions[1]["run"].get("before").is_none());
  }
}
