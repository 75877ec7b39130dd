// (C) Copyright 2024-2025 Minbase Developers

use crate::shell::ShellPart;

pub(crate) const CMD_TAR: &str = "tar";

/// GNU tar options that are either the default or unsupported in busybox
/// tar; dropped on conversion.
const IGNORED_GNU_TAR_OPTIONS: [&str; 9] = [
  "--same-owner",
  "--preserve-permissions",
  "--preserve-order",
  "--preserve",
  "--same-permissions",
  "--numeric-owner",
  "--overwrite",
  "--remove-files",
  "--ignore-failed-read"
];

/// Rewrites a GNU tar invocation into busybox tar's canonical shape:
/// short options first, then operands, with `-f FILE` last.
///
/// Handles combined short-flag clusters (`xvf archive.tar`), long
/// options and `--file=X`; unknown long options are dropped.
pub(crate) fn convert_gnu_tar(part: &ShellPart) -> ShellPart {
  if part.command != CMD_TAR {
    return part.clone();
  }

  let args = &part.args;
  let mut options: Vec<String> = Vec::new();
  let mut files: Vec<String> = Vec::new();
  let mut filename: Option<String> = None;

  let mut i = 0;
  while i < args.len() {
    let arg = &args[i];

    // a bare first argument is a combined short-flag cluster
    if i == 0 && !arg.starts_with('-') && !arg.is_empty() {
      for c in arg.chars() {
        match c {
          'x' => options.push("-x".into()),
          'c' => options.push("-c".into()),
          'v' => options.push("-v".into()),
          'z' => options.push("-z".into()),
          'j' => options.push("-j".into()),
          'f' => {
            if i + 1 < args.len() {
              filename = Some(args[i + 1].clone());
              i += 1;
            }
          },
          other => options.push(format!("-{}", other))
        }
      }

      i += 1;
      continue;
    }

    if let Some(value) = arg.strip_prefix("--file=") {
      filename = Some(value.to_string());
      i += 1;
      continue;
    }

    match arg.as_str() {
      "--extract" | "-x" => options.push("-x".into()),
      "--create" | "-c" => options.push("-c".into()),
      "--verbose" | "-v" => options.push("-v".into()),
      "--gzip" | "--gunzip" | "-z" => options.push("-z".into()),
      "--bzip2" | "-j" => options.push("-j".into()),
      "--file" | "-f" => {
        if i + 1 < args.len() {
          filename = Some(args[i + 1].clone());
          i += 2;
          continue;
        }
      },
      "--directory" | "-C" => {
        if i + 1 < args.len() {
          options.push("-C".into());
          options.push(args[i + 1].clone());
          i += 2;
          continue;
        }
      },
      arg if IGNORED_GNU_TAR_OPTIONS.contains(&arg) => (),
      arg if arg.starts_with("--") => (),
      _ => files.push(arg.clone())
    }

    i += 1;
  }

  let mut result_args = options;
  result_args.extend(files);

  if let Some(filename) = filename {
    if !filename.is_empty() {
      result_args.push("-f".into());
      result_args.push(filename);
    }
  }

  ShellPart {
    extra_pre: part.extra_pre.clone(),
    command: CMD_TAR.into(),
    args: result_args,
    delimiter: part.delimiter
  }
}
