// (C) Copyright 2024-2025 Minbase Developers

use crate::shell::ShellPart;

pub(crate) const CMD_USERADD: &str = "useradd";
pub(crate) const CMD_ADDUSER: &str = "adduser";
pub(crate) const CMD_GROUPADD: &str = "groupadd";
pub(crate) const CMD_ADDGROUP: &str = "addgroup";

/// The package that ships the native useradd/groupadd tools. When a
/// stage installs it, these rewrites are suppressed.
pub(crate) const SHADOW_PACKAGE: &str = "shadow";

/// Rewrites a `useradd` invocation to the busybox `adduser` equivalent.
///
/// Flags are renamed per a fixed table; `-m`/`--create-home` is dropped
/// (adduser's default), password flags collapse to
/// `--disabled-password`, and the username moves to the end.
pub(crate) fn convert_useradd(part: &ShellPart) -> ShellPart {
  if part.command != CMD_USERADD {
    return part.clone();
  }

  let args = &part.args;
  let mut result_args: Vec<String> = Vec::new();
  let mut username: Option<String> = None;

  let mut i = 0;
  while i < args.len() {
    let arg = &args[i];

    if !arg.starts_with('-') && username.is_none() {
      username = Some(arg.clone());
      i += 1;
      continue;
    }

    match arg.as_str() {
      // creating the home directory is the default for adduser
      "-m" | "--create-home" => i += 1,

      "-r" | "--system" => {
        result_args.push("--system".into());
        i += 1;
      },
      "-M" | "--no-create-home" => {
        result_args.push("--no-create-home".into());
        i += 1;
      },

      "-s" | "--shell" => i = rename_with_value(args, i, "--shell", &mut result_args),
      "-d" | "--home-dir" => i = rename_with_value(args, i, "--home", &mut result_args),
      "-c" | "--comment" => i = rename_with_value(args, i, "--gecos", &mut result_args),
      "-g" | "--gid" => i = rename_with_value(args, i, "--ingroup", &mut result_args),
      "-u" | "--uid" => i = rename_with_value(args, i, "--uid", &mut result_args),

      "-p" | "--password" => {
        result_args.push("--disabled-password".into());
        i = skip_with_optional_value(args, i);
      },

      "-k" | "--skel" | "-N" | "--no-user-group" => {
        i = skip_with_optional_value(args, i);
      },

      _ => {
        result_args.push(arg.clone());
        i += 1;
      }
    }
  }

  if let Some(username) = username {
    result_args.push(username);
  }

  ShellPart {
    extra_pre: part.extra_pre.clone(),
    command: CMD_ADDUSER.into(),
    args: result_args,
    delimiter: part.delimiter
  }
}

/// Rewrites a `groupadd` invocation to the busybox `addgroup`
/// equivalent.
pub(crate) fn convert_groupadd(part: &ShellPart) -> ShellPart {
  if part.command != CMD_GROUPADD {
    return part.clone();
  }

  let args = &part.args;
  let mut result_args: Vec<String> = Vec::new();
  let mut groupname: Option<String> = None;

  let mut i = 0;
  while i < args.len() {
    let arg = &args[i];

    if !arg.starts_with('-') && groupname.is_none() {
      groupname = Some(arg.clone());
      i += 1;
      continue;
    }

    match arg.as_str() {
      "-r" | "--system" => {
        result_args.push("--system".into());
        i += 1;
      },

      "-g" | "--gid" => i = rename_with_value(args, i, "--gid", &mut result_args),

      // not supported by addgroup
      "-f" | "--force" | "-o" | "--non-unique" => i += 1,

      "-K" | "--key" | "-p" | "--password" => {
        i = skip_with_optional_value(args, i);
      },

      _ => {
        result_args.push(arg.clone());
        i += 1;
      }
    }
  }

  if let Some(groupname) = groupname {
    result_args.push(groupname);
  }

  ShellPart {
    extra_pre: part.extra_pre.clone(),
    command: CMD_ADDGROUP.into(),
    args: result_args,
    delimiter: part.delimiter
  }
}

/// Renames a flag that takes a value, carrying the value through. A
/// trailing flag with no value is dropped.
fn rename_with_value(args: &[String], i: usize, renamed: &str, out: &mut Vec<String>) -> usize {
  if i + 1 < args.len() {
    out.push(renamed.to_string());
    out.push(args[i + 1].clone());
    i + 2
  } else {
    i + 1
  }
}

/// Skips a flag, also consuming a following value unless it looks like
/// another flag.
fn skip_with_optional_value(args: &[String], i: usize) -> usize {
  if i + 1 < args.len() && !args[i + 1].starts_with('-') {
    i + 2
  } else {
    i + 1
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::shell::Delimiter;

  fn part(command: &str, args: &[&str]) -> ShellPart {
    ShellPart {
      extra_pre: None,
      command: command.into(),
      args: args.iter().map(|a| String::from(*a)).collect(),
      delimiter: None
    }
  }

  #[test]
  fn useradd_bare() {
    let converted = convert_useradd(&part(CMD_USERADD, &["myuser"]));
    assert_eq!(converted.command, CMD_ADDUSER);
    assert_eq!(converted.args, vec!["myuser"]);
  }

  #[test]
  fn useradd_renames_flags_and_moves_username_last() {
    let converted = convert_useradd(&part(
      CMD_USERADD,
      &["-m", "-s", "/bin/bash", "-u", "1001", "-g", "mygroup", "myuser"]
    ));

    assert_eq!(converted.command, CMD_ADDUSER);
    assert_eq!(
      converted.args,
      vec!["--shell", "/bin/bash", "--uid", "1001", "--ingroup", "mygroup", "myuser"]
    );
  }

  #[test]
  fn useradd_system_and_password_flags() {
    let converted = convert_useradd(&part(
      CMD_USERADD,
      &["-r", "-M", "-d", "/srv/app", "-p", "hunter2", "app"]
    ));

    assert_eq!(
      converted.args,
      vec!["--system", "--no-create-home", "--home", "/srv/app", "--disabled-password", "app"]
    );
  }

  #[test]
  fn useradd_keeps_delimiter_and_prefix() {
    let original = ShellPart {
      extra_pre: Some("FOO=bar".into()),
      command: CMD_USERADD.into(),
      args: vec!["app".into()],
      delimiter: Some(Delimiter::And)
    };

    let converted = convert_useradd(&original);
    assert_eq!(converted.extra_pre.as_deref(), Some("FOO=bar"));
    assert_eq!(converted.delimiter, Some(Delimiter::And));
  }

  #[test]
  fn groupadd_basic() {
    let converted = convert_groupadd(&part(CMD_GROUPADD, &["-r", "-g", "1001", "mygroup"]));
    assert_eq!(converted.command, CMD_ADDGROUP);
    assert_eq!(converted.args, vec!["--system", "--gid", "1001", "mygroup"]);
  }

  #[test]
  fn groupadd_drops_unsupported_flags() {
    let converted = convert_groupadd(&part(CMD_GROUPADD, &["-f", "-K", "GID_MIN=500", "grp"]));
    assert_eq!(converted.args, vec!["grp"]);
  }

  #[test]
  fn other_commands_pass_through() {
    let original = part("adduser", &["app"]);
    assert_eq!(convert_useradd(&original), original);
    assert_eq!(convert_groupadd(&original), original);
  }
}
