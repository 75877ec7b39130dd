// (C) Copyright 2024-2025 Minbase Developers

use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::*;

/// A source Linux distribution family, identified by the package manager
/// a `RUN` instruction invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distro {
  Debian,
  Fedora,
  Alpine
}

/// A recognized source package manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Manager {
  AptGet,
  Apt,
  Yum,
  Dnf,
  Microdnf,
  Apk
}

impl Manager {
  /// Recognizes a shell command word as a package manager.
  pub fn from_command(command: &str) -> Option<Manager> {
    match command {
      "apt-get" => Some(Manager::AptGet),
      "apt" => Some(Manager::Apt),
      "yum" => Some(Manager::Yum),
      "dnf" => Some(Manager::Dnf),
      "microdnf" => Some(Manager::Microdnf),
      "apk" => Some(Manager::Apk),
      _ => None
    }
  }
}

/// Metadata about a package manager: the distribution family it implies
/// and the subcommand that installs packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageManagerInfo {
  pub distro: Distro,
  pub install_keyword: &'static str
}

lazy_static! {
  /// Static manager metadata table, constructed once.
  pub(crate) static ref PACKAGE_MANAGERS: HashMap<Manager, PackageManagerInfo> = {
    let mut managers = HashMap::new();

    managers.insert(Manager::AptGet, PackageManagerInfo {
      distro: Distro::Debian,
      install_keyword: "install"
    });
    managers.insert(Manager::Apt, PackageManagerInfo {
      distro: Distro::Debian,
      install_keyword: "install"
    });

    managers.insert(Manager::Yum, PackageManagerInfo {
      distro: Distro::Fedora,
      install_keyword: "install"
    });
    managers.insert(Manager::Dnf, PackageManagerInfo {
      distro: Distro::Fedora,
      install_keyword: "install"
    });
    managers.insert(Manager::Microdnf, PackageManagerInfo {
      distro: Distro::Fedora,
      install_keyword: "install"
    });

    managers.insert(Manager::Apk, PackageManagerInfo {
      distro: Distro::Alpine,
      install_keyword: "add"
    });

    managers
  };
}

/// Per-distro package-name replacement tables.
pub type PackageMap = BTreeMap<Distro, BTreeMap<String, Vec<String>>>;

/// A mapping document: an image table and per-distro package tables.
///
/// Image keys may be exact references or end in a single trailing `*` to
/// prefix-match basenames; values may embed a `:tag`, which is then used
/// verbatim. Ordered maps keep wildcard matching deterministic.
///
/// ```
/// use dockerfile_converter::MappingsConfig;
///
/// let mappings = MappingsConfig::from_yaml(r#"
/// images:
///   nodejs*: node
/// packages:
///   debian:
///     build-essential: [build-base]
/// "#).unwrap();
///
/// assert_eq!(mappings.images.get("nodejs*").map(String::as_str), Some("node"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingsConfig {
  #[serde(default)]
  pub images: BTreeMap<String, String>,

  #[serde(default)]
  pub packages: PackageMap
}

lazy_static! {
  static ref BUILTIN_MAPPINGS: MappingsConfig =
    serde_yaml::from_str(include_str!("builtin-mappings.yaml"))
      .expect("embedded builtin mappings must be well-formed");
}

impl MappingsConfig {
  /// Parses a mapping document from YAML text.
  pub fn from_yaml(text: &str) -> Result<MappingsConfig> {
    serde_yaml::from_str(text).context(MappingsParseError)
  }

  /// The built-in mapping document embedded in the crate.
  pub fn builtin() -> &'static MappingsConfig {
    &BUILTIN_MAPPINGS
  }

  /// Merges `overlay` on top of `self`; overlay entries win on key
  /// collision.
  pub fn merge(&self, overlay: &MappingsConfig) -> MappingsConfig {
    let mut result = self.clone();

    for (key, value) in &overlay.images {
      result.images.insert(key.clone(), value.clone());
    }

    for (distro, packages) in &overlay.packages {
      let table = result.packages.entry(*distro).or_insert_with(BTreeMap::new);
      for (name, replacements) in packages {
        table.insert(name.clone(), replacements.clone());
      }
    }

    result
  }

  /// Rejects image keys with a wildcard anywhere but the trailing
  /// position. Checked before any conversion begins.
  pub(crate) fn validate(&self) -> Result<()> {
    for pattern in self.images.keys() {
      if let Some(pos) = pattern.find('*') {
        if pos != pattern.len() - 1 {
          return Err(Error::InvalidMappingPattern {
            pattern: pattern.clone()
          });
        }
      }
    }

    Ok(())
  }
}
