// (C) Copyright 2024-2025 Minbase Developers

#![forbid(unsafe_code)]

//! # Dockerfile converter
//!
//! A pure Rust library for rewriting Dockerfiles to target a minimal,
//! apk-based image ecosystem: base-image references move to a different
//! registry, package-manager invocations become `apk add --no-cache`
//! commands, and GNU-flavored tool invocations are translated to their
//! busybox equivalents. Everything the converter does not touch —
//! comments, blank lines, spacing, unrecognized directives, multi-stage
//! structure — round-trips byte-for-byte.
//!
//! ## Quick start
//!
//! ```rust
//! use dockerfile_converter::{Dockerfile, Options};
//!
//! let dockerfile = Dockerfile::parse(concat!(
//!   "FROM node\n",
//!   "RUN apt-get update && apt-get install -y nano\n",
//! ));
//!
//! let converted = dockerfile.convert(&Options::default()).unwrap();
//! assert_eq!(converted.to_string(), concat!(
//!   "FROM minbase.dev/ORG/node:latest-dev\n",
//!   "USER root\n",
//!   "RUN apk add --no-cache nano\n",
//! ));
//! ```
//!
//! Parsing never fails: malformed or unknown directives pass through
//! unchanged. Conversion is a pure function of the parsed document and
//! the [`Options`], so independent documents may be converted
//! concurrently.

mod error;
mod shell;
mod image;
mod mappings;
mod instructions;
mod dockerfile;
mod convert;
mod tar;
mod adduser;

pub use error::*;
pub use shell::*;
pub use mappings::*;
pub use instructions::*;
pub use crate::dockerfile::*;
pub use convert::*;
