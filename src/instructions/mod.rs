// (C) Copyright 2024-2025 Minbase Developers

mod from;
pub use from::*;

mod arg;
pub use arg::*;

mod run;
pub use run::*;

pub(crate) fn is_false(value: &bool) -> bool {
  !*value
}
