//! Core shared types for kiln.
//!
//! This crate is intentionally small: build options and the rules that
//! reconcile them, the immutable build path set, CI metadata and the
//! configuration error every other crate reports fatal problems with.

mod ci;
mod env;
mod error;
mod options;
mod paths;

pub use ci::CiMetadata;
pub use env::{EnvSource, MapEnv, ProcessEnv};
pub use error::ConfigurationError;
pub use options::{
    apply_option_rules, default_option_rules, BuildOptions, OptionConflict, OptionRule,
    RuleContext,
};
pub use paths::{absolutize, BuildPaths};
