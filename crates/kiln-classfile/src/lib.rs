//! Static class file reading for test discovery.
//!
//! Only the structures needed to decide whether a class contains tests are
//! decoded; classes are never loaded or linked.

#![forbid(unsafe_code)]

mod classfile;
mod constant_pool;
mod error;
mod reader;

pub use crate::classfile::{
    ClassSummary, MethodSummary, ACC_ABSTRACT, ACC_INTERFACE, ACC_PUBLIC, ACC_STATIC,
    TEST_ANNOTATIONS,
};
pub use crate::error::{Error, Result};
