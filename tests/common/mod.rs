//! Shared helpers for the integration tests

#![allow(dead_code)]

pub mod fakes;
pub mod test_helpers;

pub use fakes::*;
pub use test_helpers::*;
