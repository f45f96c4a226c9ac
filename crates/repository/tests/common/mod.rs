//! Common test utilities for repository integration tests.
//!
//! This module provides a sample entity with its repository, database
//! helpers and a transaction provider that counts what it is asked to do.

#![allow(dead_code)]

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;
