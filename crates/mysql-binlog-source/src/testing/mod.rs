//! Testing utilities for the binlog source
//!
//! This module provides a scripted in-memory source that stands in for a
//! MySQL server in pipeline tests.

pub mod scripted;

pub use scripted::{ScriptStep, ScriptedSource};
