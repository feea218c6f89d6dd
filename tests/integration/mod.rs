//! Integration tests for layerscope
//!
//! This module contains integration tests that drive the extraction pipelines
//! through a mock runtime, a scripted fake CLI, and (optionally) real Docker.

pub mod docker;
pub mod fake_cli;
