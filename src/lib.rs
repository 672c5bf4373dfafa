//! benchdiff - A/B benchmark comparison across git commits
//!
//! This library builds the Go benchmark binaries of two commits (with a
//! content-addressed binary cache), runs them interleaved, compares the
//! results statistically and gates on a regression threshold.

pub mod backend;
pub mod cache;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod csv_output;
pub mod error;
pub mod exec;
pub mod git;
pub mod html_output;
pub mod json_output;
pub mod layout;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod regression;
pub mod suite;
pub mod text_output;

pub use error::{BenchError, Result};
