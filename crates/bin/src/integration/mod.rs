//! Integration module for the r3k pipeline.
//!
//! This module wires the data sources, universe construction, panel store and
//! loading estimator into the runs exposed by the CLI.

pub(crate) mod layout;
pub(crate) mod pipeline;
pub(crate) mod source;
