#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/r3k/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod loadings;

// Re-export main types
pub use loadings::{
    Fit, LoadingConfig, LoadingError, LoadingEstimator, Loadings, LoadingsTable, INTERCEPT,
};
