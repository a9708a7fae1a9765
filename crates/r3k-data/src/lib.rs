#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/r3k/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod crsp;
pub mod error;
pub mod french;
pub mod ids;
pub mod panel;
pub mod source;

pub use error::{DataError, Result};
pub use ids::{Permno, YearMonth};
pub use panel::ReturnsPanel;
pub use source::{Param, Query, QuerySource};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
