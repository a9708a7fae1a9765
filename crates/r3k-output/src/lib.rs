#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/r3k/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod export;
pub mod membership_file;
pub mod panel_store;

pub use export::{
    ExportError, ExportFormat, Exporter, read_factor_table, read_loadings, read_stock_info,
};
pub use membership_file::read_membership;
pub use panel_store::{PanelStore, StoreError, WriteOutcome, read_many, read_panel, write_panel};
