//! CRSP queries.
//!
//! Every query targets the `crsp` schema and binds its values as parameters,
//! so it runs unchanged against [`WrdsSource`](crate::source::WrdsSource) and
//! [`SqliteSource`](crate::source::SqliteSource).

pub mod info;
pub mod market_cap;
pub mod returns;

pub use info::{StockInfo, fetch_info};
pub use market_cap::{MarketCap, fetch_market_caps};
pub use returns::fetch_returns;
