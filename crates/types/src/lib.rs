//! yieldsplit shared types
//!
//! Units, cycle records, vote tallies and distribution snapshots shared by
//! the governance, storage and treasury crates.

pub mod category;
pub mod cycle;
pub mod distribution;
pub mod identity;
pub mod units;
pub mod vote;

pub use category::*;
pub use cycle::*;
pub use distribution::*;
pub use identity::*;
pub use units::*;
pub use vote::*;
