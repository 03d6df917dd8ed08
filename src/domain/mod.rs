//! Concrete categories of the snapshot and the helpers they share.

pub mod alerts;
pub mod bounties;
pub mod invasions;
pub mod vocabulary;
pub mod void_traders;
pub mod wire;

pub use alerts::{Alert, Alerts};
pub use bounties::{Bounties, Bounty};
pub use invasions::{Invasion, Invasions};
pub use vocabulary::{Lookup, Vocabulary};
pub use void_traders::{VoidTrader, VoidTraders};
