pub mod ledger;
pub mod snapshot;
pub mod trade;

pub use ledger::*;
pub use snapshot::*;
pub use trade::*;
