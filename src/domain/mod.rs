mod account;
mod ledger;
mod money;
mod notification;
mod plan;
mod transaction;

pub use account::*;
pub use ledger::*;
pub use money::*;
pub use notification::*;
pub use plan::*;
pub use transaction::*;
