pub mod ledger;
pub mod movement;
pub mod report;

pub use ledger::*;
pub use movement::*;
pub use report::*;
