//! Domain types - admission decisions, rules and the window engine.

mod decision;
mod ledger;
mod limit;
mod time;
pub mod window;

pub use decision::{Decision, RuleDecision};
pub use ledger::LogBook;
pub use limit::{Limit, LimitOutcome};
pub use time::StoreTime;
pub use window::{RuleOutcome, WindowLogs, WindowRule};
