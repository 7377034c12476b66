//! Quest services
//!
//! - `period`: period keys in the configured timezone
//! - `predicates`: one verification handler per mission kind
//! - `quests`: the orchestrator that owns the ledger
//! - `visit`: website dwell tokens

pub mod period;
pub mod predicates;
pub mod quests;
pub mod visit;

pub use period::{PeriodClock, PeriodContext};
pub use quests::{Buckets, CreditSummary, QuestService, QuestSettings, Stores, Upstreams};
pub use visit::{VisitOutcome, VisitService, VisitStart, VisitTokens};
