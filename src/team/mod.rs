//! Team relationships: the request/accept/reject ledger and the symmetric
//! teammate graph it feeds.

pub mod ledger;
pub mod membership;

pub use ledger::TeamLedger;
pub use membership::Membership;
