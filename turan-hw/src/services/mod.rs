//! Homework assessment services
//!
//! Intake accepts audio, the scoring pool grades it, review handles manual
//! decisions, and every coin movement goes through the ledger.

pub mod assignment;
pub mod audio_store;
pub mod authz;
pub mod intake;
pub mod leaderboard;
pub mod ledger;
pub mod review;
pub mod scheduler;
pub mod scoring;

pub use assignment::HomeworkAssigner;
pub use audio_store::AudioStore;
pub use authz::{Authorizer, Caller, Capabilities, DbAuthorizer};
pub use intake::SubmissionIntake;
pub use leaderboard::LeaderboardRanker;
pub use ledger::{CoinLedger, PostedTransaction, Reconciliation};
pub use review::ReviewService;
pub use scheduler::{SweepIntervals, SweepScheduler};
