//! Domain models for the homework pipeline

pub mod coins;
pub mod homework;
pub mod leaderboard;
pub mod transcript;

pub use coins::{CoinAccount, CoinTransaction, TransactionLinks};
pub use homework::{HomeworkSubmission, ReviewAction, ReviewDecision};
pub use leaderboard::{LeaderboardEntry, StudentStanding};
pub use transcript::Transcript;
