//! Round judging and the ready / playing / finished session lifecycle.

mod judge;
mod session;

pub use self::{
    judge::{judge, points_for_streak, Verdict},
    session::{RoundOutcome, Session, SessionId, Status, Summary, LIFE_RECOVERY_STREAK, MAX_LIVES},
};
