use crate::matchup::{Choice, Matchup};

/// Result of comparing the player's pick against the popularity of both items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub choice: Choice,
    pub winner: Choice,
    pub correct: bool,
}

/// Higher popularity wins.  On a tie the first item wins.
pub fn judge(matchup: &Matchup, choice: Choice) -> Verdict {
    let winner = if matchup.second().popularity() > matchup.first().popularity() {
        Choice::Second
    } else {
        Choice::First
    };
    Verdict {
        choice,
        winner,
        correct: choice == winner,
    }
}

/// Points for a correct answer given the streak before it.
pub fn points_for_streak(streak: u32) -> u32 {
    1 + streak / 3
}
