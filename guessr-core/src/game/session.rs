use std::fmt;

use rand::Rng;
use time::OffsetDateTime;

use super::judge::{points_for_streak, Verdict};
use crate::{
    error::Error,
    item::{Genre, ItemKind},
    item_id::encode_base62,
};

pub const MAX_LIVES: u8 = 3;

/// Every this many consecutive correct answers one life is restored.
pub const LIFE_RECOVERY_STREAK: u32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ready,
    Playing,
    Finished,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("ready"),
            Self::Playing => f.write_str("playing"),
            Self::Finished => f.write_str("finished"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u128);

impl SessionId {
    pub fn random(rng: &mut impl Rng) -> Self {
        Self(rng.random())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_base62(self.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundOutcome {
    Correct {
        points: u32,
        streak: u32,
        life_restored: bool,
    },
    Wrong {
        lives: u8,
    },
    /// Last life lost.  The session is finished and no round result is shown.
    GameOver {
        score: u32,
    },
}

/// State of one game, from the ready screen to the results.
#[derive(Clone, Debug)]
pub struct Session {
    id: SessionId,
    kind: ItemKind,
    genre: Genre,
    status: Status,
    score: u32,
    current_round: u32,
    lives: u8,
    streak: u32,
    best_streak: u32,
    started_at: Option<OffsetDateTime>,
    ended_at: Option<OffsetDateTime>,
}

impl Session {
    pub fn new(kind: ItemKind, genre: Genre, rng: &mut impl Rng) -> Self {
        Self {
            id: SessionId::random(rng),
            kind,
            genre,
            status: Status::Ready,
            score: 0,
            current_round: 0,
            lives: MAX_LIVES,
            streak: 0,
            best_streak: 0,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn genre(&self) -> Genre {
        self.genre
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn lives(&self) -> u8 {
        self.lives
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn best_streak(&self) -> u32 {
        self.best_streak
    }

    pub fn started_at(&self) -> Option<OffsetDateTime> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<OffsetDateTime> {
        self.ended_at
    }

    pub fn start(&mut self, now: OffsetDateTime) -> Result<(), Error> {
        self.require(Status::Ready, "start")?;
        self.status = Status::Playing;
        self.started_at = Some(now);
        self.current_round = 1;
        log::info!("session {} started: {} / {}", self.id, self.kind, self.genre);
        Ok(())
    }

    /// Applies a judged round to score, streak and lives.
    pub fn record(&mut self, verdict: Verdict, now: OffsetDateTime) -> Result<RoundOutcome, Error> {
        self.require(Status::Playing, "play a round of")?;
        self.current_round += 1;

        if verdict.correct {
            let points = points_for_streak(self.streak);
            self.score += points;
            self.streak += 1;
            self.best_streak = self.best_streak.max(self.streak);

            let life_restored =
                self.streak % LIFE_RECOVERY_STREAK == 0 && self.lives < MAX_LIVES;
            if life_restored {
                self.lives += 1;
            }
            Ok(RoundOutcome::Correct {
                points,
                streak: self.streak,
                life_restored,
            })
        } else {
            self.streak = 0;
            self.lives = self.lives.saturating_sub(1);
            if self.lives == 0 {
                self.end(now);
                Ok(RoundOutcome::GameOver { score: self.score })
            } else {
                Ok(RoundOutcome::Wrong { lives: self.lives })
            }
        }
    }

    /// Moves to finished and stamps the end time.  Returns `false` when the
    /// session was not playing, in which case nothing changes.
    pub fn end(&mut self, now: OffsetDateTime) -> bool {
        if self.status != Status::Playing {
            return false;
        }
        self.status = Status::Finished;
        self.ended_at = Some(now);
        log::info!(
            "session {} finished: score {} after {} rounds",
            self.id,
            self.score,
            self.current_round
        );
        true
    }

    /// Back to the ready screen with fresh counters and a new id.
    pub fn restart(&mut self, rng: &mut impl Rng) {
        let previous = self.id;
        let mut id = SessionId::random(rng);
        while id == previous {
            id = SessionId::random(rng);
        }
        *self = Self {
            id,
            ..Self::new(self.kind, self.genre, rng)
        };
    }

    pub fn summary(&self) -> Option<Summary> {
        if self.status != Status::Finished {
            return None;
        }
        let duration_secs = match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).whole_seconds().max(0) as u64,
            _ => 0,
        };
        Some(Summary {
            kind: self.kind,
            genre: self.genre,
            score: self.score,
            rounds: self.current_round,
            best_streak: self.best_streak,
            duration_secs,
            average_score: average_score(self.score, self.current_round),
        })
    }

    fn require(&self, status: Status, action: &'static str) -> Result<(), Error> {
        if self.status == status {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                from: self.status,
                action,
            })
        }
    }
}

fn average_score(score: u32, rounds: u32) -> u32 {
    if rounds == 0 {
        0
    } else {
        (f64::from(score) / f64::from(rounds)).round() as u32
    }
}

/// Results of a finished session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    pub kind: ItemKind,
    pub genre: Genre,
    pub score: u32,
    pub rounds: u32,
    pub best_streak: u32,
    pub duration_secs: u64,
    pub average_score: u32,
}

impl Summary {
    /// `m:ss`
    pub fn duration(&self) -> String {
        format!("{}:{:02}", self.duration_secs / 60, self.duration_secs % 60)
    }

    pub fn share_text(&self) -> String {
        format!(
            "Spoti-Guessr Results\n\n\
             Score: {}\n\
             Rounds: {}\n\
             Time: {}\n\
             Avg Score: {}\n\
             Mode: {}\n\
             Genre: {}",
            self.score,
            self.rounds,
            self.duration(),
            self.average_score,
            self.kind,
            self.genre,
        )
    }
}
