use std::sync::Arc;

use rand::{rngs::StdRng, SeedableRng};

use crate::{
    catalog::{Catalog, Sampling},
    error::Error,
    item::{GameItem, Genre, ItemKind},
};

/// Draws allowed for the second item before the population is considered
/// too small to form a matchup.
const MAX_DRAWS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Choice {
    First,
    Second,
}

impl Choice {
    pub fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }
}

/// The two items of a round.  Never holds the same item twice.
#[derive(Clone, Debug, PartialEq)]
pub struct Matchup {
    items: [GameItem; 2],
}

impl Matchup {
    pub fn new(first: GameItem, second: GameItem) -> Result<Self, Error> {
        if first.id() == second.id() {
            return Err(Error::InvalidInput(format!(
                "matchup needs two different items, got {} twice",
                first.id()
            )));
        }
        Ok(Self {
            items: [first, second],
        })
    }

    pub fn items(&self) -> &[GameItem; 2] {
        &self.items
    }

    pub fn get(&self, choice: Choice) -> &GameItem {
        &self.items[choice.index()]
    }

    pub fn first(&self) -> &GameItem {
        self.get(Choice::First)
    }

    pub fn second(&self) -> &GameItem {
        self.get(Choice::Second)
    }
}

/// Picks random matchups out of a catalog.
pub struct Selector {
    catalog: Arc<dyn Catalog>,
    sampling: Sampling,
    rng: StdRng,
}

impl Selector {
    pub fn new(catalog: Arc<dyn Catalog>, sampling: Sampling) -> Self {
        Self::with_rng(catalog, sampling, StdRng::from_os_rng())
    }

    pub fn with_rng(catalog: Arc<dyn Catalog>, sampling: Sampling, rng: StdRng) -> Self {
        Self {
            catalog,
            sampling,
            rng,
        }
    }

    /// Two distinct items of `kind` tagged with `genre`.  The second draw is
    /// repeated while it collides with the first.
    pub fn next(&mut self, kind: ItemKind, genre: Genre) -> Result<Matchup, Error> {
        let first = self.draw(kind, genre)?;
        for attempt in 1..=MAX_DRAWS {
            let second = self.draw(kind, genre)?;
            if second.id() != first.id() {
                log::debug!(
                    "matchup {} vs {} after {} draw(s)",
                    first.id(),
                    second.id(),
                    attempt
                );
                return Matchup::new(first, second);
            }
        }
        log::warn!("could not find a second {} for genre '{}'", kind, genre);
        Err(Error::NotEnoughItems { kind, genre })
    }

    fn draw(&mut self, kind: ItemKind, genre: Genre) -> Result<GameItem, Error> {
        self.catalog
            .random_item(kind, genre, self.sampling, &mut self.rng)
    }
}
