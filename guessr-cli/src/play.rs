use std::{
    io::{BufRead, Write},
    sync::Arc,
};

use guessr_core::{
    catalog::{Catalog, Sampling},
    error::Error,
    game::{judge, RoundOutcome, Session, Status, MAX_LIVES},
    item::{GameItem, Genre, ItemKind},
    loader::MatchupLoader,
    matchup::{Choice, Matchup, Selector},
    preview::{Preview, PreviewStatus},
};
use rand::{rngs::StdRng, SeedableRng};
use time::OffsetDateTime;

enum Input {
    Pick(Choice),
    Preview(Choice),
    End,
    Unknown,
}

fn parse_input(line: &str) -> Input {
    match line.trim() {
        "1" => Input::Pick(Choice::First),
        "2" => Input::Pick(Choice::Second),
        "p1" => Input::Preview(Choice::First),
        "p2" => Input::Preview(Choice::Second),
        "e" | "q" => Input::End,
        _ => Input::Unknown,
    }
}

/// Terminal game loop: ready screen, rounds, results, restart.
pub struct Game<R, W> {
    session: Session,
    loader: MatchupLoader,
    preview: Preview,
    rng: StdRng,
    input: R,
    out: W,
}

impl<R: BufRead, W: Write> Game<R, W> {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        sampling: Sampling,
        kind: ItemKind,
        genre: Genre,
        preview: Preview,
        input: R,
        out: W,
    ) -> Self {
        let mut rng = StdRng::from_os_rng();
        Self {
            session: Session::new(kind, genre, &mut rng),
            loader: MatchupLoader::spawn(Selector::new(catalog, sampling)),
            preview,
            rng,
            input,
            out,
        }
    }

    pub fn run(mut self) -> Result<(), Error> {
        let result = self.run_sessions();
        self.loader.shutdown();
        result
    }

    fn run_sessions(&mut self) -> Result<(), Error> {
        loop {
            if !self.ready()? {
                return Ok(());
            }
            self.play_rounds()?;
            if !self.results()? {
                return Ok(());
            }
            self.session.restart(&mut self.rng);
        }
    }

    /// `None` on end of input.
    fn read_line(&mut self) -> Result<Option<String>, Error> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn ready(&mut self) -> Result<bool, Error> {
        writeln!(
            self.out,
            "\nSpoti-Guessr | mode: {} | genre: {}",
            self.session.kind(),
            self.session.genre()
        )?;
        writeln!(
            self.out,
            "Pick the more popular of two {}. Press enter to start, q to quit.",
            self.session.kind()
        )?;
        match self.read_line()? {
            Some(line) if line != "q" => {
                self.session.start(OffsetDateTime::now_utc())?;
                self.request_matchup()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn request_matchup(&mut self) -> Result<(), Error> {
        self.loader
            .request(self.session.kind(), self.session.genre())
            .map(|_| ())
    }

    /// Waits for the requested matchup, offering a retry on failures.  `None`
    /// when the player gave up.
    fn next_matchup(&mut self) -> Result<Option<Matchup>, Error> {
        loop {
            match self.loader.recv_latest() {
                Ok(matchup) => return Ok(Some(matchup)),
                Err(err) if err.is_retryable() => {
                    writeln!(self.out, "Could not load the next round: {err}")?;
                    writeln!(self.out, "r to retry, q to quit")?;
                    match self.read_line()?.as_deref() {
                        Some("r") => self.request_matchup()?,
                        _ => return Ok(None),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn play_rounds(&mut self) -> Result<(), Error> {
        while self.session.status() == Status::Playing {
            let Some(matchup) = self.next_matchup()? else {
                self.session.end(OffsetDateTime::now_utc());
                break;
            };
            // Load the next round while the player thinks.
            self.request_matchup()?;
            self.show_round(&matchup)?;
            self.play_round(&matchup)?;
        }
        Ok(())
    }

    fn show_round(&mut self, matchup: &Matchup) -> Result<(), Error> {
        let hearts = "♥".repeat(usize::from(self.session.lives()))
            + &"♡".repeat(usize::from(MAX_LIVES - self.session.lives()));
        writeln!(
            self.out,
            "\nRound {} | score {} | streak {} | {}",
            self.session.current_round(),
            self.session.score(),
            self.session.streak(),
            hearts
        )?;
        for (number, item) in matchup.items().iter().enumerate() {
            writeln!(self.out, "  {}) {} ({})", number + 1, item.name(), item.subtitle())?;
        }
        writeln!(self.out, "1/2 to pick, p1/p2 for a preview, e to end the game")?;
        Ok(())
    }

    fn play_round(&mut self, matchup: &Matchup) -> Result<(), Error> {
        loop {
            let Some(line) = self.read_line()? else {
                self.session.end(OffsetDateTime::now_utc());
                return Ok(());
            };
            match parse_input(&line) {
                Input::Pick(choice) => return self.answer(matchup, choice),
                Input::Preview(choice) => self.play_preview(matchup.get(choice))?,
                Input::End => {
                    writeln!(self.out, "End the game? (y/n)")?;
                    if let Some("y" | "yes") = self.read_line()?.as_deref() {
                        self.session.end(OffsetDateTime::now_utc());
                        return Ok(());
                    }
                    writeln!(self.out, "1/2 to pick, p1/p2 for a preview, e to end the game")?;
                }
                Input::Unknown => writeln!(self.out, "Type 1 or 2")?,
            }
        }
    }

    fn play_preview(&mut self, item: &GameItem) -> Result<(), Error> {
        match self.preview.play(item) {
            PreviewStatus::Started => writeln!(self.out, "Playing preview of {}", item.name())?,
            PreviewStatus::Muted => writeln!(self.out, "Previews are muted")?,
            PreviewStatus::Unavailable => writeln!(self.out, "No preview available")?,
        }
        Ok(())
    }

    fn answer(&mut self, matchup: &Matchup, choice: Choice) -> Result<(), Error> {
        let verdict = judge(matchup, choice);
        let outcome = self.session.record(verdict, OffsetDateTime::now_utc())?;
        if let RoundOutcome::GameOver { score } = outcome {
            writeln!(self.out, "\nGame over! Final score: {score}")?;
            return Ok(());
        }

        let [first, second] = matchup.items();
        writeln!(
            self.out,
            "{}: {} vs {}: {}",
            first.name(),
            first.popularity(),
            second.name(),
            second.popularity()
        )?;
        match outcome {
            RoundOutcome::Correct {
                points,
                streak,
                life_restored,
            } => {
                writeln!(self.out, "Correct! +{points} (streak {streak})")?;
                if life_restored {
                    writeln!(self.out, "Streak bonus: a life is restored")?;
                }
            }
            RoundOutcome::Wrong { lives } => {
                writeln!(self.out, "Wrong! {lives} lives left")?;
            }
            RoundOutcome::GameOver { .. } => {}
        }
        // The winner plays while the result is on screen.
        let winner = matchup.get(verdict.winner);
        if let Some(link) = winner.link() {
            writeln!(self.out, "Listen to {}: {link}", winner.name())?;
        }
        self.preview.play(winner);
        Ok(())
    }

    fn results(&mut self) -> Result<bool, Error> {
        let Some(summary) = self.session.summary() else {
            return Ok(false);
        };
        writeln!(self.out, "\n{}", summary.share_text())?;
        writeln!(self.out, "Best streak: {}", summary.best_streak)?;
        writeln!(self.out, "\nr to play again, q to quit")?;
        Ok(self.read_line()?.as_deref() == Some("r"))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use guessr_core::{
        catalog::{Document, FileCatalog},
        item::Artist,
        preview::Opener,
    };

    use super::*;

    fn artist(id: &str, popularity: u32) -> GameItem {
        GameItem::Artist(Artist {
            id: id.to_string(),
            name: format!("Artist {id}"),
            image: None,
            preview_url: Some(format!("https://p/{id}")),
            popularity,
            genres: vec!["pop".to_string()],
            link: Some(format!("https://open.spotify.com/artist/{id}")),
            followers: 10,
            updated_at: 0,
        })
    }

    /// Plays a scripted game against a catalog of equally popular artists,
    /// where the first item always wins.
    fn play(script: &str) -> String {
        play_with(script, Preview::new(true))
    }

    fn play_with(script: &str, preview: Preview) -> String {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for id in ["a", "b", "c"] {
            catalog.put_item(Document::new(artist(id, 50), &mut rng)).unwrap();
        }

        let mut out = Vec::new();
        Game::new(
            Arc::new(catalog),
            Sampling::Uniform,
            ItemKind::Artist,
            Genre::Pop,
            preview,
            script.as_bytes(),
            &mut out,
        )
        .run()
        .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[derive(Clone, Default)]
    struct Recorder {
        opened: Arc<Mutex<Vec<String>>>,
    }

    impl Opener for Recorder {
        fn open(&self, url: &str) -> io::Result<()> {
            self.opened.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    #[test]
    fn three_wrong_answers_end_the_game() {
        let out = play("\n2\n2\n2\nq\n");
        assert_eq!(out.matches("Wrong!").count(), 2);
        assert!(out.contains("Game over! Final score: 0"));
        assert!(out.contains("Score: 0"));
        assert!(out.contains("Rounds: 4"));
    }

    #[test]
    fn ending_early_shows_results() {
        let out = play("\n1\n1\n1\nx\np1\ne\ny\nq\n");
        assert_eq!(out.matches("Correct!").count(), 3);
        assert!(out.contains("Type 1 or 2"));
        assert!(out.contains("Previews are muted"));
        assert!(out.contains("Score: 3"));
        assert!(out.contains("Best streak: 3"));
    }

    #[test]
    fn restart_returns_to_ready_screen() {
        let out = play("\ne\ny\nr\nq\n");
        assert_eq!(out.matches("Press enter to start").count(), 2);
        assert!(out.contains("Score: 0"));
    }

    #[test]
    fn empty_genre_offers_retry() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        let mut out = Vec::new();
        Game::new(
            Arc::new(catalog),
            Sampling::RandomKey,
            ItemKind::Track,
            Genre::Trot,
            Preview::new(true),
            "\nr\nq\nq\n".as_bytes(),
            &mut out,
        )
        .run()
        .unwrap();
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.matches("r to retry").count(), 2);
    }

    #[test]
    fn unconfirmed_end_keeps_playing() {
        let out = play("\n1\ne\nwait\n1\nq\n");
        assert_eq!(out.matches("End the game? (y/n)").count(), 2);
        assert_eq!(out.matches("Correct!").count(), 2);
        assert!(out.contains("Round 3"));
        assert!(out.contains("Score: 2"));
    }

    #[test]
    fn reveal_plays_the_winner() {
        let recorder = Recorder::default();
        let preview = Preview::with_opener(false, Box::new(recorder.clone()));
        let out = play_with("\n2\ne\ny\nq\n", preview);

        // Equal popularity, so the first item shown is the winner.
        let winner = out
            .lines()
            .find_map(|line| line.trim().strip_prefix("1) Artist "))
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap()
            .to_string();
        assert_eq!(
            *recorder.opened.lock().unwrap(),
            vec![format!("https://p/{winner}")]
        );
        assert!(out.contains(&format!(
            "Listen to Artist {winner}: https://open.spotify.com/artist/{winner}"
        )));
    }

    #[test]
    fn muted_reveal_opens_nothing() {
        let recorder = Recorder::default();
        let preview = Preview::with_opener(true, Box::new(recorder.clone()));
        play_with("\n1\ne\ny\nq\n", preview);
        assert!(recorder.opened.lock().unwrap().is_empty());
    }
}
