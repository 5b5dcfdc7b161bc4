use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::{
    actor::{Act, Actor, ActorHandle, Capacity},
    error::Error,
    item::{Genre, ItemKind},
    matchup::{Matchup, Selector},
    util::Sequence,
};

pub enum LoaderMsg {
    Load {
        seq: u64,
        kind: ItemKind,
        genre: Genre,
    },
    Shutdown,
}

/// A finished load, tagged with the sequence number of its request.
pub struct Loaded {
    pub seq: u64,
    pub result: Result<Matchup, Error>,
}

struct LoaderWorker {
    selector: Selector,
    replies: Sender<Loaded>,
}

impl Actor for LoaderWorker {
    type Message = LoaderMsg;
    type Error = Error;

    fn handle(&mut self, msg: LoaderMsg) -> Result<Act, Error> {
        match msg {
            LoaderMsg::Load { seq, kind, genre } => {
                let result = self.selector.next(kind, genre);
                if let Err(err) = &result {
                    log::error!("failed to load matchup #{}: {}", seq, err);
                }
                if self.replies.send(Loaded { seq, result }).is_err() {
                    // Nobody is waiting for matchups anymore.
                    return Ok(Act::Shutdown);
                }
                Ok(Act::Continue)
            }
            LoaderMsg::Shutdown => Ok(Act::Shutdown),
        }
    }
}

/// Loads matchups on a worker thread.  Only the reply to the most recent
/// request is ever handed out; replies to superseded requests are dropped.
pub struct MatchupLoader {
    actor: ActorHandle<LoaderMsg>,
    replies: Receiver<Loaded>,
    seq: Sequence,
    latest: Option<u64>,
}

impl MatchupLoader {
    pub fn spawn(selector: Selector) -> Self {
        let (replies_send, replies) = unbounded();
        let actor = LoaderWorker::spawn(Capacity::Bounded(16), move |_| LoaderWorker {
            selector,
            replies: replies_send,
        });
        Self {
            actor,
            replies,
            seq: Sequence::new(0),
            latest: None,
        }
    }

    /// Starts loading a matchup, superseding any request still in flight.
    pub fn request(&mut self, kind: ItemKind, genre: Genre) -> Result<u64, Error> {
        let seq = self.seq.advance();
        self.actor
            .send(LoaderMsg::Load { seq, kind, genre })
            .map_err(|_| Error::LoaderDisconnected)?;
        self.latest = Some(seq);
        Ok(seq)
    }

    /// Whether a request is waiting to be received.
    pub fn is_pending(&self) -> bool {
        self.latest.is_some()
    }

    /// Blocks until the reply to the latest request arrives.
    pub fn recv_latest(&mut self) -> Result<Matchup, Error> {
        let Some(latest) = self.latest else {
            return Err(Error::InvalidState("no matchup requested".to_string()));
        };
        loop {
            let loaded = self
                .replies
                .recv()
                .map_err(|_| Error::LoaderDisconnected)?;
            if loaded.seq == latest {
                self.latest = None;
                return loaded.result;
            }
            log::debug!("dropping stale matchup #{} (waiting for #{})", loaded.seq, latest);
        }
    }

    pub fn shutdown(self) {
        let _ = self.actor.send(LoaderMsg::Shutdown);
        self.actor.join();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{catalog::Sampling, item::tests::artist, matchup::tests::Scripted};

    fn loader(items: Vec<crate::item::GameItem>) -> MatchupLoader {
        let selector = Selector::with_rng(
            Arc::new(Scripted::new(items)),
            Sampling::RandomKey,
            StdRng::seed_from_u64(5),
        );
        MatchupLoader::spawn(selector)
    }

    #[test]
    fn superseded_requests_are_dropped() {
        let mut loader = loader(vec![
            artist("a", 1, &[]),
            artist("b", 2, &[]),
            artist("c", 3, &[]),
            artist("d", 4, &[]),
        ]);
        let first = loader.request(ItemKind::Artist, Genre::All).unwrap();
        let second = loader.request(ItemKind::Artist, Genre::All).unwrap();
        assert!(second > first);

        // The worker handles requests in order, so the second one got c/d.
        let matchup = loader.recv_latest().unwrap();
        assert_eq!(matchup.first().id(), "c");
        assert_eq!(matchup.second().id(), "d");
        assert!(!loader.is_pending());
        loader.shutdown();
    }

    #[test]
    fn errors_are_delivered_to_the_caller() {
        let mut loader = loader(vec![]);
        loader.request(ItemKind::Track, Genre::Rock).unwrap();
        let err = loader.recv_latest().unwrap_err();
        assert!(err.is_retryable());
        loader.shutdown();
    }

    #[test]
    fn receiving_without_request_fails() {
        let mut loader = loader(vec![]);
        assert!(loader.recv_latest().is_err());
        loader.shutdown();
    }
}
