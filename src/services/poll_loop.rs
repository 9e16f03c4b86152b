use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::models::{SnapshotSet, Team};
use crate::services::board::{self, Board};
use crate::services::runtime_log::RuntimeLogStore;
use crate::services::score_source::{PollError, ScoreSource};

#[derive(Debug)]
pub enum PollEvent {
    Started {
        teams: usize,
    },
    Updated {
        tick: u64,
        board: Box<Board>,
    },
    /// The tick was dropped; the previous board is still the latest good one.
    Skipped {
        tick: u64,
        message: String,
    },
    Failed {
        message: String,
    },
}

/// Owns the cross-poll state: the roster being polled, the runtime log and the last good response.
pub struct PollLoop<S> {
    source: S,
    teams: Vec<Team>,
    store: RuntimeLogStore,
    latest: SnapshotSet,
    tick: u64,
}

impl<S: ScoreSource> PollLoop<S> {
    pub fn new(source: S, teams: Vec<Team>, store: RuntimeLogStore) -> Self {
        Self {
            source,
            teams,
            store,
            latest: SnapshotSet::new(),
            tick: 0,
        }
    }

    pub fn current_board(&self) -> Board {
        board::build_board(&self.teams, &self.latest, self.store.log())
    }

    /// One fetch, merge, derive pass. On error nothing is merged and the last response is kept.
    pub async fn tick(&mut self) -> Result<Board, PollError> {
        self.tick += 1;
        if self.teams.is_empty() {
            debug!("Roster is empty, skipping fetch");
            return Ok(Board::default());
        }

        let ids: Vec<String> = self.teams.iter().map(|team| team.id.clone()).collect();
        let snapshots = self.source.fetch(&ids).await?;

        let known = snapshots.values().filter(|snapshot| snapshot.is_some()).count();
        debug!(
            "Tick {}: {} of {} teams returned data",
            self.tick,
            known,
            ids.len()
        );

        if self.store.merge(&snapshots)
            && let Err(err) = self.store.save()
        {
            warn!("Failed to persist runtime log: {}", err);
        }
        self.latest = snapshots;
        Ok(self.current_board())
    }

    async fn run(
        mut self,
        interval: Duration,
        tx: Sender<PollEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            // Dropping the tick future mid-fetch abandons it before anything is merged.
            let result = tokio::select! {
                result = self.tick() => result,
                _ = shutdown.changed() => break,
            };

            let event = match result {
                Ok(board) => PollEvent::Updated {
                    tick: self.tick,
                    board: Box::new(board),
                },
                Err(err) => {
                    warn!("Poll tick {} skipped: {}", self.tick, err);
                    PollEvent::Skipped {
                        tick: self.tick,
                        message: err.to_string(),
                    }
                }
            };
            if tx.send(event).is_err() {
                info!("Board consumer went away, stopping poll loop");
                break;
            }
        }
        debug!("Poll loop finished after {} ticks", self.tick);
    }
}

/// Handle to a running poll loop. Dropping it stops the loop.
pub struct PollHandle {
    pub events: Receiver<PollEvent>,
    shutdown: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Stops the loop and returns the events it sent that were never received.
    pub fn stop(mut self) -> Vec<PollEvent> {
        self.shutdown_and_join();
        self.events.try_iter().collect()
    }

    fn shutdown_and_join(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("Poll thread panicked");
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

pub fn spawn_poll_loop<S>(poll_loop: PollLoop<S>, interval: Duration) -> PollHandle
where
    S: ScoreSource + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<PollEvent>();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let thread = thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(err) => {
                let _ = tx.send(PollEvent::Failed {
                    message: format!("failed to initialize poll runtime: {err}"),
                });
                return;
            }
        };

        let _ = tx.send(PollEvent::Started {
            teams: poll_loop.teams.len(),
        });
        runtime.block_on(poll_loop.run(interval, tx, shutdown_rx));
    });

    PollHandle {
        events: rx,
        shutdown: shutdown_tx,
        thread: Some(thread),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Image, Os, TeamSnapshot};
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays a fixed script of responses, then keeps failing.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        script: Arc<Mutex<VecDeque<Result<SnapshotSet, PollError>>>>,
        requests: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl ScriptedSource {
        fn push(&self, response: Result<SnapshotSet, PollError>) {
            self.script.lock().unwrap().push_back(response);
        }
    }

    impl ScoreSource for ScriptedSource {
        async fn fetch(&self, team_ids: &[String]) -> Result<SnapshotSet, PollError> {
            self.requests.lock().unwrap().push(team_ids.to_vec());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(PollError::SourceUnavailable("script exhausted".to_string()))
                })
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 20, 15, minute, 0).unwrap()
    }

    fn team(id: &str) -> Team {
        Team {
            id: id.to_string(),
            alias: None,
        }
    }

    fn response(minute: u32, runtime: i64) -> SnapshotSet {
        let mut set = SnapshotSet::new();
        set.insert(
            "15-0001".to_string(),
            Some(TeamSnapshot {
                images: vec![Image {
                    os: Some(Os::Windows),
                    runtime,
                    score: 10.0,
                    ..Default::default()
                }],
                updated: Some(at(minute)),
                ..Default::default()
            }),
        );
        set
    }

    #[tokio::test]
    async fn unchanged_runtime_turns_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::default();
        source.push(Ok(response(0, 120)));
        source.push(Ok(response(1, 120)));
        source.push(Ok(response(2, 120)));

        let store = RuntimeLogStore::load(dir.path());
        let mut poll_loop = PollLoop::new(source.clone(), vec![team("15-0001")], store);

        let first = poll_loop.tick().await.unwrap();
        assert!(!first.leaderboard[0].images[0].stopped);
        let second = poll_loop.tick().await.unwrap();
        assert!(!second.leaderboard[0].images[0].stopped);
        let third = poll_loop.tick().await.unwrap();
        assert!(third.leaderboard[0].images[0].stopped);

        assert_eq!(poll_loop.store.log()["15-0001"][&Os::Windows].since, at(0));
        assert_eq!(source.requests.lock().unwrap()[0], ["15-0001"]);

        // Persisted after the first merge.
        let reloaded = RuntimeLogStore::load(dir.path());
        assert_eq!(reloaded.log(), poll_loop.store.log());
    }

    #[tokio::test]
    async fn failed_tick_keeps_last_good_state() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::default();
        source.push(Ok(response(0, 120)));
        source.push(Err(PollError::MalformedSnapshot("truncated".to_string())));

        let store = RuntimeLogStore::load(dir.path());
        let mut poll_loop = PollLoop::new(source, vec![team("15-0001")], store);

        poll_loop.tick().await.unwrap();
        let log_before = poll_loop.store.log().clone();

        assert!(poll_loop.tick().await.is_err());
        assert_eq!(poll_loop.store.log(), &log_before);
        let board = poll_loop.current_board();
        assert_eq!(board.leaderboard[0].total_score, Some(10.0));
    }

    #[tokio::test]
    async fn empty_roster_does_not_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::default();
        let store = RuntimeLogStore::load(dir.path());
        let mut poll_loop = PollLoop::new(source.clone(), Vec::new(), store);

        let board = poll_loop.tick().await.unwrap();
        assert!(board.leaderboard.is_empty());
        assert!(source.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn spawned_loop_reports_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::default();
        source.push(Ok(response(0, 120)));

        let store = RuntimeLogStore::load(dir.path());
        let poll_loop = PollLoop::new(source, vec![team("15-0001")], store);
        let handle = spawn_poll_loop(poll_loop, Duration::from_millis(10));

        let started = handle.events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(started, PollEvent::Started { teams: 1 }));
        match handle.events.recv_timeout(Duration::from_secs(5)).unwrap() {
            PollEvent::Updated { tick, board } => {
                assert_eq!(tick, 1);
                assert_eq!(board.leaderboard[0].total_score, Some(10.0));
            }
            other => panic!("unexpected event {other:?}"),
        }
        match handle.events.recv_timeout(Duration::from_secs(5)).unwrap() {
            PollEvent::Skipped { tick, .. } => assert_eq!(tick, 2),
            other => panic!("unexpected event {other:?}"),
        }

        handle.stop();
    }

    /// Signals when a fetch begins, then never answers in time.
    struct StalledSource {
        entered: mpsc::Sender<()>,
    }

    impl ScoreSource for StalledSource {
        async fn fetch(&self, _team_ids: &[String]) -> Result<SnapshotSet, PollError> {
            let _ = self.entered.send(());
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(response(0, 120))
        }
    }

    #[test]
    fn stopping_mid_fetch_discards_the_response() {
        let dir = tempfile::tempdir().unwrap();
        let (entered_tx, entered_rx) = mpsc::channel();
        let source = StalledSource {
            entered: entered_tx,
        };

        let store = RuntimeLogStore::load(dir.path());
        let poll_loop = PollLoop::new(source, vec![team("15-0001")], store);
        let handle = spawn_poll_loop(poll_loop, Duration::from_millis(10));

        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let leftover = handle.stop();

        assert!(
            leftover
                .iter()
                .all(|event| matches!(event, PollEvent::Started { .. })),
            "unexpected events {leftover:?}"
        );
        assert!(!RuntimeLogStore::path_in(dir.path()).exists());
        assert!(RuntimeLogStore::load(dir.path()).log().is_empty());
    }
}
