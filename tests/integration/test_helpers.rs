//! Shared test helpers for engine and poller integration tests.
//!
//! Provides a settable clock, a scripted collection source and a builder
//! for a running engine so individual test modules can focus on behaviour.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Pacific::Auckland;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kerbside::poll::client::FetchFuture;
use kerbside::poll::{CollectionDates, CollectionSource, FetchError, PollCoordinator};
use kerbside::schedule::{Clock, Engine, EngineHandle, EngineView, ParameterStore};

/// Clock whose instant only moves when a test says so.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock lock") = now;
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// One scripted answer from [`FakeSource`].
pub enum Reply {
    Dates(CollectionDates),
    Network,
    Parse,
    Unexpected,
    Panic,
    Delayed(Duration, CollectionDates),
}

/// Collection source answering from a script; `Network` once exhausted.
#[derive(Default)]
pub struct FakeSource {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().expect("script lock").push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CollectionSource for FakeSource {
    fn fetch<'a>(&'a self, _address: &'a str) -> FetchFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(Reply::Network);
        Box::pin(async move {
            match reply {
                Reply::Dates(dates) => Ok(dates),
                Reply::Network => Err(FetchError::Network("connection refused".into())),
                Reply::Parse => Err(FetchError::Parse("unexpected json shape".into())),
                Reply::Unexpected => Err(FetchError::Unexpected("boom".into())),
                Reply::Panic => panic!("collection source exploded"),
                Reply::Delayed(delay, dates) => {
                    tokio::time::sleep(delay).await;
                    Ok(dates)
                }
            }
        })
    }
}

pub fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

pub fn red_only(y: i32, m: u32, d: u32) -> CollectionDates {
    CollectionDates {
        red: date(y, m, d),
        yellow: None,
    }
}

/// Auckland wall-clock time as a UTC instant.
pub fn nz(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Auckland
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .expect("unambiguous local time")
        .with_timezone(&Utc)
}

pub fn coordinator(source: Arc<FakeSource>, timeout: Duration) -> Arc<PollCoordinator> {
    Arc::new(PollCoordinator::new(
        source,
        "10 Example Street".into(),
        timeout,
    ))
}

/// A spawned engine in the Auckland zone with an in-memory parameter store.
pub struct RunningEngine {
    pub handle: EngineHandle,
    pub join: JoinHandle<()>,
    pub ct: CancellationToken,
    pub source: Arc<FakeSource>,
    pub clock: Arc<ManualClock>,
}

impl RunningEngine {
    pub fn start(source: FakeSource, now: DateTime<Utc>) -> Self {
        let source = Arc::new(source);
        let clock = Arc::new(ManualClock::new(now));
        let coordinator = coordinator(Arc::clone(&source), Duration::from_secs(2));
        let engine = Engine::new(
            Auckland,
            Arc::clone(&clock) as Arc<dyn Clock>,
            ParameterStore::in_memory(),
        );
        let ct = CancellationToken::new();
        let (handle, join) = engine.spawn(coordinator, Duration::from_secs(3600), ct.clone());
        Self {
            handle,
            join,
            ct,
            source,
            clock,
        }
    }

    /// Wait until the published view satisfies `predicate`.
    pub async fn wait_for(&self, predicate: impl Fn(&EngineView) -> bool) -> EngineView {
        let mut rx = self.handle.watch();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                {
                    let view = rx.borrow_and_update();
                    if predicate(&view) {
                        return view.clone();
                    }
                }
                rx.changed().await.expect("engine stopped");
            }
        })
        .await
        .expect("view condition not reached in time")
    }

    pub async fn stop(self) {
        self.ct.cancel();
        self.join.await.expect("engine task");
    }
}
