//! Wake-ups and feeds behind `_changes`.
//!
//! Writers call [`Notifier::wake`] after every accepted write. Feeds hold a
//! [`Subscription`] and re-query the adapter when woken, so a wake-up only
//! says "something changed" and never carries the change itself.
//!
//! - [`wait_for_changes`]: `feed=longpoll`
//! - [`ContinuousFeed`] / [`spawn_feed`]: `feed=continuous`

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use couchspawn_core::adapter::Adapter;
use couchspawn_core::document::{ChangeEvent, ChangesOptions, ChangesResponse, Seq};
use couchspawn_core::error::Result;

/// Sent to every subscriber after a write.
#[derive(Debug, Clone)]
pub struct Wakeup {
    /// Database update sequence once the write landed.
    pub seq: Seq,
    pub doc_id: String,
}

impl Wakeup {
    /// Whether the write could have produced a row after `since`.
    /// Sequences only grow, so a wake-up at or below `since` is stale.
    pub fn is_after(&self, since: &Seq) -> bool {
        self.seq.as_num() > since.as_num()
    }
}

/// Fan-out side of a database's wake-up channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Wakeup>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn wake(&self, seq: Seq, doc_id: String) {
        // Nobody listening.
        let _ = self.tx.send(Wakeup { seq, doc_id });
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<Wakeup>,
}

impl Subscription {
    /// Next wake-up, or `None` once the notifier is gone.
    ///
    /// A lagging subscriber skips what it missed: the feed re-reads the
    /// adapter from its own `since` anyway.
    pub async fn next(&mut self) -> Option<Wakeup> {
        loop {
            match self.rx.recv().await {
                Ok(wakeup) => return Some(wakeup),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::trace!(skipped, "changes subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// `feed=longpoll`: answer at once when there are changes after
/// `opts.since`, otherwise wait up to `timeout` for a write that produces a
/// row. Writes filtered out by `doc_ids` keep the wait going.
///
/// Subscribe before calling so a write racing the first query still wakes
/// the wait.
pub async fn wait_for_changes(
    adapter: &dyn Adapter,
    mut subscription: Subscription,
    opts: ChangesOptions,
    timeout: Duration,
) -> Result<ChangesResponse> {
    let immediate = adapter.changes(opts.clone()).await?;
    if !immediate.results.is_empty() {
        return Ok(immediate);
    }

    let deadline = Instant::now() + timeout;
    loop {
        let wakeup = match tokio::time::timeout_at(deadline, subscription.next()).await {
            Ok(Some(wakeup)) => wakeup,
            Ok(None) | Err(_) => return Ok(immediate),
        };
        if !wakeup.is_after(&opts.since) {
            continue;
        }

        let response = adapter.changes(opts.clone()).await?;
        if !response.results.is_empty() {
            return Ok(response);
        }
        tracing::trace!(seq = %wakeup.seq, doc = %wakeup.doc_id, "longpoll woken without rows");
    }
}

/// `feed=continuous`: every change after `since`, then every later change
/// as it is written, until `limit` rows have been produced.
///
/// Rows are in ascending sequence order whatever `descending` says.
pub struct ContinuousFeed {
    adapter: Arc<dyn Adapter>,
    subscription: Subscription,
    opts: ChangesOptions,
    queued: VecDeque<ChangeEvent>,
    sent: u64,
    caught_up: bool,
}

impl ContinuousFeed {
    pub fn new(adapter: Arc<dyn Adapter>, subscription: Subscription, opts: ChangesOptions) -> Self {
        Self {
            adapter,
            subscription,
            opts: ChangesOptions {
                descending: false,
                ..opts
            },
            queued: VecDeque::new(),
            sent: 0,
            caught_up: false,
        }
    }

    /// Sequence of the newest row fetched so far.
    pub fn last_seq(&self) -> &Seq {
        &self.opts.since
    }

    fn exhausted(&self) -> bool {
        self.opts.limit.is_some_and(|limit| self.sent >= limit)
    }

    /// The next row. `Ok(None)` means the feed is over: the limit was hit
    /// or the database went away.
    pub async fn next(&mut self) -> Result<Option<ChangeEvent>> {
        loop {
            if self.exhausted() {
                return Ok(None);
            }
            if let Some(event) = self.queued.pop_front() {
                self.sent += 1;
                return Ok(Some(event));
            }

            if self.caught_up {
                match self.subscription.next().await {
                    Some(wakeup) if wakeup.is_after(&self.opts.since) => {}
                    Some(_) => continue,
                    None => return Ok(None),
                }
            }
            self.caught_up = true;

            let batch = self
                .adapter
                .changes(ChangesOptions {
                    limit: self.opts.limit.map(|limit| limit - self.sent),
                    ..self.opts.clone()
                })
                .await?;
            if let Some(newest) = batch.results.last() {
                self.opts.since = newest.seq.clone();
            }
            self.queued.extend(batch.results);
        }
    }
}

/// Drive `feed` on a background task and hand back its rows.
///
/// The task ends when the feed does, when the receiver is dropped, or when
/// the returned guard is dropped.
pub fn spawn_feed(mut feed: ContinuousFeed) -> (mpsc::Receiver<ChangeEvent>, DropGuard) {
    let (tx, rx) = mpsc::channel(64);
    let stop = CancellationToken::new();
    let stopped = stop.clone();

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                next = feed.next() => next,
                _ = stopped.cancelled() => return,
            };
            match event {
                Ok(Some(event)) => {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!(error = %e, "continuous changes feed failed");
                    return;
                }
            }
        }
    });

    (rx, stop.drop_guard())
}
