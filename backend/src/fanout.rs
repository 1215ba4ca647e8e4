use std::collections::HashMap;

use futures::stream::{self, BoxStream, StreamExt};
use shared::models::{RoundId, TallySnapshot};
use tokio::sync::watch;
use tracing::debug;

/// Latest-value channels, one per round. A burst of publications is seen by
/// slow subscribers as a single, most recent snapshot.
pub struct Fanout {
    channels: HashMap<RoundId, watch::Sender<TallySnapshot>>,
}

impl Fanout {
    pub fn new(initial: impl IntoIterator<Item = TallySnapshot>) -> Self {
        let channels = initial.into_iter()
            .map(|snapshot| (snapshot.round_id.clone(), watch::channel(snapshot).0))
            .collect();
        Self { channels }
    }

    /// Never fails; with no subscribers the value is simply kept for the next one.
    pub fn publish(&self, snapshot: TallySnapshot) {
        match self.channels.get(&snapshot.round_id) {
            Some(tx) => {
                tx.send_replace(snapshot);
            }
            None => debug!("Dropping snapshot for unknown round {}", snapshot.round_id),
        }
    }

    pub fn subscriber_count(&self, round_id: &RoundId) -> usize {
        self.channels.get(round_id).map_or(0, |tx| tx.receiver_count())
    }

    /// Starts with the current snapshot, then yields each newer one. Totals
    /// never go backwards within one stream. Dropping the stream unsubscribes.
    pub fn subscribe(&self, round_id: &RoundId) -> Option<BoxStream<'static, TallySnapshot>> {
        let rx = self.channels.get(round_id)?.subscribe();
        debug!("New tally subscriber for round {}", round_id);
        Some(snapshot_stream(rx).boxed())
    }
}

fn snapshot_stream(rx: watch::Receiver<TallySnapshot>) -> impl futures::Stream<Item = TallySnapshot> + Send {
    stream::unfold((rx, None::<u64>), |(mut rx, last_total)| async move {
        loop {
            if last_total.is_some() && rx.changed().await.is_err() {
                return None;
            }
            let snapshot = rx.borrow_and_update().clone();
            if last_total.map_or(true, |last| snapshot.total >= last) {
                let total = snapshot.total;
                return Some((snapshot, (rx, Some(total))));
            }
        }
    })
}
