//! Timed sentence highlighting that approximates narration pacing.
//!
//! The cursor moves on a fixed wall-clock interval and knows nothing about
//! where any audio player actually is, so it drifts for voices that read
//! faster or slower than the interval.

use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::utils::text::split_sentences;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReadAlongConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for ReadAlongConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl ReadAlongConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_interval_ms() -> u64 {
    3_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceStatus {
    Past,
    Current,
    Future,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightedSentence {
    pub text: String,
    pub status: SentenceStatus,
}

/// Everything a renderer needs to draw one step of the read-along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightState {
    pub cursor: usize,
    pub sentences: Vec<HighlightedSentence>,
}

impl HighlightState {
    pub fn current(&self) -> Option<&str> {
        self.sentences
            .iter()
            .find(|s| s.status == SentenceStatus::Current)
            .map(|s| s.text.as_str())
    }

    pub fn statuses(&self) -> Vec<SentenceStatus> {
        self.sentences.iter().map(|s| s.status).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HighlightEvent {
    Step(HighlightState),
    /// Sent once, after the cursor has passed the last sentence.
    Complete,
}

/// Position of the read-along within `len` sentences, `0..=len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightCursor {
    index: usize,
    len: usize,
}

impl HighlightCursor {
    pub fn new(len: usize) -> Self {
        Self { index: 0, len }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Moves one sentence forward. Returns false once already complete.
    pub fn advance(&mut self) -> bool {
        if self.is_complete() {
            return false;
        }
        self.index += 1;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.index >= self.len
    }

    pub fn status_of(&self, sentence: usize) -> SentenceStatus {
        use std::cmp::Ordering;
        match sentence.cmp(&self.index) {
            Ordering::Less => SentenceStatus::Past,
            Ordering::Equal => SentenceStatus::Current,
            Ordering::Greater => SentenceStatus::Future,
        }
    }

    pub fn snapshot(&self, sentences: &[String]) -> HighlightState {
        HighlightState {
            cursor: self.index,
            sentences: sentences
                .iter()
                .enumerate()
                .map(|(i, text)| HighlightedSentence {
                    text: text.clone(),
                    status: self.status_of(i),
                })
                .collect(),
        }
    }
}

/// Control side of a running read-along. Dropping it stops the timer.
#[derive(Debug)]
pub struct ReadAlongHandle {
    events: mpsc::UnboundedReceiver<HighlightEvent>,
    cursor: watch::Receiver<usize>,
    sentence_count: usize,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ReadAlongHandle {
    /// Next highlight event; `None` once the run has completed or been cancelled.
    pub async fn next_event(&mut self) -> Option<HighlightEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<HighlightEvent> {
        self.events.try_recv().ok()
    }

    /// Latest cursor position, without waiting.
    pub fn cursor(&self) -> usize {
        *self.cursor.borrow()
    }

    pub fn sentence_count(&self) -> usize {
        self.sentence_count
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ReadAlongHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Entry point for a timed read-along pass.
pub struct ReadAlong;

impl ReadAlong {
    /// Starts highlighting `text` one sentence per `interval`.
    ///
    /// Must be called from within a tokio runtime. The first step (cursor 0) is
    /// emitted immediately.
    pub fn start(text: &str, interval: Duration) -> ReadAlongHandle {
        let sentences = split_sentences(text);
        let sentence_count = sentences.len();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cursor_tx, cursor_rx) = watch::channel(0);
        let cancel = CancellationToken::new();

        debug!(
            "Starting read-along over {} sentences every {:?}",
            sentence_count, interval
        );
        let task = tokio::spawn(run_read_along(
            sentences,
            interval,
            event_tx,
            cursor_tx,
            cancel.clone(),
        ));

        ReadAlongHandle {
            events: event_rx,
            cursor: cursor_rx,
            sentence_count,
            cancel,
            task,
        }
    }
}

async fn run_read_along(
    sentences: Vec<String>,
    interval: Duration,
    events: mpsc::UnboundedSender<HighlightEvent>,
    cursor_tx: watch::Sender<usize>,
    cancel: CancellationToken,
) {
    let mut cursor = HighlightCursor::new(sentences.len());
    loop {
        if cancel.is_cancelled() {
            debug!("Read-along cancelled at sentence {}", cursor.index());
            return;
        }
        cursor_tx.send_replace(cursor.index());
        if events
            .send(HighlightEvent::Step(cursor.snapshot(&sentences)))
            .is_err()
        {
            return;
        }

        if cursor.is_complete() {
            if !cancel.is_cancelled() {
                let _ = events.send(HighlightEvent::Complete);
                debug!("Read-along complete");
            }
            return;
        }

        // cancellation wins over an interval that elapsed at the same time
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Read-along cancelled at sentence {}", cursor.index());
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
        cursor.advance();
    }
}
