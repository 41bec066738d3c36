//! Per-run progress buffering.
//!
//! A [`ProgressBuffer`] decides what partial state reaches the transport and
//! issues the single terminal push of a run.

use crate::measurement::{MeasurementResult, ProgressUpdate};
use crate::transport::{Transport, TransportMessage};

/// How partial state is turned into progress updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Each pushed fragment is new raw text and is forwarded as is.
    Append,
    /// Each push is the full formatted state; only the unsent part is forwarded.
    Diff,
}

/// Progress buffer scoped to one `(testId, measurementId)` pair.
///
/// `push_result` consumes the buffer, so a run cannot push two terminal
/// results.
pub struct ProgressBuffer<'a> {
    transport: &'a dyn Transport,
    test_id: String,
    measurement_id: String,
    mode: ProgressMode,
    /// Append: transcript forwarded so far. Diff: last forwarded full state.
    sent: String,
    started: bool,
}

impl<'a> ProgressBuffer<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        test_id: impl Into<String>,
        measurement_id: impl Into<String>,
        mode: ProgressMode,
    ) -> Self {
        Self {
            transport,
            test_id: test_id.into(),
            measurement_id: measurement_id.into(),
            mode,
            sent: String::new(),
            started: false,
        }
    }

    /// Forward partial state.
    ///
    /// In append mode `text` is one new transcript line; every line after the
    /// first is sent with a leading newline so the fragments concatenate into
    /// the transcript. In diff mode `text` is the complete formatted state.
    pub async fn push_progress(&mut self, text: &str) {
        let fragment = match self.mode {
            ProgressMode::Append => {
                let fragment = if self.started {
                    format!("\n{text}")
                } else {
                    text.to_string()
                };
                self.sent.push_str(&fragment);
                fragment
            }
            ProgressMode::Diff => {
                let fragment = unsent_suffix(&self.sent, text).to_string();
                self.sent = text.to_string();
                fragment
            }
        };
        self.started = true;

        if fragment.is_empty() {
            return;
        }

        self.send(TransportMessage::Progress {
            test_id: self.test_id.clone(),
            measurement_id: self.measurement_id.clone(),
            result: ProgressUpdate::new(fragment),
        })
        .await;
    }

    /// Push the terminal result and close the buffer.
    pub async fn push_result(self, result: MeasurementResult) {
        tracing::debug!(
            test_id = %self.test_id,
            measurement_id = %self.measurement_id,
            status = %result.status,
            "Pushing measurement result"
        );
        let message = TransportMessage::Result {
            test_id: self.test_id.clone(),
            measurement_id: self.measurement_id.clone(),
            result,
        };
        self.send(message).await;
    }

    async fn send(&self, message: TransportMessage) {
        if let Err(e) = self.transport.send(message).await {
            tracing::warn!(
                test_id = %self.test_id,
                measurement_id = %self.measurement_id,
                error = %e,
                "Failed to push measurement update"
            );
        }
    }
}

impl std::fmt::Debug for ProgressBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressBuffer")
            .field("test_id", &self.test_id)
            .field("measurement_id", &self.measurement_id)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Part of `current` not covered by `previous`.
///
/// When `current` extends `previous` this is the appended tail. When the state
/// was rewritten, everything after the common prefix is returned.
fn unsent_suffix<'s>(previous: &str, current: &'s str) -> &'s str {
    if let Some(rest) = current.strip_prefix(previous) {
        return rest;
    }

    let common = previous
        .char_indices()
        .zip(current.chars())
        .take_while(|((_, a), b)| a == b)
        .last()
        .map(|((i, a), _)| i + a.len_utf8())
        .unwrap_or(0);
    &current[common..]
}
