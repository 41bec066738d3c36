//! Transport layer
//!
//! Carries progress updates and terminal results from a running measurement
//! to the controller.
//!
//! - [`Transport`]: core trait, one call per message
//! - [`ChannelTransport`]: in-process delivery over a Tokio MPSC channel
//! - [`JsonLinesTransport`]: one JSON document per line on any async writer

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};

use crate::measurement::{MeasurementResult, ProgressUpdate};

/// Errors that can occur while pushing a message.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The receiving side is gone.
    #[error("transport closed")]
    Closed,

    /// Writing to the underlying stream failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Message serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A message addressed to one `(testId, measurementId)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "lowercase",
    rename_all_fields = "camelCase"
)]
pub enum TransportMessage {
    /// Partial update of a running measurement.
    Progress {
        test_id: String,
        measurement_id: String,
        result: ProgressUpdate,
    },
    /// Terminal result of a measurement.
    Result {
        test_id: String,
        measurement_id: String,
        result: MeasurementResult,
    },
}

impl TransportMessage {
    /// Measurement this message belongs to.
    pub fn measurement_id(&self) -> &str {
        match self {
            Self::Progress { measurement_id, .. } | Self::Result { measurement_id, .. } => {
                measurement_id
            }
        }
    }
}

/// Outbound connection to the controller.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one message. Ordering of successive calls must be preserved.
    async fn send(&self, message: TransportMessage) -> Result<(), TransportError>;
}

/// Transport backed by an unbounded Tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<TransportMessage>,
}

impl ChannelTransport {
    /// Create a transport and the receiver that observes its messages.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, message: TransportMessage) -> Result<(), TransportError> {
        self.tx.send(message).map_err(|_| TransportError::Closed)
    }
}

/// Transport writing newline-delimited JSON.
pub struct JsonLinesTransport<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consume the transport and return the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W> std::fmt::Debug for JsonLinesTransport<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesTransport").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<W> Transport for JsonLinesTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, message: TransportMessage) -> Result<(), TransportError> {
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}
