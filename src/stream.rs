use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ResponseSnapshot};
use crate::normalize::NormalizedBody;

const DEFAULT_CONTENT_BUFFER_CHUNKS: usize = 16;

/// Event delivered on the consumer side of a [`RequestStream`].
/// `Complete` and `Failed` are terminal; a stream sees at most one of them.
#[derive(Debug)]
pub enum StreamEvent {
    Response(ResponseSnapshot),
    Complete(NormalizedBody),
    Failed(Error),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Failed(_))
    }
}

/// Writable side of a duplex upload stream. Writes are backpressured by the
/// stream's bounded content buffer; dropping every clone closes the content
/// body, which lets the in-flight request finish.
#[derive(Clone)]
pub struct UploadSink {
    content_tx: mpsc::Sender<Bytes>,
}

impl UploadSink {
    /// Queues one content chunk. Fails once the upload has been aborted or
    /// has already reached a terminal state.
    pub async fn write(&self, chunk: impl Into<Bytes>) -> Result<(), Error> {
        self.content_tx
            .send(chunk.into())
            .await
            .map_err(|_| Error::Aborted)
    }
}

/// Caller-owned consumer side of a streaming request. For uploads it is
/// duplex: content bytes go in through the [`UploadSink`], completion and
/// failure come out as [`StreamEvent`]s. The upload bridge binds the content
/// side exactly once.
pub struct RequestStream {
    content_rx: Option<mpsc::Receiver<Bytes>>,
    events_tx: mpsc::UnboundedSender<StreamEvent>,
    events_rx: mpsc::UnboundedReceiver<StreamEvent>,
    terminal_sent: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl RequestStream {
    pub fn new() -> (Self, UploadSink) {
        Self::with_buffer(DEFAULT_CONTENT_BUFFER_CHUNKS)
    }

    pub fn with_buffer(capacity: usize) -> (Self, UploadSink) {
        let (content_tx, content_rx) = mpsc::channel(capacity.max(1));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let stream = Self {
            content_rx: Some(content_rx),
            events_tx,
            events_rx,
            terminal_sent: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        };
        (stream, UploadSink { content_tx })
    }

    /// Next consumer-visible event. Pends until one arrives.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events_rx.recv().await
    }

    /// Cancels the in-flight operation, including any retry backoff wait. No
    /// terminal event is delivered after this returns.
    pub fn abort(&self) {
        self.terminal_sent.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub(crate) fn handle(&self) -> StreamHandle {
        StreamHandle {
            events_tx: self.events_tx.clone(),
            terminal_sent: Arc::clone(&self.terminal_sent),
            cancel: self.cancel.clone(),
        }
    }

    pub(crate) fn take_content(&mut self) -> Option<mpsc::Receiver<Bytes>> {
        self.content_rx.take()
    }
}

/// Producer side held by the executor and the upload bridge. The terminal
/// guard makes `complete`/`fail` first-writer-wins: whichever is reached
/// first under a failure race is the one the consumer observes.
#[derive(Clone)]
pub(crate) struct StreamHandle {
    events_tx: mpsc::UnboundedSender<StreamEvent>,
    terminal_sent: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl StreamHandle {
    pub(crate) fn emit_response(&self, snapshot: ResponseSnapshot) {
        if self.terminal_sent.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.events_tx.send(StreamEvent::Response(snapshot));
    }

    pub(crate) fn complete(&self, body: NormalizedBody) {
        if self.terminal_sent.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.events_tx.send(StreamEvent::Complete(body));
    }

    pub(crate) fn fail(&self, error: Error) {
        if self.terminal_sent.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.events_tx.send(StreamEvent::Failed(error));
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
