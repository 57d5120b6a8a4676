use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use super::DatabaseError;

/// Rows buffered ahead of the consumer before the producer blocks.
const CURSOR_BUFFER: usize = 32;

/// A forward-only stream over an open database cursor.
///
/// The cursor lives on a blocking task that owns a pooled connection. It is
/// released once the rows run out, or as soon as the stream is dropped or
/// [`closed`](RecordStream::close), whichever comes first.
pub struct RecordStream<T> {
    rx: mpsc::Receiver<Result<T, DatabaseError>>,
}

impl<T> RecordStream<T> {
    /// Stops the producer and releases its connection. Rows already buffered
    /// are discarded.
    pub fn close(mut self) {
        self.rx.close();
    }
}

impl<T> Stream for RecordStream<T> {
    type Item = Result<T, DatabaseError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Hands rows from the producer task to the consumer.
pub(crate) struct RowSink<T> {
    tx: mpsc::Sender<Result<T, DatabaseError>>,
}

impl<T> RowSink<T> {
    /// Blocks until the consumer has room. Returns false once the consumer is
    /// gone, at which point the producer should stop reading.
    pub(crate) fn push(&self, row: Result<T, DatabaseError>) -> bool {
        self.tx.blocking_send(row).is_ok()
    }
}

/// Runs `producer` on a blocking task and streams whatever it pushes.
///
/// An error returned by the producer becomes the last item of the stream.
pub(crate) fn spawn_cursor<T, F>(producer: F) -> RecordStream<T>
where
    T: Send + 'static,
    F: FnOnce(&RowSink<T>) -> Result<(), DatabaseError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CURSOR_BUFFER);
    tokio::task::spawn_blocking(move || {
        let sink = RowSink { tx };
        if let Err(e) = producer(&sink) {
            if !sink.push(Err(e)) {
                debug!("cursor error dropped, stream already closed");
            }
        }
    });
    RecordStream { rx }
}
