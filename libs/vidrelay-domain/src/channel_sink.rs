//! Channel-backed sink
//!
//! Both real sinks follow the same shape: a bounded channel feeds a writer
//! task that owns the actual destination (a file, a multipart upload). The
//! channel capacity is the sink's internal buffer; `try_send` failing with
//! `Full` is the backpressure signal, and the writer task's return value is
//! the sink's completion, resolved exactly once.

use std::fmt;
use std::future::Future;

use bytes::Bytes;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::debug;

use crate::{
    ingestion::SinkError,
    ports::{Acceptance, ByteSink},
};

/// A [`ByteSink`] whose writes are forwarded to a spawned writer task
///
/// The writer receives fragments in write order and runs until the channel
/// closes (after `end`) or it fails. Aborting (or dropping an un-ended sink)
/// cancels the writer without waiting for it.
pub struct ChannelSink<T> {
    tx: Option<mpsc::Sender<Bytes>>,
    pending: Option<Bytes>,
    task: Option<JoinHandle<Result<T, SinkError>>>,
}

impl<T> ChannelSink<T>
where
    T: Send + 'static,
{
    /// Spawn `writer` on the current runtime and return the sink feeding it
    ///
    /// `capacity` is the number of fragments buffered before writes report
    /// [`Acceptance::Saturated`]; it is clamped to at least one.
    pub fn spawn<F, Fut>(capacity: usize, writer: F) -> Self
    where
        F: FnOnce(mpsc::Receiver<Bytes>) -> Fut,
        Fut: Future<Output = Result<T, SinkError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(writer(rx));

        Self {
            tx: Some(tx),
            pending: None,
            task: Some(task),
        }
    }

    /// Whether a fragment is held back waiting for headroom
    pub fn is_saturated(&self) -> bool {
        self.pending.is_some()
    }
}

impl<T> ByteSink for ChannelSink<T>
where
    T: Send + 'static,
{
    type Output = T;

    fn write(&mut self, chunk: Bytes) -> Result<Acceptance, SinkError> {
        if self.pending.is_some() {
            return Err(SinkError::provider(
                "write issued before the previous fragment drained",
            ));
        }
        let tx = self.tx.as_ref().ok_or(SinkError::Closed)?;

        match tx.try_send(chunk) {
            Ok(()) => Ok(Acceptance::Accepted),
            Err(TrySendError::Full(chunk)) => {
                self.pending = Some(chunk);
                Ok(Acceptance::Saturated)
            }
            Err(TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }

    fn drained(&mut self) -> impl Future<Output = Result<(), SinkError>> + Send {
        async move {
            if self.pending.is_none() {
                return Ok(());
            }
            let tx = self.tx.as_ref().ok_or(SinkError::Closed)?;

            // Reserve before taking the fragment so a cancelled drain keeps it.
            let permit = tx.reserve().await.map_err(|_| SinkError::Closed)?;
            if let Some(chunk) = self.pending.take() {
                permit.send(chunk);
            }
            Ok(())
        }
    }

    fn end(mut self) -> impl Future<Output = Result<T, SinkError>> + Send {
        async move {
            self.drained().await?;
            drop(self.tx.take());

            let task = self.task.take().ok_or(SinkError::Closed)?;
            match task.await {
                Ok(result) => result,
                Err(err) => Err(SinkError::provider(format!("sink writer task failed: {}", err))),
            }
        }
    }

    fn abort(mut self) -> impl Future<Output = ()> + Send {
        async move {
            self.pending = None;
            drop(self.tx.take());
            if let Some(task) = self.task.take() {
                task.abort();
                debug!("Sink writer aborted");
            }
        }
    }
}

impl<T> fmt::Debug for ChannelSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSink")
            .field("open", &self.tx.is_some())
            .field("saturated", &self.pending.is_some())
            .finish()
    }
}

impl<T> Drop for ChannelSink<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
