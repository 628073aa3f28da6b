use std::future::Future;

use bytes::Bytes;

use crate::ingestion::SinkError;

/// Outcome of handing one fragment to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// The sink took the fragment and still has headroom
    Accepted,
    /// The sink holds the fragment but is full; wait for [`ByteSink::drained`]
    /// before the next write
    Saturated,
}

/// Port for an incremental byte destination
///
/// A sink accepts an ordered byte sequence through repeated `write` calls and
/// reports completion only after `end`. `end` and `abort` consume the sink, so
/// it cannot be written to once either has been called.
///
/// Implementations must:
/// - Never drop a fragment for which `write` returned `Ok`
/// - Return `Err` from `write` only for hard failures, never for backpressure
/// - Make `drained` resolve once the held fragment has been handed over
pub trait ByteSink: Send + Sync + 'static {
    /// Value the sink resolves to after a successful `end`
    type Output: Send + 'static;

    /// Offer one fragment to the sink
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the sink can no longer accept data at all.
    fn write(&mut self, chunk: Bytes) -> Result<Acceptance, SinkError>;

    /// Wait until a saturated sink has accepted its held fragment
    ///
    /// Resolves immediately when nothing is held.
    fn drained(&mut self) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Flush everything and complete the sink
    fn end(self) -> impl Future<Output = Result<Self::Output, SinkError>> + Send;

    /// Destroy the sink, discarding unflushed data; completion is not awaited
    fn abort(self) -> impl Future<Output = ()> + Send;
}
