//! Response observers.
//!
//! Every request that expects an answer is paired with one observer, queued
//! in wire order. The set of observer kinds is closed ([`ResponseObserver`])
//! and the queue dispatches responses with a `match` on it.
//!
//! Callbacks are plain boxed closures. [`SummaryObserver::oneshot`],
//! [`RouteObserver::oneshot`] and [`ResultStreamObserver::channel`] bridge
//! them into async code.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::bolt::error::BoltError;
use crate::bolt::message::{RoutingTable, SuccessMessage, FETCH_ALL, NO_STATEMENT_ID};
use crate::bolt::packstream::{Metadata, Value};

type CompleteFn<T> = Box<dyn FnOnce(T) + Send>;
type ErrorFn = Box<dyn FnOnce(BoltError) + Send>;

/// Shared sender usable from two `FnOnce` callbacks.
fn shared_sender<T>(sender: oneshot::Sender<T>) -> Arc<Mutex<Option<oneshot::Sender<T>>>> {
    Arc::new(Mutex::new(Some(sender)))
}

// ============================================================================
// SummaryObserver
// ============================================================================

/// Observer of a request answered by a single summary.
///
/// Used for LOGON/HELLO, LOGOFF, RESET, BEGIN, COMMIT, ROLLBACK and
/// TELEMETRY. Exactly one of the callbacks runs.
#[derive(Default)]
pub struct SummaryObserver {
    on_complete: Option<CompleteFn<Metadata>>,
    on_error: Option<ErrorFn>,
}

/// Observer of [`authenticate`](super::BoltProtocol::authenticate).
pub type LoginObserver = SummaryObserver;
/// Observer of [`logoff`](super::BoltProtocol::logoff).
pub type LogoffObserver = SummaryObserver;
/// Observer of [`reset`](super::BoltProtocol::reset).
pub type ResetObserver = SummaryObserver;
/// Observer of [`telemetry`](super::BoltProtocol::telemetry).
pub type TelemetryObserver = SummaryObserver;

impl SummaryObserver {
    /// Observer ignoring the outcome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the SUCCESS metadata.
    pub fn on_complete(mut self, f: impl FnOnce(Metadata) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Called with the failure.
    pub fn on_error(mut self, f: impl FnOnce(BoltError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Observer delivering its outcome through a oneshot channel.
    pub fn oneshot() -> (Self, oneshot::Receiver<Result<Metadata, BoltError>>) {
        let (tx, rx) = oneshot::channel();
        let tx = shared_sender(tx);
        let tx_err = tx.clone();
        let observer = Self::new()
            .on_complete(move |metadata| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(Ok(metadata));
                }
            })
            .on_error(move |error| {
                if let Some(tx) = tx_err.lock().take() {
                    let _ = tx.send(Err(error));
                }
            });
        (observer, rx)
    }

    pub(crate) fn complete(self, metadata: Metadata) {
        if let Some(f) = self.on_complete {
            f(metadata);
        }
    }

    pub(crate) fn fail(self, error: BoltError) {
        if let Some(f) = self.on_error {
            f(error);
        }
    }
}

impl fmt::Debug for SummaryObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummaryObserver")
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

// ============================================================================
// ResultStreamObserver
// ============================================================================

/// Event delivered by [`ResultStreamObserver::channel`].
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Column names from the RUN summary
    Keys(Vec<String>),
    /// One record
    Record(Vec<Value>),
    /// Final summary, RUN and PULL metadata merged
    Summary(Metadata),
    /// The stream failed
    Error(BoltError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamStage {
    AwaitingRun,
    Streaming,
    /// RUN failed; the PULL behind it will be ignored
    AwaitingIgnoredPull,
}

/// Pauses and resumes a [`ResultStreamObserver`] after it was handed to the
/// protocol.
///
/// Pausing never cuts a batch short: records already requested still arrive.
/// A paused stream does not request the next batch, and
/// [`resume_streams`](super::BoltProtocol::resume_streams) sends the PULL it
/// held back once the stream is resumed.
#[derive(Debug, Clone, Default)]
pub struct StreamControl {
    paused: Arc<AtomicBool>,
}

impl StreamControl {
    /// Stop requesting batches.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    /// Allow batches again.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    /// Whether the stream is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

/// Observer of a RUN and the PULLs draining it.
///
/// The RUN and the first PULL share one queue entry. When the PULL summary
/// reports `has_more`, the protocol pulls the next batch and queues the same
/// observer again. A cancelled stream discards the remaining records instead.
/// A paused stream (see [`StreamControl`]) waits for its resume.
pub struct ResultStreamObserver {
    on_keys: Option<CompleteFn<Vec<String>>>,
    on_record: Option<Box<dyn FnMut(Vec<Value>) + Send>>,
    on_complete: Option<CompleteFn<Metadata>>,
    on_error: Option<ErrorFn>,
    stage: StreamStage,
    run_metadata: Metadata,
    fetch_size: i64,
    records: u64,
    cancelled: bool,
    control: StreamControl,
}

/// Outcome of a summary for a stream.
pub(crate) enum StreamStep {
    /// Still expecting responses
    Pending(ResultStreamObserver),
    /// Finished (completed, failed or drained)
    Done,
    /// More records exist but the stream is paused
    Suspended(ResultStreamObserver),
    /// Pull (or discard) `n` more records of statement `qid`
    FetchMore {
        observer: ResultStreamObserver,
        qid: i64,
        n: i64,
        discard: bool,
    },
}

impl Default for ResultStreamObserver {
    fn default() -> Self {
        Self {
            on_keys: None,
            on_record: None,
            on_complete: None,
            on_error: None,
            stage: StreamStage::AwaitingRun,
            run_metadata: Metadata::new(),
            fetch_size: FETCH_ALL,
            records: 0,
            cancelled: false,
            control: StreamControl::default(),
        }
    }
}

impl ResultStreamObserver {
    /// Observer without callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once with the column names.
    pub fn on_keys(mut self, f: impl FnOnce(Vec<String>) + Send + 'static) -> Self {
        self.on_keys = Some(Box::new(f));
        self
    }

    /// Called for every record.
    pub fn on_record(mut self, f: impl FnMut(Vec<Value>) + Send + 'static) -> Self {
        self.on_record = Some(Box::new(f));
        self
    }

    /// Called once with the final summary.
    pub fn on_complete(mut self, f: impl FnOnce(Metadata) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Called once if the stream fails.
    pub fn on_error(mut self, f: impl FnOnce(BoltError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Observer forwarding every event to a stream.
    pub fn channel() -> (Self, UnboundedReceiverStream<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let keys_tx = tx.clone();
        let record_tx = tx.clone();
        let complete_tx = tx.clone();
        let observer = Self::new()
            .on_keys(move |keys| {
                let _ = keys_tx.send(StreamEvent::Keys(keys));
            })
            .on_record(move |record| {
                let _ = record_tx.send(StreamEvent::Record(record));
            })
            .on_complete(move |summary| {
                let _ = complete_tx.send(StreamEvent::Summary(summary));
            })
            .on_error(move |error| {
                let _ = tx.send(StreamEvent::Error(error));
            });
        (observer, UnboundedReceiverStream::new(rx))
    }

    /// Records received so far.
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Handle pausing this stream; it stays valid once the observer is queued.
    pub fn control(&self) -> StreamControl {
        self.control.clone()
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub(crate) fn set_fetch_size(&mut self, fetch_size: i64) {
        self.fetch_size = fetch_size;
    }

    /// Stop pulling; the next batch boundary discards the rest.
    pub(crate) fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub(crate) fn record(&mut self, values: Vec<Value>) {
        self.records += 1;
        if let Some(f) = self.on_record.as_mut() {
            f(values);
        }
    }

    pub(crate) fn success(mut self, summary: SuccessMessage) -> StreamStep {
        match self.stage {
            StreamStage::AwaitingRun => {
                let keys = summary.fields().unwrap_or_default();
                if let Some(f) = self.on_keys.take() {
                    f(keys);
                }
                self.run_metadata = summary.metadata;
                self.stage = StreamStage::Streaming;
                StreamStep::Pending(self)
            }
            StreamStage::Streaming if summary.has_more() => {
                if self.is_paused() {
                    StreamStep::Suspended(self)
                } else {
                    self.fetch_more()
                }
            }
            StreamStage::Streaming => {
                let mut merged = SuccessMessage::with_metadata(std::mem::take(&mut self.run_metadata));
                merged.metadata.extend(summary.metadata);
                merged.normalize();
                if let Some(f) = self.on_complete.take() {
                    f(merged.metadata);
                }
                StreamStep::Done
            }
            StreamStage::AwaitingIgnoredPull => StreamStep::Done,
        }
    }

    /// Request the next batch, or the discard of the rest once cancelled.
    pub(crate) fn fetch_more(self) -> StreamStep {
        let qid = self
            .run_metadata
            .get("qid")
            .and_then(Value::as_int)
            .unwrap_or(NO_STATEMENT_ID);
        let discard = self.cancelled;
        let n = if discard { FETCH_ALL } else { self.fetch_size };
        StreamStep::FetchMore {
            observer: self,
            qid,
            n,
            discard,
        }
    }

    /// FAILURE or IGNORED. Reports the error once.
    pub(crate) fn failure(mut self, error: BoltError) -> StreamStep {
        let run_pending = self.stage == StreamStage::AwaitingRun;
        self.report(error);
        if run_pending {
            self.stage = StreamStage::AwaitingIgnoredPull;
            StreamStep::Pending(self)
        } else {
            StreamStep::Done
        }
    }

    fn report(&mut self, error: BoltError) {
        if let Some(f) = self.on_error.take() {
            f(error);
        }
        self.on_complete = None;
    }

    pub(crate) fn fail(mut self, error: BoltError) {
        self.report(error);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.stage != StreamStage::AwaitingIgnoredPull
    }
}

impl fmt::Debug for ResultStreamObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultStreamObserver")
            .field("stage", &self.stage)
            .field("fetch_size", &self.fetch_size)
            .field("records", &self.records)
            .field("cancelled", &self.cancelled)
            .field("paused", &self.is_paused())
            .finish()
    }
}

// ============================================================================
// RouteObserver
// ============================================================================

/// Observer of a routing table request.
#[derive(Default)]
pub struct RouteObserver {
    on_complete: Option<CompleteFn<RoutingTable>>,
    on_error: Option<ErrorFn>,
}

impl RouteObserver {
    /// Observer ignoring the outcome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the routing table.
    pub fn on_complete(mut self, f: impl FnOnce(RoutingTable) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Called with the failure.
    pub fn on_error(mut self, f: impl FnOnce(BoltError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Observer delivering the table through a oneshot channel.
    pub fn oneshot() -> (Self, oneshot::Receiver<Result<RoutingTable, BoltError>>) {
        let (tx, rx) = oneshot::channel();
        let tx = shared_sender(tx);
        let tx_err = tx.clone();
        let observer = Self::new()
            .on_complete(move |table| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(Ok(table));
                }
            })
            .on_error(move |error| {
                if let Some(tx) = tx_err.lock().take() {
                    let _ = tx.send(Err(error));
                }
            });
        (observer, rx)
    }

    /// ROUTE success: the table sits under `rt`.
    pub(crate) fn success(self, summary: SuccessMessage) {
        let table = summary
            .get("rt")
            .and_then(Value::as_map)
            .ok_or_else(|| "ROUTE response without routing table".to_string())
            .and_then(RoutingTable::from_map);
        self.finish(table);
    }

    pub(crate) fn finish(self, table: Result<RoutingTable, String>) {
        match table {
            Ok(table) => {
                if let Some(f) = self.on_complete {
                    f(table);
                }
            }
            Err(message) => self.fail(BoltError::protocol(message)),
        }
    }

    pub(crate) fn fail(self, error: BoltError) {
        if let Some(f) = self.on_error {
            f(error);
        }
    }
}

impl fmt::Debug for RouteObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteObserver")
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Observer of the routing procedure used before ROUTE existed.
///
/// Collects the RUN keys and the records of the PULL, and requires exactly
/// one record.
#[derive(Debug)]
pub struct ProcedureRouteObserver {
    route: RouteObserver,
    keys: Option<Vec<String>>,
    records: Vec<Vec<Value>>,
    failed: bool,
}

impl ProcedureRouteObserver {
    pub(crate) fn new(route: RouteObserver) -> Self {
        Self {
            route,
            keys: None,
            records: Vec::new(),
            failed: false,
        }
    }

    pub(crate) fn record(&mut self, values: Vec<Value>) {
        self.records.push(values);
    }

    /// Returns the observer while the PULL summary is still due.
    pub(crate) fn success(mut self, summary: SuccessMessage) -> Option<Self> {
        if self.failed {
            return None;
        }
        if self.keys.is_none() {
            self.keys = Some(summary.fields().unwrap_or_default());
            return Some(self);
        }
        let keys = self.keys.unwrap_or_default();
        let table = if self.records.len() == 1 {
            RoutingTable::from_record(&keys, &self.records[0])
        } else {
            Err(format!(
                "Illegal response from router. Received {} records but expected only one.",
                self.records.len()
            ))
        };
        self.route.finish(table);
        None
    }

    /// FAILURE or IGNORED; the observer stays queued for the ignored PULL
    /// when the RUN failed.
    pub(crate) fn failure(mut self, error: BoltError) -> Option<Self> {
        if self.failed {
            return None;
        }
        let run_pending = self.keys.is_none();
        self.failed = true;
        std::mem::take(&mut self.route).fail(error);
        run_pending.then_some(self)
    }

    pub(crate) fn fail(self, error: BoltError) {
        if !self.failed {
            self.route.fail(error);
        }
    }
}

// ============================================================================
// ResponseObserver
// ============================================================================

/// Every kind of queued observer.
#[derive(Debug)]
pub enum ResponseObserver {
    /// HELLO followed by LOGON; the LOGON observer reports the outcome
    Hello,
    /// HELLO (< 5.1) or LOGON
    Login(LoginObserver),
    /// LOGOFF
    Logoff(LogoffObserver),
    /// RESET
    Reset(ResetObserver),
    /// RUN + PULL
    ResultStream(ResultStreamObserver),
    /// BEGIN, COMMIT, ROLLBACK
    Summary(SummaryObserver),
    /// ROUTE
    Route(RouteObserver),
    /// Routing procedure RUN + PULL
    ProcedureRoute(ProcedureRouteObserver),
    /// TELEMETRY
    Telemetry(TelemetryObserver),
}

impl ResponseObserver {
    /// Short name for log output.
    pub fn name(&self) -> &'static str {
        match self {
            ResponseObserver::Hello => "hello",
            ResponseObserver::Login(_) => "login",
            ResponseObserver::Logoff(_) => "logoff",
            ResponseObserver::Reset(_) => "reset",
            ResponseObserver::ResultStream(_) => "result stream",
            ResponseObserver::Summary(_) => "summary",
            ResponseObserver::Route(_) => "route",
            ResponseObserver::ProcedureRoute(_) => "procedure route",
            ResponseObserver::Telemetry(_) => "telemetry",
        }
    }

    /// Whether a FAILURE answering this observer breaks the connection.
    pub fn failure_is_fatal(&self) -> bool {
        matches!(
            self,
            ResponseObserver::Hello
                | ResponseObserver::Login(_)
                | ResponseObserver::Logoff(_)
                | ResponseObserver::Reset(_)
        )
    }

    /// Deliver `error` as the final outcome.
    pub(crate) fn fail(self, error: BoltError) {
        match self {
            ResponseObserver::Hello => {}
            ResponseObserver::Login(o)
            | ResponseObserver::Logoff(o)
            | ResponseObserver::Reset(o)
            | ResponseObserver::Summary(o)
            | ResponseObserver::Telemetry(o) => o.fail(error),
            ResponseObserver::ResultStream(o) => o.fail(error),
            ResponseObserver::Route(o) => o.fail(error),
            ResponseObserver::ProcedureRoute(o) => o.fail(error),
        }
    }
}
