//! FIFO of pending observers.

use std::collections::VecDeque;

use tracing::{debug, trace};

use super::observer::{ResponseObserver, ResultStreamObserver, StreamStep, SummaryObserver};
use crate::bolt::error::BoltError;
use crate::bolt::message::{Response, SuccessMessage};
use crate::bolt::packstream::{Metadata, Value};

/// What the protocol must do after a response was dispatched.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Nothing beyond what the observer did
    Handled,
    /// HELLO succeeded; the LOGON behind it is still pending
    Hello {
        /// HELLO metadata
        metadata: Metadata,
    },
    /// Authentication succeeded; the protocol completes the observer once
    /// it has applied the server metadata
    Login {
        /// HELLO or LOGON metadata
        metadata: Metadata,
        /// Observer still to complete
        observer: SummaryObserver,
    },
    /// RESET succeeded
    ResetCompleted,
    /// The server answered with FAILURE
    Failure {
        /// Error delivered to the observer
        error: BoltError,
        /// Whether the failure breaks the connection
        fatal: bool,
    },
    /// A paused stream has more records; the protocol holds it until resumed
    Suspended {
        /// Observer waiting for its next PULL
        observer: ResultStreamObserver,
    },
    /// A stream has more records; pull `n` of statement `qid`
    FetchMore {
        /// Observer to queue behind the next PULL
        observer: ResultStreamObserver,
        /// Statement id
        qid: i64,
        /// Batch size
        n: i64,
        /// Send DISCARD instead of PULL
        discard: bool,
    },
}

/// Observers in the order their requests were written.
///
/// RECORDs go to the head without removing it; a summary (SUCCESS, FAILURE,
/// IGNORED) completes the head. Once a fatal error is stored every pending
/// and future observer receives it.
#[derive(Debug, Default)]
pub struct ObserverQueue {
    observers: VecDeque<ResponseObserver>,
    current_failure: Option<BoltError>,
    fatal_error: Option<BoltError>,
}

impl ObserverQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observer.
    ///
    /// Returns false when the queue is broken; the observer then receives the
    /// stored fatal error.
    pub fn enqueue(&mut self, observer: ResponseObserver) -> bool {
        if let Some(error) = &self.fatal_error {
            debug!(observer = observer.name(), "queue is broken, failing observer");
            observer.fail(error.clone());
            return false;
        }
        self.observers.push_back(observer);
        true
    }

    /// Route one response to the head observer.
    ///
    /// A response nobody waits for, or a RECORD for an observer that does not
    /// stream, is a protocol violation.
    pub fn dispatch(&mut self, response: Response) -> Result<DispatchOutcome, BoltError> {
        let Some(observer) = self.observers.pop_front() else {
            return Err(BoltError::protocol(format!(
                "Unexpected {} with no pending request",
                response.name()
            )));
        };
        trace!(observer = observer.name(), response = response.name(), "dispatch");

        match response {
            Response::Record(values) => self.record(observer, values),
            Response::Success(summary) => Ok(self.success(observer, summary)),
            Response::Failure(failure) => {
                let error = failure.to_error();
                self.current_failure = Some(error.clone());
                let fatal = observer.failure_is_fatal();
                self.failure(observer, error.clone());
                Ok(DispatchOutcome::Failure { error, fatal })
            }
            Response::Ignored => {
                let error = self.current_failure.clone().unwrap_or(BoltError::Ignored);
                self.failure(observer, error);
                Ok(DispatchOutcome::Handled)
            }
        }
    }

    fn record(
        &mut self,
        mut observer: ResponseObserver,
        values: Vec<Value>,
    ) -> Result<DispatchOutcome, BoltError> {
        let accepted = match &mut observer {
            ResponseObserver::ResultStream(stream) => {
                stream.record(values);
                true
            }
            ResponseObserver::ProcedureRoute(route) => {
                route.record(values);
                true
            }
            _ => false,
        };
        let name = observer.name();
        self.observers.push_front(observer);
        if accepted {
            Ok(DispatchOutcome::Handled)
        } else {
            Err(BoltError::protocol(format!(
                "Received RECORD when expecting {} summary",
                name
            )))
        }
    }

    fn success(
        &mut self,
        observer: ResponseObserver,
        summary: SuccessMessage,
    ) -> DispatchOutcome {
        match observer {
            ResponseObserver::Hello => DispatchOutcome::Hello {
                metadata: summary.metadata,
            },
            ResponseObserver::Login(observer) => DispatchOutcome::Login {
                metadata: summary.metadata,
                observer,
            },
            ResponseObserver::Reset(observer) => {
                self.clear_failure();
                observer.complete(summary.metadata);
                DispatchOutcome::ResetCompleted
            }
            ResponseObserver::Logoff(observer)
            | ResponseObserver::Summary(observer)
            | ResponseObserver::Telemetry(observer) => {
                observer.complete(summary.metadata);
                DispatchOutcome::Handled
            }
            ResponseObserver::ResultStream(stream) => match stream.success(summary) {
                StreamStep::Pending(stream) => {
                    self.observers
                        .push_front(ResponseObserver::ResultStream(stream));
                    DispatchOutcome::Handled
                }
                StreamStep::Done => DispatchOutcome::Handled,
                StreamStep::Suspended(observer) => DispatchOutcome::Suspended { observer },
                StreamStep::FetchMore {
                    observer,
                    qid,
                    n,
                    discard,
                } => DispatchOutcome::FetchMore {
                    observer,
                    qid,
                    n,
                    discard,
                },
            },
            ResponseObserver::Route(route) => {
                route.success(summary);
                DispatchOutcome::Handled
            }
            ResponseObserver::ProcedureRoute(route) => {
                if let Some(route) = route.success(summary) {
                    self.observers
                        .push_front(ResponseObserver::ProcedureRoute(route));
                }
                DispatchOutcome::Handled
            }
        }
    }

    /// FAILURE and IGNORED share this path.
    fn failure(&mut self, observer: ResponseObserver, error: BoltError) {
        match observer {
            ResponseObserver::ResultStream(stream) => {
                if let StreamStep::Pending(stream) = stream.failure(error) {
                    self.observers
                        .push_front(ResponseObserver::ResultStream(stream));
                }
            }
            ResponseObserver::ProcedureRoute(route) => {
                if let Some(route) = route.failure(error) {
                    self.observers
                        .push_front(ResponseObserver::ProcedureRoute(route));
                }
            }
            other => other.fail(error),
        }
    }

    /// Fail every pending observer with `error`, in order, and refuse new
    /// ones. Only the first fatal error is kept.
    pub fn notify_fatal_error(&mut self, error: BoltError) {
        let error = self.fatal_error.get_or_insert(error).clone();
        self.current_failure = Some(error.clone());
        for observer in self.observers.drain(..) {
            observer.fail(error.clone());
        }
    }

    /// Forget the failure that caused IGNORED responses.
    pub fn clear_failure(&mut self) {
        self.current_failure = None;
    }

    /// Failure reported to observers answered with IGNORED.
    pub fn current_failure(&self) -> Option<&BoltError> {
        self.current_failure.as_ref()
    }

    /// Stored fatal error.
    pub fn fatal_error(&self) -> Option<&BoltError> {
        self.fatal_error.as_ref()
    }

    /// Whether a fatal error was stored.
    pub fn is_broken(&self) -> bool {
        self.fatal_error.is_some()
    }

    /// Whether a result stream is still waiting for records.
    pub fn has_active_stream(&self) -> bool {
        self.observers.iter().any(|o| match o {
            ResponseObserver::ResultStream(stream) => stream.is_active(),
            _ => false,
        })
    }

    /// Cancel every pending result stream.
    pub fn cancel_streams(&mut self) {
        for observer in self.observers.iter_mut() {
            if let ResponseObserver::ResultStream(stream) = observer {
                stream.cancel();
            }
        }
    }

    /// Whether a RESET is waiting for its answer.
    pub fn has_pending_reset(&self) -> bool {
        self.observers
            .iter()
            .any(|o| matches!(o, ResponseObserver::Reset(_)))
    }

    /// Number of pending observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no observer is pending.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
