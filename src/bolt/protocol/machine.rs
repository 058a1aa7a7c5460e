//! Versioned Bolt protocol state machine.
//!
//! [`BoltProtocol`] turns operations into framed request bytes written to a
//! [`Channel`], and turns bytes received from the server into observer
//! callbacks. Versions differ only by their [`VersionCapabilities`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, error, trace, warn, Span};

use super::capabilities::VersionCapabilities;
use super::config::ProtocolConfig;
use super::observer::{
    LoginObserver, LogoffObserver, ProcedureRouteObserver, ResetObserver, ResponseObserver,
    ResultStreamObserver, RouteObserver, StreamStep, SummaryObserver, TelemetryObserver,
};
use super::options::{AuthenticateOptions, BeginOptions, RouteOptions, RunOptions, TelemetryOptions};
use super::queue::{DispatchOutcome, ObserverQueue};
use crate::bolt::channel::Channel;
use crate::bolt::chunking::{Chunker, Dechunker};
use crate::bolt::error::{BoltError, BoltResult};
use crate::bolt::handshake::ProtocolVersion;
use crate::bolt::message::{
    BeginMessage, HelloMessage, LogonMessage, NotificationFilter, PullMessage, Request, Response,
    RouteMessage, RouteTarget, RunMessage, SuccessMessage, TransactionExtra, FETCH_ALL,
    NO_STATEMENT_ID,
};
use crate::bolt::packstream::{CodecConfig, Metadata, Packer, Unpacker, Value};

const LOGON_UNSUPPORTED: &str = "Driver is connected to a database that does not support logon. \
     Please upgrade to Neo4j 5.5.0 or later in order to use this functionality.";

const MULTI_DATABASE_UNSUPPORTED: &str =
    "Driver is connected to a database that does not support multiple databases. \
     Please upgrade to Neo4j 4.0.0 or later in order to use this functionality";

const NOTIFICATION_FILTER_UNSUPPORTED: &str =
    "Driver is connected to a database that does not support user notification filters. \
     Please upgrade to Neo4j 5.7.0 or later in order to use this functionality";

const ROUTING_PROCEDURE_V3: &str = "CALL dbms.cluster.routing.getRoutingTable($context)";
const ROUTING_PROCEDURE_V4: &str = "CALL dbms.routing.getRoutingTable($context, $database)";
const SYSTEM_DATABASE: &str = "system";

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// No HELLO sent yet
    Uninitialized,
    /// HELLO or LOGON in flight
    Authenticating,
    /// Idle and authenticated
    Ready,
    /// A result stream is open
    Streaming,
    /// The server reported a FAILURE; requests are ignored until RESET
    Failed,
    /// A fatal error occurred; terminal
    Broken,
    /// GOODBYE was sent; terminal
    Closed,
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolState::Uninitialized => "UNINITIALIZED",
            ProtocolState::Authenticating => "AUTHENTICATING",
            ProtocolState::Ready => "READY",
            ProtocolState::Streaming => "STREAMING",
            ProtocolState::Failed => "FAILED",
            ProtocolState::Broken => "BROKEN",
            ProtocolState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// One Bolt connection's protocol.
///
/// Methods take `&mut self`, so requests are written in call order and the
/// observer queue matches the wire. An operation returning `Err` wrote
/// nothing and dropped its observer; one returning `Ok` guarantees the
/// observer is called exactly once, possibly with a connection error.
///
/// Operations write to the channel when they return, except those called
/// with `flush` off: their requests stay buffered and go out with the next
/// write.
pub struct BoltProtocol<C: Channel> {
    caps: VersionCapabilities,
    config: ProtocolConfig,
    codec: Arc<CodecConfig>,
    chunker: Chunker,
    dechunker: Dechunker,
    queue: ObserverQueue,
    suspended: Vec<ResultStreamObserver>,
    channel: C,
    state: ProtocolState,
    server_metadata: Metadata,
    authenticated: bool,
    utc_patch_applied: bool,
    recv_timeout: Option<Duration>,
    telemetry_enabled: bool,
    span: Span,
}

impl<C: Channel> BoltProtocol<C> {
    pub(super) fn new(caps: VersionCapabilities, channel: C, config: ProtocolConfig) -> Self {
        let span = tracing::debug_span!(
            "bolt",
            log_id = %config.log_id(),
            version = %caps.version
        );
        Self {
            codec: Arc::new(caps.codec_config(config.integer_mode)),
            chunker: Chunker::with_chunk_size(config.max_chunk_size),
            dechunker: Dechunker::with_max_size(config.max_message_size),
            queue: ObserverQueue::new(),
            suspended: Vec::new(),
            channel,
            state: ProtocolState::Uninitialized,
            server_metadata: Metadata::new(),
            authenticated: false,
            utc_patch_applied: false,
            recv_timeout: None,
            telemetry_enabled: false,
            span,
            caps,
            config,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Negotiated version.
    pub fn version(&self) -> ProtocolVersion {
        self.caps.version
    }

    /// Features of the negotiated version.
    pub fn capabilities(&self) -> &VersionCapabilities {
        &self.caps
    }

    /// Current state.
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Active codec configuration.
    pub fn codec(&self) -> &Arc<CodecConfig> {
        &self.codec
    }

    /// Whether the UTC patch was negotiated.
    pub fn utc_patch_applied(&self) -> bool {
        self.utc_patch_applied
    }

    /// Metadata of the HELLO success (`server`, `connection_id`, `hints`).
    pub fn server_metadata(&self) -> &Metadata {
        &self.server_metadata
    }

    /// Server agent string.
    pub fn server_agent(&self) -> Option<&str> {
        self.server_metadata.get("server").and_then(Value::as_str)
    }

    /// Receive timeout hinted by the server.
    pub fn recv_timeout(&self) -> Option<Duration> {
        self.recv_timeout
    }

    /// Whether the server asked for telemetry.
    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry_enabled
    }

    /// Number of requests awaiting an answer.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of paused streams holding back their next PULL.
    pub fn suspended_streams(&self) -> usize {
        self.suspended.len()
    }

    /// Whether a fatal error occurred.
    pub fn is_broken(&self) -> bool {
        self.state == ProtocolState::Broken
    }

    /// Settings.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Authenticate the connection.
    ///
    /// The first call sends HELLO, with the credentials merged before 5.1 and
    /// followed by LOGON from 5.1. Later calls rotate the credentials with
    /// LOGOFF + LOGON, which versions before 5.1 cannot do: the connection is
    /// then broken.
    pub fn authenticate(
        &mut self,
        options: AuthenticateOptions,
        observer: LoginObserver,
    ) -> BoltResult<()> {
        self.check_notification_filter(options.notification_filter.as_ref())?;

        if self.state == ProtocolState::Uninitialized {
            let mut hello = HelloMessage::new(&options.user_agent);
            if self.caps.routing_context {
                hello = hello.with_routing(options.routing_context.as_ref());
            }
            if self.caps.utc_patch {
                hello = hello.with_patch_bolt(&["utc"]);
            }
            if let Some(keys) = self.caps.notification_filter {
                hello = hello.with_notification_filter(options.notification_filter.as_ref(), keys);
            }
            if self.caps.bolt_agent {
                hello = hello.with_bolt_agent(&options.bolt_agent);
            }

            let messages = if self.caps.logon {
                vec![
                    (Request::Hello(hello), Some(ResponseObserver::Hello)),
                    (
                        Request::Logon(LogonMessage::new(options.auth)),
                        Some(ResponseObserver::Login(observer)),
                    ),
                ]
            } else {
                vec![(
                    Request::Hello(hello.with_auth(&options.auth)),
                    Some(ResponseObserver::Login(observer)),
                )]
            };
            self.send(messages, options.flush)?;
            self.set_state(ProtocolState::Authenticating);
            return Ok(());
        }

        self.require_logon()?;
        let mut messages = Vec::with_capacity(2);
        if self.authenticated {
            messages.push((
                Request::Logoff,
                Some(ResponseObserver::Logoff(LogoffObserver::new())),
            ));
        }
        messages.push((
            Request::Logon(LogonMessage::new(options.auth)),
            Some(ResponseObserver::Login(observer)),
        ));
        self.send(messages, options.flush)?;
        self.authenticated = false;
        self.set_state(ProtocolState::Authenticating);
        Ok(())
    }

    /// Drop the credentials of the connection (5.1+).
    pub fn logoff(&mut self, observer: LogoffObserver) -> BoltResult<()> {
        self.require_logon()?;
        self.send(vec![(Request::Logoff, Some(ResponseObserver::Logoff(observer)))], true)?;
        self.authenticated = false;
        Ok(())
    }

    /// Run a query and pull its records.
    pub fn run(
        &mut self,
        query: &str,
        parameters: Metadata,
        options: RunOptions,
        mut observer: ResultStreamObserver,
    ) -> BoltResult<()> {
        self.check_transaction_options(
            options.database.as_deref(),
            options.impersonated_user.as_deref(),
            options.notification_filter.as_ref(),
        )?;
        if options.fetch_size == 0 || options.fetch_size < FETCH_ALL {
            return Err(BoltError::contract(format!(
                "Invalid fetch size {}, expected a positive number or {}",
                options.fetch_size, FETCH_ALL
            )));
        }

        let mut run = RunMessage::new(query, parameters);
        if !options.in_transaction {
            run = run
                .with_bookmarks(&options.bookmarks)
                .with_tx_config(&options.tx_config)?
                .with_mode(options.mode)
                .with_database(options.database.as_deref())
                .with_impersonated_user(options.impersonated_user.as_deref());
            if let Some(keys) = self.caps.notification_filter {
                run = run.with_notification_filter(options.notification_filter.as_ref(), keys);
            }
        }

        observer.set_fetch_size(options.fetch_size);
        let pull = self.pull_request(options.fetch_size, NO_STATEMENT_ID);
        self.send(
            vec![
                (Request::Run(run), None),
                (pull, Some(ResponseObserver::ResultStream(observer))),
            ],
            options.flush,
        )?;
        self.set_state(ProtocolState::Streaming);
        Ok(())
    }

    /// Open an explicit transaction.
    pub fn begin_transaction(
        &mut self,
        options: BeginOptions,
        observer: SummaryObserver,
    ) -> BoltResult<()> {
        self.check_transaction_options(
            options.database.as_deref(),
            options.impersonated_user.as_deref(),
            options.notification_filter.as_ref(),
        )?;

        let mut begin = BeginMessage::new()
            .with_bookmarks(&options.bookmarks)
            .with_tx_config(&options.tx_config)?
            .with_mode(options.mode)
            .with_database(options.database.as_deref())
            .with_impersonated_user(options.impersonated_user.as_deref());
        if let Some(keys) = self.caps.notification_filter {
            begin = begin.with_notification_filter(options.notification_filter.as_ref(), keys);
        }
        self.send(
            vec![(Request::Begin(begin), Some(ResponseObserver::Summary(observer)))],
            options.flush,
        )
    }

    /// Commit the open transaction. The success metadata carries the bookmark.
    pub fn commit_transaction(&mut self, observer: SummaryObserver) -> BoltResult<()> {
        self.send(vec![(Request::Commit, Some(ResponseObserver::Summary(observer)))], true)
    }

    /// Roll back the open transaction.
    pub fn rollback_transaction(&mut self, observer: SummaryObserver) -> BoltResult<()> {
        self.send(vec![(Request::Rollback, Some(ResponseObserver::Summary(observer)))], true)
    }

    /// Reset the connection: pending work is ignored by the server and a
    /// failure is acknowledged. Paused streams end with
    /// [`BoltError::Ignored`].
    pub fn reset(&mut self, observer: ResetObserver) -> BoltResult<()> {
        self.send(vec![(Request::Reset, Some(ResponseObserver::Reset(observer)))], true)?;
        self.drop_suspended(BoltError::Ignored);
        Ok(())
    }

    /// Fetch the routing table of a database.
    ///
    /// Uses ROUTE from 4.3 and the routing procedure before.
    pub fn request_routing_information(
        &mut self,
        options: RouteOptions,
        observer: RouteObserver,
    ) -> BoltResult<()> {
        if self.caps.route_message {
            let target = if self.caps.route_extra_map {
                RouteTarget::Extra {
                    database: options.database,
                    impersonated_user: options.impersonated_user,
                }
            } else {
                self.check_impersonation(options.impersonated_user.as_deref())?;
                RouteTarget::Database(options.database)
            };
            let route = RouteMessage::new(options.routing_context, options.bookmarks, target);
            return self.send(
                vec![(Request::Route(route), Some(ResponseObserver::Route(observer)))],
                true,
            );
        }

        self.check_impersonation(options.impersonated_user.as_deref())?;
        let mut parameters = HashMap::new();
        parameters.insert(
            "context".to_string(),
            Value::Map(options.routing_context),
        );
        let run = if self.caps.database {
            parameters.insert("database".to_string(), Value::from(options.database));
            RunMessage::new(ROUTING_PROCEDURE_V4, parameters)
                .with_bookmarks(&options.bookmarks)
                .with_database(Some(SYSTEM_DATABASE))
        } else {
            if options.database.is_some() {
                return Err(BoltError::contract(MULTI_DATABASE_UNSUPPORTED));
            }
            RunMessage::new(ROUTING_PROCEDURE_V3, parameters).with_bookmarks(&options.bookmarks)
        };

        let pull = self.pull_request(FETCH_ALL, NO_STATEMENT_ID);
        let observer = ProcedureRouteObserver::new(observer);
        self.send(
            vec![
                (Request::Run(run), None),
                (pull, Some(ResponseObserver::ProcedureRoute(observer))),
            ],
            true,
        )
    }

    /// Stop pulling the open result streams.
    ///
    /// Records already requested still arrive; when the server reports more,
    /// DISCARD drops them instead of another PULL. Has no effect before 4.0,
    /// where every record is pulled at once. A paused stream sends its
    /// DISCARD once resumed.
    pub fn cancel_streams(&mut self) {
        self.queue.cancel_streams();
        for stream in &mut self.suspended {
            stream.cancel();
        }
    }

    /// Send the PULL (or DISCARD) held back by every stream resumed through
    /// its [`StreamControl`](super::StreamControl). Streams still paused keep
    /// waiting.
    pub fn resume_streams(&mut self) -> BoltResult<()> {
        let (resumed, paused): (Vec<_>, Vec<_>) = std::mem::take(&mut self.suspended)
            .into_iter()
            .partition(|stream| !stream.is_paused());
        self.suspended = paused;
        for stream in resumed {
            if let StreamStep::FetchMore {
                observer,
                qid,
                n,
                discard,
            } = stream.fetch_more()
            {
                self.fetch_more(observer, qid, n, discard)?;
            }
        }
        Ok(())
    }

    /// Write every buffered request to the channel.
    ///
    /// Returns the connection error once the connection is broken.
    pub fn flush(&mut self) -> BoltResult<()> {
        let span = self.span.clone();
        let _enter = span.enter();

        self.write_buffered();
        match self.queue.fatal_error() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Report API usage (5.4+).
    ///
    /// Completes immediately without writing when the version, the server or
    /// the configuration rules telemetry out.
    pub fn telemetry(
        &mut self,
        options: TelemetryOptions,
        observer: TelemetryObserver,
    ) -> BoltResult<()> {
        if !self.caps.telemetry || !self.telemetry_enabled || self.config.telemetry_disabled {
            debug!(api = ?options.api, "telemetry skipped");
            observer.complete(Metadata::new());
            return Ok(());
        }
        self.send(
            vec![(
                Request::Telemetry(options.api),
                Some(ResponseObserver::Telemetry(observer)),
            )],
            true,
        )
    }

    /// Send GOODBYE and release the channel. Pending observers fail with
    /// [`BoltError::ConnectionClosed`].
    pub fn close(&mut self) {
        if self.state == ProtocolState::Closed {
            return;
        }
        let span = self.span.clone();
        let _enter = span.enter();

        if self.state != ProtocolState::Broken {
            let mut buf = BytesMut::new();
            let packed = Packer::new(&mut buf, &self.codec).pack_message(Request::Goodbye.tag(), &[]);
            match packed {
                Ok(()) => {
                    debug!("C: GOODBYE");
                    self.chunker.write_message(&buf);
                    let bytes = self.chunker.take();
                    if let Err(e) = self.channel.write(bytes) {
                        debug!(error = %e, "GOODBYE not delivered");
                    }
                }
                Err(e) => debug!(error = %e, "could not pack GOODBYE"),
            }
        }
        self.channel.close();
        self.queue.notify_fatal_error(BoltError::ConnectionClosed);
        self.drop_suspended(BoltError::ConnectionClosed);
        self.state = ProtocolState::Closed;
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    /// Feed bytes received from the server.
    ///
    /// Returns an error when the connection became unusable; the transport
    /// should then be closed.
    pub fn handle_bytes(&mut self, data: &[u8]) -> BoltResult<()> {
        let span = self.span.clone();
        let _enter = span.enter();

        if let Some(error) = self.queue.fatal_error() {
            return Err(error.clone());
        }
        let messages = match self.dechunker.feed(data) {
            Ok(messages) => messages,
            Err(e) => return Err(self.fail(e)),
        };

        for message in messages {
            let response = match self.decode(&message) {
                Ok(response) => response,
                Err(e) => return Err(self.fail(e)),
            };
            if response.is_record() {
                trace!("S: {}", response);
            } else {
                debug!("S: {}", response);
            }
            let outcome = match self.queue.dispatch(response) {
                Ok(outcome) => outcome,
                Err(e) => return Err(self.fail(e)),
            };
            self.apply(outcome)?;
        }
        Ok(())
    }

    /// The transport failed; every pending observer receives `error`.
    pub fn handle_transport_error(&mut self, error: BoltError) {
        self.notify_fatal_error(error);
    }

    /// Break the connection: fail every pending and future observer with
    /// `error`.
    pub fn notify_fatal_error(&mut self, error: BoltError) {
        if !self.queue.is_broken() {
            error!(log_id = %self.config.log_id(), %error, "connection broken");
        }
        if self.state != ProtocolState::Closed {
            self.state = ProtocolState::Broken;
        }
        // Buffered requests will never be answered.
        self.chunker.take();
        self.drop_suspended(error.clone());
        self.queue.notify_fatal_error(error);
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn fail(&mut self, error: BoltError) -> BoltError {
        self.notify_fatal_error(error.clone());
        error
    }

    fn decode(&self, message: &[u8]) -> BoltResult<Response> {
        let structure = Unpacker::new(message, &self.codec).unpack_message()?;
        Ok(Response::from_structure(structure)?)
    }

    fn apply(&mut self, outcome: DispatchOutcome) -> BoltResult<()> {
        match outcome {
            DispatchOutcome::Handled => {
                if self.state == ProtocolState::Streaming
                    && !self.queue.has_active_stream()
                    && self.suspended.is_empty()
                {
                    self.set_state(ProtocolState::Ready);
                }
            }
            DispatchOutcome::Hello { metadata } => self.on_hello(metadata),
            DispatchOutcome::Login { metadata, observer } => {
                let metadata = if self.caps.logon {
                    let mut merged = self.server_metadata.clone();
                    merged.extend(metadata);
                    merged
                } else {
                    self.on_hello(metadata);
                    self.server_metadata.clone()
                };
                self.authenticated = true;
                self.set_state(ProtocolState::Ready);
                observer.complete(metadata);
            }
            DispatchOutcome::ResetCompleted => {
                self.set_state(ProtocolState::Ready);
            }
            DispatchOutcome::Failure { error, fatal: true } => {
                return Err(self.fail(error));
            }
            DispatchOutcome::Failure { error, fatal: false } => {
                debug!(code = %error.code(), "request failed");
                self.set_state(ProtocolState::Failed);
                if self.config.reset_on_failure && !self.queue.has_pending_reset() {
                    self.reset(ResetObserver::new())?;
                }
            }
            DispatchOutcome::Suspended { observer } => {
                debug!("stream paused with more records");
                self.suspended.push(observer);
            }
            DispatchOutcome::FetchMore {
                observer,
                qid,
                n,
                discard,
            } => self.fetch_more(observer, qid, n, discard)?,
        }
        Ok(())
    }

    fn fetch_more(
        &mut self,
        observer: ResultStreamObserver,
        qid: i64,
        n: i64,
        discard: bool,
    ) -> BoltResult<()> {
        let request = if discard {
            Request::Discard(PullMessage::with_n(n).with_qid(qid))
        } else {
            self.pull_request(n, qid)
        };
        self.send(vec![(request, Some(ResponseObserver::ResultStream(observer)))], true)
    }

    fn drop_suspended(&mut self, error: BoltError) {
        for stream in self.suspended.drain(..) {
            stream.fail(error.clone());
        }
    }

    /// Record HELLO metadata: hints and the UTC patch.
    fn on_hello(&mut self, metadata: Metadata) {
        let hello = SuccessMessage::with_metadata(metadata);
        if let Some(hints) = hello.hints() {
            self.apply_hints(hints);
        }
        if self.caps.utc_patch
            && !self.utc_patch_applied
            && hello.patch_bolt().iter().any(|p| p == "utc")
        {
            // Messages decoded from now on use the new configuration.
            self.codec = Arc::new(self.codec.with_utc_patch());
            self.utc_patch_applied = true;
            debug!("utc patch enabled");
        }
        self.server_metadata = hello.metadata;
    }

    fn apply_hints(&mut self, hints: &Metadata) {
        // Read through `as_int`: the hint arrives as a float or big integer
        // under the other integer modes.
        if let Some(hint) = hints.get("connection.recv_timeout_seconds") {
            match hint.as_int() {
                Some(seconds) if seconds > 0 => {
                    self.recv_timeout = Some(Duration::from_secs(seconds.unsigned_abs()));
                }
                _ => warn!(
                    "Server advertised invalid connection.recv_timeout_seconds hint: {}",
                    hint
                ),
            }
        }
        match hints.get("telemetry.enabled") {
            Some(Value::Boolean(enabled)) => self.telemetry_enabled = *enabled,
            Some(other) => warn!("Server advertised invalid telemetry.enabled hint: {}", other),
            None => {}
        }
    }

    fn pull_request(&self, n: i64, qid: i64) -> Request {
        if self.caps.reactive_pull {
            Request::Pull(PullMessage::with_n(n).with_qid(qid))
        } else {
            Request::PullAll
        }
    }

    /// Pack every request, queue the observers, then chunk everything and,
    /// with `flush`, write it and anything buffered before in one channel
    /// write. A packing error leaves nothing queued or written.
    fn send(
        &mut self,
        messages: Vec<(Request, Option<ResponseObserver>)>,
        flush: bool,
    ) -> BoltResult<()> {
        let span = self.span.clone();
        let _enter = span.enter();

        let mut packed = Vec::with_capacity(messages.len());
        for (request, _) in &messages {
            let mut buf = BytesMut::new();
            Packer::new(&mut buf, &self.codec)
                .pack_message(request.tag(), &request.fields())
                .map_err(|e| BoltError::contract(e.to_string()))?;
            packed.push(buf);
        }

        let mut accepted = true;
        let mut requests = Vec::with_capacity(messages.len());
        for (request, observer) in messages {
            if let Some(observer) = observer {
                accepted &= self.queue.enqueue(observer);
            }
            requests.push(request);
        }
        if !accepted {
            return Ok(());
        }

        for (request, buf) in requests.iter().zip(&packed) {
            debug!("C: {}", request);
            self.chunker.write_message(buf);
        }
        if flush {
            self.write_buffered();
        }
        Ok(())
    }

    fn write_buffered(&mut self) {
        if self.chunker.pending() == 0 {
            return;
        }
        let bytes = self.chunker.take();
        if let Err(e) = self.channel.write(bytes) {
            self.notify_fatal_error(e);
        }
    }

    fn set_state(&mut self, state: ProtocolState) {
        if matches!(self.state, ProtocolState::Broken | ProtocolState::Closed) {
            return;
        }
        if self.state != state {
            trace!(from = %self.state, to = %state, "state change");
            self.state = state;
        }
    }

    fn require_logon(&mut self) -> BoltResult<()> {
        if self.caps.logon {
            return Ok(());
        }
        Err(self.fail(BoltError::protocol(LOGON_UNSUPPORTED)))
    }

    /// An empty filter counts as no filter.
    fn check_notification_filter(&self, filter: Option<&NotificationFilter>) -> BoltResult<()> {
        if filter.is_some_and(|filter| !filter.is_empty()) && self.caps.notification_filter.is_none()
        {
            return Err(BoltError::contract(NOTIFICATION_FILTER_UNSUPPORTED));
        }
        Ok(())
    }

    fn check_impersonation(&self, user: Option<&str>) -> BoltResult<()> {
        match user {
            Some(user) if !user.is_empty() && !self.caps.impersonation => Err(BoltError::contract(format!(
                "Driver is connected to a database that does not support user impersonation. \
                 Please upgrade to Neo4j 4.4.0 or later in order to use this functionality. \
                 Trying to impersonate {}.",
                user
            ))),
            _ => Ok(()),
        }
    }

    fn check_transaction_options(
        &self,
        database: Option<&str>,
        impersonated_user: Option<&str>,
        filter: Option<&NotificationFilter>,
    ) -> BoltResult<()> {
        if database.is_some_and(|db| !db.is_empty()) && !self.caps.database {
            return Err(BoltError::contract(MULTI_DATABASE_UNSUPPORTED));
        }
        self.check_impersonation(impersonated_user)?;
        self.check_notification_filter(filter)
    }
}

impl<C: Channel> fmt::Debug for BoltProtocol<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoltProtocol")
            .field("version", &self.caps.version)
            .field("state", &self.state)
            .field("pending", &self.queue.len())
            .field("utc_patch_applied", &self.utc_patch_applied)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::channel::MemoryChannel;
    use crate::bolt::message::{tag, AuthToken};
    use crate::bolt::packstream::Structure;
    use crate::bolt::protocol::factory;
    use parking_lot::Mutex;

    fn connect(major: u8, minor: u8) -> (BoltProtocol<MemoryChannel>, MemoryChannel) {
        let channel = MemoryChannel::new();
        let protocol = factory::create(
            ProtocolVersion::new(major, minor),
            channel.clone(),
            ProtocolConfig::default(),
        )
        .unwrap();
        (protocol, channel)
    }

    fn frame(messages: &[(u8, Vec<Value>)]) -> Vec<u8> {
        let codec = CodecConfig::default();
        let mut chunker = Chunker::new();
        for (signature, fields) in messages {
            let mut buf = BytesMut::new();
            Packer::new(&mut buf, &codec)
                .pack_message(*signature, fields)
                .unwrap();
            chunker.write_message(&buf);
        }
        chunker.take().to_vec()
    }

    fn written(channel: &MemoryChannel) -> Vec<Structure> {
        let codec = CodecConfig::default();
        Dechunker::new()
            .feed(&channel.take())
            .unwrap()
            .iter()
            .map(|m| Unpacker::new(m, &codec).unpack_message().unwrap())
            .collect()
    }

    fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn success(entries: &[(&str, Value)]) -> (u8, Vec<Value>) {
        (tag::SUCCESS, vec![map(entries)])
    }

    fn failure(code: &str) -> (u8, Vec<Value>) {
        (
            tag::FAILURE,
            vec![map(&[("code", code.into()), ("message", "failed".into())])],
        )
    }

    fn login(protocol: &mut BoltProtocol<MemoryChannel>, channel: &MemoryChannel) {
        protocol
            .authenticate(
                AuthenticateOptions::new(AuthToken::basic("neo4j", "pw")),
                LoginObserver::new(),
            )
            .unwrap();
        let responses = if protocol.capabilities().logon {
            frame(&[success(&[("server", "Neo4j/5".into())]), success(&[])])
        } else {
            frame(&[success(&[("server", "Neo4j/4".into())])])
        };
        protocol.handle_bytes(&responses).unwrap();
        channel.take();
        assert_eq!(protocol.state(), ProtocolState::Ready);
    }

    #[test]
    fn test_hello_merges_auth_before_5_1() {
        let (mut protocol, channel) = connect(4, 4);
        protocol
            .authenticate(
                AuthenticateOptions::new(AuthToken::basic("neo4j", "pw"))
                    .with_routing_context(HashMap::new()),
                LoginObserver::new(),
            )
            .unwrap();

        let messages = written(&channel);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].tag, tag::HELLO);
        let extra = messages[0].fields[0].as_map().unwrap();
        assert_eq!(extra.get("scheme"), Some(&Value::from("basic")));
        assert_eq!(extra.get("principal"), Some(&Value::from("neo4j")));
        assert!(extra.contains_key("routing"));
        assert_eq!(
            extra.get("patch_bolt"),
            Some(&Value::List(vec![Value::from("utc")]))
        );
        assert_eq!(protocol.state(), ProtocolState::Authenticating);
    }

    #[test]
    fn test_hello_then_logon_from_5_1() {
        let (mut protocol, channel) = connect(5, 3);
        let (observer, mut rx) = LoginObserver::oneshot();
        protocol
            .authenticate(AuthenticateOptions::new(AuthToken::basic("neo4j", "pw")), observer)
            .unwrap();

        let messages = written(&channel);
        let tags: Vec<u8> = messages.iter().map(|m| m.tag).collect();
        assert_eq!(tags, vec![tag::HELLO, tag::LOGON]);
        let hello = messages[0].fields[0].as_map().unwrap();
        assert!(!hello.contains_key("credentials"));
        assert!(hello.contains_key("bolt_agent"));
        assert!(!hello.contains_key("patch_bolt"));

        protocol
            .handle_bytes(&frame(&[success(&[
                ("server", "Neo4j/5.13".into()),
                ("connection_id", "bolt-1".into()),
            ])]))
            .unwrap();
        assert!(rx.try_recv().is_err());
        protocol.handle_bytes(&frame(&[success(&[])])).unwrap();

        let metadata = rx.try_recv().unwrap().unwrap();
        assert_eq!(metadata.get("connection_id"), Some(&Value::from("bolt-1")));
        assert_eq!(protocol.server_agent(), Some("Neo4j/5.13"));
        assert_eq!(protocol.state(), ProtocolState::Ready);
    }

    #[test]
    fn test_reauthentication_uses_logoff_and_logon() {
        let (mut protocol, channel) = connect(5, 1);
        login(&mut protocol, &channel);

        protocol
            .authenticate(AuthenticateOptions::new(AuthToken::bearer("token")), LoginObserver::new())
            .unwrap();
        let tags: Vec<u8> = written(&channel).iter().map(|m| m.tag).collect();
        assert_eq!(tags, vec![tag::LOGOFF, tag::LOGON]);
    }

    #[test]
    fn test_logon_unsupported_is_fatal() {
        let (mut protocol, channel) = connect(4, 4);
        login(&mut protocol, &channel);

        let err = protocol
            .authenticate(AuthenticateOptions::default(), LoginObserver::new())
            .unwrap_err();
        assert!(err.to_string().contains("does not support logon"));
        assert_eq!(protocol.state(), ProtocolState::Broken);
        assert!(channel.written().is_empty());

        let (mut protocol, _) = connect(5, 0);
        assert!(protocol.logoff(LogoffObserver::new()).is_err());
        assert!(protocol.is_broken());
    }

    #[test]
    fn test_notification_filter_gate() {
        let (mut protocol, channel) = connect(5, 1);
        let err = protocol
            .authenticate(
                AuthenticateOptions::default().with_notification_filter(NotificationFilter::disabled()),
                LoginObserver::new(),
            )
            .unwrap_err();
        assert!(matches!(err, BoltError::ContractViolation(_)));
        assert!(channel.written().is_empty());
        assert_eq!(protocol.state(), ProtocolState::Uninitialized);
    }

    #[test]
    fn test_notification_filter_keys_by_version() {
        for (minor, key) in [
            (2, "notifications_disabled_categories"),
            (5, "notifications_disabled_classifications"),
        ] {
            let (mut protocol, channel) = connect(5, minor);
            login(&mut protocol, &channel);
            let filter = NotificationFilter {
                disabled_categories: Some(vec!["HINT".to_string()]),
                ..NotificationFilter::default()
            };
            protocol
                .begin_transaction(
                    BeginOptions::new().with_notification_filter(filter),
                    SummaryObserver::new(),
                )
                .unwrap();
            let messages = written(&channel);
            let extra = messages[0].fields[0].as_map().unwrap();
            assert!(extra.contains_key(key), "5.{minor} should use {key}");
        }
    }

    #[test]
    fn test_utc_patch_applied_once_when_echoed() {
        let (mut protocol, channel) = connect(4, 4);
        protocol
            .authenticate(AuthenticateOptions::default(), LoginObserver::new())
            .unwrap();
        channel.take();
        assert!(!protocol.codec().uses_utc_date_times());

        protocol
            .handle_bytes(&frame(&[success(&[(
                "patch_bolt",
                Value::List(vec!["utc".into()]),
            )])]))
            .unwrap();
        assert!(protocol.utc_patch_applied());
        assert!(protocol.codec().uses_utc_date_times());
    }

    #[test]
    fn test_utc_patch_not_applied_without_echo() {
        let (mut protocol, channel) = connect(4, 3);
        login(&mut protocol, &channel);
        assert!(!protocol.utc_patch_applied());
        assert!(!protocol.codec().uses_utc_date_times());
    }

    #[test]
    fn test_hints() {
        let (mut protocol, _) = connect(5, 4);
        protocol
            .authenticate(AuthenticateOptions::default(), LoginObserver::new())
            .unwrap();
        let hints = map(&[
            ("connection.recv_timeout_seconds", Value::Integer(120)),
            ("telemetry.enabled", Value::Boolean(true)),
        ]);
        protocol
            .handle_bytes(&frame(&[success(&[("hints", hints)]), success(&[])]))
            .unwrap();
        assert_eq!(protocol.recv_timeout(), Some(Duration::from_secs(120)));
        assert!(protocol.telemetry_enabled());
    }

    #[test]
    fn test_invalid_recv_timeout_hint_is_ignored() {
        let (mut protocol, _) = connect(4, 3);
        protocol
            .authenticate(AuthenticateOptions::default(), LoginObserver::new())
            .unwrap();
        let hints = map(&[("connection.recv_timeout_seconds", Value::Integer(-1))]);
        protocol
            .handle_bytes(&frame(&[success(&[("hints", hints)])]))
            .unwrap();
        assert_eq!(protocol.recv_timeout(), None);
    }

    #[test]
    fn test_telemetry() {
        let (mut protocol, channel) = connect(5, 4);
        login(&mut protocol, &channel);

        // Not enabled by the server: completes without writing.
        let done = Arc::new(Mutex::new(false));
        let flag = done.clone();
        protocol
            .telemetry(
                TelemetryOptions::new(crate::bolt::message::TelemetryApi::ExecuteQuery),
                TelemetryObserver::new().on_complete(move |_| *flag.lock() = true),
            )
            .unwrap();
        assert!(*done.lock());
        assert!(channel.written().is_empty());

        protocol.telemetry_enabled = true;
        protocol
            .telemetry(
                TelemetryOptions::new(crate::bolt::message::TelemetryApi::ExecuteQuery),
                TelemetryObserver::new(),
            )
            .unwrap();
        let messages = written(&channel);
        assert_eq!(messages[0].tag, tag::TELEMETRY);
        assert_eq!(
            messages[0].fields[0].as_map().unwrap().get("api"),
            Some(&Value::Integer(3))
        );
    }

    #[test]
    fn test_failure_sends_reset_and_recovers() {
        let (mut protocol, channel) = connect(5, 0);
        login(&mut protocol, &channel);
        let (observer, mut rx) = SummaryObserver::oneshot();
        protocol.begin_transaction(BeginOptions::new(), observer).unwrap();
        channel.take();

        protocol
            .handle_bytes(&frame(&[failure("Neo.ClientError.Transaction.Invalid")]))
            .unwrap();
        assert!(rx.try_recv().unwrap().is_err());
        assert_eq!(protocol.state(), ProtocolState::Failed);
        let tags: Vec<u8> = written(&channel).iter().map(|m| m.tag).collect();
        assert_eq!(tags, vec![tag::RESET]);

        protocol.handle_bytes(&frame(&[success(&[])])).unwrap();
        assert_eq!(protocol.state(), ProtocolState::Ready);
        assert_eq!(protocol.pending(), 0);
    }

    #[test]
    fn test_failure_without_auto_reset() {
        let channel = MemoryChannel::new();
        let config = ProtocolConfig::builder().with_reset_on_failure(false).build();
        let mut protocol = factory::create(ProtocolVersion::V4_0, channel.clone(), config).unwrap();
        login(&mut protocol, &channel);
        protocol.commit_transaction(SummaryObserver::new()).unwrap();
        channel.take();
        protocol
            .handle_bytes(&frame(&[failure("Neo.ClientError.Transaction.Invalid")]))
            .unwrap();
        assert!(channel.written().is_empty());
        assert_eq!(protocol.state(), ProtocolState::Failed);
    }

    #[test]
    fn test_reset_on_ready_is_idempotent() {
        let (mut protocol, channel) = connect(4, 4);
        login(&mut protocol, &channel);
        for _ in 0..2 {
            protocol.reset(ResetObserver::new()).unwrap();
            protocol.handle_bytes(&frame(&[success(&[])])).unwrap();
            assert_eq!(protocol.state(), ProtocolState::Ready);
            assert_eq!(protocol.pending(), 0);
        }
    }

    #[test]
    fn test_has_more_pulls_next_batch() {
        let (mut protocol, channel) = connect(4, 4);
        login(&mut protocol, &channel);
        let records = Arc::new(Mutex::new(0));
        let count = records.clone();
        protocol
            .run(
                "UNWIND range(1, 3) AS x RETURN x",
                HashMap::new(),
                RunOptions::new().with_fetch_size(2),
                ResultStreamObserver::new().on_record(move |_| *count.lock() += 1),
            )
            .unwrap();
        let messages = written(&channel);
        assert_eq!(
            messages[1].fields[0].as_map().unwrap().get("n"),
            Some(&Value::Integer(2))
        );

        protocol
            .handle_bytes(&frame(&[
                success(&[("fields", Value::List(vec!["x".into()])), ("qid", 0.into())]),
                (tag::RECORD, vec![Value::List(vec![1.into()])]),
                (tag::RECORD, vec![Value::List(vec![2.into()])]),
                success(&[("has_more", Value::Boolean(true))]),
            ]))
            .unwrap();
        let messages = written(&channel);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].tag, tag::PULL);
        let pull = messages[0].fields[0].as_map().unwrap();
        assert_eq!(pull.get("n"), Some(&Value::Integer(2)));
        assert_eq!(pull.get("qid"), Some(&Value::Integer(0)));
        assert_eq!(protocol.state(), ProtocolState::Streaming);

        protocol
            .handle_bytes(&frame(&[
                (tag::RECORD, vec![Value::List(vec![3.into()])]),
                success(&[]),
            ]))
            .unwrap();
        assert_eq!(*records.lock(), 3);
        assert_eq!(protocol.state(), ProtocolState::Ready);
    }

    #[test]
    fn test_cancelled_stream_discards_rest() {
        let (mut protocol, channel) = connect(5, 0);
        login(&mut protocol, &channel);
        let (observer, mut rx) = SummaryObserver::oneshot();
        let done = Arc::new(Mutex::new(None));
        let summary = done.clone();
        protocol
            .run(
                "UNWIND range(1, 100) AS x RETURN x",
                HashMap::new(),
                RunOptions::new().with_fetch_size(10),
                ResultStreamObserver::new().on_complete(move |meta| *summary.lock() = Some(meta)),
            )
            .unwrap();
        protocol.commit_transaction(observer).unwrap();
        channel.take();

        protocol.cancel_streams();
        protocol
            .handle_bytes(&frame(&[
                success(&[("fields", Value::List(vec!["x".into()])), ("qid", 4.into())]),
                success(&[("has_more", Value::Boolean(true))]),
            ]))
            .unwrap();
        let messages = written(&channel);
        assert_eq!(messages[0].tag, tag::DISCARD);
        let discard = messages[0].fields[0].as_map().unwrap();
        assert_eq!(discard.get("n"), Some(&Value::Integer(-1)));
        assert_eq!(discard.get("qid"), Some(&Value::Integer(4)));

        // COMMIT answers before the DISCARD queued behind it.
        protocol
            .handle_bytes(&frame(&[success(&[]), success(&[("type", "r".into())])]))
            .unwrap();
        assert!(rx.try_recv().unwrap().is_ok());
        assert!(done.lock().is_some());
        assert_eq!(protocol.pending(), 0);
    }

    #[test]
    fn test_bolt_3_uses_pull_all() {
        let (mut protocol, channel) = connect(3, 0);
        login(&mut protocol, &channel);
        protocol
            .run("RETURN 1", HashMap::new(), RunOptions::new(), ResultStreamObserver::new())
            .unwrap();
        let messages = written(&channel);
        assert_eq!(messages[1].tag, tag::PULL);
        assert!(messages[1].fields.is_empty());

        let err = protocol
            .run(
                "RETURN 1",
                HashMap::new(),
                RunOptions::new().with_database("neo4j"),
                ResultStreamObserver::new(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("multiple databases"));
    }

    #[test]
    fn test_unpackable_parameter_is_rejected() {
        let (mut protocol, channel) = connect(5, 0);
        login(&mut protocol, &channel);
        let mut parameters = HashMap::new();
        parameters.insert(
            "n".to_string(),
            Value::Node(crate::bolt::packstream::Node {
                id: 1,
                labels: vec![],
                properties: HashMap::new(),
                element_id: None,
            }),
        );
        let err = protocol
            .run("RETURN $n", parameters, RunOptions::new(), ResultStreamObserver::new())
            .unwrap_err();
        assert!(matches!(err, BoltError::ContractViolation(_)));
        assert_eq!(protocol.pending(), 0);
        assert!(channel.written().is_empty());
    }

    #[test]
    fn test_route_message_variants() {
        let (mut protocol, channel) = connect(4, 3);
        login(&mut protocol, &channel);
        protocol
            .request_routing_information(
                RouteOptions::new().with_database("movies"),
                RouteObserver::new(),
            )
            .unwrap();
        let messages = written(&channel);
        assert_eq!(messages[0].tag, tag::ROUTE);
        assert_eq!(messages[0].fields[2], Value::from("movies"));
        assert!(protocol
            .request_routing_information(
                RouteOptions::new().with_impersonated_user("bob"),
                RouteObserver::new(),
            )
            .is_err());

        let (mut protocol, channel) = connect(4, 4);
        login(&mut protocol, &channel);
        protocol
            .request_routing_information(
                RouteOptions::new().with_impersonated_user("bob"),
                RouteObserver::new(),
            )
            .unwrap();
        let messages = written(&channel);
        let extra = messages[0].fields[2].as_map().unwrap();
        assert_eq!(extra.get("imp_user"), Some(&Value::from("bob")));
    }

    #[test]
    fn test_routing_procedure_before_4_3() {
        let (mut protocol, channel) = connect(4, 1);
        login(&mut protocol, &channel);
        let (observer, mut rx) = RouteObserver::oneshot();
        protocol
            .request_routing_information(RouteOptions::new(), observer)
            .unwrap();

        let messages = written(&channel);
        assert_eq!(messages[0].tag, tag::RUN);
        assert_eq!(messages[0].fields[0], Value::from(ROUTING_PROCEDURE_V4));
        assert_eq!(
            messages[0].fields[2].as_map().unwrap().get("db"),
            Some(&Value::from("system"))
        );

        let server = map(&[
            ("role", "WRITE".into()),
            ("addresses", Value::List(vec!["core1:7687".into()])),
        ]);
        protocol
            .handle_bytes(&frame(&[
                success(&[("fields", Value::List(vec!["ttl".into(), "servers".into()]))]),
                (
                    tag::RECORD,
                    vec![Value::List(vec![300.into(), Value::List(vec![server])])],
                ),
                success(&[]),
            ]))
            .unwrap();
        let table = rx.try_recv().unwrap().unwrap();
        assert_eq!(table.ttl, 300);
        assert_eq!(
            table.addresses(crate::bolt::message::ServerRole::Write),
            vec!["core1:7687"]
        );
    }

    #[test]
    fn test_routing_procedure_on_bolt_3() {
        let (mut protocol, channel) = connect(3, 0);
        login(&mut protocol, &channel);
        protocol
            .request_routing_information(RouteOptions::new(), RouteObserver::new())
            .unwrap();
        let messages = written(&channel);
        assert_eq!(messages[0].fields[0], Value::from(ROUTING_PROCEDURE_V3));
        assert!(protocol
            .request_routing_information(
                RouteOptions::new().with_database("movies"),
                RouteObserver::new()
            )
            .is_err());
    }

    #[test]
    fn test_close_sends_goodbye() {
        let (mut protocol, channel) = connect(5, 0);
        login(&mut protocol, &channel);
        protocol.close();
        let messages = written(&channel);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].tag, tag::GOODBYE);
        assert!(channel.is_closed());
        assert_eq!(protocol.state(), ProtocolState::Closed);

        let (observer, mut rx) = SummaryObserver::oneshot();
        protocol.commit_transaction(observer).unwrap();
        assert!(matches!(rx.try_recv().unwrap(), Err(BoltError::ConnectionClosed)));
    }

    #[test]
    fn test_malformed_input_is_fatal() {
        let (mut protocol, channel) = connect(4, 4);
        login(&mut protocol, &channel);
        let (observer, mut rx) = SummaryObserver::oneshot();
        protocol.commit_transaction(observer).unwrap();

        // One chunk holding an unknown marker byte.
        let err = protocol.handle_bytes(&[0x00, 0x01, 0xC7, 0x00, 0x00]).unwrap_err();
        assert!(err.is_fatal());
        assert!(protocol.is_broken());
        assert!(rx.try_recv().unwrap().is_err());
        assert!(protocol.handle_bytes(&frame(&[success(&[])])).is_err());
    }

    #[test]
    fn test_unexpected_response_is_fatal() {
        let (mut protocol, channel) = connect(4, 4);
        login(&mut protocol, &channel);
        let err = protocol.handle_bytes(&frame(&[success(&[])])).unwrap_err();
        assert!(matches!(err, BoltError::Protocol(_)));
        assert!(protocol.is_broken());
    }

    #[test]
    fn test_record_for_summary_is_fatal() {
        let (mut protocol, channel) = connect(4, 4);
        login(&mut protocol, &channel);
        protocol.commit_transaction(SummaryObserver::new()).unwrap();
        let err = protocol
            .handle_bytes(&frame(&[(tag::RECORD, vec![Value::List(vec![])])]))
            .unwrap_err();
        assert!(err.to_string().contains("Received RECORD"));
        assert!(protocol.is_broken());
    }

    #[test]
    fn test_write_failure_breaks_connection() {
        let (mut protocol, channel) = connect(4, 4);
        login(&mut protocol, &channel);
        channel.fail_with(BoltError::Connection("broken pipe".to_string()));
        let (observer, mut rx) = SummaryObserver::oneshot();
        protocol.commit_transaction(observer).unwrap();
        assert!(protocol.is_broken());
        assert!(matches!(rx.try_recv().unwrap(), Err(BoltError::Connection(_))));
    }

    #[test]
    fn test_deeply_nested_response_is_fatal() {
        let (mut protocol, channel) = connect(4, 4);
        login(&mut protocol, &channel);
        let (observer, mut rx) = SummaryObserver::oneshot();
        protocol.commit_transaction(observer).unwrap();

        // SUCCESS {"a": [[[ ... 1 ... ]]]}
        let mut message = vec![0xB1, tag::SUCCESS, 0xA1, 0x81, b'a'];
        message.extend(std::iter::repeat(0x91).take(1_000_000));
        message.push(0x01);
        let mut chunker = Chunker::new();
        chunker.write_message(&message);

        let err = protocol.handle_bytes(&chunker.take()).unwrap_err();
        assert!(matches!(
            err,
            BoltError::PackStream(crate::bolt::packstream::PackStreamError::NestingTooDeep(_))
        ));
        assert!(protocol.is_broken());
        assert!(rx.try_recv().unwrap().is_err());
    }

    #[test]
    fn test_recv_timeout_hint_in_every_integer_mode() {
        use crate::bolt::packstream::IntegerMode;

        for mode in [IntegerMode::Lossless, IntegerMode::BigInt, IntegerMode::Float] {
            let channel = MemoryChannel::new();
            let config = ProtocolConfig::builder().with_integer_mode(mode).build();
            let mut protocol = factory::create(ProtocolVersion::V4_4, channel, config).unwrap();
            protocol
                .authenticate(AuthenticateOptions::default(), LoginObserver::new())
                .unwrap();
            let hints = map(&[("connection.recv_timeout_seconds", Value::Integer(120))]);
            protocol
                .handle_bytes(&frame(&[success(&[("hints", hints)])]))
                .unwrap();
            assert_eq!(
                protocol.recv_timeout(),
                Some(Duration::from_secs(120)),
                "{mode:?}"
            );
        }
    }

    #[test]
    fn test_unflushed_begin_goes_out_with_run() {
        let (mut protocol, channel) = connect(5, 0);
        login(&mut protocol, &channel);

        protocol
            .begin_transaction(BeginOptions::new().with_flush(false), SummaryObserver::new())
            .unwrap();
        assert_eq!(channel.write_count(), 0);
        assert_eq!(protocol.pending(), 1);

        protocol
            .run(
                "RETURN 1",
                HashMap::new(),
                RunOptions::new().in_transaction(),
                ResultStreamObserver::new(),
            )
            .unwrap();
        assert_eq!(channel.write_count(), 1);
        let tags: Vec<u8> = written(&channel).iter().map(|m| m.tag).collect();
        assert_eq!(tags, vec![tag::BEGIN, tag::RUN, tag::PULL]);
    }

    #[test]
    fn test_explicit_flush() {
        let (mut protocol, channel) = connect(4, 4);
        login(&mut protocol, &channel);
        protocol
            .run(
                "RETURN 1",
                HashMap::new(),
                RunOptions::new().with_flush(false),
                ResultStreamObserver::new(),
            )
            .unwrap();
        assert!(channel.written().is_empty());

        protocol.flush().unwrap();
        assert_eq!(channel.write_count(), 1);
        protocol.flush().unwrap();
        assert_eq!(channel.write_count(), 1);
        let tags: Vec<u8> = written(&channel).iter().map(|m| m.tag).collect();
        assert_eq!(tags, vec![tag::RUN, tag::PULL]);
    }

    #[test]
    fn test_paused_stream_pulls_on_resume() {
        let (mut protocol, channel) = connect(4, 4);
        login(&mut protocol, &channel);
        let records = Arc::new(Mutex::new(0));
        let count = records.clone();
        let observer = ResultStreamObserver::new().on_record(move |_| *count.lock() += 1);
        let control = observer.control();
        protocol
            .run(
                "UNWIND range(1, 3) AS x RETURN x",
                HashMap::new(),
                RunOptions::new().with_fetch_size(2),
                observer,
            )
            .unwrap();
        channel.take();

        control.pause();
        protocol
            .handle_bytes(&frame(&[
                success(&[("fields", Value::List(vec!["x".into()])), ("qid", 0.into())]),
                (tag::RECORD, vec![Value::List(vec![1.into()])]),
                (tag::RECORD, vec![Value::List(vec![2.into()])]),
                success(&[("has_more", Value::Boolean(true))]),
            ]))
            .unwrap();
        assert_eq!(*records.lock(), 2);
        assert!(channel.written().is_empty());
        assert_eq!(protocol.pending(), 0);
        assert_eq!(protocol.suspended_streams(), 1);
        assert_eq!(protocol.state(), ProtocolState::Streaming);

        // Still paused: nothing to send.
        protocol.resume_streams().unwrap();
        assert!(channel.written().is_empty());

        control.resume();
        protocol.resume_streams().unwrap();
        let messages = written(&channel);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].tag, tag::PULL);
        let pull = messages[0].fields[0].as_map().unwrap();
        assert_eq!(pull.get("n"), Some(&Value::Integer(2)));
        assert_eq!(pull.get("qid"), Some(&Value::Integer(0)));
        assert_eq!(protocol.suspended_streams(), 0);

        protocol
            .handle_bytes(&frame(&[
                (tag::RECORD, vec![Value::List(vec![3.into()])]),
                success(&[]),
            ]))
            .unwrap();
        assert_eq!(*records.lock(), 3);
        assert_eq!(protocol.state(), ProtocolState::Ready);
    }

    #[test]
    fn test_reset_ends_paused_stream() {
        let (mut protocol, channel) = connect(5, 0);
        login(&mut protocol, &channel);
        let failed = Arc::new(Mutex::new(None));
        let sink = failed.clone();
        let observer = ResultStreamObserver::new().on_error(move |e| *sink.lock() = Some(e));
        observer.control().pause();
        protocol
            .run(
                "RETURN 1",
                HashMap::new(),
                RunOptions::new().with_fetch_size(1),
                observer,
            )
            .unwrap();
        protocol
            .handle_bytes(&frame(&[
                success(&[("fields", Value::List(vec!["x".into()]))]),
                success(&[("has_more", Value::Boolean(true))]),
            ]))
            .unwrap();
        assert_eq!(protocol.suspended_streams(), 1);

        protocol.reset(ResetObserver::new()).unwrap();
        assert_eq!(protocol.suspended_streams(), 0);
        assert!(matches!(*failed.lock(), Some(BoltError::Ignored)));
    }

    #[test]
    fn test_empty_filter_and_user_count_as_absent() {
        let (mut protocol, channel) = connect(4, 3);
        login(&mut protocol, &channel);
        protocol
            .begin_transaction(
                BeginOptions::new()
                    .with_notification_filter(NotificationFilter::default())
                    .with_impersonated_user(""),
                SummaryObserver::new(),
            )
            .unwrap();
        let messages = written(&channel);
        assert_eq!(messages[0].tag, tag::BEGIN);
        let extra = messages[0].fields[0].as_map().unwrap();
        assert!(!extra.contains_key("imp_user"));

        protocol
            .request_routing_information(
                RouteOptions::new().with_impersonated_user(""),
                RouteObserver::new(),
            )
            .unwrap();
        assert_eq!(written(&channel)[0].tag, tag::ROUTE);

        let (mut protocol, _) = connect(5, 1);
        protocol
            .authenticate(
                AuthenticateOptions::default().with_notification_filter(NotificationFilter::default()),
                LoginObserver::new(),
            )
            .unwrap();
        assert_eq!(protocol.state(), ProtocolState::Authenticating);
    }

    #[test]
    fn test_oversized_tx_timeout_is_rejected() {
        use crate::bolt::message::TxConfig;

        let (mut protocol, channel) = connect(5, 0);
        login(&mut protocol, &channel);
        let tx_config = TxConfig {
            timeout: Some(Duration::from_secs(u64::MAX)),
            metadata: HashMap::new(),
        };

        let err = protocol
            .begin_transaction(
                BeginOptions::new().with_tx_config(tx_config.clone()),
                SummaryObserver::new(),
            )
            .unwrap_err();
        assert!(matches!(err, BoltError::ContractViolation(_)));
        let err = protocol
            .run(
                "RETURN 1",
                HashMap::new(),
                RunOptions::new().with_tx_config(tx_config),
                ResultStreamObserver::new(),
            )
            .unwrap_err();
        assert!(matches!(err, BoltError::ContractViolation(_)));
        assert!(channel.written().is_empty());
        assert_eq!(protocol.pending(), 0);
        assert_eq!(protocol.state(), ProtocolState::Ready);
    }
}
