//! Session controller.
//!
//! Owns the connection state, the captured error message, the runtime
//! bridge and every resource acquired during start. Every method runs on the
//! session loop task, so state changes are strictly sequential.
//!
//! | State        | Non-special requests go to                      |
//! |--------------|-------------------------------------------------|
//! | `Idle`       | error response, `not ready`                     |
//! | `Connecting` | error response, `not ready`                     |
//! | `Active`     | the runtime, through the bridge                 |
//! | `Degraded`   | the [`DegradedResponder`]                       |
//! | `Terminated` | error response, `session ended`                 |

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::latch::TeardownLatch;
use super::SessionInput;
use crate::config::SessionConfig;
use crate::dap::protocol::{Event, ProtocolMessage, Request, Response};
use crate::degraded::{DegradedReply, DegradedResponder, MAIN_THREAD_ID};
use crate::detector::{ErrorDetector, ErrorReport};
use crate::install::{InstalledSource, Installer};
use crate::runtime::bridge::{RuntimeBridge, RuntimeLink};
use crate::runtime::listener::RuntimeListener;
use crate::runtime::process::{OutputStream, RuntimeHandle, RuntimeLauncher};
use crate::stack::ShadowStack;
use crate::{AppError, Result};

/// Custom request that freezes a hung runtime's last known stack for
/// inspection.
pub const SHOW_LATEST_STACKTRACE: &str = "showLatestStacktrace";

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created; `initialize` not received yet.
    Idle,
    /// Runtime launched, waiting for its single socket connection.
    Connecting,
    /// Socket connected; requests are forwarded live.
    Active,
    /// Socket lost or fatal script error seen; answers come from cached state.
    Degraded,
    /// Teardown has run.
    Terminated,
}

/// The state machine behind one debugging session.
pub struct SessionController {
    config: SessionConfig,
    installer: Arc<dyn Installer>,
    launcher: Arc<dyn RuntimeLauncher>,
    client_tx: mpsc::Sender<Value>,
    input_tx: mpsc::Sender<SessionInput>,

    state: ConnectionState,
    error_message: Option<String>,
    /// Script error seen before the agent connected.
    early_error: Option<String>,
    bridge: RuntimeBridge,
    responder: DegradedResponder,
    detector: Option<ErrorDetector>,

    listener: Option<RuntimeListener>,
    runtime: Option<RuntimeHandle>,
    installed_source: Option<InstalledSource>,
    agent_dir: Option<PathBuf>,
    pending_initialize: Option<Request>,
    runtime_exit_code: Option<i32>,

    latch: TeardownLatch,
    finished: bool,
}

impl SessionController {
    /// Controller for a fresh session.
    ///
    /// Messages for the client are sent on `client_tx`. `input_tx` is handed
    /// to the endpoint and the launcher so their notifications reach the
    /// session loop.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        installer: Arc<dyn Installer>,
        launcher: Arc<dyn RuntimeLauncher>,
        client_tx: mpsc::Sender<Value>,
        input_tx: mpsc::Sender<SessionInput>,
    ) -> Self {
        Self {
            config,
            installer,
            launcher,
            client_tx,
            input_tx,
            state: ConnectionState::Idle,
            error_message: None,
            early_error: None,
            bridge: RuntimeBridge::new(),
            responder: DegradedResponder::new(),
            detector: None,
            listener: None,
            runtime: None,
            installed_source: None,
            agent_dir: None,
            pending_initialize: None,
            runtime_exit_code: None,
            latch: TeardownLatch::new(),
            finished: false,
        }
    }

    /// Replace the degraded-mode responder.
    #[must_use]
    pub fn with_responder(mut self, responder: DegradedResponder) -> Self {
        self.responder = responder;
        self
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Message captured on the transition into `Degraded`.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Shadow stack maintained by the bridge.
    #[must_use]
    pub fn stack(&self) -> &ShadowStack {
        self.bridge.stack()
    }

    /// Whether the session loop should stop.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Latch guarding teardown; clones observe the same state.
    #[must_use]
    pub fn teardown_latch(&self) -> TeardownLatch {
        self.latch.clone()
    }

    // ── Input routing ─────────────────────────────────────────────────────────

    /// Process one input from any source.
    pub async fn handle(&mut self, input: SessionInput) {
        match input {
            SessionInput::ClientRequest(request) => self.dispatch(&request).await,
            SessionInput::ClientClosed => {
                info!("client stream closed");
                self.teardown().await;
                self.finished = true;
            }
            SessionInput::RuntimeConnected(link) => self.on_runtime_connected(link).await,
            SessionInput::RuntimeText(text) => self.on_runtime_text(&text).await,
            SessionInput::RuntimeDisconnected { reason } => self.on_runtime_lost(&reason).await,
            SessionInput::RuntimeOutput { stream, line } => {
                self.on_runtime_output_line(&line, stream).await;
            }
            SessionInput::RuntimeExited { code } => self.on_runtime_exited(code).await,
            SessionInput::ConnectTimeout => self.on_connect_timeout().await,
            SessionInput::Shutdown => {
                info!("shutdown signal received");
                if self.teardown().await {
                    self.emit(Event::terminated().into_message()).await;
                }
                self.finished = true;
            }
        }
    }

    /// Single entry point for every client request.
    pub async fn dispatch(&mut self, request: &Request) {
        debug!(
            seq = request.seq,
            command = %request.command,
            state = ?self.state,
            "dispatching client request"
        );

        match request.command.as_str() {
            "initialize" => self.on_initialize(request).await,
            "disconnect" => self.disconnect(request).await,
            SHOW_LATEST_STACKTRACE => self.show_latest_stacktrace(request).await,
            _ => self.route(request).await,
        }
    }

    // ── Start ─────────────────────────────────────────────────────────────────

    async fn on_initialize(&mut self, request: &Request) {
        match self.state {
            ConnectionState::Idle => {
                if let Err(err) = self.start(request).await {
                    self.abort_start(request, &err).await;
                }
            }
            ConnectionState::Terminated => {
                let err = AppError::SessionEnded("initialize received after teardown".into());
                self.reply(Response::error(request, err.to_string())).await;
            }
            _ => {
                warn!(seq = request.seq, "duplicate initialize rejected");
                self.reply(Response::error(request, "session already initialized"))
                    .await;
            }
        }
    }

    /// Install, bind and launch, then wait for the runtime connection.
    ///
    /// On success the session is `Connecting` and `request` is held until the
    /// runtime connects, at which point it is forwarded. Resources acquired
    /// before a failure are recorded so teardown can release them.
    ///
    /// # Errors
    ///
    /// Propagates installer, endpoint and launcher failures.
    pub async fn start(&mut self, request: &Request) -> Result<()> {
        info!(
            kind = ?self.config.project_kind,
            source = %self.config.source_path().display(),
            "starting session"
        );

        let user_data = self.installer.resolve_user_data_path().await?;
        let source = self.installer.install_user_source(&user_data).await?;
        self.installed_source = Some(source.clone());

        let agent_dir = self.installer.install_agent(&user_data, &source).await?;
        self.agent_dir = Some(agent_dir);

        self.detector = Some(ErrorDetector::new(source.scope)?);

        let listener = RuntimeListener::bind(
            self.config.ws_port,
            &self.config.ws_path,
            self.input_tx.clone(),
        )
        .await?;
        let endpoint = listener.url(&self.config.ws_path);
        self.listener = Some(listener);

        let runtime = self
            .launcher
            .launch(&self.config.runtime_exe, &endpoint, self.input_tx.clone())
            .await?;
        self.runtime = Some(runtime);

        self.pending_initialize = Some(request.clone());
        self.state = ConnectionState::Connecting;
        self.arm_connect_timeout();

        info!(%endpoint, "waiting for runtime agent to connect");
        Ok(())
    }

    fn arm_connect_timeout(&self) {
        let timeout = self.config.connect_timeout;
        let input_tx = self.input_tx.clone();
        let latch = self.latch.clone();

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if !latch.is_tripped() {
                let _ = input_tx.send(SessionInput::ConnectTimeout).await;
            }
        });
    }

    async fn on_connect_timeout(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        let Some(request) = self.pending_initialize.take() else {
            return;
        };

        let err = AppError::Transport(format!(
            "runtime did not connect within {}s",
            self.config.connect_timeout.as_secs()
        ));
        self.abort_start(&request, &err).await;
    }

    /// Report a start failure and end the session.
    async fn abort_start(&mut self, request: &Request, err: &AppError) {
        error!(%err, "session start failed");

        self.reply(Response::error(request, err.to_string())).await;
        self.emit_output("stderr", format!("{err}\n")).await;
        self.teardown().await;
        self.emit(Event::terminated().into_message()).await;

        let code = self.runtime_exit_code.map_or(-1, i64::from);
        self.emit_event(Event::exited(code)).await;
        self.finished = true;
    }

    // ── Runtime notifications ─────────────────────────────────────────────────

    async fn on_runtime_connected(&mut self, link: RuntimeLink) {
        if self.state != ConnectionState::Connecting {
            warn!(state = ?self.state, "unexpected runtime connection, closing it");
            return;
        }

        self.bridge.attach(link);
        self.state = ConnectionState::Active;
        info!("runtime agent attached, session active");

        if let Some(request) = self.pending_initialize.take() {
            if !self.bridge.send(&request) {
                warn!("initialize could not be forwarded to the runtime");
            }
        }

        // Runtime stdout races the agent's connect; an error from the script's
        // first run may already be waiting.
        if let Some(message) = self.early_error.take() {
            self.enter_degraded(Some(message));
            self.emit_event(Event::stopped("exception", MAIN_THREAD_ID))
                .await;
        }
    }

    async fn on_runtime_text(&mut self, text: &str) {
        if self.state == ConnectionState::Terminated {
            return;
        }

        match self.bridge.handle_inbound(text) {
            Ok(Some(message)) => self.emit_value(message).await,
            Ok(None) => {}
            Err(err) => warn!(%err, "dropping malformed runtime message"),
        }
    }

    async fn on_runtime_lost(&mut self, reason: &str) {
        self.bridge.detach();

        if self.state != ConnectionState::Active {
            debug!(reason, state = ?self.state, "runtime disconnect ignored");
            return;
        }

        warn!(reason, "runtime connection lost");
        self.enter_degraded(Some(format!("runtime connection lost: {reason}")));
        self.emit_output("console", format!("Runtime connection lost: {reason}\n"))
            .await;
    }

    async fn on_runtime_exited(&mut self, code: Option<i32>) {
        self.runtime_exit_code = code;
        let described = describe_exit(code);
        info!(code = %described, "runtime process exited");

        match self.state {
            ConnectionState::Connecting => {
                if let Some(request) = self.pending_initialize.take() {
                    let err = AppError::Spawn(format!(
                        "runtime exited before connecting (exit code {described})"
                    ));
                    self.abort_start(&request, &err).await;
                }
            }
            ConnectionState::Active => {
                self.bridge.detach();
                self.enter_degraded(Some(format!("runtime exited with code {described}")));
                self.emit_output("console", format!("Runtime exited with code {described}\n"))
                    .await;
            }
            _ => {}
        }
    }

    /// Scan and relay one line of runtime output.
    ///
    /// A stdout line attributed to the debugged source stops the client on an
    /// exception: from `Active` it moves the session to `Degraded`, in a
    /// paused `Degraded` session it fills in the missing message, and while
    /// `Connecting` it is held until the agent attaches. Every line is
    /// relayed with the configured prefix.
    pub async fn on_runtime_output_line(&mut self, line: &str, stream: OutputStream) {
        if self.state == ConnectionState::Terminated {
            return;
        }

        if stream == OutputStream::Stdout {
            if let Some(report) = self.detector.as_ref().and_then(|d| d.inspect(line)) {
                self.on_script_error(report).await;
            }
        }

        let text = format!("{}: {line}\n", self.config.output_prefix);
        self.emit_output(stream.category(), text).await;
    }

    async fn on_script_error(&mut self, report: ErrorReport) {
        let stop = match self.state {
            ConnectionState::Active => self.enter_degraded(Some(report.message.clone())),
            ConnectionState::Degraded if self.error_message.is_none() => {
                self.error_message = Some(report.message.clone());
                true
            }
            ConnectionState::Connecting if self.early_error.is_none() => {
                debug!(message = %report.message, "script error before the agent connected");
                self.early_error = Some(report.message);
                return;
            }
            _ => false,
        };

        if stop {
            warn!(
                path = %report.path.display(),
                line = report.line,
                message = %report.message,
                "script error detected"
            );
            self.emit_event(Event::stopped("exception", MAIN_THREAD_ID))
                .await;
        } else {
            debug!(state = ?self.state, message = %report.message, "script error ignored");
        }
    }

    /// Move `Active` to `Degraded`, capturing `message`. Returns whether the
    /// transition happened.
    fn enter_degraded(&mut self, message: Option<String>) -> bool {
        if self.state != ConnectionState::Active {
            return false;
        }
        self.state = ConnectionState::Degraded;
        self.error_message = message;
        info!(error = ?self.error_message, "session degraded");
        true
    }

    // ── Client requests ───────────────────────────────────────────────────────

    async fn route(&mut self, request: &Request) {
        match self.state {
            ConnectionState::Active => {
                if self.bridge.send(request) {
                    return;
                }
                // The socket writer is gone; its disconnect notice is still queued.
                self.bridge.detach();
                self.enter_degraded(Some("runtime connection lost".into()));
                self.respond_degraded(request).await;
            }
            ConnectionState::Degraded => self.respond_degraded(request).await,
            ConnectionState::Idle | ConnectionState::Connecting | ConnectionState::Terminated => {
                self.reject(request).await;
            }
        }
    }

    async fn respond_degraded(&mut self, request: &Request) {
        let reply = self
            .responder
            .respond(request, self.bridge.stack(), self.error_message.as_deref());

        match reply {
            Ok(DegradedReply::Respond(response)) => self.reply(response).await,
            Ok(DegradedReply::RespondAndTerminate(response)) => {
                self.reply(response).await;
                info!("continue while degraded, ending session for the client");
                self.emit(Event::terminated().into_message()).await;
            }
            Ok(DegradedReply::Unavailable(response)) => {
                warn!(command = %request.command, "request unavailable while degraded");
                self.reply(response).await;
            }
            Err(err) => {
                warn!(command = %request.command, %err, "degraded answer failed");
                self.reply(Response::error(request, err.to_string())).await;
            }
        }
    }

    async fn show_latest_stacktrace(&mut self, request: &Request) {
        if !matches!(
            self.state,
            ConnectionState::Active | ConnectionState::Degraded
        ) {
            self.reject(request).await;
            return;
        }

        self.enter_degraded(None);
        self.reply(Response::success(request, None)).await;
        self.emit_event(Event::stopped("pause", MAIN_THREAD_ID)).await;
    }

    async fn disconnect(&mut self, request: &Request) {
        info!(state = ?self.state, "disconnect requested");

        if self.bridge.is_connected() && !self.bridge.send(request) {
            debug!("disconnect not delivered to the runtime");
        }

        self.teardown().await;
        self.reply(Response::success(request, None)).await;
        self.finished = true;
    }

    async fn reject(&self, request: &Request) {
        let err = match self.state {
            ConnectionState::Terminated => {
                AppError::SessionEnded(format!("'{}' received after teardown", request.command))
            }
            _ => AppError::NotReady(format!(
                "'{}' received before the runtime connected",
                request.command
            )),
        };
        debug!(command = %request.command, %err, "request rejected");
        self.reply(Response::error(request, err.to_string())).await;
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Release every session resource. Only the first call does any work;
    /// it returns `true`, later calls return `false`.
    ///
    /// Closes the runtime socket and the endpoint, requests the runtime's
    /// termination without waiting for it, and removes the installed agent
    /// and user source. Uninstall failures are logged, never raised.
    pub async fn teardown(&mut self) -> bool {
        if !self.latch.try_acquire() {
            debug!("teardown already ran");
            return false;
        }

        info!(state = ?self.state, "tearing down session");
        self.state = ConnectionState::Terminated;
        self.pending_initialize = None;

        self.bridge.detach();
        if let Some(listener) = self.listener.take() {
            listener.close();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.kill();
        }

        if let Some(agent_dir) = self.agent_dir.take() {
            if let Err(err) = self.installer.uninstall_agent(&agent_dir).await {
                warn!(%err, "failed to uninstall debugger agent");
            }
        }
        if let Some(source) = self.installed_source.take() {
            if let Err(err) = self.installer.uninstall_user_source(&source).await {
                warn!(%err, "failed to uninstall user source");
            }
        }

        info!("session torn down");
        true
    }

    // ── Client output ─────────────────────────────────────────────────────────

    async fn emit(&self, message: ProtocolMessage) {
        match message.into_value() {
            Ok(value) => self.emit_value(value).await,
            Err(err) => warn!(%err, "failed to serialize client message"),
        }
    }

    async fn emit_value(&self, value: Value) {
        if self.client_tx.send(value).await.is_err() {
            debug!("client writer gone, dropping message");
        }
    }

    async fn emit_event(&self, event: Result<Event>) {
        match event {
            Ok(event) => self.emit(event.into_message()).await,
            Err(err) => warn!(%err, "failed to build client event"),
        }
    }

    async fn emit_output(&self, category: &str, text: String) {
        self.emit_event(Event::output(category, text)).await;
    }

    async fn reply(&self, response: Response) {
        self.emit(response.into_message()).await;
    }
}

fn describe_exit(code: Option<i32>) -> String {
    code.map_or_else(|| "unknown".to_owned(), |code| code.to_string())
}
