/// Session lifecycle manager.
///
/// Owns at most one live remote-framebuffer connection. Forced captures and
/// input dispatch run under the lifecycle lock, so they are serialized with
/// each other and with connect/disconnect; the background sampler only takes
/// the transport lock. Cached-frame reads never take either lock.
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::config::{Endpoint, SessionConfig};
use crate::errors::{PilotError, PilotResult};
use crate::rfb::{RfbConnector, TransportError};
use crate::session::frame::EncodedImage;
use crate::session::input::{self, InputAction, InputOp, MouseButton};
use crate::session::sampler::{capture_once, CaptureFailure, FrameCell, FrameSampler, SharedClient};

/// Snapshot of the live session returned by [`SessionManager::connect`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionHandle {
    /// Distinguishes successive connections made through one manager.
    pub session_id: u64,
    pub endpoint: Endpoint,
    pub connected: bool,
    pub connected_at: chrono::DateTime<chrono::Utc>,
}

struct LiveSession {
    id: u64,
    endpoint: Endpoint,
    connected_at: chrono::DateTime<chrono::Utc>,
    client: SharedClient,
    sampler: FrameSampler,
}

pub struct SessionManager {
    connector: Arc<dyn RfbConnector>,
    config: SessionConfig,
    live: Mutex<Option<LiveSession>>,
    frames: Arc<FrameCell>,
    connected: Arc<AtomicBool>,
    next_id: AtomicU64,
    /// Id of the live session, 0 when there is none.
    live_id: AtomicU64,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn RfbConnector>, config: SessionConfig) -> Self {
        Self {
            connector,
            config,
            live: Mutex::new(None),
            frames: Arc::new(FrameCell::new()),
            connected: Arc::new(AtomicBool::new(false)),
            next_id: AtomicU64::new(1),
            live_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn session(&self) -> Option<SessionHandle> {
        let live = self.live.lock().await;
        live.as_ref().map(|s| SessionHandle {
            session_id: s.id,
            endpoint: s.endpoint.clone(),
            connected: self.is_connected(),
            connected_at: s.connected_at,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    pub async fn connect(&self, endpoint: &Endpoint, credential: &str) -> PilotResult<SessionHandle> {
        let mut live = self.live.lock().await;

        if live.is_some() {
            if self.is_connected() {
                return Err(PilotError::Connection("already connected".into()));
            }
            // The sampler saw the connection die; clear the remains first.
            if let Some(stale) = live.take() {
                self.teardown(stale).await;
            }
        }

        tracing::info!(host = %endpoint.host, port = endpoint.port, "connecting to remote-framebuffer server");
        let client = self
            .connector
            .connect(endpoint, credential)
            .await
            .map_err(|e| {
                tracing::error!(endpoint = %endpoint, error = %e, "connection failed");
                PilotError::Connection(format!("failed to connect to {endpoint}: {e}"))
            })?;

        let client: SharedClient = Arc::new(Mutex::new(client));
        self.connected.store(true, Ordering::SeqCst);
        let sampler = FrameSampler::start(
            client.clone(),
            self.frames.clone(),
            self.connected.clone(),
            self.config.sample_interval(),
        );

        let session = LiveSession {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            endpoint: endpoint.clone(),
            connected_at: chrono::Utc::now(),
            client,
            sampler,
        };
        let handle = SessionHandle {
            session_id: session.id,
            endpoint: session.endpoint.clone(),
            connected: true,
            connected_at: session.connected_at,
        };
        self.live_id.store(session.id, Ordering::SeqCst);
        *live = Some(session);

        tracing::info!(endpoint = %endpoint, session_id = handle.session_id, "connected");
        Ok(handle)
    }

    /// Tear down the live session, if any. Safe to call repeatedly.
    /// Returns whether a session was actually torn down.
    pub async fn disconnect(&self) -> bool {
        let mut live = self.live.lock().await;
        match live.take() {
            Some(session) => {
                let endpoint = session.endpoint.clone();
                self.teardown(session).await;
                tracing::info!(endpoint = %endpoint, "disconnected");
                true
            }
            None => {
                tracing::debug!("disconnect requested while not connected");
                self.connected.store(false, Ordering::SeqCst);
                self.frames.reset();
                false
            }
        }
    }

    /// Tear down the session identified by `session_id` only if it is still
    /// the live one. A later connection is left untouched.
    pub async fn disconnect_session(&self, session_id: u64) -> bool {
        let mut live = self.live.lock().await;
        if live.as_ref().map(|s| s.id) != Some(session_id) {
            tracing::debug!(session_id, "session already gone; nothing to disconnect");
            return false;
        }
        match live.take() {
            Some(session) => {
                let endpoint = session.endpoint.clone();
                self.teardown(session).await;
                tracing::info!(endpoint = %endpoint, session_id, "disconnected");
                true
            }
            None => false,
        }
    }

    /// Stop the sampler, then release the transport, then reset state.
    async fn teardown(&self, session: LiveSession) {
        let _ = self
            .live_id
            .compare_exchange(session.id, 0, Ordering::SeqCst, Ordering::SeqCst);
        release(session).await;
        self.connected.store(false, Ordering::SeqCst);
        self.frames.reset();
    }

    /// Mark `session_id` as abandoned so the next call or connect clears it.
    /// Does nothing if another session has since become live.
    fn abandon(&self, session_id: u64) {
        if self.live_id.load(Ordering::SeqCst) == session_id {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    /// Run `body` against a freshly connected session and disconnect on every
    /// exit path. If the returned future is dropped early, the session is
    /// marked abandoned and its teardown is spawned onto the current runtime;
    /// both only ever touch the session this call opened.
    pub async fn scoped<F, Fut, T>(
        self: &Arc<Self>,
        endpoint: &Endpoint,
        credential: &str,
        body: F,
    ) -> PilotResult<T>
    where
        F: FnOnce(Arc<SessionManager>) -> Fut,
        Fut: Future<Output = PilotResult<T>>,
    {
        let handle = self.connect(endpoint, credential).await?;
        let mut guard = DisconnectGuard {
            manager: Some(self.clone()),
            session_id: handle.session_id,
        };
        let result = body(self.clone()).await;
        if let Some(manager) = guard.manager.take() {
            manager.disconnect_session(handle.session_id).await;
        }
        result
    }

    // ── Frames ────────────────────────────────────────────────────────────

    /// Most recent sampled frame, or the placeholder.
    pub fn cached_frame(&self) -> EncodedImage {
        self.frames.latest()
    }

    pub fn subscribe_frames(&self) -> watch::Receiver<EncodedImage> {
        self.frames.subscribe()
    }

    /// Capture and encode a fresh frame, retrying transient failures.
    pub async fn capture_frame(&self) -> PilotResult<EncodedImage> {
        let mut live = self.live.lock().await;
        let client = self.ensure_live(&mut live).await?;

        let attempts = self.config.capture_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match capture_once(&client).await {
                Ok(frame) => {
                    tracing::debug!(attempt, bytes = frame.bytes().len(), "frame captured");
                    return Ok(frame);
                }
                Err(CaptureFailure::Lost(e)) => {
                    return Err(self.connection_lost(&mut live, &e).await);
                }
                Err(CaptureFailure::Transient(e)) => {
                    tracing::warn!(attempt, attempts, error = %e, "capture attempt failed");
                    last_error = e;
                    if attempt < attempts {
                        tokio::time::sleep(self.config.capture_retry_delay()).await;
                    }
                }
            }
        }
        Err(PilotError::Capture(format!(
            "capture failed after {attempts} attempts: {last_error}"
        )))
    }

    // ── Input ─────────────────────────────────────────────────────────────

    /// Apply one input action and drain the transport before returning.
    pub async fn dispatch(&self, action: &InputAction) -> PilotResult<()> {
        let mut live = self.live.lock().await;
        let client = self.ensure_live(&mut live).await?;
        let ops = input::translate(action)?;

        let outcome = {
            let mut c = client.lock().await;
            let mut res = Ok(());
            for op in &ops {
                res = match op {
                    InputOp::Move { x, y } => c.mouse_move(*x, *y),
                    InputOp::Click { button } => c.mouse_click(*button),
                    InputOp::Press(keys) => c.key_press(keys),
                    InputOp::Write(text) => c.key_write(text),
                };
                if res.is_err() {
                    break;
                }
            }
            match res {
                Ok(()) => c.drain().await,
                Err(e) => Err(e),
            }
        };

        match outcome {
            Ok(()) => {
                tracing::info!(?action, "input dispatched");
                Ok(())
            }
            Err(e) if e.is_connection_lost() => Err(self.connection_lost(&mut live, &e.to_string()).await),
            Err(e) => {
                tracing::error!(?action, error = %e, "input dispatch failed");
                Err(input_error(e))
            }
        }
    }

    pub async fn move_mouse(&self, x: i32, y: i32) -> PilotResult<()> {
        self.dispatch(&InputAction::MoveMouse { x, y }).await
    }

    pub async fn click(&self, x: i32, y: i32, button: MouseButton) -> PilotResult<()> {
        self.dispatch(&InputAction::Click { x, y, button }).await
    }

    pub async fn press_keys(&self, keys: &[String]) -> PilotResult<()> {
        self.dispatch(&InputAction::PressKeys { keys: keys.to_vec() }).await
    }

    pub async fn type_text(&self, text: &str) -> PilotResult<()> {
        self.dispatch(&InputAction::TypeText { text: text.to_string() }).await
    }

    // ── Internals ─────────────────────────────────────────────────────────

    /// Client of the live session. A session whose sampler observed
    /// connection loss is torn down here and reported as a connection error.
    async fn ensure_live(&self, live: &mut Option<LiveSession>) -> PilotResult<SharedClient> {
        let Some(session) = live.take() else {
            return Err(PilotError::not_connected());
        };
        if self.is_connected() {
            let client = session.client.clone();
            *live = Some(session);
            return Ok(client);
        }
        let endpoint = session.endpoint.clone();
        self.teardown(session).await;
        Err(PilotError::Connection(format!("connection to {endpoint} was lost")))
    }

    async fn connection_lost(&self, live: &mut Option<LiveSession>, reason: &str) -> PilotError {
        let endpoint = live
            .as_ref()
            .map(|s| s.endpoint.to_string())
            .unwrap_or_else(|| "remote".into());
        tracing::error!(endpoint = %endpoint, error = %reason, "connection lost");
        self.connected.store(false, Ordering::SeqCst);
        if let Some(session) = live.take() {
            self.teardown(session).await;
        }
        PilotError::Connection(format!("connection to {endpoint} was lost: {reason}"))
    }
}

fn input_error(e: TransportError) -> PilotError {
    PilotError::Input(e.to_string())
}

/// Stop the sampler and close the transport.
async fn release(session: LiveSession) {
    session.sampler.stop().await;
    let mut client = session.client.lock().await;
    if let Err(e) = client.close().await {
        tracing::warn!(endpoint = %session.endpoint, error = %e, "error while closing transport");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let Some(session) = self.live.get_mut().take() else { return };
        tracing::warn!(endpoint = %session.endpoint, "session manager dropped while connected");
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(release(session));
            }
            // Dropping the sampler aborts its task; the client goes with it.
            Err(_) => tracing::warn!("no runtime available to close the transport"),
        }
    }
}

struct DisconnectGuard {
    manager: Option<Arc<SessionManager>>,
    session_id: u64,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let Some(manager) = self.manager.take() else { return };
        let session_id = self.session_id;
        manager.abandon(session_id);
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move {
                    manager.disconnect_session(session_id).await;
                });
            }
            Err(_) => tracing::warn!(session_id, "no runtime available to release a cancelled session"),
        }
    }
}
