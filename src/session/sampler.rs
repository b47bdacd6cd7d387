/// Background frame sampler.
///
/// Captures the remote screen on a fixed interval and publishes the encoded
/// frame into a [`FrameCell`], a single-writer register that readers can
/// clone from without touching the transport.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::rfb::RfbClient;
use crate::session::frame::EncodedImage;

pub(crate) type SharedClient = Arc<Mutex<Box<dyn RfbClient>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerState {
    Idle,
    Sampling,
    Stopping,
    Stopped,
}

/// Latest committed frame. Replacement is atomic per frame.
pub struct FrameCell {
    tx: watch::Sender<EncodedImage>,
}

impl FrameCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(EncodedImage::placeholder());
        Self { tx }
    }

    pub fn latest(&self) -> EncodedImage {
        self.tx.borrow().clone()
    }

    pub fn publish(&self, frame: EncodedImage) {
        self.tx.send_replace(frame);
    }

    pub fn reset(&self) {
        self.tx.send_replace(EncodedImage::placeholder());
    }

    /// Receiver notified on every publish or reset.
    pub fn subscribe(&self) -> watch::Receiver<EncodedImage> {
        self.tx.subscribe()
    }
}

impl Default for FrameCell {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub(crate) enum CaptureFailure {
    /// The connection itself is gone.
    Lost(String),
    Transient(String),
}

impl std::fmt::Display for CaptureFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureFailure::Lost(e) => write!(f, "connection lost: {e}"),
            CaptureFailure::Transient(e) => write!(f, "{e}"),
        }
    }
}

/// Grab one screenshot and encode it. The transport lock is held only for
/// the screenshot itself; encoding runs on a blocking thread.
pub(crate) async fn capture_once(client: &SharedClient) -> Result<EncodedImage, CaptureFailure> {
    let pixels = {
        let mut guard = client.lock().await;
        guard.screenshot().await
    }
    .map_err(|e| {
        if e.is_connection_lost() {
            CaptureFailure::Lost(e.to_string())
        } else {
            CaptureFailure::Transient(e.to_string())
        }
    })?;

    tokio::task::spawn_blocking(move || EncodedImage::encode_png(&pixels))
        .await
        .map_err(|e| CaptureFailure::Transient(format!("encode task: {e}")))?
        .map_err(|e| CaptureFailure::Transient(e.to_string()))
}

pub struct FrameSampler {
    state: Arc<StdMutex<SamplerState>>,
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl FrameSampler {
    /// Spawn the sampling loop. `connected` is cleared if the loop observes
    /// connection loss.
    pub(crate) fn start(
        client: SharedClient,
        frames: Arc<FrameCell>,
        connected: Arc<AtomicBool>,
        interval: Duration,
    ) -> Self {
        let state = Arc::new(StdMutex::new(SamplerState::Idle));
        let (stop_tx, stop_rx) = watch::channel(false);

        set_state(&state, SamplerState::Sampling);
        let handle = tokio::spawn(sample_loop(
            client,
            frames,
            connected,
            interval,
            stop_rx,
            state.clone(),
        ));

        Self { state, stop_tx, handle: Some(handle) }
    }

    pub fn state(&self) -> SamplerState {
        self.state.lock().map(|s| *s).unwrap_or(SamplerState::Stopped)
    }

    /// Signal the loop and wait for it to exit. An in-flight capture is
    /// allowed to finish first.
    pub async fn stop(mut self) {
        let Some(handle) = self.handle.take() else { return };
        if self.state() == SamplerState::Sampling {
            set_state(&self.state, SamplerState::Stopping);
        }
        let _ = self.stop_tx.send(true);
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "sampler task did not exit cleanly");
        }
        set_state(&self.state, SamplerState::Stopped);
    }
}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.stop_tx.send(true);
            handle.abort();
            set_state(&self.state, SamplerState::Stopped);
        }
    }
}

fn set_state(state: &StdMutex<SamplerState>, next: SamplerState) {
    if let Ok(mut s) = state.lock() {
        *s = next;
    }
}

async fn sample_loop(
    client: SharedClient,
    frames: Arc<FrameCell>,
    connected: Arc<AtomicBool>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
    state: Arc<StdMutex<SamplerState>>,
) {
    tracing::info!(interval_ms = interval.as_millis() as u64, "frame sampler started");
    loop {
        if *stop_rx.borrow() {
            break;
        }

        match capture_once(&client).await {
            Ok(frame) => {
                tracing::trace!(bytes = frame.bytes().len(), "frame sampled");
                frames.publish(frame);
            }
            Err(CaptureFailure::Lost(e)) => {
                tracing::error!(error = %e, "sampler lost the connection; marking session disconnected");
                connected.store(false, Ordering::SeqCst);
                frames.reset();
                break;
            }
            Err(CaptureFailure::Transient(e)) => {
                tracing::warn!(error = %e, "periodic frame capture failed");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    set_state(&state, SamplerState::Stopped);
    tracing::info!("frame sampler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::FakeConnector;

    #[tokio::test]
    async fn frame_cell_starts_with_placeholder() {
        let cell = FrameCell::new();
        assert!(cell.latest().is_placeholder());
        let px = image::RgbaImage::new(1, 1);
        cell.publish(EncodedImage::encode_png(&px).unwrap());
        assert!(!cell.latest().is_placeholder());
        cell.reset();
        assert!(cell.latest().is_placeholder());
    }

    #[tokio::test]
    async fn sampler_publishes_and_stops() {
        let fake = FakeConnector::new();
        let client: SharedClient = Arc::new(Mutex::new(fake.client()));
        let frames = Arc::new(FrameCell::new());
        let connected = Arc::new(AtomicBool::new(true));
        let mut rx = frames.subscribe();

        let sampler = FrameSampler::start(
            client,
            frames.clone(),
            connected.clone(),
            Duration::from_secs(3600),
        );
        assert_eq!(sampler.state(), SamplerState::Sampling);

        rx.changed().await.unwrap();
        assert!(!frames.latest().is_placeholder());

        sampler.stop().await;
        assert!(connected.load(Ordering::SeqCst));
        assert_eq!(fake.screenshots(), 1);
    }

    #[tokio::test]
    async fn sampler_marks_connection_lost() {
        let fake = FakeConnector::new();
        fake.set_lost(true);
        let client: SharedClient = Arc::new(Mutex::new(fake.client()));
        let frames = Arc::new(FrameCell::new());
        let connected = Arc::new(AtomicBool::new(true));

        let sampler = FrameSampler::start(
            client,
            frames.clone(),
            connected.clone(),
            Duration::from_millis(10),
        );
        for _ in 0..200 {
            if !connected.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!connected.load(Ordering::SeqCst));
        assert!(frames.latest().is_placeholder());
        sampler.stop().await;
    }
}
