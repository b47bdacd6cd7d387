/// Scripted in-memory transport used by unit tests.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::config::Endpoint;
use crate::rfb::{RfbClient, RfbConnector, TransportError, TransportResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Screenshot,
    Move(i32, i32),
    Click(u8),
    Press(Vec<String>),
    Write(String),
    Drain,
    Close,
}

#[derive(Debug)]
struct FakeState {
    calls: Vec<Call>,
    transient_failures: u32,
    lost: bool,
    refuse: bool,
    size: (u32, u32),
    connects: u32,
    /// When set, each screenshot waits for one permit before returning.
    gate: Option<Arc<Semaphore>>,
}

#[derive(Clone)]
pub struct FakeConnector {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                calls: Vec::new(),
                transient_failures: 0,
                lost: false,
                refuse: false,
                size: (64, 48),
                connects: 0,
                gate: None,
            })),
        }
    }

    /// Hold every subsequent screenshot until a permit is added to the
    /// returned semaphore. The transport lock stays held while waiting.
    pub fn gate_screenshots(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.state.lock().unwrap().gate = Some(gate.clone());
        gate
    }

    pub fn client(&self) -> Box<dyn RfbClient> {
        Box::new(FakeClient { state: self.state.clone() })
    }

    pub fn set_size(&self, w: u32, h: u32) {
        self.state.lock().unwrap().size = (w, h);
    }

    pub fn set_transient_failures(&self, n: u32) {
        self.state.lock().unwrap().transient_failures = n;
    }

    pub fn set_lost(&self, lost: bool) {
        self.state.lock().unwrap().lost = lost;
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.state.lock().unwrap().refuse = refuse;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded calls other than screenshots.
    pub fn input_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| *c != Call::Screenshot).collect()
    }

    pub fn screenshots(&self) -> usize {
        self.calls().iter().filter(|c| **c == Call::Screenshot).count()
    }

    pub fn connects(&self) -> u32 {
        self.state.lock().unwrap().connects
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RfbConnector for FakeConnector {
    async fn connect(&self, _endpoint: &Endpoint, _password: &str) -> TransportResult<Box<dyn RfbClient>> {
        let mut s = self.state.lock().unwrap();
        if s.refuse {
            return Err(TransportError::Auth("password rejected".into()));
        }
        s.connects += 1;
        s.lost = false;
        drop(s);
        Ok(self.client())
    }
}

struct FakeClient {
    state: Arc<Mutex<FakeState>>,
}

impl FakeClient {
    fn record(&self, call: Call) -> TransportResult<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(call);
        if s.lost {
            return Err(TransportError::ConnectionLost("socket closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RfbClient for FakeClient {
    async fn screenshot(&mut self) -> TransportResult<image::RgbaImage> {
        self.record(Call::Screenshot)?;
        let gate = self.state.lock().unwrap().gate.clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        let mut s = self.state.lock().unwrap();
        if s.transient_failures > 0 {
            s.transient_failures -= 1;
            return Err(TransportError::Transient("framebuffer update timed out".into()));
        }
        let (w, h) = s.size;
        Ok(image::RgbaImage::from_pixel(w, h, image::Rgba([200, 200, 200, 255])))
    }

    fn mouse_move(&mut self, x: i32, y: i32) -> TransportResult<()> {
        self.record(Call::Move(x, y))
    }

    fn mouse_click(&mut self, button: u8) -> TransportResult<()> {
        self.record(Call::Click(button))
    }

    fn key_press(&mut self, keys: &[String]) -> TransportResult<()> {
        self.record(Call::Press(keys.to_vec()))
    }

    fn key_write(&mut self, text: &str) -> TransportResult<()> {
        self.record(Call::Write(text.to_string()))
    }

    async fn drain(&mut self) -> TransportResult<()> {
        self.record(Call::Drain)
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.state.lock().unwrap().calls.push(Call::Close);
        Ok(())
    }
}
