//! Test doubles shared by the integration tests.
//!
//! - [`FakeEngine`]: in-memory sidecar implementing [`Connector`]
//! - [`FakeLauncher`]: scripted [`EngineLauncher`]
//! - [`RingWriter`]: writes frames into a ring file the way the engine does
//! - [`spawn_ws_engine`]: a real WebSocket sidecar on a loopback port

use engine_core::error::spawn::SpawnError;
use engine_core::error::transport::TransportError;
use engine_core::frame_ring::{FrameFeed, HEADER_SIZE, LENGTH_PREFIX_SIZE, RingHeader};
use engine_core::session::{ConnectionDescriptor, EngineSession};
use engine_core::supervisor::EngineLauncher;
use engine_core::transport::{Connector, RequestChannel};

use common::RedactedToken;

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub const TEST_TOKEN: &str = "test-token-12345";

// ----------------------------------------------------------------------------
// Sessions
// ----------------------------------------------------------------------------

pub fn test_session(generation: u64, control_port: u16, health_port: u16) -> EngineSession {
    EngineSession::new(
        generation,
        ConnectionDescriptor::new(
            control_port,
            health_port,
            RedactedToken::new(format!("{TEST_TOKEN}-{generation}")),
        ),
    )
}

// ----------------------------------------------------------------------------
// FakeEngine
// ----------------------------------------------------------------------------

/// How the fake engine answers one request.
#[derive(Debug, Clone)]
pub enum FakeReply {
    /// Reply with these fields; `id` is copied from the request unless present.
    Json(Value),
    /// Reply after a delay.
    Delayed(Duration, Value),
    /// Never reply.
    Hang,
    /// Fail the round trip with a transport error.
    Fail,
}

pub fn ok_reply() -> FakeReply {
    FakeReply::Json(json!({"ok": true}))
}

pub fn alive_reply(uptime_s: f64) -> FakeReply {
    FakeReply::Json(json!({"status": "alive", "uptime_s": uptime_s}))
}

type Handler = Arc<dyn Fn(u16, &Value) -> FakeReply + Send + Sync>;

/// In-memory engine. Every connection and request is recorded.
#[derive(Clone)]
pub struct FakeEngine {
    handler: Arc<Mutex<Handler>>,
    connections: Arc<Mutex<Vec<u16>>>,
    requests: Arc<Mutex<Vec<(u16, Value)>>>,
}

impl FakeEngine {
    pub fn new(handler: impl Fn(u16, &Value) -> FakeReply + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(Mutex::new(Arc::new(handler))),
            connections: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_handler(&self, handler: impl Fn(u16, &Value) -> FakeReply + Send + Sync + 'static) {
        *self.handler.lock().unwrap() = Arc::new(handler);
    }

    /// Ports of every connection opened so far, in order.
    pub fn connections(&self) -> Vec<u16> {
        self.connections.lock().unwrap().clone()
    }

    pub fn connections_to(&self, port: u16) -> usize {
        self.connections().iter().filter(|p| **p == port).count()
    }

    pub fn requests(&self) -> Vec<(u16, Value)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count_cmd(&self, cmd: &str) -> usize {
        self.requests()
            .iter()
            .filter(|(_, request)| request["cmd"] == cmd)
            .count()
    }
}

impl Connector for FakeEngine {
    fn connect(&self, port: u16) -> BoxFuture<'_, Result<Box<dyn RequestChannel>, TransportError>> {
        Box::pin(async move {
            self.connections.lock().unwrap().push(port);
            Ok(Box::new(FakeChannel {
                port,
                engine: self.clone(),
            }) as Box<dyn RequestChannel>)
        })
    }
}

struct FakeChannel {
    port: u16,
    engine: FakeEngine,
}

impl RequestChannel for FakeChannel {
    fn round_trip(&mut self, request: String) -> BoxFuture<'_, Result<String, TransportError>> {
        Box::pin(async move {
            let request: Value = serde_json::from_str(&request).expect("request is JSON");
            self.engine
                .requests
                .lock()
                .unwrap()
                .push((self.port, request.clone()));

            let handler = Arc::clone(&self.engine.handler.lock().unwrap());
            let body = match handler(self.port, &request) {
                FakeReply::Json(body) => body,
                FakeReply::Delayed(delay, body) => {
                    tokio::time::sleep(delay).await;
                    body
                }
                FakeReply::Hang => std::future::pending::<Value>().await,
                FakeReply::Fail => return Err(TransportError::io("fake connection reset")),
            };
            Ok(with_request_id(body, &request).to_string())
        })
    }
}

fn with_request_id(mut body: Value, request: &Value) -> Value {
    if let Value::Object(map) = &mut body
        && !map.contains_key("id")
    {
        map.insert("id".into(), request["id"].clone());
    }
    body
}

// ----------------------------------------------------------------------------
// FakeLauncher
// ----------------------------------------------------------------------------

/// Hands out queued restart results; an empty queue fails the restart.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    results: Arc<Mutex<VecDeque<Result<EngineSession, String>>>>,
    restarts: Arc<AtomicUsize>,
    watched_feed: Arc<Mutex<Option<FrameFeed>>>,
    feed_open_at_restart: Arc<Mutex<Vec<bool>>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_session(&self, session: EngineSession) {
        self.results.lock().unwrap().push_back(Ok(session));
    }

    pub fn push_failure(&self, message: &str) {
        self.results.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    /// Record whether `frames` still holds a mapping each time a restart begins.
    pub fn watch_feed(&self, frames: FrameFeed) {
        *self.watched_feed.lock().unwrap() = Some(frames);
    }

    pub fn feed_open_at_restart(&self) -> Vec<bool> {
        self.feed_open_at_restart.lock().unwrap().clone()
    }
}

impl EngineLauncher for FakeLauncher {
    fn restart(&self) -> BoxFuture<'_, Result<EngineSession, SpawnError>> {
        Box::pin(async move {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            if let Some(frames) = self.watched_feed.lock().unwrap().as_ref() {
                self.feed_open_at_restart
                    .lock()
                    .unwrap()
                    .push(frames.is_open());
            }
            match self.results.lock().unwrap().pop_front() {
                Some(Ok(session)) => Ok(session),
                Some(Err(message)) => Err(SpawnError::exited(message)),
                None => Err(SpawnError::exited("no scripted restart")),
            }
        })
    }
}

// ----------------------------------------------------------------------------
// RingWriter
// ----------------------------------------------------------------------------

/// Writes a ring file with the engine's layout: slot first, then `write_index`.
pub struct RingWriter {
    path: PathBuf,
    file: File,
    header: RingHeader,
}

impl RingWriter {
    pub fn create(path: &Path, slot_size: u32, ring_size: u32) -> Self {
        let header = RingHeader {
            write_index: 0,
            frame_count: 0,
            slot_size,
            ring_size,
            width: 1280,
            height: 720,
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .expect("create ring file");
        file.set_len(header.required_file_size())
            .expect("size ring file");
        file.write_all(&header.encode()).expect("write header");
        file.flush().expect("flush header");

        Self {
            path: path.to_path_buf(),
            file,
            header,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one frame into the next slot and publish it.
    pub fn write_frame(&mut self, bytes: &[u8]) {
        let slot = self.header.write_index % self.header.ring_size;
        self.write_slot_raw(slot, bytes.len() as u32, bytes);
        self.set_write_index(self.header.write_index.wrapping_add(1));
    }

    /// Write a length prefix and payload into `slot` without publishing.
    pub fn write_slot_raw(&mut self, slot: u32, length: u32, bytes: &[u8]) {
        let offset = self.header.slot_offset(slot);
        self.file.seek(SeekFrom::Start(offset)).unwrap();
        self.file.write_all(&length.to_le_bytes()).unwrap();
        self.file.write_all(bytes).unwrap();
        self.file.flush().unwrap();
    }

    pub fn set_write_index(&mut self, write_index: u32) {
        self.header.write_index = write_index;
        self.header.frame_count = self.header.frame_count.wrapping_add(1);
        self.file.seek(SeekFrom::Start(0)).unwrap();
        self.file.write_all(&self.header.encode()).unwrap();
        self.file.flush().unwrap();
    }
}

/// A fake JPEG payload: SOI marker, a tag byte, then filler.
pub fn jpeg_frame(tag: u8, len: usize) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, tag];
    bytes.resize(len.max(4), tag);
    bytes
}

pub const MIN_RING_FILE: usize = HEADER_SIZE + LENGTH_PREFIX_SIZE;

// ----------------------------------------------------------------------------
// WebSocket engine
// ----------------------------------------------------------------------------

/// Serve the engine protocol on a loopback port. Each text frame is answered
/// with `handler(request)` plus the request's id.
pub async fn spawn_ws_engine(
    handler: impl Fn(&Value) -> Value + Send + Sync + 'static,
) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake engine");
    let port = listener.local_addr().unwrap().port();
    let handler = Arc::new(handler);

    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    let Message::Text(text) = message else {
                        continue;
                    };
                    let request: Value = serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
                    let reply = with_request_id(handler(&request), &request);
                    if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    (port, handle)
}
