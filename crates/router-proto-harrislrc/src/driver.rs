//! TCP wiring for the `harrislrc` dialect: connects to the device, runs the
//! reader/dispatcher tasks, and exposes the [`Router`] façade.
//!
//! Mirrors the reference driver's `Start`/`replyListener`/`replyHandler`
//! split, but replaces its busy-wait `receiverReady` counter with
//! [`ReadyGate`] and its unbounded reply channel with the bounded queue in
//! `router_core::transport`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use router_core::transport::{FrameAssembler, ReadyGate, SessionState, FRAME_QUEUE_CAPACITY};
use router_core::{Crosspoint, CrosspointSink, Destination, Level, NullSink, Router, RouterError, Source, StateStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::{self, ArgSig, Argument, Decoded, Message, Op};
use crate::config::HarrisLrcConfig;
use crate::dispatcher::{self, DispatchOutcome};

/// The five state-snapshot commands issued on connect and again on every
/// `DBCHANGE` notification, 10ms apart as in the reference driver.
// `DEST?`/`SRC?` carry a literal `Q${NAME,CHANNELS}` suffix rather than the
// codec's usual `$(...)` argument shape — the reference device's query
// commands use `{}` where every other argument payload uses `()`. This is a
// quirk of the wire protocol itself, not a typo, so it is reproduced
// literally rather than built through `codec::encode`.
const SNAPSHOT_COMMANDS: [&str; 5] = [
    "~CHANNELS?\\",
    "~DEST?Q${NAME,CHANNELS}\\",
    "~SRC?Q${NAME,CHANNELS}\\",
    "~XPOINT?\\",
    "~LOCK?\\",
];

const SNAPSHOT_PACING: Duration = Duration::from_millis(10);

pub struct HarrisLrcRouter {
    config: HarrisLrcConfig,
    store: Arc<StateStore>,
    sink: std::sync::RwLock<Arc<dyn CrosspointSink>>,
    ready: Arc<ReadyGate>,
    writer: Arc<AsyncMutex<Option<OwnedWriteHalf>>>,
    stop_tx: AsyncMutex<Option<watch::Sender<bool>>>,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl HarrisLrcRouter {
    pub fn new(config: HarrisLrcConfig) -> Self {
        Self {
            config,
            store: Arc::new(StateStore::new()),
            sink: std::sync::RwLock::new(Arc::new(NullSink)),
            ready: Arc::new(ReadyGate::new()),
            writer: Arc::new(AsyncMutex::new(None)),
            stop_tx: AsyncMutex::new(None),
            tasks: AsyncMutex::new(Vec::new()),
        }
    }

    fn sink(&self) -> Arc<dyn CrosspointSink> {
        self.sink.read().unwrap().clone()
    }

    async fn write_frame(&self, frame: &str) -> Result<(), RouterError> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| RouterError::WriteFailed("connection not open".to_owned()))?;
        writer
            .write_all(frame.as_bytes())
            .await
            .map_err(|e| RouterError::WriteFailed(e.to_string()))
    }
}

#[async_trait]
impl Router for HarrisLrcRouter {
    async fn start(&self) -> Result<(), RouterError> {
        self.ready.set(SessionState::Connecting);
        let stream = TcpStream::connect((self.config.hostname.as_str(), self.config.port))
            .await
            .map_err(|e| RouterError::Transport(format!("connecting to {}:{}: {e}", self.config.hostname, self.config.port)))?;
        let (mut read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);
        self.ready.set(SessionState::ReaderReady);

        let (stop_tx, mut reader_stop_rx) = watch::channel(false);
        let mut dispatcher_stop_rx = reader_stop_rx.clone();
        *self.stop_tx.lock().await = Some(stop_tx);

        let (frame_tx, mut frame_rx) = mpsc::channel::<Message>(FRAME_QUEUE_CAPACITY);
        let ready = self.ready.clone();
        let writer_for_reader = self.writer.clone();

        let reader_task = tokio::spawn(async move {
            let mut assembler = FrameAssembler::default();
            let mut buf = [0u8; 1500];
            loop {
                tokio::select! {
                    _ = reader_stop_rx.changed() => {
                        debug!("reader task received stop signal");
                        break;
                    }
                    read_result = read_half.read(&mut buf) => {
                        match read_result {
                            Ok(0) => {
                                info!("device closed the connection");
                                break;
                            }
                            Ok(n) => {
                                let chunk = String::from_utf8_lossy(&buf[..n]);
                                if let Err(e) = assembler.feed(&chunk) {
                                    error!(error = %e, "frame buffer overflowed, closing session");
                                    close_write_half(&writer_for_reader).await;
                                    break;
                                }
                                while let Some(frame) = assembler.next_frame() {
                                    match codec::decode(&frame) {
                                        Ok(Decoded::Message(msg, _)) => {
                                            if frame_tx.send(msg).await.is_err() {
                                                break;
                                            }
                                        }
                                        Ok(Decoded::Incomplete) => {}
                                        Err(e) => warn!(error = %e, frame = %frame, "dropping unparseable frame"),
                                    }
                                }
                            }
                            Err(e) => {
                                error!(error = %e, "read error, closing session");
                                close_write_half(&writer_for_reader).await;
                                break;
                            }
                        }
                    }
                }
            }
            ready.set(SessionState::Draining);
        });

        let store = self.store.clone();
        // Snapshots the sink installed so far. `Registry::build` installs
        // the sink before calling `start`, so this is the live sink for the
        // lifetime of the session; a `set_crosspoint_notify` call after
        // `start` only takes effect on the next `start`.
        let sink_handle = self.sink();
        let writer_for_snapshot = self.writer.clone();

        let dispatcher_ready = self.ready.clone();
        let dispatcher_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = dispatcher_stop_rx.changed() => {
                        debug!("dispatcher task received stop signal");
                        break;
                    }
                    msg = frame_rx.recv() => {
                        let Some(msg) = msg else { break };
                        let outcome = dispatcher::dispatch(&store, &sink_handle, &msg).await;
                        if outcome == DispatchOutcome::SnapshotRequested {
                            let writer = writer_for_snapshot.clone();
                            tokio::spawn(async move {
                                send_snapshot_sequence(&writer).await;
                            });
                        }
                    }
                }
            }
            dispatcher_ready.set(SessionState::Draining);
        });

        self.tasks.lock().await.extend([reader_task, dispatcher_task]);
        self.ready.set(SessionState::Ready);

        let writer = self.writer.clone();
        tokio::spawn(async move {
            send_snapshot_sequence(&writer).await;
        });

        Ok(())
    }

    async fn stop(&self) {
        self.ready.set(SessionState::Draining);
        if let Some(tx) = self.stop_tx.lock().await.take() {
            let _ = tx.send(true);
        }
        for task in self.tasks.lock().await.drain(..) {
            let _ = task.await;
        }
        *self.writer.lock().await = None;
        self.ready.set(SessionState::Closed);
    }

    fn set_crosspoint_notify(&self, sink: Arc<dyn CrosspointSink>) {
        *self.sink.write().unwrap() = sink;
    }

    async fn get_levels(&self) -> Vec<Level> {
        self.store.levels().await
    }

    async fn get_sources(&self) -> Vec<Source> {
        self.store.sources().await
    }

    async fn get_destinations(&self) -> Vec<Destination> {
        self.store.destinations().await
    }

    async fn get_crosspoints(&self) -> Vec<Crosspoint> {
        self.store.crosspoints().await
    }

    async fn get_source(&self, id: u32) -> Source {
        self.store.source(id).await.unwrap_or_default()
    }

    async fn get_destination(&self, id: u32) -> Destination {
        self.store.destination(id).await.unwrap_or_default()
    }

    async fn get_level(&self, id: u32) -> Level {
        self.store.level(id).await.unwrap_or_default()
    }

    async fn set_crosspoint(
        &self,
        dest_id: u32,
        dest_level_id: u32,
        src_id: u32,
        src_level_id: u32,
    ) -> Result<(), RouterError> {
        self.ready.wait_for_ready().await?;
        let msg = Message::new(
            "XPOINT",
            Op::Change,
            vec![
                Argument {
                    name: "D".to_owned(),
                    sig: ArgSig::Num,
                    values: vec![format!("{dest_id}.{dest_level_id}")],
                },
                Argument {
                    name: "S".to_owned(),
                    sig: ArgSig::Num,
                    values: vec![format!("{src_id}.{src_level_id}")],
                },
            ],
        );
        self.write_frame(&codec::encode(&msg)).await
    }

    async fn lock_destination(&self, dest_id: u32, _level: u32) -> Result<(), RouterError> {
        self.send_lock_command(dest_id, "OFF").await
    }

    async fn unlock_destination(&self, dest_id: u32, _level: u32) -> Result<(), RouterError> {
        self.send_lock_command(dest_id, "ON").await
    }
}

impl HarrisLrcRouter {
    async fn send_lock_command(&self, dest_id: u32, value: &str) -> Result<(), RouterError> {
        self.ready.wait_for_ready().await?;
        let msg = Message::new(
            "LOCK",
            Op::Change,
            vec![
                Argument {
                    name: "D".to_owned(),
                    sig: ArgSig::Num,
                    values: vec![dest_id.to_string()],
                },
                Argument {
                    name: "V".to_owned(),
                    sig: ArgSig::Str,
                    values: vec![value.to_owned()],
                },
            ],
        );
        self.write_frame(&codec::encode(&msg)).await
    }
}

/// Closes the write half explicitly, distinct from the EOF path (which
/// leaves the connection for `stop()` to tear down). A non-EOF read error
/// or a buffer overflow both mean the session is no longer trustworthy, so
/// the socket is closed here rather than waiting for an external `stop()`.
async fn close_write_half(writer: &Arc<AsyncMutex<Option<OwnedWriteHalf>>>) {
    if let Some(mut w) = writer.lock().await.take() {
        let _ = w.shutdown().await;
    }
}

async fn send_snapshot_sequence(writer: &Arc<AsyncMutex<Option<OwnedWriteHalf>>>) {
    for (i, command) in SNAPSHOT_COMMANDS.iter().enumerate() {
        {
            let mut guard = writer.lock().await;
            let Some(w) = guard.as_mut() else {
                warn!("cannot send snapshot command, connection already closed");
                return;
            };
            if let Err(e) = w.write_all(command.as_bytes()).await {
                warn!(error = %e, "failed to send snapshot command");
                return;
            }
        }
        if i + 1 < SNAPSHOT_COMMANDS.len() {
            tokio::time::sleep(SNAPSHOT_PACING).await;
        }
    }
}
