//! One live streaming connection and the analyzer it owns.

use facestream_core::analysis::domain::analysis_result::AnalysisResult;
use facestream_core::analysis::domain::engine_handle::EngineHandle;
use facestream_core::analysis::domain::frame_analyzer::EngineInitError;
use facestream_core::codec::{frame_codec, frame_normalizer};
use facestream_core::dispatch::analysis_dispatcher::{DispatchError, Dispatched};
use facestream_core::shared::frame::Frame;

use super::transport::{FrameTransport, Inbound, TransportError};
use crate::frame_message::FrameMessage;
use crate::registry::{RegistryEntry, SessionId};
use crate::server::AppState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Draining,
    Closed,
}

/// Why a session left `Active`.
#[derive(Debug)]
pub enum EndReason {
    /// The engine could not be created; the session never became active.
    EngineUnavailable(EngineInitError),
    PeerClosed,
    Transport(TransportError),
    Dispatch(DispatchError),
    Shutdown,
}

/// Outcome of a finished session, for logging and tests.
#[derive(Debug)]
pub struct SessionReport {
    /// `None` when the session was never registered.
    pub id: Option<SessionId>,
    pub frames_received: u64,
    pub reason: EndReason,
    /// Every state the session passed through, in order.
    pub states: Vec<SessionState>,
}

/// Drives one connection through `Connecting → Active → Draining → Closed`.
///
/// The session owns its engine exclusively and processes one frame at a
/// time: the next message is not read until the reply to the previous one
/// has been sent. That keeps replies in order and means the engine is never
/// inside two analyses at once. Per-frame failures become error replies;
/// only transport failures, peer close, pool loss, or shutdown end the loop.
pub struct ConnectionSession<T> {
    transport: T,
    app: AppState,
    states: Vec<SessionState>,
    frames_received: u64,
}

impl<T: FrameTransport> ConnectionSession<T> {
    pub fn new(transport: T, app: AppState) -> Self {
        Self {
            transport,
            app,
            states: vec![SessionState::Connecting],
            frames_received: 0,
        }
    }

    fn enter(&mut self, next: SessionState) {
        log::trace!("Session state {:?} -> {next:?}", self.states.last());
        self.states.push(next);
    }

    /// Run the session to completion.
    pub async fn run(mut self) -> SessionReport {
        let engine = match open_engine(&self.app).await {
            Ok(engine) => engine,
            Err(e) => {
                log::error!("Analyzer unavailable, refusing connection: {e}");
                let reply = AnalysisResult::error(format!("Analyzer unavailable: {e}"));
                if let Err(send_err) = self.transport.send_text(to_json(&reply)).await {
                    log::debug!("Could not report analyzer failure: {send_err}");
                }
                self.transport.close().await;
                self.enter(SessionState::Closed);
                return SessionReport {
                    id: None,
                    frames_received: 0,
                    reason: EndReason::EngineUnavailable(e),
                    states: self.states,
                };
            }
        };

        let entry = self.app.registry.register();
        self.enter(SessionState::Active);
        log::info!(
            "Session {} connected (active: {})",
            entry.id(),
            self.app.registry.len()
        );

        let (engine, reason) = self.serve(engine, &entry).await;

        self.enter(SessionState::Draining);
        self.drain(engine, entry, reason).await
    }

    /// The `Active` loop. Returns the engine if it is still held.
    async fn serve(
        &mut self,
        mut engine: EngineHandle,
        entry: &RegistryEntry,
    ) -> (Option<EngineHandle>, EndReason) {
        let shutdown = self.app.shutdown.clone();
        loop {
            // Shutdown only interrupts the wait for the next message, never a frame in flight.
            let inbound = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return (Some(engine), EndReason::Shutdown),
                message = self.transport.recv_frame() => message,
            };
            let inbound = match inbound {
                None => return (Some(engine), EndReason::PeerClosed),
                Some(Err(e)) => return (Some(engine), EndReason::Transport(e)),
                Some(Ok(inbound)) => inbound,
            };

            self.frames_received += 1;
            entry.stats().record_received();
            let sequence = self.frames_received;

            let (returned, reply) = match handle_frame(&self.app, engine, inbound, sequence).await {
                Ok(pair) => pair,
                Err(e) => return (None, EndReason::Dispatch(e)),
            };
            engine = returned;

            match &reply {
                AnalysisResult::Error { error } => {
                    entry.stats().record_rejected();
                    log::warn!("Session {} frame {sequence}: {error}", entry.id());
                }
                AnalysisResult::Metrics(metrics) => {
                    entry.stats().record_analyzed();
                    let interval = self.app.config.progress_log_interval;
                    if interval > 0 && sequence % interval == 0 {
                        log::info!(
                            "Session {} processed {sequence} frames, face detected: {}",
                            entry.id(),
                            metrics.face_detected
                        );
                    }
                }
            }

            if let Err(e) = self.transport.send_text(to_json(&reply)).await {
                return (Some(engine), EndReason::Transport(e));
            }
        }
    }

    /// Release the engine, then the registry entry. A failed engine close is
    /// logged and does not keep the entry registered.
    async fn drain(
        mut self,
        engine: Option<EngineHandle>,
        entry: RegistryEntry,
        reason: EndReason,
    ) -> SessionReport {
        let id = entry.id();
        match &reason {
            EndReason::Transport(e) => log::warn!("Session {id} transport failure: {e}"),
            EndReason::Dispatch(e) => log::error!("Session {id} lost its analyzer: {e}"),
            EndReason::Shutdown => log::info!("Session {id} closing for shutdown"),
            EndReason::PeerClosed | EndReason::EngineUnavailable(_) => {}
        }

        if let Some(engine) = engine {
            if let Err(e) = engine.close() {
                log::error!("Session {id} failed to close analyzer: {e}");
            }
        }
        drop(entry);

        if !matches!(reason, EndReason::PeerClosed | EndReason::Transport(_)) {
            self.transport.close().await;
        }
        self.enter(SessionState::Closed);

        log::info!(
            "Session {id} disconnected after {} frames (active: {})",
            self.frames_received,
            self.app.registry.len()
        );
        SessionReport {
            id: Some(id),
            frames_received: self.frames_received,
            reason,
            states: self.states,
        }
    }
}

async fn open_engine(app: &AppState) -> Result<EngineHandle, EngineInitError> {
    let factory = app.factory.clone();
    let max_faces = app.config.max_faces;
    tokio::task::spawn_blocking(move || EngineHandle::open(factory.as_ref(), max_faces))
        .await
        .unwrap_or_else(|e| {
            Err(EngineInitError::Unavailable(format!(
                "analyzer creation aborted: {e}"
            )))
        })
}

/// Decode, normalize and analyze one message. Errors other than pool
/// loss come back as an error reply along with the engine.
async fn handle_frame(
    app: &AppState,
    engine: EngineHandle,
    inbound: Inbound,
    sequence: u64,
) -> Result<(EngineHandle, AnalysisResult), DispatchError> {
    let max_height = app.config.stream_max_height;
    let prepared = tokio::task::spawn_blocking(move || prepare_frame(inbound, max_height)).await;
    let frame = match prepared {
        Ok(Ok(frame)) => frame.with_sequence(sequence),
        Ok(Err(message)) => return Ok((engine, AnalysisResult::error(message))),
        Err(e) => {
            return Ok((
                engine,
                AnalysisResult::error(format!("Processing error: {e}")),
            ))
        }
    };

    let Dispatched { engine, outcome } = app.dispatcher.run(engine, frame).await?;
    let reply = match outcome {
        Ok(metrics) => AnalysisResult::from(metrics),
        Err(e) => AnalysisResult::error(format!("Processing error: {e}")),
    };
    Ok((engine, reply))
}

/// Codec then normalizer. The error is the client-facing message.
fn prepare_frame(inbound: Inbound, max_height: u32) -> Result<Frame, String> {
    let decoded = match inbound {
        Inbound::Text(text) => {
            let message: FrameMessage =
                serde_json::from_str(&text).map_err(|_| "Invalid JSON".to_string())?;
            let payload = message
                .into_payload()
                .ok_or_else(|| "No frame data provided".to_string())?;
            frame_codec::decode_base64(&payload)
        }
        Inbound::Binary(bytes) => frame_codec::decode_bytes(&bytes),
    };
    let frame = decoded.map_err(|e| e.client_message().to_string())?;
    Ok(frame_normalizer::bound_height(frame, max_height))
}

fn to_json(result: &AnalysisResult) -> String {
    serde_json::to_string(result).unwrap_or_else(|e| {
        log::error!("Failed to serialize reply: {e}");
        r#"{"error":"Processing error: unserializable result"}"#.to_string()
    })
}
