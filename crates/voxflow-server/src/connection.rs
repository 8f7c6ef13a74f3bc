//! WebSocket connection lifecycle — one connection drives one voice session.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use voxflow_audio::{FrameAssembler, TurnController, TurnEvent};
use voxflow_core::protocol::{ClientFrame, ServerFrame, PROTOCOL_VERSION};
use voxflow_core::types::CloseReason;
use voxflow_session::{DialogueSession, SessionEvent};

use crate::metrics;
use crate::state::{AppState, ConnectionInfo};

/// Handle a new WebSocket connection.
pub async fn handle_connection(state: Arc<AppState>, ws: WebSocket) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "New voice connection");
    metrics::record_ws_connect();

    let (mut ws_tx, mut ws_rx) = ws.split();

    // Single writer: everything outbound funnels through this channel.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    let (session, session_events) = DialogueSession::start(
        state.config.clone(),
        state.stt.clone(),
        state.llm.clone(),
        state.tts.clone(),
    );

    {
        let mut connections = state.connections.write().await;
        connections.insert(
            conn_id.clone(),
            ConnectionInfo {
                conn_id: conn_id.clone(),
                session_id: session.id.clone(),
                connected_at: Utc::now(),
            },
        );
    }

    let forward_task = tokio::spawn(forward_session_events(session_events, out_tx.clone()));

    // Read loop owns the audio front-end for this connection.
    let pipeline = state.config.pipeline();
    let mut assembler = FrameAssembler::new();
    let mut controller = TurnController::new(&pipeline);

    while let Some(msg_result) = ws_rx.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => {
                for frame in assembler.push(&data) {
                    if let Some(event) = controller.push_frame(frame) {
                        if let TurnEvent::Ended(ref turn) = event {
                            metrics::record_turn(
                                close_reason_label(turn.close_reason),
                                turn.duration_ms,
                            );
                        }
                        if !session.push_turn_event(event) {
                            break;
                        }
                    }
                }
            }
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(ClientFrame::Flush) => {
                    debug!(conn_id = %conn_id, "Client flushed the current turn");
                    if let Some(turn) = controller.flush() {
                        metrics::record_turn(close_reason_label(turn.close_reason), turn.duration_ms);
                        session.push_turn_event(TurnEvent::Ended(turn));
                    }
                }
                Ok(ClientFrame::Ping) => {
                    send_frame(&out_tx, &ServerFrame::Pong);
                }
                Err(e) => {
                    warn!(conn_id = %conn_id, %e, "Invalid control frame");
                    send_frame(
                        &out_tx,
                        &ServerFrame::Error {
                            kind: "protocol".into(),
                            message: format!("Invalid frame: {e}"),
                        },
                    );
                }
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Axum answers transport pings automatically
            }
            Ok(Message::Close(_)) => {
                debug!(conn_id = %conn_id, "Client requested close");
                break;
            }
            Err(e) => {
                warn!(conn_id = %conn_id, %e, "WebSocket error");
                break;
            }
        }
    }

    session.close();
    forward_task.abort();
    send_task.abort();

    state.connections.write().await.remove(&conn_id);
    metrics::record_ws_disconnect();
    info!(conn_id = %conn_id, "Connection closed");
}

/// Map session events onto the wire protocol.
async fn forward_session_events(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    out_tx: mpsc::UnboundedSender<Message>,
) {
    let mut reply_started: Option<std::time::Instant> = None;
    while let Some(event) = events.recv().await {
        let frame = match event {
            SessionEvent::Ready { session_id } => ServerFrame::Ready {
                session_id,
                protocol: PROTOCOL_VERSION,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            SessionEvent::UserTranscript { text } => ServerFrame::Transcript { text },
            SessionEvent::ReplyDelta { delta } => {
                reply_started.get_or_insert_with(std::time::Instant::now);
                ServerFrame::ReplyDelta { delta }
            }
            SessionEvent::ReplyDone { text } => {
                if let Some(started) = reply_started.take() {
                    metrics::record_reply_duration(started.elapsed().as_secs_f64());
                }
                ServerFrame::ReplyDone { text }
            }
            SessionEvent::SpeakingStarted => ServerFrame::Speaking { active: true },
            SessionEvent::SpeakingStopped => ServerFrame::Speaking { active: false },
            SessionEvent::Interrupted => {
                metrics::record_interruption();
                reply_started = None;
                ServerFrame::Interrupted
            }
            SessionEvent::AudioOut { pcm } => {
                metrics::record_audio_out(pcm.len());
                if out_tx.send(Message::Binary(pcm.into())).is_err() {
                    break;
                }
                continue;
            }
            SessionEvent::Usage {
                input_tokens,
                output_tokens,
            } => ServerFrame::Usage {
                input_tokens,
                output_tokens,
            },
            SessionEvent::Error { kind, message } => {
                metrics::record_error(&kind);
                ServerFrame::Error { kind, message }
            }
        };
        if !send_frame(&out_tx, &frame) {
            break;
        }
    }
}

fn send_frame(out_tx: &mpsc::UnboundedSender<Message>, frame: &ServerFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => out_tx.send(Message::Text(json.into())).is_ok(),
        Err(e) => {
            warn!(%e, "Failed to serialize server frame");
            true
        }
    }
}

fn close_reason_label(reason: CloseReason) -> &'static str {
    match reason {
        CloseReason::Silence => "silence",
        CloseReason::MaxLength => "max_length",
        CloseReason::Flushed => "flushed",
    }
}
