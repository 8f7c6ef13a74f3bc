//! Session task — turn handling, reply generation, barge-in cancellation.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use voxflow_audio::TurnEvent;
use voxflow_core::config::Config;
use voxflow_core::session::{SessionMeta, Transcript, TranscriptEntry, Usage};
use voxflow_core::types::Turn;
use voxflow_llm::{ChatMessage, ChatRequest, LlmProvider};
use voxflow_stt::SttClient;
use voxflow_tts::{SentenceChunker, TtsEngine};

use crate::SessionEvent;

/// Inputs accepted by the session task.
enum SessionInput {
    Turn(TurnEvent),
    GenerateReply { instructions: String },
}

/// Handle for feeding and controlling a running session.
pub struct SessionHandle {
    pub id: String,
    input_tx: mpsc::UnboundedSender<SessionInput>,
    cancel: CancellationToken,
    transcript: Arc<Mutex<Transcript>>,
}

impl SessionHandle {
    /// Feed a turn event from the audio front-end.
    pub fn push_turn_event(&self, event: TurnEvent) -> bool {
        self.input_tx.send(SessionInput::Turn(event)).is_ok()
    }

    /// Request one reply generation with extra instructions.
    pub fn generate_reply(&self, instructions: impl Into<String>) -> bool {
        self.input_tx
            .send(SessionInput::GenerateReply {
                instructions: instructions.into(),
            })
            .is_ok()
    }

    /// Stop the session and everything it has in flight.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Clone of the transcript so far.
    pub async fn transcript_snapshot(&self) -> Vec<TranscriptEntry> {
        self.transcript.lock().await.entries().to_vec()
    }
}

/// One conversation wired to four service clients.
pub struct DialogueSession {
    config: Arc<Config>,
    stt: Arc<dyn SttClient>,
    llm: Arc<dyn LlmProvider>,
    tts: Arc<dyn TtsEngine>,
    meta: SessionMeta,
    transcript: Arc<Mutex<Transcript>>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
    active: Option<ActiveGeneration>,
}

struct ActiveGeneration {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl DialogueSession {
    /// Start the session task: emits `Ready`, issues the greeting once, then
    /// processes turn events until cancelled or the input channel closes.
    pub fn start(
        config: Arc<Config>,
        stt: Arc<dyn SttClient>,
        llm: Arc<dyn LlmProvider>,
        tts: Arc<dyn TtsEngine>,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let meta = SessionMeta::new();
        let transcript = Arc::new(Mutex::new(Transcript::new()));

        let handle = SessionHandle {
            id: meta.id.clone(),
            input_tx,
            cancel: cancel.clone(),
            transcript: transcript.clone(),
        };

        let session = Self {
            config,
            stt,
            llm,
            tts,
            meta,
            transcript,
            event_tx,
            cancel,
            active: None,
        };

        tokio::spawn(session.run(input_rx));

        (handle, event_rx)
    }

    async fn run(mut self, mut input_rx: mpsc::UnboundedReceiver<SessionInput>) {
        info!(session_id = %self.meta.id, "Session started");
        let _ = self.event_tx.send(SessionEvent::Ready {
            session_id: self.meta.id.clone(),
        });

        // Greet the user once, before any turn arrives.
        self.spawn_generation(Some(self.config.greeting()));

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                input = input_rx.recv() => match input {
                    Some(SessionInput::Turn(TurnEvent::Started)) => {
                        self.interrupt_active().await;
                    }
                    Some(SessionInput::Turn(TurnEvent::Ended(turn))) => {
                        self.handle_turn(turn).await;
                    }
                    Some(SessionInput::GenerateReply { instructions }) => {
                        self.interrupt_active().await;
                        self.spawn_generation(Some(instructions));
                    }
                    None => break,
                }
            }
        }

        self.interrupt_active().await;
        info!(session_id = %self.meta.id, "Session ended");
    }

    /// Cancel and reap the in-flight generation, if any.
    async fn interrupt_active(&mut self) {
        if let Some(active) = self.active.take() {
            if !active.handle.is_finished() {
                debug!(session_id = %self.meta.id, "Cancelling in-flight generation");
                active.cancel.cancel();
                let _ = self.event_tx.send(SessionEvent::Interrupted);
            }
            let _ = active.handle.await;
        }
    }

    async fn handle_turn(&mut self, turn: Turn) {
        let min_turn_ms = self.config.pipeline().min_turn_ms;
        if turn.duration_ms < min_turn_ms {
            debug!(duration_ms = turn.duration_ms, "Turn too short, skipping");
            return;
        }

        let text = match self.stt.transcribe(&turn.pcm).await {
            Ok(text) => text,
            Err(e) => {
                warn!(%e, "Transcription failed");
                let _ = self.event_tx.send(SessionEvent::Error {
                    kind: "stt".into(),
                    message: e.to_string(),
                });
                return;
            }
        };

        if text.is_empty() {
            debug!("Empty transcript, skipping turn");
            return;
        }

        info!(session_id = %self.meta.id, %text, "User turn transcribed");
        self.transcript.lock().await.append(TranscriptEntry::User {
            text: text.clone(),
            timestamp: Utc::now(),
        });
        let _ = self.event_tx.send(SessionEvent::UserTranscript { text });

        // One generation in flight at a time.
        self.interrupt_active().await;
        self.spawn_generation(None);
    }

    fn spawn_generation(&mut self, extra_instructions: Option<String>) {
        let gen_cancel = self.cancel.child_token();
        let handle = tokio::spawn(run_generation(
            self.config.clone(),
            self.llm.clone(),
            self.tts.clone(),
            self.transcript.clone(),
            self.event_tx.clone(),
            gen_cancel.clone(),
            extra_instructions,
        ));
        self.active = Some(ActiveGeneration {
            handle,
            cancel: gen_cancel,
        });
    }
}

fn build_request(
    config: &Config,
    transcript: &Transcript,
    extra_instructions: Option<&str>,
) -> ChatRequest {
    let mut messages: Vec<ChatMessage> = transcript
        .entries()
        .iter()
        .filter_map(|e| match e {
            TranscriptEntry::User { text, .. } => Some(ChatMessage::user(text.clone())),
            TranscriptEntry::Assistant { text, .. } if !text.is_empty() => {
                Some(ChatMessage::assistant(text.clone()))
            }
            _ => None,
        })
        .collect();

    if let Some(extra) = extra_instructions {
        messages.push(ChatMessage::system(extra));
    }

    ChatRequest {
        model: config.llm_model(),
        system: Some(config.instructions()),
        messages,
        max_tokens: config.max_tokens(),
        temperature: config.temperature(),
    }
}

/// One reply generation: LLM stream -> sentence chunker -> TTS -> audio out.
async fn run_generation(
    config: Arc<Config>,
    llm: Arc<dyn LlmProvider>,
    tts: Arc<dyn TtsEngine>,
    transcript: Arc<Mutex<Transcript>>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
    extra_instructions: Option<String>,
) {
    let request = {
        let t = transcript.lock().await;
        build_request(&config, &t, extra_instructions.as_deref())
    };

    let stream = match llm.stream(&request).await {
        Ok(s) => s,
        Err(e) => {
            warn!(%e, "LLM stream error");
            let _ = event_tx.send(SessionEvent::Error {
                kind: "llm".into(),
                message: e.to_string(),
            });
            return;
        }
    };

    let (sentence_tx, sentence_rx) = mpsc::unbounded_channel::<String>();
    let synth = tokio::spawn(synthesis_task(
        tts,
        sentence_rx,
        event_tx.clone(),
        cancel.clone(),
    ));

    let mut stream = stream;
    let mut chunker = SentenceChunker::new();
    let mut reply = String::new();
    let mut usage: Option<Usage> = None;
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                interrupted = true;
                break;
            }
            item = stream.next() => match item {
                Some(Ok(chunk)) => {
                    if let Some(delta) = chunk.delta {
                        reply.push_str(&delta);
                        let _ = event_tx.send(SessionEvent::ReplyDelta {
                            delta: delta.clone(),
                        });
                        for sentence in chunker.push(&delta) {
                            let _ = sentence_tx.send(sentence);
                        }
                    }
                    if let Some(u) = chunk.usage {
                        usage = Some(Usage {
                            input_tokens: u.input_tokens.unwrap_or(0),
                            output_tokens: u.output_tokens.unwrap_or(0),
                        });
                    }
                }
                Some(Err(e)) => {
                    warn!(%e, "LLM chunk error");
                    let _ = event_tx.send(SessionEvent::Error {
                        kind: "llm".into(),
                        message: e.to_string(),
                    });
                    break;
                }
                None => break,
            }
        }
    }

    if !interrupted {
        if let Some(tail) = chunker.finish() {
            let _ = sentence_tx.send(tail);
        }
    }
    // Closing the sentence channel lets the synthesizer drain and exit.
    drop(sentence_tx);
    let _ = synth.await;

    if let Some(ref u) = usage {
        let _ = event_tx.send(SessionEvent::Usage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        });
    }

    {
        let mut t = transcript.lock().await;
        if !reply.is_empty() {
            t.append(TranscriptEntry::Assistant {
                text: reply.clone(),
                usage,
                timestamp: Utc::now(),
            });
        }
        if interrupted {
            // Keep the partial on record so the model knows what was said.
            t.append(TranscriptEntry::System {
                event: "interrupted".into(),
                data: json!({ "partial": !reply.is_empty() }),
                timestamp: Utc::now(),
            });
        }
    }

    if !interrupted {
        let _ = event_tx.send(SessionEvent::ReplyDone { text: reply });
    }
}

/// Consumes sentences in order and streams each one through TTS.
async fn synthesis_task(
    tts: Arc<dyn TtsEngine>,
    mut sentence_rx: mpsc::UnboundedReceiver<String>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
) {
    let mut speaking = false;
    loop {
        let sentence = tokio::select! {
            _ = cancel.cancelled() => break,
            s = sentence_rx.recv() => match s {
                Some(s) => s,
                None => break,
            },
        };

        if !speaking {
            speaking = true;
            let _ = event_tx.send(SessionEvent::SpeakingStarted);
        }

        if let Err(e) = speak_sentence(tts.as_ref(), &sentence, &event_tx, &cancel).await {
            warn!(%e, "TTS error");
            let _ = event_tx.send(SessionEvent::Error {
                kind: "tts".into(),
                message: e.to_string(),
            });
            break;
        }
    }

    if speaking {
        let _ = event_tx.send(SessionEvent::SpeakingStopped);
    }
}

async fn speak_sentence(
    tts: &dyn TtsEngine,
    sentence: &str,
    event_tx: &mpsc::UnboundedSender<SessionEvent>,
    cancel: &CancellationToken,
) -> voxflow_core::error::Result<()> {
    let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let synth = tts.stream(sentence, chunk_tx);
    tokio::pin!(synth);

    let mut synth_done = false;
    let mut synth_result = Ok(());
    loop {
        tokio::select! {
            // Dropping chunk_rx on cancel makes the engine stop as well.
            _ = cancel.cancelled() => return Ok(()),
            res = &mut synth, if !synth_done => {
                synth_done = true;
                synth_result = res;
            }
            chunk = chunk_rx.recv() => match chunk {
                Some(pcm) => {
                    let _ = event_tx.send(SessionEvent::AudioOut { pcm });
                }
                None => break,
            }
        }
    }
    synth_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxflow_core::config::SessionConfig;

    fn config_with_instructions(instructions: &str) -> Config {
        Config {
            session: Some(SessionConfig {
                instructions: Some(instructions.into()),
                greeting: None,
                max_tokens: None,
                temperature: None,
            }),
            ..Config::default()
        }
    }

    #[test]
    fn test_build_request_skips_system_entries() {
        let config = config_with_instructions("Be brief.");
        let mut transcript = Transcript::new();
        transcript.append(TranscriptEntry::User {
            text: "hi".into(),
            timestamp: Utc::now(),
        });
        transcript.append(TranscriptEntry::System {
            event: "interrupted".into(),
            data: json!({}),
            timestamp: Utc::now(),
        });
        transcript.append(TranscriptEntry::Assistant {
            text: "hello".into(),
            usage: None,
            timestamp: Utc::now(),
        });

        let request = build_request(&config, &transcript, None);
        assert_eq!(request.system.as_deref(), Some("Be brief."));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "user");
        assert_eq!(request.messages[1].role, "assistant");
    }

    #[test]
    fn test_build_request_appends_extra_instructions() {
        let config = Config::default();
        let transcript = Transcript::new();
        let request = build_request(&config, &transcript, Some("Greet casually."));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[0].content, "Greet casually.");
    }

    #[test]
    fn test_build_request_uses_config_model() {
        let config = Config::default();
        let request = build_request(&config, &Transcript::new(), None);
        assert_eq!(request.model, "llama-3.3-70b-versatile");
        assert_eq!(request.max_tokens, 1024);
    }
}
