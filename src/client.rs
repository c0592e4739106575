//! Streaming turn client.
//!
//! One HTTP exchange per turn. The response body is read chunk by chunk,
//! decoded incrementally and forwarded as [`TurnEvent`]s over an unbounded
//! channel in exactly the order the bytes arrived. Every way a turn can end
//! (completion, upstream error, transport fault, cancellation) is reported
//! as an event; nothing is returned as an error to the caller.

use std::fmt::Display;
use std::sync::Arc;

use reqwest::{header, Client, RequestBuilder, StatusCode};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::NarratorConfig;
use crate::error::Result;
use crate::prompt::{build_system_prompt, build_user_prompt};
use crate::providers::{
    AnthropicMessage, AnthropicRequest, OpenAIChatMessage, OpenAIChatRequest, Provider,
    ANTHROPIC_VERSION,
};
use crate::session::{Session, TurnRequest};
use crate::sse::{extract_delta, Extracted, SseDecoder, SseEvent};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// The narrator accepted the turn; a reply line should be opened.
    Started,
    Delta(String),
    Completed,
    Interrupted(Interruption),
}

/// How a turn ended early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interruption {
    /// Non-success status, empty body, or an error event inside the stream.
    Upstream(String),
    /// Connection, DNS or mid-body transport failure.
    Network(String),
    /// Cancelled by the player.
    Aborted,
}

impl Interruption {
    /// The transcript line that records this interruption.
    pub fn line_text(&self) -> String {
        match self {
            Interruption::Upstream(detail) => format!("(error) {}", detail),
            Interruption::Network(message) => format!("(network error) {}", message),
            Interruption::Aborted => "(stream aborted)".to_string(),
        }
    }
}

/// How the response body is cut into deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// `text/event-stream`: one delta per `data:` event.
    EventStream,
    /// A single JSON document read to the end, then interpreted once.
    Json,
    /// Anything else: every chunk of text is a delta.
    PlainText,
}

impl BodyFraming {
    /// A missing content type is assumed to be an event stream, which is
    /// what every supported provider sends for streamed replies.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(ct) = content_type.map(str::to_ascii_lowercase) else {
            return BodyFraming::EventStream;
        };
        if ct.contains("text/event-stream") {
            BodyFraming::EventStream
        } else if ct.contains("json") {
            BodyFraming::Json
        } else {
            BodyFraming::PlainText
        }
    }
}

// ---------------------------------------------------------------------------
// TurnClient
// ---------------------------------------------------------------------------

pub struct TurnClient {
    http: Client,
    config: NarratorConfig,
    api_key: Option<String>,
    model: String,
}

impl TurnClient {
    pub fn new(config: NarratorConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        let model = config.model();
        Ok(TurnClient { http, config, api_key, model })
    }

    pub fn config(&self) -> &NarratorConfig {
        &self.config
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one turn to its end, sending every event to `events`.
    ///
    /// `cancel` may fire at any point; the turn then ends with
    /// [`Interruption::Aborted`] and no further reads are made.
    pub async fn execute_turn(
        &self,
        request: &TurnRequest,
        cancel: CancellationToken,
        events: mpsc::UnboundedSender<TurnEvent>,
    ) {
        info!(
            provider = %self.config.provider,
            mode = %request.mode,
            history = request.recent_history.len(),
            "sending turn"
        );

        let send = self.build_request(request).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("turn cancelled before response");
                emit(&events, TurnEvent::Interrupted(Interruption::Aborted));
                return;
            }
            result = send => match result {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "narration request failed");
                    emit(&events, TurnEvent::Interrupted(Interruption::Network(e.to_string())));
                    return;
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    emit(&events, TurnEvent::Interrupted(Interruption::Aborted));
                    return;
                }
                body = response.text() => body.unwrap_or_default(),
            };
            let detail = upstream_detail(status, &body);
            warn!(%status, detail = %detail, "narrator returned an error");
            emit(&events, TurnEvent::Interrupted(Interruption::Upstream(detail)));
            return;
        }
        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            warn!(%status, "narrator returned no body");
            emit(
                &events,
                TurnEvent::Interrupted(Interruption::Upstream("empty response body".to_string())),
            );
            return;
        }

        let framing = BodyFraming::from_content_type(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        debug!(?framing, "narration stream opened");
        if !emit(&events, TurnEvent::Started) {
            return;
        }
        pump_body(response.bytes_stream(), framing, &cancel, &events).await;
    }

    /// Run `execute_turn` on its own task and hand back the event receiver
    /// and cancellation handle.
    pub fn spawn_turn(self: &Arc<Self>, request: TurnRequest) -> TurnHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let client = Arc::clone(self);
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            client.execute_turn(&request, token, tx).await;
        });
        TurnHandle { events: rx, cancel, join }
    }

    fn build_request(&self, request: &TurnRequest) -> RequestBuilder {
        let endpoint = self.config.endpoint();
        let builder = match self.config.provider {
            Provider::Relay => {
                let builder = self.http.post(endpoint).json(request);
                match &self.api_key {
                    Some(key) => builder.bearer_auth(key),
                    None => builder,
                }
            }
            Provider::Openai => {
                let body = OpenAIChatRequest {
                    model: self.model.clone(),
                    messages: vec![
                        OpenAIChatMessage {
                            role: "system".to_string(),
                            content: build_system_prompt(request),
                        },
                        OpenAIChatMessage {
                            role: "user".to_string(),
                            content: build_user_prompt(request),
                        },
                    ],
                    stream: true,
                    temperature: self.config.temperature,
                    max_tokens: self.config.max_tokens,
                };
                self.http
                    .post(endpoint)
                    .bearer_auth(self.api_key.as_deref().unwrap_or_default())
                    .json(&body)
            }
            Provider::Anthropic => {
                let body = AnthropicRequest {
                    model: self.model.clone(),
                    messages: vec![AnthropicMessage {
                        role: "user".to_string(),
                        content: build_user_prompt(request),
                    }],
                    max_tokens: self.config.max_tokens,
                    stream: true,
                    temperature: self.config.temperature,
                    system: Some(build_system_prompt(request)),
                };
                self.http
                    .post(endpoint)
                    .header("x-api-key", self.api_key.as_deref().unwrap_or_default())
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body)
            }
        };
        builder.header(header::ACCEPT, "text/event-stream")
    }
}

/// An in-flight turn started by [`TurnClient::spawn_turn`].
pub struct TurnHandle {
    pub events: mpsc::UnboundedReceiver<TurnEvent>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl TurnHandle {
    pub async fn next_event(&mut self) -> Option<TurnEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the spawned exchange to finish.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            warn!(error = %e, "turn task failed");
        }
    }
}

/// Drive one turn against `session` on the current task, applying each
/// event as soon as it arrives.
pub async fn run_turn(
    session: &mut Session,
    client: &TurnClient,
    request: &TurnRequest,
    cancel: CancellationToken,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let exchange = client.execute_turn(request, cancel, tx);
    let apply = async {
        while let Some(event) = rx.recv().await {
            session.apply_event(event);
        }
    };
    tokio::join!(exchange, apply);
}

// ---------------------------------------------------------------------------
// Body pump
// ---------------------------------------------------------------------------

enum Flow {
    Continue,
    Stop,
}

/// Read `body` to the end (or the `[DONE]` sentinel, or cancellation),
/// turning it into events. Between reads every event already decodable is
/// sent before the next read is awaited.
pub async fn pump_body<S, B, E>(
    mut body: S,
    framing: BodyFraming,
    cancel: &CancellationToken,
    events: &mpsc::UnboundedSender<TurnEvent>,
) where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut decoder = SseDecoder::new();
    let mut pending = Vec::new();
    let mut narrated = false;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("turn cancelled mid-stream");
                emit(events, TurnEvent::Interrupted(Interruption::Aborted));
                return;
            }
            next = body.next() => next,
        };

        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                warn!(error = %e, "narration stream broke");
                emit(events, TurnEvent::Interrupted(Interruption::Network(e.to_string())));
                return;
            }
            None => break,
        };

        match framing {
            BodyFraming::EventStream => {
                for event in decoder.feed(chunk.as_ref()) {
                    if let Flow::Stop = handle_sse_event(event, events, &mut narrated) {
                        return;
                    }
                }
            }
            BodyFraming::PlainText => {
                pending.extend_from_slice(chunk.as_ref());
                let text = take_complete_utf8(&mut pending);
                if !text.is_empty() {
                    narrated = true;
                    if !emit(events, TurnEvent::Delta(text)) {
                        return;
                    }
                }
            }
            BodyFraming::Json => pending.extend_from_slice(chunk.as_ref()),
        }
    }

    match framing {
        BodyFraming::EventStream => {
            for event in decoder.finish() {
                if let Flow::Stop = handle_sse_event(event, events, &mut narrated) {
                    return;
                }
            }
        }
        BodyFraming::PlainText => {
            if !pending.is_empty() {
                narrated = true;
                emit(events, TurnEvent::Delta(String::from_utf8_lossy(&pending).into_owned()));
            }
        }
        BodyFraming::Json => {
            let payload = String::from_utf8_lossy(&pending);
            if let Flow::Stop = handle_payload(&payload, events, &mut narrated) {
                return;
            }
        }
    }
    debug!("narration stream ended");
    finish_reply(events, narrated);
}

/// Close a reply that reached its end. A body that carried no narration at
/// all counts as a missing body.
fn finish_reply(events: &mpsc::UnboundedSender<TurnEvent>, narrated: bool) {
    if narrated {
        emit(events, TurnEvent::Completed);
    } else {
        warn!("narration stream ended without any text");
        emit(
            events,
            TurnEvent::Interrupted(Interruption::Upstream("empty response body".to_string())),
        );
    }
}

fn handle_sse_event(
    event: SseEvent,
    events: &mpsc::UnboundedSender<TurnEvent>,
    narrated: &mut bool,
) -> Flow {
    match event {
        SseEvent::Done => {
            debug!("received [DONE]");
            finish_reply(events, *narrated);
            Flow::Stop
        }
        SseEvent::Data(payload) => handle_payload(&payload, events, narrated),
    }
}

fn handle_payload(
    payload: &str,
    events: &mpsc::UnboundedSender<TurnEvent>,
    narrated: &mut bool,
) -> Flow {
    match extract_delta(payload) {
        Extracted::Text(text) if text.is_empty() => Flow::Continue,
        Extracted::Text(text) => {
            *narrated = true;
            if emit(events, TurnEvent::Delta(text)) {
                Flow::Continue
            } else {
                Flow::Stop
            }
        }
        Extracted::Nothing => Flow::Continue,
        Extracted::Error(message) => {
            warn!(%message, "narrator reported an error mid-stream");
            emit(events, TurnEvent::Interrupted(Interruption::Upstream(message)));
            Flow::Stop
        }
    }
}

/// Send an event; false once nobody is listening any more.
fn emit(events: &mpsc::UnboundedSender<TurnEvent>, event: TurnEvent) -> bool {
    events.send(event).is_ok()
}

/// Decode the longest valid UTF-8 prefix of `buf`, keeping an incomplete
/// trailing character for the next read. Invalid bytes are replaced.
fn take_complete_utf8(buf: &mut Vec<u8>) -> String {
    let keep = match std::str::from_utf8(&buf[..]) {
        Ok(_) => 0,
        Err(e) if e.error_len().is_none() => buf.len() - e.valid_up_to(),
        Err(_) => 0,
    };
    let tail = buf.split_off(buf.len() - keep);
    let text = String::from_utf8_lossy(&buf[..]).into_owned();
    *buf = tail;
    text
}

fn upstream_detail(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status.to_string();
    }
    match extract_delta(body) {
        Extracted::Error(message) => message,
        _ => body.to_string(),
    }
}
