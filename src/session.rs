//! Turn-based narrative session state.
//!
//! A [`Session`] owns the transcript, the active input mode and the
//! undo/redo snapshots. Every method here is synchronous and performs no
//! I/O; the network half of a turn lives in [`crate::client`], which feeds
//! its [`TurnEvent`]s back through [`Session::apply_event`].
//!
//! ## Lifecycle of a turn
//! ```text
//! Idle --submit_turn--> AwaitingReply --begin_streaming_reply--> Streaming
//! Streaming --append_to_active_reply*--> Streaming --end_streaming_reply--> Idle
//! AwaitingReply | Streaming --interrupt_turn--> Idle
//! ```
//!
//! ## History
//! While the session is idle the top of the history stack is always equal to
//! the transcript. Committing actions (a finished or interrupted turn, an
//! erase) push the resulting transcript; undo walks back one committed
//! snapshot, so a single undo removes a whole turn (player line and reply).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::client::TurnEvent;
use crate::modes::Mode;

/// Narrator line used when a session is seeded with nothing at all.
pub const FALLBACK_OPENING: &str = "A new tale begins.";

/// Number of trailing transcript lines sent with each turn request.
pub const DEFAULT_HISTORY_WINDOW: usize = 8;

// ---------------------------------------------------------------------------
// Transcript types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Narrator,
}

/// One entry of the story log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub text: String,
    pub speaker: Speaker,
}

impl Line {
    pub fn user(text: impl Into<String>) -> Self {
        Line { text: text.into(), speaker: Speaker::User }
    }

    pub fn narrator(text: impl Into<String>) -> Self {
        Line { text: text.into(), speaker: Speaker::Narrator }
    }
}

pub type Transcript = Vec<Line>;

/// World and character fields sent with every turn to keep the narrator on
/// the chosen premise. All fields are passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthoringContext {
    pub world_title: String,
    pub world_summary: String,
    pub opening_scene: String,
    pub character_name: String,
    pub character_class: String,
    pub character_background: String,
    pub ai_instructions: String,
    pub authors_note: String,
}

impl AuthoringContext {
    /// Narrator lines for the title, summary and opening scene, skipping the
    /// empty ones.
    pub fn seed_lines(&self) -> Vec<Line> {
        [&self.world_title, &self.world_summary, &self.opening_scene]
            .into_iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(Line::narrator)
            .collect()
    }
}

/// Everything the turn client needs to send one turn upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub mode: Mode,
    /// Framed player line; empty for `ContinueTurn`.
    pub message: String,
    #[serde(flatten)]
    pub context: AuthoringContext,
    pub recent_history: Vec<String>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why an action was not applied. These are validation results for the UI,
/// not faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("turn not submitted: input is empty")]
    EmptyInput,
    #[error("a turn is still in flight")]
    TurnInFlight,
    #[error("{0} is a one-shot action and cannot be the active mode")]
    OneShotMode(Mode),
}

/// Result of an accepted [`Session::submit_turn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    /// A turn is pending; hand the request to the turn client.
    Turn(TurnRequest),
    /// The erase action ran locally. `removed` is false when there was
    /// nothing to erase.
    Erased { removed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingReply,
    Streaming,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    transcript: Transcript,
    mode: Mode,
    context: AuthoringContext,
    phase: Phase,
    /// Index of the narrator line receiving deltas, while streaming.
    active_reply: Option<usize>,
    history: Vec<Transcript>,
    redo: Vec<Transcript>,
    history_window: usize,
}

impl Session {
    /// Start a session from explicit seed lines. An empty seed becomes the
    /// single fallback narrator line.
    pub fn initialize(seed_lines: Vec<Line>, context: AuthoringContext) -> Self {
        let transcript = if seed_lines.is_empty() {
            vec![Line::narrator(FALLBACK_OPENING)]
        } else {
            seed_lines
        };
        let id = Uuid::new_v4();
        debug!(session = %id, lines = transcript.len(), "session initialized");
        Session {
            id,
            history: vec![transcript.clone()],
            transcript,
            mode: Mode::default(),
            context,
            phase: Phase::Idle,
            active_reply: None,
            redo: Vec::new(),
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    /// Start a session seeded from the context's title, summary and opening.
    pub fn from_context(context: AuthoringContext) -> Self {
        Session::initialize(context.seed_lines(), context)
    }

    pub fn with_history_window(mut self, lines: usize) -> Self {
        self.history_window = lines.max(1);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn transcript(&self) -> &[Line] {
        &self.transcript
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn context(&self) -> &AuthoringContext {
        &self.context
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == Phase::Streaming
    }

    /// True from submission until the turn finishes; front ends disable
    /// their controls while this holds.
    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn can_undo(&self) -> bool {
        !self.is_busy() && self.history.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.is_busy() && !self.redo.is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), Rejection> {
        self.ensure_idle()?;
        if mode.is_one_shot() {
            return Err(Rejection::OneShotMode(mode));
        }
        self.mode = mode;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Player actions
    // -----------------------------------------------------------------------

    pub fn submit_turn(&mut self, mode: Mode, raw_input: &str) -> Result<Submitted, Rejection> {
        self.ensure_idle()?;

        if mode == Mode::Erase {
            let removed = self.erase_last_turn()?;
            return Ok(Submitted::Erased { removed });
        }
        if mode.requires_input() && raw_input.trim().is_empty() {
            return Err(Rejection::EmptyInput);
        }

        let message = match mode.frame(raw_input) {
            Some(text) => {
                self.transcript.push(Line::user(text.clone()));
                text
            }
            None => String::new(),
        };
        // The pre-call transcript is already the top of history.
        self.redo.clear();
        self.phase = Phase::AwaitingReply;
        debug!(session = %self.id, %mode, "turn submitted");

        Ok(Submitted::Turn(self.turn_request(mode, message)))
    }

    /// Remove the most recent narrator line and the most recent player line.
    /// Returns whether anything was removed.
    pub fn erase_last_turn(&mut self) -> Result<bool, Rejection> {
        self.ensure_idle()?;

        let narrator = self.last_index_of(Speaker::Narrator);
        let user = self.last_index_of(Speaker::User);
        if narrator.is_none() && user.is_none() {
            return Ok(false);
        }

        // Remove the higher index first so the lower one stays valid.
        let mut indices: Vec<usize> = narrator.into_iter().chain(user).collect();
        indices.sort_unstable_by(|a, b| b.cmp(a));
        for i in indices {
            self.transcript.remove(i);
        }
        self.commit();
        debug!(session = %self.id, lines = self.transcript.len(), "last turn erased");
        Ok(true)
    }

    pub fn undo(&mut self) -> Result<bool, Rejection> {
        self.ensure_idle()?;
        if self.history.len() <= 1 {
            return Ok(false);
        }
        if let Some(top) = self.history.pop() {
            self.redo.push(top);
        }
        if let Some(previous) = self.history.last() {
            self.transcript = previous.clone();
        }
        Ok(true)
    }

    pub fn redo(&mut self) -> Result<bool, Rejection> {
        self.ensure_idle()?;
        let Some(snapshot) = self.redo.pop() else {
            return Ok(false);
        };
        self.transcript = snapshot.clone();
        self.history.push(snapshot);
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Streaming reply
    // -----------------------------------------------------------------------

    pub fn begin_streaming_reply(&mut self) {
        self.phase = Phase::Streaming;
        let reuse_trailing = matches!(
            self.transcript.last(),
            Some(line) if line.speaker == Speaker::Narrator && line.text.is_empty()
        );
        if !reuse_trailing {
            self.transcript.push(Line::narrator(""));
        }
        self.active_reply = Some(self.transcript.len() - 1);
    }

    /// Append a delta to the reply being streamed. Callers must only do this
    /// between `begin_streaming_reply` and `end_streaming_reply`; with no
    /// active reply a fresh narrator line is started.
    pub fn append_to_active_reply(&mut self, delta: &str) {
        match self.active_reply.and_then(|i| self.transcript.get_mut(i)) {
            Some(line) => line.text.push_str(delta),
            None => {
                self.transcript.push(Line::narrator(delta));
                self.active_reply = Some(self.transcript.len() - 1);
            }
        }
    }

    /// Finish the reply. A reply line that never received text is dropped
    /// rather than committed.
    pub fn end_streaming_reply(&mut self) {
        self.drop_empty_reply();
        self.phase = Phase::Idle;
        self.commit();
        debug!(session = %self.id, lines = self.transcript.len(), "reply finished");
    }

    /// End the in-flight turn with a synthetic narrator line (error or
    /// cancellation notice). Text already streamed stays in place; a reply
    /// line that never received text is dropped.
    pub fn interrupt_turn(&mut self, notice: &str) {
        self.drop_empty_reply();
        self.transcript.push(Line::narrator(notice));
        self.phase = Phase::Idle;
        self.commit();
        debug!(session = %self.id, notice, "turn interrupted");
    }

    /// Apply one event from the turn client.
    pub fn apply_event(&mut self, event: TurnEvent) {
        match event {
            TurnEvent::Started => self.begin_streaming_reply(),
            TurnEvent::Delta(text) => self.append_to_active_reply(&text),
            TurnEvent::Completed => self.end_streaming_reply(),
            TurnEvent::Interrupted(reason) => self.interrupt_turn(&reason.line_text()),
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn ensure_idle(&self) -> Result<(), Rejection> {
        if self.is_busy() {
            Err(Rejection::TurnInFlight)
        } else {
            Ok(())
        }
    }

    fn drop_empty_reply(&mut self) {
        if let Some(i) = self.active_reply.take() {
            if self.transcript.get(i).is_some_and(|line| line.text.is_empty()) {
                self.transcript.remove(i);
            }
        }
    }

    fn commit(&mut self) {
        self.history.push(self.transcript.clone());
        self.redo.clear();
    }

    fn last_index_of(&self, speaker: Speaker) -> Option<usize> {
        self.transcript.iter().rposition(|line| line.speaker == speaker)
    }

    fn turn_request(&self, mode: Mode, message: String) -> TurnRequest {
        let skip = self.transcript.len().saturating_sub(self.history_window);
        TurnRequest {
            mode,
            message,
            context: self.context.clone(),
            recent_history: self.transcript[skip..].iter().map(|l| l.text.clone()).collect(),
        }
    }
}
