use serde::{Deserialize, Serialize};

use crate::error::FableError;

/// How a player's input is framed before it is sent to the narrator.
///
/// `ContinueTurn` and `Erase` are one-shot actions: they can be submitted but
/// never become the session's active mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    #[default]
    Act,
    Speak,
    Think,
    Narrate,
    ContinueTurn,
    Erase,
}

impl Mode {
    /// Sticky modes in the order a front end should offer them.
    pub const STICKY: [Mode; 4] = [Mode::Act, Mode::Speak, Mode::Think, Mode::Narrate];

    /// Accepts both the player-facing verbs (`do`, `say`, `story`) and the
    /// wire names.
    pub fn from_str_loose(s: &str) -> Result<Self, FableError> {
        match s.trim().to_lowercase().as_str() {
            "do" | "act" => Ok(Mode::Act),
            "say" | "speak" => Ok(Mode::Speak),
            "think" => Ok(Mode::Think),
            "story" | "narrate" => Ok(Mode::Narrate),
            "continue" | "continueturn" | "continue-turn" => Ok(Mode::ContinueTurn),
            "erase" => Ok(Mode::Erase),
            _ => Err(FableError::UnknownMode(s.to_string())),
        }
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            Mode::Act => "act",
            Mode::Speak => "speak",
            Mode::Think => "think",
            Mode::Narrate => "narrate",
            Mode::ContinueTurn => "continueTurn",
            Mode::Erase => "erase",
        }
    }

    /// Verb shown to the player for this mode.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Act => "do",
            Mode::Speak => "say",
            Mode::Think => "think",
            Mode::Narrate => "story",
            Mode::ContinueTurn => "continue",
            Mode::Erase => "erase",
        }
    }

    pub fn requires_input(self) -> bool {
        !matches!(self, Mode::ContinueTurn | Mode::Erase)
    }

    pub fn is_one_shot(self) -> bool {
        matches!(self, Mode::ContinueTurn | Mode::Erase)
    }

    /// Frame raw player input as the transcript line for this mode.
    ///
    /// Returns `None` for the one-shot modes, which never produce a player
    /// line.
    pub fn frame(self, input: &str) -> Option<String> {
        let input = input.trim();
        match self {
            Mode::Act => Some(format!("You attempt: {}", input)),
            Mode::Speak => Some(format!("You say, \"{}\"", input)),
            Mode::Think => Some(format!("You think to yourself: {}", input)),
            Mode::Narrate => Some(input.to_string()),
            Mode::ContinueTurn | Mode::Erase => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

impl std::str::FromStr for Mode {
    type Err = FableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::from_str_loose(s)
    }
}
