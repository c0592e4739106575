use crate::config::NarratorConfig;
use crate::modes::Mode;
use crate::providers::Provider;
use crate::session::AuthoringContext;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "fable-stream")]
#[command(version)]
#[command(about = "Play turn-based interactive fiction against a streaming LLM narrator")]
pub struct Args {
    /// TOML file with narrator settings
    #[arg(long, short)]
    pub config: Option<String>,

    /// Narrator backend: relay, openai or anthropic
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    /// Model name (defaults per provider)
    #[arg(long)]
    pub model: Option<String>,

    /// Override the provider endpoint URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Number of trailing story lines sent with each turn
    #[arg(long)]
    pub history_window: Option<usize>,

    /// Start a built-in scenario by id ("random" picks one)
    #[arg(long, short)]
    pub scenario: Option<String>,

    /// List the built-in scenarios and exit
    #[arg(long)]
    pub list_scenarios: bool,

    /// Custom setup: world title
    #[arg(long)]
    pub title: Option<String>,

    /// Custom setup: world summary
    #[arg(long)]
    pub summary: Option<String>,

    /// Custom setup: opening scene
    #[arg(long)]
    pub opening: Option<String>,

    /// Custom setup: character name
    #[arg(long)]
    pub character_name: Option<String>,

    /// Custom setup: character class
    #[arg(long)]
    pub character_class: Option<String>,

    /// Custom setup: character background
    #[arg(long)]
    pub character_background: Option<String>,

    /// Extra instructions for the narrator
    #[arg(long)]
    pub instructions: Option<String>,

    /// Author's note sent with every turn
    #[arg(long)]
    pub authors_note: Option<String>,
}

impl Args {
    /// Command-line flags win over the config file.
    pub fn apply_to(&self, config: &mut NarratorConfig) {
        if let Some(provider) = self.provider {
            config.provider = provider;
        }
        if let Some(model) = &self.model {
            config.model = Some(model.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = Some(endpoint.clone());
        }
        if let Some(window) = self.history_window {
            config.history_window = window;
        }
    }

    /// Authoring context from the custom-setup flags, or `None` when none
    /// were given.
    pub fn custom_context(&self) -> Option<AuthoringContext> {
        let field = |v: &Option<String>| v.clone().unwrap_or_default();
        let ctx = AuthoringContext {
            world_title: field(&self.title),
            world_summary: field(&self.summary),
            opening_scene: field(&self.opening),
            character_name: field(&self.character_name),
            character_class: field(&self.character_class),
            character_background: field(&self.character_background),
            ai_instructions: field(&self.instructions),
            authors_note: field(&self.authors_note),
        };
        if ctx == AuthoringContext::default() {
            None
        } else {
            Some(ctx)
        }
    }
}

// ---------------------------------------------------------------------------
// In-game commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit(Mode, String),
    SetMode(Mode),
    Undo,
    Redo,
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "\
Type to act in the current mode, or use a command:
  /do <text>  /say <text>  /think <text>  /story <text>
  /do /say /think /story   switch the active mode
  /continue   let the narrator go on
  /erase      remove the last exchange
  /undo /redo step through history
  /show       reprint the story
  /quit       leave the session
Ctrl-C while the narrator is writing cancels the reply.";

/// Parse one line of player input. Plain text is a submission in the active
/// mode.
pub fn parse_command(line: &str, active: Mode) -> Result<Command, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Submit(active, line.to_string()));
    };
    let (verb, arg) = match rest.split_once(char::is_whitespace) {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (rest, ""),
    };

    match verb.to_lowercase().as_str() {
        "undo" => Ok(Command::Undo),
        "redo" => Ok(Command::Redo),
        "show" => Ok(Command::Show),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "mode" => Mode::from_str_loose(arg)
            .map(Command::SetMode)
            .map_err(|e| e.to_string()),
        other => {
            let mode = Mode::from_str_loose(other).map_err(|_| format!("Unknown command: /{}", other))?;
            if mode.is_one_shot() || !arg.is_empty() {
                Ok(Command::Submit(mode, arg.to_string()))
            } else {
                Ok(Command::SetMode(mode))
            }
        }
    }
}
