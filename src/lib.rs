//! # fable-stream
//!
//! Turn-based interactive fiction against a streaming LLM narrator.
//!
//! - [`session`]: the synchronous session state machine (transcript, mode,
//!   undo/redo, streaming reply target).
//! - [`client`]: the streaming turn client that sends one request per turn
//!   and turns the response body into ordered [`client::TurnEvent`]s.
//! - [`sse`]: the incremental event-stream decoder and delta extraction.
//!
//! ```rust,ignore
//! let client = TurnClient::new(NarratorConfig::default())?;
//! let mut session = find_scenario("lighthouse")?.start();
//! if let Submitted::Turn(request) = session.submit_turn(Mode::Act, "light the lamp")? {
//!     run_turn(&mut session, &client, &request, CancellationToken::new()).await;
//! }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod modes;
pub mod prompt;
pub mod providers;
pub mod scenario;
pub mod session;
pub mod sse;

pub use client::{run_turn, Interruption, TurnClient, TurnEvent, TurnHandle};
pub use config::NarratorConfig;
pub use error::{FableError, Result};
pub use modes::Mode;
pub use session::{
    AuthoringContext, Line, Phase, Rejection, Session, Speaker, Submitted, TurnRequest,
};
