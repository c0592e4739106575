use std::sync::Arc;

use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use fable_stream::cli::{parse_command, Args, Command, HELP};
use fable_stream::client::{TurnClient, TurnEvent};
use fable_stream::config::NarratorConfig;
use fable_stream::scenario::{builtin_scenarios, find_scenario, random_scenario};
use fable_stream::session::{Line, Session, Speaker, Submitted};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.list_scenarios {
        for s in builtin_scenarios() {
            println!("{:<12} {}", s.id.bright_yellow(), s.title.bright_white());
            println!("{:<12} {}", "", s.summary);
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => NarratorConfig::load(path)?,
        None => NarratorConfig::default(),
    };
    args.apply_to(&mut config);
    let history_window = config.history_window;

    let client = Arc::new(TurnClient::new(config)?);

    let session = match (&args.scenario, args.custom_context()) {
        (Some(id), _) if id.eq_ignore_ascii_case("random") => random_scenario().start(),
        (Some(id), _) => find_scenario(id)?.start(),
        (None, Some(ctx)) => Session::from_context(ctx),
        (None, None) => random_scenario().start(),
    };
    let mut session = session.with_history_window(history_window);

    println!("{}", "FABLE STREAM".bright_cyan().bold());
    println!(
        "{}: {}  {}: {}",
        "Narrator".bright_yellow(),
        client.config().provider,
        "Model".bright_yellow(),
        client.model()
    );
    println!("{}", "=".repeat(50).bright_blue());
    print_transcript(&session);

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_prompt(&session);
        let Some(line) = input.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line, session.mode()) {
            Ok(command) => command,
            Err(msg) => {
                println!("{}", msg.bright_red());
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => println!("{}", HELP),
            Command::Show => print_transcript(&session),
            Command::SetMode(mode) => {
                if let Err(rejection) = session.set_mode(mode) {
                    println!("{}", rejection.to_string().bright_red());
                }
            }
            Command::Undo => match session.undo() {
                Ok(true) => print_transcript(&session),
                Ok(false) => println!("{}", "Nothing to undo.".dimmed()),
                Err(rejection) => println!("{}", rejection.to_string().bright_red()),
            },
            Command::Redo => match session.redo() {
                Ok(true) => print_transcript(&session),
                Ok(false) => println!("{}", "Nothing to redo.".dimmed()),
                Err(rejection) => println!("{}", rejection.to_string().bright_red()),
            },
            Command::Submit(mode, text) => match session.submit_turn(mode, &text) {
                Ok(Submitted::Turn(request)) => {
                    play_reply(&mut session, &client, request).await;
                }
                Ok(Submitted::Erased { removed: true }) => print_transcript(&session),
                Ok(Submitted::Erased { removed: false }) => {
                    println!("{}", "Nothing to erase.".dimmed())
                }
                Err(rejection) => println!("{}", rejection.to_string().bright_red()),
            },
        }
    }

    Ok(())
}

/// Stream one reply into the session, echoing deltas as they land. Ctrl-C
/// cancels the reply instead of quitting.
async fn play_reply(
    session: &mut Session,
    client: &Arc<TurnClient>,
    request: fable_stream::session::TurnRequest,
) {
    let mut handle = client.spawn_turn(request);
    loop {
        let event = tokio::select! {
            event = handle.next_event() => event,
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                continue;
            }
        };
        let Some(event) = event else { break };

        match &event {
            TurnEvent::Started => println!(),
            TurnEvent::Delta(text) => {
                print!("{}", text);
                let _ = std::io::Write::flush(&mut std::io::stdout());
            }
            TurnEvent::Completed => println!("\n"),
            TurnEvent::Interrupted(reason) => {
                println!("\n{}\n", reason.line_text().bright_red());
            }
        }
        session.apply_event(event);
    }
    handle.join().await;
}

fn print_line(line: &Line) {
    match line.speaker {
        Speaker::Narrator => println!("{}\n", line.text),
        Speaker::User => println!("{}\n", format!("> {}", line.text).bright_green()),
    }
}

fn print_transcript(session: &Session) {
    println!();
    for line in session.transcript() {
        print_line(line);
    }
}

fn print_prompt(session: &Session) {
    print!("{} ", format!("[{}]>", session.mode().label()).bright_cyan());
    let _ = std::io::Write::flush(&mut std::io::stdout());
}
