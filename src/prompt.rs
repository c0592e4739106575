//! Prompt text sent to hosted providers.
//!
//! Only formats strings from a [`TurnRequest`]; no networking and no session
//! logic. Relays receive the request itself and build their own prompt.

use crate::modes::Mode;
use crate::session::{AuthoringContext, TurnRequest};

const BASE_INSTRUCTIONS: &str = "You are the narrator of an interactive story. \
Write in second person, present tense. Continue from the latest line only, \
never speak or act for the player, and stop after one short paragraph.";

pub fn build_system_prompt(request: &TurnRequest) -> String {
    let mut prompt = String::from(BASE_INSTRUCTIONS);
    push_world_section(&mut prompt, &request.context);
    push_character_section(&mut prompt, &request.context);
    push_optional(&mut prompt, "AI INSTRUCTIONS", &request.context.ai_instructions);
    prompt
}

pub fn build_user_prompt(request: &TurnRequest) -> String {
    let mut prompt = String::new();

    if !request.recent_history.is_empty() {
        prompt.push_str("STORY SO FAR:\n");
        for line in &request.recent_history {
            prompt.push_str(line);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    if !request.context.authors_note.trim().is_empty() {
        prompt.push_str(&format!("[Author's note: {}]\n\n", request.context.authors_note.trim()));
    }

    prompt.push_str(&direction(request));
    prompt
}

fn direction(request: &TurnRequest) -> String {
    match request.mode {
        Mode::ContinueTurn | Mode::Erase => "Continue the story.".to_string(),
        Mode::Narrate => format!(
            "The player added this to the story: {}\nContinue from there.",
            request.message
        ),
        Mode::Act | Mode::Speak | Mode::Think => format!(
            "The player's turn: {}\nDescribe what happens next.",
            request.message
        ),
    }
}

fn push_world_section(prompt: &mut String, ctx: &AuthoringContext) {
    if [&ctx.world_title, &ctx.world_summary, &ctx.opening_scene]
        .iter()
        .all(|v| v.trim().is_empty())
    {
        return;
    }
    prompt.push_str("\n\nWORLD:\n");
    if !ctx.world_title.trim().is_empty() {
        prompt.push_str(&format!("Title: {}\n", ctx.world_title.trim()));
    }
    if !ctx.world_summary.trim().is_empty() {
        prompt.push_str(&format!("Summary: {}\n", ctx.world_summary.trim()));
    }
    if !ctx.opening_scene.trim().is_empty() {
        prompt.push_str(&format!("Opening: {}\n", ctx.opening_scene.trim()));
    }
}

fn push_character_section(prompt: &mut String, ctx: &AuthoringContext) {
    let fields = [
        ("Name", &ctx.character_name),
        ("Class", &ctx.character_class),
        ("Background", &ctx.character_background),
    ];
    if fields.iter().all(|(_, v)| v.trim().is_empty()) {
        return;
    }
    prompt.push_str("\n\nPLAYER CHARACTER:\n");
    for (label, value) in fields {
        if !value.trim().is_empty() {
            prompt.push_str(&format!("{}: {}\n", label, value.trim()));
        }
    }
}

fn push_optional(prompt: &mut String, heading: &str, body: &str) {
    if body.trim().is_empty() {
        return;
    }
    prompt.push_str(&format!("\n\n{}:\n{}\n", heading, body.trim()));
}
