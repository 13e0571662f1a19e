// src/rendering.rs
use termimad::crossterm::style::Color;
use termimad::MadSkin;

const ANSWER_PREFIX: &str = "AI:";

fn answer_skin() -> MadSkin {
    let mut skin = MadSkin::default();
    skin.set_headers_fg(Color::Cyan);
    skin.bold.set_fg(Color::Yellow);
    skin.inline_code.set_fg(Color::Green);
    skin
}

/// Formats an assistant answer for the terminal.
pub fn format_answer(answer: &str, markdown: bool) -> String {
    if markdown {
        format!("{}\n{}", ANSWER_PREFIX, answer_skin().term_text(answer))
    } else {
        format!("{} {}", ANSWER_PREFIX, answer)
    }
}
