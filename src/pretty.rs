//! # Pretty printing
//!
//! Terminal rendering for answers, sources, chunk listings and agent transcripts.
//!
//! Every printer writes to any [`Write`], so the same code paints the terminal in the CLI and
//! fills a buffer in tests. Colors are plain ANSI sequences emitted through crossterm:
//!
//! | Element            | Style            |
//! |--------------------|------------------|
//! | Answer             | **Bold Blue**    |
//! | Headings, labels   | **Bold Cyan**    |
//! | Scores, offsets    | Dark grey        |
//! | Tool calls         | Yellow           |
//! | Error observations | Red              |

use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, SetAttribute, SetForegroundColor},
};
use std::io::{self, Write};

use crate::agent::{AgentRun, AgentStep};
use crate::document::Chunk;
use crate::qa::Answer;

/// Characters of a chunk shown in listings before eliding.
const PREVIEW_CHARS: usize = 160;

fn styled<W: Write>(out: &mut W, color: Color, bold: bool, text: &str) -> io::Result<()> {
    out.execute(SetForegroundColor(color))?;
    if bold {
        out.execute(SetAttribute(Attribute::Bold))?;
    }
    write!(out, "{text}")?;
    out.execute(SetAttribute(Attribute::Reset))?;
    out.execute(SetForegroundColor(Color::Reset))?;
    Ok(())
}

fn heading<W: Write>(out: &mut W, text: &str) -> io::Result<()> {
    styled(out, Color::Cyan, true, text)?;
    writeln!(out)
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}…", &flat[..cut]),
        None => flat,
    }
}

/// Print an answer and, with `show_sources`, the passages it was grounded on.
pub fn print_answer<W: Write>(out: &mut W, answer: &Answer, show_sources: bool) -> io::Result<()> {
    styled(out, Color::Blue, true, answer.text.trim())?;
    writeln!(out)?;

    if show_sources {
        writeln!(out)?;
        heading(out, &format!("Sources ({})", answer.sources.len()))?;
        for source in &answer.sources {
            styled(
                out,
                Color::DarkGrey,
                false,
                &format!("#{} {} score={:.4}", source.rank + 1, source.chunk.id, source.score),
            )?;
            writeln!(out)?;
            writeln!(out, "  {}", preview(&source.chunk.text))?;
        }
    }
    out.flush()
}

/// List chunks with their offsets, as produced by the splitter.
pub fn print_chunks<W: Write>(out: &mut W, chunks: &[Chunk]) -> io::Result<()> {
    heading(out, &format!("{} chunks", chunks.len()))?;
    for chunk in chunks {
        styled(
            out,
            Color::DarkGrey,
            false,
            &format!(
                "{} offset={} chars={} overlap={}",
                chunk.id,
                chunk.start_offset,
                chunk.text.chars().count(),
                chunk.overlap
            ),
        )?;
        writeln!(out)?;
        writeln!(out, "  {}", preview(&chunk.text))?;
    }
    out.flush()
}

/// Print every step of an agent session.
pub fn print_transcript<W: Write>(out: &mut W, steps: &[AgentStep]) -> io::Result<()> {
    for (i, step) in steps.iter().enumerate() {
        heading(out, &format!("Step {}", i + 1))?;
        if !step.thought.is_empty() {
            writeln!(out, "  Thought: {}", step.thought)?;
        }
        if let Some(action) = &step.action {
            styled(
                out,
                Color::Yellow,
                false,
                &format!("  Action: {}({:?})", action.tool, action.input),
            )?;
            writeln!(out)?;
        }
        if let Some(observation) = &step.observation {
            let color = if observation.starts_with("Error:") {
                Color::Red
            } else {
                Color::Reset
            };
            styled(out, color, false, &format!("  Observation: {}", preview(observation)))?;
            writeln!(out)?;
        }
    }
    out.flush()
}

/// Print the final answer of an agent session, preceded by its transcript when `verbose`.
pub fn print_agent_run<W: Write>(out: &mut W, run: &AgentRun, verbose: bool) -> io::Result<()> {
    if verbose {
        print_transcript(out, &run.steps)?;
        writeln!(out)?;
    }
    styled(out, Color::Blue, true, run.answer.trim())?;
    writeln!(out)?;
    out.flush()
}
