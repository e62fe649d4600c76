//! Choosing which stale models to update.
//!
//! Force mode updates everything in order. Interactive mode runs a small
//! state machine:
//!
//! ```text
//! Prompting --choose--> Updating --> Prompting
//!     |                                  |
//!     +--done / nothing left--> Done     +--eof--> Cancelled
//! ```
//!
//! Models that were updated are removed from the menu, so the loop always
//! terminates once everything has been pulled.

use std::io::{BufRead, Write};

use tracing::{debug, info};

use crate::error::Result;
use crate::inventory::{LocalModel, ModelService};
use crate::update::UpdateDriver;

pub const UP_TO_DATE_MESSAGE: &str = "All models are up to date!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode { Force, Interactive }

/// What the user picked from the menu. Indices refer to the slice passed to
/// [`Prompter::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Chosen(Vec<usize>),
    Done,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Prompting,
    Updating(Vec<usize>),
    Done,
    Cancelled,
}

pub trait Prompter {
    fn select(&mut self, items: &[LocalModel]) -> Result<Selection>;
}

/// Numbered menu over any line-oriented reader/writer pair.
pub struct LinePrompter<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self { Self { input, output } }

    pub fn into_output(self) -> W { self.output }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn select(&mut self, items: &[LocalModel]) -> Result<Selection> {
        loop {
            writeln!(self.output, "Select models to update:")?;
            for (i, m) in items.iter().enumerate() {
                writeln!(self.output, "  {:>2}) {}", i + 1, m.name)?;
            }
            write!(self.output, "Numbers separated by spaces, 'all', or empty to finish: ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                return Ok(Selection::Cancelled);
            }
            match parse_selection(&line, items.len()) {
                Ok(sel) => return Ok(sel),
                Err(msg) => writeln!(self.output, "{msg}")?,
            }
        }
    }
}

/// Parse a menu answer for a list of `len` items (1-based on screen).
pub fn parse_selection(input: &str, len: usize) -> std::result::Result<Selection, String> {
    let answer = input.trim();
    match answer.to_ascii_lowercase().as_str() {
        "" | "q" | "quit" | "done" => return Ok(Selection::Done),
        "a" | "all" => return Ok(Selection::Chosen((0..len).collect())),
        _ => {}
    }
    let mut picked = Vec::new();
    for tok in answer.split(|c: char| c == ',' || c.is_whitespace()).filter(|t| !t.is_empty()) {
        let n: usize = tok.parse().map_err(|_| format!("Invalid selection {tok:?}"))?;
        if n == 0 || n > len {
            return Err(format!("Selection {n} is out of range 1-{len}"));
        }
        if !picked.contains(&(n - 1)) { picked.push(n - 1); }
    }
    Ok(Selection::Chosen(picked))
}

/// Drive the update flow for `stale` in the given mode. Returns the terminal
/// state (`Done` or `Cancelled`).
pub async fn run_updates<M, W, P>(driver: &mut UpdateDriver<'_, M, W>, stale: &[LocalModel], mode: Mode, prompter: &mut P) -> Result<SessionState>
where
    M: ModelService + ?Sized,
    W: Write + Send,
    P: Prompter + ?Sized,
{
    if stale.is_empty() {
        driver.say(UP_TO_DATE_MESSAGE)?;
        return Ok(SessionState::Done);
    }
    match mode {
        Mode::Force => {
            for m in stale { driver.update(&m.name).await?; }
            info!(updated = stale.len(), "force_update_complete");
            Ok(SessionState::Done)
        }
        Mode::Interactive => run_interactive(driver, stale, prompter).await,
    }
}

async fn run_interactive<M, W, P>(driver: &mut UpdateDriver<'_, M, W>, stale: &[LocalModel], prompter: &mut P) -> Result<SessionState>
where
    M: ModelService + ?Sized,
    W: Write + Send,
    P: Prompter + ?Sized,
{
    let mut remaining = stale.to_vec();
    let mut state = SessionState::Prompting;
    loop {
        debug!(?state, remaining = remaining.len(), "selection_state");
        state = match state {
            SessionState::Prompting if remaining.is_empty() => SessionState::Done,
            SessionState::Prompting => match prompter.select(&remaining)? {
                Selection::Chosen(picked) if picked.is_empty() => SessionState::Prompting,
                Selection::Chosen(picked) => SessionState::Updating(picked),
                Selection::Done => SessionState::Done,
                Selection::Cancelled => SessionState::Cancelled,
            },
            SessionState::Updating(picked) => {
                let names: Vec<String> = picked.iter().filter_map(|i| remaining.get(*i)).map(|m| m.name.clone()).collect();
                for name in &names { driver.update(name).await?; }
                remaining.retain(|m| !names.contains(&m.name));
                SessionState::Prompting
            }
            terminal @ (SessionState::Done | SessionState::Cancelled) => {
                info!(?terminal, updated = driver.updated().len(), "selection_finished");
                return Ok(terminal);
            }
        };
    }
}
