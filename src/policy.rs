//! Decision hooks consulted by `write`.
//!
//! The engine never reads a terminal itself; when a write lands on a
//! non-empty file or does not fit, it asks these hooks what to do. The
//! default is non-interactive (append, clip), `Interactive` reproduces a
//! classic prompt-driven behavior, and tests plug in canned answers.

use std::io::{self, BufRead, Write};

use crate::file::OpenFile;

/// Answer for a write whose cursor is not at end of file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteAction {
    /// Truncate the file to empty and write from the start
    Overwrite,
    /// Move the cursor to end of file and write there
    Append,
    /// Write nothing
    Cancel,
}

/// Answer for a write larger than the file's remaining capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailAction {
    /// Write only the bytes that fit
    Clip,
    /// Write nothing
    Cancel,
}

pub trait OverwritePolicy {
    fn on_non_empty(&mut self, file: &OpenFile) -> OverwriteAction;
}

pub trait TailPolicy {
    fn on_insufficient_space(
        &mut self,
        file: &OpenFile,
        requested: usize,
        available: usize,
    ) -> TailAction;
}

/// Non-interactive default: append to non-empty files, clip oversized
/// writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl OverwritePolicy for DefaultPolicy {
    fn on_non_empty(&mut self, _file: &OpenFile) -> OverwriteAction {
        OverwriteAction::Append
    }
}

impl TailPolicy for DefaultPolicy {
    fn on_insufficient_space(
        &mut self,
        _file: &OpenFile,
        _requested: usize,
        _available: usize,
    ) -> TailAction {
        TailAction::Clip
    }
}

/// Refuses both situations; useful for drivers that want writes to plain
/// files only.
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelPolicy;

impl OverwritePolicy for CancelPolicy {
    fn on_non_empty(&mut self, _file: &OpenFile) -> OverwriteAction {
        OverwriteAction::Cancel
    }
}

impl TailPolicy for CancelPolicy {
    fn on_insufficient_space(
        &mut self,
        _file: &OpenFile,
        _requested: usize,
        _available: usize,
    ) -> TailAction {
        TailAction::Cancel
    }
}

/// Asks on the terminal, retrying until one of the offered digits comes
/// back.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interactive;

fn ask(prompt: &str, choices: &[&str]) -> usize {
    loop {
        println!("{prompt}");
        for (i, choice) in choices.iter().enumerate() {
            println!("  {}. {choice}", i + 1);
        }
        print!("> ");
        let _ = io::stdout().flush();

        let Some(Ok(line)) = io::stdin().lock().lines().next() else {
            // stdin closed; fall back to the last (safe) choice
            return choices.len();
        };
        match line.trim().parse::<usize>() {
            Ok(n) if (1..=choices.len()).contains(&n) => return n,
            _ => continue,
        }
    }
}

impl OverwritePolicy for Interactive {
    fn on_non_empty(&mut self, file: &OpenFile) -> OverwriteAction {
        let prompt = format!("file (inode {}) is not empty; do you want to", file.inode);
        match ask(
            &prompt,
            &[
                "overwrite it from the start, discarding its contents",
                "append after the existing contents",
                "not write at all",
            ],
        ) {
            1 => OverwriteAction::Overwrite,
            2 => OverwriteAction::Append,
            _ => OverwriteAction::Cancel,
        }
    }
}

impl TailPolicy for Interactive {
    fn on_insufficient_space(
        &mut self,
        file: &OpenFile,
        requested: usize,
        available: usize,
    ) -> TailAction {
        let prompt = format!(
            "file (inode {}) cannot hold {requested} more bytes ({available} left); do you want to",
            file.inode,
        );
        match ask(&prompt, &["write only the bytes that fit", "not write at all"]) {
            1 => TailAction::Clip,
            _ => TailAction::Cancel,
        }
    }
}
