//! Shared terminal display: nested progress bars plus banner output
//!
//! Bars are inserted into one `MultiProgress` ordered by their computed row, and every
//! banner or log line goes through the same handle so nothing tears a live bar.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex};

use super::chain::{RowChain, RowToken};
use crate::config::{PrintSettings, ProgressSettings};

const LEVEL_TEMPLATE: &str = "{msg:40!} [{bar:30.cyan/blue}] {pos}/{len} {prefix}";
const DOWNLOAD_TEMPLATE: &str =
    "{msg:40!} [{bar:30.green/white}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Traversal level a bar belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Url,
    Artist,
    Album,
    Playlist,
    Download,
}

impl Level {
    fn unit(self) -> &'static str {
        match self {
            Self::Url => "urls",
            Self::Artist => "albums",
            Self::Album | Self::Playlist => "songs",
            Self::Download => "bytes",
        }
    }
}

/// Message channels, each individually toggleable in the config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintChannel {
    Skips,
    Errors,
    Warnings,
    Downloads,
    ProgressInfo,
}

struct Inner {
    multi: MultiProgress,
    hidden: bool,
    live_rows: Mutex<Vec<usize>>,
    print: PrintSettings,
    bars: ProgressSettings,
}

/// Cloneable handle to the terminal display
#[derive(Clone)]
pub struct ProgressDisplay {
    inner: Arc<Inner>,
}

impl ProgressDisplay {
    /// Display drawing to stderr when it is a terminal, hidden otherwise
    pub fn new(print: PrintSettings, bars: ProgressSettings) -> Self {
        let hidden = !console::user_attended_stderr();
        Self::build(print, bars, hidden)
    }

    /// Display that never draws bars; banners still go to stdout/stderr
    pub fn hidden(print: PrintSettings, bars: ProgressSettings) -> Self {
        Self::build(print, bars, true)
    }

    fn build(print: PrintSettings, bars: ProgressSettings, hidden: bool) -> Self {
        let target = if hidden {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        };
        Self {
            inner: Arc::new(Inner {
                multi: MultiProgress::with_draw_target(target),
                hidden,
                live_rows: Mutex::new(Vec::new()),
                print,
                bars,
            }),
        }
    }

    fn level_enabled(&self, level: Level) -> bool {
        let bars = &self.inner.bars;
        match level {
            Level::Url => bars.url,
            Level::Artist => bars.artist,
            Level::Album => bars.album,
            Level::Playlist => bars.playlist,
            Level::Download => bars.download,
        }
    }

    fn channel_enabled(&self, channel: PrintChannel) -> bool {
        let print = &self.inner.print;
        match channel {
            PrintChannel::Skips => print.skips,
            PrintChannel::Errors => print.errors,
            PrintChannel::Warnings => print.warnings,
            PrintChannel::Downloads => print.downloads,
            PrintChannel::ProgressInfo => print.progress_info,
        }
    }

    /// Open a bar for one traversal level below `parent`
    ///
    /// The row comes from the parent chain. If the level's bar is disabled, a
    /// `Reserved` token stands in for it so descendants keep their rows.
    pub fn enter(&self, parent: &RowChain, level: Level, len: u64) -> LevelBar {
        let row = parent.next_row();
        if !self.level_enabled(level) {
            return LevelBar {
                bar: ProgressBar::hidden(),
                row,
                chain: parent.extended(RowToken::Reserved(row)),
                display: None,
            };
        }

        let template = if level == Level::Download {
            DOWNLOAD_TEMPLATE
        } else {
            LEVEL_TEMPLATE
        };
        let bar = ProgressBar::new(len).with_style(style(template));
        bar.set_prefix(level.unit());

        let bar = {
            let mut live = self
                .inner
                .live_rows
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let index = live.iter().filter(|r| **r <= row).count();
            live.push(row);
            self.inner.multi.insert(index, bar)
        };

        LevelBar {
            chain: parent.extended(RowToken::Active {
                bar: bar.clone(),
                row,
            }),
            bar,
            row,
            display: Some(self.clone()),
        }
    }

    /// Print a message above the bars if its channel is enabled
    pub fn print(&self, channel: PrintChannel, message: &str) {
        if !self.channel_enabled(channel) {
            return;
        }
        if self.inner.hidden {
            if matches!(channel, PrintChannel::Errors) {
                eprintln!("{}", message);
            } else {
                println!("{}", message);
            }
            return;
        }
        for line in message.lines() {
            let _ = self.inner.multi.println(line);
        }
    }

    /// Run `f` with every bar cleared from the terminal
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.inner.multi.suspend(f)
    }

    fn release_row(&self, row: usize) {
        let mut live = self
            .inner
            .live_rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(pos) = live.iter().position(|r| *r == row) {
            live.remove(pos);
        }
    }

    fn remove_bar(&self, bar: &ProgressBar) {
        self.inner.multi.remove(bar);
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// A level's bar plus the chain its children receive
///
/// Dropping it clears the bar and frees its row.
pub struct LevelBar {
    bar: ProgressBar,
    row: usize,
    chain: RowChain,
    display: Option<ProgressDisplay>,
}

impl LevelBar {
    /// Chain to hand to the next level down
    pub fn chain(&self) -> &RowChain {
        &self.chain
    }

    #[cfg(test)]
    pub fn row(&self) -> usize {
        self.row
    }

    #[cfg(test)]
    pub fn is_visible(&self) -> bool {
        self.display.is_some()
    }

    pub fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    /// Redraw this bar and every ancestor
    pub fn refresh(&self) {
        self.chain.refresh_all();
    }
}

impl Drop for LevelBar {
    fn drop(&mut self) {
        if let Some(display) = &self.display {
            self.bar.finish_and_clear();
            display.remove_bar(&self.bar);
            display.release_row(self.row);
        }
    }
}
