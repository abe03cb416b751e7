//! Terminal output for evoke.
//!
//! Every line is `[module] message`, the module tag colored by what it
//! reports on. While the scheduler shows its [`ProgressLine`], log lines are
//! written over it and the counters reappear on the next update.
//!
//! ```ignore
//! log!("build"; "{} of {} selected", selected, tracked);
//! debug!("select"; "changed: {key}");
//! ```

use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::io::{StdoutLock, Write, stdout};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Whether a progress line currently occupies the last terminal line.
static PROGRESS_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Enable `debug!` output (`--verbose`).
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

/// Log a message with a colored module prefix.
///
/// ```ignore
/// log!("plugin"; "loaded `{}`", name);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Like `log!`, but only with `--verbose`. Arguments are not evaluated
/// otherwise.
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

/// Print `[module] message` on its own line.
pub fn log(module: &str, message: &str) {
    let prefix = colorize_prefix(module);
    let mut out = stdout().lock();
    if PROGRESS_ACTIVE.load(Ordering::SeqCst) {
        clear_line(&mut out);
    }
    writeln!(out, "{prefix} {message}").ok();
    out.flush().ok();
}

/// Module tags with their own color; everything else is yellow.
fn colorize_prefix(module: &str) -> String {
    let tag = format!("[{module}]");
    match module.to_ascii_lowercase().as_str() {
        "error" => tag.bright_red().bold().to_string(),
        "warning" => tag.bright_magenta().bold().to_string(),
        "plugin" => tag.bright_blue().bold().to_string(),
        "done" => tag.bright_green().bold().to_string(),
        _ => tag.bright_yellow().bold().to_string(),
    }
}

fn clear_line(out: &mut StdoutLock<'_>) {
    execute!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine)).ok();
}

/// Per-kind counters redrawn in place: `[build] pages(42/69) assets(3/10)`.
///
/// Workers bump counters from any thread. A refresh is skipped when another
/// thread is already drawing, so `inc` never blocks.
pub struct ProgressLine {
    counters: Vec<Counter>,
    drawing: Mutex<()>,
    finished: AtomicBool,
}

struct Counter {
    name: &'static str,
    total: usize,
    current: AtomicUsize,
}

impl ProgressLine {
    /// Counters with a zero total are left out.
    pub fn new(items: &[(&'static str, usize)]) -> Self {
        let counters = items
            .iter()
            .filter(|(_, total)| *total > 0)
            .map(|&(name, total)| Counter {
                name,
                total,
                current: AtomicUsize::new(0),
            })
            .collect();

        PROGRESS_ACTIVE.store(true, Ordering::SeqCst);
        let progress = Self {
            counters,
            drawing: Mutex::new(()),
            finished: AtomicBool::new(false),
        };
        progress.draw(false);
        progress
    }

    #[inline]
    pub fn inc(&self, name: &str) {
        let Some(counter) = self.counters.iter().find(|c| c.name == name) else {
            return;
        };
        counter.current.fetch_add(1, Ordering::Relaxed);
        if let Some(_guard) = self.drawing.try_lock() {
            self.draw(false);
        }
    }

    /// Redraw with final counts and keep the line on screen.
    pub fn finish(self) {
        let _guard = self.drawing.lock();
        PROGRESS_ACTIVE.store(false, Ordering::SeqCst);
        self.draw(true);
        self.finished.store(true, Ordering::Relaxed);
    }

    fn line(&self) -> String {
        self.counters
            .iter()
            .map(|c| format!("{}({}/{})", c.name, c.current.load(Ordering::Relaxed), c.total))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `keep` ends the line so later output starts below it.
    fn draw(&self, keep: bool) {
        let prefix = colorize_prefix("build");
        let line = self.line();

        let mut out = stdout().lock();
        clear_line(&mut out);
        if keep {
            writeln!(out, "{prefix} {line}").ok();
        } else {
            write!(out, "{prefix} {line}").ok();
        }
        out.flush().ok();
    }
}

impl Drop for ProgressLine {
    fn drop(&mut self) {
        if self.finished.load(Ordering::Relaxed) {
            return;
        }
        // Abandoned mid-build: wipe the partial line.
        PROGRESS_ACTIVE.store(false, Ordering::SeqCst);
        let mut out = stdout().lock();
        clear_line(&mut out);
        out.flush().ok();
    }
}
