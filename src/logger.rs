//! Logging utilities with colored output.
//!
//! This module provides:
//! - `log!` macro for formatted terminal output with colored prefixes
//! - `debug!` macro, printed only when `--verbose` is set
//! - `WatchStatus` for timestamped build results in watch mode
//!
//! # Example
//!
//! ```ignore
//! log!("styles"; "compiling {} entries", count);
//! debug!("cache"; "hit: {}", path.display());
//! ```

use colored::{ColoredString, Colorize};
use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType, size},
};
use std::{
    io::{Write, stdout},
    sync::{
        OnceLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// Cached terminal width (fetched once on first use)
static TERMINAL_WIDTH: OnceLock<u16> = OnceLock::new();

/// Whether `debug!` lines are printed
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Length of brackets around module name: "[]"
const BRACKET_LEN: usize = 2;
/// Space after prefix: "[module] " <- this space
const SPACE_AFTER_PREFIX: usize = 1;

/// Calculate total prefix length for a module name.
///
/// Returns: `module.len() + 3` (for `[`, `]`, and trailing space)
#[inline]
const fn calc_prefix_len(module_len: usize) -> usize {
    module_len + BRACKET_LEN + SPACE_AFTER_PREFIX
}

/// Get terminal width, cached after first call.
/// Falls back to 120 columns if detection fails.
fn get_terminal_width() -> u16 {
    *TERMINAL_WIDTH.get_or_init(|| size().map(|(w, _)| w).unwrap_or(120))
}

// ============================================================================
// Macros
// ============================================================================

/// Log a message with a colored module prefix.
///
/// # Usage
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Like `log!`, but only printed in verbose mode.
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

/// Enable or disable `debug!` output.
pub fn set_verbose(enabled: bool) {
    VERBOSE.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Log a message with a colored module prefix.
///
/// Automatically truncates long single-line messages to fit terminal width.
pub fn log(module: &str, message: &str) {
    let module_lower = module.to_ascii_lowercase();
    let prefix = colorize_prefix(module, &module_lower);
    let width = get_terminal_width() as usize;

    let mut stdout = stdout().lock();

    if message.contains('\n') {
        writeln!(stdout, "{prefix} {message}").ok();
    } else {
        let max_msg_len = width.saturating_sub(calc_prefix_len(module.len()));
        writeln!(stdout, "{prefix} {}", truncate_str(message, max_msg_len)).ok();
    }

    stdout.flush().ok();
}

/// Clear the whole terminal and move the cursor home (used on restart).
pub fn clear_screen() {
    let mut stdout = stdout().lock();
    execute!(stdout, Clear(ClearType::All), cursor::MoveTo(0, 0)).ok();
    stdout.flush().ok();
}

/// Apply color to a module prefix based on module type.
#[inline]
fn colorize_prefix(module: &str, module_lower: &str) -> ColoredString {
    let prefix = format!("[{module}]");
    match module_lower {
        "server" | "serve" => prefix.bright_blue().bold(),
        "watch" => prefix.bright_green().bold(),
        "error" | "errorlog" => prefix.bright_red().bold(),
        "warn" => prefix.bright_magenta().bold(),
        "cache" => prefix.bright_cyan().bold(),
        _ => prefix.bright_yellow().bold(),
    }
}

/// Truncate a string to fit within `max_len` bytes.
///
/// Ensures the result is valid UTF-8 by finding the nearest character boundary.
#[inline]
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Format a build duration for display: `412ms`, `1.52s`.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

// ============================================================================
// Watch Status
// ============================================================================

/// Timestamped one-line build results for watch mode.
///
/// ```ignore
/// WatchStatus::success("styles", "main", Duration::from_millis(120));
/// WatchStatus::error("scripts", "editor", "unexpected token");
/// ```
pub struct WatchStatus;

impl WatchStatus {
    /// `[12:01:33] ✓ [styles] main (120ms)`
    pub fn success(module: &str, unit: &str, duration: Duration) {
        let line = format!("{unit} ({})", format_duration(duration));
        Self::display("✓".green().to_string(), module, &line);
    }

    /// `[12:01:33] [styles] unchanged: main`
    pub fn unchanged(module: &str, unit: &str) {
        Self::display(
            String::new(),
            module,
            &format!("unchanged: {unit}").dimmed().to_string(),
        );
    }

    /// `[12:01:33] ✗ [scripts] editor` followed by the error detail.
    pub fn error(module: &str, unit: &str, detail: &str) {
        let message = if detail.is_empty() {
            unit.to_string()
        } else {
            format!("{unit}\n{detail}")
        };
        Self::display("✗".red().to_string(), module, &message);
    }

    fn display(symbol: String, module: &str, message: &str) {
        let timestamp = format!("[{}]", chrono::Local::now().format("%H:%M:%S")).dimmed();
        let prefix = colorize_prefix(module, &module.to_ascii_lowercase());

        let mut stdout = stdout().lock();
        if symbol.is_empty() {
            writeln!(stdout, "{timestamp} {prefix} {message}").ok();
        } else {
            writeln!(stdout, "{timestamp} {symbol} {prefix} {message}").ok();
        }
        stdout.flush().ok();
    }
}

// ============================================================================
// Tests
// ============================================================================
