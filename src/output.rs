//! Labelled status lines on stderr, colored when stderr is a terminal.

use console::{Color, Term, style};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

fn stderr_is_tty() -> bool {
    Term::stderr().is_term()
}

fn format_label(label: &str, color: Color, is_tty: bool) -> String {
    if is_tty {
        style(label).bold().fg(color).to_string()
    } else {
        label.to_string()
    }
}

fn write_labeled(
    label: &str,
    color: Color,
    msg: &str,
    w: &mut dyn Write,
    is_tty: bool,
) -> io::Result<()> {
    let label = format_label(label, color, is_tty);
    if msg.is_empty() {
        writeln!(w, "{label}")
    } else {
        writeln!(w, "{label} {msg}")
    }
}

pub fn action_to_with_tty(w: &mut dyn Write, label: &str, msg: &str, is_tty: bool) {
    let _ = write_labeled(label, Color::Cyan, msg, w, is_tty);
}

pub fn success_to_with_tty(w: &mut dyn Write, label: &str, msg: &str, is_tty: bool) {
    let _ = write_labeled(label, Color::Green, msg, w, is_tty);
}

pub fn fail_to_with_tty(w: &mut dyn Write, label: &str, msg: &str, is_tty: bool) {
    let _ = write_labeled(label, Color::Red, msg, w, is_tty);
}

pub fn warn_to_with_tty(w: &mut dyn Write, msg: &str, is_tty: bool) {
    let _ = write_labeled("Warning", Color::Yellow, msg, w, is_tty);
}

pub fn note_to_with_tty(w: &mut dyn Write, msg: &str, is_tty: bool) {
    let _ = write_labeled("Note", Color::Yellow, msg, w, is_tty);
}

/// Writes every line of `msg` indented, dimmed on a terminal.
pub fn detail_to_with_tty(w: &mut dyn Write, msg: &str, is_tty: bool) {
    for line in msg.lines() {
        let line = if is_tty {
            style(format!("  {line}")).dim().to_string()
        } else {
            format!("  {line}")
        };
        let _ = writeln!(w, "{line}");
    }
}

pub fn action(label: &str, msg: &str) {
    action_to_with_tty(&mut io::stderr(), label, msg, stderr_is_tty());
}

pub fn success(label: &str, msg: &str) {
    success_to_with_tty(&mut io::stderr(), label, msg, stderr_is_tty());
}

pub fn fail(label: &str, msg: &str) {
    fail_to_with_tty(&mut io::stderr(), label, msg, stderr_is_tty());
}

pub fn warn(msg: &str) {
    warn_to_with_tty(&mut io::stderr(), msg, stderr_is_tty());
}

pub fn note(msg: &str) {
    note_to_with_tty(&mut io::stderr(), msg, stderr_is_tty());
}

pub fn detail(msg: &str) {
    detail_to_with_tty(&mut io::stderr(), msg, stderr_is_tty());
}

/// Like [`detail`], but only with `--verbose`.
pub fn verbose(msg: &str) {
    if is_verbose() {
        detail(msg);
    }
}

pub fn set_verbose(enabled: bool) {
    VERBOSE.store(enabled, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}
