/*
 * Line rendering for queued messages
 *
 * Every message is expanded into its final on-disk form before it is
 * queued, so the queue only ever holds complete lines:
 *
 *     HH:MM:SS.mmm|LEVEL|message\n
 */

use chrono::{DateTime, Local};
use std::fmt::{self, Write};

use crate::config::LogLevel;

/// Render `message` with a time and level header, newline terminated
pub fn format_line(now: &DateTime<Local>, level: LogLevel, message: fmt::Arguments<'_>) -> String {
    let mut line = String::with_capacity(64);
    // Writing into a String cannot fail
    let _ = write!(line, "{}|{}|", now.format("%H:%M:%S%.3f"), level.as_str());
    let _ = line.write_fmt(message);

    if !line.ends_with('\n') {
        line.push('\n');
    }
    line
}
