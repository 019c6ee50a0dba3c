// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Normal, quiet (CI) and JSON lines modes; warnings go to stderr in every mode.

use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Progress, results and warnings
    Normal,
    /// Results and warnings only
    Quiet,
    /// One JSON object per line
    Json,
}

pub struct Output {
    mode: OutputMode,
    started: Instant,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            started: Instant::now(),
        }
    }

    fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn emit_json<T: Serialize>(&self, event: &str, message: &str, data: Option<&T>, stderr: bool) {
        let line = JsonEvent {
            event,
            message,
            duration_secs: self.elapsed_secs(),
            data,
        };
        if let Ok(json) = serde_json::to_string(&line) {
            if stderr {
                eprintln!("{json}");
            } else {
                println!("{json}");
            }
        }
    }

    pub fn progress(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => println!("  → {message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit_json::<()>("progress", message, None, false),
        }
    }

    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Warning: {message}"),
            OutputMode::Json => self.emit_json::<()>("warning", message, None, true),
        }
    }

    /// Final result; `data` is attached to the JSON event.
    pub fn success<T: Serialize>(&self, message: &str, data: Option<&T>) {
        match self.mode {
            OutputMode::Normal => println!("✓ {message} ({:.1}s)", self.elapsed_secs()),
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.emit_json("success", message, data, false),
        }
    }

    /// Human-readable detail lines, skipped in JSON mode where `success` carries the data.
    pub fn details(&self, lines: &[String]) {
        if self.mode != OutputMode::Json {
            for line in lines {
                println!("{line}");
            }
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => self.emit_json::<()>("error", message, None, true),
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a, T: Serialize> {
    event: &'a str,
    message: &'a str,
    duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
}
