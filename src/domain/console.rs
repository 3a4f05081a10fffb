// Operator console - append-only diagnostic log
use chrono::Local;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Human-readable lifecycle log shown to the operator.
///
/// Lines are only ever appended; once `max_lines` is reached the oldest line is
/// dropped. Nothing in the control path reads it back.
#[derive(Debug, Clone)]
pub struct ConsoleLog {
    lines: Arc<Mutex<VecDeque<String>>>,
    max_lines: usize,
}

impl ConsoleLog {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::new())),
            max_lines: max_lines.max(1),
        }
    }

    pub fn push(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(target: "console", "{}", message);

        let line = format!("{}: {}", Local::now().format("%H:%M:%S"), message);
        let mut lines = match self.lines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if lines.len() == self.max_lines {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(guard) => guard.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }
}
