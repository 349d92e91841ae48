use std::io::{self, Write};
use std::sync::Mutex;

use tracing::warn;

enum Sink {
    Stdout,
    Capture(Vec<String>),
}

/// Line-oriented output shared by every branch of a run.
///
/// Each [`Output::println`] writes one whole line while holding the lock, so
/// lines printed by concurrent branches never interleave.
pub struct Output {
    sink: Mutex<Sink>,
}

impl Output {
    pub fn stdout() -> Self {
        Self {
            sink: Mutex::new(Sink::Stdout),
        }
    }

    /// An output that buffers lines instead of writing them
    pub fn capture() -> Self {
        Self {
            sink: Mutex::new(Sink::Capture(Vec::new())),
        }
    }

    pub fn println(&self, line: &str) {
        let mut sink = match self.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match &mut *sink {
            Sink::Stdout => {
                // a closed stdout must not abort the branch that printed
                if let Err(e) = write_line(&mut io::stdout().lock(), line) {
                    warn!("dropping printed line: {e}");
                }
            }
            Sink::Capture(lines) => lines.push(line.to_string()),
        }
    }

    /// Drains the captured lines; always empty for stdout
    pub fn take(&self) -> Vec<String> {
        let mut sink = match self.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match &mut *sink {
            Sink::Stdout => Vec::new(),
            Sink::Capture(lines) => std::mem::take(lines),
        }
    }
}

fn write_line(out: &mut impl Write, line: &str) -> io::Result<()> {
    writeln!(out, "{line}")?;
    out.flush()
}

impl Default for Output {
    fn default() -> Self {
        Self::stdout()
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn concurrent_lines_stay_whole() {
        let out = Arc::new(Output::capture());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let out = out.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        out.println(&format!("{i}:{j}:{}", "x".repeat(64)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let lines = out.take();
        assert_eq!(lines.len(), 400);
        assert!(lines.iter().all(|l| l.ends_with(&"x".repeat(64))));
        assert!(out.take().is_empty());
    }

    struct Closed;

    impl Write for Closed {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failures_are_reported() {
        let mut buf = Vec::new();
        write_line(&mut buf, "ok").unwrap();
        assert_eq!(buf, b"ok\n");
        let err = write_line(&mut Closed, "lost").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
