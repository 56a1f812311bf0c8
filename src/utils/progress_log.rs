//! Progress-aware logging
//!
//! Log lines written while bars are live would corrupt the terminal display, so the
//! fmt layer writes through this `MakeWriter`, which clears the bars for the
//! duration of each write.

use std::io::{self, Write};
use tracing_subscriber::fmt::MakeWriter;

use crate::progress::ProgressDisplay;

/// `MakeWriter` that routes log output around the progress bars
#[derive(Clone)]
pub struct ProgressLogWriter {
    display: ProgressDisplay,
}

impl ProgressLogWriter {
    pub fn new(display: ProgressDisplay) -> Self {
        Self { display }
    }
}

impl<'a> MakeWriter<'a> for ProgressLogWriter {
    type Writer = SuspendingStderr;

    fn make_writer(&'a self) -> Self::Writer {
        SuspendingStderr {
            display: self.display.clone(),
        }
    }
}

/// Stderr handle that suspends the display around each write
pub struct SuspendingStderr {
    display: ProgressDisplay,
}

impl Write for SuspendingStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.display.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PrintSettings, ProgressSettings};

    #[test]
    fn test_writer_passes_bytes_through() {
        let display =
            ProgressDisplay::hidden(PrintSettings::default(), ProgressSettings::default());
        let make = ProgressLogWriter::new(display);
        let mut writer = make.make_writer();
        assert_eq!(writer.write(b"hello\n").unwrap(), 6);
        writer.flush().unwrap();
    }
}
