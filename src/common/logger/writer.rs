use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::PathBuf,
    sync::Arc,
};

use parking_lot::Mutex;

/// Removes ANSI escape sequences so the log file stays plain text.
pub fn strip_ansi_escapes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' {
            in_escape = true;
        } else if in_escape {
            if c.is_ascii_alphabetic() {
                in_escape = false;
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Append-only log file trimmed back to the newest `max_lines` lines every
/// `prune_threshold()` writes. Between prunes it may hold up to
/// `max_lines + prune_threshold()` lines.
#[derive(Clone)]
pub struct CircularFileWriter {
    path: PathBuf,
    max_lines: u32,
    lines_since_prune: Arc<Mutex<u32>>,
}

impl CircularFileWriter {
    pub fn new(path: impl Into<PathBuf>, max_lines: u32) -> Self {
        Self {
            path: path.into(),
            max_lines,
            lines_since_prune: Arc::new(Mutex::new(0)),
        }
    }

    fn prune_threshold(&self) -> u32 {
        (self.max_lines / 10).max(50)
    }

    fn prune(&self) -> io::Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let lines: Vec<String> = BufReader::new(File::open(&self.path)?)
            .lines()
            .collect::<Result<_, _>>()?;

        if lines.len() > self.max_lines as usize {
            let start = lines.len() - self.max_lines as usize;
            let mut file = File::create(&self.path)?;
            for line in &lines[start..] {
                writeln!(file, "{}", line)?;
            }
        }
        Ok(())
    }
}

impl io::Write for CircularFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?
            .write_all(buf)?;

        let mut pending = self.lines_since_prune.lock();
        *pending += buf.iter().filter(|&&b| b == b'\n').count() as u32;

        if *pending >= self.prune_threshold() {
            if let Err(e) = self.prune() {
                eprintln!("Failed to prune log file: {}", e);
            }
            *pending = 0;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CircularFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
