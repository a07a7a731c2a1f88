use std::{
  fs::{self, File, OpenOptions},
  io::{self, BufRead, BufReader, Write},
  path::{Path, PathBuf},
  sync::{Arc, OnceLock},
};

use parking_lot::Mutex;
use tracing_subscriber::{EnvFilter, fmt::{self, time::LocalTime}, prelude::*};

use crate::configs::Config;

pub(crate) static GLOBAL_FILE_WRITER: OnceLock<CircularFileWriter> = OnceLock::new();

/// Prints a line to stdout and mirrors it into the log file, if one is
/// configured. Used before the tracing subscriber exists.
#[macro_export]
macro_rules! log_println {
    () => {{
        std::println!();
        $crate::common::logger::append_to_file_raw("\n");
    }};
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        std::println!("{}", msg);
        $crate::common::logger::append_to_file_raw(&format!("{}\n", msg));
    }};
}

pub fn append_to_file_raw(msg: &str) {
  if let Some(mut writer) = GLOBAL_FILE_WRITER.get().cloned() {
    let _ = writer.write_all(strip_ansi_escapes(msg).as_bytes());
  }
}

fn strip_ansi_escapes(s: &str) -> String {
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

/// Builds the filter directive from `[logging]`: base level plus extra
/// per-target filters.
fn filter_directive(config: &Config) -> String {
  let logging = config.logging.as_ref();
  let level = logging.and_then(|l| l.level.as_deref()).unwrap_or("info");
  match logging.and_then(|l| l.filters.as_deref()) {
    Some(filters) if !filters.is_empty() => format!("{},{}", level, filters),
    _ => level.to_string(),
  }
}

pub fn init(config: &Config) {
  // RUST_LOG wins over the config file
  let env_filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

  let stdout_layer = fmt::layer()
    .with_timer(LocalTime::rfc_3339())
    .with_target(true)
    .with_thread_ids(true)
    .with_line_number(true)
    .with_file(false);

  let file_layer = config
    .logging
    .as_ref()
    .and_then(|l| l.file.as_ref())
    .map(|file_config| {
      if let Some(parent) = Path::new(&file_config.path).parent() {
        if let Err(e) = fs::create_dir_all(parent) {
          eprintln!("Failed to create log directory: {}", e);
        }
      }

      let writer = CircularFileWriter::new(file_config.path.clone(), file_config.max_lines);
      let _ = GLOBAL_FILE_WRITER.set(writer.clone());
      fmt::layer()
        .with_writer(writer)
        .with_timer(LocalTime::rfc_3339())
        .with_target(true)
        .with_line_number(true)
        .with_ansi(false)
    });

  tracing_subscriber::registry()
    .with(env_filter)
    .with(stdout_layer)
    .with(file_layer)
    .init();
}

/// Appends to a log file and trims it back to `max_lines` once enough new
/// lines have accumulated.
#[derive(Clone)]
pub(crate) struct CircularFileWriter {
  path: PathBuf,
  max_lines: u32,
  lines_since_prune: Arc<Mutex<u32>>,
}

impl CircularFileWriter {
  pub(crate) fn new(path: impl Into<PathBuf>, max_lines: u32) -> Self {
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

    let keep = self.max_lines as usize;
    if lines.len() > keep {
      let mut file = File::create(&self.path)?;
      for line in &lines[lines.len() - keep..] {
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

impl<'a> fmt::MakeWriter<'a> for CircularFileWriter {
  type Writer = Self;

  fn make_writer(&'a self) -> Self::Writer {
    self.clone()
  }
}
