//! Logger initialisation.
//!
//! Installs `env_logger` as the `log` backend.  Every record is written to
//! stderr and, when a path is given, to the run's log file:
//!
//! ```text
//! 2024-06-10 14:02:11,503 - INFO    Starting cycle 1
//! ```
//!
//! The default level is `info`; `RUST_LOG` overrides it.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use env_logger::{Builder, Env, Target};

/// Copies every write to stderr and a file.
struct Tee {
    file: File,
    stderr: io::Stderr,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stderr.write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stderr.flush()?;
        self.file.flush()
    }
}

/// Install the global logger.  `log_file` is created (truncated).
pub fn init(log_file: Option<&Path>) -> anyhow::Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} - {:<7} {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            record.level(),
            record.args()
        )
    });

    if let Some(path) = log_file {
        let file = File::create(path)?;
        builder.target(Target::Pipe(Box::new(Tee {
            file,
            stderr: io::stderr(),
        })));
    }

    builder.try_init()?;
    Ok(())
}
