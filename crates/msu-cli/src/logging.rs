use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Rotate the run log once it grows past this many bytes.
pub const MAX_LOG_BYTES: u64 = 1_000_000;
/// Rotated generations kept: `.1` is newest, `.4` oldest.
pub const LOG_GENERATIONS: u32 = 4;

fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Console output filtered by verbosity plus `RUST_LOG`, and an info-level
/// copy appended to the run log.
pub fn init(verbosity: u8, log_file: &Path) {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::from_default_env().add_directive(level_for(verbosity).into()));

    let file = open_log(log_file).map(|f| {
        fmt::layer()
            .with_writer(Mutex::new(f))
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::INFO)
    });

    tracing_subscriber::registry().with(console).with(file).init();
}

fn open_log(path: &Path) -> Option<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok()?;
    }
    if let Err(e) = rotate_if_needed(path) {
        eprintln!("warning: could not rotate {}: {e}", path.display());
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

fn generation(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Shift `log.1..log.3` up one generation and move the live log to `.1`
/// when it is over [`MAX_LOG_BYTES`]. Returns true if a rotation happened.
pub fn rotate_if_needed(path: &Path) -> std::io::Result<bool> {
    let Ok(meta) = fs::metadata(path) else {
        return Ok(false);
    };
    if meta.len() <= MAX_LOG_BYTES {
        return Ok(false);
    }
    for n in (1..LOG_GENERATIONS).rev() {
        let older = generation(path, n);
        if older.exists() {
            fs::rename(&older, generation(path, n + 1))?;
        }
    }
    fs::rename(path, generation(path, 1))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn big_log(path: &Path, marker: &str) {
        let mut data = marker.as_bytes().to_vec();
        data.resize(MAX_LOG_BYTES as usize + 1, b'x');
        fs::write(path, data).unwrap();
    }

    fn head(path: &Path) -> String {
        fs::read_to_string(path).unwrap().chars().take(4).collect()
    }

    #[test]
    fn small_log_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("ManagedSoftwareUpdate.log");
        fs::write(&log, "short").unwrap();
        assert!(!rotate_if_needed(&log).unwrap());
        assert!(!rotate_if_needed(&dir.path().join("missing.log")).unwrap());
        assert!(!generation(&log, 1).exists());
    }

    #[test]
    fn rotation_keeps_four_generations() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("ManagedSoftwareUpdate.log");
        for run in ["run1", "run2", "run3", "run4", "run5"] {
            big_log(&log, run);
            assert!(rotate_if_needed(&log).unwrap());
        }
        assert!(!log.exists());
        assert_eq!(head(&generation(&log, 1)), "run5");
        assert_eq!(head(&generation(&log, 4)), "run2");
        assert!(!generation(&log, 5).exists());
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_for(0), Level::ERROR);
        assert_eq!(level_for(1), Level::INFO);
        assert_eq!(level_for(2), Level::DEBUG);
        assert_eq!(level_for(9), Level::TRACE);
    }
}
