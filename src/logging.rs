// Logging goes to a daily rolling file: the terminal is in raw mode while
// spinning, so nothing may write to it except the player itself.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Keep the returned guard alive for the life of the process or buffered
/// lines are lost on exit.
pub fn init_logging(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    // Daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(log_dir, "deck.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let default_filter = if verbose { "info,deck=debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = tracing_subscriber::fmt()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_env_filter(filter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(guard)
}

/// Audio backends print straight to fd 2 and would scribble over the status
/// line. Stderr points at /dev/null until this is dropped.
pub struct StderrRedirect {
    saved: libc::c_int,
}

pub fn redirect_stderr_to_null() -> Result<StderrRedirect> {
    unsafe {
        let null_fd = libc::open(
            b"/dev/null\0".as_ptr() as *const libc::c_char,
            libc::O_WRONLY,
        );
        if null_fd == -1 {
            return Err(anyhow!("Failed to open /dev/null"));
        }

        // Duplicate stderr to save original
        let saved = libc::dup(libc::STDERR_FILENO);
        if saved == -1 {
            libc::close(null_fd);
            return Err(anyhow!("Failed to backup stderr"));
        }

        if libc::dup2(null_fd, libc::STDERR_FILENO) == -1 {
            libc::close(null_fd);
            libc::close(saved);
            return Err(anyhow!("Failed to redirect stderr"));
        }

        libc::close(null_fd);
        Ok(StderrRedirect { saved })
    }
}

impl Drop for StderrRedirect {
    fn drop(&mut self) {
        unsafe {
            libc::dup2(self.saved, libc::STDERR_FILENO);
            libc::close(self.saved);
        }
    }
}
