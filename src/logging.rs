use flexi_logger::{opt_format, Cleanup, Criterion, FileSpec, Logger, Naming};

use crate::{ChessRlError, Result};

/// Start the logger: stderr plus a rotating file under the run directory.
/// Level comes from `RUST_LOG`, defaulting to "info".
pub fn setup_logging(log_dir: &str) -> Result<()> {
    Logger::try_with_env_or_str("info")
        .map_err(|e| ChessRlError::Config(format!("bad RUST_LOG filter: {}", e)))?
        .log_to_file(FileSpec::default().directory(log_dir))
        .duplicate_to_stderr(flexi_logger::Duplicate::Info)
        .format(opt_format)
        .rotate(
            Criterion::Size(10 * 1024 * 1024),
            Naming::Numbers,
            Cleanup::KeepLogFiles(3),
        )
        .start()
        .map_err(|e| ChessRlError::Config(format!("logger start failed: {}", e)))?;
    Ok(())
}
