use anyhow::Result;
use std::path::PathBuf;

const APP_DIR: &str = "nutrition-tour";

/// Per-user application data folder (absolute path)
fn resolve_data_folder() -> Result<PathBuf> {
    // Prefer the platform data dir (XDG / AppData / Library).
    if let Some(dir) = dirs::data_local_dir() {
        return Ok(dir.join(APP_DIR));
    }

    // Fallback: current working directory
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    Ok(cwd.join(APP_DIR))
}

/// Resolve log folder (absolute path), creating it if needed
pub fn resolve_log_folder() -> Result<PathBuf> {
    let log_dir = resolve_data_folder()?.join("logs");
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create log folder: {}", e))?;
    Ok(log_dir)
}

/// Resolve the default folder of the JSON flag store (created lazily on first write)
pub fn resolve_flags_folder() -> Result<PathBuf> {
    Ok(resolve_data_folder()?.join("flags"))
}
