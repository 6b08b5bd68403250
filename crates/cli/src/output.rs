//! Where the JSON report goes: a file, or stdout when no path is given.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

pub fn write_json(path: Option<&Path>, value: &serde_json::Value) -> io::Result<()> {
    let mut body = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    body.push(b'\n');
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, &body)?;
            tracing::info!(path = %path.display(), bytes = body.len(), "Report written");
            Ok(())
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&body)?;
            stdout.flush()
        }
    }
}
