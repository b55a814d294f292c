pub mod message_db;

pub use message_db::MessageStore;

use std::fs;
use std::path::Path;

/// Ensure the directory holding `db_path` exists
pub fn ensure_data_dir<P: AsRef<Path>>(db_path: P) -> std::io::Result<()> {
    if let Some(parent) = db_path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
