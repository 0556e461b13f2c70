//! File system utils.

use std::{
    fs::File,
    io::{self, Write},
    path::Path,
};

pub struct FsHandler;

impl FsHandler {
    /// Create a directory (and its parents) if it doesn't exist.
    pub fn create_dir(path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)?;
        tracing::trace!("Ensured directory exists: {}", path.display());
        Ok(())
    }

    /// Replace the content of `path` atomically.
    ///
    /// The content is written to a sibling temporary file, synced, then renamed
    /// over the target, so readers see either the old or the new content and a
    /// crash mid-write never leaves a truncated file behind.
    pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;

        let tmp_path = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));

        let result = (|| {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(contents)?;
            tmp.sync_all()?;
            std::fs::rename(&tmp_path, path)
        })();

        if let Err(err) = result {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err);
        }

        // Persist the rename itself.
        #[cfg(unix)]
        File::open(parent)?.sync_all()?;

        Ok(())
    }
}
