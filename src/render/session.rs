//! Scoped storage for intermediate render output.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A private directory holding every intermediate file of one render run.
///
/// Files are registered as they are handed out and deleted by [`close`] or,
/// if the session is dropped early, by `Drop`. The directory itself goes
/// with them.
///
/// [`close`]: RenderSession::close
pub struct RenderSession {
    dir: Option<TempDir>,
    path: PathBuf,
    files: Vec<PathBuf>,
}

impl RenderSession {
    /// Create a fresh session directory under `root`.
    pub fn open_in(root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix(".render-").tempdir_in(root)?;
        let path = dir.path().to_path_buf();
        tracing::debug!(dir = %path.display(), "Opened render session");
        Ok(Self {
            dir: Some(dir),
            path,
            files: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reserve the output path for the `index`-th render of `html_path`.
    ///
    /// Names are derived from the source file, so two sources with the same
    /// stem stay apart through the index prefix.
    pub fn register(&mut self, index: usize, html_path: &Path) -> PathBuf {
        let stem = html_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "fragment".to_string());
        let file = self.path.join(format!("{}_{}_temp.pdf", index, stem));
        self.files.push(file.clone());
        file
    }

    /// Files handed out so far.
    pub fn registered(&self) -> &[PathBuf] {
        &self.files
    }

    /// Delete every registered file and the session directory.
    pub fn close(mut self) -> io::Result<()> {
        let files_result = remove_all(std::mem::take(&mut self.files));
        let dir_result = match self.dir.take() {
            Some(dir) => dir.close(),
            None => Ok(()),
        };
        files_result.and(dir_result)
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if let Err(e) = remove_all(std::mem::take(&mut self.files)) {
            tracing::warn!(dir = %self.path.display(), error = %e, "Failed to remove render files");
        }
    }
}

fn remove_all(files: Vec<PathBuf>) -> io::Result<()> {
    let mut first_error = None;
    for file in files {
        match std::fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "Failed to remove render file");
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
