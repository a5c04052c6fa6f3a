//! Per-request session directories
//!
//! Every `/separate` request gets a session: a UUID plus two directories,
//! `<work>/uploads/<id>` for the incoming file and `<work>/outputs/<id>` for
//! separator output and the archive. A [`Session`] removes both directories
//! when cleaned up explicitly or when dropped, so every early return leaves
//! nothing behind.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

const UPLOADS_DIR: &str = "uploads";
const OUTPUTS_DIR: &str = "outputs";

/// Owns the session roots under the work directory
#[derive(Debug, Clone)]
pub struct SessionManager {
    uploads_root: PathBuf,
    outputs_root: PathBuf,
}

impl SessionManager {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            uploads_root: work_dir.join(UPLOADS_DIR),
            outputs_root: work_dir.join(OUTPUTS_DIR),
        }
    }

    /// Create the session roots if missing
    pub async fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.uploads_root).await?;
        fs::create_dir_all(&self.outputs_root).await?;
        Ok(())
    }

    pub fn uploads_root(&self) -> &Path {
        &self.uploads_root
    }

    pub fn outputs_root(&self) -> &Path {
        &self.outputs_root
    }

    /// Create a new session with fresh upload and output directories
    pub async fn create_session(&self) -> io::Result<Session> {
        let id = Uuid::new_v4();
        let session = Session {
            id,
            upload_dir: self.uploads_root.join(id.to_string()),
            output_dir: self.outputs_root.join(id.to_string()),
            cleaned: false,
        };

        // From here on a failure drops `session`, which removes whatever was created
        fs::create_dir_all(&session.upload_dir).await?;
        fs::create_dir_all(&session.output_dir).await?;

        debug!(session_id = %id, "Session directories created");
        Ok(session)
    }

    /// Remove every session directory and recreate empty roots
    ///
    /// Returns the number of distinct sessions removed. Sessions still in
    /// flight lose their directories and fail on their next filesystem access.
    pub async fn purge_all(&self) -> io::Result<usize> {
        let mut ids = std::collections::BTreeSet::new();
        for root in [&self.uploads_root, &self.outputs_root] {
            for name in list_entries(root).await? {
                ids.insert(name);
            }
        }

        for root in [&self.uploads_root, &self.outputs_root] {
            match fs::remove_dir_all(root).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        self.init().await?;

        info!(removed_sessions = ids.len(), "Purged all session directories");
        Ok(ids.len())
    }
}

async fn list_entries(root: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// One request's scratch space
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    upload_dir: PathBuf,
    output_dir: PathBuf,
    cleaned: bool,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Drop the uploaded input once it is no longer needed
    pub async fn release_upload(&self) {
        remove_dir_logged(self.id, &self.upload_dir).await;
    }

    /// Remove both session directories
    pub async fn cleanup(mut self) {
        remove_dir_logged(self.id, &self.upload_dir).await;
        remove_dir_logged(self.id, &self.output_dir).await;
        self.cleaned = true;
        debug!(session_id = %self.id, "Session cleaned up");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        let id = self.id;
        let dirs = [
            std::mem::take(&mut self.upload_dir),
            std::mem::take(&mut self.output_dir),
        ];

        // Often dropped on a runtime worker (response body after the last byte)
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_dirs_blocking(id, &dirs));
            }
            Err(_) => remove_dirs_blocking(id, &dirs),
        }
    }
}

fn remove_dirs_blocking(id: Uuid, dirs: &[PathBuf]) {
    for dir in dirs {
        match std::fs::remove_dir_all(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                session_id = %id,
                path = %dir.display(),
                error = %e,
                "Failed to remove session directory"
            ),
        }
    }
    debug!(session_id = %id, "Session cleaned up on drop");
}

async fn remove_dir_logged(id: Uuid, dir: &Path) {
    match fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            session_id = %id,
            path = %dir.display(),
            error = %e,
            "Failed to remove session directory"
        ),
    }
}
