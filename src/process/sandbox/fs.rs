/*!
 * Filesystem Passthrough
 *
 * Writes go to the controller's mirror first, then to the execution
 * context; reads are answered from the mirror. Guest writes only reach
 * the mirror through [`Sandbox::sync`].
 */

use tracing::debug;

use super::Sandbox;
use crate::core::types::TaskId;
use crate::ipc::{pending, FsReply, FsRequest, ToContext};
use crate::process::types::{SandboxError, SandboxResult};
use crate::vfs::{paths, Entry, FsEvent, MemFs, Metadata, VfsSnapshot};

impl Sandbox {
    /// Send one fs request to the context and wait for its reply
    async fn fs_request(&self, make: impl FnOnce(TaskId) -> FsRequest) -> SandboxResult<FsReply> {
        let shared = &self.shared;
        let (id, rx) = shared.fs_tasks.register();
        if let Err(err) = shared.send(ToContext::Fs(make(id))) {
            shared.fs_tasks.cancel(id);
            return Err(err);
        }
        pending::wait(rx).await.map_err(|_| SandboxError::Disposed)
    }

    async fn fs_mutation(&self, make: impl FnOnce(TaskId) -> FsRequest) -> SandboxResult<()> {
        match self.fs_request(make).await? {
            FsReply::Done { .. } => Ok(()),
            FsReply::Failed { error, .. } => Err(error.into()),
            FsReply::Snapshot { .. } => Err(SandboxError::UnexpectedReply("snapshot".into())),
        }
    }

    pub async fn write_file(&self, path: &str, data: impl Into<Vec<u8>>) -> SandboxResult<()> {
        self.shared.ensure_ready()?;
        let data = data.into();
        self.shared.mirror.lock().write_file(path, data.clone())?;
        self.shared.modules.invalidate(&paths::normalize(path));
        debug!(path, len = data.len(), "write_file");
        let path = path.to_string();
        self.fs_mutation(|id| FsRequest::Write { id, path, data }).await
    }

    pub async fn mkdir(&self, path: &str, recursive: bool) -> SandboxResult<()> {
        self.shared.ensure_ready()?;
        {
            let mut mirror = self.shared.mirror.lock();
            if recursive {
                mirror.mkdirp(path)?;
            } else {
                mirror.mkdir(path)?;
            }
        }
        let path = path.to_string();
        self.fs_mutation(|id| FsRequest::Mkdir {
            id,
            path,
            recursive,
        })
        .await
    }

    pub async fn unlink(&self, path: &str) -> SandboxResult<()> {
        self.shared.ensure_ready()?;
        self.shared.mirror.lock().unlink(path)?;
        self.shared.modules.invalidate(&paths::normalize(path));
        let path = path.to_string();
        self.fs_mutation(|id| FsRequest::Unlink { id, path }).await
    }

    pub async fn rename(&self, from: &str, to: &str) -> SandboxResult<()> {
        self.shared.ensure_ready()?;
        self.shared.mirror.lock().rename(from, to)?;
        // A moved directory takes every cached module under it along
        self.shared.modules.clear();
        let (from, to) = (from.to_string(), to.to_string());
        self.fs_mutation(|id| FsRequest::Rename { id, from, to }).await
    }

    pub fn read_file(&self, path: &str) -> SandboxResult<String> {
        self.shared.ensure_ready()?;
        Ok(self.shared.mirror.lock().read_file(path)?)
    }

    pub fn read_file_bytes(&self, path: &str) -> SandboxResult<Vec<u8>> {
        self.shared.ensure_ready()?;
        Ok(self.shared.mirror.lock().read_file_bytes(path)?)
    }

    pub fn readdir(&self, path: &str) -> SandboxResult<Vec<String>> {
        self.shared.ensure_ready()?;
        Ok(self.shared.mirror.lock().readdir(path)?)
    }

    pub fn readdir_entries(&self, path: &str) -> SandboxResult<Vec<Entry>> {
        self.shared.ensure_ready()?;
        Ok(self.shared.mirror.lock().readdir_entries(path)?)
    }

    pub fn stat(&self, path: &str) -> SandboxResult<Metadata> {
        self.shared.ensure_ready()?;
        Ok(self.shared.mirror.lock().stat(path)?)
    }

    pub fn exists(&self, path: &str) -> SandboxResult<bool> {
        self.shared.ensure_ready()?;
        Ok(self.shared.mirror.lock().exists(path))
    }

    /// Change notifications from the context's filesystem
    ///
    /// The stream ends when the sandbox is disposed.
    pub fn watch(&self) -> SandboxResult<flume::Receiver<FsEvent>> {
        self.shared.ensure_ready()?;
        let (_, rx) = self.shared.watchers.subscribe();
        Ok(rx)
    }

    /// Snapshot of the context's filesystem, including guest writes
    pub async fn save(&self) -> SandboxResult<VfsSnapshot> {
        self.shared.ensure_ready()?;
        match self.fs_request(|id| FsRequest::Snapshot { id }).await? {
            FsReply::Snapshot { snapshot, .. } => Ok(snapshot),
            FsReply::Failed { error, .. } => Err(error.into()),
            FsReply::Done { .. } => Err(SandboxError::UnexpectedReply("done".into())),
        }
    }

    /// Overlay a snapshot onto both replicas
    pub async fn restore(&self, snapshot: &VfsSnapshot) -> SandboxResult<()> {
        self.shared.ensure_ready()?;
        self.shared.mirror.lock().restore(snapshot)?;
        self.shared.modules.clear();
        let snapshot = snapshot.clone();
        self.fs_mutation(|id| FsRequest::Restore { id, snapshot }).await
    }

    /// Restore a snapshot with every path placed under `mount_point`
    pub async fn mount(&self, mount_point: &str, snapshot: &VfsSnapshot) -> SandboxResult<()> {
        let base = paths::normalize(mount_point);
        let rebased = VfsSnapshot {
            files: snapshot
                .files
                .iter()
                .map(|(path, data)| (paths::normalize(&format!("{base}/{path}")), data.clone()))
                .collect(),
            encoding: snapshot.encoding.clone(),
        };
        self.restore(&rebased).await
    }

    /// Replace the mirror with the context's current filesystem
    pub async fn sync(&self) -> SandboxResult<()> {
        let snapshot = self.save().await?;
        let fresh = MemFs::from_snapshot(&snapshot)?;
        *self.shared.mirror.lock() = fresh;
        self.shared.modules.clear();
        Ok(())
    }

    /// URL prefix for a port the guest listens on
    pub fn serve_url(&self, port: u16) -> SandboxResult<Option<String>> {
        self.shared.ensure_ready()?;
        let router = &self.shared.router;
        Ok(router
            .is_listening(&self.shared.id, port)
            .then(|| router.url_for(&self.shared.id, port)))
    }
}
