//! # ArtifactPublisher: places rendered artifacts into numbered slots.
//!
//! Readers of the slot directory must never observe a partially written file.
//! Every publish goes through a temporary file in the slot directory itself
//! and is renamed over the final name, so a reader sees either the previous
//! artifact or the new one.
//!
//! ```text
//! temp/render-XXXX.gif ──copy──► gifs/.slot-XXXX.part ──chmod 0644──► rename ──► gifs/slot3.gif
//! ```
//!
//! ## Rules
//! - Slot files are named `slot{n}.{ext}`
//! - `clear` on an absent slot is success
//! - Partial files left by a crash are removed by [`ArtifactPublisher::sweep_partials`]

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::PublishError;

const PARTIAL_PREFIX: &str = ".slot-";
const PARTIAL_SUFFIX: &str = ".part";

/// Atomic writer for the slot directory.
#[derive(Clone, Debug)]
pub struct ArtifactPublisher {
    dir: PathBuf,
    ext: String,
}

impl ArtifactPublisher {
    /// Creates a publisher writing `slot{n}.{ext}` files into `dir`.
    pub fn new(dir: impl Into<PathBuf>, ext: impl Into<String>) -> Self {
        let ext: String = ext.into();
        Self {
            dir: dir.into(),
            ext: ext.trim_start_matches('.').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path of a slot's artifact.
    pub fn slot_path(&self, slot: u32) -> PathBuf {
        self.dir.join(format!("slot{slot}.{}", self.ext))
    }

    /// MIME type served for slot artifacts.
    pub fn content_type(&self) -> &'static str {
        match self.ext.to_ascii_lowercase().as_str() {
            "gif" => "image/gif",
            "png" => "image/png",
            "webp" => "image/webp",
            "jpg" | "jpeg" => "image/jpeg",
            _ => "application/octet-stream",
        }
    }

    /// Atomically replaces the slot's artifact with a copy of `artifact`.
    pub async fn publish(&self, artifact: &Path, slot: u32) -> Result<PathBuf, PublishError> {
        let src = artifact.to_path_buf();
        let dir = self.dir.clone();
        let dest = self.slot_path(slot);

        let placed = {
            let dest = dest.clone();
            tokio::task::spawn_blocking(move || place(&src, &dir, &dest)).await
        };
        match placed {
            Ok(Ok(())) => Ok(dest),
            Ok(Err(source)) => Err(PublishError::Write { slot, source }),
            Err(join) => Err(PublishError::Write {
                slot,
                source: io::Error::other(join),
            }),
        }
    }

    /// Removes the slot's artifact. Absent is not an error.
    pub async fn clear(&self, slot: u32) -> Result<(), PublishError> {
        match tokio::fs::remove_file(self.slot_path(slot)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PublishError::Clear { slot, source }),
        }
    }

    /// Reads a slot's artifact, `None` when the slot is empty.
    pub async fn read(&self, slot: u32) -> Result<Option<Vec<u8>>, PublishError> {
        match tokio::fs::read(self.slot_path(slot)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PublishError::Read { slot, source }),
        }
    }

    /// Slot numbers that currently have an artifact, ascending.
    pub async fn existing_slots(&self) -> Result<Vec<u32>, PublishError> {
        let mut slots = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(slots),
            Err(source) => return Err(self.list_error(source)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| self.list_error(source))?
        {
            if let Some(slot) = entry.file_name().to_str().and_then(|n| self.parse_slot(n)) {
                slots.push(slot);
            }
        }
        slots.sort_unstable();
        Ok(slots)
    }

    /// Removes temporary files left in the slot directory by an interrupted publish.
    ///
    /// Returns the number of files removed.
    pub async fn sweep_partials(&self) -> Result<usize, PublishError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(source) => return Err(self.list_error(source)),
        };
        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| self.list_error(source))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(PARTIAL_PREFIX) && name.ends_with(PARTIAL_SUFFIX) {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => {
                        debug!(file = name, "removed partial slot file");
                        removed += 1;
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(source) => return Err(self.list_error(source)),
                }
            }
        }
        Ok(removed)
    }

    fn parse_slot(&self, file_name: &str) -> Option<u32> {
        let stem = file_name
            .strip_prefix("slot")?
            .strip_suffix(self.ext.as_str())?
            .strip_suffix('.')?;
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok()
    }

    fn list_error(&self, source: io::Error) -> PublishError {
        PublishError::List {
            path: self.dir.clone(),
            source,
        }
    }
}

fn place(src: &Path, dir: &Path, dest: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .suffix(PARTIAL_SUFFIX)
        .tempfile_in(dir)?;

    let mut input = std::fs::File::open(src)?;
    io::copy(&mut input, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn artifact(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, bytes).unwrap();
        p
    }

    #[tokio::test]
    async fn publish_replaces_slot_contents() {
        let work = tempdir().unwrap();
        let slots = work.path().join("gifs");
        let publisher = ArtifactPublisher::new(&slots, "gif");

        let first = artifact(work.path(), "one.gif", b"first");
        let dest = publisher.publish(&first, 3).await.unwrap();
        assert_eq!(dest, slots.join("slot3.gif"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"first");

        let second = artifact(work.path(), "two.gif", b"second");
        publisher.publish(&second, 3).await.unwrap();
        assert_eq!(publisher.read(3).await.unwrap().as_deref(), Some(&b"second"[..]));

        // Source stays where the renderer left it.
        assert!(second.exists());
        assert_eq!(publisher.sweep_partials().await.unwrap(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn published_artifact_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let work = tempdir().unwrap();
        let publisher = ArtifactPublisher::new(work.path(), "gif");
        let src = artifact(work.path(), "a.gif", b"x");
        let dest = publisher.publish(&src, 0).await.unwrap();
        let mode = std::fs::metadata(dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let work = tempdir().unwrap();
        let publisher = ArtifactPublisher::new(work.path(), "gif");
        let src = artifact(work.path(), "a.gif", b"x");
        publisher.publish(&src, 1).await.unwrap();

        publisher.clear(1).await.unwrap();
        assert!(!publisher.slot_path(1).exists());
        publisher.clear(1).await.unwrap();
        assert_eq!(publisher.read(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn lists_only_slot_files() {
        let work = tempdir().unwrap();
        let dir = work.path();
        let names = [
            "slot0.gif",
            "slot12.gif",
            "slot2.gif",
            "slot.gif",
            "slotx.gif",
            "slot3.png",
            "other.gif",
        ];
        for name in names {
            std::fs::write(dir.join(name), b"x").unwrap();
        }
        let publisher = ArtifactPublisher::new(dir, ".gif");
        assert_eq!(publisher.existing_slots().await.unwrap(), vec![0, 2, 12]);

        let missing = ArtifactPublisher::new(dir.join("nope"), "gif");
        assert!(missing.existing_slots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweeps_partial_files() {
        let work = tempdir().unwrap();
        let dir = work.path();
        std::fs::write(dir.join(".slot-abc123.part"), b"half").unwrap();
        std::fs::write(dir.join("slot0.gif"), b"whole").unwrap();

        let publisher = ArtifactPublisher::new(dir, "gif");
        assert_eq!(publisher.sweep_partials().await.unwrap(), 1);
        assert!(!dir.join(".slot-abc123.part").exists());
        assert!(dir.join("slot0.gif").exists());
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(ArtifactPublisher::new("d", "gif").content_type(), "image/gif");
        assert_eq!(ArtifactPublisher::new("d", "WEBP").content_type(), "image/webp");
        assert_eq!(
            ArtifactPublisher::new("d", "bin").content_type(),
            "application/octet-stream"
        );
    }
}
