//! Transient code images.
//!
//! A [`CodeArtifact`] is a file holding a QR code for one URI. It only
//! exists while one email that embeds it is being sent: every successful
//! [`ArtifactStore::create`] must be followed by exactly one
//! [`ArtifactStore::delete`], whatever happened in between.
//! `delete` takes the artifact by value, so it can't be deleted twice.

use crate::{
    error::{VerifierError, VerifierResult},
    setups::CodeRenderer,
};
use anyhow::Context as _;
use rand::{rngs::OsRng, RngCore};
use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tokio::{fs, io::AsyncWriteExt};

/// File name prefix of artifacts
pub const ARTIFACT_PREFIX: &str = "email-attest-qr-";
const ARTIFACT_EXTENSION: &str = ".png";

/// Random bytes in an artifact id
const ID_BYTES: usize = 16;

/// A code image on disk. There's exactly one handle per file.
#[derive(Debug, PartialEq, Eq)]
pub struct CodeArtifact {
    id: String,
    path: PathBuf,
}

impl CodeArtifact {
    /// Random hex id, also used as the email content id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Location of the image file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `cid:<id>`, for referencing the image from an HTML body
    pub fn content_id_uri(&self) -> String {
        format!("cid:{}", self.id)
    }
}

/// Creates & removes code images in one directory
#[derive(Clone, Debug)]
pub struct ArtifactStore<R: CodeRenderer> {
    renderer: R,
    dir: PathBuf,
}

impl<R: CodeRenderer> ArtifactStore<R> {
    /// Create a store writing to `dir`
    pub fn new(renderer: R, dir: impl Into<PathBuf>) -> Self {
        Self {
            renderer,
            dir: dir.into(),
        }
    }

    /// Render `uri` as a code image and write it to a fresh file.
    ///
    /// Resolves once the file is completely written.
    pub async fn create(&self, uri: &str) -> VerifierResult<CodeArtifact> {
        let png = self
            .renderer
            .render_png(uri)
            .context("rendering code image")
            .map_err(VerifierError::ArtifactIOFailed)?;

        let id = random_id();
        let path = self
            .dir
            .join(format!("{ARTIFACT_PREFIX}{id}{ARTIFACT_EXTENSION}"));

        // create_new: a colliding name is an error, never an overwrite
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("creating {}", path.display()))
            .map_err(VerifierError::ArtifactIOFailed)?;

        let written = async {
            file.write_all(&png).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            if let Err(remove_err) = fs::remove_file(&path).await {
                tracing::warn!(
                    path = %path.display(),
                    %remove_err,
                    "Failed to remove partially written artifact"
                );
            }

            return Err(VerifierError::ArtifactIOFailed(
                anyhow::Error::new(e).context(format!("writing {}", path.display())),
            ));
        }

        tracing::debug!(%id, path = %path.display(), bytes = png.len(), "Created code artifact");

        Ok(CodeArtifact { id, path })
    }

    /// Remove an artifact's file.
    ///
    /// Callers record a failure here, they never fail a flow because of it.
    pub async fn delete(&self, artifact: CodeArtifact) -> VerifierResult<()> {
        fs::remove_file(&artifact.path)
            .await
            .with_context(|| format!("removing {}", artifact.path.display()))
            .map_err(VerifierError::ArtifactIOFailed)?;

        tracing::debug!(id = %artifact.id, "Deleted code artifact");

        Ok(())
    }

    /// Remove artifact files older than `max_age` that were left behind,
    /// e.g. by a process that was killed mid-flow.
    ///
    /// Files not named like artifacts are left alone.
    /// Returns how many files were removed.
    pub async fn sweep_stale(&self, max_age: Duration) -> VerifierResult<usize> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("listing {}", self.dir.display()))
            .map_err(VerifierError::ArtifactIOFailed)?;

        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("listing {}", self.dir.display()))
            .map_err(VerifierError::ArtifactIOFailed)?
        {
            if !is_artifact_name(&entry.file_name().to_string_lossy()) {
                continue;
            }

            let path = entry.path();
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "Can't read artifact age");
                    continue;
                }
            };

            // Modification times in the future count as brand new
            let age = now.duration_since(modified).unwrap_or_default();
            if age < max_age {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::info!(path = %path.display(), ?age, "Removed stale code artifact");
                    removed += 1;
                }
                // Another flow or sweep got there first
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "Failed to remove stale artifact");
                }
            }
        }

        Ok(removed)
    }
}

fn is_artifact_name(name: &str) -> bool {
    name.strip_prefix(ARTIFACT_PREFIX)
        .and_then(|rest| rest.strip_suffix(ARTIFACT_EXTENSION))
        .map_or(false, |id| {
            id.len() == ID_BYTES * 2 && id.bytes().all(|b| b.is_ascii_hexdigit())
        })
}

fn random_id() -> String {
    let mut bytes = [0u8; ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
