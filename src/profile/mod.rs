// src/profile/mod.rs

//! File-backed persona profiles and their persisted identity vectors.
//!
//! One `wiki_<name>.txt` per persona under the profile directory: a title
//! line starting with `# `, a blank line, then the free-form body used for
//! embedding and prompting. One `<name>.vec` per persona under the embed
//! directory, holding the identity vector as little-endian f32.

use std::path::PathBuf;

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

const PROFILE_PREFIX: &str = "wiki_";
const PROFILE_SUFFIX: &str = ".txt";
const VECTOR_SUFFIX: &str = ".vec";
const TITLE_MARKER: &str = "# ";

/// A persona's canonical profile. Read-mostly; a rewrite supersedes the
/// old profile and invalidates its identity vector.
#[derive(Debug, Clone)]
pub struct PersonaProfile {
    pub name: String,
    /// Body after the title block; the text that gets embedded.
    pub body: String,
    pub source: PathBuf,
}

pub struct ProfileRepository {
    profile_dir: PathBuf,
    embed_dir: PathBuf,
}

impl ProfileRepository {
    pub fn new(profile_dir: impl Into<PathBuf>, embed_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile_dir: profile_dir.into(),
            embed_dir: embed_dir.into(),
        }
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.profile_dir
            .join(format!("{PROFILE_PREFIX}{name}{PROFILE_SUFFIX}"))
    }

    fn vector_path(&self, name: &str) -> PathBuf {
        self.embed_dir.join(format!("{name}{VECTOR_SUFFIX}"))
    }

    pub async fn get_profile(&self, name: &str) -> Result<PersonaProfile> {
        let path = self.profile_path(name);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::ProfileNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let body = parse_profile_body(name, &text)?;
        Ok(PersonaProfile {
            name: name.to_string(),
            body,
            source: path,
        })
    }

    /// All valid profiles, in a stable (lexicographic) order. Malformed
    /// entries fail the listing; a corrupt corpus is operator-fixable, not
    /// something to guess around.
    pub async fn list_profiles(&self) -> Result<Vec<PersonaProfile>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.profile_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(stem) = file_name
                .strip_prefix(PROFILE_PREFIX)
                .and_then(|s| s.strip_suffix(PROFILE_SUFFIX))
            {
                names.push(stem.to_string());
            }
        }
        names.sort();

        let mut profiles = Vec::with_capacity(names.len());
        for name in names {
            profiles.push(self.get_profile(&name).await?);
        }
        Ok(profiles)
    }

    /// Profiles that are usable for identity conditioning: those with a
    /// persisted vector. Entries without one are skipped with a diagnostic.
    pub async fn list_conditionable(&self) -> Result<Vec<PersonaProfile>> {
        let mut out = Vec::new();
        for profile in self.list_profiles().await? {
            if fs::try_exists(self.vector_path(&profile.name)).await? {
                out.push(profile);
            } else {
                warn!(persona = %profile.name, "missing identity vector file, skipping");
            }
        }
        Ok(out)
    }

    /// Create or overwrite a profile. Validates the text first and removes
    /// any persisted identity vector; the next resolve recomputes it.
    pub async fn put_profile(&self, name: &str, text: &str) -> Result<()> {
        parse_profile_body(name, text)?;

        fs::create_dir_all(&self.profile_dir).await?;
        fs::write(self.profile_path(name), text).await?;
        debug!(persona = %name, "profile written");

        self.remove_identity_vector(name).await
    }

    /// Delete the persisted identity vector, if present. Used when a
    /// profile rewrite supersedes the vector, or when a superseded
    /// population must not leave its output on disk.
    pub async fn remove_identity_vector(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.vector_path(name)).await {
            Ok(()) => debug!(persona = %name, "stale identity vector removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Load the persisted identity vector, if any.
    pub async fn load_identity_vector(&self, name: &str) -> Result<Option<Vec<f32>>> {
        let bytes = match fs::read(self.vector_path(name)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if bytes.len() % 4 != 0 {
            return Err(EngineError::IdentityResolution {
                persona: name.to_string(),
                reason: format!("corrupt vector file: {} bytes", bytes.len()),
            });
        }

        let vector = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Some(vector))
    }

    /// Persist an identity vector. Idempotent: rewriting the same vector
    /// is a no-op as far as readers are concerned.
    pub async fn store_identity_vector(&self, name: &str, vector: &[f32]) -> Result<()> {
        fs::create_dir_all(&self.embed_dir).await?;
        let mut bytes = Vec::with_capacity(vector.len() * 4);
        for v in vector {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        fs::write(self.vector_path(name), bytes).await?;
        debug!(persona = %name, dims = vector.len(), "identity vector persisted");
        Ok(())
    }
}

/// Validate a profile and extract its body: the title block must start
/// with `# `, and something non-empty must follow the first blank line.
fn parse_profile_body(name: &str, text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(EngineError::InvalidProfileFormat {
            name: name.to_string(),
            reason: "empty profile".into(),
        });
    }

    let (title, body) = match text.split_once("\n\n") {
        Some((title, body)) => (title, body.trim()),
        None => (text, ""),
    };

    if !title.starts_with(TITLE_MARKER) {
        return Err(EngineError::InvalidProfileFormat {
            name: name.to_string(),
            reason: format!("first line must start with '{TITLE_MARKER}'"),
        });
    }
    if body.is_empty() {
        return Err(EngineError::InvalidProfileFormat {
            name: name.to_string(),
            reason: "no body after title".into(),
        });
    }

    Ok(body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn repo(dir: &tempfile::TempDir) -> ProfileRepository {
        ProfileRepository::new(dir.path().join("profiles"), dir.path().join("embed"))
    }

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let dir = tempdir().unwrap();
        let repo = repo(&dir);

        repo.put_profile("Socrates", "# Socrates\n\nAthenian philosopher.")
            .await
            .unwrap();

        let profile = repo.get_profile("Socrates").await.unwrap();
        assert_eq!(profile.name, "Socrates");
        assert_eq!(profile.body, "Athenian philosopher.");
    }

    #[tokio::test]
    async fn missing_profile_is_not_found() {
        let dir = tempdir().unwrap();
        let repo = repo(&dir);
        // Directory exists but holds nothing
        tokio::fs::create_dir_all(dir.path().join("profiles"))
            .await
            .unwrap();

        match repo.get_profile("Nobody").await {
            Err(EngineError::ProfileNotFound(name)) => assert_eq!(name, "Nobody"),
            other => panic!("expected ProfileNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_title_marker_is_invalid() {
        let dir = tempdir().unwrap();
        let repo = repo(&dir);

        let err = repo
            .put_profile("Bad", "no title here\n\nbody")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidProfileFormat { .. }));
    }

    #[tokio::test]
    async fn empty_body_is_invalid() {
        let dir = tempdir().unwrap();
        let repo = repo(&dir);

        let err = repo.put_profile("Bad", "# Title only").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidProfileFormat { .. }));
    }

    #[tokio::test]
    async fn put_profile_removes_stale_vector() {
        let dir = tempdir().unwrap();
        let repo = repo(&dir);

        repo.put_profile("Ada", "# Ada\n\nMathematician.").await.unwrap();
        repo.store_identity_vector("Ada", &[1.0, 2.0]).await.unwrap();
        assert!(repo.load_identity_vector("Ada").await.unwrap().is_some());

        repo.put_profile("Ada", "# Ada\n\nAnalyst and mathematician.")
            .await
            .unwrap();
        assert!(repo.load_identity_vector("Ada").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn vector_roundtrip_preserves_values() {
        let dir = tempdir().unwrap();
        let repo = repo(&dir);

        let v = vec![0.25f32, -1.5, 3.75];
        repo.store_identity_vector("Ada", &v).await.unwrap();
        let loaded = repo.load_identity_vector("Ada").await.unwrap().unwrap();
        assert_eq!(loaded, v);
    }

    #[tokio::test]
    async fn listing_is_sorted_and_conditionable_skips_vectorless() {
        let dir = tempdir().unwrap();
        let repo = repo(&dir);

        repo.put_profile("Beethoven", "# Beethoven\n\nComposer.")
            .await
            .unwrap();
        repo.put_profile("Ada", "# Ada\n\nMathematician.").await.unwrap();
        repo.store_identity_vector("Ada", &[0.1, 0.2]).await.unwrap();

        let all = repo.list_profiles().await.unwrap();
        let names: Vec<_> = all.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Ada", "Beethoven"]);

        let usable = repo.list_conditionable().await.unwrap();
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0].name, "Ada");
    }
}
