//! Upstream collaborator interfaces named in §6 as "not implemented by the
//! core, consumed as interfaces": path mapping, recording listing/deletion,
//! resume state, and authentication. The core crate only needs trait
//! objects to call through; the receiver-side implementations live outside
//! this crate. A minimal local-filesystem-backed implementation is provided
//! so the crate is runnable standalone against a plain recordings directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AppError;
use crate::id_codec::ServiceRef;

/// `PathMapper.resolveLocal(receiverPath) -> (localPath, ok)`.
pub trait PathMapper: Send + Sync {
    fn resolve_local(&self, receiver_path: &str) -> Option<PathBuf>;
}

/// Maps receiver paths onto themselves, for deployments where the build
/// engine shares a filesystem with the receiver (the common case named in
/// §1's overview).
pub struct IdentityPathMapper;

impl PathMapper for IdentityPathMapper {
    fn resolve_local(&self, receiver_path: &str) -> Option<PathBuf> {
        let path = PathBuf::from(receiver_path);
        path.exists().then_some(path)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingEntry {
    pub service_ref: String,
    pub name: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct RecordingListing {
    pub movies: Vec<RecordingEntry>,
    pub bookmarks: Vec<RecordingEntry>,
}

/// `RecordingSource.list/delete`.
#[async_trait]
pub trait RecordingSource: Send + Sync {
    async fn list(&self, path: &str) -> Result<RecordingListing, AppError>;
    async fn delete(&self, service_ref: &ServiceRef) -> Result<(), AppError>;
}

/// Lists a plain directory tree as "movies", grounded in nothing more than
/// `std::fs::read_dir` — a stand-in for the real receiver-backed listing
/// collaborator.
pub struct LocalFsRecordingSource {
    pub root: PathBuf,
}

#[async_trait]
impl RecordingSource for LocalFsRecordingSource {
    async fn list(&self, path: &str) -> Result<RecordingListing, AppError> {
        let dir = self.root.join(path.trim_start_matches('/'));
        let mut movies = Vec::new();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| AppError::Internal(format!("failed to list {}: {e}", dir.display())))?;
        for entry in entries.flatten() {
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !meta.is_file() {
                continue;
            }
            let full_path = entry.path();
            movies.push(RecordingEntry {
                service_ref: format!("1:0:1:0:0:0:0:0:0:{}", full_path.display()),
                name: entry.file_name().to_string_lossy().to_string(),
                size_bytes: meta.len(),
            });
        }
        Ok(RecordingListing {
            movies,
            bookmarks: Vec::new(),
        })
    }

    async fn delete(&self, service_ref: &ServiceRef) -> Result<(), AppError> {
        let path = Path::new(service_ref.file_path());
        std::fs::remove_file(path)
            .map_err(|e| AppError::Internal(format!("failed to delete {}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ResumeState {
    pub position_seconds: f64,
}

/// `ResumeStore.get/put(principalID, recordingID, state)`.
#[async_trait]
pub trait ResumeStore: Send + Sync {
    async fn get(&self, principal_id: &str, recording_id: &str) -> Option<ResumeState>;
    async fn put(&self, principal_id: &str, recording_id: &str, state: ResumeState);
}

/// In-memory resume store; real deployments back this with the receiver's
/// own per-user state.
#[derive(Default)]
pub struct InMemoryResumeStore {
    inner: dashmap::DashMap<(String, String), ResumeState>,
}

#[async_trait]
impl ResumeStore for InMemoryResumeStore {
    async fn get(&self, principal_id: &str, recording_id: &str) -> Option<ResumeState> {
        self.inner
            .get(&(principal_id.to_string(), recording_id.to_string()))
            .map(|r| r.clone())
    }

    async fn put(&self, principal_id: &str, recording_id: &str, state: ResumeState) {
        self.inner
            .insert((principal_id.to_string(), recording_id.to_string()), state);
    }
}

#[derive(Debug, Clone)]
pub struct Principal {
    pub id: String,
    pub token: String,
}

/// `Auth.principal(ctx) -> principal|nil`.
pub trait Auth: Send + Sync {
    fn principal(&self, token: Option<&str>) -> Option<Principal>;
}

/// Accepts any non-empty bearer token as a principal of the same name. A
/// stand-in for whatever session/token scheme the receiver actually uses.
pub struct TokenEchoAuth;

impl Auth for TokenEchoAuth {
    fn principal(&self, token: Option<&str>) -> Option<Principal> {
        let token = token?;
        if token.is_empty() {
            return None;
        }
        Some(Principal {
            id: token.to_string(),
            token: token.to_string(),
        })
    }
}
