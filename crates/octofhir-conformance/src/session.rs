//! Test-session record shared between checks and between CLI invocations.
//!
//! The session carries everything one check learns that a later check needs:
//! the OAuth state and tokens from a launch, and an index of resource ids
//! seen so far, which lets resources without a patient search (Organization,
//! Practitioner, Provenance, ...) be read back by id.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TestSession {
    pub id: String,
    pub base_url: String,
    #[serde(default)]
    pub patient_ids: Vec<String>,
    #[serde(default)]
    pub encounter_id: Option<String>,
    /// `state` sent with the authorization request
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub requested_scopes: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_expires_in: Option<u64>,
    #[serde(default)]
    pub received_scopes: Option<String>,
    /// resource type -> ids known to exist on the server
    #[serde(default)]
    pub resource_references: BTreeMap<String, BTreeSet<String>>,
}

impl TestSession {
    /// A session with a fresh random id.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), base_url)
    }

    pub fn with_id(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn record_reference(&mut self, resource_type: &str, id: &str) {
        self.resource_references
            .entry(resource_type.to_string())
            .or_default()
            .insert(id.to_string());
    }

    pub fn references(&self, resource_type: &str) -> impl Iterator<Item = &str> {
        self.resource_references
            .get(resource_type)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Add a patient id unless already present.
    pub fn add_patient(&mut self, patient_id: &str) {
        if !self.patient_ids.iter().any(|p| p == patient_id) {
            self.patient_ids.push(patient_id.to_string());
        }
    }
}

/// Persistence for [`TestSession`] records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or overwrite.
    async fn save(&self, session: &TestSession) -> Result<(), SessionError>;

    /// Overwrite an existing session; `NotFound` when it does not exist.
    async fn update(&self, session: &TestSession) -> Result<(), SessionError>;

    async fn load(&self, id: &str) -> Result<TestSession, SessionError>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, TestSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, session: &TestSession) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn update(&self, session: &TestSession) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(SessionError::NotFound(session.id.clone())),
        }
    }

    async fn load(&self, id: &str) -> Result<TestSession, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }
}

/// One pretty-printed JSON document per session: `<dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, id: &str) -> PathBuf {
        // Session names come from the command line; keep them inside `dir`.
        let file: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }

    async fn write(&self, session: &TestSession) -> Result<(), SessionError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_string_pretty(session)?;
        tokio::fs::write(self.path(&session.id), content).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &TestSession) -> Result<(), SessionError> {
        self.write(session).await
    }

    async fn update(&self, session: &TestSession) -> Result<(), SessionError> {
        if !tokio::fs::try_exists(self.path(&session.id)).await? {
            return Err(SessionError::NotFound(session.id.clone()));
        }
        self.write(session).await
    }

    async fn load(&self, id: &str) -> Result<TestSession, SessionError> {
        let path = self.path(id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }
}
