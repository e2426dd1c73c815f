use crate::auth::Credential;
use crate::common::EngineError;
use crate::environment::DeploymentRing;
use crate::storage::{CacheFiles, ProtectedStorage};
use std::sync::Arc;

/// Last-used deployment ring and credential.
///
/// The ring is kept as plain text, the credential as a protected blob. Both
/// are overwritten after every successful acquisition.
#[derive(Clone)]
pub struct RecentState {
    storage: Arc<dyn ProtectedStorage>,
    files: CacheFiles,
}

impl RecentState {
    pub fn new(storage: Arc<dyn ProtectedStorage>, files: CacheFiles) -> Self {
        Self { storage, files }
    }

    /// The last ring recorded, if any. An unreadable value is ignored.
    pub fn load_ring(&self) -> Result<Option<DeploymentRing>, EngineError> {
        let Some(text) = self.storage.read_plain(&self.files.recent_env())? else {
            return Ok(None);
        };

        match text.trim().parse() {
            Ok(ring) => Ok(Some(ring)),
            Err(e) => {
                log::warn!("Ignoring recent environment file: {e}");
                Ok(None)
            }
        }
    }

    pub fn save_ring(&self, ring: DeploymentRing) -> Result<(), EngineError> {
        self.storage
            .write_plain(&self.files.recent_env(), ring.as_str())
    }

    pub fn load_credential(&self) -> Result<Option<Credential>, EngineError> {
        self.storage
            .read_text(&self.files.recent_token())?
            .map(|blob| Credential::from_blob(&blob))
            .transpose()
    }

    pub fn save_credential(&self, credential: &Credential) -> Result<(), EngineError> {
        self.storage
            .write_text(&self.files.recent_token(), &credential.to_blob()?)
    }
}
