use crate::config::AccessPolicy;
use crate::error::BatchError;
use crate::store::RemoteStore;
use serde::Serialize;
use tracing::{debug, info, warn};

/// The destination folder for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderReference {
    pub name: String,
    pub id: String,
    /// True when this resolution created the folder.
    pub created: bool,
}

/// Find-or-create for destination folders. Two resolvers racing on a
/// missing folder can both create one; a batch resolves exactly once.
pub struct FolderResolver<'a> {
    store: &'a dyn RemoteStore,
    policy: AccessPolicy,
}

impl<'a> FolderResolver<'a> {
    pub fn new(store: &'a dyn RemoteStore) -> Self {
        Self {
            store,
            policy: AccessPolicy::None,
        }
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn resolve(&self, name: &str) -> Result<FolderReference, BatchError> {
        if name.trim().is_empty() {
            return Err(BatchError::configuration("folder name must not be blank"));
        }

        let existing = self.store.find_folders(name)?;
        let folder = match existing.into_iter().next() {
            Some(found) => {
                debug!(folder = name, id = %found.id, "found existing folder");
                FolderReference {
                    name: name.to_string(),
                    id: found.id,
                    created: false,
                }
            }
            None => {
                let id = self.store.create_folder(name)?;
                info!(folder = name, %id, backend = self.store.backend_tag(), "created folder");
                FolderReference {
                    name: name.to_string(),
                    id,
                    created: true,
                }
            }
        };

        self.apply_policy(&folder);
        Ok(folder)
    }

    fn apply_policy(&self, folder: &FolderReference) {
        if self.policy == AccessPolicy::None {
            return;
        }
        match self.store.set_permission(&folder.id, &self.policy) {
            Ok(()) => debug!(id = %folder.id, policy = ?self.policy, "folder permission set"),
            Err(err) => warn!(
                id = %folder.id,
                policy = ?self.policy,
                error = %err,
                "could not set folder permission; continuing"
            ),
        }
    }
}
