//! The remote storage collaborator. The pipeline only needs the four
//! operations below; transports live in the submodules.

use crate::config::AccessPolicy;
use crate::error::StoreError;
use serde::{Deserialize, Serialize};

#[cfg(feature = "drive")]
mod drive;
mod memory;

#[cfg(feature = "drive")]
pub use drive::{DriveStore, read_access_token};
pub use memory::{MemoryStore, StoreCalls, StoredFile, StoredFolder};

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
pub const PDF_MIME_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFolder {
    pub id: String,
    pub name: String,
}

/// Blocking client for a folder-based remote store.
pub trait RemoteStore {
    /// Short label used in logs.
    fn backend_tag(&self) -> &'static str;

    /// Non-trashed folders whose name equals `name` exactly.
    fn find_folders(&self, name: &str) -> Result<Vec<RemoteFolder>, StoreError>;

    fn create_folder(&self, name: &str) -> Result<String, StoreError>;

    fn set_permission(&self, id: &str, policy: &AccessPolicy) -> Result<(), StoreError>;

    /// Uploads one file under `parent_id` and returns its id.
    fn create_file(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<String, StoreError>;
}
