use super::{RemoteFolder, RemoteStore};
use crate::config::AccessPolicy;
use crate::error::StoreError;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFolder {
    pub id: String,
    pub name: String,
    pub trashed: bool,
    pub permissions: Vec<AccessPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub parent_id: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// How many times each operation was invoked, failed calls included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub find_folders: usize,
    pub create_folder: usize,
    pub set_permission: usize,
    pub create_file: usize,
}

impl StoreCalls {
    pub fn total(&self) -> usize {
        self.find_folders + self.create_folder + self.set_permission + self.create_file
    }
}

#[derive(Debug, Default)]
enum UploadFailure {
    #[default]
    Never,
    Always,
    /// 0-based ordinals of `create_file` calls that fail.
    AtCalls(BTreeSet<usize>),
}

/// In-process store. Backs `--dry-run` and doubles as the test fake, with
/// call counting and failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    folders: Mutex<Vec<StoredFolder>>,
    files: Mutex<Vec<StoredFile>>,
    next_id: AtomicUsize,
    find_calls: AtomicUsize,
    create_folder_calls: AtomicUsize,
    permission_calls: AtomicUsize,
    create_file_calls: AtomicUsize,
    unreachable: bool,
    fail_permissions: bool,
    upload_failure: UploadFailure,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an existing folder and returns the store.
    pub fn with_folder(self, name: &str) -> Self {
        self.seed_folder(name, false);
        self
    }

    pub fn with_trashed_folder(self, name: &str) -> Self {
        self.seed_folder(name, true);
        self
    }

    /// Every operation fails as if the network were down.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn failing_permissions(mut self) -> Self {
        self.fail_permissions = true;
        self
    }

    pub fn failing_all_uploads(mut self) -> Self {
        self.upload_failure = UploadFailure::Always;
        self
    }

    pub fn failing_upload_at(mut self, ordinal: usize) -> Self {
        match &mut self.upload_failure {
            UploadFailure::AtCalls(set) => {
                set.insert(ordinal);
            }
            other => *other = UploadFailure::AtCalls(BTreeSet::from([ordinal])),
        }
        self
    }

    pub fn calls(&self) -> StoreCalls {
        StoreCalls {
            find_folders: self.find_calls.load(Ordering::Relaxed),
            create_folder: self.create_folder_calls.load(Ordering::Relaxed),
            set_permission: self.permission_calls.load(Ordering::Relaxed),
            create_file: self.create_file_calls.load(Ordering::Relaxed),
        }
    }

    pub fn folders(&self) -> Vec<StoredFolder> {
        self.folders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn files(&self) -> Vec<StoredFile> {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn seed_folder(&self, name: &str, trashed: bool) {
        let id = self.allocate_id("folder");
        self.folders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(StoredFolder {
                id,
                name: name.to_string(),
                trashed,
                permissions: Vec::new(),
            });
    }

    fn allocate_id(&self, kind: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("mem-{kind}-{n}")
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable {
            return Err(StoreError::Unreachable(
                "memory store configured as unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

impl RemoteStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    fn find_folders(&self, name: &str) -> Result<Vec<RemoteFolder>, StoreError> {
        self.find_calls.fetch_add(1, Ordering::Relaxed);
        self.check_reachable()?;
        Ok(self
            .folders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|f| !f.trashed && f.name == name)
            .map(|f| RemoteFolder {
                id: f.id.clone(),
                name: f.name.clone(),
            })
            .collect())
    }

    fn create_folder(&self, name: &str) -> Result<String, StoreError> {
        self.create_folder_calls.fetch_add(1, Ordering::Relaxed);
        self.check_reachable()?;
        let id = self.allocate_id("folder");
        self.folders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(StoredFolder {
                id: id.clone(),
                name: name.to_string(),
                trashed: false,
                permissions: Vec::new(),
            });
        Ok(id)
    }

    fn set_permission(&self, id: &str, policy: &AccessPolicy) -> Result<(), StoreError> {
        self.permission_calls.fetch_add(1, Ordering::Relaxed);
        self.check_reachable()?;
        if self.fail_permissions {
            return Err(StoreError::Rejected {
                status: 403,
                message: "insufficient permissions".to_string(),
            });
        }
        let mut folders = self
            .folders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let folder = folders
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| StoreError::Rejected {
                status: 404,
                message: format!("folder {id} not found"),
            })?;
        folder.permissions.push(policy.clone());
        Ok(())
    }

    fn create_file(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<String, StoreError> {
        let ordinal = self.create_file_calls.fetch_add(1, Ordering::Relaxed);
        self.check_reachable()?;
        let injected = match &self.upload_failure {
            UploadFailure::Never => false,
            UploadFailure::Always => true,
            UploadFailure::AtCalls(set) => set.contains(&ordinal),
        };
        if injected {
            return Err(StoreError::Rejected {
                status: 500,
                message: format!("upload of {name} refused"),
            });
        }
        let parent_known = self
            .folders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .any(|f| f.id == parent_id && !f.trashed);
        if !parent_known {
            return Err(StoreError::Rejected {
                status: 404,
                message: format!("parent folder {parent_id} not found"),
            });
        }
        let id = self.allocate_id("file");
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(StoredFile {
                id: id.clone(),
                name: name.to_string(),
                parent_id: parent_id.to_string(),
                mime_type: mime_type.to_string(),
                bytes: bytes.to_vec(),
            });
        Ok(id)
    }
}
