//! Remote drive port (driven/secondary port)
//!
//! The minimal folder/file surface a sync engine needs from cloud storage.
//! Identifiers are opaque provider IDs.

use async_trait::async_trait;

#[async_trait]
pub trait IRemoteDrive: Send + Sync {
    /// Finds a folder by name under `parent_id` (or the drive root),
    /// creating it if absent. Returns the folder ID.
    async fn ensure_folder(
        &self,
        access_token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> anyhow::Result<String>;

    /// Uploads `data` as `name` under `parent_id`, replacing the content of
    /// an existing file with the same name. Returns the file ID.
    async fn upload_file(
        &self,
        access_token: &str,
        parent_id: &str,
        name: &str,
        data: Vec<u8>,
    ) -> anyhow::Result<String>;
}
