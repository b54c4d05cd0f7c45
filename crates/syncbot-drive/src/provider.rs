//! GoogleDriveProvider - IRemoteDrive implementation for Google Drive v3

use anyhow::Result;
use async_trait::async_trait;
use syncbot_core::ports::IRemoteDrive;
use tracing::debug;

use crate::client::DriveClient;

/// Remote drive backed by [`DriveClient`]
///
/// Folders and files are matched by name within their parent, so running
/// the same upload twice updates the existing file instead of duplicating it.
pub struct GoogleDriveProvider {
    client: DriveClient,
}

impl GoogleDriveProvider {
    pub fn new(client: DriveClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &DriveClient {
        &self.client
    }
}

#[async_trait]
impl IRemoteDrive for GoogleDriveProvider {
    async fn ensure_folder(
        &self,
        access_token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String> {
        if let Some(id) = self.client.find_folder(access_token, name, parent_id).await? {
            debug!(name, id = %id, "Found existing Drive folder");
            return Ok(id);
        }
        Ok(self.client.create_folder(access_token, name, parent_id).await?)
    }

    async fn upload_file(
        &self,
        access_token: &str,
        parent_id: &str,
        name: &str,
        data: Vec<u8>,
    ) -> Result<String> {
        let mime = mime_guess::from_path(name).first_or_octet_stream();
        let mime_type = mime.essence_str();

        let id = match self.client.find_file(access_token, name, parent_id).await? {
            Some(id) => id,
            None => {
                self.client
                    .create_file(access_token, name, parent_id, mime_type)
                    .await?
            }
        };
        self.client
            .update_content(access_token, &id, data, mime_type)
            .await?;

        debug!(name, id = %id, mime_type, "Uploaded file");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_mime_detection() {
        let guess = |name: &str| {
            mime_guess::from_path(name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        };
        assert_eq!(guess("notes.txt"), "text/plain");
        assert_eq!(guess("photo.JPG"), "image/jpeg");
        assert_eq!(guess("data.bin.unknownext"), "application/octet-stream");
    }
}
