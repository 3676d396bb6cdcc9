//! Comparison persistence: uploaded image pairs and the per-user history.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wipecast_core::{StoreConfig, UploadConfig, WipecastError, WipecastResult};
use wipecast_render::image_loader::parse_image_data_uri;

use crate::identity::User;

/// One saved comparison as listed in a user's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRecord {
    pub id: String,
    pub name: String,
    pub image1_url: String,
    pub image2_url: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ComparisonStore: Send + Sync {
    /// Store one image under the user's prefix and return a durable URL.
    async fn upload_image(&self, user: &User, bytes: Vec<u8>, mime: &str) -> WipecastResult<String>;

    async fn save_comparison_record(
        &self,
        user: &User,
        name: &str,
        image1_url: &str,
        image2_url: &str,
        created_at: DateTime<Utc>,
    ) -> WipecastResult<ComparisonRecord>;

    /// The user's comparisons, newest first.
    async fn list_comparison_records(&self, user: &User) -> WipecastResult<Vec<ComparisonRecord>>;
}

/// Upload both images in parallel, then write the record pointing at them.
///
/// Both data URIs must pass the upload gate before anything is stored.
pub async fn save_comparison(
    store: &dyn ComparisonStore,
    user: &User,
    name: &str,
    image1_data_uri: &str,
    image2_data_uri: &str,
    upload: &UploadConfig,
) -> WipecastResult<ComparisonRecord> {
    let name = name.trim();
    if name.is_empty() {
        return Err(WipecastError::InvalidArgument(
            "comparison name must not be empty".into(),
        ));
    }
    let (mime1, bytes1) = parse_image_data_uri(image1_data_uri, upload.max_image_bytes)?;
    let (mime2, bytes2) = parse_image_data_uri(image2_data_uri, upload.max_image_bytes)?;

    let (url1, url2) = tokio::try_join!(
        store.upload_image(user, bytes1, &mime1),
        store.upload_image(user, bytes2, &mime2),
    )?;

    let record = store
        .save_comparison_record(user, name, &url1, &url2, Utc::now())
        .await?;
    tracing::info!("saved comparison '{}' as {}", record.name, record.id);
    Ok(record)
}

/// File extension for an uploaded image, taken from the MIME subtype.
fn extension_for(mime: &str) -> &str {
    match mime.split('/').nth(1).map(str::trim) {
        Some(ext) if !ext.is_empty() => ext,
        _ => "jpeg",
    }
}

/// Store rooted in a local directory, laid out like the hosted bucket and collection.
///
/// ```text
/// {root}/comparisons/{uid}/{millis}-{random}.{ext}
/// {root}/users/{uid}/comparisons/{id}.json
/// ```
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn images_dir(&self, uid: &str) -> PathBuf {
        self.root.join("comparisons").join(uid)
    }

    fn records_dir(&self, uid: &str) -> PathBuf {
        self.root.join("users").join(uid).join("comparisons")
    }
}

/// Reject identifiers that could escape the user's prefix.
fn check_segment(segment: &str, operation: &str, path: &str) -> WipecastResult<()> {
    let unsafe_segment = segment.is_empty()
        || segment.starts_with('.')
        || segment.contains('/')
        || segment.contains('\\')
        || segment.contains("..");
    if unsafe_segment {
        return Err(WipecastError::permission(operation, path));
    }
    Ok(())
}

#[async_trait]
impl ComparisonStore for LocalStore {
    async fn upload_image(&self, user: &User, bytes: Vec<u8>, mime: &str) -> WipecastResult<String> {
        let prefix = format!("comparisons/{}/", user.uid);
        check_segment(&user.uid, "create", &prefix)?;
        let ext = extension_for(mime);
        check_segment(ext, "create", &prefix)?;

        let dir = self.images_dir(&user.uid);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| WipecastError::from_store_io(e, "create", &prefix))?;

        let file_name = format!(
            "{}-{}.{}",
            Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4().simple(),
            ext
        );
        let path = dir.join(&file_name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| WipecastError::from_store_io(e, "create", format!("{}{}", prefix, file_name)))?;

        let absolute = std::path::absolute(&path)?;
        tracing::debug!("uploaded {} bytes to {}", bytes.len(), absolute.display());
        Ok(format!("file://{}", absolute.display()))
    }

    async fn save_comparison_record(
        &self,
        user: &User,
        name: &str,
        image1_url: &str,
        image2_url: &str,
        created_at: DateTime<Utc>,
    ) -> WipecastResult<ComparisonRecord> {
        let collection = format!("users/{}/comparisons", user.uid);
        check_segment(&user.uid, "create", &collection)?;

        let record = ComparisonRecord {
            id: uuid::Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            image1_url: image1_url.to_string(),
            image2_url: image2_url.to_string(),
            created_at,
        };

        let dir = self.records_dir(&user.uid);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| WipecastError::from_store_io(e, "create", &collection))?;
        let json = serde_json::to_vec_pretty(&record)?;
        tokio::fs::write(dir.join(format!("{}.json", record.id)), json)
            .await
            .map_err(|e| WipecastError::from_store_io(e, "create", &collection))?;
        Ok(record)
    }

    async fn list_comparison_records(&self, user: &User) -> WipecastResult<Vec<ComparisonRecord>> {
        let collection = format!("users/{}/comparisons", user.uid);
        check_segment(&user.uid, "list", &collection)?;

        let dir = self.records_dir(&user.uid);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WipecastError::from_store_io(e, "list", &collection)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WipecastError::from_store_io(e, "list", &collection))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| WipecastError::from_store_io(e, "get", &collection))?;
            match serde_json::from_slice::<ComparisonRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("skipping unreadable record {}: {}", path.display(), e),
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }
}
