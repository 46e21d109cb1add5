use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::assets::AssetIndex;
use crate::error::PipelineError;

pub const PRODUCT_IMG_FOLDER: &str = "产品图";
pub const SCENE_IMG_FOLDER: &str = "场景图";

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const SHEETS_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

static SPREADSHEET_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/spreadsheets/d/([a-zA-Z0-9-_]+)").unwrap());
static BARE_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9-_]+$").unwrap());

/// Pull the spreadsheet id out of a share URL, or accept a bare id.
pub fn extract_spreadsheet_id(input: &str) -> Option<String> {
    if let Some(caps) = SPREADSHEET_ID_RE.captures(input) {
        return Some(caps[1].to_string());
    }
    BARE_ID_RE.is_match(input).then(|| input.to_string())
}

/// Bounded retry applied to every remote call: transient statuses and
/// transport errors back off exponentially, everything else fails fast.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_backoff: Duration::from_secs(2) }
    }
}

impl RetryPolicy {
    pub fn is_retryable(status: StatusCode) -> bool {
        matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt)
    }
}

async fn send_with_retry(
    request: reqwest::RequestBuilder,
    retry: &RetryPolicy,
) -> Result<reqwest::Response, PipelineError> {
    let mut attempt = 0;
    loop {
        let cloned = request
            .try_clone()
            .ok_or_else(|| PipelineError::Remote("request is not retryable".to_string()))?;
        match cloned.send().await {
            Ok(resp) if resp.status().is_success() => return Ok(resp),
            Ok(resp) if RetryPolicy::is_retryable(resp.status()) => {
                if attempt + 1 >= retry.max_attempts {
                    return Err(PipelineError::Remote(format!(
                        "gave up after {} attempts, last status {}",
                        retry.max_attempts,
                        resp.status()
                    )));
                }
                warn!(
                    "remote call returned {} (attempt {}/{}), backing off",
                    resp.status(),
                    attempt + 1,
                    retry.max_attempts
                );
            }
            Ok(resp) => {
                return Err(PipelineError::Remote(format!("remote returned {}", resp.status())))
            }
            Err(e) if attempt + 1 < retry.max_attempts => {
                warn!("network error (attempt {}/{}): {e}", attempt + 1, retry.max_attempts);
            }
            Err(e) => return Err(PipelineError::Remote(e.to_string())),
        }
        tokio::time::sleep(retry.backoff(attempt)).await;
        attempt += 1;
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
}

/// The only things the matching core needs from a cloud drive: find a folder
/// by name and enumerate everything inside it.
#[async_trait]
pub trait FolderSource: Send + Sync {
    async fn find_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<String>, PipelineError>;

    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, PipelineError>;
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

pub struct DriveClient {
    http: reqwest::Client,
    token: String,
    retry: RetryPolicy,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), token: token.into(), retry: RetryPolicy::default() }
    }

    async fn list_page(&self, query: &[(&str, &str)]) -> Result<FileList, PipelineError> {
        let request = self.http.get(DRIVE_FILES_URL).bearer_auth(&self.token).query(query);
        let resp = send_with_retry(request, &self.retry).await?;
        resp.json().await.map_err(|e| PipelineError::Remote(e.to_string()))
    }
}

#[async_trait]
impl FolderSource for DriveClient {
    async fn find_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<String>, PipelineError> {
        let mut q = format!("mimeType='{FOLDER_MIME}' and name='{name}'");
        if let Some(parent) = parent_id {
            q.push_str(&format!(" and '{parent}' in parents"));
        }
        let page = self.list_page(&[("q", q.as_str()), ("fields", "files(id, name)")]).await?;
        Ok(page.files.into_iter().next().map(|f| f.id))
    }

    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, PipelineError> {
        let q = format!("'{folder_id}' in parents");
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![
                ("q", q.as_str()),
                ("fields", "nextPageToken, files(id, name)"),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let page = self.list_page(&query).await?;
            files.extend(page.files);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(files)
    }
}

/// Public, size-capped view link for a drive file.
pub fn view_url(file_id: &str) -> String {
    format!("https://lh3.googleusercontent.com/d/{file_id}=s0")
}

/// Fully materialize one folder into a case-folded stem index.
pub async fn build_asset_index(
    source: &dyn FolderSource,
    folder_id: &str,
) -> Result<AssetIndex, PipelineError> {
    let mut index = AssetIndex::new();
    for file in source.list_files(folder_id).await? {
        index.insert(&file.name, view_url(&file.id));
    }
    Ok(index)
}

/// Locate the project's image folders and build both indexes. A missing
/// folder is a soft miss (`Ok(None)`), not an error; callers degrade to
/// pass-through either way.
pub async fn load_project_indexes(
    source: &dyn FolderSource,
    parent_folder: &str,
) -> Result<Option<(AssetIndex, AssetIndex)>, PipelineError> {
    let Some(parent_id) = source.find_folder(parent_folder, None).await? else {
        warn!("drive folder '{parent_folder}' not found");
        return Ok(None);
    };
    let product = source.find_folder(PRODUCT_IMG_FOLDER, Some(&parent_id)).await?;
    let scene = source.find_folder(SCENE_IMG_FOLDER, Some(&parent_id)).await?;
    let (Some(product_id), Some(scene_id)) = (product, scene) else {
        warn!("image subfolders not found under '{parent_folder}'");
        return Ok(None);
    };
    let product_index = build_asset_index(source, &product_id).await?;
    let scene_index = build_asset_index(source, &scene_id).await?;
    info!(
        "cached {} product and {} scene image names",
        product_index.len(),
        scene_index.len()
    );
    Ok(Some((product_index, scene_index)))
}

/// Sheet read/write at the granularity the pipelines need: the whole first
/// worksheet as a 2-D grid.
#[async_trait]
pub trait SheetBackend: Send + Sync {
    async fn read_grid(&self, spreadsheet_id: &str) -> Result<Vec<Vec<String>>, PipelineError>;

    /// Clear the first worksheet, then write the grid starting at A1.
    async fn replace_grid(
        &self,
        spreadsheet_id: &str,
        values: &[Vec<String>],
    ) -> Result<(), PipelineError>;
}

pub struct SheetsClient {
    http: reqwest::Client,
    token: String,
    retry: RetryPolicy,
}

impl SheetsClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), token: token.into(), retry: RetryPolicy::default() }
    }

    async fn first_sheet_title(&self, spreadsheet_id: &str) -> Result<String, PipelineError> {
        let url = format!("{SHEETS_URL}/{spreadsheet_id}");
        let request = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("fields", "sheets.properties.title")]);
        let resp = send_with_retry(request, &self.retry).await?;
        let body: serde_json::Value =
            resp.json().await.map_err(|e| PipelineError::Remote(e.to_string()))?;
        let title = body
            .pointer("/sheets/0/properties/title")
            .and_then(|t| t.as_str())
            .unwrap_or("Sheet1")
            .to_string();
        Ok(title)
    }
}

#[async_trait]
impl SheetBackend for SheetsClient {
    async fn read_grid(&self, spreadsheet_id: &str) -> Result<Vec<Vec<String>>, PipelineError> {
        let title = self.first_sheet_title(spreadsheet_id).await?;
        info!("reading worksheet '{title}'");
        let url = format!("{SHEETS_URL}/{spreadsheet_id}/values/{title}");
        let request = self.http.get(&url).bearer_auth(&self.token);
        let resp = send_with_retry(request, &self.retry).await?;
        let body: serde_json::Value =
            resp.json().await.map_err(|e| PipelineError::Remote(e.to_string()))?;
        let values = body
            .get("values")
            .and_then(|v| v.as_array())
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| {
                                cells
                                    .iter()
                                    .map(|c| c.as_str().map(str::to_string).unwrap_or_else(|| c.to_string()))
                                    .collect()
                            })
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(values)
    }

    async fn replace_grid(
        &self,
        spreadsheet_id: &str,
        values: &[Vec<String>],
    ) -> Result<(), PipelineError> {
        let title = self.first_sheet_title(spreadsheet_id).await?;
        info!("clearing worksheet '{title}'");
        let clear_url = format!("{SHEETS_URL}/{spreadsheet_id}/values/{title}:clear");
        let request = self.http.post(&clear_url).bearer_auth(&self.token).json(&json!({}));
        send_with_retry(request, &self.retry).await?;

        info!("writing {} rows to '{title}'", values.len());
        let update_url = format!("{SHEETS_URL}/{spreadsheet_id}/values/{title}!A1");
        let request = self
            .http
            .put(&update_url)
            .bearer_auth(&self.token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&json!({ "values": values }));
        send_with_retry(request, &self.retry).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spreadsheet_id_from_share_url() {
        let url = "https://docs.google.com/spreadsheets/d/1AbC-9_x/edit#gid=0";
        assert_eq!(extract_spreadsheet_id(url).as_deref(), Some("1AbC-9_x"));
    }

    #[test]
    fn bare_spreadsheet_id_is_accepted() {
        assert_eq!(extract_spreadsheet_id("1AbC-9_x").as_deref(), Some("1AbC-9_x"));
        assert_eq!(extract_spreadsheet_id("not a sheet url"), None);
    }

    #[test]
    fn retryable_statuses() {
        for code in [429u16, 500, 502, 503, 504] {
            assert!(RetryPolicy::is_retryable(StatusCode::from_u16(code).unwrap()));
        }
        assert!(!RetryPolicy::is_retryable(StatusCode::NOT_FOUND));
        assert!(!RetryPolicy::is_retryable(StatusCode::UNAUTHORIZED));
    }

    struct FakeDrive {
        files: Vec<RemoteFile>,
    }

    #[async_trait]
    impl FolderSource for FakeDrive {
        async fn find_folder(
            &self,
            name: &str,
            _parent_id: Option<&str>,
        ) -> Result<Option<String>, PipelineError> {
            Ok((name == PRODUCT_IMG_FOLDER || name == "主文件夹").then(|| "fid".to_string()))
        }

        async fn list_files(&self, _folder_id: &str) -> Result<Vec<RemoteFile>, PipelineError> {
            Ok(self.files.clone())
        }
    }

    #[tokio::test]
    async fn asset_index_built_from_listing() {
        let drive = FakeDrive {
            files: vec![
                RemoteFile { id: "1".into(), name: "h112218.jpg".into() },
                RemoteFile { id: "2".into(), name: "H112218.png".into() },
            ],
        };
        let index = build_asset_index(&drive, "fid").await.unwrap();
        // Duplicate stems collapse, last listing wins.
        assert_eq!(index.len(), 1);
        assert_eq!(index.resolve("H112218"), view_url("2"));
    }

    #[tokio::test]
    async fn missing_scene_folder_is_a_soft_miss() {
        let drive = FakeDrive { files: vec![] };
        let result = load_project_indexes(&drive, "主文件夹").await.unwrap();
        assert!(result.is_none());
    }
}
