use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::links::LinkMap;
use crate::source::list_documents;

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const PAGE_SIZE: u32 = 1000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of the file name → URL map used to hyperlink process numbers.
///
/// Never fails: a listing that breaks midway returns what it had so far.
pub trait LinkIndex {
    fn list(&self) -> impl Future<Output = LinkMap> + Send;
}

// ── Google Drive ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    web_view_link: Option<String>,
}

impl DriveFile {
    fn url(&self) -> String {
        self.web_view_link
            .clone()
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", self.id))
    }
}

/// Files in one Drive folder, listed with `files.list` and a bearer token.
pub struct DriveFolderIndex {
    client: reqwest::Client,
    folder_id: String,
    token: String,
    base_url: String,
}

impl DriveFolderIndex {
    pub fn new(folder_id: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(DriveFolderIndex {
            client,
            folder_id: folder_id.to_string(),
            token: token.to_string(),
            base_url: FILES_URL.to_string(),
        })
    }

    async fn fetch_page(&self, page_token: Option<&str>) -> Result<FileList> {
        let query = format!("'{}' in parents and trashed = false", self.folder_id);
        let page_size = PAGE_SIZE.to_string();
        let mut params = vec![
            ("q", query.as_str()),
            ("fields", "nextPageToken, files(id, name, webViewLink)"),
            ("pageSize", page_size.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        let list = self
            .client
            .get(&self.base_url)
            .bearer_auth(&self.token)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json::<FileList>()
            .await?;
        Ok(list)
    }
}

impl LinkIndex for DriveFolderIndex {
    async fn list(&self) -> LinkMap {
        let mut links = LinkMap::new();
        let mut page_token: Option<String> = None;
        loop {
            match self.fetch_page(page_token.as_deref()).await {
                Ok(page) => {
                    page_token = collect_page(&mut links, page);
                    if page_token.is_none() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(
                        "Drive listing stopped after {} files: {:#}",
                        links.len(),
                        e
                    );
                    break;
                }
            }
        }
        info!("Drive folder lists {} files", links.len());
        links
    }
}

/// Add one page of results; returns the token of the next page, if any.
fn collect_page(links: &mut LinkMap, page: FileList) -> Option<String> {
    for file in &page.files {
        links.insert(file.name.clone(), file.url());
    }
    page.next_page_token.filter(|t| !t.is_empty())
}

// ── Local folder ──

/// Documents in a local directory, linked as `file://` URLs.
pub struct LocalFolderIndex {
    dir: PathBuf,
}

impl LocalFolderIndex {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        LocalFolderIndex { dir: dir.into() }
    }
}

impl LinkIndex for LocalFolderIndex {
    async fn list(&self) -> LinkMap {
        let paths = match list_documents(&self.dir) {
            Ok(paths) => paths,
            Err(e) => {
                warn!("No local links: {:#}", e);
                return LinkMap::new();
            }
        };
        paths
            .into_iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?.to_string();
                let abs = std::fs::canonicalize(&path).ok()?;
                Some((name, format!("file://{}", abs.display())))
            })
            .collect()
    }
}
