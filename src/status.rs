use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::parser::extract::ERROR_PREFIX;
use crate::parser::normalize::digits_only;

/// Placeholder in the URL template replaced by the digits of the process
/// number.
pub const PROA_PLACEHOLDER: &str = "{proa}";

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static SITUACAO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Situa[çc][ãa]o\s*:\s*([^\n]+)").unwrap());

/// Looks up a process's current status in the remote tracking system.
///
/// Never fails: an empty identifier yields an empty status, and any lookup
/// problem yields an `ERRO: ...` string.
pub trait StatusLookup {
    fn lookup(&self, process_digits: &str) -> impl Future<Output = String> + Send;
}

pub struct HttpStatusLookup {
    client: reqwest::Client,
    url_template: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
}

impl HttpStatusLookup {
    pub fn new(url_template: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(HttpStatusLookup {
            client,
            url_template: url_template.to_string(),
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_status(&body).context("no status in response")
    }
}

impl StatusLookup for HttpStatusLookup {
    async fn lookup(&self, process_digits: &str) -> String {
        let digits = digits_only(process_digits);
        if digits.is_empty() {
            return String::new();
        }
        let url = self.url_template.replace(PROA_PLACEHOLDER, &digits);
        debug!("GET {}", url);
        match self.fetch(&url).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Status lookup failed for {}: {:#}", digits, e);
                format!("{ERROR_PREFIX} falha na consulta de status ({e})")
            }
        }
    }
}

/// Status text from a response body: the `status` member of a JSON object,
/// else the text after a `Situação:` label in an HTML page.
pub fn parse_status(body: &str) -> Option<String> {
    if let Ok(resp) = serde_json::from_str::<StatusResponse>(body) {
        let status = resp.status.trim().to_string();
        return (!status.is_empty()).then_some(status);
    }
    let text = TAG_RE.replace_all(body, "\n").replace("&nbsp;", " ");
    SITUACAO_RE
        .captures_iter(&text)
        .map(|caps| caps[1].trim().to_string())
        .find(|s| !s.is_empty())
}
