use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::Url;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => match err.missing {
                    Some(missing) => anyhow::bail!(
                        "API error ({}): {} (missing: {:?})",
                        status,
                        err.message,
                        missing
                    ),
                    None => anyhow::bail!("API error ({}): {}", status, err.message),
                },
                Err(_) => anyhow::bail!("API error ({}): {}", status, body),
            }
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Upload one chunk. Identifying fields go first so the server can
    /// stream the file part straight to storage.
    pub async fn upload_chunk(
        &self,
        session_id: &str,
        filename: &str,
        chunk_index: u64,
        total_parts: Option<u64>,
        data: Bytes,
    ) -> Result<UploadResponse> {
        let url = self.url("/upload")?;
        let mut form = Form::new()
            .text("sessionID", session_id.to_string())
            .text("filename", filename.to_string())
            .text("chunkIndex", chunk_index.to_string());
        if let Some(total) = total_parts {
            form = form.text("total_parts", total.to_string());
        }
        let part = Part::bytes(Vec::from(data))
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")?;
        form = form.part("file", part);

        self.send_json(self.http.post(url).multipart(form)).await
    }

    pub async fn status(
        &self,
        session_id: &str,
        filename: &str,
        expected_total: Option<u64>,
    ) -> Result<StatusResponse> {
        let url = self.url("/status")?;
        let query = StatusQuery {
            session_id,
            filename,
            expected_total,
        };
        self.send_json(self.http.get(url).query(&query)).await
    }

    pub async fn merge(&self, session_id: &str, filename: &str, req: MergeRequest) -> Result<MergeResponse> {
        let url = self.url("/merge")?;
        let chunks = (!req.chunks.is_empty()).then(|| {
            req.chunks
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(",")
        });
        let form = MergeForm {
            session_id,
            filename,
            expected_total: req.expected_total,
            chunks,
        };
        self.send_json(self.http.post(url).form(&form)).await
    }

    pub async fn purge(&self, session_id: &str, filename: &str) -> Result<PurgeResponse> {
        let url = self.url("/purge")?;
        let form = StatusQuery {
            session_id,
            filename,
            expected_total: None,
        };
        self.send_json(self.http.post(url).form(&form)).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.url("/health")?;
        self.send_json(self.http.get(url)).await
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
    #[serde(default)]
    missing: Option<Vec<u64>>,
}

#[derive(Serialize)]
struct StatusQuery<'a> {
    #[serde(rename = "sessionID")]
    session_id: &'a str,
    filename: &'a str,
    #[serde(rename = "expectedTotal", skip_serializing_if = "Option::is_none")]
    expected_total: Option<u64>,
}

#[derive(Serialize)]
struct MergeForm<'a> {
    #[serde(rename = "sessionID")]
    session_id: &'a str,
    filename: &'a str,
    #[serde(rename = "expectedTotal", skip_serializing_if = "Option::is_none")]
    expected_total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunks: Option<String>,
}

/// Which chunks a merge should use. Empty `chunks` and no `expected_total`
/// merges whatever is present.
#[derive(Debug, Default, Clone)]
pub struct MergeRequest {
    pub expected_total: Option<u64>,
    pub chunks: Vec<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UploadResponse {
    pub message: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub filename: String,
    #[serde(rename = "chunkIndex")]
    pub chunk_index: u64,
    pub size: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StatusResponse {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<Vec<u64>>,
    #[serde(rename = "expectedTotal", default, skip_serializing_if = "Option::is_none")]
    pub expected_total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<u64>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CleanupFailure {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResponse {
    pub message: String,
    pub key: String,
    pub size: u64,
    pub chunks: usize,
    #[serde(default)]
    pub cleanup_failures: Vec<CleanupFailure>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PurgeResponse {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub filename: String,
    pub deleted: usize,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
}
