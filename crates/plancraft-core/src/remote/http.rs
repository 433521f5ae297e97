//! REST client for the design backend
//!
//! Uses reqwest with multipart uploads for files and JSON for everything else.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DesignServices, ParseOutcome, RenderRequest, TaskStatus};
use crate::config::Config;
use crate::error::{StudioError, StudioResult};
use crate::session::{SourceFile, StoredAsset, WhiteboxAsset};
use crate::views::CameraView;

/// Design backend reached over HTTP
pub struct HttpDesignServices {
    client: reqwest::Client,
    config: Config,
}

impl HttpDesignServices {
    pub fn new(config: &Config) -> StudioResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(ref token) = config.api_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| StudioError::invalid_request("Invalid API token format"))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn file_form(file: &SourceFile) -> Form {
        let part = Part::bytes(file.bytes.to_vec()).file_name(file.name.clone());
        Form::new().part("file", part)
    }

    async fn post_form<T: DeserializeOwned>(&self, path: &str, form: Form) -> StudioResult<T> {
        let url = self.config.endpoint(path);
        debug!(%url, "POST multipart");
        let response = self.client.post(&url).multipart(form).send().await?;
        read_json(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> StudioResult<T> {
        let url = self.config.endpoint(path);
        debug!(%url, "POST");
        let response = self.client.post(&url).json(body).send().await?;
        read_json(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> StudioResult<T> {
        let url = self.config.endpoint(path);
        debug!(%url, "GET");
        let response = self.client.get(&url).send().await?;
        read_json(response).await
    }
}

/// Decode a success body, or turn an error body into a `StudioError`.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> StudioResult<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let fallback = format!("Request failed with status {}", status.as_u16());
    if status.is_server_error() {
        return Err(StudioError::Transport {
            message: fallback,
            status: Some(status.as_u16()),
        });
    }

    let body: ErrorBody = response.json().await.unwrap_or_default();
    Err(StudioError::from_detail(
        &body.detail,
        Some(status.as_u16()),
        &fallback,
    ))
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    filename: String,
    url: String,
    #[serde(default)]
    encrypted: Option<bool>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ProcessStatus {
    Processing,
    Done,
}

#[derive(Debug, Deserialize)]
struct ProcessCadResponse {
    task_id: String,
    status: ProcessStatus,
    #[serde(default)]
    model_obj_url: Option<String>,
    #[serde(default)]
    depth_urls: Option<BTreeMap<String, String>>,
}

impl ProcessCadResponse {
    fn into_outcome(self) -> ParseOutcome {
        match (self.status, self.model_obj_url, self.depth_urls) {
            (ProcessStatus::Done, Some(model_ref), Some(depth_refs)) => {
                ParseOutcome::Completed(WhiteboxAsset::new(model_ref, depth_refs))
            }
            _ => ParseOutcome::Task {
                task_id: self.task_id,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaskAssets {
    model_obj_url: String,
    #[serde(default)]
    depth_urls: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TaskStatusResponse {
    status: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    assets: Option<TaskAssets>,
}

impl TaskStatusResponse {
    fn into_status(self) -> TaskStatus {
        match self.status.as_str() {
            "SUCCESS" => TaskStatus::Success {
                result: self
                    .assets
                    .filter(|a| !a.model_obj_url.is_empty())
                    .map(|a| WhiteboxAsset::new(a.model_obj_url, a.depth_urls)),
            },
            "FAILURE" => TaskStatus::Failure { reason: None },
            _ => TaskStatus::Pending {
                progress: self.progress.map(|p| p.clamp(0.0, 100.0).round() as u8),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WhiteboxRequest<'a> {
    filename: &'a str,
    source_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct WhiteboxResponse {
    whitebox_url: String,
    depth_url: String,
}

#[derive(Debug, Serialize)]
struct CameraFlags {
    main: bool,
    side: bool,
    #[serde(rename = "topA")]
    top_a: bool,
}

#[derive(Debug, Serialize)]
struct GalleryRequest<'a> {
    whitebox_url: &'a str,
    depth_url: &'a str,
    prompt: &'a str,
    strength: f32,
    cameras: CameraFlags,
}

impl<'a> From<&'a RenderRequest> for GalleryRequest<'a> {
    fn from(request: &'a RenderRequest) -> Self {
        Self {
            whitebox_url: &request.model_ref,
            depth_url: &request.depth_ref,
            prompt: &request.prompt,
            strength: request.strength,
            cameras: CameraFlags {
                main: request.views.contains(CameraView::Main),
                side: request.views.contains(CameraView::Side),
                top_a: request.views.contains(CameraView::TopA),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GalleryResponse {
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RefineRequest<'a> {
    image_url: &'a str,
    instruction: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefineResponse {
    image_url: String,
}

#[async_trait]
impl DesignServices for HttpDesignServices {
    async fn store_asset(&self, file: &SourceFile) -> StudioResult<StoredAsset> {
        let response: UploadResponse = self
            .post_form("/design/upload", Self::file_form(file))
            .await?;
        Ok(StoredAsset {
            storage_ref: response.url,
            display_name: response.filename,
            encrypted: response.encrypted.unwrap_or(false),
        })
    }

    async fn begin_structural_parse(&self, file: &SourceFile) -> StudioResult<ParseOutcome> {
        let response: ProcessCadResponse = self
            .post_form("/design/process-cad", Self::file_form(file))
            .await?;
        Ok(response.into_outcome())
    }

    async fn poll_task(&self, task_id: &str) -> StudioResult<TaskStatus> {
        let response: TaskStatusResponse = self.get_json(&format!("/tasks/{}", task_id)).await?;
        Ok(response.into_status())
    }

    async fn generate_whitebox(&self, stored: &StoredAsset) -> StudioResult<WhiteboxAsset> {
        let request = WhiteboxRequest {
            filename: &stored.display_name,
            source_url: &stored.storage_ref,
        };
        let response: WhiteboxResponse = self.post_json("/design/whitebox", &request).await?;

        let mut depth_refs = BTreeMap::new();
        depth_refs.insert("main".to_string(), response.depth_url);
        Ok(WhiteboxAsset::new(response.whitebox_url, depth_refs))
    }

    async fn render_batch(&self, request: &RenderRequest) -> StudioResult<Vec<String>> {
        let body = GalleryRequest::from(request);
        let response: GalleryResponse = self.post_json("/design/gallery", &body).await?;
        Ok(response.images)
    }

    async fn refine(&self, image_ref: &str, instruction: &str) -> StudioResult<String> {
        let request = RefineRequest {
            image_url: image_ref,
            instruction,
        };
        let response: RefineResponse = self.post_json("/design/refine", &request).await?;
        Ok(response.image_url)
    }
}
