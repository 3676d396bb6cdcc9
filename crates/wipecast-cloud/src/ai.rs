//! Generative diff service: text summary, highlighted image and transition video.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use wipecast_core::{AiConfig, WipecastError, WipecastResult};
use wipecast_render::image_loader::split_data_uri;

/// Message surfaced for any failure of [`compare_images`].
pub const COMPARE_FAILED: &str = "Failed to compare images. The AI service may be temporarily unavailable or the image format is not supported.";

const SUMMARY_PROMPT: &str = "You are an expert image analyst. You are given two images and you need to provide a concise summary of the differences between them. Focus on the key differences that a user would immediately notice. Be specific about the types of changes and their locations within the images.";

const HIGHLIGHT_PROMPT: &str = "You are an AI that specializes in identifying and highlighting the most relevant differences between two images. Analyze the two provided images and generate a new image that visually emphasizes the key discrepancies using bounding boxes and color overlays. Ensure the output focuses on significant changes, avoiding minor or irrelevant details to provide a clear and concise comparison.";

const VIDEO_PROMPT: &str = "Create a 5-second video. Start by showing the \"after\" image for 1 second. Then, perform a 3-second vertical line wipe transition from left to right, revealing the \"before\" image. Hold on the final \"before\" image for the remaining 1 second. The video should have a 16:9 aspect ratio.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    /// Highlighted-difference image as a data URI.
    pub comparison_image: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedVideo {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl GeneratedVideo {
    pub fn extension(&self) -> &str {
        match self.mime_type.split('/').nth(1) {
            Some("quicktime") => "mov",
            Some(ext) if !ext.is_empty() => ext,
            _ => "mp4",
        }
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }
}

/// Remote model operations over two data-URI images.
#[async_trait]
pub trait DiffService: Send + Sync {
    async fn summarize_differences(&self, image1: &str, image2: &str) -> WipecastResult<String>;

    /// Returns the annotated image as a data URI.
    async fn highlight_differences(&self, image1: &str, image2: &str) -> WipecastResult<String>;

    /// Long-running; resolves once the remote operation completes.
    async fn generate_transition_video(
        &self,
        before: &str,
        after: &str,
    ) -> WipecastResult<GeneratedVideo>;
}

/// Run summary and highlight concurrently; any failure becomes one aggregate error.
pub async fn compare_images(
    service: &dyn DiffService,
    image1: &str,
    image2: &str,
) -> WipecastResult<ComparisonResult> {
    if image1.trim().is_empty() || image2.trim().is_empty() {
        return Err(WipecastError::InvalidArgument(
            "Both images must be provided as data URIs.".into(),
        ));
    }

    let outcome = tokio::try_join!(
        service.highlight_differences(image1, image2),
        service.summarize_differences(image1, image2),
    );

    match outcome {
        Ok((comparison_image, summary))
            if !comparison_image.is_empty() && !summary.trim().is_empty() =>
        {
            Ok(ComparisonResult {
                comparison_image,
                summary,
            })
        }
        Ok(_) => {
            tracing::error!("AI service returned an incomplete comparison");
            Err(WipecastError::RemoteService(COMPARE_FAILED.into()))
        }
        Err(e) => {
            tracing::error!("image comparison failed: {}", e);
            Err(WipecastError::RemoteService(COMPARE_FAILED.into()))
        }
    }
}

/// [`DiffService`] over the Gemini REST API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    config: AiConfig,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: AiConfig, api_key: impl Into<String>) -> WipecastResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| WipecastError::RemoteService(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            api_key: api_key.into(),
        })
    }

    /// Read the API key from the environment variable named in `config`.
    pub fn from_env(config: AiConfig) -> WipecastResult<Self> {
        let key = std::env::var(&config.api_key_env).map_err(|_| {
            WipecastError::Config(format!(
                "{} is not set (needed for the AI service)",
                config.api_key_env
            ))
        })?;
        Self::new(config, key)
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            model,
            method
        )
    }

    async fn post(&self, url: &str, body: &Value) -> WipecastResult<Value> {
        let res = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| WipecastError::RemoteService(format!("request failed: {}", e)))?;
        read_json(res).await
    }

    async fn get(&self, url: &str) -> WipecastResult<reqwest::Response> {
        self.client
            .get(url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| WipecastError::RemoteService(format!("request failed: {}", e)))
    }

    async fn poll_operation(&self, name: &str) -> WipecastResult<Value> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), name);
        let interval = Duration::from_secs(self.config.poll_interval_secs);

        for attempt in 1..=self.config.max_poll_attempts {
            tokio::time::sleep(interval).await;
            let operation = read_json(self.get(&url).await?).await?;
            if operation["done"].as_bool().unwrap_or(false) {
                return Ok(operation);
            }
            tracing::debug!("video operation {} pending (poll {})", name, attempt);
        }
        Err(WipecastError::RemoteService(format!(
            "video operation {} did not finish after {} polls",
            name, self.config.max_poll_attempts
        )))
    }
}

async fn read_json(res: reqwest::Response) -> WipecastResult<Value> {
    if !res.status().is_success() {
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        return Err(WipecastError::RemoteService(format!(
            "AI request failed: {}: {}",
            status, text
        )));
    }
    res.json::<Value>()
        .await
        .map_err(|e| WipecastError::RemoteService(format!("invalid AI response: {}", e)))
}

/// Request part carrying a data-URI image inline.
fn inline_part(data_uri: &str) -> WipecastResult<Value> {
    let (mime, payload) = split_data_uri(data_uri)?;
    Ok(json!({ "inline_data": { "mime_type": mime, "data": payload.trim() } }))
}

/// Instance image for long-running video requests.
fn instance_image(data_uri: &str) -> WipecastResult<Value> {
    let (mime, payload) = split_data_uri(data_uri)?;
    Ok(json!({ "bytesBase64Encoded": payload.trim(), "mimeType": mime }))
}

fn two_image_request(prompt: &str, image1: &str, image2: &str) -> WipecastResult<Value> {
    Ok(json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "text": prompt },
                { "text": "Image 1:" },
                inline_part(image1)?,
                { "text": "Image 2:" },
                inline_part(image2)?,
            ]
        }]
    }))
}

fn candidate_parts(response: &Value) -> &[Value] {
    response["candidates"][0]["content"]["parts"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Concatenate the text parts of the first candidate.
pub fn extract_text(response: &Value) -> Option<String> {
    let text: Vec<&str> = candidate_parts(response)
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect();
    let joined = text.join("").trim().to_string();
    (!joined.is_empty()).then_some(joined)
}

/// First inline image of the first candidate, as a data URI.
pub fn extract_inline_image(response: &Value) -> Option<String> {
    candidate_parts(response).iter().find_map(|p| {
        let inline = p.get("inlineData").or_else(|| p.get("inline_data"))?;
        let mime = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))?
            .as_str()?;
        let data = inline["data"].as_str()?;
        mime.starts_with("image/")
            .then(|| format!("data:{};base64,{}", mime, data))
    })
}

/// Where the finished video lives in a completed operation.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoLocation {
    Inline(GeneratedVideo),
    Uri(String),
}

/// Inspect a completed long-running operation.
pub fn extract_video(operation: &Value) -> WipecastResult<VideoLocation> {
    if let Some(message) = operation.get("error").map(|e| {
        e["message"].as_str().unwrap_or("unknown error").to_string()
    }) {
        return Err(WipecastError::RemoteService(format!(
            "failed to generate video: {}",
            message
        )));
    }

    let sample = &operation["response"]["generateVideoResponse"]["generatedSamples"][0]["video"];
    let mime_type = sample["mimeType"].as_str().unwrap_or("video/mp4").to_string();
    if let Some(encoded) = sample["bytesBase64Encoded"].as_str() {
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| WipecastError::RemoteService(format!("invalid video payload: {}", e)))?;
        return Ok(VideoLocation::Inline(GeneratedVideo { mime_type, data }));
    }
    if let Some(uri) = sample["uri"].as_str() {
        return Ok(VideoLocation::Uri(uri.to_string()));
    }
    Err(WipecastError::RemoteService(
        "Failed to find the generated video in the response".into(),
    ))
}

#[async_trait]
impl DiffService for GeminiClient {
    async fn summarize_differences(&self, image1: &str, image2: &str) -> WipecastResult<String> {
        let body = two_image_request(SUMMARY_PROMPT, image1, image2)?;
        let response = self
            .post(&self.endpoint(&self.config.summary_model, "generateContent"), &body)
            .await?;
        extract_text(&response)
            .ok_or_else(|| WipecastError::RemoteService("summary response had no text".into()))
    }

    async fn highlight_differences(&self, image1: &str, image2: &str) -> WipecastResult<String> {
        let mut body = two_image_request(HIGHLIGHT_PROMPT, image1, image2)?;
        body["generationConfig"] = json!({ "responseModalities": ["TEXT", "IMAGE"] });
        let response = self
            .post(&self.endpoint(&self.config.highlight_model, "generateContent"), &body)
            .await?;
        extract_inline_image(&response)
            .ok_or_else(|| WipecastError::RemoteService("highlight response had no image".into()))
    }

    async fn generate_transition_video(
        &self,
        before: &str,
        after: &str,
    ) -> WipecastResult<GeneratedVideo> {
        // The clip opens on the after image and wipes to the before image.
        let body = json!({
            "instances": [{
                "prompt": VIDEO_PROMPT,
                "image": instance_image(after)?,
                "lastFrame": instance_image(before)?,
            }],
            "parameters": { "durationSeconds": 5, "aspectRatio": "16:9" }
        });
        let started = self
            .post(&self.endpoint(&self.config.video_model, "predictLongRunning"), &body)
            .await?;
        let name = started["name"].as_str().ok_or_else(|| {
            WipecastError::RemoteService("Expected the model to return an operation".into())
        })?;
        tracing::info!("video generation started: {}", name);

        let operation = if started["done"].as_bool().unwrap_or(false) {
            started.clone()
        } else {
            self.poll_operation(name).await?
        };

        match extract_video(&operation)? {
            VideoLocation::Inline(video) => Ok(video),
            VideoLocation::Uri(uri) => {
                let res = self.get(&uri).await?;
                if !res.status().is_success() {
                    return Err(WipecastError::RemoteService(format!(
                        "video download failed: {}",
                        res.status()
                    )));
                }
                let mime_type = res
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| v.starts_with("video/"))
                    .unwrap_or("video/mp4")
                    .to_string();
                let data = res
                    .bytes()
                    .await
                    .map_err(|e| WipecastError::RemoteService(format!("video download failed: {}", e)))?;
                Ok(GeneratedVideo {
                    mime_type,
                    data: data.to_vec(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMG: &str = "data:image/png;base64,iVBORw0KGgo=";

    struct FakeService {
        summary: WipecastResult<String>,
        image: WipecastResult<String>,
    }

    fn clone_result(r: &WipecastResult<String>) -> WipecastResult<String> {
        match r {
            Ok(s) => Ok(s.clone()),
            Err(e) => Err(WipecastError::RemoteService(e.to_string())),
        }
    }

    #[async_trait]
    impl DiffService for FakeService {
        async fn summarize_differences(&self, _: &str, _: &str) -> WipecastResult<String> {
            clone_result(&self.summary)
        }

        async fn highlight_differences(&self, _: &str, _: &str) -> WipecastResult<String> {
            clone_result(&self.image)
        }

        async fn generate_transition_video(&self, _: &str, _: &str) -> WipecastResult<GeneratedVideo> {
            Err(WipecastError::RemoteService("not supported".into()))
        }
    }

    fn fake(summary: WipecastResult<String>, image: WipecastResult<String>) -> FakeService {
        FakeService { summary, image }
    }

    #[tokio::test]
    async fn test_compare_images_success() {
        let service = fake(Ok("The sofa moved.".into()), Ok(IMG.into()));
        let result = compare_images(&service, IMG, IMG).await.unwrap();
        assert_eq!(result.summary, "The sofa moved.");
        assert_eq!(result.comparison_image, IMG);
    }

    #[tokio::test]
    async fn test_compare_images_aggregates_failures() {
        let failing = [
            fake(Err(WipecastError::RemoteService("quota".into())), Ok(IMG.into())),
            fake(Ok("text".into()), Err(WipecastError::RemoteService("500".into()))),
            fake(Ok("   ".into()), Ok(IMG.into())),
            fake(Ok("text".into()), Ok(String::new())),
        ];
        for service in &failing {
            let err = compare_images(service, IMG, IMG).await.unwrap_err();
            match err {
                WipecastError::RemoteService(msg) => assert_eq!(msg, COMPARE_FAILED),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[tokio::test]
    async fn test_compare_images_requires_both() {
        let service = fake(Ok("x".into()), Ok(IMG.into()));
        let err = compare_images(&service, "", IMG).await.unwrap_err();
        assert!(err.to_string().contains("Both images must be provided"));
    }

    #[test]
    fn test_request_parts_inline_images() {
        let body = two_image_request("prompt", IMG, IMG).unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[2]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[2]["inline_data"]["data"], "iVBORw0KGgo=");
        assert!(two_image_request("prompt", "not a uri", IMG).is_err());
    }

    #[test]
    fn test_extract_text_and_image() {
        let response = json!({
            "candidates": [{ "content": { "parts": [
                { "text": "Here is " },
                { "text": "the result." },
                { "inlineData": { "mimeType": "image/png", "data": "AAAA" } }
            ]}}]
        });
        assert_eq!(extract_text(&response).as_deref(), Some("Here is the result."));
        assert_eq!(
            extract_inline_image(&response).as_deref(),
            Some("data:image/png;base64,AAAA")
        );
        assert_eq!(extract_text(&json!({})), None);
        assert_eq!(extract_inline_image(&json!({ "candidates": [] })), None);
    }

    #[test]
    fn test_extract_video() {
        let inline = json!({ "done": true, "response": { "generateVideoResponse": {
            "generatedSamples": [{ "video": { "bytesBase64Encoded": "AAEC", "mimeType": "video/mp4" } }]
        }}});
        assert_eq!(
            extract_video(&inline).unwrap(),
            VideoLocation::Inline(GeneratedVideo {
                mime_type: "video/mp4".into(),
                data: vec![0, 1, 2],
            })
        );

        let remote = json!({ "done": true, "response": { "generateVideoResponse": {
            "generatedSamples": [{ "video": { "uri": "https://files/v1" } }]
        }}});
        assert_eq!(
            extract_video(&remote).unwrap(),
            VideoLocation::Uri("https://files/v1".into())
        );

        let failed = json!({ "done": true, "error": { "code": 3, "message": "blocked" } });
        assert_eq!(
            extract_video(&failed).unwrap_err().to_string(),
            "remote service error: failed to generate video: blocked"
        );
        assert!(extract_video(&json!({ "done": true })).is_err());
    }

    #[test]
    fn test_generated_video_naming() {
        let video = GeneratedVideo {
            mime_type: "video/mp4".into(),
            data: vec![1, 2, 3],
        };
        assert_eq!(video.extension(), "mp4");
        assert_eq!(video.to_data_uri(), "data:video/mp4;base64,AQID");
    }

    #[test]
    fn test_endpoint_url() {
        let client = GeminiClient::new(AiConfig::default(), "k").unwrap();
        assert_eq!(
            client.endpoint("gemini-2.5-flash", "generateContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
