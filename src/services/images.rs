use crate::core::state::ApiKey;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;
use url::Url;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_size")]
    pub size: String,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(default = "default_timeout")]
    pub download_timeout_seconds: u64,
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,
    #[serde(default = "default_presets_file")]
    pub presets_file: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            size: default_size(),
            response_format: ResponseFormat::default(),
            download_timeout_seconds: default_timeout(),
            max_download_bytes: default_max_download_bytes(),
            presets_file: default_presets_file(),
            base_url: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Url,
    B64Json,
}

fn default_model() -> String {
    "dall-e-3".to_string()
}
fn default_size() -> String {
    "1024x1024".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_max_download_bytes() -> u64 {
    20 * 1024 * 1024
}
fn default_presets_file() -> String {
    "style_presets.json".to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
}

/// What the endpoint hands back: a link to fetch, or the bytes themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedImage {
    Url(Url),
    Inline(Vec<u8>),
}

#[async_trait]
pub trait ImageClient: Send + Sync + Debug {
    /// Requests exactly one image.
    async fn generate(&self, key: Option<&ApiKey>, request: &ImageRequest) -> Result<GeneratedImage>;

    /// Fetches a generated image. Gives up once the download timeout passes
    /// or the body grows past the size limit.
    async fn download(&self, url: &Url) -> Result<Vec<u8>>;
}

pub fn create_image_client(config: &ImageConfig) -> Box<dyn ImageClient> {
    Box::new(OpenAIImageClient::new(config))
}

#[derive(Debug)]
struct OpenAIImageClient {
    base_url: String,
    response_format: ResponseFormat,
    download_timeout: Duration,
    max_download_bytes: u64,
    client: reqwest::Client,
}

impl OpenAIImageClient {
    fn new(config: &ImageConfig) -> Self {
        Self {
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            response_format: config.response_format,
            download_timeout: Duration::from_secs(config.download_timeout_seconds),
            max_download_bytes: config.max_download_bytes,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OpenAIImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct OpenAIImageResponse {
    #[serde(default)]
    data: Vec<OpenAIImageDatum>,
}

#[derive(Deserialize)]
struct OpenAIImageDatum {
    url: Option<String>,
    b64_json: Option<String>,
}

impl OpenAIImageResponse {
    fn into_generated(self) -> Result<GeneratedImage> {
        let first = self
            .data
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Image response contained no images"))?;

        if let Some(b64) = first.b64_json {
            let bytes = STANDARD
                .decode(b64.trim())
                .context("Image response carried invalid base64")?;
            return Ok(GeneratedImage::Inline(bytes));
        }
        if let Some(url) = first.url {
            return Ok(GeneratedImage::Url(parse_image_url(&url)?));
        }
        Err(anyhow!("Image response had neither url nor b64_json"))
    }
}

pub fn parse_image_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("Invalid image URL: {}", raw))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => bail!("Unsupported image URL scheme: {}", other),
    }
}

#[async_trait]
impl ImageClient for OpenAIImageClient {
    async fn generate(&self, key: Option<&ApiKey>, request: &ImageRequest) -> Result<GeneratedImage> {
        let key = key.context("An API key is required for image generation")?;
        let url = format!("{}/images/generations", self.base_url);

        let body = OpenAIImageRequest {
            model: &request.model,
            prompt: &request.prompt,
            n: 1,
            size: &request.size,
            response_format: self.response_format,
        };

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", key.expose()))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await?;
            return Err(anyhow!("Image API error ({}): {}", status, error_text));
        }

        let result: OpenAIImageResponse = resp.json().await?;
        result.into_generated()
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>> {
        let mut resp = self
            .client
            .get(url.clone())
            .timeout(self.download_timeout)
            .send()
            .await
            .with_context(|| format!("Image download failed: {}", url))?;

        if !resp.status().is_success() {
            bail!("Image download returned {}", resp.status());
        }

        let limit = self.max_download_bytes;
        if let Some(len) = resp.content_length() {
            if len > limit {
                bail!("Image is {} bytes, more than the {} byte limit", len, limit);
            }
        }

        // The declared length can be missing, so the body is counted as it arrives.
        let mut bytes = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .with_context(|| format!("Image download interrupted: {}", url))?
        {
            if (bytes.len() + chunk.len()) as u64 > limit {
                bail!("Image is more than the {} byte limit", limit);
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers a single HTTP request with `response` and closes.
    async fn serve_once(response: Vec<u8>) -> Result<Url> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            }
        });
        Ok(Url::parse(&format!("http://{}/image.png", addr))?)
    }

    fn client_with_limit(limit: u64) -> OpenAIImageClient {
        OpenAIImageClient::new(&ImageConfig {
            max_download_bytes: limit,
            ..ImageConfig::default()
        })
    }

    #[tokio::test]
    async fn test_download_within_limit() -> Result<()> {
        let mut response = b"HTTP/1.1 200 OK\r\nContent-Length: 8\r\nConnection: close\r\n\r\n".to_vec();
        response.extend_from_slice(&[7u8; 8]);
        let url = serve_once(response).await?;

        let bytes = client_with_limit(16).download(&url).await?;
        assert_eq!(bytes, vec![7u8; 8]);
        Ok(())
    }

    #[tokio::test]
    async fn test_declared_oversize_download_fails() -> Result<()> {
        let mut response = b"HTTP/1.1 200 OK\r\nContent-Length: 64\r\nConnection: close\r\n\r\n".to_vec();
        response.extend_from_slice(&[7u8; 64]);
        let url = serve_once(response).await?;

        let err = client_with_limit(16).download(&url).await.unwrap_err();
        assert!(err.to_string().contains("limit"), "{}", err);
        Ok(())
    }

    #[tokio::test]
    async fn test_undeclared_oversize_download_fails() -> Result<()> {
        let mut response = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_vec();
        response.extend_from_slice(&[7u8; 64]);
        let url = serve_once(response).await?;

        let err = client_with_limit(16).download(&url).await.unwrap_err();
        assert!(err.to_string().contains("limit"), "{}", err);
        Ok(())
    }

    #[test]
    fn test_url_response() {
        let json = r#"{ "created": 1, "data": [{ "url": "https://img.example.com/a.png", "revised_prompt": "..." }] }"#;
        let resp: OpenAIImageResponse = serde_json::from_str(json).unwrap();
        match resp.into_generated().unwrap() {
            GeneratedImage::Url(url) => assert_eq!(url.host_str(), Some("img.example.com")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_b64_response() {
        let json = r#"{ "data": [{ "b64_json": "iVBORw0K" }] }"#;
        let resp: OpenAIImageResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            resp.into_generated().unwrap(),
            GeneratedImage::Inline(vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a])
        );
    }

    #[test]
    fn test_empty_or_bad_responses() {
        let resp: OpenAIImageResponse = serde_json::from_str(r#"{ "data": [] }"#).unwrap();
        assert!(resp.into_generated().is_err());

        let resp: OpenAIImageResponse = serde_json::from_str(r#"{ "data": [{}] }"#).unwrap();
        assert!(resp.into_generated().is_err());

        let resp: OpenAIImageResponse =
            serde_json::from_str(r#"{ "data": [{ "url": "file:///etc/passwd" }] }"#).unwrap();
        assert!(resp.into_generated().is_err());
    }

    #[test]
    fn test_request_shape() {
        let body = OpenAIImageRequest {
            model: "dall-e-3",
            prompt: "a fox",
            n: 1,
            size: "1024x1024",
            response_format: ResponseFormat::B64Json,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["n"], 1);
        assert_eq!(value["size"], "1024x1024");
        assert_eq!(value["response_format"], "b64_json");
    }
}
