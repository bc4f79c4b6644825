use crate::chunking::normalize_extracted_text;
use crate::models::{ExtractedText, FileType, SourceFile};
use crate::traits::{OcrOutput, OcrService};
use crate::ProviderError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Runs the OCR collaborator for one file. Failures are absorbed into an
/// empty result so one unreadable file never aborts a corpus build.
pub struct TextExtractor<O> {
    ocr: O,
}

impl<O> TextExtractor<O>
where
    O: OcrService + Send + Sync,
{
    pub fn new(ocr: O) -> Self {
        Self { ocr }
    }

    pub async fn extract(&self, file: &SourceFile) -> ExtractedText {
        match self.ocr.analyze(&file.bytes, file.file_type).await {
            Ok(output) => {
                let text = normalize_extracted_text(&output.text);
                debug!(
                    file = %file.name,
                    pages = output.page_count,
                    chars = text.chars().count(),
                    "text extracted"
                );
                ExtractedText {
                    text,
                    page_count: output.page_count,
                }
            }
            Err(error) => {
                warn!(file = %file.name, error = %error, "text extraction failed");
                ExtractedText::empty()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct OcrRequest {
    document_base64: String,
    file_type: FileType,
    mime_type: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    pages: Option<Vec<OcrPage>>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    page_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrPage {
    #[serde(default)]
    #[allow(dead_code)]
    page: Option<u32>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
}

/// OCR service reached over HTTP with a base64 JSON payload.
pub struct HttpOcrService {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpOcrService {
    pub fn new(config: OcrEndpointConfig) -> Result<Self, ProviderError> {
        let endpoint = Url::parse(config.endpoint.trim())?;
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let api_key = config
            .api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(Self {
            client: builder.build()?,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl OcrService for HttpOcrService {
    async fn analyze(&self, bytes: &[u8], file_type: FileType) -> Result<OcrOutput, ProviderError> {
        let payload = OcrRequest {
            document_base64: STANDARD.encode(bytes),
            file_type,
            mime_type: file_type.mime_type(),
        };

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(ProviderError::BackendResponse {
                backend: "ocr".to_string(),
                details: format!("{} returned {}", self.endpoint, response.status()),
            });
        }

        let payload: OcrResponse = response.json().await?;
        payload_to_output(&payload)
    }
}

fn payload_to_output(payload: &OcrResponse) -> Result<OcrOutput, ProviderError> {
    if let Some(listed) = &payload.pages {
        let texts = listed
            .iter()
            .filter_map(|page| page.text.as_deref().map(str::trim))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>();

        if !texts.is_empty() {
            return Ok(OcrOutput {
                text: texts.join("\n\n"),
                page_count: payload.page_count.unwrap_or(listed.len() as u32),
            });
        }
    }

    if let Some(raw_text) = &payload.text {
        let segments = raw_text.split('\u{000c}').collect::<Vec<_>>();
        let texts = segments
            .iter()
            .map(|segment| segment.trim())
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>();

        if !texts.is_empty() {
            return Ok(OcrOutput {
                text: texts.join("\n\n"),
                page_count: payload.page_count.unwrap_or(segments.len() as u32),
            });
        }
    }

    Err(ProviderError::BackendResponse {
        backend: "ocr".to_string(),
        details: "response has no readable text".to_string(),
    })
}

/// Reads the embedded text layer of digital PDFs without calling out.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextLayer;

impl PdfTextLayer {
    pub fn read(&self, bytes: &[u8]) -> Result<OcrOutput, ProviderError> {
        let document =
            Document::load_mem(bytes).map_err(|error| ProviderError::PdfParse(error.to_string()))?;

        let pages = document.get_pages();
        let mut texts = Vec::new();
        for page_no in pages.keys() {
            let text = document
                .extract_text(&[*page_no])
                .map_err(|error| ProviderError::PdfParse(error.to_string()))?;
            if !text.trim().is_empty() {
                texts.push(text.trim().to_string());
            }
        }

        Ok(OcrOutput {
            text: texts.join("\n\n"),
            page_count: pages.len() as u32,
        })
    }
}

#[async_trait]
impl OcrService for PdfTextLayer {
    async fn analyze(&self, bytes: &[u8], file_type: FileType) -> Result<OcrOutput, ProviderError> {
        if file_type.is_image() {
            return Err(ProviderError::Config(format!(
                "{file_type} files have no text layer"
            )));
        }
        self.read(bytes)
    }
}

/// Tries `primary` first and falls back to `secondary` when it fails or
/// yields no text (scanned PDFs have an empty text layer).
pub struct FallbackOcr<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> FallbackOcr<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl<P, S> OcrService for FallbackOcr<P, S>
where
    P: OcrService + Send + Sync,
    S: OcrService + Send + Sync,
{
    async fn analyze(&self, bytes: &[u8], file_type: FileType) -> Result<OcrOutput, ProviderError> {
        match self.primary.analyze(bytes, file_type).await {
            Ok(output) if !output.text.trim().is_empty() => return Ok(output),
            Ok(_) => debug!(%file_type, "primary extractor returned no text"),
            Err(error) => debug!(%file_type, error = %error, "primary extractor failed"),
        }
        self.secondary.analyze(bytes, file_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct FixedOcr(Result<OcrOutput, String>);

    #[async_trait]
    impl OcrService for FixedOcr {
        async fn analyze(&self, _bytes: &[u8], _file_type: FileType) -> Result<OcrOutput, ProviderError> {
            self.0
                .clone()
                .map_err(|details| ProviderError::BackendResponse {
                    backend: "fixed".to_string(),
                    details,
                })
        }
    }

    fn source(name: &str, file_type: FileType) -> SourceFile {
        SourceFile {
            path: PathBuf::from(name),
            name: name.to_string(),
            file_type,
            bytes: b"not really an image".to_vec(),
        }
    }

    #[test]
    fn ocr_payload_with_pages_keeps_only_nonempty_text() {
        let response = OcrResponse {
            pages: Some(vec![
                OcrPage {
                    page: Some(1),
                    text: Some("  ".to_string()),
                },
                OcrPage {
                    page: Some(2),
                    text: Some("Page 2".to_string()),
                },
            ]),
            text: None,
            page_count: None,
        };

        let output = payload_to_output(&response).expect("pages should be parsed");
        assert_eq!(output.text, "Page 2");
        assert_eq!(output.page_count, 2);
    }

    #[test]
    fn ocr_payload_text_is_split_by_form_feed() {
        let response = OcrResponse {
            pages: None,
            text: Some("First\u{000C}Second\n".to_string()),
            page_count: None,
        };

        let output = payload_to_output(&response).expect("text should be parsed");
        assert_eq!(output.text, "First\n\nSecond");
        assert_eq!(output.page_count, 2);
    }

    #[test]
    fn empty_ocr_payload_is_an_error() {
        let response = OcrResponse {
            pages: Some(Vec::new()),
            text: Some(" \u{000C} ".to_string()),
            page_count: Some(3),
        };
        assert!(payload_to_output(&response).is_err());
    }

    #[tokio::test]
    async fn extraction_failure_yields_empty_text() {
        let extractor = TextExtractor::new(FixedOcr(Err("service down".to_string())));
        let extracted = extractor.extract(&source("bad.png", FileType::Png)).await;
        assert!(extracted.is_empty());
        assert_eq!(extracted.page_count, 0);
    }

    #[tokio::test]
    async fn extraction_normalizes_text() {
        let extractor = TextExtractor::new(FixedOcr(Ok(OcrOutput {
            text: "  Invoice   #42\r\n\r\n\r\ndue March 1. ".to_string(),
            page_count: 1,
        })));
        let extracted = extractor.extract(&source("inv.jpg", FileType::Jpg)).await;
        assert_eq!(extracted.text, "Invoice #42\n\ndue March 1.");
        assert_eq!(extracted.page_count, 1);
    }

    #[tokio::test]
    async fn text_layer_rejects_images_and_fallback_takes_over() {
        let ocr = FallbackOcr::new(
            PdfTextLayer,
            FixedOcr(Ok(OcrOutput {
                text: "from ocr".to_string(),
                page_count: 1,
            })),
        );
        let output = ocr.analyze(b"\x89PNG", FileType::Png).await.unwrap();
        assert_eq!(output.text, "from ocr");
    }

    #[tokio::test]
    async fn fallback_skips_broken_pdf_text_layer() {
        let ocr = FallbackOcr::new(
            PdfTextLayer,
            FixedOcr(Ok(OcrOutput {
                text: "scanned page".to_string(),
                page_count: 4,
            })),
        );
        let output = ocr.analyze(b"%PDF-1.4\n%broken", FileType::Pdf).await.unwrap();
        assert_eq!(output.page_count, 4);
    }
}
