//! Vision-model implementations of the layout and text-line passes.
//!
//! Both passes send the page PNG with a JSON-only prompt and parse the reply
//! leniently: code fences and prose around the outermost JSON array are
//! ignored, and elements that do not fit the schema are skipped.

use crate::config::ConversionConfig;
use crate::error::Pdf2DocxError;
use crate::pipeline::encode;
use crate::pipeline::llm::{chat_with_retry, ChatClient, ChatRequest, RetryPolicy};
use crate::pipeline::render::PageImage;
use crate::prompts::{LAYOUT_PROMPT, LINES_PROMPT};
use crate::recognize::layout::{LayoutDetector, LayoutRegion, LineRecognizer, TextLine};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// Extract the outermost JSON array from a model reply and decode each
/// element independently. Returns `None` when there is no array at all.
pub fn parse_json_array<T: DeserializeOwned>(reply: &str) -> Option<Vec<T>> {
    let start = reply.find('[')?;
    let end = reply.rfind(']')?;
    if end < start {
        return None;
    }
    let values: Vec<serde_json::Value> = serde_json::from_str(&reply[start..=end]).ok()?;
    Some(
        values
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
    )
}

/// Shared request plumbing for one vision pass.
#[derive(Clone)]
struct VisionPass {
    client: Arc<dyn ChatClient>,
    policy: RetryPolicy,
    temperature: f32,
    max_tokens: usize,
    prompt: &'static str,
    pass: &'static str,
}

impl VisionPass {
    async fn ask<T: DeserializeOwned>(&self, page: &PageImage) -> Result<Vec<T>, Pdf2DocxError> {
        let request = ChatRequest {
            system: self.prompt.to_string(),
            user: String::new(),
            images: vec![encode::to_image_data(&page.image, page.page_num)?],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let reply = chat_with_retry(self.client.as_ref(), &request, self.policy)
            .await
            .map_err(|e| Pdf2DocxError::RecognitionFailed {
                backend: self.pass.to_string(),
                detail: format!("page {}: {e}", page.page_num),
            })?;
        let items = parse_json_array(&reply).ok_or_else(|| Pdf2DocxError::RecognitionFailed {
            backend: self.pass.to_string(),
            detail: format!("page {}: reply is not a JSON array", page.page_num),
        })?;
        debug!("Page {}: {} returned {} items", page.page_num, self.pass, items.len());
        Ok(items)
    }
}

/// Layout detection by a vision model.
pub struct VisionLayoutDetector(VisionPass);

impl VisionLayoutDetector {
    pub fn new(client: Arc<dyn ChatClient>, config: &ConversionConfig) -> Self {
        Self(VisionPass {
            client,
            policy: RetryPolicy::from_config(config),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            prompt: LAYOUT_PROMPT,
            pass: "layout",
        })
    }
}

#[async_trait]
impl LayoutDetector for VisionLayoutDetector {
    async fn detect(&self, page: &PageImage) -> Result<Vec<LayoutRegion>, Pdf2DocxError> {
        self.0.ask(page).await
    }
}

/// Text-line recognition by a vision model.
pub struct VisionLineRecognizer(VisionPass);

impl VisionLineRecognizer {
    pub fn new(client: Arc<dyn ChatClient>, config: &ConversionConfig) -> Self {
        Self(VisionPass {
            client,
            policy: RetryPolicy::from_config(config),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            prompt: LINES_PROMPT,
            pass: "text-lines",
        })
    }
}

#[async_trait]
impl LineRecognizer for VisionLineRecognizer {
    async fn recognize(&self, page: &PageImage) -> Result<Vec<TextLine>, Pdf2DocxError> {
        self.0.ask(page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;

    #[test]
    fn parses_fenced_array() {
        let reply = "```json\n[{\"text\": \"Hi\", \"bbox\": [1, 2, 3, 4]}]\n```";
        let lines: Vec<TextLine> = parse_json_array(reply).unwrap();
        assert_eq!(lines[0].text, "Hi");
        assert_eq!(lines[0].bbox, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn skips_malformed_elements() {
        let reply = r#"[{"label": "Text", "bbox": [0, 0, 1, 1]}, {"label": "Text"}, 7]"#;
        let regions: Vec<LayoutRegion> = parse_json_array(reply).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].position, None);
    }

    #[test]
    fn no_array_is_none() {
        assert!(parse_json_array::<TextLine>("I cannot read this page.").is_none());
        assert!(parse_json_array::<TextLine>("] oops [").is_none());
    }

    struct Canned(&'static str);

    #[async_trait]
    impl ChatClient for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<String, CallError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn detector_parses_reply() {
        let detector = VisionLayoutDetector::new(
            Arc::new(Canned(r#"[{"label": "Title", "bbox": [0, 0, 10, 10], "position": 0}]"#)),
            &ConversionConfig::default(),
        );
        let page = PageImage {
            page_num: 1,
            image: image::DynamicImage::new_rgb8(4, 4),
        };
        let regions = detector.detect(&page).await.unwrap();
        assert_eq!(regions[0].label, "Title");
        assert_eq!(regions[0].position, Some(0));
    }

    #[tokio::test]
    async fn recognizer_rejects_prose() {
        let recognizer = VisionLineRecognizer::new(
            Arc::new(Canned("no text here")),
            &ConversionConfig::default(),
        );
        let page = PageImage {
            page_num: 3,
            image: image::DynamicImage::new_rgb8(4, 4),
        };
        let err = recognizer.recognize(&page).await.unwrap_err();
        assert!(err.to_string().contains("page 3"));
    }
}
