//! OpenAI-compatible chat-completions wire format, images as JPEG data URLs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use facevote_pipeline::OracleError;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: [Message<'a>; 1],
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Serialize)]
pub(crate) struct Message<'a> {
    pub role: &'static str,
    pub content: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum Content<'a> {
    ImageUrl { image_url: ImageUrl<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageUrl<'a> {
    pub url: &'a str,
}

impl<'a> ChatRequest<'a> {
    /// One user turn: both images, then the question.
    pub fn compare(model: &'a str, images: &'a [String; 2], prompt: &'a str) -> Self {
        Self {
            model,
            messages: [Message {
                role: "user",
                content: vec![
                    Content::ImageUrl {
                        image_url: ImageUrl { url: &images[0] },
                    },
                    Content::ImageUrl {
                        image_url: ImageUrl { url: &images[1] },
                    },
                    Content::Text { text: prompt },
                ],
            }],
            max_tokens: 50,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    pub fn into_text(self) -> Option<String> {
        self.choices.into_iter().next()?.message.content
    }
}

/// Encode as a `data:image/jpeg;base64,…` URL. Alpha is dropped.
pub(crate) fn jpeg_data_url(image: &DynamicImage, quality: u8) -> Result<String, OracleError> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&rgb)
        .map_err(|e| OracleError::Encoding(e.to_string()))?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&buf)))
}
