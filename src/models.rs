use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use tracing::debug;
use uuid::Uuid;

use crate::{error::{ErrorKind, PipelineError}, pipeline::StageReport};

pub const MAX_HEADLINE_CHARS: usize = 80;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

// --- Inbound wire forms ---

/// Body of `POST /api/campaign` as the builder UI sends it.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignForm {
    #[serde(default)]
    pub brand_name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub headline_text: String,
    #[serde(default)]
    pub visual_style: String,
    #[serde(default)]
    pub brand_color: String,
    #[serde_as(as = "Option<Base64>")]
    #[serde(default)]
    pub product_image_base64: Option<Vec<u8>>,
    #[serde(default)]
    pub product_image_mime_type: Option<String>,
    #[serde_as(as = "Option<Base64>")]
    #[serde(default)]
    pub logo_image_base64: Option<Vec<u8>>,
    #[serde(default)]
    pub logo_image_mime_type: Option<String>,
}

/// Body of `POST /api/ad-image`, the single-shot quick ad generator.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdImageForm {
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub brand_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// --- Domain ---

#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub data: Bytes,
}

impl ImageAttachment {
    /// Checks an uploaded image the same way the builder UI does before it
    /// reaches the pipeline: an `image/*` type, at most 5 MiB, and bytes that
    /// actually look like an image.
    pub fn new(label: &str, mime_type: &str, data: Bytes) -> Result<Self, PipelineError> {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        if !mime_type.starts_with("image/") {
            return Err(PipelineError::validation(format!("{label} must be an image, got '{mime_type}'")));
        }
        if data.len() > MAX_IMAGE_BYTES {
            return Err(PipelineError::validation(format!("{label} is too large. Max file size is 5MB.")));
        }
        let detected = image::guess_format(&data)
            .map_err(|_| PipelineError::validation(format!("{label} is not a recognisable image")))?;

        let detected_mime = detected.to_mime_type();
        if detected_mime != mime_type {
            debug!(label, declared = %mime_type, detected = detected_mime, "Correcting declared image type");
        }
        Ok(Self { mime_type: detected_mime.to_string(), data })
    }

    /// Only a payload together with its type counts as an attachment.
    fn from_form(label: &str, data: Option<Vec<u8>>, mime_type: Option<String>) -> Result<Option<Self>, PipelineError> {
        match (data, mime_type) {
            (Some(data), Some(mime)) if !data.is_empty() && !mime.trim().is_empty() => {
                Self::new(label, &mime, Bytes::from(data)).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn data_url(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.data);
        format!("data:{};base64,{}", self.mime_type, encoded)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CampaignRequest {
    pub brand_name: String,
    pub industry: String,
    pub theme: String,
    pub headline_text: String,
    pub visual_style: String,
    pub brand_color: String,
    pub product_image: Option<ImageAttachment>,
    pub logo_image: Option<ImageAttachment>,
}

impl CampaignRequest {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.brand_name.trim().is_empty() {
            return Err(PipelineError::validation("Brand name is required"));
        }
        if self.headline_text.trim().is_empty() {
            return Err(PipelineError::validation("Headline text is required"));
        }
        if self.headline_text.chars().count() > MAX_HEADLINE_CHARS {
            return Err(PipelineError::validation(format!(
                "Headline text must be at most {MAX_HEADLINE_CHARS} characters"
            )));
        }
        if !self.brand_color.is_empty() && !is_hex_color(&self.brand_color) {
            return Err(PipelineError::validation(format!(
                "Brand color '{}' is not a hex color like #4F46E5",
                self.brand_color
            )));
        }
        Ok(())
    }
}

impl TryFrom<CampaignForm> for CampaignRequest {
    type Error = PipelineError;

    fn try_from(form: CampaignForm) -> Result<Self, Self::Error> {
        let request = CampaignRequest {
            product_image: ImageAttachment::from_form(
                "Product image",
                form.product_image_base64,
                form.product_image_mime_type,
            )?,
            logo_image: ImageAttachment::from_form("Logo image", form.logo_image_base64, form.logo_image_mime_type)?,
            brand_name: form.brand_name.trim().to_string(),
            industry: form.industry.trim().to_string(),
            theme: form.theme.trim().to_string(),
            headline_text: form.headline_text.trim().to_string(),
            visual_style: form.visual_style.trim().to_string(),
            brand_color: form.brand_color.trim().to_string(),
        };
        request.validate()?;
        Ok(request)
    }
}

fn is_hex_color(s: &str) -> bool {
    match s.strip_prefix('#') {
        Some(hex) => matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Completed,
    Failed(PipelineError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CampaignResult {
    pub image_url: Option<String>,
    pub caption: Option<String>,
    pub prompt: Option<String>,
    pub status: RunStatus,
}

impl CampaignResult {
    pub fn completed(image_url: String, prompt: String, caption: Option<String>) -> Self {
        Self { image_url: Some(image_url), caption, prompt: Some(prompt), status: RunStatus::Completed }
    }

    pub fn failed(error: PipelineError, prompt: Option<String>) -> Self {
        Self { image_url: None, caption: None, prompt, status: RunStatus::Failed(error) }
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match &self.status {
            RunStatus::Failed(e) => Some(e),
            RunStatus::Completed => None,
        }
    }
}

// --- Outbound ---

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CampaignResponse {
    pub run_id: Uuid,
    pub image_url: String,
    pub caption: Option<String>,
    pub prompt: String,
    pub status: String,
    pub generated_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AdImageResponse {
    pub image_url: String,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x06\0\0\0";
    pub const JPEG_BYTES: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF\0\x01\x01\0\0\x01\0\x01\0\0";

    pub fn png() -> ImageAttachment {
        ImageAttachment { mime_type: "image/png".into(), data: Bytes::from_static(PNG_BYTES) }
    }

    pub fn jpeg() -> ImageAttachment {
        ImageAttachment { mime_type: "image/jpeg".into(), data: Bytes::from_static(JPEG_BYTES) }
    }

    /// Scenario A inputs: no images.
    pub fn luxe() -> CampaignRequest {
        CampaignRequest {
            brand_name: "Luxe".into(),
            industry: "Fashion".into(),
            theme: "Black Friday".into(),
            headline_text: "50% OFF".into(),
            visual_style: "Neon".into(),
            brand_color: "#FF00AA".into(),
            product_image: None,
            logo_image: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{fixtures::*, *};
    use pretty_assertions::assert_eq;

    fn form_json(extra: serde_json::Value) -> CampaignForm {
        let mut base = serde_json::json!({
            "brandName": "  Luxe ",
            "industry": "Fashion",
            "theme": "Black Friday",
            "headlineText": "50% OFF",
            "visualStyle": "Neon",
            "brandColor": "#ff00aa",
        });
        if let (Some(obj), Some(more)) = (base.as_object_mut(), extra.as_object()) {
            obj.extend(more.clone());
        }
        serde_json::from_value(base).unwrap()
    }

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn form_converts_and_trims() {
        let req = CampaignRequest::try_from(form_json(serde_json::json!({}))).unwrap();
        assert_eq!(req.brand_name, "Luxe");
        assert_eq!(req.product_image, None);
        assert_eq!(req.logo_image, None);
    }

    #[test]
    fn base64_images_are_decoded() {
        let form = form_json(serde_json::json!({
            "productImageBase64": b64(PNG_BYTES),
            "productImageMimeType": "image/png",
            "logoImageBase64": b64(JPEG_BYTES),
            "logoImageMimeType": "image/jpeg",
        }));
        let req = CampaignRequest::try_from(form).unwrap();
        assert_eq!(req.product_image, Some(png()));
        assert_eq!(req.logo_image, Some(jpeg()));
    }

    #[test]
    fn image_without_mime_type_is_ignored() {
        let form = form_json(serde_json::json!({ "productImageBase64": b64(PNG_BYTES) }));
        let req = CampaignRequest::try_from(form).unwrap();
        assert_eq!(req.product_image, None);

        let form = form_json(serde_json::json!({ "logoImageBase64": "", "logoImageMimeType": "image/png" }));
        assert_eq!(CampaignRequest::try_from(form).unwrap().logo_image, None);
    }

    #[test]
    fn invalid_base64_fails_to_parse() {
        let value = serde_json::json!({ "brandName": "x", "productImageBase64": "not base64!!" });
        assert!(serde_json::from_value::<CampaignForm>(value).is_err());
    }

    #[test]
    fn missing_brand_or_headline_is_a_validation_error() {
        let mut req = luxe();
        req.brand_name = "   ".into();
        assert_eq!(req.validate().unwrap_err().kind, ErrorKind::Validation);

        let mut req = luxe();
        req.headline_text = String::new();
        assert_eq!(req.validate().unwrap_err().kind, ErrorKind::Validation);
    }

    #[test]
    fn headline_length_is_limited() {
        let mut req = luxe();
        req.headline_text = "é".repeat(MAX_HEADLINE_CHARS);
        assert!(req.validate().is_ok());
        req.headline_text.push('!');
        assert_eq!(req.validate().unwrap_err().kind, ErrorKind::Validation);
    }

    #[test]
    fn brand_color_must_be_hex_when_given() {
        let mut req = luxe();
        for ok in ["#fff", "#4F46E5", ""] {
            req.brand_color = ok.into();
            assert!(req.validate().is_ok(), "{ok}");
        }
        for bad in ["red", "4F46E5", "#12345", "#GGGGGG"] {
            req.brand_color = bad.into();
            assert!(req.validate().is_err(), "{bad}");
        }
    }

    #[test]
    fn attachments_must_be_images() {
        let err = ImageAttachment::new("Logo", "application/pdf", Bytes::from_static(PNG_BYTES)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let err = ImageAttachment::new("Logo", "image/png", Bytes::from_static(b"hello world")).unwrap_err();
        assert!(err.message.contains("not a recognisable image"));

        let big = Bytes::from(vec![0u8; MAX_IMAGE_BYTES + 1]);
        let err = ImageAttachment::new("Logo", "image/png", big).unwrap_err();
        assert!(err.message.contains("too large"));
    }

    #[test]
    fn declared_type_is_corrected_from_content() {
        let att = ImageAttachment::new("Product", "image/png", Bytes::from_static(JPEG_BYTES)).unwrap();
        assert_eq!(att.mime_type, "image/jpeg");
    }

    #[test]
    fn data_url_embeds_type_and_payload() {
        let url = png().data_url();
        assert!(url.starts_with("data:image/png;base64,"));
        assert!(url.ends_with(&b64(PNG_BYTES)));
    }

    #[test]
    fn error_body_omits_missing_run_id() {
        let body = ErrorBody { error: "nope".into(), kind: ErrorKind::RateLimited, run_id: None };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "nope", "kind": "rate_limited" }));
    }
}
