//! Prompt templates and request builders for each gateway call.
//!
//! The wording here is configuration; the pipeline only depends on the
//! builder signatures.

use crate::{
    gateway::{ChatMessage, ChatRequest, ContentPart, Modality},
    models::{CampaignRequest, ImageAttachment},
};

/// Visual styles offered by the builder. The first entry is the fallback.
const STYLE_DESCRIPTIONS: &[(&str, &str)] = &[
    ("Photorealistic", "photorealistic, high-end commercial photography, studio lighting, crisp detail"),
    ("Neon", "neon lighting, dark moody atmosphere, vibrant glowing colors, cyberpunk-inspired"),
    ("Pastel", "soft pastel colors, minimalist, clean, gentle gradients, calm aesthetic"),
    ("Luxury", "luxury, gold accents, rich textures, premium feel, elegant composition, dark tones"),
];

/// Resolves a visual style name (case-insensitive). Unknown names get the Photorealistic description.
pub fn style_description(style: &str) -> &'static str {
    let style = style.trim();
    STYLE_DESCRIPTIONS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(style))
        .unwrap_or(&STYLE_DESCRIPTIONS[0])
        .1
}

const VISION_INSTRUCTION: &str = "You are an expert product analyst. Describe the product in this image: \
what it is, its colors, textures, materials, shape and any distinctive features. Be specific enough that a \
text-to-image model could reproduce this exact product in a new scene. Keep it to 3-4 sentences.";

const CAPTION_INSTRUCTION: &str = "You are an expert social media copywriter. Write a caption for a marketing post. \
The caption must:\n\
1. Be engaging and on-brand\n\
2. Be between 50 and 150 words\n\
3. Match the tone of the campaign theme\n\
4. Include a clear call to action\n\
5. End with 2-3 relevant hashtags\n\
Output ONLY the caption text.";

fn color_phrase(brand_color: &str) -> String {
    if brand_color.is_empty() {
        "a color palette that suits the brand".to_string()
    } else {
        format!("the brand color {brand_color} as a dominant accent")
    }
}

fn prompt_instruction(req: &CampaignRequest) -> String {
    let headline = &req.headline_text;
    format!(
        "You are a prompt engineer for an AI image generator. Write a single, detailed prompt for a 1:1 square \
marketing image. The image must:\n\
1. Feature the text \"{headline}\" rendered clearly and legibly as part of the design\n\
2. Match the visual style: {style}\n\
3. Use {color}\n\
4. Suit a {theme}-themed {industry} marketing campaign for the brand \"{brand}\"\n\
5. Look professional and eye-catching on social media\n\n\
Rules:\n\
- Output ONLY the prompt text\n\
- Describe the scene; do not write instructions such as \"generate\" or \"create\"\n\
- The text \"{headline}\" must be spelled exactly like that and be the focal point\n\
- Stay under 200 words\n\
- Cover composition, lighting, typography style and visual elements",
        style = style_description(&req.visual_style),
        color = color_phrase(&req.brand_color),
        theme = req.theme,
        industry = req.industry,
        brand = req.brand_name,
    )
}

fn brief(req: &CampaignRequest) -> String {
    format!(
        "Brand: {}\nIndustry: {}\nTheme/Occasion: {}\nHeadline Text: \"{}\"\nVisual Style: {}",
        req.brand_name, req.industry, req.theme, req.headline_text, req.visual_style
    )
}

/// Stage 1: describe the uploaded product photo.
pub fn vision_request(model: &str, product: &ImageAttachment) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::user_parts(vec![
            ContentPart::text(VISION_INSTRUCTION),
            ContentPart::image(product.data_url()),
        ])],
        modalities: None,
    }
}

/// Stage 2: have the text model write the image prompt.
pub fn prompt_request(model: &str, req: &CampaignRequest, product_context: &str) -> ChatRequest {
    let mut user = brief(req);
    if !req.brand_color.is_empty() {
        user.push_str(&format!("\nBrand Color: {}", req.brand_color));
    }
    if !product_context.is_empty() {
        user.push_str(&format!(
            "\n\nPRODUCT CONTEXT (from the uploaded product photo):\n{product_context}\n\
You MUST incorporate this exact product into the scene naturally."
        ));
    }
    user.push_str("\n\nWrite the image generation prompt now.");

    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::system(prompt_instruction(req)), ChatMessage::user(user)],
        modalities: None,
    }
}

/// Stage 3: the prompt plus any uploaded images as visual references.
pub fn image_request(model: &str, prompt: &str, req: &CampaignRequest) -> ChatRequest {
    let mut parts = vec![ContentPart::text(prompt)];
    parts.extend(
        [&req.product_image, &req.logo_image]
            .into_iter()
            .flatten()
            .map(|img| ContentPart::image(img.data_url())),
    );
    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::user_parts(parts)],
        modalities: Some(vec![Modality::Image, Modality::Text]),
    }
}

/// Stage 4: social caption.
pub fn caption_request(model: &str, req: &CampaignRequest) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(CAPTION_INSTRUCTION),
            ChatMessage::user(format!("{}\n\nWrite a matching social media caption.", brief(req))),
        ],
        modalities: None,
    }
}

// --- Quick ad image ---

/// Styles for the single-shot ad generator, which writes its own prompt from a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickStyle {
    Photorealistic,
    Cyberpunk,
    Pastel,
    Render3d,
    Lifestyle,
}

impl QuickStyle {
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "cyberpunk" => QuickStyle::Cyberpunk,
            "pastel" => QuickStyle::Pastel,
            "3d-render" => QuickStyle::Render3d,
            "lifestyle" => QuickStyle::Lifestyle,
            _ => QuickStyle::Photorealistic,
        }
    }

    pub fn prompt(self, headline: &str, brand: &str, description: &str) -> String {
        let scene = match self {
            QuickStyle::Photorealistic => format!(
                "A premium, high-end product photography scene. Clean white studio background, dramatic lighting, \
professional commercial style. Feature the text \"{headline}\" prominently in elegant serif typography. \
Product context: {description} for {brand}."
            ),
            QuickStyle::Cyberpunk => format!(
                "A vibrant neon cyberpunk scene. Dark moody background with electric blue, pink and purple neon glow, \
futuristic cityscape. Feature the text \"{headline}\" in bold glowing neon typography. Brand: {brand}."
            ),
            QuickStyle::Pastel => format!(
                "A minimalist pastel composition. Soft blush pink, lavender and mint, generous negative space, clean \
geometric shapes. Feature the text \"{headline}\" in modern sans-serif typography. Brand: {brand}."
            ),
            QuickStyle::Render3d => format!(
                "A striking 3D rendered scene. Abstract geometric shapes, glossy materials, dramatic lighting with \
reflections. Feature the text \"{headline}\" in bold extruded 3D typography. Brand: {brand}."
            ),
            QuickStyle::Lifestyle => format!(
                "A warm, candid lifestyle photograph. People enjoying the moment in golden hour light, authentic and \
relatable. Feature the text \"{headline}\" in friendly modern typography as an overlay. Product context: \
{description} for {brand}."
            ),
        };
        format!("{scene} Ultra high resolution, 1:1 aspect ratio.")
    }
}

pub fn quick_ad_request(model: &str, style: QuickStyle, headline: &str, brand: &str, description: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::user(style.prompt(headline, brand, description))],
        modalities: Some(vec![Modality::Image, Modality::Text]),
    }
}
