// ============================================================================
// REMOTE INPAINTING — request preparation, validation, and HTTP client
// ============================================================================
//
// The service accepts a JSON payload of base64 PNG image + mask, a prompt,
// and optional numeric parameters, and answers with image bytes (raw or
// base64-wrapped). All network work is blocking; the GUI runs it on a worker
// thread (see app.rs), the CLI runs it inline.
//
// Without an API key the client operates in mock mode: it fabricates a
// placeholder result locally so the whole pipeline can be exercised offline.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgba, RgbaImage};
use serde::Serialize;
use std::time::Duration;

use crate::config::Settings;

pub const MAX_PROMPT_LEN: usize = 500;
pub const MAX_SEED: i64 = i32::MAX as i64;

// ============================================================================
// ERRORS
// ============================================================================

/// Failures on the submission path, mapped from the service's status codes.
#[derive(Debug)]
pub enum InpaintError {
    /// A request field failed validation before anything was sent.
    Validation { field: &'static str, message: String },
    /// The service rejected the configured API key.
    Auth,
    /// The service asked us to back off.
    RateLimited { retry_after: String },
    /// The service itself failed (5xx).
    Upstream(String),
    /// The request did not complete within the configured timeout.
    Timeout(u64),
    /// Transport-level failure (DNS, connect, TLS, ...).
    Network(String),
    /// A 2xx answer that does not contain an image in any understood form.
    InvalidResponse(String),
}

impl std::fmt::Display for InpaintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InpaintError::Validation { field, message } => {
                write!(f, "Invalid {}: {}", field, message)
            }
            InpaintError::Auth => write!(f, "Inpainting service rejected the API key"),
            InpaintError::RateLimited { retry_after } => {
                write!(f, "Rate limit exceeded, retry after {} seconds", retry_after)
            }
            InpaintError::Upstream(e) => write!(f, "Inpainting service error: {}", e),
            InpaintError::Timeout(secs) => {
                write!(f, "Inpainting request timed out after {} seconds", secs)
            }
            InpaintError::Network(e) => write!(f, "Failed to reach inpainting service: {}", e),
            InpaintError::InvalidResponse(e) => {
                write!(f, "Unexpected response from inpainting service: {}", e)
            }
        }
    }
}

impl std::error::Error for InpaintError {}

// ============================================================================
// PARAMETERS & VALIDATION
// ============================================================================

/// User-tunable generation parameters, validated before submission.
#[derive(Clone, Debug)]
pub struct InpaintParams {
    pub prompt: String,
    pub seed: Option<i64>,
    pub strength: f32,
    pub guidance_scale: f32,
}

impl Default for InpaintParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            seed: None,
            strength: 0.8,
            guidance_scale: 7.5,
        }
    }
}

impl InpaintParams {
    /// Enforce the service's field contract: non-empty prompt of at most 500
    /// chars, seed in [0, 2^31-1], strength in [0,1], guidance in [1,20].
    /// Returns the trimmed prompt on success.
    pub fn validate(&self) -> Result<String, InpaintError> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(InpaintError::Validation {
                field: "prompt",
                message: "prompt must not be empty".to_string(),
            });
        }
        if prompt.chars().count() > MAX_PROMPT_LEN {
            return Err(InpaintError::Validation {
                field: "prompt",
                message: format!("prompt exceeds {} characters", MAX_PROMPT_LEN),
            });
        }
        if let Some(seed) = self.seed {
            if !(0..=MAX_SEED).contains(&seed) {
                return Err(InpaintError::Validation {
                    field: "seed",
                    message: format!("seed must be in [0, {}]", MAX_SEED),
                });
            }
        }
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(InpaintError::Validation {
                field: "strength",
                message: "strength must be in [0, 1]".to_string(),
            });
        }
        if !(1.0..=20.0).contains(&self.guidance_scale) {
            return Err(InpaintError::Validation {
                field: "guidance_scale",
                message: "guidance scale must be in [1, 20]".to_string(),
            });
        }
        Ok(prompt.to_string())
    }
}

// ============================================================================
// REQUEST PREPARATION
// ============================================================================

/// Source image re-encoded for submission, with the dimensions the mask must
/// match.
pub struct PreparedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

fn encode_rgba_png(img: &RgbaImage) -> Result<Vec<u8>, InpaintError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(img.as_raw(), img.width(), img.height(), ColorType::Rgba8)
        .map_err(|e| InpaintError::InvalidResponse(e.to_string()))?;
    Ok(out)
}

/// Validate and normalize the source photo: PNG or JPEG only, side lengths
/// within the configured bounds, transparency flattened onto white,
/// re-encoded as PNG so the service always sees one consistent format.
pub fn prepare_image(bytes: &[u8], settings: &Settings) -> Result<PreparedImage, InpaintError> {
    if bytes.len() as u64 > settings.max_file_size_mb * 1024 * 1024 {
        return Err(InpaintError::Validation {
            field: "image",
            message: format!("file exceeds {} MB", settings.max_file_size_mb),
        });
    }
    let format = image::guess_format(bytes).map_err(|e| InpaintError::Validation {
        field: "image",
        message: format!("not a decodable image: {}", e),
    })?;
    if !matches!(format, image::ImageFormat::Png | image::ImageFormat::Jpeg) {
        return Err(InpaintError::Validation {
            field: "image",
            message: "image must be PNG or JPEG".to_string(),
        });
    }
    let decoded = image::load_from_memory(bytes).map_err(|e| InpaintError::Validation {
        field: "image",
        message: format!("not a decodable image: {}", e),
    })?;
    let (w, h) = (decoded.width(), decoded.height());
    if w > settings.max_image_dimension || h > settings.max_image_dimension {
        return Err(InpaintError::Validation {
            field: "image",
            message: format!(
                "dimensions {}x{} exceed {} px",
                w, h, settings.max_image_dimension
            ),
        });
    }
    if w < settings.min_image_dimension || h < settings.min_image_dimension {
        return Err(InpaintError::Validation {
            field: "image",
            message: format!(
                "dimensions {}x{} below minimum {} px",
                w, h, settings.min_image_dimension
            ),
        });
    }

    // Flatten alpha onto a white background; the service works in RGB.
    let rgba = decoded.to_rgba8();
    let mut flat = RgbaImage::new(w, h);
    for (src, dst) in rgba.pixels().zip(flat.pixels_mut()) {
        let a = src.0[3] as u16;
        let blend = |c: u8| ((c as u16 * a + 255 * (255 - a)) / 255) as u8;
        *dst = Rgba([blend(src.0[0]), blend(src.0[1]), blend(src.0[2]), 255]);
    }

    Ok(PreparedImage {
        png: encode_rgba_png(&flat)?,
        width: w,
        height: h,
    })
}

/// Validate and normalize the mask: PNG with an alpha channel (or grayscale),
/// dimensions equal to the prepared image's, re-encoded as a white RGBA mask
/// whose alpha marks the fill region.
pub fn prepare_mask(bytes: &[u8], image_w: u32, image_h: u32) -> Result<Vec<u8>, InpaintError> {
    let format = image::guess_format(bytes).map_err(|e| InpaintError::Validation {
        field: "mask",
        message: format!("not a decodable image: {}", e),
    })?;
    if format != image::ImageFormat::Png {
        return Err(InpaintError::Validation {
            field: "mask",
            message: "mask must be a PNG".to_string(),
        });
    }
    let decoded = image::load_from_memory(bytes).map_err(|e| InpaintError::Validation {
        field: "mask",
        message: format!("mask failed to decode: {}", e),
    })?;
    if (decoded.width(), decoded.height()) != (image_w, image_h) {
        return Err(InpaintError::Validation {
            field: "mask",
            message: format!(
                "mask dimensions {}x{} must match image dimensions {}x{}",
                decoded.width(),
                decoded.height(),
                image_w,
                image_h
            ),
        });
    }

    let has_alpha = decoded.color().has_alpha();
    let rgba = decoded.to_rgba8();
    let mut normalized = RgbaImage::new(image_w, image_h);
    for (src, dst) in rgba.pixels().zip(normalized.pixels_mut()) {
        // Grayscale masks carry the coverage in luminance instead of alpha.
        let coverage = if has_alpha { src.0[3] } else { src.0[0] };
        *dst = Rgba([255, 255, 255, coverage]);
    }

    encode_rgba_png(&normalized)
}

/// Resample a view-space mask PNG to the source image's native dimensions.
/// The editor paints in view space; the service wants mask and image sizes to
/// match exactly. Nearest-neighbour keeps the mask binary-ish.
pub fn scale_mask_to(mask_png: &[u8], width: u32, height: u32) -> Result<Vec<u8>, InpaintError> {
    let decoded = image::load_from_memory(mask_png)
        .map_err(|e| InpaintError::Validation {
            field: "mask",
            message: format!("mask failed to decode: {}", e),
        })?
        .to_rgba8();
    if decoded.dimensions() == (width, height) {
        return Ok(mask_png.to_vec());
    }
    let scaled = image::imageops::resize(
        &decoded,
        width,
        height,
        image::imageops::FilterType::Nearest,
    );
    encode_rgba_png(&scaled)
}

// ============================================================================
// CLIENT
// ============================================================================

/// Wire payload for the inpainting endpoint.
#[derive(Serialize)]
struct InpaintPayload<'a> {
    image: &'a str,
    mask: &'a str,
    prompt: &'a str,
    strength: f32,
    guidance_scale: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

/// A fully prepared, validated submission.
pub struct InpaintJob {
    pub image_png: Vec<u8>,
    pub mask_png: Vec<u8>,
    pub prompt: String,
    pub params: InpaintParams,
    pub width: u32,
    pub height: u32,
}

impl InpaintJob {
    /// Prepare and validate everything up front so a job either fails fast
    /// or is guaranteed wire-ready.
    pub fn build(
        image_bytes: &[u8],
        mask_bytes: &[u8],
        params: InpaintParams,
        settings: &Settings,
    ) -> Result<Self, InpaintError> {
        let prompt = params.validate()?;
        let prepared = prepare_image(image_bytes, settings)?;
        let mask_png = prepare_mask(mask_bytes, prepared.width, prepared.height)?;
        Ok(Self {
            image_png: prepared.png,
            mask_png,
            prompt,
            params,
            width: prepared.width,
            height: prepared.height,
        })
    }
}

pub struct InpaintClient {
    settings: Settings,
}

impl InpaintClient {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Submit a prepared job and return the resulting image bytes.
    pub fn inpaint(&self, job: &InpaintJob) -> Result<Vec<u8>, InpaintError> {
        if self.settings.mock_mode() {
            crate::log_info!("No API key configured — returning mock inpaint result");
            return mock_result(job);
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.settings.timeout_secs))
            .build()
            .map_err(|e| InpaintError::Network(e.to_string()))?;

        let image_b64 = BASE64.encode(&job.image_png);
        let mask_b64 = BASE64.encode(&job.mask_png);
        let payload = InpaintPayload {
            image: &image_b64,
            mask: &mask_b64,
            prompt: &job.prompt,
            strength: job.params.strength,
            guidance_scale: job.params.guidance_scale,
            seed: job.params.seed,
        };

        crate::log_info!(
            "Submitting inpaint request to {} (prompt {} chars)",
            self.settings.api_url,
            job.prompt.chars().count()
        );

        let response = client
            .post(&self.settings.api_url)
            .bearer_auth(&self.settings.api_key)
            .json(&payload)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    InpaintError::Timeout(self.settings.timeout_secs)
                } else {
                    InpaintError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        match status.as_u16() {
            200 => Self::extract_image(response),
            400 => Err(InpaintError::Validation {
                field: "request",
                message: Self::extract_error(response),
            }),
            401 => Err(InpaintError::Auth),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("60")
                    .to_string();
                Err(InpaintError::RateLimited { retry_after })
            }
            s if s >= 500 => Err(InpaintError::Upstream(format!("HTTP {}", s))),
            s => Err(InpaintError::InvalidResponse(format!(
                "HTTP {}: {}",
                s,
                Self::extract_error(response)
            ))),
        }
    }

    /// Reachability probe used by the status bar and `--check-health`.
    /// A 404 still proves the host is up when the service has no dedicated
    /// health route.
    pub fn health_check(&self) -> bool {
        if self.settings.mock_mode() {
            return true;
        }
        let url = self.settings.api_url.replace("/inpaint", "/health");
        let client = match reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(c) => c,
            Err(_) => return false,
        };
        match client
            .get(&url)
            .bearer_auth(&self.settings.api_key)
            .send()
        {
            Ok(resp) => matches!(resp.status().as_u16(), 200 | 404),
            Err(_) => false,
        }
    }

    /// A 200 answer carries the image either as a raw `image/*` body or as
    /// base64 inside a JSON envelope.
    fn extract_image(response: reqwest::blocking::Response) -> Result<Vec<u8>, InpaintError> {
        let is_image_body = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);

        if is_image_body {
            return response
                .bytes()
                .map(|b| b.to_vec())
                .map_err(|e| InpaintError::Network(e.to_string()));
        }

        let json: serde_json::Value = response
            .json()
            .map_err(|e| InpaintError::InvalidResponse(e.to_string()))?;
        let b64 = json
            .get("image")
            .and_then(|v| v.as_str())
            .ok_or_else(|| InpaintError::InvalidResponse("no image field in body".to_string()))?;
        BASE64
            .decode(b64)
            .map_err(|e| InpaintError::InvalidResponse(format!("bad base64 image: {}", e)))
    }

    fn extract_error(response: reqwest::blocking::Response) -> String {
        let status = response.status();
        match response.json::<serde_json::Value>() {
            Ok(json) => json
                .get("error")
                .or_else(|| json.get("message"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("HTTP {}", status)),
            Err(_) => format!("HTTP {}", status),
        }
    }
}

/// Fabricate a plausible placeholder result at the source image's size: the
/// unmasked area is kept, the masked area is filled with a color gradient.
fn mock_result(job: &InpaintJob) -> Result<Vec<u8>, InpaintError> {
    let source = image::load_from_memory(&job.image_png)
        .map_err(|e| InpaintError::InvalidResponse(e.to_string()))?
        .to_rgba8();
    let mask = image::load_from_memory(&job.mask_png)
        .map_err(|e| InpaintError::InvalidResponse(e.to_string()))?
        .to_rgba8();

    // The mask is view-space sized; scale lookups to the source dimensions.
    let (sw, sh) = source.dimensions();
    let (mw, mh) = mask.dimensions();
    let mut out = source.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        let mx = (x as u64 * mw as u64 / sw.max(1) as u64).min(mw.saturating_sub(1) as u64) as u32;
        let my = (y as u64 * mh as u64 / sh.max(1) as u64).min(mh.saturating_sub(1) as u64) as u32;
        if mask.get_pixel(mx, my).0[3] > 0 {
            let t = (x + y) as f32 / (sw + sh) as f32;
            let intensity = (t * 255.0) as u8;
            *px = Rgba([
                255 - intensity / 3,
                intensity / 2,
                intensity,
                255,
            ]);
        }
    }
    encode_rgba_png(&out)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn png_of(w: u32, h: u32, px: Rgba<u8>) -> Vec<u8> {
        encode_rgba_png(&RgbaImage::from_pixel(w, h, px)).unwrap()
    }

    fn test_settings() -> Settings {
        Settings {
            min_image_dimension: 16,
            ..Default::default()
        }
    }

    #[test]
    fn prompt_bounds_are_enforced() {
        let mut p = InpaintParams {
            prompt: "replace the sky with a sunset".to_string(),
            ..Default::default()
        };
        assert_eq!(p.validate().unwrap(), "replace the sky with a sunset");

        p.prompt = "   ".to_string();
        assert!(matches!(
            p.validate(),
            Err(InpaintError::Validation { field: "prompt", .. })
        ));

        p.prompt = "x".repeat(MAX_PROMPT_LEN + 1);
        assert!(matches!(
            p.validate(),
            Err(InpaintError::Validation { field: "prompt", .. })
        ));
    }

    #[test]
    fn numeric_parameter_bounds_are_enforced() {
        let base = InpaintParams {
            prompt: "p".to_string(),
            ..Default::default()
        };

        let p = InpaintParams { seed: Some(-1), ..base.clone() };
        assert!(matches!(p.validate(), Err(InpaintError::Validation { field: "seed", .. })));
        let p = InpaintParams { seed: Some(MAX_SEED), ..base.clone() };
        assert!(p.validate().is_ok());

        let p = InpaintParams { strength: 1.5, ..base.clone() };
        assert!(matches!(p.validate(), Err(InpaintError::Validation { field: "strength", .. })));

        let p = InpaintParams { guidance_scale: 0.5, ..base.clone() };
        assert!(matches!(
            p.validate(),
            Err(InpaintError::Validation { field: "guidance_scale", .. })
        ));
        let p = InpaintParams { guidance_scale: 20.0, ..base };
        assert!(p.validate().is_ok());
    }

    #[test]
    fn prepare_image_enforces_dimension_bounds() {
        let settings = test_settings();
        let tiny = png_of(4, 4, Rgba([0, 0, 0, 255]));
        assert!(matches!(
            prepare_image(&tiny, &settings),
            Err(InpaintError::Validation { field: "image", .. })
        ));

        let ok = png_of(32, 32, Rgba([10, 20, 30, 255]));
        let prepared = prepare_image(&ok, &settings).unwrap();
        assert_eq!((prepared.width, prepared.height), (32, 32));
    }

    #[test]
    fn prepare_image_accepts_only_png_and_jpeg() {
        use std::io::Cursor;
        let settings = test_settings();
        let rgb = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            32,
            32,
            image::Rgb([40, 80, 120]),
        ));

        let mut bmp = Vec::new();
        rgb.write_to(&mut Cursor::new(&mut bmp), image::ImageOutputFormat::Bmp)
            .unwrap();
        let err = prepare_image(&bmp, &settings);
        assert!(matches!(
            err,
            Err(InpaintError::Validation { field: "image", .. })
        ));

        let mut jpeg = Vec::new();
        rgb.write_to(&mut Cursor::new(&mut jpeg), image::ImageOutputFormat::Jpeg(90))
            .unwrap();
        assert!(prepare_image(&jpeg, &settings).is_ok());
    }

    #[test]
    fn prepare_image_flattens_transparency_onto_white() {
        let settings = test_settings();
        let translucent = png_of(32, 32, Rgba([0, 0, 0, 0]));
        let prepared = prepare_image(&translucent, &settings).unwrap();
        let out = image::load_from_memory(&prepared.png).unwrap().to_rgba8();
        assert_eq!(*out.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn prepare_mask_requires_matching_dimensions() {
        let mask = png_of(16, 16, Rgba([255, 255, 255, 128]));
        assert!(matches!(
            prepare_mask(&mask, 32, 32),
            Err(InpaintError::Validation { field: "mask", .. })
        ));
        assert!(prepare_mask(&mask, 16, 16).is_ok());
    }

    #[test]
    fn prepare_mask_normalizes_alpha_to_white() {
        let mask = png_of(8, 8, Rgba([17, 99, 200, 77]));
        let out = prepare_mask(&mask, 8, 8).unwrap();
        let decoded = image::load_from_memory(&out).unwrap().to_rgba8();
        assert_eq!(*decoded.get_pixel(3, 3), Rgba([255, 255, 255, 77]));
    }

    #[test]
    fn scale_mask_preserves_coverage_placement() {
        let mut small = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 0]));
        for y in 0..5 {
            for x in 0..10 {
                small.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let png = encode_rgba_png(&small).unwrap();
        let scaled = scale_mask_to(&png, 100, 100).unwrap();
        let out = image::load_from_memory(&scaled).unwrap().to_rgba8();
        assert_eq!(out.dimensions(), (100, 100));
        // Top half painted, bottom half clear.
        assert_eq!(out.get_pixel(50, 10).0[3], 255);
        assert_eq!(out.get_pixel(50, 90).0[3], 0);
    }

    #[test]
    fn scale_mask_is_identity_at_matching_size() {
        let png = png_of(20, 20, Rgba([255, 255, 255, 200]));
        assert_eq!(scale_mask_to(&png, 20, 20).unwrap(), png);
    }

    #[test]
    fn payload_omits_absent_seed() {
        let payload = InpaintPayload {
            image: "aa",
            mask: "bb",
            prompt: "p",
            strength: 0.8,
            guidance_scale: 7.5,
            seed: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("seed").is_none());

        let payload = InpaintPayload { seed: Some(42), ..payload };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["seed"], 42);
    }

    #[test]
    fn mock_mode_produces_a_decodable_result() {
        let settings = test_settings();
        assert!(settings.mock_mode());

        let image = png_of(32, 32, Rgba([50, 60, 70, 255]));
        let mut mask_img = RgbaImage::from_pixel(32, 32, Rgba([0, 0, 0, 0]));
        for y in 8..24 {
            for x in 8..24 {
                mask_img.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let mask = encode_rgba_png(&mask_img).unwrap();

        let job = InpaintJob::build(
            &image,
            &mask,
            InpaintParams {
                prompt: "fill".to_string(),
                ..Default::default()
            },
            &settings,
        )
        .unwrap();

        let result = InpaintClient::new(settings).inpaint(&job).unwrap();
        let decoded = image::load_from_memory(&result).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (32, 32));
        // Unmasked corner is passed through; masked center is repainted.
        assert_eq!(*decoded.get_pixel(0, 0), Rgba([50, 60, 70, 255]));
        assert_ne!(*decoded.get_pixel(16, 16), Rgba([50, 60, 70, 255]));
    }

    #[test]
    fn job_build_rejects_mismatched_mask() {
        let settings = test_settings();
        let image = png_of(32, 32, Rgba([0, 0, 0, 255]));
        let mask = png_of(16, 16, Rgba([255, 255, 255, 255]));
        let err = InpaintJob::build(
            &image,
            &mask,
            InpaintParams {
                prompt: "p".to_string(),
                ..Default::default()
            },
            &settings,
        );
        assert!(matches!(err, Err(InpaintError::Validation { field: "mask", .. })));
    }
}
