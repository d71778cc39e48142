use std::{
    io::Cursor,
    sync::atomic::{AtomicU64, Ordering},
};

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::error::{AppError, AppResult};

const SUPPORTED_ASPECT_RATIOS: [(&str, f64); 5] = [
    ("1:1", 1.0),
    ("16:9", 16.0 / 9.0),
    ("9:16", 9.0 / 16.0),
    ("4:3", 4.0 / 3.0),
    ("3:4", 3.0 / 4.0),
];

const SUPPORTED_MIMES: [&str; 4] = ["image/png", "image/jpeg", "image/jpg", "image/webp"];

/// Encoding used when the source format cannot be determined or re-encoded.
const FALLBACK_FORMAT: ImageFormat = ImageFormat::Jpeg;

pub fn ratio_value(label: &str) -> Option<f64> {
    SUPPORTED_ASPECT_RATIOS
        .iter()
        .find(|(known, _)| *known == label)
        .map(|(_, ratio)| *ratio)
}

/// An encoded image plus its declared mime type, the unit of exchange with
/// the hosted service (which speaks base64 data URLs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    pub fn from_data_url(data_url: &str) -> AppResult<Self> {
        if !data_url.starts_with("data:") {
            return Err(AppError::msg("expected a data URL with image payload"));
        }

        let (metadata, payload) = data_url
            .split_once(',')
            .ok_or_else(|| AppError::msg("invalid data URL format"))?;

        if !metadata.contains(";base64") {
            return Err(AppError::msg("data URL must be base64 encoded"));
        }

        let mime = metadata
            .trim_start_matches("data:")
            .split(';')
            .next()
            .unwrap_or_default();
        if !SUPPORTED_MIMES.contains(&mime) {
            return Err(AppError::msg(format!(
                "unsupported image mime type: {mime}. allowed: png/jpeg/webp"
            )));
        }

        let bytes = STANDARD.decode(payload.trim())?;
        Ok(Self::new(mime, bytes))
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    fn format(&self) -> ImageFormat {
        ImageFormat::from_mime_type(&self.mime).unwrap_or(FALLBACK_FORMAT)
    }
}

/// The center-crop region that maps a source onto a target aspect ratio.
/// Computed in floating point, converted to pixels only at render time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropSpec {
    pub source_width: u32,
    pub source_height: u32,
    pub target_ratio: f64,
    pub sx: f64,
    pub sy: f64,
    pub s_width: f64,
    pub s_height: f64,
}

impl CropSpec {
    pub fn compute(source_width: u32, source_height: u32, target_ratio: f64) -> Self {
        let width = source_width as f64;
        let height = source_height as f64;
        let original_ratio = width / height;

        let (mut sx, mut sy) = (0.0, 0.0);
        let (mut s_width, mut s_height) = (width, height);

        if target_ratio > original_ratio {
            s_height = width / target_ratio;
            sy = (height - s_height) / 2.0;
        } else if target_ratio < original_ratio {
            s_width = height * target_ratio;
            sx = (width - s_width) / 2.0;
        }

        Self {
            source_width,
            source_height,
            target_ratio,
            sx,
            sy,
            s_width,
            s_height,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.pixel_region() == (0, 0, self.source_width, self.source_height)
    }

    /// Rounds the region to whole pixels, clamped inside the source bounds.
    pub fn pixel_region(&self) -> (u32, u32, u32, u32) {
        if self.source_width == 0 || self.source_height == 0 {
            return (0, 0, self.source_width, self.source_height);
        }
        let width = (self.s_width.round() as u32).clamp(1, self.source_width);
        let height = (self.s_height.round() as u32).clamp(1, self.source_height);
        let x = (self.sx.round() as u32).min(self.source_width - width);
        let y = (self.sy.round() as u32).min(self.source_height - height);
        (x, y, width, height)
    }
}

/// Center-crops `image` to the ratio named by `label` and re-encodes it in
/// the source's declared format.
///
/// An unrecognized label is a defined fallback, not an error: the input is
/// returned unchanged. Decode failures surface as [`AppError::Decode`] so the
/// caller can fall back to the unprocessed original; encode failures are
/// [`AppError::Render`] and not recoverable here.
pub fn normalize_aspect_ratio(image: &EncodedImage, label: &str) -> AppResult<EncodedImage> {
    let Some(target_ratio) = ratio_value(label) else {
        tracing::warn!(label, "unknown aspect ratio label, returning original image");
        return Ok(image.clone());
    };

    let decoded = image::load_from_memory(&image.bytes).map_err(AppError::Decode)?;
    let spec = CropSpec::compute(decoded.width(), decoded.height(), target_ratio);
    if spec.is_noop() {
        return Ok(image.clone());
    }

    let (x, y, width, height) = spec.pixel_region();
    let cropped = decoded.crop_imm(x, y, width, height);
    encode(&cropped, image.format())
}

fn encode(image: &DynamicImage, format: ImageFormat) -> AppResult<EncodedImage> {
    let mut bytes = Vec::new();
    let result = match format {
        // The jpeg encoder rejects alpha channels.
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg),
        ImageFormat::Png | ImageFormat::WebP => {
            image.write_to(&mut Cursor::new(&mut bytes), format)
        }
        _ => {
            return encode(image, FALLBACK_FORMAT);
        }
    };
    result.map_err(AppError::Render)?;

    let mime = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::WebP => "image/webp",
        _ => "image/jpeg",
    };
    Ok(EncodedImage::new(mime, bytes))
}

#[derive(Debug)]
pub enum NormalizeOutcome {
    Applied(EncodedImage),
    /// A newer normalize call was issued while this one was in flight; the
    /// result must not overwrite the newer one.
    Superseded,
}

/// Serializes concurrent normalize calls against a single slot, so that a
/// rapid ratio change can never apply an older crop over a newer one. Each
/// call takes a monotonically increasing ticket and a completion whose
/// ticket is no longer current reports as superseded.
#[derive(Debug, Default)]
pub struct Normalizer {
    seq: AtomicU64,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn normalize(&self, image: EncodedImage, label: &str) -> AppResult<NormalizeOutcome> {
        let ticket = self.begin();
        self.finish(ticket, image, label).await
    }

    async fn finish(
        &self,
        ticket: u64,
        image: EncodedImage,
        label: &str,
    ) -> AppResult<NormalizeOutcome> {
        let label = label.to_string();
        let result = tokio::task::spawn_blocking(move || normalize_aspect_ratio(&image, &label))
            .await
            .map_err(|error| AppError::msg(format!("normalize task panicked: {error}")))??;

        if !self.is_current(ticket) {
            return Ok(NormalizeOutcome::Superseded);
        }
        Ok(NormalizeOutcome::Applied(result))
    }

    fn begin(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.seq.load(Ordering::SeqCst) == ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn png_image(width: u32, height: u32) -> EncodedImage {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([120, 40, 200, 255]),
        ))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
        EncodedImage::new("image/png", bytes)
    }

    fn decoded_dimensions(image: &EncodedImage) -> (u32, u32) {
        let decoded = image::load_from_memory(&image.bytes).unwrap();
        (decoded.width(), decoded.height())
    }

    #[test]
    fn wide_source_to_square_is_width_trimmed_and_centered() {
        let spec = CropSpec::compute(1000, 500, 1.0);
        assert_eq!(spec.pixel_region(), (250, 0, 500, 500));
    }

    #[test]
    fn tall_source_to_wide_ratio_keeps_full_width() {
        let spec = CropSpec::compute(500, 1000, 16.0 / 9.0);
        let (x, _, width, height) = spec.pixel_region();
        assert_eq!((x, width), (0, 500));
        assert_eq!(height, 281);
    }

    #[test]
    fn crop_region_matches_target_ratio_and_stays_in_bounds() {
        for (label, ratio) in SUPPORTED_ASPECT_RATIOS {
            let spec = CropSpec::compute(1280, 853, ratio);
            assert!(
                (spec.s_width / spec.s_height - ratio).abs() < 1e-9,
                "ratio drift for {label}"
            );
            assert!(spec.sx >= 0.0 && spec.sy >= 0.0);
            let (x, y, width, height) = spec.pixel_region();
            assert!(x + width <= 1280 && y + height <= 853);
        }
    }

    #[test]
    fn zero_dimension_source_yields_full_region_without_panicking() {
        assert_eq!(CropSpec::compute(0, 0, 1.0).pixel_region(), (0, 0, 0, 0));
        assert_eq!(CropSpec::compute(100, 0, 1.0).pixel_region(), (0, 0, 100, 0));
        assert_eq!(CropSpec::compute(0, 100, 16.0 / 9.0).pixel_region(), (0, 0, 0, 100));
    }

    #[test]
    fn matching_ratio_is_a_noop() {
        assert!(CropSpec::compute(800, 800, 1.0).is_noop());
        assert!(CropSpec::compute(1600, 900, 16.0 / 9.0).is_noop());
    }

    #[test]
    fn unknown_label_returns_input_unchanged() {
        let source = png_image(300, 200);
        let result = normalize_aspect_ratio(&source, "2:3").unwrap();
        assert_eq!(result, source);
    }

    #[test]
    fn normalize_crops_to_square() {
        let source = png_image(1000, 500);
        let result = normalize_aspect_ratio(&source, "1:1").unwrap();
        assert_eq!(result.mime, "image/png");
        assert_eq!(decoded_dimensions(&result), (500, 500));
    }

    #[test]
    fn normalize_is_idempotent_on_matching_source() {
        let source = png_image(900, 900);
        let result = normalize_aspect_ratio(&source, "1:1").unwrap();
        assert_eq!(result, source);
    }

    #[test]
    fn undecodable_input_is_a_decode_error() {
        let source = EncodedImage::new("image/png", vec![0, 1, 2, 3]);
        assert!(matches!(
            normalize_aspect_ratio(&source, "1:1"),
            Err(AppError::Decode(_))
        ));
    }

    #[test]
    fn data_url_round_trip() {
        let source = png_image(10, 10);
        let parsed = EncodedImage::from_data_url(&source.to_data_url()).unwrap();
        assert_eq!(parsed, source);
    }

    #[test]
    fn data_url_rejects_unsupported_mime() {
        assert!(EncodedImage::from_data_url("data:image/gif;base64,AAAA").is_err());
        assert!(EncodedImage::from_data_url("not a data url").is_err());
    }

    #[test]
    fn stale_tickets_are_not_current() {
        let normalizer = Normalizer::new();
        let first = normalizer.begin();
        let second = normalizer.begin();
        assert!(!normalizer.is_current(first));
        assert!(normalizer.is_current(second));
    }

    #[tokio::test]
    async fn interleaved_normalize_discards_the_older_completion() {
        let normalizer = std::sync::Arc::new(Normalizer::new());
        let older = normalizer.begin();

        // The newer call starts after the older one and runs to completion
        // first, on its own task.
        let newer_outcome = {
            let normalizer = normalizer.clone();
            tokio::spawn(async move { normalizer.normalize(png_image(1000, 500), "9:16").await })
                .await
                .unwrap()
                .unwrap()
        };
        match newer_outcome {
            NormalizeOutcome::Applied(image) => {
                assert_eq!(decoded_dimensions(&image), (281, 500));
            }
            NormalizeOutcome::Superseded => panic!("newest call must apply"),
        }

        // The older call only finishes now; its crop must be discarded.
        let older_outcome = normalizer
            .finish(older, png_image(1000, 500), "1:1")
            .await
            .unwrap();
        assert!(matches!(older_outcome, NormalizeOutcome::Superseded));
    }

    #[tokio::test]
    async fn async_normalize_applies_latest_call() {
        let normalizer = Normalizer::new();
        let outcome = normalizer.normalize(png_image(1000, 500), "1:1").await.unwrap();
        match outcome {
            NormalizeOutcome::Applied(image) => {
                assert_eq!(decoded_dimensions(&image), (500, 500));
            }
            NormalizeOutcome::Superseded => panic!("single in-flight call must apply"),
        }
    }
}
