use image::{DynamicImage, Rgb, RgbImage, Rgba};
use image_hasher::{HashAlg, Hasher, HasherConfig};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Feature extraction failed: {message}")]
    Extraction { message: String },
}

/// Opaque visual descriptor of one image. Cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Arc<[f32]>);

impl FeatureVector {
    pub fn new(components: Vec<f32>) -> Self {
        Self(components.into())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Produces feature vectors from encoded image bytes and compares them.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, image_bytes: &[u8]) -> Result<FeatureVector, FeatureError>;

    /// Non-negative; zero means identical.
    fn distance(&self, a: &FeatureVector, b: &FeatureVector) -> f32;
}

/// Gray level that transparent pixels are composited onto before hashing.
const BACKDROP: u8 = 128;

/// Perceptual-hash extractor. Each hash bit becomes one 0.0/1.0 component and
/// the distance is the fraction of differing bits.
pub struct PerceptualExtractor {
    hasher: Hasher,
}

impl PerceptualExtractor {
    pub fn new(hash_size: u32) -> Self {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::Mean)
            .hash_size(hash_size, hash_size)
            .to_hasher();
        Self { hasher }
    }
}

impl Default for PerceptualExtractor {
    fn default() -> Self {
        Self::new(16)
    }
}

impl FeatureExtractor for PerceptualExtractor {
    fn extract(&self, image_bytes: &[u8]) -> Result<FeatureVector, FeatureError> {
        let img = flatten_transparency(image::load_from_memory(image_bytes)?);
        let hash = self.hasher.hash_image(&img);

        let bits: Vec<f32> = hash
            .as_bytes()
            .iter()
            .flat_map(|byte| (0..8).map(move |bit| f32::from((byte >> bit) & 1)))
            .collect();

        if bits.is_empty() {
            return Err(FeatureError::Extraction {
                message: "empty perceptual hash".to_string(),
            });
        }
        Ok(FeatureVector::new(bits))
    }

    fn distance(&self, a: &FeatureVector, b: &FeatureVector) -> f32 {
        let longest = a.len().max(b.len());
        if longest == 0 {
            return 0.0;
        }
        let differing = a
            .as_slice()
            .iter()
            .zip(b.as_slice())
            .filter(|(x, y)| x != y)
            .count()
            + a.len().abs_diff(b.len());
        differing as f32 / longest as f32
    }
}

fn flatten_transparency(img: DynamicImage) -> DynamicImage {
    if !img.color().has_alpha() {
        return img;
    }

    let rgba = img.to_rgba8();
    let flattened = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + u16::from(BACKDROP) * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    });
    DynamicImage::ImageRgb8(flattened)
}
