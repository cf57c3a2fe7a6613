//! Image preprocessor: decodes uploads and builds the model input tensor.
//!
//! The tensor layout is NHWC `[1, height, width, 3]` with channel values
//! scaled from `0..=255` to `0.0..=1.0`.

use crate::config::{PreprocessConfig, ResizeFilter};
use crate::error::InvalidImage;
use image::{DynamicImage, ImageReader, Limits, imageops::FilterType};
use ndarray::Array4;
use std::io::Cursor;

/// Batched image tensor in NHWC layout.
pub type Tensor4D = Array4<f32>;

/// Number of color channels the model consumes.
pub const CHANNELS: usize = 3;

/// Decodes arbitrary image bytes and converts them to a fixed-shape tensor.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    target_width: u32,
    target_height: u32,
    filter: FilterType,
    max_dimension: u32,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::from_config(&PreprocessConfig::default())
    }
}

impl ImagePreprocessor {
    pub fn new(target_width: u32, target_height: u32, filter: ResizeFilter) -> Self {
        Self {
            target_width,
            target_height,
            filter: filter.into(),
            max_dimension: PreprocessConfig::default().max_image_dimension,
        }
    }

    pub fn from_config(config: &PreprocessConfig) -> Self {
        Self::new(
            config.target_width,
            config.target_height,
            config.resize_filter,
        )
        .with_max_dimension(config.max_image_dimension)
    }

    /// Cap the decoded width and height of accepted uploads.
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    /// Shape of every tensor this preprocessor produces.
    pub fn output_shape(&self) -> [usize; 4] {
        [
            1,
            self.target_height as usize,
            self.target_width as usize,
            CHANNELS,
        ]
    }

    /// Decode and convert in one step.
    pub fn prepare(&self, bytes: &[u8]) -> Result<Tensor4D, InvalidImage> {
        let image = self.decode(bytes)?;
        self.prepare_image(&image)
    }

    /// Decode bytes of any supported format into a pixel grid.
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, InvalidImage> {
        if bytes.is_empty() {
            return Err(InvalidImage::new("empty payload"));
        }

        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| InvalidImage::new(format!("failed to read payload: {e}")))?;
        if reader.format().is_none() {
            return Err(InvalidImage::new("unrecognized image format"));
        }

        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        reader.limits(limits);

        reader
            .decode()
            .map_err(|e| InvalidImage::new(format!("failed to decode image: {e}")))
    }

    /// Resize to the target size, drop alpha, scale to `[0, 1]`, add a batch axis.
    pub fn prepare_image(&self, image: &DynamicImage) -> Result<Tensor4D, InvalidImage> {
        if image.width() == 0 || image.height() == 0 {
            return Err(InvalidImage::new("image has no pixels"));
        }

        let resized = image.resize_exact(self.target_width, self.target_height, self.filter);
        let rgb = resized.to_rgb8();
        let (width, height) = rgb.dimensions();

        let data: Vec<f32> = rgb
            .into_raw()
            .into_iter()
            .map(|v| f32::from(v) / 255.0)
            .collect();

        Array4::from_shape_vec((1, height as usize, width as usize, CHANNELS), data).map_err(|e| {
            InvalidImage::new(format!(
                "failed to build {width}x{height} input tensor: {e}"
            ))
        })
    }
}
