//! Content-addressed image assets.
//!
//! Images are keyed by the MD5 of their source bytes. The first occurrence
//! of a hash is decoded, re-encoded into the configured output format and
//! stored; every later occurrence only bumps the stored asset's reference
//! count.

use std::io::Cursor;

use image::DynamicImage;
use md5::{Digest, Md5};

use crate::config::{ConversionConfig, ImageFormat};
use crate::error::{Error, Result};
use crate::model::{AssetRegistry, ImageId};

/// Lowercase hex MD5 of `data`.
pub fn content_hash(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

/// What happened to one image occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOutcome {
    /// A new asset was created
    Stored(ImageId),
    /// An identical image was already stored
    Reused(ImageId),
    /// Below the minimum size; nothing was stored
    Discarded,
}

impl ImageOutcome {
    /// The asset to reference, if any.
    pub fn id(&self) -> Option<ImageId> {
        match self {
            ImageOutcome::Stored(id) | ImageOutcome::Reused(id) => Some(*id),
            ImageOutcome::Discarded => None,
        }
    }
}

/// Applies the size filter, deduplicates and encodes images.
#[derive(Debug, Clone)]
pub struct ImageResolver {
    min_width: u32,
    min_height: u32,
    dedup: bool,
    format: ImageFormat,
}

impl ImageResolver {
    pub fn new(config: &ConversionConfig) -> Self {
        Self {
            min_width: config.min_image_width,
            min_height: config.min_image_height,
            dedup: config.detect_duplicate_images,
            format: config.image_output_format,
        }
    }

    fn too_small(&self, width: u32, height: u32) -> bool {
        width < self.min_width || height < self.min_height
    }

    /// Resolve one image occurrence on `page`.
    ///
    /// `width`/`height` are the backend's declared pixel size; 0 means
    /// unknown, in which case the decoded size is used for the filter.
    pub fn resolve(
        &self,
        registry: &mut AssetRegistry,
        page: u32,
        data: &[u8],
        width: u32,
        height: u32,
    ) -> Result<ImageOutcome> {
        let declared = width > 0 && height > 0;
        if declared && self.too_small(width, height) {
            log::debug!(
                "Page {}: discarding {}x{} image below {}x{}",
                page,
                width,
                height,
                self.min_width,
                self.min_height
            );
            return Ok(ImageOutcome::Discarded);
        }

        let hash = content_hash(data);
        if self.dedup {
            if let Some(id) = registry.find_image(&hash) {
                registry.reference_image(id);
                log::debug!("Page {}: image {} reused", page, hash);
                return Ok(ImageOutcome::Reused(id));
            }
        }

        let img = image::load_from_memory(data)?;
        if !declared && self.too_small(img.width(), img.height()) {
            return Ok(ImageOutcome::Discarded);
        }

        let encoded = self.encode(&img)?;
        let id = registry.insert_image(
            hash,
            page,
            self.format.extension(),
            img.width(),
            img.height(),
            encoded,
        );
        Ok(ImageOutcome::Stored(id))
    }

    fn encode(&self, img: &DynamicImage) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let target = self.format.to_image_format();
        let written = match self.format {
            // JPEG has no alpha channel
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8())
                .write_to(&mut Cursor::new(&mut buf), target),
            ImageFormat::Png => img.write_to(&mut Cursor::new(&mut buf), target),
        };
        written.map_err(|e| Error::ImageDecode(format!("re-encoding failed: {}", e)))?;
        Ok(buf)
    }
}
