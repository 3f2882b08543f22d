//! Decoded image data in the renderer's pixel layout.

use std::path::Path;

use tracing::debug;

use crate::error::{AssetError, AssetResult};

/// Bytes per pixel of every [`Pixels`] buffer (BGRA8).
pub const BYTES_PER_PIXEL: usize = 4;

/// A tightly packed BGRA8 pixel buffer, rows top to bottom.
#[derive(Clone, PartialEq, Eq)]
pub struct Pixels {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Pixels {
    /// Wraps raw BGRA8 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::InvalidPixels`] if either dimension is zero or
    /// `data` is not exactly `width * height * 4` bytes.
    pub fn from_bgra(data: Vec<u8>, width: u32, height: u32) -> AssetResult<Self> {
        if width == 0 || height == 0 {
            return Err(AssetError::InvalidPixels(format!(
                "{width}x{height} image has a zero dimension"
            )));
        }
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(AssetError::InvalidPixels(format!(
                "{width}x{height} image needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Converts an RGBA8 image into BGRA8.
    pub fn from_rgba_image(image: image::RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let mut data = image.into_raw();
        for pixel in data.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.swap(0, 2);
        }
        Self {
            data,
            width,
            height,
        }
    }

    /// A `width` x `height` image filled with one BGRA colour.
    pub fn solid(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let count = width.max(1) as usize * height.max(1) as usize;
        Self {
            data: bgra.repeat(count),
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Copies out the `width` x `height` rectangle whose top-left corner is (`x`, `y`).
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> AssetResult<Self> {
        let fits_x = x.checked_add(width).is_some_and(|right| right <= self.width);
        let fits_y = y.checked_add(height).is_some_and(|bottom| bottom <= self.height);
        if width == 0 || height == 0 || !fits_x || !fits_y {
            return Err(AssetError::InvalidPixels(format!(
                "crop {width}x{height} at ({x}, {y}) outside {}x{} image",
                self.width, self.height
            )));
        }

        let stride = self.width as usize * BYTES_PER_PIXEL;
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in y..y + height {
            let start = row as usize * stride + x as usize * BYTES_PER_PIXEL;
            data.extend_from_slice(&self.data[start..start + row_bytes]);
        }

        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Raw BGRA8 bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Always [`BYTES_PER_PIXEL`].
    #[inline]
    pub fn bytes_per_pixel(&self) -> usize {
        BYTES_PER_PIXEL
    }
}

impl std::fmt::Debug for Pixels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pixels")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Decodes an image file into BGRA8 pixels.
pub fn load_image(path: impl AsRef<Path>) -> AssetResult<Pixels> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(AssetError::FileNotFound(path.to_path_buf()));
    }

    let decoded = image::open(path).map_err(|source| AssetError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let pixels = Pixels::from_rgba_image(decoded.to_rgba8());

    debug!(
        "Decoded {} ({}x{})",
        path.display(),
        pixels.width(),
        pixels.height()
    );
    Ok(pixels)
}
