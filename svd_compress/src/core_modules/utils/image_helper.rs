// Glue between encoded image files and `PixelArray`. The engine itself never
// touches a container format; front ends call these helpers on either side of it.

pub mod image_helper {
    use crate::core_modules::pixel_array::pixel_array::{GRAYSCALE, PixelArray, RGB};
    use crate::error::CompressError;
    use image::{ColorType, DynamicImage, ExtendedColorType, ImageEncoder};
    use std::io::Write;
    use std::path::Path;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum ImageIoError {
        #[error("image codec error: {0}")]
        Codec(#[from] image::ImageError),
        #[error(transparent)]
        Pixels(#[from] CompressError),
        #[error("image dimensions {width}x{height} do not fit the encoder")]
        TooLarge { width: usize, height: usize },
    }

    /// Converts a decoded image. Single-channel images stay grayscale; anything
    /// with colour is converted to 8-bit RGB and its alpha channel dropped.
    pub fn from_dynamic(image: &DynamicImage) -> Result<PixelArray, ImageIoError> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let pixels = match image.color() {
            ColorType::L8 | ColorType::L16 => {
                PixelArray::new(height, width, GRAYSCALE, image.to_luma8().into_raw())?
            }
            _ => PixelArray::new(height, width, RGB, image.to_rgb8().into_raw())?,
        };
        Ok(pixels)
    }

    /// Decodes an encoded byte stream (PNG, JPEG, ...) into pixels.
    pub fn decode(bytes: &[u8]) -> Result<PixelArray, ImageIoError> {
        from_dynamic(&image::load_from_memory(bytes)?)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<PixelArray, ImageIoError> {
        from_dynamic(&image::open(path)?)
    }

    fn color_type(pixels: &PixelArray) -> ExtendedColorType {
        if pixels.channels() == GRAYSCALE {
            ExtendedColorType::L8
        } else {
            ExtendedColorType::Rgb8
        }
    }

    fn dimensions(pixels: &PixelArray) -> Result<(u32, u32), ImageIoError> {
        let too_large = || ImageIoError::TooLarge {
            width: pixels.width(),
            height: pixels.height(),
        };
        Ok((
            u32::try_from(pixels.width()).map_err(|_| too_large())?,
            u32::try_from(pixels.height()).map_err(|_| too_large())?,
        ))
    }

    /// Writes `pixels` as PNG into any sink.
    pub fn write_png<W: Write>(writer: W, pixels: &PixelArray) -> Result<(), ImageIoError> {
        let (width, height) = dimensions(pixels)?;
        let encoder = image::codecs::png::PngEncoder::new(writer);
        encoder.write_image(pixels.as_bytes(), width, height, color_type(pixels))?;
        Ok(())
    }

    pub fn encode_png(pixels: &PixelArray) -> Result<Vec<u8>, ImageIoError> {
        let mut out = Vec::new();
        write_png(&mut out, pixels)?;
        Ok(out)
    }

    pub fn save(path: impl AsRef<Path>, pixels: &PixelArray) -> Result<(), ImageIoError> {
        let output = std::fs::File::create(path).map_err(image::ImageError::IoError)?;
        write_png(std::io::BufWriter::new(output), pixels)
    }
}
