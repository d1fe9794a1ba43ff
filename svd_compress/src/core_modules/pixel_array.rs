// THEORY:
// The `PixelArray` is the unit of exchange between the engine and the outside
// world. The boundary decodes an upload into one, hands it to a compressor, and
// encodes whatever comes back. It is a "dumb" data container: an owned, row-major
// `(height, width, channels)` byte buffer that knows how to split itself into
// per-channel matrices and how to be rebuilt from them, and nothing else.
//
// Key principles:
// 1.  **Validated once**: the constructor rejects empty images, channel counts
//     other than 1 or 3, and buffers whose length disagrees with the shape. Every
//     other method can then rely on `data.len() == height * width * channels`.
// 2.  **Promotion, not conversion**: grayscale is promoted to RGB by replicating
//     the single plane. No colour math happens here.
// 3.  **Real-valued channels**: channels leave as `f64` matrices for the SVD and
//     come back as `u8` matrices that were already clipped and quantized.

pub mod pixel_array {
    use crate::error::{CompressError, Result};
    use nalgebra::DMatrix;

    pub type Sample = u8;
    /// A single colour plane in real-valued form, as consumed by the decomposition.
    pub type Channel = DMatrix<f64>;
    /// A single colour plane after clipping to [0, 255] and casting back to bytes.
    pub type QuantizedChannel = DMatrix<Sample>;

    pub const GRAYSCALE: usize = 1;
    pub const RGB: usize = 3;

    /// Clips a reconstructed value to the byte range and truncates toward zero.
    #[inline]
    pub fn quantize(value: f64) -> Sample {
        // NaN falls through `clamp` unchanged; the saturating cast maps it to 0.
        value.clamp(0.0, 255.0) as Sample
    }

    pub fn quantize_channel(channel: &Channel) -> QuantizedChannel {
        channel.map(quantize)
    }

    /// An owned `(height, width, channels)` image with interleaved samples.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PixelArray {
        height: usize,
        width: usize,
        channels: usize,
        data: Vec<Sample>,
    }

    impl PixelArray {
        pub fn new(height: usize, width: usize, channels: usize, data: Vec<Sample>) -> Result<Self> {
            if height == 0 || width == 0 {
                return Err(CompressError::EmptyImage);
            }
            if channels != GRAYSCALE && channels != RGB {
                return Err(CompressError::UnsupportedChannels { channels });
            }
            let expected = height * width * channels;
            if data.len() != expected {
                return Err(CompressError::ShapeMismatch {
                    expected: (height, width, channels),
                    actual: (data.len() / (width * channels).max(1), width, channels),
                });
            }
            Ok(Self {
                height,
                width,
                channels,
                data,
            })
        }

        /// Builds an image by evaluating `f(row, col, channel)` for every sample.
        pub fn from_fn(
            height: usize,
            width: usize,
            channels: usize,
            mut f: impl FnMut(usize, usize, usize) -> Sample,
        ) -> Result<Self> {
            let mut data = Vec::with_capacity(height * width * channels);
            for row in 0..height {
                for col in 0..width {
                    for c in 0..channels {
                        data.push(f(row, col, c));
                    }
                }
            }
            Self::new(height, width, channels, data)
        }

        /// Stacks three quantized planes back into an interleaved RGB image.
        pub fn from_channels(planes: &[QuantizedChannel; RGB]) -> Result<Self> {
            let (height, width) = planes[0].shape();
            for plane in &planes[1..] {
                if plane.shape() != (height, width) {
                    return Err(CompressError::ShapeMismatch {
                        expected: (height, width, RGB),
                        actual: (plane.nrows(), plane.ncols(), RGB),
                    });
                }
            }
            Self::from_fn(height, width, RGB, |row, col, c| planes[c][(row, col)])
        }

        pub fn height(&self) -> usize {
            self.height
        }

        pub fn width(&self) -> usize {
            self.width
        }

        pub fn channels(&self) -> usize {
            self.channels
        }

        pub fn shape(&self) -> (usize, usize, usize) {
            (self.height, self.width, self.channels)
        }

        pub fn as_bytes(&self) -> &[Sample] {
            &self.data
        }

        #[inline]
        pub fn get(&self, row: usize, col: usize, channel: usize) -> Sample {
            self.data[(row * self.width + col) * self.channels + channel]
        }

        /// Returns an RGB copy, replicating the plane of a grayscale image.
        pub fn to_rgb(&self) -> PixelArray {
            if self.channels == RGB {
                return self.clone();
            }
            let data = self.data.iter().flat_map(|&v| [v, v, v]).collect();
            PixelArray {
                height: self.height,
                width: self.width,
                channels: RGB,
                data,
            }
        }

        /// Extracts one colour plane as a real-valued matrix.
        pub fn channel(&self, channel: usize) -> Channel {
            DMatrix::from_fn(self.height, self.width, |row, col| self.get(row, col, channel) as f64)
        }

        /// Splits an RGB image into its three real-valued planes.
        pub fn rgb_channels(&self) -> Result<[Channel; RGB]> {
            if self.channels != RGB {
                return Err(CompressError::ShapeMismatch {
                    expected: (self.height, self.width, RGB),
                    actual: self.shape(),
                });
            }
            Ok([self.channel(0), self.channel(1), self.channel(2)])
        }

        /// The largest rank any reconstruction of this image can use.
        pub fn max_rank(&self) -> usize {
            self.height.min(self.width)
        }
    }
}
