//! Pure Rust optimizer. No external tools required.
//!
//! ## Format handling
//!
//! | Format | Action |
//! |---|---|
//! | PNG | decode, re-encode with `CompressionType::Best` + adaptive filtering (lossless) |
//! | JPEG | re-encode at the configured quality, only when lossy output is allowed |
//! | GIF and anything else | left untouched |
//!
//! The re-encoded bytes replace the original only when they are strictly
//! smaller. Pixel data and any embedded ICC profile are carried over; text
//! and timestamp chunks are not.
//!
//! ## PNGs left untouched
//!
//! The re-encoder writes a single still frame in the image's own colour
//! values, so a PNG carrying any of these chunks is skipped:
//!
//! | Chunk | Meaning |
//! |---|---|
//! | `acTL` | animation (APNG); only the first frame would survive |
//! | `gAMA`, `cHRM`, `sRGB`, `cICP`, `mDCV`, `cLLI` | colour interpretation |
//! | `eXIf` | EXIF data, including orientation |

use super::backend::{OptimizeError, Optimization, Optimizer, replace_file};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageDecoder, ImageEncoder, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;

/// JPEG quality used when none is configured.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// PNG chunks the re-encoder cannot reproduce.
const UNCARRIED_PNG_CHUNKS: &[&[u8; 4]] = &[
    b"acTL", b"gAMA", b"cHRM", b"sRGB", b"cICP", b"mDCV", b"cLLI", b"eXIf",
];

/// Optimizer built on the `image` crate.
#[derive(Debug, Clone)]
pub struct RustOptimizer {
    allow_lossy: bool,
    jpeg_quality: u8,
}

impl RustOptimizer {
    /// Lossless-only optimizer.
    pub fn new() -> Self {
        Self {
            allow_lossy: false,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Also re-encode JPEGs at `quality` (clamped to 1–100).
    pub fn lossy(quality: u32) -> Self {
        Self {
            allow_lossy: true,
            jpeg_quality: quality.clamp(1, 100) as u8,
        }
    }
}

impl Default for RustOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Chunk types of a PNG stream, in file order, up to `IEND`.
///
/// Stops quietly at a bad signature or a truncated chunk; the decoder
/// reports those properly.
fn png_chunk_types(bytes: &[u8]) -> Vec<[u8; 4]> {
    let mut types = Vec::new();
    if !bytes.starts_with(PNG_SIGNATURE) {
        return types;
    }
    let mut pos = PNG_SIGNATURE.len();
    while let Some(header) = bytes.get(pos..pos + 8) {
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let ty = [header[4], header[5], header[6], header[7]];
        types.push(ty);
        if &ty == b"IEND" {
            break;
        }
        // length + type + data + crc
        match len.checked_add(12).and_then(|n| pos.checked_add(n)) {
            Some(next) if next <= bytes.len() => pos = next,
            _ => break,
        }
    }
    types
}

/// First chunk in `bytes` that [`encode_png`] would lose.
fn uncarried_png_chunk(bytes: &[u8]) -> Option<[u8; 4]> {
    png_chunk_types(bytes)
        .into_iter()
        .find(|ty| UNCARRIED_PNG_CHUNKS.contains(&ty))
}

fn decode_error(path: &Path, e: image::ImageError) -> OptimizeError {
    OptimizeError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Decode `bytes` along with the ICC profile embedded in them, if any.
fn decode(
    bytes: &[u8],
    format: ImageFormat,
    path: &Path,
) -> Result<(DynamicImage, Option<Vec<u8>>), OptimizeError> {
    let mut decoder = ImageReader::with_format(Cursor::new(bytes), format)
        .with_guessed_format()?
        .into_decoder()
        .map_err(|e| decode_error(path, e))?;
    let icc = decoder.icc_profile().map_err(|e| decode_error(path, e))?;
    let img = DynamicImage::from_decoder(decoder).map_err(|e| decode_error(path, e))?;
    Ok((img, icc))
}

/// `None` when the encoder refuses the ICC profile.
fn encode_png(
    img: &DynamicImage,
    icc: Option<Vec<u8>>,
    path: &Path,
) -> Result<Option<Vec<u8>>, OptimizeError> {
    let mut buf = Vec::new();
    let mut encoder =
        PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive);
    if let Some(icc) = icc {
        if encoder.set_icc_profile(icc).is_err() {
            return Ok(None);
        }
    }
    img.write_with_encoder(encoder)
        .map_err(|e| OptimizeError::Encode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(Some(buf))
}

fn encode_jpeg(
    img: &DynamicImage,
    icc: Option<Vec<u8>>,
    path: &Path,
    quality: u8,
) -> Result<Option<Vec<u8>>, OptimizeError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    if let Some(icc) = icc {
        if encoder.set_icc_profile(icc).is_err() {
            return Ok(None);
        }
    }
    // JPEG has no alpha channel
    let img = match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img.clone(),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };
    img.write_with_encoder(encoder)
        .map_err(|e| OptimizeError::Encode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(Some(buf))
}

impl Optimizer for RustOptimizer {
    fn name(&self) -> &str {
        "rust"
    }

    fn optimize(&self, path: &Path) -> Result<Optimization, OptimizeError> {
        let before = std::fs::metadata(path)?.len();
        let format = ImageFormat::from_path(path)
            .map_err(|_| OptimizeError::Unsupported(path.to_path_buf()))?;

        let encoded = match format {
            ImageFormat::Png => {
                let bytes = std::fs::read(path)?;
                if let Some(ty) = uncarried_png_chunk(&bytes) {
                    log::debug!(
                        "{}: has a {} chunk, leaving it as is",
                        path.display(),
                        String::from_utf8_lossy(&ty)
                    );
                    None
                } else {
                    let (img, icc) = decode(&bytes, format, path)?;
                    encode_png(&img, icc, path)?
                }
            }
            ImageFormat::Jpeg if self.allow_lossy => {
                let (img, icc) = decode(&std::fs::read(path)?, format, path)?;
                encode_jpeg(&img, icc, path, self.jpeg_quality)?
            }
            _ => None,
        };

        match encoded {
            Some(bytes) if (bytes.len() as u64) < before => {
                replace_file(path, &bytes)?;
                Ok(Optimization {
                    bytes_before: before,
                    bytes_after: bytes.len() as u64,
                })
            }
            _ => Ok(Optimization::unchanged(before)),
        }
    }
}
