use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, DynamicImage};

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// A lossy-encoded frame ready for transmission.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub jpeg: Bytes,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn to_data_uri(&self) -> String {
        format!("data:image/jpeg;base64,{}", BASE64_STANDARD.encode(&self.jpeg))
    }
}

pub fn encode_jpeg(frame: &DynamicImage, quality: u8) -> Result<EncodedImage> {
    let rgb = frame.to_rgb8();
    let mut out = Vec::with_capacity((rgb.width() * rgb.height()) as usize / 4);
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(&rgb)
        .context("encode jpeg")?;
    Ok(EncodedImage { jpeg: Bytes::from(out), width: rgb.width(), height: rgb.height() })
}
