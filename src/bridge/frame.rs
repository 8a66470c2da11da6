//! Frame extraction and pixel normalization.
//!
//! Renderers expose their framebuffer in whatever layout the panel driver wants. The
//! extractor reads it through the resolved accessor and converts it to RGB8 so every
//! consumer sees one channel order.

use crate::bridge::binding::RendererHandle;
use crate::bridge::capability::FrameAccessor;
use crate::config::DisplayProfile;
use crate::error::{PreviewError, Result};
use crate::renderer::{PixelFormat, RawImage};
use image::{imageops, Rgb, RgbImage};
use std::fmt;

/// Largest factor accepted by [`FrameBuffer::upscale`].
pub const MAX_UPSCALE: u32 = 8;

/// Logical resolution a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionProfile {
    Display(DisplayProfile),
    Native { width: u32, height: u32 },
}

impl ResolutionProfile {
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        DisplayProfile::from_dimensions(width, height)
            .map(ResolutionProfile::Display)
            .unwrap_or(ResolutionProfile::Native { width, height })
    }
}

impl fmt::Display for ResolutionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionProfile::Display(profile) => {
                let (w, h) = profile.dimensions();
                write!(f, "{w}x{h}")
            }
            ResolutionProfile::Native { width, height } => write!(f, "{width}x{height} (native)"),
        }
    }
}

/// Normalized RGB8 frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    pixels: RgbImage,
    profile: ResolutionProfile,
}

impl FrameBuffer {
    pub fn from_rgb(pixels: RgbImage) -> Self {
        let profile = ResolutionProfile::for_dimensions(pixels.width(), pixels.height());
        Self { pixels, profile }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn profile(&self) -> ResolutionProfile {
        self.profile
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        (x < self.width() && y < self.height()).then(|| self.pixels.get_pixel(x, y).0)
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn into_rgb(self) -> RgbImage {
        self.pixels
    }

    /// Nearest-neighbour upscale for display. The profile stays the logical one.
    pub fn upscale(&self, factor: u32) -> Result<FrameBuffer> {
        if !(1..=MAX_UPSCALE).contains(&factor) {
            return Err(PreviewError::extraction(format!(
                "upscale factor {factor} outside 1..={MAX_UPSCALE}"
            )));
        }
        if factor == 1 {
            return Ok(self.clone());
        }
        let pixels = imageops::resize(
            &self.pixels,
            self.width() * factor,
            self.height() * factor,
            imageops::FilterType::Nearest,
        );
        Ok(FrameBuffer {
            pixels,
            profile: self.profile,
        })
    }

    /// FNV-1a over dimensions and pixels; equal frames give equal fingerprints.
    pub fn fingerprint(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let dims = [self.width().to_le_bytes(), self.height().to_le_bytes()];
        dims.iter()
            .flatten()
            .chain(self.pixels.as_raw().iter())
            .fold(OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(PRIME))
    }
}

/// Convert a native framebuffer to RGB8.
pub fn normalize(raw: &RawImage) -> Result<FrameBuffer> {
    if !raw.is_well_formed() {
        return Err(PreviewError::extraction(format!(
            "malformed {} image {}x{} with {} bytes",
            raw.format.as_str(),
            raw.width,
            raw.height,
            raw.data.len()
        )));
    }

    let row_bytes = raw.format.row_bytes(raw.width);
    let mut pixels = RgbImage::new(raw.width, raw.height);
    for (y, row) in raw.data.chunks_exact(row_bytes).enumerate() {
        for x in 0..raw.width {
            pixels.put_pixel(x, y as u32, Rgb(decode_pixel(raw.format, row, x as usize)));
        }
    }
    Ok(FrameBuffer::from_rgb(pixels))
}

fn decode_pixel(format: PixelFormat, row: &[u8], x: usize) -> [u8; 3] {
    match format {
        PixelFormat::Rgb888 => [row[x * 3], row[x * 3 + 1], row[x * 3 + 2]],
        PixelFormat::Bgr888 => [row[x * 3 + 2], row[x * 3 + 1], row[x * 3]],
        PixelFormat::Rgba8888 => [row[x * 4], row[x * 4 + 1], row[x * 4 + 2]],
        PixelFormat::Rgb565 => {
            let value = u16::from_be_bytes([row[x * 2], row[x * 2 + 1]]);
            rgb565_to_rgb888(value)
        }
        PixelFormat::Luma8 => [row[x]; 3],
        PixelFormat::Mono1 => {
            let on = row[x / 8] & (0x80 >> (x % 8)) != 0;
            if on {
                [255; 3]
            } else {
                [0; 3]
            }
        }
    }
}

/// Expand 5-6-5 to 8 bits per channel, replicating high bits so white stays white.
pub fn rgb565_to_rgb888(value: u16) -> [u8; 3] {
    let r = ((value >> 11) & 0x1f) as u8;
    let g = ((value >> 5) & 0x3f) as u8;
    let b = (value & 0x1f) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

/// Read and normalize the current frame of a bound handle.
pub fn extract(handle: &mut RendererHandle) -> Result<FrameBuffer> {
    if !handle.is_valid() {
        return Err(PreviewError::extraction(format!(
            "renderer handle {} is no longer valid",
            handle.id()
        )));
    }

    let capabilities = handle.capabilities();
    let value = match &capabilities.frame {
        FrameAccessor::Method(name) => {
            handle.instance_mut().call(name, &[]).map_err(|fault| {
                fault.into_error(|message| {
                    PreviewError::extraction(format!("{name}() raised: {message}"))
                })
            })?
        }
        FrameAccessor::Attribute(name) | FrameAccessor::Scanned(name) => {
            handle.instance().attribute(name).unwrap_or_default()
        }
        FrameAccessor::Child { object, attribute } => handle
            .instance()
            .child(object)
            .and_then(|child| child.attribute(attribute))
            .unwrap_or_default(),
        FrameAccessor::Unsupported => {
            return Err(PreviewError::extraction(
                "renderer exposes no frame accessor",
            ))
        }
    };

    match value {
        crate::renderer::Value::Image(raw) => normalize(&raw),
        other => Err(PreviewError::extraction(format!(
            "{} returned {} instead of an image",
            capabilities.frame, other
        ))),
    }
}
