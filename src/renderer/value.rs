//! Values exchanged with a renderer object.
//!
//! Renderers hand back plain data: scalars for state accessors and [`RawImage`] for
//! framebuffers. The image keeps the renderer's native pixel layout; normalization
//! happens in [`crate::bridge::frame`].

use serde::{Deserialize, Serialize};

/// Native pixel layouts a renderer may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 8-bit R, G, B
    Rgb888,
    /// 8-bit B, G, R (common for display controllers wired BGR)
    Bgr888,
    /// 8-bit R, G, B, A; alpha is dropped on normalization
    Rgba8888,
    /// 16-bit 5-6-5, big endian as clocked out to SPI panels
    Rgb565,
    /// 8-bit grayscale
    Luma8,
    /// 1 bit per pixel, MSB first, each row padded to a whole byte
    Mono1,
}

impl PixelFormat {
    /// Number of bytes one row of `width` pixels occupies.
    pub fn row_bytes(self, width: u32) -> usize {
        let width = width as usize;
        match self {
            PixelFormat::Rgb888 | PixelFormat::Bgr888 => width * 3,
            PixelFormat::Rgba8888 => width * 4,
            PixelFormat::Rgb565 => width * 2,
            PixelFormat::Luma8 => width,
            PixelFormat::Mono1 => width.div_ceil(8),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Rgb888 => "rgb888",
            PixelFormat::Bgr888 => "bgr888",
            PixelFormat::Rgba8888 => "rgba8888",
            PixelFormat::Rgb565 => "rgb565",
            PixelFormat::Luma8 => "luma8",
            PixelFormat::Mono1 => "mono1",
        }
    }
}

/// A framebuffer in the renderer's native layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl RawImage {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    /// Zero-filled image of the given size.
    pub fn blank(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = format.row_bytes(width) * height as usize;
        Self::new(width, height, format, vec![0; len])
    }

    /// Byte length a well-formed image of this size and format must have.
    pub fn expected_len(&self) -> Option<usize> {
        self.format
            .row_bytes(self.width)
            .checked_mul(self.height as usize)
    }

    /// Structural check: non-zero width and height and a pixel buffer of exactly the
    /// expected size.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.expected_len() == Some(self.data.len())
    }
}

/// Dynamically typed value returned by renderer calls and attribute reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    Image(RawImage),
}

impl Value {
    /// The image carried by this value, if it is one that passes the structural check.
    pub fn as_image(&self) -> Option<&RawImage> {
        match self {
            Value::Image(image) if image.is_well_formed() => Some(image),
            _ => None,
        }
    }

    pub fn into_image(self) -> Option<RawImage> {
        match self {
            Value::Image(image) if image.is_well_formed() => Some(image),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::None => f.write_str("none"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Image(image) => write!(
                f,
                "<image {}x{} {}>",
                image.width,
                image.height,
                image.format.as_str()
            ),
        }
    }
}
