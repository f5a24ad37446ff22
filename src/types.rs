//! Core value types shared across the crate
//!
//! Video modes, frames, device identities and platform detection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel encoding of a video mode or frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelEncoding {
    Mjpeg,
    Yuyv,
    Rgb24,
    Bgr24,
    Gray8,
    Nv12,
    Unknown,
}

impl PixelEncoding {
    /// Map a V4L2 FourCC code to an encoding
    pub fn from_fourcc(code: &[u8; 4]) -> Self {
        match code {
            b"MJPG" | b"JPEG" => PixelEncoding::Mjpeg,
            b"YUYV" | b"YUY2" => PixelEncoding::Yuyv,
            b"RGB3" => PixelEncoding::Rgb24,
            b"BGR3" => PixelEncoding::Bgr24,
            b"GREY" | b"Y800" => PixelEncoding::Gray8,
            b"NV12" => PixelEncoding::Nv12,
            _ => PixelEncoding::Unknown,
        }
    }

    /// V4L2 FourCC for this encoding, if it has one
    pub fn fourcc(&self) -> Option<[u8; 4]> {
        match self {
            PixelEncoding::Mjpeg => Some(*b"MJPG"),
            PixelEncoding::Yuyv => Some(*b"YUYV"),
            PixelEncoding::Rgb24 => Some(*b"RGB3"),
            PixelEncoding::Bgr24 => Some(*b"BGR3"),
            PixelEncoding::Gray8 => Some(*b"GREY"),
            PixelEncoding::Nv12 => Some(*b"NV12"),
            PixelEncoding::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PixelEncoding::Mjpeg => "MJPEG",
            PixelEncoding::Yuyv => "YUYV",
            PixelEncoding::Rgb24 => "RGB24",
            PixelEncoding::Bgr24 => "BGR24",
            PixelEncoding::Gray8 => "GRAY8",
            PixelEncoding::Nv12 => "NV12",
            PixelEncoding::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for PixelEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A concrete capture configuration a device can be set to.
///
/// Video modes are plain values: equality compares every field, and a mode
/// never changes once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoMode {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub encoding: PixelEncoding,
}

impl VideoMode {
    pub fn new(width: u32, height: u32, fps: u32, encoding: PixelEncoding) -> Self {
        Self {
            width,
            height,
            fps,
            encoding,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

impl fmt::Display for VideoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}@{}fps {}",
            self.width, self.height, self.fps, self.encoding
        )
    }
}

/// Caller-owned frame buffer filled by capture and read by publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub encoding: PixelEncoding,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, encoding: PixelEncoding) -> Self {
        Self {
            data,
            width,
            height,
            encoding,
        }
    }

    /// An empty buffer, ready to be reused across capture calls
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            width: 0,
            height: 0,
            encoding: PixelEncoding::Unknown,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Replace the contents of this buffer, keeping its allocation
    pub fn fill(&mut self, bytes: &[u8], width: u32, height: u32, encoding: PixelEncoding) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
        self.width = width;
        self.height = height;
        self.encoding = encoding;
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::empty()
    }
}

/// Name and system path of a physical capture device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub name: String,
    pub path: String,
}

impl DeviceIdentity {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.path)
    }
}

/// A device found during enumeration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub identity: DeviceIdentity,
    pub driver: Option<String>,
}

/// Host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Windows,
    MacOS,
    Linux,
    Unknown,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOS
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOS => "macos",
            Platform::Linux => "linux",
            Platform::Unknown => "unknown",
        }
    }

    /// Whether freshly opened devices report readiness asynchronously
    pub fn has_async_device_readiness(&self) -> bool {
        matches!(self, Platform::Windows)
    }
}
