use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::WipecastError;

/// Video/animation container a recorded clip can be emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// WebM with VP9 video.
    Webm,
    /// MP4 with H.264 video.
    Mp4,
    /// Animated GIF.
    Gif,
    /// Animated PNG.
    Apng,
}

impl ContainerFormat {
    pub const ALL: [ContainerFormat; 4] = [
        ContainerFormat::Webm,
        ContainerFormat::Mp4,
        ContainerFormat::Gif,
        ContainerFormat::Apng,
    ];

    /// File extension used for downloads, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Webm => "webm",
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Gif => "gif",
            ContainerFormat::Apng => "png",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ContainerFormat::Webm => "video/webm",
            ContainerFormat::Mp4 => "video/mp4",
            ContainerFormat::Gif => "image/gif",
            ContainerFormat::Apng => "image/apng",
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerFormat::Webm => "webm",
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Gif => "gif",
            ContainerFormat::Apng => "apng",
        };
        f.pad(name)
    }
}

impl FromStr for ContainerFormat {
    type Err = WipecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webm" | "video/webm" => Ok(ContainerFormat::Webm),
            "mp4" | "video/mp4" => Ok(ContainerFormat::Mp4),
            "gif" | "image/gif" => Ok(ContainerFormat::Gif),
            "apng" | "png" | "image/apng" => Ok(ContainerFormat::Apng),
            other => Err(WipecastError::InvalidArgument(format!(
                "unknown container format '{}' (expected webm, mp4, gif or apng)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats() {
        assert_eq!("WebM".parse::<ContainerFormat>().unwrap(), ContainerFormat::Webm);
        assert_eq!("video/mp4".parse::<ContainerFormat>().unwrap(), ContainerFormat::Mp4);
        assert_eq!("png".parse::<ContainerFormat>().unwrap(), ContainerFormat::Apng);
        assert!("mkv".parse::<ContainerFormat>().is_err());
    }

    #[test]
    fn test_apng_uses_png_extension() {
        assert_eq!(ContainerFormat::Apng.extension(), "png");
        assert_eq!(ContainerFormat::Apng.to_string(), "apng");
    }
}
