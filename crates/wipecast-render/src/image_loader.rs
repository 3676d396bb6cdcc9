//! Image loading module.
//! Resolves data URIs, URLs and file paths into decoded RGBA bitmaps.

use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use image::ImageEncoder;
use parking_lot::Mutex;

use wipecast_core::hash::{hash_bytes, ContentHash};
use wipecast_core::{FrameBuffer, Size2D, UploadConfig, WipecastError, WipecastResult};

const DATA_URI_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// `data:<mime>;base64,<payload>`
    DataUri(String),
    /// `http://` or `https://`
    Url(String),
    /// A local file, either a bare path or `file://...`.
    Path(PathBuf),
}

impl ImageSource {
    pub fn parse(source: &str) -> Self {
        let trimmed = source.trim();
        if trimmed.starts_with(DATA_URI_PREFIX) {
            ImageSource::DataUri(trimmed.to_string())
        } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            ImageSource::Url(trimmed.to_string())
        } else if let Some(path) = trimmed.strip_prefix("file://") {
            ImageSource::Path(PathBuf::from(path))
        } else {
            ImageSource::Path(PathBuf::from(trimmed))
        }
    }

    /// Short human-readable origin for errors and logs. Data URIs are not echoed.
    pub fn label(&self) -> String {
        match self {
            ImageSource::DataUri(uri) => {
                let mime = split_data_uri(uri).map(|(m, _)| m).unwrap_or("?");
                format!("<data uri {}, {} bytes>", mime, uri.len())
            }
            ImageSource::Url(url) => url.clone(),
            ImageSource::Path(path) => path.display().to_string(),
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A decoded, immutable bitmap. Clones share the pixel data.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    bitmap: Arc<FrameBuffer>,
    origin: Arc<str>,
}

impl ImageHandle {
    pub fn from_frame(bitmap: FrameBuffer, origin: impl Into<String>) -> Self {
        Self {
            bitmap: Arc::new(bitmap),
            origin: Arc::from(origin.into()),
        }
    }

    pub fn width(&self) -> u32 {
        self.bitmap.width
    }

    pub fn height(&self) -> u32 {
        self.bitmap.height
    }

    pub fn size(&self) -> Size2D {
        Size2D::new(self.bitmap.width as f64, self.bitmap.height as f64)
    }

    pub fn bitmap(&self) -> &FrameBuffer {
        &self.bitmap
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Encode the bitmap as PNG bytes.
    pub fn to_png(&self) -> WipecastResult<Vec<u8>> {
        encode_png(&self.bitmap)
    }

    /// Encode as `data:image/png;base64,...`.
    pub fn to_data_uri(&self) -> WipecastResult<String> {
        let png = self.to_png()?;
        Ok(format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        ))
    }
}

/// Encode an RGBA frame as PNG.
pub fn encode_png(frame: &FrameBuffer) -> WipecastResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image::codecs::png::PngEncoder::new(&mut out)
        .write_image(
            &frame.data,
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| WipecastError::Encoding(format!("PNG encode failed: {}", e)))?;
    Ok(out.into_inner())
}

/// Split a data URI into its MIME type and base64 payload.
pub fn split_data_uri(uri: &str) -> WipecastResult<(&str, &str)> {
    let rest = uri
        .strip_prefix(DATA_URI_PREFIX)
        .ok_or_else(|| WipecastError::decode("not a data URI", "<data uri>"))?;
    let marker = rest
        .find(BASE64_MARKER)
        .ok_or_else(|| WipecastError::decode("data URI is not base64 encoded", "<data uri>"))?;
    let mime = &rest[..marker];
    let payload = &rest[marker + BASE64_MARKER.len()..];
    Ok((mime, payload))
}

/// Decode a data URI into its MIME type and raw bytes.
pub fn parse_data_uri(uri: &str) -> WipecastResult<(String, Vec<u8>)> {
    let (mime, payload) = split_data_uri(uri)?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| WipecastError::decode(format!("invalid base64 payload: {}", e), "<data uri>"))?;
    Ok((mime.to_ascii_lowercase(), bytes))
}

/// Decode a data URI and apply the upload gate to it.
pub fn parse_image_data_uri(uri: &str, max_bytes: usize) -> WipecastResult<(String, Vec<u8>)> {
    let (mime, bytes) = parse_data_uri(uri)?;
    validate_upload(&mime, bytes.len(), max_bytes)?;
    Ok((mime, bytes))
}

/// Gate applied to every upload before any decoding happens.
pub fn validate_upload(mime: &str, len: usize, max_bytes: usize) -> WipecastResult<()> {
    if !mime.trim().to_ascii_lowercase().starts_with("image/") {
        return Err(WipecastError::UnsupportedFile(format!(
            "expected an image, got '{}'",
            mime
        )));
    }
    if len > max_bytes {
        return Err(WipecastError::UnsupportedFile(format!(
            "image is {} bytes, the limit is {} bytes",
            len, max_bytes
        )));
    }
    Ok(())
}

/// Decode PNG, JPEG, WebP, GIF and other formats into an RGBA frame.
pub fn decode_image(data: &[u8], origin: &str) -> WipecastResult<FrameBuffer> {
    let img = image::load_from_memory(data)
        .map_err(|e| WipecastError::decode(format!("failed to decode image: {}", e), origin))?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(WipecastError::decode("image has no pixels", origin));
    }
    FrameBuffer::from_raw(width, height, rgba.into_raw())
}

fn mime_for_path(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Loads and caches image handles.
///
/// Handles are keyed by a digest of the source string, so a new session with
/// the same sources reuses the decoded bitmaps.
pub struct ImageLoader {
    client: reqwest::Client,
    max_bytes: usize,
    cache: Mutex<HashMap<ContentHash, ImageHandle>>,
}

impl ImageLoader {
    pub fn new(max_bytes: usize) -> Self {
        Self::with_client(reqwest::Client::new(), max_bytes)
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.max_image_bytes)
    }

    pub fn with_client(client: reqwest::Client, max_bytes: usize) -> Self {
        Self {
            client,
            max_bytes,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Resolve `source` into a drawable handle.
    pub async fn load(&self, source: &str) -> WipecastResult<ImageHandle> {
        let key = hash_bytes(source.trim().as_bytes());
        if let Some(handle) = self.cache.lock().get(&key) {
            tracing::debug!("image cache hit for {}", handle.origin());
            return Ok(handle.clone());
        }

        let source = ImageSource::parse(source);
        let origin = source.label();
        let (mime, bytes) = self.fetch(&source).await?;
        validate_upload(&mime, bytes.len(), self.max_bytes)?;

        let decode_origin = origin.clone();
        let bitmap = tokio::task::spawn_blocking(move || decode_image(&bytes, &decode_origin))
            .await
            .map_err(|e| WipecastError::decode(format!("decoder task failed: {}", e), &origin))??;

        tracing::debug!(
            "decoded {} ({}x{}, {})",
            origin,
            bitmap.width,
            bitmap.height,
            mime
        );
        let handle = ImageHandle::from_frame(bitmap, origin);
        self.cache.lock().insert(key, handle.clone());
        Ok(handle)
    }

    /// Load the before and after images concurrently.
    pub async fn load_pair(
        &self,
        before: &str,
        after: &str,
    ) -> WipecastResult<(ImageHandle, ImageHandle)> {
        tokio::try_join!(self.load(before), self.load(after))
    }

    /// Drop every cached handle. Bitmaps are freed once no session holds them.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Number of cached handles.
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }

    async fn fetch(&self, source: &ImageSource) -> WipecastResult<(String, Vec<u8>)> {
        match source {
            ImageSource::DataUri(uri) => parse_data_uri(uri),
            ImageSource::Path(path) => {
                let mime = mime_for_path(path);
                // MIME is checked first so a text file never gets read or decoded.
                validate_upload(&mime, 0, self.max_bytes)?;
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    WipecastError::decode(format!("failed to read file: {}", e), path.display().to_string())
                })?;
                Ok((mime, bytes))
            }
            ImageSource::Url(url) => self.fetch_url(url).await,
        }
    }

    async fn fetch_url(&self, url: &str) -> WipecastResult<(String, Vec<u8>)> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WipecastError::decode(format!("request failed: {}", e), url))?;

        if !res.status().is_success() {
            return Err(WipecastError::decode(
                format!("server responded {}", res.status()),
                url,
            ));
        }

        let mime = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| mime_for_path(Path::new(url)));

        if let Some(len) = res.content_length() {
            validate_upload(&mime, len as usize, self.max_bytes)?;
        }

        let bytes = res
            .bytes()
            .await
            .map_err(|e| WipecastError::decode(format!("failed to read body: {}", e), url))?;
        Ok((mime, bytes.to_vec()))
    }
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wipecast_core::Color;

    fn png_data_uri(width: u32, height: u32, color: &Color) -> String {
        ImageHandle::from_frame(FrameBuffer::solid(width, height, color), "test")
            .to_data_uri()
            .unwrap()
    }

    fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wipecast-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_parse_sources() {
        assert!(matches!(
            ImageSource::parse("data:image/png;base64,AAAA"),
            ImageSource::DataUri(_)
        ));
        assert!(matches!(
            ImageSource::parse("https://example.com/a.png"),
            ImageSource::Url(_)
        ));
        assert_eq!(
            ImageSource::parse("file:///tmp/a.png"),
            ImageSource::Path(PathBuf::from("/tmp/a.png"))
        );
        assert_eq!(
            ImageSource::parse("before.jpg"),
            ImageSource::Path(PathBuf::from("before.jpg"))
        );
    }

    #[test]
    fn test_split_data_uri() {
        let (mime, payload) = split_data_uri("data:image/jpeg;base64,QUJD").unwrap();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(payload, "QUJD");

        assert!(matches!(
            split_data_uri("data:image/png,raw"),
            Err(WipecastError::Decode { .. })
        ));
        assert!(matches!(
            parse_data_uri("data:image/png;base64,!!!"),
            Err(WipecastError::Decode { .. })
        ));
    }

    #[test]
    fn test_validate_upload() {
        assert!(validate_upload("image/png", 10, 100).is_ok());
        assert!(validate_upload("IMAGE/WEBP", 100, 100).is_ok());
        assert!(matches!(
            validate_upload("text/plain", 10, 100),
            Err(WipecastError::UnsupportedFile(_))
        ));
        assert!(matches!(
            validate_upload("image/png", 101, 100),
            Err(WipecastError::UnsupportedFile(_))
        ));
    }

    #[test]
    fn test_image_data_uri_gate() {
        let (mime, bytes) = parse_image_data_uri("data:image/png;base64,QUJD", 3).unwrap();
        assert_eq!((mime.as_str(), bytes.as_slice()), ("image/png", b"ABC".as_slice()));
        assert!(matches!(
            parse_image_data_uri("data:text/plain;base64,aGVsbG8=", 100),
            Err(WipecastError::UnsupportedFile(_))
        ));
        assert!(matches!(
            parse_image_data_uri("data:image/png;base64,QUJD", 2),
            Err(WipecastError::UnsupportedFile(_))
        ));
    }

    #[test]
    fn test_data_uri_round_trip_pixels() {
        let uri = png_data_uri(4, 3, &Color::RED);
        let (mime, bytes) = parse_data_uri(&uri).unwrap();
        assert_eq!(mime, "image/png");
        let frame = decode_image(&bytes, "test").unwrap();
        assert_eq!(frame.dimensions(), (4, 3));
        assert_eq!(frame.get_pixel(3, 2), Some([255, 0, 0, 255]));
    }

    #[tokio::test]
    async fn test_load_data_uri_and_cache() {
        let loader = ImageLoader::default();
        let uri = png_data_uri(4, 3, &Color::BLUE);

        let first = loader.load(&uri).await.unwrap();
        assert_eq!((first.width(), first.height()), (4, 3));
        assert_eq!(loader.cached(), 1);

        let second = loader.load(&uri).await.unwrap();
        assert!(Arc::ptr_eq(&first.bitmap, &second.bitmap));

        loader.clear_cache();
        assert_eq!(loader.cached(), 0);
        assert_eq!(first.bitmap().get_pixel(0, 0), Some([0, 0, 255, 255]));
    }

    #[tokio::test]
    async fn test_text_file_is_unsupported() {
        let path = temp_file("notes.txt", b"definitely not an image");
        let loader = ImageLoader::default();
        let err = loader.load(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, WipecastError::UnsupportedFile(_)), "{err}");
    }

    #[tokio::test]
    async fn test_corrupt_png_is_decode_error() {
        let path = temp_file("broken.png", b"\x89PNG but not really");
        let loader = ImageLoader::default();
        let err = loader.load(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, WipecastError::Decode { .. }), "{err}");
        assert_eq!(loader.cached(), 0);
    }

    #[tokio::test]
    async fn test_oversized_data_uri_is_rejected() {
        let loader = ImageLoader::new(16);
        let uri = png_data_uri(8, 8, &Color::GREEN);
        let err = loader.load(&uri).await.unwrap_err();
        assert!(matches!(err, WipecastError::UnsupportedFile(_)));
    }

    #[tokio::test]
    async fn test_non_image_data_uri_is_rejected() {
        let loader = ImageLoader::default();
        let err = loader
            .load("data:text/plain;base64,aGVsbG8=")
            .await
            .unwrap_err();
        assert!(matches!(err, WipecastError::UnsupportedFile(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_decode_error() {
        let loader = ImageLoader::default();
        let err = loader
            .load("/nonexistent/wipecast/before.png")
            .await
            .unwrap_err();
        assert!(matches!(err, WipecastError::Decode { .. }));
    }
}
