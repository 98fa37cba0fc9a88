//! Upload validation, file naming, image optimisation and the folder
//! allow-list shared by storage and the delete endpoint.

use std::io::Cursor;
use std::path::{Component, Path};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageFormat;
use uuid::Uuid;

const MB: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("No file provided")]
    Missing,
    #[error("Invalid file type: {0}")]
    InvalidType(String),
    #[error("File size too large. Maximum size is {}MB", .max_bytes / MB)]
    TooLarge { max_bytes: usize },
    #[error("Invalid file directory")]
    InvalidDirectory,
    #[error("Width and height must be between 1 and {} pixels", MAX_DIMENSION)]
    InvalidDimensions,
    #[error("failed to optimise image: {0}")]
    Optimize(String),
}

/// Public subfolders uploads may live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaFolder {
    ProfilePictures,
    CoverPictures,
    Posts,
}

impl MediaFolder {
    pub const ALL: [MediaFolder; 3] = [MediaFolder::ProfilePictures, MediaFolder::CoverPictures, MediaFolder::Posts];

    pub fn as_str(self) -> &'static str {
        match self {
            MediaFolder::ProfilePictures => "profile-pictures",
            MediaFolder::CoverPictures => "cover-pictures",
            MediaFolder::Posts => "posts",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }

    /// Folder for an upload `type` field; anything unrecognised goes to posts.
    pub fn for_kind(kind: Option<&str>) -> Self {
        match kind {
            Some("profile") => MediaFolder::ProfilePictures,
            Some("cover") => MediaFolder::CoverPictures,
            _ => MediaFolder::Posts,
        }
    }
}

/// A stored file's location, e.g. `/posts/<uuid>.jpg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPath {
    pub folder: MediaFolder,
    pub file_name: String,
}

impl MediaPath {
    /// Accepts exactly `/{folder}/{file}` with an allow-listed folder and a
    /// single plain file component.
    pub fn parse(url: &str) -> Result<Self, MediaError> {
        let rest = url.strip_prefix('/').ok_or(MediaError::InvalidDirectory)?;
        let (folder, file) = rest.split_once('/').ok_or(MediaError::InvalidDirectory)?;
        let folder = MediaFolder::parse(folder).ok_or(MediaError::InvalidDirectory)?;
        if !is_plain_file_name(file) {
            return Err(MediaError::InvalidDirectory);
        }
        Ok(Self { folder, file_name: file.to_string() })
    }

    pub fn url(&self) -> String {
        format!("/{}/{}", self.folder.as_str(), self.file_name)
    }
}

pub fn is_plain_file_name(name: &str) -> bool {
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return false;
    }
    let mut comps = Path::new(name).components();
    matches!((comps.next(), comps.next()), (Some(Component::Normal(_)), None))
}

/// An uploaded file held in memory.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub declared_mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Sniffed from the bytes, falling back to the declared part type.
    pub fn mime(&self) -> Option<String> {
        infer::get(&self.bytes)
            .map(|t| t.mime_type().to_string())
            .or_else(|| self.declared_mime.clone())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    pub max_bytes: usize,
    pub allowed: &'static [&'static str],
}

const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];
const POST_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp", "video/mp4", "video/quicktime"];
const OPTIMIZABLE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

impl UploadPolicy {
    pub const POST_MEDIA: UploadPolicy = UploadPolicy { max_bytes: 10 * MB, allowed: POST_TYPES };
    pub const PROFILE_IMAGE: UploadPolicy = UploadPolicy { max_bytes: 5 * MB, allowed: IMAGE_TYPES };
    pub const OPTIMIZE_INPUT: UploadPolicy = UploadPolicy { max_bytes: 10 * MB, allowed: OPTIMIZABLE_TYPES };
}

/// Rejects before anything is written.
pub fn validate(upload: Option<&Upload>, policy: &UploadPolicy) -> Result<(), MediaError> {
    let upload = upload.ok_or(MediaError::Missing)?;
    if upload.bytes.is_empty() {
        return Err(MediaError::Missing);
    }
    let mime = upload.mime().unwrap_or_else(|| "application/octet-stream".into());
    if !policy.allowed.contains(&mime.as_str()) {
        return Err(MediaError::InvalidType(mime));
    }
    if upload.bytes.len() > policy.max_bytes {
        return Err(MediaError::TooLarge { max_bytes: policy.max_bytes });
    }
    Ok(())
}

/// Random name keeping the original (lowercased) extension; when the
/// original has none, the sniffed one is used.
pub fn unique_file_name(original: &str, bytes: &[u8]) -> String {
    let ext = Path::new(&original.to_ascii_lowercase())
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_string)
        .or_else(|| infer::get(bytes).map(|t| t.extension().to_string()));
    match ext {
        Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
        None => Uuid::new_v4().to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeOptions {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

/// Upper bound for either side of an optimised image.
pub const MAX_DIMENSION: u32 = 4096;

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self { width: 800, height: 800, quality: 80 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Optimized {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
}

/// Center-cropped fill to exactly `width x height`. PNG stays PNG,
/// everything else is re-encoded as JPEG at `quality`.
pub fn optimize(bytes: &[u8], opts: OptimizeOptions) -> Result<Optimized, MediaError> {
    if !(1..=MAX_DIMENSION).contains(&opts.width) || !(1..=MAX_DIMENSION).contains(&opts.height) {
        return Err(MediaError::InvalidDimensions);
    }
    let source = image::guess_format(bytes).map_err(|e| MediaError::Optimize(e.to_string()))?;
    let img = image::load_from_memory_with_format(bytes, source).map_err(|e| MediaError::Optimize(e.to_string()))?;
    let resized = img.resize_to_fill(opts.width, opts.height, FilterType::Lanczos3);

    let mut out = Vec::new();
    let format = if source == ImageFormat::Png {
        resized
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .map_err(|e| MediaError::Optimize(e.to_string()))?;
        OutputFormat::Png
    } else {
        let rgb = resized.to_rgb8();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, opts.quality.clamp(1, 100));
        encoder.encode_image(&rgb).map_err(|e| MediaError::Optimize(e.to_string()))?;
        OutputFormat::Jpeg
    };
    Ok(Optimized { bytes: out, format })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(w, h, Rgba([10u8, 200, 30, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    fn jpeg(w: u32, h: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(w, h, Rgb([120u8, 40, 90]));
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90).encode_image(&img).unwrap();
        out
    }

    fn upload(name: &str, bytes: Vec<u8>, declared: Option<&str>) -> Upload {
        Upload { file_name: name.into(), declared_mime: declared.map(str::to_string), bytes }
    }

    #[test]
    fn validate_checks_presence_type_and_size() {
        let policy = UploadPolicy::PROFILE_IMAGE;
        assert_eq!(validate(None, &policy), Err(MediaError::Missing));
        assert_eq!(validate(Some(&upload("a.png", vec![], None)), &policy), Err(MediaError::Missing));
        assert!(validate(Some(&upload("a.png", png(2, 2), None)), &policy).is_ok());

        let text = upload("a.txt", b"hello".to_vec(), Some("text/plain"));
        assert_eq!(validate(Some(&text), &policy), Err(MediaError::InvalidType("text/plain".into())));

        let small = UploadPolicy { max_bytes: 10, allowed: IMAGE_TYPES };
        assert_eq!(
            validate(Some(&upload("a.png", png(4, 4), None)), &small),
            Err(MediaError::TooLarge { max_bytes: 10 })
        );
    }

    #[test]
    fn sniffed_type_wins_over_declared() {
        let lying = upload("a.png", png(2, 2), Some("application/pdf"));
        assert_eq!(lying.mime().as_deref(), Some("image/png"));
        assert!(validate(Some(&lying), &UploadPolicy::POST_MEDIA).is_ok());
    }

    #[test]
    fn too_large_message_reports_megabytes() {
        assert_eq!(
            MediaError::TooLarge { max_bytes: 5 * MB }.to_string(),
            "File size too large. Maximum size is 5MB"
        );
    }

    #[test]
    fn unique_names_keep_extension() {
        let a = unique_file_name("Holiday.JPG", &[]);
        let b = unique_file_name("Holiday.JPG", &[]);
        assert!(a.ends_with(".jpg"));
        assert_ne!(a, b);
        assert!(unique_file_name("blob", &png(1, 1)).ends_with(".png"));
        assert!(!unique_file_name("blob", b"??").contains('.'));
    }

    #[test]
    fn media_path_allow_list() {
        let p = MediaPath::parse("/posts/abc.jpg").unwrap();
        assert_eq!(p.folder, MediaFolder::Posts);
        assert_eq!(p.file_name, "abc.jpg");
        assert_eq!(p.url(), "/posts/abc.jpg");
        assert!(MediaPath::parse("/profile-pictures/x.png").is_ok());

        for bad in ["/etc/passwd", "posts/a.jpg", "/posts/", "/posts/../secret", "/posts/a/b.jpg", "/posts/..", "/uploads/a.jpg"] {
            assert_eq!(MediaPath::parse(bad), Err(MediaError::InvalidDirectory), "{bad}");
        }
    }

    #[test]
    fn folder_for_kind() {
        assert_eq!(MediaFolder::for_kind(Some("profile")), MediaFolder::ProfilePictures);
        assert_eq!(MediaFolder::for_kind(Some("cover")), MediaFolder::CoverPictures);
        assert_eq!(MediaFolder::for_kind(None), MediaFolder::Posts);
    }

    #[test]
    fn optimize_png_stays_png_with_exact_box() {
        let out = optimize(&png(40, 20), OptimizeOptions { width: 10, height: 10, quality: 80 }).unwrap();
        assert_eq!(out.format, OutputFormat::Png);
        assert_eq!(image::guess_format(&out.bytes).unwrap(), ImageFormat::Png);
        let img = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!((img.width(), img.height()), (10, 10));
    }

    #[test]
    fn optimize_jpeg_reencodes_as_jpeg() {
        let out = optimize(&jpeg(30, 60), OptimizeOptions { width: 16, height: 8, quality: 50 }).unwrap();
        assert_eq!(out.format, OutputFormat::Jpeg);
        let img = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!((img.width(), img.height()), (16, 8));
    }

    #[test]
    fn optimize_rejects_oversized_boxes() {
        let too_wide = OptimizeOptions { width: 100_000, height: 10, quality: 80 };
        assert!(matches!(optimize(&png(4, 4), too_wide), Err(MediaError::InvalidDimensions)));
        let too_tall = OptimizeOptions { width: 10, height: MAX_DIMENSION + 1, quality: 80 };
        assert!(matches!(optimize(&png(4, 4), too_tall), Err(MediaError::InvalidDimensions)));
        let edge = OptimizeOptions { width: MAX_DIMENSION, height: 1, quality: 80 };
        assert!(optimize(&png(4, 4), edge).is_ok());
    }

    #[test]
    fn optimize_rejects_non_images() {
        assert!(matches!(optimize(b"not an image", OptimizeOptions::default()), Err(MediaError::Optimize(_))));
    }
}
