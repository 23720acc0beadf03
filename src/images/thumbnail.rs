//! In-process thumbnail and resize generation.
//!
//! These functions decode, scale and encode synchronously; async callers
//! should run them on a blocking thread.

use std::path::Path;

use amur_av::{AtomicOutput, Conversion};
use amur_common::paths::{is_thumbnail, thumbnail_sibling};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};

use crate::error::{Error, Result};

/// Write a `{stem}_thumb{ext}` sibling at exactly half the source dimensions.
pub fn make_thumbnail(source: &Path) -> Result<Conversion> {
    write_scaled(source, |w, h| ((w / 2).max(1), (h / 2).max(1)))
}

/// Write the source scaled to `width` x `height` to its thumbnail sibling.
pub fn resize_image(source: &Path, width: u32, height: u32) -> Result<Conversion> {
    if width == 0 || height == 0 {
        return Err(Error::invalid_input(format!(
            "cannot resize to {width}x{height}"
        )));
    }
    write_scaled(source, |_, _| (width, height))
}

/// Output format for a thumbnail sibling, chosen by the source extension
/// since the sibling keeps it.
fn output_format(source: &Path) -> Option<ImageFormat> {
    ImageFormat::from_path(source)
        .ok()
        .filter(|f| f.writing_enabled())
}

fn write_scaled(source: &Path, dims: impl FnOnce(u32, u32) -> (u32, u32)) -> Result<Conversion> {
    if is_thumbnail(source) {
        return Ok(Conversion::NoOp);
    }

    let Some(format) = output_format(source) else {
        tracing::debug!(path = %source.display(), "No in-process encoder, skipping thumbnail");
        return Ok(Conversion::NoOp);
    };

    if !source.is_file() {
        return Err(amur_av::Error::file_not_found(source).into());
    }

    // Decode by content so a misnamed file still loads.
    let img = ImageReader::open(source)?.with_guessed_format()?.decode()?;
    let (width, height) = dims(img.width(), img.height());
    let scaled = img.resize_exact(width, height, FilterType::Triangle);

    let scaled = match format {
        // JPEG carries no alpha channel.
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(scaled.to_rgb8()),
        _ => scaled,
    };

    let dest = thumbnail_sibling(source);
    let staged = AtomicOutput::new(&dest)?;
    scaled.save_with_format(staged.path(), format)?;
    let dest = staged.commit()?;

    tracing::debug!(
        source = %source.display(),
        dest = %dest.display(),
        width,
        height,
        "Wrote thumbnail"
    );
    Ok(Conversion::Produced(dest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use image::{ImageBuffer, Rgb, Rgba};
    use std::fs;

    fn write_png(path: &Path, w: u32, h: u32) {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(w, h, Rgba([10, 200, 30, 255]));
        img.save_with_format(path, ImageFormat::Png).unwrap();
    }

    #[test]
    fn test_thumbnail_is_half_size() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("cat.png");
        write_png(&src, 101, 40);

        let out = make_thumbnail(&src).unwrap();
        let dest = dir.path().join("cat_thumb.png");
        assert_eq!(out, Conversion::Produced(dest.clone()));

        let thumb = image::open(&dest).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (50, 20));
    }

    #[test]
    fn test_thumbnail_minimum_one_pixel() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("dot.png");
        write_png(&src, 1, 3);

        make_thumbnail(&src).unwrap();
        let thumb = image::open(dir.path().join("dot_thumb.png")).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (1, 1));
    }

    #[test]
    fn test_thumbnail_of_thumbnail_is_noop() {
        let out = make_thumbnail(Path::new("/nowhere/cat_thumb.png")).unwrap();
        assert_eq!(out, Conversion::NoOp);
    }

    #[test]
    fn test_unencodable_format_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("notes.txt");
        fs::write(&src, b"text").unwrap();
        assert_eq!(make_thumbnail(&src).unwrap(), Conversion::NoOp);
        assert!(!dir.path().join("notes_thumb.txt").exists());
    }

    #[test]
    fn test_jpeg_bytes_behind_png_name() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("photo.png");
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(20, 10, Rgb([120, 120, 120]));
        img.save_with_format(&src, ImageFormat::Jpeg).unwrap();

        assert!(make_thumbnail(&src).unwrap().is_produced());
        let thumb = image::open(dir.path().join("photo_thumb.png")).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (10, 5));
    }

    #[test]
    fn test_jpeg_source_with_rgb_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("shot.jpg");
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(64, 32, Rgb([1, 2, 3]));
        img.save_with_format(&src, ImageFormat::Jpeg).unwrap();

        make_thumbnail(&src).unwrap();
        let thumb = image::open(dir.path().join("shot_thumb.jpg")).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (32, 16));
    }

    #[test]
    fn test_resize_to_explicit_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("wide.png");
        write_png(&src, 80, 20);

        resize_image(&src, 16, 16).unwrap();
        let out = image::open(dir.path().join("wide_thumb.png")).unwrap();
        assert_eq!((out.width(), out.height()), (16, 16));

        assert_matches!(resize_image(&src, 0, 16), Err(Error::InvalidInput(_)));
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let res = make_thumbnail(Path::new("/definitely/missing/cat.png"));
        assert_matches!(res, Err(Error::Av(amur_av::Error::FileNotFound { .. })));
    }

    #[test]
    fn test_corrupt_source_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.png");
        fs::write(&src, b"\x89PNG\r\n\x1a\nnot really").unwrap();

        assert!(make_thumbnail(&src).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
