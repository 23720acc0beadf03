//! Content-based media classification.
//!
//! Files are classified by their leading bytes, never by extension: an upload
//! named `photo.png` holding JPEG data is still an image, and a `.mp4` holding
//! HTML is dropped.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use amur_common::ContentKind;

/// Maximum number of leading bytes inspected.
pub const SNIFF_LEN: usize = 512;

/// ISO-BMFF major brands that denote still images rather than video.
const IMAGE_BRANDS: &[&[u8; 4]] = &[b"avif", b"avis", b"heic", b"heix", b"mif1", b"msf1"];

/// Classify a file by reading at most [`SNIFF_LEN`] bytes.
///
/// Missing, non-regular and empty files are [`ContentKind::Other`], as are
/// files that cannot be read.
pub fn classify_path(path: &Path) -> ContentKind {
    match read_head(path) {
        Ok(Some(head)) => sniff(&head),
        Ok(None) => ContentKind::Other,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Cannot read file for sniffing");
            ContentKind::Other
        }
    }
}

fn read_head(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if !meta.is_file() || meta.len() == 0 {
        return Ok(None);
    }

    let mut head = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;
    Ok((!head.is_empty()).then_some(head))
}

/// Classify a byte prefix.
pub fn sniff(head: &[u8]) -> ContentKind {
    if head.is_empty() {
        return ContentKind::Other;
    }
    if image::guess_format(head).is_ok() {
        return ContentKind::Image;
    }
    if is_video(head) {
        return ContentKind::Video;
    }
    ContentKind::Other
}

fn is_video(head: &[u8]) -> bool {
    is_iso_bmff_video(head)
        // EBML: Matroska / WebM
        || head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3])
        || is_riff_avi(head)
        // MPEG program stream pack header, or elementary sequence header
        || head.starts_with(&[0x00, 0x00, 0x01, 0xBA])
        || head.starts_with(&[0x00, 0x00, 0x01, 0xB3])
        || is_mpeg_ts(head)
        || head.starts_with(b"FLV\x01")
        // ASF header object GUID (WMV)
        || head.starts_with(&[0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11])
}

fn is_iso_bmff_video(head: &[u8]) -> bool {
    if head.len() < 12 || &head[4..8] != b"ftyp" {
        return false;
    }
    let brand = &head[8..12];
    !IMAGE_BRANDS.iter().any(|b| brand == &b[..])
}

fn is_riff_avi(head: &[u8]) -> bool {
    head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..11] == b"AVI"
}

/// Transport stream: sync byte at the start of consecutive 188-byte packets.
fn is_mpeg_ts(head: &[u8]) -> bool {
    head.first() == Some(&0x47) && head.get(188) == Some(&0x47)
}
