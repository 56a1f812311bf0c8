//! Metadata tags and embedded cover art
//!
//! Tags are written with lofty after conversion, so the target container decides
//! the tag format (Vorbis comments for ogg, ID3v2 for mp3, MP4 atoms for m4a).

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use lofty::config::WriteOptions;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};
use std::path::Path;
use tracing::debug;

use super::error::TagError;

/// Covers wider or taller than this are scaled down before embedding
const MAX_COVER_SIZE: u32 = 1400;

const JPEG_QUALITY: u8 = 90;

/// Values written into the audio file's tag
#[derive(Debug, Clone, Default)]
pub struct TrackTags {
    pub artists: Vec<String>,
    pub album_artist: String,
    pub title: String,
    pub album: String,
    /// Already joined with the configured delimiter
    pub genre: String,
    pub release_year: String,
    pub disc_number: u32,
    pub total_discs: Option<u32>,
    pub track_number: u32,
    pub total_tracks: u32,
}

/// Prepare cover bytes for embedding, returning the data and its mime type
///
/// JPEG and PNG pass through untouched unless oversized; oversized covers are
/// scaled and re-encoded as JPEG.
pub fn prepare_cover(data: &[u8]) -> Result<(Vec<u8>, MimeType), TagError> {
    let format = image::guess_format(data).map_err(|e| TagError::CoverArt(e.to_string()))?;
    let mime = match format {
        ImageFormat::Jpeg => MimeType::Jpeg,
        ImageFormat::Png => MimeType::Png,
        other => return Err(TagError::CoverArt(format!("unsupported format {:?}", other))),
    };

    let img = image::load_from_memory_with_format(data, format)
        .map_err(|e| TagError::CoverArt(e.to_string()))?;
    if img.width() <= MAX_COVER_SIZE && img.height() <= MAX_COVER_SIZE {
        return Ok((data.to_vec(), mime));
    }

    let img = resize_to_fit(img);
    let mut output = Vec::new();
    JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY)
        .encode_image(&img.to_rgb8())
        .map_err(|e| TagError::CoverArt(e.to_string()))?;
    Ok((output, MimeType::Jpeg))
}

fn resize_to_fit(img: DynamicImage) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    let (new_width, new_height) = if width > height {
        let ratio = MAX_COVER_SIZE as f64 / width as f64;
        (MAX_COVER_SIZE, (height as f64 * ratio) as u32)
    } else {
        let ratio = MAX_COVER_SIZE as f64 / height as f64;
        ((width as f64 * ratio) as u32, MAX_COVER_SIZE)
    };
    debug!(
        "Resizing cover art: {}x{} -> {}x{}",
        width, height, new_width, new_height
    );
    img.resize(new_width, new_height, FilterType::Lanczos3)
}

/// Write tags (and the cover, when given) into `path`
///
/// Blocking; run it off the async executor.
pub fn write_tags(path: &Path, tags: &TrackTags, cover: Option<&[u8]>) -> Result<(), TagError> {
    let mut tagged_file = Probe::open(path)?
        .guess_file_type()
        .map_err(lofty::error::LoftyError::from)?
        .read()?;

    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .primary_tag_mut()
        .ok_or_else(|| TagError::NoTag(path.to_path_buf()))?;

    tag.set_artist(tags.artists.join(", "));
    tag.set_title(tags.title.clone());
    tag.set_album(tags.album.clone());
    tag.insert_text(ItemKey::AlbumArtist, tags.album_artist.clone());
    if !tags.genre.is_empty() {
        tag.set_genre(tags.genre.clone());
    }
    if !tags.release_year.is_empty() {
        tag.insert_text(ItemKey::RecordingDate, tags.release_year.clone());
    }
    tag.set_disk(tags.disc_number);
    if let Some(total) = tags.total_discs {
        tag.set_disk_total(total);
    }
    tag.set_track(tags.track_number);
    tag.set_track_total(tags.total_tracks);

    if let Some(data) = cover {
        let (data, mime) = prepare_cover(data)?;
        tag.remove_picture_type(PictureType::CoverFront);
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(mime),
            None,
            data,
        ));
    }

    tagged_file.save_to_path(path, WriteOptions::default())?;
    debug!("Wrote tags to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::png::PngEncoder;
    use image::{ExtendedColorType, ImageEncoder};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let pixels = vec![128u8; (width * height * 3) as usize];
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(&pixels, width, height, ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    #[test]
    fn test_small_png_passes_through() {
        let data = png(64, 64);
        let (out, mime) = prepare_cover(&data).unwrap();
        assert_eq!(mime, MimeType::Png);
        assert_eq!(out, data);
    }

    #[test]
    fn test_oversized_cover_is_scaled_to_jpeg() {
        let (out, mime) = prepare_cover(&png(2800, 100)).unwrap();
        assert_eq!(mime, MimeType::Jpeg);
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!(img.width(), MAX_COVER_SIZE);
        assert_eq!(img.height(), 50);
    }

    #[test]
    fn test_garbage_cover_rejected() {
        assert!(matches!(
            prepare_cover(b"definitely not an image"),
            Err(TagError::CoverArt(_))
        ));
    }

    #[test]
    fn test_tagging_non_audio_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fake.ogg");
        std::fs::write(&path, b"not audio").unwrap();
        assert!(write_tags(&path, &TrackTags::default(), None).is_err());
    }
}
