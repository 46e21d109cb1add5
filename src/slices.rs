use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};

/// Compliance ceiling: 150 KiB per encoded image.
pub const TARGET_SIZE: usize = 150 * 1024;
pub const TARGET_WIDTH: u32 = 750;
/// Below this width an image is left alone rather than stretched.
const MIN_STRETCH_WIDTH: u32 = 375;

const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

const QUALITY_PROBE: u8 = 95;
const QUALITY_START: u8 = 85;
const QUALITY_STEP: u8 = 5;
const QUALITY_FLOOR: u8 = 10;

/// Outcome of one folder run. Failed files stayed oversized after the whole
/// quality ladder; they are left on disk in their smallest attempted form.
#[derive(Debug, Default)]
pub struct FolderSummary {
    pub total: usize,
    pub compressed: usize,
    pub failed: Vec<PathBuf>,
}

/// Phase A + Phase B over one folder: deterministic ordinal rename, then
/// per-file resize/recompress. Files are independent; one stubborn image
/// never aborts the rest.
pub fn process_folder(folder: &Path) -> Result<FolderSummary> {
    info!("renaming images in {}", folder.display());
    let files = rename_images(folder)?;

    info!("resizing and compressing {} images", files.len());
    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len}")?
            .progress_chars("=> "),
    );

    let results: Vec<(PathBuf, bool)> = files
        .par_iter()
        .map(|path| {
            let ok = compress_image(path).unwrap_or_else(|e| {
                warn!("failed to process {}: {e:#}", path.display());
                false
            });
            pb.inc(1);
            (path.clone(), ok)
        })
        .collect();
    pb.finish_and_clear();

    let mut summary = FolderSummary { total: results.len(), ..FolderSummary::default() };
    for (path, ok) in results {
        if ok {
            summary.compressed += 1;
        } else {
            summary.failed.push(path);
        }
    }
    Ok(summary)
}

/// Phase A: rename every supported image to `1.ext..N.ext` in natural-sort
/// order. Two passes: park everything under collision-proof temporary names
/// first, so pre-existing numeric filenames never clash with a target name
/// mid-sequence. Returns the final paths in ordinal order.
pub fn rename_images(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut names: Vec<String> = fs::read_dir(folder)
        .with_context(|| format!("failed to list {}", folder.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_supported(name))
        .collect();
    names.sort_by_key(|name| natural_key(name));

    let mut temps = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let ext = extension_lower(name);
        let temp = folder.join(format!("__temp_{i}{ext}"));
        fs::rename(folder.join(name), &temp)
            .with_context(|| format!("failed to rename {name}"))?;
        temps.push((temp, ext));
    }

    let mut finals = Vec::with_capacity(temps.len());
    for (i, (temp, ext)) in temps.into_iter().enumerate() {
        let target = folder.join(format!("{}{ext}", i + 1));
        fs::rename(&temp, &target)
            .with_context(|| format!("failed to rename {}", temp.display()))?;
        finals.push(target);
    }
    Ok(finals)
}

fn is_supported(name: &str) -> bool {
    let lower = name.to_lowercase();
    SUPPORTED_EXTENSIONS.iter().any(|ext| lower.ends_with(&format!(".{ext}")))
}

fn extension_lower(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Digit runs compare as integers, text runs case-insensitively, so
/// "img2" sorts before "img10".
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    Number(u64),
    Text(String),
}

fn natural_key(name: &str) -> Vec<Segment> {
    let mut key = Vec::new();
    let mut text = String::new();
    let mut digits = String::new();
    for c in name.chars() {
        if c.is_ascii_digit() {
            if !text.is_empty() {
                key.push(Segment::Text(std::mem::take(&mut text)));
            }
            digits.push(c);
        } else {
            if !digits.is_empty() {
                key.push(Segment::Number(digits.parse().unwrap_or(u64::MAX)));
                digits.clear();
            }
            text.extend(c.to_lowercase());
        }
    }
    if !text.is_empty() {
        key.push(Segment::Text(text));
    }
    if !digits.is_empty() {
        key.push(Segment::Number(digits.parse().unwrap_or(u64::MAX)));
    }
    key
}

/// Phase B for a single file. Ok(true) when the committed encoding made the
/// ceiling; Ok(false) when the ladder was exhausted. The smallest attempt is
/// still written so the file at least carries the compliant dimensions.
pub fn compress_image(path: &Path) -> Result<bool> {
    let format = ImageFormat::from_path(path)?;
    let img = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let img = resize_to_width(img);

    // High-quality probe: the resize alone often lands under the ceiling.
    let probe = match format {
        ImageFormat::Jpeg => encode_jpeg(&img, QUALITY_PROBE)?,
        _ => encode_png(&img, CompressionType::Default)?,
    };
    if probe.len() <= TARGET_SIZE {
        fs::write(path, &probe)?;
        return Ok(true);
    }

    let last = match format {
        ImageFormat::Jpeg => {
            let mut quality = QUALITY_START;
            loop {
                let bytes = encode_jpeg(&img, quality)?;
                if bytes.len() <= TARGET_SIZE {
                    fs::write(path, &bytes)?;
                    return Ok(true);
                }
                if quality <= QUALITY_FLOOR {
                    break bytes;
                }
                quality -= QUALITY_STEP;
            }
        }
        _ => {
            // PNG is lossless; one harder compression pass is all we get.
            let bytes = encode_png(&img, CompressionType::Best)?;
            if bytes.len() <= TARGET_SIZE {
                fs::write(path, &bytes)?;
                return Ok(true);
            }
            bytes
        }
    };

    fs::write(path, &last)?;
    warn!(
        "could not compress {} below {} KiB",
        path.display(),
        TARGET_SIZE / 1024
    );
    Ok(false)
}

/// Widths above the target downscale to it; widths between the stretch floor
/// and the target upscale to it; anything at or below the floor is left
/// untouched. Aspect ratio is always preserved (Lanczos filter).
fn resize_to_width(img: DynamicImage) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    if w > TARGET_WIDTH || (w > MIN_STRETCH_WIDTH && w < TARGET_WIDTH) {
        let new_h = ((u64::from(h) * u64::from(TARGET_WIDTH)) / u64::from(w)) as u32;
        img.resize_exact(TARGET_WIDTH, new_h.max(1), FilterType::Lanczos3)
    } else {
        img
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    // JPEG has no alpha channel; flatten first.
    let flattened;
    let img = if img.color().has_alpha() {
        flattened = DynamicImage::ImageRgb8(img.to_rgb8());
        &flattened
    } else {
        img
    };
    let mut buf = Vec::new();
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
    Ok(buf)
}

fn encode_png(img: &DynamicImage, compression: CompressionType) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_with_encoder(PngEncoder::new_with_quality(
        &mut buf,
        compression,
        PngFilter::Adaptive,
    ))?;
    Ok(buf)
}
