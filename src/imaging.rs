use crate::error::AppError;
use image::imageops::FilterType;
use image::ImageOutputFormat;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Writes a JPEG copy of `path` into `out_dir` (created with its parents),
/// downsized so its longest side is at most `max_dim`. Returns the path
/// written.
pub fn prepare_for_ocr(
    path: &Path,
    out_dir: &Path,
    max_dim: u32,
    quality: u8,
) -> Result<PathBuf, AppError> {
    if out_dir.exists() && !out_dir.is_dir() {
        return Err(AppError::DirectoryNotFound(out_dir.to_path_buf()));
    }
    if !out_dir.exists() {
        fs::create_dir_all(out_dir)?;
        log::debug!("Created output directory: {:?}", out_dir);
    }

    log::trace!("Opening image for OCR preparation: {:?}", path);
    let image = image::open(path).map_err(|e| {
        log::warn!("Could not open image {:?}: {}", path, e);
        e
    })?;

    let (width, height) = (image.width(), image.height());
    let longest = width.max(height);
    let image = if longest > max_dim {
        let scale = max_dim as f64 / longest as f64;
        let new_width = ((width as f64 * scale) as u32).max(1);
        let new_height = ((height as f64 * scale) as u32).max(1);
        log::info!(
            "Resizing {:?}: {}x{} -> {}x{}",
            path.file_name().unwrap_or_default(),
            width,
            height,
            new_width,
            new_height
        );
        image.resize_exact(new_width, new_height, FilterType::Lanczos3)
    } else {
        log::debug!("{:?}: {}px, no resize needed", path, longest);
        image
    };

    let stem = path
        .file_stem()
        .ok_or_else(|| AppError::Generic(format!("no file name in {:?}", path)))?;
    let output = out_dir.join(format!("{}.jpg", stem.to_string_lossy()));

    // JPEG has no alpha channel
    let rgb = image::DynamicImage::ImageRgb8(image.to_rgb8());
    let mut writer = BufWriter::new(File::create(&output)?);
    rgb.write_to(&mut writer, ImageOutputFormat::Jpeg(quality))?;

    log::info!("Saved {:?}", output);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_scans_are_downsized() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("IMG_1_b.tif");
        image::RgbImage::new(400, 100).save(&source).unwrap();

        let output = prepare_for_ocr(&source, &tmp.path().join("out"), 200, 85).unwrap();
        assert_eq!(output, tmp.path().join("out").join("IMG_1_b.jpg"));
        assert_eq!(image::image_dimensions(&output).unwrap(), (200, 50));
    }

    #[test]
    fn small_scans_keep_their_size() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("IMG_2_b.jpg");
        image::RgbImage::new(120, 80).save(&source).unwrap();

        let output = prepare_for_ocr(&source, &tmp.path().join("out"), 1800, 85).unwrap();
        assert_eq!(image::image_dimensions(&output).unwrap(), (120, 80));
    }

    #[test]
    fn equal_stems_in_mirrored_folders_do_not_collide() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("out");
        let mut written = Vec::new();
        for (album, width) in [("album1", 30), ("album2", 60)] {
            let dir = tmp.path().join(album);
            fs::create_dir(&dir).unwrap();
            let source = dir.join("FastFoto_0001_b.jpg");
            image::RgbImage::new(width, 20).save(&source).unwrap();
            written.push(prepare_for_ocr(&source, &out.join(album), 1800, 85).unwrap());
        }

        assert_eq!(written[0], out.join("album1").join("FastFoto_0001_b.jpg"));
        assert_eq!(image::image_dimensions(&written[0]).unwrap(), (30, 20));
        assert_eq!(image::image_dimensions(&written[1]).unwrap(), (60, 20));
    }

    #[test]
    fn output_path_that_is_a_file_is_fatal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("IMG_3_b.jpg");
        image::RgbImage::new(10, 10).save(&source).unwrap();
        let blocker = tmp.path().join("out");
        fs::write(&blocker, b"not a directory").unwrap();

        let err = prepare_for_ocr(&source, &blocker, 1800, 85).unwrap_err();
        assert!(err.is_fatal());
    }
}
