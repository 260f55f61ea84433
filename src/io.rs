use image::RgbImage;
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Create the output directory if needed and return its path.
///
/// Existing contents are kept; files with the same names are overwritten.
pub fn ensure_output_directory(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_dir() {
        if fs::read_dir(path)?.next().is_some() {
            warn!(
                "Directory {:?} is not empty. Existing files with the same names will be overwritten.",
                path
            );
        }
    } else {
        fs::create_dir_all(path)?;
    }
    Ok(path.to_path_buf())
}

/// Where the image half of a written pair comes from.
#[derive(Debug, Clone, Copy)]
pub enum ImageSource<'a> {
    /// Copy an existing file byte for byte.
    Copy(&'a Path),
    /// Encode decoded pixels; the format follows the target extension.
    Encode(&'a RgbImage),
    /// Raw encoded bytes, e.g. downloaded from the service.
    Bytes(&'a [u8]),
}

/// Removes the listed files on drop unless disarmed.
struct Cleanup(Vec<PathBuf>);

impl Cleanup {
    fn disarm(mut self) {
        self.0.clear();
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        for path in &self.0 {
            let _ = fs::remove_file(path);
        }
    }
}

fn write_image(source: ImageSource<'_>, path: &Path, format_of: &Path) -> Result<()> {
    match source {
        ImageSource::Copy(src) => {
            fs::copy(src, path)?;
        }
        ImageSource::Encode(img) => {
            let format = image::ImageFormat::from_path(format_of)?;
            img.save_with_format(path, format)?;
        }
        ImageSource::Bytes(bytes) => fs::write(path, bytes)?,
    }
    Ok(())
}

/// Write `<stem>.<extension>` and `<stem>.txt` into `dir` as a pair.
///
/// Both files go to temporary names first and are renamed once both exist,
/// so a failure never leaves a label without its image or the reverse.
/// Returns the final image path.
pub fn write_sample_files(
    dir: &Path,
    stem: &str,
    extension: &str,
    image: ImageSource<'_>,
    label_text: &str,
) -> Result<PathBuf> {
    let image_path = dir.join(format!("{}.{}", stem, extension));
    let label_path = dir.join(format!("{}.txt", stem));
    let image_tmp = dir.join(format!(".{}.{}.partial", stem, extension));
    let label_tmp = dir.join(format!(".{}.txt.partial", stem));

    let guard = Cleanup(vec![image_tmp.clone(), label_tmp.clone()]);
    fs::write(&label_tmp, label_text)?;
    write_image(image, &image_tmp, &image_path)?;

    fs::rename(&image_tmp, &image_path)?;
    if let Err(e) = fs::rename(&label_tmp, &label_path) {
        let _ = fs::remove_file(&image_path);
        return Err(e.into());
    }
    guard.disarm();
    Ok(image_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn writes_encoded_pair() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
        let path = write_sample_files(dir.path(), "a_Blur", "png", ImageSource::Encode(&img), "0 0.5 0.5 0.1 0.1\n")
            .unwrap();
        assert_eq!(path, dir.path().join("a_Blur.png"));
        assert_eq!(file_names(dir.path()), vec!["a_Blur.png", "a_Blur.txt"]);
        assert_eq!(image::open(&path).unwrap().to_rgb8(), img);
        assert_eq!(
            fs::read_to_string(dir.path().join("a_Blur.txt")).unwrap(),
            "0 0.5 0.5 0.1 0.1\n"
        );
    }

    #[test]
    fn copies_original_bytes() {
        let src_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("a.jpg");
        fs::write(&src, b"not really a jpeg").unwrap();
        write_sample_files(out_dir.path(), "a", "jpg", ImageSource::Copy(&src), "").unwrap();
        assert_eq!(fs::read(out_dir.path().join("a.jpg")).unwrap(), b"not really a jpeg");
        assert_eq!(fs::read_to_string(out_dir.path().join("a.txt")).unwrap(), "");
    }

    #[test]
    fn failed_image_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        assert!(write_sample_files(&out, "a", "png", ImageSource::Copy(&missing), "0 0.5 0.5 0.1 0.1\n").is_err());
        assert!(file_names(&out).is_empty());
    }

    #[test]
    fn existing_directory_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), "x").unwrap();
        ensure_output_directory(dir.path()).unwrap();
        assert!(dir.path().join("keep.txt").exists());

        let nested = dir.path().join("a/b");
        assert_eq!(ensure_output_directory(&nested).unwrap(), nested);
        assert!(nested.is_dir());
    }
}
