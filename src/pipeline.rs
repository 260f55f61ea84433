//! Runs the augmentation pipeline over a dataset directory.

use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::iter::{ParallelBridge, ParallelIterator};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::augment::{augment, preview, AugmentationSpec};
use crate::codec::{find_tag_index_file, format_label_file, load_tag_index, TagIndex};
use crate::error::{Error, Result};
use crate::io::{ensure_output_directory, write_sample_files, ImageSource};
use crate::types::{ProcessingStats, Sample, SampleImage};
use crate::utils::{create_progress_bar, create_thread_pool, fnv1a};
use crate::walker::{enumerate, WalkOptions};

/// How samples are scheduled. Both produce the same files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Executor {
    #[default]
    Sequential,
    /// Worker pool of `threads` threads; 0 lets rayon pick.
    Parallel { threads: usize },
}

#[derive(Debug, Clone)]
pub struct AugmentOptions {
    pub input_dir: PathBuf,
    /// Required unless `preview_only` is set.
    pub output_dir: Option<PathBuf>,
    pub executor: Executor,
    pub seed: u64,
    pub preview_only: bool,
    pub skip_originals: bool,
    pub skip_orphan_labels: bool,
}

impl AugmentOptions {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: Some(output_dir.into()),
            executor: Executor::default(),
            seed: 42,
            preview_only: false,
            skip_originals: false,
            skip_orphan_labels: false,
        }
    }
}

/// Counters shared between workers.
#[derive(Default)]
struct Counters {
    read: AtomicUsize,
    written: AtomicUsize,
    failed: AtomicUsize,
    dropped: AtomicUsize,
}

impl Counters {
    fn into_stats(self) -> ProcessingStats {
        ProcessingStats {
            samples_read: self.read.into_inner(),
            samples_written: self.written.into_inner(),
            samples_failed: self.failed.into_inner(),
            regions_dropped: self.dropped.into_inner(),
        }
    }
}

struct Job<'a> {
    spec: &'a AugmentationSpec,
    tag_index: &'a TagIndex,
    output_dir: Option<&'a Path>,
    seed: u64,
    skip_originals: bool,
    counters: Counters,
}

impl Job<'_> {
    fn rng_for(&self, id: &str) -> StdRng {
        StdRng::seed_from_u64(self.seed ^ fnv1a(id))
    }

    fn process(&self, sample: &Sample) -> Result<()> {
        match self.output_dir {
            Some(dir) => self.write_variants(sample, dir),
            None => self.preview(sample),
        }
    }

    fn write_variants(&self, sample: &Sample, dir: &Path) -> Result<()> {
        let extension = output_extension(sample);
        let variants = augment(sample, self.spec, &mut self.rng_for(&sample.id))?;

        // Encode every label before touching the disk so a bad tag writes nothing.
        let labels = variants
            .iter()
            .map(|v| format_label_file(&v.regions, self.tag_index))
            .collect::<Result<Vec<_>>>()?;

        let skip = usize::from(self.skip_originals);
        for (variant, label) in variants.iter().zip(&labels).skip(skip) {
            let source = match &variant.image {
                SampleImage::File(path) => ImageSource::Copy(path),
                SampleImage::Decoded(img) => ImageSource::Encode(img),
            };
            write_sample_files(dir, &variant.id, &extension, source, label)?;
            self.counters.written.fetch_add(1, Ordering::Relaxed);
        }

        let dropped: usize = variants
            .iter()
            .skip(1)
            .map(|v| sample.regions.len().saturating_sub(v.regions.len()))
            .sum();
        self.counters.dropped.fetch_add(dropped, Ordering::Relaxed);
        Ok(())
    }

    fn preview(&self, sample: &Sample) -> Result<()> {
        let frames = preview(sample, self.spec, &mut self.rng_for(&sample.id))?;
        for frame in &frames {
            let outside = frame.regions_out_of_bounds();
            if outside > 0 {
                info!(
                    "{}: {} regions, {} would be clipped or dropped",
                    frame.id,
                    frame.regions.len(),
                    outside
                );
            } else {
                info!("{}: {} regions", frame.id, frame.regions.len());
            }
        }
        self.counters.written.fetch_add(frames.len(), Ordering::Relaxed);
        Ok(())
    }

    /// Count the outcome of one walked sample. Only I/O errors stop the run.
    fn handle(&self, item: Result<Sample>) -> Result<()> {
        self.counters.read.fetch_add(1, Ordering::Relaxed);
        match item.and_then(|sample| self.process(&sample)) {
            Ok(()) => Ok(()),
            Err(Error::Io(e)) => Err(Error::Io(e)),
            Err(e) => {
                error!("Skipping sample: {}", e);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }
}

fn output_extension(sample: &Sample) -> String {
    sample
        .image
        .path()
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_else(|| "png".to_string())
}

/// Augment every sample of `options.input_dir`.
///
/// Writes each original (unless skipped) and each derivative as an image and
/// label pair keyed by id, plus a copy of the class-index file. In preview
/// mode frames are only rendered and logged.
pub fn run_augmentation(options: &AugmentOptions, spec: &AugmentationSpec) -> Result<ProcessingStats> {
    spec.validate()?;

    let class_file = find_tag_index_file(&options.input_dir).ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!(
                "no class index file (class.names, obj.names or classes.txt) in {}",
                options.input_dir.display()
            ),
        ))
    })?;
    let tag_index = load_tag_index(&class_file)?;
    info!("Loaded {} tags from {:?}", tag_index.len(), class_file);

    let walker = enumerate(
        &options.input_dir,
        &tag_index,
        WalkOptions {
            skip_orphan_labels: options.skip_orphan_labels,
        },
    )?;

    let output_dir = if options.preview_only {
        None
    } else {
        let dir = options.output_dir.as_deref().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "an output directory is required unless previewing",
            ))
        })?;
        let dir = ensure_output_directory(dir)?;
        if let Some(name) = class_file.file_name() {
            fs::copy(&class_file, dir.join(name))?;
        }
        Some(dir)
    };

    info!(
        "Augmenting {} samples with {} variants each",
        walker.total(),
        spec.variant_count()
    );
    let pb = create_progress_bar(walker.total() as u64, "Augment");
    let job = Job {
        spec,
        tag_index: &tag_index,
        output_dir: output_dir.as_deref(),
        seed: options.seed,
        skip_originals: options.skip_originals,
        counters: Counters::default(),
    };

    let run = |item: Result<Sample>| {
        let result = job.handle(item);
        pb.inc(1);
        result
    };
    let result = match options.executor {
        Executor::Sequential => walker.into_iter().try_for_each(run),
        Executor::Parallel { threads } => {
            let pool = create_thread_pool(threads)?;
            pool.install(|| walker.par_bridge().try_for_each(run))
        }
    };
    pb.finish_with_message("Done");
    result?;

    let stats = job.counters.into_stats();
    if stats.samples_failed > 0 {
        warn!("{} samples could not be augmented", stats.samples_failed);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::{Augmentation, Transform};
    use image::{Rgb, RgbImage};

    fn dataset() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            let img = RgbImage::from_fn(24, 16, |x, y| Rgb([(x * 10) as u8, (y * 15) as u8, (i * 60) as u8]));
            img.save(dir.path().join(format!("{}.png", name))).unwrap();
        }
        fs::write(dir.path().join("a.txt"), "0 0.5 0.5 0.25 0.25\n1 0.9 0.9 0.2 0.2\n").unwrap();
        fs::write(dir.path().join("c.txt"), "1 0.3 0.4 0.2 0.2\n").unwrap();
        fs::write(dir.path().join("class.names"), "cat\ndog\n").unwrap();
        dir
    }

    fn spec() -> AugmentationSpec {
        AugmentationSpec::new(vec![
            Augmentation::new(
                "Jitter",
                vec![
                    Transform::Rotate {
                        degrees: [-20.0, 20.0],
                    },
                    Transform::AdditiveGaussianNoise {
                        stddev: [5.0, 10.0],
                    },
                ],
                2,
            ),
            Augmentation::new("Crop", vec![Transform::Crop { min_fraction: 0.6 }], 1),
        ])
    }

    fn read_tree(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<(String, Vec<u8>)> = fs::read_dir(dir)
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (
                    e.file_name().to_string_lossy().into_owned(),
                    fs::read(e.path()).unwrap(),
                )
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn sequential_and_parallel_write_identical_files() {
        let input = dataset();
        let seq_out = tempfile::tempdir().unwrap();
        let par_out = tempfile::tempdir().unwrap();

        let seq = AugmentOptions::new(input.path(), seq_out.path());
        let mut par = AugmentOptions::new(input.path(), par_out.path());
        par.executor = Executor::Parallel { threads: 3 };

        let seq_stats = run_augmentation(&seq, &spec()).unwrap();
        let par_stats = run_augmentation(&par, &spec()).unwrap();

        assert_eq!(seq_stats.samples_read, 3);
        assert_eq!(seq_stats.samples_written, 3 * 4);
        assert_eq!(par_stats.samples_written, seq_stats.samples_written);
        let seq_files = read_tree(seq_out.path());
        assert_eq!(seq_files.len(), 3 * 4 * 2 + 1);
        assert_eq!(seq_files, read_tree(par_out.path()));
    }

    #[test]
    fn originals_can_be_skipped() {
        let input = dataset();
        let out = tempfile::tempdir().unwrap();
        let mut options = AugmentOptions::new(input.path(), out.path());
        options.skip_originals = true;

        run_augmentation(&options, &spec()).unwrap();
        assert!(!out.path().join("a.png").exists());
        assert!(out.path().join("a_Crop.png").exists());
        assert!(out.path().join("a_Jitter_rep1.txt").exists());
        assert!(out.path().join("class.names").exists());
    }

    #[test]
    fn original_image_is_copied_verbatim() {
        let input = dataset();
        let out = tempfile::tempdir().unwrap();
        run_augmentation(&AugmentOptions::new(input.path(), out.path()), &spec()).unwrap();
        assert_eq!(
            fs::read(out.path().join("b.png")).unwrap(),
            fs::read(input.path().join("b.png")).unwrap()
        );
        assert_eq!(fs::read_to_string(out.path().join("b.txt")).unwrap(), "");
    }

    #[test]
    fn preview_writes_nothing() {
        let input = dataset();
        let parent = tempfile::tempdir().unwrap();
        let out = parent.path().join("out");
        let mut options = AugmentOptions::new(input.path(), &out);
        options.preview_only = true;

        let stats = run_augmentation(&options, &spec()).unwrap();
        assert_eq!(stats.samples_read, 3);
        assert!(!out.exists());
    }

    #[test]
    fn malformed_label_is_counted_and_skipped() {
        let input = dataset();
        fs::write(input.path().join("b.txt"), "7 0.5 0.5 0.1 0.1\n").unwrap();
        let out = tempfile::tempdir().unwrap();

        let stats = run_augmentation(&AugmentOptions::new(input.path(), out.path()), &spec()).unwrap();
        assert_eq!(stats.samples_failed, 1);
        assert!(!out.path().join("b.png").exists());
        assert!(!out.path().join("b.txt").exists());
        assert!(out.path().join("c_Crop.txt").exists());
    }

    #[test]
    fn missing_class_file_is_an_error() {
        let input = dataset();
        fs::remove_file(input.path().join("class.names")).unwrap();
        let out = tempfile::tempdir().unwrap();
        assert!(matches!(
            run_augmentation(&AugmentOptions::new(input.path(), out.path()), &spec()),
            Err(Error::Io(_))
        ));
    }
}
