//! Local visual regression: screenshot baselines compared pixel by pixel

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use image::{GenericImageView, Pixel, RgbaImage};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::page::Page;
use crate::snapshot::{slug, SnapshotProvider};

/// Result of a visual comparison
#[derive(Debug, Clone)]
pub struct VisualDiff {
    /// Whether the images match (within threshold)
    pub matches: bool,

    /// Percentage of pixels that differ
    pub diff_percent: f64,

    pub diff_pixels: u64,
    pub total_pixels: u64,

    /// Path to the diff image (if generated)
    pub diff_image_path: Option<PathBuf>,

    pub actual_hash: String,
    pub baseline_hash: String,
}

/// Configuration for baseline comparison
#[derive(Debug, Clone)]
pub struct VisualConfig {
    pub baseline_dir: PathBuf,
    pub actual_dir: PathBuf,
    pub diff_dir: PathBuf,

    /// Allowed share of differing pixels (0.0 - 100.0 percent)
    pub threshold: f64,

    /// Overwrite baselines with the new capture instead of comparing
    pub update_baselines: bool,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            baseline_dir: PathBuf::from("test-results/baselines"),
            actual_dir: PathBuf::from("test-results/screenshots"),
            diff_dir: PathBuf::from("test-results/diffs"),
            threshold: 0.5,
            update_baselines: false,
        }
    }
}

impl VisualConfig {
    /// Lay out the three directories under one root
    pub fn under(root: &Path) -> Self {
        Self {
            baseline_dir: root.join("baselines"),
            actual_dir: root.join("screenshots"),
            diff_dir: root.join("diffs"),
            ..Default::default()
        }
    }
}

/// Snapshot provider backed by screenshots on disk
pub struct BaselineProvider {
    config: VisualConfig,
}

impl BaselineProvider {
    pub fn new(config: VisualConfig) -> E2eResult<Self> {
        std::fs::create_dir_all(&config.baseline_dir)?;
        std::fs::create_dir_all(&config.actual_dir)?;
        std::fs::create_dir_all(&config.diff_dir)?;
        Ok(Self { config })
    }

    pub fn actual_path(&self, name: &str) -> PathBuf {
        self.config.actual_dir.join(format!("{}.png", name))
    }

    pub fn baseline_path(&self, name: &str) -> PathBuf {
        self.config.baseline_dir.join(format!("{}.png", name))
    }

    /// Compare the latest capture `name` against its baseline
    pub fn compare(&self, name: &str) -> E2eResult<VisualDiff> {
        let actual_path = self.actual_path(name);
        let baseline_path = self.baseline_path(name);

        if !actual_path.exists() {
            return Err(E2eError::VisualRegression(format!(
                "Actual screenshot not found: {}", actual_path.display()
            )));
        }

        if self.config.update_baselines {
            self.update_baseline(name)?;
            let hash = hash_file(&actual_path)?;
            return Ok(VisualDiff {
                matches: true,
                diff_percent: 0.0,
                diff_pixels: 0,
                total_pixels: 0,
                diff_image_path: None,
                actual_hash: hash.clone(),
                baseline_hash: hash,
            });
        }

        if !baseline_path.exists() {
            return Err(E2eError::BaselineNotFound(baseline_path.to_string_lossy().to_string()));
        }

        let actual_hash = hash_file(&actual_path)?;
        let baseline_hash = hash_file(&baseline_path)?;

        let actual_img = image::open(&actual_path)?;
        let total_pixels = u64::from(actual_img.width()) * u64::from(actual_img.height());

        // Quick hash comparison
        if actual_hash == baseline_hash {
            debug!("Screenshots match exactly (same hash)");
            return Ok(VisualDiff {
                matches: true,
                diff_percent: 0.0,
                diff_pixels: 0,
                total_pixels,
                diff_image_path: None,
                actual_hash,
                baseline_hash,
            });
        }

        let baseline_img = image::open(&baseline_path)?;
        let (diff_img, diff_pixels) = diff_images(&actual_img.to_rgba8(), &baseline_img.to_rgba8());

        let diff_percent = if total_pixels == 0 {
            0.0
        } else {
            (diff_pixels as f64 / total_pixels as f64) * 100.0
        };
        let matches = diff_percent <= self.config.threshold;

        let diff_image_path = if diff_pixels > 0 {
            let path = self.config.diff_dir.join(format!("{}-diff.png", name));
            diff_img.save(&path)?;
            Some(path)
        } else {
            None
        };

        if !matches {
            warn!(
                "Visual regression detected in '{}': {:.2}% pixels differ (threshold: {:.2}%)",
                name, diff_percent, self.config.threshold
            );
        }

        Ok(VisualDiff {
            matches,
            diff_percent,
            diff_pixels,
            total_pixels,
            diff_image_path,
            actual_hash,
            baseline_hash,
        })
    }

    /// Replace the baseline with the latest capture
    pub fn update_baseline(&self, name: &str) -> E2eResult<()> {
        let actual_path = self.actual_path(name);
        if !actual_path.exists() {
            return Err(E2eError::VisualRegression(format!(
                "Cannot update baseline: actual screenshot not found: {}",
                actual_path.display()
            )));
        }

        std::fs::copy(&actual_path, self.baseline_path(name))?;
        info!("Updated baseline for '{}'", name);
        Ok(())
    }
}

#[async_trait]
impl SnapshotProvider for BaselineProvider {
    fn name(&self) -> &str {
        "baseline"
    }

    async fn capture(&self, page: &mut dyn Page, label: &str) -> E2eResult<()> {
        let name = slug(label);
        page.screenshot(&self.actual_path(&name)).await?;

        let diff = self.compare(&name)?;
        if !diff.matches {
            return Err(E2eError::ScreenshotMismatch {
                name,
                diff_percent: diff.diff_percent,
                threshold: self.config.threshold,
            });
        }
        Ok(())
    }
}

/// Mark differing pixels red over a dimmed copy of `actual`.
///
/// Pixels outside the overlapping region count as different.
fn diff_images(actual: &RgbaImage, baseline: &RgbaImage) -> (RgbaImage, u64) {
    let (width, height) = actual.dimensions();
    if baseline.dimensions() != actual.dimensions() {
        warn!(
            "Screenshot dimensions differ: actual {:?} vs baseline {:?}",
            actual.dimensions(),
            baseline.dimensions()
        );
    }

    let mut diff_img = RgbaImage::new(width, height);
    let mut diff_pixels = 0u64;

    for (x, y, actual_pixel) in actual.enumerate_pixels() {
        let differs = if baseline.in_bounds(x, y) {
            pixels_differ(actual_pixel, baseline.get_pixel(x, y))
        } else {
            true
        };

        if differs {
            diff_pixels += 1;
            diff_img.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
        } else {
            let channels = actual_pixel.channels();
            diff_img.put_pixel(x, y, image::Rgba([
                channels[0] / 2,
                channels[1] / 2,
                channels[2] / 2,
                128,
            ]));
        }
    }

    (diff_img, diff_pixels)
}

/// Check if two pixels differ beyond anti-aliasing noise
fn pixels_differ(a: &image::Rgba<u8>, b: &image::Rgba<u8>) -> bool {
    const TOLERANCE: i32 = 5;

    a.channels()
        .iter()
        .zip(b.channels())
        .any(|(x, y)| (i32::from(*x) - i32::from(*y)).abs() > TOLERANCE)
}

/// Hash a file using SHA256
fn hash_file(path: &Path) -> E2eResult<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}
