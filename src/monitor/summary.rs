//! JSON-lines summary writer

use crate::io::{image_manifold_size, save_images};
use crate::Result;
use chrono::{DateTime, Utc};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const EVENTS_FILE: &str = "events.jsonl";
const HISTOGRAM_BINS: usize = 10;

/// Value distribution of a histogram summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub count: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub std: f32,
    /// Upper edge and count of each equal-width bin
    pub buckets: Vec<(f32, usize)>,
}

impl Histogram {
    pub fn from_values(values: &ArrayD<f32>) -> Self {
        let count = values.len();
        if count == 0 {
            return Self { count, min: 0.0, max: 0.0, mean: 0.0, std: 0.0, buckets: Vec::new() };
        }
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / count as f64;
        let var = values.iter().map(|&v| (f64::from(v) - mean).powi(2)).sum::<f64>() / count as f64;

        let width = (max - min) / HISTOGRAM_BINS as f32;
        let mut counts = vec![0usize; HISTOGRAM_BINS];
        for &v in values {
            let bin = if width > 0.0 { ((v - min) / width) as usize } else { 0 };
            counts[bin.min(HISTOGRAM_BINS - 1)] += 1;
        }
        let buckets = counts
            .into_iter()
            .enumerate()
            .map(|(i, n)| (min + width * (i + 1) as f32, n))
            .collect();

        Self { count, min, max, mean: mean as f32, std: var.sqrt() as f32, buckets }
    }
}

/// One line of `events.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SummaryRecord {
    Scalar { tag: String, step: usize, value: f32, wall_time: DateTime<Utc> },
    Histogram { tag: String, step: usize, histogram: Histogram, wall_time: DateTime<Utc> },
    /// Image grid written next to the events file
    Image { tag: String, step: usize, path: String, wall_time: DateTime<Utc> },
}

impl SummaryRecord {
    pub fn tag(&self) -> &str {
        match self {
            SummaryRecord::Scalar { tag, .. }
            | SummaryRecord::Histogram { tag, .. }
            | SummaryRecord::Image { tag, .. } => tag,
        }
    }
}

/// Appends scalar, histogram and image summaries to `dir/events.jsonl`
///
/// Records are buffered and written on [`SummaryWriter::flush`] or drop.
#[derive(Debug)]
pub struct SummaryWriter {
    dir: PathBuf,
    pending: Vec<SummaryRecord>,
}

impl SummaryWriter {
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join("images"))?;
        Ok(Self { dir, pending: Vec::new() })
    }

    pub fn events_path(&self) -> PathBuf {
        self.dir.join(EVENTS_FILE)
    }

    pub fn scalar(&mut self, tag: &str, step: usize, value: f32) {
        self.pending.push(SummaryRecord::Scalar { tag: tag.into(), step, value, wall_time: Utc::now() });
    }

    pub fn histogram(&mut self, tag: &str, step: usize, values: &ArrayD<f32>) {
        self.pending.push(SummaryRecord::Histogram {
            tag: tag.into(),
            step,
            histogram: Histogram::from_values(values),
            wall_time: Utc::now(),
        });
    }

    /// Save `[N, H, W, C]` images as one grid under `images/`
    pub fn image(&mut self, tag: &str, step: usize, images: &ArrayD<f32>) -> Result<()> {
        let n = images.shape().first().copied().unwrap_or(0);
        let file = format!("{}_{step:06}.png", tag.replace('/', "_"));
        let path = self.dir.join("images").join(&file);
        save_images(images, image_manifold_size(n), &path)?;
        self.pending.push(SummaryRecord::Image {
            tag: tag.into(),
            step,
            path: format!("images/{file}"),
            wall_time: Utc::now(),
        });
        Ok(())
    }

    /// Append buffered records to the events file
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new().create(true).append(true).open(self.events_path())?;
        for record in self.pending.drain(..) {
            writeln!(file, "{}", serde_json::to_string(&record)?)?;
        }
        Ok(())
    }
}

impl Drop for SummaryWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Read every record of an events file
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<SummaryRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            records.push(serde_json::from_str(&line)?);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_histogram_bins_cover_all_values() {
        let values = ArrayD::from_shape_vec(vec![5], vec![-1.0, -0.5, 0.0, 0.5, 1.0]).expect("shape");
        let hist = Histogram::from_values(&values);
        assert_eq!(hist.count, 5);
        assert_eq!(hist.buckets.iter().map(|(_, n)| n).sum::<usize>(), 5);
        assert_eq!(hist.buckets.last().map(|(_, n)| *n), Some(1));
        assert!((hist.mean).abs() < 1e-6);
    }

    #[test]
    fn test_constant_histogram() {
        let hist = Histogram::from_values(&ArrayD::from_elem(vec![4], 2.0));
        assert_eq!(hist.buckets[0].1, 4);
        assert_eq!(hist.std, 0.0);
    }

    #[test]
    fn test_records_round_trip_through_file() {
        let dir = TempDir::new().expect("temp dir");
        let mut writer = SummaryWriter::create(dir.path()).expect("create");
        writer.scalar("d_loss", 5, 0.25);
        writer.histogram("z", 5, &ArrayD::zeros(vec![2, 3]));
        writer.image("G_img", 5, &ArrayD::zeros(vec![2, 4, 4, 3])).expect("image");
        writer.flush().expect("flush");
        writer.scalar("g_loss", 10, -1.0);
        drop(writer);

        let records = read_events(dir.path().join("events.jsonl")).expect("read");
        let tags: Vec<&str> = records.iter().map(SummaryRecord::tag).collect();
        assert_eq!(tags, vec!["d_loss", "z", "G_img", "g_loss"]);
        assert!(dir.path().join("images/G_img_000005.png").exists());
        assert!(matches!(records[0], SummaryRecord::Scalar { step: 5, .. }));
    }

    #[test]
    fn test_record_json_is_tagged_by_kind() {
        let record = SummaryRecord::Scalar { tag: "x".into(), step: 1, value: 1.0, wall_time: Utc::now() };
        let json = serde_json::to_string(&record).expect("json");
        assert!(json.contains(r#""kind":"scalar""#));
    }
}
