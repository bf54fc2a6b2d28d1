//! Loader for the MNIST IDX files.
//!
//! The four files are expected uncompressed under one directory, with their
//! standard names. Pixels are normalized to `[0, 1]` and labels are one-hot
//! encoded over the ten digit classes.

use std::{fs, path::Path};

use crate::{MlErr, Result, dataset::Dataset};

pub const IMAGE_SIDE: usize = 28;
pub const INPUT_SIZE: usize = IMAGE_SIDE * IMAGE_SIDE;
pub const NUM_CLASSES: usize = 10;

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

const IMAGES_HEADER: usize = 16;
const LABELS_HEADER: usize = 8;

/// The train and test splits of the dataset.
#[derive(Debug, Clone)]
pub struct Mnist {
    pub train: Dataset,
    pub test: Dataset,
}

/// Loads both MNIST splits from a directory.
///
/// # Arguments
/// * `data_dir` - The directory holding the four uncompressed IDX files.
///
/// # Returns
/// The loaded splits, or an error if a file is missing or malformed.
pub fn load(data_dir: &Path) -> Result<Mnist> {
    Ok(Mnist {
        train: load_split(data_dir, TRAIN_IMAGES, TRAIN_LABELS)?,
        test: load_split(data_dir, TEST_IMAGES, TEST_LABELS)?,
    })
}

fn load_split(data_dir: &Path, images: &str, labels: &str) -> Result<Dataset> {
    let xs = parse_images(&fs::read(data_dir.join(images))?)?;
    let ys = parse_labels(&fs::read(data_dir.join(labels))?)?;

    let num_images = xs.len() / INPUT_SIZE;
    let num_labels = ys.len() / NUM_CLASSES;

    if num_images != num_labels {
        return Err(MlErr::CountMismatch {
            images: num_images,
            labels: num_labels,
        });
    }

    Dataset::new(xs, ys, INPUT_SIZE, NUM_CLASSES)
}

/// Parses an IDX image file into normalized flat pixel rows.
///
/// # Arguments
/// * `bytes` - The whole file contents.
///
/// # Returns
/// One `INPUT_SIZE`-sized row of `[0, 1]` values per image.
pub fn parse_images(bytes: &[u8]) -> Result<Vec<f32>> {
    let magic = read_be_u32(bytes, 0, "images")?;
    if magic != IMAGES_MAGIC {
        return Err(MlErr::BadMagic {
            what: "images",
            got: magic,
            expected: IMAGES_MAGIC,
        });
    }

    let count = read_be_u32(bytes, 4, "images")? as usize;
    let rows = read_be_u32(bytes, 8, "images")?;
    let cols = read_be_u32(bytes, 12, "images")?;

    if rows as usize != IMAGE_SIDE || cols as usize != IMAGE_SIDE {
        return Err(MlErr::BadImageDims { rows, cols });
    }

    let pixels = bytes
        .get(IMAGES_HEADER..IMAGES_HEADER + count * INPUT_SIZE)
        .ok_or(MlErr::Truncated { what: "images" })?;

    Ok(pixels.iter().map(|&p| p as f32 / 255.0).collect())
}

/// Parses an IDX label file into one-hot rows.
///
/// # Arguments
/// * `bytes` - The whole file contents.
///
/// # Returns
/// One `NUM_CLASSES`-sized one-hot row per label.
pub fn parse_labels(bytes: &[u8]) -> Result<Vec<f32>> {
    let magic = read_be_u32(bytes, 0, "labels")?;
    if magic != LABELS_MAGIC {
        return Err(MlErr::BadMagic {
            what: "labels",
            got: magic,
            expected: LABELS_MAGIC,
        });
    }

    let count = read_be_u32(bytes, 4, "labels")? as usize;
    let labels = bytes
        .get(LABELS_HEADER..LABELS_HEADER + count)
        .ok_or(MlErr::Truncated { what: "labels" })?;

    let mut ys = vec![0.0; count * NUM_CLASSES];
    for (i, &label) in labels.iter().enumerate() {
        if label as usize >= NUM_CLASSES {
            return Err(MlErr::BadLabel { got: label });
        }

        ys[i * NUM_CLASSES + label as usize] = 1.0;
    }

    Ok(ys)
}

fn read_be_u32(bytes: &[u8], offset: usize, what: &'static str) -> Result<u32> {
    let raw = bytes
        .get(offset..offset + 4)
        .ok_or(MlErr::Truncated { what })?;

    // SAFETY: The slice above is exactly 4 bytes long.
    Ok(u32::from_be_bytes(raw.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_file(count: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&IMAGES_MAGIC.to_be_bytes());
        bytes.extend_from_slice(&count.to_be_bytes());
        bytes.extend_from_slice(&(IMAGE_SIDE as u32).to_be_bytes());
        bytes.extend_from_slice(&(IMAGE_SIDE as u32).to_be_bytes());

        for i in 0..count as usize * INPUT_SIZE {
            bytes.push((i % 256) as u8);
        }

        bytes
    }

    fn label_file(labels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&LABELS_MAGIC.to_be_bytes());
        bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
        bytes.extend_from_slice(labels);
        bytes
    }

    #[test]
    fn parses_and_normalizes_images() {
        let xs = parse_images(&image_file(2)).unwrap();

        assert_eq!(xs.len(), 2 * INPUT_SIZE);
        assert_eq!(xs[0], 0.0);
        assert!((xs[255] - 1.0).abs() < 1e-6);
        assert!(xs.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn one_hot_encodes_labels() {
        let ys = parse_labels(&label_file(&[3, 0])).unwrap();

        assert_eq!(ys.len(), 2 * NUM_CLASSES);
        assert_eq!(ys[3], 1.0);
        assert_eq!(ys[NUM_CLASSES], 1.0);
        assert_eq!(ys.iter().filter(|&&v| v == 1.0).count(), 2);
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut bytes = image_file(1);
        bytes[3] = 0;

        assert!(matches!(
            parse_images(&bytes),
            Err(MlErr::BadMagic { what: "images", .. })
        ));
    }

    #[test]
    fn truncated_pixels_are_rejected() {
        let mut bytes = image_file(2);
        bytes.truncate(bytes.len() - 1);

        assert!(matches!(
            parse_images(&bytes),
            Err(MlErr::Truncated { what: "images" })
        ));
    }

    #[test]
    fn non_mnist_dims_are_rejected() {
        let mut bytes = image_file(1);
        bytes[11] = 27;

        assert!(matches!(
            parse_images(&bytes),
            Err(MlErr::BadImageDims { .. })
        ));
    }

    #[test]
    fn out_of_range_label_is_rejected() {
        assert!(matches!(
            parse_labels(&label_file(&[10])),
            Err(MlErr::BadLabel { got: 10 })
        ));
    }

    #[test]
    fn labels_build_a_dataset_with_images() {
        let xs = parse_images(&image_file(2)).unwrap();
        let ys = parse_labels(&label_file(&[1, 9])).unwrap();

        let ds = Dataset::new(xs, ys, INPUT_SIZE, NUM_CLASSES).unwrap();
        assert_eq!(ds.len(), 2);
    }
}
