//! Persistence of the authoritative parameters.
//!
//! One safetensors file holds the flat parameter vector and the global step.
//! Writes go through a temp file and a rename, so a crash mid-save never
//! leaves a torn checkpoint behind; a restart either sees the previous file or
//! the new one.

use std::{fs, io, path::PathBuf};

use safetensors::{
    SafeTensors,
    tensor::{Dtype, TensorView},
};

use crate::{PsErr, Result};

const FILE_NAME: &str = "model.safetensors";

const PARAMS_TENSOR: &str = "params";
const STEP_TENSOR: &str = "global_step";

/// Handle to the checkpoint file inside a log directory.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    /// Creates a new `Checkpoint`.
    ///
    /// # Arguments
    /// * `logdir` - The directory the checkpoint file lives in; created if
    ///              missing.
    ///
    /// # Returns
    /// A new `Checkpoint` instance.
    pub fn new(logdir: impl Into<PathBuf>) -> io::Result<Self> {
        let logdir = logdir.into();
        fs::create_dir_all(&logdir)?;

        Ok(Self {
            path: logdir.join(FILE_NAME),
        })
    }

    /// Returns the path of the checkpoint file.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Writes the parameters and step, replacing any previous checkpoint.
    ///
    /// # Arguments
    /// * `params` - The flat parameter vector.
    /// * `step` - The global step the parameters correspond to.
    pub fn save(&self, params: &[f32], step: u64) -> Result<()> {
        let step_bytes = step.to_le_bytes();

        let params_view =
            TensorView::new(Dtype::F32, vec![params.len()], bytemuck::cast_slice(params))
                .map_err(|e| PsErr::Checkpoint(e.to_string()))?;
        let step_view = TensorView::new(Dtype::U64, vec![1], &step_bytes)
            .map_err(|e| PsErr::Checkpoint(e.to_string()))?;

        let data = safetensors::serialize(
            [(PARAMS_TENSOR, params_view), (STEP_TENSOR, step_view)],
            &None,
        )
        .map_err(|e| PsErr::Checkpoint(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;

        Ok(())
    }

    /// Reads the previous checkpoint, if one exists.
    ///
    /// # Returns
    /// The stored parameters and step, `None` when no checkpoint file is
    /// present, or an error for an unreadable or malformed file.
    pub fn load(&self) -> Result<Option<(Vec<f32>, u64)>> {
        let buf = match fs::read(&self.path) {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let tensors =
            SafeTensors::deserialize(&buf).map_err(|e| PsErr::Checkpoint(e.to_string()))?;

        let params_tensor = tensors
            .tensor(PARAMS_TENSOR)
            .map_err(|e| PsErr::Checkpoint(e.to_string()))?;
        if params_tensor.dtype() != Dtype::F32 {
            return Err(PsErr::Checkpoint(format!(
                "tensor '{PARAMS_TENSOR}' has dtype {:?}, expected F32",
                params_tensor.dtype()
            )));
        }

        let step_tensor = tensors
            .tensor(STEP_TENSOR)
            .map_err(|e| PsErr::Checkpoint(e.to_string()))?;
        let step_bytes: [u8; 8] = step_tensor
            .data()
            .try_into()
            .map_err(|_| PsErr::Checkpoint(format!("tensor '{STEP_TENSOR}' is not a single u64")))?;

        let params = bytemuck::pod_collect_to_vec(params_tensor.data());
        Ok(Some((params, u64::from_le_bytes(step_bytes))))
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join("ps_checkpoint_tests").join(name);
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn save_then_load_roundtrips() {
        let ckpt = Checkpoint::new(scratch_dir("roundtrip")).unwrap();
        let params: Vec<f32> = (0..17).map(|v| v as f32 * 0.5).collect();

        ckpt.save(&params, 42).unwrap();

        let (loaded, step) = ckpt.load().unwrap().unwrap();
        assert_eq!(loaded, params);
        assert_eq!(step, 42);
    }

    #[test]
    fn missing_file_is_a_fresh_start() {
        let ckpt = Checkpoint::new(scratch_dir("missing")).unwrap();
        assert!(ckpt.load().unwrap().is_none());
    }

    #[test]
    fn save_replaces_previous_checkpoint() {
        let ckpt = Checkpoint::new(scratch_dir("replace")).unwrap();

        ckpt.save(&[1.0, 2.0], 1).unwrap();
        ckpt.save(&[3.0, 4.0], 2).unwrap();

        let (params, step) = ckpt.load().unwrap().unwrap();
        assert_eq!(params, [3.0, 4.0]);
        assert_eq!(step, 2);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let ckpt = Checkpoint::new(scratch_dir("malformed")).unwrap();
        fs::write(ckpt.path(), b"not a checkpoint").unwrap();

        assert!(matches!(ckpt.load(), Err(PsErr::Checkpoint(_))));
    }
}
