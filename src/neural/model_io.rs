//! Weight persistence in the safetensors format.
//!
//! Works on the backend-neutral [`WeightMap`] so model files stay portable
//! across libtorch versions and across checkpoint backends. All tensors are
//! stored as little-endian F32.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use safetensors::tensor::{Dtype, SafeTensors, TensorView};
use safetensors::serialize_to_file;

use super::{WeightMap, WeightTensor};
use crate::{ChessRlError, Result};

/// Save a weight map to a safetensors file.
pub fn save_weights(weights: &WeightMap, path: impl AsRef<Path>) -> Result<()> {
    let mut buffers: HashMap<String, Vec<u8>> = HashMap::new();
    for (name, tensor) in weights {
        let bytes: Vec<u8> = tensor.data.iter().flat_map(|x| x.to_le_bytes()).collect();
        buffers.insert(name.clone(), bytes);
    }

    let views: HashMap<String, TensorView<'_>> = weights
        .iter()
        .map(|(name, tensor)| {
            let view = TensorView::new(Dtype::F32, tensor.shape.clone(), &buffers[name])
                .map_err(|e| {
                    ChessRlError::Checkpoint(format!("tensor '{}' not serializable: {:?}", name, e))
                })?;
            Ok((name.clone(), view))
        })
        .collect::<Result<_>>()?;

    serialize_to_file(views, &None, path.as_ref())
        .map_err(|e| ChessRlError::Checkpoint(format!("safetensors write failed: {}", e)))?;
    Ok(())
}

/// Load a weight map from a safetensors file.
pub fn load_weights(path: impl AsRef<Path>) -> Result<WeightMap> {
    let mut file = File::open(path.as_ref())?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;

    let tensors = SafeTensors::deserialize(&buffer)
        .map_err(|e| ChessRlError::Checkpoint(format!("corrupt safetensors file: {}", e)))?;

    let mut weights = WeightMap::new();
    for (name, view) in tensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(ChessRlError::Checkpoint(format!(
                "tensor '{}' has dtype {:?}, expected F32",
                name,
                view.dtype()
            )));
        }
        let data: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        weights.insert(
            name.to_string(),
            WeightTensor {
                shape: view.shape().to_vec(),
                data,
            },
        );
    }
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_roundtrip() {
        let mut weights = WeightMap::new();
        weights.insert(
            "fc0.weight".to_string(),
            WeightTensor {
                shape: vec![2, 3],
                data: vec![0.5, -1.25, 3.0, 0.0, 2.5, -0.125],
            },
        );
        weights.insert(
            "fc0.bias".to_string(),
            WeightTensor {
                shape: vec![2],
                data: vec![0.1, -0.2],
            },
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        save_weights(&weights, &path).unwrap();
        let loaded = load_weights(&path).unwrap();
        assert_eq!(loaded, weights);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.safetensors");
        std::fs::write(&path, b"not a safetensors file").unwrap();
        assert!(load_weights(&path).is_err());
    }
}
