//! Durable storage for the final parameter artifact.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use policy::ModelParameters;

const MAGIC: [u8; 4] = *b"ccp1";
const HEADER: usize = MAGIC.len() + size_of::<u64>();

/// Writes `params` under `dir` as `params-v{version}.bin`, creating the
/// directory if needed.
pub fn save_params(dir: &Path, params: &ModelParameters) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("params-v{}.bin", params.version));

    let mut bytes = Vec::with_capacity(HEADER + params.blob.len() * size_of::<f32>());
    bytes.extend_from_slice(&MAGIC);
    bytes.extend_from_slice(&params.version.to_be_bytes());
    bytes.extend_from_slice(bytemuck::cast_slice(&params.blob));

    fs::write(&path, &bytes)?;
    Ok(path)
}

/// Reads a parameter artifact written by [`save_params`].
pub fn load_params(path: &Path) -> io::Result<ModelParameters> {
    let bytes = fs::read(path)?;

    if bytes.len() < HEADER || bytes[..MAGIC.len()] != MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "not a parameter artifact",
        ));
    }

    let (header, blob_bytes) = bytes.split_at(HEADER);
    let version = u64::from_be_bytes(header[MAGIC.len()..].try_into().unwrap());

    if blob_bytes.len() % size_of::<f32>() != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "parameter blob is not f32 aligned",
        ));
    }

    Ok(ModelParameters::new(
        version,
        bytemuck::pod_collect_to_vec(blob_bytes),
    ))
}
