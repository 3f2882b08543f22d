//! Raw binary file reading.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::trace;

use crate::error::{AssetError, AssetResult};

/// Reads a whole file into memory.
///
/// The contents are returned untouched; callers such as the shader loader
/// treat them as an opaque blob.
pub fn read_binary(path: impl AsRef<Path>) -> AssetResult<Vec<u8>> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => AssetError::FileNotFound(path.to_path_buf()),
        _ => AssetError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    trace!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_binary_missing_file() {
        let result = read_binary("definitely/not/here.spv");
        assert!(matches!(result, Err(AssetError::FileNotFound(_))));
    }

    #[test]
    fn test_read_binary_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        fs::write(&path, [0x03, 0x02, 0x23, 0x07, 0xff]).unwrap();

        assert_eq!(read_binary(&path).unwrap(), vec![0x03, 0x02, 0x23, 0x07, 0xff]);
    }
}
