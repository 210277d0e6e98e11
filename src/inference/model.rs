//! Model file checks
//!
//! Reads just enough of a model file to tell whether llama.cpp can load it,
//! so an old GGML download fails with a clear message instead of a backend
//! error.

use crate::inference::error::ModelLoadError;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Magic bytes at the start of every GGUF file
pub const GGUF_MAGIC: &[u8; 4] = b"GGUF";

/// Oldest GGUF version llama.cpp still reads
pub const MIN_GGUF_VERSION: u32 = 2;

/// Legacy formats, as they appear on disk (little-endian u32 magics)
const LEGACY_MAGICS: [(&[u8; 4], &str); 3] = [
    (b"lmgg", "GGML"),
    (b"fmgg", "GGMF"),
    (b"tjgg", "GGJT"),
];

/// Header fields read from a GGUF file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GgufHeader {
    pub version: u32,
    pub tensor_count: u64,
    pub metadata_count: u64,
}

/// Check that `path` is a GGUF file of a supported version.
pub fn validate_gguf(path: &Path) -> Result<GgufHeader, ModelLoadError> {
    if !path.is_file() {
        return Err(ModelLoadError::NotFound(path.to_path_buf()));
    }

    let mut file = File::open(path)?;
    let mut header = [0u8; 24];
    let read = read_up_to(&mut file, &mut header)?;

    let incompatible = |reason: String| ModelLoadError::Incompatible {
        path: path.to_path_buf(),
        reason,
    };

    if read < 4 {
        return Err(incompatible("file is too small to be a model".to_string()));
    }

    let magic = &header[..4];
    if magic != GGUF_MAGIC {
        if let Some((_, name)) = LEGACY_MAGICS.iter().find(|(m, _)| magic == &m[..]) {
            return Err(incompatible(format!(
                "legacy {} format, convert it to GGUF or download a .gguf build",
                name
            )));
        }
        return Err(incompatible("not a GGUF file".to_string()));
    }

    if read < header.len() {
        return Err(incompatible("truncated GGUF header".to_string()));
    }

    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version < MIN_GGUF_VERSION {
        return Err(incompatible(format!(
            "GGUF version {} is no longer supported",
            version
        )));
    }

    let mut tensor_count = [0u8; 8];
    tensor_count.copy_from_slice(&header[8..16]);
    let mut metadata_count = [0u8; 8];
    metadata_count.copy_from_slice(&header[16..24]);

    Ok(GgufHeader {
        version,
        tensor_count: u64::from_le_bytes(tensor_count),
        metadata_count: u64::from_le_bytes(metadata_count),
    })
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn gguf_header(version: u32) -> Vec<u8> {
        let mut bytes = GGUF_MAGIC.to_vec();
        bytes.extend_from_slice(&version.to_le_bytes());
        bytes.extend_from_slice(&291u64.to_le_bytes());
        bytes.extend_from_slice(&19u64.to_le_bytes());
        bytes
    }

    #[test]
    fn test_valid_gguf() {
        let file = write_file(&gguf_header(3));
        let header = validate_gguf(file.path()).unwrap();
        assert_eq!(header.version, 3);
        assert_eq!(header.tensor_count, 291);
        assert_eq!(header.metadata_count, 19);
    }

    #[test]
    fn test_old_gguf_version() {
        let file = write_file(&gguf_header(1));
        assert!(matches!(
            validate_gguf(file.path()),
            Err(ModelLoadError::Incompatible { .. })
        ));
    }

    #[test]
    fn test_legacy_ggml_rejected() {
        let mut bytes = b"tjgg".to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        let file = write_file(&bytes);
        match validate_gguf(file.path()) {
            Err(ModelLoadError::Incompatible { reason, .. }) => {
                assert!(reason.contains("GGJT"), "{}", reason)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_garbage_and_truncated() {
        let file = write_file(b"hello world, not a model at all");
        assert!(matches!(
            validate_gguf(file.path()),
            Err(ModelLoadError::Incompatible { .. })
        ));

        let file = write_file(b"GGUF\x03\x00");
        assert!(matches!(
            validate_gguf(file.path()),
            Err(ModelLoadError::Incompatible { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.gguf");
        assert!(matches!(
            validate_gguf(&path),
            Err(ModelLoadError::NotFound(_))
        ));
    }
}
