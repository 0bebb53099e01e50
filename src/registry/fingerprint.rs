//! Content fingerprinting: streaming SHA-256 over fixed-size blocks.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use super::RegistryError;

/// 1 MiB read blocks keep memory use independent of file size.
const BLOCK_SIZE: usize = 1024 * 1024;

/// Cheap metadata used to prove a known path unchanged without re-hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub size: u64,
    /// Modification time as unix seconds; 0 when the platform withholds it.
    pub mtime: i64,
}

impl FileStamp {
    pub fn for_path(path: &Path) -> Result<Self, RegistryError> {
        let meta = std::fs::metadata(path).map_err(|e| map_io(path, e))?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(Self {
            size: meta.len(),
            mtime,
        })
    }
}

/// Hash a file's content in streaming blocks. Returns the lowercase hex
/// digest; an unreadable file is a typed error, never a panic.
pub fn fingerprint_file(path: &Path) -> Result<String, RegistryError> {
    let mut file = File::open(path).map_err(|e| map_io(path, e))?;
    let mut hasher = Sha256::new();
    let mut block = vec![0u8; BLOCK_SIZE];

    loop {
        let read = file.read(&mut block).map_err(|e| map_io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&block[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

fn map_io(path: &Path, e: std::io::Error) -> RegistryError {
    if e.kind() == std::io::ErrorKind::NotFound {
        RegistryError::NotFound(path.display().to_string())
    } else {
        RegistryError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }
}
