//! Plain-text deconstructor: the formats that need no external engine.

use std::path::Path;

use crate::config::SkipPolicy;

use super::{Deconstructor, ExtractError};

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "csv", "log", "json", "xml", "html", "eml"];

/// Reads text-like files directly, enforcing the size guard up front.
///
/// Whether an unsupported extension is a recorded skip or silently empty is
/// an audit-trail decision, so it follows the configured `SkipPolicy`.
pub struct PlainTextDeconstructor {
    max_file_bytes: u64,
    skip_policy: SkipPolicy,
}

impl PlainTextDeconstructor {
    pub fn new(max_file_bytes: u64, skip_policy: SkipPolicy) -> Self {
        Self {
            max_file_bytes,
            skip_policy,
        }
    }
}

impl Deconstructor for PlainTextDeconstructor {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let key = path.display().to_string();

        let meta = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExtractError::NotFound(key.clone())
            } else {
                ExtractError::Unreadable {
                    path: key.clone(),
                    reason: e.to_string(),
                }
            }
        })?;
        if meta.len() > self.max_file_bytes {
            return Err(ExtractError::TooLarge {
                path: key,
                size: meta.len(),
                limit: self.max_file_bytes,
            });
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
            return match self.skip_policy {
                SkipPolicy::Silent => Ok(String::new()),
                SkipPolicy::Recorded => Err(ExtractError::UnsupportedFormat {
                    path: key,
                    extension,
                }),
            };
        }

        let bytes = std::fs::read(path).map_err(|e| ExtractError::Unreadable {
            path: key,
            reason: e.to_string(),
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
