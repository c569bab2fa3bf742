use anyhow::{Result, anyhow};
use std::path::Path;

/// Longest stored name accepted (common filesystem component limit)
pub const MAX_NAME_LENGTH: usize = 255;

/// Longest extension carried over from a client-suggested filename
pub const MAX_EXTENSION_LENGTH: usize = 16;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Checks that `name` can only ever resolve to a direct child of the storage
/// directory. Anything with separators, parent references or control
/// characters is rejected before a path is built from it.
pub fn validate_stored_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "EMPTY_NAME",
            message: "File name cannot be empty".to_string(),
        }));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(anyhow!(ValidationError {
            code: "NAME_TOO_LONG",
            message: format!("File name exceeds {} bytes", MAX_NAME_LENGTH),
        }));
    }

    if name == "." || name == ".." || name.contains("..") {
        tracing::warn!("Path traversal attempt detected: {}", name);
        return Err(anyhow!(ValidationError {
            code: "PATH_TRAVERSAL",
            message: "File name must not reference parent directories".to_string(),
        }));
    }

    if name.contains('/') || name.contains('\\') || Path::new(name).is_absolute() {
        tracing::warn!("Path traversal attempt detected: {}", name);
        return Err(anyhow!(ValidationError {
            code: "PATH_TRAVERSAL",
            message: "File name must not contain path separators".to_string(),
        }));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(anyhow!(ValidationError {
            code: "INVALID_CHARACTERS",
            message: "File name contains control characters".to_string(),
        }));
    }

    Ok(())
}

/// Derives the extension to append to a generated name from the client's
/// filename. Only the final path component is looked at, and only short
/// ASCII alphanumeric extensions survive.
pub fn extension_hint(suggested_name: Option<&str>) -> Option<String> {
    let suggested = suggested_name?;
    // Windows clients may send backslash-separated paths
    let last_component = suggested.rsplit(['/', '\\']).next().unwrap_or(suggested);

    let ext = Path::new(last_component).extension()?.to_str()?;

    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LENGTH
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }

    Some(ext.to_string())
}
