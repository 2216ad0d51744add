use crate::errors::{Result, SurfaceError};
use std::io::Read;
use tracing::debug;

/// Read the bytes behind a `http://`, `https://` or `file://` URL.
pub fn fetch(url: &str) -> Result<Vec<u8>> {
    let fetch_err = |message: String| SurfaceError::Fetch {
        url: url.to_string(),
        message,
    };

    if let Some(path) = url.strip_prefix("file://") {
        debug!("Reading local structure file {path}");
        return std::fs::read(path).map_err(|e| fetch_err(e.to_string()));
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        debug!("Downloading {url}");
        let response = ureq::get(url)
            .call()
            .map_err(|e| fetch_err(e.to_string()))?;
        let mut data = Vec::new();
        response
            .into_body()
            .into_reader()
            .read_to_end(&mut data)
            .map_err(|e| fetch_err(format!("failed to read response: {e}")))?;
        debug!("Downloaded {} bytes", data.len());
        return Ok(data);
    }

    Err(SurfaceError::input(format!(
        "unsupported URL scheme in '{url}' (expected http://, https:// or file://)"
    )))
}
