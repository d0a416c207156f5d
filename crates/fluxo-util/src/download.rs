//! HTTP download with SHA-256 hashing.

use std::path::Path;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::error::UtilError;

/// Download `url` into `dest` and return the hex SHA-256 of the body.
///
/// # Errors
/// Returns an error if the request fails, the body cannot be read, or `dest`
/// cannot be written.
pub fn download(url: &str, dest: &Path) -> Result<String, UtilError> {
    let agent = ureq::Agent::new_with_config(
        ureq::config::Config::builder()
            .timeout_connect(Some(Duration::from_secs(30)))
            .timeout_global(Some(Duration::from_secs(600)))
            .build(),
    );

    tracing::info!(%url, "downloading");
    let response = agent.get(url).call().map_err(|e| UtilError::Download {
        message: format!("{url}: {e}"),
    })?;

    let mut body = response.into_body();
    let mut reader = body.as_reader();
    let mut file = std::fs::File::create(dest).map_err(|source| UtilError::io(dest, source))?;

    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = std::io::Read::read(&mut reader, &mut buf).map_err(|e| UtilError::Download {
            message: format!("{url}: {e}"),
        })?;
        if n == 0 {
            break;
        }
        let Some(chunk) = buf.get(..n) else {
            break;
        };
        std::io::Write::write_all(&mut file, chunk)
            .map_err(|source| UtilError::io(dest, source))?;
        hasher.update(chunk);
        downloaded = downloaded.saturating_add(n as u64);
    }

    tracing::debug!(%url, bytes = downloaded, "download finished");
    Ok(format!("{:x}", hasher.finalize()))
}
