//! Optional HTTP basic authentication for the `jsonrpsee` client builder.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use jsonrpsee::http_client::{HeaderMap, HeaderValue};

/// Builds the default headers for every request. Without credentials the map is empty.
pub(crate) fn build_auth_headers(credentials: Option<(&str, &str)>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some((user, password)) = credentials {
        let encoded = BASE64_STANDARD.encode(format!("{user}:{password}"));
        let value = HeaderValue::from_str(&format!("Basic {encoded}"))
            .context("failed to build Authorization header")?;
        headers.insert("Authorization", value);
    }
    Ok(headers)
}
