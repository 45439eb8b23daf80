//! Registry mirror and insecure registry option parsing

use crate::error::{Result, RuntimeError};
use std::collections::BTreeMap;

/// Registry a mirror applies to when none is named
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Parses `[registry=]mirror[,...]`
///
/// Mirrors without a scheme get `https://`. Mirrors for the same registry keep
/// their input order.
///
/// # Examples
/// - `registry-v1.docker.io` -> `{"docker.io": ["https://registry-v1.docker.io"]}`
/// - `quay.io=http://mirror.example.com` -> `{"quay.io": ["http://mirror.example.com"]}`
pub fn parse_registry_mirrors(input: &str) -> Result<BTreeMap<String, Vec<String>>> {
    let mut mirrors: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (registry, mirror) = match token.split_once('=') {
            Some((registry, mirror)) if !registry.contains("://") => (registry.trim(), mirror.trim()),
            _ => (DEFAULT_REGISTRY, token),
        };
        if registry.is_empty() {
            return Err(RuntimeError::InvalidMirror {
                mirror: token.to_string(),
                reason: "registry name is empty".to_string(),
            });
        }
        let url = normalize_mirror(mirror)?;
        mirrors.entry(registry.to_string()).or_default().push(url);
    }

    Ok(mirrors)
}

fn normalize_mirror(mirror: &str) -> Result<String> {
    let invalid = |reason: String| RuntimeError::InvalidMirror {
        mirror: mirror.to_string(),
        reason,
    };

    let url = if mirror.contains("://") {
        mirror.to_string()
    } else {
        format!("https://{mirror}")
    };

    let uri: http::Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(other) => return Err(invalid(format!("unsupported scheme '{other}'"))),
        None => return Err(invalid("missing scheme".to_string())),
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Parses a comma-separated registry list, dropping blanks and duplicates
pub fn parse_insecure_registries(input: &str) -> Vec<String> {
    let mut registries: Vec<String> = Vec::new();
    for registry in input.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        if !registries.iter().any(|r| r == registry) {
            registries.push(registry.to_string());
        }
    }
    registries
}
