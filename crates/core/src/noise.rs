//! Noise classification for blocked-resource identifiers
//!
//! Browser extensions and pseudo-schemes generate a steady stream of
//! violations nobody can act on. These predicates decide which blocked URIs
//! are dropped before storage.

use serde::{Deserialize, Serialize};

/// Schemes injected by browser extensions
const EXTENSION_SCHEMES: [&str; 4] = [
    "chrome-extension:",
    "moz-extension:",
    "safari-extension:",
    "edge-extension:",
];

/// Pseudo-schemes that never identify a fetchable resource.
/// `blob:` is absent on purpose: it is a real value for worker-src.
const IGNORABLE_SCHEMES: [&str; 2] = ["about:", "data:"];

/// Why a blocked URI was classified as noise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseKind {
    Extension,
    PseudoScheme,
}

impl NoiseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoiseKind::Extension => "extension",
            NoiseKind::PseudoScheme => "pseudo_scheme",
        }
    }
}

fn has_scheme(uri: &str, scheme: &str) -> bool {
    uri.get(..scheme.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(scheme))
}

/// True when the URI belongs to a browser extension origin.
pub fn is_extension_noise(uri: Option<&str>) -> bool {
    match uri {
        Some(u) if !u.is_empty() => EXTENSION_SCHEMES.iter().any(|s| has_scheme(u, s)),
        _ => false,
    }
}

/// True for `about:` and `data:` URIs.
pub fn is_ignorable(uri: Option<&str>) -> bool {
    match uri {
        Some(u) if !u.is_empty() => IGNORABLE_SCHEMES.iter().any(|s| has_scheme(u, s)),
        _ => false,
    }
}

pub fn classify(uri: Option<&str>) -> Option<NoiseKind> {
    if is_extension_noise(uri) {
        Some(NoiseKind::Extension)
    } else if is_ignorable(uri) {
        Some(NoiseKind::PseudoScheme)
    } else {
        None
    }
}

pub fn is_noise(uri: Option<&str>) -> bool {
    classify(uri).is_some()
}
