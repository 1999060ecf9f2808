//! Stable device identifier.
//!
//! The identifier is sent to the licensing authority with every validation
//! (so it can count activations) and salts the local storage keys. It is a
//! SHA-256 over platform identifiers, never the raw identifiers themselves.

use sha2::{Digest, Sha256};
use std::sync::OnceLock;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

static HARDWARE_ID: OnceLock<String> = OnceLock::new();

/// Used when no platform identifier can be read (containers, locked-down hosts).
const FALLBACK_SOURCE: &str = "warden-unknown-device";

/// Returns the fingerprint of the current machine. Computed once per process.
pub fn get_hardware_id() -> String {
    HARDWARE_ID
        .get_or_init(|| fingerprint(&platform_identifiers()))
        .clone()
}

/// Hash a set of identifiers into a hex fingerprint.
///
/// Empty identifiers are ignored; if nothing remains the fixed fallback
/// source is hashed instead.
pub fn fingerprint(identifiers: &[String]) -> String {
    let parts: Vec<&str> = identifiers
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    let mut hasher = Sha256::new();
    if parts.is_empty() {
        hasher.update(FALLBACK_SOURCE.as_bytes());
    } else {
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update(b"|");
        }
    }
    hex::encode(hasher.finalize())
}

fn platform_identifiers() -> Vec<String> {
    #[cfg(target_os = "linux")]
    {
        linux::machine_identifiers()
    }
    #[cfg(target_os = "macos")]
    {
        macos::machine_identifiers()
    }
    #[cfg(target_os = "windows")]
    {
        windows::machine_identifiers()
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_id_is_stable_hex() {
        let a = get_hardware_id();
        let b = get_hardware_id();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_ignores_blank_parts() {
        let with_blank = fingerprint(&["abc".to_string(), "  ".to_string()]);
        let without = fingerprint(&["abc".to_string()]);
        assert_eq!(with_blank, without);
    }

    #[test]
    fn empty_input_uses_fallback() {
        assert_eq!(fingerprint(&[]), fingerprint(&[String::new()]));
        assert_ne!(fingerprint(&[]), fingerprint(&["abc".to_string()]));
    }
}
