//! Catalog version digests.
//!
//! A version is a stable xxh3 hash over (url, structural digest of the
//! filtered node set, viewport). Two pages with the same interactable
//! surface hash identically, so `refresh_catalog` twice without
//! intervening actions yields the same version.

use xxhash_rust::xxh3::xxh3_64;

const FIELD_SEP: char = '\u{1f}';

/// Full catalog version over url, structural tokens, and viewport.
pub fn version_digest(url: &str, tokens: &[String], viewport: (u32, u32)) -> String {
    let mut buf = String::with_capacity(url.len() + tokens.len() * 16 + 16);
    buf.push_str(url);
    buf.push(FIELD_SEP);
    for token in tokens {
        buf.push_str(token);
        buf.push(FIELD_SEP);
    }
    buf.push_str(&format!("{}x{}", viewport.0, viewport.1));
    format!("{:016x}", xxh3_64(buf.as_bytes()))
}

/// Structure-only digest, used for the `nav_detected` delta check.
pub fn structural_digest(tokens: &[String]) -> String {
    let joined: String = tokens
        .iter()
        .flat_map(|t| t.chars().chain(std::iter::once(FIELD_SEP)))
        .collect();
    format!("{:016x}", xxh3_64(joined.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn digest_is_stable() {
        let t = tokens(&["a|link|home|0", "button|button||1"]);
        let a = version_digest("https://example.com", &t, (1280, 900));
        let b = version_digest("https://example.com", &t, (1280, 900));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn digest_changes_with_any_component() {
        let t = tokens(&["a|link|home|0"]);
        let base = version_digest("https://example.com", &t, (1280, 900));
        assert_ne!(
            base,
            version_digest("https://example.com/other", &t, (1280, 900))
        );
        assert_ne!(
            base,
            version_digest("https://example.com", &tokens(&["a|link|away|0"]), (1280, 900))
        );
        assert_ne!(base, version_digest("https://example.com", &t, (800, 600)));
    }

    #[test]
    fn token_boundaries_matter() {
        // "ab" + "c" must not collide with "a" + "bc".
        assert_ne!(
            structural_digest(&tokens(&["ab", "c"])),
            structural_digest(&tokens(&["a", "bc"]))
        );
    }
}
