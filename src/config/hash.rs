//! Content fingerprints for drift detection.
//!
//! A fingerprint is the 32-bit FNV-1a hash of the trimmed content, rendered
//! as 8 lowercase hex digits. Blank content has the empty fingerprint.

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// Computes the fingerprint of a deployment artifact.
#[must_use]
pub fn fingerprint(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let hash = trimmed.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    });
    format!("{hash:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_content_has_empty_fingerprint() {
        assert_eq!(fingerprint(""), "");
        assert_eq!(fingerprint("  \n\t"), "");
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(fingerprint("a"), "e40c292c");
        assert_eq!(fingerprint("foobar"), "bf9cf968");
    }

    #[test]
    fn test_deterministic_and_trim_insensitive() {
        let compose = "services:\n  api:\n    image: api:1\n";
        assert_eq!(fingerprint(compose), fingerprint(compose));
        assert_eq!(fingerprint(compose), fingerprint(&format!("\n{compose}\n\n")));
        assert_eq!(fingerprint(compose).len(), 8);
    }

    #[test]
    fn test_one_byte_change_changes_fingerprint() {
        let a = "services:\n  api:\n    image: api:1";
        let b = "services:\n  api:\n    image: api:2";
        assert_ne!(fingerprint(a), fingerprint(b));
    }
}
