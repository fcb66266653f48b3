use sha2::{Digest, Sha256};

/// SHA-256 of `bytes`, hex-encoded lowercase.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Hash of the empty byte string, the root of every audit chain.
pub fn empty_hash() -> String {
    sha256_hex(b"")
}
