//! Source provider implementations.
//!
//! - `github` - repository tree traversal over the GitHub REST API
//! - `local` - recursive walk of a local directory
//!
//! Both keep only `.js` / `.ts` files and decode text permissively.

pub mod github;
pub mod local;

pub use github::{GitHubLocator, GitHubSource};
pub use local::LocalSource;

/// UTF-8 decoding that drops invalid byte sequences instead of failing.
pub fn decode_permissive(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_drops_invalid_bytes() {
        assert_eq!(decode_permissive(b"let a = 1;\xff\xfe"), "let a = 1;");
        assert_eq!(decode_permissive("héllo".as_bytes()), "héllo");
        assert_eq!(decode_permissive(b"a\xc3b"), "ab");
    }
}
