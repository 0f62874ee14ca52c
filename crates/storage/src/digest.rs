//! MD5 integrity checks for downloaded snapshots.
//!
//! MD5 is not a security boundary here; it is what the upstream `.md5` digest
//! files contain, and it catches truncated or corrupted transfers.

use crate::error::{ErrorKind, Result};
use md5::{Digest, Md5};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::instrument;

/// Snapshots are tens of gigabytes; read them in 64 KiB blocks.
const BUFFER_SIZE: usize = 64 * 1024;

/// Calculates the lowercase hexadecimal MD5 digest of a file's contents.
pub fn file_md5(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| ErrorKind::from_io(e, path))?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let bytes = file.read(&mut buffer).map_err(|e| ErrorKind::from_io(e, path))?;
        if bytes == 0 {
            break;
        }
        hasher.update(&buffer[..bytes]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Normalizes the contents of a digest file to a bare lowercase hex string.
///
/// Accepts both a bare digest and `md5sum` output (`<digest>  <filename>`).
fn normalize(contents: &str) -> Option<String> {
    contents.split_whitespace().next().map(str::to_ascii_lowercase)
}

/// Returns `true` if the MD5 digest of `file` matches the digest stored in
/// `digest_file`.
///
/// Never errors: an unreadable file, an unreadable or empty digest file, or a
/// mismatch all mean the file cannot be trusted.
#[instrument(skip_all, fields(file = %file.as_ref().display()))]
pub fn verify(file: impl AsRef<Path>, digest_file: impl AsRef<Path>) -> bool {
    let expected = match std::fs::read_to_string(digest_file.as_ref()) {
        Ok(contents) => normalize(&contents),
        Err(e) => {
            tracing::debug!(error = %e, digest_file = %digest_file.as_ref().display(), "Digest file unreadable");
            return false;
        },
    };
    let Some(expected) = expected else {
        tracing::debug!("Digest file is empty");
        return false;
    };
    match file_md5(file.as_ref()) {
        Ok(actual) if actual == expected => true,
        Ok(actual) => {
            tracing::info!(expected = %expected, actual = %actual, "Digest mismatch");
            false
        },
        Err(e) => {
            tracing::debug!(error = ?e, "File unreadable");
            false
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    // md5("hello world")
    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

    fn setup(data: &[u8], digest: &str) -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("wikipedia-20240301.tar");
        let digest_file = dir.path().join("wikipedia-20240301.tar.md5");
        fs::write(&file, data).unwrap();
        fs::write(&digest_file, digest).unwrap();
        (dir, file, digest_file)
    }

    #[test]
    fn test_file_md5() {
        let (_dir, file, _) = setup(b"hello world", "");
        assert_eq!(file_md5(&file).unwrap(), HELLO_MD5);
    }

    #[test]
    fn test_file_md5_spans_multiple_blocks() {
        let data = vec![0x5au8; BUFFER_SIZE * 2 + 17];
        let (_dir, file, _) = setup(&data, "");
        let expected = format!("{:x}", Md5::digest(&data));
        assert_eq!(file_md5(&file).unwrap(), expected);
    }

    #[test]
    fn test_file_md5_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = file_md5(dir.path().join("missing.tar")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[rstest]
    #[case::bare(HELLO_MD5)]
    #[case::trailing_newline("5eb63bbbe01eeed093cb22bb8f5acdc3\n")]
    #[case::uppercase("5EB63BBBE01EEED093CB22BB8F5ACDC3")]
    #[case::md5sum_format("5eb63bbbe01eeed093cb22bb8f5acdc3  wikipedia-20240301.tar\n")]
    fn test_verify_matches(#[case] digest: &str) {
        let (_dir, file, digest_file) = setup(b"hello world", digest);
        assert!(verify(&file, &digest_file));
    }

    #[test]
    fn test_verify_single_byte_corruption() {
        let (_dir, file, digest_file) = setup(b"hello world", HELLO_MD5);
        assert!(verify(&file, &digest_file));
        fs::write(&file, b"hello worle").unwrap();
        assert!(!verify(&file, &digest_file));
    }

    #[rstest]
    #[case::empty("")]
    #[case::whitespace("   \n")]
    #[case::wrong("d41d8cd98f00b204e9800998ecf8427e")]
    fn test_verify_rejects_bad_digest(#[case] digest: &str) {
        let (_dir, file, digest_file) = setup(b"hello world", digest);
        assert!(!verify(&file, &digest_file));
    }

    #[test]
    fn test_verify_unreadable_files_are_untrusted() {
        let (dir, file, digest_file) = setup(b"hello world", HELLO_MD5);
        assert!(!verify(dir.path().join("missing.tar"), &digest_file));
        assert!(!verify(&file, dir.path().join("missing.tar.md5")));
    }
}
