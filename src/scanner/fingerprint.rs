// File fingerprinting for identifying a source across runs
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::Result;
use md5::{Digest, Md5};

/// Bytes read from the head of the file
const HEAD_BYTES: u64 = 64 * 1024;

/// Generate a fingerprint for a file
/// Uses: MD5(first 64KB + file size)
/// Modification time is left out so copies of a file share a fingerprint
pub fn file_fingerprint(path: &Path) -> Result<String> {
    let file_size = std::fs::metadata(path)?.len();

    let mut head = Vec::with_capacity(HEAD_BYTES as usize);
    File::open(path)?.take(HEAD_BYTES).read_to_end(&mut head)?;

    let mut hasher = Md5::new();
    hasher.update(&head);
    hasher.update(file_size.to_string().as_bytes());

    Ok(format!("{:x}", hasher.finalize()))
}
