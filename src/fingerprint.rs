use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use md5::{Digest, Md5};

use crate::storage::extension_of;

pub const OCTET_STREAM: &str = "application/octet-stream";

const SNIFF_LEN: usize = 16;
const READ_CHUNK: usize = 64 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fingerprint {
    /// Lowercase hex MD5 of the file contents.
    pub content_hash: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

impl Fingerprint {
    pub fn from_bytes(file_name: &str, bytes: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(bytes);
        Self {
            content_hash: hex::encode(hasher.finalize()),
            mime_type: guess_mime_type(file_name, bytes),
            size_bytes: bytes.len() as u64,
        }
    }
}

/// Hashes and types the file at `path`. Read failures are logged and the
/// fingerprint covers whatever could be read.
pub fn fingerprint(path: &Path) -> Fingerprint {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let mut hasher = Md5::new();
    let mut head = Vec::with_capacity(SNIFF_LEN);
    let mut size_bytes = 0u64;

    match File::open(path) {
        Ok(mut file) => {
            let mut buffer = vec![0u8; READ_CHUNK];
            loop {
                match file.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(read) => {
                        let chunk = &buffer[..read];
                        if head.len() < SNIFF_LEN {
                            let take = (SNIFF_LEN - head.len()).min(read);
                            head.extend_from_slice(&chunk[..take]);
                        }
                        hasher.update(chunk);
                        size_bytes += read as u64;
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "fingerprint read stopped early");
                        break;
                    }
                }
            }
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "fingerprint could not open file");
        }
    }

    Fingerprint {
        content_hash: hex::encode(hasher.finalize()),
        mime_type: guess_mime_type(file_name, &head),
        size_bytes,
    }
}

/// Extension lookup first, then magic bytes, then octet-stream.
pub fn guess_mime_type(file_name: &str, head: &[u8]) -> String {
    mime_from_extension(&extension_of(file_name))
        .or_else(|| detect_mime_type(head).map(str::to_string))
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

pub fn mime_from_extension(extension: &str) -> Option<String> {
    mime_guess::from_ext(extension.trim_start_matches('.'))
        .first()
        .map(|mime| mime.to_string())
}

pub fn detect_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        return Some("image/tiff");
    }
    if bytes.starts_with(b"BM") {
        return Some("image/bmp");
    }
    if bytes.starts_with(b"%PDF-") {
        return Some("application/pdf");
    }
    None
}
