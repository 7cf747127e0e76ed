//! Metadata pre-pass over an in-memory ZIP buffer.
//!
//! All size, ratio, and count bounds are checked from central-directory
//! metadata alone (`by_index_raw` never decompresses), so validation stays
//! cheap even for adversarial inputs. Any breach aborts the whole archive
//! before a single entry body is read.

use std::io::Cursor;

use zip::ZipArchive;

use crate::config::Limits;
use crate::errors::AppError;

/// Unix mode bits marking a symlink entry (S_IFLNK).
const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

#[derive(Debug, Clone)]
pub struct EntryMeta {
    pub raw_path: String,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub is_symlink: bool,
}

/// Enumerates file entries and validates aggregate and per-entry bounds.
pub fn inspect(bytes: &[u8], limits: &Limits) -> Result<Vec<EntryMeta>, AppError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AppError::Validation(format!("not a readable ZIP archive: {e}")))?;

    let mut entries = Vec::new();
    let mut total_uncompressed: u64 = 0;

    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|e| AppError::Validation(format!("unreadable archive entry: {e}")))?;
        if entry.is_dir() {
            continue;
        }

        let raw_path = entry.name().to_string();
        let uncompressed = entry.size();
        let compressed = entry.compressed_size();

        total_uncompressed = total_uncompressed.saturating_add(uncompressed);
        if total_uncompressed > limits.max_uncompressed_bytes {
            return Err(AppError::ArchiveTooLarge {
                size: total_uncompressed,
                limit: limits.max_uncompressed_bytes,
            });
        }

        // Ratio check. A zero-byte stored entry has 0/0 and is fine; claimed
        // content out of zero compressed bytes is not.
        if compressed == 0 {
            if uncompressed > 0 {
                return Err(AppError::ArchiveBomb {
                    path: raw_path,
                    ratio: f64::INFINITY,
                });
            }
        } else {
            let ratio = uncompressed as f64 / compressed as f64;
            if ratio > limits.max_compression_ratio {
                return Err(AppError::ArchiveBomb { path: raw_path, ratio });
            }
        }

        let is_symlink = entry
            .unix_mode()
            .map(|mode| mode & S_IFMT == S_IFLNK)
            .unwrap_or(false);

        entries.push(EntryMeta {
            raw_path,
            uncompressed_size: uncompressed,
            compressed_size: compressed,
            is_symlink,
        });

        if entries.len() > limits.max_entries {
            return Err(AppError::TooManyEntries {
                count: entries.len(),
                limit: limits.max_entries,
            });
        }
    }

    tracing::debug!(
        files = entries.len(),
        total_uncompressed,
        "archive passed inspection"
    );
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_util::zip_of;

    #[test]
    fn counts_files_and_skips_directories() {
        let bytes = zip_of(&[("a.txt", b"hello"), ("dir/b.txt", b"world")]);
        let entries = inspect(&bytes, &Limits::default()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| !e.raw_path.ends_with('/')));
    }

    #[test]
    fn rejects_garbage_buffer() {
        assert!(matches!(
            inspect(b"definitely not a zip", &Limits::default()),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn rejects_total_size_over_cap() {
        let big = vec![0u8; 64 * 1024];
        let bytes = zip_of(&[("a.bin", &big), ("b.bin", &big)]);
        let limits = Limits {
            max_uncompressed_bytes: 100 * 1024,
            // Zeros compress absurdly well; only the size cap is under test.
            max_compression_ratio: 1e9,
            ..Limits::default()
        };
        assert!(matches!(
            inspect(&bytes, &limits),
            Err(AppError::ArchiveTooLarge { .. })
        ));
    }

    #[test]
    fn rejects_high_compression_ratio() {
        let zeros = vec![0u8; 2 * 1024 * 1024];
        let bytes = zip_of(&[("bomb.bin", &zeros)]);
        let err = inspect(&bytes, &Limits::default()).unwrap_err();
        assert!(matches!(err, AppError::ArchiveBomb { .. }), "got {err:?}");
    }

    #[test]
    fn rejects_entry_count_over_cap() {
        let files: Vec<(String, Vec<u8>)> = (0..12)
            .map(|i| (format!("f{i}.txt"), b"x".to_vec()))
            .collect();
        let refs: Vec<(&str, &[u8])> = files
            .iter()
            .map(|(n, d)| (n.as_str(), d.as_slice()))
            .collect();
        let bytes = zip_of(&refs);
        let limits = Limits {
            max_entries: 10,
            ..Limits::default()
        };
        assert!(matches!(
            inspect(&bytes, &limits),
            Err(AppError::TooManyEntries { .. })
        ));
    }

    #[test]
    fn empty_stored_entry_is_not_a_bomb() {
        let bytes = zip_of(&[("empty.txt", b"")]);
        let entries = inspect(&bytes, &Limits::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].uncompressed_size, 0);
    }
}
