//! Streaming downloads that never leave a truncated file at the destination.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Result;

/// Copy `reader` into `dest` via `<dest>.part`, fsync, then rename into place.
///
/// On any error the partial file is removed and `dest` is left untouched. Returns the number
/// of bytes written.
pub fn write_atomically<R: Read>(mut reader: R, dest: &Path) -> Result<u64> {
    let tmp_path = part_path(dest);

    let result = (|| -> Result<u64> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(&tmp_path)?;
        let mut buf = [0u8; 64 * 1024];
        let mut written = 0u64;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            written += n as u64;
        }

        file.sync_all()?;
        fs::rename(&tmp_path, dest)?;
        Ok(written)
    })();

    match &result {
        Ok(bytes) => debug!(path = %dest.display(), bytes, "wrote file"),
        Err(_) => {
            let _ = fs::remove_file(&tmp_path);
        }
    }

    result
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(feature = "net")]
pub use http_fetcher::HttpImageFetcher;

#[cfg(feature = "net")]
mod http_fetcher {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use reqwest::blocking::Client;

    use super::write_atomically;
    use crate::sources::ImageFetcher;
    use crate::sources::http::build_client;
    use crate::{Error, Result};

    /// Downloads article images over HTTP.
    pub struct HttpImageFetcher {
        client: Client,
    }

    impl HttpImageFetcher {
        pub fn new(timeout: Duration) -> Result<Self> {
            Ok(Self {
                client: build_client(timeout)?,
            })
        }
    }

    impl ImageFetcher for HttpImageFetcher {
        fn fetch_image(&self, url: &str, dest: &Path) -> Result<PathBuf> {
            let resp = self
                .client
                .get(url)
                .send()?
                .error_for_status()?;

            let bytes = write_atomically(resp, dest)?;
            if bytes == 0 {
                let _ = std::fs::remove_file(dest);
                return Err(Error::fetch(url, "empty response body"));
            }
            Ok(dest.to_path_buf())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    struct FailAfterFirstRead {
        served: bool,
    }

    impl Read for FailAfterFirstRead {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.served {
                return Err(std::io::Error::other("connection reset"));
            }
            self.served = true;
            buf[..3].copy_from_slice(b"abc");
            Ok(3)
        }
    }

    #[test]
    fn writes_then_renames() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("images").join("article_image_0.jpg");

        let bytes = write_atomically(Cursor::new(b"jpegdata".to_vec()), &dest)?;

        assert_eq!(bytes, 8);
        assert_eq!(std::fs::read(&dest)?, b"jpegdata");
        assert!(!part_path(&dest).exists());
        Ok(())
    }

    #[test]
    fn failed_copy_leaves_nothing_behind() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("article_image_1.png");

        let err = write_atomically(FailAfterFirstRead { served: false }, &dest).unwrap_err();

        assert!(err.to_string().contains("connection reset"));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
        Ok(())
    }

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/tmp/voiceover_0.mp3")),
            PathBuf::from("/tmp/voiceover_0.mp3.part")
        );
    }
}
