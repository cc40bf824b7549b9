use std::{io::Read as _, path::Path, sync::Arc, time::Duration};

use anyhow::Context as _;

use crate::{
    assets::decode::{Resample, decode_cover},
    foundation::{
        core::PixelGrid,
        error::{CoverError, CoverResult},
    },
};

const MAX_ARTWORK_BYTES: u64 = 16 * 1024 * 1024;

/// Turns an artwork reference (URL or local path) into raw image bytes.
pub trait ArtworkFetcher: Send + Sync {
    fn fetch(&self, reference: &str) -> CoverResult<Vec<u8>>;
}

/// Fetches `http(s)://` references over HTTP and everything else from the local filesystem.
pub struct HttpFetcher {
    agent: ureq::Agent,
    bearer_token: Option<String>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, bearer_token: Option<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            bearer_token: bearer_token.filter(|t| !t.is_empty()),
        }
    }

    fn fetch_http(&self, url: &str) -> CoverResult<Vec<u8>> {
        let mut req = self.agent.get(url);
        if let Some(token) = &self.bearer_token {
            req = req.set("Authorization", &format!("Bearer {token}"));
        }
        let resp = req.call().map_err(|e| match e {
            ureq::Error::Status(code, _) => {
                CoverError::fetch(format!("GET {url} returned status {code}"))
            }
            other => CoverError::fetch(format!("GET {url} failed: {other}")),
        })?;

        let mut bytes = Vec::new();
        resp.into_reader()
            .take(MAX_ARTWORK_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| CoverError::fetch(format!("reading body of {url}: {e}")))?;
        if bytes.is_empty() {
            return Err(CoverError::fetch(format!("GET {url} returned an empty body")));
        }
        Ok(bytes)
    }
}

impl ArtworkFetcher for HttpFetcher {
    fn fetch(&self, reference: &str) -> CoverResult<Vec<u8>> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return self.fetch_http(reference);
        }
        let path = reference.strip_prefix("file://").unwrap_or(reference);
        let bytes = std::fs::read(Path::new(path))
            .with_context(|| format!("read artwork '{path}'"))?;
        Ok(bytes)
    }
}

/// Fetch + decode to the display's native resolution.
#[derive(Clone)]
pub struct ArtworkLoader {
    fetcher: Arc<dyn ArtworkFetcher>,
    width: u32,
    height: u32,
    resample: Resample,
}

impl ArtworkLoader {
    pub fn new(fetcher: Arc<dyn ArtworkFetcher>, width: u32, height: u32, resample: Resample) -> Self {
        Self {
            fetcher,
            width,
            height,
            resample,
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self, reference: &str) -> CoverResult<PixelGrid> {
        let bytes = self.fetcher.fetch(reference)?;
        decode_cover(&bytes, self.width, self.height, self.resample)
            .map_err(|e| CoverError::decode(format!("'{reference}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, path::PathBuf};

    use super::*;
    use crate::foundation::core::Rgb8;

    #[test]
    fn local_paths_and_file_urls_are_read_from_disk() {
        let dir = PathBuf::from("target").join("fetch_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cover.png");

        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        std::fs::write(&path, &buf).unwrap();

        let fetcher = HttpFetcher::new(Duration::from_secs(1), None);
        let as_path = path.to_string_lossy().to_string();
        assert_eq!(fetcher.fetch(&as_path).unwrap(), buf);
        assert_eq!(fetcher.fetch(&format!("file://{as_path}")).unwrap(), buf);

        let loader = ArtworkLoader::new(Arc::new(fetcher), 4, 4, Resample::Nearest);
        let grid = loader.load(&as_path).unwrap();
        assert!(grid.pixels().iter().all(|p| *p == Rgb8::new(1, 2, 3)));
    }

    #[test]
    fn missing_file_is_an_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1), None);
        assert!(fetcher.fetch("target/does/not/exist.png").is_err());
    }

    #[test]
    fn unreachable_host_is_a_fetch_error() {
        let fetcher = HttpFetcher::new(Duration::from_millis(200), Some("t".into()));
        let err = fetcher.fetch("http://127.0.0.1:9/cover.jpg").unwrap_err();
        assert!(matches!(err, CoverError::Fetch(_)));
    }
}
