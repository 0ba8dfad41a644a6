//! Asynchronous asset loads.
//!
//! Fetch and decode run without borrowing the engine. The engine issues an
//! [`AssetLoad`] stamped with a generation; the host awaits it and hands the
//! [`LoadedAsset`] back. Results from a superseded generation are dropped.

use std::sync::Arc;

use log::{debug, info};

use crate::dsp::buffer::AudioBuffer;
use crate::error::Result;
use crate::media::{AudioDecoder, MediaFetcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Track,
    Ambience,
}

/// A pending fetch and decode.
pub struct AssetLoad {
    kind: AssetKind,
    url: String,
    generation: u64,
    fetcher: Arc<dyn MediaFetcher>,
    decoder: Arc<dyn AudioDecoder>,
}

/// The outcome of an [`AssetLoad`], ready to install.
#[derive(Debug)]
pub struct LoadedAsset {
    pub kind: AssetKind,
    pub url: String,
    pub generation: u64,
    pub result: Result<AudioBuffer>,
}

impl AssetLoad {
    pub(crate) fn new(
        kind: AssetKind,
        url: impl Into<String>,
        generation: u64,
        fetcher: Arc<dyn MediaFetcher>,
        decoder: Arc<dyn AudioDecoder>,
    ) -> Self {
        AssetLoad {
            kind,
            url: url.into(),
            generation,
            fetcher,
            decoder,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub async fn run(self) -> LoadedAsset {
        debug!("load: fetching {:?} from {}", self.kind, self.url);
        let result = self.fetch_and_decode().await;
        if let Ok(buffer) = &result {
            info!(
                "load: decoded {:?} ({} ch, {} Hz, {:.1}s)",
                self.kind,
                buffer.number_of_channels(),
                buffer.sample_rate(),
                buffer.duration()
            );
        }
        LoadedAsset {
            kind: self.kind,
            url: self.url,
            generation: self.generation,
            result,
        }
    }

    async fn fetch_and_decode(&self) -> Result<AudioBuffer> {
        let bytes = self.fetcher.fetch(&self.url).await?;
        Ok(self.decoder.decode(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::buffer::PcmDecoder;
    use crate::dsp::renderer::encode_wav;
    use crate::error::{EngineError, FetchError};
    use crate::media::MemoryFetcher;

    #[tokio::test]
    async fn fetches_and_decodes() {
        let buf = AudioBuffer::new(vec![vec![0.25; 400], vec![-0.25; 400]], 8000);
        let fetcher = MemoryFetcher::new().with("/a.wav", encode_wav(&buf).unwrap());
        let load = AssetLoad::new(
            AssetKind::Track,
            "/a.wav",
            3,
            Arc::new(fetcher),
            Arc::new(PcmDecoder),
        );
        let loaded = load.run().await;
        assert_eq!(loaded.generation, 3);
        let decoded = loaded.result.unwrap();
        assert_eq!(decoded.frames(), 400);
        assert_eq!(decoded.number_of_channels(), 2);
    }

    #[tokio::test]
    async fn missing_asset_is_a_fetch_error() {
        let load = AssetLoad::new(
            AssetKind::Ambience,
            "/rain.mp3",
            1,
            Arc::new(MemoryFetcher::new()),
            Arc::new(PcmDecoder),
        );
        let loaded = load.run().await;
        assert!(matches!(
            loaded.result,
            Err(EngineError::Fetch(FetchError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn garbage_is_a_decode_error() {
        let fetcher = MemoryFetcher::new().with("/x", b"not audio at all".to_vec());
        let load = AssetLoad::new(
            AssetKind::Track,
            "/x",
            1,
            Arc::new(fetcher),
            Arc::new(PcmDecoder),
        );
        assert!(matches!(load.run().await.result, Err(EngineError::Decode(_))));
    }
}
