//! Single-tile fetching.
//!
//! A fetch never leaves a file under a tile's final name unless the whole
//! body arrived: bodies stream into `<x>_<y>.<ext>.part` and are renamed on
//! success. Network trouble and non-2xx replies are outcomes, not errors;
//! only local storage failures surface as `Err`.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use map_common::{GeoPoint, Layer, MapConfig, MapError, MapResult, TileCoord};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use storage::TileStore;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use crate::mirrors::MirrorPool;

/// Result of one fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadOutcome {
    /// Downloaded and stored
    Fetched,
    /// Already in the store; no request was made
    AlreadyCached,
    /// Connection-level failure (DNS, connect, timeout, reset)
    NetworkFailure,
    /// Non-success HTTP status
    ServerRejected,
}

impl DownloadOutcome {
    /// Whether the attempt transferred a tile over the network.
    pub fn is_transfer(&self) -> bool {
        matches!(self, DownloadOutcome::Fetched)
    }

    /// Status glyph used in per-tile log lines.
    pub fn glyph(&self) -> char {
        match self {
            DownloadOutcome::Fetched => '+',
            DownloadOutcome::AlreadyCached => 'e',
            DownloadOutcome::NetworkFailure | DownloadOutcome::ServerRejected => '!',
        }
    }
}

/// Referer for tile requests: the configured viewport on the service's
/// web map.
pub fn build_referer(
    domain: &str,
    corner1: &GeoPoint,
    corner2: &GeoPoint,
    zoom: u32,
    layer: Layer,
) -> String {
    let center = GeoPoint::center(corner1, corner2);
    let (dlon, dlat) = GeoPoint::span(corner1, corner2);
    format!(
        "http://{}/?ll={:.6},{:.6}&spn={:.6},{:.6}&z={}&l={}",
        domain,
        center.lon,
        center.lat,
        dlon,
        dlat,
        zoom,
        layer.name()
    )
}

fn header_value(key: &str, value: &str) -> MapResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| MapError::invalid(key, e.to_string()))
}

/// Browser-like request headers.
fn browser_headers(config: &MapConfig, referer: &str) -> MapResult<HeaderMap> {
    let fetch = &config.fetch;
    let mut headers = HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        header_value("fetch.user_agent", &fetch.user_agent)?,
    );
    headers.insert(header::ACCEPT, header_value("fetch.accept", &fetch.accept)?);
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header_value("fetch.accept_language", &fetch.accept_language)?,
    );
    headers.insert(
        header::ACCEPT_ENCODING,
        header_value("fetch.accept_encoding", &fetch.accept_encoding)?,
    );
    headers.insert(
        header::ACCEPT_CHARSET,
        header_value("fetch.accept_charset", &fetch.accept_charset)?,
    );
    headers.insert(header::REFERER, header_value("service.domain", referer)?);
    Ok(headers)
}

/// Fetches tiles of one layer into one store.
pub struct TileFetcher {
    client: Client,
    store: Arc<TileStore>,
    mirrors: MirrorPool,
    layer: Layer,
    version: String,
    language: String,
    headers: HeaderMap,
}

impl TileFetcher {
    pub fn new(
        config: &MapConfig,
        layer: Layer,
        store: Arc<TileStore>,
        mirrors: MirrorPool,
    ) -> MapResult<Self> {
        let version = config.version_for(layer)?.to_string();
        let referer = build_referer(
            &config.service.domain,
            &config.region.corner1,
            &config.region.corner2,
            config.max_zoom(),
            layer,
        );
        let headers = browser_headers(config, &referer)?;

        let client = Client::builder()
            .timeout(config.fetch.request_timeout())
            .connect_timeout(config.fetch.connect_timeout())
            .pool_max_idle_per_host(config.fetch.concurrency)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| MapError::invalid("fetch", format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            store,
            mirrors,
            layer,
            version,
            language: config.service.language.clone(),
            headers,
        })
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn store(&self) -> &Arc<TileStore> {
        &self.store
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Tile URL on `mirror`.
    pub fn tile_url(&self, mirror: &str, coord: &TileCoord) -> String {
        format!(
            "http://{}/tiles?l={}&v={}&x={}&y={}&z={}&lang={}",
            mirror,
            self.layer.wire_code(),
            self.version,
            coord.x,
            coord.y,
            coord.zoom,
            self.language
        )
    }

    /// Fetch one tile unless it is already stored.
    ///
    /// Concurrent calls for the same coordinate are serialized, so the
    /// second caller sees the first caller's file and reports it cached.
    #[instrument(skip(self), fields(layer = %self.layer))]
    pub async fn fetch(&self, coord: TileCoord) -> MapResult<DownloadOutcome> {
        let _guard = self.store.lock(coord).await;

        let target = self.store.tile_path(&coord, self.layer.extension());
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            debug!(path = %target.display(), "Tile already cached");
            return Ok(DownloadOutcome::AlreadyCached);
        }

        self.store.ensure_zoom_dir(coord.zoom)?;

        let url = self.tile_url(self.mirrors.pick(), &coord);
        let response = match self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Tile request failed");
                return Ok(DownloadOutcome::NetworkFailure);
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "Tile request rejected");
            return Ok(DownloadOutcome::ServerRejected);
        }

        let partial = self.store.partial_path(&coord, self.layer.extension());
        match stream_to_file(response, &partial).await {
            Ok(bytes) => {
                self.store.commit(&partial, &target).await?;
                debug!(path = %target.display(), bytes, "Tile stored");
                Ok(DownloadOutcome::Fetched)
            }
            Err(StreamError::Body(e)) => {
                warn!(url = %url, error = %e, "Tile body interrupted");
                self.store.discard(&partial).await;
                Ok(DownloadOutcome::NetworkFailure)
            }
            Err(StreamError::Write(e)) => {
                self.store.discard(&partial).await;
                Err(MapError::storage(&partial, e))
            }
        }
    }
}

enum StreamError {
    Body(reqwest::Error),
    Write(std::io::Error),
}

/// Stream a response body into `path`, returning the byte count.
async fn stream_to_file(response: Response, path: &Path) -> Result<u64, StreamError> {
    let mut file = File::create(path).await.map_err(StreamError::Write)?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(StreamError::Body)?;
        file.write_all(&chunk).await.map_err(StreamError::Write)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(StreamError::Write)?;
    file.sync_all().await.map_err(StreamError::Write)?;
    Ok(written)
}
