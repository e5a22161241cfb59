//! Media resolution
//!
//! There is no server-side index of which events have media, so the client
//! probes the product bucket with candidate file extensions until one
//! `<event-id>.<ext>` object exists. Results (including "nothing found")
//! are cached for the session and never re-probed. Probe failures are
//! silent: a failed request just means "not found for this extension".

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, trace};
use url::Url;

use crate::backend::normalize_base_url;
use crate::config::ClientConfig;

/// Candidate extensions in priority order: video first, then image.
pub const CANDIDATE_EXTENSIONS: [&str; 4] = ["mov", "mp4", "webm", "jpg"];

/// Extensions classified as images; everything else is video.
const IMAGE_EXTENSIONS: [&str; 1] = ["jpg"];

/// Storage probes are cheap existence checks; keep them short.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Signed URLs only need to outlive the probe and the player fetch.
const SIGNED_URL_EXPIRY_SECS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// A located media object for an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEntry {
    pub url: String,
    pub kind: MediaKind,
}

/// Cache lookup outcome for one event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaLookup {
    /// Never probed (or probe still in flight).
    Unresolved,
    /// Probed every candidate; nothing exists. Never re-probed.
    NotFound,
    Found(MediaEntry),
}

/// Existence probing against the object storage endpoint. Seam for tests;
/// the production implementation is [`HttpStorage`].
pub trait ObjectStore: Send + Sync {
    /// Probe one object key; returns a servable URL when the object exists.
    fn locate(&self, key: &str) -> impl Future<Output = Option<String>> + Send;
}

/// Per-session media resolver: at most one probe sequence per distinct
/// event id, with a currently-resolving set preventing duplicate concurrent
/// probes.
pub struct MediaResolver<S: ObjectStore> {
    store: S,
    cache: Mutex<HashMap<String, Option<MediaEntry>>>,
    in_flight: Mutex<HashSet<String>>,
}

impl<S: ObjectStore> MediaResolver<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Current cache state without triggering a probe. Past-alert history
    /// rows call [`MediaResolver::resolve`] only when expanded; until then
    /// they stay `Unresolved`.
    pub fn lookup(&self, event_id: &str) -> MediaLookup {
        match self.cache.lock() {
            Ok(cache) => match cache.get(event_id) {
                Some(Some(entry)) => MediaLookup::Found(entry.clone()),
                Some(None) => MediaLookup::NotFound,
                None => MediaLookup::Unresolved,
            },
            Err(_) => MediaLookup::Unresolved,
        }
    }

    /// True when no probe has run or been started for this event id.
    pub fn needs_resolution(&self, event_id: &str) -> bool {
        let cached = self
            .cache
            .lock()
            .map(|cache| cache.contains_key(event_id))
            .unwrap_or(true);
        if cached {
            return false;
        }
        self.in_flight
            .lock()
            .map(|in_flight| !in_flight.contains(event_id))
            .unwrap_or(false)
    }

    /// Resolve media for an event id, probing candidates at most once per
    /// session. Returns the cached result on later calls. If another probe
    /// for the same id is already running, returns None and leaves the
    /// cache to that probe.
    pub async fn resolve(&self, event_id: &str) -> Option<MediaEntry> {
        match self.lookup(event_id) {
            MediaLookup::Found(entry) => return Some(entry),
            MediaLookup::NotFound => return None,
            MediaLookup::Unresolved => {}
        }

        match self.in_flight.lock() {
            Ok(mut in_flight) => {
                if !in_flight.insert(event_id.to_string()) {
                    trace!("media: probe already in flight for event {}", event_id);
                    return None;
                }
            }
            Err(_) => return None,
        }

        let resolved = self.probe_candidates(event_id).await;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(event_id.to_string(), resolved.clone());
        }
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(event_id);
        }

        resolved
    }

    async fn probe_candidates(&self, event_id: &str) -> Option<MediaEntry> {
        for ext in CANDIDATE_EXTENSIONS {
            let key = format!("{}.{}", event_id, ext);
            if let Some(url) = self.store.locate(&key).await {
                debug!("media: event {} resolved to {}", event_id, key);
                return Some(MediaEntry {
                    url,
                    kind: classify_extension(ext),
                });
            }
        }
        debug!("media: no object found for event {}", event_id);
        None
    }
}

fn classify_extension(ext: &str) -> MediaKind {
    if IMAGE_EXTENSIONS.contains(&ext) {
        MediaKind::Image
    } else {
        MediaKind::Video
    }
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// HTTP storage client: public URL construction, HEAD-then-ranged-GET
/// existence probes, and optional signed-URL fallback. Talks directly to
/// the storage endpoint, not through the data backend.
pub struct HttpStorage {
    http: reqwest::Client,
    base_url: Url,
    bucket: String,
    signed_url_fallback: bool,
}

impl HttpStorage {
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let base_url = normalize_base_url(&config.backend_url)?;

        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(bearer) =
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.api_key))
        {
            headers.insert(reqwest::header::AUTHORIZATION, bearer);
        }

        let http = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url,
            bucket: config.bucket.clone(),
            signed_url_fallback: config.signed_url_fallback,
        })
    }

    fn public_url(&self, key: &str) -> Option<String> {
        self.base_url
            .join(&format!("storage/v1/object/public/{}/{}", self.bucket, key))
            .map(String::from)
            .ok()
    }

    /// HEAD first; some storage backends reject HEAD, so fall back to a
    /// one-byte ranged GET before declaring the object missing.
    async fn object_exists(&self, url: &str) -> bool {
        match self.http.head(url).send().await {
            Ok(response) if response.status().is_success() => return true,
            Ok(response) => {
                trace!("media: HEAD {} -> {}", url, response.status());
            }
            Err(e) => {
                trace!("media: HEAD {} failed: {}", url, e);
            }
        }

        match self
            .http
            .get(url)
            .header(reqwest::header::RANGE, "bytes=0-0")
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                trace!("media: ranged GET {} failed: {}", url, e);
                false
            }
        }
    }

    /// Ask storage for a time-limited signed URL for a key. Any failure is
    /// treated as "no signed URL".
    async fn signed_url(&self, key: &str) -> Option<String> {
        let url = self
            .base_url
            .join(&format!("storage/v1/object/sign/{}/{}", self.bucket, key))
            .ok()?;
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "expiresIn": SIGNED_URL_EXPIRY_SECS }))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: SignedUrlResponse = response.json().await.ok()?;
        // The response carries a path relative to the storage API root.
        self.base_url
            .join(&format!("storage/v1{}", body.signed_url))
            .map(String::from)
            .ok()
    }
}

impl ObjectStore for HttpStorage {
    fn locate(&self, key: &str) -> impl Future<Output = Option<String>> + Send {
        async move {
            if let Some(public) = self.public_url(key) {
                if self.object_exists(&public).await {
                    return Some(public);
                }
            }
            if self.signed_url_fallback {
                if let Some(signed) = self.signed_url(key).await {
                    if self.object_exists(&signed).await {
                        return Some(signed);
                    }
                }
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Scripted store: a fixed set of existing keys plus a probe counter.
    struct MockStore {
        existing: HashSet<String>,
        probes: AtomicUsize,
    }

    impl MockStore {
        fn with_keys(keys: &[&str]) -> Self {
            Self {
                existing: keys.iter().map(|k| k.to_string()).collect(),
                probes: AtomicUsize::new(0),
            }
        }
    }

    impl ObjectStore for MockStore {
        fn locate(&self, key: &str) -> impl Future<Output = Option<String>> + Send {
            self.probes.fetch_add(1, Ordering::SeqCst);
            let found = self.existing.contains(key);
            let url = format!("https://storage.example.com/{}", key);
            async move {
                if found {
                    Some(url)
                } else {
                    None
                }
            }
        }
    }

    #[tokio::test]
    async fn test_video_extension_wins_over_image() {
        let resolver = MediaResolver::new(MockStore::with_keys(&["7.mp4", "7.jpg"]));
        let entry = resolver.resolve("7").await.unwrap();
        assert!(entry.url.ends_with("7.mp4"));
        assert_eq!(entry.kind, MediaKind::Video);
    }

    #[tokio::test]
    async fn test_jpg_classified_as_image() {
        let resolver = MediaResolver::new(MockStore::with_keys(&["9.jpg"]));
        let entry = resolver.resolve("9").await.unwrap();
        assert_eq!(entry.kind, MediaKind::Image);
        assert!(entry.url.ends_with("9.jpg"));
    }

    #[tokio::test]
    async fn test_nothing_found_caches_null_and_never_reprobes() {
        let resolver = MediaResolver::new(MockStore::with_keys(&[]));

        assert!(resolver.resolve("42").await.is_none());
        assert_eq!(resolver.lookup("42"), MediaLookup::NotFound);
        // All four candidates probed exactly once.
        assert_eq!(resolver.store.probes.load(Ordering::SeqCst), 4);

        assert!(resolver.resolve("42").await.is_none());
        assert_eq!(resolver.store.probes.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_found_entry_is_cached() {
        let resolver = MediaResolver::new(MockStore::with_keys(&["5.webm"]));

        let first = resolver.resolve("5").await.unwrap();
        let probes_after_first = resolver.store.probes.load(Ordering::SeqCst);
        assert_eq!(probes_after_first, 3); // mov, mp4, webm

        let second = resolver.resolve("5").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(resolver.store.probes.load(Ordering::SeqCst), probes_after_first);
        assert!(matches!(resolver.lookup("5"), MediaLookup::Found(_)));
    }

    #[tokio::test]
    async fn test_needs_resolution_transitions() {
        let resolver = MediaResolver::new(MockStore::with_keys(&[]));
        assert!(resolver.needs_resolution("11"));
        resolver.resolve("11").await;
        assert!(!resolver.needs_resolution("11"));
    }

    #[test]
    fn test_candidate_order_is_video_before_image() {
        assert_eq!(CANDIDATE_EXTENSIONS, ["mov", "mp4", "webm", "jpg"]);
    }

    /// Store whose first probe parks on a gate so a resolve can be held
    /// mid-flight; later probes return immediately.
    struct GatedStore {
        gate: Arc<Notify>,
        probes: AtomicUsize,
    }

    impl ObjectStore for GatedStore {
        fn locate(&self, _key: &str) -> impl Future<Output = Option<String>> + Send {
            let first = self.probes.fetch_add(1, Ordering::SeqCst) == 0;
            let gate = Arc::clone(&self.gate);
            async move {
                if first {
                    gate.notified().await;
                }
                None
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_resolve_for_same_id_defers_to_first() {
        let resolver = Arc::new(MediaResolver::new(GatedStore {
            gate: Arc::new(Notify::new()),
            probes: AtomicUsize::new(0),
        }));
        let gate = Arc::clone(&resolver.store.gate);

        let first = tokio::spawn({
            let resolver = Arc::clone(&resolver);
            async move { resolver.resolve("7").await }
        });

        // Wait until the first resolve holds the in-flight slot.
        while resolver.needs_resolution("7") {
            tokio::task::yield_now().await;
        }
        assert_eq!(resolver.store.probes.load(Ordering::SeqCst), 1);

        // A second resolve for the same id yields to the one in flight:
        // no result, no extra probes, cache untouched.
        assert!(resolver.resolve("7").await.is_none());
        assert_eq!(resolver.store.probes.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.lookup("7"), MediaLookup::Unresolved);

        gate.notify_one();
        assert!(first.await.unwrap().is_none());
        assert_eq!(resolver.lookup("7"), MediaLookup::NotFound);
        assert_eq!(resolver.store.probes.load(Ordering::SeqCst), 4);
    }
}
