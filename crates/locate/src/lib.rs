mod consts;
pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
pub use reqwest::Url;
use reqwest::blocking::Client;
use scraper::Html;
use std::time::Duration;
use tracing::instrument;

/// Suffix of the digest file published next to every snapshot.
pub const DIGEST_SUFFIX: &str = ".md5";

/// The newest snapshot published on a remote index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotCandidate {
    /// File name, e.g. `wikipedia-20240301.tar`.
    pub name: String,
    pub data_url: Url,
    pub digest_url: Url,
}
impl SnapshotCandidate {
    /// Builds the candidate for snapshot `name` listed on the index at `index_url`.
    pub fn new(index_url: &str, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let mut base = Url::parse(index_url).or_raise(|| ErrorKind::InvalidUrl(index_url.to_string()))?;
        // Without a trailing slash `join` would replace the last path segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let data_url = base.join(&name).or_raise(|| ErrorKind::InvalidUrl(name.clone()))?;
        let digest = format!("{data_url}{DIGEST_SUFFIX}");
        let digest_url = Url::parse(&digest).or_raise(|| ErrorKind::InvalidUrl(digest.clone()))?;
        Ok(Self { name, data_url, digest_url })
    }
}

/// Anything that can find the newest snapshot on an index.
pub trait Locate {
    fn locate(&self, index_url: &str) -> Result<SnapshotCandidate>;
}

/// Finds snapshots by fetching and scraping an HTML directory index.
#[derive(Debug)]
pub struct SnapshotLocator {
    client: Client,
}
impl SnapshotLocator {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Network("unable to construct HTTP client".to_string()))?;
        Ok(Self { client })
    }

    fn fetch(&self, index_url: &str) -> Result<String> {
        let response = self
            .client
            .get(index_url)
            .send()
            .and_then(|response| response.error_for_status())
            .or_raise(|| ErrorKind::Network(index_url.to_string()))?;
        response.text().or_raise(|| ErrorKind::Network(index_url.to_string()))
    }
}
impl Locate for SnapshotLocator {
    #[instrument(skip(self))]
    fn locate(&self, index_url: &str) -> Result<SnapshotCandidate> {
        let html = self.fetch(index_url)?;
        let Some(name) = select_newest(&html) else {
            exn::bail!(ErrorKind::NotFound(index_url.to_string()));
        };
        tracing::info!(snapshot = %name, "Located newest snapshot");
        SnapshotCandidate::new(index_url, name)
    }
}

/// Returns the name of the newest snapshot linked from an index page.
///
/// # Examples
///
/// ```rust
/// use wikimirror_locate::select_newest;
/// let html = r#"
///     <a href="wikipedia-20240201.tar">wikipedia-20240201.tar</a>
///     <a href="wikipedia-20240301.tar">wikipedia-20240301.tar</a>
///     <a href="wikipedia-20240301.tar.md5">wikipedia-20240301.tar.md5</a>
/// "#;
///
/// assert_eq!(select_newest(html).as_deref(), Some("wikipedia-20240301.tar"));
/// ```
pub fn select_newest(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&consts::LINK_SELECTOR)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(link_name)
        .filter(|name| consts::SNAPSHOT_NAME_REGEX.is_match(name))
        .max()
        .map(str::to_string)
}

/// Final path segment of a link, without query or fragment.
fn link_name(href: &str) -> Option<&str> {
    let path = href.split(['?', '#']).next()?;
    path.rsplit('/').next().filter(|name| !name.is_empty())
}
