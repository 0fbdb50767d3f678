//! Query URL construction for the upstream revision API.

use url::Url;

use super::RateLimitedFetcher;
use crate::error::Result;
use crate::models::{ApiConfig, ResolveResponse};
use crate::utils::join_ids;

const INDEX_PROPS: &str = "ids|timestamp|size|user|userid|comment";
const CONTENT_PROPS: &str = "ids|timestamp|content|user|comment";
const USER_PROPS: &str = "groups|editcount|registration";

/// Builds parameterized GET requests against the query endpoint.
#[derive(Debug, Clone)]
pub struct WikiApi {
    root: Url,
}

impl WikiApi {
    pub fn new(root: Url) -> Self {
        Self { root }
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        Ok(Self::new(Url::parse(&config.root_url)?))
    }

    fn query(&self, params: &[(&str, &str)]) -> Url {
        let mut url = self.root.clone();
        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("format", "json")
            .append_pair("formatversion", "2")
            .extend_pairs(params);
        url
    }

    /// Title → page id, following redirects.
    pub fn resolve_url(&self, title: &str) -> Url {
        self.query(&[("titles", title), ("redirects", "1")])
    }

    /// One page of the revision index, metadata only.
    pub fn index_url(&self, page_id: u64, limit: usize, continuation: Option<&str>) -> Url {
        let page_id = page_id.to_string();
        let limit = limit.to_string();
        let mut params = vec![
            ("prop", "revisions"),
            ("pageids", page_id.as_str()),
            ("rvslots", "main"),
            ("rvprop", INDEX_PROPS),
            ("rvlimit", limit.as_str()),
        ];
        if let Some(token) = continuation {
            params.push(("rvcontinue", token));
        }
        self.query(&params)
    }

    /// Full content of a batch of revisions.
    pub fn content_url(&self, rev_ids: &[u64], continuation: Option<&str>) -> Url {
        let ids = join_ids(rev_ids);
        let mut params = vec![
            ("prop", "revisions"),
            ("revids", ids.as_str()),
            ("rvslots", "main"),
            ("rvprop", CONTENT_PROPS),
        ];
        if let Some(token) = continuation {
            params.push(("rvcontinue", token));
        }
        self.query(&params)
    }

    /// Metadata of a batch of authors.
    pub fn users_url(&self, user_ids: &[u64]) -> Url {
        let ids = join_ids(user_ids);
        self.query(&[
            ("list", "users"),
            ("usprop", USER_PROPS),
            ("ususerids", ids.as_str()),
        ])
    }

    /// Resolve a title to its response; the caller validates the page.
    pub async fn resolve_title(
        &self,
        fetcher: &RateLimitedFetcher,
        title: &str,
    ) -> Result<ResolveResponse> {
        let response: ResolveResponse = fetcher.get_json("resolve", self.resolve_url(title)).await?;
        let page = response.page()?;
        log::info!(
            "Resolved '{}' to page {} ('{}')",
            title,
            page.page_id,
            page.title
        );
        Ok(response)
    }
}
