//! Upstream query API response envelopes.
//!
//! Every response is validated before use: an embedded `error` object or a
//! missing `query` envelope is a fatal payload error for the calling stage.

use serde::{Deserialize, Serialize};

use super::{AuthorData, RevisionContent, RevisionMeta};
use crate::error::{AppError, Result};

/// Error object embedded by the upstream in otherwise successful responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub info: String,
}

/// Continuation block of a paginated response.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Continuation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rvcontinue: Option<String>,
}

/// Title redirect applied while resolving.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Redirect {
    pub from: String,
    pub to: String,
}

/// Page entry of a title resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageInfo {
    #[serde(rename = "pageid", default)]
    pub page_id: u64,
    #[serde(default)]
    pub ns: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub missing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ResolveQuery {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirects: Vec<Redirect>,
    #[serde(default)]
    pub pages: Vec<PageInfo>,
}

/// Response of the title → page id lookup, persisted verbatim as page metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolveResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<ResolveQuery>,
}

impl ResolveResponse {
    /// The single resolved page; fatal when missing or absent.
    pub fn page(&self) -> Result<&PageInfo> {
        const STAGE: &str = "resolve";
        check_error(STAGE, &self.error)?;
        let query = require_query(STAGE, &self.query)?;
        let page = query
            .pages
            .first()
            .ok_or_else(|| AppError::api(STAGE, "no pages in response"))?;
        if page.missing || page.page_id == 0 {
            return Err(AppError::api(
                STAGE,
                format!("page '{}' does not exist", page.title),
            ));
        }
        Ok(page)
    }
}

/// Page carrying a list of revisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevisionsPage<R> {
    #[serde(rename = "pageid", default)]
    pub page_id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default = "Vec::new")]
    pub revisions: Vec<R>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevisionsQuery<R> {
    #[serde(default = "Option::default")]
    pub pages: Option<Vec<RevisionsPage<R>>>,
}

/// Response of a `prop=revisions` query, either an index page or a content batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevisionsResponse<R> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
    #[serde(rename = "continue", default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<Continuation>,
    #[serde(default = "Option::default")]
    pub query: Option<RevisionsQuery<R>>,
}

/// One page of the revision index.
pub type RevisionIndexPage = RevisionsResponse<RevisionMeta>;

/// One content batch.
pub type ContentBatch = RevisionsResponse<RevisionContent>;

impl<R> RevisionsResponse<R> {
    /// Validate the envelope and take all listed revisions, in received order.
    pub fn into_revisions(self, stage: &'static str) -> Result<Vec<R>> {
        check_error(stage, &self.error)?;
        let query = self
            .query
            .ok_or_else(|| AppError::api(stage, "missing query envelope"))?;
        let pages = query
            .pages
            .ok_or_else(|| AppError::api(stage, "missing pages envelope"))?;
        Ok(pages.into_iter().flat_map(|page| page.revisions).collect())
    }

    /// Continuation token for the next request, if any.
    pub fn next_token(&self) -> Option<String> {
        self.continuation
            .as_ref()
            .and_then(|c| c.rvcontinue.clone())
            .filter(|token| !token.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UserQuery {
    #[serde(default)]
    pub users: Option<Vec<AuthorData>>,
}

/// Response of a `list=users` lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserBatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<UserQuery>,
}

impl UserBatch {
    /// Validate the envelope and take the returned authors.
    ///
    /// An empty user list is fatal: correct batching never asks for nothing.
    pub fn into_users(self) -> Result<Vec<AuthorData>> {
        const STAGE: &str = "user_metadata";
        check_error(STAGE, &self.error)?;
        let query = self
            .query
            .ok_or_else(|| AppError::api(STAGE, "missing query envelope"))?;
        let users = query
            .users
            .ok_or_else(|| AppError::api(STAGE, "missing users envelope"))?;
        if users.is_empty() {
            return Err(AppError::api(STAGE, "batch returned zero users"));
        }
        Ok(users)
    }
}

fn check_error(stage: &'static str, error: &Option<ApiErrorBody>) -> Result<()> {
    match error {
        Some(body) => Err(AppError::api(
            stage,
            format!("upstream error {}: {}", body.code, body.info),
        )),
        None => Ok(()),
    }
}

fn require_query<'a, Q>(stage: &'static str, query: &'a Option<Q>) -> Result<&'a Q> {
    query
        .as_ref()
        .ok_or_else(|| AppError::api(stage, "missing query envelope"))
}
