//! Shared fixtures for the pipeline integration tests.
//!
//! The upstream API and the converter service are simulated with wiremock.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use url::Url;
use wiremock::{Request, Respond, ResponseTemplate};

use revision_harvester::models::{Config, RevisionContent, RevisionMeta};
use revision_harvester::services::{Cleaner, ConverterPool, RateLimitedFetcher, WikiApi};
use revision_harvester::storage::DumpStorage;

pub const API_PATH: &str = "/w/api.php";

/// Config pointing at a mock API with a negligible request interval.
pub fn config(api_uri: &str, dump_dir: &Path) -> Config {
    let mut config = Config::default();
    config.api.root_url = format!("{api_uri}{API_PATH}");
    config.scraper.title = "Test article".to_string();
    config.scraper.requests_per_second = 1000;
    config.paths.dump_dir = dump_dir.to_path_buf();
    config
}

pub fn fetcher(config: &Config) -> Arc<RateLimitedFetcher> {
    Arc::new(RateLimitedFetcher::new(
        reqwest::Client::new(),
        config.scraper.min_request_interval(),
    ))
}

pub fn api(config: &Config) -> WikiApi {
    WikiApi::from_config(&config.api).unwrap()
}

/// One revision per hour, starting 2003-01-01.
pub fn timestamp(slot: u64) -> String {
    format!(
        "2003-{:02}-{:02}T{:02}:00:00Z",
        1 + slot / (28 * 24),
        1 + (slot / 24) % 28,
        slot % 24
    )
}

pub fn meta_json(rev_id: u64, user_id: u64, slot: u64) -> Value {
    json!({
        "revid": rev_id,
        "parentid": rev_id.saturating_sub(1),
        "timestamp": timestamp(slot),
        "size": 100,
        "user": format!("User{user_id}"),
        "userid": user_id,
        "comment": format!("edit {rev_id}")
    })
}

pub fn content_json(rev_id: u64, slot: u64, text: &str) -> Value {
    json!({
        "revid": rev_id,
        "parentid": rev_id.saturating_sub(1),
        "timestamp": timestamp(slot),
        "slots": {"main": {
            "contentmodel": "wikitext",
            "contentformat": "text/x-wiki",
            "content": text
        }},
        "user": "someone",
        "comment": ""
    })
}

/// One revision of a seeded document.
pub struct Seed {
    pub rev_id: u64,
    pub user_id: u64,
    pub text: &'static str,
}

/// Write an index file and raw content for the given revisions, in order.
pub async fn seed_document(storage: &DumpStorage, revisions: &[Seed]) {
    storage.ensure_layout().await.unwrap();
    let mut writer = storage.index_writer().await.unwrap();
    for (slot, seed) in revisions.iter().enumerate() {
        let meta: RevisionMeta =
            serde_json::from_value(meta_json(seed.rev_id, seed.user_id, slot as u64)).unwrap();
        writer.append(&meta).await.unwrap();

        let raw: RevisionContent =
            serde_json::from_value(content_json(seed.rev_id, slot as u64, seed.text)).unwrap();
        storage.write_raw(&raw).await.unwrap();
    }
    writer.finish().await.unwrap();
}

pub fn cleaner(storage: &DumpStorage, endpoints: Vec<String>) -> (Cleaner, Arc<ConverterPool>) {
    let urls = endpoints.iter().map(|e| Url::parse(e).unwrap()).collect();
    let pool = Arc::new(ConverterPool::from_endpoints(urls).unwrap());
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap();
    (
        Cleaner::new(storage.clone(), Arc::clone(&pool), client),
        pool,
    )
}

pub fn query(request: &Request, key: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Ids listed in a request's pipe-joined parameter.
pub fn requested_ids(request: &Request, key: &str) -> Vec<u64> {
    query(request, key)
        .map(|list| list.split('|').filter_map(|id| id.parse().ok()).collect())
        .unwrap_or_default()
}

/// Answers `list=users` with one entry per requested id.
pub struct EchoUsers {
    pub groups: HashMap<u64, Vec<&'static str>>,
}

impl Respond for EchoUsers {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let users: Vec<Value> = requested_ids(request, "ususerids")
            .into_iter()
            .map(|id| {
                json!({
                    "userid": id,
                    "name": format!("User{id}"),
                    "editcount": id * 10,
                    "registration": "2002-02-02T00:00:00Z",
                    "groups": self.groups.get(&id).cloned().unwrap_or_default()
                })
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({
            "batchcomplete": true,
            "query": {"users": users}
        }))
    }
}

/// Answers content requests with one revision per requested id.
pub struct EchoContent;

impl Respond for EchoContent {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let revisions: Vec<Value> = requested_ids(request, "revids")
            .into_iter()
            .map(|id| content_json(id, id, &format!("text of revision {id}")))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({
            "batchcomplete": true,
            "query": {"pages": [{"pageid": 77, "title": "Test article", "revisions": revisions}]}
        }))
    }
}

/// Identity converter: returns the submitted text as plain text.
///
/// Texts containing `FAIL` get a server error.
pub struct EchoConverter {
    pub delay: Duration,
}

impl Respond for EchoConverter {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let text = body["text"].as_str().unwrap_or_default().to_string();
        if text.contains("FAIL") {
            return ResponseTemplate::new(500).set_delay(self.delay);
        }
        ResponseTemplate::new(200)
            .set_body_json(json!({"output": text, "base64": false}))
            .set_delay(self.delay)
    }
}
