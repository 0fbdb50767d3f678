//! End-to-end tests of the preprocess pipeline against mock author and
//! converter services.

mod common;

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

use common::{API_PATH, EchoConverter, EchoUsers, Seed, requested_ids};
use revision_harvester::error::AppError;
use revision_harvester::models::{AuthorData, Config, ConfidenceVector, EditType, RevisionAnalysis};
use revision_harvester::pipeline::{PipelineSupervisor, PreprocessPipeline, RevisionSource};
use revision_harvester::storage::DumpStorage;

struct Harness {
    _tmp: TempDir,
    api: MockServer,
    converter: MockServer,
    config: Config,
    storage: DumpStorage,
}

impl Harness {
    async fn new(groups: HashMap<u64, Vec<&'static str>>, delay: Duration) -> Self {
        let api = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(API_PATH))
            .and(query_param("list", "users"))
            .respond_with(EchoUsers { groups })
            .mount(&api)
            .await;

        let converter = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(EchoConverter { delay })
            .mount(&converter)
            .await;

        let tmp = TempDir::new().unwrap();
        let config = common::config(&api.uri(), tmp.path());
        let storage = DumpStorage::new(config.document_dir());
        Self {
            _tmp: tmp,
            api,
            converter,
            config,
            storage,
        }
    }

    fn pipeline(&self, endpoints: Vec<String>) -> PreprocessPipeline {
        let (cleaner, _pool) = common::cleaner(&self.storage, endpoints);
        let source = RevisionSource::from_parts(Some(self.storage.index_path()), None).unwrap();
        PreprocessPipeline::new(
            source,
            common::api(&self.config),
            common::fetcher(&self.config),
            self.storage.clone(),
            cleaner,
            self.config.preprocess.clone(),
        )
    }

    async fn run(&self) -> (PipelineSupervisor, Vec<RevisionAnalysis>) {
        let mut supervisor = PipelineSupervisor::new();
        supervisor.run(self.pipeline(vec![self.converter.uri()]));
        supervisor.wait().await.unwrap();
        let records = self.storage.read_analysis().await.unwrap().unwrap();
        (supervisor, records)
    }

    async fn user_requests(&self) -> Vec<Vec<u64>> {
        self.api
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| requested_ids(r, "ususerids"))
            .collect()
    }
}

#[tokio::test]
async fn test_single_untagged_revision_is_fully_inserted() {
    let harness = Harness::new(HashMap::new(), Duration::ZERO).await;
    common::seed_document(
        &harness.storage,
        &[Seed {
            rev_id: 100,
            user_id: 12,
            text: "Machine learning is a field of study",
        }],
    )
    .await;

    let (supervisor, records) = harness.run().await;

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.process.meta.rev_id, 100);
    assert_eq!(record.process.user.user_id, 12);
    assert_eq!(record.confidence, ConfidenceVector::default());
    assert_eq!(record.diffs.inserted, 7);
    assert_eq!(record.diffs.deleted, 0);
    assert_eq!(record.diffs.unchanged, 0);
    // change = 1 and balance = 1 fall through to the mixed rule
    assert_eq!(record.diffs.type_of_edit, Some(EditType::Mixed));
    assert!(record.debug.errors.is_empty());

    let clean = harness
        .storage
        .read_clean(&record.process.meta.storage_name())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(clean.content_format, "plaintext");

    let metrics = supervisor.metrics();
    assert_eq!(metrics.revisions_processed, 1);
    assert_eq!(metrics.revisions_cleaned, 1);
    assert_eq!(metrics.users_fetched, 1);
}

#[tokio::test]
async fn test_bot_author_saturates_automation() {
    let harness = Harness::new(HashMap::from([(3, vec!["bot"])]), Duration::ZERO).await;
    common::seed_document(
        &harness.storage,
        &[Seed {
            rev_id: 1,
            user_id: 3,
            text: "fix links",
        }],
    )
    .await;

    let (_, records) = harness.run().await;

    assert_eq!(
        records[0].confidence,
        ConfidenceVector {
            automation: 100,
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn test_sixty_missing_authors_take_two_requests() {
    let harness = Harness::new(HashMap::new(), Duration::ZERO).await;
    let seeds: Vec<Seed> = (1..=60)
        .map(|i| Seed {
            rev_id: 1000 + i,
            user_id: i,
            text: "same words every time",
        })
        .collect();
    common::seed_document(&harness.storage, &seeds).await;

    let (_, records) = harness.run().await;

    let requests = harness.user_requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].len(), 49);
    assert_eq!(requests[1].len(), 11);
    assert_eq!(requests[0], (1..=49).collect::<Vec<u64>>());

    // Consolidated output follows input order
    let ids: Vec<u64> = records.iter().map(|r| r.rev_id()).collect();
    assert_eq!(ids, (1001..=1060).collect::<Vec<u64>>());
    assert_eq!(records[1].diffs.type_of_edit, Some(EditType::Formatting));

    let cached = harness.storage.load_users().await.unwrap();
    assert_eq!(cached.len(), 60);
}

#[tokio::test]
async fn test_misses_are_joined_once_and_cached_authors_skipped() {
    let harness = Harness::new(HashMap::new(), Duration::ZERO).await;
    harness.storage.ensure_layout().await.unwrap();
    let mut cached = BTreeMap::new();
    cached.insert(
        7,
        serde_json::from_value::<AuthorData>(json!({"userid": 7, "name": "Cached", "groups": ["sysop"]}))
            .unwrap(),
    );
    harness.storage.save_users(&cached).await.unwrap();

    let seeds = [(1, 5), (2, 3), (3, 5), (4, 9), (5, 7), (6, 0)].map(|(rev_id, user_id)| Seed {
        rev_id,
        user_id,
        text: "a b c",
    });
    common::seed_document(&harness.storage, &seeds).await;

    let (supervisor, records) = harness.run().await;

    let requests: Vec<_> = harness
        .api
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| common::query(r, "ususerids").unwrap())
        .collect();
    assert_eq!(requests, vec!["5|3|9".to_string()]);

    assert_eq!(records.len(), 6);
    assert_eq!(records[4].confidence.structural, 80);
    // Anonymous author resolved without a lookup
    assert!(records[5].process.user.groups.contains("*"));
    assert!(records[5].debug.warnings.is_empty());
    assert_eq!(supervisor.metrics().user_cache_hits, 1);
}

#[tokio::test]
async fn test_cleaning_failure_is_recorded_per_revision() {
    let harness = Harness::new(HashMap::new(), Duration::ZERO).await;
    common::seed_document(
        &harness.storage,
        &[
            Seed {
                rev_id: 1,
                user_id: 0,
                text: "one two three",
            },
            Seed {
                rev_id: 2,
                user_id: 0,
                text: "FAIL here",
            },
            Seed {
                rev_id: 3,
                user_id: 0,
                text: "one two three four",
            },
        ],
    )
    .await;

    let (supervisor, records) = harness.run().await;

    assert_eq!(records.len(), 3);
    assert_eq!(records[1].debug.errors.len(), 1);
    assert!(records[1].diffs.type_of_edit.is_none());
    // Diffed against revision 1, skipping the failed one
    assert_eq!(records[2].diffs.inserted, 1);
    assert_eq!(records[2].diffs.unchanged, 3);
    assert_eq!(supervisor.metrics().revisions_failed, 1);
    assert!(harness.user_requests().await.is_empty());
}

#[tokio::test]
async fn test_zero_users_response_is_fatal() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .and(query_param("list", "users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"query": {"users": []}})))
        .mount(&api)
        .await;

    let mut harness = Harness::new(HashMap::new(), Duration::ZERO).await;
    harness.config = common::config(&api.uri(), harness._tmp.path());
    common::seed_document(
        &harness.storage,
        &[Seed {
            rev_id: 1,
            user_id: 44,
            text: "x",
        }],
    )
    .await;

    let mut supervisor = PipelineSupervisor::new();
    supervisor.run(harness.pipeline(vec![harness.converter.uri()]));
    let err = supervisor.wait().await.unwrap_err();

    assert!(matches!(err, AppError::Api { .. }));
    // The cache is still saved on the way out
    assert!(harness.storage.load_users().await.unwrap().is_empty());
    assert!(
        tokio::fs::try_exists(harness.storage.root().join("0users.json"))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_cancellation_lets_in_flight_conversions_finish() {
    let harness = Harness::new(HashMap::new(), Duration::from_millis(500)).await;
    let second = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(EchoConverter {
            delay: Duration::from_millis(500),
        })
        .mount(&second)
        .await;

    let mut config = harness.config.clone();
    config.preprocess.max_concurrent = 2;
    let seeds: Vec<Seed> = (1..=10)
        .map(|i| Seed {
            rev_id: i,
            user_id: 0,
            text: "anonymous edit text",
        })
        .collect();
    common::seed_document(&harness.storage, &seeds).await;

    let (cleaner, pool) = common::cleaner(&harness.storage, vec![harness.converter.uri(), second.uri()]);
    let pipeline = PreprocessPipeline::new(
        RevisionSource::from_parts(Some(harness.storage.index_path()), None).unwrap(),
        common::api(&config),
        common::fetcher(&config),
        harness.storage.clone(),
        cleaner,
        config.preprocess.clone(),
    );

    let mut supervisor = PipelineSupervisor::new();
    supervisor.run(pipeline);
    tokio::time::sleep(Duration::from_millis(150)).await;
    supervisor.stop().await.unwrap();

    let records = harness.storage.read_analysis().await.unwrap().unwrap();
    assert_eq!(records.len(), 2);
    for record in &records {
        assert!(record.debug.errors.is_empty());
        assert!(record.diffs.type_of_edit.is_some());
    }
    assert_eq!(pool.available(), 2);
    assert_eq!(supervisor.metrics().revisions_cleaned, 2);
}
