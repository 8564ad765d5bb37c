/// End-to-end removal against an in-memory store with a recording
/// publisher standing in for the channel transport.
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use murmur_db::Database;
use murmur_db::models::NewStatus;
use murmur_removal::{
    BatchedRemoveStatusService, FederationHook, NoopFederation, RemovalError, RemoveStatusService,
    RemovedStatus,
};
use murmur_streaming::Publisher;
use murmur_streaming::testing::{FailingPublisher, RecordingPublisher};
use murmur_types::api::RemoveOptions;
use murmur_types::models::{AccountId, StatusId, Visibility};

#[derive(Default)]
struct RecordingFederation {
    removed: Mutex<Vec<RemovedStatus>>,
}

#[async_trait]
impl FederationHook for RecordingFederation {
    async fn status_removed(&self, status: &RemovedStatus) -> Result<()> {
        self.removed.lock().unwrap().push(status.clone());
        Ok(())
    }
}

struct Fixture {
    db: Arc<Database>,
    publisher: Arc<RecordingPublisher>,
    federation: Arc<RecordingFederation>,
    service: BatchedRemoveStatusService,
}

impl Fixture {
    fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let publisher = Arc::new(RecordingPublisher::new());
        let federation = Arc::new(RecordingFederation::default());
        let service = BatchedRemoveStatusService::new(db.clone(), publisher.clone(), federation.clone());
        Self {
            db,
            publisher,
            federation,
            service,
        }
    }

    fn account(&self, username: &str, domain: Option<&str>) -> AccountId {
        self.db.create_account(username, domain).unwrap()
    }

    fn post(&self, account_id: AccountId, visibility: Visibility, local: bool) -> StatusId {
        self.db
            .insert_status(&NewStatus {
                account_id,
                visibility,
                local,
                reblog_of_id: None,
            })
            .unwrap()
    }

    fn reblog(&self, account_id: AccountId, original: StatusId, local: bool) -> StatusId {
        self.db
            .insert_status(&NewStatus {
                account_id,
                visibility: Visibility::Public,
                local,
                reblog_of_id: Some(original),
            })
            .unwrap()
    }

    fn exists(&self, id: StatusId) -> bool {
        self.db.find_status(id).unwrap().is_some()
    }
}

fn delete_payload(id: StatusId) -> String {
    format!(r#"{{"event":"delete","payload":"{}"}}"#, id)
}

#[tokio::test]
async fn removes_every_status_and_every_reblog() {
    let fx = Fixture::new();
    let alice = fx.account("alice", None);
    let bob = fx.account("bob", None);

    let a = fx.post(alice, Visibility::Public, true);
    let b = fx.post(alice, Visibility::Private, true);
    let a_reblog = fx.reblog(bob, a, true);
    let untouched = fx.post(alice, Visibility::Public, true);

    let report = fx.service.call(&[a, b], RemoveOptions::default()).await.unwrap();

    assert_eq!(report.destroyed, vec![a, a_reblog, b]);
    for id in [a, b, a_reblog] {
        assert!(!fx.exists(id), "status {} should be gone", id);
    }
    assert!(fx.exists(untouched));
}

#[tokio::test]
async fn skip_side_effects_destroys_without_publishing() {
    let fx = Fixture::new();
    let alice = fx.account("alice", None);
    let a = fx.post(alice, Visibility::Public, true);
    fx.db.add_tag(a, "quiet").unwrap();
    let reblog = fx.reblog(alice, a, true);

    let report = fx
        .service
        .call(&[a], RemoveOptions::skipping_side_effects())
        .await
        .unwrap();

    assert_eq!(report.destroyed, vec![a, reblog]);
    assert_eq!(report.published, 0);
    assert_eq!(fx.publisher.publish_count(), 0);
    assert!(fx.federation.removed.lock().unwrap().is_empty());
    assert!(!fx.exists(a));
    assert!(!fx.exists(reblog));
}

#[tokio::test]
async fn public_local_status_fans_out_to_six_channels_in_one_batch() {
    let fx = Fixture::new();
    let alice = fx.account("alice", None);
    let a = fx.post(alice, Visibility::Public, true);
    fx.db.add_tag(a, "foo").unwrap();
    fx.db.add_tag(a, "BAR").unwrap();
    fx.db.add_media_attachment(a, "image").unwrap();

    let report = fx.service.call(&[a], RemoveOptions::default()).await.unwrap();

    let batches = fx.publisher.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(report.published, 6);

    let mut channels = fx.publisher.channels();
    channels.sort();
    assert_eq!(
        channels,
        vec![
            "timeline:hashtag:bar",
            "timeline:hashtag:bar:local",
            "timeline:hashtag:foo",
            "timeline:hashtag:foo:local",
            "timeline:public:local",
            "timeline:public:local:media",
        ]
    );
    assert!(fx.publisher.messages().iter().all(|(_, payload)| *payload == delete_payload(a)));
}

#[tokio::test]
async fn private_and_direct_statuses_publish_nothing() {
    let fx = Fixture::new();
    let alice = fx.account("alice", None);
    let private = fx.post(alice, Visibility::Private, true);
    let direct = fx.post(alice, Visibility::Direct, true);
    fx.db.add_tag(private, "secret").unwrap();

    let report = fx.service.call(&[private, direct], RemoveOptions::default()).await.unwrap();

    assert_eq!(report.destroyed.len(), 2);
    assert_eq!(fx.publisher.publish_count(), 0);
    assert!(!fx.exists(private));
    assert!(!fx.exists(direct));
}

#[tokio::test]
async fn unlisted_local_status_reaches_local_timelines_but_not_hashtags() {
    let fx = Fixture::new();
    let alice = fx.account("alice", None);
    let a = fx.post(alice, Visibility::Unlisted, true);
    fx.db.add_tag(a, "Foo").unwrap();
    fx.db.add_media_attachment(a, "image").unwrap();

    let report = fx.service.call(&[a], RemoveOptions::default()).await.unwrap();

    assert_eq!(report.published, 2);
    assert_eq!(fx.publisher.batches().len(), 1);
    assert_eq!(
        fx.publisher.channels(),
        vec!["timeline:public:local", "timeline:public:local:media"]
    );
    assert!(!fx.exists(a));
}

#[tokio::test]
async fn unlisted_remote_status_publishes_nothing() {
    let fx = Fixture::new();
    let bob = fx.account("bob", Some("remote.example"));
    let a = fx.post(bob, Visibility::Unlisted, false);
    fx.db.add_tag(a, "Foo").unwrap();

    fx.service.call(&[a], RemoveOptions::default()).await.unwrap();

    assert_eq!(fx.publisher.publish_count(), 0);
}

#[tokio::test]
async fn reblogs_are_destroyed_together_and_fanned_out_separately() {
    let fx = Fixture::new();
    let alice = fx.account("alice", None);
    let bob = fx.account("bob", None);
    let carol = fx.account("carol", Some("remote.example"));

    let original = fx.post(alice, Visibility::Public, true);
    fx.db.add_tag(original, "news").unwrap();
    let local_reblog = fx.reblog(bob, original, true);
    let remote_reblog = fx.reblog(carol, original, false);

    let report = fx.service.call(&[original], RemoveOptions::default()).await.unwrap();

    assert_eq!(report.destroyed, vec![original, local_reblog, remote_reblog]);
    for id in [original, local_reblog, remote_reblog] {
        assert!(!fx.exists(id));
    }

    // original: public:local + 2 hashtag channels; local reblog: public:local;
    // remote reblog carries no tags and is not local, so nothing.
    let batches = fx.publisher.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].len(), 3);
    assert!(batches[0].iter().all(|(_, p)| p == delete_payload(original)));
    assert_eq!(
        batches[1].iter().collect::<Vec<_>>(),
        vec![("timeline:public:local", delete_payload(local_reblog).as_str())]
    );
}

#[tokio::test]
async fn duplicate_ids_are_destroyed_once() {
    let fx = Fixture::new();
    let alice = fx.account("alice", None);
    let a = fx.post(alice, Visibility::Public, true);

    let report = fx.service.call(&[a, a, a], RemoveOptions::default()).await.unwrap();

    assert_eq!(report.destroyed, vec![a]);
    assert_eq!(fx.publisher.batches().len(), 1);
}

#[tokio::test]
async fn batch_removal_skips_counter_bookkeeping() {
    let fx = Fixture::new();
    let alice = fx.account("alice", None);
    let a = fx.post(alice, Visibility::Public, true);
    fx.post(alice, Visibility::Public, true);

    fx.service.call(&[a], RemoveOptions::default()).await.unwrap();

    let account = fx.db.get_account(alice).unwrap().unwrap();
    assert_eq!(account.statuses_count, 2);
}

#[tokio::test]
async fn missing_statuses_are_a_no_op() {
    let fx = Fixture::new();
    let report = fx
        .service
        .call(&[StatusId(41), StatusId(42)], RemoveOptions::default())
        .await
        .unwrap();

    assert!(report.destroyed.is_empty());
    assert_eq!(fx.publisher.publish_count(), 0);
}

#[tokio::test]
async fn transport_failure_does_not_fail_removal() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let publisher: Arc<dyn Publisher> = Arc::new(FailingPublisher);
    let service = BatchedRemoveStatusService::new(db.clone(), publisher, Arc::new(NoopFederation));

    let alice = db.create_account("alice", None).unwrap();
    let a = db
        .insert_status(&NewStatus {
            account_id: alice,
            visibility: Visibility::Public,
            local: true,
            reblog_of_id: None,
        })
        .unwrap();

    let report = service.call(&[a], RemoveOptions::default()).await.unwrap();

    assert_eq!(report.destroyed, vec![a]);
    assert_eq!(report.published, 0);
    assert!(db.find_status(a).unwrap().is_none());
}

#[tokio::test]
async fn federation_hears_about_local_statuses_only() {
    let fx = Fixture::new();
    let alice = fx.account("alice", None);
    let bob = fx.account("bob", Some("remote.example"));

    let local = fx.post(alice, Visibility::Private, true);
    fx.db.add_mention(local, bob, false).unwrap();
    let remote = fx.post(bob, Visibility::Public, false);

    fx.service.call(&[local, remote], RemoveOptions::default()).await.unwrap();

    let removed = fx.federation.removed.lock().unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].id, local);
    assert_eq!(removed[0].mentioned_domains(), vec!["remote.example"]);
}

#[tokio::test]
async fn single_removal_maintains_counters_and_account_streams() {
    let fx = Fixture::new();
    let alice = fx.account("alice", None);
    let bob = fx.account("bob", None);
    let single = RemoveStatusService::new(fx.service.clone());

    let original = fx.post(alice, Visibility::Public, true);
    let reblog = fx.reblog(bob, original, true);
    let dm = fx.post(alice, Visibility::Direct, true);
    fx.db.add_mention(dm, bob, false).unwrap();

    let status = fx.db.find_status(reblog).unwrap().unwrap();
    single.call(&status, RemoveOptions::default()).await.unwrap();
    assert_eq!(fx.db.get_reblogs_count(original).unwrap(), Some(0));
    assert_eq!(fx.db.get_account(bob).unwrap().unwrap().statuses_count, 0);

    let status = fx.db.find_status(dm).unwrap().unwrap();
    single.call(&status, RemoveOptions::default()).await.unwrap();

    let channels = fx.publisher.channels();
    assert!(channels.contains(&format!("timeline:{}", bob)));
    assert!(channels.contains(&format!("timeline:direct:{}", alice)));
    assert!(channels.contains(&format!("timeline:direct:{}", bob)));
    assert!(!channels.iter().any(|c| c.starts_with("timeline:hashtag:")));
}

#[tokio::test]
async fn single_removal_of_gone_status_is_not_found() {
    let fx = Fixture::new();
    let alice = fx.account("alice", None);
    let single = RemoveStatusService::new(fx.service.clone());
    let a = fx.post(alice, Visibility::Public, true);
    let status = fx.db.find_status(a).unwrap().unwrap();

    single.call(&status, RemoveOptions::default()).await.unwrap();
    let err = single.call(&status, RemoveOptions::default()).await.unwrap_err();

    assert!(matches!(err, RemovalError::NotFound(id) if id == a));
}

#[tokio::test]
async fn single_removal_sends_one_batch_per_status() {
    let fx = Fixture::new();
    let alice = fx.account("alice", None);
    let single = RemoveStatusService::new(fx.service.clone());
    let a = fx.post(alice, Visibility::Public, true);
    fx.db.add_tag(a, "Rust").unwrap();

    let status = fx.db.find_status(a).unwrap().unwrap();
    let report = single.call(&status, RemoveOptions::default()).await.unwrap();

    let batches = fx.publisher.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(report.published, 4);
    let channels: Vec<&str> = batches[0].iter().map(|(c, _)| c).collect();
    let author_stream = format!("timeline:{}", alice);
    assert_eq!(
        channels,
        vec![
            "timeline:public:local",
            "timeline:hashtag:rust",
            "timeline:hashtag:rust:local",
            author_stream.as_str(),
        ]
    );
}

#[tokio::test]
async fn single_removal_skipping_side_effects_publishes_nothing() {
    let fx = Fixture::new();
    let alice = fx.account("alice", None);
    let single = RemoveStatusService::new(fx.service.clone());
    let a = fx.post(alice, Visibility::Direct, true);

    let status = fx.db.find_status(a).unwrap().unwrap();
    let report = single
        .call(&status, RemoveOptions::skipping_side_effects())
        .await
        .unwrap();

    assert_eq!(report.destroyed, vec![a]);
    assert_eq!(fx.publisher.publish_count(), 0);
    assert!(!fx.exists(a));
}
