use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use echoes::application::access::Caller;
use echoes::application::echoes::{Author, EchoStore, EventPublishHook};
use echoes::application::events::EchoEvent;
use echoes::application::generator::DisabledGenerator;
use echoes::application::pagination::{EchoQuery, PageRequest, PageResult};
use echoes::application::recommend::{RecommendSettings, RecommendationEngine};
use echoes::application::repos::{EchoFilter, EchoReadRepo, RepoError};
use echoes::application::service::EchoService;
use echoes::application::summary::{SummaryCoalescer, SummarySettings};
use echoes::cache::{CacheConfig, EchoCache};
use echoes::domain::echoes::EchoDraft;
use echoes::domain::entities::{EchoRecord, TagRecord};
use echoes::infra::access::StaticAccessPolicy;
use echoes::infra::events::EventBus;
use echoes::infra::memory::InMemoryRepositories;
use echoes_api_types::{EchoPayload, MediaKind, MediaPayload};
use uuid::Uuid;

struct Harness {
    service: EchoService,
    repos: Arc<InMemoryRepositories>,
    bus: Arc<EventBus>,
    owner: Caller,
}

fn harness() -> Harness {
    let owner_id = Uuid::new_v4();
    let repos = Arc::new(InMemoryRepositories::new());
    let bus = Arc::new(EventBus::new(16));
    let cache = Arc::new(EchoCache::new(&CacheConfig::default()));
    let store = EchoStore::new(repos.clone(), repos.clone(), cache, chrono_tz::UTC)
        .with_hook(Arc::new(EventPublishHook::new(bus.clone())));

    let generator = Arc::new(DisabledGenerator);
    let recommender = RecommendationEngine::new(generator.clone(), RecommendSettings::default());
    let summaries = SummaryCoalescer::new(store.clone(), generator, SummarySettings::default());
    let service = EchoService::new(
        store,
        Arc::new(StaticAccessPolicy::owner_only(owner_id)),
        recommender,
        summaries,
    );

    Harness {
        service,
        repos,
        bus,
        owner: Caller::user(owner_id, "mika"),
    }
}

fn image(url: &str) -> MediaPayload {
    MediaPayload {
        url: url.to_string(),
        kind: MediaKind::Image,
        source: None,
        object_key: None,
        width: 1000,
        height: 1000,
        live_pair_id: None,
    }
}

fn video(url: &str) -> MediaPayload {
    MediaPayload {
        kind: MediaKind::Video,
        ..image(url)
    }
}

fn text(content: &str) -> EchoPayload {
    EchoPayload {
        content: content.to_string(),
        ..Default::default()
    }
}

fn with_media(content: &str, media: Vec<MediaPayload>) -> EchoPayload {
    EchoPayload {
        media,
        ..text(content)
    }
}

#[tokio::test]
async fn empty_echo_is_rejected_before_storage() {
    let h = harness();

    let err = h
        .service
        .create_echo(&h.owner, EchoPayload::default())
        .await
        .expect_err("empty echo must be rejected");

    assert!(err.is_validation());
    assert_eq!(h.repos.transactions_started(), 0);
    assert_eq!(h.repos.echo_count().await, 0);
}

#[tokio::test]
async fn only_administrators_mutate() {
    let h = harness();
    let stranger = Caller::user(Uuid::new_v4(), "guest");

    for caller in [&Caller::Anonymous, &stranger] {
        let err = h
            .service
            .create_echo(caller, text("hello"))
            .await
            .expect_err("mutation must be denied");
        assert!(err.is_permission_denied());
    }
    assert_eq!(h.repos.transactions_started(), 0);

    let echo = h
        .service
        .create_echo(&h.owner, text("hello"))
        .await
        .expect("owner creates");
    assert_eq!(echo.username, "mika");

    let err = h
        .service
        .delete_echo(&Caller::Anonymous, echo.id)
        .await
        .expect_err("anonymous delete");
    assert!(err.is_permission_denied());
}

#[tokio::test]
async fn reordering_media_keeps_every_row_id() {
    let h = harness();
    let created = h
        .service
        .create_echo(
            &h.owner,
            with_media("trip", vec![image("a.jpg"), image("b.jpg"), image("c.jpg")]),
        )
        .await
        .expect("create");
    let mut before: Vec<Uuid> = created.media.iter().map(|m| m.id).collect();

    let updated = h
        .service
        .update_echo(
            &h.owner,
            created.id,
            with_media("trip", vec![image("c.jpg"), image("a.jpg"), image("b.jpg")]),
        )
        .await
        .expect("update");

    let urls: Vec<&str> = updated.media.iter().map(|m| m.url.as_str()).collect();
    assert_eq!(urls, vec!["c.jpg", "a.jpg", "b.jpg"]);
    let positions: Vec<i32> = updated.media.iter().map(|m| m.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);

    let mut after: Vec<Uuid> = updated.media.iter().map(|m| m.id).collect();
    before.sort();
    after.sort();
    assert_eq!(before, after);
    assert_eq!(h.repos.media_count().await, 3);
}

#[tokio::test]
async fn reordering_carries_live_photo_links_to_new_positions() {
    let h = harness();
    let mut still = image("still.heic");
    still.live_pair_id = Some("p1".to_string());
    let mut motion = video("motion.mov");
    motion.live_pair_id = Some("p1".to_string());
    let created = h
        .service
        .create_echo(
            &h.owner,
            with_media("live", vec![still, motion, image("other.jpg")]),
        )
        .await
        .expect("create");
    let still_id = created.media[0].id;
    let motion_id = created.media[1].id;

    let updated = h
        .service
        .update_echo(
            &h.owner,
            created.id,
            with_media(
                "live",
                vec![image("other.jpg"), video("motion.mov"), image("still.heic")],
            ),
        )
        .await
        .expect("update");

    let urls: Vec<&str> = updated.media.iter().map(|m| m.url.as_str()).collect();
    assert_eq!(urls, vec!["other.jpg", "motion.mov", "still.heic"]);
    // Rows are rewritten in place by slot, so the old still row now holds
    // other.jpg and must have lost its link.
    assert_eq!(updated.media[0].id, still_id);
    assert_eq!(updated.media[0].live_video_id, None);
    assert_eq!(updated.media[1].id, motion_id);
    assert_eq!(updated.media[2].live_video_id, Some(motion_id));
    assert_eq!(updated.live_video_ids(), vec![motion_id]);

    let read = h
        .service
        .get_echo_by_id(&h.owner, created.id)
        .await
        .expect("read back");
    assert_eq!(read.media, updated.media);
}

#[tokio::test]
async fn merge_keeps_surviving_urls_and_drops_the_rest() {
    let h = harness();
    let created = h
        .service
        .create_echo(
            &h.owner,
            with_media("album", vec![image("a.jpg"), image("b.jpg")]),
        )
        .await
        .expect("create");
    let kept_id = created.media[1].id;

    let updated = h
        .service
        .update_echo(
            &h.owner,
            created.id,
            with_media("album", vec![image("b.jpg"), image("d.jpg")]),
        )
        .await
        .expect("update");

    assert_eq!(updated.media.len(), 2);
    assert_eq!(updated.media[0].url, "b.jpg");
    assert_eq!(updated.media[0].id, kept_id);
    assert_eq!(updated.media[1].url, "d.jpg");
    assert!(updated.media.iter().all(|m| m.url != "a.jpg"));
    assert_eq!(h.repos.media_count().await, 2);
}

#[tokio::test]
async fn live_photo_halves_are_linked_on_create() {
    let h = harness();
    let mut still = image("still.heic");
    still.live_pair_id = Some("p1".to_string());
    let mut motion = video("motion.mov");
    motion.live_pair_id = Some("p1".to_string());

    let echo = h
        .service
        .create_echo(&h.owner, with_media("", vec![still, motion]))
        .await
        .expect("create");

    assert_eq!(echo.media[0].live_video_id, Some(echo.media[1].id));
    assert_eq!(echo.live_video_ids(), vec![echo.media[1].id]);

    let read = h
        .service
        .get_echo_by_id(&h.owner, echo.id)
        .await
        .expect("read back");
    assert_eq!(read.media, echo.media);
}

#[tokio::test]
async fn tags_are_normalised_and_reused() {
    let h = harness();
    let first = h
        .service
        .create_echo(
            &h.owner,
            EchoPayload {
                tags: vec!["#rust".into(), " rust ".into(), "go".into(), "#".into()],
                ..text("systems")
            },
        )
        .await
        .expect("create");
    let names: Vec<&str> = first.tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["go", "rust"]);

    h.service
        .create_echo(
            &h.owner,
            EchoPayload {
                tags: vec!["rust".into()],
                ..text("more")
            },
        )
        .await
        .expect("create");

    let tags = h.service.get_all_tags().await.expect("tags");
    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0].name, "rust");
    assert_eq!(tags[0].usage_count, 2);

    let again = h
        .service
        .create_tag(&h.owner, "#rust")
        .await
        .expect("existing tag");
    assert_eq!(again.id, tags[0].id);

    let err = h
        .service
        .create_tag(&h.owner, "  # ")
        .await
        .expect_err("blank tag");
    assert!(err.is_validation());
}

#[tokio::test]
async fn private_echoes_are_hidden_from_visitors() {
    let h = harness();
    let hidden = h
        .service
        .create_echo(
            &h.owner,
            EchoPayload {
                private: true,
                ..text("diary")
            },
        )
        .await
        .expect("create");
    h.service
        .create_echo(&h.owner, text("public"))
        .await
        .expect("create");

    let err = h
        .service
        .get_echo_by_id(&Caller::Anonymous, hidden.id)
        .await
        .expect_err("visitor reads private echo");
    assert!(err.is_permission_denied());

    let query = EchoQuery::new(1, 10, None);
    let visitor = h
        .service
        .get_echos_by_page(&Caller::Anonymous, &query)
        .await
        .expect("page");
    assert_eq!(visitor.total, 1);
    assert_eq!(visitor.items[0].content, "public");

    let owner = h
        .service
        .get_echos_by_page(&h.owner, &query)
        .await
        .expect("page");
    assert_eq!(owner.total, 2);

    let today = h
        .service
        .get_today_echos(&Caller::Anonymous)
        .await
        .expect("today");
    assert!(today.iter().all(|echo| !echo.private));
}

#[tokio::test]
async fn writes_invalidate_cached_reads() {
    let h = harness();
    let query = EchoQuery::new(1, 10, None);
    let first = h
        .service
        .create_echo(&h.owner, text("first"))
        .await
        .expect("create");

    let cached = h
        .service
        .get_echos_by_page(&Caller::Anonymous, &query)
        .await
        .expect("page");
    assert_eq!(cached.total, 1);
    let snapshot = h
        .service
        .get_echo_by_id(&Caller::Anonymous, first.id)
        .await
        .expect("echo");
    assert_eq!(snapshot.fav_count, 0);

    h.service
        .create_echo(&h.owner, text("second"))
        .await
        .expect("create");
    let page = h
        .service
        .get_echos_by_page(&Caller::Anonymous, &query)
        .await
        .expect("page");
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].content, "second");

    h.service.like_echo(first.id).await.expect("like");
    let liked = h
        .service
        .get_echo_by_id(&Caller::Anonymous, first.id)
        .await
        .expect("echo");
    assert_eq!(liked.fav_count, 1);
}

#[tokio::test]
async fn delete_removes_media_and_publishes_an_event() {
    let h = harness();
    let mut events = h.bus.subscribe();
    let echo = h
        .service
        .create_echo(&h.owner, with_media("gone soon", vec![image("x.png")]))
        .await
        .expect("create");

    let created = events.recv().await.expect("created event");
    assert!(matches!(created, EchoEvent::Created(ref e) if e.id == echo.id));

    h.service
        .delete_echo(&h.owner, echo.id)
        .await
        .expect("delete");

    let deleted = events.recv().await.expect("deleted event");
    assert_eq!(deleted, EchoEvent::Deleted { id: echo.id });
    assert_eq!(h.repos.media_count().await, 0);

    let err = h
        .service
        .get_echo_by_id(&h.owner, echo.id)
        .await
        .expect_err("deleted echo");
    assert!(err.is_not_found());

    let err = h
        .service
        .delete_echo(&h.owner, echo.id)
        .await
        .expect_err("second delete");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn like_on_a_missing_echo_is_not_found() {
    let h = harness();
    let err = h
        .service
        .like_echo(Uuid::new_v4())
        .await
        .expect_err("missing echo");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn search_and_tag_filters_narrow_the_listing() {
    let h = harness();
    let tagged = h
        .service
        .create_echo(
            &h.owner,
            EchoPayload {
                tags: vec!["rust".into()],
                ..text("Borrow checker notes")
            },
        )
        .await
        .expect("create");
    h.service
        .create_echo(&h.owner, text("lunch"))
        .await
        .expect("create");

    let found = h
        .service
        .get_echos_by_page(&h.owner, &EchoQuery::new(1, 10, Some("  borrow ")))
        .await
        .expect("search");
    assert_eq!(found.total, 1);
    assert_eq!(found.items[0].id, tagged.id);

    let by_tag = h
        .service
        .get_echos_by_tag(&h.owner, tagged.tags[0].id, &EchoQuery::new(1, 10, None))
        .await
        .expect("by tag");
    assert_eq!(by_tag.total, 1);
    assert_eq!(by_tag.items[0].id, tagged.id);
}

/// Delegates to the in-memory store until told to fail single-echo reads.
struct FlakyReader {
    inner: Arc<InMemoryRepositories>,
    failing: AtomicBool,
}

#[async_trait]
impl EchoReadRepo for FlakyReader {
    async fn find_echo(&self, id: Uuid) -> Result<Option<EchoRecord>, RepoError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        self.inner.find_echo(id).await
    }

    async fn list_echoes(
        &self,
        filter: &EchoFilter,
        page: PageRequest,
    ) -> Result<PageResult<EchoRecord>, RepoError> {
        self.inner.list_echoes(filter, page).await
    }

    async fn list_tags(&self) -> Result<Vec<TagRecord>, RepoError> {
        self.inner.list_tags().await
    }
}

#[tokio::test]
async fn committed_update_invalidates_even_when_reads_fail() {
    let repos = Arc::new(InMemoryRepositories::new());
    let reader = Arc::new(FlakyReader {
        inner: repos.clone(),
        failing: AtomicBool::new(false),
    });
    let cache = Arc::new(EchoCache::new(&CacheConfig::default()));
    let store = EchoStore::new(reader.clone(), repos, cache, chrono_tz::UTC);
    let author = Author {
        id: Uuid::new_v4(),
        username: "mika".to_string(),
    };

    let echo = store
        .create(&author, EchoDraft::from_payload(text("before")).expect("draft"))
        .await
        .expect("create");
    let cached = store.get_by_id(echo.id).await.expect("read").expect("exists");
    assert_eq!(cached.content, "before");

    reader.failing.store(true, Ordering::SeqCst);
    let updated = store
        .update(echo.id, EchoDraft::from_payload(text("after")).expect("draft"))
        .await
        .expect("update does not depend on the reader");
    assert_eq!(updated.content, "after");

    reader.failing.store(false, Ordering::SeqCst);
    let fresh = store.get_by_id(echo.id).await.expect("read").expect("exists");
    assert_eq!(fresh.content, "after");
}
