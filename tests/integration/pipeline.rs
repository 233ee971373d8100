use remote_images::artifact::{ArtifactStore, MemoryArtifactStore};
use remote_images::cache::{AssociationCache, FieldValue};
use remote_images::config::ImageFieldOptions;
use remote_images::core::FieldArity;
use remote_images::plugin::{NodeContext, RemoteImages, process_records};
use remote_images::resolver::{ResolvedField, ResolverContext, Schema};
use remote_images::test_utils::{MockFetcher, fixtures, init_test_logging};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    fetcher: MockFetcher,
    store: Arc<MemoryArtifactStore>,
    ctx: NodeContext,
}

impl Harness {
    fn new(fetcher: MockFetcher) -> Self {
        init_test_logging(None);
        let store = Arc::new(MemoryArtifactStore::new());
        let fetcher = fetcher.with_store(store.clone());
        let ctx = NodeContext::new(
            Arc::new(fetcher.clone()),
            store.clone(),
            AssociationCache::in_memory(),
        );
        Self {
            fetcher,
            store,
            ctx,
        }
    }

    fn id_for(&self, url: &str) -> String {
        self.fetcher.artifact_for(url).unwrap().id
    }

    fn schema(&self, plugins: &[RemoteImages]) -> Schema {
        let mut schema = Schema::new();
        for plugin in plugins {
            plugin.create_resolvers(&self.ctx.cache, &mut schema).unwrap();
        }
        schema
    }

    fn resolver_context(&self) -> ResolverContext {
        ResolverContext::new(self.store.clone())
    }
}

fn silent(node_type: &str, image_path: &str) -> ImageFieldOptions {
    let mut options = ImageFieldOptions::new(node_type, image_path);
    options.silent = true;
    options
}

#[tokio::test]
async fn test_top_level_url_with_extension() {
    let harness = Harness::new(MockFetcher::new());
    let mut options = ImageFieldOptions::new("Article", "imageUrl");
    options.ext = Some(".png".to_string());
    let plugin = RemoteImages::new(options).unwrap();

    let report =
        plugin.on_create_node(&fixtures::article("n1", "https://x/y"), &harness.ctx).await.unwrap();

    assert_eq!(harness.fetcher.calls(), vec!["https://x/y.png"]);
    assert_eq!((report.urls, report.fetched, report.owners_written), (1, 1, 1));

    let fields = harness.ctx.cache.lookup_artifacts("n1").await.unwrap().unwrap();
    assert_eq!(fields["localImage"], FieldValue::One(harness.id_for("https://x/y.png")));

    let artifact = harness.store.get_node_by_id(&harness.id_for("https://x/y.png")).unwrap();
    assert_eq!(artifact.parent, "n1");
}

#[tokio::test]
async fn test_nested_urls_keyed_by_child_ids() {
    let harness = Harness::new(MockFetcher::new());
    let plugin = RemoteImages::new(ImageFieldOptions::new("Article", "nodes[].imageUrl")).unwrap();
    let record = fixtures::article_with_children("n1", &[("c1", "u1"), ("c2", "u2")]);

    let report = plugin.on_create_node(&record, &harness.ctx).await.unwrap();
    assert_eq!((report.urls, report.fetched, report.owners_written), (2, 2, 2));

    let c1 = harness.ctx.cache.lookup_artifacts("c1").await.unwrap().unwrap();
    let c2 = harness.ctx.cache.lookup_artifacts("c2").await.unwrap().unwrap();
    assert_eq!(c1["localImage"], FieldValue::Many(vec![harness.id_for("u1")]));
    assert_eq!(c2["localImage"], FieldValue::Many(vec![harness.id_for("u2")]));
    assert!(harness.ctx.cache.lookup_artifacts("n1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_nested_children_without_ids_fall_back_to_record() {
    let harness = Harness::new(MockFetcher::new());
    let plugin = RemoteImages::new(ImageFieldOptions::new("Article", "nodes[].imageUrl")).unwrap();
    let record = fixtures::record(
        "n1",
        "Article",
        json!({"nodes": [{"imageUrl": "u1"}, {"imageUrl": "u2"}]}),
    );

    plugin.on_create_node(&record, &harness.ctx).await.unwrap();

    let fields = harness.ctx.cache.lookup_artifacts("n1").await.unwrap().unwrap();
    assert_eq!(
        fields["localImage"],
        FieldValue::Many(vec![harness.id_for("u1"), harness.id_for("u2")])
    );
}

#[tokio::test]
async fn test_array_leaf_omits_failed_urls() {
    let harness = Harness::new(MockFetcher::new().fail_always("u2"));
    let mut options = silent("Gallery", "imageUrls");
    options.arity = FieldArity::Array;
    let plugin = RemoteImages::new(options).unwrap();

    let report =
        plugin.on_create_node(&fixtures::gallery("g1", &["u1", "u2"]), &harness.ctx).await.unwrap();
    assert_eq!((report.urls, report.fetched, report.failed), (2, 1, 1));

    let fields = harness.ctx.cache.lookup_artifacts("g1").await.unwrap().unwrap();
    assert_eq!(fields["localImage"], FieldValue::Many(vec![harness.id_for("u1")]));
}

#[tokio::test]
async fn test_array_order_follows_urls_not_completion() {
    let harness = Harness::new(
        MockFetcher::new().delay("u1", Duration::from_millis(80)).delay("u2", Duration::from_millis(40)),
    );
    let mut options = ImageFieldOptions::new("Gallery", "imageUrls");
    options.arity = FieldArity::Array;
    let plugin = RemoteImages::new(options).unwrap();

    plugin
        .on_create_node(&fixtures::gallery("g1", &["u1", "u2", "u3"]), &harness.ctx)
        .await
        .unwrap();

    let fields = harness.ctx.cache.lookup_artifacts("g1").await.unwrap().unwrap();
    assert_eq!(
        fields["localImage"],
        FieldValue::Many(vec![harness.id_for("u1"), harness.id_for("u2"), harness.id_for("u3")])
    );
}

#[tokio::test]
async fn test_retries_recover_transient_failures() {
    let harness = Harness::new(MockFetcher::new().fail_times("https://x/y", 2));
    let mut options = silent("Article", "imageUrl");
    options.retries = 2;
    let plugin = RemoteImages::new(options).unwrap();

    let report =
        plugin.on_create_node(&fixtures::article("n1", "https://x/y"), &harness.ctx).await.unwrap();

    assert_eq!(harness.fetcher.call_count("https://x/y"), 3);
    assert_eq!(report.fetched, 1);
    assert!(harness.ctx.cache.lookup_artifacts("n1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let harness = Harness::new(MockFetcher::new().fail_always("https://x/y"));
    let mut options = silent("Article", "imageUrl");
    options.retries = 1;
    let plugin = RemoteImages::new(options).unwrap();

    let report =
        plugin.on_create_node(&fixtures::article("n1", "https://x/y"), &harness.ctx).await.unwrap();

    assert_eq!(harness.fetcher.call_count("https://x/y"), 2);
    assert_eq!((report.fetched, report.failed, report.owners_written), (0, 1, 0));
}

#[tokio::test]
async fn test_placeholder_registered_on_failure() {
    let harness = Harness::new(MockFetcher::new().fail_always("https://x/y"));
    let mut options = silent("Article", "imageUrl");
    options.placeholder_on_failure = true;
    let plugin = RemoteImages::new(options).unwrap();

    let report =
        plugin.on_create_node(&fixtures::article("n1", "https://x/y"), &harness.ctx).await.unwrap();
    assert_eq!((report.fetched, report.failed, report.placeholders), (0, 1, 1));

    let schema = harness.schema(&[plugin]);
    let resolved = schema
        .resolve_field("Article", "localImage", &json!({"id": "n1"}), &harness.resolver_context())
        .await
        .unwrap();
    let Some(ResolvedField::Single(Some(artifact))) = resolved else {
        panic!("expected a placeholder artifact");
    };
    assert!(artifact.is_placeholder());
    assert_eq!(artifact.parent, "n1");
}

#[tokio::test]
async fn test_url_template_rewrites_before_fetch() {
    let harness = Harness::new(MockFetcher::new());
    let mut options = ImageFieldOptions::new("Article", "imageUrl");
    options.url_template = Some("https://proxy.test/fetch?src={url}".to_string());
    let plugin = RemoteImages::new(options).unwrap();

    plugin.on_create_node(&fixtures::article("n1", "https://x/y"), &harness.ctx).await.unwrap();

    assert_eq!(harness.fetcher.calls(), vec!["https://proxy.test/fetch?src=https://x/y"]);
}

#[tokio::test]
async fn test_programmatic_url_transform() {
    let harness = Harness::new(MockFetcher::new());
    let options = ImageFieldOptions::new("Article", "imageUrl")
        .with_prepare_url(|url: &str| url.replace("http://", "https://"));
    let plugin = RemoteImages::new(options).unwrap();

    plugin.on_create_node(&fixtures::article("n1", "http://x/y"), &harness.ctx).await.unwrap();

    assert_eq!(harness.fetcher.calls(), vec!["https://x/y"]);
}

#[tokio::test]
async fn test_reprocessing_overwrites_only_own_field() {
    let harness = Harness::new(MockFetcher::new());
    let mut thumb = ImageFieldOptions::new("Article", "thumbUrl");
    thumb.name = "localThumb".to_string();
    let plugins =
        RemoteImages::from_mappings(&[ImageFieldOptions::new("Article", "imageUrl"), thumb])
            .unwrap();
    let record = fixtures::record("n1", "Article", json!({"imageUrl": "a", "thumbUrl": "b"}));

    process_records(&plugins, std::slice::from_ref(&record), &harness.ctx, 1).await.unwrap();
    let thumb_id = harness.id_for("b");
    let first_image = harness.id_for("a");

    plugins[0].on_create_node(&record, &harness.ctx).await.unwrap();
    let second_image = harness.id_for("a");
    assert_ne!(first_image, second_image);

    let fields = harness.ctx.cache.lookup_artifacts("n1").await.unwrap().unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields["localImage"], FieldValue::One(second_image));
    assert_eq!(fields["localThumb"], FieldValue::One(thumb_id));
}

#[tokio::test]
async fn test_mappings_sharing_owner_do_not_clobber() {
    let harness = Harness::new(MockFetcher::new().delay("a", Duration::from_millis(30)));
    let mut cover = ImageFieldOptions::new("Article", "nodes[].coverUrl");
    cover.name = "coverImage".to_string();
    let plugins = RemoteImages::from_mappings(&[
        ImageFieldOptions::new("Article", "nodes[].imageUrl"),
        cover,
    ])
    .unwrap();
    let record = fixtures::record(
        "n1",
        "Article",
        json!({"nodes": [{"id": "c1", "imageUrl": "a", "coverUrl": "b"}]}),
    );

    let reports = process_records(&plugins, &[record], &harness.ctx, 4).await.unwrap();
    assert_eq!(reports[0].owners_written, 2);

    let fields = harness.ctx.cache.lookup_artifacts("c1").await.unwrap().unwrap();
    assert_eq!(fields["localImage"], FieldValue::Many(vec![harness.id_for("a")]));
    assert_eq!(fields["coverImage"], FieldValue::Many(vec![harness.id_for("b")]));
}

#[tokio::test]
async fn test_process_records_reports_in_input_order() {
    let harness = Harness::new(MockFetcher::new().delay("slow", Duration::from_millis(50)));
    let plugins = RemoteImages::from_mappings(&[silent("Article", "imageUrl")]).unwrap();
    let records = vec![
        fixtures::article("n1", "slow"),
        fixtures::record("p1", "Page", json!({"imageUrl": "ignored"})),
        fixtures::article("n2", "fast"),
    ];

    let reports = process_records(&plugins, &records, &harness.ctx, 3).await.unwrap();

    let ids: Vec<_> = reports.iter().map(|report| report.record_id.as_deref()).collect();
    assert_eq!(ids, vec![Some("n1"), Some("p1"), Some("n2")]);
    assert!(!reports[1].matched);
    assert_eq!(harness.fetcher.call_count("ignored"), 0);
}

#[tokio::test]
async fn test_resolvers_return_artifacts_without_record_traversal() {
    let harness = Harness::new(MockFetcher::new());
    let mut gallery = ImageFieldOptions::new("Gallery", "imageUrls");
    gallery.arity = FieldArity::Array;
    let plugins =
        RemoteImages::from_mappings(&[ImageFieldOptions::new("Article", "imageUrl"), gallery])
            .unwrap();
    let records = vec![fixtures::article("n1", "a"), fixtures::gallery("g1", &["b", "c"])];
    process_records(&plugins, &records, &harness.ctx, 2).await.unwrap();

    let schema = harness.schema(&plugins);
    let ctx = harness.resolver_context();

    // Only the id is needed to resolve; the URL fields are gone.
    let article = schema
        .resolve_record(&json!({"id": "n1", "internal": {"type": "Article"}}), &ctx)
        .await
        .unwrap();
    let ResolvedField::Single(Some(artifact)) = &article["localImage"] else {
        panic!("expected one artifact");
    };
    assert_eq!(artifact.url.as_deref(), Some("a"));

    let gallery = schema
        .resolve_record(&json!({"id": "g1", "internal": {"type": "Gallery"}}), &ctx)
        .await
        .unwrap();
    let ResolvedField::Many(items) = &gallery["localImage"] else {
        panic!("expected a list");
    };
    let urls: Vec<_> = items.iter().map(|item| item.as_ref().and_then(|a| a.url.as_deref())).collect();
    assert_eq!(urls, vec![Some("b"), Some("c")]);
}

#[tokio::test]
async fn test_resolvers_empty_results_by_arity() {
    let harness = Harness::new(MockFetcher::new());
    let mut gallery = ImageFieldOptions::new("Gallery", "imageUrls");
    gallery.arity = FieldArity::Array;
    let plugins =
        RemoteImages::from_mappings(&[ImageFieldOptions::new("Article", "imageUrl"), gallery])
            .unwrap();
    let schema = harness.schema(&plugins);
    let ctx = harness.resolver_context();

    let article = schema
        .resolve_field("Article", "localImage", &json!({"id": "unknown"}), &ctx)
        .await
        .unwrap();
    assert_eq!(article, Some(ResolvedField::Single(None)));

    let gallery = schema
        .resolve_field("Gallery", "localImage", &json!({"id": "unknown"}), &ctx)
        .await
        .unwrap();
    assert_eq!(gallery, Some(ResolvedField::Many(vec![])));

    let serialized = serde_json::to_value(gallery.unwrap()).unwrap();
    assert_eq!(serialized, json!([]));
}

#[tokio::test]
async fn test_deleted_artifact_resolves_to_null() {
    let harness = Harness::new(MockFetcher::new());
    let mut options = ImageFieldOptions::new("Gallery", "imageUrls");
    options.arity = FieldArity::Array;
    let plugin = RemoteImages::new(options).unwrap();
    plugin.on_create_node(&fixtures::gallery("g1", &["a", "b"]), &harness.ctx).await.unwrap();

    harness.store.delete_node(&harness.id_for("a"));

    let schema = harness.schema(&[plugin]);
    let resolved = schema
        .resolve_field("Gallery", "localImage", &json!({"id": "g1"}), &harness.resolver_context())
        .await
        .unwrap();
    let Some(ResolvedField::Many(items)) = resolved else {
        panic!("expected a list");
    };
    assert_eq!(items.len(), 2);
    assert!(items[0].is_none());
    assert_eq!(items[1].as_ref().map(|a| a.id.clone()), Some(harness.id_for("b")));
}
