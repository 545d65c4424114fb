//! End-to-end transform tests against a fixture source and in-memory platform

mod helpers;

use chrono::{TimeZone, Utc};
use exmig::assets::{asset_id_for, AssetDeduplicator};
use exmig::target::{MemoryStore, TargetStore};
use exmig::{MigrationError, Migration};
use exmig_common::LocaleMap;
use helpers::{field, has_part, migration, ElementBuilder, FixtureSource, PageBuilder, IMAGE_SERVER};
use std::sync::Arc;

const PORTRAIT: &str = "2019/01/portrait.jpg";

fn exhibition() -> FixtureSource {
    FixtureSource::new()
        .with_page(
            PageBuilder::new("faces", "en", 2)
                .meta("About faces")
                .published(Utc.with_ymd_and_hms(2019, 5, 4, 0, 0, 0).unwrap())
                .child("faces/chapter-1")
                .element(
                    ElementBuilder::new("intro")
                        .text("title", "Faces")
                        .text("sub_title", "Portraits through time")
                        .rich_text("body", "<p>Welcome</p>"),
                ),
        )
        .with_page(
            PageBuilder::new("faces/chapter-1", "en", 3)
                .element(
                    ElementBuilder::new("image")
                        .picture("image", PORTRAIT)
                        .credit("image_credit", "Portrait", "CC0"),
                )
                .element(ElementBuilder::new("text").rich_text("body", "<p>Chapter text</p>")),
        )
}

#[tokio::test]
async fn test_page_with_chapter_builds_full_entry_graph() {
    let (migration, store) = migration(exhibition());

    let page_id = migration.create("faces").await.unwrap().unwrap();

    assert_eq!(store.asset_creations(), 1);
    assert_eq!(store.entry_creations(), 4);

    let images = store.entries_of_type("imageWithAttribution");
    let texts = store.entries_of_type("richText");
    let chapters = store.entries_of_type("exhibitionChapterPage");
    let pages = store.entries_of_type("exhibitionPage");
    assert_eq!((images.len(), texts.len(), chapters.len(), pages.len()), (1, 1, 1, 1));

    let chapter = &chapters[0];
    assert_eq!(has_part(chapter), vec![images[0].id().to_string(), texts[0].id().to_string()]);
    assert_eq!(field(chapter, "identifier"), Some("faces/chapter-1"));

    let page = &pages[0];
    assert_eq!(page.id(), page_id);
    assert!(page.is_published());
    assert_eq!(has_part(page), vec![chapter.id().to_string()]);
    assert_eq!(field(page, "name"), Some("Faces"));
    assert_eq!(field(page, "headline"), Some("Portraits through time"));
    assert_eq!(field(page, "description"), Some("About faces"));
    assert_eq!(field(page, "datePublished"), Some("2019-05-04T00:00:00.000Z"));
    assert!(field(page, "text").unwrap().contains("Welcome"));
    assert!(page.links("primaryImageOfPage").is_empty());

    let image = &images[0];
    assert_eq!(image.links("image")[0].id(), asset_id_for(PORTRAIT));
    assert_eq!(field(image, "name"), Some("Portrait"));
    assert_eq!(
        field(image, "license"),
        Some("https://creativecommons.org/publicdomain/zero/1.0/")
    );
    assert_eq!(field(image, "url"), Some("http://data.europeana.eu/item/123/abc"));

    let asset = store.asset(&asset_id_for(PORTRAIT)).unwrap();
    assert!(asset.is_published());
    assert_eq!(asset.fields["title"]["en-GB"], "Portrait");
    assert_eq!(asset.fields["file"]["en-GB"]["contentType"], "image/jpeg");
}

#[tokio::test]
async fn test_rerun_uploads_nothing_but_recreates_entries() {
    let (migration, store) = migration(exhibition());

    migration.create("faces").await.unwrap();
    migration.create("faces").await.unwrap();

    assert_eq!(store.asset_creations(), 1);
    assert_eq!(store.entry_creations(), 8);
    assert_eq!(store.entries_of_type("exhibitionPage").len(), 2);
}

#[tokio::test]
async fn test_snapshot_carries_asset_index_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("assetIds.json");
    let store = Arc::new(MemoryStore::new());

    let run = |store: &Arc<MemoryStore>| {
        let target: Arc<dyn TargetStore> = store.clone();
        let assets = AssetDeduplicator::new(target.clone(), LocaleMap::default())
            .with_image_server(IMAGE_SERVER)
            .with_snapshot(&snapshot);
        Migration::new(Arc::new(exhibition()), target, Arc::new(assets), LocaleMap::default())
    };

    run(&store).create("faces").await.unwrap();
    assert!(snapshot.exists());
    run(&store).create("faces").await.unwrap();

    assert_eq!(store.asset_creations(), 1);
}

#[tokio::test]
async fn test_adjacent_texts_merge_into_one_rich_text() {
    let source = FixtureSource::new().with_page(
        PageBuilder::new("faces/chapter-2", "en", 3)
            .element(
                ElementBuilder::new("intro")
                    .text("title", "Chapter two")
                    .rich_text("body", ""),
            )
            .element(ElementBuilder::new("text").rich_text("body", "<p>First</p>"))
            .element(ElementBuilder::new("text").rich_text("body", "<p>Second</p>")),
    );
    let (migration, store) = migration(source);

    migration.create("faces/chapter-2").await.unwrap();

    let texts = store.entries_of_type("richText");
    assert_eq!(texts.len(), 1);
    assert_eq!(store.deleted_entries().len(), 1);

    let chapter = &store.entries_of_type("exhibitionChapterPage")[0];
    assert_eq!(has_part(chapter), vec![texts[0].id().to_string()]);

    let text = field(&texts[0], "text").unwrap();
    let first = text.find("First").unwrap();
    let second = text.find("Second").unwrap();
    assert!(first < second);
    assert!(text.contains("\n\n"));
}

#[tokio::test]
async fn test_chapter_intro_without_title_falls_back_to_urlname() {
    let source = FixtureSource::new().with_page(
        PageBuilder::new("faces/untitled", "en", 3).element(
            ElementBuilder::new("intro")
                .text("title", "")
                .rich_text("body", "<p>Intro body</p>"),
        ),
    );
    let (migration, store) = migration(source);

    migration.create("faces/untitled").await.unwrap();

    let chapter = &store.entries_of_type("exhibitionChapterPage")[0];
    assert_eq!(field(chapter, "name"), Some("faces/untitled"));
    assert_eq!(has_part(chapter).len(), 1);
    assert_eq!(store.entries_of_type("richText").len(), 1);
}

#[tokio::test]
async fn test_image_compare_keeps_image_order() {
    let source = FixtureSource::new().with_page(
        PageBuilder::new("faces/compare", "en", 3).element(
            ElementBuilder::new("image_compare")
                .picture("image_1", "2019/01/before.jpg")
                .credit("image_1_credit", "Before", "CC0")
                .picture("image_2", "2019/01/after.jpg")
                .credit("image_2_credit", "After", "CC_BY"),
        ),
    );
    let (migration, store) = migration(source);

    migration.create("faces/compare").await.unwrap();

    let images = store.entries_of_type("imageWithAttribution");
    let comparison = &store.entries_of_type("imageComparison")[0];
    assert_eq!(
        has_part(comparison),
        vec![images[0].id().to_string(), images[1].id().to_string()]
    );
    assert_eq!(field(&images[0], "name"), Some("Before"));
    assert_eq!(field(comparison, "name"), Some("Before / After"));
    assert_eq!(store.asset_creations(), 2);
}

#[tokio::test]
async fn test_rich_image_and_quote_and_embed() {
    let source = FixtureSource::new().with_page(
        PageBuilder::new("faces/mixed", "en", 3)
            .element(
                ElementBuilder::new("rich_image")
                    .picture("image", PORTRAIT)
                    .credit("image_credit", "Portrait", "CC0")
                    .text("title", "Heading")
                    .text("sub_title", "")
                    .rich_text("body", "<p>Body</p>")
                    .text("quote", "")
                    .text("quotee", ""),
            )
            .element(ElementBuilder::new("embed").html("embed", "<iframe src=\"https://example.org\"></iframe>"))
            .element(ElementBuilder::new("quote").text("quote", "To be").text("quotee", "Someone")),
    );
    let (migration, store) = migration(source);

    migration.create("faces/mixed").await.unwrap();

    let chapter = &store.entries_of_type("exhibitionChapterPage")[0];
    let parts = has_part(chapter);
    assert_eq!(parts.len(), 4);
    let kinds: Vec<String> = parts
        .iter()
        .map(|id| store.entry(id).unwrap().content_type_id().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["imageWithAttribution", "richText", "embed", "richText"]);

    let embed = &store.entries_of_type("embed")[0];
    assert_eq!(field(embed, "name"), Some("Exhibition embed"));
}

#[tokio::test]
async fn test_unhandled_elements_and_missing_essences_are_skipped() {
    let source = FixtureSource::new().with_page(
        PageBuilder::new("faces/odd", "en", 3)
            .element(ElementBuilder::new("carousel").text("title", "Ignored"))
            .element(ElementBuilder::new("section").text("title", "Layout only"))
            .element(ElementBuilder::new("image").credit("image_credit", "No picture", "CC0"))
            .element(
                ElementBuilder::new("text").dangling("body", exmig::source::EssenceKind::RichText),
            ),
    );
    let (migration, store) = migration(source);

    migration.create("faces/odd").await.unwrap();

    assert_eq!(store.entry_creations(), 1);
    let chapter = &store.entries_of_type("exhibitionChapterPage")[0];
    assert!(has_part(chapter).is_empty());
}

#[tokio::test]
async fn test_failed_upload_still_creates_image_entry() {
    let (migration, store) = migration(exhibition());
    store.fail_asset(&asset_id_for(PORTRAIT));

    migration.create("faces").await.unwrap();

    let image = &store.entries_of_type("imageWithAttribution")[0];
    assert!(image.links("image").is_empty());
    assert_eq!(field(image, "name"), Some("Portrait"));
    assert_eq!(store.asset_creations(), 0);
}

#[tokio::test]
async fn test_entry_write_failure_is_fatal() {
    let (migration, store) = migration(exhibition());
    store.fail_creates_of("richText");

    let err = migration.create("faces").await.unwrap_err();
    assert!(matches!(err, MigrationError::RemoteWrite { .. }));
    assert!(store.entries_of_type("exhibitionPage").is_empty());
}

#[tokio::test]
async fn test_missing_page_is_reported() {
    let (migration, _store) = migration(exhibition());
    let err = migration.create("nope").await.unwrap_err();
    assert!(matches!(err, MigrationError::PageNotFound { .. }));
}

#[tokio::test]
async fn test_create_all_and_migrate_cover_top_level_pages() {
    let source = exhibition().with_page(PageBuilder::new("music", "en", 2));
    let (migration, store) = migration(source);
    let migration = migration.with_jobs(2);

    let report = migration.migrate().await.unwrap();

    assert_eq!(report.images.created, 1);
    assert_eq!(report.pages.len(), 2);
    assert_eq!(store.entries_of_type("exhibitionPage").len(), 2);
    // The image pass uploaded it; the transform found it
    assert_eq!(store.asset_creations(), 1);
}

#[tokio::test]
async fn test_create_all_returns_ids_in_page_order() {
    let urlnames = ["faces", "music", "maps", "letters", "coins"];
    let source = urlnames.iter().fold(exhibition(), |source, urlname| {
        if *urlname == "faces" {
            source
        } else {
            source.with_page(PageBuilder::new(urlname, "en", 2))
        }
    });
    let (migration, store) = migration(source);
    let migration = migration.with_jobs(3);

    let ids = migration.create_all().await.unwrap();

    let identifiers: Vec<String> = ids
        .iter()
        .map(|id| store.entry(id).unwrap().text("identifier", "en-GB").unwrap().to_string())
        .collect();
    assert_eq!(identifiers, urlnames);
}
