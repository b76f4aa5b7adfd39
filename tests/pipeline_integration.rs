//! Integration tests for the per-request pipeline.
//!
//! Drives `BookPipeline` end to end over in-memory catalogs, judge and
//! browser, with real file moves in temporary directories.

use std::path::{Path, PathBuf};

use book_courier::catalog::Format;
use book_courier::not_found::NotFoundLog;
use book_courier::pipeline::{BookPipeline, RequestOutcome};
use book_courier::request::{BookRequest, read_csv_requests};
use tempfile::TempDir;

mod support;
use support::fakes::{
    Behaviour, FakeBrowser, FakeCatalog, FakeConverter, FakeJudge, FakeMetadata, MapResolver,
    fast_downloader, hosted_candidate, mirror_candidate,
};

struct Harness {
    root: TempDir,
    primary: FakeCatalog,
    fallback: FakeCatalog,
    judge: FakeJudge,
    metadata: FakeMetadata,
    browser: FakeBrowser,
    converter: FakeConverter,
}

impl Harness {
    fn new(primary: FakeCatalog, fallback: FakeCatalog, judge: FakeJudge) -> Self {
        Self {
            root: TempDir::new().unwrap(),
            primary,
            fallback,
            judge,
            metadata: FakeMetadata::default(),
            browser: FakeBrowser::default(),
            converter: FakeConverter::default(),
        }
    }

    fn downloads(&self) -> PathBuf {
        self.root.path().join("Downloads")
    }

    fn books(&self) -> PathBuf {
        self.root.path().join("Books")
    }

    fn not_found(&self) -> NotFoundLog {
        NotFoundLog::new(self.root.path().join("Logs"))
    }

    fn pipeline(&self, links: &[(&str, &str)]) -> BookPipeline {
        BookPipeline::builder(
            Box::new(self.metadata.clone()),
            Box::new(self.primary.clone()),
            Box::new(self.judge.clone()),
            fast_downloader(&self.downloads(), MapResolver::new(links), &self.browser),
            Box::new(self.converter.clone()),
            self.not_found(),
            self.books(),
        )
        .fallback(Box::new(self.fallback.clone()))
        .build()
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn test_dune_resolves_searches_and_downloads_from_mirrors_in_order() {
    let primary = FakeCatalog::new(
        "primary",
        vec![(
            ("Dune Frank Herbert", Format::Epub),
            vec![mirror_candidate(
                "Dune",
                "epub",
                &["https://m1/dune", "https://m2/dune"],
            )],
        )],
    );
    let mut h = Harness::new(
        primary,
        FakeCatalog::empty("fallback"),
        FakeJudge::accepting(&["Dune"]),
    );
    h.metadata = FakeMetadata::found("Dune", &["Frank Herbert"]);
    h.browser = FakeBrowser::new(&[
        ("https://cdn/1", Behaviour::Stall("dune-herbert.epub")),
        ("https://cdn/2", Behaviour::Save("dune-herbert.epub")),
    ]);
    let pipeline = h.pipeline(&[
        ("https://m1/dune", "https://cdn/1"),
        ("https://m2/dune", "https://cdn/2"),
    ]);

    let outcome = pipeline
        .process(&BookRequest::title_only("dune"))
        .await
        .unwrap();

    assert_eq!(outcome, RequestOutcome::Stored(h.books().join("Dune.epub")));
    assert_eq!(*h.metadata.lookups.lock().unwrap(), ["dune"]);
    assert_eq!(
        h.primary.searches.lock().unwrap()[0],
        ("Dune Frank Herbert".to_string(), Format::Epub)
    );
    assert_eq!(
        *h.judge.asked.lock().unwrap(),
        [("Dune".to_string(), "Dune".to_string())]
    );
    assert_eq!(h.browser.visited(), ["https://cdn/1", "https://cdn/2"]);
    assert!(file_names(&h.downloads()).is_empty());
    assert!(h.not_found().titles().unwrap().is_empty());
}

#[tokio::test]
async fn test_accepted_primary_candidate_never_consults_fallback() {
    let primary = FakeCatalog::new(
        "primary",
        vec![(
            ("Emma", Format::Epub),
            vec![
                mirror_candidate("Emma: A Study Guide", "epub", &["https://m1/guide"]),
                mirror_candidate("Emma", "epub", &["https://m1/emma"]),
            ],
        )],
    );
    let fallback = FakeCatalog::new(
        "fallback",
        vec![(("Emma", Format::Epub), vec![hosted_candidate("Emma", "epub", "7")])],
    );
    let mut h = Harness::new(primary, fallback, FakeJudge::accepting(&["Emma"]));
    h.browser = FakeBrowser::new(&[("https://cdn/emma", Behaviour::Save("emma.epub"))]);
    let pipeline = h.pipeline(&[("https://m1/emma", "https://cdn/emma")]);

    let outcome = pipeline
        .process(&BookRequest::title_only("Emma"))
        .await
        .unwrap();

    assert_eq!(outcome, RequestOutcome::Stored(h.books().join("Emma.epub")));
    assert_eq!(h.judge.asked.lock().unwrap().len(), 2);
    assert_eq!(h.fallback.search_count(), 0);
    assert!(h.fallback.fetches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_fallback_fetches_hosted_file_when_primary_has_nothing() {
    let fallback = FakeCatalog::new(
        "fallback",
        vec![(
            ("Emma Jane Austen", Format::Epub),
            vec![hosted_candidate("Emma", "epub", "7")],
        )],
    );
    let mut h = Harness::new(
        FakeCatalog::empty("primary"),
        fallback,
        FakeJudge::accepting(&["Emma"]),
    );
    h.metadata = FakeMetadata::found("Emma", &["Jane Austen"]);
    let pipeline = h.pipeline(&[]);

    let outcome = pipeline
        .process(&BookRequest::title_only("emma austen"))
        .await
        .unwrap();

    assert_eq!(outcome, RequestOutcome::Stored(h.books().join("Emma.epub")));
    // The judge compares against the resolved title, not the typed one.
    assert_eq!(
        *h.judge.asked.lock().unwrap(),
        [("Emma".to_string(), "Emma".to_string())]
    );
    // Every format was tried for both queries before giving up on the primary.
    assert_eq!(h.primary.search_count(), 6);
    assert_eq!(*h.fallback.fetches.lock().unwrap(), ["Emma"]);
    assert!(h.browser.visited().is_empty());
}

#[tokio::test]
async fn test_all_candidates_rejected_records_exactly_one_not_found_entry() {
    let primary = FakeCatalog::new(
        "primary",
        vec![(
            ("Emma", Format::Epub),
            vec![mirror_candidate("Emma: Summary", "epub", &["https://m1/s"])],
        )],
    );
    let fallback = FakeCatalog::new(
        "fallback",
        vec![(
            ("Emma", Format::Epub),
            vec![hosted_candidate("Emma (Abridged)", "epub", "9")],
        )],
    );
    let h = Harness::new(primary, fallback, FakeJudge::rejecting_all());
    let pipeline = h.pipeline(&[]);

    let outcome = pipeline
        .process(&BookRequest::title_only("Emma"))
        .await
        .unwrap();

    assert_eq!(outcome, RequestOutcome::NotFound);
    assert_eq!(h.not_found().titles().unwrap(), ["Emma"]);
    assert_eq!(h.judge.asked.lock().unwrap().len(), 2);
    assert!(h.fallback.fetches.lock().unwrap().is_empty());
    assert!(file_names(&h.books()).is_empty());
}

#[tokio::test]
async fn test_listed_mirrors_stop_at_first_that_yields_a_file() {
    let mut h = Harness::new(
        FakeCatalog::empty("primary"),
        FakeCatalog::empty("fallback"),
        FakeJudge::rejecting_all(),
    );
    h.browser = FakeBrowser::new(&[
        ("https://cdn/2", Behaviour::Stall("book.epub")),
        ("https://cdn/3", Behaviour::Save("book.epub")),
    ]);
    let pipeline = h.pipeline(&[
        ("https://m1", "https://cdn/1"),
        ("https://m2", "https://cdn/2"),
        ("https://m3", "https://cdn/3"),
    ]);

    let request =
        BookRequest::with_mirrors("Dune", ["https://m1", "https://m2", "https://m3"]);
    let outcome = pipeline.process(&request).await.unwrap();

    assert_eq!(outcome, RequestOutcome::Stored(h.books().join("Dune.epub")));
    assert_eq!(
        h.browser.visited(),
        ["https://cdn/1", "https://cdn/2", "https://cdn/3"]
    );
    // Explicit mirrors bypass lookup and search entirely.
    assert!(h.metadata.lookups.lock().unwrap().is_empty());
    assert_eq!(h.primary.search_count(), 0);
    assert!(file_names(&h.downloads()).is_empty());
}

#[tokio::test]
async fn test_every_mirror_failing_is_not_found_and_leaves_no_partials() {
    let mut h = Harness::new(
        FakeCatalog::empty("primary"),
        FakeCatalog::empty("fallback"),
        FakeJudge::rejecting_all(),
    );
    h.browser = FakeBrowser::new(&[("https://cdn/1", Behaviour::Stall("book.epub"))]);
    let pipeline = h.pipeline(&[("https://m1", "https://cdn/1")]);

    let outcome = pipeline
        .process(&BookRequest::with_mirrors("Dune", ["https://m1", "https://m2"]))
        .await
        .unwrap();

    assert_eq!(outcome, RequestOutcome::NotFound);
    assert_eq!(h.not_found().titles().unwrap(), ["Dune"]);
    assert!(file_names(&h.downloads()).is_empty());
}

#[tokio::test]
async fn test_explicit_link_is_downloaded_under_request_title() {
    let mut h = Harness::new(
        FakeCatalog::empty("primary"),
        FakeCatalog::empty("fallback"),
        FakeJudge::rejecting_all(),
    );
    h.browser = FakeBrowser::new(&[("https://cdn/x", Behaviour::Save("x1234.EPUB"))]);
    let pipeline = h.pipeline(&[("https://mirror/x", "https://cdn/x")]);

    let outcome = pipeline
        .process(&BookRequest::with_link("The Hobbit", "https://mirror/x"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RequestOutcome::Stored(h.books().join("The Hobbit.epub"))
    );
    assert_eq!(h.judge.asked.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn test_mobi_download_is_converted_and_removed_from_downloads() {
    let mut h = Harness::new(
        FakeCatalog::empty("primary"),
        FakeCatalog::empty("fallback"),
        FakeJudge::rejecting_all(),
    );
    h.browser = FakeBrowser::new(&[("https://cdn/1", Behaviour::Save("dune.mobi"))]);
    let pipeline = h.pipeline(&[("https://m1", "https://cdn/1")]);

    let outcome = pipeline
        .process(&BookRequest::with_mirrors("Dune", ["https://m1"]))
        .await
        .unwrap();

    assert_eq!(outcome, RequestOutcome::Stored(h.books().join("Dune.epub")));
    assert_eq!(h.converter.calls.lock().unwrap().len(), 1);
    assert!(file_names(&h.downloads()).is_empty());
    assert_eq!(file_names(&h.books()), ["Dune.epub"]);
}

#[tokio::test]
async fn test_failed_conversion_stores_original_unmodified() {
    let mut h = Harness::new(
        FakeCatalog::empty("primary"),
        FakeCatalog::empty("fallback"),
        FakeJudge::rejecting_all(),
    );
    h.converter = FakeConverter::failing();
    h.browser = FakeBrowser::new(&[("https://cdn/1", Behaviour::Save("dune.azw3"))]);
    let pipeline = h.pipeline(&[("https://m1", "https://cdn/1")]);

    let outcome = pipeline
        .process(&BookRequest::with_mirrors("Dune", ["https://m1"]))
        .await
        .unwrap();

    let stored = h.books().join("Dune.azw3");
    assert_eq!(outcome, RequestOutcome::Stored(stored.clone()));
    assert_eq!(std::fs::read(&stored).unwrap(), b"ebook");
    assert!(file_names(&h.downloads()).is_empty());
}

#[tokio::test]
async fn test_batch_from_csv_continues_past_failures() {
    let mut h = Harness::new(
        FakeCatalog::empty("primary"),
        FakeCatalog::empty("fallback"),
        FakeJudge::rejecting_all(),
    );
    h.browser = FakeBrowser::new(&[("https://cdn/emma", Behaviour::Save("emma.epub"))]);
    let pipeline = h.pipeline(&[("https://m/emma", "https://cdn/emma")]);

    let csv_path = h.root.path().join("books.csv");
    std::fs::write(
        &csv_path,
        "Title,Mirror_1,Mirror_2,Mirror_3\n\
         Missing Book,https://m/none,,\n\
         Emma,https://m/emma,,\n",
    )
    .unwrap();
    let requests = read_csv_requests(&csv_path).unwrap();
    assert_eq!(requests.len(), 2);

    let summary = pipeline.run_batch(&requests).await;

    assert_eq!(summary.stored, [h.books().join("Emma.epub")]);
    assert_eq!(summary.not_found, ["Missing Book"]);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.total(), 2);
    assert_eq!(h.not_found().titles().unwrap(), ["Missing Book"]);
}

#[tokio::test]
async fn test_batch_reports_progress_positions() {
    let h = Harness::new(
        FakeCatalog::empty("primary"),
        FakeCatalog::empty("fallback"),
        FakeJudge::rejecting_all(),
    );
    let pipeline = h.pipeline(&[]);
    let requests = [BookRequest::title_only("A"), BookRequest::title_only("B")];

    let mut seen = Vec::new();
    let summary = pipeline
        .run_batch_with_progress(&requests, |position, total, request| {
            seen.push(format!("{position}/{total} {}", request.title));
        })
        .await;

    assert_eq!(seen, ["1/2 A", "2/2 B"]);
    assert_eq!(summary.not_found, ["A", "B"]);
}
