//! End-to-end search loop tests against mock eLibrary and Scholar servers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use elibscrape::config::ScraperConfig;
use elibscrape::extractors::{ElibraryExtractor, ElibraryIndexExtractor, ScholarExtractor};
use elibscrape::pipeline::{run_with_shutdown, StopReason};
use elibscrape::ScrapeError;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer, output: &Path, num_articles: usize) -> ScraperConfig {
    ScraperConfig {
        topic: "game engine".to_string(),
        num_articles,
        output_path: Some(output.to_path_buf()),
        delay_min: 0.0,
        delay_max: 0.0,
        timeout: 5,
        base_url: Some(server.uri()),
        max_retries: 3,
        ..Default::default()
    }
}

fn listing_html(ids: &[u32]) -> String {
    let rows: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<tr id="a{id}"><td align="left"><a href="/item.asp?id={id}"><b>Article {id}</b></a><br><i>Ivanov I.I.</i><br>Journal of Tests. 2020. Vol. 1.</td></tr>"#
            )
        })
        .collect();
    format!("<html><body><table>{rows}</table></body></html>")
}

const DETAIL_HTML: &str = r#"<html><body>
<table width="580"><tr><td>Журнал: <a href="contents.asp?id=9">Journal of Tests</a> Том: 7 Номер: 2</td></tr></table>
<div id="abstract1">An abstract.</div>
</body></html>"#;

async fn mount_listing(server: &MockServer, page: u32, body: String) {
    Mock::given(method("GET"))
        .and(path("/query_results.asp"))
        .and(query_param("pagenum", page.to_string()))
        .and(query_param("ftext", "game engine"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_details(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/item.asp"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DETAIL_HTML))
        .mount(server)
        .await;
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .expect("open output");
    reader
        .records()
        .map(|r| r.expect("row").iter().map(String::from).collect())
        .collect()
}

// =============================================================================
// Termination
// =============================================================================

#[tokio::test]
async fn test_stops_at_target() {
    let server = MockServer::start().await;
    mount_listing(&server, 1, listing_html(&[1, 2, 3])).await;
    mount_listing(&server, 2, listing_html(&[4, 5])).await;
    Mock::given(method("GET"))
        .and(path("/query_results.asp"))
        .and(query_param("pagenum", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&[])))
        .expect(0)
        .mount(&server)
        .await;
    mount_details(&server).await;

    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("out.csv");
    let summary = run_with_shutdown(
        test_config(&server, &output, 4),
        &ElibraryExtractor,
        std::future::pending(),
    )
    .await
    .expect("run succeeds");

    assert_eq!(summary.emitted, 4);
    assert_eq!(summary.reason, StopReason::TargetReached);

    let rows = read_rows(&output);
    assert_eq!(rows.len(), 5);
    assert_eq!(
        rows[0],
        vec!["title", "authors", "year", "journal", "volume", "issue", "journal_info", "abstract", "url"]
    );
    for row in &rows[1..] {
        assert!(!row[0].is_empty(), "title present");
        assert!(row[8].starts_with(&server.uri()), "absolute url");
        assert_eq!(row[2], "2020");
        assert_eq!(row[3], "Journal of Tests");
        assert_eq!(row[4], "7");
        assert_eq!(row[7], "An abstract.");
    }
    assert_eq!(rows[4][0], "Article 4");
}

#[tokio::test]
async fn test_exhausted_results_end_without_error() {
    let server = MockServer::start().await;
    mount_listing(&server, 1, listing_html(&[1, 2])).await;
    Mock::given(method("GET"))
        .and(path("/query_results.asp"))
        .and(query_param("pagenum", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&[])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/query_results.asp"))
        .and(query_param("pagenum", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&[9])))
        .expect(0)
        .mount(&server)
        .await;
    mount_details(&server).await;

    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("out.csv");
    let summary = run_with_shutdown(
        test_config(&server, &output, 10),
        &ElibraryExtractor,
        std::future::pending(),
    )
    .await
    .expect("run succeeds");

    assert_eq!(summary.emitted, 2);
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.reason, StopReason::Exhausted);
    assert_eq!(read_rows(&output).len(), 3);
}

#[tokio::test]
async fn test_empty_first_page_fetches_no_details() {
    let server = MockServer::start().await;
    mount_listing(&server, 1, "<html><body>Nothing found</body></html>".to_string()).await;
    Mock::given(method("GET"))
        .and(path("/item.asp"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("out.csv");
    let summary = run_with_shutdown(
        test_config(&server, &output, 5),
        &ElibraryExtractor,
        std::future::pending(),
    )
    .await
    .expect("run succeeds");

    assert_eq!(summary.emitted, 0);
    assert_eq!(read_rows(&output).len(), 1, "header only");
}

#[tokio::test]
async fn test_unusable_rows_do_not_stop_the_run() {
    let server = MockServer::start().await;
    let unusable = r#"<html><body><table>
<tr id="a1"><td align="left">Sponsored link</td></tr>
<tr id="a2"><td align="left"><a href="/author_items.asp?id=5">Author page</a></td></tr>
</table></body></html>"#;
    mount_listing(&server, 1, unusable.to_string()).await;
    mount_listing(&server, 2, listing_html(&[11, 12])).await;
    mount_details(&server).await;

    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("out.csv");
    let summary = run_with_shutdown(
        test_config(&server, &output, 2),
        &ElibraryExtractor,
        std::future::pending(),
    )
    .await
    .expect("run succeeds");

    assert_eq!(summary.emitted, 2);
    assert_eq!(summary.pages, 2);
    let rows = read_rows(&output);
    assert_eq!(rows[1][0], "Article 11");
}

#[tokio::test]
async fn test_page_limit() {
    let server = MockServer::start().await;
    mount_listing(&server, 1, listing_html(&[1])).await;
    Mock::given(method("GET"))
        .and(path("/query_results.asp"))
        .and(query_param("pagenum", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&[2])))
        .expect(0)
        .mount(&server)
        .await;
    mount_details(&server).await;

    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("out.csv");
    let config = ScraperConfig {
        max_pages: Some(1),
        ..test_config(&server, &output, 5)
    };
    let summary = run_with_shutdown(config, &ElibraryExtractor, std::future::pending())
        .await
        .expect("run succeeds");

    assert_eq!(summary.emitted, 1);
    assert_eq!(summary.reason, StopReason::PageLimit);
}

#[tokio::test]
async fn test_page_limit_does_not_wait_after_last_page() {
    let server = MockServer::start().await;
    let unusable = r#"<html><body><table><tr id="a1"><td align="left">Sponsored link</td></tr></table></body></html>"#;
    mount_listing(&server, 1, unusable.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/query_results.asp"))
        .and(query_param("pagenum", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&[2])))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("out.csv");
    let config = ScraperConfig {
        max_pages: Some(1),
        delay_min: 30.0,
        delay_max: 30.0,
        ..test_config(&server, &output, 5)
    };
    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        run_with_shutdown(config, &ElibraryExtractor, std::future::pending()),
    )
    .await
    .expect("no delay after the last allowed page")
    .expect("run succeeds");

    assert_eq!(summary.emitted, 0);
    assert_eq!(summary.reason, StopReason::PageLimit);
}

#[tokio::test]
async fn test_duplicate_urls_saved_once() {
    let server = MockServer::start().await;
    mount_listing(&server, 1, listing_html(&[1, 2])).await;
    mount_listing(&server, 2, listing_html(&[2, 3])).await;
    mount_listing(&server, 3, listing_html(&[])).await;
    mount_details(&server).await;

    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("out.csv");
    let summary = run_with_shutdown(
        test_config(&server, &output, 10),
        &ElibraryExtractor,
        std::future::pending(),
    )
    .await
    .expect("run succeeds");

    assert_eq!(summary.emitted, 3);
    let urls: Vec<String> = read_rows(&output)[1..].iter().map(|r| r[8].clone()).collect();
    assert_eq!(urls.len(), 3);
    assert!(urls[2].ends_with("item.asp?id=3"));
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn test_network_errors_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query_results.asp"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("out.csv");
    let result = run_with_shutdown(
        test_config(&server, &output, 5),
        &ElibraryExtractor,
        std::future::pending(),
    )
    .await;

    assert!(matches!(
        result,
        Err(ScrapeError::FetchExhausted { page: 1, attempts: 3 })
    ));
    assert_eq!(read_rows(&output).len(), 1, "output still closed with header");
}

#[tokio::test]
async fn test_retries_same_page_after_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query_results.asp"))
        .and(query_param("pagenum", "1"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_listing(&server, 1, listing_html(&[1, 2])).await;
    mount_details(&server).await;

    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("out.csv");
    let summary = run_with_shutdown(
        test_config(&server, &output, 2),
        &ElibraryExtractor,
        std::future::pending(),
    )
    .await
    .expect("third attempt succeeds");

    assert_eq!(summary.emitted, 2);
    assert_eq!(summary.pages, 1);
}

#[tokio::test]
async fn test_failed_detail_page_keeps_record() {
    let server = MockServer::start().await;
    mount_listing(&server, 1, listing_html(&[1])).await;
    Mock::given(method("GET"))
        .and(path("/item.asp"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("out.csv");
    let summary = run_with_shutdown(
        test_config(&server, &output, 1),
        &ElibraryIndexExtractor,
        std::future::pending(),
    )
    .await
    .expect("run succeeds");

    assert_eq!(summary.emitted, 1);
    let rows = read_rows(&output);
    assert_eq!(rows[0], vec!["title", "year", "type", "abstract", "in_rinc", "url"]);
    assert_eq!(rows[1][0], "Article 1");
    assert_eq!(rows[1][1], "2020");
    assert_eq!(rows[1][2], "");
    assert_eq!(rows[1][3], "");
    assert_eq!(rows[1][4], "no");
    assert!(rows[1][5].ends_with("/item.asp?id=1"));
}

#[tokio::test]
async fn test_block_page_is_fatal() {
    let server = MockServer::start().await;
    mount_listing(&server, 1, listing_html(&[1])).await;
    mount_listing(
        &server,
        2,
        "<html><body><p>Ваш IP-адрес был заблокирован.</p></body></html>".to_string(),
    )
    .await;
    mount_details(&server).await;

    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("out.csv");
    let result = run_with_shutdown(
        test_config(&server, &output, 5),
        &ElibraryExtractor,
        std::future::pending(),
    )
    .await;

    assert!(matches!(result, Err(ScrapeError::Captcha)));
    let rows = read_rows(&output);
    assert_eq!(rows.len(), 2, "row saved before the block is kept");
    assert_eq!(rows[1][0], "Article 1");
}

#[tokio::test]
async fn test_unwritable_output_fails_before_fetching() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&[1])))
        .expect(0)
        .mount(&server)
        .await;

    // A directory cannot be opened as the output file
    let dir = TempDir::new().expect("tempdir");
    let result = run_with_shutdown(
        test_config(&server, dir.path(), 1),
        &ElibraryExtractor,
        std::future::pending(),
    )
    .await;

    assert!(matches!(result, Err(ScrapeError::Io(_)) | Err(ScrapeError::Csv(_))));
}

/// Resolves once `path` holds the header plus at least one record.
async fn first_record_saved(path: PathBuf) {
    loop {
        let text = std::fs::read_to_string(&path).unwrap_or_default();
        if text.lines().count() >= 2 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_interrupt_mid_page_keeps_saved_records() {
    let server = MockServer::start().await;
    mount_listing(&server, 1, listing_html(&[1, 2, 3])).await;
    mount_details(&server).await;

    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("out.csv");
    // The run sits in the post-record delay when the interrupt lands
    let config = ScraperConfig {
        delay_min: 5.0,
        delay_max: 5.0,
        ..test_config(&server, &output, 5)
    };
    let result = run_with_shutdown(config, &ElibraryExtractor, first_record_saved(output.clone())).await;

    assert!(matches!(result, Err(ScrapeError::Interrupted { written: 1 })));
    let rows = read_rows(&output);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][0], "Article 1");

    let details_fetched = server
        .received_requests()
        .await
        .expect("recording enabled")
        .iter()
        .filter(|r| r.url.path() == "/item.asp")
        .count();
    assert_eq!(details_fetched, 1);
}

#[tokio::test]
async fn test_interrupt_closes_output() {
    let server = MockServer::start().await;
    mount_listing(&server, 1, listing_html(&[1])).await;
    mount_details(&server).await;

    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("out.csv");
    let result = run_with_shutdown(
        test_config(&server, &output, 5),
        &ElibraryExtractor,
        std::future::ready(()),
    )
    .await;

    assert!(matches!(result, Err(ScrapeError::Interrupted { written: 0 })));
    assert_eq!(read_rows(&output).len(), 1);
}

// =============================================================================
// Incremental output
// =============================================================================

#[tokio::test]
async fn test_second_run_appends_without_header() {
    let server = MockServer::start().await;
    mount_listing(&server, 1, listing_html(&[1, 2, 3])).await;
    mount_details(&server).await;

    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("out.csv");
    for n in [2, 3] {
        run_with_shutdown(
            test_config(&server, &output, n),
            &ElibraryExtractor,
            std::future::pending(),
        )
        .await
        .expect("run succeeds");
    }

    let rows = read_rows(&output);
    assert_eq!(rows.len(), 1 + 2 + 3);
    assert_eq!(rows.iter().filter(|r| r[0] == "title").count(), 1);
}

// =============================================================================
// Google Scholar
// =============================================================================

fn scholar_listing_html(ids: &[u32]) -> String {
    let rows: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<div class="gs_r gs_or gs_scl"><h3 class="gs_rt"><a href="/paper/{id}">Netcode study {id}</a></h3><div class="gs_a">J Smith - Game Journal, 2018 - example.org</div></div>"#
            )
        })
        .collect();
    format!("<html><body><div id=\"gs_res_ccl_mid\">{rows}</div></body></html>")
}

const SCHOLAR_DETAIL_HTML: &str = r#"<html><head>
<meta name="citation_keywords" content="netcode; multiplayer">
<meta name="description" content="Lag compensation in practice.">
</head><body></body></html>"#;

async fn mount_scholar_listing(server: &MockServer, start: &str, body: String) {
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("start", start))
        .and(query_param("q", "game engine"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_scholar_captcha_ends_run_after_saved_rows() {
    let server = MockServer::start().await;
    mount_scholar_listing(&server, "0", scholar_listing_html(&[1, 2])).await;
    mount_scholar_listing(
        &server,
        "10",
        "<html><body>Our systems have detected unusual traffic from your computer network.</body></html>"
            .to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/paper/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SCHOLAR_DETAIL_HTML, "text/html"))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("out.csv");
    let result = run_with_shutdown(
        test_config(&server, &output, 5),
        &ScholarExtractor::new(Vec::new()),
        std::future::pending(),
    )
    .await;

    assert!(matches!(result, Err(ScrapeError::Captcha)));

    let rows = read_rows(&output);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], vec!["title", "year", "url", "keywords"]);
    assert_eq!(rows[1][0], "Netcode study 1");
    assert_eq!(rows[1][1], "2018");
    assert!(rows[1][2].ends_with("/paper/1"));
    assert_eq!(rows[1][3], "netcode, multiplayer");
    assert_eq!(rows[2][0], "Netcode study 2");
}
