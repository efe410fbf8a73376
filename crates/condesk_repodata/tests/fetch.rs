use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Method, Response, StatusCode};
use axum::routing::get;
use axum::serve;
use condesk_repodata::{RepodataSource, load_repodata};
use reqwest_middleware::ClientWithMiddleware;
use tempfile::tempdir;
use tokio::net::TcpListener;
use url::Url;

fn bz2(contents: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(contents).unwrap();
    encoder.finish().unwrap()
}

fn repodata_body(canonical: &str, size: u64) -> Vec<u8> {
    bz2(format!(r#"{{"packages": {{"{canonical}": {{"size": {size}}}}}}}"#).as_bytes())
}

/// Serves one channel per path prefix and counts GET requests separately from
/// the automatic HEAD responses axum derives for GET routes.
struct TestChannelServer {
    base: Url,
    gets: Arc<AtomicUsize>,
}

impl TestChannelServer {
    async fn spawn(channels: HashMap<&'static str, Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = Url::parse(&format!("http://{addr}")).unwrap();
        let gets = Arc::new(AtomicUsize::new(0));

        let mut router = Router::new();
        for (channel, body) in channels {
            let counter = gets.clone();
            router = router.route(
                &format!("/{channel}/linux-64/repodata.json.bz2"),
                get(move |method: Method| {
                    let body = body.clone();
                    let counter = counter.clone();
                    async move {
                        if method == Method::GET {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }
                        Response::builder()
                            .status(StatusCode::OK)
                            .header(CONTENT_TYPE, "application/octet-stream")
                            .header(CONTENT_LENGTH, body.len())
                            .body(Body::from(body))
                            .unwrap()
                    }
                }),
            );
        }

        let server = serve(listener, router);
        tokio::spawn(async move {
            let _ = server.await;
        });

        Self { base, gets }
    }

    fn channel(&self, name: &str) -> Url {
        self.base.join(name).unwrap()
    }

    fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn downloads_both_artifacts_and_parses_the_decompressed_one() {
    let server = TestChannelServer::spawn(HashMap::from([(
        "main",
        repodata_body("numpy-1.10.0-py36_0", 100),
    )]))
    .await;
    let cache = tempdir().unwrap();
    let source = RepodataSource::new(ClientWithMiddleware::default(), cache.path());

    let outcome = source.update(&[server.channel("main")], "linux-64").await;
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.files.len(), 1);

    let document = &outcome.files[0];
    assert!(document.to_string_lossy().ends_with("repodata.json"));
    let compressed = document.with_file_name(format!(
        "{}.bz2",
        document.file_name().unwrap().to_string_lossy()
    ));
    assert!(compressed.is_file(), "compressed artifact must be kept");

    let parsed = load_repodata(std::slice::from_ref(document));
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].packages["numpy-1.10.0-py36_0"].size, Some(100));
}

#[tokio::test]
async fn matching_local_size_skips_the_body_request() {
    let body = repodata_body("numpy-1.10.0-py36_0", 100);
    let server = TestChannelServer::spawn(HashMap::from([("main", body.clone())])).await;
    let cache = tempdir().unwrap();
    let source = RepodataSource::new(ClientWithMiddleware::default(), cache.path());
    let channel = server.channel("main");

    // First refresh downloads the body.
    let outcome = source.update(std::slice::from_ref(&channel), "linux-64").await;
    assert!(outcome.errors.is_empty());
    assert_eq!(server.get_count(), 1);

    // Second refresh sees the matching content-length and issues no GET.
    let outcome = source.update(std::slice::from_ref(&channel), "linux-64").await;
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.files.len(), 1);
    assert_eq!(server.get_count(), 1, "a current file must not be re-fetched");
}

#[tokio::test]
async fn stale_local_file_is_downloaded_again() {
    let body = repodata_body("numpy-1.11.0-py36_0", 110);
    let server = TestChannelServer::spawn(HashMap::from([("main", body.clone())])).await;
    let cache = tempdir().unwrap();
    let source = RepodataSource::new(ClientWithMiddleware::default(), cache.path());
    let channel = server.channel("main");

    // Seed a cached artifact with a different size.
    let url = RepodataSource::repodata_url(&channel, "linux-64");
    let stale = source.cache_path(&url);
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, b"stale").unwrap();

    let outcome = source.update(std::slice::from_ref(&channel), "linux-64").await;
    assert!(outcome.errors.is_empty());
    assert_eq!(server.get_count(), 1);
    assert_eq!(std::fs::read(&stale).unwrap(), body);
}

#[tokio::test]
async fn one_unreachable_channel_does_not_block_the_others() {
    let server = TestChannelServer::spawn(HashMap::from([
        ("one", repodata_body("numpy-1.10.0-py36_0", 100)),
        ("three", repodata_body("scipy-0.17.0-py36_0", 300)),
    ]))
    .await;
    let cache = tempdir().unwrap();
    let source = RepodataSource::new(ClientWithMiddleware::default(), cache.path());

    // The middle channel points at a closed port.
    let unreachable = Url::parse("http://127.0.0.1:9/two").unwrap();
    let channels = [
        server.channel("one"),
        unreachable,
        server.channel("three"),
    ];

    let outcome = source.update(&channels, "linux-64").await;
    assert_eq!(outcome.files.len(), 2);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.last_error().is_some());
    assert!(!outcome.is_total_failure());

    let merged = load_repodata(&outcome.files);
    let names: Vec<&String> = merged
        .iter()
        .flat_map(|document| document.packages.keys())
        .collect();
    assert_eq!(names, ["numpy-1.10.0-py36_0", "scipy-0.17.0-py36_0"]);
}

#[tokio::test]
async fn missing_channel_path_records_an_http_error() {
    let server = TestChannelServer::spawn(HashMap::from([(
        "main",
        repodata_body("numpy-1.10.0-py36_0", 100),
    )]))
    .await;
    let cache = tempdir().unwrap();
    let source = RepodataSource::new(ClientWithMiddleware::default(), cache.path());

    let outcome = source
        .update(&[server.channel("nonexistent")], "linux-64")
        .await;
    assert!(outcome.is_total_failure());
    assert_eq!(outcome.errors.len(), 1);
}
