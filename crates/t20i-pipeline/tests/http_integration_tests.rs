//! HTTP integration tests
//!
//! Exercise the stages that talk to outside services against wiremock:
//! the archive download during ingestion and the Telegram status alert sent
//! after every invocation.

mod helpers;

use helpers::{
    archive_entries, init_tracing, test_config, zip_archive, MatchFixture, MemoryServices,
};
use t20i_common::PipelineError;
use t20i_pipeline::alerts::TelegramAlerts;
use t20i_pipeline::config::TelegramConfig;
use t20i_pipeline::runtime::{self, invoke};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARCHIVE_PATH: &str = "/downloads/t20s_male_json.zip";

async fn archive_server(body: Vec<u8>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;
    server
}

fn telegram(server: &MockServer) -> TelegramAlerts {
    TelegramAlerts::with_api_base(
        TelegramConfig {
            bot_token: "42:token".to_string(),
            chat_id: "-1001".to_string(),
        },
        server.uri(),
    )
    .expect("Failed to build Telegram client")
}

#[tokio::test]
async fn test_ingestion_downloads_archive_and_alerts() {
    init_tracing();

    let first = MatchFixture::new("2024-06-02", "Canada", "USA").with_sequence(2610);
    let second = MatchFixture::new("2024-06-03", "Oman", "Namibia").with_sequence(2611);
    let archive = zip_archive(&archive_entries(&[(3001, &first), (3002, &second)]));
    let server = archive_server(archive).await;

    Mock::given(method("POST"))
        .and(path("/bot42:token/sendMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.cricsheet_url = format!("{}{}", server.uri(), ARCHIVE_PATH);
    let memory = MemoryServices::new(config).await;
    let alerts = telegram(&server);

    let response = invoke("ingest", &alerts, runtime::ingest(&memory.services)).await;
    assert!(response.is_success(), "{:?}", response);
    assert!(response.body.contains("3001.json, 3002.json"), "{}", response.body);

    let response = invoke("ingest", &alerts, runtime::ingest(&memory.services)).await;
    assert_eq!(response.status_code, 200);
    assert!(response.body.starts_with("No new files"), "{}", response.body);

    let requests = server.received_requests().await.unwrap();
    let alerts: Vec<serde_json::Value> = requests
        .iter()
        .filter(|r| r.url.path().ends_with("/sendMessage"))
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0]["chat_id"], "-1001");
    assert_eq!(alerts[0]["parse_mode"], "HTML");
    assert!(alerts[0]["text"].as_str().unwrap().contains("SUCCESS"));
}

#[tokio::test]
async fn test_failed_download_reports_internal_error() {
    init_tracing();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot42:token/sendMessage"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.cricsheet_url = format!("{}{}", server.uri(), ARCHIVE_PATH);
    let memory = MemoryServices::new(config).await;

    let response = invoke("ingest", &telegram(&server), runtime::ingest(&memory.services)).await;
    assert_eq!(response.status_code, 500);
    assert!(response.body.starts_with("Internal Server Error:"), "{}", response.body);
    assert!(memory.objects.is_empty().await, "nothing stored on failure");

    let requests = server.received_requests().await.unwrap();
    let alert = requests
        .iter()
        .find(|r| r.url.path().ends_with("/sendMessage"))
        .expect("an alert is sent on failure");
    let alert: serde_json::Value = serde_json::from_slice(&alert.body).unwrap();
    assert!(alert["text"].as_str().unwrap().contains("ERROR"));
}

#[tokio::test]
async fn test_unreachable_alert_channel_does_not_fail_the_stage() {
    init_tracing();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let response = invoke("export", &telegram(&server), async {
        Ok::<_, PipelineError>("Exported 2 matches".to_string())
    })
    .await;

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body, "Exported 2 matches");
}
