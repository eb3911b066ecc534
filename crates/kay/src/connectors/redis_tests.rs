//! Tests for Redis source.

use super::*;
use crate::relay::{self, RelayItem};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn item(uuid: &str) -> String {
    json!({ "uuid": uuid, "origin": "https://example.com/repo.git", "data": {} }).to_string()
}

async fn mount_lrange(server: &MockServer, entries: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/LRANGE"))
        .and(body_json(json!({ "args": ["items", "0", "-1"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": entries })))
        .expect(1)
        .mount(server)
        .await;
}

#[test]
fn test_redis_config_defaults() {
    let config: RedisConfig = serde_yaml::from_str("url: redis://localhost:6379\n").unwrap();
    assert_eq!(config.queue, "items");
    assert_eq!(config.timeout, 30);
    assert!(config.password.is_none());
}

#[test]
fn test_redis_config_ignores_unknown_keys() {
    let yaml = "url: redis://localhost:6379\nqueue: jobs\nes_url: http://es:9200\n";
    let config: RedisConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.queue, "jobs");
}

#[test]
fn test_redis_build_api_url() {
    assert_eq!(
        RedisSource::build_api_url("redis://localhost:6379/"),
        "http://localhost:6379"
    );
    assert_eq!(
        RedisSource::build_api_url("rediss://cloud.redis.io:6380"),
        "https://cloud.redis.io:6380"
    );
}

#[test]
fn test_redis_source_invalid_url() {
    let result = RedisSource::new(RedisConfig::new("localhost:6379"));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_decode_entry_accepts_text_and_objects() {
    assert_eq!(decode_entry(json!(item("a"))).unwrap().id(), "a");
    assert_eq!(decode_entry(json!({ "uuid": "b" })).unwrap().id(), "b");
    assert!(matches!(
        decode_entry(json!("not json")),
        Err(Error::SourceRead(_))
    ));
}

#[tokio::test]
async fn test_redis_fill_reads_and_trims() {
    let server = MockServer::start().await;
    mount_lrange(&server, json!([item("1"), item("2"), item("3")])).await;
    Mock::given(method("POST"))
        .and(path("/LTRIM"))
        .and(body_json(json!({ "args": ["items", "3", "-1"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "OK" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut source = RedisSource::new(RedisConfig::new(server.uri())).unwrap();
    let (writer, mut reader) = relay::channel(10);

    let count = source.fill(writer).await.unwrap();

    assert_eq!(count, 3);
    for expected in ["1", "2", "3"] {
        match reader.get().await {
            Some(RelayItem::Record(record)) => assert_eq!(record.id(), expected),
            other => panic!("unexpected item: {:?}", other),
        }
    }
    assert_eq!(reader.get().await, Some(RelayItem::EndOfStream));
}

#[tokio::test]
async fn test_redis_fill_empty_queue_skips_trim() {
    let server = MockServer::start().await;
    mount_lrange(&server, json!([])).await;
    Mock::given(method("POST"))
        .and(path("/LTRIM"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "OK" })))
        .expect(0)
        .mount(&server)
        .await;

    let mut source = RedisSource::new(RedisConfig::new(server.uri())).unwrap();
    let (writer, mut reader) = relay::channel(10);

    assert_eq!(source.fill(writer).await.unwrap(), 0);
    assert_eq!(reader.get().await, Some(RelayItem::EndOfStream));
}

#[tokio::test]
async fn test_redis_stopped_fill_trims_only_enqueued_entries() {
    let server = MockServer::start().await;
    let entries: Vec<String> = (0..5).map(|i| item(&i.to_string())).collect();
    mount_lrange(&server, json!(entries)).await;
    Mock::given(method("POST"))
        .and(path("/LTRIM"))
        .and(body_json(json!({ "args": ["items", "2", "-1"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "OK" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut source = RedisSource::new(RedisConfig::new(server.uri())).unwrap();
    let (writer, mut reader) = relay::channel(2);
    let stop = CancellationToken::new();

    // Stop once the relay is full and the third put is waiting.
    let observed = &reader;
    let stopper = async {
        while observed.depth() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        stop.cancel();
    };
    let (result, ()) = tokio::join!(source.fill(writer.with_stop(stop.clone())), stopper);

    assert!(matches!(result, Err(Error::Interrupted)));
    for expected in ["0", "1"] {
        match reader.get().await {
            Some(RelayItem::Record(record)) => assert_eq!(record.id(), expected),
            other => panic!("unexpected item: {:?}", other),
        }
    }
    assert_eq!(reader.get().await, None);
}

#[tokio::test]
async fn test_redis_malformed_item_leaves_queue_untouched() {
    let server = MockServer::start().await;
    mount_lrange(&server, json!([item("1"), "\u{80}pickled"])).await;
    Mock::given(method("POST"))
        .and(path("/LTRIM"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "OK" })))
        .expect(0)
        .mount(&server)
        .await;

    let mut source = RedisSource::new(RedisConfig::new(server.uri())).unwrap();
    let (writer, reader) = relay::channel(10);

    let result = source.fill(writer).await;

    assert!(matches!(result, Err(Error::SourceRead(_))));
    assert_eq!(reader.depth(), 0);
}

#[tokio::test]
async fn test_redis_unavailable_is_source_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/LRANGE"))
        .respond_with(ResponseTemplate::new(503).set_body_string("loading"))
        .mount(&server)
        .await;

    let mut source = RedisSource::new(RedisConfig::new(server.uri())).unwrap();
    let (writer, _reader) = relay::channel(10);

    let result = source.fill(writer).await;

    match result {
        Err(Error::SourceRead(msg)) => assert!(msg.contains("503")),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_redis_password_sent_as_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/LRANGE"))
        .and(header("Authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = RedisConfig::new(server.uri());
    config.password = Some("s3cret".to_string());
    let mut source = RedisSource::new(config).unwrap();
    let (writer, _reader) = relay::channel(10);

    assert!(source.fill(writer).await.is_ok());
}
