//! TrpcClient against a local mock of Civitai's tRPC endpoints.

use civitai_analyzer::civitai::{CivitaiError, FetchLimit, ImageSource, TrpcClient};
use civitai_analyzer::config::{CivitaiConfig, FetchConfig};
use civitai_analyzer::util::SecretString;
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};

fn token() -> SecretString {
    SecretString::new("t".repeat(150))
}

fn client(server: &ServerGuard, fetch: FetchConfig) -> TrpcClient {
    let civitai = CivitaiConfig {
        base_url: server.url(),
        fingerprint: Some("fp-123".to_string()),
        ..CivitaiConfig::default()
    };
    TrpcClient::new(token(), &civitai, &fetch).unwrap()
}

fn envelope(data: Value) -> String {
    json!({"result": {"data": {"json": data}}}).to_string()
}

async fn mock_json(server: &mut ServerGuard, procedure: &str, query: Matcher, data: Value) -> Mock {
    server
        .mock("GET", format!("/{}", procedure).as_str())
        .match_query(query)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(envelope(data))
        .create_async()
        .await
}

fn generation_data(prompt: &str, lora: &str) -> Value {
    json!({
        "meta": {
            "prompt": prompt,
            "negativePrompt": "lowres, blurry",
            "sampler": "Euler a",
            "steps": 30,
            "cfgScale": 7,
            "seed": 42,
        },
        "resources": [
            {"modelType": "Checkpoint", "modelName": "Pony Diffusion", "versionName": "V6 XL", "modelId": 257749, "modelVersionId": 290640},
            {"modelType": "LORA", "modelName": lora, "modelId": 58390, "modelVersionId": 62833, "strength": 0.6},
        ],
    })
}

#[tokio::test]
async fn test_fetch_collection_follows_cursor_and_builds_records() {
    let mut server = Server::new_async().await;

    let first = mock_json(
        &mut server,
        "image.getInfinite",
        Matcher::Regex("undefined".to_string()),
        json!({
            "items": [
                {"id": 2001, "name": "a.png", "url": "hash-a", "user": {"username": "alice"}},
                {"id": 2002, "name": "b.png", "url": "hash-b"},
            ],
            "nextCursor": "page2",
        }),
    )
    .await;
    let second = mock_json(
        &mut server,
        "image.getInfinite",
        Matcher::Regex("page2".to_string()),
        json!({"items": [{"id": 2003, "user": {"username": "carol"}}], "nextCursor": null}),
    )
    .await;

    let mut details = Vec::new();
    for (id, prompt) in [
        ("2001", "masterpiece, 1girl, solo, long hair"),
        ("2002", "a lighthouse on a rocky coast at dusk"),
        ("2003", "1boy, armor, castle, night"),
    ] {
        let mock = mock_json(
            &mut server,
            "image.getGenerationData",
            Matcher::Regex(id.to_string()),
            generation_data(prompt, "Detail Tweaker"),
        )
        .await;
        details.push(mock);
    }

    let _tags = mock_json(
        &mut server,
        "tag.getVotableTags",
        Matcher::Any,
        json!([
            {"name": "woman", "score": 3},
            {"name": "anime", "score": 9},
        ]),
    )
    .await;
    let author = mock_json(
        &mut server,
        "image.get",
        Matcher::Regex("2002".to_string()),
        json!({"id": 2002, "user": {"username": "bob"}}),
    )
    .await;

    let client = client(&server, FetchConfig::default());
    let records = client.fetch_collection(77, FetchLimit::All).await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    author.assert_async().await;

    let ids: Vec<u64> = records.iter().map(|r| r.image_id).collect();
    assert_eq!(ids, vec![2001, 2002, 2003]);

    let authors: Vec<&str> = records.iter().filter_map(|r| r.author.as_deref()).collect();
    assert_eq!(authors, vec!["alice", "bob", "carol"]);

    let first = &records[0];
    assert_eq!(first.prompt, "masterpiece, 1girl, solo, long hair");
    assert_eq!(first.negative_prompt, "lowres, blurry");
    assert_eq!(first.model.as_deref(), Some("Pony Diffusion"));
    assert_eq!(first.model_version.as_deref(), Some("V6 XL"));
    assert_eq!(first.steps, Some(30));
    assert_eq!(first.cfg_scale, Some(7.0));
    assert_eq!(first.loras.len(), 1);
    assert_eq!(first.loras[0].name, "Detail Tweaker");
    assert_eq!(first.loras[0].weight, 0.6);
    assert_eq!(first.tags, vec!["anime", "woman"]);
    assert!(first.image_url.as_deref().unwrap().contains("hash-a"));
}

#[tokio::test]
async fn test_limit_stops_paging_and_truncates() {
    let mut server = Server::new_async().await;
    let first = mock_json(
        &mut server,
        "image.getInfinite",
        Matcher::Regex("undefined".to_string()),
        json!({"items": [{"id": 1}, {"id": 2}, {"id": 3}], "nextCursor": "page2"}),
    )
    .await;
    let second = server
        .mock("GET", "/image.getInfinite")
        .match_query(Matcher::Regex("page2".to_string()))
        .expect(0)
        .create_async()
        .await;

    let client = client(&server, FetchConfig::default());
    let items = client.collection_items(5, FetchLimit::Count(2)).await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    let ids: Vec<u64> = items.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_max_pages_bounds_pagination() {
    let mut server = Server::new_async().await;
    let page = server
        .mock("GET", "/image.getInfinite")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(envelope(json!({"items": [{"id": 1}], "nextCursor": "more"})))
        .expect(2)
        .create_async()
        .await;

    let fetch = FetchConfig {
        max_pages: 2,
        ..FetchConfig::default()
    };
    let items = client(&server, fetch)
        .collection_items(5, FetchLimit::All)
        .await
        .unwrap();

    page.assert_async().await;
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn test_unauthorized_page_is_an_error() {
    let mut server = Server::new_async().await;
    let _page = server
        .mock("GET", "/image.getInfinite")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body("{}")
        .create_async()
        .await;

    let err = client(&server, FetchConfig::default())
        .fetch_collection(5, FetchLimit::Count(10))
        .await
        .unwrap_err();
    assert!(matches!(err, CivitaiError::Unauthorized(401)));
    assert!(err.is_auth());
}

#[tokio::test]
async fn test_failed_image_is_skipped_but_auth_failure_aborts() {
    let mut server = Server::new_async().await;
    let _page = mock_json(
        &mut server,
        "image.getInfinite",
        Matcher::Any,
        json!({"items": [{"id": 3001, "user": {"username": "a"}}, {"id": 3002, "user": {"username": "b"}}]}),
    )
    .await;
    let _tags = mock_json(&mut server, "tag.getVotableTags", Matcher::Any, json!([])).await;
    let _details = mock_json(
        &mut server,
        "image.getGenerationData",
        Matcher::Regex("3001".to_string()),
        generation_data("1girl, solo", "Film Grain"),
    )
    .await;
    let broken = server
        .mock("GET", "/image.getGenerationData")
        .match_query(Matcher::Regex("3002".to_string()))
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let client = client(&server, FetchConfig::default());
    let records = client.fetch_collection(9, FetchLimit::All).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].image_id, 3001);

    broken.remove_async().await;
    let _forbidden = server
        .mock("GET", "/image.getGenerationData")
        .match_query(Matcher::Regex("3002".to_string()))
        .with_status(403)
        .create_async()
        .await;

    let err = client.fetch_collection(9, FetchLimit::All).await.unwrap_err();
    assert!(matches!(err, CivitaiError::Unauthorized(403)));
}

#[tokio::test]
async fn test_requests_carry_session_headers() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/image.get")
        .match_query(Matcher::Any)
        .match_header("cookie", format!("__Secure-civitai-token={}", "t".repeat(150)).as_str())
        .match_header("x-client", "web")
        .match_header("x-fingerprint", "fp-123")
        .match_header("x-client-date", Matcher::Regex(r"^\d+$".to_string()))
        .with_status(200)
        .with_body(envelope(json!({"id": 5, "user": {"username": "z"}})))
        .create_async()
        .await;

    let info = client(&server, FetchConfig::default()).image_info(5).await.unwrap();
    mock.assert_async().await;
    assert_eq!(info.username().as_deref(), Some("z"));
}

#[tokio::test]
async fn test_trpc_error_envelope() {
    let mut server = Server::new_async().await;
    let _error = server
        .mock("GET", "/image.get")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({"error": {"json": {"message": "Image not found", "code": -32004}}}).to_string())
        .create_async()
        .await;

    let err = client(&server, FetchConfig::default()).fetch_image(404).await.unwrap_err();
    assert!(matches!(err, CivitaiError::Trpc(ref m) if m == "Image not found"));
}

#[tokio::test]
async fn test_null_image_is_not_found() {
    let mut server = Server::new_async().await;
    let _null = mock_json(&mut server, "image.get", Matcher::Any, Value::Null).await;

    let err = client(&server, FetchConfig::default()).fetch_image(1).await.unwrap_err();
    assert!(matches!(err, CivitaiError::NotFound(_)));
}

#[tokio::test]
async fn test_model_availability() {
    let mut server = Server::new_async().await;
    let _live = mock_json(
        &mut server,
        "modelVersion.getById",
        Matcher::Regex("111".to_string()),
        json!({"status": "Published", "model": {"name": "Live", "status": "Published"}}),
    )
    .await;
    let _deleted = mock_json(
        &mut server,
        "modelVersion.getById",
        Matcher::Regex("222".to_string()),
        json!({"status": "Published", "model": {"name": "Gone", "status": "Deleted"}}),
    )
    .await;
    let _missing = server
        .mock("GET", "/modelVersion.getById")
        .match_query(Matcher::Regex("333".to_string()))
        .with_status(404)
        .with_body("{}")
        .create_async()
        .await;

    let client = client(&server, FetchConfig::default());

    let live = client.check_model_availability(1, Some(111)).await.unwrap();
    assert_eq!(live.available, Some(true));
    assert_eq!(live.status.as_deref(), Some("Published"));
    assert_eq!(live.civitai_url, "https://civitai.com/models/1?modelVersionId=111");

    let deleted = client.check_model_availability(2, Some(222)).await.unwrap();
    assert_eq!(deleted.available, Some(false));
    assert_eq!(deleted.status.as_deref(), Some("Deleted"));

    let missing = client.check_model_availability(3, Some(333)).await.unwrap();
    assert_eq!(missing.available, Some(false));
    assert_eq!(missing.error.as_deref(), Some("Model version not found"));

    let unknown = client.check_model_availability(4, None).await.unwrap();
    assert_eq!(unknown.available, None);
    assert!(unknown.error.unwrap().contains("No model_version_id"));
}
