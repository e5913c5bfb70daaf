mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use github_app_mcp::config::Settings;
use github_app_mcp::figma::FigmaClient;
use github_app_mcp::http::{router, AppState};
use httpmock::Method::{GET, PUT};
use httpmock::MockServer;
use serde_json::{json, Value};
use tower::ServiceExt;

fn state(mock: &MockServer, installations: Vec<u64>) -> AppState {
    let app = common::StubApp::new(mock.base_url(), installations);
    AppState::new(
        Ok(common::resolver(&app)),
        FigmaClient::new(
            mock.base_url(),
            Some("figma-token".to_string()),
            Some("proj-1".to_string()),
        ),
        Settings::default().diagnostics(),
    )
}

fn unconfigured_state() -> AppState {
    AppState::new(
        Err("GITHUB_APP_ID not set".to_string()),
        FigmaClient::new("http://127.0.0.1:9", None, None),
        Settings::default().diagnostics(),
    )
}

async fn send(state: AppState, method: Method, uri: &str, body: Body) -> Response {
    router(state)
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn assert_cors(response: &Response) {
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, OPTIONS");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
}

#[tokio::test]
async fn options_on_any_path_is_empty_200() {
    for uri in ["/repos/create-file", "/does/not/exist", "/"] {
        let response = send(unconfigured_state(), Method::OPTIONS, uri, Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert_cors(&response);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.is_empty(), "{uri}");
    }
}

#[tokio::test]
async fn unknown_path_lists_endpoints() {
    let response = send(unconfigured_state(), Method::GET, "/nope", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_cors(&response);

    let body = json_body(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "GitHub App bridge is running");
    let paths: Vec<&str> = body["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    assert!(paths.contains(&"/test"));
    assert!(paths.contains(&"/repos/create-file"));
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn routes_match_exactly_not_by_prefix() {
    let response = send(unconfigured_state(), Method::GET, "/repos/extra", Body::empty()).await;
    let body = json_body(response).await;
    assert!(body.get("endpoints").is_some());
}

#[tokio::test]
async fn wrong_method_on_known_path_lists_endpoints() {
    for (method, uri) in [
        (Method::GET, "/repos/create-file"),
        (Method::POST, "/test"),
        (Method::DELETE, "/repos"),
    ] {
        let response = send(unconfigured_state(), method.clone(), uri, Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK, "{method} {uri}");
        assert_cors(&response);

        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert!(body["endpoints"].is_array(), "{method} {uri}");
        assert!(body["timestamp"].is_string());
    }
}

#[tokio::test]
async fn test_route_counts_installations() {
    let mock = MockServer::start_async().await;
    let response = send(state(&mock, vec![7, 8]), Method::GET, "/test", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["installations_count"], 2);
    assert_eq!(body["installations"][1]["account"], "account-8");
}

#[tokio::test]
async fn repos_route_uses_default_installation() {
    let mock = MockServer::start_async().await;
    let list = mock
        .mock_async(|when, then| {
            when.method(GET)
                .path("/installation/repositories")
                .query_param("per_page", "30");
            then.status(200).json_body(json!({
                "total_count": 1,
                "repositories": [
                    {"name": "widgets", "full_name": "acme/widgets", "private": false}
                ]
            }));
        })
        .await;

    let response = send(state(&mock, vec![11]), Method::GET, "/repos", Body::empty()).await;
    list.assert_async().await;

    let body = json_body(response).await;
    assert_eq!(body["installation_id"], 11);
    assert_eq!(body["total_count"], 1);
    assert_eq!(body["repositories"][0]["full_name"], "acme/widgets");
}

#[tokio::test]
async fn no_installations_is_404() {
    let mock = MockServer::start_async().await;
    let response = send(state(&mock, vec![]), Method::GET, "/repos", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["kind"], "NoInstallationsFound");
}

#[tokio::test]
async fn missing_credentials_report_diagnostics() {
    let response = send(unconfigured_state(), Method::GET, "/installations", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_cors(&response);

    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["kind"], "ConfigurationError");
    assert!(body["message"].as_str().unwrap().contains("GITHUB_APP_ID"));
    assert_eq!(body["debug"]["has_app_id"], false);
}

#[tokio::test]
async fn debug_route_reports_configuration() {
    let response = send(unconfigured_state(), Method::GET, "/debug", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "debug");
    assert_eq!(body["debug"]["has_private_key"], false);
}

#[tokio::test]
async fn create_file_route_creates_then_updates() {
    let mock = MockServer::start_async().await;
    let mut lookup = mock
        .mock_async(|when, then| {
            when.method(GET).path("/repos/acme/widgets/contents/hello.txt");
            then.status(404).json_body(common::not_found());
        })
        .await;
    let create = mock
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/repos/acme/widgets/contents/hello.txt")
                .json_body(json!({"message": "hi", "content": "aGk="}));
            then.status(201).json_body(json!({
                "content": {"html_url": "https://github.com/acme/widgets/blob/main/hello.txt", "sha": "s1"}
            }));
        })
        .await;

    let request = json!({
        "owner": "acme",
        "repo": "widgets",
        "path": "hello.txt",
        "content": "hi",
        "message": "hi"
    });
    let response = send(
        state(&mock, vec![7]),
        Method::POST,
        "/repos/create-file",
        Body::from(request.to_string()),
    )
    .await;
    create.assert_async().await;
    let body = json_body(response).await;
    assert_eq!(body["message"], "File created successfully");
    assert_eq!(body["action"], "created");
    assert_eq!(body["sha"], "s1");

    lookup.delete_async().await;
    mock.mock_async(|when, then| {
        when.method(GET).path("/repos/acme/widgets/contents/hello.txt");
        then.status(200).json_body(json!({"type": "file", "sha": "s1"}));
    })
    .await;
    let update = mock
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/repos/acme/widgets/contents/hello.txt")
                .json_body(json!({"message": "hi", "content": "aGk=", "sha": "s1"}));
            then.status(200).json_body(json!({
                "content": {"html_url": "https://github.com/acme/widgets/blob/main/hello.txt", "sha": "s2"}
            }));
        })
        .await;

    // double-encoded body
    let encoded = serde_json::to_string(&request.to_string()).unwrap();
    let response = send(
        state(&mock, vec![7]),
        Method::POST,
        "/repos/create-file",
        Body::from(encoded),
    )
    .await;
    update.assert_async().await;
    let body = json_body(response).await;
    assert_eq!(body["message"], "File updated successfully");
    assert_eq!(body["action"], "updated");
    assert_eq!(body["path"], "hello.txt");
}

#[tokio::test]
async fn create_file_route_lists_missing_fields() {
    let mock = MockServer::start_async().await;
    let response = send(
        state(&mock, vec![7]),
        Method::POST,
        "/repos/create-file",
        Body::from(r#"{"owner":"acme","repo":"widgets"}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["kind"], "ValidationError");
    let paths: Vec<&str> = body["violations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["path", "content", "message"]);
}

#[tokio::test]
async fn figma_without_token_is_configuration_error() {
    let response = send(unconfigured_state(), Method::GET, "/figma/test", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["message"].as_str().unwrap().contains("FIGMA_ACCESS_TOKEN"));
}

#[tokio::test]
async fn figma_node_route_reshapes_document() {
    let mock = MockServer::start_async().await;
    let nodes = mock
        .mock_async(|when, then| {
            when.method(GET)
                .path("/files/KEY123/nodes")
                .query_param("ids", "1:2")
                .query_param("depth", "2")
                .header("x-figma-token", "figma-token");
            then.status(200).json_body(json!({
                "name": "Design",
                "lastModified": "2024-05-01T00:00:00Z",
                "nodes": {
                    "1:2": {
                        "document": {
                            "id": "1:2",
                            "name": "Frame",
                            "type": "FRAME",
                            "blendMode": "PASS_THROUGH",
                            "children": [
                                {"id": "1:3", "type": "TEXT", "characters": "Hi", "fills": []}
                            ]
                        }
                    }
                }
            }));
        })
        .await;

    let response = send(state(&mock, vec![7]), Method::GET, "/figma/file/KEY123/1:2", Body::empty()).await;
    nodes.assert_async().await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let node = &body["file"]["node"];
    assert_eq!(node["name"], "Frame");
    assert!(node.get("blendMode").is_none());
    assert_eq!(node["children"][0]["text"], "Hi");
}

#[tokio::test]
async fn figma_upstream_status_is_forwarded() {
    let mock = MockServer::start_async().await;
    mock.mock_async(|when, then| {
        when.method(GET).path("/me");
        then.status(403).json_body(json!({"status": 403, "err": "Invalid token"}));
    })
    .await;

    let response = send(state(&mock, vec![7]), Method::GET, "/figma/test", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "UpstreamError");
    assert!(body["message"].as_str().unwrap().contains("Invalid token"));
}
