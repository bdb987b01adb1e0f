//! Integration tests for the HTTP member source using wiremock.

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use forge_guard_connector::{ConnectorError, MemberSource};
use forge_guard_connector_http::{HttpSource, HttpSourceConfig};

#[tokio::test]
async fn test_bare_array_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/members"))
        .and(query_param("group", "eng"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["U1", "U2"])))
        .mount(&server)
        .await;

    let source = HttpSource::new(
        format!("{}/members", server.uri()),
        "",
        "",
        "",
        HttpSourceConfig::default(),
    )
    .unwrap();

    assert_eq!(source.users("eng").await.unwrap(), vec!["U1", "U2"]);
}

#[tokio::test]
async fn test_structured_response_with_object_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/groups/eng/members"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [ { "userId": "U1" }, { "userId": "U2" } ]
        })))
        .mount(&server)
        .await;

    let source = HttpSource::new(
        format!("{}/groups/{{group}}/members", server.uri()),
        "",
        "",
        "",
        HttpSourceConfig {
            results_field: "items".to_string(),
            id_field: "userId".to_string(),
            ..HttpSourceConfig::default()
        },
    )
    .unwrap();

    assert_eq!(source.users("eng").await.unwrap(), vec!["U1", "U2"]);
}

#[tokio::test]
async fn test_missing_results_field_is_tolerated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/members"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "other": [] })))
        .mount(&server)
        .await;

    let source = HttpSource::new(
        format!("{}/members", server.uri()),
        "",
        "",
        "",
        HttpSourceConfig {
            results_field: "items".to_string(),
            ..HttpSourceConfig::default()
        },
    )
    .unwrap();

    assert!(source.users("eng").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pagination_concatenates_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/members"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": ["U1"], "total_pages": 3
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/members"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": ["U2"], "total_pages": 3
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/members"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": ["U3"], "total_pages": 3
        })))
        .mount(&server)
        .await;

    let source = HttpSource::new(
        format!("{}/members", server.uri()),
        "",
        "",
        "",
        HttpSourceConfig {
            results_field: "items".to_string(),
            paginated: true,
            ..HttpSourceConfig::default()
        },
    )
    .unwrap();

    assert_eq!(source.users("eng").await.unwrap(), vec!["U1", "U2", "U3"]);
}

#[tokio::test]
async fn test_non_200_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/members"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .mount(&server)
        .await;

    let source = HttpSource::new(
        format!("{}/members", server.uri()),
        "",
        "",
        "",
        HttpSourceConfig::default(),
    )
    .unwrap();

    let err = source.users("eng").await.unwrap_err();
    assert!(matches!(
        err,
        ConnectorError::UnexpectedStatus { status: 201 }
    ));
}

#[tokio::test]
async fn test_basic_auth_and_bearer_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/members"))
        .and(header("Authorization", "Bearer tok123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["U1"])))
        .mount(&server)
        .await;

    let source = HttpSource::new(
        format!("{}/members", server.uri()),
        "",
        "",
        "tok123",
        HttpSourceConfig::default(),
    )
    .unwrap();

    assert_eq!(source.users("eng").await.unwrap(), vec!["U1"]);
}

#[tokio::test]
async fn test_probe_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/probe"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let source = HttpSource::new(
        format!("{}/members", server.uri()),
        "reader",
        "wrong",
        "",
        HttpSourceConfig {
            test_connection_url: format!("{}/probe", server.uri()),
            ..HttpSourceConfig::default()
        },
    )
    .unwrap();

    let err = source.test_connection().await.unwrap_err();
    assert!(matches!(
        err,
        ConnectorError::AuthenticationFailed { status: 401 }
    ));
}

#[tokio::test]
async fn test_probe_tolerates_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/probe"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such group"))
        .mount(&server)
        .await;

    let source = HttpSource::new(
        format!("{}/members", server.uri()),
        "",
        "",
        "",
        HttpSourceConfig {
            test_connection_url: format!("{}/probe", server.uri()),
            ..HttpSourceConfig::default()
        },
    )
    .unwrap();

    source.test_connection().await.unwrap();
}

#[tokio::test]
async fn test_probe_without_url_is_a_no_op() {
    let source = HttpSource::new(
        "https://unreachable.invalid/members",
        "",
        "",
        "",
        HttpSourceConfig::default(),
    )
    .unwrap();
    source.test_connection().await.unwrap();
}
