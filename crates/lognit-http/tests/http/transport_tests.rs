use super::test_utilities::*;
use lognit::ServerError;
use lognit_http::{Entity, SessionClient};
use serde_json::Value;

#[tokio::test]
async fn test_success_statuses_decode_body() {
    let server = TestServer::start().await;
    let client = server.client();

    let ok: Option<String> = client.get("status/200").await.unwrap();
    assert_eq!(ok.as_deref(), Some("QWEQWE"));

    let created: Option<String> = client.get("status/201").await.unwrap();
    assert_eq!(created.as_deref(), Some("QWEQWE"));
}

#[tokio::test]
async fn test_empty_body_is_absent_result() {
    let server = TestServer::start().await;
    let client = server.client();

    let fetched: Option<Value> = client.get("empty").await.unwrap();
    assert_eq!(fetched, None);

    let posted: Option<Value> = client.post("empty", &Entity::new()).await.unwrap();
    assert_eq!(posted, None);
}

#[tokio::test]
async fn test_401_is_unauthorized_with_raw_status_line() {
    let server = TestServer::start().await;
    let client = server.client();

    let error = client.get::<String>("status/401").await.unwrap_err();
    assert!(error.is_unauthorized());
    assert_eq!(error.to_string(), "HTTP/1.1 401 Unauthorized");
}

#[tokio::test]
async fn test_redirect_is_unauthorized_and_not_followed() {
    let server = TestServer::start().await;
    let client = server.client();

    let error = client.get::<String>("status/301").await.unwrap_err();
    assert_eq!(
        error,
        ServerError::Unauthorized {
            status_line: "HTTP/1.1 301 Moved Permanently".to_string()
        }
    );
}

#[tokio::test]
async fn test_other_statuses_are_request_failures() {
    let server = TestServer::start().await;
    let client = server.client();

    let not_found = client.get::<String>("status/404").await.unwrap_err();
    assert_eq!(
        not_found,
        ServerError::RequestFailed {
            status_line: "HTTP/1.1 404 Not Found".to_string()
        }
    );
    assert!(not_found.is_operation_failure());

    let not_implemented = client
        .post::<String>("status/501", &Entity::new())
        .await
        .unwrap_err();
    assert_eq!(not_implemented.to_string(), "HTTP/1.1 501 Not Implemented");
}

#[tokio::test]
async fn test_leading_slash_is_collapsed() {
    let server = TestServer::start().await;
    let client = server.client();

    let result: Option<String> = client.get("/status/200").await.unwrap();
    assert_eq!(result.as_deref(), Some("QWEQWE"));
}

#[tokio::test]
async fn test_basic_credentials_sent_preemptively() {
    let server = TestServer::start().await;
    let client = server.client();

    let anonymous: Value = client.get("headers").await.unwrap().unwrap();
    assert_eq!(anonymous["authorization"], Value::Null);

    client.authenticate("abc", "123");
    let authenticated: Value = client.get("headers").await.unwrap().unwrap();
    assert_eq!(authenticated["authorization"], "Basic YWJjOjEyMw==");
}

#[tokio::test]
async fn test_form_entity_is_url_encoded_in_order() {
    let server = TestServer::start().await;
    let client = server.client();

    let entity = Entity::new()
        .add("query", "level:error & host")
        .add("lines", 20)
        .add("query", "again");
    let echoed: Vec<(String, String)> = client.post("form", &entity).await.unwrap().unwrap();

    assert_eq!(echoed, entity.fields());
}

#[tokio::test]
async fn test_stream_decodes_each_line() {
    let server = TestServer::start().await;
    let client = server.client();

    let mut stream = client.get_stream::<String>("lines").await.unwrap();
    assert_eq!(stream.next().await, Some(Ok("ABC".to_string())));
    assert_eq!(stream.next().await, Some(Ok("QWE".to_string())));
    assert_eq!(stream.next().await, None);
}

#[tokio::test]
async fn test_stream_of_empty_body_yields_nothing() {
    let server = TestServer::start().await;
    let client = server.client();

    let mut stream = client.get_stream::<String>("empty").await.unwrap();
    assert_eq!(stream.next().await, None);
}

#[tokio::test]
async fn test_stream_rejected_status_fails_before_iteration() {
    let server = TestServer::start().await;
    let client = server.client();

    let error = client.get_stream::<String>("status/302").await.unwrap_err();
    assert!(error.is_unauthorized());
}

#[tokio::test]
async fn test_undecodable_body_is_decode_error() {
    let server = TestServer::start().await;
    let client = server.client();

    let error = client.get::<Vec<u32>>("status/200").await.unwrap_err();
    assert!(matches!(error, ServerError::Decode { .. }));
    assert!(error.is_operation_failure());
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let client = SessionClient::new().unwrap();
    client.set_server("127.0.0.1:1");

    let error = client.get::<String>("status/200").await.unwrap_err();
    assert!(matches!(error, ServerError::Transport { .. }));
}
