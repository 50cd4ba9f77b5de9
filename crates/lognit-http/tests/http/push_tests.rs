use super::test_utilities::*;
use lognit::{ClusterBuffer, Cookie, Message, MessageBatch, MessagePrinter, ServerError};
use lognit_http::{BayeuxClient, Entity, SessionClient};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const CHANNEL: &str = "/logs/live";

fn batch_json(historic: bool, total_nodes: i64, texts: &[(i64, &str)]) -> Value {
    let items: Vec<Value> = texts
        .iter()
        .map(|(ts, text)| json!({"timestamp": ts, "host": "node", "message": text}))
        .collect();
    json!({"historic": historic, "totalNodes": total_nodes, "items": items})
}

#[derive(Debug, Default)]
struct CollectingPrinter {
    lines: Mutex<Vec<String>>,
}

impl MessagePrinter for CollectingPrinter {
    fn print_message(&self, message: &Message) {
        self.lines.lock().push(message.message.clone());
    }

    fn print_status(&self, status: &str) {
        self.lines.lock().push(status.to_string());
    }
}

#[tokio::test]
async fn test_only_matching_cookies_are_bridged_to_push() {
    let server = TestServer::start().await;
    let client = server.client();
    client.jar().add_all(&[
        Cookie::new("127.0.0.1", "A", "C", "/", None, false),
        Cookie::new("127.0.0.1", "B", "C", "/", None, true),
        Cookie::new("127.0.0.1", "C", "C", "/test", None, false),
        Cookie::new("abc", "D", "C", "/", None, false),
    ]);

    let (listener, _rx) = batch_channel();
    let handle = client.listen(CHANNEL, listener).await.unwrap();

    assert_eq!(handle.channel(), CHANNEL);
    assert_eq!(handle.client().cookies().len(), 1);
    let bayeux = server.state.bayeux.lock();
    assert_eq!(bayeux.handshake_cookies, vec![Some("A=C".to_string())]);
}

#[tokio::test]
async fn test_login_session_cookie_reaches_push_handshake() {
    let server = TestServer::start().await;
    let client = server.client();
    let _: Option<Value> = client.post("login", &Entity::new()).await.unwrap();

    let (listener, _rx) = batch_channel();
    client.listen(CHANNEL, listener).await.unwrap();

    let bayeux = server.state.bayeux.lock();
    assert_eq!(
        bayeux.handshake_cookies,
        vec![Some("JSESSIONID=s3cr3t".to_string())]
    );
    assert_eq!(bayeux.subscriptions, vec![CHANNEL.to_string()]);
}

#[tokio::test]
async fn test_pushed_events_are_decoded_in_order() {
    let server = TestServer::start().await;
    let client = server.client();

    let (listener, mut rx) = batch_channel();
    client.listen(CHANNEL, listener).await.unwrap();

    server.publish(CHANNEL, batch_json(false, 0, &[(1, "first")]));
    server.publish("/logs/other", batch_json(false, 0, &[(2, "ignored")]));
    server.publish(CHANNEL, json!("not a batch"));
    server.publish(CHANNEL, batch_json(true, 2, &[(3, "second")]));

    let first = next_batch(&mut rx).await;
    assert!(!first.is_historic());
    assert_eq!(first.items[0].message, "first");

    let second = next_batch(&mut rx).await;
    assert_eq!(second, MessageBatch::historic(2, vec![Message::new(3, "node", "second")]));
}

#[tokio::test]
async fn test_cluster_buffer_fed_from_push_channel() {
    let server = TestServer::start().await;
    let client = server.client();

    let printer = Arc::new(CollectingPrinter::default());
    let buffer = Arc::new(ClusterBuffer::new(printer.clone()));
    client.listen::<MessageBatch>(CHANNEL, buffer.clone()).await.unwrap();

    server.publish(CHANNEL, batch_json(false, 0, &[(50, "live")]));
    server.publish(CHANNEL, batch_json(true, 2, &[(10, "a-10"), (30, "a-30")]));
    server.publish(CHANNEL, batch_json(true, 2, &[(20, "b-20")]));

    assert!(buffer.wait_historic(Duration::from_secs(5), 10).await);
    assert_eq!(*printer.lines.lock(), vec!["a-30", "b-20", "a-10"]);

    buffer.release_all();
    assert_eq!(*printer.lines.lock(), vec!["a-30", "b-20", "a-10", "live"]);
}

#[tokio::test]
async fn test_push_connection_is_reused_for_same_server() {
    let server = TestServer::start().await;
    let client = server.client();

    let (first_listener, _first_rx) = batch_channel();
    let (second_listener, _second_rx) = batch_channel();
    let first = client.listen(CHANNEL, first_listener).await.unwrap();
    let second = client.listen("/logs/other", second_listener).await.unwrap();

    assert!(Arc::ptr_eq(first.client(), second.client()));
    let bayeux = server.state.bayeux.lock();
    assert_eq!(bayeux.handshakes, 1);
    assert_eq!(bayeux.subscriptions.len(), 2);
}

#[tokio::test]
async fn test_close_unsubscribes_and_last_handle_disconnects() {
    let server = TestServer::start().await;
    let client = server.client();

    let (first_listener, _first_rx) = batch_channel();
    let (second_listener, _second_rx) = batch_channel();
    let first = client.listen(CHANNEL, first_listener).await.unwrap();
    let second = client.listen("/logs/other", second_listener).await.unwrap();
    let session = second.client().clone();

    first.close().await.unwrap();
    assert_eq!(server.state.bayeux.lock().disconnects, 0);
    assert!(session.is_connected());

    second.close().await.unwrap();
    {
        let bayeux = server.state.bayeux.lock();
        assert_eq!(bayeux.unsubscriptions, vec![CHANNEL, "/logs/other"]);
        assert_eq!(bayeux.disconnects, 1);
    }
    assert!(!session.is_connected());

    // A closed session is replaced by a fresh handshake.
    let (listener, _rx) = batch_channel();
    client.listen(CHANNEL, listener).await.unwrap();
    assert_eq!(server.state.bayeux.lock().handshakes, 2);
}

#[tokio::test]
async fn test_rejected_handshake_is_push_error() {
    let server = TestServer::start().await;
    server.reject_handshakes();
    let client = server.client();

    let (listener, _rx) = batch_channel();
    let error = client.listen(CHANNEL, listener).await.unwrap_err();

    assert!(matches!(error, ServerError::Push { .. }));
    assert!(error.to_string().contains("403::Handshake denied"));
    assert!(server.state.bayeux.lock().subscriptions.is_empty());
}

#[tokio::test]
async fn test_unreachable_push_server_is_push_error() {
    let client = SessionClient::new().unwrap();
    client.set_server("127.0.0.1:1");

    let (listener, _rx) = batch_channel();
    let error = client.listen(CHANNEL, listener).await.unwrap_err();
    assert!(matches!(error, ServerError::Push { .. }));
}

#[tokio::test]
async fn test_stalled_handshake_times_out_as_push_error() {
    let server = TestServer::start().await;
    server.stall_handshakes();

    let bayeux = BayeuxClient::new(server.push_url()).unwrap();
    let error = bayeux
        .handshake(Duration::from_millis(200))
        .await
        .unwrap_err();

    assert_eq!(
        error,
        ServerError::from_push_error("no answer within 200ms", "handshake")
    );
    assert!(!bayeux.is_connected());
}

#[tokio::test]
async fn test_reconnect_advice_rehandshakes_and_resubscribes() {
    let server = TestServer::start().await;
    let client = server.client();

    let (listener, mut rx) = batch_channel();
    client.listen(CHANNEL, listener).await.unwrap();
    server.state.bayeux.lock().rehandshake_next_connect = true;

    eventually("a second handshake and subscription", || {
        let bayeux = server.state.bayeux.lock();
        bayeux.handshakes == 2 && bayeux.subscriptions.len() == 2
    })
    .await;
    assert_eq!(
        server.state.bayeux.lock().subscriptions,
        vec![CHANNEL, CHANNEL]
    );

    server.publish(CHANNEL, batch_json(false, 0, &[(1, "after rehandshake")]));
    let batch = next_batch(&mut rx).await;
    assert_eq!(batch.items[0].message, "after rehandshake");
}

#[tokio::test]
async fn test_connect_loop_retries_after_server_errors() {
    let server = TestServer::start().await;
    let client = server.client();

    let (listener, mut rx) = batch_channel();
    let handle = client.listen(CHANNEL, listener).await.unwrap();
    server.state.bayeux.lock().failing_connects = 2;

    eventually("the failing connects to be consumed", || {
        server.state.bayeux.lock().failing_connects == 0
    })
    .await;

    server.publish(CHANNEL, batch_json(false, 0, &[(1, "after retry")]));
    let batch = next_batch(&mut rx).await;
    assert_eq!(batch.items[0].message, "after retry");
    assert!(handle.client().is_connected());
    assert_eq!(server.state.bayeux.lock().handshakes, 1);
}

#[tokio::test]
async fn test_switching_server_disconnects_previous_push_session() {
    let first = TestServer::start().await;
    let second = TestServer::start().await;
    let client = first.client();

    let (first_listener, _first_rx) = batch_channel();
    let old = client.listen(CHANNEL, first_listener).await.unwrap();

    client.set_server(&second.server());
    let (second_listener, _second_rx) = batch_channel();
    let new = client.listen(CHANNEL, second_listener).await.unwrap();

    assert!(!old.client().is_connected());
    assert!(new.client().is_connected());
    assert_eq!(first.state.bayeux.lock().disconnects, 1);
    assert_eq!(second.state.bayeux.lock().handshakes, 1);
}
