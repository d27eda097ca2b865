use std::sync::{Arc, Mutex};
use std::time::Duration;

use ipfs_rpc_client::testutil::{MockBackend, Reply};
use ipfs_rpc_client::{CallOptions, ClientConfig, Transport};
use ipfs_rpc_core::wire::{encode_bytes, encode_text};
use ipfs_rpc_core::{CancellationToken, Error};
use ipfs_rpc_pubsub::{
    ErrorCallback, PubsubApi, PubsubMessage, Severity, SubscribeOptions, SubscriptionHandler,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;

fn pubsub(mock: &MockBackend) -> PubsubApi {
    PubsubApi::new(Transport::with_backend(&ClientConfig::default(), mock.clone()).unwrap())
}

fn channel_handler() -> (SubscriptionHandler, mpsc::UnboundedReceiver<PubsubMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = SubscriptionHandler::new(move |message: PubsubMessage| {
        let _ = tx.send(message);
    });
    (handler, rx)
}

fn error_recorder() -> (ErrorCallback, Arc<Mutex<Vec<(String, Severity)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: ErrorCallback = Arc::new(move |err: &Error, severity: Severity| {
        sink.lock().unwrap().push((err.to_string(), severity));
    });
    (callback, seen)
}

fn message_line(topic: &str, data: &str, seqno: u8) -> Value {
    json!({
        "from": "12D3KooWJmBdiAqjmVHT3Xug6hQAzMR1UNBZTHu7Bh7HhjrdU1SD",
        "data": encode_text(data),
        "seqno": encode_bytes(&[0, 0, 0, seqno]),
        "topicIDs": [encode_text(topic)],
        "signature": encode_bytes(b"sig"),
        "key": encode_bytes(b"key"),
    })
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<PubsubMessage>) -> PubsubMessage {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("no message delivered")
        .expect("handler dropped")
}

#[tokio::test]
async fn messages_reach_the_handler_and_heartbeats_do_not() -> anyhow::Result<()> {
    let mock = MockBackend::new();
    let feed = mock.feed("pubsub/sub");
    let pubsub = pubsub(&mock);
    let (handler, mut rx) = channel_handler();

    pubsub.subscribe("t", handler, SubscribeOptions::default()).await?;

    let requests = mock.requests_to("pubsub/sub");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].query_values("arg"), vec![encode_text("t")]);

    feed.send_line(&json!({}));
    feed.send_line(&json!({"from": null, "data": "u"}));
    feed.send_line(&message_line("t", "hello", 1));

    let message = next_message(&mut rx).await;
    assert_eq!(message.data(), b"hello");
    assert_eq!(message.topic(), "t");
    let PubsubMessage::Signed(signed) = message else {
        panic!("expected a signed message");
    };
    assert_eq!(signed.sequence_number, 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn sender_without_seqno_arrives_unsigned() -> anyhow::Result<()> {
    let mock = MockBackend::new();
    let feed = mock.feed("pubsub/sub");
    let pubsub = pubsub(&mock);
    let (handler, mut rx) = channel_handler();
    let (on_error, errors) = error_recorder();

    pubsub
        .subscribe(
            "t",
            handler,
            SubscribeOptions {
                on_error: Some(on_error),
                ..SubscribeOptions::default()
            },
        )
        .await?;

    feed.send_line(&json!({
        "from": "12D3KooWJmBdiAqjmVHT3Xug6hQAzMR1UNBZTHu7Bh7HhjrdU1SD",
        "data": encode_text("anonymous"),
        "topicIDs": [encode_text("t")],
    }));

    let message = next_message(&mut rx).await;
    assert!(matches!(message, PubsubMessage::Unsigned(_)));
    assert_eq!(message.data(), b"anonymous");
    assert_eq!(message.topic(), "t");
    assert!(errors.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn unsubscribe_aborts_the_stream_once() -> anyhow::Result<()> {
    let mock = MockBackend::new();
    let feed = mock.feed("pubsub/sub");
    let pubsub = pubsub(&mock);
    let (handler, _rx) = channel_handler();
    let (on_error, errors) = error_recorder();

    pubsub
        .subscribe(
            "t",
            handler.clone(),
            SubscribeOptions {
                on_error: Some(on_error),
                ..SubscribeOptions::default()
            },
        )
        .await?;
    assert!(pubsub.tracker().is_subscribed("t", &handler));

    pubsub.unsubscribe("t", Some(&handler));
    assert!(pubsub.tracker().topics().is_empty());
    eventually("the stream to be dropped", || feed.is_closed()).await;

    pubsub.unsubscribe("t", Some(&handler));
    assert!(pubsub.tracker().topics().is_empty());

    // Teardown by abort is expected and not reported.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(errors.lock().unwrap().is_empty());
    assert_eq!(mock.requests_to("pubsub/sub").len(), 1);
    Ok(())
}

#[tokio::test]
async fn duplicate_subscription_makes_no_request() -> anyhow::Result<()> {
    let mock = MockBackend::new();
    let _feed = mock.feed("pubsub/sub");
    let pubsub = pubsub(&mock);
    let (handler, _rx) = channel_handler();

    pubsub.subscribe("t", handler.clone(), SubscribeOptions::default()).await?;
    let err = pubsub
        .subscribe("t", handler.clone(), SubscribeOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DuplicateSubscription { .. }));
    assert_eq!(mock.requests_to("pubsub/sub").len(), 1);
    assert_eq!(pubsub.tracker().handler_count("t"), 1);
    Ok(())
}

#[tokio::test]
async fn two_handlers_on_one_topic_are_independent() -> anyhow::Result<()> {
    let mock = MockBackend::new();
    let feed_a = mock.feed("pubsub/sub");
    let feed_b = mock.feed("pubsub/sub");
    let pubsub = pubsub(&mock);
    let (a, _rx_a) = channel_handler();
    let (b, mut rx_b) = channel_handler();

    pubsub.subscribe("t", a.clone(), SubscribeOptions::default()).await?;
    pubsub.subscribe("t", b.clone(), SubscribeOptions::default()).await?;

    pubsub.unsubscribe("t", Some(&a));
    eventually("a's stream to be dropped", || feed_a.is_closed()).await;
    assert!(!feed_b.is_closed());

    feed_b.send_line(&message_line("t", "for b", 2));
    assert_eq!(next_message(&mut rx_b).await.data(), b"for b");
    assert_eq!(pubsub.tracker().handler_count("t"), 1);
    Ok(())
}

#[tokio::test]
async fn open_failure_rejects_and_unregisters() -> anyhow::Result<()> {
    let mock = MockBackend::new();
    mock.on("pubsub/sub", Reply::error(500, "experimental pubsub feature not enabled"));
    let pubsub = pubsub(&mock);
    let (handler, _rx) = channel_handler();

    let err = pubsub
        .subscribe("t", handler.clone(), SubscribeOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert!(!pubsub.tracker().is_subscribed("t", &handler));
    assert!(pubsub.tracker().topics().is_empty());
    Ok(())
}

#[tokio::test]
async fn bad_lines_are_reported_and_skipped() -> anyhow::Result<()> {
    let mock = MockBackend::new();
    let feed = mock.feed("pubsub/sub");
    let pubsub = pubsub(&mock);
    let (handler, mut rx) = channel_handler();
    let (on_error, errors) = error_recorder();

    pubsub
        .subscribe(
            "t",
            handler,
            SubscribeOptions {
                on_error: Some(on_error),
                ..SubscribeOptions::default()
            },
        )
        .await?;

    feed.send_line(&json!({"from": "peer", "data": "not multibase!", "topicIDs": ["udA"]}));
    feed.send(bytes::Bytes::from_static(b"{not json\n"));
    feed.send_line(&message_line("t", "still here", 3));

    assert_eq!(next_message(&mut rx).await.data(), b"still here");
    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|(_, severity)| *severity == Severity::NotFatal));
    assert_eq!(pubsub.tracker().handler_count("t"), 1);
    Ok(())
}

#[tokio::test]
async fn stream_end_and_failure_clean_up() -> anyhow::Result<()> {
    let mock = MockBackend::new();
    let ended = mock.feed("pubsub/sub");
    let failed = mock.feed("pubsub/sub");
    let pubsub = pubsub(&mock);
    let (on_error, errors) = error_recorder();
    let options = SubscribeOptions {
        on_error: Some(on_error),
        ..SubscribeOptions::default()
    };

    let (a, _rx_a) = channel_handler();
    pubsub.subscribe("a", a, options.clone()).await?;
    let (b, _rx_b) = channel_handler();
    pubsub.subscribe("b", b, options).await?;

    ended.finish();
    failed.fail(Error::Network("connection reset by peer".into()));

    let tracker = pubsub.tracker().clone();
    eventually("both subscriptions to be removed", move || tracker.topics().is_empty()).await;
    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].1, Severity::Fatal);
    assert!(errors[0].0.contains("connection reset by peer"));
    Ok(())
}

#[tokio::test]
async fn external_signal_unsubscribes() -> anyhow::Result<()> {
    let mock = MockBackend::new();
    let feed = mock.feed("pubsub/sub");
    let pubsub = pubsub(&mock);
    let (handler, _rx) = channel_handler();
    let (on_error, errors) = error_recorder();
    let signal = CancellationToken::new();

    pubsub
        .subscribe(
            "t",
            handler.clone(),
            SubscribeOptions {
                signal: Some(signal.clone()),
                on_error: Some(on_error),
                ..SubscribeOptions::default()
            },
        )
        .await?;

    signal.cancel();
    eventually("the stream to be dropped", || feed.is_closed()).await;
    let tracker = pubsub.tracker().clone();
    eventually("the subscription to be removed", move || tracker.topics().is_empty()).await;
    assert!(errors.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn grace_period_resolves_before_the_stream_opens() -> anyhow::Result<()> {
    let mock = MockBackend::new();
    mock.on("pubsub/sub", Reply::Hang);
    let pubsub = pubsub(&mock);
    let (handler, _rx) = channel_handler();

    let options = SubscribeOptions {
        grace_period: Some(Duration::from_millis(20)),
        ..SubscribeOptions::default()
    };
    tokio::time::timeout(
        Duration::from_secs(1),
        pubsub.subscribe("t", handler.clone(), options),
    )
    .await
    .expect("subscribe did not resolve after the grace period")?;

    assert!(pubsub.tracker().is_subscribed("t", &handler));
    pubsub.unsubscribe("t", Some(&handler));
    assert!(pubsub.tracker().topics().is_empty());
    Ok(())
}

#[tokio::test]
async fn publish_ls_and_peers() -> anyhow::Result<()> {
    let mock = MockBackend::new();
    mock.on("pubsub/pub", Reply::text(200, ""));
    mock.on(
        "pubsub/ls",
        Reply::Json(json!({"Strings": [encode_text("news"), encode_text("天気")]})),
    );
    mock.on("pubsub/ls", Reply::Json(json!({"Strings": null})));
    mock.on(
        "pubsub/peers",
        Reply::Json(json!({"Strings": ["12D3KooWJmBdiAqjmVHT3Xug6hQAzMR1UNBZTHu7Bh7HhjrdU1SD"]})),
    );
    let pubsub = pubsub(&mock);

    pubsub
        .publish("news", "extra extra", CallOptions::default())
        .await?;
    let requests = mock.requests_to("pubsub/pub");
    assert_eq!(requests[0].query_values("arg"), vec![encode_text("news")]);
    let body = String::from_utf8(requests[0].body.to_vec())?;
    assert!(body.contains("name=\"file\"; filename=\"\""));
    assert!(body.contains("\r\n\r\nextra extra\r\n--"));

    assert_eq!(
        pubsub.ls(CallOptions::default()).await?,
        vec!["news".to_string(), "天気".to_string()]
    );
    assert!(pubsub.ls(CallOptions::default()).await?.is_empty());

    let peers = pubsub.peers(Some("news"), CallOptions::default()).await?;
    assert_eq!(peers.len(), 1);
    assert_eq!(
        mock.requests_to("pubsub/peers")[0].query_values("arg"),
        vec![encode_text("news")]
    );
    Ok(())
}
