mod common;

use std::collections::HashMap;

use common::{Call, until};
use log::info;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use voice_call_client::calls::{AcceptOptions, CallDirection, MediaEvent};
use voice_call_client::config::CallOptions;
use voice_call_client::transport::TransportEvent;
use voice_call_client::{CallError, CallEvent, CallStatus, ErrorKind};

fn incoming() -> CallOptions {
    CallOptions {
        call_parameters: HashMap::from([
            ("CallSid".to_string(), "CA9".to_string()),
            ("StirStatus".to_string(), "TN-Validation-Passed-A".to_string()),
        ]),
        offer_sdp: Some("v=0 remote offer".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_incoming_call_answered_then_hung_up_remotely() -> Result<(), anyhow::Error> {
    let mut call = Call::start(incoming());
    call.transport_tx.send(TransportEvent::Opened).await?;

    call.handle.accept(AcceptOptions::default()).await?;
    until(|| call.media.called("open_input")).await;
    call.media_tx.send(MediaEvent::InputReady)?;
    until(|| call.media.called("answer_incoming_call CA9")).await;

    call.media_tx.send(MediaEvent::LocalAnswer {
        sdp: "v=0 local answer".into(),
    })?;
    until(|| call.transport.last("answer").is_some()).await;
    let answer = call.transport.last("answer").unwrap_or_default();
    assert_eq!(answer["payload"]["callsid"], "CA9");
    assert_eq!(answer["payload"]["sdp"], "v=0 local answer");

    call.media_tx.send(MediaEvent::Negotiated {
        codec: Some("opus".into()),
        codec_params: None,
    })?;
    call.media_tx.send(MediaEvent::Opened)?;
    assert_eq!(call.next_event().await, CallEvent::Accept);

    let snapshot = call.handle.snapshot().await?;
    info!("Call is {:?} with codec {:?}", snapshot.status, snapshot.codec);
    assert_eq!(snapshot.status, CallStatus::Open);
    assert_eq!(snapshot.direction, CallDirection::Incoming);
    assert_eq!(snapshot.codec.as_deref(), Some("opus"));

    call.frame(
        "hangup",
        json!({
            "callsid": "CA9",
            "error": { "code": 31005, "message": "gateway hung up" }
        }),
    )
    .await;

    match call.next_event().await {
        CallEvent::Error(e) => assert_eq!(e.kind, ErrorKind::GeneralConnectionError),
        other => panic!("expected an error before disconnect, got {other:?}"),
    }
    assert_eq!(call.next_event().await, CallEvent::Disconnect);
    call.task.await?;

    assert!(
        !call.transport.sent_types().contains(&"hangup".to_string()),
        "a remote hangup is not echoed back"
    );
    assert!(call.transport.is_closed());
    assert!(call.media.called("close"));
    assert!(matches!(call.events.recv().await, Err(RecvError::Closed)));
    assert_eq!(call.handle.mute(true).await, Err(CallError::SessionClosed));
    Ok(())
}

#[tokio::test]
async fn test_incoming_call_rejected() -> Result<(), anyhow::Error> {
    let mut call = Call::start(incoming());
    call.transport_tx.send(TransportEvent::Opened).await?;

    call.handle.reject().await?;
    assert_eq!(call.next_event().await, CallEvent::Reject);
    call.task.await?;

    assert_eq!(
        call.transport.last("reject").map(|r| r["payload"]["callsid"].clone()),
        Some(json!("CA9"))
    );
    assert!(call.media.called("reject"));
    assert!(
        call.publisher
            .names()
            .contains(&"connection/rejected-by-local".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_incoming_call_cancelled_before_answer() -> Result<(), anyhow::Error> {
    let mut call = Call::start(incoming());
    call.transport_tx.send(TransportEvent::Opened).await?;

    call.handle.accept(AcceptOptions::default()).await?;
    until(|| call.media.called("open_input")).await;
    call.frame("cancel", json!({ "callsid": "CA9" })).await;

    assert_eq!(call.next_event().await, CallEvent::Cancel);
    call.task.await?;
    assert!(!call.media.called("answer_incoming_call"));
    Ok(())
}

#[tokio::test]
async fn test_outgoing_call_survives_signaling_drop() -> Result<(), anyhow::Error> {
    let mut call = Call::start(CallOptions::default());
    call.transport_tx.send(TransportEvent::Opened).await?;

    call.handle.accept(AcceptOptions::default()).await?;
    until(|| call.media.called("open_input")).await;
    call.media_tx.send(MediaEvent::InputReady)?;
    until(|| call.media.called("make_outgoing_call")).await;
    call.media_tx.send(MediaEvent::LocalOffer {
        sdp: "v=0 offer".into(),
    })?;
    until(|| call.transport.last("invite").is_some()).await;

    call.frame(
        "answer",
        json!({ "callsid": "CA1", "sdp": "v=0 answer", "reconnect": "rt-1" }),
    )
    .await;
    until(|| call.media.called("process_answer")).await;
    call.media_tx.send(MediaEvent::Opened)?;
    assert_eq!(call.next_event().await, CallEvent::Accept);

    call.transport.set_open(false);
    call.transport_tx.send(TransportEvent::Closed).await?;
    assert_eq!(call.next_event().await, CallEvent::TransportClose);
    match call.next_event().await {
        CallEvent::Reconnecting(e) => {
            assert_eq!(e.kind, ErrorKind::SignalingConnectionDisconnected)
        }
        other => panic!("expected reconnecting, got {other:?}"),
    }
    assert_eq!(
        call.handle.snapshot().await?.status,
        CallStatus::Reconnecting
    );

    call.transport.set_open(true);
    call.transport_tx.send(TransportEvent::Opened).await?;
    call.frame("connected", json!({ "region": "us1" })).await;
    until(|| {
        call.transport
            .last("invite")
            .is_some_and(|i| i["payload"]["reconnect"] == "rt-1")
    })
    .await;

    call.frame("answer", json!({ "callsid": "CA1", "sdp": "v=0 answer 2" }))
        .await;
    assert_eq!(call.next_event().await, CallEvent::Reconnected);
    assert_eq!(call.handle.snapshot().await?.status, CallStatus::Open);

    call.handle.disconnect().await?;
    assert_eq!(call.next_event().await, CallEvent::Disconnect);
    call.task.await?;
    assert_eq!(
        call.transport.last("hangup").map(|h| h["payload"]["callsid"].clone()),
        Some(json!("CA1"))
    );
    Ok(())
}
