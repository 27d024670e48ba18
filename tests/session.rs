//! Session client tests over scripted transports

mod common;

use std::time::Duration;

use tokio::sync::mpsc;

use beacon_device::config::{ServerConfig, SessionConfig};
use beacon_device::{
    CellularTransport, Error, SessionClient, SessionEvent, SessionStatus, ring_buffer,
};
use common::{MockSerial, ReplyEnd, ScriptedTransport, directive_frame, mock_modem};

const DIRECTIVE: &str =
    r#"{"control":{"has_command":true,"target":"ac","action":"power","value":"on","ir_code":"a1b2c3"}}"#;

fn client() -> (SessionClient, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let server = ServerConfig {
        host: "assistant.local".to_string(),
        port: 9000,
    };
    (
        SessionClient::new(server, SessionConfig::default()).with_events(tx),
        rx,
    )
}

fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn statuses(events: &[SessionEvent]) -> Vec<SessionStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Status(s) => Some(*s),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_exchange_uploads_and_streams_reply() {
    let frame = directive_frame(DIRECTIVE);
    let (head, tail) = frame.split_at(frame.len() / 2);
    let mut second = tail.to_vec();
    second.extend_from_slice(&[0x11, 0x22]);

    let mut transport = ScriptedTransport::new(
        vec![head.to_vec(), second, vec![0x33, 0x44, 0x55]],
        ReplyEnd::Eof,
    );
    let (client, mut rx) = client();
    let (mut play, mut play_rx) = ring_buffer(1024);

    let recording = vec![0xAB; 300];
    let summary = client
        .exchange(&mut transport, &recording, &mut play)
        .await
        .unwrap();

    // Length prefix is big-endian and sent ahead of the audio
    assert_eq!(&transport.sent[..4], &[0, 0, 0x01, 0x2C]);
    assert_eq!(&transport.sent[4..], recording.as_slice());
    assert_eq!(transport.closes, 1);
    assert!(!transport.connected);

    let mut audio = [0u8; 16];
    let n = play_rx.pop_slice(&mut audio);
    assert_eq!(&audio[..n], &[0x11, 0x22, 0x33, 0x44, 0x55]);

    assert_eq!(summary.uploaded, 300);
    assert_eq!(summary.audio_bytes, 5);
    assert!(!summary.timed_out);
    let directive = summary.directive.unwrap();
    assert_eq!(directive.control.target, "ac");
    assert_eq!(
        directive.ir_code().unwrap().unwrap().as_bytes(),
        &[0xA1, 0xB2, 0xC3]
    );

    let events = drain(&mut rx);
    assert_eq!(
        statuses(&events),
        vec![
            SessionStatus::Connecting,
            SessionStatus::Sending,
            SessionStatus::Thinking,
            SessionStatus::Replying,
        ]
    );
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Directive(_))));
    assert_eq!(events.last(), Some(&SessionEvent::Finished));
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_server_reports_and_finishes() {
    let mut transport = ScriptedTransport::unreachable();
    let (client, mut rx) = client();
    let (mut play, _play_rx) = ring_buffer(64);

    let result = client.exchange(&mut transport, &[1, 2, 3], &mut play).await;

    assert!(matches!(result, Err(Error::Transport(_))));
    assert!(transport.sent.is_empty());
    assert_eq!(transport.closes, 1);

    let events = drain(&mut rx);
    assert_eq!(
        statuses(&events),
        vec![SessionStatus::Connecting, SessionStatus::ServerUnreachable]
    );
    assert_eq!(events.last(), Some(&SessionEvent::Finished));
}

#[tokio::test(start_paused = true)]
async fn test_silent_server_times_out() {
    let mut transport = ScriptedTransport::new(Vec::new(), ReplyEnd::Idle);
    let (client, mut rx) = client();
    let (mut play, _play_rx) = ring_buffer(64);

    let summary = client
        .exchange(&mut transport, &[9; 10], &mut play)
        .await
        .unwrap();

    assert!(summary.timed_out);
    assert!(summary.directive.is_none());
    assert_eq!(
        statuses(&drain(&mut rx)).last(),
        Some(&SessionStatus::StreamTimeout)
    );
}

#[tokio::test(start_paused = true)]
async fn test_idle_after_reply_is_normal_end() {
    let mut reply = directive_frame(r#"{"control":{"has_command":false}}"#);
    reply.extend_from_slice(&[1, 2, 3, 4]);
    let mut transport = ScriptedTransport::new(vec![reply], ReplyEnd::Idle);
    let (client, mut rx) = client();
    let (mut play, _play_rx) = ring_buffer(64);

    let summary = client
        .exchange(&mut transport, &[9; 10], &mut play)
        .await
        .unwrap();

    assert!(summary.timed_out);
    assert_eq!(summary.audio_bytes, 4);
    let statuses = statuses(&drain(&mut rx));
    assert!(!statuses.contains(&SessionStatus::StreamTimeout));
    assert_eq!(statuses.last(), Some(&SessionStatus::Replying));
}

#[tokio::test(start_paused = true)]
async fn test_broken_stream_is_error_but_closes() {
    let mut transport = ScriptedTransport::new(vec![directive_frame("{}")], ReplyEnd::Broken);
    let (client, mut rx) = client();
    let (mut play, _play_rx) = ring_buffer(64);

    let result = client.exchange(&mut transport, &[9; 10], &mut play).await;

    assert!(matches!(result, Err(Error::Transport(_))));
    assert_eq!(transport.closes, 1);
    assert_eq!(drain(&mut rx).last(), Some(&SessionEvent::Finished));
}

#[tokio::test]
async fn test_empty_recording_rejected() {
    let mut transport = ScriptedTransport::new(Vec::new(), ReplyEnd::Eof);
    let (client, _rx) = client();
    let (mut play, _play_rx) = ring_buffer(64);

    let result = client.exchange(&mut transport, &[], &mut play).await;

    assert!(matches!(result, Err(Error::Session(_))));
    assert!(!transport.connected);
    assert_eq!(transport.sends, 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_playback_throttles_reply() {
    let mut reply = directive_frame("{}");
    let audio: Vec<u8> = (0..=255).collect();
    reply.extend_from_slice(&audio);
    let mut transport = ScriptedTransport::new(vec![reply], ReplyEnd::Eof);
    let (client, _rx) = client();

    // Ring far smaller than the reply; a consumer drains it slowly
    let (mut play, mut play_rx) = ring_buffer(32);
    let consumer = tokio::spawn(async move {
        let mut out = Vec::new();
        let mut buf = [0u8; 8];
        while out.len() < 256 {
            let n = play_rx.pop_slice(&mut buf);
            out.extend_from_slice(&buf[..n]);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        out
    });

    let summary = client
        .exchange(&mut transport, &[1; 4], &mut play)
        .await
        .unwrap();

    assert_eq!(summary.audio_bytes, 256);
    assert_eq!(summary.dropped_audio, 0);
    assert_eq!(consumer.await.unwrap(), audio);
}

#[tokio::test(start_paused = true)]
async fn test_exchange_over_cellular_link() {
    let recording: Vec<u8> = (0..1500u32).map(|i| (i % 256) as u8).collect();

    let mut reply = directive_frame(DIRECTIVE);
    reply.extend(std::iter::repeat_n(0x5A, 700));

    let serial = MockSerial::ready().with_reply_after_upload(recording.len() + 4, reply);
    let mut transport = CellularTransport::new(mock_modem(serial.clone()));
    let (client, mut rx) = client();
    let (mut play, mut play_rx) = ring_buffer(4096);

    let summary = client
        .exchange(&mut transport, &recording, &mut play)
        .await
        .unwrap();

    // Length prefix goes out as its own send, then the recording in chunks
    let mut expected = 1500u32.to_be_bytes().to_vec();
    expected.extend_from_slice(&recording);
    assert_eq!(serial.payload(), expected);

    let sends: Vec<String> = serial
        .command_texts()
        .into_iter()
        .filter(|c| c.starts_with("AT+MIPSEND"))
        .collect();
    assert_eq!(
        sends,
        vec!["AT+MIPSEND=1,4", "AT+MIPSEND=1,1024", "AT+MIPSEND=1,476"]
    );

    assert_eq!(summary.audio_bytes, 700);
    assert!(summary.directive.unwrap().has_command());
    assert_eq!(play_rx.len(), 700);
    assert!(
        serial
            .command_texts()
            .last()
            .is_some_and(|c| c == "AT+MIPCLOSE=1")
    );
    assert_eq!(drain(&mut rx).last(), Some(&SessionEvent::Finished));
}
