use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use deckhand_core::{
    AbortReason, Context, DeckhandResult, ErrorKind, JobState, RecordingSink, SinkEvent,
    StreamSettings, Style,
};
use deckhand_stream::{
    InMemoryJobStreams, JobProgressEvent, JobStatus, JobStreamConsumer, TerminalEvent,
    channel_stream, encode_event, ndjson_stream,
};

const JOB: &str = "job-42";
const HINT: &str = "still run in the background";

fn transition(state: JobState) -> JobProgressEvent {
    JobProgressEvent::StateTransition { current: state }
}

fn complete() -> JobProgressEvent {
    JobProgressEvent::Complete { error: None }
}

fn consumer(streams: &InMemoryJobStreams, sink: &RecordingSink) -> JobStreamConsumer {
    JobStreamConsumer::new(Arc::new(streams.clone()), Arc::new(sink.clone()))
}

async fn watch_events(events: Vec<JobProgressEvent>) -> (DeckhandResult<()>, RecordingSink) {
    let streams = InMemoryJobStreams::new();
    streams.insert_events(JOB, events);
    let sink = RecordingSink::new();
    let result = consumer(&streams, &sink)
        .watch(&Context::background(), JOB)
        .await;
    (result, sink)
}

/// Feed events with a pause before each, from a separate task.
fn paced(streams: &InMemoryJobStreams, script: Vec<(Duration, JobProgressEvent)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    streams.insert(JOB, channel_stream(rx));
    tokio::spawn(async move {
        for (pause, event) in script {
            tokio::time::sleep(pause).await;
            if tx.send(event).is_err() {
                return;
            }
        }
        // Keep the stream open until the consumer hangs up.
        tx.closed().await;
    });
}

// ── Hint debounce ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn hint_shown_once_when_queued_persists() {
    let streams = InMemoryJobStreams::new();
    paced(
        &streams,
        vec![
            (Duration::ZERO, JobProgressEvent::Open),
            (Duration::ZERO, transition(JobState::Queued)),
            (Duration::from_secs(2), transition(JobState::Running)),
            (Duration::ZERO, complete()),
        ],
    );
    let sink = RecordingSink::new();

    consumer(&streams, &sink)
        .watch(&Context::background(), JOB)
        .await
        .unwrap();

    assert_eq!(sink.count_lines_containing(HINT), 1);
    assert!(sink.events().iter().any(|e| matches!(
        e,
        SinkEvent::Output { line, style: Style::Info } if line.contains("is queued waiting for a runner")
    )));
}

#[tokio::test(start_paused = true)]
async fn no_hint_when_running_arrives_first() {
    let (result, sink) = watch_events(vec![
        JobProgressEvent::Open,
        transition(JobState::Queued),
        transition(JobState::Running),
        complete(),
    ])
    .await;

    result.unwrap();
    assert_eq!(sink.count_lines_containing(HINT), 0);
}

#[tokio::test(start_paused = true)]
async fn no_hint_when_running_arrives_within_debounce() {
    let streams = InMemoryJobStreams::new();
    paced(
        &streams,
        vec![
            (Duration::ZERO, JobProgressEvent::Open),
            (Duration::ZERO, transition(JobState::Queued)),
            (Duration::from_millis(1400), transition(JobState::Running)),
            (Duration::from_secs(5), complete()),
        ],
    );
    let sink = RecordingSink::new();

    consumer(&streams, &sink)
        .watch(&Context::background(), JOB)
        .await
        .unwrap();

    assert_eq!(sink.count_lines_containing(HINT), 0);
}

#[tokio::test(start_paused = true)]
async fn hint_is_not_repeated_for_a_later_wait() {
    let streams = InMemoryJobStreams::new();
    paced(
        &streams,
        vec![
            (Duration::ZERO, JobProgressEvent::Open),
            (Duration::ZERO, transition(JobState::Queued)),
            (Duration::from_secs(2), transition(JobState::Waiting)),
            (Duration::from_secs(2), transition(JobState::Running)),
            (Duration::ZERO, complete()),
        ],
    );
    let sink = RecordingSink::new();

    consumer(&streams, &sink)
        .watch(&Context::background(), JOB)
        .await
        .unwrap();

    assert_eq!(sink.count_lines_containing(HINT), 1);
}

#[tokio::test(start_paused = true)]
async fn hint_delay_is_configurable() {
    let streams = InMemoryJobStreams::new();
    paced(
        &streams,
        vec![
            (Duration::ZERO, JobProgressEvent::Open),
            (Duration::ZERO, transition(JobState::Waiting)),
            (Duration::from_secs(2), transition(JobState::Running)),
            (Duration::ZERO, complete()),
        ],
    );
    let sink = RecordingSink::new();

    consumer(&streams, &sink)
        .with_settings(StreamSettings {
            hint_delay: Duration::from_secs(10),
        })
        .watch(&Context::background(), JOB)
        .await
        .unwrap();

    assert_eq!(sink.count_lines_containing(HINT), 0);
}

// ── Protocol ──────────────────────────────────────────────────────

#[tokio::test]
async fn first_event_must_be_open() {
    let (result, sink) = watch_events(vec![transition(JobState::Running), complete()]).await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(err.to_string().contains("state_transition"));
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn stream_without_verdict_is_precondition() {
    let (result, _) = watch_events(vec![JobProgressEvent::Open]).await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Precondition);

    let (result, _) = watch_events(vec![]).await;
    assert!(result.unwrap_err().to_string().contains("before it was opened"));
}

#[tokio::test]
async fn job_errors_are_decoded() {
    let (result, _) = watch_events(vec![
        JobProgressEvent::Open,
        JobProgressEvent::Complete {
            error: Some(JobStatus::new(13, "exit status 1")),
        },
    ])
    .await;
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Failed);
    assert!(err.to_string().contains("exit status 1"));

    let (result, _) = watch_events(vec![
        JobProgressEvent::Open,
        JobProgressEvent::Error {
            status: JobStatus::new(1, "cancelled by operator"),
        },
    ])
    .await;
    assert_eq!(result.unwrap_err().abort_reason(), Some(AbortReason::Cancelled));
}

#[tokio::test]
async fn events_after_completion_are_not_rendered() {
    let (result, sink) = watch_events(vec![
        JobProgressEvent::Open,
        complete(),
        JobProgressEvent::terminal(TerminalEvent::Line {
            msg: "late".into(),
            style: Style::Plain,
        }),
    ])
    .await;
    result.unwrap();
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn unknown_events_are_skipped() {
    let (result, sink) = watch_events(vec![
        JobProgressEvent::Open,
        JobProgressEvent::Unknown,
        JobProgressEvent::Terminal {
            events: vec![
                TerminalEvent::Unknown,
                TerminalEvent::Line {
                    msg: "still here".into(),
                    style: Style::Success,
                },
            ],
        },
        complete(),
    ])
    .await;
    result.unwrap();
    assert_eq!(sink.lines(), vec!["still here".to_string()]);
}

#[tokio::test]
async fn closing_a_never_opened_step_is_a_no_op() {
    let (result, sink) = watch_events(vec![
        JobProgressEvent::Open,
        JobProgressEvent::terminal(TerminalEvent::StepGroup { close: false }),
        JobProgressEvent::terminal(TerminalEvent::step_close(1)),
        JobProgressEvent::terminal(TerminalEvent::StepGroup { close: true }),
        complete(),
    ])
    .await;

    result.unwrap();
    assert_eq!(
        sink.events(),
        vec![
            SinkEvent::GroupOpened { group: 1 },
            SinkEvent::GroupWaited { group: 1 },
        ]
    );
}

#[tokio::test]
async fn terminal_events_keep_wire_order() {
    let (result, sink) = watch_events(vec![
        JobProgressEvent::Open,
        JobProgressEvent::Terminal {
            events: vec![
                TerminalEvent::Line {
                    msg: "a".into(),
                    style: Style::Header,
                },
                TerminalEvent::Raw {
                    data: b"b".to_vec(),
                    stderr: true,
                },
            ],
        },
        JobProgressEvent::terminal(TerminalEvent::Line {
            msg: "c".into(),
            style: Style::Plain,
        }),
        complete(),
    ])
    .await;

    result.unwrap();
    assert_eq!(
        sink.events(),
        vec![
            SinkEvent::Output {
                line: "a".into(),
                style: Style::Header
            },
            SinkEvent::Stderr(b"b".to_vec()),
            SinkEvent::Output {
                line: "c".into(),
                style: Style::Plain
            },
        ]
    );
}

#[tokio::test]
async fn missing_stream_is_upstream() {
    let sink = RecordingSink::new();
    let err = consumer(&InMemoryJobStreams::new(), &sink)
        .watch(&Context::background(), JOB)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
}

// ── Cancellation ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn cancellation_unblocks_and_cleans_up() {
    let streams = InMemoryJobStreams::new();
    paced(
        &streams,
        vec![
            (Duration::ZERO, JobProgressEvent::Open),
            (
                Duration::ZERO,
                JobProgressEvent::Terminal {
                    events: vec![
                        TerminalEvent::StepGroup { close: false },
                        TerminalEvent::step_message(1, "building"),
                    ],
                },
            ),
            (Duration::ZERO, transition(JobState::Queued)),
        ],
    );
    let sink = RecordingSink::new();
    let watcher = consumer(&streams, &sink);
    let (ctx, cancel) = Context::with_cancel();

    let (result, ()) = tokio::join!(watcher.watch(&ctx, JOB), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    assert_eq!(result.unwrap_err().abort_reason(), Some(AbortReason::Cancelled));
    let events = sink.events();
    assert!(events.contains(&SinkEvent::StepAborted { step: 1 }));
    assert_eq!(events.last(), Some(&SinkEvent::GroupWaited { group: 1 }));

    // The armed hint died with the watch.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(sink.count_lines_containing(HINT), 0);
}

#[tokio::test(start_paused = true)]
async fn caller_deadline_aborts() {
    let streams = InMemoryJobStreams::new();
    paced(&streams, vec![(Duration::ZERO, JobProgressEvent::Open)]);
    let sink = RecordingSink::new();
    let ctx = Context::background().with_timeout(Duration::from_secs(30));

    let err = consumer(&streams, &sink).watch(&ctx, JOB).await.unwrap_err();

    assert_eq!(err.abort_reason(), Some(AbortReason::DeadlineExceeded));
}

// ── Transport ─────────────────────────────────────────────────────

#[tokio::test]
async fn renders_an_ndjson_transcript() {
    let transcript: String = [
        JobProgressEvent::Open,
        transition(JobState::Running),
        JobProgressEvent::terminal(TerminalEvent::Line {
            msg: "Deploying web".into(),
            style: Style::Header,
        }),
        complete(),
    ]
    .iter()
    .map(|e| encode_event(e).unwrap())
    .collect();

    let streams = InMemoryJobStreams::new();
    streams.insert(JOB, ndjson_stream(Cursor::new(transcript.into_bytes())));
    let sink = RecordingSink::new();

    consumer(&streams, &sink)
        .watch(&Context::background(), JOB)
        .await
        .unwrap();
    assert_eq!(sink.lines(), vec!["Deploying web".to_string()]);
}

#[tokio::test]
async fn malformed_transcript_line_is_precondition() {
    let streams = InMemoryJobStreams::new();
    streams.insert(
        JOB,
        ndjson_stream(Cursor::new(b"{\"type\":\"open\"}\n{\"type\":".to_vec())),
    );
    let sink = RecordingSink::new();

    let err = consumer(&streams, &sink)
        .watch(&Context::background(), JOB)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}
