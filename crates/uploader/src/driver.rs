//! Runs a [`Session`] against a live connection.
//!
//! The driver owns the I/O: it feeds connection notifications, segment reads
//! and cancellation into the session, and carries out the effects the session
//! returns. Segments are read one at a time; a segment that has been read is
//! held back while the transport backlog exceeds half a segment. Leaving the
//! sending state never cancels a read that has already started.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use frontporch_transfer::{Segment, Source, TransferError};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::UploadConfig;
use crate::connection::{BufferedGauge, Connection, Inbound};
use crate::error::UploadError;
use crate::observer::{UploadObserver, dispatch};
use crate::session::{Effect, Event, Session, State, UploadOutcome};
use crate::target::Destination;
use crate::ws;

type SegmentRead = Pin<Box<dyn Future<Output = (Segment, Result<Vec<u8>, TransferError>)> + Send>>;

/// Uploads `source` to `destination` on `host` and reports to `observer`.
///
/// Returns once the connection is closed, or immediately if it could not be
/// opened. Cancelling `cancel` aborts the upload.
pub async fn run(
    source: Arc<dyn Source>,
    destination: &Destination,
    host: &str,
    config: &UploadConfig,
    observer: &mut dyn UploadObserver,
    cancel: CancellationToken,
) -> UploadOutcome {
    let mut session = Session::new(source.size(), config);

    let url = match config.validate().and_then(|()| destination.url(host)) {
        Ok(url) => url,
        Err(err) => {
            notify_all(session.handle(Event::ConnectFailed(err)), observer);
            return session.outcome();
        }
    };
    info!(%url, size = source.size(), "starting upload");

    let connection = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            notify_all(session.handle(Event::Abort), observer);
            return session.outcome();
        }
        result = ws::connect(&url, config) => match result {
            Ok(connection) => connection,
            Err(e) => {
                let err = UploadError::Connect(e.to_string());
                notify_all(session.handle(Event::ConnectFailed(err)), observer);
                return session.outcome();
            }
        },
    };

    drive(&mut session, connection, source, config, observer, &cancel).await;
    session.outcome()
}

/// Pre-connection effects can only be notifications.
fn notify_all(effects: Vec<Effect>, observer: &mut dyn UploadObserver) {
    for effect in effects {
        match effect {
            Effect::Notify(event) => dispatch(observer, event),
            other => debug!(?other, "no connection for effect"),
        }
    }
}

/// Runs an already-open `connection` until the session is closed.
pub async fn drive(
    session: &mut Session,
    mut connection: Connection,
    source: Arc<dyn Source>,
    config: &UploadConfig,
    observer: &mut dyn UploadObserver,
    cancel: &CancellationToken,
) {
    let gauge = connection.gauge();
    let mut close_timer: Option<Interval> = None;
    let mut in_flight: Option<SegmentRead> = None;
    let mut abort_sent = false;

    let effects = session.handle(Event::Connected {
        binary_frames: connection.supports_binary(),
    });
    apply(effects, &connection, observer, &mut close_timer, config.close_retry);

    while session.state() != State::Closed {
        // A read started while sending runs to completion even after an abort
        // or error; the session discards its bytes.
        if in_flight.is_none() {
            if let (Some(segment), Some(mode)) = (session.next_segment(), session.mode()) {
                in_flight = Some(read_segment(
                    source.clone(),
                    segment,
                    gauge.clone(),
                    config.backpressure_threshold(mode),
                    config.backpressure_poll,
                ));
            }
        }

        let event = tokio::select! {
            biased;
            _ = cancel.cancelled(), if !abort_sent => {
                abort_sent = true;
                Event::Abort
            }
            inbound = connection.recv() => match inbound {
                Inbound::Message(text) => Event::Message(text),
                Inbound::Error(reason) => Event::TransportError(reason),
                Inbound::Closed => Event::TransportClosed,
            },
            _ = next_tick(&mut close_timer) => {
                trace!("repeating close request");
                connection.request_close();
                continue;
            }
            (segment, result) = next_read(&mut in_flight) => {
                in_flight = None;
                match result {
                    Ok(bytes) => Event::SegmentRead { segment, bytes },
                    Err(e) => Event::ReadFailed(e.to_string()),
                }
            }
        };

        let effects = session.handle(event);
        apply(effects, &connection, observer, &mut close_timer, config.close_retry);
    }
}

fn apply(
    effects: Vec<Effect>,
    connection: &Connection,
    observer: &mut dyn UploadObserver,
    close_timer: &mut Option<Interval>,
    close_retry: Duration,
) {
    for effect in effects {
        match effect {
            Effect::Send(frame) => {
                if let Err(e) = connection.send(frame) {
                    warn!("failed to queue frame: {e}");
                }
            }
            Effect::Notify(event) => dispatch(observer, event),
            Effect::BeginClose => {
                connection.request_close();
                let mut timer = tokio::time::interval_at(Instant::now() + close_retry, close_retry);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                *close_timer = Some(timer);
            }
            Effect::StopCloseTimer => *close_timer = None,
        }
    }
}

/// Reads `segment`, then waits until the backlog is at most `threshold`.
fn read_segment(
    source: Arc<dyn Source>,
    segment: Segment,
    gauge: BufferedGauge,
    threshold: usize,
    poll: Duration,
) -> SegmentRead {
    Box::pin(async move {
        let result = source.read_range(segment).await;
        if result.is_ok() {
            let mut waited = false;
            while gauge.load(Ordering::Acquire) > threshold {
                if !waited {
                    trace!(start = segment.start, threshold, "waiting for transport to drain");
                    waited = true;
                }
                tokio::time::sleep(poll).await;
            }
        }
        (segment, result)
    })
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_read(read: &mut Option<SegmentRead>) -> (Segment, Result<Vec<u8>, TransferError>) {
    match read {
        Some(read) => read.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Frame, Outbound, Peer};
    use crate::observer::{ChannelObserver, UploadEvent};
    use frontporch_transfer::MemorySource;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn start(
        data: Vec<u8>,
        binary_frames: bool,
        config: UploadConfig,
    ) -> (
        Peer,
        mpsc::UnboundedReceiver<UploadEvent>,
        CancellationToken,
        JoinHandle<UploadOutcome>,
    ) {
        let (connection, peer) = Connection::pair(binary_frames);
        let (mut observer, events) = ChannelObserver::new();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let source: Arc<dyn Source> = Arc::new(MemorySource::new("clip.bin", data));
        let handle = tokio::spawn(async move {
            let mut session = Session::new(source.size(), &config);
            drive(&mut session, connection, source, &config, &mut observer, &token).await;
            session.outcome()
        });
        (peer, events, cancel, handle)
    }

    async fn expect_text(peer: &mut Peer) -> String {
        match peer.recv_written().await {
            Some(Outbound::Frame(Frame::Text(text))) => text,
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<UploadEvent>) -> Vec<UploadEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    #[tokio::test]
    async fn uploads_all_segments() {
        let data = pattern(300_000);
        let (mut peer, mut events, _cancel, handle) =
            start(data.clone(), true, UploadConfig::default());

        assert_eq!(expect_text(&mut peer).await, "Filesize: 300000");
        peer.deliver(Inbound::Message("Permitted".into()));

        let mut received = Vec::new();
        let mut markers = Vec::new();
        loop {
            match peer.recv_written().await {
                Some(Outbound::Frame(Frame::Text(text))) if text == "File Finish" => break,
                Some(Outbound::Frame(Frame::Text(text))) => markers.push(text),
                Some(Outbound::Frame(Frame::Binary(bytes))) => received.extend(bytes),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(markers.len(), 3);
        assert_eq!(markers[2], "Segment Start: 262144 Segment Finish: 300000");
        assert_eq!(received, data);

        peer.deliver(Inbound::Message("Finished".into()));
        assert_eq!(peer.recv().await, Some(Outbound::Close));
        peer.deliver(Inbound::Closed);

        assert_eq!(handle.await.unwrap(), UploadOutcome::Finished);
        assert_eq!(
            drain(&mut events),
            vec![
                UploadEvent::Opened("Opened".into()),
                UploadEvent::Message("Permitted".into()),
                UploadEvent::Progress(43),
                UploadEvent::Progress(87),
                UploadEvent::Progress(100),
                UploadEvent::Message("Finished".into()),
                UploadEvent::Finished,
                UploadEvent::Closed("Closed".into()),
            ]
        );
    }

    #[tokio::test]
    async fn backlog_holds_segments_until_drained_and_abort_stops_them() {
        let (mut peer, mut events, cancel, handle) =
            start(pattern(300_000), true, UploadConfig::default());

        expect_text(&mut peer).await;
        peer.deliver(Inbound::Message("Permitted".into()));

        // First segment goes out; nothing is marked written.
        assert!(matches!(peer.recv().await, Some(Outbound::Frame(Frame::Text(_)))));
        assert!(matches!(peer.recv().await, Some(Outbound::Frame(Frame::Binary(_)))));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(peer.try_recv(), None);
        assert!(peer.buffered() > 65_536);

        // Draining releases the next segment.
        peer.written(peer.buffered());
        assert_eq!(
            peer.recv().await,
            Some(Outbound::Frame(Frame::Text(
                "Segment Start: 131072 Segment Finish: 262144".into()
            )))
        );
        assert!(matches!(peer.recv().await, Some(Outbound::Frame(Frame::Binary(_)))));

        cancel.cancel();
        assert_eq!(peer.recv().await, Some(Outbound::Close));
        peer.deliver(Inbound::Closed);
        assert_eq!(handle.await.unwrap(), UploadOutcome::Aborted);

        // Nothing but close requests after the abort.
        while let Some(request) = peer.try_recv() {
            assert_eq!(request, Outbound::Close);
        }
        let seen = drain(&mut events);
        assert!(seen.contains(&UploadEvent::Progress(43)));
        assert!(seen.contains(&UploadEvent::Progress(87)));
        assert!(!seen.contains(&UploadEvent::Progress(100)));
        assert!(!seen.iter().any(|e| matches!(e, UploadEvent::Error(_))));
        assert_eq!(seen.last(), Some(&UploadEvent::Closed("Closed".into())));
    }

    /// Source whose reads block until released.
    struct GatedSource {
        gate: tokio::sync::Notify,
        completed: std::sync::atomic::AtomicBool,
    }

    impl Source for GatedSource {
        fn name(&self) -> &str {
            "gated.bin"
        }

        fn size(&self) -> u64 {
            10
        }

        fn read_range(&self, segment: Segment) -> frontporch_transfer::ReadFuture<'_> {
            Box::pin(async move {
                self.gate.notified().await;
                self.completed.store(true, Ordering::Release);
                Ok(vec![7u8; segment.len() as usize])
            })
        }
    }

    #[tokio::test]
    async fn abort_lets_a_started_read_finish() {
        let source = Arc::new(GatedSource {
            gate: tokio::sync::Notify::new(),
            completed: std::sync::atomic::AtomicBool::new(false),
        });
        let config = UploadConfig::default();
        let (connection, mut peer) = Connection::pair(true);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task_source: Arc<dyn Source> = source.clone();
        let handle = tokio::spawn(async move {
            let mut session = Session::new(task_source.size(), &config);
            drive(&mut session, connection, task_source, &config, &mut (), &token).await;
            session.outcome()
        });

        expect_text(&mut peer).await;
        peer.deliver(Inbound::Message("Permitted".into()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        cancel.cancel();
        assert_eq!(peer.recv().await, Some(Outbound::Close));

        source.gate.notify_one();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !source.completed.load(Ordering::Acquire) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("read should complete after abort");
        tokio::time::sleep(Duration::from_millis(20)).await;

        peer.deliver(Inbound::Closed);
        assert_eq!(handle.await.unwrap(), UploadOutcome::Aborted);
        // The late read produced no frames.
        while let Some(request) = peer.try_recv() {
            assert_eq!(request, Outbound::Close);
        }
    }

    #[tokio::test]
    async fn rejection_closes_without_segments() {
        let (mut peer, mut events, _cancel, handle) =
            start(pattern(5), true, UploadConfig::default());

        assert_eq!(expect_text(&mut peer).await, "Filesize: 5");
        peer.deliver(Inbound::Message("Not Permitted: -1".into()));
        assert_eq!(peer.recv().await, Some(Outbound::Close));
        peer.deliver(Inbound::Closed);

        assert_eq!(
            handle.await.unwrap(),
            UploadOutcome::Failed(UploadError::AlreadyExists)
        );
        assert_eq!(
            drain(&mut events),
            vec![
                UploadEvent::Opened("Opened".into()),
                UploadEvent::Message("Not Permitted: -1".into()),
                UploadEvent::Error(UploadError::AlreadyExists),
                UploadEvent::Closed("Closed".into()),
            ]
        );
    }

    #[tokio::test]
    async fn text_transport_sends_base64() {
        let (mut peer, _events, _cancel, handle) =
            start(vec![0xFF], false, UploadConfig::default());

        expect_text(&mut peer).await;
        peer.deliver(Inbound::Message("Permitted".into()));
        assert_eq!(
            expect_text(&mut peer).await,
            "Segment Start: 0 Segment Finish: 1"
        );
        assert_eq!(expect_text(&mut peer).await, "/w==");
        assert_eq!(expect_text(&mut peer).await, "File Finish");

        peer.deliver(Inbound::Message("Finished".into()));
        assert_eq!(peer.recv().await, Some(Outbound::Close));
        peer.deliver(Inbound::Closed);
        assert_eq!(handle.await.unwrap(), UploadOutcome::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_repeated_until_transport_closes() {
        let (mut peer, _events, _cancel, handle) =
            start(pattern(1), true, UploadConfig::default());

        expect_text(&mut peer).await;
        peer.deliver(Inbound::Message("Permitted".into()));
        expect_text(&mut peer).await;
        peer.recv_written().await;
        assert_eq!(expect_text(&mut peer).await, "File Finish");
        peer.deliver(Inbound::Message("Finished".into()));

        let begun = Instant::now();
        assert_eq!(peer.recv().await, Some(Outbound::Close));
        assert_eq!(peer.recv().await, Some(Outbound::Close));
        assert_eq!(peer.recv().await, Some(Outbound::Close));
        assert!(begun.elapsed() >= Duration::from_millis(200));

        peer.deliver(Inbound::Closed);
        assert_eq!(handle.await.unwrap(), UploadOutcome::Finished);
    }

    #[tokio::test]
    async fn transport_error_fails_once() {
        let (mut peer, mut events, _cancel, handle) =
            start(pattern(300_000), true, UploadConfig::default());

        expect_text(&mut peer).await;
        peer.deliver(Inbound::Message("Permitted".into()));
        peer.recv_written().await;
        peer.deliver(Inbound::Error("connection reset".into()));
        peer.deliver(Inbound::Error("broken pipe".into()));
        peer.deliver(Inbound::Closed);

        let expected = UploadError::Transport("connection reset".into());
        assert_eq!(handle.await.unwrap(), UploadOutcome::Failed(expected.clone()));
        let errors: Vec<_> = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(e, UploadEvent::Error(_)))
            .collect();
        assert_eq!(errors, vec![UploadEvent::Error(expected)]);
    }

    #[tokio::test]
    async fn run_rejects_bad_host_without_connecting() {
        let source: Arc<dyn Source> = Arc::new(MemorySource::new("a.bin", vec![1, 2, 3]));
        let (mut observer, mut events) = ChannelObserver::new();
        let outcome = run(
            source,
            &Destination::new("/up", "a.bin"),
            "bad host",
            &UploadConfig::default(),
            &mut observer,
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(
            outcome,
            UploadOutcome::Failed(UploadError::Unsupported(_))
        ));
        assert!(matches!(
            drain(&mut events)[..],
            [UploadEvent::Error(UploadError::Unsupported(_))]
        ));
    }

    #[tokio::test]
    async fn run_aborted_before_connecting() {
        let source: Arc<dyn Source> = Arc::new(MemorySource::new("a.bin", vec![1]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (mut observer, mut events) = ChannelObserver::new();
        let outcome = run(
            source,
            &Destination::new("/up", "a.bin"),
            "127.0.0.1:9",
            &UploadConfig::default(),
            &mut observer,
            cancel,
        )
        .await;

        assert_eq!(outcome, UploadOutcome::Aborted);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn run_reports_refused_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source: Arc<dyn Source> = Arc::new(MemorySource::new("a.bin", vec![1]));
        let (mut observer, mut events) = ChannelObserver::new();
        let outcome = run(
            source,
            &Destination::new("/up", "a.bin"),
            &addr.to_string(),
            &UploadConfig::default(),
            &mut observer,
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(
            outcome,
            UploadOutcome::Failed(UploadError::Connect(_))
        ));
        assert!(matches!(
            drain(&mut events)[..],
            [UploadEvent::Error(UploadError::Connect(_))]
        ));
    }
}
