//! The streaming read loop.

use bytes::Bytes;
use fairchat_protocol::StreamPayload;
use futures::{Stream, StreamExt};
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use super::FragmentSink;
use super::decoder::{Frame, FrameDecoder};
use crate::error::{TransportError, TransportResult};

/// How a stream stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The termination sentinel was received.
    Done,
    /// The body ended without a sentinel.
    Ended,
    /// The caller cancelled the stream.
    Cancelled,
}

/// Summary of a finished stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamReport {
    pub outcome: StreamOutcome,
    /// Number of fragments handed to the callback.
    pub fragments: usize,
}

impl StreamReport {
    pub(crate) fn cancelled() -> Self {
        Self {
            outcome: StreamOutcome::Cancelled,
            fragments: 0,
        }
    }
}

/// Owns the body stream and releases it exactly once when dropped.
struct ReaderGuard<S> {
    stream: Option<S>,
}

impl<S> ReaderGuard<S>
where
    S: Stream + Unpin,
{
    fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    async fn next(&mut self) -> Option<S::Item> {
        match self.stream.as_mut() {
            Some(stream) => stream.next().await,
            None => None,
        }
    }
}

impl<S> Drop for ReaderGuard<S> {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            debug!("stream reader released");
        }
    }
}

enum Step<T> {
    Cancelled,
    Item(Option<T>),
}

enum Delivery {
    Continue,
    Done,
}

/// Read `stream` to completion, delivering each decoded text fragment to
/// `on_fragment` in arrival order.
///
/// Malformed payload lines are skipped. A read error is fatal. The stream is
/// released on every exit path, including cancellation.
pub async fn pump_stream<S, E>(
    stream: S,
    on_fragment: &mut FragmentSink<'_>,
    cancel: &CancellationToken,
) -> TransportResult<StreamReport>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin + Send,
    E: std::fmt::Display,
{
    let mut reader = ReaderGuard::new(stream);
    let mut frames = FrameDecoder::new();
    let mut fragments = 0usize;

    loop {
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            item = reader.next() => Step::Item(item),
        };

        match step {
            Step::Cancelled => {
                debug!("stream cancelled after {fragments} fragments");
                return Ok(StreamReport {
                    outcome: StreamOutcome::Cancelled,
                    fragments,
                });
            }
            Step::Item(None) => {
                for frame in frames.finish() {
                    if let Delivery::Done = deliver(frame, on_fragment, &mut fragments) {
                        return Ok(StreamReport {
                            outcome: StreamOutcome::Done,
                            fragments,
                        });
                    }
                }
                debug!("stream ended without sentinel after {fragments} fragments");
                return Ok(StreamReport {
                    outcome: StreamOutcome::Ended,
                    fragments,
                });
            }
            Step::Item(Some(Err(err))) => {
                warn!("stream read failed after {fragments} fragments: {err}");
                return Err(TransportError::Stream(err.to_string()));
            }
            Step::Item(Some(Ok(chunk))) => {
                for frame in frames.push(&chunk) {
                    if let Delivery::Done = deliver(frame, on_fragment, &mut fragments) {
                        debug!("stream finished with {fragments} fragments");
                        return Ok(StreamReport {
                            outcome: StreamOutcome::Done,
                            fragments,
                        });
                    }
                }
            }
        }
    }
}

fn deliver(
    frame: Frame,
    on_fragment: &mut FragmentSink<'_>,
    fragments: &mut usize,
) -> Delivery {
    match frame {
        Frame::Done => Delivery::Done,
        Frame::Data(raw) => {
            match serde_json::from_str::<StreamPayload>(&raw) {
                Ok(payload) => {
                    on_fragment(&payload.chunk);
                    *fragments += 1;
                }
                Err(err) => debug!("skipping malformed stream payload ({err}): {raw}"),
            }
            Delivery::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};

    /// Stream wrapper that counts how often it is dropped.
    struct Tracked<S> {
        inner: S,
        releases: Arc<AtomicUsize>,
    }

    impl<S: Stream + Unpin> Stream for Tracked<S> {
        type Item = S::Item;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Pin::new(&mut self.inner).poll_next(cx)
        }
    }

    impl<S> Drop for Tracked<S> {
        fn drop(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn chunks(parts: &[&'static [u8]]) -> Vec<Result<Bytes, String>> {
        parts.iter().map(|p| Ok(Bytes::from_static(p))).collect()
    }

    async fn run(
        items: Vec<Result<Bytes, String>>,
    ) -> (TransportResult<StreamReport>, Vec<String>, usize) {
        let releases = Arc::new(AtomicUsize::new(0));
        let tracked = Tracked {
            inner: stream::iter(items),
            releases: Arc::clone(&releases),
        };
        let mut seen = Vec::new();
        let result = pump_stream(
            tracked,
            &mut |fragment: &str| seen.push(fragment.to_string()),
            &CancellationToken::new(),
        )
        .await;
        (result, seen, releases.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn delivers_fragments_until_sentinel() {
        let (result, seen, releases) = run(chunks(&[
            b"data: {\"chunk\":\"Scanning\"}\n",
            b"data: {\"chunk\":\" files...\"}\n",
            b"data: [DONE]\n",
        ]))
        .await;

        let report = result.unwrap();
        assert_eq!(report.outcome, StreamOutcome::Done);
        assert_eq!(report.fragments, 2);
        assert_eq!(seen, vec!["Scanning", " files..."]);
        assert_eq!(releases, 1);
    }

    #[tokio::test]
    async fn stops_immediately_at_sentinel() {
        let (result, seen, releases) = run(chunks(&[
            b"data: {\"chunk\":\"a\"}\ndata: [DONE]\ndata: {\"chunk\":\"late\"}\n",
            b"data: {\"chunk\":\"later\"}\n",
        ]))
        .await;

        assert_eq!(result.unwrap().outcome, StreamOutcome::Done);
        assert_eq!(seen, vec!["a"]);
        assert_eq!(releases, 1);
    }

    #[tokio::test]
    async fn never_delivers_the_sentinel() {
        let (_, seen, _) = run(chunks(&[b"data: [DONE]\n"])).await;
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let (result, seen, _) = run(chunks(&[
            b"data: not json\n",
            b"data: {\"other\":1}\n",
            b"data: {\"chunk\":\"kept\"}\n",
            b"data: [DONE]\n",
        ]))
        .await;

        assert_eq!(result.unwrap().fragments, 1);
        assert_eq!(seen, vec!["kept"]);
    }

    #[tokio::test]
    async fn end_of_body_without_sentinel() {
        let (result, seen, releases) = run(chunks(&[
            b"data: {\"chunk\":\"one\"}\n",
            b"data: {\"chunk\":\"two\"}",
        ]))
        .await;

        let report = result.unwrap();
        assert_eq!(report.outcome, StreamOutcome::Ended);
        assert_eq!(seen, vec!["one", "two"]);
        assert_eq!(releases, 1);
    }

    #[tokio::test]
    async fn split_multibyte_payload_survives() {
        let line = "data: {\"chunk\":\"café ✓\"}\n".as_bytes();
        let (first, second) = line.split_at(line.len() - 6);
        let (result, seen, _) = run(vec![
            Ok(Bytes::copy_from_slice(first)),
            Ok(Bytes::copy_from_slice(second)),
        ])
        .await;

        assert_eq!(result.unwrap().outcome, StreamOutcome::Ended);
        assert_eq!(seen, vec!["café ✓"]);
    }

    #[tokio::test]
    async fn read_error_is_fatal_and_releases_reader() {
        let (result, seen, releases) = run(vec![
            Ok(Bytes::from_static(b"data: {\"chunk\":\"partial\"}\n")),
            Err("connection reset".to_string()),
            Ok(Bytes::from_static(b"data: {\"chunk\":\"never\"}\n")),
        ])
        .await;

        assert!(matches!(result, Err(TransportError::Stream(msg)) if msg == "connection reset"));
        assert_eq!(seen, vec!["partial"]);
        assert_eq!(releases, 1);
    }

    #[tokio::test]
    async fn cancellation_releases_reader() {
        let releases = Arc::new(AtomicUsize::new(0));
        let tracked = Tracked {
            inner: stream::pending::<Result<Bytes, Infallible>>(),
            releases: Arc::clone(&releases),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = pump_stream(tracked, &mut |_: &str| {}, &cancel)
            .await
            .unwrap();

        assert_eq!(report.outcome, StreamOutcome::Cancelled);
        assert_eq!(report.fragments, 0);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
