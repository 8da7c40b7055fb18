//! Rate limiting for streams of intermediate results.
//!
//! A value passes through when it is the first one seen or when more than
//! `interval` has gone by since the last value that passed. Whatever arrives
//! in between is held, and the latest held value is released when the input
//! ends, so the consumer always sees the terminal state.

use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use futures::{pin_mut, Stream, StreamExt};
use tokio::time::Instant;

pub fn throttle<S>(input: S, interval: Duration) -> impl Stream<Item = S::Item>
where
    S: Stream,
{
    try_throttle(input.map(Ok::<_, Infallible>), interval).map(|item| match item {
        Ok(value) => value,
        Err(never) => match never {},
    })
}

/// [`throttle`] for fallible streams.
///
/// The first error ends the output. Before it is passed on, the latest
/// value still being held is released so the consumer keeps the most recent
/// good state.
pub fn try_throttle<S, T, E>(input: S, interval: Duration) -> impl Stream<Item = Result<T, E>>
where
    S: Stream<Item = Result<T, E>>,
{
    stream! {
        pin_mut!(input);
        let mut last_emit: Option<Instant> = None;
        let mut held: Option<T> = None;

        while let Some(item) = input.next().await {
            match item {
                Ok(value) => {
                    let now = Instant::now();
                    let due = last_emit.map_or(true, |at| now.duration_since(at) > interval);
                    if due {
                        last_emit = Some(now);
                        held = None;
                        yield Ok(value);
                    } else {
                        held = Some(value);
                    }
                }
                Err(err) => {
                    if let Some(value) = held.take() {
                        yield Ok(value);
                    }
                    yield Err(err);
                    return;
                }
            }
        }

        if let Some(value) = held {
            yield Ok(value);
        }
    }
}
