//! Watched query streams.
//!
//! A watched query is a stream that keeps one operation's result fresh:
//!
//! The operation is recorded in the cache as soon as the stream is built, and
//! the stream observes the record's trigger. Every watcher of a key therefore
//! shares one trigger, whichever of them is polled first.
//!
//! 1. If the cache already holds a clean response for the operation (for
//!    example after resuming a dehydrated session), it is emitted without a
//!    transport call
//! 2. Otherwise the operation is executed and its result emitted
//! 3. Every time the query's trigger changes, the operation is executed again
//!
//! The reissued request passes through the watch exchange, which sees the
//! positive trigger and forces the refetch policy onto it.

use futures::StreamExt;
use futures::stream;
use tokio::sync::watch;

use super::Client;
use crate::cache::Trigger;
use crate::exchange::ResultStream;
use crate::operation::{Operation, OperationResult};

/// Internal state machine for the watched query stream.
enum State {
    Initial,
    Fetching,
    Watching { rx: watch::Receiver<u64> },
}

pub(super) fn watch_query(client: Client, operation: Operation) -> ResultStream {
    let mut operation = operation.watched();
    let trigger = client.cache().record_request(&operation);
    operation.context.trigger = Some(trigger.clone());

    stream::unfold(State::Initial, move |state| {
        let client = client.clone();
        let operation = operation.clone();
        let trigger = trigger.clone();

        async move { step(&client, operation, &trigger, state).await }
    })
    .boxed()
}

async fn step(
    client: &Client,
    operation: Operation,
    trigger: &Trigger,
    mut state: State,
) -> Option<(OperationResult, State)> {
    loop {
        match state {
            State::Initial => {
                // Resume from a clean stored response
                if let Some(record) = client.cache().query(operation.key) {
                    if !record.is_dirty() && record.response.has_data() {
                        tracing::debug!(key = operation.key, "resuming watched query from cache");
                        let result = record.response.to_result(operation);
                        return Some((result, State::Watching { rx: trigger.subscribe() }));
                    }
                }
                state = State::Fetching;
            }

            State::Fetching => {
                // Subscribe first so bumps during the fetch are not missed
                let rx = trigger.subscribe();
                let result = client.execute(operation).next().await?;
                return Some((result, State::Watching { rx }));
            }

            State::Watching { mut rx } => {
                if rx.changed().await.is_err() {
                    return None;
                }
                tracing::debug!(
                    key = operation.key,
                    trigger = *rx.borrow(),
                    "watched query invalidated, refetching"
                );
                state = State::Fetching;
            }
        }
    }
}
