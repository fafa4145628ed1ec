//! Prefetch helper for the data loader.
//!
//! Drives a stream on its own tokio task and hands items over through a
//! bounded channel, so up to `cap` items are produced ahead of consumption.

use futures_util::StreamExt;
use tokio::sync::mpsc::{channel, Receiver};
use tokio_stream::wrappers::ReceiverStream;

use crate::data_loader::dataset::{DatasetError, DynStream};

/// Spawn an async prefetcher over `source`.
///
/// The returned `Receiver` yields `Result<T, DatasetError>` with up to `cap`
/// in flight. The task stops after forwarding the first error, at the end of
/// `source`, or when the receiver is dropped.
pub fn spawn_prefetch<T>(cap: usize, mut source: DynStream<T>) -> Receiver<Result<T, DatasetError>>
where
    T: Send + 'static,
{
    let (tx, rx) = channel(cap.max(1));
    tokio::spawn(async move {
        while let Some(item) = source.next().await {
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// [`spawn_prefetch`] wrapped back into a stream.
pub fn prefetch_stream<T>(cap: usize, source: DynStream<T>) -> DynStream<T>
where
    T: Send + 'static,
{
    Box::pin(ReceiverStream::new(spawn_prefetch(cap, source)))
}
