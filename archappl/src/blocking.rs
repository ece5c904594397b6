//! Thread-backed synchronous facade over [`Archive`](crate::Archive).
//!
//! Owns a worker runtime and marshals calls onto it, so scripts and tools
//! without an async runtime of their own can still talk to an appliance.
//! Every call observes the configured operation timeout.

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::Archive;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::search::MatchMode;
use crate::time::TimeSpec;
use crate::values::Batch;

/// Streamed batches cross from the worker runtime to the caller through a
/// bounded channel; a small capacity keeps the producer from racing far
/// ahead of a slow consumer.
const BATCH_QUEUE: usize = 4;

pub struct BlockingArchive {
    rt: tokio::runtime::Runtime,
    archive: Archive,
    timeout: Duration,
}

impl BlockingArchive {
    /// Connect to the appliance described by `conf`, blocking the calling
    /// thread.
    pub fn connect(conf: Config) -> Result<BlockingArchive> {
        let timeout = Duration::from_secs_f64(conf.timeout);
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let archive = rt.block_on(timed(timeout, Archive::connect(conf)))?;
        Ok(BlockingArchive {
            rt,
            archive,
            timeout,
        })
    }

    pub fn search(&self, pattern: &str, mode: MatchMode) -> Result<Vec<String>> {
        self.rt
            .block_on(timed(self.timeout, self.archive.search(pattern, mode)))
    }

    pub fn grep(&self, pattern: &str) -> Result<Vec<String>> {
        self.search(pattern, MatchMode::Regex)
    }

    pub fn raw(
        &self,
        pv: &str,
        start: TimeSpec,
        end: TimeSpec,
        chunk: Option<usize>,
    ) -> Result<Option<Batch>> {
        self.rt
            .block_on(timed(self.timeout, self.archive.raw(pv, start, end, chunk)))
    }

    pub fn plot(
        &self,
        pv: &str,
        start: TimeSpec,
        end: TimeSpec,
        count: Option<usize>,
    ) -> Result<Option<Batch>> {
        self.rt
            .block_on(timed(self.timeout, self.archive.plot(pv, start, end, count)))
    }

    /// Iterate over raw sample batches as they decode. The producer runs on
    /// the worker runtime and is cancelled when the iterator is dropped;
    /// each `next()` observes the operation timeout on its own.
    pub fn raw_iter(
        &self,
        pv: &str,
        start: TimeSpec,
        end: TimeSpec,
        chunk: Option<usize>,
    ) -> BlockingBatches<'_> {
        let (tx, rx) = mpsc::channel(BATCH_QUEUE);
        let stream = self.archive.raw_iter(pv, start, end, chunk);
        let producer = self.rt.spawn(async move {
            futures::pin_mut!(stream);
            while let Some(item) = stream.next().await {
                let stop = item.is_err();
                if tx.send(item).await.is_err() || stop {
                    break;
                }
            }
            // tx drops here; the closed channel is the end-of-stream mark
        });

        BlockingBatches {
            rx,
            producer,
            handle: self.rt.handle().clone(),
            timeout: self.timeout,
            _archive: PhantomData,
        }
    }
}

fn timed<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> impl Future<Output = Result<T>> {
    async move {
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::TimedOut(limit.as_secs_f64()))?
    }
}

/// Blocking iterator over the batches of one streamed query.
pub struct BlockingBatches<'a> {
    rx: mpsc::Receiver<Result<Batch>>,
    producer: JoinHandle<()>,
    handle: tokio::runtime::Handle,
    timeout: Duration,
    _archive: PhantomData<&'a BlockingArchive>,
}

impl Iterator for BlockingBatches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Result<Batch>> {
        let limit = self.timeout;
        let rx = &mut self.rx;
        match self
            .handle
            .block_on(async move { tokio::time::timeout(limit, rx.recv()).await })
        {
            Ok(item) => item,
            Err(_) => Some(Err(Error::TimedOut(limit.as_secs_f64()))),
        }
    }
}

impl Drop for BlockingBatches<'_> {
    fn drop(&mut self) {
        self.producer.abort();
    }
}
