//! # `archappl`
//!
//! Client for the [EPICS Archiver Appliance] retrieval service: PV name
//! search plus streamed decode of the `getData.raw` wire format into typed
//! sample batches.
//!
//! The retrieval stream is a concatenation of newline-framed, escape-encoded
//! protobuf messages: a [`wire::PayloadInfo`] header opens each segment and
//! every following frame is one sample of the header's payload type. The
//! core of the crate is [`StreamDecoder`], which consumes that stream in
//! chunks of any size and emits `(values, meta)` batches:
//!
//! ```
//! use archappl::{DecoderOptions, StreamDecoder};
//!
//! let mut decoder = StreamDecoder::new(DecoderOptions {
//!     threshold: 4096,
//!     consolidate: true,
//! });
//! # let chunk: &[u8] = b"";
//! // feed response body chunks as they arrive, then close the stream
//! if decoder.process(chunk, true)? {
//!     for batch in decoder.take_output() {
//!         println!("{} samples x {} elements", batch.rows(), batch.element_count);
//!     }
//! }
//! # Ok::<(), archappl::Error>(())
//! ```
//!
//! [`Archive`] wraps the HTTP side: appliance discovery, name search and
//! streamed fetches, with a bounded number of concurrent requests.
//!
//! ```no_run
//! use archappl::{Archive, Config, MatchMode, TimeSpec};
//! use chrono::Duration;
//!
//! # async fn demo() -> archappl::Result<()> {
//! let archive = Archive::connect(Config::default()).await?;
//! for pv in archive.search("SR:C03*", MatchMode::Wildcard).await? {
//!     let window = (TimeSpec::Relative(Duration::hours(-1)), TimeSpec::Relative(Duration::zero()));
//!     if let Some(batch) = archive.raw(&pv, window.0, window.1, None).await? {
//!         println!("{pv}: {} samples", batch.rows());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Callers without an async runtime can use [`blocking::BlockingArchive`],
//! which runs the client on a worker runtime and applies the configured
//! operation timeout to every call.
//!
//! [EPICS Archiver Appliance]: https://epicsarchiver.readthedocs.io/

pub mod blocking;
mod client;
mod config;
mod decoder;
mod error;
pub mod frame;
mod search;
pub mod time;
mod values;
pub mod wire;

pub use client::Archive;
pub use config::Config;
pub use decoder::{DecoderOptions, StreamDecoder};
pub use error::{Error, Result};
pub use frame::FramingError;
pub use search::{wild_to_regex, MatchMode};
pub use time::TimeSpec;
pub use values::{Batch, MetaRow, ValueBlock, STRING_CELL};
pub use wire::PayloadType;
