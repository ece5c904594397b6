//! Streaming decode of `getData.raw` response bodies into sample batches.
//!
//! [`StreamDecoder`] is fed the response body in chunks of any size, down to
//! a single byte, and produces exactly the same batches as a single-call
//! decode. It is synchronous and not re-entrant; the I/O layer above owns
//! one decoder per stream.

use prost::Message;

use crate::error::{Error, Result};
use crate::frame::{self, FramingError};
use crate::time;
use crate::values::{Batch, MetaRow};
use crate::wire::{self, PayloadType};

/// [`StreamDecoder`] configuration.
#[derive(Debug, Clone)]
pub struct DecoderOptions {
    /// Emit a batch as soon as this many samples are pending. Batches also
    /// flush on segment boundaries and at the end of the stream.
    pub threshold: usize,

    /// Keep accumulating across a header change when the new header carries
    /// the same PV name, payload type and element count, so that archive
    /// partition and year boundaries do not fragment the output.
    pub consolidate: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions {
            threshold: 256 * 1024,
            consolidate: true,
        }
    }
}

/// Context established by the most recent header, plus the batch being
/// accumulated under it.
struct Segment {
    ptype: PayloadType,
    pvname: Vec<u8>,
    element_count: usize,
    /// POSIX seconds of Jan 1 00:00:00 UTC of the header's year.
    year_base: i64,
    pending: Batch,
}

impl Segment {
    fn new(info: &wire::PayloadInfo) -> Result<Segment> {
        let ptype = info
            .payload_type()
            .map_err(|_| Error::MalformedHeader(format!("unknown payload type {}", info.r#type)))?;
        let year_base = time::year_base(info.year)
            .ok_or_else(|| Error::MalformedHeader(format!("year {} out of range", info.year)))?;
        let element_count = info.element_count.max(1) as usize;
        Ok(Segment {
            ptype,
            pvname: info.pvname.clone(),
            element_count,
            year_base,
            pending: Batch::empty(ptype, element_count),
        })
    }

    /// Decode `frame` as one sample of this segment's type and append it.
    /// A decode failure here is not yet an error: the caller retries the
    /// frame as a header.
    fn append(&mut self, frame: &[u8]) -> Result<(), prost::DecodeError> {
        use PayloadType::*;

        let n = self.element_count;
        let (sec, ns, severity, status, clipped) = match self.ptype {
            ScalarString => {
                let s = wire::ScalarString::decode(frame)?;
                let clipped = self.pending.values.push_str_row(&[s.val.as_slice()], n);
                (s.sec, s.ns, s.severity, s.status, clipped)
            }
            ScalarShort | ScalarEnum | ScalarByte | ScalarInt => {
                let s = wire::ScalarInt32::decode(frame)?;
                let clipped = self.pending.values.push_i32_row(&[s.val], n);
                (s.sec, s.ns, s.severity, s.status, clipped)
            }
            ScalarFloat => {
                let s = wire::ScalarFloat::decode(frame)?;
                let clipped = self.pending.values.push_f32_row(&[s.val], n);
                (s.sec, s.ns, s.severity, s.status, clipped)
            }
            ScalarDouble => {
                let s = wire::ScalarDouble::decode(frame)?;
                let clipped = self.pending.values.push_f64_row(&[s.val], n);
                (s.sec, s.ns, s.severity, s.status, clipped)
            }
            WaveformString => {
                let s = wire::VectorString::decode(frame)?;
                let cells: Vec<&[u8]> = s.val.iter().map(Vec::as_slice).collect();
                let clipped = self.pending.values.push_str_row(&cells, n);
                (s.sec, s.ns, s.severity, s.status, clipped)
            }
            WaveformShort | WaveformEnum | WaveformByte | WaveformInt => {
                let s = wire::VectorInt32::decode(frame)?;
                let clipped = self.pending.values.push_i32_row(&s.val, n);
                (s.sec, s.ns, s.severity, s.status, clipped)
            }
            WaveformFloat => {
                let s = wire::VectorFloat::decode(frame)?;
                let clipped = self.pending.values.push_f32_row(&s.val, n);
                (s.sec, s.ns, s.severity, s.status, clipped)
            }
            WaveformDouble => {
                let s = wire::VectorDouble::decode(frame)?;
                let clipped = self.pending.values.push_f64_row(&s.val, n);
                (s.sec, s.ns, s.severity, s.status, clipped)
            }
            V4GenericBytes => {
                let s = wire::GenericBytes::decode(frame)?;
                self.pending.values.push_bytes_row(s.val);
                (s.sec, s.ns, None, None, false)
            }
        };

        if clipped {
            log::warn!(
                "{}: sample element count != {}, padded/truncated",
                String::from_utf8_lossy(&self.pvname),
                n
            );
        }
        self.pending.meta.push(MetaRow {
            sec: (self.year_base + i64::from(sec)) as u32,
            ns,
            severity: severity.unwrap_or(0),
            status: status.unwrap_or(0),
        });
        Ok(())
    }
}

/// Incremental decoder for one retrieval stream.
pub struct StreamDecoder {
    options: DecoderOptions,
    /// Carry-over bytes of an incomplete trailing frame.
    buf: Vec<u8>,
    segment: Option<Segment>,
    output: Vec<Batch>,
}

impl StreamDecoder {
    pub fn new(options: DecoderOptions) -> StreamDecoder {
        StreamDecoder {
            options,
            buf: Vec::new(),
            segment: None,
            output: Vec::new(),
        }
    }

    /// Consume the next chunk of the response body. Pass `last = true` with
    /// the final chunk (which may be empty) so pending samples flush.
    ///
    /// Returns true iff this call appended at least one batch to the output
    /// queue. Errors are fatal for the stream; the decoder should then be
    /// discarded.
    pub fn process(&mut self, chunk: &[u8], last: bool) -> Result<bool> {
        self.buf.extend_from_slice(chunk);
        let input = std::mem::take(&mut self.buf);
        let (frames, remainder) = frame::split(&input)?;
        self.buf = remainder.to_vec();

        let before = self.output.len();
        for f in &frames {
            self.handle_frame(f)?;
        }

        if last {
            if !self.buf.is_empty() {
                return Err(FramingError::UnterminatedFrame(self.buf.len()).into());
            }
            self.flush();
        }
        Ok(self.output.len() > before)
    }

    /// Drain emitted batches, in wire order.
    pub fn take_output(&mut self) -> Vec<Batch> {
        std::mem::take(&mut self.output)
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Result<()> {
        if self.segment.is_none() {
            // awaiting the stream's first header
            let info = wire::PayloadInfo::decode(frame)
                .map_err(|e| Error::MalformedHeader(e.to_string()))?;
            log::debug!(
                "stream opens with {:?} for {}",
                info.payload_type(),
                String::from_utf8_lossy(&info.pvname)
            );
            self.segment = Some(Segment::new(&info)?);
            return Ok(());
        }

        let segment = self.segment.as_mut().expect("segment installed");
        match segment.append(frame) {
            Ok(()) => {
                if segment.pending.rows() >= self.options.threshold {
                    self.flush();
                }
                Ok(())
            }
            // Not a sample. A resynchronized header for the same PV marks a
            // new segment (year or partition boundary, or the gap before a
            // disconnect marker); anything else is fatal.
            Err(sample_err) => match wire::PayloadInfo::decode(frame) {
                Ok(info) if info.pvname == segment.pvname => self.resync(&info),
                Ok(info) => Err(Error::TypeChange {
                    expected: String::from_utf8_lossy(&segment.pvname).into_owned(),
                    got: String::from_utf8_lossy(&info.pvname).into_owned(),
                }),
                Err(_) => Err(Error::MalformedSample {
                    ptype: segment.ptype,
                    source: sample_err,
                }),
            },
        }
    }

    /// Install a replacement header mid-stream.
    fn resync(&mut self, info: &wire::PayloadInfo) -> Result<()> {
        let next = Segment::new(info)?;
        let segment = self.segment.as_mut().expect("resync without a segment");

        let same_shape =
            next.ptype == segment.ptype && next.element_count == segment.element_count;
        if self.options.consolidate && same_shape {
            // only the year base may have moved; keep accumulating
            segment.year_base = next.year_base;
            log::debug!(
                "consolidated header resync for {}",
                String::from_utf8_lossy(&segment.pvname)
            );
            return Ok(());
        }

        self.flush();
        self.segment = Some(next);
        Ok(())
    }

    /// Move the pending samples, if any, onto the output queue.
    fn flush(&mut self) {
        if let Some(segment) = self.segment.as_mut() {
            if !segment.pending.is_empty() {
                let fresh = Batch::empty(segment.ptype, segment.element_count);
                let done = std::mem::replace(&mut segment.pending, fresh);
                debug_assert_eq!(done.values.rows(done.element_count), done.meta.len());
                self.output.push(done);
            }
        }
    }
}
