//! Shared fixture: the RadMon dose-rate stream, rebuilt with the crate's
//! own encoders. 22 scalar-double samples in two segments; the second
//! segment opens with a header resync and a disconnect marker sample.
#![allow(dead_code)]

use archappl::wire::{FieldValue, PayloadInfo, PayloadType, ScalarDouble};
use archappl::{frame, Batch, MetaRow, ValueBlock};
use prost::Message;

pub const PV: &str = "LN-AM{RadMon:1}DoseRate-I";

/// POSIX seconds of 2015-01-01T00:00:00Z, the year base of both segments.
pub const YEAR_BASE: u32 = 1420070400;

pub const DISCONNECT_SEVERITY: u32 = 3904;

/// `(posix sec, ns, severity, value)` of the first segment.
pub const BATCH1: [(u32, u32, u32, f64); 11] = [
    (1423234604, 887015782, 0, 0.03),
    (1423248954, 139922833, 0, 2.17),
    (1423248955, 140245250, 0, 0.45),
    (1423248956, 140024882, 0, -0.15),
    (1423248957, 140228286, 0, -0.31),
    (1423248961, 145268115, 0, -0.21),
    (1423248963, 145419813, 0, -0.14),
    (1423248965, 145170191, 0, -0.08),
    (1423248969, 145384148, 0, -0.02),
    (1423249758, 541449008, 0, 0.04),
    (1423250956, 140990782, 0, 0.02),
];

/// The second segment; the first row is the synthesized disconnect marker.
pub const BATCH2: [(u32, u32, u32, f64); 11] = [
    (1423250956, 0, DISCONNECT_SEVERITY, 0.0),
    (1423263362, 434265082, 0, 2.18),
    (1423263363, 429269655, 0, 0.44),
    (1423263364, 434134740, 0, -0.14),
    (1423263365, 434277492, 0, -0.32),
    (1423263368, 434441414, 0, -0.26),
    (1423263369, 434220574, 0, -0.21),
    (1423263371, 434272868, 0, -0.14),
    (1423263373, 434366836, 0, -0.09),
    (1423263377, 439388932, 0, -0.03),
    (1423263404, 449503115, 0, 0.03),
];

pub fn header_frame() -> Vec<u8> {
    PayloadInfo {
        r#type: PayloadType::ScalarDouble as i32,
        pvname: PV.as_bytes().to_vec(),
        year: 2015,
        element_count: 1,
        headers: vec![
            FieldValue {
                name: b"EGU".to_vec(),
                val: b"mR/h".to_vec(),
            },
            FieldValue {
                name: b"PREC".to_vec(),
                val: b"2".to_vec(),
            },
        ],
    }
    .encode_to_vec()
}

pub fn sample_frame(sec: u32, ns: u32, severity: u32, val: f64) -> Vec<u8> {
    ScalarDouble {
        sec: sec - YEAR_BASE,
        ns,
        val,
        severity: (severity != 0).then_some(severity),
        status: None,
        fieldvalues: vec![],
    }
    .encode_to_vec()
}

/// The full wire stream: header, 11 samples, header resync, 11 samples.
pub fn fixture() -> Vec<u8> {
    let mut frames = vec![header_frame()];
    frames.extend(BATCH1.iter().map(|&(s, n, sev, v)| sample_frame(s, n, sev, v)));
    frames.push(header_frame());
    frames.extend(BATCH2.iter().map(|&(s, n, sev, v)| sample_frame(s, n, sev, v)));
    frame::join(&frames)
}

pub fn assert_batch(batch: &Batch, expected: &[(u32, u32, u32, f64)]) {
    assert_eq!(batch.element_count, 1);
    assert_eq!(batch.rows(), expected.len(), "batch row count");
    let ValueBlock::Double(vals) = &batch.values else {
        panic!("expected doubles, got {}", batch.values.kind_name());
    };
    for (i, &(sec, ns, severity, val)) in expected.iter().enumerate() {
        assert_eq!(
            batch.meta[i],
            MetaRow {
                sec,
                ns,
                severity,
                status: 0
            },
            "meta row {i}"
        );
        assert_eq!(vals[i], val, "value row {i}");
    }
}

/// BATCH1 and BATCH2 as one run, for consolidated decodes.
pub fn all_rows() -> Vec<(u32, u32, u32, f64)> {
    BATCH1.iter().chain(BATCH2.iter()).copied().collect()
}
