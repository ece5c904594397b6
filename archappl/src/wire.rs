//! Protobuf schemas of the retrieval stream.
//!
//! One frame carries exactly one message: a [`PayloadInfo`] header at the
//! start of each segment, then one sample message per frame whose schema is
//! selected by the header's [`PayloadType`]. Several payload types share a
//! wire shape, so the sample messages here are named by shape:
//!
//! | payload types                                   | message         |
//! |-------------------------------------------------|-----------------|
//! | `ScalarString`                                  | [`ScalarString`]|
//! | `ScalarShort`/`ScalarEnum`/`ScalarByte`/`ScalarInt` | [`ScalarInt32`] |
//! | `ScalarFloat`                                   | [`ScalarFloat`] |
//! | `ScalarDouble`                                  | [`ScalarDouble`]|
//! | `WaveformString`                                | [`VectorString`]|
//! | `WaveformShort`/`WaveformEnum`/`WaveformByte`/`WaveformInt` | [`VectorInt32`] |
//! | `WaveformFloat`                                 | [`VectorFloat`] |
//! | `WaveformDouble`                                | [`VectorDouble`]|
//! | `V4GenericBytes`                                | [`GenericBytes`]|
//!
//! `sec` is seconds since Jan 1 00:00:00 UTC of the header's year, not the
//! POSIX epoch. Encoding exists for tests and fixtures only.

/// Payload type tag carried in [`PayloadInfo`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PayloadType {
    ScalarString = 0,
    ScalarShort = 1,
    ScalarFloat = 2,
    ScalarEnum = 3,
    ScalarByte = 4,
    ScalarInt = 5,
    ScalarDouble = 6,
    WaveformString = 7,
    WaveformShort = 8,
    WaveformFloat = 9,
    WaveformEnum = 10,
    WaveformByte = 11,
    WaveformInt = 12,
    WaveformDouble = 13,
    V4GenericBytes = 14,
}

/// Free-form name/value pair attached to headers and samples (`EGU`,
/// `PREC`, alarm strings, ...).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FieldValue {
    #[prost(bytes = "vec", required, tag = "1")]
    pub name: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub val: Vec<u8>,
}

/// Segment header. Appears at the start of a stream and again whenever the
/// server switches PV, payload type, calendar year or archive partition.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PayloadInfo {
    #[prost(enumeration = "PayloadType", required, tag = "1")]
    pub r#type: i32,
    #[prost(bytes = "vec", required, tag = "2")]
    pub pvname: Vec<u8>,
    /// Calendar year anchoring the `sec` field of the samples that follow.
    #[prost(uint32, required, tag = "3")]
    pub year: u32,
    /// Waveform length; 1 for scalars.
    #[prost(uint32, required, tag = "4")]
    pub element_count: u32,
    #[prost(message, repeated, tag = "5")]
    pub headers: Vec<FieldValue>,
}

impl PayloadInfo {
    /// The validated payload type tag.
    pub fn payload_type(&self) -> Result<PayloadType, prost::UnknownEnumValue> {
        PayloadType::try_from(self.r#type)
    }
}

macro_rules! scalar_message {
    ($(#[$meta:meta])* $name:ident, $wire:ident, $rust:ty) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct $name {
            #[prost(uint32, required, tag = "1")]
            pub sec: u32,
            #[prost(uint32, required, tag = "2")]
            pub ns: u32,
            #[prost($wire, required, tag = "3")]
            pub val: $rust,
            #[prost(uint32, optional, tag = "4")]
            pub severity: Option<u32>,
            #[prost(uint32, optional, tag = "5")]
            pub status: Option<u32>,
            #[prost(message, repeated, tag = "6")]
            pub fieldvalues: Vec<FieldValue>,
        }
    };
}

macro_rules! vector_message {
    ($(#[$meta:meta])* $name:ident, $wire:ident, $rust:ty) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct $name {
            #[prost(uint32, required, tag = "1")]
            pub sec: u32,
            #[prost(uint32, required, tag = "2")]
            pub ns: u32,
            #[prost($wire, repeated, packed = "false", tag = "3")]
            pub val: Vec<$rust>,
            #[prost(uint32, optional, tag = "4")]
            pub severity: Option<u32>,
            #[prost(uint32, optional, tag = "5")]
            pub status: Option<u32>,
            #[prost(message, repeated, tag = "6")]
            pub fieldvalues: Vec<FieldValue>,
        }
    };
}

scalar_message!(
    /// Scalar sample with an integer value (short, enum, byte and int
    /// payloads; the column type narrows it on materialization).
    ScalarInt32, sint32, i32
);
scalar_message!(ScalarFloat, float, f32);
scalar_message!(ScalarDouble, double, f64);

vector_message!(
    /// Waveform sample with integer elements.
    VectorInt32, sint32, i32
);
vector_message!(VectorFloat, float, f32);
vector_message!(VectorDouble, double, f64);

/// Scalar string sample. Values materialize into fixed 40-byte cells.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScalarString {
    #[prost(uint32, required, tag = "1")]
    pub sec: u32,
    #[prost(uint32, required, tag = "2")]
    pub ns: u32,
    #[prost(bytes = "vec", required, tag = "3")]
    pub val: Vec<u8>,
    #[prost(uint32, optional, tag = "4")]
    pub severity: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub status: Option<u32>,
    #[prost(message, repeated, tag = "6")]
    pub fieldvalues: Vec<FieldValue>,
}

/// Waveform string sample.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VectorString {
    #[prost(uint32, required, tag = "1")]
    pub sec: u32,
    #[prost(uint32, required, tag = "2")]
    pub ns: u32,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub val: Vec<Vec<u8>>,
    #[prost(uint32, optional, tag = "4")]
    pub severity: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub status: Option<u32>,
    #[prost(message, repeated, tag = "6")]
    pub fieldvalues: Vec<FieldValue>,
}

/// PVAccess sample carried as one opaque byte buffer per row. The row
/// encoding is not interpreted further.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GenericBytes {
    #[prost(uint32, required, tag = "1")]
    pub sec: u32,
    #[prost(uint32, required, tag = "2")]
    pub ns: u32,
    #[prost(bytes = "vec", required, tag = "3")]
    pub val: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn header_round_trip() {
        let hdr = PayloadInfo {
            r#type: PayloadType::ScalarDouble as i32,
            pvname: b"LN-AM{RadMon:1}DoseRate-I".to_vec(),
            year: 2014,
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
        };

        let bytes = hdr.encode_to_vec();
        let back = PayloadInfo::decode(bytes.as_slice()).unwrap();
        assert_eq!(back, hdr);
        assert_eq!(back.payload_type().unwrap(), PayloadType::ScalarDouble);
    }

    #[test]
    fn header_requires_all_fields() {
        // a scalar sample is not a valid header: its field 2 is a varint
        // where a header requires length-delimited bytes
        let sample = ScalarDouble {
            sec: 1,
            ns: 2,
            val: 0.5,
            severity: None,
            status: None,
            fieldvalues: vec![],
        };
        assert!(PayloadInfo::decode(sample.encode_to_vec().as_slice()).is_err());

        // and vice versa
        let hdr = PayloadInfo {
            r#type: PayloadType::ScalarDouble as i32,
            pvname: b"x".to_vec(),
            year: 2014,
            element_count: 1,
            headers: vec![],
        };
        assert!(ScalarDouble::decode(hdr.encode_to_vec().as_slice()).is_err());

        assert!(PayloadInfo::decode(&b""[..]).is_err());
    }

    #[test]
    fn sample_round_trip() {
        let s = ScalarDouble {
            sec: 3164204,
            ns: 887015782,
            val: 0.03,
            severity: Some(3904),
            status: Some(0),
            fieldvalues: vec![],
        };
        assert_eq!(
            ScalarDouble::decode(s.encode_to_vec().as_slice()).unwrap(),
            s
        );

        let w = VectorInt32 {
            sec: 12,
            ns: 34,
            val: vec![-1, 0, 32767],
            severity: None,
            status: None,
            fieldvalues: vec![],
        };
        assert_eq!(VectorInt32::decode(w.encode_to_vec().as_slice()).unwrap(), w);
    }

    #[test]
    fn unknown_payload_type_is_rejected() {
        let hdr = PayloadInfo {
            r#type: 99,
            pvname: b"x".to_vec(),
            year: 2014,
            element_count: 1,
            headers: vec![],
        };
        let back = PayloadInfo::decode(hdr.encode_to_vec().as_slice()).unwrap();
        assert!(back.payload_type().is_err());
    }
}
