//! Materialized sample batches: typed value blocks plus time/alarm rows.

use crate::error::{Error, Result};
use crate::wire::PayloadType;

/// Width of one string cell. Longer values are truncated, shorter ones
/// NUL-padded, matching EPICS string channels.
pub const STRING_CELL: usize = 40;

/// Time and alarm data of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaRow {
    /// POSIX seconds.
    pub sec: u32,
    pub ns: u32,
    pub severity: u32,
    pub status: u32,
}

/// Value storage of one batch, `rows x element_count` elements in row-major
/// order. One variant per element type; the variant is picked once per
/// segment header, not per sample.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueBlock {
    Short(Vec<i16>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Byte(Vec<i8>),
    Enum(Vec<i16>),
    /// Fixed-width string cells.
    String(Vec<[u8; STRING_CELL]>),
    /// One opaque buffer per row.
    Bytes(Vec<Vec<u8>>),
}

impl ValueBlock {
    /// Empty block of the element type belonging to `ptype`.
    pub fn new_for(ptype: PayloadType) -> ValueBlock {
        use PayloadType::*;
        match ptype {
            ScalarString | WaveformString => ValueBlock::String(Vec::new()),
            ScalarShort | WaveformShort => ValueBlock::Short(Vec::new()),
            ScalarFloat | WaveformFloat => ValueBlock::Float(Vec::new()),
            ScalarEnum | WaveformEnum => ValueBlock::Enum(Vec::new()),
            ScalarByte | WaveformByte => ValueBlock::Byte(Vec::new()),
            ScalarInt | WaveformInt => ValueBlock::Int(Vec::new()),
            ScalarDouble | WaveformDouble => ValueBlock::Double(Vec::new()),
            V4GenericBytes => ValueBlock::Bytes(Vec::new()),
        }
    }

    /// Number of complete rows held, given the column count.
    pub fn rows(&self, element_count: usize) -> usize {
        match self {
            ValueBlock::Short(v) | ValueBlock::Enum(v) => v.len() / element_count,
            ValueBlock::Int(v) => v.len() / element_count,
            ValueBlock::Float(v) => v.len() / element_count,
            ValueBlock::Double(v) => v.len() / element_count,
            ValueBlock::Byte(v) => v.len() / element_count,
            ValueBlock::String(v) => v.len() / element_count,
            ValueBlock::Bytes(v) => v.len(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ValueBlock::Short(_) => "short",
            ValueBlock::Int(_) => "int",
            ValueBlock::Float(_) => "float",
            ValueBlock::Double(_) => "double",
            ValueBlock::Byte(_) => "byte",
            ValueBlock::Enum(_) => "enum",
            ValueBlock::String(_) => "string",
            ValueBlock::Bytes(_) => "bytes",
        }
    }

    /// Append one row of integer elements, converting to the stored width.
    /// Returns true when the row had to be padded or truncated.
    pub(crate) fn push_i32_row(&mut self, vals: &[i32], n: usize) -> bool {
        match self {
            ValueBlock::Short(dst) | ValueBlock::Enum(dst) => fit(dst, vals, n, |&v| v as i16, 0),
            ValueBlock::Int(dst) => fit(dst, vals, n, |&v| v, 0),
            ValueBlock::Byte(dst) => fit(dst, vals, n, |&v| v as i8, 0),
            _ => unreachable!("integer row pushed into {} block", self.kind_name()),
        }
    }

    pub(crate) fn push_f32_row(&mut self, vals: &[f32], n: usize) -> bool {
        match self {
            ValueBlock::Float(dst) => fit(dst, vals, n, |&v| v, 0.0),
            _ => unreachable!("float row pushed into {} block", self.kind_name()),
        }
    }

    pub(crate) fn push_f64_row(&mut self, vals: &[f64], n: usize) -> bool {
        match self {
            ValueBlock::Double(dst) => fit(dst, vals, n, |&v| v, 0.0),
            _ => unreachable!("double row pushed into {} block", self.kind_name()),
        }
    }

    pub(crate) fn push_str_row(&mut self, vals: &[&[u8]], n: usize) -> bool {
        match self {
            ValueBlock::String(dst) => fit(dst, vals, n, |v| str_cell(v), [0u8; STRING_CELL]),
            _ => unreachable!("string row pushed into {} block", self.kind_name()),
        }
    }

    pub(crate) fn push_bytes_row(&mut self, row: Vec<u8>) {
        match self {
            ValueBlock::Bytes(dst) => dst.push(row),
            _ => unreachable!("bytes row pushed into {} block", self.kind_name()),
        }
    }

    fn extend(&mut self, other: ValueBlock) -> Result<(), (String, String)> {
        match (self, other) {
            (ValueBlock::Short(a), ValueBlock::Short(b)) => a.extend(b),
            (ValueBlock::Int(a), ValueBlock::Int(b)) => a.extend(b),
            (ValueBlock::Float(a), ValueBlock::Float(b)) => a.extend(b),
            (ValueBlock::Double(a), ValueBlock::Double(b)) => a.extend(b),
            (ValueBlock::Byte(a), ValueBlock::Byte(b)) => a.extend(b),
            (ValueBlock::Enum(a), ValueBlock::Enum(b)) => a.extend(b),
            (ValueBlock::String(a), ValueBlock::String(b)) => a.extend(b),
            (ValueBlock::Bytes(a), ValueBlock::Bytes(b)) => a.extend(b),
            (a, b) => return Err((a.kind_name().to_string(), b.kind_name().to_string())),
        }
        Ok(())
    }

    /// Render one row for human consumption: bare value for scalars, a
    /// bracketed list for waveforms.
    pub fn format_row(&self, row: usize, element_count: usize) -> String {
        fn list<T: std::fmt::Display>(vals: &[T]) -> String {
            let parts: Vec<String> = vals.iter().map(|v| v.to_string()).collect();
            format!("[{}]", parts.join(", "))
        }
        fn numeric<T: std::fmt::Display>(vals: &[T], row: usize, n: usize) -> String {
            let cells = &vals[row * n..(row + 1) * n];
            if n == 1 {
                cells[0].to_string()
            } else {
                list(cells)
            }
        }

        match self {
            ValueBlock::Short(v) | ValueBlock::Enum(v) => numeric(v, row, element_count),
            ValueBlock::Int(v) => numeric(v, row, element_count),
            ValueBlock::Float(v) => numeric(v, row, element_count),
            ValueBlock::Double(v) => numeric(v, row, element_count),
            ValueBlock::Byte(v) => numeric(v, row, element_count),
            ValueBlock::String(v) => {
                let cells: Vec<String> = v[row * element_count..(row + 1) * element_count]
                    .iter()
                    .map(|c| {
                        let end = c.iter().position(|&b| b == 0).unwrap_or(STRING_CELL);
                        String::from_utf8_lossy(&c[..end]).into_owned()
                    })
                    .collect();
                if element_count == 1 {
                    cells.into_iter().next().unwrap_or_default()
                } else {
                    format!("[{}]", cells.join(", "))
                }
            }
            ValueBlock::Bytes(v) => format!("{:?}", v[row]),
        }
    }
}

/// Copy `src` into `dst` as one row of `n` elements: truncate when longer,
/// pad with the element default when shorter. Returns true on either.
fn fit<S, T: Clone, F: Fn(&S) -> T>(dst: &mut Vec<T>, src: &[S], n: usize, conv: F, default: T) -> bool {
    dst.extend(src.iter().take(n).map(&conv));
    for _ in src.len()..n {
        dst.push(default.clone());
    }
    src.len() != n
}

fn str_cell(bytes: &[u8]) -> [u8; STRING_CELL] {
    let mut cell = [0u8; STRING_CELL];
    let n = bytes.len().min(STRING_CELL);
    cell[..n].copy_from_slice(&bytes[..n]);
    cell
}

/// One emitted batch: a `rows x element_count` value block and the matching
/// meta rows. `values` and `meta` always agree on the row count.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub values: ValueBlock,
    pub element_count: usize,
    pub meta: Vec<MetaRow>,
}

impl Batch {
    pub(crate) fn empty(ptype: PayloadType, element_count: usize) -> Batch {
        Batch {
            values: ValueBlock::new_for(ptype),
            element_count,
            meta: Vec::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    /// Append another batch of the same shape, as when accumulating a whole
    /// query into one array pair.
    pub fn append(&mut self, other: Batch) -> Result<()> {
        if self.element_count != other.element_count {
            return Err(Error::TypeChange {
                expected: format!("{} columns", self.element_count),
                got: format!("{} columns", other.element_count),
            });
        }
        self.values
            .extend(other.values)
            .map_err(|(expected, got)| Error::TypeChange { expected, got })?;
        self.meta.extend(other.meta);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_and_truncated() {
        let mut block = ValueBlock::new_for(PayloadType::WaveformInt);
        assert!(!block.push_i32_row(&[1, 2, 3], 3));
        assert!(block.push_i32_row(&[4], 3));
        assert!(block.push_i32_row(&[5, 6, 7, 8], 3));
        assert_eq!(
            block,
            ValueBlock::Int(vec![1, 2, 3, 4, 0, 0, 5, 6, 7])
        );
        assert_eq!(block.rows(3), 3);
    }

    #[test]
    fn string_cells_are_fixed_width() {
        let mut block = ValueBlock::new_for(PayloadType::ScalarString);
        let long = vec![b'x'; 64];
        block.push_str_row(&[b"mR/h".as_slice()], 1);
        block.push_str_row(&[long.as_slice()], 1);

        assert_eq!(block.format_row(0, 1), "mR/h");
        assert_eq!(block.format_row(1, 1), "x".repeat(STRING_CELL));
    }

    #[test]
    fn format_scalar_and_waveform() {
        let mut block = ValueBlock::new_for(PayloadType::ScalarDouble);
        block.push_f64_row(&[0.03], 1);
        assert_eq!(block.format_row(0, 1), "0.03");

        let mut wf = ValueBlock::new_for(PayloadType::WaveformShort);
        wf.push_i32_row(&[-1, 2], 2);
        assert_eq!(wf.format_row(0, 2), "[-1, 2]");
    }

    #[test]
    fn append_rejects_shape_changes() {
        let mut a = Batch::empty(PayloadType::ScalarDouble, 1);
        let b = Batch::empty(PayloadType::ScalarInt, 1);
        assert!(matches!(a.append(b), Err(Error::TypeChange { .. })));

        let c = Batch::empty(PayloadType::ScalarDouble, 2);
        assert!(matches!(a.append(c), Err(Error::TypeChange { .. })));
    }
}
