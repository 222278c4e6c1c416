//! Typed property values shared by property contexts and table contexts.

use byteorder::{LittleEndian, ReadBytesExt};
use core::mem;
use std::{
    fmt::{self, Debug, Display},
    io::{self, Read},
};

use super::{heap::*, prop_type::*, *};
use crate::{
    codepage::{Codepage, CodepageResult},
    ndb::{
        database::{Node, NodeDatabase},
        node_id::{NodeId, NodeIdType},
    },
};

/// `PtypGuid` with Data1, Data2, and Data3 fields in little-endian format.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GuidValue {
    data1: u32,
    data2: u16,
    data3: u16,
    data4: [u8; 8],
}

impl GuidValue {
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    pub fn read(f: &mut dyn Read) -> io::Result<Self> {
        let data1 = f.read_u32::<LittleEndian>()?;
        let data2 = f.read_u16::<LittleEndian>()?;
        let data3 = f.read_u16::<LittleEndian>()?;
        let mut data4 = [0; 8];
        f.read_exact(&mut data4)?;
        Ok(Self::new(data1, data2, data3, data4))
    }

    pub fn data1(&self) -> u32 {
        self.data1
    }

    pub fn data2(&self) -> u16 {
        self.data2
    }

    pub fn data3(&self) -> u16 {
        self.data3
    }

    pub fn data4(&self) -> &[u8; 8] {
        &self.data4
    }

    /// On-disk byte order.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut bytes = [0; 16];
        bytes[..4].copy_from_slice(&self.data1.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.data2.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.data3.to_le_bytes());
        bytes[8..].copy_from_slice(&self.data4);
        bytes
    }
}

impl Display for GuidValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-",
            self.data1, self.data2, self.data3, self.data4[0], self.data4[1]
        )?;
        self.data4[2..]
            .iter()
            .try_for_each(|byte| write!(f, "{byte:02X}"))
    }
}

impl Debug for GuidValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuidValue {{ {self} }}")
    }
}

/// `PtypObject`: a sub-node holding the object's data.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectValue {
    node: NodeId,
    size: u32,
}

impl ObjectValue {
    pub fn new(node: NodeId, size: u32) -> Self {
        Self { node, size }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

impl Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectValue {{ {:?}, size: 0x{:X} }}", self.node, self.size)
    }
}

/// Raw `PtypString8` bytes. The text depends on the codepage active when it is decoded.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct String8Value(Vec<u8>);

impl String8Value {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Trailing NUL bytes are not part of the text.
    pub fn decode(&self, codepage: Codepage) -> CodepageResult<String> {
        let end = self
            .0
            .iter()
            .rposition(|byte| *byte != 0)
            .map_or(0, |last| last + 1);
        codepage.decode(&self.0[..end])
    }
}

impl Debug for String8Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "String8Value({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// A decoded property, discriminated by its stored [PropertyType].
#[derive(Clone, Default, Debug, PartialEq)]
pub enum PropertyValue {
    /// `PtypNull`
    #[default]
    Null,
    /// `PtypInteger16`
    Integer16(i16),
    /// `PtypInteger32`
    Integer32(i32),
    /// `PtypFloating32`
    Floating32(f32),
    /// `PtypFloating64`
    Floating64(f64),
    /// `PtypCurrency`: scaled by 10,000
    Currency(i64),
    /// `PtypFloatingTime`: days since December 30, 1899
    FloatingTime(f64),
    /// `PtypErrorCode`
    ErrorCode(i32),
    /// `PtypBoolean`
    Boolean(bool),
    /// `PtypInteger64`
    Integer64(i64),
    /// `PtypString8`
    String8(String8Value),
    /// `PtypString`
    Unicode(String),
    /// `PtypTime`: 100-nanosecond intervals since January 1, 1601
    Time(i64),
    /// `PtypGuid`
    Guid(GuidValue),
    /// `PtypBinary`
    Binary(Vec<u8>),
    /// `PtypObject`
    Object(ObjectValue),

    MultipleInteger16(Vec<i16>),
    MultipleInteger32(Vec<i32>),
    MultipleFloating32(Vec<f32>),
    MultipleFloating64(Vec<f64>),
    MultipleCurrency(Vec<i64>),
    MultipleFloatingTime(Vec<f64>),
    MultipleInteger64(Vec<i64>),
    MultipleString8(Vec<String8Value>),
    MultipleUnicode(Vec<String>),
    MultipleTime(Vec<i64>),
    MultipleGuid(Vec<GuidValue>),
    MultipleBinary(Vec<Vec<u8>>),
}

impl From<&PropertyValue> for PropertyType {
    fn from(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::Null => PropertyType::Null,
            PropertyValue::Integer16(_) => PropertyType::Integer16,
            PropertyValue::Integer32(_) => PropertyType::Integer32,
            PropertyValue::Floating32(_) => PropertyType::Floating32,
            PropertyValue::Floating64(_) => PropertyType::Floating64,
            PropertyValue::Currency(_) => PropertyType::Currency,
            PropertyValue::FloatingTime(_) => PropertyType::FloatingTime,
            PropertyValue::ErrorCode(_) => PropertyType::ErrorCode,
            PropertyValue::Boolean(_) => PropertyType::Boolean,
            PropertyValue::Integer64(_) => PropertyType::Integer64,
            PropertyValue::String8(_) => PropertyType::String8,
            PropertyValue::Unicode(_) => PropertyType::Unicode,
            PropertyValue::Time(_) => PropertyType::Time,
            PropertyValue::Guid(_) => PropertyType::Guid,
            PropertyValue::Binary(_) => PropertyType::Binary,
            PropertyValue::Object(_) => PropertyType::Object,
            PropertyValue::MultipleInteger16(_) => PropertyType::MultipleInteger16,
            PropertyValue::MultipleInteger32(_) => PropertyType::MultipleInteger32,
            PropertyValue::MultipleFloating32(_) => PropertyType::MultipleFloating32,
            PropertyValue::MultipleFloating64(_) => PropertyType::MultipleFloating64,
            PropertyValue::MultipleCurrency(_) => PropertyType::MultipleCurrency,
            PropertyValue::MultipleFloatingTime(_) => PropertyType::MultipleFloatingTime,
            PropertyValue::MultipleInteger64(_) => PropertyType::MultipleInteger64,
            PropertyValue::MultipleString8(_) => PropertyType::MultipleString8,
            PropertyValue::MultipleUnicode(_) => PropertyType::MultipleUnicode,
            PropertyValue::MultipleTime(_) => PropertyType::MultipleTime,
            PropertyValue::MultipleGuid(_) => PropertyType::MultipleGuid,
            PropertyValue::MultipleBinary(_) => PropertyType::MultipleBinary,
        }
    }
}

impl PropertyValue {
    /// Decode the complete stored bytes of one value.
    pub fn read(data: &[u8], prop_type: PropertyType) -> LtpResult<Self> {
        if let Some(size) = prop_type.fixed_size() {
            if data.len() != size {
                return Err(LtpError::InvalidPropertyValueSize {
                    prop_type,
                    size: data.len(),
                });
            }
        }

        let invalid_size = |_| LtpError::InvalidPropertyValueSize {
            prop_type,
            size: data.len(),
        };

        let value = match prop_type {
            PropertyType::Boolean => match data[0] {
                0 => Self::Boolean(false),
                1 => Self::Boolean(true),
                invalid => return Err(LtpError::InvalidBooleanValue(invalid)),
            },
            PropertyType::Null
            | PropertyType::Integer16
            | PropertyType::Integer32
            | PropertyType::Floating32
            | PropertyType::Floating64
            | PropertyType::Currency
            | PropertyType::FloatingTime
            | PropertyType::ErrorCode
            | PropertyType::Integer64
            | PropertyType::Time
            | PropertyType::Guid
            | PropertyType::Object => {
                let mut cursor = data;
                Self::read_scalar(&mut cursor, prop_type).map_err(invalid_size)?
            }

            PropertyType::String8 => Self::String8(String8Value::new(data.to_vec())),
            PropertyType::Unicode => Self::Unicode(read_unicode(data)?),
            PropertyType::Binary => Self::Binary(data.to_vec()),

            PropertyType::MultipleInteger16 => Self::MultipleInteger16(read_fixed(
                data,
                prop_type,
                2,
                |mut f| f.read_i16::<LittleEndian>(),
            )?),
            PropertyType::MultipleInteger32 => Self::MultipleInteger32(read_fixed(
                data,
                prop_type,
                4,
                |mut f| f.read_i32::<LittleEndian>(),
            )?),
            PropertyType::MultipleFloating32 => Self::MultipleFloating32(read_fixed(
                data,
                prop_type,
                4,
                |mut f| f.read_f32::<LittleEndian>(),
            )?),
            PropertyType::MultipleFloating64 => Self::MultipleFloating64(read_fixed(
                data,
                prop_type,
                8,
                |mut f| f.read_f64::<LittleEndian>(),
            )?),
            PropertyType::MultipleCurrency => Self::MultipleCurrency(read_fixed(
                data,
                prop_type,
                8,
                |mut f| f.read_i64::<LittleEndian>(),
            )?),
            PropertyType::MultipleFloatingTime => Self::MultipleFloatingTime(read_fixed(
                data,
                prop_type,
                8,
                |mut f| f.read_f64::<LittleEndian>(),
            )?),
            PropertyType::MultipleInteger64 => Self::MultipleInteger64(read_fixed(
                data,
                prop_type,
                8,
                |mut f| f.read_i64::<LittleEndian>(),
            )?),
            PropertyType::MultipleTime => Self::MultipleTime(read_fixed(
                data,
                prop_type,
                8,
                |mut f| f.read_i64::<LittleEndian>(),
            )?),
            PropertyType::MultipleGuid => Self::MultipleGuid(read_fixed(
                data,
                prop_type,
                16,
                |mut f| GuidValue::read(&mut f),
            )?),

            PropertyType::MultipleString8 => Self::MultipleString8(
                read_variable(data)?
                    .into_iter()
                    .map(|item| String8Value::new(item.to_vec()))
                    .collect(),
            ),
            PropertyType::MultipleUnicode => Self::MultipleUnicode(
                read_variable(data)?
                    .into_iter()
                    .map(read_unicode)
                    .collect::<LtpResult<_>>()?,
            ),
            PropertyType::MultipleBinary => Self::MultipleBinary(
                read_variable(data)?
                    .into_iter()
                    .map(<[u8]>::to_vec)
                    .collect(),
            ),
        };

        Ok(value)
    }

    fn read_scalar(f: &mut dyn Read, prop_type: PropertyType) -> io::Result<Self> {
        let value = match prop_type {
            PropertyType::Integer16 => Self::Integer16(f.read_i16::<LittleEndian>()?),
            PropertyType::Integer32 => Self::Integer32(f.read_i32::<LittleEndian>()?),
            PropertyType::Floating32 => Self::Floating32(f.read_f32::<LittleEndian>()?),
            PropertyType::Floating64 => Self::Floating64(f.read_f64::<LittleEndian>()?),
            PropertyType::Currency => Self::Currency(f.read_i64::<LittleEndian>()?),
            PropertyType::FloatingTime => Self::FloatingTime(f.read_f64::<LittleEndian>()?),
            PropertyType::ErrorCode => Self::ErrorCode(f.read_i32::<LittleEndian>()?),
            PropertyType::Integer64 => Self::Integer64(f.read_i64::<LittleEndian>()?),
            PropertyType::Time => Self::Time(f.read_i64::<LittleEndian>()?),
            PropertyType::Guid => Self::Guid(GuidValue::read(f)?),
            PropertyType::Object => {
                let node = NodeId::from(f.read_u32::<LittleEndian>()?);
                let size = f.read_u32::<LittleEndian>()?;
                Self::Object(ObjectValue { node, size })
            }
            _ => Self::Null,
        };
        Ok(value)
    }

    pub fn prop_type(&self) -> PropertyType {
        PropertyType::from(self)
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Integer16(value) => Some(i32::from(*value)),
            Self::Integer32(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(value) => Some(value),
            _ => None,
        }
    }

    /// Text of a `PtypString` or `PtypString8` value, decoding the latter with `codepage`.
    pub fn to_text(&self, codepage: Codepage) -> LtpResult<Option<String>> {
        match self {
            Self::Unicode(value) => Ok(Some(value.clone())),
            Self::String8(value) => Ok(Some(value.decode(codepage)?)),
            _ => Ok(None),
        }
    }
}

fn read_unicode(data: &[u8]) -> LtpResult<String> {
    if data.len() % 2 != 0 {
        return Err(LtpError::InvalidPropertyValueSize {
            prop_type: PropertyType::Unicode,
            size: data.len(),
        });
    }
    let mut units = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect::<Vec<_>>();
    while units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16(&units).map_err(|_| LtpError::InvalidUnicodeString)
}

fn read_fixed<T>(
    data: &[u8],
    prop_type: PropertyType,
    size: usize,
    read: impl Fn(&[u8]) -> io::Result<T>,
) -> LtpResult<Vec<T>> {
    if data.len() % size != 0 {
        return Err(LtpError::InvalidPropertyValueSize {
            prop_type,
            size: data.len(),
        });
    }
    data.chunks_exact(size)
        .map(|chunk| {
            read(chunk).map_err(|_| LtpError::InvalidPropertyValueSize {
                prop_type,
                size: data.len(),
            })
        })
        .collect()
}

/// Multi-valued variable-size properties:
/// `ulCount`, then `rgulDataOffsets` relative to the start of the value, then the items.
fn read_variable(data: &[u8]) -> LtpResult<Vec<&[u8]>> {
    if data.is_empty() {
        return Ok(Default::default());
    }

    let mut cursor = data;
    // ulCount
    let count = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| LtpError::InvalidMultiValuePropertyCount(data.len()))? as usize;
    let header_size = count
        .checked_add(1)
        .and_then(|entries| entries.checked_mul(mem::size_of::<u32>()))
        .filter(|size| *size <= data.len())
        .ok_or(LtpError::InvalidMultiValuePropertyCount(count))?;

    // rgulDataOffsets
    let mut offsets = Vec::with_capacity(count + 1);
    for _ in 0..count {
        let offset = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| LtpError::InvalidMultiValuePropertyCount(count))? as usize;
        offsets.push(offset);
    }
    offsets.push(data.len());

    // rgDataItems
    let mut values = Vec::with_capacity(count);
    for window in offsets.windows(2) {
        let (start, end) = (window[0], window[1]);
        if start < header_size || start > end || end > data.len() {
            return Err(LtpError::InvalidMultiValuePropertyOffset(start));
        }
        values.push(&data[start..end]);
    }
    Ok(values)
}

/// Where a value lives: inline, in the heap, or in a sub-node.
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum PropertyValueRecord {
    Small(u32),
    Heap(HeapId),
    Node(NodeId),
}

impl PropertyValueRecord {
    /// `HNID`:
    /// an HID when the NID type bits are zero, a sub-node NID otherwise.
    pub fn from_hnid(value: u32) -> Self {
        match NodeId::from(value).id_type() {
            Ok(NodeIdType::HeapNode) => Self::Heap(HeapId::from(value)),
            _ => Self::Node(NodeId::from(value)),
        }
    }

    /// Fetch and decode the value from `heap` or from a sub-node of `node`.
    pub fn read_value(
        &self,
        prop_type: PropertyType,
        heap: &HeapNode,
        node: &Node,
        database: &NodeDatabase,
    ) -> io::Result<PropertyValue> {
        let value = match self {
            Self::Small(value) => {
                let size = prop_type.fixed_size().unwrap_or(mem::size_of::<u32>());
                let bytes = value.to_le_bytes();
                PropertyValue::read(&bytes[..size.min(bytes.len())], prop_type)?
            }
            Self::Heap(heap_id) if heap_id.is_empty() => PropertyValue::read(&[], prop_type)?,
            Self::Heap(heap_id) => PropertyValue::read(heap.find_entry(*heap_id)?, prop_type)?,
            Self::Node(sub_node) => {
                let data = node.read_sub_node(database, *sub_node)?.data();
                PropertyValue::read(&data, prop_type)?
            }
        };
        Ok(value)
    }
}

impl Debug for PropertyValueRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValueRecord::Small(value) => write!(f, "Small(0x{value:08X})"),
            PropertyValueRecord::Heap(heap_id) => write!(f, "{heap_id:?}"),
            PropertyValueRecord::Node(node_id) => write!(f, "{node_id:?}"),
        }
    }
}

impl From<PropertyValueRecord> for u32 {
    fn from(value: PropertyValueRecord) -> Self {
        match value {
            PropertyValueRecord::Small(value) => value,
            PropertyValueRecord::Heap(heap_id) => u32::from(heap_id),
            PropertyValueRecord::Node(node_id) => u32::from(node_id),
        }
    }
}
