use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::NodeId;
use crate::socket::{Socket, SocketRole};
use crate::value::TypeMask;

#[derive(Debug, Error, PartialEq)]
pub enum SerializeError {
    #[error("unexpected end of input at byte {0}")]
    Truncated(usize),
    #[error("string at byte {0} is not valid utf-8")]
    InvalidUtf8(usize),
    #[error("invalid bool byte {value} at {offset}")]
    InvalidBool { offset: usize, value: u8 },
    #[error("missing attribute {0:?}")]
    MissingAttribute(&'static str),
    #[error("attribute {name:?} has invalid value {value:?}")]
    InvalidAttribute { name: &'static str, value: String },
}

pub trait BinaryWriter {
    fn write_uint(&mut self, value: u32);
    fn write_u64(&mut self, value: u64);
    fn write_bool(&mut self, value: bool);
    fn write_string(&mut self, value: &str);
}

pub trait BinaryReader {
    fn read_uint(&mut self) -> Result<u32, SerializeError>;
    fn read_u64(&mut self) -> Result<u64, SerializeError>;
    fn read_bool(&mut self) -> Result<bool, SerializeError>;
    fn read_string(&mut self) -> Result<String, SerializeError>;
}

/// Little-endian, strings prefixed with a u32 byte length.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl BinaryWriter for ByteWriter {
    fn write_uint(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn write_u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn write_bool(&mut self, value: bool) {
        self.bytes.push(u8::from(value));
    }

    fn write_string(&mut self, value: &str) {
        self.write_uint(value.len() as u32);
        self.bytes.extend_from_slice(value.as_bytes());
    }
}

#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], SerializeError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(SerializeError::Truncated(self.offset))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], SerializeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

impl BinaryReader for ByteReader<'_> {
    fn read_uint(&mut self) -> Result<u32, SerializeError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    fn read_u64(&mut self) -> Result<u64, SerializeError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    fn read_bool(&mut self) -> Result<bool, SerializeError> {
        let offset = self.offset;
        match self.take_array::<1>()?[0] {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(SerializeError::InvalidBool { offset, value }),
        }
    }

    fn read_string(&mut self) -> Result<String, SerializeError> {
        let len = self.read_uint()? as usize;
        let offset = self.offset;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| SerializeError::InvalidUtf8(offset))
    }
}

/// Persisted identity and role of a socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketRecord {
    pub id: u32,
    pub name: String,
    pub type_mask: TypeMask,
    pub role: SocketRole,
}

impl SocketRecord {
    pub fn from_socket(socket: &Socket) -> Self {
        Self {
            id: socket.local_id,
            name: socket.name.clone(),
            type_mask: socket.type_mask,
            role: socket.role,
        }
    }

    /// Overwrites the socket's persisted fields. Values and edges are untouched.
    pub fn apply_to(&self, socket: &mut Socket) {
        socket.local_id = self.id;
        socket.name = self.name.clone();
        socket.type_mask = self.type_mask;
        socket.role = self.role;
    }

    /// The node id is kept on the wire for compatibility only.
    pub fn write(&self, owner: NodeId, writer: &mut dyn BinaryWriter) {
        writer.write_uint(self.id);
        writer.write_string(&self.name);
        writer.write_u64(owner.0);
        writer.write_uint(self.type_mask.bits());
        writer.write_bool(self.role.input);
        writer.write_bool(self.role.output);
        writer.write_bool(self.role.control);
        writer.write_bool(self.role.variable);
        writer.write_bool(self.role.secret);
    }

    pub fn read(reader: &mut dyn BinaryReader) -> Result<Self, SerializeError> {
        let id = reader.read_uint()?;
        let name = reader.read_string()?;
        let _owner = reader.read_u64()?;
        let type_mask = TypeMask(reader.read_uint()?);
        let role = SocketRole {
            input: reader.read_bool()?,
            output: reader.read_bool()?,
            control: reader.read_bool()?,
            variable: reader.read_bool()?,
            secret: reader.read_bool()?,
        };
        Ok(Self {
            id,
            name,
            type_mask,
            role,
        })
    }

    pub fn to_attributes(&self) -> BTreeMap<String, String> {
        let flag = |v: bool| if v { "1" } else { "0" }.to_string();
        BTreeMap::from([
            ("id".to_string(), self.id.to_string()),
            ("name".to_string(), self.name.clone()),
            ("typeid".to_string(), self.type_mask.bits().to_string()),
            ("input".to_string(), flag(self.role.input)),
            ("output".to_string(), flag(self.role.output)),
            ("control".to_string(), flag(self.role.control)),
            ("secret".to_string(), flag(self.role.secret)),
            ("variable".to_string(), flag(self.role.variable)),
        ])
    }

    pub fn from_attributes(attributes: &BTreeMap<String, String>) -> Result<Self, SerializeError> {
        let get = |name: &'static str| {
            attributes
                .get(name)
                .ok_or(SerializeError::MissingAttribute(name))
        };
        let uint = |name: &'static str| -> Result<u32, SerializeError> {
            let raw = get(name)?;
            raw.parse().map_err(|_| SerializeError::InvalidAttribute {
                name,
                value: raw.clone(),
            })
        };
        let flag = |name: &'static str| -> Result<bool, SerializeError> {
            match get(name)?.as_str() {
                "1" | "true" => Ok(true),
                "0" | "false" => Ok(false),
                other => Err(SerializeError::InvalidAttribute {
                    name,
                    value: other.to_string(),
                }),
            }
        };

        Ok(Self {
            id: uint("id")?,
            name: get("name")?.clone(),
            type_mask: TypeMask(uint("typeid")?),
            role: SocketRole {
                input: flag("input")?,
                output: flag("output")?,
                control: flag("control")?,
                variable: flag("variable")?,
                secret: flag("secret")?,
            },
        })
    }
}
