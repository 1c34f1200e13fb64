// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Binary serialization used by the chain for transactions and action data.
//!
//! Integers are little-endian, collection and byte-string lengths are
//! prefixed with a LEB128 `varuint32`.

use crate::error::{TypesError, TypesResult};

pub trait Pack {
    fn pack(&self, enc: &mut Encoder);

    fn pack_to_vec(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.pack(&mut enc);
        enc.into_bytes()
    }
}

pub trait Unpack: Sized {
    fn unpack(dec: &mut Decoder<'_>) -> TypesResult<Self>;

    /// Decodes a value that must consume the whole input.
    fn unpack_exact(data: &[u8]) -> TypesResult<Self> {
        let mut dec = Decoder::new(data);
        let value = Self::unpack(&mut dec)?;
        if dec.remaining() != 0 {
            return Err(TypesError::TrailingBytes(dec.remaining()));
        }
        Ok(value)
    }
}

#[derive(Debug, Default, Clone)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_varuint32(&mut self, mut v: u32) {
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            self.buf.push(byte);
            if v == 0 {
                break;
            }
        }
    }

    pub fn write_raw(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Length-prefixed byte string.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.write_varuint32(data.len() as u32);
        self.write_raw(data);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }
}

#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_raw(&mut self, len: usize) -> TypesResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(TypesError::UnexpectedEof);
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> TypesResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_raw(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> TypesResult<u8> {
        Ok(self.read_raw(1)?[0])
    }

    pub fn read_u16(&mut self) -> TypesResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> TypesResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> TypesResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> TypesResult<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_varuint32(&mut self) -> TypesResult<u32> {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 35 {
                return Err(TypesError::VarIntOverflow);
            }
        }
        u32::try_from(result).map_err(|_| TypesError::VarIntOverflow)
    }

    pub fn read_bytes(&mut self) -> TypesResult<Vec<u8>> {
        let len = self.read_varuint32()? as usize;
        Ok(self.read_raw(len)?.to_vec())
    }

    pub fn read_string(&mut self) -> TypesResult<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| TypesError::InvalidString(e.to_string()))
    }
}

macro_rules! impl_pack_int {
    ($ty:ty, $write:ident, $read:ident) => {
        impl Pack for $ty {
            fn pack(&self, enc: &mut Encoder) {
                enc.$write(*self);
            }
        }

        impl Unpack for $ty {
            fn unpack(dec: &mut Decoder<'_>) -> TypesResult<Self> {
                dec.$read()
            }
        }
    };
}

impl_pack_int!(u8, write_u8, read_u8);
impl_pack_int!(u16, write_u16, read_u16);
impl_pack_int!(u32, write_u32, read_u32);
impl_pack_int!(u64, write_u64, read_u64);
impl_pack_int!(i64, write_i64, read_i64);

impl Pack for String {
    fn pack(&self, enc: &mut Encoder) {
        enc.write_str(self);
    }
}

impl Pack for str {
    fn pack(&self, enc: &mut Encoder) {
        enc.write_str(self);
    }
}

impl Unpack for String {
    fn unpack(dec: &mut Decoder<'_>) -> TypesResult<Self> {
        dec.read_string()
    }
}

impl<T: Pack> Pack for Vec<T> {
    fn pack(&self, enc: &mut Encoder) {
        enc.write_varuint32(self.len() as u32);
        for item in self {
            item.pack(enc);
        }
    }
}

impl<T: Unpack> Unpack for Vec<T> {
    fn unpack(dec: &mut Decoder<'_>) -> TypesResult<Self> {
        let len = dec.read_varuint32()? as usize;
        // every element takes at least one byte
        if len > dec.remaining() {
            return Err(TypesError::UnexpectedEof);
        }
        (0..len).map(|_| T::unpack(dec)).collect()
    }
}

impl<T: Pack + ?Sized> Pack for &T {
    fn pack(&self, enc: &mut Encoder) {
        (**self).pack(enc);
    }
}
