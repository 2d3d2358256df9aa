//! Little-endian primitive readers and writers for property blobs.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;
use crate::id::StableId;

/// Append-only blob builder.
#[derive(Debug, Default)]
pub struct BlobWriter {
    buf: BytesMut,
}

impl BlobWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32_le(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32_le(v);
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.put_i64_le(v);
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.put_u64_le(v);
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.put_f32_le(v);
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.put_f64_le(v);
    }

    pub fn put_id(&mut self, id: StableId) {
        self.buf.put_u128_le(id.as_u128());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// A `u32` length prefix followed by the UTF-8 bytes.
    pub fn put_str(&mut self, s: &str) -> Result<(), CodecError> {
        let len = u32::try_from(s.len()).map_err(|_| CodecError::TooLarge(s.to_string()))?;
        self.put_u32(len);
        self.buf.put_slice(s.as_bytes());
        Ok(())
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over a borrowed blob. Every read is bounds-checked.
#[derive(Debug)]
pub struct BlobReader<'a> {
    buf: &'a [u8],
}

impl<'a> BlobReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn need(&self, needed: usize) -> Result<(), CodecError> {
        if self.buf.remaining() < needed {
            return Err(CodecError::UnexpectedEof {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8, CodecError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn get_u32(&mut self) -> Result<u32, CodecError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn get_i32(&mut self) -> Result<i32, CodecError> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn get_i64(&mut self) -> Result<i64, CodecError> {
        self.need(8)?;
        Ok(self.buf.get_i64_le())
    }

    pub fn get_u64(&mut self) -> Result<u64, CodecError> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    pub fn get_f32(&mut self) -> Result<f32, CodecError> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn get_f64(&mut self) -> Result<f64, CodecError> {
        self.need(8)?;
        Ok(self.buf.get_f64_le())
    }

    pub fn get_id(&mut self) -> Result<StableId, CodecError> {
        self.need(16)?;
        Ok(StableId::from_u128(self.buf.get_u128_le()))
    }

    pub fn get_str(&mut self) -> Result<String, CodecError> {
        let len = self.get_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Splits off the next `len` bytes as a sub-blob.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }
}
