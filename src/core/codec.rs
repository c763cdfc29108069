//! Fixed-width, big-endian binary encoding shared by blocks and transactions.

use crate::crypto::Hash256;
use crate::{LedgerError, Result};

#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_hash(&mut self, hash: &Hash256) {
        self.buf.extend_from_slice(hash.as_bytes());
    }

    pub fn put_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len)
            .map_err(|_| LedgerError::Serialization(format!("length {} exceeds u32", len)))?;
        self.put_u32(len);
        Ok(())
    }

    /// Length-prefixed byte string.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_len(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| LedgerError::Serialization(format!(
                "unexpected end of input: need {} bytes at offset {}, have {}",
                n, self.pos, self.data.len() - self.pos
            )))?;

        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(bytes))
    }

    pub fn get_hash(&mut self) -> Result<Hash256> {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(self.take(32)?);
        Ok(Hash256::new(bytes))
    }

    pub fn get_len(&mut self) -> Result<usize> {
        Ok(self.get_u32()? as usize)
    }

    pub fn get_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.get_len()?;
        Ok(self.take(len)?.to_vec())
    }

    pub fn finish(self) -> Result<()> {
        if self.pos != self.data.len() {
            return Err(LedgerError::Serialization(format!(
                "{} trailing bytes after decoding",
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_big_endian() {
        let mut enc = Encoder::new();
        enc.put_u32(1);
        enc.put_u64(0x0102);

        assert_eq!(enc.into_bytes(), vec![0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_truncated_input_errors() -> Result<()> {
        let mut enc = Encoder::new();
        enc.put_bytes(b"abcdef")?;
        let mut bytes = enc.into_bytes();
        bytes.truncate(7);

        let mut dec = Decoder::new(&bytes);
        assert!(matches!(dec.get_bytes(), Err(LedgerError::Serialization(_))));

        Ok(())
    }

    #[test]
    fn test_trailing_bytes_rejected() -> Result<()> {
        let data = [0u8, 0, 0, 7, 9];
        let mut dec = Decoder::new(&data);
        assert_eq!(dec.get_u32()?, 7);
        assert!(dec.finish().is_err());

        Ok(())
    }
}
