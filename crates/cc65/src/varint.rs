use super::*;

/// A `u32` never needs more than five base-128 groups.
pub const MAX_VARINT_BYTES: usize = 5;

/// Decodes one varint from the front of `bytes`, returning the value and the
/// number of bytes consumed.
pub fn decode_varint(bytes: &[u8]) -> Result<(u32, usize), ContainerError> {
    let mut rd = Reader::new(bytes, 0);
    let value = rd.read_var()?;
    Ok((value, rd.pos))
}

pub fn encode_varint(value: u32, out: &mut Vec<u8>) {
    let mut value = value;
    loop {
        let low = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(low);
            return;
        }
        out.push(low | 0x80);
    }
}

pub(crate) fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

pub(crate) fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_var(out: &mut Vec<u8>, value: u32) {
    encode_varint(value, out);
}

pub(crate) fn write_bytes(out: &mut Vec<u8>, value: &[u8]) -> Result<(), ContainerError> {
    let len = u32::try_from(value.len()).map_err(|_| ContainerError::TooLarge {
        what: "length-prefixed value",
    })?;
    write_var(out, len);
    out.extend_from_slice(value);
    Ok(())
}

/// Little-endian cursor over one container region. `origin` is the absolute
/// offset of `bytes[0]`, used only for error reporting.
#[derive(Debug, Clone)]
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    origin: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8], origin: usize) -> Self {
        Self {
            bytes,
            pos: 0,
            origin,
        }
    }

    pub(crate) fn offset(&self) -> usize {
        self.origin + self.pos
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, ContainerError> {
        let bytes = self.read_exact(1)?;
        Ok(bytes[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, ContainerError> {
        let bytes = self.read_exact(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, ContainerError> {
        let bytes = self.read_exact(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, ContainerError> {
        let bytes = self.read_exact(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_var(&mut self) -> Result<u32, ContainerError> {
        let start = self.offset();
        let mut value = 0u64;
        for group in 0..MAX_VARINT_BYTES {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7F) << (7 * group);
            if byte & 0x80 == 0 {
                return u32::try_from(value)
                    .map_err(|_| ContainerError::MalformedVarint { offset: start });
            }
        }
        Err(ContainerError::MalformedVarint { offset: start })
    }

    pub(crate) fn read_bytes(&mut self) -> Result<Vec<u8>, ContainerError> {
        let len = self.read_var()? as usize;
        Ok(self.read_exact(len)?.to_vec())
    }

    pub(crate) fn read_string(&mut self) -> Result<String, ContainerError> {
        let bytes = self.read_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// `{varint count}{varint index...}`
    pub(crate) fn read_index_list(&mut self) -> Result<Vec<u32>, ContainerError> {
        let count = self.read_var()? as usize;
        let mut out = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            out.push(self.read_var()?);
        }
        Ok(out)
    }

    pub(crate) fn read_exact(&mut self, len: usize) -> Result<&'a [u8], ContainerError> {
        let end = self.pos.saturating_add(len);
        if end > self.bytes.len() {
            return Err(ContainerError::UnexpectedEof {
                offset: self.offset(),
                needed: end - self.bytes.len(),
            });
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

pub(crate) fn write_index_list(out: &mut Vec<u8>, indices: &[u32]) -> Result<(), ContainerError> {
    let count = u32::try_from(indices.len()).map_err(|_| ContainerError::TooLarge {
        what: "index list",
    })?;
    write_var(out, count);
    for index in indices {
        write_var(out, *index);
    }
    Ok(())
}
