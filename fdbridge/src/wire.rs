// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Value layer and record framing for the wire protocol.
//!
//! Integers travel big-endian, byte strings carry a 4-byte length prefix and
//! are padded with zeros to a 4-byte boundary, unions lead with a 4-byte tag.
//! Records are framed the ONC way: a 4-byte mark whose high bit says "last
//! fragment" and whose low 31 bits hold the record length. Writers always
//! emit single-fragment records and readers refuse anything else.

use crate::error::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const LAST_FRAGMENT: u32 = 1 << 31;

/// Frame `body` as one record and flush it.
pub fn write_record<W: Write>(stream: &mut W, body: &[u8]) -> Result<(), Error> {
    if body.len() >= LAST_FRAGMENT as usize {
        return Err(Error::RecordTooLarge(body.len()));
    }

    stream.write_u32::<BigEndian>(body.len() as u32 | LAST_FRAGMENT)?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

/// Read one complete record of at most `max` bytes.
pub fn read_record<R: Read>(stream: &mut R, max: usize) -> Result<Vec<u8>, Error> {
    let mark = stream.read_u32::<BigEndian>()?;

    if mark & LAST_FRAGMENT == 0 {
        return Err(Error::Fragmented);
    }

    let len = (mark & !LAST_FRAGMENT) as usize;
    if len > max {
        return Err(Error::RecordTooLarge(len));
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body)?;
    Ok(body)
}

fn pad_len(len: usize) -> usize {
    (4 - len % 4) % 4
}

pub fn write_opaque<W: Write>(stream: &mut W, bytes: &[u8]) -> Result<(), Error> {
    stream.write_u32::<BigEndian>(bytes.len() as u32)?;
    stream.write_all(bytes)?;

    let padding = [0u8; 3];
    stream.write_all(&padding[..pad_len(bytes.len())])?;
    Ok(())
}

/// Read a length-prefixed byte string, rejecting anything above `bound`.
pub fn read_opaque<R: Read>(stream: &mut R, bound: usize) -> Result<Vec<u8>, Error> {
    let len = stream.read_u32::<BigEndian>()? as usize;
    if len > bound {
        return Err(Error::FieldTooLarge { len, bound });
    }

    let mut bytes = vec![0u8; len];
    stream.read_exact(&mut bytes)?;

    let mut padding = [0u8; 3];
    stream.read_exact(&mut padding[..pad_len(len)])?;
    Ok(bytes)
}

pub fn write_u32<W: Write>(stream: &mut W, v: u32) -> Result<(), Error> {
    stream.write_u32::<BigEndian>(v)?;
    Ok(())
}

pub fn read_u32<R: Read>(stream: &mut R) -> Result<u32, Error> {
    Ok(stream.read_u32::<BigEndian>()?)
}

pub fn write_i32<W: Write>(stream: &mut W, v: i32) -> Result<(), Error> {
    stream.write_i32::<BigEndian>(v)?;
    Ok(())
}

pub fn read_i32<R: Read>(stream: &mut R) -> Result<i32, Error> {
    Ok(stream.read_i32::<BigEndian>()?)
}

pub fn write_u64<W: Write>(stream: &mut W, v: u64) -> Result<(), Error> {
    stream.write_u64::<BigEndian>(v)?;
    Ok(())
}

pub fn read_u64<R: Read>(stream: &mut R) -> Result<u64, Error> {
    Ok(stream.read_u64::<BigEndian>()?)
}

pub fn write_i64<W: Write>(stream: &mut W, v: i64) -> Result<(), Error> {
    stream.write_i64::<BigEndian>(v)?;
    Ok(())
}

pub fn read_i64<R: Read>(stream: &mut R) -> Result<i64, Error> {
    Ok(stream.read_i64::<BigEndian>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn opaque_round_trip_pads_to_four() {
        for len in 0..9 {
            let bytes: Vec<u8> = (0..len as u8).collect();
            let mut encoded = Vec::new();
            write_opaque(&mut encoded, &bytes).unwrap();

            assert_eq!(encoded.len() % 4, 0, "length {} not padded", len);

            let decoded = read_opaque(&mut Cursor::new(&encoded), 16).unwrap();
            assert_eq!(decoded, bytes);
        }
    }

    #[test]
    fn opaque_rejects_oversized_field() {
        let mut encoded = Vec::new();
        write_opaque(&mut encoded, &[0u8; 32]).unwrap();

        match read_opaque(&mut Cursor::new(&encoded), 16) {
            Err(Error::FieldTooLarge { len: 32, bound: 16 }) => {}
            other => panic!("expected FieldTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn record_round_trip() {
        let body = b"a small record body".to_vec();
        let mut framed = Vec::new();
        write_record(&mut framed, &body).unwrap();

        // Mark is length with the last-fragment bit set.
        assert_eq!(framed[0], 0x80);
        assert_eq!(framed[3], body.len() as u8);

        let read = read_record(&mut Cursor::new(&framed), 64).unwrap();
        assert_eq!(read, body);
    }

    #[test]
    fn record_rejects_fragments() {
        // Mark without the last-fragment bit.
        let framed = [0u8, 0, 0, 4, 1, 2, 3, 4];

        match read_record(&mut Cursor::new(&framed[..]), 64) {
            Err(Error::Fragmented) => {}
            other => panic!("expected Fragmented, got {:?}", other),
        }
    }

    #[test]
    fn record_rejects_oversized_body() {
        let mut framed = Vec::new();
        write_record(&mut framed, &[0u8; 128]).unwrap();

        match read_record(&mut Cursor::new(&framed), 64) {
            Err(Error::RecordTooLarge(128)) => {}
            other => panic!("expected RecordTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn integers_are_big_endian() {
        let mut encoded = Vec::new();
        write_u32(&mut encoded, 0x0102_0304).unwrap();
        write_i64(&mut encoded, -2).unwrap();

        assert_eq!(&encoded[..4], &[1, 2, 3, 4]);
        assert_eq!(&encoded[4..], &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]);

        let mut cursor = Cursor::new(&encoded);
        assert_eq!(read_u32(&mut cursor).unwrap(), 0x0102_0304);
        assert_eq!(read_i64(&mut cursor).unwrap(), -2);
    }
}
