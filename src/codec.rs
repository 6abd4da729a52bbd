extern crate byteorder;
use crate::error::{RelError, Result};
use crate::store::ByteStore;
use byteorder::{BigEndian, ByteOrder};

/// An unsigned integer stored big-endian in a module.
pub trait BigEndianField: Copy {
    const WIDTH: usize;

    fn decode(bytes: &[u8]) -> Self;

    fn encode(self, bytes: &mut [u8]);
}

impl BigEndianField for u8 {
    const WIDTH: usize = 1;

    fn decode(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn encode(self, bytes: &mut [u8]) {
        bytes[0] = self;
    }
}

impl BigEndianField for u16 {
    const WIDTH: usize = 2;

    fn decode(bytes: &[u8]) -> Self {
        BigEndian::read_u16(bytes)
    }

    fn encode(self, bytes: &mut [u8]) {
        BigEndian::write_u16(bytes, self);
    }
}

impl BigEndianField for u32 {
    const WIDTH: usize = 4;

    fn decode(bytes: &[u8]) -> Self {
        BigEndian::read_u32(bytes)
    }

    fn encode(self, bytes: &mut [u8]) {
        BigEndian::write_u32(bytes, self);
    }
}

/// Reads one field at `offset`. Fails with `TruncatedStore` if the field is not entirely
/// inside the store.
pub fn read_field<T, S>(store: &mut S, offset: u64) -> Result<T>
where
    T: BigEndianField,
    S: ByteStore + ?Sized,
{
    let mut buf = [0u8; 4];
    let buf = &mut buf[..T::WIDTH];
    if store.read_at(offset, buf)? < T::WIDTH {
        return Err(RelError::TruncatedStore {
            offset,
            len: T::WIDTH,
        });
    }
    Ok(T::decode(buf))
}

pub fn write_field<T, S>(store: &mut S, offset: u64, value: T) -> Result<()>
where
    T: BigEndianField,
    S: ByteStore + ?Sized,
{
    let mut buf = [0u8; 4];
    let buf = &mut buf[..T::WIDTH];
    value.encode(buf);
    store.write_at(offset, buf)?;
    Ok(())
}

/// Writes `values` back to back starting at `offset`.
pub fn write_fields<T, S>(store: &mut S, offset: u64, values: &[T]) -> Result<()>
where
    T: BigEndianField,
    S: ByteStore + ?Sized,
{
    let mut buf = vec![0u8; values.len() * T::WIDTH];
    for (value, chunk) in values.iter().zip(buf.chunks_mut(T::WIDTH)) {
        value.encode(chunk);
    }
    store.write_at(offset, &buf)?;
    Ok(())
}

pub fn read_u8<S: ByteStore + ?Sized>(store: &mut S, offset: u64) -> Result<u8> {
    read_field(store, offset)
}

pub fn read_u16<S: ByteStore + ?Sized>(store: &mut S, offset: u64) -> Result<u16> {
    read_field(store, offset)
}

pub fn read_u32<S: ByteStore + ?Sized>(store: &mut S, offset: u64) -> Result<u32> {
    read_field(store, offset)
}

pub fn write_u8<S: ByteStore + ?Sized>(store: &mut S, offset: u64, value: u8) -> Result<()> {
    write_field(store, offset, value)
}

pub fn write_u16<S: ByteStore + ?Sized>(store: &mut S, offset: u64, value: u16) -> Result<()> {
    write_field(store, offset, value)
}

pub fn write_u32<S: ByteStore + ?Sized>(store: &mut S, offset: u64, value: u32) -> Result<()> {
    write_field(store, offset, value)
}

/// Sequential field reader that tracks its own position instead of the store's cursor.
pub struct FieldReader<'a, S: ByteStore + ?Sized> {
    store: &'a mut S,
    offset: u64,
}

impl<'a, S: ByteStore + ?Sized> FieldReader<'a, S> {
    pub fn new(store: &'a mut S, offset: u64) -> Self {
        FieldReader { store, offset }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn read<T: BigEndianField>(&mut self) -> Result<T> {
        let value = read_field(&mut *self.store, self.offset)?;
        self.offset += T::WIDTH as u64;
        Ok(value)
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.read()
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.read()
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.read()
    }
}
