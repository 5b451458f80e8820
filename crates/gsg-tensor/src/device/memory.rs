use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// Address of an element in device memory.
///
/// A pointer names a buffer and an element offset inside it. Pointer
/// arithmetic moves the offset; it never crosses into another buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePtr {
    buffer: u32,
    offset: usize,
}

impl DevicePtr {
    /// Returns the pointer advanced by `elements`.
    pub fn add(self, elements: usize) -> Self {
        DevicePtr {
            buffer: self.buffer,
            offset: self.offset + elements,
        }
    }

    pub fn buffer(&self) -> u32 {
        self.buffer
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Packs the pointer into an opaque 64-bit handle (buffer in the high
    /// 32 bits, element offset in the low 32 bits).
    ///
    /// Offsets that do not fit 32 bits are rejected rather than truncated.
    pub fn to_raw(self) -> Result<u64> {
        let offset = u32::try_from(self.offset).map_err(|_| TensorError::HandleOverflow { offset: self.offset })?;
        Ok(((self.buffer as u64) << 32) | offset as u64)
    }

    /// Inverse of [`DevicePtr::to_raw`].
    pub fn from_raw(raw: u64) -> Self {
        DevicePtr {
            buffer: (raw >> 32) as u32,
            offset: (raw & 0xFFFF_FFFF) as usize,
        }
    }
}

/// A typed allocation. Contents are held widened to f32 and rounded to
/// `dtype` precision on every store.
#[derive(Debug, Clone)]
struct DeviceBuffer {
    dtype: DType,
    data: Vec<f32>,
}

/// Emulated device memory: a set of independently allocated typed buffers.
#[derive(Debug, Clone, Default)]
pub struct DeviceMemory {
    buffers: Vec<DeviceBuffer>,
}

impl DeviceMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zero-filled buffer of `len` elements.
    pub fn alloc(&mut self, dtype: DType, len: usize) -> DevicePtr {
        let buffer = self.buffers.len() as u32;
        self.buffers.push(DeviceBuffer {
            dtype,
            data: vec![0.0; len],
        });
        log::trace!("alloc buffer {} ({} x {})", buffer, len, dtype);
        DevicePtr { buffer, offset: 0 }
    }

    /// Element type of the buffer `ptr` points into.
    pub fn dtype(&self, ptr: DevicePtr) -> Result<DType> {
        Ok(self.buffer(ptr)?.dtype)
    }

    /// Number of elements between `ptr` and the end of its buffer.
    pub fn remaining(&self, ptr: DevicePtr) -> Result<usize> {
        let buffer = self.buffer(ptr)?;
        Ok(buffer.data.len().saturating_sub(ptr.offset))
    }

    /// Copy host data into device memory starting at `ptr`.
    pub fn write(&mut self, ptr: DevicePtr, data: &[f32]) -> Result<()> {
        let buffer = self.buffer_mut(ptr)?;
        let range = checked_range(ptr.offset, data.len(), buffer.data.len())?;
        let dtype = buffer.dtype;
        for (dst, &src) in buffer.data[range].iter_mut().zip(data) {
            *dst = dtype.quantize(src);
        }
        Ok(())
    }

    /// Copy `len` elements starting at `ptr` back to the host.
    pub fn read(&self, ptr: DevicePtr, len: usize) -> Result<Vec<f32>> {
        let buffer = self.buffer(ptr)?;
        let range = checked_range(ptr.offset, len, buffer.data.len())?;
        Ok(buffer.data[range].to_vec())
    }

    /// Load the element at `ptr + offset`.
    pub fn load(&self, ptr: DevicePtr, offset: usize) -> Result<f32> {
        let buffer = self.buffer(ptr)?;
        let index = ptr.offset + offset;
        buffer
            .data
            .get(index)
            .copied()
            .ok_or(TensorError::OutOfBounds {
                offset: index,
                len: 1,
                size: buffer.data.len(),
            })
    }

    /// Store `value` at `ptr + offset`, rounded to the buffer's dtype.
    pub fn store(&mut self, ptr: DevicePtr, offset: usize, value: f32) -> Result<()> {
        let buffer = self.buffer_mut(ptr)?;
        let index = ptr.offset + offset;
        let size = buffer.data.len();
        let dtype = buffer.dtype;
        let slot = buffer.data.get_mut(index).ok_or(TensorError::OutOfBounds {
            offset: index,
            len: 1,
            size,
        })?;
        *slot = dtype.quantize(value);
        Ok(())
    }

    fn buffer(&self, ptr: DevicePtr) -> Result<&DeviceBuffer> {
        self.buffers
            .get(ptr.buffer as usize)
            .ok_or(TensorError::InvalidPointer { buffer: ptr.buffer })
    }

    fn buffer_mut(&mut self, ptr: DevicePtr) -> Result<&mut DeviceBuffer> {
        self.buffers
            .get_mut(ptr.buffer as usize)
            .ok_or(TensorError::InvalidPointer { buffer: ptr.buffer })
    }
}

fn checked_range(offset: usize, len: usize, size: usize) -> Result<std::ops::Range<usize>> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(offset..end),
        _ => Err(TensorError::OutOfBounds { offset, len, size }),
    }
}
