//! Typed, bounds-checked access to the module's linear memory.
//!
//! The module owns its memory and may grow it during any call that
//! allocates; the buffer's identity is not stable. `MemoryLens` therefore
//! never caches a data pointer: every access re-derives the live slice from
//! the store context, which is exactly the "re-validate after any possible
//! resize" rule the boundary requires, enforced by construction.
//!
//! All multi-byte values are little-endian, per the Wasm spec. An
//! out-of-range span is a contract violation ([`BridgeError::OutOfBounds`]),
//! not a recoverable condition.

use wasmi::{AsContext, AsContextMut, Caller, Extern, Memory};

use crate::{BridgeError, BridgeResult};

/// A view factory over one module's exported linear memory.
///
/// Cheap to copy; holds only the `wasmi::Memory` handle, never the data.
#[derive(Debug, Clone, Copy)]
pub struct MemoryLens {
    memory: Memory,
}

impl MemoryLens {
    pub fn new(memory: Memory) -> Self {
        Self { memory }
    }

    /// Rebind the lens from inside a host-call context. The module must
    /// export its memory under the name `memory`.
    pub fn from_caller<T>(caller: &Caller<'_, T>) -> BridgeResult<Self> {
        let memory = caller
            .get_export("memory")
            .and_then(Extern::into_memory)
            .ok_or(BridgeError::MissingExport("memory"))?;
        Ok(Self::new(memory))
    }

    /// Current memory size in bytes.
    pub fn size(&self, ctx: impl AsContext) -> usize {
        self.memory.data(ctx.as_context()).len()
    }

    /// Copy `len` bytes out of memory starting at `ptr`.
    pub fn read_bytes(&self, ctx: impl AsContext, ptr: u32, len: u32) -> BridgeResult<Vec<u8>> {
        let data = self.memory.data(ctx.as_context());
        let range = checked_range(data.len(), ptr, len)?;
        Ok(data[range].to_vec())
    }

    /// Copy `bytes` into memory starting at `ptr`.
    pub fn write_bytes(
        &self,
        mut ctx: impl AsContextMut,
        ptr: u32,
        bytes: &[u8],
    ) -> BridgeResult<()> {
        let data = self.memory.data_mut(ctx.as_context_mut());
        let range = checked_range(data.len(), ptr, bytes.len() as u32)?;
        data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Load a u32 from `ptr`.
    pub fn read_u32(&self, ctx: impl AsContext, ptr: u32) -> BridgeResult<u32> {
        let data = self.memory.data(ctx.as_context());
        let range = checked_range(data.len(), ptr, 4)?;
        Ok(u32::from_le_bytes(to_array(&data[range], ptr)?))
    }

    /// Store a u32 at `ptr`.
    pub fn write_u32(&self, mut ctx: impl AsContextMut, ptr: u32, value: u32) -> BridgeResult<()> {
        let data = self.memory.data_mut(ctx.as_context_mut());
        let range = checked_range(data.len(), ptr, 4)?;
        data[range].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Load an f32 from `ptr`.
    pub fn read_f32(&self, ctx: impl AsContext, ptr: u32) -> BridgeResult<f32> {
        let data = self.memory.data(ctx.as_context());
        let range = checked_range(data.len(), ptr, 4)?;
        Ok(f32::from_le_bytes(to_array(&data[range], ptr)?))
    }

    /// Store an f32 at `ptr`.
    pub fn write_f32(&self, mut ctx: impl AsContextMut, ptr: u32, value: f32) -> BridgeResult<()> {
        let data = self.memory.data_mut(ctx.as_context_mut());
        let range = checked_range(data.len(), ptr, 4)?;
        data[range].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Copy out `count` u32 elements starting at `ptr`.
    ///
    /// Element arrays in module memory carry no host alignment guarantee,
    /// so the elements are decoded one by one into an owned vector.
    pub fn read_u32_array(
        &self,
        ctx: impl AsContext,
        ptr: u32,
        count: u32,
    ) -> BridgeResult<Vec<u32>> {
        let bytes = self.read_bytes(ctx, ptr, elem_bytes(ptr, count)?)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Copy out `count` f32 elements starting at `ptr`.
    pub fn read_f32_array(
        &self,
        ctx: impl AsContext,
        ptr: u32,
        count: u32,
    ) -> BridgeResult<Vec<f32>> {
        let bytes = self.read_bytes(ctx, ptr, elem_bytes(ptr, count)?)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Copy `elements` into memory starting at `ptr`.
    pub fn write_u32_array(
        &self,
        mut ctx: impl AsContextMut,
        ptr: u32,
        elements: &[u32],
    ) -> BridgeResult<()> {
        let data = self.memory.data_mut(ctx.as_context_mut());
        let range = checked_range(data.len(), ptr, elem_bytes(ptr, elements.len() as u32)?)?;
        for (chunk, value) in data[range].chunks_exact_mut(4).zip(elements) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    /// Copy `elements` into memory starting at `ptr`.
    pub fn write_f32_array(
        &self,
        mut ctx: impl AsContextMut,
        ptr: u32,
        elements: &[f32],
    ) -> BridgeResult<()> {
        let data = self.memory.data_mut(ctx.as_context_mut());
        let range = checked_range(data.len(), ptr, elem_bytes(ptr, elements.len() as u32)?)?;
        for (chunk, value) in data[range].chunks_exact_mut(4).zip(elements) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }
}

/// Bounds-check `ptr..ptr+len` against the current memory size.
/// Errors on overflow or overrun — never panics.
fn checked_range(size: usize, ptr: u32, len: u32) -> BridgeResult<core::ops::Range<usize>> {
    let start = ptr as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or(BridgeError::OutOfBounds { ptr, len, size })?;
    if end > size {
        return Err(BridgeError::OutOfBounds { ptr, len, size });
    }
    Ok(start..end)
}

/// Byte length of `count` 4-byte elements, overflow-checked.
fn elem_bytes(ptr: u32, count: u32) -> BridgeResult<u32> {
    count
        .checked_mul(4)
        .ok_or(BridgeError::OutOfBounds { ptr, len: count, size: 0 })
}

fn to_array<const N: usize>(slice: &[u8], ptr: u32) -> BridgeResult<[u8; N]> {
    slice.try_into().map_err(|_| BridgeError::OutOfBounds {
        ptr,
        len: N as u32,
        size: slice.len(),
    })
}
