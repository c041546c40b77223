//! Value marshalling across the module boundary.
//!
//! The boundary only carries fixed-width scalars, so every variable-length
//! value travels as a (pointer, length) pair describing a span of module
//! memory — a [`TransferBuffer`]. Ownership of that span must be unambiguous
//! at every call:
//!
//! - outbound values (host → module) are allocated with the module's
//!   allocator, filled, and handed off — the module releases them;
//! - inbound text (module → host) is copied out and released immediately
//!   by the host ([`Marshaller::read_text`] consumes the buffer);
//! - inbound numeric arrays are read without taking ownership — the module
//!   keeps them for the duration of the call and releases them itself.
//!
//! `TransferBuffer` is not `Copy` and every transfer of ownership consumes
//! it, so a double release or a use-after-hand-off is a compile error.

use wasmi::{AsContext, AsContextMut, Caller, Extern, TypedFunc};

use crate::memory::MemoryLens;
use crate::{BridgeError, BridgeResult};

/// Element kind carried by a transfer buffer. Arrays are homogeneous;
/// there are no mixed-type transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemKind {
    /// Raw bytes, interpreted as UTF-8 text.
    Byte,
    /// 32-bit unsigned integers, little-endian.
    U32,
    /// 32-bit floats, little-endian.
    F32,
}

impl ElemKind {
    /// Width of one element in bytes.
    pub fn width(self) -> u32 {
        match self {
            ElemKind::Byte => 1,
            ElemKind::U32 => 4,
            ElemKind::F32 => 4,
        }
    }
}

/// A (pointer, length) span of module memory whose ownership is in flight.
///
/// `len` counts elements of `kind`, not bytes. The value must end in
/// exactly one of: [`Marshaller::read_text`] (host releases),
/// [`Marshaller::return_pair`] or [`TransferBuffer::into_raw_parts`]
/// (module takes over), or [`Marshaller::release`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a transfer buffer owns module memory until released or handed off"]
pub struct TransferBuffer {
    ptr: u32,
    len: u32,
    kind: ElemKind,
}

impl TransferBuffer {
    /// Adopt a raw (pointer, length) pair received from the module.
    pub fn from_raw_parts(ptr: u32, len: u32, kind: ElemKind) -> Self {
        Self { ptr, len, kind }
    }

    pub fn ptr(&self) -> u32 {
        self.ptr
    }

    /// Element count.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn kind(&self) -> ElemKind {
        self.kind
    }

    /// Span length in bytes.
    pub fn byte_len(&self) -> u32 {
        self.len * self.kind.width()
    }

    /// Hand the span off to the module: the module becomes responsible for
    /// releasing it. Returns the raw pair for a boundary call.
    pub fn into_raw_parts(self) -> (u32, u32) {
        (self.ptr, self.len)
    }
}

/// Marshals host values into and out of one module's memory.
///
/// Holds the memory lens plus the module's allocator and deallocator entry
/// points; cheap to rebuild, safe to use from inside a host-call shim via
/// [`Marshaller::from_caller`].
#[derive(Debug, Clone)]
pub struct Marshaller {
    lens: MemoryLens,
    alloc: TypedFunc<u32, u32>,
    dealloc: TypedFunc<(u32, u32), ()>,
}

impl Marshaller {
    pub fn new(
        lens: MemoryLens,
        alloc: TypedFunc<u32, u32>,
        dealloc: TypedFunc<(u32, u32), ()>,
    ) -> Self {
        Self {
            lens,
            alloc,
            dealloc,
        }
    }

    /// Rebind from inside a host-call context. Needed by capability shims
    /// that return variable-length values: they allocate inside the module
    /// while the module is itself mid-call.
    pub fn from_caller<T>(caller: &Caller<'_, T>) -> BridgeResult<Self> {
        let lens = MemoryLens::from_caller(caller)?;
        let alloc = typed_export(caller, "alloc")?;
        let dealloc = typed_export(caller, "dealloc")?;
        Ok(Self::new(lens, alloc, dealloc))
    }

    pub fn lens(&self) -> &MemoryLens {
        &self.lens
    }

    /// Allocate `byte_len` bytes inside the module.
    fn allocate(&self, mut ctx: impl AsContextMut, byte_len: u32) -> BridgeResult<u32> {
        let ptr = self
            .alloc
            .call(ctx.as_context_mut(), byte_len)
            .map_err(BridgeError::call)?;
        log::trace!("allocated {byte_len} bytes at {ptr:#x} in module memory");
        Ok(ptr)
    }

    /// Release a span without reading it.
    pub fn release(&self, mut ctx: impl AsContextMut, buffer: TransferBuffer) -> BridgeResult<()> {
        self.dealloc
            .call(ctx.as_context_mut(), (buffer.ptr, buffer.byte_len()))
            .map_err(BridgeError::call)
    }

    /// Encode `text` as UTF-8 into freshly allocated module memory.
    ///
    /// The caller decides who releases the result: hand it off with
    /// [`TransferBuffer::into_raw_parts`] / [`Marshaller::return_pair`]
    /// when the module takes ownership.
    pub fn write_text(&self, mut ctx: impl AsContextMut, text: &str) -> BridgeResult<TransferBuffer> {
        let bytes = text.as_bytes();
        let ptr = self.allocate(ctx.as_context_mut(), bytes.len() as u32)?;
        self.lens.write_bytes(ctx.as_context_mut(), ptr, bytes)?;
        Ok(TransferBuffer::from_raw_parts(
            ptr,
            bytes.len() as u32,
            ElemKind::Byte,
        ))
    }

    /// Decode UTF-8 text from the span, then release it.
    ///
    /// Consuming: the span is gone afterwards. Invalid UTF-8 is a fatal
    /// contract violation.
    pub fn read_text(&self, mut ctx: impl AsContextMut, buffer: TransferBuffer) -> BridgeResult<String> {
        let (ptr, len) = (buffer.ptr, buffer.byte_len());
        let bytes = self.lens.read_bytes(ctx.as_context(), ptr, len)?;
        self.release(ctx.as_context_mut(), buffer)?;
        String::from_utf8(bytes).map_err(|_| BridgeError::InvalidUtf8 { ptr, len })
    }

    /// Copy a u32 array into freshly allocated module memory.
    pub fn write_u32_array(
        &self,
        mut ctx: impl AsContextMut,
        elements: &[u32],
    ) -> BridgeResult<TransferBuffer> {
        let ptr = self.allocate(ctx.as_context_mut(), elements.len() as u32 * 4)?;
        self.lens.write_u32_array(ctx.as_context_mut(), ptr, elements)?;
        Ok(TransferBuffer::from_raw_parts(
            ptr,
            elements.len() as u32,
            ElemKind::U32,
        ))
    }

    /// Copy an f32 array into freshly allocated module memory.
    pub fn write_f32_array(
        &self,
        mut ctx: impl AsContextMut,
        elements: &[f32],
    ) -> BridgeResult<TransferBuffer> {
        let ptr = self.allocate(ctx.as_context_mut(), elements.len() as u32 * 4)?;
        self.lens.write_f32_array(ctx.as_context_mut(), ptr, elements)?;
        Ok(TransferBuffer::from_raw_parts(
            ptr,
            elements.len() as u32,
            ElemKind::F32,
        ))
    }

    /// Read a u32 array without taking ownership of the span.
    pub fn read_u32_array(
        &self,
        ctx: impl AsContext,
        ptr: u32,
        count: u32,
    ) -> BridgeResult<Vec<u32>> {
        self.lens.read_u32_array(ctx, ptr, count)
    }

    /// Read an f32 array without taking ownership of the span.
    pub fn read_f32_array(
        &self,
        ctx: impl AsContext,
        ptr: u32,
        count: u32,
    ) -> BridgeResult<Vec<f32>> {
        self.lens.read_f32_array(ctx, ptr, count)
    }

    /// Write the buffer's (pointer, length) pair into a return slot so the
    /// module can fetch a variable-length value with two fixed-width loads.
    ///
    /// Consuming: the module owns the span once the pair is visible to it.
    pub fn return_pair(
        &self,
        mut ctx: impl AsContextMut,
        slot: u32,
        buffer: TransferBuffer,
    ) -> BridgeResult<()> {
        let (ptr, len) = buffer.into_raw_parts();
        self.lens.write_u32(ctx.as_context_mut(), slot, ptr)?;
        self.lens.write_u32(ctx.as_context_mut(), slot + 4, len)?;
        Ok(())
    }
}

/// Resolve a typed function export from a host-call context.
pub(crate) fn typed_export<T, P, R>(
    caller: &Caller<'_, T>,
    name: &'static str,
) -> BridgeResult<TypedFunc<P, R>>
where
    P: wasmi::WasmParams,
    R: wasmi::WasmResults,
{
    caller
        .get_export(name)
        .and_then(Extern::into_func)
        .ok_or(BridgeError::MissingExport(name))?
        .typed::<P, R>(caller.as_context())
        .map_err(|e| BridgeError::ExportShape {
            name,
            detail: e.to_string(),
        })
}
