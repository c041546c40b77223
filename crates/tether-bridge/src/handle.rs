//! Non-owning wrappers over module-owned struct values.
//!
//! A handle is an opaque integer naming a value that lives inside module
//! memory. The wrappers here store only the handle; field access goes
//! through the memory lens at `handle + field offset`, so a field write is
//! immediately visible to the next capability call that reads the same
//! handle.
//!
//! Release is explicit and consuming: [`ColorRef::release`] /
//! [`PointRef::release`] take the wrapper by value and call the module's
//! per-type free export, so a double release or use-after-release is a
//! compile error, not a latent use-after-free.

use wasmi::{AsContext, AsContextMut, TypedFunc};

use crate::memory::MemoryLens;
use crate::{BridgeError, BridgeResult};

/// Struct layout contract between host and module, version 1.
///
/// Field offsets and sizes are agreed ahead of time, not inferred at
/// runtime; a module compiled against a different layout must not be
/// loaded.
pub mod layout {
    pub const COLOR_R: u32 = 0;
    pub const COLOR_G: u32 = 4;
    pub const COLOR_B: u32 = 8;
    pub const COLOR_SIZE: u32 = 12;

    pub const POINT_X: u32 = 0;
    pub const POINT_Y: u32 = 4;
    pub const POINT_SIZE: u32 = 8;
}

/// An RGB color value, fields in a host-defined range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

/// A 2D point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Non-owning view of a module-owned `Color`.
///
/// Deliberately not `Copy`: release consumes the only wrapper.
#[derive(Debug, PartialEq, Eq)]
pub struct ColorRef {
    raw: u32,
}

impl ColorRef {
    /// Wrap a raw handle. The null handle is rejected: it is the module's
    /// "already freed" marker and must never be dereferenced.
    pub fn from_raw(raw: u32) -> BridgeResult<Self> {
        if raw == 0 {
            return Err(BridgeError::NullHandle { kind: "Color" });
        }
        Ok(Self { raw })
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    pub fn r(&self, lens: &MemoryLens, ctx: impl AsContext) -> BridgeResult<f32> {
        lens.read_f32(ctx, field_addr(self.raw, layout::COLOR_R)?)
    }

    pub fn g(&self, lens: &MemoryLens, ctx: impl AsContext) -> BridgeResult<f32> {
        lens.read_f32(ctx, field_addr(self.raw, layout::COLOR_G)?)
    }

    pub fn b(&self, lens: &MemoryLens, ctx: impl AsContext) -> BridgeResult<f32> {
        lens.read_f32(ctx, field_addr(self.raw, layout::COLOR_B)?)
    }

    pub fn set_r(&self, lens: &MemoryLens, ctx: impl AsContextMut, v: f32) -> BridgeResult<()> {
        lens.write_f32(ctx, field_addr(self.raw, layout::COLOR_R)?, v)
    }

    pub fn set_g(&self, lens: &MemoryLens, ctx: impl AsContextMut, v: f32) -> BridgeResult<()> {
        lens.write_f32(ctx, field_addr(self.raw, layout::COLOR_G)?, v)
    }

    pub fn set_b(&self, lens: &MemoryLens, ctx: impl AsContextMut, v: f32) -> BridgeResult<()> {
        lens.write_f32(ctx, field_addr(self.raw, layout::COLOR_B)?, v)
    }

    /// Read the whole struct out of module memory.
    pub fn load(&self, lens: &MemoryLens, ctx: impl AsContext) -> BridgeResult<Color> {
        let ctx = ctx.as_context();
        Ok(Color {
            r: self.r(lens, &ctx)?,
            g: self.g(lens, &ctx)?,
            b: self.b(lens, &ctx)?,
        })
    }

    /// Write the whole struct into module memory.
    pub fn store(&self, lens: &MemoryLens, mut ctx: impl AsContextMut, v: Color) -> BridgeResult<()> {
        self.set_r(lens, ctx.as_context_mut(), v.r)?;
        self.set_g(lens, ctx.as_context_mut(), v.g)?;
        self.set_b(lens, ctx.as_context_mut(), v.b)
    }

    /// Ask the module to reclaim the value. Consumes the wrapper.
    pub fn release(
        self,
        mut ctx: impl AsContextMut,
        free: TypedFunc<u32, ()>,
    ) -> BridgeResult<()> {
        free.call(ctx.as_context_mut(), self.raw)
            .map_err(BridgeError::call)
    }
}

/// Non-owning view of a module-owned `Point`.
///
/// Deliberately not `Copy`: release consumes the only wrapper.
#[derive(Debug, PartialEq, Eq)]
pub struct PointRef {
    raw: u32,
}

impl PointRef {
    /// Wrap a raw handle, rejecting the null handle.
    pub fn from_raw(raw: u32) -> BridgeResult<Self> {
        if raw == 0 {
            return Err(BridgeError::NullHandle { kind: "Point" });
        }
        Ok(Self { raw })
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    pub fn x(&self, lens: &MemoryLens, ctx: impl AsContext) -> BridgeResult<f32> {
        lens.read_f32(ctx, field_addr(self.raw, layout::POINT_X)?)
    }

    pub fn y(&self, lens: &MemoryLens, ctx: impl AsContext) -> BridgeResult<f32> {
        lens.read_f32(ctx, field_addr(self.raw, layout::POINT_Y)?)
    }

    pub fn set_x(&self, lens: &MemoryLens, ctx: impl AsContextMut, v: f32) -> BridgeResult<()> {
        lens.write_f32(ctx, field_addr(self.raw, layout::POINT_X)?, v)
    }

    pub fn set_y(&self, lens: &MemoryLens, ctx: impl AsContextMut, v: f32) -> BridgeResult<()> {
        lens.write_f32(ctx, field_addr(self.raw, layout::POINT_Y)?, v)
    }

    pub fn load(&self, lens: &MemoryLens, ctx: impl AsContext) -> BridgeResult<Point> {
        let ctx = ctx.as_context();
        Ok(Point {
            x: self.x(lens, &ctx)?,
            y: self.y(lens, &ctx)?,
        })
    }

    pub fn store(&self, lens: &MemoryLens, mut ctx: impl AsContextMut, v: Point) -> BridgeResult<()> {
        self.set_x(lens, ctx.as_context_mut(), v.x)?;
        self.set_y(lens, ctx.as_context_mut(), v.y)
    }

    /// Ask the module to reclaim the value. Consumes the wrapper.
    pub fn release(
        self,
        mut ctx: impl AsContextMut,
        free: TypedFunc<u32, ()>,
    ) -> BridgeResult<()> {
        free.call(ctx.as_context_mut(), self.raw)
            .map_err(BridgeError::call)
    }
}

/// Field address of `handle + offset`, overflow-checked. A handle close
/// enough to `u32::MAX` to wrap is out of range by definition.
fn field_addr(raw: u32, offset: u32) -> BridgeResult<u32> {
    raw.checked_add(offset).ok_or(BridgeError::OutOfBounds {
        ptr: raw,
        len: offset,
        size: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handle_is_rejected() {
        assert!(matches!(
            ColorRef::from_raw(0),
            Err(BridgeError::NullHandle { kind: "Color" })
        ));
        assert!(matches!(
            PointRef::from_raw(0),
            Err(BridgeError::NullHandle { kind: "Point" })
        ));
    }

    #[test]
    fn wrapper_is_just_the_handle() {
        let c = ColorRef::from_raw(2048).unwrap();
        assert_eq!(c.raw(), 2048);
        let p = PointRef::from_raw(16).unwrap();
        assert_eq!(p.raw(), 16);
    }
}
