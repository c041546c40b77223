//! Pre-flight validation of the module binary.
//!
//! This runs a single `wasmparser` pass over the export section before
//! instantiation, so a module built against the wrong ABI fails with a
//! precise "missing export" error instead of a generic link failure.

use wasmparser::{ExternalKind, Parser, Payload};

use crate::{BridgeError, BridgeResult};

/// Function exports every interpreter module must provide.
pub(crate) const REQUIRED_FUNCS: &[&str] = &[
    "alloc",
    "dealloc",
    "ret_area",
    "eval",
    "resume",
    "reset",
    "color_free",
    "point_free",
];

/// Check that `wasm_bytes` exports a memory named `memory` and every
/// entry point in [`REQUIRED_FUNCS`], each with the right export kind.
pub fn check_required_exports(wasm_bytes: &[u8]) -> BridgeResult<()> {
    let mut funcs: Vec<String> = Vec::new();
    let mut has_memory = false;

    for payload in Parser::new(0).parse_all(wasm_bytes) {
        let payload = payload.map_err(BridgeError::load)?;
        if let Payload::ExportSection(reader) = payload {
            for export in reader {
                let export = export.map_err(BridgeError::load)?;
                match export.kind {
                    ExternalKind::Func => funcs.push(export.name.to_string()),
                    ExternalKind::Memory if export.name == "memory" => has_memory = true,
                    _ => {}
                }
            }
        }
    }

    if !has_memory {
        return Err(BridgeError::MissingExport("memory"));
    }
    for &name in REQUIRED_FUNCS {
        if !funcs.iter().any(|f| f == name) {
            return Err(BridgeError::MissingExport(name));
        }
    }
    Ok(())
}
