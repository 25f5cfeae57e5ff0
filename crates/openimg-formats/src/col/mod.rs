//! COL collision container parsing
//!
//! A COL file is a concatenation of collision models, each introduced by a
//! FourCC and a declared content size:
//!
//! ```text
//! +0  FourCC          "COLL" (v1), "COL\x02", "COL\x03", "COL\x04"
//! +4  content_size    u32 LE, bytes following this field
//! +8  body            name, model id, bounds, collision geometry
//! ```
//!
//! A model therefore occupies `content_size + 8` bytes. Version 1 stores
//! inline count-prefixed geometry streams with 32-bit fields; versions 2-4
//! store counts up front and locate each section with offsets relative to
//! the content-size field, with quantized 16-bit vertices.
//!
//! Parsing is best-effort: an undecodable model body is logged and replaced
//! with an empty model of the declared size, and an unrecognized FourCC
//! stops the scan, reporting the remaining bytes as trailing data.

mod parser;
mod types;

pub use parser::parse;
pub use types::{
    Bounds, ColFile, ColVersion, CollisionModel, ColBox, Face, Sphere, Surface, Vec3,
};
