//! Streaming scanner over concatenated collision models

use std::io::Cursor;

use binrw::BinRead;
use tracing::{debug, warn};

use super::types::{Bounds, ColBox, ColFile, ColVersion, CollisionModel, Face, Sphere, Surface, Vec3};
use crate::decode_name;
use crate::error::{FormatError, Result};

/// v2+ vertices are quantized to 1/128 world units
const VERTEX_SCALE: f32 = 1.0 / 128.0;

/// Scan `data` for concatenated collision models.
///
/// The scan walks the input model by model: read the FourCC and declared
/// content size, decode the body, append, advance by `content_size + 8`.
/// It never fails outright:
///
/// - an unrecognized FourCC stops the scan and leaves the rest as
///   [`ColFile::trailing`] bytes
/// - a declared size running past the input discards that partial model
/// - an undecodable body is kept as an empty model so container-level
///   offsets stay accountable
pub fn parse(data: &[u8]) -> ColFile {
    let mut models = Vec::new();
    let mut pos = 0usize;

    while data.len().saturating_sub(pos) >= 8 {
        let fourcc = [data[pos], data[pos + 1], data[pos + 2], data[pos + 3]];
        let Some(version) = ColVersion::from_fourcc(&fourcc) else {
            debug!(offset = pos, ?fourcc, "unrecognized FourCC, stopping scan");
            break;
        };

        let content_size = u32::from_le_bytes([
            data[pos + 4],
            data[pos + 5],
            data[pos + 6],
            data[pos + 7],
        ]) as usize;
        let total = content_size + 8;
        if pos + total > data.len() {
            warn!(
                offset = pos,
                declared = content_size,
                available = data.len() - pos - 8,
                "partial trailing model discarded"
            );
            break;
        }

        let model_bytes = &data[pos..pos + total];
        let model = match parse_body(version, model_bytes) {
            Ok(model) => model,
            Err(error) => {
                warn!(offset = pos, %version, %error, "undecodable model body, keeping empty model");
                CollisionModel::empty(version, salvage_name(model_bytes), total)
            }
        };
        models.push(model);
        pos += total;
    }

    ColFile {
        models,
        consumed: pos,
        trailing: data.len() - pos,
    }
}

/// Best-effort name extraction for models whose body failed to decode
fn salvage_name(model: &[u8]) -> String {
    model.get(8..30).map(decode_name).unwrap_or_default()
}

fn parse_body(version: ColVersion, model: &[u8]) -> Result<CollisionModel> {
    let mut cursor = Cursor::new(model);
    cursor.set_position(8);
    let name_field = <[u8; 22]>::read_le(&mut cursor)?;
    let name = decode_name(&name_field);

    match version {
        ColVersion::V1 => parse_v1(model, cursor, name),
        ColVersion::V2 | ColVersion::V3 | ColVersion::V4 => {
            parse_v2_plus(version, model, cursor, name)
        }
    }
}

fn parse_v1(
    model: &[u8],
    mut cursor: Cursor<&[u8]>,
    name: String,
) -> Result<CollisionModel> {
    let model_id = u32::read_le(&mut cursor)?;
    let bounds = Bounds {
        radius: f32::read_le(&mut cursor)?,
        center: Vec3::read_le(&mut cursor)?,
        min: Vec3::read_le(&mut cursor)?,
        max: Vec3::read_le(&mut cursor)?,
    };

    let sphere_count = read_count(&mut cursor, model.len(), 20)?;
    let mut spheres = Vec::with_capacity(sphere_count);
    for _ in 0..sphere_count {
        let radius = f32::read_le(&mut cursor)?;
        let center = Vec3::read_le(&mut cursor)?;
        let surface = Surface::read_le(&mut cursor)?;
        spheres.push(Sphere { center, radius, surface });
    }

    // Unused line/unknown section, 4 bytes per element
    let unknown_count = read_count(&mut cursor, model.len(), 4)?;
    cursor.set_position(cursor.position() + 4 * unknown_count as u64);

    let box_count = read_count(&mut cursor, model.len(), 28)?;
    let mut boxes = Vec::with_capacity(box_count);
    for _ in 0..box_count {
        boxes.push(ColBox {
            min: Vec3::read_le(&mut cursor)?,
            max: Vec3::read_le(&mut cursor)?,
            surface: Surface::read_le(&mut cursor)?,
        });
    }

    let vertex_count = read_count(&mut cursor, model.len(), 12)?;
    let mut vertices = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        vertices.push(Vec3::read_le(&mut cursor)?);
    }

    let face_count = read_count(&mut cursor, model.len(), 16)?;
    let mut faces = Vec::with_capacity(face_count);
    for _ in 0..face_count {
        let a = u32::read_le(&mut cursor)?;
        let b = u32::read_le(&mut cursor)?;
        let c = u32::read_le(&mut cursor)?;
        let packed = u32::read_le(&mut cursor)?;
        faces.push(Face {
            a,
            b,
            c,
            material: packed as u8,
            light: (packed >> 24) as u8,
        });
    }

    Ok(CollisionModel {
        name,
        model_id,
        version: ColVersion::V1,
        bounds,
        flags: 0,
        spheres,
        boxes,
        vertices,
        faces,
        stored_size: model.len(),
    })
}

fn parse_v2_plus(
    version: ColVersion,
    model: &[u8],
    mut cursor: Cursor<&[u8]>,
    name: String,
) -> Result<CollisionModel> {
    let model_id = u32::from(u16::read_le(&mut cursor)?);
    let min = Vec3::read_le(&mut cursor)?;
    let max = Vec3::read_le(&mut cursor)?;
    let center = Vec3::read_le(&mut cursor)?;
    let radius = f32::read_le(&mut cursor)?;
    let bounds = Bounds { radius, center, min, max };

    let sphere_count = usize::from(u16::read_le(&mut cursor)?);
    let box_count = usize::from(u16::read_le(&mut cursor)?);
    let face_count = usize::from(u16::read_le(&mut cursor)?);
    let _line_count = u8::read_le(&mut cursor)?;
    let _pad = u8::read_le(&mut cursor)?;
    let flags = u32::read_le(&mut cursor)?;

    let sphere_offset = u32::read_le(&mut cursor)?;
    let box_offset = u32::read_le(&mut cursor)?;
    let _line_offset = u32::read_le(&mut cursor)?;
    let vertex_offset = u32::read_le(&mut cursor)?;
    let face_offset = u32::read_le(&mut cursor)?;
    let _plane_offset = u32::read_le(&mut cursor)?;

    if matches!(version, ColVersion::V3 | ColVersion::V4) {
        let _shadow_face_count = u32::read_le(&mut cursor)?;
        let _shadow_vertex_offset = u32::read_le(&mut cursor)?;
        let _shadow_face_offset = u32::read_le(&mut cursor)?;
    }
    if version == ColVersion::V4 {
        let _unknown = u32::read_le(&mut cursor)?;
    }

    let mut spheres = Vec::with_capacity(sphere_count);
    if sphere_count > 0 {
        let mut section = section_cursor(model, sphere_offset)?;
        for _ in 0..sphere_count {
            // v2 spheres are center-then-radius, the reverse of v1
            let center = Vec3::read_le(&mut section)?;
            let radius = f32::read_le(&mut section)?;
            let surface = Surface::read_le(&mut section)?;
            spheres.push(Sphere { center, radius, surface });
        }
    }

    let mut boxes = Vec::with_capacity(box_count);
    if box_count > 0 {
        let mut section = section_cursor(model, box_offset)?;
        for _ in 0..box_count {
            boxes.push(ColBox {
                min: Vec3::read_le(&mut section)?,
                max: Vec3::read_le(&mut section)?,
                surface: Surface::read_le(&mut section)?,
            });
        }
    }

    let mut faces = Vec::with_capacity(face_count);
    if face_count > 0 {
        let mut section = section_cursor(model, face_offset)?;
        for _ in 0..face_count {
            let a = u32::from(u16::read_le(&mut section)?);
            let b = u32::from(u16::read_le(&mut section)?);
            let c = u32::from(u16::read_le(&mut section)?);
            let material = u8::read_le(&mut section)?;
            let light = u8::read_le(&mut section)?;
            faces.push(Face { a, b, c, material, light });
        }
    }

    // No stored vertex count: the mesh references exactly the vertices its
    // faces index
    let vertex_count = faces
        .iter()
        .map(Face::max_index)
        .max()
        .map_or(0, |max| max as usize + 1);
    let mut vertices = Vec::with_capacity(vertex_count);
    if vertex_count > 0 {
        let mut section = section_cursor(model, vertex_offset)?;
        for _ in 0..vertex_count {
            let x = i16::read_le(&mut section)?;
            let y = i16::read_le(&mut section)?;
            let z = i16::read_le(&mut section)?;
            vertices.push(Vec3::new(
                f32::from(x) * VERTEX_SCALE,
                f32::from(y) * VERTEX_SCALE,
                f32::from(z) * VERTEX_SCALE,
            ));
        }
    }

    Ok(CollisionModel {
        name,
        model_id,
        version,
        bounds,
        flags,
        spheres,
        boxes,
        vertices,
        faces,
        stored_size: model.len(),
    })
}

/// Position a cursor at a v2+ section. Offsets are relative to the
/// content-size field, four bytes into the model.
fn section_cursor(model: &[u8], offset: u32) -> Result<Cursor<&[u8]>> {
    let start = 4usize
        .checked_add(offset as usize)
        .filter(|&s| s <= model.len())
        .ok_or(FormatError::Truncated {
            what: "collision section",
            needed: offset as usize + 4,
            available: model.len(),
        })?;
    let mut cursor = Cursor::new(model);
    cursor.set_position(start as u64);
    Ok(cursor)
}

/// Read a count prefix, rejecting counts whose elements cannot fit in the
/// remaining model bytes. Corrupt counts would otherwise drive huge
/// allocations before the reads fail.
fn read_count(cursor: &mut Cursor<&[u8]>, model_len: usize, element_size: usize) -> Result<usize> {
    let count = u32::read_le(cursor)? as usize;
    let remaining = model_len.saturating_sub(cursor.position() as usize);
    if count.saturating_mul(element_size) > remaining {
        return Err(FormatError::Truncated {
            what: "collision geometry stream",
            needed: count * element_size,
            available: remaining,
        });
    }
    Ok(count)
}
