//! Collision model data types

use binrw::{BinRead, BinWrite};

/// COL container version, identified by the model FourCC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColVersion {
    /// "COLL" — GTA III / Vice City
    V1,
    /// "COL\x02" — San Andreas
    V2,
    /// "COL\x03" — San Andreas (shadow meshes)
    V3,
    /// "COL\x04" — rarely seen extension of v3
    V4,
}

impl ColVersion {
    /// Map a FourCC to a version, if recognized
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"COLL" => Some(Self::V1),
            b"COL\x02" => Some(Self::V2),
            b"COL\x03" => Some(Self::V3),
            b"COL\x04" => Some(Self::V4),
            _ => None,
        }
    }

    /// The FourCC bytes for this version
    pub fn fourcc(self) -> [u8; 4] {
        match self {
            Self::V1 => *b"COLL",
            Self::V2 => *b"COL\x02",
            Self::V3 => *b"COL\x03",
            Self::V4 => *b"COL\x04",
        }
    }
}

impl std::fmt::Display for ColVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let n = match self {
            Self::V1 => 1,
            Self::V2 => 2,
            Self::V3 => 3,
            Self::V4 => 4,
        };
        write!(f, "COL{n}")
    }
}

/// Three-component vector
#[derive(Debug, Clone, Copy, PartialEq, Default, BinRead, BinWrite)]
#[brw(little)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Construct from components
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Surface properties shared by spheres, boxes, and v1 faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
#[brw(little)]
pub struct Surface {
    /// Material index
    pub material: u8,
    /// Surface flag byte
    pub flag: u8,
    /// Brightness
    pub brightness: u8,
    /// Light index
    pub light: u8,
}

/// Collision sphere
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sphere {
    /// Center point
    pub center: Vec3,
    /// Radius
    pub radius: f32,
    /// Surface properties
    pub surface: Surface,
}

/// Axis-aligned collision box
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColBox {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
    /// Surface properties
    pub surface: Surface,
}

/// Collision mesh face: three vertex indices plus surface material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Face {
    /// First vertex index
    pub a: u32,
    /// Second vertex index
    pub b: u32,
    /// Third vertex index
    pub c: u32,
    /// Material index
    pub material: u8,
    /// Light index
    pub light: u8,
}

impl Face {
    /// Largest vertex index referenced by this face
    pub fn max_index(&self) -> u32 {
        self.a.max(self.b).max(self.c)
    }
}

/// Bounding volume of a collision model
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    /// Bounding sphere radius
    pub radius: f32,
    /// Bounding sphere center
    pub center: Vec3,
    /// Bounding box minimum corner
    pub min: Vec3,
    /// Bounding box maximum corner
    pub max: Vec3,
}

/// One collision model from a COL container
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionModel {
    /// Model name (up to 22 characters in the container)
    pub name: String,
    /// Model identifier (u16 on disk for v2+, u32 for v1)
    pub model_id: u32,
    /// Container version the model was read from
    pub version: ColVersion,
    /// Bounding volume
    pub bounds: Bounds,
    /// v2+ model flags (0 for v1)
    pub flags: u32,
    /// Collision spheres
    pub spheres: Vec<Sphere>,
    /// Collision boxes
    pub boxes: Vec<ColBox>,
    /// Mesh vertices
    pub vertices: Vec<Vec3>,
    /// Mesh faces
    pub faces: Vec<Face>,
    /// Bytes this model occupies on disk, FourCC and size field included
    pub stored_size: usize,
}

impl CollisionModel {
    /// Empty model of a given version, used when a body fails to decode
    pub fn empty(version: ColVersion, name: String, stored_size: usize) -> Self {
        Self {
            name,
            model_id: 0,
            version,
            bounds: Bounds::default(),
            flags: 0,
            spheres: Vec::new(),
            boxes: Vec::new(),
            vertices: Vec::new(),
            faces: Vec::new(),
            stored_size,
        }
    }

    /// Whether the model carries any spheres
    pub fn has_sphere_data(&self) -> bool {
        !self.spheres.is_empty()
    }

    /// Whether the model carries any boxes
    pub fn has_box_data(&self) -> bool {
        !self.boxes.is_empty()
    }

    /// Whether the model carries a face/vertex mesh
    pub fn has_mesh_data(&self) -> bool {
        !self.faces.is_empty() && !self.vertices.is_empty()
    }

    /// Indices of faces that reference a vertex past the end of the vertex
    /// array. Non-empty results indicate a corrupt or truncated mesh.
    pub fn face_index_violations(&self) -> Vec<usize> {
        let limit = self.vertices.len() as u32;
        self.faces
            .iter()
            .enumerate()
            .filter(|(_, face)| face.max_index() >= limit)
            .map(|(i, _)| i)
            .collect()
    }

    /// Total geometry element count, used for quick summaries
    pub fn element_count(&self) -> usize {
        self.spheres.len() + self.boxes.len() + self.faces.len()
    }
}

/// Result of scanning a COL container
#[derive(Debug, Clone, Default)]
pub struct ColFile {
    /// Models in container order
    pub models: Vec<CollisionModel>,
    /// Bytes consumed by recognized models
    pub consumed: usize,
    /// Bytes left after the last recognized model
    pub trailing: usize,
}

impl ColFile {
    /// Whether the whole input decoded as collision models
    pub fn is_fully_consumed(&self) -> bool {
        self.trailing == 0
    }
}
