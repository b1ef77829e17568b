use nalgebra::Vector3;

pub type Vertex = Vector3<f64>;

/// Padding applied to raw extents before rounding the simulation domain up
pub const DOMAIN_PADDING: f64 = 1.2;
/// The simulation domain is rounded up to a multiple of this
pub const DOMAIN_ROUNDING: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StlEncoding {
    Ascii,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    pub vertices: [Vertex; 3],
}

impl Triangle {
    /// Unit normal following the right-hand rule, or +z for degenerate facets
    pub fn normal(&self) -> Vertex {
        let [v0, v1, v2] = &self.vertices;
        let n = (v1 - v0).cross(&(v2 - v0));
        let len = n.norm();
        if len > 1e-12 {
            n / len
        } else {
            Vertex::new(0.0, 0.0, 1.0)
        }
    }
}

/// A triangulated surface as read from an STL file
#[derive(Debug, Clone)]
pub struct Surface {
    pub name: String,
    pub triangles: Vec<Triangle>,
    pub encoding: StlEncoding,
}

impl Surface {
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.triangles.iter().flat_map(|t| t.vertices.iter())
    }

    pub fn vertices_mut(&mut self) -> impl Iterator<Item = &mut Vertex> {
        self.triangles.iter_mut().flat_map(|t| t.vertices.iter_mut())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vertex,
    pub max: Vertex,
    pub dimensions: Vertex,
    /// Padded extent along x, equal to `width`
    pub length: f64,
    /// Padded extent along y, equal to `length`
    pub width: f64,
    /// Padded extent along z
    pub height: f64,
}

impl BoundingBox {
    pub fn from_extremes(min: Vertex, max: Vertex) -> BoundingBox {
        let dimensions = max - min;
        let length_width = padded_extent(dimensions.x.max(dimensions.y));
        BoundingBox {
            min,
            max,
            dimensions,
            length: length_width,
            width: length_width,
            height: padded_extent(dimensions.z),
        }
    }

    pub fn center(&self) -> Vertex {
        (self.min + self.max) / 2.0
    }
}

/// `ceil(extent * 1.2 / 10) * 10`
pub fn padded_extent(extent: f64) -> f64 {
    (extent * DOMAIN_PADDING / DOMAIN_ROUNDING).ceil() * DOMAIN_ROUNDING
}

/// Velocity and density bounds of the background model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialParameters {
    pub vp_min: f64,
    pub vp_max: f64,
    pub vs_min: f64,
    pub vs_max: f64,
    pub rho: f64,
    /// Velocity change per unit of z
    pub gradient: f64,
}

/// Summary of a written tomography model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridDimensions {
    pub origin: Vertex,
    pub end: Vertex,
    pub spacing: f64,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl GridDimensions {
    pub fn sample_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }
}

/// Symmetric moment tensor in (Mrr, Mtt, Mpp, Mrt, Mrp, Mtp) order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentTensor {
    pub mrr: f64,
    pub mtt: f64,
    pub mpp: f64,
    pub mrt: f64,
    pub mrp: f64,
    pub mtp: f64,
}

impl MomentTensor {
    pub fn from_components(m: [f64; 6]) -> MomentTensor {
        MomentTensor {
            mrr: m[0],
            mtt: m[1],
            mpp: m[2],
            mrt: m[3],
            mrp: m[4],
            mtp: m[5],
        }
    }

    pub fn labeled(&self) -> [(&'static str, f64); 6] {
        [
            ("Mrr", self.mrr),
            ("Mtt", self.mtt),
            ("Mpp", self.mpp),
            ("Mrt", self.mrt),
            ("Mrp", self.mrp),
            ("Mtp", self.mtp),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Source {
    /// x is written as longitude, y as latitude, z as depth
    pub position: Vertex,
    /// Dominant frequency in Hz
    pub frequency: f64,
    pub moment_tensor: MomentTensor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub name: String,
    pub network: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Station {
    /// Seismogram file the solver writes for this station,
    /// e.g. `AA.X1.FXZ.semd`
    pub fn trace_file_name(&self, component: &str) -> String {
        format!("{}.{}.{}.semd", self.network, self.name, component)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Bool(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::Text(v.to_owned())
    }
}
