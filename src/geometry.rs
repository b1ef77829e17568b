use std::path::{Path, PathBuf};

use log::info;

use crate::{
    config::Workspace,
    datatypes::{BoundingBox, StlEncoding, Surface, Vertex},
    error::RegolithError,
    notation, stl,
};

const REPORT_RULE: &str = "*******************************************************************";

/// Result of scaling and recentering a surface file
#[derive(Debug, Clone)]
pub struct Normalized {
    pub original: BoundingBox,
    pub scaled: BoundingBox,
    pub stl_path: PathBuf,
}

/// Computes the axis-aligned bounds of a surface in a single pass
pub fn compute_bounds(surface: &Surface) -> Result<BoundingBox, RegolithError> {
    if surface.triangles.is_empty() {
        return Err(RegolithError::EmptyGeometry);
    }

    let mut min = Vertex::repeat(f64::INFINITY);
    let mut max = Vertex::repeat(f64::NEG_INFINITY);
    for v in surface.vertices() {
        min = min.inf(v);
        max = max.sup(v);
    }

    Ok(BoundingBox::from_extremes(min, max))
}

/// Scales every vertex by `scale_factor` and moves the bounding box center
/// to the origin. Returns the bounds after the transformation.
pub fn scale_and_center(surface: &mut Surface, scale_factor: f64) -> Result<BoundingBox, RegolithError> {
    if !(scale_factor.is_finite() && scale_factor > 0.0) {
        return Err(RegolithError::InvalidScale(scale_factor));
    }

    for v in surface.vertices_mut() {
        *v *= scale_factor;
    }

    let center = compute_bounds(surface)?.center();
    for v in surface.vertices_mut() {
        *v -= center;
    }

    compute_bounds(surface)
}

/// Path of the normalized copy, e.g. `model/Phobos.stl` -> `model/Phobos_zoom18.0.stl`
pub fn scaled_path(stl_path: &Path, scale_factor: f64) -> PathBuf {
    let stem = stl_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = format!("{}_zoom{}.stl", stem, notation::real(scale_factor));
    stl_path.with_file_name(file_name)
}

fn coords(v: &Vertex) -> String {
    format!(
        "[{} {} {}]",
        notation::real(v.x),
        notation::real(v.y),
        notation::real(v.z)
    )
}

fn describe(bbox: &BoundingBox, label: &str, path: &Path) -> String {
    format!(
        "{label}: {path}\n\
         Min coords: {min}, Max coords: {max}\n\
         Dimensions (LxWxH): {dx} x {dy} x {dz} \n\
         Bounding box (LxWxH): {l} x {w} x {h}\n",
        path = path.display(),
        min = coords(&bbox.min),
        max = coords(&bbox.max),
        dx = notation::real(bbox.dimensions.x),
        dy = notation::real(bbox.dimensions.y),
        dz = notation::real(bbox.dimensions.z),
        l = bbox.length,
        w = bbox.width,
        h = bbox.height,
    )
}

/// Renders the details report comparing the original and scaled surfaces
pub fn details_report(normalized: &Normalized, source: &Path, scale_factor: f64) -> String {
    let mut report = String::new();
    report.push_str(REPORT_RULE);
    report.push('\n');
    report.push_str(&describe(&normalized.original, "Original STL", source));
    report.push_str(REPORT_RULE);
    report.push('\n');
    report.push_str(&format!("Scale_factor: {}\n", notation::real(scale_factor)));
    report.push_str(REPORT_RULE);
    report.push('\n');
    report.push_str(&describe(&normalized.scaled, "Scaled STL", &normalized.stl_path));
    report
}

/// Loads a surface, scales and recenters it, writes the result next to the
/// input and overwrites the workspace details report
///
/// # Arguments
/// * `stl_path` - The input STL file, never modified
/// * `scale_factor` - Uniform scale, must be positive
/// * `workspace` - Provides the details report location
pub fn normalize(stl_path: &Path, scale_factor: f64, workspace: &Workspace) -> Result<Normalized, RegolithError> {
    if !(scale_factor.is_finite() && scale_factor > 0.0) {
        return Err(RegolithError::InvalidScale(scale_factor));
    }

    let mut surface = stl::read(stl_path)?;
    let original = compute_bounds(&surface)?;
    let mut scaled = scale_and_center(&mut surface, scale_factor)?;
    if surface.encoding == StlEncoding::Binary {
        // bounds of what lands on disk, binary facets only hold f32
        for vertex in surface.vertices_mut() {
            *vertex = vertex.map(|c| c as f32 as f64);
        }
        scaled = compute_bounds(&surface)?;
    }

    let output = scaled_path(stl_path, scale_factor);
    stl::write(&surface, &output)?;

    let normalized = Normalized {
        original,
        scaled,
        stl_path: output,
    };

    let report_path = workspace.details_report();
    if let Some(parent) = report_path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| RegolithError::io(parent, err))?;
    }
    std::fs::write(&report_path, details_report(&normalized, stl_path, scale_factor))
        .map_err(|err| RegolithError::io(&report_path, err))?;

    info!(
        "original dimensions {} x {} x {}, scaled dimensions {} x {} x {}",
        original.dimensions.x,
        original.dimensions.y,
        original.dimensions.z,
        scaled.dimensions.x,
        scaled.dimensions.y,
        scaled.dimensions.z
    );
    info!(
        "simulation domain (LxWxH): {} x {} x {}",
        scaled.length, scaled.width, scaled.height
    );
    info!("wrote scaled surface to {}", normalized.stl_path.display());

    Ok(normalized)
}
