use std::io::{BufWriter, Write};
use std::path::Path;

use indicatif::ProgressBar;
use log::{info, warn};

use crate::{
    datatypes::{GridDimensions, MaterialParameters, Vertex},
    error::RegolithError,
    notation::real,
};

/// Lays out the sampling grid for a domain centered on the origin
///
/// # Arguments
/// * `length`, `width`, `height` - Domain extents along x, y and z
/// * `spacing` - Distance between samples on every axis
///
/// # Returns
/// The grid origin, far corner and per-axis sample counts
pub fn grid_dimensions(length: f64, width: f64, height: f64, spacing: f64) -> Result<GridDimensions, RegolithError> {
    if !(spacing.is_finite() && spacing > 0.0) {
        return Err(RegolithError::InvalidSpacing(spacing));
    }

    let count = |extent: f64| -> usize {
        let n = (extent / spacing).ceil();
        if n.is_finite() && n > 0.0 {
            n as usize
        } else {
            0
        }
    };
    let (nx, ny, nz) = (count(length), count(width), count(height));
    if nx == 0 || ny == 0 || nz == 0 {
        return Err(RegolithError::DegenerateGrid { nx, ny, nz });
    }

    Ok(GridDimensions {
        origin: Vertex::new(-length / 2.0, -width / 2.0, -height / 2.0),
        end: Vertex::new(length / 2.0, width / 2.0, height / 2.0),
        spacing,
        nx,
        ny,
        nz,
    })
}

fn header(grid: &GridDimensions, material: &MaterialParameters) -> String {
    let s = real(grid.spacing);
    format!(
        "{} {} {} {} {} {}\n{s} {s} {s}\n{} {} {}\n{} {} {} {} {} {}\n",
        real(grid.origin.x),
        real(grid.origin.y),
        real(grid.origin.z),
        real(grid.end.x),
        real(grid.end.y),
        real(grid.end.z),
        grid.nx,
        grid.ny,
        grid.nz,
        real(material.vp_min),
        real(material.vp_max),
        real(material.vs_min),
        real(material.vs_max),
        real(material.rho),
        real(material.rho),
    )
}

/// Streams the model: a four line header followed by one `x y z vp vs rho`
/// row per sample, z outermost and x innermost. Rows are newline separated
/// with no newline after the last one.
///
/// # Returns
/// The number of samples whose vp or vs fell outside the declared bounds
pub fn write_model<W: Write>(writer: &mut W, grid: &GridDimensions, material: &MaterialParameters) -> std::io::Result<usize> {
    writer.write_all(header(grid, material).as_bytes())?;

    let rho = real(material.rho);
    let mut out_of_bounds = 0;
    let mut first = true;

    let bar = ProgressBar::new(grid.nz as u64);
    for k in 0..grid.nz {
        let z = grid.origin.z + k as f64 * grid.spacing;
        let vp = material.vp_min + material.gradient * z;
        let vs = material.vs_min + material.gradient * z;
        if vp < material.vp_min || vp > material.vp_max || vs < material.vs_min || vs > material.vs_max {
            out_of_bounds += grid.nx * grid.ny;
        }
        let (vp, vs) = (real(vp), real(vs));

        for j in 0..grid.ny {
            let y = real(grid.origin.y + j as f64 * grid.spacing);
            for i in 0..grid.nx {
                let x = grid.origin.x + i as f64 * grid.spacing;
                if !first {
                    writer.write_all(b"\n")?;
                }
                first = false;
                write!(writer, "{} {} {} {} {} {}", real(x), y, real(z), vp, vs, rho)?;
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    Ok(out_of_bounds)
}

/// Builds the tomography model for the given domain and writes it to `path`
///
/// Velocities grow linearly with z by `material.gradient`. The declared
/// maxima are recorded in the header but not enforced on samples.
pub fn build(
    length: f64,
    width: f64,
    height: f64,
    spacing: f64,
    material: &MaterialParameters,
    path: &Path,
) -> Result<GridDimensions, RegolithError> {
    let grid = grid_dimensions(length, width, height, spacing)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| RegolithError::io(parent, err))?;
    }
    let file = std::fs::File::create(path).map_err(|err| RegolithError::io(path, err))?;
    let mut writer = BufWriter::new(file);

    let out_of_bounds = write_model(&mut writer, &grid, material)
        .and_then(|n| writer.flush().map(|_| n))
        .map_err(|err| RegolithError::io(path, err))?;

    if out_of_bounds > 0 {
        warn!(
            "{} of {} samples have vp/vs outside [{}, {}]/[{}, {}] with gradient {}",
            out_of_bounds,
            grid.sample_count(),
            material.vp_min,
            material.vp_max,
            material.vs_min,
            material.vs_max,
            material.gradient
        );
    }
    info!(
        "created tomography model {} ({} x {} x {} samples)",
        path.display(),
        grid.nx,
        grid.ny,
        grid.nz
    );

    Ok(grid)
}
