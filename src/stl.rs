use std::io::Write;
use std::path::Path;

use crate::{
    datatypes::{StlEncoding, Surface, Triangle, Vertex},
    error::RegolithError,
};

const BINARY_HEADER_LEN: usize = 80;
const BINARY_FACET_LEN: usize = 50;

/// ASCII STL starts with a "solid" line followed by a facet or the closing
/// "endsolid". Binary headers may also start with "solid", hence the second
/// check on whatever follows the first line break.
fn is_ascii(data: &[u8]) -> bool {
    if !data.starts_with(b"solid") {
        return false;
    }
    let Some(line_end) = data.iter().position(|&b| b == b'\n') else {
        return false;
    };
    let body = &data[line_end + 1..];
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let body = &body[start..];
    body.starts_with(b"facet") || body.starts_with(b"endsolid")
}

fn parse_ascii(data: &[u8], path: &Path) -> Result<Surface, RegolithError> {
    let text = std::str::from_utf8(data).map_err(|_| {
        RegolithError::Input(format!("Invalid UTF-8 in ASCII STL {}", path.display()))
    })?;

    let mut name = String::new();
    let mut triangles = Vec::new();
    let mut pending: Vec<Vertex> = Vec::with_capacity(3);

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("solid") {
            name = rest.trim().to_owned();
        } else if let Some(rest) = line.strip_prefix("vertex") {
            let coords: Vec<f64> = rest
                .split_whitespace()
                .map(|c| c.parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|err| {
                    RegolithError::Input(format!(
                        "Non-float vertex coordinate in {} at line {}: {err}",
                        path.display(),
                        line_no + 1
                    ))
                })?;
            if coords.len() != 3 {
                return Err(RegolithError::Input(format!(
                    "Expected 3 vertex coordinates in {} at line {}",
                    path.display(),
                    line_no + 1
                )));
            }
            pending.push(Vertex::new(coords[0], coords[1], coords[2]));
        } else if line.starts_with("endfacet") {
            if pending.len() != 3 {
                return Err(RegolithError::Input(format!(
                    "Facet ending at line {} of {} has {} vertices",
                    line_no + 1,
                    path.display(),
                    pending.len()
                )));
            }
            triangles.push(Triangle {
                vertices: [pending[0], pending[1], pending[2]],
            });
            pending.clear();
        }
    }

    Ok(Surface {
        name,
        triangles,
        encoding: StlEncoding::Ascii,
    })
}

fn parse_binary(data: &[u8], path: &Path) -> Result<Surface, RegolithError> {
    if data.len() < BINARY_HEADER_LEN + 4 {
        return Err(RegolithError::Input(format!(
            "Binary STL {} is too short",
            path.display()
        )));
    }

    let header = &data[..BINARY_HEADER_LEN];
    let name = String::from_utf8_lossy(header)
        .trim_end_matches(['\0', ' '])
        .to_owned();

    let count_bytes = [data[80], data[81], data[82], data[83]];
    let facet_count = u32::from_le_bytes(count_bytes) as usize;
    let expected = BINARY_HEADER_LEN + 4 + facet_count * BINARY_FACET_LEN;
    if data.len() < expected {
        return Err(RegolithError::Input(format!(
            "Binary STL {} is truncated: {} facets need {expected} bytes, found {}",
            path.display(),
            facet_count,
            data.len()
        )));
    }

    let read_f32 = |offset: usize| -> f64 {
        f32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as f64
    };

    let mut triangles = Vec::with_capacity(facet_count);
    let mut offset = BINARY_HEADER_LEN + 4;
    for _ in 0..facet_count {
        // normal is recomputed on write, skip it
        let base = offset + 12;
        let mut vertices = [Vertex::zeros(); 3];
        for (i, vertex) in vertices.iter_mut().enumerate() {
            let v = base + i * 12;
            *vertex = Vertex::new(read_f32(v), read_f32(v + 4), read_f32(v + 8));
        }
        triangles.push(Triangle { vertices });
        offset += BINARY_FACET_LEN;
    }

    Ok(Surface {
        name,
        triangles,
        encoding: StlEncoding::Binary,
    })
}

/// Reads an ASCII or binary STL file
///
/// # Arguments
/// * `path` - The path to the STL file
///
/// # Returns
/// The parsed surface, remembering which encoding it was stored in
pub fn read(path: &Path) -> Result<Surface, RegolithError> {
    if !path.is_file() {
        return Err(RegolithError::MissingInputFile(path.to_path_buf()));
    }
    let data = std::fs::read(path).map_err(|err| RegolithError::io(path, err))?;

    let surface = if is_ascii(&data) {
        parse_ascii(&data, path)?
    } else {
        parse_binary(&data, path)?
    };

    if surface.vertices().any(|v| !v.iter().all(|c| c.is_finite())) {
        return Err(RegolithError::Input(format!(
            "STL {} contains non-finite vertex coordinates",
            path.display()
        )));
    }

    Ok(surface)
}

fn encode_ascii(surface: &Surface) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&format!("solid {}\n", surface.name));
    for triangle in &surface.triangles {
        let n = triangle.normal();
        out.push_str(&format!("  facet normal {:e} {:e} {:e}\n", n.x, n.y, n.z));
        out.push_str("    outer loop\n");
        for v in &triangle.vertices {
            out.push_str(&format!("      vertex {:e} {:e} {:e}\n", v.x, v.y, v.z));
        }
        out.push_str("    endloop\n");
        out.push_str("  endfacet\n");
    }
    out.push_str(&format!("endsolid {}\n", surface.name));
    out.into_bytes()
}

fn encode_binary(surface: &Surface) -> Vec<u8> {
    let mut data = Vec::with_capacity(BINARY_HEADER_LEN + 4 + surface.triangles.len() * BINARY_FACET_LEN);

    let mut header = [b' '; BINARY_HEADER_LEN];
    let name = surface.name.as_bytes();
    let name_len = name.len().min(BINARY_HEADER_LEN);
    header[..name_len].copy_from_slice(&name[..name_len]);
    data.extend_from_slice(&header);
    data.extend_from_slice(&(surface.triangles.len() as u32).to_le_bytes());

    for triangle in &surface.triangles {
        let n = triangle.normal();
        for c in n.iter().chain(triangle.vertices.iter().flat_map(|v| v.iter())) {
            data.extend_from_slice(&(*c as f32).to_le_bytes());
        }
        data.extend_from_slice(&0u16.to_le_bytes());
    }

    data
}

/// Writes a surface to disk in the encoding it was read with
///
/// # Arguments
/// * `surface` - The surface to write
/// * `path` - The output path; parent directories are created
pub fn write(surface: &Surface, path: &Path) -> Result<(), RegolithError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| RegolithError::io(parent, err))?;
    }

    let bytes = match surface.encoding {
        StlEncoding::Ascii => encode_ascii(surface),
        StlEncoding::Binary => encode_binary(surface),
    };

    let mut file = std::fs::File::create(path).map_err(|err| RegolithError::io(path, err))?;
    file.write_all(&bytes)
        .and_then(|_| file.flush())
        .map_err(|err| RegolithError::io(path, err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_surface(encoding: StlEncoding) -> Surface {
        Surface {
            name: "rock".to_owned(),
            triangles: vec![
                Triangle {
                    vertices: [
                        Vertex::new(0.0, 0.0, 0.0),
                        Vertex::new(1.0, 0.0, 0.0),
                        Vertex::new(0.0, 2.0, 0.0),
                    ],
                },
                Triangle {
                    vertices: [
                        Vertex::new(0.0, 0.0, 0.0),
                        Vertex::new(0.0, 2.0, 0.0),
                        Vertex::new(0.5, 0.5, 3.0),
                    ],
                },
            ],
            encoding,
        }
    }

    #[test]
    fn ascii_surface_survives_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rock.stl");
        let surface = sample_surface(StlEncoding::Ascii);

        write(&surface, &path).unwrap();
        let loaded = read(&path).unwrap();

        assert_eq!(loaded.encoding, StlEncoding::Ascii);
        assert_eq!(loaded.name, "rock");
        assert_eq!(loaded.triangles, surface.triangles);
    }

    #[test]
    fn binary_surface_survives_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/rock.stl");
        let surface = sample_surface(StlEncoding::Binary);

        write(&surface, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 84 + 2 * 50);

        let loaded = read(&path).unwrap();
        assert_eq!(loaded.encoding, StlEncoding::Binary);
        assert_eq!(loaded.triangles, surface.triangles);
    }

    #[test]
    fn binary_header_starting_with_solid_is_not_ascii() {
        let mut surface = sample_surface(StlEncoding::Binary);
        surface.name = "solid body".to_owned();
        let bytes = encode_binary(&surface);
        assert!(!is_ascii(&bytes));
    }

    #[test]
    fn long_ascii_header_is_still_ascii() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("long.stl");
        let mut surface = sample_surface(StlEncoding::Ascii);
        surface.name = "x".repeat(2000);
        write(&surface, &path).unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!(loaded.encoding, StlEncoding::Ascii);
        assert_eq!(loaded.triangles, surface.triangles);
        assert!(is_ascii(b"solid empty\nendsolid empty\n"));
    }

    #[test]
    fn truncated_binary_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.stl");
        let mut bytes = encode_binary(&sample_surface(StlEncoding::Binary));
        bytes.truncate(120);
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(read(&path), Err(RegolithError::Input(_))));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempdir().unwrap();
        let err = read(&dir.path().join("nope.stl")).unwrap_err();
        assert!(matches!(err, RegolithError::MissingInputFile(_)));
    }
}
