use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::{
    datatypes::{Source, Station},
    error::RegolithError,
    notation::real,
};

/// Angular step between neighbouring stations, in degrees
pub const STATION_STEP_DEG: f64 = 5.0;
/// Size of the angle table, 0 to 360 degrees inclusive
pub const STATION_ANGLE_SAMPLES: usize = 73;
/// Polar angle of every station, i.e. the equatorial plane
pub const STATION_POLAR_DEG: f64 = 90.0;

const EVENT_NAME: &str = "Asteroid_forward";

fn write_text(path: &Path, contents: &str) -> Result<(), RegolithError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| RegolithError::io(parent, err))?;
    }
    std::fs::write(path, contents).map_err(|err| RegolithError::io(path, err))
}

/// Renders the CMTSOLUTION text. The position appears twice, as
/// latitude/longitude/depth on the event line and as labeled lines, since
/// different readers pick it up from different places.
pub fn render_source(source: &Source) -> String {
    let p = &source.position;
    let mut out = format!(
        "PDE 2024 1 1 1 1 1 {:>10.6} {:>10.6} {:>10.6} 0 0 {EVENT_NAME} \n",
        p.y, p.x, p.z
    );
    out.push_str(&format!("event name:       {EVENT_NAME} \n"));
    out.push_str("time shift:       0.0000\n");
    out.push_str(&format!("f0:       {:>10.6}\n", source.frequency));
    out.push_str(&format!("latorUTM:       {:>10.6}\n", p.y));
    out.push_str(&format!("longorUTM:       {:>10.6}\n", p.x));
    out.push_str(&format!("depth:       {:>10.6}\n", p.z));
    for (label, value) in source.moment_tensor.labeled() {
        out.push_str(&format!("{label}:       {:>10.6}\n", value));
    }
    out
}

/// Writes the source description to `path`
pub fn place_source(source: &Source, path: &Path) -> Result<(), RegolithError> {
    write_text(path, &render_source(source))?;
    info!("event file created: {}", path.display());
    Ok(())
}

/// Two letter network code for a station ordinal: 0 -> AA, 25 -> AZ, 26 -> BA
pub fn network_code(index: usize) -> String {
    let first = (b'A' + ((index / 26) % 26) as u8) as char;
    let second = (b'A' + (index % 26) as u8) as char;
    format!("{first}{second}")
}

/// Places `count` stations on a horizontal circle of `radius` in 5 degree
/// steps. Counts past the 73 entry angle table wrap around it.
pub fn layout_stations(radius: f64, count: usize) -> Vec<Station> {
    let theta = STATION_POLAR_DEG.to_radians();
    (0..count)
        .map(|i| {
            let phi = ((i % STATION_ANGLE_SAMPLES) as f64 * STATION_STEP_DEG).to_radians();
            Station {
                name: format!("X{}", i + 1),
                network: network_code(i),
                x: radius * theta.sin() * phi.cos(),
                y: radius * theta.sin() * phi.sin(),
                z: 0.0,
            }
        })
        .collect()
}

/// One `name network y x 0.0 z` row per station
pub fn render_stations(stations: &[Station]) -> String {
    stations
        .iter()
        .map(|s| {
            format!(
                "{} {} {} {} 0.0 {}\n",
                s.name,
                s.network,
                real(s.y),
                real(s.x),
                real(s.z)
            )
        })
        .collect()
}

/// Lays out the receiver ring and writes it to `path`
pub fn place_stations(radius: f64, count: usize, path: &Path) -> Result<Vec<Station>, RegolithError> {
    if count > STATION_ANGLE_SAMPLES {
        warn!(
            "{} stations requested, angles repeat after {}",
            count, STATION_ANGLE_SAMPLES
        );
    }
    let stations = layout_stations(radius, count);
    write_text(path, &render_stations(&stations))?;
    info!("station file written to: {}", path.display());
    Ok(stations)
}

/// Reads a station file back. Rows without six columns or with bad
/// coordinates are skipped with a warning.
pub fn read_stations(path: &Path) -> Result<Vec<Station>, RegolithError> {
    if !path.is_file() {
        return Err(RegolithError::MissingInputFile(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path).map_err(|err| RegolithError::io(path, err))?;

    let mut stations = Vec::new();
    for line in contents.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 6 {
            if !parts.is_empty() {
                warn!("skipping station row with {} columns: {}", parts.len(), line.trim());
            }
            continue;
        }
        let parsed: Result<Vec<f64>, _> = [parts[2], parts[3], parts[5]].iter().map(|p| p.parse::<f64>()).collect();
        match parsed {
            Ok(c) => stations.push(Station {
                name: parts[0].to_owned(),
                network: parts[1].to_owned(),
                y: c[0],
                x: c[1],
                z: c[2],
            }),
            Err(_) => warn!("invalid coordinate values in station row: {}", line.trim()),
        }
    }

    Ok(stations)
}

/// Lists the seismograms the solver should have written for `stations` but
/// that are absent from `output_dir`
pub fn missing_traces(stations: &[Station], component: &str, output_dir: &Path) -> Vec<PathBuf> {
    stations
        .iter()
        .map(|s| output_dir.join(s.trace_file_name(component)))
        .filter(|p| !p.is_file())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::{MomentTensor, Vertex};
    use tempfile::tempdir;

    fn source() -> Source {
        Source {
            position: Vertex::new(0.0, 500.0, 0.0),
            frequency: 0.02,
            moment_tensor: MomentTensor::from_components([1.5, -2.25, 0.0, 0.0, 0.0, 1.0]),
        }
    }

    #[test]
    fn source_layout() {
        let text = render_source(&source());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 13);
        assert_eq!(
            lines[0],
            "PDE 2024 1 1 1 1 1 500.000000   0.000000   0.000000 0 0 Asteroid_forward "
        );
        assert_eq!(lines[1], "event name:       Asteroid_forward ");
        assert_eq!(lines[2], "time shift:       0.0000");
        assert_eq!(lines[3], "f0:         0.020000");
        assert_eq!(lines[4], "latorUTM:       500.000000");
        assert_eq!(lines[5], "longorUTM:         0.000000");
        assert_eq!(lines[6], "depth:         0.000000");
        assert_eq!(lines[7], "Mrr:         1.500000");
        assert_eq!(lines[8], "Mtt:        -2.250000");
        assert_eq!(lines[12], "Mtp:         1.000000");
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn network_codes_follow_ordinal() {
        assert_eq!(network_code(0), "AA");
        assert_eq!(network_code(18), "AS");
        assert_eq!(network_code(25), "AZ");
        assert_eq!(network_code(26), "BA");
        assert_eq!(network_code(36), "BK");
        assert_eq!(network_code(54), "CC");
        assert_eq!(network_code(71), "CT");
    }

    #[test]
    fn stations_sit_on_the_circle() {
        let stations = layout_stations(800.0, 72);
        assert_eq!(stations.len(), 72);

        for (i, s) in stations.iter().enumerate() {
            assert!((s.x.hypot(s.y) - 800.0).abs() < 1e-9);
            assert_eq!(s.z, 0.0);
            assert_eq!(s.name, format!("X{}", i + 1));
            assert_eq!(s.network, network_code(i));
        }
        assert_eq!((stations[0].x, stations[0].y), (800.0, 0.0));
        assert!((stations[18].x).abs() < 1e-9);
        assert!((stations[18].y - 800.0).abs() < 1e-9);
    }

    #[test]
    fn station_rows_swap_x_and_y() {
        let text = render_stations(&layout_stations(800.0, 72));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 72);
        assert_eq!(lines[0], "X1 AA 0.0 800.0 0.0 0.0");
        let cols: Vec<&str> = lines[18].split(' ').collect();
        assert_eq!(&cols[..2], &["X19", "AS"]);
        assert_eq!(cols[2].parse::<f64>().unwrap(), 800.0);
        assert!(cols[3].parse::<f64>().unwrap().abs() < 1e-9);
    }

    #[test]
    fn counts_past_the_table_repeat_angles() {
        let stations = layout_stations(10.0, 75);
        assert_eq!(stations[73].x, stations[0].x);
        assert_eq!(stations[73].y, stations[0].y);
        assert_eq!(stations[74].name, "X75");
    }

    #[test]
    fn stations_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("DATA/STATIONS");
        let written = place_stations(800.0, 72, &path).unwrap();

        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("garbage row\n");
        std::fs::write(&path, contents).unwrap();

        let read = read_stations(&path).unwrap();
        assert_eq!(read, written);
    }

    #[test]
    fn missing_traces_are_listed() {
        let dir = tempdir().unwrap();
        let stations = layout_stations(800.0, 3);
        std::fs::write(dir.path().join("AA.X1.FXZ.semd"), "0.0 0.0\n").unwrap();

        let missing = missing_traces(&stations, "FXZ", dir.path());
        assert_eq!(
            missing,
            vec![dir.path().join("AB.X2.FXZ.semd"), dir.path().join("AC.X3.FXZ.semd")]
        );
    }

    #[test]
    fn source_file_is_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("DATA/CMTSOLUTION");
        place_source(&source(), &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), render_source(&source()));
    }
}
