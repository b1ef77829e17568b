use std::path::{Path, PathBuf};

use json::JsonValue;

use crate::{
    datatypes::{MaterialParameters, MomentTensor, ParameterValue, Source, Vertex},
    error::RegolithError,
};

pub const DEFAULT_STATION_COUNT: usize = 72;

/// Every artifact location used by a run, derived from a single root
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Workspace {
        Workspace { root: root.into() }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("DATA")
    }

    pub fn par_file(&self) -> PathBuf {
        self.data_dir().join("Par_file")
    }

    pub fn source_file(&self) -> PathBuf {
        self.data_dir().join("CMTSOLUTION")
    }

    pub fn stations_file(&self) -> PathBuf {
        self.data_dir().join("STATIONS")
    }

    pub fn tomography_file(&self) -> PathBuf {
        self.data_dir().join("tomo_files").join("tomography_model.xyz")
    }

    pub fn mesh_dir(&self) -> PathBuf {
        self.root.join("MESH")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("OUTPUT_FILES")
    }

    pub fn wave_field_dir(&self) -> PathBuf {
        self.root.join("Visualization").join("wave_field")
    }

    pub fn details_report(&self) -> PathBuf {
        self.root.join("model").join("stl_details.txt")
    }

    /// Resolves a path from a config or Par_file against the root
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometryConfig {
    pub stl_file: PathBuf,
    pub scale_factor: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationConfig {
    pub radius: f64,
    pub count: usize,
}

/// Locations of the external meshing and solver tools
#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfig {
    pub python: String,
    pub cubit_path: PathBuf,
    pub geocubit_path: PathBuf,
    pub specfem_bin: PathBuf,
    pub mpirun: String,
}

/// Iterations whose velocity snapshots are combined after the solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotConfig {
    pub start: usize,
    pub stop: usize,
    pub step: usize,
}

impl SnapshotConfig {
    pub fn iterations(&self) -> impl Iterator<Item = usize> {
        (self.start..=self.stop).step_by(self.step.max(1))
    }
}

/// A complete run description
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub geometry: GeometryConfig,
    pub element_size: f64,
    pub material: MaterialParameters,
    pub source: Source,
    pub stations: StationConfig,
    pub par_file: Vec<(String, ParameterValue)>,
    pub tools: Option<ToolConfig>,
    pub snapshots: Option<SnapshotConfig>,
}

fn missing(section: &str, field: &str) -> RegolithError {
    RegolithError::Input(format!("Input json missing {field} field in {section} section"))
}

fn require_f64(json: &JsonValue, section: &str, field: &str) -> Result<f64, RegolithError> {
    if !json[section].has_key(field) {
        return Err(missing(section, field));
    }
    json[section][field].as_f64().ok_or_else(|| {
        RegolithError::Input(format!("Bad value for {field} in {section}: expected a number"))
    })
}

fn require_str(json: &JsonValue, section: &str, field: &str) -> Result<String, RegolithError> {
    if !json[section].has_key(field) {
        return Err(missing(section, field));
    }
    json[section][field]
        .as_str()
        .map(|s| s.to_owned())
        .ok_or_else(|| RegolithError::Input(format!("Bad value for {field} in {section}: expected a string")))
}

fn require_array<const N: usize>(json: &JsonValue, section: &str, field: &str) -> Result<[f64; N], RegolithError> {
    if !json[section].has_key(field) {
        return Err(missing(section, field));
    }
    let array = &json[section][field];
    let bad = || RegolithError::Input(format!("Bad value for {field} in {section}: expected {} numbers", N));
    if !array.is_array() || array.len() != N {
        return Err(bad());
    }
    let mut out = [0.0; N];
    for (slot, member) in out.iter_mut().zip(array.members()) {
        *slot = member.as_f64().ok_or_else(bad)?;
    }
    Ok(out)
}

/// Converts a Par_file override. JSON numbers written with a fraction or
/// exponent become floats, plain integers stay integers.
fn parameter_value(key: &str, value: &JsonValue) -> Result<ParameterValue, RegolithError> {
    if let Some(b) = value.as_bool() {
        return Ok(ParameterValue::Bool(b));
    }
    if let Some(s) = value.as_str() {
        return Ok(ParameterValue::Text(s.to_owned()));
    }
    if value.is_number() {
        let literal = value.dump();
        let is_float = literal.contains(['.', 'e', 'E']);
        if !is_float {
            if let Ok(i) = literal.parse::<i64>() {
                return Ok(ParameterValue::Int(i));
            }
        }
        if let Some(f) = value.as_f64() {
            return Ok(ParameterValue::Float(f));
        }
    }
    Err(RegolithError::Input(format!(
        "Unsupported value for Par_file parameter {key}: {}",
        value.dump()
    )))
}

/// Loads the run description and checks the required sections up-front
pub fn load_input_file(input_file: &Path) -> Result<JsonValue, RegolithError> {
    if !input_file.is_file() {
        return Err(RegolithError::MissingInputFile(input_file.to_path_buf()));
    }
    let file_string = std::fs::read_to_string(input_file).map_err(|err| RegolithError::io(input_file, err))?;

    let input_file_json = match json::parse(&file_string) {
        Ok(v) => v,
        Err(err) => return Err(RegolithError::Input(format!("Error in input file json: {err}"))),
    };

    for section in ["geometry", "mesh", "model", "source", "stations"] {
        if !input_file_json.has_key(section) {
            return Err(RegolithError::Input(format!("Input json missing {section} section")));
        }
    }

    Ok(input_file_json)
}

/// Parses a [`RunConfig`] from the input json
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
/// * `workspace` - Relative paths in the input are resolved against its root
pub fn parse_run_config(input_json: &JsonValue, workspace: &Workspace) -> Result<RunConfig, RegolithError> {
    let geometry = GeometryConfig {
        stl_file: workspace.resolve(require_str(input_json, "geometry", "stl_file")?),
        scale_factor: require_f64(input_json, "geometry", "scale_factor")?,
    };

    let element_size = require_f64(input_json, "mesh", "element_size")?;

    let material = MaterialParameters {
        vp_min: require_f64(input_json, "model", "vp_min")?,
        vp_max: require_f64(input_json, "model", "vp_max")?,
        vs_min: require_f64(input_json, "model", "vs_min")?,
        vs_max: require_f64(input_json, "model", "vs_max")?,
        rho: require_f64(input_json, "model", "rho")?,
        gradient: if input_json["model"].has_key("gradient") {
            require_f64(input_json, "model", "gradient")?
        } else {
            0.0
        },
    };

    let [x, y, z] = require_array::<3>(input_json, "source", "position")?;
    let source = Source {
        position: Vertex::new(x, y, z),
        frequency: require_f64(input_json, "source", "f0")?,
        moment_tensor: MomentTensor::from_components(require_array::<6>(input_json, "source", "moment_tensor")?),
    };

    let stations = StationConfig {
        radius: require_f64(input_json, "stations", "radius")?,
        count: if input_json["stations"].has_key("count") {
            input_json["stations"]["count"].as_usize().ok_or_else(|| {
                RegolithError::Input("Bad value for count in stations: expected a non-negative integer".to_owned())
            })?
        } else {
            DEFAULT_STATION_COUNT
        },
    };

    let mut par_file = Vec::new();
    for (key, value) in input_json["par_file"].entries() {
        par_file.push((key.to_owned(), parameter_value(key, value)?));
    }

    let tools = if input_json.has_key("tools") {
        let tools = &input_json["tools"];
        Some(ToolConfig {
            python: tools["python"].as_str().unwrap_or("python3").to_owned(),
            cubit_path: PathBuf::from(require_str(input_json, "tools", "cubit_path")?),
            geocubit_path: PathBuf::from(require_str(input_json, "tools", "geocubit_path")?),
            specfem_bin: PathBuf::from(require_str(input_json, "tools", "specfem_bin")?),
            mpirun: tools["mpirun"].as_str().unwrap_or("mpirun").to_owned(),
        })
    } else {
        None
    };

    let snapshots = if input_json.has_key("snapshots") {
        let read = |field: &str| -> Result<usize, RegolithError> {
            input_json["snapshots"][field]
                .as_usize()
                .ok_or_else(|| missing("snapshots", field))
        };
        let snapshots = SnapshotConfig {
            start: read("start")?,
            stop: read("stop")?,
            step: read("step")?,
        };
        if snapshots.step == 0 {
            return Err(RegolithError::Input("Snapshot step must be positive".to_owned()));
        }
        Some(snapshots)
    } else {
        None
    };

    Ok(RunConfig {
        geometry,
        element_size,
        material,
        source,
        stations,
        par_file,
        tools,
        snapshots,
    })
}

/// Loads and parses a run description in one step
pub fn load(input_file: &Path, workspace: &Workspace) -> Result<RunConfig, RegolithError> {
    let input_json = load_input_file(input_file)?;
    parse_run_config(&input_json, workspace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"{
        "geometry": { "stl_file": "model/Phobos.stl", "scale_factor": 18.0 },
        "mesh": { "element_size": 40 },
        "model": {
            "vp_min": 5400, "vp_max": 6600,
            "vs_min": 3300, "vs_max": 4200,
            "rho": 2400, "gradient": 0.0
        },
        "source": {
            "position": [0.0, 500.0, 0.0],
            "f0": 0.02,
            "moment_tensor": [1.0e+23, 1.0e+23, 1.0e+23, 0.0, 0.0, 0.0]
        },
        "stations": { "radius": 800 },
        "par_file": { "NPROC": 1, "NSTEP": 8000, "DT": 1e-4, "GPU_MODE": true, "MODEL": "tomo" },
        "tools": {
            "cubit_path": "/opt/cubit/bin",
            "geocubit_path": "/opt/specfem3d/CUBIT_GEOCUBIT/geocubitlib",
            "specfem_bin": "/opt/specfem3d/bin"
        },
        "snapshots": { "start": 100, "stop": 2000, "step": 100 }
    }"#;

    #[test]
    fn workspace_layout() {
        let ws = Workspace::new("/run");
        assert_eq!(ws.par_file(), PathBuf::from("/run/DATA/Par_file"));
        assert_eq!(ws.tomography_file(), PathBuf::from("/run/DATA/tomo_files/tomography_model.xyz"));
        assert_eq!(ws.stations_file(), PathBuf::from("/run/DATA/STATIONS"));
        assert_eq!(ws.source_file(), PathBuf::from("/run/DATA/CMTSOLUTION"));
        assert_eq!(ws.resolve("./OUTPUT_FILES/DATABASES_MPI"), PathBuf::from("/run/./OUTPUT_FILES/DATABASES_MPI"));
        assert_eq!(ws.resolve("/scratch/db"), PathBuf::from("/scratch/db"));
    }

    #[test]
    fn parses_full_run_config() {
        let ws = Workspace::new("/run");
        let config = parse_run_config(&json::parse(SAMPLE).unwrap(), &ws).unwrap();

        assert_eq!(config.geometry.stl_file, PathBuf::from("/run/model/Phobos.stl"));
        assert_eq!(config.geometry.scale_factor, 18.0);
        assert_eq!(config.element_size, 40.0);
        assert_eq!(config.material.vs_max, 4200.0);
        assert_eq!(config.source.position, Vertex::new(0.0, 500.0, 0.0));
        assert_eq!(config.source.moment_tensor.mpp, 1.0e23);
        assert_eq!(config.stations.count, DEFAULT_STATION_COUNT);
        assert_eq!(
            config.par_file,
            vec![
                ("NPROC".to_owned(), ParameterValue::Int(1)),
                ("NSTEP".to_owned(), ParameterValue::Int(8000)),
                ("DT".to_owned(), ParameterValue::Float(1e-4)),
                ("GPU_MODE".to_owned(), ParameterValue::Bool(true)),
                ("MODEL".to_owned(), ParameterValue::Text("tomo".to_owned())),
            ]
        );
        let tools = config.tools.unwrap();
        assert_eq!(tools.python, "python3");
        assert_eq!(tools.mpirun, "mpirun");
        assert_eq!(config.snapshots.unwrap().iterations().count(), 20);
    }

    #[test]
    fn missing_field_is_named() {
        let ws = Workspace::new("/run");
        let mut input = json::parse(SAMPLE).unwrap();
        input["model"].remove("rho");

        let err = parse_run_config(&input, &ws).unwrap_err();
        assert_eq!(err.to_string(), "Input error: Input json missing rho field in model section");
    }

    #[test]
    fn moment_tensor_needs_six_components() {
        let ws = Workspace::new("/run");
        let mut input = json::parse(SAMPLE).unwrap();
        input["source"]["moment_tensor"] = json::array![1.0, 2.0];

        assert!(matches!(parse_run_config(&input, &ws), Err(RegolithError::Input(_))));
    }

    #[test]
    fn load_rejects_missing_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{ "geometry": {} }"#).unwrap();

        let err = load_input_file(&path).unwrap_err();
        assert!(err.to_string().contains("missing mesh section"));
        assert!(matches!(
            load_input_file(&dir.path().join("absent.json")),
            Err(RegolithError::MissingInputFile(_))
        ));
    }
}
