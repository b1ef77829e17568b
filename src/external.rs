use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};

use crate::{config::ToolConfig, error::RegolithError, notation};

/// Exit code of a finished external process, `None` if it was killed by a signal
pub type ExitCode = Option<i32>;

/// Turns a collaborator's exit code into a pipeline result
pub fn check_exit(program: &str, code: ExitCode) -> Result<(), RegolithError> {
    match code {
        Some(0) => Ok(()),
        Some(code) => Err(RegolithError::ExternalProcess {
            program: program.to_owned(),
            status: format!("exit code {code}"),
        }),
        None => Err(RegolithError::ExternalProcess {
            program: program.to_owned(),
            status: "termination by signal".to_owned(),
        }),
    }
}

/// Builds a volumetric mesh from a surface geometry
pub trait MeshGenerator {
    /// Meshes `geometry` with elements of roughly `element_size` and writes
    /// the solver databases into `mesh_dir`
    fn generate(&self, geometry: &Path, element_size: f64, mesh_dir: &Path) -> Result<ExitCode, RegolithError>;
}

/// Everything the solver executables need to locate their inputs
#[derive(Debug, Clone, PartialEq)]
pub struct SolverJob {
    pub nproc: usize,
    pub workdir: PathBuf,
    pub mesh_dir: PathBuf,
    /// `LOCAL_PATH` from the Par_file, where the partitioned databases live
    pub local_path: PathBuf,
}

/// The spectral element solver and its helper executables
pub trait Solver {
    fn decompose(&self, job: &SolverJob) -> Result<ExitCode, RegolithError>;
    fn generate_databases(&self, job: &SolverJob) -> Result<ExitCode, RegolithError>;
    fn solve(&self, job: &SolverJob) -> Result<ExitCode, RegolithError>;
    /// Combines the velocity snapshot at `iteration` into a single volume file
    fn combine_snapshot(&self, job: &SolverJob, iteration: usize, output_dir: &Path) -> Result<ExitCode, RegolithError>;
}

fn run(mut command: Command, program: &str) -> Result<ExitCode, RegolithError> {
    debug!("running {:?}", command);
    let status = command
        .status()
        .map_err(|err| RegolithError::io(PathBuf::from(program), err))?;
    Ok(status.code())
}

/// Double quoted Python string literal. Only the backslash, the quote and
/// line breaks are escaped, everything else is written as UTF-8.
fn python_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Meshes through CUBIT's Python interface and exports with GEOCUBIT
pub struct CubitMeshGenerator {
    pub python: String,
    pub cubit_path: PathBuf,
    pub geocubit_path: PathBuf,
}

impl CubitMeshGenerator {
    pub fn from_tools(tools: &ToolConfig) -> CubitMeshGenerator {
        CubitMeshGenerator {
            python: tools.python.clone(),
            cubit_path: tools.cubit_path.clone(),
            geocubit_path: tools.geocubit_path.clone(),
        }
    }

    /// Builds the CUBIT driver script
    ///
    /// # Arguments
    /// * `geometry` - The scaled and centered STL file
    /// * `element_size` - Target edge length of the hexahedra
    /// * `mesh_dir` - Destination of the exported databases
    pub fn build_script(&self, geometry: &Path, element_size: f64, mesh_dir: &Path) -> String {
        let mesh_dir = format!("{}/", mesh_dir.display());
        let commands = [
            "set duplicate block elements on".to_owned(),
            format!(
                "import stl \"{}\" feature_angle 135.00 Spline merge ",
                geometry.display()
            ),
            "merge all".to_owned(),
            format!("sculpt parallel volume all size {}", notation::real(element_size)),
            "block 1 add hex in volume 1 ".to_owned(),
            "block 1 name \"elastic tomography_model.xyz 1\" ".to_owned(),
            "block 1 attribute count 2".to_owned(),
            "block 1 attribute index 1 -1".to_owned(),
            "block 1 attribute index 2 2".to_owned(),
            "skin block 1 make block 1000".to_owned(),
            "block 1000 name \"free_or_absorbing_surface_file_zmax\" ".to_owned(),
        ];

        let mut script = String::new();
        script.push_str("import sys\n");
        script.push_str(&format!(
            "sys.path.append({})\n",
            python_literal(&self.cubit_path.display().to_string())
        ));
        script.push_str(&format!(
            "sys.path.append({})\n",
            python_literal(&self.geocubit_path.display().to_string())
        ));
        script.push_str("import cubit\n");
        script.push_str("import cubit2specfem3d\n");
        script.push_str("cubit.init(['cubit', '-nojournal', '-nographics'])\n");
        for command in commands {
            script.push_str(&format!("cubit.cmd({})\n", python_literal(&command)));
        }
        script.push_str(&format!(
            "cubit2specfem3d.export2SPECFEM3D({})\n",
            python_literal(&mesh_dir)
        ));
        script.push_str(&format!(
            "cubit.cmd({})\n",
            python_literal(&format!("save as \"{}meshing.cub\" overwrite", mesh_dir))
        ));
        script
    }
}

impl MeshGenerator for CubitMeshGenerator {
    fn generate(&self, geometry: &Path, element_size: f64, mesh_dir: &Path) -> Result<ExitCode, RegolithError> {
        std::fs::create_dir_all(mesh_dir).map_err(|err| RegolithError::io(mesh_dir, err))?;

        let script_path = mesh_dir.join("generate_mesh.py");
        std::fs::write(&script_path, self.build_script(geometry, element_size, mesh_dir))
            .map_err(|err| RegolithError::io(&script_path, err))?;

        info!("running cubit on {}...", geometry.display());
        let mut command = Command::new(&self.python);
        command.arg(&script_path);
        run(command, &self.python)
    }
}

/// SPECFEM3D executables found in `bin`
pub struct SpecfemSolver {
    pub bin: PathBuf,
    pub mpirun: String,
}

impl SpecfemSolver {
    pub fn from_tools(tools: &ToolConfig) -> SpecfemSolver {
        SpecfemSolver {
            bin: tools.specfem_bin.clone(),
            mpirun: tools.mpirun.clone(),
        }
    }

    /// Command for `executable`, launched through mpirun when running on
    /// more than one process
    pub fn command(&self, executable: &str, job: &SolverJob, parallel: bool) -> Command {
        let program = self.bin.join(executable);
        let mut command = if parallel && job.nproc > 1 {
            let mut c = Command::new(&self.mpirun);
            c.arg("-np").arg(job.nproc.to_string()).arg(program);
            c
        } else {
            Command::new(program)
        };
        command.current_dir(&job.workdir);
        command
    }
}

impl Solver for SpecfemSolver {
    fn decompose(&self, job: &SolverJob) -> Result<ExitCode, RegolithError> {
        info!("decomposing mesh into {} partition(s)...", job.nproc);
        let mut command = self.command("xdecompose_mesh", job, false);
        command
            .arg(job.nproc.to_string())
            .arg(&job.mesh_dir)
            .arg(&job.local_path);
        run(command, "xdecompose_mesh")
    }

    fn generate_databases(&self, job: &SolverJob) -> Result<ExitCode, RegolithError> {
        info!("running database generation on {} process(es)...", job.nproc);
        run(self.command("xgenerate_databases", job, true), "xgenerate_databases")
    }

    fn solve(&self, job: &SolverJob) -> Result<ExitCode, RegolithError> {
        info!("running solver on {} process(es)...", job.nproc);
        run(self.command("xspecfem3D", job, true), "xspecfem3D")
    }

    fn combine_snapshot(&self, job: &SolverJob, iteration: usize, output_dir: &Path) -> Result<ExitCode, RegolithError> {
        let mut command = self.command("xcombine_vol_data_vtk", job, false);
        command
            .arg("0")
            .arg(job.nproc.saturating_sub(1).to_string())
            .arg(format!("velocity_Z_it{:06}", iteration))
            .arg(&job.local_path)
            .arg(output_dir)
            .arg("0");
        run(command, "xcombine_vol_data_vtk")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(nproc: usize) -> SolverJob {
        SolverJob {
            nproc,
            workdir: PathBuf::from("/run"),
            mesh_dir: PathBuf::from("/run/MESH"),
            local_path: PathBuf::from("/run/OUTPUT_FILES/DATABASES_MPI"),
        }
    }

    fn solver() -> SpecfemSolver {
        SpecfemSolver {
            bin: PathBuf::from("/opt/specfem3d/bin"),
            mpirun: "mpirun".to_owned(),
        }
    }

    fn args(command: &Command) -> Vec<String> {
        command.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn exit_codes() {
        assert!(check_exit("xspecfem3D", Some(0)).is_ok());
        assert!(matches!(
            check_exit("xspecfem3D", Some(1)),
            Err(RegolithError::ExternalProcess { .. })
        ));
        assert!(check_exit("xspecfem3D", None).is_err());
    }

    #[test]
    fn serial_runs_skip_mpirun() {
        let command = solver().command("xspecfem3D", &job(1), true);
        assert_eq!(command.get_program(), "/opt/specfem3d/bin/xspecfem3D");
        assert!(args(&command).is_empty());
        assert_eq!(command.get_current_dir(), Some(Path::new("/run")));
    }

    #[test]
    fn parallel_runs_use_mpirun() {
        let command = solver().command("xgenerate_databases", &job(4), true);
        assert_eq!(command.get_program(), "mpirun");
        assert_eq!(args(&command), vec!["-np", "4", "/opt/specfem3d/bin/xgenerate_databases"]);

        let command = solver().command("xdecompose_mesh", &job(4), false);
        assert_eq!(command.get_program(), "/opt/specfem3d/bin/xdecompose_mesh");
    }

    #[test]
    fn cubit_script_carries_geometry_and_size() {
        let generator = CubitMeshGenerator {
            python: "python3".to_owned(),
            cubit_path: PathBuf::from("/opt/cubit/bin"),
            geocubit_path: PathBuf::from("/opt/geocubitlib"),
        };
        let script = generator.build_script(Path::new("model/rock_zoom2.0.stl"), 40.0, Path::new("MESH"));

        assert!(script.contains("sys.path.append(\"/opt/cubit/bin\")\n"));
        assert!(script.contains("import stl \\\"model/rock_zoom2.0.stl\\\" feature_angle 135.00"));
        assert!(script.contains("cubit.cmd(\"sculpt parallel volume all size 40.0\")\n"));
        assert!(script.contains("cubit2specfem3d.export2SPECFEM3D(\"MESH/\")\n"));
        assert!(script.contains("save as \\\"MESH/meshing.cub\\\" overwrite"));
    }

    #[test]
    fn python_literals_keep_unicode_raw() {
        assert_eq!(python_literal("/data/cafe\u{301}"), "\"/data/cafe\u{301}\"");
        assert_eq!(python_literal("a\\b\"c\nd"), "\"a\\\\b\\\"c\\nd\"");

        let generator = CubitMeshGenerator {
            python: "python3".to_owned(),
            cubit_path: PathBuf::from("/opt/cubit\u{7}/bin"),
            geocubit_path: PathBuf::from("/opt/géocubit"),
        };
        let script = generator.build_script(Path::new("rock.stl"), 40.0, Path::new("MESH"));
        assert!(script.contains("sys.path.append(\"/opt/géocubit\")\n"));
        assert!(script.contains("sys.path.append(\"/opt/cubit\u{7}/bin\")\n"));
        assert!(!script.contains("\\u{"));
    }
}
