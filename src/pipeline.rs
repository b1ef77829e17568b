//! Stage sequencing from the raw surface to combined solver output.

use std::collections::HashMap;
use std::path::Path;

use indicatif::ProgressBar;
use log::{info, warn};

use crate::{
    config::{RunConfig, Workspace},
    datatypes::{GridDimensions, Station},
    error::RegolithError,
    external::{check_exit, MeshGenerator, Solver, SolverJob},
    geometry::{self, Normalized},
    observation, par_file, tomography,
};

/// Seismogram component checked after the solve
pub const TRACE_COMPONENT: &str = "FXZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    Normalize,
    BuildModel,
    LayoutObservation,
    PatchParameters,
    Mesh,
    Decompose,
    GenerateDatabases,
    Solve,
    CombineOutputs,
}

impl StageId {
    pub const ALL: [StageId; 9] = [
        StageId::Normalize,
        StageId::BuildModel,
        StageId::LayoutObservation,
        StageId::PatchParameters,
        StageId::Mesh,
        StageId::Decompose,
        StageId::GenerateDatabases,
        StageId::Solve,
        StageId::CombineOutputs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageId::Normalize => "normalize",
            StageId::BuildModel => "build-model",
            StageId::LayoutObservation => "layout-observation",
            StageId::PatchParameters => "patch-parameters",
            StageId::Mesh => "mesh",
            StageId::Decompose => "decompose",
            StageId::GenerateDatabases => "generate-databases",
            StageId::Solve => "solve",
            StageId::CombineOutputs => "combine-outputs",
        }
    }

    /// Whether the stage hands off to an external tool
    pub fn is_external(&self) -> bool {
        !matches!(
            self,
            StageId::Normalize | StageId::BuildModel | StageId::LayoutObservation | StageId::PatchParameters
        )
    }
}

/// Artifacts of the model preparation stages
#[derive(Debug, Clone)]
pub struct Prepared {
    pub normalized: Normalized,
    pub grid: GridDimensions,
    pub stations: Vec<Station>,
    pub changed_parameters: Vec<String>,
}

/// What a full run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub prepared: Prepared,
    pub nproc: usize,
    pub snapshots_combined: usize,
    pub missing_traces: usize,
}

fn stage<T>(id: StageId, f: impl FnOnce() -> Result<T, RegolithError>) -> Result<T, RegolithError> {
    info!("stage {}...", id.name());
    f().map_err(|err| err.in_stage(id))
}

fn copy_into(file: &Path, dir: &Path) -> Result<(), RegolithError> {
    if !file.is_file() {
        return Err(RegolithError::MissingInputFile(file.to_path_buf()));
    }
    let name = file
        .file_name()
        .ok_or_else(|| RegolithError::Input(format!("{} has no file name", file.display())))?;
    let dest = dir.join(name);
    std::fs::copy(file, &dest).map_err(|err| RegolithError::io(&dest, err))?;
    Ok(())
}

/// Runs the stages in order. Every stage reads what the previous ones left
/// on disk; a failure stops the run and leaves earlier artifacts in place.
pub struct Pipeline<'a> {
    pub config: &'a RunConfig,
    pub workspace: &'a Workspace,
    pub mesher: &'a dyn MeshGenerator,
    pub solver: &'a dyn Solver,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a RunConfig,
        workspace: &'a Workspace,
        mesher: &'a dyn MeshGenerator,
        solver: &'a dyn Solver,
    ) -> Pipeline<'a> {
        Pipeline {
            config,
            workspace,
            mesher,
            solver,
        }
    }

    /// Runs the four model preparation stages, no external tools involved
    pub fn prepare(&self) -> Result<Prepared, RegolithError> {
        prepare(self.config, self.workspace)
    }

    /// Prepares the inputs, meshes, solves and combines the snapshots
    pub fn run(&self) -> Result<RunSummary, RegolithError> {
        let prepared = self.prepare()?;
        let ws = self.workspace;

        stage(StageId::Mesh, || {
            let mesh_dir = ws.mesh_dir();
            std::fs::create_dir_all(&mesh_dir).map_err(|err| RegolithError::io(&mesh_dir, err))?;
            let code = self
                .mesher
                .generate(&prepared.normalized.stl_path, self.config.element_size, &mesh_dir)?;
            check_exit("mesh generator", code)?;
            info!("mesh written to {}", mesh_dir.display());
            Ok(())
        })?;

        let job = stage(StageId::Decompose, || {
            let job = self.setup_output()?;
            check_exit("xdecompose_mesh", self.solver.decompose(&job)?)?;
            Ok(job)
        })?;

        stage(StageId::GenerateDatabases, || {
            check_exit("xgenerate_databases", self.solver.generate_databases(&job)?)
        })?;

        stage(StageId::Solve, || check_exit("xspecfem3D", self.solver.solve(&job)?))?;
        info!("see results in directory: {}", ws.output_dir().display());

        let (snapshots_combined, missing_traces) =
            stage(StageId::CombineOutputs, || self.combine_outputs(&job, &prepared.stations))?;

        Ok(RunSummary {
            prepared,
            nproc: job.nproc,
            snapshots_combined,
            missing_traces,
        })
    }

    /// Resets the output directory, copies the solver inputs into it and
    /// reads the process count and database path from the Par_file
    fn setup_output(&self) -> Result<SolverJob, RegolithError> {
        let ws = self.workspace;
        let output_dir = ws.output_dir();
        if output_dir.exists() {
            std::fs::remove_dir_all(&output_dir).map_err(|err| RegolithError::io(&output_dir, err))?;
        }
        std::fs::create_dir_all(&output_dir).map_err(|err| RegolithError::io(&output_dir, err))?;

        for input in [ws.par_file(), ws.source_file(), ws.stations_file()] {
            copy_into(&input, &output_dir)?;
        }

        let par_path = ws.par_file();
        let text = std::fs::read_to_string(&par_path).map_err(|err| RegolithError::io(&par_path, err))?;
        let nproc = par_file::read_usize(&text, "NPROC")?;
        if nproc == 0 {
            return Err(RegolithError::Input("NPROC in Par_file must be at least 1".to_owned()));
        }
        let local_path = par_file::read_value(&text, "LOCAL_PATH")
            .map(|p| ws.resolve(p))
            .ok_or_else(|| RegolithError::Input("LOCAL_PATH not found in Par_file".to_owned()))?;
        std::fs::create_dir_all(&local_path).map_err(|err| RegolithError::io(&local_path, err))?;

        Ok(SolverJob {
            nproc,
            workdir: ws.root.clone(),
            mesh_dir: ws.mesh_dir(),
            local_path,
        })
    }

    fn combine_outputs(&self, job: &SolverJob, stations: &[Station]) -> Result<(usize, usize), RegolithError> {
        let ws = self.workspace;
        let mut combined = 0;

        if let Some(snapshots) = &self.config.snapshots {
            let wave_field_dir = ws.wave_field_dir();
            std::fs::create_dir_all(&wave_field_dir).map_err(|err| RegolithError::io(&wave_field_dir, err))?;

            let iterations: Vec<usize> = snapshots.iterations().collect();
            let bar = ProgressBar::new(iterations.len() as u64);
            for iteration in iterations {
                let code = self.solver.combine_snapshot(job, iteration, &wave_field_dir)?;
                check_exit("xcombine_vol_data_vtk", code)?;
                combined += 1;
                bar.inc(1);
            }
            bar.finish_and_clear();
            info!("combined {} snapshot(s) into {}", combined, wave_field_dir.display());
        }

        let missing = observation::missing_traces(stations, TRACE_COMPONENT, &ws.output_dir());
        if !missing.is_empty() {
            warn!(
                "{} of {} expected seismograms are missing, first: {}",
                missing.len(),
                stations.len(),
                missing[0].display()
            );
        }

        Ok((combined, missing.len()))
    }
}

/// Normalizes the geometry, builds the background model, writes the source
/// and stations and patches the Par_file
pub fn prepare(config: &RunConfig, ws: &Workspace) -> Result<Prepared, RegolithError> {
    let normalized = stage(StageId::Normalize, || {
        geometry::normalize(&config.geometry.stl_file, config.geometry.scale_factor, ws)
    })?;

    let grid = stage(StageId::BuildModel, || {
        let bbox = &normalized.scaled;
        tomography::build(
            bbox.length,
            bbox.width,
            bbox.height,
            config.element_size,
            &config.material,
            &ws.tomography_file(),
        )
    })?;

    let stations = stage(StageId::LayoutObservation, || {
        observation::place_source(&config.source, &ws.source_file())?;
        observation::place_stations(config.stations.radius, config.stations.count, &ws.stations_file())
    })?;

    let changed_parameters = stage(StageId::PatchParameters, || {
        let modifications: HashMap<_, _> = config.par_file.iter().cloned().collect();
        Ok(par_file::patch_file(&ws.par_file(), &modifications)?.changed)
    })?;

    Ok(Prepared {
        normalized,
        grid,
        stations,
        changed_parameters,
    })
}
