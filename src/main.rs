use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{error, info};

use regolith::{
    config::{self, Workspace},
    external::{CubitMeshGenerator, SpecfemSolver},
    par_file,
    pipeline::{self, Pipeline},
    RegolithError,
};

#[derive(Parser, Debug)]
#[command(name = "regolith", version, about = "Prepare and run wave propagation simulations of small bodies")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prepare all inputs, mesh, solve and combine the wave field snapshots
    Run {
        /// Run description (json)
        input_file: PathBuf,
        /// Directory holding DATA/, MESH/ and OUTPUT_FILES/
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
    },
    /// Only write the scaled surface, model, source, stations and Par_file
    Prepare {
        /// Run description (json)
        input_file: PathBuf,
        /// Directory holding DATA/, MESH/ and OUTPUT_FILES/
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
    },
    /// Rewrite values in a Par_file, keeping its layout
    Patch {
        /// The Par_file to rewrite in place
        file: PathBuf,
        /// Overrides such as NPROC=4 DT=1e-4 GPU_MODE=true
        #[arg(required = true)]
        overrides: Vec<String>,
    },
}

fn execute(command: Command) -> Result<(), RegolithError> {
    match command {
        Command::Run { input_file, workspace } => {
            let workspace = Workspace::new(workspace);
            let config = config::load(&input_file, &workspace)?;
            let tools = config
                .tools
                .as_ref()
                .ok_or_else(|| RegolithError::Input("Input json missing tools section".to_owned()))?;

            let mesher = CubitMeshGenerator::from_tools(tools);
            let solver = SpecfemSolver::from_tools(tools);
            let summary = Pipeline::new(&config, &workspace, &mesher, &solver).run()?;

            info!(
                "done: {} process(es), {} snapshot(s) combined, {} seismogram(s) missing",
                summary.nproc, summary.snapshots_combined, summary.missing_traces
            );
        }
        Command::Prepare { input_file, workspace } => {
            let workspace = Workspace::new(workspace);
            let config = config::load(&input_file, &workspace)?;
            let prepared = pipeline::prepare(&config, &workspace)?;

            info!(
                "prepared {} model samples and {} stations",
                prepared.grid.sample_count(),
                prepared.stations.len()
            );
        }
        Command::Patch { file, overrides } => {
            let modifications = overrides
                .iter()
                .map(|o| par_file::parse_override(o))
                .collect::<Result<HashMap<_, _>, _>>()?;
            par_file::patch_file(&file, &modifications)?;
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(err) = execute(cli.command) {
        error!("{err}");
        std::process::exit(1)
    }
}
