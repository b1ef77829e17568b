use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::StageId;

#[derive(Debug, Error)]
pub enum RegolithError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Geometry error: surface has no triangles")]
    EmptyGeometry,

    #[error("Geometry error: scale factor must be positive, got {0}")]
    InvalidScale(f64),

    #[error("Model error: grid spacing must be positive, got {0}")]
    InvalidSpacing(f64),

    #[error("Model error: degenerate grid {nx}x{ny}x{nz}, every extent must be at least one spacing")]
    DegenerateGrid { nx: usize, ny: usize, nz: usize },

    #[error("Input error: missing input file {}", .0.display())]
    MissingInputFile(PathBuf),

    #[error("Par_file error: line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },

    #[error("External process error: {program} exited with {status}")]
    ExternalProcess { program: String, status: String },

    #[error("I/O error: {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stage '{}' failed: {source}", .stage.name())]
    Stage {
        stage: StageId,
        #[source]
        source: Box<RegolithError>,
    },
}

impl RegolithError {
    /// Builds an [`RegolithError::Io`] tagged with the path being accessed
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> RegolithError {
        RegolithError::Io {
            path: path.into(),
            source,
        }
    }

    /// Wraps an error with the pipeline stage it surfaced from
    pub fn in_stage(self, stage: StageId) -> RegolithError {
        match self {
            // already tagged by an inner stage
            RegolithError::Stage { .. } => self,
            other => RegolithError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage an error was raised in, if it was raised by the pipeline
    pub fn stage(&self) -> Option<StageId> {
        match self {
            RegolithError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_wrapping_is_not_nested() {
        let err = RegolithError::EmptyGeometry
            .in_stage(StageId::Normalize)
            .in_stage(StageId::Solve);

        assert_eq!(err.stage(), Some(StageId::Normalize));
        assert_eq!(
            err.to_string(),
            "Stage 'normalize' failed: Geometry error: surface has no triangles"
        );
    }

    #[test]
    fn external_process_message_names_program() {
        let err = RegolithError::ExternalProcess {
            program: "xspecfem3D".to_owned(),
            status: "exit code 2".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "External process error: xspecfem3D exited with exit code 2"
        );
    }
}
