//! Input preparation and output collection for wave propagation runs on
//! irregular small bodies.
//!
//! A run scales and recenters the body's surface, samples a background
//! velocity model over the padded domain, writes the source and a receiver
//! ring, patches the solver's Par_file and then hands off to the external
//! mesher and solver.

pub mod config;
pub mod datatypes;
pub mod error;
pub mod external;
pub mod geometry;
pub mod notation;
pub mod observation;
pub mod par_file;
pub mod pipeline;
pub mod stl;
pub mod tomography;

pub use error::RegolithError;
