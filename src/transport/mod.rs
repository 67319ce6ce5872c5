/// Filesystem discovery of experiment output files.
pub mod fs;
