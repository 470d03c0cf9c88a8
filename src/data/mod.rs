//! Data handling: persistence of scan artifacts.

pub mod artifacts;

pub use artifacts::{ArtifactWriter, SavedArtifacts};
