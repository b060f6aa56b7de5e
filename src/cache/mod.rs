//! Persisted results of body fitting.

pub mod directory;

pub use crate::backend::Backend;
pub use crate::{body::ParameterRecord, mesh::Mesh};
pub use directory::*;

use crate::error::Error;

/// The key of one fitted image.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct FitKey {
    /// The image name.
    pub name: String,
    /// The fitting variant, e.g., the configuration name.
    pub variant: String,
}

/// The persisted result of one fitted image.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CachedFit {
    /// One mesh per body instance.
    pub meshes: Vec<Mesh>,
    /// One record per body instance.
    pub records: Vec<ParameterRecord>,
}

/// The outcome of storing one entry.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StoreOutcome {
    /// A complete entry already exists and is kept as is.
    Kept,
    Written,
}

/// A key-addressed store of fitted results.
///
/// ## Details
///
/// * An entry is written once, and the first writer wins.
/// * A partial entry is never returned.
pub trait FitCache<B: Backend> {
    /// Looking up the fit of `body_count` bodies.
    ///
    /// It returns `None` if any body of the fit is missing.
    fn lookup(
        &self,
        key: &FitKey,
        body_count: usize,
        device: &B::Device,
    ) -> Result<Option<CachedFit>, Error>;

    /// Storing the fit, outcomes are per body.
    fn store(
        &self,
        key: &FitKey,
        fit: &CachedFit,
    ) -> Result<Vec<StoreOutcome>, Error>;

    /// Looking up the aligned reference mesh.
    fn lookup_reference(
        &self,
        key: &FitKey,
    ) -> Result<Option<Mesh>, Error>;

    /// Storing the aligned reference mesh.
    fn store_reference(
        &self,
        key: &FitKey,
        mesh: &Mesh,
    ) -> Result<StoreOutcome, Error>;
}

impl FitKey {
    pub fn new(
        name: impl Into<String>,
        variant: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            variant: variant.into(),
        }
    }
}
