//! Directory-backed cache of fitted results.

pub use super::*;

use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

/// The extension [`NamedMpkFileRecorder`] appends to record paths.
pub const RECORD_EXTENSION: &str = "mpk";

/// A cache laid out as `<root>/<name>/<variant>/obj/`.
///
/// ## Details
///
/// For the image `name`, the body `ii` is stored as
/// `<name>_smpl_<ii>.obj` and `<name>_smpl_<ii>.mpk`,
/// and the aligned reference mesh as `<name>_smpl_00_prior.obj`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DirectoryCache {
    pub root: PathBuf,
}

impl DirectoryCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/<name>/<variant>/obj`
    pub fn directory(
        &self,
        key: &FitKey,
    ) -> PathBuf {
        self.root.join(&key.name).join(&key.variant).join("obj")
    }

    /// The path of the body mesh.
    pub fn mesh_path(
        &self,
        key: &FitKey,
        index: usize,
    ) -> PathBuf {
        self.directory(key).join(format!("{}.obj", Self::stem(key, index)))
    }

    /// The path of the parameter record.
    pub fn record_path(
        &self,
        key: &FitKey,
        index: usize,
    ) -> PathBuf {
        self.directory(key)
            .join(format!("{}.{RECORD_EXTENSION}", Self::stem(key, index)))
    }

    /// The path of the aligned reference mesh.
    pub fn reference_path(
        &self,
        key: &FitKey,
    ) -> PathBuf {
        self.directory(key)
            .join(format!("{}_prior.obj", Self::stem(key, 0)))
    }

    fn stem(
        key: &FitKey,
        index: usize,
    ) -> String {
        format!("{}_smpl_{index:02}", key.name)
    }

    fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
        NamedMpkFileRecorder::<FullPrecisionSettings>::new()
    }

    fn read_mesh(path: &Path) -> Result<Mesh, Error> {
        Mesh::decode_obj(&mut File::open(path)?)
    }

    fn write_mesh(
        path: &Path,
        mesh: &Mesh,
    ) -> Result<(), Error> {
        mesh.encode_obj(&mut File::create(path)?)
    }

    fn read_body<B: Backend>(
        &self,
        key: &FitKey,
        index: usize,
        device: &B::Device,
    ) -> Result<(Mesh, ParameterRecord), Error> {
        let mesh = Self::read_mesh(&self.mesh_path(key, index))?;
        let record_path = self.record_path(key, index);
        if !record_path.is_file() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{record_path:?} is missing"),
            )));
        }
        let record = Recorder::<B>::load(&Self::recorder(), record_path, device)?;

        Ok((mesh, record))
    }
}

impl<B: Backend> FitCache<B> for DirectoryCache {
    fn lookup(
        &self,
        key: &FitKey,
        body_count: usize,
        device: &B::Device,
    ) -> Result<Option<CachedFit>, Error> {
        if !self.mesh_path(key, 0).is_file() {
            #[cfg(all(debug_assertions, not(test)))]
            log::debug!(target: "body_fit::cache", "lookup > miss {key:?}");

            return Ok(None);
        }

        let mut fit = CachedFit::default();
        for index in 0..body_count {
            match self.read_body::<B>(key, index, device) {
                Ok((mesh, record)) => {
                    fit.meshes.push(mesh);
                    fit.records.push(record);
                },
                Err(error) => {
                    log::warn!(
                        target: "body_fit::cache",
                        "lookup > partial {key:?} at body {index}: {error}",
                    );

                    return Ok(None);
                },
            }
        }

        log::info!(target: "body_fit::cache", "lookup > hit {key:?}");

        Ok(Some(fit))
    }

    fn store(
        &self,
        key: &FitKey,
        fit: &CachedFit,
    ) -> Result<Vec<StoreOutcome>, Error> {
        if fit.meshes.len() != fit.records.len() {
            return Err(Error::Validation(
                format!("fit.records.len() ({})", fit.records.len()),
                format!("fit.meshes.len() ({})", fit.meshes.len()),
            ));
        }
        // A batch is kept only as a whole, so a partial entry is rewritten whole.
        let is_complete = (0..fit.meshes.len()).all(|index| {
            self.mesh_path(key, index).is_file() && self.record_path(key, index).is_file()
        });
        if is_complete {
            return Ok(vec![StoreOutcome::Kept; fit.meshes.len()]);
        }
        fs::create_dir_all(self.directory(key))?;

        fit.meshes
            .iter()
            .zip(&fit.records)
            .enumerate()
            .map(|(index, (mesh, record))| -> Result<StoreOutcome, Error> {
                let mesh_path = self.mesh_path(key, index);
                Self::write_mesh(&mesh_path, mesh)?;
                Recorder::<B>::record(
                    &Self::recorder(),
                    record.to_owned(),
                    self.record_path(key, index),
                )?;

                log::info!(target: "body_fit::cache", "store > {mesh_path:?}");

                Ok(StoreOutcome::Written)
            })
            .collect()
    }

    fn lookup_reference(
        &self,
        key: &FitKey,
    ) -> Result<Option<Mesh>, Error> {
        let path = self.reference_path(key);
        if !path.is_file() {
            return Ok(None);
        }

        match Self::read_mesh(&path) {
            Ok(mesh) => Ok(Some(mesh)),
            Err(error) => {
                log::warn!(target: "body_fit::cache", "lookup_reference > {path:?}: {error}");
                Ok(None)
            },
        }
    }

    fn store_reference(
        &self,
        key: &FitKey,
        mesh: &Mesh,
    ) -> Result<StoreOutcome, Error> {
        let path = self.reference_path(key);
        if path.is_file() {
            return Ok(StoreOutcome::Kept);
        }

        fs::create_dir_all(self.directory(key))?;
        Self::write_mesh(&path, mesh)?;

        log::info!(target: "body_fit::cache", "store_reference > {path:?}");

        Ok(StoreOutcome::Written)
    }
}
