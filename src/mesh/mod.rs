//! Triangle meshes of fitted bodies.

pub mod export;
pub mod import;

pub use crate::backend::Backend;
pub use burn::tensor::{Int, Tensor, TensorData};

use crate::{body::to_host, error::Error};

/// A triangle mesh on the host.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    /// `[V, 3]`
    pub vertices: Vec<[f32; 3]>,
    /// `[F, 3]` zero-based
    pub faces: Vec<[u32; 3]>,
}

impl Mesh {
    /// `[V, 3]` and `[F, 3]` to a mesh
    pub fn from_tensors<B: Backend>(
        vertices: Tensor<B, 2>,
        faces: Tensor<B, 2, Int>,
    ) -> Result<Self, Error> {
        let vertices = to_host(vertices)?
            .chunks_exact(3)
            .map(|v| [v[0], v[1], v[2]])
            .collect();
        let faces = faces
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|error| Error::TensorData(format!("{error:?}")))?
            .chunks_exact(3)
            .map(|f| {
                let mut face = [0; 3];
                for (index, vertex) in face.iter_mut().zip(f) {
                    *index = u32::try_from(*vertex).map_err(|_| {
                        Error::MalformedMesh(format!("Invalid face index: {vertex}"))
                    })?;
                }
                Ok::<_, Error>(face)
            })
            .collect::<Result<_, _>>()?;

        Self { vertices, faces }.validate()
    }

    /// `[N, V, 3]` and `[N, F, 3]` to `N` meshes
    pub fn from_batch<B: Backend>(
        vertices: Tensor<B, 3>,
        faces: Tensor<B, 3, Int>,
    ) -> Result<Vec<Self>, Error> {
        let [n, v, _] = vertices.dims();
        let [faces_n, f, _] = faces.dims();
        if faces_n != n {
            return Err(Error::Validation(
                format!("faces.dims()[0] ({faces_n})"),
                n.to_string(),
            ));
        }

        (0..n)
            .map(|index| {
                Self::from_tensors(
                    vertices.to_owned().slice([index..index + 1, 0..v, 0..3]).reshape([v, 3]),
                    faces.to_owned().slice([index..index + 1, 0..f, 0..3]).reshape([f, 3]),
                )
            })
            .collect()
    }

    /// Stacking meshes of the same topology size into `[N, V, 3]` and `[N, F, 3]`.
    pub fn to_batch<B: Backend>(
        meshes: &[Self],
        device: &B::Device,
    ) -> Result<(Tensor<B, 3>, Tensor<B, 3, Int>), Error> {
        let Some(first) = meshes.first() else {
            return Err(Error::Validation("meshes.len() (0)".into(), "positive".into()));
        };
        let (v, f) = (first.vertices.len(), first.faces.len());

        let mut vertices = Vec::<f32>::with_capacity(meshes.len() * v * 3);
        let mut faces = Vec::<i64>::with_capacity(meshes.len() * f * 3);
        for mesh in meshes {
            if mesh.vertices.len() != v || mesh.faces.len() != f {
                return Err(Error::Validation(
                    format!(
                        "mesh size ({}, {})",
                        mesh.vertices.len(),
                        mesh.faces.len()
                    ),
                    format!("({v}, {f})"),
                ));
            }
            vertices.extend(mesh.vertices.iter().flatten());
            faces.extend(mesh.faces.iter().flatten().map(|&index| index as i64));
        }

        let n = meshes.len();
        let vertices = Tensor::from_data(
            TensorData::new(vertices, [n, v, 3]).convert::<B::FloatElem>(),
            device,
        );
        let faces = Tensor::from_data(
            TensorData::new(faces, [n, f, 3]).convert::<B::IntElem>(),
            device,
        );

        Ok((vertices, faces))
    }

    /// Axis-aligned bounds as `(minimum, maximum)`.
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(mut min, mut max), v| {
            for axis in 0..3 {
                min[axis] = min[axis].min(v[axis]);
                max[axis] = max[axis].max(v[axis]);
            }
            (min, max)
        }))
    }

    pub fn translate(
        &mut self,
        offset: [f32; 3],
    ) -> &mut Self {
        for vertex in &mut self.vertices {
            for axis in 0..3 {
                vertex[axis] += offset[axis];
            }
        }
        self
    }

    /// Checking that every face refers to an existing vertex.
    pub fn validate(self) -> Result<Self, Error> {
        let vertex_count = self.vertices.len();
        if let Some(face) = self
            .faces
            .iter()
            .find(|face| face.iter().any(|&index| index as usize >= vertex_count))
        {
            return Err(Error::MalformedMesh(format!(
                "Face {face:?} is out of {vertex_count} vertices"
            )));
        }

        Ok(self)
    }
}
