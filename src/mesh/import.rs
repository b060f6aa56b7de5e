//! Mesh import implementation.

pub use super::*;

use std::io::{BufRead, BufReader, Read};

/// Mesh importers
impl Mesh {
    /// Import the mesh in the Wavefront OBJ format.
    ///
    /// ## Details
    ///
    /// * Only `v` and `f` statements are read, the others are skipped.
    /// * Polygons are triangulated as fans.
    /// * Texture and normal references of faces (`f 1/2/3 ...`) are ignored.
    pub fn decode_obj(reader: &mut impl Read) -> Result<Self, Error> {
        let reader = BufReader::new(reader);

        let mut mesh = Self::default();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            let mut tokens = line.split_whitespace();
            let malformed = |reason: &str| {
                Error::MalformedMesh(format!("Line {}: {reason}: {line:?}", number + 1))
            };

            match tokens.next() {
                Some("v") => {
                    let mut vertex = [0.0_f32; 3];
                    for value in vertex.iter_mut() {
                        *value = tokens
                            .next()
                            .and_then(|token| token.parse().ok())
                            .ok_or_else(|| malformed("Invalid vertex"))?;
                    }
                    mesh.vertices.push(vertex);
                },
                Some("f") => {
                    let indices = tokens
                        .map(|token| {
                            token
                                .split('/')
                                .next()
                                .and_then(|index| index.parse::<u32>().ok())
                                .and_then(|index| index.checked_sub(1))
                                .ok_or_else(|| malformed("Invalid face index"))
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    if indices.len() < 3 {
                        return Err(malformed("Too few face indices"));
                    }
                    mesh.faces.extend(
                        indices
                            .windows(2)
                            .skip(1)
                            .map(|pair| [indices[0], pair[0], pair[1]]),
                    );
                },
                _ => {},
            }
        }

        mesh.validate()
    }
}
