//! Mesh export implementation.

pub use super::*;

use std::io::{BufWriter, Write};

/// Mesh exporters
impl Mesh {
    /// Export the mesh in the Wavefront OBJ format.
    ///
    /// Only vertex positions and triangle faces are written.
    pub fn encode_obj(
        &self,
        writer: &mut impl Write,
    ) -> Result<(), Error> {
        let writer = &mut BufWriter::new(writer);

        for [x, y, z] in &self.vertices {
            writeln!(writer, "v {x} {y} {z}")?;
        }
        // NOTE: The face indices are one-based.
        for [a, b, c] in &self.faces {
            writeln!(writer, "f {} {} {}", a + 1, b + 1, c + 1)?;
        }
        writer.flush()?;

        Ok(())
    }
}
