//! Rewriting of exported Wavefront OBJ geometry.

use crate::errors::{Result, SurfaceError};
use nalgebra::Vector3;
use tracing::debug;

/// One line of an OBJ file, as far as the normalizer cares.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjLine<'a> {
    /// A `v x y z [...]` line; `rest` holds any trailing tokens verbatim
    Vertex {
        /// Parsed `x y z`
        position: Vector3<f64>,
        /// Tokens after the coordinates (w or colour)
        rest: Vec<&'a str>,
    },
    /// Anything else, passed through untouched
    Other(&'a str),
}

impl<'a> ObjLine<'a> {
    /// Classify one line. `line_number` is 1-based and only used in errors.
    pub fn parse(line: &'a str, line_number: usize) -> Result<Self> {
        let Some(coords) = line.strip_prefix("v ") else {
            return Ok(ObjLine::Other(line));
        };

        let mut tokens = coords.split_whitespace();
        let mut xyz = [0.0; 3];
        for (axis, value) in xyz.iter_mut().enumerate() {
            let token = tokens.next().ok_or_else(|| {
                SurfaceError::integrity(format!(
                    "line {line_number}: vertex has {axis} coordinate(s), expected 3"
                ))
            })?;
            *value = token.parse().map_err(|_| {
                SurfaceError::integrity(format!(
                    "line {line_number}: invalid vertex coordinate '{token}'"
                ))
            })?;
        }

        Ok(ObjLine::Vertex {
            position: Vector3::from(xyz),
            rest: tokens.collect(),
        })
    }
}

/// Position of the first vertex line in an OBJ text.
pub fn first_vertex_position(obj_text: &str) -> Result<Option<Vector3<f64>>> {
    for (i, line) in obj_text.lines().enumerate() {
        if let ObjLine::Vertex { position, .. } = ObjLine::parse(line, i + 1)? {
            return Ok(Some(position));
        }
    }
    Ok(None)
}

/// Translate all vertices so that the first one lands on `anchor`.
///
/// Vertex coordinates are rewritten with three decimals; every other line is
/// copied unchanged. A text without vertex lines is returned as is.
///
/// # Arguments
///
/// * `obj_text` - OBJ file contents
/// * `anchor` - Target position of the first vertex
///
/// # Example
///
/// ```
/// use molsurf::obj::shift_first_vertex;
///
/// let obj = "o surface_0\nv 0 0 0\nv 1 2 3\n";
/// let shifted = shift_first_vertex(obj, [10.0, 0.0, -1.0]).unwrap();
/// assert_eq!(shifted, "o surface_0\nv 10.000 0.000 -1.000\nv 11.000 2.000 2.000\n");
/// ```
pub fn shift_first_vertex(obj_text: &str, anchor: [f32; 3]) -> Result<String> {
    // Each line keeps its own terminator so untouched lines round-trip exactly
    let lines = obj_text
        .split_inclusive('\n')
        .enumerate()
        .map(|(i, raw)| {
            let (body, ending) = split_ending(raw);
            Ok((ObjLine::parse(body, i + 1)?, ending))
        })
        .collect::<Result<Vec<_>>>()?;

    let Some(first) = lines.iter().find_map(|(line, _)| match line {
        ObjLine::Vertex { position, .. } => Some(*position),
        ObjLine::Other(_) => None,
    }) else {
        debug!("No vertex lines, geometry left unchanged");
        return Ok(obj_text.to_string());
    };

    let anchor = Vector3::new(f64::from(anchor[0]), f64::from(anchor[1]), f64::from(anchor[2]));
    let shift = anchor - first;
    debug!("Shifting vertices by ({:.3}, {:.3}, {:.3})", shift.x, shift.y, shift.z);

    let mut out = String::with_capacity(obj_text.len());
    for (line, ending) in &lines {
        match line {
            ObjLine::Vertex { position, rest } => {
                let p = position + shift;
                out.push_str(&format!("v {:.3} {:.3} {:.3}", p.x, p.y, p.z));
                for token in rest {
                    out.push(' ');
                    out.push_str(token);
                }
            }
            ObjLine::Other(text) => out.push_str(text),
        }
        out.push_str(ending);
    }
    Ok(out)
}

/// Split a line into its content and its `\n` or `\r\n` terminator (possibly empty).
fn split_ending(raw: &str) -> (&str, &str) {
    let body = raw.strip_suffix('\n').unwrap_or(raw);
    let body = body.strip_suffix('\r').unwrap_or(body);
    raw.split_at(body.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBJ: &str = "mtllib 1abc.mtl\no surface_0\nv 1.5 -2.0 0.25\nvn 0 0 1\nv 2.5 -2.0 0.25 0.8 0.1 0.1\nf 1//1 2//2 1//1\n";

    #[test]
    fn classify_lines() {
        assert_eq!(ObjLine::parse("vn 0 0 1", 1).unwrap(), ObjLine::Other("vn 0 0 1"));
        assert_eq!(ObjLine::parse("vt 0 0", 1).unwrap(), ObjLine::Other("vt 0 0"));
        let ObjLine::Vertex { position, rest } = ObjLine::parse("v 1 2 3 1.0", 1).unwrap() else {
            panic!("expected a vertex");
        };
        assert_eq!(position, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(rest, vec!["1.0"]);
    }

    #[test]
    fn first_vertex_is_found() {
        assert_eq!(first_vertex_position(OBJ).unwrap(), Some(Vector3::new(1.5, -2.0, 0.25)));
        assert_eq!(first_vertex_position("o empty\n").unwrap(), None);
    }

    #[test]
    fn shift_moves_first_vertex_onto_anchor() {
        let shifted = shift_first_vertex(OBJ, [0.5, 0.0, 1.25]).unwrap();
        let lines: Vec<&str> = shifted.lines().collect();
        assert_eq!(lines[0], "mtllib 1abc.mtl");
        assert_eq!(lines[2], "v 0.500 0.000 1.250");
        assert_eq!(lines[3], "vn 0 0 1");
        // Colour tokens survive
        assert_eq!(lines[4], "v 1.500 0.000 1.250 0.8 0.1 0.1");
        assert_eq!(lines[5], "f 1//1 2//2 1//1");
    }

    #[test]
    fn zero_shift_is_idempotent() {
        let once = shift_first_vertex(OBJ, [1.5, -2.0, 0.25]).unwrap();
        let twice = shift_first_vertex(&once, [1.5, -2.0, 0.25]).unwrap();
        assert_eq!(once, twice);
        assert!(once.contains("v 1.500 -2.000 0.250\n"));
    }

    #[test]
    fn no_vertices_leaves_text_unchanged() {
        let text = "mtllib x.mtl\n# nothing here";
        assert_eq!(shift_first_vertex(text, [1.0, 2.0, 3.0]).unwrap(), text);
    }

    #[test]
    fn line_endings_are_preserved() {
        let crlf = "o a\r\nv 1.000 2.000 3.000\r\nf 1 1 1";
        assert_eq!(shift_first_vertex(crlf, [1.0, 2.0, 3.0]).unwrap(), crlf);

        let shifted = shift_first_vertex("o a\r\nv 1 2 3\r\nv 2 2 3", [0.0, 0.0, 0.0]).unwrap();
        assert_eq!(shifted, "o a\r\nv 0.000 0.000 0.000\r\nv 1.000 0.000 0.000");

        let no_trailing = "v 0.500 0.000 1.250\nf 1 1 1";
        assert_eq!(shift_first_vertex(no_trailing, [0.5, 0.0, 1.25]).unwrap(), no_trailing);
    }

    #[test]
    fn malformed_vertex_reports_line() {
        let err = shift_first_vertex("o a\nv 1 2\n", [0.0; 3]).unwrap_err();
        assert!(matches!(err, SurfaceError::DataIntegrity(_)));
        assert!(err.to_string().contains("line 2"), "{err}");

        let err = shift_first_vertex("v 1 x 3\n", [0.0; 3]).unwrap_err();
        assert!(err.to_string().contains("line 1"), "{err}");
    }
}
