//! Grid-based solvent-excluded surface (SES) mesher.
//!
//! 1. Mark grid points inside the solvent-accessible surface (atoms inflated by
//!    the probe radius).
//! 2. Exterior grid points touching that region are probe centers; each one is
//!    projected onto the accessible surface of its closest atom when that
//!    position is not blocked by another atom.
//! 3. Interior points closer than one probe radius to a probe center are
//!    carved out, which gives the re-entrant parts of the SES.
//! 4. The zero level of `distance - probe_radius` is triangulated with marching
//!    tetrahedra, vertices are shared along grid edges.
//! 5. Every vertex is labelled with its nearest atom.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use rstar::{primitives::GeomWithData, RTree};
use rustc_hash::FxHashMap;
use std::ops::Range;
use tracing::{debug, warn};

/// Radius used for elements without a tabulated van der Waals radius.
pub const DEFAULT_VDW_RADIUS: f64 = 1.5;

/// Upper bound on grid size; the spacing is coarsened to stay below it.
const MAX_GRID_POINTS: usize = 1 << 24;

type AtomPoint = GeomWithData<[f64; 3], usize>;

/// An atom sphere to be meshed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshAtom {
    /// Center in Å
    pub position: Point3<f64>,
    /// Van der Waals radius in Å
    pub radius: f64,
}

/// Surface parameters: probe radius and grid spacing, both in Å.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceParams {
    /// Solvent probe radius
    pub probe_radius: f64,
    /// Grid spacing
    pub resolution: f64,
}

/// Output of [`molecular_surface`]; `groups[v]` indexes the input atom slice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceMesh {
    /// Flat `x, y, z` vertex positions
    pub positions: Vec<f32>,
    /// Flat `x, y, z` unit normals
    pub normals: Vec<f32>,
    /// Triangle vertex indices
    pub indices: Vec<u32>,
    /// Index of the nearest input atom per vertex
    pub groups: Vec<u32>,
}

impl SurfaceMesh {
    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }
}

/// Van der Waals radius for an element symbol.
pub fn element_radius(type_symbol: &str) -> f64 {
    pdbtbx::Element::from_symbol(type_symbol.trim())
        .and_then(|e| e.atomic_radius().van_der_waals)
        .unwrap_or(DEFAULT_VDW_RADIUS)
}

/// Triangulate the solvent-excluded surface of a set of atoms.
pub fn molecular_surface(atoms: &[MeshAtom], params: &SurfaceParams) -> SurfaceMesh {
    if atoms.is_empty() {
        return SurfaceMesh::default();
    }
    let rp = params.probe_radius;
    let max_radius = atoms.iter().map(|a| a.radius).fold(0.0, f64::max);
    let grid = Grid::around(atoms, max_radius + rp, params.resolution);
    debug!(
        "Surface grid {:?} at {:.2} Å for {} atoms",
        grid.dims,
        grid.h,
        atoms.len()
    );

    let tree: RTree<AtomPoint> = RTree::bulk_load(
        atoms
            .iter()
            .enumerate()
            .map(|(i, a)| AtomPoint::new([a.position.x, a.position.y, a.position.z], i))
            .collect(),
    );

    let inside = accessible_interior(&grid, atoms, rp);
    let probes = probe_centers(&grid, &inside, atoms, &tree, rp, max_radius);
    let field = excluded_field(&grid, &inside, &probes, rp);

    let mut builder = Isosurface::default();
    builder.march(&grid, &field);
    let normals = vertex_normals(&builder.positions, &builder.indices);
    let groups = nearest_atoms(&builder.positions, &tree);
    debug!(
        "Surface has {} vertices and {} triangles",
        builder.positions.len() / 3,
        builder.indices.len() / 3
    );

    SurfaceMesh {
        positions: builder.positions,
        normals,
        indices: builder.indices,
        groups,
    }
}

struct Grid {
    origin: Point3<f64>,
    h: f64,
    dims: [usize; 3],
}

impl Grid {
    fn around(atoms: &[MeshAtom], reach: f64, resolution: f64) -> Self {
        let mut lo = [f64::INFINITY; 3];
        let mut hi = [f64::NEG_INFINITY; 3];
        for a in atoms {
            for d in 0..3 {
                lo[d] = lo[d].min(a.position[d]);
                hi[d] = hi[d].max(a.position[d]);
            }
        }

        let mut h = resolution.max(0.05);
        loop {
            let pad = reach + 2.0 * h;
            let dims = [0, 1, 2].map(|d| ((hi[d] - lo[d] + 2.0 * pad) / h).ceil() as usize + 1);
            if dims.iter().product::<usize>() <= MAX_GRID_POINTS {
                if h > resolution {
                    warn!("Grid spacing coarsened from {resolution:.2} Å to {h:.2} Å");
                }
                return Grid {
                    origin: Point3::new(lo[0] - pad, lo[1] - pad, lo[2] - pad),
                    h,
                    dims,
                };
            }
            h *= 1.25;
        }
    }

    fn len(&self) -> usize {
        self.dims.iter().product()
    }

    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.dims[1] + j) * self.dims[0] + i
    }

    fn coords(&self, idx: usize) -> [usize; 3] {
        let [nx, ny, _] = self.dims;
        [idx % nx, (idx / nx) % ny, idx / (nx * ny)]
    }

    fn point(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        self.origin + Vector3::new(i as f64, j as f64, k as f64) * self.h
    }

    fn point_at(&self, idx: usize) -> Point3<f64> {
        let [i, j, k] = self.coords(idx);
        self.point(i, j, k)
    }

    /// Grid indices along `axis` within `radius` of `center`.
    fn span(&self, center: f64, radius: f64, axis: usize) -> Range<usize> {
        let o = self.origin[axis];
        let start = ((center - radius - o) / self.h).floor().max(0.0) as usize;
        let end = (((center + radius - o) / self.h).ceil().max(0.0) as usize + 1).min(self.dims[axis]);
        start..end.max(start)
    }

    /// Visit every grid point within `radius` of `center`.
    fn for_each_within(&self, center: &Point3<f64>, radius: f64, mut f: impl FnMut(usize, f64)) {
        let r2 = radius * radius;
        for k in self.span(center.z, radius, 2) {
            for j in self.span(center.y, radius, 1) {
                for i in self.span(center.x, radius, 0) {
                    let d2 = (self.point(i, j, k) - *center).norm_squared();
                    if d2 <= r2 {
                        f(self.index(i, j, k), d2);
                    }
                }
            }
        }
    }

    fn touches(&self, mask: &[bool], idx: usize) -> bool {
        let [i, j, k] = self.coords(idx);
        let [nx, ny, nz] = self.dims;
        (i > 0 && mask[idx - 1])
            || (i + 1 < nx && mask[idx + 1])
            || (j > 0 && mask[idx - nx])
            || (j + 1 < ny && mask[idx + nx])
            || (k > 0 && mask[idx - nx * ny])
            || (k + 1 < nz && mask[idx + nx * ny])
    }
}

fn accessible_interior(grid: &Grid, atoms: &[MeshAtom], rp: f64) -> Vec<bool> {
    let mut inside = vec![false; grid.len()];
    for a in atoms {
        grid.for_each_within(&a.position, a.radius + rp, |idx, _| inside[idx] = true);
    }
    inside
}

fn probe_centers(
    grid: &Grid,
    inside: &[bool],
    atoms: &[MeshAtom],
    tree: &RTree<AtomPoint>,
    rp: f64,
    max_radius: f64,
) -> Vec<Point3<f64>> {
    let reach = max_radius + rp + 2.0 * grid.h;
    (0..grid.len())
        .filter(|&idx| !inside[idx] && grid.touches(inside, idx))
        .map(|idx| project_to_accessible(grid.point_at(idx), atoms, tree, rp, reach))
        .collect()
}

/// Move an exterior point onto the accessible surface of the closest atom,
/// unless that spot lies inside another atom's accessible sphere.
fn project_to_accessible(
    c: Point3<f64>,
    atoms: &[MeshAtom],
    tree: &RTree<AtomPoint>,
    rp: f64,
    reach: f64,
) -> Point3<f64> {
    let near: Vec<usize> = tree
        .locate_within_distance([c.x, c.y, c.z], reach * reach)
        .map(|p| p.data)
        .collect();
    let gap = |i: usize| (c - atoms[i].position).norm() - (atoms[i].radius + rp);
    let Some(closest) = near.iter().copied().min_by(|&a, &b| gap(a).total_cmp(&gap(b))) else {
        return c;
    };

    let atom = &atoms[closest];
    let dir = c - atom.position;
    let len = dir.norm();
    if len < 1e-9 {
        return c;
    }
    let projected = atom.position + dir * ((atom.radius + rp) / len);
    let blocked = near.iter().any(|&i| {
        i != closest && (projected - atoms[i].position).norm() < atoms[i].radius + rp - 1e-6
    });
    if blocked {
        c
    } else {
        projected
    }
}

/// `distance to nearest probe center - rp` for interior points (clamped to
/// `2h` deep inside), `-rp` outside. Positive means inside the excluded volume.
fn excluded_field(grid: &Grid, inside: &[bool], probes: &[Point3<f64>], rp: f64) -> Vec<f64> {
    let far = rp + 2.0 * grid.h;
    let mut dist: Vec<f64> = inside.iter().map(|&v| if v { far } else { 0.0 }).collect();
    for c in probes {
        grid.for_each_within(c, far, |idx, d2| {
            if inside[idx] {
                let d = d2.sqrt();
                if d < dist[idx] {
                    dist[idx] = d;
                }
            }
        });
    }
    dist.into_iter().map(|d| d - rp).collect()
}

/// Cube corners as grid offsets.
const CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Six tetrahedra sharing the 0-6 diagonal.
const TETS: [[usize; 4]; 6] = [
    [0, 5, 1, 6],
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
];

#[derive(Default)]
struct Isosurface {
    positions: Vec<f32>,
    indices: Vec<u32>,
    edge_vertex: FxHashMap<(usize, usize), u32>,
}

impl Isosurface {
    fn march(&mut self, grid: &Grid, field: &[f64]) {
        let [nx, ny, nz] = grid.dims;
        for k in 0..nz.saturating_sub(1) {
            for j in 0..ny.saturating_sub(1) {
                for i in 0..nx.saturating_sub(1) {
                    let ids = CORNERS.map(|[di, dj, dk]| grid.index(i + di, j + dj, k + dk));
                    let filled = ids.iter().filter(|&&n| field[n] > 0.0).count();
                    if filled == 0 || filled == 8 {
                        continue;
                    }
                    for tet in TETS {
                        self.tetrahedron(grid, field, tet.map(|c| ids[c]));
                    }
                }
            }
        }
    }

    fn tetrahedron(&mut self, grid: &Grid, field: &[f64], corners: [usize; 4]) {
        let (ins, outs): (Vec<usize>, Vec<usize>) =
            corners.into_iter().partition(|&n| field[n] > 0.0);
        let outward = centroid(grid, &outs) - centroid(grid, &ins);

        match (ins.as_slice(), outs.as_slice()) {
            ([a], [b, c, d]) => {
                let t = [
                    self.vertex(grid, field, *a, *b),
                    self.vertex(grid, field, *a, *c),
                    self.vertex(grid, field, *a, *d),
                ];
                self.triangle(t, &outward);
            }
            ([a, b, c], [d]) => {
                let t = [
                    self.vertex(grid, field, *a, *d),
                    self.vertex(grid, field, *b, *d),
                    self.vertex(grid, field, *c, *d),
                ];
                self.triangle(t, &outward);
            }
            ([a, b], [c, d]) => {
                let q = [
                    self.vertex(grid, field, *a, *c),
                    self.vertex(grid, field, *a, *d),
                    self.vertex(grid, field, *b, *d),
                    self.vertex(grid, field, *b, *c),
                ];
                self.triangle([q[0], q[1], q[2]], &outward);
                self.triangle([q[0], q[2], q[3]], &outward);
            }
            _ => {}
        }
    }

    /// Vertex on the edge between an inside and an outside grid point.
    fn vertex(&mut self, grid: &Grid, field: &[f64], inside: usize, outside: usize) -> u32 {
        let key = (inside.min(outside), inside.max(outside));
        if let Some(&v) = self.edge_vertex.get(&key) {
            return v;
        }
        let (fa, fb) = (field[inside], field[outside]);
        let t = if (fa - fb).abs() > f64::EPSILON {
            fa / (fa - fb)
        } else {
            0.5
        };
        let pa = grid.point_at(inside);
        let p = pa + (grid.point_at(outside) - pa) * t;

        let v = (self.positions.len() / 3) as u32;
        self.positions.extend([p.x as f32, p.y as f32, p.z as f32]);
        self.edge_vertex.insert(key, v);
        v
    }

    fn triangle(&mut self, mut t: [u32; 3], outward: &Vector3<f64>) {
        if t[0] == t[1] || t[1] == t[2] || t[0] == t[2] {
            return;
        }
        let p = t.map(|v| self.position(v));
        let n = (p[1] - p[0]).cross(&(p[2] - p[0]));
        if n.norm_squared() < 1e-16 {
            return;
        }
        if n.dot(outward) < 0.0 {
            t.swap(1, 2);
        }
        self.indices.extend(t);
    }

    fn position(&self, v: u32) -> Point3<f64> {
        let i = v as usize * 3;
        Point3::new(
            f64::from(self.positions[i]),
            f64::from(self.positions[i + 1]),
            f64::from(self.positions[i + 2]),
        )
    }
}

fn centroid(grid: &Grid, points: &[usize]) -> Vector3<f64> {
    let sum = points
        .iter()
        .fold(Vector3::zeros(), |acc, &idx| acc + grid.point_at(idx).coords);
    sum / points.len().max(1) as f64
}

/// Area-weighted average of adjacent face normals.
fn vertex_normals(positions: &[f32], indices: &[u32]) -> Vec<f32> {
    let vertex = |v: u32| {
        let i = v as usize * 3;
        Vector3::new(positions[i], positions[i + 1], positions[i + 2])
    };
    let mut acc = vec![Vector3::<f32>::zeros(); positions.len() / 3];
    for tri in indices.chunks_exact(3) {
        let n = (vertex(tri[1]) - vertex(tri[0])).cross(&(vertex(tri[2]) - vertex(tri[0])));
        for &v in tri {
            acc[v as usize] += n;
        }
    }
    acc.into_iter()
        .flat_map(|n| {
            let n = n.try_normalize(1e-12).unwrap_or_else(Vector3::z);
            [n.x, n.y, n.z]
        })
        .collect()
}

fn nearest_atoms(positions: &[f32], tree: &RTree<AtomPoint>) -> Vec<u32> {
    positions
        .par_chunks_exact(3)
        .map(|p| {
            let q = [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])];
            tree.nearest_neighbor(&q).map_or(0, |a| a.data as u32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(resolution: f64) -> SurfaceParams {
        SurfaceParams {
            probe_radius: 1.4,
            resolution,
        }
    }

    #[test]
    fn empty_input_gives_empty_mesh() {
        let mesh = molecular_surface(&[], &params(0.5));
        assert_eq!(mesh.vertex_count(), 0);
        assert!(mesh.indices.is_empty());
    }

    #[test]
    fn single_atom_surface_is_a_sphere() {
        let atom = MeshAtom {
            position: Point3::new(1.0, -2.0, 3.0),
            radius: 1.7,
        };
        let mesh = molecular_surface(&[atom], &params(0.3));
        assert!(mesh.vertex_count() > 100);
        assert_eq!(mesh.groups.len(), mesh.vertex_count());
        assert_eq!(mesh.normals.len(), mesh.positions.len());
        assert!(mesh.groups.iter().all(|&g| g == 0));

        // A lone atom's excluded surface is its van der Waals sphere
        for p in mesh.positions.chunks_exact(3) {
            let r = (Point3::new(p[0] as f64, p[1] as f64, p[2] as f64) - atom.position).norm();
            assert!((r - 1.7).abs() < 0.35, "vertex at distance {r}");
        }

        // Normals point away from the center
        for (p, n) in mesh.positions.chunks_exact(3).zip(mesh.normals.chunks_exact(3)) {
            let radial = Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64) - atom.position.coords;
            let normal = Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64);
            assert!(radial.dot(&normal) > 0.0);
        }
    }

    #[test]
    fn triangles_are_outward_facing() {
        let atom = MeshAtom {
            position: Point3::origin(),
            radius: 1.5,
        };
        let mesh = molecular_surface(&[atom], &params(0.4));
        let v = |i: u32| {
            let i = i as usize * 3;
            Vector3::new(
                mesh.positions[i] as f64,
                mesh.positions[i + 1] as f64,
                mesh.positions[i + 2] as f64,
            )
        };
        for tri in mesh.indices.chunks_exact(3) {
            let (a, b, c) = (v(tri[0]), v(tri[1]), v(tri[2]));
            let n = (b - a).cross(&(c - a));
            assert!(n.dot(&((a + b + c) / 3.0)) > 0.0);
        }
    }

    #[test]
    fn vertices_are_labelled_with_the_nearest_atom() {
        let atoms = [
            MeshAtom {
                position: Point3::new(-4.0, 0.0, 0.0),
                radius: 1.5,
            },
            MeshAtom {
                position: Point3::new(4.0, 0.0, 0.0),
                radius: 1.5,
            },
        ];
        let mesh = molecular_surface(&atoms, &params(0.4));
        for (p, &g) in mesh.positions.chunks_exact(3).zip(&mesh.groups) {
            let expected = if p[0] < 0.0 { 0 } else { 1 };
            assert_eq!(g, expected);
        }
        assert!(mesh.groups.contains(&0) && mesh.groups.contains(&1));
    }

    #[test]
    fn element_radii() {
        let carbon = element_radius("C");
        assert!(carbon > 1.0 && carbon < 2.5);
        assert_eq!(element_radius("Xx"), DEFAULT_VDW_RADIUS);
        assert_eq!(element_radius(""), DEFAULT_VDW_RADIUS);
    }
}
