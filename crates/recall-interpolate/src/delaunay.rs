//! Delaunay triangulation in arbitrary dimension (Bowyer-Watson) and
//! barycentric evaluation on top of it.
//!
//! Cells whose circumsphere is large enough to reach the enclosing super
//! simplex never survive Bowyer-Watson, which leaves holes along flat parts
//! of the hull. Those are closed afterwards by gift-wrapping from every
//! facet that still has a cell on one side only.

use std::collections::HashMap;

use crate::linalg::{dot, invert, solve, squared_distance, sub};

/// Barycentric coordinates down to this value still count as inside.
const INSIDE_TOLERANCE: f64 = -1e-9;

/// Relative margin of the strict in-circumsphere test.
const SPHERE_MARGIN: f64 = 1e-12;

/// A point must lie this far beyond a facet, relative to the point span, to
/// count as being on its open side.
const BEYOND_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone)]
struct Sphere {
    center: Vec<f64>,
    radius2: f64,
}

impl Sphere {
    fn strictly_contains(&self, point: &[f64]) -> bool {
        squared_distance(point, &self.center) < self.radius2 * (1.0 - SPHERE_MARGIN)
    }
}

/// Circumsphere of a simplex given by its `D + 1` vertices.
fn circumsphere(vertices: &[&[f64]]) -> Option<Sphere> {
    let origin = vertices[0];
    let norm0: f64 = origin.iter().map(|v| v * v).sum();
    let mut a = Vec::with_capacity(vertices.len() - 1);
    let mut b = Vec::with_capacity(vertices.len() - 1);
    for v in &vertices[1..] {
        a.push(v.iter().zip(origin).map(|(x, o)| 2.0 * (x - o)).collect());
        b.push(v.iter().map(|x| x * x).sum::<f64>() - norm0);
    }
    let center = solve(a, b)?;
    let radius2 = squared_distance(origin, &center);
    Some(Sphere { center, radius2 })
}

/// A finished simplex, ready for point location.
#[derive(Debug)]
struct Cell {
    vertices: Vec<usize>,
    /// Inverse of the matrix whose columns are `v_i - v_0`.
    inverse: Vec<Vec<f64>>,
}

/// Triangulation of a set of distinct points in `R^D`, `D >= 2`.
#[derive(Debug)]
pub(crate) struct Triangulation {
    points: Vec<Vec<f64>>,
    cells: Vec<Cell>,
}

impl Triangulation {
    /// Triangulate `points`, which must be pairwise distinct and share one
    /// dimension. Degenerate inputs (fewer than `D + 1` points, or all
    /// points in a hyperplane) yield no cells.
    pub(crate) fn new(points: Vec<Vec<f64>>) -> Self {
        let n = points.len();
        let dim = points.first().map(Vec::len).unwrap_or(0);
        if dim == 0 || n <= dim {
            return Self {
                points,
                cells: Vec::new(),
            };
        }

        let (lo, span) = bounds(&points, dim);
        let mut all = points.clone();
        all.extend(super_simplex(&lo, span));

        let sphere_of = |vertices: &[usize], all: &[Vec<f64>]| {
            let coords: Vec<&[f64]> = vertices.iter().map(|&v| all[v].as_slice()).collect();
            circumsphere(&coords)
        };

        let mut simplices: Vec<(Vec<usize>, Sphere)> = Vec::new();
        let initial: Vec<usize> = (n..n + dim + 1).collect();
        if let Some(sphere) = sphere_of(&initial, &all) {
            simplices.push((initial, sphere));
        }

        for p in 0..n {
            let point = &all[p];
            let (bad, good): (Vec<_>, Vec<_>) = simplices
                .into_iter()
                .partition(|(_, sphere)| sphere.strictly_contains(point));
            simplices = good;

            // Facets of the cavity boundary appear in exactly one bad simplex.
            let mut boundary: HashMap<Vec<usize>, usize> = HashMap::new();
            for (vertices, _) in &bad {
                for (facet, _) in facets(vertices) {
                    *boundary.entry(facet).or_default() += 1;
                }
            }
            for (facet, count) in boundary {
                if count != 1 {
                    continue;
                }
                let mut vertices = facet;
                vertices.push(p);
                if let Some(sphere) = sphere_of(&vertices, &all) {
                    simplices.push((vertices, sphere));
                }
            }
        }

        let mut cells: Vec<Cell> = simplices
            .into_iter()
            .filter(|(vertices, _)| vertices.iter().all(|&v| v < n))
            .filter_map(|(vertices, _)| Cell::new(vertices, &points))
            .collect();
        fill_gaps(&points, &mut cells, BEYOND_TOLERANCE * span);
        tracing::debug!(points = n, dim, cells = cells.len(), "triangulated support points");
        Self { points, cells }
    }

    /// Barycentric weights of `query` in the first cell containing it.
    pub(crate) fn locate(&self, query: &[f64]) -> Option<Vec<(usize, f64)>> {
        self.cells.iter().find_map(|cell| cell.weights(query, &self.points))
    }

    #[cfg(test)]
    fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

impl Cell {
    fn new(vertices: Vec<usize>, points: &[Vec<f64>]) -> Option<Self> {
        let origin = &points[vertices[0]];
        let dim = origin.len();
        // Row r, column c: component r of (v_{c+1} - v_0).
        let matrix: Vec<Vec<f64>> = (0..dim)
            .map(|r| {
                vertices[1..]
                    .iter()
                    .map(|&v| points[v][r] - origin[r])
                    .collect()
            })
            .collect();
        let inverse = invert(&matrix)?;
        Some(Self { vertices, inverse })
    }

    fn weights(&self, query: &[f64], points: &[Vec<f64>]) -> Option<Vec<(usize, f64)>> {
        let origin = &points[self.vertices[0]];
        let offset: Vec<f64> = query.iter().zip(origin).map(|(q, o)| q - o).collect();
        let lambdas: Vec<f64> = self
            .inverse
            .iter()
            .map(|row| row.iter().zip(&offset).map(|(a, b)| a * b).sum())
            .collect();
        let first = 1.0 - lambdas.iter().sum::<f64>();
        if first < INSIDE_TOLERANCE || lambdas.iter().any(|&l| l < INSIDE_TOLERANCE) {
            return None;
        }
        let mut weights = Vec::with_capacity(self.vertices.len());
        weights.push((self.vertices[0], first));
        weights.extend(self.vertices[1..].iter().copied().zip(lambdas));
        Some(weights)
    }
}

/// Facets of a simplex as sorted vertex lists, each paired with the vertex
/// opposite to it.
fn facets(vertices: &[usize]) -> impl Iterator<Item = (Vec<usize>, usize)> + '_ {
    (0..vertices.len()).map(move |skip| {
        let mut facet: Vec<usize> = vertices
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != skip)
            .map(|(_, &v)| v)
            .collect();
        facet.sort_unstable();
        (facet, vertices[skip])
    })
}

/// Close the holes Bowyer-Watson leaves next to the hull.
///
/// A facet with a cell on one side only is either part of the hull or the
/// rim of a hole. Points strictly beyond it mean the latter; of those, the
/// one whose circumsphere with the facet has the lowest centre along the
/// outward normal forms the missing Delaunay cell. New cells open new
/// facets, which are wrapped in turn.
fn fill_gaps(points: &[Vec<f64>], cells: &mut Vec<Cell>, tolerance: f64) {
    // Facet -> vertex opposite to it while only one cell uses the facet.
    let mut open: HashMap<Vec<usize>, Option<usize>> = HashMap::new();
    for cell in cells.iter() {
        for (facet, opposite) in facets(&cell.vertices) {
            open.entry(facet)
                .and_modify(|o| *o = None)
                .or_insert(Some(opposite));
        }
    }
    let mut pending: Vec<Vec<usize>> = open
        .iter()
        .filter(|(_, opposite)| opposite.is_some())
        .map(|(facet, _)| facet.clone())
        .collect();
    pending.sort_unstable();

    let dim = points.first().map(Vec::len).unwrap_or(0);
    let budget = points.len() * points.len() * (dim + 1);
    let mut added = 0;
    while let Some(facet) = pending.pop() {
        let Some(&Some(opposite)) = open.get(&facet) else {
            continue;
        };
        let Some(normal) = outward_normal(points, &facet, opposite) else {
            continue;
        };
        let base = &points[facet[0]];

        let mut best: Option<(f64, Cell)> = None;
        for (p, point) in points.iter().enumerate() {
            if facet.contains(&p) || dot(&sub(point, base), &normal) <= tolerance {
                continue;
            }
            let mut vertices = facet.clone();
            vertices.push(p);
            let coords: Vec<&[f64]> = vertices.iter().map(|&v| points[v].as_slice()).collect();
            let Some(sphere) = circumsphere(&coords) else {
                continue;
            };
            let height = dot(&sub(&sphere.center, base), &normal);
            if best.as_ref().is_some_and(|(h, _)| *h <= height) {
                continue;
            }
            if let Some(cell) = Cell::new(vertices, points) {
                best = Some((height, cell));
            }
        }
        // Nothing beyond: a hull facet.
        let Some((_, cell)) = best else {
            continue;
        };

        if added == budget {
            tracing::warn!(added, "gave up filling triangulation gaps");
            break;
        }
        added += 1;
        for (facet, opposite) in facets(&cell.vertices) {
            match open.get_mut(&facet) {
                Some(slot) => *slot = None,
                None => {
                    open.insert(facet.clone(), Some(opposite));
                    pending.push(facet);
                }
            }
        }
        cells.push(cell);
    }
    if added > 0 {
        tracing::debug!(added, "filled gaps along the hull");
    }
}

/// Unit normal of `facet` pointing away from `opposite`.
fn outward_normal(points: &[Vec<f64>], facet: &[usize], opposite: usize) -> Option<Vec<f64>> {
    let base = &points[facet[0]];
    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(facet.len() - 1);
    for &v in &facet[1..] {
        let edge = reject(sub(&points[v], base), &basis);
        basis.push(normalized(edge)?);
    }
    normalized(reject(sub(base, &points[opposite]), &basis))
}

/// Remove the components of `v` along the orthonormal `basis`.
fn reject(mut v: Vec<f64>, basis: &[Vec<f64>]) -> Vec<f64> {
    for u in basis {
        let along = dot(&v, u);
        v.iter_mut().zip(u).for_each(|(x, y)| *x -= along * y);
    }
    v
}

fn normalized(mut v: Vec<f64>) -> Option<Vec<f64>> {
    let norm = dot(&v, &v).sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    v.iter_mut().for_each(|x| *x /= norm);
    Some(v)
}

/// Lower corner of the bounding box of `points` and its largest side,
/// which is 1 for a single point.
fn bounds(points: &[Vec<f64>], dim: usize) -> (Vec<f64>, f64) {
    let mut lo = vec![f64::INFINITY; dim];
    let mut hi = vec![f64::NEG_INFINITY; dim];
    for point in points {
        for (j, &v) in point.iter().enumerate() {
            lo[j] = lo[j].min(v);
            hi[j] = hi[j].max(v);
        }
    }
    let span = lo
        .iter()
        .zip(&hi)
        .fold(0.0_f64, |m, (l, h)| m.max(h - l));
    (lo, if span > 0.0 { span } else { 1.0 })
}

/// Vertices of a simplex far larger than the box at `lo` with side `span`.
fn super_simplex(lo: &[f64], span: f64) -> Vec<Vec<f64>> {
    let dim = lo.len();
    let corner: Vec<f64> = lo.iter().map(|l| l - 1000.0 * span).collect();
    let edge = dim as f64 * 3000.0 * span;

    let mut vertices = vec![corner.clone()];
    for j in 0..dim {
        let mut v = corner.clone();
        v[j] += edge;
        vertices.push(v);
    }
    vertices
}
