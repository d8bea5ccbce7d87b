//! Piecewise-linear interpolation over scattered support points.
//!
//! An [`Interpolator`] maps points of `R^D` to arrays of a fixed value shape.
//! One-dimensional inputs are interpolated linearly between sorted
//! neighbours; higher dimensions use a Delaunay triangulation of the support
//! points and barycentric weights inside each simplex. Queries outside the
//! support range (or convex hull) evaluate to NaN.
//!
//! ```rust
//! use recall_core::Array;
//! use recall_interpolate::Interpolator;
//!
//! let interp = Interpolator::new(
//!     &Array::from_vec(vec![0.0, 1.0, 2.0, 3.0]),
//!     &Array::from_vec(vec![0.0, 1.0, 2.0, 3.0]),
//! )
//! .unwrap();
//! assert_eq!(interp.evaluate_point(&[1.5]).unwrap().as_scalar(), Some(1.5));
//! ```

mod delaunay;
mod linalg;
mod linear;

use std::sync::OnceLock;

use recall_core::{Array, RecallError};

use crate::delaunay::Triangulation;
use crate::linalg::squared_distance;
use crate::linear::Linear;

#[derive(Debug)]
enum Method {
    Linear(Linear),
    /// `owners[i]` is the support index behind triangulation vertex `i`.
    Delaunay { tri: Triangulation, owners: Vec<usize> },
}

/// Interpolates values known at a set of support points.
#[derive(Debug)]
pub struct Interpolator {
    dim: usize,
    points: Vec<Vec<f64>>,
    /// Flattened values, one per support point.
    values: Vec<Vec<f64>>,
    value_shape: Vec<usize>,
    method: OnceLock<Method>,
}

impl Interpolator {
    /// Build from a points array and a values array sharing the leading
    /// axis.
    ///
    /// Points of shape `(N,)` (or a scalar) are one-dimensional; shape
    /// `(N, D)` gives points in `R^D`. Values of shape `(N,)` are scalars,
    /// otherwise each support point carries an array of shape
    /// `values.shape()[1..]`.
    pub fn new(points: &Array, values: &Array) -> Result<Self, RecallError> {
        let (n, dim) = match points.shape() {
            [] => (1, 1),
            [n] => (*n, 1),
            [n, d] => (*n, *d),
            other => {
                return Err(RecallError::Interpolation(format!(
                    "points must have at most two dimensions, got shape {other:?}"
                )))
            }
        };
        if dim == 0 && n > 0 {
            return Err(RecallError::Interpolation(
                "points must have at least one coordinate".to_string(),
            ));
        }
        let Some((&count, value_shape)) = values.shape().split_first() else {
            return Err(RecallError::Interpolation(
                "values must have a leading axis of support points".to_string(),
            ));
        };
        if count != n {
            return Err(RecallError::Interpolation(format!(
                "got {n} support points but {count} values"
            )));
        }

        let coords = points.as_slice();
        let point_list: Vec<Vec<f64>> = (0..n).map(|i| coords[i * dim..(i + 1) * dim].to_vec()).collect();
        let width: usize = value_shape.iter().product();
        let data = values.as_slice();
        let value_list: Vec<Vec<f64>> = (0..n).map(|i| data[i * width..(i + 1) * width].to_vec()).collect();
        Ok(Self::build(dim, point_list, value_list, value_shape.to_vec()))
    }

    /// Build from one coordinate vector and one value array per support
    /// point. All points must share their dimension and all values their
    /// shape. An empty support set is allowed; it is infinitely far from
    /// every query.
    pub fn from_support(points: Vec<Vec<f64>>, values: Vec<Array>) -> Result<Self, RecallError> {
        if points.len() != values.len() {
            return Err(RecallError::Interpolation(format!(
                "got {} support points but {} values",
                points.len(),
                values.len()
            )));
        }
        let dim = points.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = points.iter().find(|p| p.len() != dim) {
            return Err(RecallError::Interpolation(format!(
                "support points mix dimensions {dim} and {}",
                bad.len()
            )));
        }
        if !points.is_empty() && dim == 0 {
            return Err(RecallError::Interpolation(
                "points must have at least one coordinate".to_string(),
            ));
        }
        let value_shape = values.first().map(|v| v.shape().to_vec()).unwrap_or_default();
        if let Some(bad) = values.iter().find(|v| v.shape() != value_shape.as_slice()) {
            return Err(RecallError::Interpolation(format!(
                "support values mix shapes {value_shape:?} and {:?}",
                bad.shape()
            )));
        }
        let values = values.into_iter().map(Array::into_vec).collect();
        Ok(Self::build(dim, points, values, value_shape))
    }

    fn build(dim: usize, points: Vec<Vec<f64>>, values: Vec<Vec<f64>>, value_shape: Vec<usize>) -> Self {
        tracing::info!(
            input_dim = dim,
            output_dim = value_shape.iter().product::<usize>(),
            points = points.len(),
            "constructed interpolator from R^D to R^V"
        );
        Self {
            dim,
            points,
            values,
            value_shape,
            method: OnceLock::new(),
        }
    }

    /// Dimension `D` of the input space (0 for an empty support set).
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of support points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn value_shape(&self) -> &[usize] {
        &self.value_shape
    }

    /// Euclidean distance from `point` to the closest support point;
    /// infinite when there are none.
    pub fn distance(&self, point: &[f64]) -> Result<f64, RecallError> {
        if self.points.is_empty() {
            return Ok(f64::INFINITY);
        }
        self.check_dim(point.len())?;
        Ok(self
            .points
            .iter()
            .map(|p| squared_distance(p, point))
            .fold(f64::INFINITY, f64::min)
            .sqrt())
    }

    /// [`Interpolator::distance`] for every query of a batch, laid out like
    /// [`Interpolator::evaluate`] lays out its queries. Fails on an empty
    /// support set, whose query layout is undefined.
    pub fn distance_many(&self, queries: &Array) -> Result<Array, RecallError> {
        let (shape, rows) = self.split_queries(queries)?;
        let distances = rows
            .iter()
            .map(|q| self.distance(q))
            .collect::<Result<Vec<_>, _>>()?;
        Array::from_shape_vec(shape, distances)
    }

    /// Interpolated value at a single point, shaped like the support values.
    pub fn evaluate_point(&self, point: &[f64]) -> Result<Array, RecallError> {
        self.check_dim(point.len())?;
        Array::from_shape_vec(self.value_shape.clone(), self.eval(point))
    }

    /// Interpolate a batch of queries.
    ///
    /// For `D == 1` every element of `queries` is a query; otherwise the last
    /// axis holds the coordinates. The result has the query layout followed
    /// by the value shape.
    pub fn evaluate(&self, queries: &Array) -> Result<Array, RecallError> {
        let (mut shape, rows) = self.split_queries(queries)?;
        let mut data = Vec::with_capacity(rows.len() * self.value_shape.iter().product::<usize>());
        for row in &rows {
            data.extend(self.eval(row));
        }
        shape.extend_from_slice(&self.value_shape);
        Array::from_shape_vec(shape, data)
    }

    fn check_dim(&self, got: usize) -> Result<(), RecallError> {
        if self.points.is_empty() {
            return Err(RecallError::Interpolation(
                "cannot interpolate without support points".to_string(),
            ));
        }
        if got != self.dim {
            return Err(RecallError::Interpolation(format!(
                "query has {got} coordinates, support points have {}",
                self.dim
            )));
        }
        Ok(())
    }

    /// Query layout and coordinate rows of a batch.
    fn split_queries(&self, queries: &Array) -> Result<(Vec<usize>, Vec<Vec<f64>>), RecallError> {
        if self.points.is_empty() {
            return Err(RecallError::Interpolation(
                "cannot interpolate without support points".to_string(),
            ));
        }
        if self.dim == 1 {
            let rows = queries.as_slice().iter().map(|&x| vec![x]).collect();
            return Ok((queries.shape().to_vec(), rows));
        }
        let Some((&last, layout)) = queries.shape().split_last() else {
            return Err(RecallError::Interpolation(format!(
                "a scalar query cannot address points in R^{}",
                self.dim
            )));
        };
        self.check_dim(last)?;
        let rows = queries.as_slice().chunks(last).map(<[f64]>::to_vec).collect();
        Ok((layout.to_vec(), rows))
    }

    /// Flattened value at `point`; NaN outside the support.
    fn eval(&self, point: &[f64]) -> Vec<f64> {
        let width = self.value_shape.iter().product();
        // Exact hits return the stored value even where no cell exists.
        if let Some(i) = self.points.iter().rposition(|p| p.as_slice() == point) {
            return self.values[i].clone();
        }
        let method = self.method.get_or_init(|| self.build_method());
        let value = match method {
            Method::Linear(linear) => linear.eval(point[0]),
            Method::Delaunay { tri, owners } => tri.locate(point).map(|weights| {
                let mut out = vec![0.0; width];
                for (vertex, weight) in weights {
                    for (o, v) in out.iter_mut().zip(&self.values[owners[vertex]]) {
                        *o += weight * v;
                    }
                }
                out
            }),
        };
        value.unwrap_or_else(|| vec![f64::NAN; width])
    }

    fn build_method(&self) -> Method {
        if self.dim == 1 {
            let xs: Vec<f64> = self.points.iter().map(|p| p[0]).collect();
            return Method::Linear(Linear::new(&xs, &self.values));
        }
        // Later duplicates win, matching the exact-hit lookup.
        let mut unique: Vec<Vec<f64>> = Vec::new();
        let mut owners: Vec<usize> = Vec::new();
        for (i, point) in self.points.iter().enumerate() {
            match unique.iter().position(|p| p == point) {
                Some(j) => owners[j] = i,
                None => {
                    unique.push(point.clone());
                    owners.push(i);
                }
            }
        }
        Method::Delaunay {
            tri: Triangulation::new(unique),
            owners,
        }
    }
}
