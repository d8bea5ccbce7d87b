use recall_core::{Array, RecallError};
use recall_interpolate::Interpolator;

fn arange(n: usize) -> Array {
    Array::from_vec((0..n).map(|i| i as f64).collect())
}

fn close(a: &Array, b: &Array) -> bool {
    a.all_close(b, 1e-9, 1e-12)
}

/// 3x3 grid on [0, 2]^2 with its points as rows.
fn grid_points() -> Vec<Vec<f64>> {
    let mut points = Vec::new();
    for i in 0..3 {
        for j in 0..3 {
            points.push(vec![i as f64, j as f64]);
        }
    }
    points
}

// ---------------------------------------------------------------------------
// One-dimensional inputs
// ---------------------------------------------------------------------------

#[test]
fn one_to_one() {
    let interp = Interpolator::new(&arange(4), &arange(4)).unwrap();
    assert_eq!(interp.evaluate_point(&[1.5]).unwrap().as_scalar(), Some(1.5));
    let batch = interp.evaluate(&Array::from_vec(vec![1.5, 2.5])).unwrap();
    assert!(close(&batch, &Array::from_vec(vec![1.5, 2.5])));
}

#[test]
fn scalar_query_gives_scalar_result() {
    let interp = Interpolator::new(&arange(4), &arange(4)).unwrap();
    let out = interp.evaluate(&Array::scalar(0.25)).unwrap();
    assert_eq!(out.ndim(), 0);
    assert_eq!(out.as_scalar(), Some(0.25));
}

#[test]
fn one_to_two() {
    let values = Array::from_shape_vec(vec![4, 2], (0..8).map(f64::from).collect()).unwrap();
    let interp = Interpolator::new(&arange(4), &values).unwrap();

    let single = interp.evaluate_point(&[1.5]).unwrap();
    assert!(close(&single, &Array::from_vec(vec![3.0, 4.0])));

    let batch = interp.evaluate(&Array::from_vec(vec![1.5, 2.5])).unwrap();
    let expected = Array::from_shape_vec(vec![2, 2], vec![3.0, 4.0, 5.0, 6.0]).unwrap();
    assert!(close(&batch, &expected));
}

#[test]
fn one_to_matrix_keeps_value_shape() {
    let values = Array::from_shape_vec(vec![5, 3, 2], (0..30).map(f64::from).collect()).unwrap();
    let interp = Interpolator::new(&arange(5), &values).unwrap();
    assert_eq!(interp.value_shape(), &[3, 2]);
    assert_eq!(interp.evaluate(&Array::scalar(0.01)).unwrap().shape(), &[3, 2]);
    assert_eq!(
        interp.evaluate(&Array::from_vec(vec![0.01, 0.01])).unwrap().shape(),
        &[2, 3, 2]
    );
}

#[test]
fn column_points_are_one_dimensional() {
    let points = Array::from_shape_vec(vec![3, 1], vec![0.0, 1.0, 2.0]).unwrap();
    let values = Array::from_vec(vec![0.0, 10.0, 40.0]);
    let interp = Interpolator::new(&points, &values).unwrap();
    assert_eq!(interp.dim(), 1);
    assert_eq!(interp.evaluate_point(&[1.5]).unwrap().as_scalar(), Some(25.0));
}

#[test]
fn outside_the_range_is_nan() {
    let interp = Interpolator::new(&arange(4), &arange(4)).unwrap();
    let out = interp.evaluate(&Array::from_vec(vec![-1.0, 3.5])).unwrap();
    assert!(out.as_slice().iter().all(|v| v.is_nan()));
}

// ---------------------------------------------------------------------------
// Higher-dimensional inputs
// ---------------------------------------------------------------------------

#[test]
fn two_to_one_reproduces_a_linear_function() {
    // f(x, y) = 2x - y + 1 is reproduced exactly by any triangulation.
    let points = grid_points();
    let values: Vec<Array> = points
        .iter()
        .map(|p| Array::from_vec(vec![2.0 * p[0] - p[1] + 1.0]))
        .collect();
    let interp = Interpolator::from_support(points, values).unwrap();

    for (x, y) in [(0.5, 0.5), (1.25, 1.75), (1.9, 0.3), (0.0, 1.5)] {
        let out = interp.evaluate_point(&[x, y]).unwrap();
        assert_eq!(out.shape(), &[1]);
        assert!((out.as_slice()[0] - (2.0 * x - y + 1.0)).abs() < 1e-9);
    }
}

#[test]
fn two_to_many_shapes() {
    let points = grid_points();
    let values: Vec<Array> = points
        .iter()
        .map(|p| Array::from_vec(vec![p[0], p[1], p[0] + p[1]]))
        .collect();
    let interp = Interpolator::from_support(points, values).unwrap();

    assert_eq!(interp.evaluate(&Array::from_vec(vec![0.01, 0.01])).unwrap().shape(), &[3]);
    let batch = Array::from_rows(&[vec![0.01, 0.01], vec![1.5, 0.5]]).unwrap();
    let out = interp.evaluate(&batch).unwrap();
    assert_eq!(out.shape(), &[2, 3]);
    let expected =
        Array::from_shape_vec(vec![2, 3], vec![0.01, 0.01, 0.02, 1.5, 0.5, 2.0]).unwrap();
    assert!(close(&out, &expected));
}

#[test]
fn square_corners_interpolate_the_center() {
    let points = Array::from_rows(&[
        vec![1.0, 1.0],
        vec![2.0, 1.0],
        vec![1.0, 2.0],
        vec![2.0, 2.0],
    ])
    .unwrap();
    // Values [x + y, x] at each corner.
    let values = Array::from_rows(&[
        vec![2.0, 1.0],
        vec![3.0, 2.0],
        vec![3.0, 1.0],
        vec![4.0, 2.0],
    ])
    .unwrap();
    let interp = Interpolator::new(&points, &values).unwrap();
    let out = interp.evaluate_point(&[1.5, 1.5]).unwrap();
    assert!(close(&out, &Array::from_vec(vec![3.0, 1.5])));
}

#[test]
fn flat_cells_along_the_hull_are_interpolated() {
    let points = vec![
        vec![0.0, 0.0],
        vec![2.0, 0.0],
        vec![1.0, 1e-6],
        vec![1.0, 1.0],
    ];
    let values: Vec<Array> = points.iter().map(|p| Array::scalar(p[0] + 2.0 * p[1])).collect();
    let interp = Interpolator::from_support(points, values).unwrap();
    for (x, y) in [(1.0, 5e-7), (0.5, 2e-7)] {
        let out = interp.evaluate_point(&[x, y]).unwrap().as_scalar().unwrap();
        assert!((out - (x + 2.0 * y)).abs() < 1e-9, "({x}, {y}) -> {out}");
    }
}

#[test]
fn every_query_inside_a_scattered_hull_is_finite() {
    // Deterministic LCG, so failures are reproducible.
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        (state >> 11) as f64 / (1u64 << 53) as f64
    };

    // A nearly flat lower edge under a cloud of points.
    let mut points: Vec<Vec<f64>> = (0..12)
        .map(|_| {
            let x = 3.0 * next();
            vec![x, 1e-5 * x * (3.0 - x)]
        })
        .collect();
    points.extend((0..12).map(|_| vec![3.0 * next(), 0.2 + 2.0 * next()]));
    points.push(vec![0.0, 0.0]);
    points.push(vec![3.0, 0.0]);
    let f = |p: &[f64]| p[0] + 2.0 * p[1];
    let values: Vec<Array> = points.iter().map(|p| Array::scalar(f(p))).collect();
    let interp = Interpolator::from_support(points.clone(), values).unwrap();

    for _ in 0..200 {
        let picks: Vec<&Vec<f64>> = (0..3)
            .map(|_| &points[(next() * points.len() as f64) as usize % points.len()])
            .collect();
        let raw: Vec<f64> = (0..3).map(|_| next() + 1e-3).collect();
        let total: f64 = raw.iter().sum();
        let mut q = [0.0, 0.0];
        for (p, w) in picks.iter().zip(&raw) {
            q[0] += w / total * p[0];
            q[1] += w / total * p[1];
        }
        let out = interp.evaluate_point(&q).unwrap().as_scalar().unwrap();
        assert!(out.is_finite(), "{q:?} inside the hull evaluated to {out}");
        assert!((out - f(&q)).abs() < 1e-6, "{q:?} -> {out}");
    }
}

#[test]
fn outside_the_hull_is_nan() {
    let points = grid_points();
    let values: Vec<Array> = points.iter().map(|p| Array::scalar(p[0])).collect();
    let interp = Interpolator::from_support(points, values).unwrap();
    assert!(interp.evaluate_point(&[2.5, 1.0]).unwrap().as_scalar().unwrap().is_nan());
    assert!(interp.evaluate_point(&[-0.1, -0.1]).unwrap().as_scalar().unwrap().is_nan());
}

#[test]
fn three_dimensional_tetrahedra() {
    // Cube corners, f(x, y, z) = x + 2y + 3z.
    let mut points = Vec::new();
    for x in [0.0, 1.0] {
        for y in [0.0, 1.0] {
            for z in [0.0, 1.0] {
                points.push(vec![x, y, z]);
            }
        }
    }
    let values: Vec<Array> = points
        .iter()
        .map(|p| Array::scalar(p[0] + 2.0 * p[1] + 3.0 * p[2]))
        .collect();
    let interp = Interpolator::from_support(points, values).unwrap();
    for q in [[0.5, 0.5, 0.5], [0.1, 0.7, 0.3], [0.9, 0.05, 0.95]] {
        let got = interp.evaluate_point(&q).unwrap().as_scalar().unwrap();
        assert!((got - (q[0] + 2.0 * q[1] + 3.0 * q[2])).abs() < 1e-9);
    }
}

#[test]
fn support_points_return_their_stored_values() {
    // Too few points to triangulate; exact hits still resolve.
    let interp = Interpolator::from_support(
        vec![vec![0.0, 0.0], vec![1.0, 1.0]],
        vec![Array::scalar(5.0), Array::scalar(7.0)],
    )
    .unwrap();
    assert_eq!(interp.evaluate_point(&[1.0, 1.0]).unwrap().as_scalar(), Some(7.0));
    assert!(interp.evaluate_point(&[0.5, 0.5]).unwrap().as_scalar().unwrap().is_nan());
}

// ---------------------------------------------------------------------------
// Distance
// ---------------------------------------------------------------------------

#[test]
fn distance_to_closest_support_point() {
    let interp = Interpolator::from_support(
        vec![vec![0.0, 0.0], vec![3.0, 0.0]],
        vec![Array::scalar(0.0), Array::scalar(1.0)],
    )
    .unwrap();
    assert_eq!(interp.distance(&[3.0, 4.0]).unwrap(), 4.0);
    assert_eq!(interp.distance(&[0.0, 0.0]).unwrap(), 0.0);

    let batch = Array::from_rows(&[vec![3.0, 4.0], vec![-3.0, -4.0]]).unwrap();
    assert_eq!(interp.distance_many(&batch).unwrap().as_slice(), &[4.0, 5.0]);
}

#[test]
fn empty_support_is_infinitely_far() {
    let interp = Interpolator::from_support(Vec::new(), Vec::new()).unwrap();
    assert!(interp.is_empty());
    assert_eq!(interp.distance(&[1.0, 2.0]).unwrap(), f64::INFINITY);
    assert!(interp.evaluate_point(&[1.0]).is_err());
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn rejects_points_with_more_than_two_axes() {
    let points = Array::from_shape_vec(vec![2, 1, 1], vec![0.0, 1.0]).unwrap();
    let err = Interpolator::new(&points, &arange(2)).unwrap_err();
    assert!(matches!(err, RecallError::Interpolation(_)));
}

#[test]
fn rejects_mismatched_counts() {
    let err = Interpolator::new(&arange(3), &arange(4)).unwrap_err();
    assert!(matches!(err, RecallError::Interpolation(_)));
    let err = Interpolator::from_support(vec![vec![0.0]], Vec::new()).unwrap_err();
    assert!(matches!(err, RecallError::Interpolation(_)));
}

#[test]
fn rejects_mixed_shapes() {
    let err = Interpolator::from_support(
        vec![vec![0.0, 0.0], vec![1.0]],
        vec![Array::scalar(0.0), Array::scalar(1.0)],
    )
    .unwrap_err();
    assert!(matches!(err, RecallError::Interpolation(_)));

    let err = Interpolator::from_support(
        vec![vec![0.0], vec![1.0]],
        vec![Array::scalar(0.0), Array::from_vec(vec![1.0, 2.0])],
    )
    .unwrap_err();
    assert!(matches!(err, RecallError::Interpolation(_)));
}

#[test]
fn rejects_queries_of_the_wrong_dimension() {
    let interp = Interpolator::from_support(grid_points(), vec![Array::scalar(0.0); 9]).unwrap();
    assert!(interp.distance(&[1.0]).is_err());
    assert!(interp.evaluate_point(&[1.0, 2.0, 3.0]).is_err());
    assert!(interp.evaluate(&Array::scalar(1.0)).is_err());
}
