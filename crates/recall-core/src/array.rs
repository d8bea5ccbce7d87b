use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::RecallError;

/// A dense, row-major array of `f64` values with an arbitrary shape.
///
/// This is the canonical payload of a stored entry. A zero-dimensional array
/// (empty shape) holds exactly one scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Array {
    /// A zero-dimensional array holding a single value.
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    /// A one-dimensional array.
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Build an array from a shape and row-major data, checking that the
    /// number of elements matches.
    pub fn from_shape_vec(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, RecallError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(RecallError::Validation(format!(
                "shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// A two-dimensional array built from equally long rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, RecallError> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * width);
        for row in rows {
            if row.len() != width {
                return Err(RecallError::Validation(format!(
                    "ragged rows: expected width {width}, got {}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            shape: vec![rows.len(), width],
            data,
        })
    }

    /// An array filled with NaN.
    pub fn nan(shape: Vec<usize>) -> Self {
        let size = shape.iter().product();
        Self {
            shape,
            data: vec![f64::NAN; size],
        }
    }

    /// Stack equally shaped arrays along a new leading axis.
    pub fn stack(items: &[Array]) -> Result<Self, RecallError> {
        let inner = items.first().map(|a| a.shape.clone()).unwrap_or_default();
        let mut data = Vec::with_capacity(items.len() * inner.iter().product::<usize>());
        for item in items {
            if item.shape != inner {
                return Err(RecallError::Validation(format!(
                    "cannot stack arrays of shape {:?} and {:?}",
                    inner, item.shape
                )));
            }
            data.extend_from_slice(&item.data);
        }
        let mut shape = Vec::with_capacity(inner.len() + 1);
        shape.push(items.len());
        shape.extend(inner);
        Ok(Self { shape, data })
    }

    /// Parse a JSON number or a (nested, rectangular) JSON array of numbers.
    pub fn from_json(value: &Value) -> Result<Self, RecallError> {
        fn walk(
            value: &Value,
            depth: usize,
            shape: &mut Vec<usize>,
            data: &mut Vec<f64>,
        ) -> Result<(), RecallError> {
            match value {
                Value::Number(n) => {
                    if depth != shape.len() {
                        return Err(RecallError::Validation(
                            "array is not rectangular".to_string(),
                        ));
                    }
                    let v = n.as_f64().ok_or_else(|| {
                        RecallError::Validation(format!("{n} is not representable as f64"))
                    })?;
                    data.push(v);
                    Ok(())
                }
                Value::Array(items) => {
                    if depth == shape.len() && data.is_empty() {
                        shape.push(items.len());
                    } else if shape.get(depth) != Some(&items.len()) {
                        return Err(RecallError::Validation(
                            "array is not rectangular".to_string(),
                        ));
                    }
                    for item in items {
                        walk(item, depth + 1, shape, data)?;
                    }
                    Ok(())
                }
                other => Err(RecallError::Validation(format!(
                    "expected a number or an array of numbers, got {other}"
                ))),
            }
        }

        let mut shape = Vec::new();
        let mut data = Vec::new();
        walk(value, 0, &mut shape, &mut data)?;
        Self::from_shape_vec(shape, data)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// The single value of a zero-dimensional (or one-element) array.
    pub fn as_scalar(&self) -> Option<f64> {
        match self.data.as_slice() {
            [v] => Some(*v),
            _ => None,
        }
    }

    /// Same data, different shape.
    pub fn reshape(self, shape: Vec<usize>) -> Result<Self, RecallError> {
        Self::from_shape_vec(shape, self.data)
    }

    /// Little-endian byte encoding of the data (the shape is not included).
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Inverse of [`Array::to_le_bytes`].
    pub fn from_le_bytes(shape: Vec<usize>, bytes: &[u8]) -> Result<Self, RecallError> {
        if bytes.len() % 8 != 0 {
            return Err(RecallError::Deserialization(format!(
                "payload of {} bytes is not a whole number of f64 values",
                bytes.len()
            )));
        }
        let data = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                f64::from_le_bytes(buf)
            })
            .collect();
        Self::from_shape_vec(shape, data)
            .map_err(|e| RecallError::Deserialization(e.to_string()))
    }

    /// Approximate equality with a relative and an absolute tolerance.
    ///
    /// Arrays of different shape are never close. Positions where both arrays
    /// hold NaN are ignored; NaN against a number is not close.
    pub fn all_close(&self, other: &Array, rtol: f64, atol: f64) -> bool {
        if self.shape != other.shape {
            return false;
        }
        let scale = self.data.iter().fold(0.0_f64, |m, v| {
            if v.is_nan() {
                m
            } else {
                m.max(v.abs())
            }
        });
        self.data.iter().zip(&other.data).all(|(a, b)| {
            if a.is_nan() || b.is_nan() {
                a.is_nan() && b.is_nan()
            } else {
                (a - b).abs() <= atol + rtol * scale
            }
        })
    }
}

impl From<f64> for Array {
    fn from(value: f64) -> Self {
        Self::scalar(value)
    }
}

impl From<Vec<f64>> for Array {
    fn from(data: Vec<f64>) -> Self {
        Self::from_vec(data)
    }
}

impl From<&[f64]> for Array {
    fn from(data: &[f64]) -> Self {
        Self::from_vec(data.to_vec())
    }
}
