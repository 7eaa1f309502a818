//! Dense n-dimensional value type.
//!
//! This is the numeric substrate the tape differentiates: a flat vector of
//! elements plus a shape. A tensor with an empty shape is a scalar and holds
//! exactly one element.

use crate::error::TapeError;
use crate::scalar::Scalar;

/// A dense n-dimensional tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T: Scalar> {
    data: Vec<T>,
    shape: Vec<usize>,
}

impl<T: Scalar> Tensor<T> {
    /// Create a new tensor with the given shape, filled with `value`.
    pub fn full(shape: &[usize], value: T) -> Self {
        let len: usize = shape.iter().product();
        Self {
            data: vec![value; len],
            shape: shape.to_vec(),
        }
    }

    /// Create a new tensor with the given shape, zero-initialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use gradtape::Tensor;
    ///
    /// let t: Tensor<f64> = Tensor::zeros(&[2, 3]);
    /// assert_eq!(t.shape(), &[2, 3]);
    /// assert_eq!(t.len(), 6);
    /// ```
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, T::zero())
    }

    /// Create a tensor filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, T::one())
    }

    /// Create a scalar (rank 0) tensor.
    pub fn scalar(value: T) -> Self {
        Self {
            data: vec![value],
            shape: Vec::new(),
        }
    }

    /// Create a rank 1 tensor from a slice.
    ///
    /// # Examples
    ///
    /// ```
    /// use gradtape::Tensor;
    ///
    /// let t = Tensor::from_slice(&[2.0, 3.0]);
    /// assert_eq!(t.shape(), &[2]);
    /// ```
    pub fn from_slice(values: &[T]) -> Self {
        Self {
            data: values.to_vec(),
            shape: vec![values.len()],
        }
    }

    /// Create tensor from data and shape.
    ///
    /// # Errors
    ///
    /// Returns `TapeError::ShapeMismatch` if data length doesn't match shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use gradtape::Tensor;
    ///
    /// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
    /// assert_eq!(t.data(), &[1.0, 2.0, 3.0, 4.0]);
    /// assert!(Tensor::from_vec(vec![1.0, 2.0], &[3]).is_err());
    /// ```
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self, TapeError> {
        let expected_len: usize = shape.iter().product::<usize>();
        if data.len() != expected_len {
            return Err(TapeError::ShapeMismatch {
                expected: expected_len,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            shape: shape.to_vec(),
        })
    }

    /// Assemble a tensor whose data length is already known to match `shape`.
    pub(crate) fn from_raw(data: Vec<T>, shape: Vec<usize>) -> Self {
        debug_assert_eq!(data.len(), shape.iter().product::<usize>());
        Self { data, shape }
    }

    /// Get the shape of the tensor.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the rank (number of dimensions).
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Get total number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if tensor is empty (has zero elements).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get underlying data as slice.
    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Get underlying data as mutable slice.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consume the tensor and return its elements.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Get element by linear index.
    #[inline]
    pub fn get_linear(&self, i: usize) -> Option<&T> {
        self.data.get(i)
    }

    /// The single element of a one-element tensor.
    pub fn item(&self) -> Option<T> {
        match self.data.as_slice() {
            [x] => Some(*x),
            _ => None,
        }
    }

    /// Check if the tensor holds exactly one element.
    #[inline]
    pub fn is_single(&self) -> bool {
        self.data.len() == 1
    }

    /// Sum of all elements.
    pub fn sum(&self) -> T {
        self.data.iter().fold(T::zero(), |acc, &x| acc + x)
    }
}
