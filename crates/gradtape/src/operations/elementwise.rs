//! Element-wise tensor operations.
//!
//! Binary operations accept two tensors of the same shape, or one
//! single-element tensor that is broadcast against the other.

use crate::error::TapeError;
use crate::scalar::Scalar;
use crate::tensor::Tensor;

/// Apply a function to each element, returning a new tensor.
///
/// # Example
///
/// ```
/// use gradtape::Tensor;
/// use gradtape::operations::apply;
///
/// let t = Tensor::from_slice(&[1.0, 2.0, 3.0]);
/// let squared = apply(&t, |x| x * x);
/// assert_eq!(squared.data(), &[1.0, 4.0, 9.0]);
/// ```
pub fn apply<T: Scalar, F>(tensor: &Tensor<T>, f: F) -> Tensor<T>
where
    F: Fn(T) -> T,
{
    let data: Vec<T> = tensor.data().iter().map(|&x| f(x)).collect();
    Tensor::from_raw(data, tensor.shape().to_vec())
}

/// Multiply all elements by a scalar, returning a new tensor.
pub fn scale<T: Scalar>(tensor: &Tensor<T>, alpha: T) -> Tensor<T> {
    apply(tensor, |x| x * alpha)
}

/// Shape of the result of combining `a` and `b` elementwise.
///
/// # Errors
///
/// Returns `TapeError::IncompatibleShapes` unless the shapes are equal or
/// one side holds a single element.
pub fn broadcast_shape<T: Scalar>(
    a: &Tensor<T>,
    b: &Tensor<T>,
) -> Result<Vec<usize>, TapeError> {
    if a.shape() == b.shape() || b.is_single() {
        Ok(a.shape().to_vec())
    } else if a.is_single() {
        Ok(b.shape().to_vec())
    } else {
        Err(TapeError::IncompatibleShapes {
            lhs: a.shape().to_vec(),
            rhs: b.shape().to_vec(),
        })
    }
}

/// Apply a binary function elementwise, broadcasting a single-element operand.
///
/// # Example
///
/// ```
/// use gradtape::Tensor;
/// use gradtape::operations::apply_binary;
///
/// let a = Tensor::from_slice(&[1.0, 2.0, 3.0]);
/// let b = Tensor::scalar(10.0);
/// let c = apply_binary(&a, &b, |x, y| x + y).unwrap();
/// assert_eq!(c.data(), &[11.0, 12.0, 13.0]);
/// ```
pub fn apply_binary<T: Scalar, F>(
    a: &Tensor<T>,
    b: &Tensor<T>,
    f: F,
) -> Result<Tensor<T>, TapeError>
where
    F: Fn(T, T) -> T,
{
    let shape = broadcast_shape(a, b)?;
    let len = shape.iter().product::<usize>();
    let pick = |t: &Tensor<T>, i: usize| {
        if t.is_single() {
            t.data()[0]
        } else {
            t.data()[i]
        }
    };
    let data: Vec<T> = (0..len).map(|i| f(pick(a, i), pick(b, i))).collect();
    Ok(Tensor::from_raw(data, shape))
}

/// Reduce a gradient back to the shape of the operand it flows into.
///
/// A gradient for a broadcast single-element operand is the sum of the
/// upstream gradient over every position the operand was broadcast to.
///
/// # Errors
///
/// Returns `TapeError::IncompatibleShapes` if `grad` cannot be reduced to `shape`.
pub fn sum_to_shape<T: Scalar>(
    grad: &Tensor<T>,
    shape: &[usize],
) -> Result<Tensor<T>, TapeError> {
    if grad.shape() == shape {
        return Ok(grad.clone());
    }
    let target_len = shape.iter().product::<usize>();
    if target_len == 1 {
        Ok(Tensor::full(shape, grad.sum()))
    } else if grad.is_single() {
        Ok(Tensor::full(shape, grad.data()[0]))
    } else {
        Err(TapeError::IncompatibleShapes {
            lhs: grad.shape().to_vec(),
            rhs: shape.to_vec(),
        })
    }
}
