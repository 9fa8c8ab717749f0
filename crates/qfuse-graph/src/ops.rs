//! Operator type and domain name constants.
//!
//! Operator identity in the graph is the `(op_type, domain)` pair.
//! The standard operator set lives in the empty-string domain; the
//! quantized binary ops that have no standard counterpart live in the
//! extension domain.

/// The standard operator set domain.
pub const ONNX_DOMAIN: &str = "";

/// Extension domain for quantized ops without a standard counterpart.
pub const CONTRIB_DOMAIN: &str = "com.qfuse";

/// Affine float-to-integer quantization.
pub const QUANTIZE_LINEAR: &str = "QuantizeLinear";

/// Affine integer-to-float dequantization.
pub const DEQUANTIZE_LINEAR: &str = "DequantizeLinear";

/// N-dimensional convolution.
pub const CONV: &str = "Conv";

/// Matrix product.
pub const MAT_MUL: &str = "MatMul";

/// Element-wise addition.
pub const ADD: &str = "Add";

/// Element-wise multiplication.
pub const MUL: &str = "Mul";

/// Max pooling.
pub const MAX_POOL: &str = "MaxPool";

/// Shape change without data movement.
pub const RESHAPE: &str = "Reshape";

/// Dimension permutation.
pub const TRANSPOSE: &str = "Transpose";

/// Convolution on quantized tensors.
pub const Q_LINEAR_CONV: &str = "QLinearConv";

/// Matrix product on quantized tensors.
pub const Q_LINEAR_MAT_MUL: &str = "QLinearMatMul";

/// Addition on quantized tensors (extension domain).
pub const Q_LINEAR_ADD: &str = "QLinearAdd";

/// Multiplication on quantized tensors (extension domain).
pub const Q_LINEAR_MUL: &str = "QLinearMul";
