//! Type system for tensor values and node attributes.

/// Element type of a tensor value.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum ElemType {
    /// 32-bit floating point.
    F32,
    /// 8-bit unsigned integer.
    U8,
    /// 8-bit signed integer.
    I8,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
}

impl ElemType {
    /// Whether this is a floating-point type.
    pub fn is_float(self) -> bool {
        matches!(self, Self::F32)
    }

    /// Whether this is a type quantized tensors are stored in.
    pub fn is_quantized(self) -> bool {
        matches!(self, Self::U8 | Self::I8)
    }
}

/// One dimension of a tensor shape.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Dimension {
    /// A dimension of known extent.
    Fixed(i64),
    /// A named dimension whose extent is unknown until runtime.
    Symbolic(String),
}

/// The shape of a tensor value. A rank-0 shape denotes a scalar.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct TensorShape {
    /// Outermost dimension first.
    pub dims: Vec<Dimension>,
}

impl TensorShape {
    /// Builds a shape with all dimensions fixed.
    pub fn fixed(dims: &[i64]) -> Self {
        Self {
            dims: dims.iter().map(|&d| Dimension::Fixed(d)).collect(),
        }
    }

    /// The rank-0 scalar shape.
    pub fn scalar() -> Self {
        Self::default()
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total element count, or `None` if any dimension is symbolic.
    pub fn num_elements(&self) -> Option<i64> {
        self.dims.iter().try_fold(1i64, |acc, d| match d {
            Dimension::Fixed(n) => Some(acc * n),
            Dimension::Symbolic(_) => None,
        })
    }
}

/// Constant tensor contents, stored as a typed flat buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorData {
    /// 32-bit float elements.
    F32(Vec<f32>),
    /// 8-bit unsigned elements.
    U8(Vec<u8>),
    /// 8-bit signed elements.
    I8(Vec<i8>),
    /// 32-bit signed elements.
    I32(Vec<i32>),
    /// 64-bit signed elements.
    I64(Vec<i64>),
}

impl TensorData {
    /// Element type of the stored buffer.
    pub fn elem_type(&self) -> ElemType {
        match self {
            Self::F32(_) => ElemType::F32,
            Self::U8(_) => ElemType::U8,
            Self::I8(_) => ElemType::I8,
            Self::I32(_) => ElemType::I32,
            Self::I64(_) => ElemType::I64,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::I8(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
        }
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The single `f32` element, if this is a one-element float buffer.
    pub fn scalar_f32(&self) -> Option<f32> {
        match self {
            Self::F32(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    /// The single integer element widened to `i32`, if this is a
    /// one-element buffer of a type that fits.
    pub fn scalar_i32(&self) -> Option<i32> {
        match self {
            Self::U8(v) if v.len() == 1 => Some(i32::from(v[0])),
            Self::I8(v) if v.len() == 1 => Some(i32::from(v[0])),
            Self::I32(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }
}

/// An attribute value attached to a node.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    /// Single integer.
    Int(i64),
    /// List of integers.
    Ints(Vec<i64>),
    /// Single float.
    Float(f32),
    /// List of floats.
    Floats(Vec<f32>),
    /// String.
    Str(String),
    /// Constant tensor.
    Tensor(TensorData),
}
