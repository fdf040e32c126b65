//! The closed set of element types the kernels are instantiated for.

use std::fmt;

use candle_core::DType;

use crate::errors::MaskError;

/// Every data dtype accepted by the operator, in dispatch order.
pub const SUPPORTED_DTYPES: [DType; 4] = [DType::F16, DType::BF16, DType::F32, DType::F64];

/// Floating-point element types with a compiled kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskDType {
    F16,
    BF16,
    F32,
    F64,
}

impl MaskDType {
    /// The candle dtype backing this variant.
    pub fn dtype(self) -> DType {
        match self {
            MaskDType::F16 => DType::F16,
            MaskDType::BF16 => DType::BF16,
            MaskDType::F32 => DType::F32,
            MaskDType::F64 => DType::F64,
        }
    }
}

impl TryFrom<DType> for MaskDType {
    type Error = MaskError;

    fn try_from(dtype: DType) -> Result<Self, Self::Error> {
        match dtype {
            DType::F16 => Ok(MaskDType::F16),
            DType::BF16 => Ok(MaskDType::BF16),
            DType::F32 => Ok(MaskDType::F32),
            DType::F64 => Ok(MaskDType::F64),
            other => Err(MaskError::UnsupportedDType {
                requested: format!("{other:?}"),
            }),
        }
    }
}

impl fmt::Display for MaskDType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dtype())
    }
}
