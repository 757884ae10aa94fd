//! Just enough of a tensor type system to describe what an operator accepts and produces.
use std::fmt;
use strum::{EnumIter, EnumString};

/// Element type of a tensor.  `Dynamic` means the type isn't known yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, EnumIter, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ElementType {
    Dynamic,
    U8,
    I32,
    I64,
    F32,
    Bool,
    String,
}

impl ElementType {
    /// Whether a tensor declared as `actual` can be used where `self` is required.  A type that
    /// isn't known yet is accepted anywhere.
    pub fn accepts(self, actual: ElementType) -> bool {
        actual == ElementType::Dynamic || actual == self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dim {
    Dynamic,
    Fixed(usize),
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Dynamic => f.write_str("?"),
            Dim::Fixed(size) => write!(f, "{size}"),
        }
    }
}

/// The declared element type and shape of a tensor, without any data
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TensorSpec {
    pub element: ElementType,

    /// `None` when not even the rank is known
    pub shape: Option<Vec<Dim>>,
}

impl TensorSpec {
    pub fn new(element: ElementType, shape: impl Into<Vec<Dim>>) -> Self {
        Self {
            element,
            shape: Some(shape.into()),
        }
    }

    /// A tensor of unknown element type and rank
    pub fn dynamic() -> Self {
        Self {
            element: ElementType::Dynamic,
            shape: None,
        }
    }

    /// A rank 1 tensor of unknown length
    pub fn vector(element: ElementType) -> Self {
        Self::new(element, [Dim::Dynamic])
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.element)?;
        match &self.shape {
            None => f.write_str("[...]"),
            Some(dims) => {
                f.write_str("[")?;
                for (i, dim) in dims.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{dim}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn dynamic_is_accepted_anywhere() {
        for required in ElementType::iter() {
            assert!(required.accepts(ElementType::Dynamic));
            assert!(required.accepts(required));
        }
        assert!(!ElementType::U8.accepts(ElementType::I32));
        assert!(!ElementType::String.accepts(ElementType::U8));
    }

    #[test]
    fn display() {
        assert_eq!(
            TensorSpec::new(ElementType::I64, [Dim::Dynamic, Dim::Fixed(2)]).to_string(),
            "i64[?,2]"
        );
        assert_eq!(TensorSpec::vector(ElementType::U8).to_string(), "u8[?]");
        assert_eq!(TensorSpec::dynamic().to_string(), "dynamic[...]");
        assert_eq!(ElementType::from_str("string").unwrap(), ElementType::String);
    }
}
