// variable.rs - Named, typed data-set variables

use crate::layout::LayoutError;
use crate::types::{type_named, TypeDef};
use std::fmt;

/// A (name, type) pair. Two variables are the same variable only when
/// both name and type match.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Variable {
    name: String,
    ty: TypeDef,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: TypeDef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// Declare a variable using a registered type name.
    pub fn named(name: impl Into<String>, type_name: &str) -> Result<Self, LayoutError> {
        Ok(Self::new(name, type_named(type_name)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeDef {
        &self.ty
    }

    /// Native byte size of the variable's value.
    pub fn size(&self) -> usize {
        self.ty.size()
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, self.name)
    }
}
