// types.rs - Native type descriptions for data-set variables
//
// Every variable type decomposes into 4-byte float and int32 leaves.
// Booleans and enums are stored as int32. Struct fields are packed
// sequentially, which matches a #[repr(C)] struct of 4-byte scalars.
//
// Types are identified by name, not Rust TypeIds, so that script-defined
// structs can live next to the built-in vector types.

use crate::layout::LayoutError;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Byte size of every leaf component (f32 or i32).
pub const LEAF_SIZE: usize = 4;

/// Shape of a variable's native representation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeDef {
    Float,
    Int32,
    /// Stored as int32: `-1` is true, `0` is false.
    Bool,
    /// Named enum, stored as int32.
    Enum(Arc<str>),
    Struct(Arc<StructDef>),
}

/// A named aggregate of leaf or nested struct fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructDef {
    name: String,
    fields: Vec<FieldDef>,
    size: usize,
}

/// One field of a [`StructDef`] with its byte offset inside the struct.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeDef,
    pub offset: usize,
}

impl StructDef {
    /// Build a struct from `(field name, field type)` pairs in declaration order.
    pub fn new<N, I>(name: impl Into<String>, fields: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, TypeDef)>,
    {
        let mut offset = 0;
        let fields = fields
            .into_iter()
            .map(|(field_name, ty)| {
                let field = FieldDef {
                    name: field_name.into(),
                    offset,
                    ty,
                };
                offset += field.ty.size();
                field
            })
            .collect();
        Self {
            name: name.into(),
            fields,
            size: offset,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl TypeDef {
    /// Convenience constructor for a struct type.
    pub fn structure<N, I>(name: impl Into<String>, fields: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, TypeDef)>,
    {
        TypeDef::Struct(Arc::new(StructDef::new(name, fields)))
    }

    pub fn enumeration(name: &str) -> Self {
        TypeDef::Enum(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        match self {
            TypeDef::Float => "float",
            TypeDef::Int32 => "int32",
            TypeDef::Bool => "bool",
            TypeDef::Enum(name) => name,
            TypeDef::Struct(def) => def.name(),
        }
    }

    /// Native byte size of a value of this type.
    pub fn size(&self) -> usize {
        match self {
            TypeDef::Float | TypeDef::Int32 | TypeDef::Bool | TypeDef::Enum(_) => LEAF_SIZE,
            TypeDef::Struct(def) => def.size(),
        }
    }

    pub fn vec2() -> Self {
        VEC2.clone()
    }

    pub fn vec3() -> Self {
        VEC3.clone()
    }

    pub fn vec4() -> Self {
        VEC4.clone()
    }

    pub fn color() -> Self {
        COLOR.clone()
    }

    pub fn quat() -> Self {
        QUAT.clone()
    }

    /// Persistent particle ID: `{ Index: int32, AcquireTag: int32 }`.
    pub fn particle_id() -> Self {
        PARTICLE_ID.clone()
    }
}

impl fmt::Display for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn float_struct(name: &str, fields: &[&str]) -> TypeDef {
    TypeDef::structure(name, fields.iter().map(|field| (*field, TypeDef::Float)))
}

static VEC2: Lazy<TypeDef> = Lazy::new(|| float_struct("Vector2D", &["X", "Y"]));
static VEC3: Lazy<TypeDef> = Lazy::new(|| float_struct("Vector", &["X", "Y", "Z"]));
static VEC4: Lazy<TypeDef> = Lazy::new(|| float_struct("Vector4", &["X", "Y", "Z", "W"]));
static COLOR: Lazy<TypeDef> = Lazy::new(|| float_struct("LinearColor", &["R", "G", "B", "A"]));
static QUAT: Lazy<TypeDef> = Lazy::new(|| float_struct("Quat", &["X", "Y", "Z", "W"]));
static PARTICLE_ID: Lazy<TypeDef> = Lazy::new(|| {
    TypeDef::structure(
        "NiagaraID",
        [("Index", TypeDef::Int32), ("AcquireTag", TypeDef::Int32)],
    )
});

/// Global registry of named types, pre-populated with the built-ins.
static REGISTRY: Lazy<RwLock<HashMap<String, TypeDef>>> = Lazy::new(|| {
    let builtins = [
        TypeDef::Float,
        TypeDef::Int32,
        TypeDef::Bool,
        TypeDef::vec2(),
        TypeDef::vec3(),
        TypeDef::vec4(),
        TypeDef::color(),
        TypeDef::quat(),
        TypeDef::particle_id(),
    ];
    let map = builtins
        .into_iter()
        .map(|ty| (ty.name().to_string(), ty))
        .collect();
    RwLock::new(map)
});

/// Register a named type so variables can be declared by type name.
///
/// Re-registration is allowed only with an identical definition.
pub fn register_type(ty: TypeDef) {
    let mut map = REGISTRY.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    match map.get(ty.name()) {
        // Sanity check: re-registration must match previous layout
        Some(prev) => assert_eq!(
            *prev, ty,
            "type '{}' re-registered with a different layout",
            ty.name()
        ),
        None => {
            map.insert(ty.name().to_string(), ty);
        }
    }
}

/// Look up a registered type by name.
pub fn type_named(name: &str) -> Result<TypeDef, LayoutError> {
    REGISTRY
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(name)
        .cloned()
        .ok_or_else(|| LayoutError::UnknownType {
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_fields_are_packed_sequentially() {
        let inner = TypeDef::structure("Inner", [("A", TypeDef::Float), ("B", TypeDef::Bool)]);
        let outer = TypeDef::structure(
            "Outer",
            [("Head", TypeDef::Int32), ("Body", inner), ("Tail", TypeDef::Float)],
        );

        let TypeDef::Struct(def) = &outer else {
            panic!("expected struct");
        };
        let offsets: Vec<_> = def.fields().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 4, 12]);
        assert_eq!(outer.size(), 16);
    }

    #[test]
    fn builtins_resolve_by_name() {
        assert_eq!(type_named("Vector").unwrap(), TypeDef::vec3());
        assert_eq!(type_named("NiagaraID").unwrap().size(), 8);
        assert_eq!(type_named("bool").unwrap(), TypeDef::Bool);
    }

    #[test]
    fn unknown_type_is_reported() {
        let err = type_named("NoSuchType").unwrap_err();
        assert!(matches!(err, LayoutError::UnknownType { ref name } if name == "NoSuchType"));
    }

    #[test]
    fn user_types_can_be_registered_twice_with_same_shape() {
        let ty = TypeDef::structure("SpriteFrame", [("Index", TypeDef::Int32), ("Blend", TypeDef::Float)]);
        register_type(ty.clone());
        register_type(ty.clone());
        assert_eq!(type_named("SpriteFrame").unwrap(), ty);
    }

    #[test]
    #[should_panic(expected = "re-registered")]
    fn conflicting_registration_panics() {
        register_type(TypeDef::structure("Conflicted", [("A", TypeDef::Float)]));
        register_type(TypeDef::structure("Conflicted", [("A", TypeDef::Int32)]));
    }
}
