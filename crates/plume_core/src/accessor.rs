// accessor.rs - Typed views of one variable in a data buffer
//
// Values are gathered from (and scattered to) their component columns
// using the native byte offsets recorded in the layout, so any Pod type
// whose fields are packed 4-byte floats and ints can be read directly.

use crate::buffer::DataBuffer;
use crate::data_set::ParticleId;
use crate::layout::{DataSetLayout, TypeLayoutInfo, VariableLayout};
use crate::types::{TypeDef, LEAF_SIZE};
use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec2, Vec3, Vec4};
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// A Rust value type that maps onto a data-set variable type.
pub trait Attribute: Pod {
    fn type_def() -> TypeDef;
}

/// Script boolean: stored as int32, `-1` is true and `0` is false.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct ScriptBool(pub i32);

impl ScriptBool {
    pub const TRUE: Self = Self(-1);
    pub const FALSE: Self = Self(0);

    pub fn get(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for ScriptBool {
    fn from(value: bool) -> Self {
        if value {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }
}

impl From<ScriptBool> for bool {
    fn from(value: ScriptBool) -> Self {
        value.get()
    }
}

macro_rules! impl_attribute {
    ($($ty:ty => $def:expr),* $(,)?) => {
        $(
            impl Attribute for $ty {
                fn type_def() -> TypeDef {
                    $def
                }
            }
        )*
    };
}

impl_attribute! {
    f32 => TypeDef::Float,
    i32 => TypeDef::Int32,
    ScriptBool => TypeDef::Bool,
    Vec2 => TypeDef::vec2(),
    Vec3 => TypeDef::vec3(),
    Vec4 => TypeDef::vec4(),
    Quat => TypeDef::quat(),
    ParticleId => TypeDef::particle_id(),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessorError {
    #[error("variable '{name}' is not in the data set")]
    MissingVariable { name: String },

    #[error("variable '{name}' has type '{actual}', which cannot be read as '{requested}'")]
    TypeMismatch {
        name: String,
        actual: String,
        requested: String,
    },
}

/// Find `name` and check its components line up with `T`'s.
fn resolve<T: Attribute>(layout: &DataSetLayout, name: &str) -> Result<usize, AccessorError> {
    let index = layout
        .variables()
        .iter()
        .position(|v| v.name() == name)
        .ok_or_else(|| AccessorError::MissingVariable {
            name: name.to_string(),
        })?;

    let variable = &layout.variables()[index];
    let requested = T::type_def();
    let compatible = std::mem::size_of::<T>() == variable.size()
        && TypeLayoutInfo::generate(&requested) == layout.variable_layouts()[index].info;
    if !compatible {
        return Err(AccessorError::TypeMismatch {
            name: name.to_string(),
            actual: variable.ty().to_string(),
            requested: requested.to_string(),
        });
    }
    Ok(index)
}

fn gather<T: Attribute>(buffer: &DataBuffer, var: &VariableLayout, instance: usize) -> T {
    let mut value = T::zeroed();
    let bytes = bytemuck::bytes_of_mut(&mut value);
    let info = &var.info;
    for (c, offset) in info.float_component_byte_offsets.iter().enumerate() {
        let component = buffer.float_column(var.float_component_start + c).get(instance);
        bytes[*offset..*offset + LEAF_SIZE].copy_from_slice(&component.to_ne_bytes());
    }
    for (c, offset) in info.int32_component_byte_offsets.iter().enumerate() {
        let component = buffer.int32_column(var.int32_component_start + c).get(instance);
        bytes[*offset..*offset + LEAF_SIZE].copy_from_slice(&component.to_ne_bytes());
    }
    value
}

fn scatter<T: Attribute>(buffer: &mut DataBuffer, var: &VariableLayout, instance: usize, value: &T) {
    let bytes = bytemuck::bytes_of(value);
    let info = &var.info;
    for (c, offset) in info.float_component_byte_offsets.iter().enumerate() {
        let component: f32 = bytemuck::pod_read_unaligned(&bytes[*offset..*offset + LEAF_SIZE]);
        buffer
            .float_column_mut(var.float_component_start + c)
            .set(instance, component);
    }
    for (c, offset) in info.int32_component_byte_offsets.iter().enumerate() {
        let component: i32 = bytemuck::pod_read_unaligned(&bytes[*offset..*offset + LEAF_SIZE]);
        buffer
            .int32_column_mut(var.int32_component_start + c)
            .set(instance, component);
    }
}

/// Read-only typed view of one variable.
pub struct Accessor<'a, T: Attribute> {
    buffer: &'a DataBuffer,
    layout: Arc<DataSetLayout>,
    index: usize,
    _value: PhantomData<T>,
}

impl<'a, T: Attribute> Accessor<'a, T> {
    pub fn new(buffer: &'a DataBuffer, name: &str) -> Result<Self, AccessorError> {
        let layout = Arc::clone(buffer.layout());
        let index = resolve::<T>(&layout, name)?;
        Ok(Self {
            buffer,
            layout,
            index,
            _value: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.buffer.num_instances()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, instance: usize) -> T {
        gather(self.buffer, &self.layout.variable_layouts()[self.index], instance)
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len()).map(move |instance| self.get(instance))
    }
}

/// Read-write typed view of one variable.
pub struct AccessorMut<'a, T: Attribute> {
    buffer: &'a mut DataBuffer,
    layout: Arc<DataSetLayout>,
    index: usize,
    _value: PhantomData<T>,
}

impl<'a, T: Attribute> AccessorMut<'a, T> {
    pub fn new(buffer: &'a mut DataBuffer, name: &str) -> Result<Self, AccessorError> {
        let layout = Arc::clone(buffer.layout());
        let index = resolve::<T>(&layout, name)?;
        Ok(Self {
            buffer,
            layout,
            index,
            _value: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.buffer.num_instances()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, instance: usize) -> T {
        gather(self.buffer, &self.layout.variable_layouts()[self.index], instance)
    }

    pub fn set(&mut self, instance: usize, value: T) {
        scatter(self.buffer, &self.layout.variable_layouts()[self.index], instance, &value);
    }
}
