// layout.rs - Variable layout builder
//
// Decomposes each variable into float and int32 components and assigns
// component starts within the buffer's float and int32 planes. The result
// is an immutable `DataSetLayout` shared by a data set and all its buffers.

use crate::types::{TypeDef, LEAF_SIZE};
use crate::variable::Variable;
use thiserror::Error;

/// Errors raised while resolving variable types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("type '{name}' is not registered")]
    UnknownType { name: String },
}

/// Per-type decomposition into float and int32 leaves.
///
/// Byte offsets locate each leaf inside the native value. Register offsets
/// number all leaves of the type in declaration order across both kinds,
/// which is the order the script VM expects its registers in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeLayoutInfo {
    pub float_component_byte_offsets: Vec<usize>,
    pub float_component_register_offsets: Vec<usize>,
    pub int32_component_byte_offsets: Vec<usize>,
    pub int32_component_register_offsets: Vec<usize>,
}

impl TypeLayoutInfo {
    pub fn generate(ty: &TypeDef) -> Self {
        let mut info = Self::default();
        info.append(ty, 0);
        info
    }

    fn append(&mut self, ty: &TypeDef, base_offset: usize) {
        match ty {
            TypeDef::Float => {
                self.float_component_register_offsets.push(self.num_components());
                self.float_component_byte_offsets.push(base_offset);
            }
            TypeDef::Int32 | TypeDef::Bool | TypeDef::Enum(_) => {
                self.int32_component_register_offsets.push(self.num_components());
                self.int32_component_byte_offsets.push(base_offset);
            }
            TypeDef::Struct(def) => {
                for field in def.fields() {
                    self.append(&field.ty, base_offset + field.offset);
                }
            }
        }
    }

    pub fn num_float_components(&self) -> usize {
        self.float_component_byte_offsets.len()
    }

    pub fn num_int32_components(&self) -> usize {
        self.int32_component_byte_offsets.len()
    }

    pub fn num_components(&self) -> usize {
        self.num_float_components() + self.num_int32_components()
    }
}

/// Location of one variable's components within a data buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableLayout {
    /// Start index for the float components in the float plane.
    pub float_component_start: usize,
    /// Start index for the int32 components in the int32 plane.
    pub int32_component_start: usize,
    pub info: TypeLayoutInfo,
}

impl VariableLayout {
    pub fn num_float_components(&self) -> usize {
        self.info.num_float_components()
    }

    pub fn num_int32_components(&self) -> usize {
        self.info.num_int32_components()
    }

    pub fn num_components(&self) -> usize {
        self.info.num_components()
    }
}

/// Immutable, finalized layout of a data set's variables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataSetLayout {
    variables: Vec<Variable>,
    layouts: Vec<VariableLayout>,
    total_float_components: usize,
    total_int32_components: usize,
}

impl DataSetLayout {
    /// Layout with no variables, used by buffers before finalize.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable_layouts(&self) -> &[VariableLayout] {
        &self.layouts
    }

    pub fn total_float_components(&self) -> usize {
        self.total_float_components
    }

    pub fn total_int32_components(&self) -> usize {
        self.total_int32_components
    }

    pub fn total_components(&self) -> usize {
        self.total_float_components + self.total_int32_components
    }

    pub fn index_of(&self, variable: &Variable) -> Option<usize> {
        self.variables.iter().position(|v| v == variable)
    }

    pub fn variable_layout(&self, variable: &Variable) -> Option<&VariableLayout> {
        self.index_of(variable).map(|idx| &self.layouts[idx])
    }

    /// Iterate variables alongside their layouts in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &VariableLayout)> {
        self.variables.iter().zip(self.layouts.iter())
    }

    /// True when both layouts have the same plane shapes, which is all a
    /// buffer-to-buffer copy requires.
    pub fn is_compatible_with(&self, other: &DataSetLayout) -> bool {
        self.total_float_components == other.total_float_components
            && self.total_int32_components == other.total_int32_components
    }
}

/// Build the layout for an ordered list of variables.
///
/// Components are packed in declaration order with no gaps. A variable
/// whose type has no leaves is a configuration error and panics.
pub fn build_layout(variables: &[Variable]) -> DataSetLayout {
    let mut layouts = Vec::with_capacity(variables.len());
    let mut total_float_components = 0;
    let mut total_int32_components = 0;

    for variable in variables {
        let info = TypeLayoutInfo::generate(variable.ty());
        assert!(
            info.num_components() > 0,
            "variable '{}' has type '{}' with no float or int32 leaves",
            variable.name(),
            variable.ty()
        );
        debug_assert_eq!(info.num_components() * LEAF_SIZE, variable.size());

        let layout = VariableLayout {
            float_component_start: total_float_components,
            int32_component_start: total_int32_components,
            info,
        };
        total_float_components += layout.num_float_components();
        total_int32_components += layout.num_int32_components();
        layouts.push(layout);
    }

    tracing::debug!(
        variables = variables.len(),
        float_components = total_float_components,
        int32_components = total_int32_components,
        "built data set layout"
    );

    DataSetLayout {
        variables: variables.to_vec(),
        layouts,
        total_float_components,
        total_int32_components,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_variables() -> Vec<Variable> {
        vec![
            Variable::new("Position", TypeDef::vec3()),
            Variable::new("Health", TypeDef::Int32),
            Variable::new("Color", TypeDef::color()),
            Variable::new("Alive", TypeDef::Bool),
            Variable::new("ID", TypeDef::particle_id()),
        ]
    }

    #[test]
    fn components_are_packed_in_declaration_order() {
        let layout = build_layout(&sample_variables());
        let starts: Vec<_> = layout
            .variable_layouts()
            .iter()
            .map(|l| (l.float_component_start, l.int32_component_start))
            .collect();

        assert_eq!(starts, vec![(0, 0), (3, 0), (3, 1), (7, 1), (7, 2)]);
        assert_eq!(layout.total_float_components(), 7);
        assert_eq!(layout.total_int32_components(), 4);
    }

    #[test]
    fn layout_is_deterministic() {
        let a = build_layout(&sample_variables());
        let b = build_layout(&sample_variables());
        assert_eq!(a, b);
    }

    #[test]
    fn mixed_struct_records_byte_and_register_offsets() {
        let ty = TypeDef::structure(
            "Mixed",
            [
                ("Mass", TypeDef::Float),
                ("Kind", TypeDef::enumeration("ParticleKind")),
                ("Radius", TypeDef::Float),
            ],
        );
        let info = TypeLayoutInfo::generate(&ty);

        assert_eq!(info.float_component_byte_offsets, vec![0, 8]);
        assert_eq!(info.float_component_register_offsets, vec![0, 2]);
        assert_eq!(info.int32_component_byte_offsets, vec![4]);
        assert_eq!(info.int32_component_register_offsets, vec![1]);
    }

    #[test]
    fn lookup_by_variable_identity() {
        let layout = build_layout(&sample_variables());
        let health = Variable::new("Health", TypeDef::Int32);
        assert_eq!(layout.variable_layout(&health).map(|l| l.int32_component_start), Some(0));

        let wrong_type = Variable::new("Health", TypeDef::Float);
        assert!(layout.variable_layout(&wrong_type).is_none());
    }

    #[test]
    #[should_panic(expected = "no float or int32 leaves")]
    fn empty_struct_is_a_configuration_error() {
        let empty = TypeDef::structure("Nothing", Vec::<(&str, TypeDef)>::new());
        build_layout(&[Variable::new("Void", empty)]);
    }
}
