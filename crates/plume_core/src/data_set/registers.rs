//! Register tables handed to the script VM
//!
//! Each component of each variable becomes one input register (pointing
//! into the previous buffer) and one output register (pointing into the
//! current buffer). The VM owns the pointers' use; this module only fills
//! the table.

use crate::buffer::DataBuffer;
use crate::layout::DataSetLayout;
use std::ptr;
use thiserror::Error;

pub const MAX_INPUT_REGISTERS: usize = 100;
pub const MAX_OUTPUT_REGISTERS: usize = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegisterError {
    #[error(
        "too many IO registers: {requested} more requested with {inputs} inputs and {outputs} outputs in use (limit {})",
        MAX_INPUT_REGISTERS
    )]
    TooManyRegisters {
        requested: usize,
        inputs: usize,
        outputs: usize,
    },
}

/// Fixed-size input/output register pointer table.
#[derive(Debug)]
pub struct RegisterTable {
    inputs: [*const u8; MAX_INPUT_REGISTERS],
    outputs: [*mut u8; MAX_OUTPUT_REGISTERS],
    num_inputs: usize,
    num_outputs: usize,
}

impl Default for RegisterTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterTable {
    pub fn new() -> Self {
        Self {
            inputs: [ptr::null(); MAX_INPUT_REGISTERS],
            outputs: [ptr::null_mut(); MAX_OUTPUT_REGISTERS],
            num_inputs: 0,
            num_outputs: 0,
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    pub fn inputs(&self) -> &[*const u8] {
        &self.inputs[..self.num_inputs]
    }

    pub fn outputs(&self) -> &[*mut u8] {
        &self.outputs[..self.num_outputs]
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    fn check_capacity(&self, count: usize) -> Result<(), RegisterError> {
        if self.num_inputs + count > MAX_INPUT_REGISTERS
            || self.num_outputs + count > MAX_OUTPUT_REGISTERS
        {
            return Err(RegisterError::TooManyRegisters {
                requested: count,
                inputs: self.num_inputs,
                outputs: self.num_outputs,
            });
        }
        Ok(())
    }
}

/// Append one register pair per component, reading `prev` and writing
/// `curr`, both offset to `start_instance`.
///
/// Nothing is written when the table lacks room for every component.
pub fn append_to_register_table(
    layout: &DataSetLayout,
    prev: &DataBuffer,
    curr: &mut DataBuffer,
    table: &mut RegisterTable,
    start_instance: usize,
) -> Result<(), RegisterError> {
    table.check_capacity(layout.total_components())?;

    for (_, var_layout) in layout.iter() {
        let info = &var_layout.info;
        for (c, register) in info.float_component_register_offsets.iter().enumerate() {
            let component = var_layout.float_component_start + c;
            table.inputs[table.num_inputs + register] =
                prev.float_instance_ptr(component, start_instance).cast();
            table.outputs[table.num_outputs + register] =
                curr.float_instance_ptr_mut(component, start_instance).cast();
        }
        for (c, register) in info.int32_component_register_offsets.iter().enumerate() {
            let component = var_layout.int32_component_start + c;
            table.inputs[table.num_inputs + register] =
                prev.int32_instance_ptr(component, start_instance).cast();
            table.outputs[table.num_outputs + register] =
                curr.int32_instance_ptr_mut(component, start_instance).cast();
        }
        table.num_inputs += var_layout.num_components();
        table.num_outputs += var_layout.num_components();
    }
    Ok(())
}
