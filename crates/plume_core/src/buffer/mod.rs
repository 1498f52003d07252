//! Structure-of-arrays instance storage
//!
//! A [`DataBuffer`] holds one frame of instance data in two planes, one
//! for float components and one for int32 components. Each component owns
//! a padded column; all stride math lives in [`column`].

pub mod column;
mod data_buffer;

pub use column::{
    safe_component_buffer_size, stride_for, Column, ColumnMut, COMPONENT_SIZE,
    VECTOR_WIDTH_BYTES,
};
pub use data_buffer::DataBuffer;
