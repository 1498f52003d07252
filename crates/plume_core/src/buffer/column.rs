use rayon::prelude::*;
use std::ops::Range;

/// Alignment, in bytes, of every component column.
pub const VECTOR_WIDTH_BYTES: usize = 16;

/// Byte size of one float or int32 component value.
pub const COMPONENT_SIZE: usize = 4;

/// Round `required_bytes` up to the vector width and add one extra vector
/// width of padding, so SIMD-width reads past the logical end of a column
/// never reach into the next column.
#[inline]
pub const fn safe_component_buffer_size(required_bytes: usize) -> usize {
    required_bytes + VECTOR_WIDTH_BYTES - (required_bytes % VECTOR_WIDTH_BYTES) + VECTOR_WIDTH_BYTES
}

/// Column stride in bytes for a buffer holding `num_instances` instances.
#[inline]
pub const fn stride_for(num_instances: usize) -> usize {
    safe_component_buffer_size(num_instances * COMPONENT_SIZE)
}

/// Element range of `component`'s column inside a plane with the given byte stride.
#[inline]
pub fn column_range(component: usize, stride_bytes: usize) -> Range<usize> {
    let stride = stride_bytes / COMPONENT_SIZE;
    let start = component * stride;
    start..start + stride
}

/// Read-only view of one component column.
///
/// `len` is the number of live instances; the padded tail past `len` is
/// still addressable through [`Column::padded`].
#[derive(Clone, Copy)]
pub struct Column<'a, T> {
    data: &'a [T],
    len: usize,
}

impl<'a, T: Copy> Column<'a, T> {
    #[inline]
    pub fn new(plane: &'a [T], stride_bytes: usize, component: usize, len: usize) -> Self {
        let data = &plane[column_range(component, stride_bytes)];
        debug_assert!(len <= data.len(), "column length {len} exceeds stride");
        Self { data, len }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, instance: usize) -> T {
        debug_assert!(instance < self.len, "instance {instance} out of bounds ({})", self.len);
        self.data[instance]
    }

    /// Live instances only.
    #[inline]
    pub fn as_slice(&self) -> &'a [T] {
        &self.data[..self.len]
    }

    /// Whole column including alignment padding.
    #[inline]
    pub fn padded(&self) -> &'a [T] {
        self.data
    }
}

/// Mutable view of one component column.
pub struct ColumnMut<'a, T> {
    data: &'a mut [T],
    len: usize,
}

impl<'a, T: Copy> ColumnMut<'a, T> {
    #[inline]
    pub fn new(plane: &'a mut [T], stride_bytes: usize, component: usize, len: usize) -> Self {
        let data = &mut plane[column_range(component, stride_bytes)];
        debug_assert!(len <= data.len(), "column length {len} exceeds stride");
        Self { data, len }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, instance: usize) -> T {
        debug_assert!(instance < self.len, "instance {instance} out of bounds ({})", self.len);
        self.data[instance]
    }

    #[inline]
    pub fn set(&mut self, instance: usize, value: T) {
        debug_assert!(instance < self.len, "instance {instance} out of bounds ({})", self.len);
        self.data[instance] = value;
    }

    #[inline]
    pub fn copy_instance(&mut self, from: usize, to: usize) {
        debug_assert!(from < self.len && to < self.len);
        self.data[to] = self.data[from];
    }

    #[inline]
    pub fn swap(&mut self, a: usize, b: usize) {
        debug_assert!(a < self.len && b < self.len);
        self.data.swap(a, b);
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.len]
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data[..self.len]
    }

    #[inline]
    pub fn padded_mut(&mut self) -> &mut [T] {
        self.data
    }
}

#[inline]
fn stride_elems(stride_bytes: usize) -> usize {
    (stride_bytes / COMPONENT_SIZE).max(1)
}

/// Iterate every column of a plane, trimmed to `len` live instances.
pub fn columns<T>(plane: &[T], stride_bytes: usize, len: usize) -> impl Iterator<Item = &[T]> {
    plane
        .chunks_exact(stride_elems(stride_bytes))
        .map(move |column| &column[..len])
}

/// Mutable counterpart of [`columns`].
pub fn columns_mut<T>(
    plane: &mut [T],
    stride_bytes: usize,
    len: usize,
) -> impl Iterator<Item = &mut [T]> {
    plane
        .chunks_exact_mut(stride_elems(stride_bytes))
        .map(move |column| &mut column[..len])
}

/// Parallel iterator over live column slices.
pub fn par_columns<T: Sync>(
    plane: &[T],
    stride_bytes: usize,
    len: usize,
) -> impl ParallelIterator<Item = &[T]> {
    plane
        .par_chunks_exact(stride_elems(stride_bytes))
        .map(move |column| &column[..len])
}

/// Rebuild a plane at a new stride, moving each column's leading
/// `min(old, new)` elements to its new start. Padding is zero filled.
pub fn restride_plane<T: Copy + Default>(
    old: &[T],
    old_stride_bytes: usize,
    new_stride_bytes: usize,
    components: usize,
) -> Vec<T> {
    let mut plane = vec![T::default(); (new_stride_bytes / COMPONENT_SIZE) * components];
    let keep = old_stride_bytes.min(new_stride_bytes) / COMPONENT_SIZE;
    if keep == 0 {
        return plane;
    }

    for component in 0..components {
        let src = column_range(component, old_stride_bytes);
        let dst = column_range(component, new_stride_bytes);
        if src.end > old.len() {
            break;
        }
        plane[dst.start..dst.start + keep].copy_from_slice(&old[src.start..src.start + keep]);
    }
    plane
}
