use super::column::{
    column_range, columns, columns_mut, par_columns, restride_plane, stride_for, Column,
    ColumnMut, COMPONENT_SIZE,
};
use crate::layout::DataSetLayout;
use rayon::prelude::*;
use std::sync::Arc;

/// One frame of instance data.
///
/// Strides are in bytes and always obey [`safe_component_buffer_size`](super::safe_component_buffer_size).
/// The layout handle is shared with the owning data set and read only.
#[derive(Clone, Debug)]
pub struct DataBuffer {
    layout: Arc<DataSetLayout>,
    float_data: Vec<f32>,
    int32_data: Vec<i32>,
    float_stride: usize,
    int32_stride: usize,
    num_instances: usize,
    num_instances_allocated: usize,
}

impl Default for DataBuffer {
    fn default() -> Self {
        Self::new(Arc::new(DataSetLayout::empty()))
    }
}

impl DataBuffer {
    pub fn new(layout: Arc<DataSetLayout>) -> Self {
        Self {
            layout,
            float_data: Vec::new(),
            int32_data: Vec::new(),
            float_stride: 0,
            int32_stride: 0,
            num_instances: 0,
            num_instances_allocated: 0,
        }
    }

    /// Rebind to a new layout and drop all contents.
    pub fn init(&mut self, layout: Arc<DataSetLayout>) {
        self.layout = layout;
        self.reset();
    }

    /// Release both planes and return to the empty state.
    pub fn reset(&mut self) {
        self.float_data = Vec::new();
        self.int32_data = Vec::new();
        self.float_stride = 0;
        self.int32_stride = 0;
        self.num_instances = 0;
        self.num_instances_allocated = 0;
    }

    pub fn layout(&self) -> &Arc<DataSetLayout> {
        &self.layout
    }

    #[inline]
    pub fn num_instances(&self) -> usize {
        self.num_instances
    }

    #[inline]
    pub fn num_instances_allocated(&self) -> usize {
        self.num_instances_allocated
    }

    #[inline]
    pub fn set_num_instances(&mut self, num_instances: usize) {
        debug_assert!(
            num_instances <= self.num_instances_allocated,
            "{num_instances} instances exceed allocation of {}",
            self.num_instances_allocated
        );
        self.num_instances = num_instances;
    }

    /// Byte distance between consecutive float columns.
    #[inline]
    pub fn float_stride(&self) -> usize {
        self.float_stride
    }

    /// Byte distance between consecutive int32 columns.
    #[inline]
    pub fn int32_stride(&self) -> usize {
        self.int32_stride
    }

    #[inline]
    pub fn num_float_components(&self) -> usize {
        self.layout.total_float_components()
    }

    #[inline]
    pub fn num_int32_components(&self) -> usize {
        self.layout.total_int32_components()
    }

    pub fn size_bytes(&self) -> usize {
        (self.float_data.len() + self.int32_data.len()) * COMPONENT_SIZE
    }

    /// Raw float plane, padding included.
    pub fn float_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.float_data)
    }

    /// Raw int32 plane, padding included.
    pub fn int32_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.int32_data)
    }

    /// Size both planes for `num_instances` instances.
    ///
    /// The live count is reset to zero. With `maintain_existing` the
    /// leading values of every column survive a stride change; callers
    /// restore the live count afterwards.
    pub fn allocate(&mut self, num_instances: usize, maintain_existing: bool) {
        let old_float_stride = self.float_stride;
        let old_int32_stride = self.int32_stride;

        self.num_instances_allocated = num_instances;
        self.num_instances = 0;
        self.float_stride = stride_for(num_instances);
        self.int32_stride = stride_for(num_instances);

        let float_components = self.num_float_components();
        let int32_components = self.num_int32_components();

        if maintain_existing && old_float_stride != self.float_stride && old_float_stride != 0 {
            self.float_data = restride_plane(
                &self.float_data,
                old_float_stride,
                self.float_stride,
                float_components,
            );
        } else {
            self.float_data
                .resize(self.float_stride / COMPONENT_SIZE * float_components, 0.0);
        }

        if maintain_existing && old_int32_stride != self.int32_stride && old_int32_stride != 0 {
            self.int32_data = restride_plane(
                &self.int32_data,
                old_int32_stride,
                self.int32_stride,
                int32_components,
            );
        } else {
            self.int32_data
                .resize(self.int32_stride / COMPONENT_SIZE * int32_components, 0);
        }
    }

    pub fn float_column(&self, component: usize) -> Column<'_, f32> {
        Column::new(&self.float_data, self.float_stride, component, self.num_instances)
    }

    pub fn float_column_mut(&mut self, component: usize) -> ColumnMut<'_, f32> {
        ColumnMut::new(&mut self.float_data, self.float_stride, component, self.num_instances)
    }

    pub fn int32_column(&self, component: usize) -> Column<'_, i32> {
        Column::new(&self.int32_data, self.int32_stride, component, self.num_instances)
    }

    pub fn int32_column_mut(&mut self, component: usize) -> ColumnMut<'_, i32> {
        ColumnMut::new(&mut self.int32_data, self.int32_stride, component, self.num_instances)
    }

    /// Remove `instance` by moving the last live instance into its slot.
    ///
    /// Kill reorders: the relative order of the remaining instances is not
    /// preserved. O(1) per component.
    pub fn kill_instance(&mut self, instance: usize) {
        assert!(
            instance < self.num_instances,
            "kill of instance {instance} out of bounds ({})",
            self.num_instances
        );
        self.num_instances -= 1;
        let last = self.num_instances;
        if instance == last {
            return;
        }

        for column in columns_mut(&mut self.float_data, self.float_stride, last + 1) {
            column[instance] = column[last];
        }
        for column in columns_mut(&mut self.int32_data, self.int32_stride, last + 1) {
            column[instance] = column[last];
        }
    }

    /// Exchange every component of two live instances.
    pub fn swap_instances(&mut self, a: usize, b: usize) {
        debug_assert!(a < self.num_instances && b < self.num_instances);
        let len = self.num_instances;
        for column in columns_mut(&mut self.float_data, self.float_stride, len) {
            column.swap(a, b);
        }
        for column in columns_mut(&mut self.int32_data, self.int32_stride, len) {
            column.swap(a, b);
        }
    }

    /// Copy `count` instances starting at `start` into the front of `dest`.
    ///
    /// `dest` is reallocated when its capacity differs from ours. The count
    /// is clamped to the live range, and `dest`'s live count is set to the
    /// number of instances actually copied.
    pub fn copy_range_to(&self, dest: &mut DataBuffer, start: usize, count: usize) {
        debug_assert!(self.layout.is_compatible_with(&dest.layout));
        if dest.num_instances_allocated != self.num_instances_allocated {
            dest.allocate(self.num_instances_allocated, false);
        }

        let count = count.min(self.num_instances.saturating_sub(start));
        dest.num_instances = count;
        if count == 0 {
            return;
        }

        let src = start..start + count;
        let dest_floats = columns_mut(&mut dest.float_data, dest.float_stride, count);
        for (to, from) in dest_floats.zip(columns(&self.float_data, self.float_stride, start + count)) {
            to.copy_from_slice(&from[src.clone()]);
        }
        let dest_ints = columns_mut(&mut dest.int32_data, dest.int32_stride, count);
        for (to, from) in dest_ints.zip(columns(&self.int32_data, self.int32_stride, start + count)) {
            to.copy_from_slice(&from[src.clone()]);
        }
    }

    /// Clone both planes, strides and counts into `dest`.
    pub fn copy_to(&self, dest: &mut DataBuffer) {
        dest.layout = Arc::clone(&self.layout);
        dest.float_data.clone_from(&self.float_data);
        dest.int32_data.clone_from(&self.int32_data);
        dest.float_stride = self.float_stride;
        dest.int32_stride = self.int32_stride;
        dest.num_instances = self.num_instances;
        dest.num_instances_allocated = self.num_instances_allocated;
    }

    /// Append a copy of `source`'s instance `instance`, growing by one when full.
    ///
    /// Returns the new instance's index, or `None` when `instance` is not
    /// live in `source`.
    pub fn transfer_instance(&mut self, source: &DataBuffer, instance: usize) -> Option<usize> {
        if instance >= source.num_instances {
            return None;
        }
        debug_assert!(self.layout.is_compatible_with(&source.layout));

        if self.num_instances == self.num_instances_allocated {
            let live = self.num_instances;
            self.allocate(live + 1, true);
            self.num_instances = live;
        }

        let index = self.num_instances;
        self.num_instances += 1;

        for component in 0..self.num_float_components() {
            let value = source.float_column(component).get(instance);
            self.float_column_mut(component).set(index, value);
        }
        for component in 0..self.num_int32_components() {
            let value = source.int32_column(component).get(instance);
            self.int32_column_mut(component).set(index, value);
        }
        Some(index)
    }

    /// True when any float component of any live instance is NaN or infinite.
    pub fn check_for_nans(&self) -> bool {
        par_columns(&self.float_data, self.float_stride, self.num_instances)
            .any(|column| column.iter().any(|value| !value.is_finite()))
    }

    /// Fill this buffer from a readback of a device buffer allocated for
    /// `num_instances` instances with the same layout.
    ///
    /// Panics when either plane is shorter than that device buffer.
    pub fn copy_from_readback(&mut self, floats: &[f32], int32s: &[i32], num_instances: usize) {
        let stride = stride_for(num_instances);
        let column_len = stride / COMPONENT_SIZE;
        let float_len = column_len * self.num_float_components();
        let int32_len = column_len * self.num_int32_components();
        assert!(
            floats.len() >= float_len && int32s.len() >= int32_len,
            "readback too short for {num_instances} instances: {} / {float_len} floats, {} / {int32_len} int32s",
            floats.len(),
            int32s.len()
        );

        self.allocate(num_instances, false);

        for (to, from) in columns_mut(&mut self.float_data, self.float_stride, num_instances)
            .zip(columns(floats, stride, num_instances))
        {
            to.copy_from_slice(from);
        }
        for (to, from) in columns_mut(&mut self.int32_data, self.int32_stride, num_instances)
            .zip(columns(int32s, stride, num_instances))
        {
            to.copy_from_slice(from);
        }
        self.num_instances = num_instances;
    }

    /// Address of a float component value, for external register tables.
    #[inline]
    pub fn float_instance_ptr(&self, component: usize, instance: usize) -> *const f32 {
        let offset = column_range(component, self.float_stride).start + instance;
        self.float_data.as_ptr().wrapping_add(offset)
    }

    #[inline]
    pub fn float_instance_ptr_mut(&mut self, component: usize, instance: usize) -> *mut f32 {
        let offset = column_range(component, self.float_stride).start + instance;
        self.float_data.as_mut_ptr().wrapping_add(offset)
    }

    #[inline]
    pub fn int32_instance_ptr(&self, component: usize, instance: usize) -> *const i32 {
        let offset = column_range(component, self.int32_stride).start + instance;
        self.int32_data.as_ptr().wrapping_add(offset)
    }

    #[inline]
    pub fn int32_instance_ptr_mut(&mut self, component: usize, instance: usize) -> *mut i32 {
        let offset = column_range(component, self.int32_stride).start + instance;
        self.int32_data.as_mut_ptr().wrapping_add(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::VECTOR_WIDTH_BYTES;
    use crate::layout::build_layout;
    use crate::types::TypeDef;
    use crate::variable::Variable;

    fn layout() -> Arc<DataSetLayout> {
        Arc::new(build_layout(&[
            Variable::new("Position", TypeDef::vec3()),
            Variable::new("Tag", TypeDef::Int32),
        ]))
    }

    /// Buffer of `n` instances where float component `c` of instance `i`
    /// is `i * 10 + c` and the int tag equals `i`.
    fn filled(n: usize) -> DataBuffer {
        let mut buffer = DataBuffer::new(layout());
        buffer.allocate(n, false);
        buffer.set_num_instances(n);
        for i in 0..n {
            for c in 0..3 {
                buffer.float_column_mut(c).set(i, (i * 10 + c) as f32);
            }
            buffer.int32_column_mut(0).set(i, i as i32);
        }
        buffer
    }

    fn tags(buffer: &DataBuffer) -> Vec<i32> {
        buffer.int32_column(0).as_slice().to_vec()
    }

    #[test]
    fn allocate_pads_strides() {
        let mut buffer = DataBuffer::new(layout());
        for n in [0, 1, 3, 4, 5, 16, 100] {
            buffer.allocate(n, false);
            assert_eq!(buffer.num_instances(), 0);
            assert_eq!(buffer.num_instances_allocated(), n);
            assert!(buffer.float_stride() >= n * 4 + VECTOR_WIDTH_BYTES);
            assert_eq!(buffer.float_stride() % VECTOR_WIDTH_BYTES, 0);
            assert_eq!(buffer.int32_stride(), buffer.float_stride());
            assert_eq!(buffer.size_bytes(), buffer.float_stride() * 4);
        }
    }

    #[test]
    fn kill_moves_last_instance_into_the_hole() {
        let mut buffer = filled(6);
        buffer.kill_instance(1);
        assert_eq!(tags(&buffer), vec![0, 5, 2, 3, 4]);
        assert_eq!(buffer.float_column(2).get(1), 52.0);

        // Killing the last live instance just shrinks the count
        buffer.kill_instance(4);
        assert_eq!(tags(&buffer), vec![0, 5, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn kill_past_live_count_panics() {
        let mut buffer = filled(2);
        buffer.kill_instance(2);
    }

    #[test]
    fn swap_exchanges_every_component() {
        let mut buffer = filled(4);
        buffer.swap_instances(0, 3);
        assert_eq!(tags(&buffer), vec![3, 1, 2, 0]);
        assert_eq!(buffer.float_column(1).get(0), 31.0);
        assert_eq!(buffer.float_column(1).get(3), 1.0);
    }

    #[test]
    fn full_copy_is_an_exact_snapshot() {
        let src = filled(7);
        let mut dest = DataBuffer::default();
        src.copy_to(&mut dest);

        assert_eq!(dest.num_instances(), 7);
        assert_eq!(dest.float_stride(), src.float_stride());
        for c in 0..3 {
            assert_eq!(dest.float_column(c).as_slice(), src.float_column(c).as_slice());
        }
        assert_eq!(tags(&dest), tags(&src));
    }

    #[test]
    fn ranged_copy_starts_at_offset() {
        let src = filled(10);
        let mut dest = DataBuffer::new(layout());
        src.copy_range_to(&mut dest, 4, 3);

        assert_eq!(dest.num_instances(), 3);
        assert_eq!(dest.num_instances_allocated(), 10);
        assert_eq!(tags(&dest), vec![4, 5, 6]);
        assert_eq!(dest.float_column(1).as_slice(), &[41.0, 51.0, 61.0]);

        // Range overrunning the live count is clamped
        src.copy_range_to(&mut dest, 8, 5);
        assert_eq!(tags(&dest), vec![8, 9]);
        src.copy_range_to(&mut dest, 12, 5);
        assert_eq!(dest.num_instances(), 0);
    }

    #[test]
    fn maintain_existing_survives_stride_change() {
        let mut buffer = filled(5);
        let before: Vec<Vec<f32>> = (0..3).map(|c| buffer.float_column(c).as_slice().to_vec()).collect();
        let old_stride = buffer.float_stride();

        buffer.allocate(200, true);
        assert_ne!(buffer.float_stride(), old_stride);
        buffer.set_num_instances(5);
        for (c, values) in before.iter().enumerate() {
            assert_eq!(buffer.float_column(c).as_slice(), values.as_slice());
        }
        assert_eq!(tags(&buffer), vec![0, 1, 2, 3, 4]);

        // Shrinking keeps the instances that still fit
        buffer.allocate(2, true);
        buffer.set_num_instances(2);
        assert_eq!(tags(&buffer), vec![0, 1]);
        assert_eq!(buffer.float_column(2).as_slice(), &[2.0, 12.0]);
    }

    #[test]
    fn transfer_appends_and_grows() {
        let src = filled(3);
        let mut dest = filled(2);

        assert_eq!(dest.transfer_instance(&src, 2), Some(2));
        assert_eq!(dest.num_instances(), 3);
        assert_eq!(dest.num_instances_allocated(), 3);
        assert_eq!(tags(&dest), vec![0, 1, 2]);
        assert_eq!(dest.float_column(0).get(1), 10.0);
        assert_eq!(dest.float_column(0).get(2), 20.0);

        assert_eq!(dest.transfer_instance(&src, 3), None);
        assert_eq!(dest.num_instances(), 3);
    }

    #[test]
    fn nan_and_infinity_are_detected_in_live_instances_only() {
        let mut buffer = filled(4);
        assert!(!buffer.check_for_nans());

        buffer.float_column_mut(1).set(2, f32::NAN);
        assert!(buffer.check_for_nans());

        buffer.float_column_mut(1).set(2, 0.0);
        buffer.float_column_mut(2).set(3, f32::INFINITY);
        assert!(buffer.check_for_nans());

        buffer.set_num_instances(3);
        assert!(!buffer.check_for_nans());
    }

    #[test]
    fn readback_fills_columns_at_device_stride() {
        let src = filled(3);
        let mut mirror = DataBuffer::new(layout());
        let floats: Vec<f32> = bytemuck::cast_slice(src.float_bytes()).to_vec();
        let ints: Vec<i32> = bytemuck::cast_slice(src.int32_bytes()).to_vec();

        mirror.copy_from_readback(&floats, &ints, 3);
        assert_eq!(tags(&mirror), vec![0, 1, 2]);
        assert_eq!(mirror.float_column(2).as_slice(), src.float_column(2).as_slice());
    }

    #[test]
    #[should_panic(expected = "readback too short")]
    fn truncated_readback_is_rejected() {
        let src = filled(3);
        let mut mirror = DataBuffer::new(layout());
        let floats: Vec<f32> = bytemuck::cast_slice(src.float_bytes()).to_vec();
        let ints: Vec<i32> = bytemuck::cast_slice(src.int32_bytes()).to_vec();

        // Last float column cut in half
        let cut = floats.len() - stride_for(3) / COMPONENT_SIZE / 2;
        mirror.copy_from_readback(&floats[..cut], &ints, 3);
    }
}
