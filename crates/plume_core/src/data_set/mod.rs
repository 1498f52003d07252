//! Multi-buffered data sets
//!
//! A [`DataSet`] owns the variables, their layout, a ring of
//! [`DataBuffer`]s and the persistent ID table. Each tick the simulation
//! writes the current buffer while reading the previous one, then
//! [`DataSet::tick`] rotates the ring. CPU simulated sets rotate three
//! buffers, GPU simulated sets two.
//!
//! Every mutating operation takes the lane token of the set's
//! [`SimTarget`], so a set is only ever driven from its own lane.

mod id_table;
pub mod registers;

pub use id_table::{IdTable, IdTableChange, IdTableShrinkPolicy, ParticleId, INDEX_NONE};
pub use registers::{RegisterError, RegisterTable, MAX_INPUT_REGISTERS, MAX_OUTPUT_REGISTERS};

use crate::buffer::DataBuffer;
use crate::config::{DataSetSettings, NanPolicy};
use crate::dump::{BufferDump, BufferRole};
use crate::lane::{Lane, RenderLane, SimLane};
use crate::layout::{build_layout, DataSetLayout, VariableLayout};
use crate::render_queue::{RenderCommand, RenderCommandSender};
use crate::variable::Variable;
use plume_metrics::{Counter, RingBuffer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

mod sealed {
    pub trait Sealed {}
}

/// Where a data set is simulated. Fixes the buffer count and the lane.
pub trait SimTarget: sealed::Sealed + fmt::Debug + 'static {
    type Lane: Lane;
    const BUFFER_COUNT: usize;
    const NAME: &'static str;
}

/// CPU simulation: current, previous and a spare in-flight buffer.
#[derive(Debug)]
pub struct CpuSim;

/// GPU simulation: current and previous, driven from the render lane.
#[derive(Debug)]
pub struct GpuSim;

impl sealed::Sealed for CpuSim {}
impl sealed::Sealed for GpuSim {}

impl SimTarget for CpuSim {
    type Lane = SimLane;
    const BUFFER_COUNT: usize = 3;
    const NAME: &'static str = "cpu";
}

impl SimTarget for GpuSim {
    type Lane = RenderLane;
    const BUFFER_COUNT: usize = 2;
    const NAME: &'static str = "gpu";
}

pub type CpuDataSet = DataSet<CpuSim>;
pub type GpuDataSet = DataSet<GpuSim>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSetKind {
    Particle,
    Event,
    Custom,
}

/// Identifies a data set in logs and deferred commands.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataSetId {
    pub name: String,
    pub kind: DataSetKind,
}

impl DataSetId {
    pub fn new(name: impl Into<String>, kind: DataSetKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

impl fmt::Display for DataSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Rolling bookkeeping. Compiles to nothing without the `metrics` feature.
#[derive(Debug)]
pub struct DataSetStats {
    pub counters: Counter,
    /// Byte footprint sampled after each allocation.
    pub footprint: RingBuffer<usize>,
}

impl Default for DataSetStats {
    fn default() -> Self {
        Self {
            counters: Counter::new(),
            footprint: RingBuffer::new(120),
        }
    }
}

#[derive(Debug)]
pub struct DataSet<T: SimTarget> {
    id: DataSetId,
    variables: Vec<Variable>,
    layout: Arc<DataSetLayout>,
    buffers: Vec<DataBuffer>,
    ids: IdTable,
    curr_buffer: usize,
    finalized: bool,
    needs_persistent_ids: bool,
    settings: DataSetSettings,
    stats: DataSetStats,
    _target: PhantomData<T>,
}

impl<T: SimTarget> DataSet<T> {
    pub fn new(id: DataSetId) -> Self {
        Self::with_settings(id, DataSetSettings::default())
    }

    pub fn with_settings(id: DataSetId, settings: DataSetSettings) -> Self {
        let layout = Arc::new(DataSetLayout::empty());
        Self {
            id,
            variables: Vec::new(),
            buffers: (0..T::BUFFER_COUNT)
                .map(|_| DataBuffer::new(Arc::clone(&layout)))
                .collect(),
            layout,
            ids: IdTable::new(T::BUFFER_COUNT, settings.id_table_shrink),
            curr_buffer: 0,
            finalized: false,
            needs_persistent_ids: false,
            settings,
            stats: DataSetStats::default(),
            _target: PhantomData,
        }
    }

    pub fn id(&self) -> &DataSetId {
        &self.id
    }

    pub fn settings(&self) -> &DataSetSettings {
        &self.settings
    }

    pub fn stats(&self) -> &DataSetStats {
        &self.stats
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Add a variable unless an identical one is already present.
    pub fn add_variable(&mut self, variable: Variable) {
        assert!(
            !self.finalized,
            "variable '{}' added to data set '{}' after finalize",
            variable.name(),
            self.id
        );
        if !self.variables.contains(&variable) {
            self.variables.push(variable);
        }
    }

    pub fn add_variables(&mut self, variables: impl IntoIterator<Item = Variable>) {
        for variable in variables {
            self.add_variable(variable);
        }
    }

    pub fn set_needs_persistent_ids(&mut self, needs_ids: bool) {
        self.needs_persistent_ids = needs_ids;
    }

    pub fn needs_persistent_ids(&self) -> bool {
        self.needs_persistent_ids
    }

    /// Lock the variable set, build the layout and reinitialize every buffer.
    pub fn finalize(&mut self) {
        assert!(!self.finalized, "data set '{}' finalized twice", self.id);
        self.finalized = true;
        self.layout = Arc::new(build_layout(&self.variables));
        for buffer in &mut self.buffers {
            buffer.init(Arc::clone(&self.layout));
        }
        tracing::debug!(
            data_set = %self.id,
            target = T::NAME,
            lane = %<T::Lane as Lane>::KIND,
            variables = self.variables.len(),
            float_components = self.layout.total_float_components(),
            int32_components = self.layout.total_int32_components(),
            "data set finalized"
        );
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    #[inline]
    fn check_finalized(&self) {
        assert!(self.finalized, "data set '{}' used before finalize", self.id);
    }

    // ------------------------------------------------------------------
    // Layout queries
    // ------------------------------------------------------------------

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn layout(&self) -> &Arc<DataSetLayout> {
        &self.layout
    }

    pub fn has_variable(&self, variable: &Variable) -> bool {
        self.variables.contains(variable)
    }

    pub fn variable_layout(&self, variable: &Variable) -> Option<&VariableLayout> {
        self.layout.variable_layout(variable)
    }

    /// Float and int32 component starts of `variable`.
    pub fn variable_component_offsets(&self, variable: &Variable) -> Option<(usize, usize)> {
        self.variable_layout(variable)
            .map(|layout| (layout.float_component_start, layout.int32_component_start))
    }

    pub fn num_float_components(&self) -> usize {
        self.layout.total_float_components()
    }

    pub fn num_int32_components(&self) -> usize {
        self.layout.total_int32_components()
    }

    // ------------------------------------------------------------------
    // Buffers
    // ------------------------------------------------------------------

    pub fn buffer_count(&self) -> usize {
        T::BUFFER_COUNT
    }

    pub fn curr_buffer_idx(&self) -> usize {
        self.curr_buffer
    }

    pub fn prev_buffer_idx(&self) -> usize {
        if self.curr_buffer > 0 {
            self.curr_buffer - 1
        } else {
            T::BUFFER_COUNT - 1
        }
    }

    pub fn curr_data(&self) -> &DataBuffer {
        &self.buffers[self.curr_buffer]
    }

    pub fn prev_data(&self) -> &DataBuffer {
        &self.buffers[self.prev_buffer_idx()]
    }

    pub fn data_by_index(&self, index: usize) -> &DataBuffer {
        &self.buffers[index]
    }

    pub fn curr_data_mut(&mut self, _lane: &T::Lane) -> &mut DataBuffer {
        let curr = self.curr_buffer;
        &mut self.buffers[curr]
    }

    pub fn prev_data_mut(&mut self, _lane: &T::Lane) -> &mut DataBuffer {
        let prev = self.prev_buffer_idx();
        &mut self.buffers[prev]
    }

    /// Previous buffer for reading alongside the current buffer for writing.
    pub fn prev_and_curr_mut(&mut self, _lane: &T::Lane) -> (&DataBuffer, &mut DataBuffer) {
        let (prev, curr) = (self.prev_buffer_idx(), self.curr_buffer);
        split_read_write(&mut self.buffers, prev, curr)
    }

    pub fn num_instances(&self) -> usize {
        self.curr_data().num_instances()
    }

    pub fn prev_num_instances(&self) -> usize {
        self.prev_data().num_instances()
    }

    pub fn num_instances_allocated(&self) -> usize {
        self.curr_data().num_instances_allocated()
    }

    pub fn set_num_instances(&mut self, lane: &T::Lane, num_instances: usize) {
        self.curr_data_mut(lane).set_num_instances(num_instances);
    }

    /// Total bytes held by all buffers.
    pub fn size_bytes(&self) -> usize {
        self.buffers.iter().map(DataBuffer::size_bytes).sum()
    }

    // ------------------------------------------------------------------
    // Per-tick protocol
    // ------------------------------------------------------------------

    /// Allocate the current buffer and, with persistent IDs, size the
    /// current ID table. See [`IdTable::allocate`].
    pub fn allocate(&mut self, lane: &T::Lane, num_instances: usize, maintain_existing: bool) {
        self.check_finalized();
        self.curr_data_mut(lane).allocate(num_instances, maintain_existing);
        self.stats.counters.increment("allocations", 1);

        if self.needs_persistent_ids {
            let curr = self.curr_buffer;
            let change = self.ids.allocate(curr, num_instances, maintain_existing);
            match change {
                IdTableChange::Grown { from, to } => {
                    self.stats.counters.increment("id_table_growths", 1);
                    tracing::debug!(data_set = %self.id, from, to, "growing ID table");
                }
                IdTableChange::Shrunk { from, to } => {
                    self.stats.counters.increment("id_table_shrinks", 1);
                    tracing::debug!(data_set = %self.id, from, to, "shrinking ID table");
                }
                IdTableChange::Unchanged { .. } => {}
            }
        }

        plume_metrics::metrics! {
            let footprint = self.size_bytes();
            self.stats.footprint.push(footprint);
        }
    }

    /// Optionally scan for NaNs, then make the next buffer current.
    pub fn tick(&mut self, lane: &T::Lane) {
        self.check_finalized();
        if self.settings.nan_policy != NanPolicy::Ignore {
            self.check_for_nans(lane);
        }
        self.curr_buffer = (self.curr_buffer + 1) % T::BUFFER_COUNT;
        self.stats.counters.increment("ticks", 1);
    }

    /// Copy the whole current buffer over the previous one.
    pub fn copy_curr_to_prev(&mut self, _lane: &T::Lane) {
        self.check_finalized();
        let (prev, curr) = (self.prev_buffer_idx(), self.curr_buffer);
        let (curr, prev) = split_read_write(&mut self.buffers, curr, prev);
        curr.copy_to(prev);
    }

    /// Remove an instance from the current buffer. Kill reorders: the last
    /// live instance moves into `instance`'s slot.
    pub fn kill_instance(&mut self, lane: &T::Lane, instance: usize) {
        self.check_finalized();
        self.curr_data_mut(lane).kill_instance(instance);
        self.stats.counters.increment("kills", 1);
    }

    /// Swap two instances of the previous buffer.
    pub fn swap_instances(&mut self, lane: &T::Lane, a: usize, b: usize) {
        self.check_finalized();
        self.prev_data_mut(lane).swap_instances(a, b);
    }

    /// Append a copy of `source`'s current instance `instance` to our current buffer.
    pub fn transfer_instance<S: SimTarget>(
        &mut self,
        lane: &T::Lane,
        source: &DataSet<S>,
        instance: usize,
    ) -> Option<usize> {
        self.check_finalized();
        let index = self
            .curr_data_mut(lane)
            .transfer_instance(source.curr_data(), instance);
        if index.is_some() {
            self.stats.counters.increment("transfers", 1);
        }
        index
    }

    /// Empty the current buffer and, with persistent IDs, every ID table.
    ///
    /// Unlike the buffers, the ID state is cleared for all slots, not just
    /// the current one: [`prev_index_of`](Self::prev_index_of) and
    /// [`prev_id_table`](Self::prev_id_table) come back empty, every ID
    /// handed out before the reset stops resolving, and the next allocation
    /// regrows the free list from zero.
    pub fn reset_current_buffers(&mut self, lane: &T::Lane) {
        self.set_num_instances(lane, 0);
        if self.needs_persistent_ids {
            self.ids.reset();
        }
    }

    /// Release every buffer and ID table.
    pub fn reset_buffers(&mut self, _lane: &T::Lane) {
        for buffer in &mut self.buffers {
            buffer.reset();
        }
        self.ids.reset();
        tracing::debug!(data_set = %self.id, target = T::NAME, "buffers reset");
    }

    /// Point one register per component at the previous buffer (inputs) and
    /// the current buffer (outputs), starting at `start_instance`.
    pub fn append_to_register_table(
        &mut self,
        lane: &T::Lane,
        table: &mut RegisterTable,
        start_instance: usize,
    ) -> Result<(), RegisterError> {
        self.check_finalized();
        let layout = Arc::clone(&self.layout);
        let (prev, curr) = self.prev_and_curr_mut(lane);
        let result = registers::append_to_register_table(&layout, prev, curr, table, start_instance);
        if let Err(err) = &result {
            tracing::error!(data_set = %self.id, %err, "script is using too many IO registers");
        }
        result
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Scan the current and previous buffers for NaN or infinite floats.
    ///
    /// Findings are dumped when `dump_on_nan` is set, logged, and escalate
    /// to a panic under [`NanPolicy::Fatal`].
    pub fn check_for_nans(&mut self, _lane: &T::Lane) -> bool {
        self.check_finalized();
        let in_current = self.curr_data().check_for_nans();
        let in_previous = self.prev_data().check_for_nans();
        if !in_current && !in_previous {
            return false;
        }

        self.stats.counters.increment("nan_reports", 1);
        if self.settings.dump_on_nan {
            let max = self.settings.dump_max_instances;
            for (role, found) in [(BufferRole::Current, in_current), (BufferRole::Previous, in_previous)] {
                if found {
                    let dump = self.dump(role, 0, max);
                    tracing::warn!(data_set = %self.id, "NaN dump\n{dump}");
                }
            }
        }

        tracing::error!(
            data_set = %self.id,
            current = in_current,
            previous = in_previous,
            fatal = self.settings.nan_policy == NanPolicy::Fatal,
            "NaN or infinite values found in data set"
        );
        if self.settings.nan_policy == NanPolicy::Fatal {
            panic!("NaN or infinite values found in data set '{}'", self.id);
        }
        true
    }

    /// Capture up to `count` instances of one buffer starting at `start`.
    pub fn dump(&self, role: BufferRole, start: usize, count: usize) -> BufferDump {
        let buffer = match role {
            BufferRole::Current => self.curr_data(),
            BufferRole::Previous => self.prev_data(),
        };
        BufferDump::capture(&self.id, buffer, role, start, count)
    }

    /// Dump one buffer through `tracing`, capped at `dump_max_instances`.
    pub fn log_dump(&self, role: BufferRole, start: usize, count: usize) {
        let count = count.min(self.settings.dump_max_instances);
        self.dump(role, start, count).log();
    }

    // ------------------------------------------------------------------
    // Persistent IDs
    // ------------------------------------------------------------------

    #[inline]
    fn check_persistent_ids(&self) {
        assert!(
            self.needs_persistent_ids,
            "data set '{}' does not track persistent IDs",
            self.id
        );
    }

    /// Highest ID mapped since the last allocation, or [`INDEX_NONE`].
    pub fn max_used_id(&self) -> i32 {
        self.ids.max_used_id()
    }

    pub fn id_acquire_tag(&self) -> i32 {
        self.ids.acquire_tag()
    }

    pub fn set_id_acquire_tag(&mut self, _lane: &T::Lane, tag: i32) {
        self.ids.set_acquire_tag(tag);
    }

    pub fn free_id_table(&self) -> &[i32] {
        self.ids.free_ids()
    }

    pub fn num_free_ids(&self) -> usize {
        self.ids.num_free_ids()
    }

    pub fn curr_id_table(&self) -> &[i32] {
        self.ids.table(self.curr_buffer)
    }

    pub fn prev_id_table(&self) -> &[i32] {
        self.ids.table(self.prev_buffer_idx())
    }

    /// Give a freshly spawned current-buffer instance a new ID.
    pub fn acquire_id(&mut self, _lane: &T::Lane, instance: usize) -> ParticleId {
        self.check_persistent_ids();
        self.ids.acquire(self.curr_buffer, instance)
    }

    /// Record where a surviving particle lives in the current buffer.
    pub fn update_id(&mut self, _lane: &T::Lane, id: ParticleId, instance: usize) {
        self.check_persistent_ids();
        self.ids.update(self.curr_buffer, id, instance);
    }

    /// Return a dead particle's ID to the free list.
    pub fn release_id(&mut self, _lane: &T::Lane, id: ParticleId) {
        self.check_persistent_ids();
        self.ids.release(id);
    }

    /// Current-buffer index of a particle.
    pub fn index_of(&self, id: ParticleId) -> Option<usize> {
        self.ids.index_of(self.curr_buffer, id)
    }

    /// Previous-buffer index of a particle.
    pub fn prev_index_of(&self, id: ParticleId) -> Option<usize> {
        self.ids.index_of(self.prev_buffer_idx(), id)
    }
}

impl DataSet<CpuSim> {
    /// Slot that becomes current after the next tick.
    pub fn spare_buffer_idx(&self) -> usize {
        (self.curr_buffer + 1) % CpuSim::BUFFER_COUNT
    }

    /// The third, in-flight buffer only CPU sets have.
    pub fn spare_data(&self) -> &DataBuffer {
        &self.buffers[self.spare_buffer_idx()]
    }
}

impl DataSet<GpuSim> {
    /// Ask the render lane to reset this set's buffers. Callable from any lane.
    pub fn request_reset_buffers(&self, sender: &RenderCommandSender) -> bool {
        sender.send(RenderCommand::ResetBuffers(self.id.clone()))
    }

    /// Apply a deferred command if it targets this set.
    pub fn apply_render_command(&mut self, lane: &RenderLane, command: &RenderCommand) -> bool {
        match command {
            RenderCommand::ResetBuffers(id) if *id == self.id => {
                self.reset_buffers(lane);
                true
            }
            RenderCommand::ResetBuffers(_) => false,
        }
    }

    /// Fill the current buffer's CPU mirror from a device readback.
    pub fn read_back(&mut self, lane: &RenderLane, floats: &[f32], int32s: &[i32], num_instances: usize) {
        self.check_finalized();
        self.curr_data_mut(lane)
            .copy_from_readback(floats, int32s, num_instances);
    }
}

/// Borrow `buffers[read]` shared and `buffers[write]` exclusively.
fn split_read_write(
    buffers: &mut [DataBuffer],
    read: usize,
    write: usize,
) -> (&DataBuffer, &mut DataBuffer) {
    assert_ne!(read, write, "read and write buffers alias");
    if read < write {
        let (head, tail) = buffers.split_at_mut(write);
        (&head[read], &mut tail[0])
    } else {
        let (head, tail) = buffers.split_at_mut(read);
        (&tail[0], &mut head[write])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_queue::render_command_channel;
    use crate::types::TypeDef;
    use std::thread;

    fn cpu_set(persistent_ids: bool) -> CpuDataSet {
        let mut set = CpuDataSet::new(DataSetId::new("sparks", DataSetKind::Particle));
        set.add_variables([
            Variable::new("Position", TypeDef::vec3()),
            Variable::new("Health", TypeDef::Int32),
            Variable::new("Position", TypeDef::vec3()),
        ]);
        set.set_needs_persistent_ids(persistent_ids);
        set.finalize();
        set
    }

    // Lanes bind per thread; every test runs on its own thread.
    fn on_sim_lane<R: Send + 'static>(f: impl FnOnce(&SimLane) -> R + Send + 'static) -> R {
        thread::spawn(move || f(&SimLane::enter())).join().unwrap()
    }

    #[test]
    fn duplicate_variables_are_ignored() {
        on_sim_lane(|lane| {
            let mut set = cpu_set(false);
            assert_eq!(set.variables().len(), 2);
            assert_eq!(set.num_float_components(), 3);
            assert_eq!(set.num_int32_components(), 1);
            let health = Variable::new("Health", TypeDef::Int32);
            assert_eq!(set.variable_component_offsets(&health), Some((3, 0)));
            set.allocate(lane, 4, false);
            assert!(set.has_variable(&health));
        });
    }

    #[test]
    fn add_after_finalize_panics() {
        let result = thread::spawn(|| {
            let mut set = cpu_set(false);
            set.add_variable(Variable::new("Late", TypeDef::Float));
        })
        .join();
        assert!(result.is_err());
    }

    #[test]
    fn use_before_finalize_panics() {
        let result = thread::spawn(|| {
            let lane = SimLane::enter();
            let mut set = CpuDataSet::new(DataSetId::new("raw", DataSetKind::Custom));
            set.allocate(&lane, 1, false);
        })
        .join();
        assert!(result.is_err());
    }

    #[test]
    fn cpu_sets_rotate_three_buffers() {
        on_sim_lane(|lane| {
            let mut set = cpu_set(false);
            let mut seen = Vec::new();
            for _ in 0..4 {
                seen.push((set.curr_buffer_idx(), set.prev_buffer_idx(), set.spare_buffer_idx()));
                set.tick(lane);
            }
            assert_eq!(seen, vec![(0, 2, 1), (1, 0, 2), (2, 1, 0), (0, 2, 1)]);
        });
    }

    #[test]
    fn gpu_sets_rotate_two_buffers() {
        thread::spawn(|| {
            let lane = RenderLane::enter();
            let mut set = GpuDataSet::new(DataSetId::new("gpu", DataSetKind::Particle));
            set.add_variable(Variable::new("Age", TypeDef::Float));
            set.finalize();
            assert_eq!(set.buffer_count(), 2);
            assert_eq!((set.curr_buffer_idx(), set.prev_buffer_idx()), (0, 1));
            set.tick(&lane);
            assert_eq!((set.curr_buffer_idx(), set.prev_buffer_idx()), (1, 0));
            set.tick(&lane);
            assert_eq!(set.curr_buffer_idx(), 0);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn allocate_grows_ids_and_tick_exposes_previous_table() {
        on_sim_lane(|lane| {
            let mut set = cpu_set(true);
            set.allocate(lane, 3, false);
            assert_eq!(set.free_id_table(), &[2, 1, 0]);
            assert_eq!(set.max_used_id(), INDEX_NONE);

            set.set_num_instances(lane, 3);
            let ids: Vec<_> = (0..3).map(|i| set.acquire_id(lane, i)).collect();
            assert_eq!(set.max_used_id(), 2);
            assert_eq!(set.index_of(ids[1]), Some(1));

            set.tick(lane);
            assert_eq!(set.prev_index_of(ids[2]), Some(2));
            assert_eq!(set.prev_id_table(), &[0, 1, 2]);

            set.allocate(lane, 5, false);
            assert_eq!(set.curr_id_table(), &[INDEX_NONE; 5]);
            assert_eq!(set.free_id_table(), &[4, 3]);
        });
    }

    #[test]
    fn reset_current_buffers_clears_ids_for_regrowth() {
        on_sim_lane(|lane| {
            let mut set = cpu_set(true);
            set.allocate(lane, 4, false);
            set.set_num_instances(lane, 4);
            for i in 0..4 {
                set.acquire_id(lane, i);
            }
            set.tick(lane);

            let survivor = ParticleId::new(2, 0);
            assert_eq!(set.prev_index_of(survivor), Some(2));

            set.reset_current_buffers(lane);
            assert_eq!(set.num_instances(), 0);
            assert_eq!(set.num_free_ids(), 0);
            // Every slot's IDs are gone, not just the current one
            assert!(set.prev_id_table().is_empty());
            assert_eq!(set.prev_index_of(survivor), None);

            set.allocate(lane, 2, false);
            assert_eq!(set.free_id_table(), &[1, 0]);
        });
    }

    #[test]
    fn recycled_id_index_does_not_resolve_the_dead_particle() {
        on_sim_lane(|lane| {
            let mut set = cpu_set(true);
            set.set_id_acquire_tag(lane, 0);
            set.allocate(lane, 1, false);
            set.set_num_instances(lane, 1);
            let old = set.acquire_id(lane, 0);
            set.tick(lane);

            // The particle dies and a new one reuses its index
            set.set_id_acquire_tag(lane, 1);
            set.allocate(lane, 1, false);
            set.release_id(lane, old);
            set.set_num_instances(lane, 1);
            let new = set.acquire_id(lane, 0);

            assert_eq!(new.index, old.index);
            assert_eq!(set.index_of(new), Some(0));
            assert_eq!(set.index_of(old), None);
            assert_eq!(set.prev_index_of(old), Some(0));
            assert_eq!(set.prev_index_of(new), None);
        });
    }

    #[test]
    fn growing_twice_in_one_tick_hands_out_unique_ids() {
        on_sim_lane(|lane| {
            let mut set = cpu_set(true);
            set.allocate(lane, 2, false);
            set.set_num_instances(lane, 1);
            let first = set.acquire_id(lane, 0);

            set.allocate(lane, 4, true);
            assert_eq!(set.free_id_table().len(), 3);
            set.set_num_instances(lane, 4);
            let mut indices: Vec<_> = (1..4).map(|i| set.acquire_id(lane, i).index).collect();
            indices.push(first.index);
            indices.sort_unstable();
            assert_eq!(indices, vec![0, 1, 2, 3]);
            assert_eq!(set.index_of(first), Some(0));
        });
    }

    #[test]
    fn copy_curr_to_prev_snapshots_the_current_buffer() {
        on_sim_lane(|lane| {
            let mut set = cpu_set(false);
            set.allocate(lane, 2, false);
            set.set_num_instances(lane, 2);
            set.curr_data_mut(lane).int32_column_mut(0).set(1, 42);

            set.copy_curr_to_prev(lane);
            assert_eq!(set.prev_num_instances(), 2);
            assert_eq!(set.prev_data().int32_column(0).get(1), 42);
        });
    }

    #[test]
    fn register_overflow_is_returned() {
        on_sim_lane(|lane| {
            let mut set = cpu_set(false);
            set.allocate(lane, 8, false);
            let mut table = RegisterTable::new();
            for _ in 0..25 {
                set.append_to_register_table(lane, &mut table, 0).unwrap();
            }
            assert!(set.append_to_register_table(lane, &mut table, 0).is_err());
        });
    }

    #[test]
    fn nan_report_policy_logs_without_panicking() {
        on_sim_lane(|lane| {
            let settings = DataSetSettings {
                nan_policy: NanPolicy::Report,
                ..DataSetSettings::default()
            };
            let mut set = CpuDataSet::with_settings(DataSetId::new("n", DataSetKind::Particle), settings);
            set.add_variable(Variable::new("Age", TypeDef::Float));
            set.finalize();
            set.allocate(lane, 2, false);
            set.set_num_instances(lane, 2);
            assert!(!set.check_for_nans(lane));

            set.curr_data_mut(lane).float_column_mut(0).set(1, f32::NAN);
            assert!(set.check_for_nans(lane));
            set.tick(lane);
            // The poisoned buffer is now previous and still reported
            assert!(set.check_for_nans(lane));
        });
    }

    #[test]
    fn nan_fatal_policy_panics_on_tick() {
        let result = thread::spawn(|| {
            let lane = SimLane::enter();
            let settings = DataSetSettings {
                nan_policy: NanPolicy::Fatal,
                dump_on_nan: false,
                ..DataSetSettings::default()
            };
            let mut set = CpuDataSet::with_settings(DataSetId::new("n", DataSetKind::Particle), settings);
            set.add_variable(Variable::new("Age", TypeDef::Float));
            set.finalize();
            set.allocate(&lane, 1, false);
            set.set_num_instances(&lane, 1);
            set.curr_data_mut(&lane).float_column_mut(0).set(0, f32::INFINITY);
            set.tick(&lane);
        })
        .join();
        assert!(result.is_err());
    }

    #[test]
    fn gpu_reset_is_deferred_to_the_render_lane() {
        let (sender, queue) = render_command_channel();
        thread::spawn(move || {
            let lane = RenderLane::enter();
            let mut set = GpuDataSet::new(DataSetId::new("gpu", DataSetKind::Particle));
            set.add_variable(Variable::new("Age", TypeDef::Float));
            set.finalize();
            set.allocate(&lane, 16, false);
            set.set_num_instances(&lane, 16);

            let requester = sender.clone();
            let id = set.id().clone();
            thread::spawn(move || {
                requester.send(RenderCommand::ResetBuffers(id));
            })
            .join()
            .unwrap();

            // Nothing changes until the queue is drained
            assert_eq!(set.num_instances(), 16);
            let applied = queue.drain(&lane, |lane, command| {
                assert!(set.apply_render_command(lane, &command));
            });
            assert_eq!(applied, 1);
            assert_eq!(set.num_instances(), 0);
            assert_eq!(set.num_instances_allocated(), 0);
            assert_eq!(set.size_bytes(), 0);
        })
        .join()
        .unwrap();
    }
}
