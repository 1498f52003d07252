//! Execution lanes
//!
//! A data set is driven from exactly one lane: the simulation lane for CPU
//! simulated sets, the render lane for GPU simulated ones. Operations take
//! a lane token, so calling a GPU set's operations without a
//! [`RenderLane`] does not compile. Tokens are `!Send`, and a thread that
//! entered one lane kind can never enter the other.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LaneKind {
    Sim,
    Render,
}

impl fmt::Display for LaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneKind::Sim => f.write_str("simulation"),
            LaneKind::Render => f.write_str("render"),
        }
    }
}

thread_local! {
    static BOUND_LANE: Cell<Option<LaneKind>> = const { Cell::new(None) };
}

fn bind(kind: LaneKind) {
    BOUND_LANE.with(|bound| match bound.get() {
        None => bound.set(Some(kind)),
        Some(existing) if existing == kind => {}
        Some(existing) => panic!(
            "thread is bound to the {existing} lane and cannot enter the {kind} lane"
        ),
    });
}

/// Lane the calling thread is bound to, if any.
pub fn current_lane() -> Option<LaneKind> {
    BOUND_LANE.with(Cell::get)
}

mod sealed {
    pub trait Sealed {}
}

/// Implemented by the two lane tokens.
pub trait Lane: sealed::Sealed {
    const KIND: LaneKind;
}

/// Token for the simulation lane.
#[derive(Debug)]
pub struct SimLane {
    _not_send: PhantomData<*const ()>,
}

impl SimLane {
    pub fn enter() -> Self {
        bind(Self::KIND);
        Self {
            _not_send: PhantomData,
        }
    }
}

/// Token for the render lane.
#[derive(Debug)]
pub struct RenderLane {
    _not_send: PhantomData<*const ()>,
}

impl RenderLane {
    pub fn enter() -> Self {
        bind(Self::KIND);
        Self {
            _not_send: PhantomData,
        }
    }
}

impl sealed::Sealed for SimLane {}
impl sealed::Sealed for RenderLane {}

impl Lane for SimLane {
    const KIND: LaneKind = LaneKind::Sim;
}

impl Lane for RenderLane {
    const KIND: LaneKind = LaneKind::Render;
}
