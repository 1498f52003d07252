//! Deferred render-lane commands
//!
//! State owned by the render lane may only change on the render lane. Other
//! lanes enqueue a [`RenderCommand`] and the render lane applies it the
//! next time it drains the queue.

use crate::data_set::DataSetId;
use crate::lane::RenderLane;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderCommand {
    /// Clear every buffer and ID table of the named data set.
    ResetBuffers(DataSetId),
}

/// Sending half; cloneable and `Send`.
#[derive(Clone, Debug)]
pub struct RenderCommandSender {
    tx: Sender<RenderCommand>,
}

impl RenderCommandSender {
    /// Returns false when the render lane has dropped its queue.
    pub fn send(&self, command: RenderCommand) -> bool {
        match self.tx.send(command) {
            Ok(()) => true,
            Err(mpsc::SendError(command)) => {
                tracing::warn!(?command, "render command queue closed; command dropped");
                false
            }
        }
    }
}

/// Receiving half, drained on the render lane.
#[derive(Debug)]
pub struct RenderCommandQueue {
    rx: Receiver<RenderCommand>,
}

impl RenderCommandQueue {
    /// Apply every pending command in submission order. Returns how many
    /// commands ran.
    pub fn drain(
        &self,
        lane: &RenderLane,
        mut apply: impl FnMut(&RenderLane, RenderCommand),
    ) -> usize {
        let mut count = 0;
        loop {
            match self.rx.try_recv() {
                Ok(command) => {
                    apply(lane, command);
                    count += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if count > 0 {
            tracing::trace!(count, "drained render commands");
        }
        count
    }
}

pub fn render_command_channel() -> (RenderCommandSender, RenderCommandQueue) {
    let (tx, rx) = mpsc::channel();
    (RenderCommandSender { tx }, RenderCommandQueue { rx })
}
