//! Daemon state — the central struct owning all mutable state.
//!
//! A single `DaemonState` is threaded as `&mut` through every calloop
//! callback, so the pipeline, the IPC server, and the calibration timers
//! never race.

use std::sync::Arc;

use calloop::LoopHandle;

use crate::clock::Clock;
use crate::ipc::IpcServer;
use crate::pipeline::{GazePipeline, PipelineConfig};

pub struct DaemonState {
    pub pipeline: GazePipeline,
    pub ipc: IpcServer,
    pub clock: Arc<dyn Clock>,
    /// Handle for arming calibration dwell timers from dispatch.
    pub loop_handle: LoopHandle<'static, DaemonState>,
}

impl DaemonState {
    pub fn new(
        config: PipelineConfig,
        clock: Arc<dyn Clock>,
        ipc: IpcServer,
        loop_handle: LoopHandle<'static, DaemonState>,
    ) -> Self {
        Self {
            pipeline: GazePipeline::new(config),
            ipc,
            clock,
            loop_handle,
        }
    }
}
