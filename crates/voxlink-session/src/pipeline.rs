//! Pipeline plumbing — the stage trait, bounded hand-off channels, and the
//! task set that drives a stage chain.
//!
//! Stages are composed strictly in declared order. Each runs as its own task
//! connected to its neighbours by a bounded mpsc channel, so a slow stage
//! backpressures its upstream instead of buffering unboundedly. Cancellation
//! is cooperative: every stage observes the session's token between frame
//! hand-offs.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use voxlink_core::error::{Result, VoxlinkError};
use voxlink_core::frame::Frame;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// A single-input/single-output transformer over the frame stream.
///
/// Contract: output order follows input order; frames the stage does not
/// understand are forwarded unchanged; an `Err` return is fatal to the
/// session (fail-fast), never silently swallowed.
#[async_trait]
pub trait PipelineStage: Send + 'static {
    fn name(&self) -> &'static str;

    async fn run(
        self: Box<Self>,
        input: mpsc::Receiver<Frame>,
        output: mpsc::Sender<Frame>,
        cancel: CancellationToken,
    ) -> Result<()>;
}

/// Receive the next frame, observing cancellation between hand-offs.
/// `None` means cancelled or upstream finished — either way the stage stops.
pub async fn next_frame(
    input: &mut mpsc::Receiver<Frame>,
    cancel: &CancellationToken,
) -> Option<Frame> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        frame = input.recv() => frame,
    }
}

/// Hand a frame to the next stage. Returns false when cancelled or the
/// downstream stage is gone; the caller should stop cleanly.
pub async fn send_frame(
    output: &mpsc::Sender<Frame>,
    frame: Frame,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = output.send(frame) => sent.is_ok(),
    }
}

/// Sender into the head of a running pipeline, used to inject control frames.
pub struct PipelineHandle {
    head: mpsc::Sender<Frame>,
}

impl PipelineHandle {
    /// Inject a frame ahead of the first stage. Returns false once the
    /// pipeline has shut down.
    pub async fn inject(&self, frame: Frame) -> bool {
        self.head.send(frame).await.is_ok()
    }
}

/// The joined stage tasks of one pipeline.
pub struct PipelineJoin {
    tasks: JoinSet<(&'static str, Result<()>)>,
}

impl PipelineJoin {
    /// Resolve on the first stage failure, or with `Ok(())` once every stage
    /// has finished cleanly.
    pub async fn wait(&mut self) -> Result<()> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => continue,
                Ok((name, Err(err))) => {
                    return Err(match err {
                        stage @ VoxlinkError::Stage { .. } => stage,
                        other => VoxlinkError::stage(name, other),
                    });
                }
                Err(join_err) => {
                    return Err(VoxlinkError::stage("pipeline", join_err));
                }
            }
        }
        Ok(())
    }

    /// Abort anything still running and reap the tasks. Called after the
    /// cancellation token has fired, so stages have already had their chance
    /// to stop cooperatively.
    pub async fn shutdown(mut self) {
        self.tasks.shutdown().await;
    }
}

/// Assembles a stage chain and spawns it.
pub struct PipelineBuilder {
    stages: Vec<Box<dyn PipelineStage>>,
    capacity: usize,
}

impl PipelineBuilder {
    pub fn new(capacity: usize) -> Self {
        Self {
            stages: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn stage(self, stage: impl PipelineStage) -> Self {
        self.stage_boxed(Box::new(stage))
    }

    pub fn stage_boxed(mut self, stage: Box<dyn PipelineStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Spawn every stage, wired head-to-tail with bounded channels. Frames
    /// reaching the end of the chain are drained and dropped.
    pub fn spawn(self, cancel: &CancellationToken) -> (PipelineHandle, PipelineJoin) {
        let (head_tx, mut prev_rx) = mpsc::channel(self.capacity);
        let mut tasks = JoinSet::new();

        for stage in self.stages {
            let (tx, rx) = mpsc::channel(self.capacity);
            let stage_cancel = cancel.clone();
            let name = stage.name();
            tasks.spawn(async move {
                let result = stage.run(prev_rx, tx, stage_cancel).await;
                (name, result)
            });
            prev_rx = rx;
        }

        // Tail drain: the last stage must never block on a full channel.
        tasks.spawn(async move {
            while prev_rx.recv().await.is_some() {}
            ("drain", Ok(()))
        });

        (PipelineHandle { head: head_tx }, PipelineJoin { tasks })
    }
}
