//! The UDF manager: one dispatch thread feeding a chain-running pool.
//!
//! The dispatch thread pops frames from the input queue in insertion
//! order, applies the output encoding policy to the primary plane, and
//! submits one chain job per frame. Workers run the chain sequentially
//! over their frame and push survivors to the output queue — frames run
//! in parallel across workers, so output order is unspecified; run with
//! `max_workers = 1` when downstream needs input order.
//!
//! Shutdown is cooperative: `stop()` raises the stop flag (bounding
//! latency to one frame plus one 250 ms tick), joins the dispatch
//! thread, then drains the pool's in-flight jobs.

use crate::config::{EncodingPolicy, ManagerConfig};
use crate::error::Result;
use crate::frame::{EncodeType, Frame};
use crate::pool::{Job, WorkerPool};
use crate::queue::ThreadSafeQueue;
use crate::udf::{UdfHandle, UdfLoader, UdfRetCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Queue type carrying frames between pipeline stages.
pub type FrameQueue = ThreadSafeQueue<Frame>;

/// How often the dispatch loop re-checks the stop flag while idle.
const DISPATCH_TICK: Duration = Duration::from_millis(250);

/// Runs an ordered UDF chain over a stream of frames.
pub struct UdfManager {
    udfs: Arc<Vec<UdfHandle>>,
    pool: Arc<WorkerPool>,
    input: Arc<FrameQueue>,
    output: Arc<FrameQueue>,
    policy: Option<EncodingPolicy>,
    stop: Arc<AtomicBool>,
    dispatch: Option<JoinHandle<()>>,
}

impl UdfManager {
    /// Load every configured UDF and prepare the pool. Any failure —
    /// config validation or UDF loading — surfaces here, before a single
    /// thread exists.
    pub fn new(
        config: ManagerConfig,
        input: Arc<FrameQueue>,
        output: Arc<FrameQueue>,
    ) -> Result<Self> {
        config.validate()?;

        let loader = UdfLoader::new();
        let mut udfs = Vec::with_capacity(config.udfs.len());
        for entry in &config.udfs {
            tracing::debug!(udf = %entry.name, "loading UDF");
            udfs.push(loader.load(&entry.name, &entry.config_value())?);
        }

        tracing::info!(
            udfs = udfs.len(),
            max_jobs = config.max_jobs,
            max_workers = config.max_workers,
            "UDF manager ready"
        );
        Ok(Self {
            udfs: Arc::new(udfs),
            pool: Arc::new(WorkerPool::new(config.max_workers, config.max_jobs)),
            input,
            output,
            policy: config.encoding,
            stop: Arc::new(AtomicBool::new(false)),
            dispatch: None,
        })
    }

    /// Build a manager around pre-constructed handles, for embedders that
    /// wire their own chain instead of resolving names from disk.
    pub fn from_handles(
        handles: Vec<UdfHandle>,
        max_workers: usize,
        max_jobs: i64,
        encoding: Option<EncodingPolicy>,
        input: Arc<FrameQueue>,
        output: Arc<FrameQueue>,
    ) -> Self {
        Self {
            udfs: Arc::new(handles),
            pool: Arc::new(WorkerPool::new(max_workers, max_jobs)),
            input,
            output,
            policy: encoding,
            stop: Arc::new(AtomicBool::new(false)),
            dispatch: None,
        }
    }

    /// Spawn the dispatch thread. Idempotent while running; a no-op after
    /// `stop()`.
    pub fn start(&mut self) {
        if self.dispatch.is_some() || self.stop.load(Ordering::SeqCst) {
            tracing::warn!("start attempted while running or after stop");
            return;
        }

        let input = self.input.clone();
        let output = self.output.clone();
        let udfs = self.udfs.clone();
        let pool = self.pool.clone();
        let policy = self.policy;
        let stop = self.stop.clone();

        self.dispatch = Some(
            std::thread::Builder::new()
                .name("framepipe-dispatch".to_string())
                .spawn(move || dispatch_loop(&input, &output, &udfs, &pool, policy, &stop))
                .expect("failed to spawn dispatch thread"),
        );
    }

    /// Raise the stop flag, join the dispatch thread, then drain and stop
    /// the pool.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(dispatch) = self.dispatch.take() {
            let _ = dispatch.join();
        }
        self.pool.stop();
    }

    pub fn input_queue(&self) -> &Arc<FrameQueue> {
        &self.input
    }

    pub fn output_queue(&self) -> &Arc<FrameQueue> {
        &self.output
    }
}

impl Drop for UdfManager {
    fn drop(&mut self) {
        self.stop();
        tracing::debug!("clearing UDF input queue");
        while self.input.pop().is_some() {}
        tracing::debug!("clearing UDF output queue");
        while self.output.pop().is_some() {}
    }
}

fn dispatch_loop(
    input: &FrameQueue,
    output: &Arc<FrameQueue>,
    udfs: &Arc<Vec<UdfHandle>>,
    pool: &WorkerPool,
    policy: Option<EncodingPolicy>,
    stop: &AtomicBool,
) {
    tracing::info!("UDF manager thread started");

    while !stop.load(Ordering::SeqCst) {
        if !input.wait_for(DISPATCH_TICK) {
            continue;
        }
        let Some(mut frame) = input.pop() else {
            continue;
        };
        tracing::debug!("popped frame from input queue");

        apply_encoding_policy(&mut frame, policy);

        let mut job: Job = {
            let udfs = udfs.clone();
            let output = output.clone();
            Box::new(move || run_chain(frame, &udfs, &output))
        };
        // Full pool queue is backpressure: retry until accepted, bailing
        // only when shutting down.
        loop {
            match pool.try_submit(job) {
                Ok(_) => break,
                Err(returned) => {
                    if stop.load(Ordering::SeqCst) {
                        tracing::warn!("dropping frame during shutdown");
                        break;
                    }
                    job = returned;
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    tracing::info!("UDF manager thread stopped");
}

/// Re-encode policy: if the primary plane's encoding differs from the
/// configured one, rewrite it. A `None` policy type leaves frames alone.
fn apply_encoding_policy(frame: &mut Frame, policy: Option<EncodingPolicy>) {
    let Some(policy) = policy else { return };
    if policy.encode_type == EncodeType::None {
        return;
    }

    let differs = match (frame.encode_type(0), frame.encode_level(0)) {
        (Ok(enc), Ok(level)) => enc != policy.encode_type || level != policy.level,
        _ => false,
    };
    if differs {
        if let Err(e) = frame.set_encoding(policy.encode_type, policy.level, 0) {
            tracing::error!(error = %e, "failed to apply output encoding policy");
        }
    }
}

/// Run the UDF chain over one frame on a pool worker.
///
/// `DropFrame` and `Error` destroy the frame and end the chain;
/// `FrameModified` continues like `Ok`. Only `Ok`-exit frames reach the
/// output queue.
fn run_chain(mut frame: Frame, udfs: &[UdfHandle], output: &FrameQueue) {
    for handle in udfs {
        let started = Instant::now();
        let ret = handle.process(&mut frame);
        tracing::debug!(
            udf = handle.name(),
            kind = handle.kind(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "UDF processed frame"
        );

        match ret {
            UdfRetCode::DropFrame => {
                tracing::debug!(udf = handle.name(), "dropping frame");
                return;
            }
            UdfRetCode::Error => {
                tracing::error!(udf = handle.name(), "failed to process frame");
                return;
            }
            UdfRetCode::FrameModified | UdfRetCode::Ok => {}
        }
    }

    tracing::debug!("pushing frame to output queue");
    if let Err(frame) = output.push(frame) {
        // Bounded output queue is full; block until downstream drains.
        output.push_wait(frame);
    }
}
