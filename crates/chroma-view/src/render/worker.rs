use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};

use super::backend::Backend;
use super::{RenderError, RenderResult, Renderer};
use crate::media::Image;
use crate::model::channel::ChannelProperty;

/// A render request. `image` is only set when the base image changed.
#[derive(Debug, Clone)]
pub struct RenderTask {
    pub channel_properties: Vec<ChannelProperty>,
    pub image: Option<Arc<Image>>,
}

pub enum RenderMessage {
    Render(RenderTask),
    /// Terminal sentinel: the worker answers with [`RenderOutput::Stopped`] and exits.
    Shutdown,
}

pub enum RenderOutput {
    Frame(RenderResult),
    /// The batch failed to render; the previous frame stays current.
    Dropped { coalesced: usize },
    Stopped,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerOptions {
    pub prefer_gpu: bool,
    /// Log frame errors at `error` level instead of `debug`.
    pub debug: bool,
}

/// Everything received in one drain: the newest image and the newest
/// property set win.
#[derive(Default)]
struct Batch {
    properties: Option<Vec<ChannelProperty>>,
    image: Option<Arc<Image>>,
    tasks: usize,
    shutdown: bool,
}

impl Batch {
    fn absorb(&mut self, message: RenderMessage) {
        match message {
            RenderMessage::Render(task) => {
                self.tasks += 1;
                self.properties = Some(task.channel_properties);
                if task.image.is_some() {
                    self.image = task.image;
                }
            }
            RenderMessage::Shutdown => self.shutdown = true,
        }
    }
}

/// Render loop body: block for a task, drain everything else already queued,
/// render once with the latest state, publish, repeat.
///
/// Always sends [`RenderOutput::Stopped`] before returning.
pub fn run_render_loop(
    tasks: Receiver<RenderMessage>,
    results: Sender<RenderOutput>,
    options: WorkerOptions,
) {
    let mut renderer = Renderer::new(Backend::select(options.prefer_gpu));

    loop {
        let mut batch = Batch::default();
        match tasks.recv() {
            Ok(message) => batch.absorb(message),
            Err(_) => {
                log::debug!("Render worker exiting (channel closed)");
                break;
            }
        }
        while !batch.shutdown {
            match tasks.try_recv() {
                Ok(message) => batch.absorb(message),
                Err(_) => break,
            }
        }
        if batch.shutdown {
            log::debug!("Render worker exiting (shutdown requested)");
            break;
        }
        if batch.tasks > 1 {
            log::debug!("Coalesced {} render tasks into one frame", batch.tasks);
        }

        if let Some(image) = batch.image {
            renderer.set_image(image);
        }
        let Some(properties) = batch.properties else {
            continue;
        };

        let outcome = catch_quietly(options.debug, || renderer.render(&properties));
        let (error, trace) = match outcome {
            Ok(Ok(mut frame)) => {
                frame.coalesced = batch.tasks;
                if results.send(RenderOutput::Frame(frame)).is_err() {
                    log::debug!("Render worker exiting (result channel closed)");
                    return;
                }
                continue;
            }
            Ok(Err(e)) => (e, None),
            Err((message, trace)) => {
                // Partially updated cache entries cannot be trusted.
                renderer.clear_cache();
                (RenderError::Panicked(message), trace)
            }
        };
        if options.debug {
            match trace {
                Some(trace) => log::error!("Render failed: {error}\nstack backtrace:\n{trace}"),
                None => log::error!("Render failed: {error}"),
            }
        } else {
            log::debug!("Render failed: {error}");
        }
        if results
            .send(RenderOutput::Dropped {
                coalesced: batch.tasks,
            })
            .is_err()
        {
            return;
        }
    }

    let _ = results.send(RenderOutput::Stopped);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

thread_local! {
    /// Set while a worker runs code whose panics it catches and reports itself.
    static CATCHING: Cell<bool> = const { Cell::new(false) };
    static CAPTURE_TRACE: Cell<bool> = const { Cell::new(false) };
    static LAST_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a panic hook that stays silent for panics inside [`catch_quietly`]
/// and defers to the previous hook everywhere else.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !CATCHING.with(Cell::get) {
                previous(info);
                return;
            }
            if CAPTURE_TRACE.with(Cell::get) {
                LAST_TRACE.with(|t| *t.borrow_mut() = Some(Backtrace::force_capture()));
            }
        }));
    });
}

/// Run `f`, turning a panic into its message instead of a stderr report.
/// With `capture_trace` the panic's backtrace comes back too.
pub(crate) fn catch_quietly<T>(
    capture_trace: bool,
    f: impl FnOnce() -> T,
) -> Result<T, (String, Option<Backtrace>)> {
    install_panic_hook();
    CATCHING.with(|c| c.set(true));
    CAPTURE_TRACE.with(|c| c.set(capture_trace));
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    CATCHING.with(|c| c.set(false));
    let trace = LAST_TRACE.with(|t| t.borrow_mut().take());
    outcome.map_err(|payload| (panic_message(payload.as_ref()), trace))
}

/// Handle to the background render thread.
pub struct RenderWorker {
    task_tx: Option<Sender<RenderMessage>>,
    result_rx: Receiver<RenderOutput>,
    thread: Option<JoinHandle<()>>,
    submitted: usize,
    completed: usize,
}

impl RenderWorker {
    pub fn spawn(options: WorkerOptions) -> Self {
        let (task_tx, task_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();

        let handle = thread::Builder::new()
            .name("chroma-render".into())
            .spawn(move || run_render_loop(task_rx, result_tx, options))
            .expect("failed to spawn render worker thread");

        Self {
            task_tx: Some(task_tx),
            result_rx,
            thread: Some(handle),
            submitted: 0,
            completed: 0,
        }
    }

    /// Queue a render task. Returns false once the worker is gone.
    pub fn submit(&mut self, task: RenderTask) -> bool {
        let sent = match &self.task_tx {
            Some(tx) => tx.send(RenderMessage::Render(task)).is_ok(),
            None => false,
        };
        if sent {
            self.submitted += 1;
        }
        sent
    }

    /// Tasks submitted but not yet answered by a frame or a drop.
    pub fn pending(&self) -> usize {
        self.submitted.saturating_sub(self.completed)
    }

    /// Newest finished frame, discarding any older ones still queued.
    pub fn try_recv(&mut self) -> Option<RenderResult> {
        let mut latest = None;
        loop {
            match self.result_rx.try_recv() {
                Ok(RenderOutput::Frame(frame)) => {
                    self.completed += frame.coalesced;
                    latest = Some(frame);
                }
                Ok(RenderOutput::Dropped { coalesced }) => self.completed += coalesced,
                Ok(RenderOutput::Stopped) | Err(TryRecvError::Disconnected) => {
                    log::warn!("Render worker stopped unexpectedly");
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }
        latest
    }

    /// Wait up to `timeout` for the next frame. Dropped batches are counted
    /// and skipped.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<RenderResult> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.result_rx.recv_deadline(deadline) {
                Ok(RenderOutput::Frame(frame)) => {
                    self.completed += frame.coalesced;
                    return Some(frame);
                }
                Ok(RenderOutput::Dropped { coalesced }) => self.completed += coalesced,
                Ok(RenderOutput::Stopped) | Err(RecvTimeoutError::Disconnected) => {
                    log::warn!("Render worker stopped unexpectedly");
                    return None;
                }
                Err(RecvTimeoutError::Timeout) => return None,
            }
        }
    }

    /// Send the sentinel, drain results until the worker acknowledges, then join.
    pub fn shutdown(&mut self) {
        let Some(tx) = self.task_tx.take() else {
            return;
        };
        let _ = tx.send(RenderMessage::Shutdown);
        drop(tx);

        let mut discarded = 0usize;
        loop {
            match self.result_rx.recv() {
                Ok(RenderOutput::Frame(_) | RenderOutput::Dropped { .. }) => discarded += 1,
                Ok(RenderOutput::Stopped) | Err(_) => break,
            }
        }
        if discarded > 0 {
            log::debug!("Discarded {discarded} unread frame(s) during shutdown");
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
