use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};

use crate::media::{Image, load_image};
use crate::render::worker::catch_quietly;

/// Request sent to the IO thread.
#[derive(Debug, Clone)]
pub enum IoTask {
    LoadImage { path: PathBuf },
    /// Terminal sentinel, answered with [`IoResponse::Stopped`].
    Shutdown,
}

/// Exactly one response is produced per [`IoTask::LoadImage`].
#[derive(Debug)]
pub enum IoResponse {
    ImageLoaded { path: PathBuf, image: Arc<Image> },
    Failed { path: PathBuf, error: String },
    Stopped,
}

/// IO loop body. Never drops a request; decode failures and panics become
/// [`IoResponse::Failed`].
pub fn run_io_loop(tasks: Receiver<IoTask>, responses: Sender<IoResponse>) {
    loop {
        let task = match tasks.recv() {
            Ok(t) => t,
            Err(_) => {
                log::debug!("IO worker exiting (channel closed)");
                break;
            }
        };

        let response = match task {
            IoTask::Shutdown => {
                log::debug!("IO worker exiting (shutdown requested)");
                break;
            }
            IoTask::LoadImage { path } => {
                match catch_quietly(false, || load_image(&path)) {
                    Ok(Ok(image)) => IoResponse::ImageLoaded {
                        path,
                        image: Arc::new(image),
                    },
                    Ok(Err(e)) => {
                        log::warn!("Failed to load '{}': {}", path.display(), e);
                        IoResponse::Failed {
                            path,
                            error: e.to_string(),
                        }
                    }
                    Err((error, _)) => {
                        log::warn!("Loading '{}' panicked: {}", path.display(), error);
                        IoResponse::Failed { path, error }
                    }
                }
            }
        };

        if responses.send(response).is_err() {
            log::debug!("IO worker exiting (response channel closed)");
            return;
        }
    }

    let _ = responses.send(IoResponse::Stopped);
}

/// Handle to the background IO thread.
pub struct IoWorker {
    task_tx: Option<Sender<IoTask>>,
    response_rx: Receiver<IoResponse>,
    thread: Option<JoinHandle<()>>,
}

impl IoWorker {
    pub fn spawn() -> Self {
        let (task_tx, task_rx) = unbounded();
        let (response_tx, response_rx) = unbounded();

        let handle = thread::Builder::new()
            .name("chroma-io".into())
            .spawn(move || run_io_loop(task_rx, response_tx))
            .expect("failed to spawn IO worker thread");

        Self {
            task_tx: Some(task_tx),
            response_rx,
            thread: Some(handle),
        }
    }

    /// Queue an image load. Returns false once the worker is gone.
    pub fn load_image(&self, path: PathBuf) -> bool {
        match &self.task_tx {
            Some(tx) => tx.send(IoTask::LoadImage { path }).is_ok(),
            None => false,
        }
    }

    /// Next response if one is ready.
    pub fn try_recv(&self) -> Option<IoResponse> {
        match self.response_rx.try_recv() {
            Ok(IoResponse::Stopped) | Err(TryRecvError::Disconnected) => {
                log::warn!("IO worker stopped unexpectedly");
                None
            }
            Ok(response) => Some(response),
            Err(TryRecvError::Empty) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<IoResponse> {
        match self.response_rx.recv_timeout(timeout) {
            Ok(IoResponse::Stopped) | Err(RecvTimeoutError::Disconnected) => {
                log::warn!("IO worker stopped unexpectedly");
                None
            }
            Ok(response) => Some(response),
            Err(RecvTimeoutError::Timeout) => None,
        }
    }

    /// Send the sentinel, drain pending responses until acknowledged, then join.
    pub fn shutdown(&mut self) {
        let Some(tx) = self.task_tx.take() else {
            return;
        };
        let _ = tx.send(IoTask::Shutdown);
        drop(tx);

        loop {
            match self.response_rx.recv() {
                Ok(IoResponse::Stopped) | Err(_) => break,
                Ok(other) => log::debug!("Discarding IO response during shutdown: {other:?}"),
            }
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for IoWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn missing_file_returns_failure() {
        let worker = IoWorker::spawn();
        let path = PathBuf::from("/nonexistent/fake_image.png");
        assert!(worker.load_image(path.clone()));

        match worker.recv_timeout(TIMEOUT) {
            Some(IoResponse::Failed { path: p, error }) => {
                assert_eq!(p, path);
                assert!(!error.is_empty());
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn one_response_per_request_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("ok.json");
        std::fs::write(&good, r#"{"shape": [2, 2], "data": [0, 1, 2, 3]}"#).unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "not json").unwrap();

        let worker = IoWorker::spawn();
        for p in [&good, &bad, &good] {
            worker.load_image(p.clone());
        }

        let kinds: Vec<_> = (0..3)
            .map(|_| match worker.recv_timeout(TIMEOUT) {
                Some(IoResponse::ImageLoaded { image, .. }) => {
                    assert_eq!(image.shape(), (2, 2, 1));
                    "ok"
                }
                Some(IoResponse::Failed { .. }) => "failed",
                other => panic!("expected a response, got {other:?}"),
            })
            .collect();
        assert_eq!(kinds, vec!["ok", "failed", "ok"]);
        assert!(worker.try_recv().is_none());
    }

    #[test]
    fn loop_acknowledges_shutdown() {
        let (task_tx, task_rx) = unbounded();
        let (response_tx, response_rx) = unbounded();
        task_tx
            .send(IoTask::LoadImage {
                path: PathBuf::from("/nonexistent/a.png"),
            })
            .unwrap();
        task_tx.send(IoTask::Shutdown).unwrap();

        run_io_loop(task_rx, response_tx);
        assert!(matches!(
            response_rx.try_recv(),
            Ok(IoResponse::Failed { .. })
        ));
        assert!(matches!(response_rx.try_recv(), Ok(IoResponse::Stopped)));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut worker = IoWorker::spawn();
        worker.shutdown();
        assert!(!worker.load_image(PathBuf::from("x.png")));
        worker.shutdown();
    }
}
