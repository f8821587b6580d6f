/// Compute backend for channel processing.
///
/// Only the CPU implementation is compiled in; a GPU request falls back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Cpu,
}

impl Backend {
    /// Pick a backend once at worker start and log the choice.
    pub fn select(prefer_gpu: bool) -> Self {
        let backend = Backend::Cpu;
        if prefer_gpu {
            log::warn!(
                "GPU backend requested but unavailable, falling back to {}",
                backend.name()
            );
        } else {
            log::info!("Render backend: {}", backend.name());
        }
        backend
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Cpu => "CPU",
        }
    }
}
