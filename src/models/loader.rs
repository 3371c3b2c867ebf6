//! Building a complete model/tokenizer pair off to the side.
//!
//! Everything here runs before the swap: nothing touches the installed
//! model, so any failure leaves the server exactly as it was.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use crate::engine::{ModelBackend, ServeDevice};

use super::error::ServeError;

/// A fully constructed load, ready to be installed.
pub struct LoadResult<B: ModelBackend> {
    pub model: B::Model,
    pub tokenizer: B::Tokenizer,
    pub resolved_base_path: PathBuf,
    pub resolved_adapter_path: Option<PathBuf>,
    pub adapter_applied: bool,
}

/// Outcome of a successful `load`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub message: &'static str,
    pub base_path: PathBuf,
    pub adapter_path: Option<PathBuf>,
    pub adapter_applied: bool,
}

/// Run the construction steps of a load, converting backend panics into
/// `LoadFailed`.
pub(crate) fn build<B: ModelBackend>(
    backend: &B,
    device: &ServeDevice,
    num_labels: usize,
    base_path: PathBuf,
    adapter_path: Option<PathBuf>,
) -> Result<LoadResult<B>, ServeError> {
    match panic::catch_unwind(AssertUnwindSafe(|| {
        build_inner(backend, device, num_labels, base_path, adapter_path)
    })) {
        Ok(result) => result,
        Err(payload) => Err(ServeError::LoadFailed(format!(
            "backend panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn build_inner<B: ModelBackend>(
    backend: &B,
    device: &ServeDevice,
    num_labels: usize,
    base_path: PathBuf,
    adapter_path: Option<PathBuf>,
) -> Result<LoadResult<B>, ServeError> {
    let fail = |e: crate::engine::InferenceError| ServeError::LoadFailed(e.to_string());

    let config = backend.resolve_config(&base_path, num_labels).map_err(fail)?;
    let base = backend.load_base(&base_path, &config).map_err(fail)?;

    let (weights, adapter_applied) = match adapter_path.as_deref() {
        Some(adapter) if adapter.is_dir() => {
            match backend.apply_adapter(&base, &config, adapter) {
                Ok(merged) => (merged, true),
                Err(e) => {
                    let err = ServeError::AdapterFailed(e.to_string());
                    tracing::warn!(
                        error = %err,
                        adapter = %adapter.display(),
                        "adapter could not be applied; serving the base model"
                    );
                    crate::telemetry::record_adapter_fallback();
                    (base, false)
                }
            }
        }
        Some(adapter) => {
            tracing::info!(adapter = %adapter.display(), "adapter directory not found; serving the base model");
            (base, false)
        }
        None => {
            tracing::info!("no adapter configured; serving the base model");
            (base, false)
        }
    };

    let model = backend.bind(weights, &config, device).map_err(fail)?;
    let tokenizer = backend.load_tokenizer(&base_path).map_err(fail)?;

    Ok(LoadResult {
        model,
        tokenizer,
        resolved_base_path: base_path,
        resolved_adapter_path: adapter_path,
        adapter_applied,
    })
}

/// Pick the requested path, or the current one when none was given. An
/// empty path counts as not given.
pub(crate) fn resolve_path(requested: Option<PathBuf>, current: Option<&Path>) -> Option<PathBuf> {
    requested
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| current.map(Path::to_path_buf))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
