use std::cell::RefCell;
use std::ffi::CString;

use gsg_grouped::GroupedGemmError;

use crate::types::GsgStatus;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Store an error message for later retrieval via `gsg_last_error`.
pub fn set_last_error(msg: String) {
    log::debug!("ffi error: {}", msg);
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Take the last error message, leaving `None` in its place.
pub fn take_last_error() -> Option<CString> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

/// Status code for a runtime error.
pub fn status_of(err: &GroupedGemmError) -> GsgStatus {
    match err {
        GroupedGemmError::GroupCountMismatch { .. } => GsgStatus::ErrorGroupCountMismatch,
        GroupedGemmError::InvalidProblem(_) | GroupedGemmError::BufferTooSmall { .. } => {
            GsgStatus::ErrorInvalidArgument
        }
        GroupedGemmError::Unsupported(_) => GsgStatus::ErrorUnsupported,
        GroupedGemmError::WorkspaceNotSet { .. } => GsgStatus::ErrorWorkspace,
        GroupedGemmError::Tensor(gsg_tensor::TensorError::WorkspaceTooSmall { .. }) => {
            GsgStatus::ErrorWorkspace
        }
        GroupedGemmError::Tensor(_) => GsgStatus::ErrorDevice,
        GroupedGemmError::InternalConsistency(_) => GsgStatus::ErrorInternal,
    }
}

/// Record `err` as the last error and return its status code.
pub fn fail(err: GroupedGemmError) -> GsgStatus {
    let status = status_of(&err);
    set_last_error(err.to_string());
    status
}
