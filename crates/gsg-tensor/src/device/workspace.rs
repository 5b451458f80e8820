use std::sync::Arc;

use crate::error::{Result, TensorError};

/// Device-resident scratch holding a host-built table for one launch.
///
/// The caller sizes the workspace up front. `upload` copies the table in
/// synchronously, so it is complete before any launch reads it. Execution
/// units only ever see the contents as a shared slice.
#[derive(Debug, Clone)]
pub struct DeviceWorkspace<T> {
    capacity_bytes: usize,
    contents: Option<Arc<[T]>>,
}

impl<T: Clone> DeviceWorkspace<T> {
    /// Allocate a workspace of `capacity_bytes` bytes.
    pub fn with_capacity_bytes(capacity_bytes: usize) -> Self {
        DeviceWorkspace {
            capacity_bytes,
            contents: None,
        }
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    /// Copy `items` into the workspace, replacing any previous contents.
    pub fn upload(&mut self, items: &[T]) -> Result<()> {
        let needed = std::mem::size_of_val(items);
        if needed > self.capacity_bytes {
            return Err(TensorError::WorkspaceTooSmall {
                needed,
                capacity: self.capacity_bytes,
            });
        }
        self.contents = Some(Arc::from(items));
        log::trace!(
            "uploaded {} entries ({} bytes) to workspace",
            items.len(),
            needed
        );
        Ok(())
    }

    /// The uploaded table, if any.
    pub fn contents(&self) -> Option<&[T]> {
        self.contents.as_deref()
    }
}
