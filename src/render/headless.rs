use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::warn;

use super::buffers::{BufferDevice, BufferKind};
use crate::error::{PointCloudError, Result};

/// CPU-backed [`BufferDevice`] that keeps buffer contents in memory.
///
/// Used by headless runs and tests to observe what the upload path would
/// hand to a GPU. Clones share the same allocation table.
#[derive(Debug, Clone, Default)]
pub struct HeadlessDevice {
    state: Rc<RefCell<HeadlessState>>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_id: u64,
    live: BTreeMap<u64, Allocation>,
    created: usize,
    released: usize,
    max_buffer_size: Option<u64>,
}

#[derive(Debug)]
struct Allocation {
    label: String,
    kind: BufferKind,
    bytes: Vec<u8>,
}

/// Handle to a buffer allocated by [`HeadlessDevice`].
#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessBuffer {
    id: u64,
    size: u64,
}

impl HeadlessBuffer {
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects any buffer larger than `max_buffer_size` bytes.
    pub fn with_limit(max_buffer_size: u64) -> Self {
        let device = Self::default();
        device.state.borrow_mut().max_buffer_size = Some(max_buffer_size);
        device
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn created(&self) -> usize {
        self.state.borrow().created
    }

    pub fn released(&self) -> usize {
        self.state.borrow().released
    }

    /// Total bytes currently allocated.
    pub fn live_bytes(&self) -> u64 {
        self.state
            .borrow()
            .live
            .values()
            .map(|allocation| allocation.bytes.len() as u64)
            .sum()
    }

    /// Copy of a live buffer's contents; empty if it was released.
    pub fn read(&self, buffer: &HeadlessBuffer) -> Vec<u8> {
        self.state
            .borrow()
            .live
            .get(&buffer.id)
            .map(|allocation| allocation.bytes.clone())
            .unwrap_or_default()
    }

    /// Labels and kinds of live buffers in allocation order.
    pub fn describe(&self) -> Vec<(String, BufferKind)> {
        self.state
            .borrow()
            .live
            .values()
            .map(|allocation| (allocation.label.clone(), allocation.kind))
            .collect()
    }
}

impl BufferDevice for HeadlessDevice {
    type Buffer = HeadlessBuffer;

    fn create_buffer(&self, label: &str, kind: BufferKind, contents: &[u8]) -> Result<HeadlessBuffer> {
        let mut state = self.state.borrow_mut();
        let size = contents.len() as u64;
        if let Some(limit) = state.max_buffer_size {
            if size > limit {
                return Err(PointCloudError::BufferTooLarge {
                    label: label.to_string(),
                    size,
                    limit,
                });
            }
        }
        let id = state.next_id;
        state.next_id += 1;
        state.created += 1;
        state.live.insert(
            id,
            Allocation {
                label: label.to_string(),
                kind,
                bytes: contents.to_vec(),
            },
        );
        Ok(HeadlessBuffer { id, size })
    }

    fn release(&self, buffer: HeadlessBuffer) {
        let mut state = self.state.borrow_mut();
        if state.live.remove(&buffer.id).is_some() {
            state.released += 1;
        } else {
            warn!("buffer {} released twice", buffer.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_allocations() {
        let device = HeadlessDevice::new();
        let a = device
            .create_buffer("a", BufferKind::Storage, &[1, 2, 3, 4])
            .unwrap();
        let b = device.create_buffer("b", BufferKind::Indirect, &[0; 20]).unwrap();
        assert_eq!(device.live_buffers(), 2);
        assert_eq!(device.live_bytes(), 24);
        assert_eq!(device.read(&a), vec![1, 2, 3, 4]);
        assert_eq!(
            device.describe(),
            vec![
                ("a".to_string(), BufferKind::Storage),
                ("b".to_string(), BufferKind::Indirect)
            ]
        );

        device.release(a);
        assert_eq!(device.live_buffers(), 1);
        assert_eq!(b.size(), 20);
        device.release(b);
        assert_eq!(device.released(), 2);
    }

    #[test]
    fn limit_rejects_large_buffers() {
        let device = HeadlessDevice::with_limit(8);
        assert!(device.create_buffer("ok", BufferKind::Uniform, &[0; 8]).is_ok());
        assert!(matches!(
            device.create_buffer("big", BufferKind::Uniform, &[0; 9]),
            Err(PointCloudError::BufferTooLarge { size: 9, limit: 8, .. })
        ));
        assert_eq!(device.created(), 1);
    }
}
