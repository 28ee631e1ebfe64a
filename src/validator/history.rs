use anyhow::{bail, Result};
use std::collections::VecDeque;

use crate::models::RawFrame;

/// The `capacity` most recent frames in arrival order.
#[derive(Debug, Clone)]
pub struct FrameHistory {
    frames: VecDeque<RawFrame>,
    capacity: usize,
}

impl FrameHistory {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            bail!("frame history capacity must be at least 1");
        }
        Ok(Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    pub fn push(&mut self, frame: RawFrame) {
        while self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &RawFrame> {
        self.frames.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
