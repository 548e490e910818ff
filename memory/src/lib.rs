//! Fixed-size pools of page frames.
//!
//! The same [`FramePool`] backs both physical memory and the swap area. Frames
//! do not hold real data: every byte records the tag of the process it belongs
//! to, which is what the simulator needs to show who owns what.

use std::{fmt::Display, ops::Range};

use log::debug;

mod bitmap;

pub use bitmap::Bitmap;

pub type FrameId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    OverCapacity { frame: FrameId, capacity: usize },
    OutOfFrameBounds { frame: FrameId, bytes: Range<usize> },
}

impl Display for MemoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OverCapacity { frame, capacity } => {
                write!(f, "frame {} is outside a pool of {} frames", frame, capacity)
            }
            Self::OutOfFrameBounds { frame, bytes } => {
                write!(f, "bytes {:?} do not fit in frame {}", bytes, frame)
            }
        }
    }
}

impl std::error::Error for MemoryError {}

/// Content of one frame: the owner and a per-byte ownership label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    owner: Option<String>,
    bytes: Vec<Option<String>>,
}

impl Frame {
    fn empty(size: usize) -> Self {
        Frame {
            owner: None,
            bytes: vec![None; size],
        }
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn bytes(&self) -> &[Option<String>] {
        &self.bytes
    }

    /// Bytes carrying a tag.
    pub fn used_bytes(&self) -> usize {
        self.bytes.iter().filter(|b| b.is_some()).count()
    }
}

#[derive(Debug, Clone)]
pub struct FramePool {
    name: &'static str,
    frame_size: usize,
    used: Bitmap,
    frames: Vec<Frame>,
}

impl FramePool {
    pub fn new(name: &'static str, frame_size: usize, capacity: usize) -> Self {
        FramePool {
            name,
            frame_size,
            used: Bitmap::new(capacity),
            frames: vec![Frame::empty(frame_size); capacity],
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn used_count(&self) -> usize {
        self.used.count_set()
    }

    pub fn free_count(&self) -> usize {
        self.capacity() - self.used_count()
    }

    pub fn is_used(&self, frame: FrameId) -> bool {
        self.used.is_set(frame)
    }

    fn check_frame(&self, frame: FrameId) -> Result<(), MemoryError> {
        if frame >= self.capacity() {
            return Err(MemoryError::OverCapacity {
                frame,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    /// Up to `n` unused frame ids in ascending order.
    pub fn find_free(&self, n: usize) -> Vec<FrameId> {
        self.used.find_clear(n)
    }

    /// Hands `frame` to `owner`.
    ///
    /// # Panics
    /// Claiming a frame that is already in use means the caller lost track of
    /// occupancy, which cannot be recovered from.
    pub fn claim(&mut self, frame: FrameId, owner: &str) -> Result<(), MemoryError> {
        self.check_frame(frame)?;
        if self.used.is_set(frame) {
            panic!(
                "{} frame {} claimed by {} is already owned by {:?}",
                self.name, frame, owner, self.frames[frame].owner
            );
        }
        self.used.set(frame);
        self.frames[frame] = Frame {
            owner: Some(owner.to_string()),
            bytes: vec![None; self.frame_size],
        };
        debug!("{} frame {} claimed by {}", self.name, frame, owner);
        Ok(())
    }

    /// # Panics
    /// If the frame is not in use.
    pub fn release(&mut self, frame: FrameId) -> Result<(), MemoryError> {
        self.take(frame).map(|_| ())
    }

    /// Stores `owner` into every byte of `bytes` inside `frame`.
    pub fn write(
        &mut self,
        frame: FrameId,
        bytes: Range<usize>,
        owner: &str,
    ) -> Result<(), MemoryError> {
        self.check_frame(frame)?;
        if bytes.end > self.frame_size || bytes.start > bytes.end {
            return Err(MemoryError::OutOfFrameBounds { frame, bytes });
        }
        for byte in &mut self.frames[frame].bytes[bytes] {
            *byte = Some(owner.to_string());
        }
        Ok(())
    }

    /// Moves the content out of `frame`, leaving it free.
    ///
    /// # Panics
    /// If the frame is not in use.
    pub fn take(&mut self, frame: FrameId) -> Result<Frame, MemoryError> {
        self.check_frame(frame)?;
        if !self.used.is_set(frame) {
            panic!("{} frame {} is not in use", self.name, frame);
        }
        self.used.clear(frame);
        let content = std::mem::replace(&mut self.frames[frame], Frame::empty(self.frame_size));
        debug!("{} frame {} released by {:?}", self.name, frame, content.owner);
        Ok(content)
    }

    /// Moves `content` into the free `frame`.
    ///
    /// # Panics
    /// If the frame is already in use.
    pub fn place(&mut self, frame: FrameId, content: Frame) -> Result<(), MemoryError> {
        self.check_frame(frame)?;
        if self.used.is_set(frame) {
            panic!(
                "{} frame {} is already owned by {:?}",
                self.name, frame, self.frames[frame].owner
            );
        }
        debug!("{} frame {} now holds {:?}", self.name, frame, content.owner);
        self.used.set(frame);
        self.frames[frame] = content;
        Ok(())
    }

    pub fn frame(&self, frame: FrameId) -> Option<&Frame> {
        self.frames.get(frame)
    }

    pub fn owner(&self, frame: FrameId) -> Option<&str> {
        self.frames.get(frame)?.owner()
    }

    /// Owner of every frame, `None` for free frames.
    pub fn occupancy(&self) -> Vec<Option<String>> {
        self.frames.iter().map(|f| f.owner.clone()).collect()
    }
}
