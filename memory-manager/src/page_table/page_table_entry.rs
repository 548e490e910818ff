use std::fmt::Display;

use memory::FrameId;

/// Where the content of a virtual page lives right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Resident(FrameId),
    Swapped(FrameId),
}

impl Location {
    pub fn frame_number(&self) -> FrameId {
        match self {
            Location::Resident(frame) | Location::Swapped(frame) => *frame,
        }
    }

    pub fn is_resident(&self) -> bool {
        matches!(self, Location::Resident(_))
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Resident(frame) => write!(f, "ram[{}]", frame),
            Location::Swapped(frame) => write!(f, "swap[{}]", frame),
        }
    }
}

/// Maps one virtual page of a process to the frame holding it.
/// A page is valid exactly while its entry exists in the owning process's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry {
    location: Location,
}

impl PageTableEntry {
    pub(super) fn new(location: Location) -> Self {
        PageTableEntry { location }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn get_frame_number(&self) -> FrameId {
        self.location.frame_number()
    }

    pub fn is_resident(&self) -> bool {
        self.location.is_resident()
    }

    pub(super) fn set_location(&mut self, location: Location) {
        self.location = location;
    }
}
