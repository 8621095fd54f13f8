use std::fmt;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// A list of errors the heap can encounter during allocation.
pub enum AllocationError {
    /// The heap is exhausted and collecting did not free enough memory for the program to continue.
    HeapOutOfMemory,
    /// The OS is unable to commit more memory. Critical error. The runtime is expected to
    /// abort if such an error is reported.
    MmapOutOfMemory,
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AllocationError::HeapOutOfMemory => write!(f, "heap out of memory"),
            AllocationError::MmapOutOfMemory => write!(f, "unable to commit memory"),
        }
    }
}

impl std::error::Error for AllocationError {}
