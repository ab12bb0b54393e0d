/// Synchronization primitives of one frame-in-flight slot
#[derive(Debug, Clone, Copy)]
pub struct FrameSlot<F, S> {
    /// Signaled by the presentation engine once the acquired image can be written
    pub image_available: S,
    /// Signaled by the queue once rendering is done, waited on by presentation
    pub render_finished: S,
    /// Signaled when the slot's submission has completed on the GPU
    pub in_flight: F,
}

/// The semaphores and fence a single queue submission uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitSync<F, S> {
    pub wait_semaphore: S,
    pub signal_semaphore: S,
    pub fence: F,
}

impl<F: Copy, S: Copy> FrameSlot<F, S> {
    pub fn submit_sync(&self) -> SubmitSync<F, S> {
        SubmitSync {
            wait_semaphore: self.image_available,
            signal_semaphore: self.render_finished,
            fence: self.in_flight,
        }
    }
}
