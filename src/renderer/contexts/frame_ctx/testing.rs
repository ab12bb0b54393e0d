use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use color_eyre::Result;
use crate::renderer::contexts::frame_ctx::SyncBackend;

#[derive(Debug, Default)]
pub struct FakeFence {
    pub signaled: bool,
    pub pending: Option<usize>,
}

#[derive(Debug)]
pub struct Submission {
    pub image: u32,
    pub slot: usize,
    pub completed: bool,
}

/// Simulates a queue whose work only counts as finished once the CPU has waited on its fence
#[derive(Debug, Default)]
pub struct FakeGpuState {
    pub next_id: u32,
    pub fences: HashMap<u32, FakeFence>,
    pub live_semaphores: usize,
    pub submissions: Vec<Submission>,
    pub fence_waits: usize,
    pub max_outstanding: usize,
}

#[derive(Clone, Default)]
pub struct FakeGpu(pub Rc<RefCell<FakeGpuState>>);

impl FakeGpu {
    pub fn submit(&self, fence: u32, image: u32, slot: usize) {
        let mut state = self.0.borrow_mut();
        let index = state.submissions.len();
        let record = state.fences.get_mut(&fence).unwrap();
        assert!(!record.signaled, "submitting with a fence that was not reset");
        assert!(record.pending.is_none(), "fence reused while its work is pending");
        record.pending = Some(index);
        state.submissions.push(Submission { image, slot, completed: false });

        let outstanding = state.submissions.iter().filter(|s| !s.completed).count();
        state.max_outstanding = state.max_outstanding.max(outstanding);
    }

    pub fn last_use_of_image(&self, image: u32) -> Option<bool> {
        let state = self.0.borrow();
        state.submissions.iter().rev().find(|s| s.image == image).map(|s| s.completed)
    }

    pub fn last_use_of_slot(&self, slot: usize) -> Option<bool> {
        let state = self.0.borrow();
        state.submissions.iter().rev().find(|s| s.slot == slot).map(|s| s.completed)
    }
}

impl SyncBackend for FakeGpu {
    type Fence = u32;
    type Semaphore = u32;

    fn create_fence(&mut self, signaled: bool) -> Result<u32> {
        let mut state = self.0.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.fences.insert(id, FakeFence { signaled, pending: None });
        Ok(id)
    }

    fn create_semaphore(&mut self) -> Result<u32> {
        let mut state = self.0.borrow_mut();
        state.next_id += 1;
        state.live_semaphores += 1;
        Ok(state.next_id)
    }

    fn wait_for_fence(&mut self, fence: u32) -> Result<()> {
        let mut state = self.0.borrow_mut();
        state.fence_waits += 1;
        let record = state.fences.get_mut(&fence).unwrap();
        let pending = record.pending.take();
        assert!(
            record.signaled || pending.is_some(),
            "waiting on a fence nothing will ever signal",
        );
        record.signaled = true;
        if let Some(index) = pending {
            state.submissions[index].completed = true;
        }
        Ok(())
    }

    fn reset_fence(&mut self, fence: u32) -> Result<()> {
        let mut state = self.0.borrow_mut();
        let record = state.fences.get_mut(&fence).unwrap();
        assert!(record.pending.is_none(), "resetting a fence whose work was never observed");
        record.signaled = false;
        Ok(())
    }

    fn destroy_fence(&mut self, fence: u32) {
        self.0.borrow_mut().fences.remove(&fence);
    }

    fn destroy_semaphore(&mut self, _semaphore: u32) {
        self.0.borrow_mut().live_semaphores -= 1;
    }
}
