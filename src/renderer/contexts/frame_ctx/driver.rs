use color_eyre::Result;
use crate::renderer::contexts::device_ctx::target::{PresentationSurface, RebuildOutcome};
use crate::renderer::contexts::frame_ctx::frame::SubmitSync;
use crate::renderer::contexts::frame_ctx::{AcquireOutcome, FrameSyncController, PresentOutcome, SyncBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// The swapchain was stale; it has been rebuilt and nothing was drawn
    Skipped,
    /// The window closed while the renderer waited for it
    Closed,
}

/// The swapchain side of a frame: everything the frame loop does besides synchronization
pub trait FrameTarget<F, S> {
    fn acquire(&mut self, image_available: S) -> Result<AcquireOutcome>;
    /// Writes the slot's uniforms and records the command buffer of `image_index`
    fn record(&mut self, slot: usize, image_index: u32) -> Result<()>;
    fn submit(&mut self, image_index: u32, sync: SubmitSync<F, S>) -> Result<()>;
    fn present(&mut self, render_finished: S, image_index: u32) -> Result<PresentOutcome>;
    /// Replaces the swapchain and whatever was built against it
    fn rebuild(&mut self, surface: &mut impl PresentationSurface) -> Result<RebuildOutcome>;
}

/// Runs one frame against `target`.
///
/// A stale swapchain is rebuilt here. An out-of-date acquire drops the frame
/// before anything is submitted and leaves the slot where it was.
pub fn draw_frame<B, T>(
    sync: &mut FrameSyncController<B>,
    target: &mut T,
    surface: &mut impl PresentationSurface,
) -> Result<FrameStatus>
where
    B: SyncBackend,
    T: FrameTarget<B::Fence, B::Semaphore>,
{
    if surface.was_resized() {
        log::debug!("Resize flagged, rebuilding swapchain");
        if !rebuild(sync, target, surface)? {
            return Ok(FrameStatus::Closed);
        }
    }

    sync.wait_for_current_slot()?;
    let slot = sync.current_frame();

    let image_available = sync.current_slot().image_available;
    let AcquireOutcome::Image { index: image_index, suboptimal } = target.acquire(image_available)? else {
        log::debug!("Swapchain out of date on acquire, dropping frame");
        return Ok(if rebuild(sync, target, surface)? {
            FrameStatus::Skipped
        } else {
            FrameStatus::Closed
        });
    };

    sync.claim_image(image_index)?;
    target.record(slot, image_index)?;

    let submit = sync.begin_submit()?;
    target.submit(image_index, submit)?;
    let presented = target.present(submit.signal_semaphore, image_index)?;
    sync.advance();

    if suboptimal || presented.needs_rebuild() || surface.was_resized() {
        log::debug!(
            "Rebuilding swapchain after present (suboptimal acquire: {}, present: {:?})",
            suboptimal,
            presented,
        );
        if !rebuild(sync, target, surface)? {
            return Ok(FrameStatus::Closed);
        }
    }

    Ok(FrameStatus::Presented)
}

/// Returns `false` if the window closed during the rebuild
fn rebuild<B, T>(
    sync: &mut FrameSyncController<B>,
    target: &mut T,
    surface: &mut impl PresentationSurface,
) -> Result<bool>
where
    B: SyncBackend,
    T: FrameTarget<B::Fence, B::Semaphore>,
{
    match target.rebuild(surface)? {
        RebuildOutcome::Closed => Ok(false),
        RebuildOutcome::Rebuilt { image_count, image_count_changed } => {
            if image_count_changed {
                log::debug!("Swapchain image count changed to {}", image_count);
            }
            sync.reset_images(image_count);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use ash::vk;
    use crate::renderer::contexts::frame_ctx::testing::FakeGpu;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Acquire,
        Record { slot: usize, image: u32 },
        Submit { image: u32 },
        Present { image: u32 },
        Rebuild,
    }

    /// Swapchain stand-in that hands out scripted acquire and present results
    struct ScriptedTarget {
        gpu: FakeGpu,
        acquires: VecDeque<AcquireOutcome>,
        presents: VecDeque<PresentOutcome>,
        image_count: usize,
        image_count_after_rebuild: usize,
        closes_on_rebuild: bool,
        recorded_slot: usize,
        steps: Vec<Step>,
    }

    impl ScriptedTarget {
        fn new(gpu: FakeGpu, image_count: usize) -> Self {
            Self {
                gpu,
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                image_count,
                image_count_after_rebuild: image_count,
                closes_on_rebuild: false,
                recorded_slot: 0,
                steps: Vec::new(),
            }
        }

        fn acquires(mut self, outcomes: &[AcquireOutcome]) -> Self {
            self.acquires.extend(outcomes);
            self
        }

        fn presents(mut self, outcomes: &[PresentOutcome]) -> Self {
            self.presents.extend(outcomes);
            self
        }

        fn submissions(&self) -> usize {
            self.gpu.0.borrow().submissions.len()
        }
    }

    fn image(index: u32) -> AcquireOutcome {
        AcquireOutcome::Image { index, suboptimal: false }
    }

    impl FrameTarget<u32, u32> for ScriptedTarget {
        fn acquire(&mut self, _image_available: u32) -> Result<AcquireOutcome> {
            self.steps.push(Step::Acquire);
            Ok(self.acquires.pop_front().unwrap_or(image(0)))
        }

        fn record(&mut self, slot: usize, image: u32) -> Result<()> {
            self.steps.push(Step::Record { slot, image });
            self.recorded_slot = slot;
            Ok(())
        }

        fn submit(&mut self, image: u32, sync: SubmitSync<u32, u32>) -> Result<()> {
            self.steps.push(Step::Submit { image });
            self.gpu.submit(sync.fence, image, self.recorded_slot);
            Ok(())
        }

        fn present(&mut self, _render_finished: u32, image: u32) -> Result<PresentOutcome> {
            self.steps.push(Step::Present { image });
            Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Presented))
        }

        fn rebuild(&mut self, surface: &mut impl PresentationSurface) -> Result<RebuildOutcome> {
            self.steps.push(Step::Rebuild);
            if self.closes_on_rebuild {
                return Ok(RebuildOutcome::Closed);
            }
            surface.reset_resized();
            let changed = self.image_count != self.image_count_after_rebuild;
            self.image_count = self.image_count_after_rebuild;
            Ok(RebuildOutcome::Rebuilt {
                image_count: self.image_count,
                image_count_changed: changed,
            })
        }
    }

    #[derive(Default)]
    struct Window {
        resized: bool,
    }

    impl PresentationSurface for Window {
        fn drawable_extent(&self) -> vk::Extent2D {
            vk::Extent2D { width: 800, height: 600 }
        }

        fn wait_events(&mut self) -> bool {
            true
        }

        fn was_resized(&self) -> bool {
            self.resized
        }

        fn reset_resized(&mut self) {
            self.resized = false;
        }
    }

    fn controller(gpu: &FakeGpu, image_count: usize) -> FrameSyncController<FakeGpu> {
        FrameSyncController::new(gpu.clone(), 2, image_count).unwrap()
    }

    #[test]
    fn test_steady_frames_alternate_slots() {
        let gpu = FakeGpu::default();
        let mut sync = controller(&gpu, 3);
        let mut target = ScriptedTarget::new(gpu.clone(), 3).acquires(&[image(0), image(1), image(2)]);
        let mut window = Window::default();

        for _ in 0..3 {
            assert_eq!(draw_frame(&mut sync, &mut target, &mut window).unwrap(), FrameStatus::Presented);
        }

        let records: Vec<Step> = target.steps
            .iter()
            .copied()
            .filter(|step| matches!(step, Step::Record { .. }))
            .collect();
        assert_eq!(
            records,
            vec![
                Step::Record { slot: 0, image: 0 },
                Step::Record { slot: 1, image: 1 },
                Step::Record { slot: 0, image: 2 },
            ],
        );
        assert!(!target.steps.contains(&Step::Rebuild));
        assert_eq!(target.submissions(), 3);
    }

    #[test]
    fn test_out_of_date_acquire_drops_the_frame() {
        let gpu = FakeGpu::default();
        let mut sync = controller(&gpu, 3);
        let mut target = ScriptedTarget::new(gpu.clone(), 3).acquires(&[AcquireOutcome::OutOfDate]);
        let mut window = Window::default();

        let status = draw_frame(&mut sync, &mut target, &mut window).unwrap();
        assert_eq!(status, FrameStatus::Skipped);
        assert_eq!(target.steps, vec![Step::Acquire, Step::Rebuild]);
        assert_eq!(target.submissions(), 0);
        assert_eq!(sync.current_frame(), 0);

        // The slot's fence was never reset, so the retried frame does not block forever
        assert_eq!(draw_frame(&mut sync, &mut target, &mut window).unwrap(), FrameStatus::Presented);
        assert_eq!(target.submissions(), 1);
        assert_eq!(sync.current_frame(), 1);
    }

    #[test]
    fn test_suboptimal_acquire_presents_then_rebuilds() {
        let gpu = FakeGpu::default();
        let mut sync = controller(&gpu, 3);
        let mut target = ScriptedTarget::new(gpu.clone(), 3)
            .acquires(&[AcquireOutcome::Image { index: 2, suboptimal: true }]);
        let mut window = Window::default();

        assert_eq!(draw_frame(&mut sync, &mut target, &mut window).unwrap(), FrameStatus::Presented);
        assert_eq!(
            target.steps,
            vec![
                Step::Acquire,
                Step::Record { slot: 0, image: 2 },
                Step::Submit { image: 2 },
                Step::Present { image: 2 },
                Step::Rebuild,
            ],
        );
        assert_eq!(sync.current_frame(), 1);
    }

    #[test]
    fn test_stale_present_rebuilds_before_next_frame() {
        for outcome in [PresentOutcome::Suboptimal, PresentOutcome::OutOfDate] {
            let gpu = FakeGpu::default();
            let mut sync = controller(&gpu, 3);
            let mut target = ScriptedTarget::new(gpu.clone(), 3).presents(&[outcome]);
            let mut window = Window::default();

            assert_eq!(draw_frame(&mut sync, &mut target, &mut window).unwrap(), FrameStatus::Presented);
            assert_eq!(target.steps.last(), Some(&Step::Rebuild));
            assert_eq!(target.submissions(), 1);
        }
    }

    #[test]
    fn test_resize_rebuilds_before_acquire() {
        let gpu = FakeGpu::default();
        let mut sync = controller(&gpu, 3);
        let mut target = ScriptedTarget::new(gpu.clone(), 3);
        let mut window = Window { resized: true };

        assert_eq!(draw_frame(&mut sync, &mut target, &mut window).unwrap(), FrameStatus::Presented);
        assert_eq!(target.steps[..2], [Step::Rebuild, Step::Acquire]);
        assert_eq!(target.steps.iter().filter(|&&step| step == Step::Rebuild).count(), 1);
        assert!(!window.resized);
    }

    #[test]
    fn test_rebuild_resizes_the_image_table() {
        let gpu = FakeGpu::default();
        let mut sync = controller(&gpu, 2);
        let mut target = ScriptedTarget::new(gpu.clone(), 2).acquires(&[AcquireOutcome::OutOfDate, image(3)]);
        target.image_count_after_rebuild = 4;
        let mut window = Window::default();

        assert_eq!(draw_frame(&mut sync, &mut target, &mut window).unwrap(), FrameStatus::Skipped);
        assert_eq!(draw_frame(&mut sync, &mut target, &mut window).unwrap(), FrameStatus::Presented);
        assert!(target.steps.contains(&Step::Record { slot: 0, image: 3 }));
    }

    #[test]
    fn test_window_closed_during_rebuild() {
        let gpu = FakeGpu::default();
        let mut sync = controller(&gpu, 3);
        let mut target = ScriptedTarget::new(gpu.clone(), 3);
        target.closes_on_rebuild = true;
        let mut window = Window { resized: true };

        assert_eq!(draw_frame(&mut sync, &mut target, &mut window).unwrap(), FrameStatus::Closed);
        assert_eq!(target.steps, vec![Step::Rebuild]);
        assert_eq!(target.submissions(), 0);
    }
}
