//! Scripted backend for driving the frame scheduler without a GPU.
//!
//! Every mock object shares one [`MockState`] that records an event log and
//! simulates the device timeline: a submission stays pending until the host
//! waits on its marker or drains the device. Device-side signals are tracked
//! as armed until a wait consumes them. Misuse (recording into a busy command
//! buffer, releasing objects with pending work, submitting with an unreset
//! marker, arming a signal twice or waiting on one nothing will raise) is
//! recorded as a violation instead of panicking, so tests can assert on it.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use vkframe_renderer::SchedulerConfig;
use vkframe_renderer::backend::{
    AcquiredImage, BackendError, CommandEncoder, CompletionMarker, Display, Extent, GpuDevice,
    PresentStatus, RenderTarget, Submission,
};

pub type Shared = Rc<RefCell<MockState>>;

/// One accepted queue submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRecord {
    pub cmd: usize,
    pub wait: usize,
    pub signal: usize,
    pub marker: usize,
    /// Commands recorded into `cmd` at the time of submission.
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Wait { marker: usize },
    Retire { marker: usize },
    ResetMarker { marker: usize },
    Acquire { signal: usize, image: u32 },
    AcquireFailed { signal: usize },
    Record { cmd: usize },
    Submit(SubmitRecord),
    SubmitRejected { cmd: usize },
    Present { image: u32, wait: usize },
    WaitIdle,
    Reconstruct,
}

#[derive(Debug, Default, Clone, Copy)]
struct MarkerState {
    signaled: bool,
    pending: bool,
}

#[derive(Default)]
pub struct MockState {
    pub events: Vec<Event>,
    pub extent: Extent,
    pub image_count: u32,
    next_image: u32,
    /// Results handed out by acquire before falling back to round robin.
    pub acquire_script: VecDeque<Result<AcquiredImage, BackendError>>,
    /// Results handed out by present before falling back to `Optimal`.
    pub present_script: VecDeque<Result<PresentStatus, BackendError>>,
    /// Fail the object creation with this sequence number.
    pub fail_create_at: Option<usize>,
    /// Fail the submit call with this sequence number with `DeviceLost`.
    pub fail_submit_at: Option<usize>,
    /// Marker waits on pending work time out instead of retiring it.
    pub hang: bool,
    pub created: usize,
    pub live: usize,
    pub submit_calls: usize,
    pub reconstructs: usize,
    pub max_in_flight: usize,
    pub violations: Vec<String>,
    markers: HashMap<usize, MarkerState>,
    commands: HashMap<usize, Vec<String>>,
    cmd_marker: HashMap<usize, usize>,
    /// Signals that will be raised and have not been waited on yet.
    armed: HashSet<usize>,
}

impl MockState {
    fn allocate(&mut self) -> Result<usize, BackendError> {
        if self.fail_create_at == Some(self.created) {
            return Err(BackendError::OutOfMemory);
        }
        let id = self.created;
        self.created += 1;
        self.live += 1;
        Ok(id)
    }

    fn retire(&mut self, marker: usize) {
        if let Some(state) = self.markers.get_mut(&marker)
            && state.pending
        {
            state.pending = false;
            state.signaled = true;
            self.events.push(Event::Retire { marker });
        }
    }

    pub fn is_pending(&self, marker: usize) -> bool {
        self.markers.get(&marker).is_some_and(|m| m.pending)
    }

    fn cmd_busy(&self, cmd: usize) -> bool {
        self.cmd_marker
            .get(&cmd)
            .is_some_and(|&marker| self.is_pending(marker))
    }

    /// Submissions not yet retired.
    pub fn in_flight(&self) -> usize {
        self.markers.values().filter(|m| m.pending).count()
    }

    pub fn commands(&self, cmd: usize) -> Vec<String> {
        self.commands.get(&cmd).cloned().unwrap_or_default()
    }

    pub fn submissions(&self) -> Vec<SubmitRecord> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Submit(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    /// Index of the first event matching `pred` at or after `from`.
    pub fn position_from(&self, from: usize, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events
            .iter()
            .skip(from)
            .position(|e| pred(e))
            .map(|i| i + from)
    }

    fn arm(&mut self, signal: usize) {
        if !self.armed.insert(signal) {
            self.violations
                .push(format!("signal {signal} armed again before it was consumed"));
        }
    }

    fn consume(&mut self, signal: usize, by: &str) {
        if !self.armed.remove(&signal) {
            self.violations
                .push(format!("{by} waits on signal {signal} that nothing will raise"));
        }
    }

    fn push_command(&mut self, cmd: usize, command: String) {
        if self.cmd_busy(cmd) {
            self.violations
                .push(format!("command buffer {cmd} written while in use"));
        }
        self.commands.entry(cmd).or_default().push(command);
    }
}

/// Creates a shared state with an 800x600 display of three images.
pub fn mock() -> (Shared, MockDevice, MockDisplay) {
    let state = Rc::new(RefCell::new(MockState {
        extent: Extent::new(800, 600),
        image_count: 3,
        ..MockState::default()
    }));
    let device = MockDevice {
        state: Rc::clone(&state),
    };
    let display = MockDisplay {
        state: Rc::clone(&state),
    };
    (state, device, display)
}

pub fn config(frames_in_flight: usize) -> SchedulerConfig {
    SchedulerConfig {
        frames_in_flight,
        fence_timeout: Duration::from_millis(10),
        acquire_timeout: Duration::from_millis(10),
        clear_color: [0.0, 0.0, 0.0, 1.0],
    }
}

/// Draw callback used by the tests.
pub fn draw(cmd: &MockCommandBuffer) {
    cmd.push("draw");
}

pub struct MockDevice {
    state: Shared,
}

pub struct MockCommandBuffer {
    pub id: usize,
    state: Shared,
}

impl MockCommandBuffer {
    pub fn push(&self, command: &str) {
        self.state
            .borrow_mut()
            .push_command(self.id, command.to_string());
    }
}

impl CommandEncoder for MockCommandBuffer {
    fn reset(&self) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        if state.cmd_busy(self.id) {
            state
                .violations
                .push(format!("command buffer {} reset while in use", self.id));
        }
        state.commands.insert(self.id, Vec::new());
        state.events.push(Event::Record { cmd: self.id });
        Ok(())
    }

    fn begin(&self) -> Result<(), BackendError> {
        self.push("begin");
        Ok(())
    }

    fn end(&self) -> Result<(), BackendError> {
        self.push("end");
        Ok(())
    }

    fn set_viewport(&self, extent: Extent) {
        self.push(&format!("viewport {}x{}", extent.width, extent.height));
    }

    fn set_scissor(&self, extent: Extent) {
        self.push(&format!("scissor {}x{}", extent.width, extent.height));
    }
}

impl Drop for MockCommandBuffer {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        if state.cmd_busy(self.id) {
            state
                .violations
                .push(format!("command buffer {} released while in use", self.id));
        }
        state.live -= 1;
    }
}

pub struct MockSignal {
    pub id: usize,
    state: Shared,
}

impl Drop for MockSignal {
    fn drop(&mut self) {
        self.state.borrow_mut().live -= 1;
    }
}

pub struct MockMarker {
    pub id: usize,
    state: Shared,
}

impl CompletionMarker for MockMarker {
    fn wait(&self, _timeout: Duration) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.events.push(Event::Wait { marker: self.id });

        let marker = state.markers.get(&self.id).copied().unwrap_or_default();
        if marker.signaled {
            return Ok(());
        }
        if !marker.pending || state.hang {
            // Nothing will ever signal it
            return Err(BackendError::Timeout);
        }
        state.retire(self.id);
        Ok(())
    }

    fn reset(&self) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        if state.is_pending(self.id) {
            state
                .violations
                .push(format!("marker {} reset while pending", self.id));
        }
        state.markers.entry(self.id).or_default().signaled = false;
        state.events.push(Event::ResetMarker { marker: self.id });
        Ok(())
    }

    fn is_signaled(&self) -> Result<bool, BackendError> {
        let state = self.state.borrow();
        Ok(state.markers.get(&self.id).is_some_and(|m| m.signaled))
    }
}

impl Drop for MockMarker {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        if state.is_pending(self.id) {
            state
                .violations
                .push(format!("marker {} released with pending work", self.id));
        }
        state.live -= 1;
    }
}

impl GpuDevice for MockDevice {
    type CommandBuffer = MockCommandBuffer;
    type Signal = MockSignal;
    type Marker = MockMarker;

    fn create_command_buffer(&self) -> Result<MockCommandBuffer, BackendError> {
        let id = self.state.borrow_mut().allocate()?;
        Ok(MockCommandBuffer {
            id,
            state: Rc::clone(&self.state),
        })
    }

    fn create_signal(&self) -> Result<MockSignal, BackendError> {
        let id = self.state.borrow_mut().allocate()?;
        Ok(MockSignal {
            id,
            state: Rc::clone(&self.state),
        })
    }

    fn create_marker(&self, signaled: bool) -> Result<MockMarker, BackendError> {
        let mut state = self.state.borrow_mut();
        let id = state.allocate()?;
        state.markers.insert(
            id,
            MarkerState {
                signaled,
                pending: false,
            },
        );
        Ok(MockMarker {
            id,
            state: Rc::clone(&self.state),
        })
    }

    fn submit(
        &self,
        submission: Submission<'_, MockCommandBuffer, MockSignal, MockMarker>,
    ) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        let call = state.submit_calls;
        state.submit_calls += 1;

        let cmd = submission.command_buffer.id;
        if state.fail_submit_at == Some(call) {
            state.events.push(Event::SubmitRejected { cmd });
            return Err(BackendError::DeviceLost);
        }

        let marker = submission.marker.id;
        let marker_state = state.markers.get(&marker).copied().unwrap_or_default();
        if marker_state.pending {
            state
                .violations
                .push(format!("marker {marker} submitted while pending"));
        }
        if marker_state.signaled {
            state
                .violations
                .push(format!("marker {marker} submitted without reset"));
        }

        state.markers.insert(
            marker,
            MarkerState {
                signaled: false,
                pending: true,
            },
        );
        state.cmd_marker.insert(cmd, marker);
        state.consume(submission.wait.id, "submission");
        state.arm(submission.signal.id);

        let record = SubmitRecord {
            cmd,
            wait: submission.wait.id,
            signal: submission.signal.id,
            marker,
            commands: state.commands(cmd),
        };
        state.events.push(Event::Submit(record));

        let in_flight = state.in_flight();
        state.max_in_flight = state.max_in_flight.max(in_flight);
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.events.push(Event::WaitIdle);

        let mut pending: Vec<usize> = state
            .markers
            .iter()
            .filter(|(_, m)| m.pending)
            .map(|(&id, _)| id)
            .collect();
        pending.sort_unstable();
        for marker in pending {
            state.retire(marker);
        }
        Ok(())
    }
}

pub struct MockDisplay {
    state: Shared,
}

impl Display<MockDevice> for MockDisplay {
    fn extent(&self) -> Extent {
        self.state.borrow().extent
    }

    fn acquire_next_image(
        &mut self,
        _timeout: Duration,
        signal: &MockSignal,
    ) -> Result<AcquiredImage, BackendError> {
        let mut state = self.state.borrow_mut();
        let result = match state.acquire_script.pop_front() {
            Some(result) => result,
            None => {
                let index = state.next_image;
                state.next_image = (index + 1) % state.image_count.max(1);
                Ok(AcquiredImage {
                    index,
                    suboptimal: false,
                })
            }
        };

        match &result {
            Ok(image) => {
                state.arm(signal.id);
                state.events.push(Event::Acquire {
                    signal: signal.id,
                    image: image.index,
                });
            }
            Err(_) => state.events.push(Event::AcquireFailed { signal: signal.id }),
        }
        result
    }

    fn present(&mut self, image_index: u32, wait: &MockSignal) -> Result<PresentStatus, BackendError> {
        let mut state = self.state.borrow_mut();
        state.consume(wait.id, "present");
        state.events.push(Event::Present {
            image: image_index,
            wait: wait.id,
        });
        state
            .present_script
            .pop_front()
            .unwrap_or(Ok(PresentStatus::Optimal))
    }

    fn reconstruct(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.reconstructs += 1;
        state.events.push(Event::Reconstruct);
        Ok(())
    }
}

/// Render target that records its calls into the command buffer.
pub struct MockTarget;

impl RenderTarget<MockDevice, MockDisplay> for MockTarget {
    fn begin_pass(
        &self,
        cmd: &MockCommandBuffer,
        display: &MockDisplay,
        image_index: u32,
        clear_color: [f32; 4],
    ) -> Result<(), BackendError> {
        let extent = display.extent();
        cmd.push(&format!(
            "begin_pass image={} {}x{} clear={:?}",
            image_index, extent.width, extent.height, clear_color
        ));
        Ok(())
    }

    fn bind_pipeline(&self, cmd: &MockCommandBuffer) {
        cmd.push("bind_pipeline");
    }

    fn end_pass(&self, cmd: &MockCommandBuffer) {
        cmd.push("end_pass");
    }
}
