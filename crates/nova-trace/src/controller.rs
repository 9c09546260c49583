use std::fmt;
use std::sync::Arc;

use nova_config::TraceConfig;
use nova_jdwp::{
    ClassInfo, EventKind, EventModifier, EventSet, JdwpClient, JdwpError, JdwpEvent, Location,
    RequestId, StepDepth, StepSize, SuspendPolicy, ThreadId,
};

use crate::diff::DedupEngine;
use crate::error::{TraceError, TraceResult};
use crate::filter::NamespaceFilter;
use crate::frame::FrameIdTicker;
use crate::model::{ExecutionPoint, TraceMarker, TraceStep};
use crate::output::OutputCapture;
use crate::point::{ExecutionPointBuilder, PointContext, PointEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    WaitingForEvent,
    Dispatching,
    StepArmed,
    Idle,
    Disconnected,
    Done,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::WaitingForEvent => "waiting-for-event",
            ControllerState::Dispatching => "dispatching",
            ControllerState::StepArmed => "step-armed",
            ControllerState::Idle => "idle",
            ControllerState::Disconnected => "disconnected",
            ControllerState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Number of accepted points, capped at a configured maximum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepBudget {
    max: usize,
    used: usize,
}

impl StepBudget {
    /// A budget of at least one point, so the first point is always recorded.
    pub fn new(max: usize) -> Self {
        Self {
            max: max.max(1),
            used: 0,
        }
    }

    pub fn record(&mut self) {
        self.used += 1;
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }
}

/// The accepted trace of one run.
#[derive(Clone, Debug, PartialEq)]
pub struct Trace {
    pub steps: Vec<TraceStep>,
    /// The step budget ran out and the debuggee was terminated.
    pub limit_reached: bool,
}

impl Trace {
    pub fn points(&self) -> impl Iterator<Item = &ExecutionPoint> + '_ {
        self.steps.iter().filter_map(TraceStep::as_point)
    }
}

/// Drives a suspended debuggee through the debug event protocol and collects
/// the deduplicated sequence of execution points.
///
/// Owns the connection and the single outstanding step request. Runs on one
/// thread; every read happens while the debuggee is suspended.
pub struct TraceController<C> {
    jdwp: C,
    entry_point: String,
    filter: Arc<NamespaceFilter>,
    builder: ExecutionPointBuilder,
    dedup: DedupEngine,
    budget: StepBudget,
    limit_message: String,
    state: ControllerState,
    step_request: Option<RequestId>,
    thread: Option<ThreadId>,
    frame_ids: FrameIdTicker,
    steps: Vec<TraceStep>,
    limit_reached: bool,
    connected: bool,
    vm_died: bool,
    pending_stdout: String,
    stdout: OutputCapture,
    stderr: OutputCapture,
}

impl<C: JdwpClient> TraceController<C> {
    pub fn new(jdwp: C, entry_point: impl Into<String>, config: &TraceConfig) -> Self {
        let filter = Arc::new(NamespaceFilter::from(config));
        Self {
            jdwp,
            entry_point: entry_point.into(),
            builder: ExecutionPointBuilder::from_config(Arc::clone(&filter), config),
            filter,
            dedup: DedupEngine::new(),
            budget: StepBudget::new(config.max_steps),
            limit_message: config.limit_message.clone(),
            state: ControllerState::Idle,
            step_request: None,
            thread: None,
            frame_ids: FrameIdTicker::new(),
            steps: Vec::new(),
            limit_reached: false,
            connected: true,
            vm_died: false,
            pending_stdout: String::new(),
            stdout: OutputCapture::disconnected(),
            stderr: OutputCapture::disconnected(),
        }
    }

    pub fn with_output(mut self, stdout: OutputCapture, stderr: OutputCapture) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn jdwp(&self) -> &C {
        &self.jdwp
    }

    /// Mutable access to the underlying JDWP connection. This is primarily
    /// useful in tests with [`nova_jdwp::MockJdwpClient`].
    pub fn jdwp_mut(&mut self) -> &mut C {
        &mut self.jdwp
    }

    pub fn into_jdwp(self) -> C {
        self.jdwp
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn vm_died(&self) -> bool {
        self.vm_died
    }

    /// Run until the event source is exhausted or the debuggee disconnects.
    pub fn run(&mut self) -> TraceResult<Trace> {
        match self.subscribe() {
            Ok(()) => self.event_loop()?,
            Err(err) if err.is_disconnect() => self.drain(),
            Err(err) => return Err(err),
        }
        self.finish()
    }

    fn transition(&mut self, next: ControllerState) {
        if self.state != next {
            tracing::trace!(target: "nova.trace", from = %self.state, to = %next, "controller state");
            self.state = next;
        }
    }

    fn subscribe(&mut self) -> TraceResult<()> {
        let exclusions = self.filter.class_exclusions();

        let mut exception = vec![EventModifier::ExceptionOnly {
            caught: true,
            uncaught: true,
        }];
        exception.extend(exclusions.iter().cloned());
        let requests = [
            (EventKind::Exception, SuspendPolicy::All, exception),
            (EventKind::MethodEntry, SuspendPolicy::EventThread, exclusions.clone()),
            (EventKind::MethodExit, SuspendPolicy::EventThread, exclusions.clone()),
            (EventKind::ThreadDeath, SuspendPolicy::All, Vec::new()),
            (EventKind::ClassPrepare, SuspendPolicy::All, exclusions),
        ];
        for (kind, policy, modifiers) in requests {
            let request_id = self.jdwp.event_request_set(kind, policy, modifiers)?;
            tracing::debug!(target: "nova.trace", request_id, ?kind, "subscribed");
        }
        Ok(())
    }

    fn event_loop(&mut self) -> TraceResult<()> {
        while self.connected {
            self.transition(ControllerState::WaitingForEvent);
            let set = match self.jdwp.next_event_set() {
                Ok(Some(set)) => set,
                Ok(None) => break,
                Err(JdwpError::VmDisconnected) => {
                    self.drain();
                    break;
                }
                Err(err) => return Err(err.into()),
            };
            match self.handle_set(set) {
                Ok(()) => {}
                Err(err) if err.is_disconnect() => {
                    self.drain();
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn handle_set(&mut self, set: EventSet) -> TraceResult<()> {
        self.transition(ControllerState::Dispatching);
        for event in &set.events {
            tracing::trace!(target: "nova.trace", ?event, "event");
            self.handle_event(event)?;
        }
        if self.connected && !self.vm_died && !self.limit_reached {
            self.jdwp.resume()?;
        }
        Ok(())
    }

    fn handle_event(&mut self, event: &JdwpEvent) -> TraceResult<()> {
        match event {
            JdwpEvent::ClassPrepare { class, .. } => self.on_class_prepare(class)?,
            JdwpEvent::VmDeath => {
                tracing::info!(target: "nova.trace", "debuggee exited");
                self.vm_died = true;
            }
            JdwpEvent::VmDisconnect => {
                tracing::info!(target: "nova.trace", "debuggee disconnected");
                self.connected = false;
            }
            JdwpEvent::ThreadDeath { thread } => {
                tracing::debug!(target: "nova.trace", thread, "thread died");
            }
            _ => {}
        }

        let Some((kind, thread, location)) = PointEvent::from_event(event) else {
            return self.disarm_step();
        };
        self.check_thread(thread)?;
        let reportable = self.filter.reports_location(location);
        if reportable && !self.budget.is_exhausted() {
            self.dispatch(kind, thread, location)?;
        }

        self.disarm_step()?;
        if reportable && !self.limit_reached && self.connected {
            self.arm_step(thread)?;
        }
        Ok(())
    }

    fn check_thread(&mut self, thread: ThreadId) -> TraceResult<()> {
        match self.thread {
            None => {
                self.thread = Some(thread);
                Ok(())
            }
            Some(first) if first == thread => Ok(()),
            Some(first) => Err(TraceError::MultipleThreads {
                first,
                second: thread,
            }),
        }
    }

    fn on_class_prepare(&mut self, class: &ClassInfo) -> TraceResult<()> {
        if self.filter.is_excluded(&class.name) {
            return Ok(());
        }
        tracing::debug!(target: "nova.trace", class = %class.name, "class prepared");
        self.builder.record_class(class.clone());

        let lines = match self.jdwp.line_locations(class.id) {
            Ok(lines) => lines,
            Err(JdwpError::VmDisconnected) => return Err(JdwpError::VmDisconnected.into()),
            Err(err) => {
                tracing::debug!(
                    target: "nova.trace",
                    class = %class.name,
                    error = %err,
                    "no line locations; skipping breakpoints"
                );
                return Ok(());
            }
        };
        for location in lines {
            self.jdwp.event_request_set(
                EventKind::Breakpoint,
                SuspendPolicy::All,
                vec![EventModifier::LocationOnly { location }],
            )?;
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        event: PointEvent<'_>,
        thread: ThreadId,
        location: &Location,
    ) -> TraceResult<()> {
        self.collect_output();
        let ctx = PointContext {
            event,
            thread,
            location,
            stdout: self.pending_stdout.clone(),
        };
        let candidate = match self.builder.build(&mut self.jdwp, ctx, &mut self.frame_ids) {
            Ok(candidate) => candidate,
            Err(TraceError::Jdwp(err)) if !matches!(err, JdwpError::VmDisconnected) => {
                tracing::warn!(
                    target: "nova.trace",
                    thread,
                    line = location.line,
                    error = %err,
                    "failed to build execution point; skipping"
                );
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let Some(point) = self.dedup.offer(candidate) else {
            tracing::trace!(target: "nova.trace", line = location.line, "duplicate point suppressed");
            return Ok(());
        };
        self.pending_stdout.clear();
        self.steps.push(TraceStep::Point(point));
        self.budget.record();
        if self.budget.is_exhausted() {
            self.stop_at_limit()?;
        }
        Ok(())
    }

    fn stop_at_limit(&mut self) -> TraceResult<()> {
        tracing::info!(
            target: "nova.trace",
            steps = self.budget.used(),
            "step budget exhausted; terminating debuggee"
        );
        self.steps
            .push(TraceStep::Marker(TraceMarker::limit_reached(self.limit_message.clone())));
        self.disarm_step()?;
        self.limit_reached = true;
        match self.jdwp.exit(0) {
            Ok(()) | Err(JdwpError::VmDisconnected) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn collect_output(&mut self) {
        self.pending_stdout.push_str(&self.stdout.drain_available());
        let stderr = self.stderr.drain_available();
        if !stderr.is_empty() {
            tracing::debug!(target: "nova.trace", stderr = %stderr, "debuggee stderr");
        }
    }

    fn disarm_step(&mut self) -> TraceResult<()> {
        let Some(request_id) = self.step_request.take() else {
            return Ok(());
        };
        self.jdwp
            .event_request_clear(EventKind::SingleStep, request_id)?;
        self.transition(ControllerState::Idle);
        Ok(())
    }

    fn arm_step(&mut self, thread: ThreadId) -> TraceResult<()> {
        let request_id = self.jdwp.event_request_set(
            EventKind::SingleStep,
            SuspendPolicy::All,
            vec![
                EventModifier::Step {
                    thread,
                    size: StepSize::Min,
                    depth: StepDepth::Into,
                },
                EventModifier::Count { count: 1 },
            ],
        )?;
        tracing::trace!(target: "nova.trace", request_id, thread, "step armed");
        self.step_request = Some(request_id);
        self.transition(ControllerState::StepArmed);
        Ok(())
    }

    /// Consume only termination events until the VM is gone.
    fn drain(&mut self) {
        self.transition(ControllerState::Disconnected);
        tracing::info!(target: "nova.trace", "debuggee went away; draining events");
        self.step_request = None;
        while self.connected {
            match self.jdwp.next_event_set() {
                Ok(Some(set)) => {
                    for event in set.events {
                        match event {
                            JdwpEvent::VmDeath => self.vm_died = true,
                            JdwpEvent::VmDisconnect => self.connected = false,
                            other => {
                                tracing::trace!(target: "nova.trace", event = ?other, "ignored while draining")
                            }
                        }
                    }
                    if self.connected {
                        if let Err(err) = self.jdwp.resume() {
                            tracing::trace!(target: "nova.trace", error = %err, "resume while draining");
                        }
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        self.connected = false;
    }

    fn finish(&mut self) -> TraceResult<Trace> {
        self.transition(ControllerState::Done);
        let trailing = self.stdout.drain_available();
        if !trailing.is_empty() || !self.pending_stdout.is_empty() {
            tracing::debug!(
                target: "nova.trace",
                bytes = trailing.len() + self.pending_stdout.len(),
                "output after the last point is not part of the trace"
            );
        }
        if self.budget.used() == 0 {
            return Err(TraceError::EntryPointNotFound {
                entry_point: self.entry_point.clone(),
            });
        }
        tracing::info!(target: "nova.trace", steps = self.budget.used(), "trace complete");
        Ok(Trace {
            steps: std::mem::take(&mut self.steps),
            limit_reached: self.limit_reached,
        })
    }
}
