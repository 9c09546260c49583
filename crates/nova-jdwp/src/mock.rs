use std::collections::{BTreeMap, HashMap, VecDeque};

use tokio::sync::mpsc;

use crate::{
    ClassInfo, EventKind, EventModifier, EventSet, FieldInfo, FrameId, FrameInfo, JdwpClient,
    JdwpError, JdwpEvent, JdwpValue, LocalVariable, Location, ObjectId, ObjectRef,
    ReferenceTypeId, RequestId, SuspendPolicy, ThreadId,
};

#[derive(Clone, Debug)]
pub enum MockObject {
    Array(Vec<JdwpValue>),
    String(String),
    Instance(Vec<(FieldInfo, JdwpValue)>),
}

#[derive(Clone, Debug)]
pub struct MockVariable {
    pub variable: LocalVariable,
    /// `None` while the variable is declared but not yet live.
    pub value: Option<JdwpValue>,
}

impl MockVariable {
    pub fn argument(name: &str, identity: i64, value: JdwpValue) -> Self {
        Self {
            variable: LocalVariable::argument(name, identity),
            value: Some(value),
        }
    }

    pub fn local(name: &str, identity: i64, value: JdwpValue) -> Self {
        Self {
            variable: LocalVariable::local(name, identity),
            value: Some(value),
        }
    }

    pub fn out_of_scope(name: &str, identity: i64) -> Self {
        Self {
            variable: LocalVariable::local(name, identity),
            value: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MockFrame {
    pub location: Location,
    pub this_object: Option<ObjectRef>,
    pub variables: Vec<MockVariable>,
    /// Simulates a method compiled without local variable tables.
    pub absent_information: bool,
}

impl MockFrame {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            this_object: None,
            variables: Vec::new(),
            absent_information: false,
        }
    }

    pub fn with_this(mut self, this_object: ObjectRef) -> Self {
        self.this_object = Some(this_object);
        self
    }

    pub fn with_variable(mut self, variable: MockVariable) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn without_debug_info(mut self) -> Self {
        self.absent_information = true;
        self
    }
}

#[derive(Clone, Debug)]
pub struct MockClass {
    pub info: ClassInfo,
    /// `None` simulates a class compiled without line tables.
    pub lines: Option<Vec<Location>>,
    pub initialized: bool,
    pub statics: Vec<(FieldInfo, JdwpValue)>,
}

impl MockClass {
    pub fn new(id: ReferenceTypeId, name: &str) -> Self {
        Self {
            info: ClassInfo {
                id,
                name: name.to_string(),
            },
            lines: Some(Vec::new()),
            initialized: true,
            statics: Vec::new(),
        }
    }

    pub fn with_lines(mut self, method: &str, lines: &[u32]) -> Self {
        let name = self.info.name.clone();
        self.lines
            .get_or_insert_with(Vec::new)
            .extend(lines.iter().map(|line| Location::new(name.clone(), method, *line)));
        self
    }

    pub fn with_static(mut self, name: &str, value: JdwpValue) -> Self {
        self.statics.push((FieldInfo::static_field(name), value));
        self
    }

    pub fn uninitialized(mut self) -> Self {
        self.initialized = false;
        self
    }
}

/// One scripted event set plus the debuggee state visible while it is pending.
#[derive(Clone, Debug, Default)]
pub struct MockEventSet {
    pub events: Vec<JdwpEvent>,
    pub stack: Option<(ThreadId, Vec<MockFrame>)>,
    pub objects: Vec<(ObjectId, MockObject)>,
    pub classes: Vec<MockClass>,
    pub stdout: Option<String>,
    /// Report the event thread as running, which a real VM never should.
    pub thread_running: bool,
}

impl MockEventSet {
    pub fn new(events: Vec<JdwpEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn with_stack(mut self, thread: ThreadId, frames: Vec<MockFrame>) -> Self {
        self.stack = Some((thread, frames));
        self
    }

    pub fn with_object(mut self, id: ObjectId, object: MockObject) -> Self {
        self.objects.push((id, object));
        self
    }

    pub fn with_class(mut self, class: MockClass) -> Self {
        self.classes.push(class);
        self
    }

    pub fn with_stdout(mut self, text: &str) -> Self {
        self.stdout = Some(text.to_string());
        self
    }

    pub fn with_thread_running(mut self) -> Self {
        self.thread_running = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MockRequest {
    pub id: RequestId,
    pub kind: EventKind,
    pub suspend_policy: SuspendPolicy,
    pub modifiers: Vec<EventModifier>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shutdown {
    Running,
    Death,
    Disconnect,
    Exhausted,
}

/// Deterministic, in-memory JDWP test double.
///
/// Event sets are delivered in script order regardless of which requests are
/// armed; the mock only records the request traffic so tests can assert on it.
pub struct MockJdwpClient {
    script: VecDeque<MockEventSet>,
    stacks: HashMap<ThreadId, Vec<MockFrame>>,
    running_threads: Vec<ThreadId>,
    objects: HashMap<ObjectId, MockObject>,
    classes: BTreeMap<ReferenceTypeId, MockClass>,
    live_frames: HashMap<FrameId, (ThreadId, usize)>,
    next_frame_id: FrameId,
    requests: BTreeMap<RequestId, MockRequest>,
    next_request_id: RequestId,
    stdout: Option<mpsc::UnboundedSender<Vec<u8>>>,
    shutdown: Shutdown,
    suspended: bool,
    max_live_steps: usize,
    pub created_requests: Vec<MockRequest>,
    pub cleared_requests: Vec<RequestId>,
    pub exit_code: Option<i32>,
    pub resume_count: usize,
}

impl Default for MockJdwpClient {
    fn default() -> Self {
        Self {
            script: VecDeque::new(),
            stacks: HashMap::new(),
            running_threads: Vec::new(),
            objects: HashMap::new(),
            classes: BTreeMap::new(),
            live_frames: HashMap::new(),
            next_frame_id: 1,
            requests: BTreeMap::new(),
            next_request_id: 1,
            stdout: None,
            shutdown: Shutdown::Running,
            suspended: false,
            max_live_steps: 0,
            created_requests: Vec::new(),
            cleared_requests: Vec::new(),
            exit_code: None,
            resume_count: 0,
        }
    }
}

impl MockJdwpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event_set(&mut self, set: MockEventSet) {
        self.script.push_back(set);
    }

    pub fn insert_object(&mut self, id: ObjectId, object: MockObject) {
        self.objects.insert(id, object);
    }

    pub fn insert_class(&mut self, class: MockClass) {
        self.classes.insert(class.info.id, class);
    }

    /// Channel receiving the debuggee's stdout as scripted event sets are
    /// delivered.
    pub fn stdout_channel(&mut self) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.stdout = Some(tx);
        rx
    }

    pub fn live_requests(&self) -> impl Iterator<Item = &MockRequest> + '_ {
        self.requests.values()
    }

    pub fn requests_of_kind(&self, kind: EventKind) -> Vec<&MockRequest> {
        self.created_requests
            .iter()
            .filter(|req| req.kind == kind)
            .collect()
    }

    /// Highest number of single-step requests that were live at the same time.
    pub fn max_live_step_requests(&self) -> usize {
        self.max_live_steps
    }

    pub fn remaining_event_sets(&self) -> usize {
        self.script.len()
    }

    fn ensure_attached(&self) -> Result<(), JdwpError> {
        if self.shutdown == Shutdown::Running {
            Ok(())
        } else {
            Err(JdwpError::VmDisconnected)
        }
    }

    fn frame(&self, frame: FrameId) -> Result<&MockFrame, JdwpError> {
        self.ensure_attached()?;
        let (thread, index) = self
            .live_frames
            .get(&frame)
            .copied()
            .ok_or(JdwpError::InvalidFrameId(frame))?;
        self.stacks
            .get(&thread)
            .and_then(|frames| frames.get(index))
            .ok_or(JdwpError::InvalidFrameId(frame))
    }

    fn object(&self, id: ObjectId) -> Result<&MockObject, JdwpError> {
        self.ensure_attached()?;
        self.objects.get(&id).ok_or(JdwpError::InvalidObjectId(id))
    }

    fn class(&self, id: ReferenceTypeId) -> Result<&MockClass, JdwpError> {
        self.ensure_attached()?;
        self.classes
            .get(&id)
            .ok_or_else(|| JdwpError::Other(format!("unknown reference type {id}")))
    }

    fn install(&mut self, set: MockEventSet) -> EventSet {
        if let Some((thread, frames)) = set.stack {
            self.stacks.insert(thread, frames);
        }
        for (id, object) in set.objects {
            self.objects.insert(id, object);
        }
        for class in set.classes {
            self.classes.insert(class.info.id, class);
        }
        self.running_threads.clear();
        if set.thread_running {
            self.running_threads.extend(
                set.events
                    .iter()
                    .filter_map(|event| event.locatable().map(|(thread, _)| thread)),
            );
        }
        if let (Some(text), Some(tx)) = (set.stdout, self.stdout.as_ref()) {
            let _ = tx.send(text.into_bytes());
        }
        self.suspended = true;
        tracing::trace!(target: "nova.jdwp", events = set.events.len(), "mock event set delivered");
        EventSet::new(set.events)
    }
}

impl JdwpClient for MockJdwpClient {
    fn event_request_set(
        &mut self,
        kind: EventKind,
        suspend_policy: SuspendPolicy,
        modifiers: Vec<EventModifier>,
    ) -> Result<RequestId, JdwpError> {
        self.ensure_attached()?;
        let id = self.next_request_id;
        self.next_request_id += 1;
        let request = MockRequest {
            id,
            kind,
            suspend_policy,
            modifiers,
        };
        tracing::trace!(target: "nova.jdwp", request_id = id, ?kind, "mock event request set");
        self.created_requests.push(request.clone());
        self.requests.insert(id, request);

        let live_steps = self
            .requests
            .values()
            .filter(|req| req.kind == EventKind::SingleStep)
            .count();
        self.max_live_steps = self.max_live_steps.max(live_steps);
        Ok(id)
    }

    fn event_request_clear(
        &mut self,
        kind: EventKind,
        request_id: RequestId,
    ) -> Result<(), JdwpError> {
        self.ensure_attached()?;
        match self.requests.get(&request_id) {
            Some(req) if req.kind == kind => {
                self.requests.remove(&request_id);
                self.cleared_requests.push(request_id);
                Ok(())
            }
            _ => Err(JdwpError::Protocol(format!(
                "no {kind:?} request with id {request_id}"
            ))),
        }
    }

    fn next_event_set(&mut self) -> Result<Option<EventSet>, JdwpError> {
        match self.shutdown {
            Shutdown::Running => {}
            Shutdown::Death => {
                self.shutdown = Shutdown::Disconnect;
                return Ok(Some(EventSet::new(vec![JdwpEvent::VmDeath])));
            }
            Shutdown::Disconnect => {
                self.shutdown = Shutdown::Exhausted;
                return Ok(Some(EventSet::new(vec![JdwpEvent::VmDisconnect])));
            }
            Shutdown::Exhausted => return Ok(None),
        }

        match self.script.pop_front() {
            Some(set) => Ok(Some(self.install(set))),
            None => Ok(None),
        }
    }

    fn resume(&mut self) -> Result<(), JdwpError> {
        self.ensure_attached()?;
        self.suspended = false;
        self.live_frames.clear();
        self.resume_count += 1;
        Ok(())
    }

    fn exit(&mut self, code: i32) -> Result<(), JdwpError> {
        self.ensure_attached()?;
        self.exit_code = Some(code);
        self.script.clear();
        self.requests.clear();
        self.shutdown = Shutdown::Death;
        Ok(())
    }

    fn frames(&mut self, thread: ThreadId) -> Result<Vec<FrameInfo>, JdwpError> {
        self.ensure_attached()?;
        if !self.suspended || self.running_threads.contains(&thread) {
            return Err(JdwpError::IncompatibleThreadState(thread));
        }
        let Some(stack) = self.stacks.get(&thread) else {
            return Err(JdwpError::Other(format!(
                "no mock stack frames configured for thread {thread}"
            )));
        };
        let mut out = Vec::with_capacity(stack.len());
        for (index, frame) in stack.iter().enumerate() {
            let id = self.next_frame_id;
            self.next_frame_id += 1;
            self.live_frames.insert(id, (thread, index));
            out.push(FrameInfo {
                id,
                location: frame.location.clone(),
            });
        }
        Ok(out)
    }

    fn this_object(&mut self, frame: FrameId) -> Result<Option<ObjectRef>, JdwpError> {
        Ok(self.frame(frame)?.this_object.clone())
    }

    fn variables(&mut self, frame: FrameId) -> Result<Vec<LocalVariable>, JdwpError> {
        let frame = self.frame(frame)?;
        if frame.absent_information {
            return Err(JdwpError::AbsentInformation);
        }
        let args = frame
            .variables
            .iter()
            .filter(|var| var.variable.is_argument);
        let locals = frame
            .variables
            .iter()
            .filter(|var| !var.variable.is_argument);
        Ok(args.chain(locals).map(|var| var.variable.clone()).collect())
    }

    fn variable_value(
        &mut self,
        frame: FrameId,
        variable: &LocalVariable,
    ) -> Result<JdwpValue, JdwpError> {
        let frame = self.frame(frame)?;
        frame
            .variables
            .iter()
            .find(|var| var.variable == *variable)
            .and_then(|var| var.value.clone())
            .ok_or_else(|| JdwpError::NotInScope(variable.name.clone()))
    }

    fn line_locations(&mut self, class: ReferenceTypeId) -> Result<Vec<Location>, JdwpError> {
        self.class(class)?
            .lines
            .clone()
            .ok_or(JdwpError::AbsentInformation)
    }

    fn is_initialized(&mut self, class: ReferenceTypeId) -> Result<bool, JdwpError> {
        Ok(self.class(class)?.initialized)
    }

    fn static_values(
        &mut self,
        class: ReferenceTypeId,
    ) -> Result<Vec<(FieldInfo, JdwpValue)>, JdwpError> {
        Ok(self.class(class)?.statics.clone())
    }

    fn array_values(&mut self, array: ObjectId) -> Result<Vec<JdwpValue>, JdwpError> {
        match self.object(array)? {
            MockObject::Array(values) => Ok(values.clone()),
            _ => Err(JdwpError::Protocol(format!("object {array} is not an array"))),
        }
    }

    fn string_value(&mut self, string: ObjectId) -> Result<String, JdwpError> {
        match self.object(string)? {
            MockObject::String(value) => Ok(value.clone()),
            _ => Err(JdwpError::Protocol(format!("object {string} is not a string"))),
        }
    }

    fn field_values(&mut self, object: ObjectId) -> Result<Vec<(FieldInfo, JdwpValue)>, JdwpError> {
        match self.object(object)? {
            MockObject::Instance(fields) => Ok(fields.clone()),
            _ => Err(JdwpError::Protocol(format!(
                "object {object} has no instance fields"
            ))),
        }
    }
}
