use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use derivative::Derivative;
use log::{debug, warn};

use crate::clock::{Clock, SteadyClock, SteadyTimer, Timer};
use crate::compiler::Compiler;
use crate::data::Broadcast;
use crate::input::{EntityRef, InputValue};
use crate::script::{HatKind, Script};
use crate::section::{BlockSection, SectionContainer};
use crate::target::Target;
use crate::value::strings_equal;
use crate::vm::{BlockFunc, Vm, VmState};

pub const DEFAULT_FPS: f64 = 30.0;
pub const DEFAULT_STAGE_WIDTH: u32 = 480;
pub const DEFAULT_STAGE_HEIGHT: u32 = 360;
pub const DEFAULT_CLONE_LIMIT: i32 = 300;

#[derive(Debug)]
pub(crate) enum StopRequest {
    All,
    OtherInTarget { target: usize, except: u64 },
    TargetScripts { target: usize },
}

/// Engine state shared with running VMs. Everything a block function may
/// touch lives here; the runner list and section registry stay on `Engine`.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct EngineState {
    pub fps: f64,
    pub turbo: bool,
    pub stage_width: u32,
    pub stage_height: u32,
    pub sprite_fencing: bool,
    pub clone_limit: i32,
    pub clone_count: usize,
    pub running: bool,
    pub redraw_requested: bool,
    pub mouse_x: f64,
    pub mouse_y: f64,
    pub mouse_pressed: bool,
    pub(crate) keys: HashMap<String, bool>,
    pub(crate) any_key_pressed: bool,
    #[derivative(Debug = "ignore")]
    pub functions: Vec<BlockFunc>,
    pub scripts: Vec<Rc<Script>>,
    pub(crate) broadcast_map: Vec<Vec<usize>>,
    pub(crate) pending_broadcasts: VecDeque<usize>,
    /// (script index, target index) pairs queued for instantiation.
    pub(crate) pending_starts: VecDeque<(usize, usize)>,
    pub(crate) stop_requests: Vec<StopRequest>,
    #[derivative(Debug = "ignore")]
    pub clock: Box<dyn Clock>,
    #[derivative(Debug = "ignore")]
    pub timer: Box<dyn Timer>,
    #[derivative(Debug = "ignore")]
    pub(crate) redraw_handler: Option<Box<dyn FnMut()>>,
}

impl Default for EngineState {
    fn default() -> Self {
        EngineState {
            fps: DEFAULT_FPS,
            turbo: false,
            stage_width: DEFAULT_STAGE_WIDTH,
            stage_height: DEFAULT_STAGE_HEIGHT,
            sprite_fencing: true,
            clone_limit: DEFAULT_CLONE_LIMIT,
            clone_count: 0,
            running: false,
            redraw_requested: false,
            mouse_x: 0.0,
            mouse_y: 0.0,
            mouse_pressed: false,
            keys: HashMap::new(),
            any_key_pressed: false,
            functions: Vec::new(),
            scripts: Vec::new(),
            broadcast_map: Vec::new(),
            pending_broadcasts: VecDeque::new(),
            pending_starts: VecDeque::new(),
            stop_requests: Vec::new(),
            clock: Box::new(SteadyClock),
            timer: Box::new(SteadyTimer::default()),
            redraw_handler: None,
        }
    }
}

impl EngineState {
    pub fn request_redraw(&mut self) {
        self.redraw_requested = true;
    }

    /// Queues a broadcast; receivers start (or restart) at the top of the
    /// next tick.
    pub fn broadcast(&mut self, index: usize) {
        if index < self.broadcast_map.len() {
            self.pending_broadcasts.push_back(index);
        }
    }

    pub fn key_pressed(&self, key: &str) -> bool {
        if strings_equal(key, "any") {
            return self.any_key_pressed || self.keys.values().any(|pressed| *pressed);
        }
        let canonical = canonicalize_key(key);
        self.keys.get(&canonical).copied().unwrap_or(false)
    }

    /// Queues the start-as-clone scripts of `root` for the new clone.
    pub(crate) fn start_clone_scripts(&mut self, root: usize, clone: usize) {
        let matching: Vec<usize> = self
            .scripts
            .iter()
            .enumerate()
            .filter(|(_, script)| script.hat == HatKind::StartAsClone && script.target == root)
            .map(|(index, _)| index)
            .collect();
        for index in matching {
            self.pending_starts.push_back((index, clone));
        }
    }

    pub(crate) fn stop_all(&mut self) {
        self.stop_requests.push(StopRequest::All);
    }

    pub(crate) fn stop_other_scripts_in_target(&mut self, target: usize, except: u64) {
        self.stop_requests
            .push(StopRequest::OtherInTarget { target, except });
    }

    pub fn function_index(&mut self, f: BlockFunc) -> u32 {
        if let Some(position) = self
            .functions
            .iter()
            .position(|g| *g as usize == f as usize)
        {
            return position as u32;
        }
        self.functions.push(f);
        (self.functions.len() - 1) as u32
    }
}

/// Normalises a key descriptor: the named keys match exactly, numeric
/// strings are decoded as key codes, anything else is identified by its
/// first character, case-folded.
pub fn canonicalize_key(key: &str) -> String {
    match key {
        "space" | "up arrow" | "down arrow" | "left arrow" | "right arrow" | "enter" => {
            return key.to_owned();
        }
        _ => {}
    }
    if key.len() > 1 && key.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(code) = key.parse::<u32>() {
            return match code {
                13 => "enter".to_owned(),
                32 => "space".to_owned(),
                37 => "left arrow".to_owned(),
                38 => "up arrow".to_owned(),
                39 => "right arrow".to_owned(),
                40 => "down arrow".to_owned(),
                48..=57 | 65..=90 | 97..=122 => char::from_u32(code)
                    .map(|c| c.to_ascii_lowercase().to_string())
                    .unwrap_or_default(),
                _ => key.to_owned(),
            };
        }
    }
    key.chars()
        .next()
        .map(|c| c.to_lowercase().to_string())
        .unwrap_or_default()
}

#[derive(Debug)]
struct Runner {
    id: u64,
    script: usize,
    target: usize,
    state: VmState,
}

struct RegisteredSection {
    name: &'static str,
    container: SectionContainer,
    object: Option<Box<dyn BlockSection>>,
}

/// Lets embedders end `run_event_loop` from callbacks or other threads.
#[derive(Debug, Clone)]
pub struct EventLoopStopper(Arc<AtomicBool>);

impl EventLoopStopper {
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The long-lived coordinator: owns the entity arena and drives compiled
/// scripts under the frame-paced cooperative scheduler.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Engine {
    pub(crate) state: EngineState,
    pub(crate) targets: Vec<Target>,
    pub(crate) broadcasts: Vec<Broadcast>,
    #[derivative(Debug = "ignore")]
    sections: Vec<RegisteredSection>,
    runners: Vec<Runner>,
    next_runner_id: u64,
    original_target_count: usize,
    event_loop_flag: Arc<AtomicBool>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            state: EngineState::default(),
            targets: Vec::new(),
            broadcasts: Vec::new(),
            sections: Vec::new(),
            runners: Vec::new(),
            next_runner_id: 0,
            original_target_count: 0,
            event_loop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Drops all project state: targets, broadcasts, sections, compiled
    /// scripts and running VMs.
    pub fn clear(&mut self) {
        self.targets.clear();
        self.broadcasts.clear();
        self.sections.clear();
        self.runners.clear();
        self.original_target_count = 0;
        self.state.scripts.clear();
        self.state.broadcast_map.clear();
        self.state.pending_broadcasts.clear();
        self.state.pending_starts.clear();
        self.state.stop_requests.clear();
        self.state.clone_count = 0;
    }

    // --- sections ---

    pub fn register_section(&mut self, section: Box<dyn BlockSection>) {
        let name = section.name();
        if self.sections.iter().any(|s| s.name == name) {
            return;
        }
        self.sections.push(RegisteredSection {
            name,
            container: SectionContainer::default(),
            object: None,
        });
        section.register_blocks(self);
        let slot = self
            .sections
            .iter_mut()
            .find(|s| s.name == name)
            .expect("section vanished during registration");
        slot.object = Some(section);
    }

    pub fn registered_section_names(&self) -> Vec<&'static str> {
        self.sections.iter().map(|s| s.name).collect()
    }

    pub fn section_container(&self, name: &str) -> Option<&SectionContainer> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.container)
    }

    fn container_mut(&mut self, name: &str) -> Option<&mut SectionContainer> {
        let slot = self.sections.iter_mut().find(|s| s.name == name);
        if slot.is_none() {
            warn!("ignoring registration against unknown section '{name}'");
        }
        slot.map(|s| &mut s.container)
    }

    pub fn add_compile_function(&mut self, section: &str, opcode: &str, f: crate::block::BlockComp) {
        if let Some(container) = self.container_mut(section) {
            container.add_compile_function(opcode, f);
        }
    }

    pub fn add_hat_block(&mut self, section: &str, opcode: &str) {
        if let Some(container) = self.container_mut(section) {
            container.add_hat_block(opcode);
        }
    }

    pub fn add_input(&mut self, section: &str, name: &str, id: i32) {
        if let Some(container) = self.container_mut(section) {
            container.add_input(name, id);
        }
    }

    pub fn add_field(&mut self, section: &str, name: &str, id: i32) {
        if let Some(container) = self.container_mut(section) {
            container.add_field(name, id);
        }
    }

    pub fn add_field_value(&mut self, section: &str, value: &str, id: i32) {
        if let Some(container) = self.container_mut(section) {
            container.add_field_value(value, id);
        }
    }

    pub fn function_index(&mut self, f: BlockFunc) -> u32 {
        self.state.function_index(f)
    }

    // --- targets & broadcasts ---

    pub fn set_targets(&mut self, targets: Vec<Target>) {
        self.targets = targets;
        self.original_target_count = self.targets.len();
    }

    pub fn set_broadcasts(&mut self, broadcasts: Vec<Broadcast>) {
        self.broadcasts = broadcasts;
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn target_at(&self, index: usize) -> Option<&Target> {
        self.targets.get(index)
    }

    pub fn target_at_mut(&mut self, index: usize) -> Option<&mut Target> {
        self.targets.get_mut(index)
    }

    /// Finds a target by name. The stage is only reachable through the
    /// reserved name `_stage_`, never through its display name.
    pub fn find_target(&self, name: &str) -> Option<usize> {
        if name == "_stage_" {
            return self.stage_index();
        }
        self.targets
            .iter()
            .position(|t| t.alive && !t.is_stage() && t.name == name)
    }

    pub fn stage_index(&self) -> Option<usize> {
        self.targets.iter().position(|t| t.is_stage())
    }

    pub fn stage(&self) -> Option<&Target> {
        self.stage_index().map(|i| &self.targets[i])
    }

    pub fn stage_mut(&mut self) -> Option<&mut Target> {
        self.stage_index().map(|i| &mut self.targets[i])
    }

    pub fn broadcasts(&self) -> &[Broadcast] {
        &self.broadcasts
    }

    pub fn broadcast_at(&self, index: usize) -> Option<&Broadcast> {
        self.broadcasts.get(index)
    }

    pub fn find_broadcast(&self, name: &str) -> Option<usize> {
        self.broadcasts
            .iter()
            .position(|b| strings_equal(&b.name, name))
    }

    pub fn find_broadcast_by_id(&self, id: &str) -> Option<usize> {
        self.broadcasts.iter().position(|b| b.id == id)
    }

    pub fn scripts(&self) -> &[Rc<Script>] {
        &self.state.scripts
    }

    // --- configuration ---

    pub fn fps(&self) -> f64 {
        self.state.fps
    }

    /// Rejects non-positive rates; the previous value is kept.
    pub fn set_fps(&mut self, fps: f64) {
        if fps > 0.0 {
            self.state.fps = fps;
        } else {
            warn!("rejecting fps {fps}");
        }
    }

    pub fn turbo_mode_enabled(&self) -> bool {
        self.state.turbo
    }

    pub fn set_turbo_mode_enabled(&mut self, turbo: bool) {
        self.state.turbo = turbo;
    }

    pub fn stage_width(&self) -> u32 {
        self.state.stage_width
    }

    pub fn set_stage_width(&mut self, width: u32) {
        self.state.stage_width = width;
    }

    pub fn stage_height(&self) -> u32 {
        self.state.stage_height
    }

    pub fn set_stage_height(&mut self, height: u32) {
        self.state.stage_height = height;
    }

    pub fn sprite_fencing_enabled(&self) -> bool {
        self.state.sprite_fencing
    }

    pub fn set_sprite_fencing_enabled(&mut self, enabled: bool) {
        self.state.sprite_fencing = enabled;
    }

    pub fn clone_limit(&self) -> i32 {
        self.state.clone_limit
    }

    /// Any negative limit means unlimited and is stored as -1.
    pub fn set_clone_limit(&mut self, limit: i32) {
        self.state.clone_limit = if limit < 0 { -1 } else { limit };
    }

    pub fn clone_count(&self) -> usize {
        self.state.clone_count
    }

    pub fn set_clock(&mut self, clock: Box<dyn Clock>) {
        self.state.clock = clock;
    }

    pub fn set_timer(&mut self, timer: Box<dyn Timer>) {
        self.state.timer = timer;
    }

    pub fn timer_value(&self) -> f64 {
        self.state.timer.value()
    }

    pub fn set_redraw_handler(&mut self, handler: Box<dyn FnMut()>) {
        self.state.redraw_handler = Some(handler);
    }

    // --- input injection ---

    pub fn set_key_state(&mut self, key: &str, pressed: bool) {
        let canonical = canonicalize_key(key);
        if canonical.is_empty() {
            return;
        }
        self.state.keys.insert(canonical.clone(), pressed);
        if pressed && self.state.running {
            self.queue_key_scripts(&canonical);
        }
    }

    pub fn set_any_key_pressed(&mut self, pressed: bool) {
        self.state.any_key_pressed = pressed;
    }

    pub fn key_pressed(&self, key: &str) -> bool {
        self.state.key_pressed(key)
    }

    pub fn mouse_x(&self) -> f64 {
        self.state.mouse_x
    }

    pub fn set_mouse_x(&mut self, x: f64) {
        self.state.mouse_x = x;
    }

    pub fn mouse_y(&self) -> f64 {
        self.state.mouse_y
    }

    pub fn set_mouse_y(&mut self, y: f64) {
        self.state.mouse_y = y;
    }

    pub fn mouse_pressed(&self) -> bool {
        self.state.mouse_pressed
    }

    pub fn set_mouse_pressed(&mut self, pressed: bool) {
        self.state.mouse_pressed = pressed;
    }

    // --- resolution & compilation ---

    /// Replaces string ids (block links, input blocks, field entities) with
    /// direct arena indices. Structural problems are logged and the broken
    /// reference left unresolved; the project still runs.
    pub fn resolve_ids(&mut self) {
        let stage = self.stage_index();
        let stage_vars: HashMap<String, usize> = stage
            .map(|s| {
                self.targets[s]
                    .variables
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (v.id.clone(), i))
                    .collect()
            })
            .unwrap_or_default();
        let stage_lists: HashMap<String, usize> = stage
            .map(|s| {
                self.targets[s]
                    .lists
                    .iter()
                    .enumerate()
                    .map(|(i, l)| (l.id.clone(), i))
                    .collect()
            })
            .unwrap_or_default();
        let broadcast_ids: HashMap<String, usize> = self
            .broadcasts
            .iter()
            .enumerate()
            .map(|(i, b)| (b.id.clone(), i))
            .collect();
        let broadcast_names: Vec<String> = self.broadcasts.iter().map(|b| b.name.clone()).collect();

        for t in 0..self.targets.len() {
            let block_ids: HashMap<String, usize> = self.targets[t]
                .blocks
                .iter()
                .enumerate()
                .map(|(i, b)| (b.id.clone(), i))
                .collect();
            let own_vars: HashMap<String, usize> = self.targets[t]
                .variables
                .iter()
                .enumerate()
                .map(|(i, v)| (v.id.clone(), i))
                .collect();
            let own_lists: HashMap<String, usize> = self.targets[t]
                .lists
                .iter()
                .enumerate()
                .map(|(i, l)| (l.id.clone(), i))
                .collect();

            let resolve_var = |id: &str| -> Option<(usize, usize)> {
                own_vars
                    .get(id)
                    .map(|i| (t, *i))
                    .or_else(|| stage.and_then(|s| stage_vars.get(id).map(|i| (s, *i))))
            };
            let resolve_list = |id: &str| -> Option<(usize, usize)> {
                own_lists
                    .get(id)
                    .map(|i| (t, *i))
                    .or_else(|| stage.and_then(|s| stage_lists.get(id).map(|i| (s, *i))))
            };

            for block in &mut self.targets[t].blocks {
                block.next = block.next_id.as_ref().and_then(|id| {
                    let index = block_ids.get(id).copied();
                    if index.is_none() {
                        warn!("broken next link '{id}' on block '{}'", block.id);
                    }
                    index
                });
                block.parent = block
                    .parent_id
                    .as_ref()
                    .and_then(|id| block_ids.get(id).copied());

                for input in &mut block.inputs {
                    input.value_block = input.value_block_id.as_ref().and_then(|id| {
                        let index = block_ids.get(id).copied();
                        if index.is_none() {
                            warn!("missing input block '{id}' on block '{}'", block.id);
                        }
                        index
                    });
                    match &mut input.primary_value {
                        InputValue::Variable { id, resolved, name } => {
                            *resolved = resolve_var(id);
                            if resolved.is_none() {
                                warn!("missing variable id '{id}' ('{name}')");
                            }
                        }
                        InputValue::List { id, resolved, name } => {
                            *resolved = resolve_list(id);
                            if resolved.is_none() {
                                warn!("missing list id '{id}' ('{name}')");
                            }
                        }
                        InputValue::Broadcast { id, resolved, name } => {
                            *resolved = broadcast_ids.get(id.as_str()).copied().or_else(|| {
                                broadcast_names.iter().position(|n| strings_equal(n, name))
                            });
                            if resolved.is_none() {
                                warn!("missing broadcast id '{id}' ('{name}')");
                            }
                        }
                        InputValue::Literal(_) => {}
                    }
                }

                for field in &mut block.fields {
                    let Some(id) = field.value_id.clone() else {
                        continue;
                    };
                    field.linked = match field.name.as_str() {
                        "VARIABLE" => resolve_var(&id).map(|(t, i)| EntityRef::Variable(t, i)),
                        "LIST" => resolve_list(&id).map(|(t, i)| EntityRef::List(t, i)),
                        "BROADCAST_OPTION" => broadcast_ids
                            .get(id.as_str())
                            .copied()
                            .map(EntityRef::Broadcast),
                        _ => None,
                    };
                    if field.linked.is_none()
                        && matches!(field.name.as_str(), "VARIABLE" | "LIST" | "BROADCAST_OPTION")
                    {
                        warn!("missing {} id '{id}'", field.name.to_lowercase());
                    }
                }
            }
        }
    }

    /// Compiles every hat and top-level reporter of every target. Each
    /// target gets one shared pool program.
    pub fn compile(&mut self) {
        self.state.scripts.clear();
        self.state.broadcast_map = vec![Vec::new(); self.broadcasts.len()];

        // attach compile functions and numeric ids from the section tables
        for target in &mut self.targets {
            for block in &mut target.blocks {
                let container = self
                    .sections
                    .iter()
                    .find(|s| s.container.resolve_compile_function(&block.opcode).is_some());
                match container {
                    Some(section) => {
                        block.compile_function =
                            section.container.resolve_compile_function(&block.opcode);
                        for input in &mut block.inputs {
                            input.input_id =
                                section.container.resolve_input(&input.name).unwrap_or(-1);
                        }
                        for field in &mut block.fields {
                            field.field_id =
                                section.container.resolve_field(&field.name).unwrap_or(-1);
                            field.special_value_id = section
                                .container
                                .resolve_field_value(&field.value.to_string())
                                .unwrap_or(-1);
                        }
                    }
                    None => {
                        if !block.shadow {
                            warn!("unknown opcode: {}", block.opcode);
                        }
                    }
                }
            }
        }

        let hat_opcodes: std::collections::HashSet<String> = self
            .sections
            .iter()
            .flat_map(|s| s.container.hat_opcodes().cloned())
            .collect();

        for t in 0..self.targets.len() {
            let target = &self.targets[t];
            let mut compiler =
                Compiler::new(&target.blocks, &self.broadcasts, &mut self.state.functions);

            // register every custom block before compiling anything
            let mut definitions: Vec<(usize, String)> = Vec::new();
            for (b, block) in target.blocks.iter().enumerate() {
                if block.opcode != "procedures_definition" {
                    continue;
                }
                let prototype = block
                    .find_input("custom_block")
                    .and_then(|i| block.inputs[i].value_block)
                    .and_then(|p| target.blocks[p].mutation.clone());
                match prototype {
                    Some(prototype) => {
                        compiler.register_procedure(
                            &prototype.proccode,
                            prototype.argument_names.clone(),
                        );
                        definitions.push((b, prototype.proccode));
                    }
                    None => warn!("procedure definition '{}' has no prototype", block.id),
                }
            }
            for (b, proccode) in &definitions {
                compiler.compile_procedure(*b, proccode);
            }

            let mut compiled: Vec<(usize, Vec<u32>, HatKind)> = Vec::new();
            for (b, block) in target.blocks.iter().enumerate() {
                if !block.top_level || block.shadow || block.opcode == "procedures_definition" {
                    continue;
                }
                let hat = if block.is_top_level_reporter {
                    HatKind::TopLevelReporter
                } else if hat_opcodes.contains(&block.opcode) {
                    classify_hat(block)
                } else {
                    continue;
                };
                let bytecode = compiler.compile(b);
                compiled.push((b, bytecode, hat));
            }

            let program = Rc::new(compiler.into_program(t));
            for (hat_block, bytecode, hat) in compiled {
                if let HatKind::BroadcastReceived(index) = hat {
                    self.state.broadcast_map[index].push(self.state.scripts.len());
                }
                self.state.scripts.push(Rc::new(Script {
                    program: Rc::clone(&program),
                    bytecode,
                    target: t,
                    hat_block,
                    hat,
                }));
            }
        }
        debug!("compiled {} scripts", self.state.scripts.len());
    }

    // --- execution ---

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Resets the timer and queues every green-flag script (plus key hats
    /// for keys already held).
    pub fn start(&mut self) {
        self.state.running = true;
        self.state.timer.reset();
        self.runners.clear();
        self.state.pending_broadcasts.clear();
        self.state.pending_starts.clear();
        self.state.stop_requests.clear();
        self.delete_all_clones();

        for index in 0..self.state.scripts.len() {
            let (hat, target) = {
                let script = &self.state.scripts[index];
                (script.hat.clone(), script.target)
            };
            match hat {
                HatKind::GreenFlag => self.spawn_runner(index, target),
                HatKind::KeyPressed(key) => {
                    if self.state.key_pressed(&key) {
                        self.spawn_runner(index, target);
                    }
                }
                _ => {}
            }
        }
    }

    /// Stops every script, deletes all clones and clears pending work.
    /// The timer keeps counting.
    pub fn stop(&mut self) {
        self.runners.clear();
        self.state.pending_broadcasts.clear();
        self.state.pending_starts.clear();
        self.state.stop_requests.clear();
        self.delete_all_clones();
        for target in &mut self.targets {
            target.clear_graphics_effects();
        }
        self.state.running = false;
    }

    /// Runs the project to completion: starts it and ticks frames until no
    /// script is left.
    pub fn run(&mut self) {
        self.start();
        while !self.runners.is_empty()
            || !self.state.pending_broadcasts.is_empty()
            || !self.state.pending_starts.is_empty()
        {
            self.tick();
        }
        self.state.running = false;
    }

    /// Keeps ticking frames until `stop_event_loop` (or a stopper handle)
    /// is triggered, whether or not scripts are running.
    pub fn run_event_loop(&mut self) {
        self.event_loop_flag.store(true, Ordering::SeqCst);
        while self.event_loop_flag.load(Ordering::SeqCst) {
            self.tick();
        }
    }

    pub fn stop_event_loop(&self) {
        self.event_loop_flag.store(false, Ordering::SeqCst);
    }

    pub fn event_loop_stopper(&self) -> EventLoopStopper {
        EventLoopStopper(Arc::clone(&self.event_loop_flag))
    }

    fn spawn_runner(&mut self, script: usize, target: usize) {
        let state = VmState::new(&self.state.scripts[script], target);
        self.runners.push(Runner {
            id: self.next_runner_id,
            script,
            target,
            state,
        });
        self.next_runner_id += 1;
    }

    fn queue_key_scripts(&mut self, canonical: &str) {
        let matching: Vec<(usize, usize)> = self
            .state
            .scripts
            .iter()
            .enumerate()
            .filter_map(|(index, script)| match &script.hat {
                HatKind::KeyPressed(key) if key == canonical || key == "any" => {
                    Some((index, script.target))
                }
                _ => None,
            })
            .collect();
        for (index, target) in matching {
            let already_running = self.runners.iter().any(|r| r.script == index);
            if !already_running {
                self.state.pending_starts.push_back((index, target));
            }
        }
    }

    /// Starts (or restarts in place) the receivers of a broadcast.
    fn start_broadcast_scripts(&mut self, broadcast: usize) {
        let receivers = self.state.broadcast_map[broadcast].clone();
        for script in receivers {
            match self.runners.iter().position(|r| r.script == script) {
                Some(position) => self.runners[position].state.reset(),
                None => {
                    let target = self.state.scripts[script].target;
                    self.spawn_runner(script, target);
                }
            }
        }
    }

    fn drain_pending_starts(&mut self) {
        while let Some((script, target)) = self.state.pending_starts.pop_front() {
            self.spawn_runner(script, target);
        }
    }

    fn process_stop_requests(&mut self) {
        let requests = std::mem::take(&mut self.state.stop_requests);
        for request in requests {
            match request {
                StopRequest::All => {
                    self.runners.clear();
                    self.state.pending_broadcasts.clear();
                    self.state.pending_starts.clear();
                    self.delete_all_clones();
                    for target in &mut self.targets {
                        target.clear_graphics_effects();
                    }
                }
                StopRequest::OtherInTarget { target, except } => {
                    for runner in &mut self.runners {
                        if runner.target == target && runner.id != except {
                            runner.state.running = false;
                        }
                    }
                }
                StopRequest::TargetScripts { target } => {
                    for runner in &mut self.runners {
                        if runner.target == target {
                            runner.state.running = false;
                        }
                    }
                }
            }
        }
    }

    fn delete_all_clones(&mut self) {
        for runner in &mut self.runners {
            if runner.target >= self.original_target_count {
                runner.state.running = false;
            }
        }
        self.runners
            .retain(|r| r.target < self.original_target_count);
        self.targets.truncate(self.original_target_count);
        for target in &mut self.targets {
            if let Some(sprite) = target.sprite_mut() {
                sprite.children.clear();
            }
        }
        self.state.clone_count = 0;
        compact_layers(&mut self.targets);
    }

    /// One frame: drain queued broadcasts and starts, step every live
    /// script in creation order, redraw, then sleep off the frame budget.
    pub fn tick(&mut self) {
        let frame_start = self.state.clock.now();

        let queued: Vec<usize> = self.state.pending_broadcasts.drain(..).collect();
        for broadcast in queued {
            self.start_broadcast_scripts(broadcast);
        }
        self.drain_pending_starts();

        let mut i = 0;
        while i < self.runners.len() {
            if self.runners[i].state.is_running() {
                let script = Rc::clone(&self.state.scripts[self.runners[i].script]);
                let runner = &mut self.runners[i];
                let mut vm = Vm {
                    state: &mut runner.state,
                    script: &script,
                    target: runner.target,
                    targets: &mut self.targets,
                    engine: &mut self.state,
                    broadcasts: &self.broadcasts,
                    runner_id: runner.id,
                };
                vm.run();
                self.process_stop_requests();
                self.drain_pending_starts();
            }
            i += 1;
        }
        self.runners.retain(|r| r.state.is_running());

        if let Some(handler) = self.state.redraw_handler.as_mut() {
            handler();
        }
        self.state.redraw_requested = false;

        if !self.state.turbo {
            let frame = Duration::from_secs_f64(1.0 / self.state.fps);
            let elapsed = self.state.clock.now().saturating_duration_since(frame_start);
            if elapsed < frame {
                self.state.clock.sleep(frame - elapsed);
            }
        }
    }

    // --- layer order ---

    pub fn move_sprite_to_front(&mut self, sprite: usize) {
        let count = sprite_count(&self.targets) as i32;
        reinsert_sprite(&mut self.targets, sprite, count);
    }

    pub fn move_sprite_to_back(&mut self, sprite: usize) {
        reinsert_sprite(&mut self.targets, sprite, 1);
    }

    pub fn move_sprite_forward_layers(&mut self, sprite: usize, layers: i32) {
        let position = self.targets[sprite].layer_order + layers;
        reinsert_sprite(&mut self.targets, sprite, position);
    }

    pub fn move_sprite_backward_layers(&mut self, sprite: usize, layers: i32) {
        self.move_sprite_forward_layers(sprite, -layers);
    }

    pub fn move_sprite_behind_other(&mut self, sprite: usize, other: usize) {
        move_sprite_behind_other(&mut self.targets, sprite, other);
    }
}

fn classify_hat(block: &crate::block::Block) -> HatKind {
    match block.opcode.as_str() {
        "event_whenflagclicked" => HatKind::GreenFlag,
        "event_whenbroadcastreceived" => {
            let linked = block
                .fields
                .iter()
                .find(|f| f.name == "BROADCAST_OPTION")
                .and_then(|f| f.linked);
            match linked {
                Some(EntityRef::Broadcast(index)) => HatKind::BroadcastReceived(index),
                _ => {
                    warn!("broadcast hat '{}' has no resolved broadcast", block.id);
                    HatKind::Other
                }
            }
        }
        "event_whenkeypressed" => {
            let key = block
                .fields
                .iter()
                .find(|f| f.name == "KEY_OPTION")
                .map(|f| f.value.to_string())
                .unwrap_or_default();
            if strings_equal(&key, "any") {
                HatKind::KeyPressed("any".to_owned())
            } else {
                HatKind::KeyPressed(canonicalize_key(&key))
            }
        }
        "control_start_as_clone" => HatKind::StartAsClone,
        _ => HatKind::Other,
    }
}

pub(crate) fn sprite_count(targets: &[Target]) -> usize {
    targets
        .iter()
        .filter(|t| t.alive && !t.is_stage())
        .count()
}

/// Removes the sprite from the dense 1..N layer sequence and reinserts it
/// at `position` (clamped), shifting the sprites in between by one.
pub(crate) fn reinsert_sprite(targets: &mut [Target], sprite: usize, position: i32) {
    if targets[sprite].is_stage() {
        return;
    }
    let count = sprite_count(targets) as i32;
    let old = targets[sprite].layer_order;
    for (i, target) in targets.iter_mut().enumerate() {
        if i != sprite && target.alive && !target.is_stage() && target.layer_order > old {
            target.layer_order -= 1;
        }
    }
    let position = position.clamp(1, count);
    for (i, target) in targets.iter_mut().enumerate() {
        if i != sprite && target.alive && !target.is_stage() && target.layer_order >= position {
            target.layer_order += 1;
        }
    }
    targets[sprite].layer_order = position;
}

pub(crate) fn move_sprite_behind_other(targets: &mut [Target], sprite: usize, other: usize) {
    if sprite == other || targets[sprite].is_stage() || targets[other].is_stage() {
        return;
    }
    let old = targets[sprite].layer_order;
    for (i, target) in targets.iter_mut().enumerate() {
        if i != sprite && target.alive && !target.is_stage() && target.layer_order > old {
            target.layer_order -= 1;
        }
    }
    let position = targets[other].layer_order;
    for (i, target) in targets.iter_mut().enumerate() {
        if i != sprite && target.alive && !target.is_stage() && target.layer_order >= position {
            target.layer_order += 1;
        }
    }
    targets[sprite].layer_order = position;
}

/// Reassigns dense layer orders 1..N (stage stays 0), preserving relative
/// order. Used after bulk clone deletion.
pub(crate) fn compact_layers(targets: &mut [Target]) {
    let mut sprites: Vec<usize> = (0..targets.len())
        .filter(|&i| targets[i].alive && !targets[i].is_stage())
        .collect();
    sprites.sort_by_key(|&i| targets[i].layer_order);
    for (order, index) in sprites.into_iter().enumerate() {
        targets[index].layer_order = order as i32 + 1;
    }
}

/// Creates a clone of `source`: private copies of variables and lists,
/// shared blocks/costumes/sounds through the data source, placed directly
/// behind its parent. Returns None when the clone budget is exhausted.
pub(crate) fn create_clone(
    targets: &mut Vec<Target>,
    state: &mut EngineState,
    source: usize,
) -> Option<usize> {
    if state.clone_limit == 0 {
        return None;
    }
    if state.clone_limit > 0 && state.clone_count >= state.clone_limit as usize {
        return None;
    }
    let root = targets[source].data_source.unwrap_or(source);
    let parent_layer = targets[source].layer_order;

    let mut clone = Target::new_sprite(targets[source].name.clone());
    clone.variables = targets[source].variables.clone();
    clone.lists = targets[source].lists.clone();
    clone.costume_index = targets[source].costume_index;
    clone.volume = targets[source].volume;
    clone.data_source = Some(root);
    {
        let source_sprite = targets[source].sprite()?;
        let sprite = clone.sprite_mut().expect("clone is a sprite");
        sprite.visible = source_sprite.visible;
        sprite.x = source_sprite.x;
        sprite.y = source_sprite.y;
        sprite.size = source_sprite.size;
        sprite.direction = source_sprite.direction;
        sprite.draggable = source_sprite.draggable;
        sprite.rotation_style = source_sprite.rotation_style;
        sprite.effects = source_sprite.effects.clone();
        sprite.clone_parent = Some(source);
        sprite.clone_root = Some(root);
    }

    for target in targets.iter_mut() {
        if target.alive && !target.is_stage() && target.layer_order >= parent_layer {
            target.layer_order += 1;
        }
    }
    clone.layer_order = parent_layer;

    targets.push(clone);
    let index = targets.len() - 1;
    if let Some(sprite) = targets[source].sprite_mut() {
        sprite.children.push(index);
    }
    state.clone_count += 1;
    state.start_clone_scripts(root, index);
    if let Some(sprite) = targets[source].sprite_mut() {
        if let Some(iface) = sprite.interface.as_mut() {
            iface.on_cloned(index);
        }
    }
    Some(index)
}

/// Deletes a clone: detaches it from its parent, hands its children to the
/// grandparent and stops every script running on it.
pub(crate) fn delete_clone(targets: &mut [Target], state: &mut EngineState, index: usize) -> bool {
    if !targets[index].is_clone() || !targets[index].alive {
        return false;
    }
    let (parent, children) = {
        let sprite = targets[index].sprite_mut().expect("clone is a sprite");
        (
            sprite.clone_parent.take(),
            std::mem::take(&mut sprite.children),
        )
    };
    targets[index].alive = false;

    if let Some(parent) = parent {
        if let Some(parent_sprite) = targets[parent].sprite_mut() {
            parent_sprite.children.retain(|&c| c != index);
            parent_sprite.children.extend(children.iter().copied());
        }
        for &child in &children {
            if let Some(child_sprite) = targets[child].sprite_mut() {
                child_sprite.clone_parent = Some(parent);
            }
        }
    }

    let layer = targets[index].layer_order;
    for target in targets.iter_mut() {
        if target.alive && !target.is_stage() && target.layer_order > layer {
            target.layer_order -= 1;
        }
    }
    state.clone_count -= 1;
    state.stop_requests.push(StopRequest::TargetScripts {
        target: index,
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_canonicalisation() {
        assert_eq!(canonicalize_key("A"), "a");
        assert_eq!(canonicalize_key("a"), "a");
        assert_eq!(canonicalize_key("4"), "4");
        assert_eq!(canonicalize_key("32"), "space");
        assert_eq!(canonicalize_key("52"), "4");
        assert_eq!(canonicalize_key("65"), "a");
        assert_eq!(canonicalize_key("space"), "space");
        assert_eq!(canonicalize_key("up arrow"), "up arrow");
        // only the exact lowercase form names the arrow key
        assert_eq!(canonicalize_key("UP arrow"), "u");
        assert_eq!(canonicalize_key("38"), "up arrow");
    }

    #[test]
    fn fps_bounds() {
        let mut engine = Engine::new();
        assert_eq!(engine.fps(), 30.0);
        engine.set_fps(60.25);
        assert_eq!(engine.fps(), 60.25);
        engine.set_fps(0.0);
        assert_eq!(engine.fps(), 60.25);
        engine.set_fps(-5.0);
        assert_eq!(engine.fps(), 60.25);
    }

    #[test]
    fn clone_limit_normalisation() {
        let mut engine = Engine::new();
        assert_eq!(engine.clone_limit(), 300);
        engine.set_clone_limit(475);
        assert_eq!(engine.clone_limit(), 475);
        engine.set_clone_limit(0);
        assert_eq!(engine.clone_limit(), 0);
        engine.set_clone_limit(-5);
        assert_eq!(engine.clone_limit(), -1);
    }
}
