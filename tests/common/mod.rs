#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ferrophorus::{
    blocks, Block, Broadcast, Clock, Engine, Field, Input, InputKind, InputValue, Target, Value,
    Variable,
};

/// A deterministic clock: `sleep` advances time instead of blocking, so
/// frame pacing costs nothing in tests.
#[derive(Clone)]
pub struct TestClock {
    now: Arc<Mutex<Instant>>,
}

impl TestClock {
    pub fn new() -> Self {
        TestClock {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
    }
}

pub fn value_input(name: &str, value: impl Into<Value>) -> Input {
    Input::with_value(name, value)
}

/// A reporter plugged into an input slot.
pub fn block_input(name: &str, block_id: &str) -> Input {
    let mut input = Input::new(name, InputKind::NoShadow);
    input.value_block_id = Some(block_id.to_owned());
    input
}

pub fn obscured_input(name: &str, block_id: &str, fallback: impl Into<Value>) -> Input {
    let mut input = Input::new(name, InputKind::ObscuredShadow);
    input.value_block_id = Some(block_id.to_owned());
    input.secondary_value = InputValue::Literal(fallback.into());
    input
}

/// A static dropdown: a shadow input holding a menu block.
pub fn menu_input(name: &str, menu_id: &str) -> Input {
    let mut input = Input::new(name, InputKind::Shadow);
    input.value_block_id = Some(menu_id.to_owned());
    input
}

/// A variable dragged into an input slot.
pub fn variable_input(name: &str, variable_id: &str) -> Input {
    let mut input = Input::new(name, InputKind::ObscuredShadow);
    input.primary_value = InputValue::Variable {
        name: String::new(),
        id: variable_id.to_owned(),
        resolved: None,
    };
    input
}

pub fn field(name: &str, value: impl Into<Value>) -> Field {
    Field::new(name, value.into())
}

/// A field referencing a variable/list/broadcast by id.
pub fn entity_field(name: &str, display: &str, entity_id: &str) -> Field {
    let mut field = Field::new(name, Value::from(display));
    field.value_id = Some(entity_id.to_owned());
    field
}

pub fn menu_block(id: &str, opcode: &str, field_name: &str, value: &str) -> Block {
    let mut block = Block::new(id, opcode);
    block.shadow = true;
    block.add_field(Field::new(field_name, Value::from(value)));
    block
}

/// Links a run of blocks into a script (first block becomes the top-level
/// root) and adds them to the target.
pub fn chain(target: &mut Target, mut blocks: Vec<Block>) {
    for i in 0..blocks.len() {
        if i == 0 {
            blocks[i].top_level = true;
        } else {
            let parent = blocks[i - 1].id.clone();
            blocks[i].parent_id = Some(parent);
        }
        if i + 1 < blocks.len() {
            let next = blocks[i + 1].id.clone();
            blocks[i].next_id = Some(next);
        }
    }
    for block in blocks {
        target.add_block(block);
    }
}

pub fn stage_with_vars(vars: &[(&str, &str)]) -> Target {
    let mut stage = Target::new_stage();
    stage.name = "Stage".to_owned();
    for (id, name) in vars {
        stage.add_variable(Variable::new(*id, *name, Value::Integer(0)));
    }
    stage
}

/// Registers the default sections, loads the targets and compiles, with a
/// test clock installed.
pub fn build_engine(targets: Vec<Target>, broadcasts: Vec<Broadcast>) -> Engine {
    let mut engine = Engine::new();
    blocks::register_default_sections(&mut engine);
    engine.set_targets(targets);
    engine.set_broadcasts(broadcasts);
    engine.set_clock(Box::new(TestClock::new()));
    engine.resolve_ids();
    engine.compile();
    engine
}

pub fn stage_var(engine: &Engine, name: &str) -> Value {
    let stage = engine.stage().expect("project has a stage");
    let index = stage.find_variable(name).expect("variable exists");
    stage.variables[index].value.clone()
}
