use crate::value::Value;

/// How an input slot is filled. Shadow inputs carry only a literal,
/// NoShadow inputs carry a reporter block, and an obscured shadow carries
/// both (the reporter wins when present).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Shadow,
    NoShadow,
    ObscuredShadow,
}

/// A literal input slot value. Dragged-in variables, lists and broadcast
/// menus appear here rather than as reporter blocks; the compiler lowers
/// each to the matching read instruction or constant.
#[derive(Debug, Clone)]
pub enum InputValue {
    Literal(Value),
    Variable {
        name: String,
        id: String,
        resolved: Option<(usize, usize)>,
    },
    List {
        name: String,
        id: String,
        resolved: Option<(usize, usize)>,
    },
    Broadcast {
        name: String,
        id: String,
        resolved: Option<usize>,
    },
}

impl Default for InputValue {
    fn default() -> Self {
        InputValue::Literal(Value::default())
    }
}

impl InputValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        InputValue::Literal(value.into())
    }
}

#[derive(Debug, Default)]
pub struct Input {
    pub name: String,
    pub input_id: i32,
    pub kind: InputKind,
    pub primary_value: InputValue,
    /// The literal obscured by a dropped-in reporter; kept for editors and
    /// diagnostics, never compiled.
    pub secondary_value: InputValue,
    pub value_block_id: Option<String>,
    pub value_block: Option<usize>,
}

impl Default for InputKind {
    fn default() -> Self {
        InputKind::Shadow
    }
}

impl Input {
    pub fn new(name: impl Into<String>, kind: InputKind) -> Self {
        Input {
            name: name.into(),
            input_id: -1,
            kind,
            ..Input::default()
        }
    }

    pub fn with_value(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut input = Input::new(name, InputKind::Shadow);
        input.primary_value = InputValue::Literal(value.into());
        input
    }
}

/// A reference from a field to the entity its dropdown selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    /// (target index, variable index)
    Variable(usize, usize),
    /// (target index, list index)
    List(usize, usize),
    /// broadcast index in the engine's broadcast table
    Broadcast(usize),
}

#[derive(Debug)]
pub struct Field {
    pub name: String,
    pub field_id: i32,
    pub value: Value,
    /// Raw entity id from the project file, resolved to `linked` later.
    pub value_id: Option<String>,
    pub linked: Option<EntityRef>,
    pub special_value_id: i32,
}

impl Field {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Field {
            name: name.into(),
            field_id: -1,
            value,
            value_id: None,
            linked: None,
            special_value_id: -1,
        }
    }
}
