use crate::compiler::Compiler;
use crate::input::{Field, Input};

pub type BlockComp = fn(&mut Compiler);

/// Custom-block mutation data attached to `procedures_prototype` and
/// `procedures_call` blocks.
#[derive(Debug, Clone, Default)]
pub struct BlockPrototype {
    pub proccode: String,
    pub argument_ids: Vec<String>,
    pub argument_names: Vec<String>,
    pub warp: bool,
}

/// A block in a target's script graph. `next_id`/`parent_id` hold the raw
/// string links from the project file until `resolve_ids` replaces them with
/// arena indices into the owning target's block list.
#[derive(Debug)]
pub struct Block {
    pub id: String,
    pub opcode: String,
    pub next_id: Option<String>,
    pub parent_id: Option<String>,
    pub next: Option<usize>,
    pub parent: Option<usize>,
    pub inputs: Vec<Input>,
    pub fields: Vec<Field>,
    pub shadow: bool,
    pub top_level: bool,
    pub is_top_level_reporter: bool,
    pub compile_function: Option<BlockComp>,
    pub mutation: Option<BlockPrototype>,
}

impl Block {
    pub fn new(id: impl Into<String>, opcode: impl Into<String>) -> Self {
        Block {
            id: id.into(),
            opcode: opcode.into(),
            next_id: None,
            parent_id: None,
            next: None,
            parent: None,
            inputs: Vec::new(),
            fields: Vec::new(),
            shadow: false,
            top_level: false,
            is_top_level_reporter: false,
            compile_function: None,
            mutation: None,
        }
    }

    pub fn add_input(&mut self, input: Input) -> usize {
        self.inputs.push(input);
        self.inputs.len() - 1
    }

    pub fn add_field(&mut self, field: Field) -> usize {
        self.fields.push(field);
        self.fields.len() - 1
    }

    pub fn find_input(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|input| input.name == name)
    }

    pub fn input_by_id(&self, id: i32) -> Option<(usize, &Input)> {
        self.inputs
            .iter()
            .enumerate()
            .find(|(_, input)| input.input_id == id)
    }

    pub fn find_field(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn field_by_id(&self, id: i32) -> Option<&Field> {
        self.fields.iter().find(|field| field.field_id == id)
    }
}
