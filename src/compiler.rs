use std::collections::HashMap;

use log::warn;

use crate::block::{Block, BlockPrototype};
use crate::data::Broadcast;
use crate::input::{InputKind, InputValue};
use crate::script::Program;
use crate::value::Value;
use crate::vm::{BlockFunc, Opcode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstackKind {
    Loop,
    IfStatement,
}

#[derive(Debug)]
struct Substack {
    control_block: Option<usize>,
    second: Option<usize>,
    kind: SubstackKind,
    atomic: bool,
}

/// Lowers one target's block trees into bytecode. A single compiler is used
/// for every script and procedure of the target so pool indices are shared
/// and de-duplicated across them.
pub struct Compiler<'a> {
    blocks: &'a [Block],
    broadcasts: &'a [Broadcast],
    functions: &'a mut Vec<BlockFunc>,
    bytecode: Vec<u32>,
    block: Option<usize>,
    substacks: Vec<Substack>,
    cursor_repositioned: bool,
    atomic: bool,
    warp: bool,
    const_values: Vec<Value>,
    const_keys: Vec<Option<(usize, usize)>>,
    variables: Vec<(usize, usize)>,
    lists: Vec<(usize, usize)>,
    procedures: Vec<String>,
    procedure_args: HashMap<String, Vec<String>>,
    procedure_prototype: Option<BlockPrototype>,
    procedure_code: Vec<u32>,
    procedure_entries: HashMap<String, usize>,
}

impl<'a> Compiler<'a> {
    pub fn new(
        blocks: &'a [Block],
        broadcasts: &'a [Broadcast],
        functions: &'a mut Vec<BlockFunc>,
    ) -> Self {
        Compiler {
            blocks,
            broadcasts,
            functions,
            bytecode: Vec::new(),
            block: None,
            substacks: Vec::new(),
            cursor_repositioned: false,
            atomic: true,
            warp: false,
            const_values: Vec::new(),
            const_keys: Vec::new(),
            variables: Vec::new(),
            lists: Vec::new(),
            procedures: Vec::new(),
            procedure_args: HashMap::new(),
            procedure_prototype: None,
            procedure_code: Vec::new(),
            procedure_entries: HashMap::new(),
        }
    }

    /// Compiles the script rooted at `root` and returns its bytecode.
    pub fn compile(&mut self, root: usize) -> Vec<u32> {
        self.bytecode.clear();
        self.substacks.clear();
        self.procedure_prototype = None;
        self.atomic = true;
        self.warp = false;
        self.add_instruction(Opcode::Start);
        self.block = Some(root);
        while let Some(index) = self.block {
            let depth = self.substacks.len();
            self.cursor_repositioned = false;
            self.compile_block(index);
            if depth != self.substacks.len() || self.cursor_repositioned {
                continue;
            }
            self.block = self.blocks[index].next;
            if self.block.is_none() && !self.substacks.is_empty() {
                self.substack_end();
            }
        }
        self.add_instruction(Opcode::Halt);
        std::mem::take(&mut self.bytecode)
    }

    /// Compiles a custom-block definition and appends it to the procedure
    /// code buffer under `proccode`.
    pub fn compile_procedure(&mut self, definition: usize, proccode: &str) {
        let code = self.compile(definition);
        let offset = self.procedure_code.len();
        self.procedure_code.extend(code);
        self.procedure_entries.insert(proccode.to_owned(), offset);
    }

    /// Registers a procedure's argument names; must happen before any call
    /// site or argument reporter referencing it is compiled.
    pub fn register_procedure(&mut self, proccode: &str, argument_names: Vec<String>) {
        self.procedure_args
            .insert(proccode.to_owned(), argument_names);
    }

    pub fn has_procedure(&self, proccode: &str) -> bool {
        self.procedure_args.contains_key(proccode)
    }

    fn compile_block(&mut self, index: usize) {
        match self.blocks[index].compile_function {
            Some(f) => f(self),
            None => warn!("unsupported block: {}", self.blocks[index].opcode),
        }
    }

    fn substack_end(&mut self) {
        let frame = self.substacks.last_mut().expect("substack underflow");
        let kind = frame.kind;
        let loop_atomic = frame.atomic;
        let second = frame.second.take();
        let control_block = frame.control_block;
        match kind {
            SubstackKind::Loop => {
                if !loop_atomic {
                    self.add_instruction(Opcode::BreakAtomic);
                }
                self.add_instruction(Opcode::LoopEnd);
            }
            SubstackKind::IfStatement => {
                if let Some(second) = second {
                    self.add_instruction(Opcode::Else);
                    self.block = Some(second);
                    self.cursor_repositioned = true;
                    return;
                }
                self.add_instruction(Opcode::EndIf);
            }
        }
        self.substacks.pop();
        self.block = control_block.and_then(|control| self.blocks[control].next);
        self.cursor_repositioned = true;
        if self.block.is_none() && !self.substacks.is_empty() {
            self.substack_end();
        }
    }

    /// The block the compiler is currently positioned on.
    pub fn block(&self) -> &Block {
        &self.blocks[self.block.expect("no current block")]
    }

    pub fn block_at(&self, index: usize) -> &Block {
        &self.blocks[index]
    }

    pub fn add_instruction(&mut self, op: Opcode) {
        self.bytecode.push(op as u32);
    }

    pub fn add_instruction_arg(&mut self, op: Opcode, arg: u32) {
        self.bytecode.push(op as u32);
        self.bytecode.push(arg);
    }

    /// Emits an EXEC of the given block function, registering it in the
    /// engine's function table if it is not there yet.
    pub fn add_function_call(&mut self, f: BlockFunc) {
        let index = self.function_index(f);
        self.add_instruction_arg(Opcode::Exec, index);
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

    /// Compiles the input with the given id inline at the current position.
    pub fn add_input(&mut self, id: i32) {
        let index = self
            .block
            .and_then(|b| self.blocks[b].input_by_id(id).map(|(i, _)| i));
        self.compile_input(index);
    }

    /// Like `add_input`, but addressed by input name. Used for custom-block
    /// call sites whose input names are the argument ids.
    pub fn add_input_named(&mut self, name: &str) {
        let index = self.block.and_then(|b| self.blocks[b].find_input(name));
        self.compile_input(index);
    }

    fn compile_input(&mut self, input_index: Option<usize>) {
        let Some(input_index) = input_index else {
            self.add_instruction(Opcode::Null);
            return;
        };
        let block_index = self.block.expect("no current block");
        let (kind, value_block) = {
            let input = &self.blocks[block_index].inputs[input_index];
            (input.kind, input.value_block)
        };
        match kind {
            InputKind::Shadow => self.compile_input_value(block_index, input_index),
            InputKind::NoShadow | InputKind::ObscuredShadow => match value_block {
                Some(reporter) => self.compile_reporter(reporter),
                None => self.compile_input_value(block_index, input_index),
            },
        }
    }

    fn compile_reporter(&mut self, index: usize) {
        let previous = self.block;
        self.block = Some(index);
        match self.blocks[index].compile_function {
            Some(f) => f(self),
            None => {
                warn!("unsupported reporter block: {}", self.blocks[index].opcode);
                self.add_instruction(Opcode::Null);
            }
        }
        self.block = previous;
    }

    fn compile_input_value(&mut self, block_index: usize, input_index: usize) {
        let value = self.blocks[block_index].inputs[input_index]
            .primary_value
            .clone();
        match value {
            InputValue::Literal(literal) => {
                let index = self.constant_index(Some((block_index, input_index)), literal);
                self.add_instruction_arg(Opcode::Const, index);
            }
            InputValue::Variable { resolved, name, .. } => match resolved {
                Some((target, variable)) => {
                    let index = self.variable_index(target, variable);
                    self.add_instruction_arg(Opcode::ReadVar, index);
                }
                None => {
                    warn!("unresolved variable '{name}' in input");
                    self.add_instruction(Opcode::Null);
                }
            },
            InputValue::List { resolved, name, .. } => match resolved {
                Some((target, list)) => {
                    let index = self.list_index(target, list);
                    self.add_instruction_arg(Opcode::ReadList, index);
                }
                None => {
                    warn!("unresolved list '{name}' in input");
                    self.add_instruction(Opcode::Null);
                }
            },
            InputValue::Broadcast { resolved, name, .. } => match resolved {
                Some(broadcast) => {
                    let index = self.add_constant(Value::Integer(broadcast as i64));
                    self.add_instruction_arg(Opcode::Const, index);
                }
                None => {
                    warn!("unresolved broadcast '{name}' in input");
                    self.add_instruction(Opcode::Null);
                }
            },
        }
    }

    /// The reporter block plugged into the input, if any.
    pub fn input_block(&self, id: i32) -> Option<usize> {
        self.block
            .and_then(|b| self.blocks[b].input_by_id(id))
            .and_then(|(_, input)| input.value_block)
    }

    /// The selected value of a static dropdown menu in the given input.
    /// Returns None when a reporter obscures the menu.
    pub fn dropdown_value(&self, id: i32) -> Option<Value> {
        let menu = self.input_block(id)?;
        let menu = &self.blocks[menu];
        if !menu.shadow {
            return None;
        }
        menu.fields.first().map(|field| field.value.clone())
    }

    pub fn field(&self, id: i32) -> Option<&crate::input::Field> {
        self.block.and_then(|b| self.blocks[b].field_by_id(id))
    }

    /// Enters a substack (loop body or if arm). A second substack holds the
    /// else arm.
    pub fn move_to_substack(&mut self, substack: Option<usize>, kind: SubstackKind) {
        self.move_to_substack2(substack, None, kind);
    }

    pub fn move_to_substack2(
        &mut self,
        substack: Option<usize>,
        second: Option<usize>,
        kind: SubstackKind,
    ) {
        self.substacks.push(Substack {
            control_block: self.block,
            second,
            kind,
            atomic: self.atomic,
        });
        self.atomic = true;
        self.block = substack;
        if self.block.is_none() {
            self.substack_end();
        }
    }

    /// Marks the loop being opened as screen-refreshing: its iterations end
    /// with a BREAK_ATOMIC unless the script is warped.
    pub fn break_atomic_script(&mut self) {
        self.atomic = false;
    }

    /// Makes the current script run without screen refresh.
    pub fn warp(&mut self) {
        self.warp = true;
        self.add_instruction(Opcode::Warp);
    }

    /// Appends a constant that is not tied to an input slot.
    pub fn add_constant(&mut self, value: Value) -> u32 {
        self.constant_index(None, value)
    }

    fn constant_index(&mut self, key: Option<(usize, usize)>, value: Value) -> u32 {
        if key.is_some() {
            if let Some(position) = self.const_keys.iter().position(|k| *k == key) {
                return position as u32;
            }
        }
        self.const_values.push(value);
        self.const_keys.push(key);
        (self.const_values.len() - 1) as u32
    }

    pub fn variable_index(&mut self, target: usize, variable: usize) -> u32 {
        let entry = (target, variable);
        if let Some(position) = self.variables.iter().position(|v| *v == entry) {
            return position as u32;
        }
        self.variables.push(entry);
        (self.variables.len() - 1) as u32
    }

    pub fn list_index(&mut self, target: usize, list: usize) -> u32 {
        let entry = (target, list);
        if let Some(position) = self.lists.iter().position(|l| *l == entry) {
            return position as u32;
        }
        self.lists.push(entry);
        (self.lists.len() - 1) as u32
    }

    pub fn procedure_index(&mut self, proccode: &str) -> u32 {
        if let Some(position) = self.procedures.iter().position(|p| p == proccode) {
            return position as u32;
        }
        self.procedures.push(proccode.to_owned());
        (self.procedures.len() - 1) as u32
    }

    pub fn procedure_arg_index(&self, proccode: &str, argument_name: &str) -> Option<usize> {
        match self.procedure_args.get(proccode) {
            None => {
                warn!("could not find custom block '{proccode}'");
                None
            }
            Some(args) => {
                let index = args.iter().position(|arg| arg == argument_name);
                if index.is_none() {
                    warn!("could not find argument '{argument_name}' in custom block '{proccode}'");
                }
                index
            }
        }
    }

    pub fn procedure_prototype(&self) -> Option<&BlockPrototype> {
        self.procedure_prototype.as_ref()
    }

    pub fn set_procedure_prototype(&mut self, prototype: Option<BlockPrototype>) {
        self.procedure_prototype = prototype;
    }

    pub fn find_broadcast(&self, name: &str) -> Option<usize> {
        self.broadcasts
            .iter()
            .position(|b| crate::value::strings_equal(&b.name, name))
    }

    pub fn const_values(&self) -> &[Value] {
        &self.const_values
    }

    pub fn variables(&self) -> &[(usize, usize)] {
        &self.variables
    }

    pub fn lists(&self) -> &[(usize, usize)] {
        &self.lists
    }

    pub fn procedures(&self) -> &[String] {
        &self.procedures
    }

    /// Consumes the compiler into the shared per-target program.
    pub fn into_program(self, target: usize) -> Program {
        let procedure_offsets = self
            .procedures
            .iter()
            .map(|p| self.procedure_entries.get(p).copied().unwrap_or(usize::MAX))
            .collect();
        Program {
            target,
            const_values: self.const_values,
            variables: self.variables,
            lists: self.lists,
            procedures: self.procedures,
            procedure_offsets,
            procedure_code: self.procedure_code,
        }
    }
}
