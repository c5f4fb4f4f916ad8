use log::warn;

use crate::compiler::Compiler;
use crate::engine::Engine;
use crate::input::EntityRef;
use crate::section::BlockSection;
use crate::vm::Opcode;

pub struct DataBlocks;

pub const VALUE: i32 = 0;
pub const ITEM: i32 = 1;
pub const INDEX: i32 = 2;

pub const VARIABLE: i32 = 0;
pub const LIST: i32 = 1;

impl BlockSection for DataBlocks {
    fn name(&self) -> &'static str {
        "Data"
    }

    fn register_blocks(&self, engine: &mut Engine) {
        let name = self.name();
        engine.add_compile_function(name, "data_variable", compile_variable);
        engine.add_compile_function(name, "data_setvariableto", compile_set_variable);
        engine.add_compile_function(name, "data_changevariableby", compile_change_variable);
        engine.add_compile_function(name, "data_listcontents", compile_list_contents);
        engine.add_compile_function(name, "data_addtolist", compile_add_to_list);
        engine.add_compile_function(name, "data_deleteoflist", compile_delete_of_list);
        engine.add_compile_function(name, "data_deletealloflist", compile_delete_all_of_list);
        engine.add_compile_function(name, "data_insertatlist", compile_insert_at_list);
        engine.add_compile_function(name, "data_replaceitemoflist", compile_replace_item_of_list);
        engine.add_compile_function(name, "data_itemoflist", compile_item_of_list);
        engine.add_compile_function(name, "data_itemnumoflist", compile_item_num_of_list);
        engine.add_compile_function(name, "data_lengthoflist", compile_length_of_list);
        engine.add_compile_function(name, "data_listcontainsitem", compile_list_contains_item);

        engine.add_input(name, "VALUE", VALUE);
        engine.add_input(name, "ITEM", ITEM);
        engine.add_input(name, "INDEX", INDEX);

        engine.add_field(name, "VARIABLE", VARIABLE);
        engine.add_field(name, "LIST", LIST);
    }
}

fn variable_slot(compiler: &Compiler) -> Option<(usize, usize)> {
    match compiler.field(VARIABLE).and_then(|f| f.linked) {
        Some(EntityRef::Variable(target, index)) => Some((target, index)),
        _ => None,
    }
}

fn list_slot(compiler: &Compiler) -> Option<(usize, usize)> {
    match compiler.field(LIST).and_then(|f| f.linked) {
        Some(EntityRef::List(target, index)) => Some((target, index)),
        _ => None,
    }
}

pub fn compile_variable(compiler: &mut Compiler) {
    match variable_slot(compiler) {
        Some((target, index)) => {
            let pool = compiler.variable_index(target, index);
            compiler.add_instruction_arg(Opcode::ReadVar, pool);
        }
        None => {
            warn!("variable reporter without a resolved variable");
            compiler.add_instruction(Opcode::Null);
        }
    }
}

pub fn compile_set_variable(compiler: &mut Compiler) {
    match variable_slot(compiler) {
        Some((target, index)) => {
            compiler.add_input(VALUE);
            let pool = compiler.variable_index(target, index);
            compiler.add_instruction_arg(Opcode::SetVar, pool);
        }
        None => warn!("set variable without a resolved variable"),
    }
}

pub fn compile_change_variable(compiler: &mut Compiler) {
    match variable_slot(compiler) {
        Some((target, index)) => {
            compiler.add_input(VALUE);
            let pool = compiler.variable_index(target, index);
            compiler.add_instruction_arg(Opcode::ChangeVar, pool);
        }
        None => warn!("change variable without a resolved variable"),
    }
}

pub fn compile_list_contents(compiler: &mut Compiler) {
    match list_slot(compiler) {
        Some((target, index)) => {
            let pool = compiler.list_index(target, index);
            compiler.add_instruction_arg(Opcode::ReadList, pool);
        }
        None => {
            warn!("list reporter without a resolved list");
            compiler.add_instruction(Opcode::Null);
        }
    }
}

fn compile_list_op(compiler: &mut Compiler, inputs: &[i32], op: Opcode) {
    let reporter = matches!(
        op,
        Opcode::ListGetItem | Opcode::ListIndexOf | Opcode::ListLength | Opcode::ListContains
    );
    match list_slot(compiler) {
        Some((target, index)) => {
            for &input in inputs {
                compiler.add_input(input);
            }
            let pool = compiler.list_index(target, index);
            compiler.add_instruction_arg(op, pool);
        }
        None => {
            warn!("list block without a resolved list");
            if reporter {
                compiler.add_instruction(Opcode::Null);
            }
        }
    }
}

pub fn compile_add_to_list(compiler: &mut Compiler) {
    compile_list_op(compiler, &[ITEM], Opcode::ListAppend);
}

pub fn compile_delete_of_list(compiler: &mut Compiler) {
    compile_list_op(compiler, &[INDEX], Opcode::ListDel);
}

pub fn compile_delete_all_of_list(compiler: &mut Compiler) {
    compile_list_op(compiler, &[], Opcode::ListDelAll);
}

pub fn compile_insert_at_list(compiler: &mut Compiler) {
    compile_list_op(compiler, &[INDEX, ITEM], Opcode::ListInsert);
}

pub fn compile_replace_item_of_list(compiler: &mut Compiler) {
    compile_list_op(compiler, &[INDEX, ITEM], Opcode::ListReplace);
}

pub fn compile_item_of_list(compiler: &mut Compiler) {
    compile_list_op(compiler, &[INDEX], Opcode::ListGetItem);
}

pub fn compile_item_num_of_list(compiler: &mut Compiler) {
    compile_list_op(compiler, &[ITEM], Opcode::ListIndexOf);
}

pub fn compile_length_of_list(compiler: &mut Compiler) {
    compile_list_op(compiler, &[], Opcode::ListLength);
}

pub fn compile_list_contains_item(compiler: &mut Compiler) {
    compile_list_op(compiler, &[ITEM], Opcode::ListContains);
}
