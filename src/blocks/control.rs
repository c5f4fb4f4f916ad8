use std::time::Duration;

use log::warn;

use crate::compiler::{Compiler, SubstackKind};
use crate::engine::Engine;
use crate::section::BlockSection;
use crate::vm::{Opcode, Vm};

pub struct ControlBlocks;

pub const TIMES: i32 = 0;
pub const CONDITION: i32 = 1;
pub const SUBSTACK: i32 = 2;
pub const SUBSTACK2: i32 = 3;
pub const DURATION: i32 = 4;
pub const CLONE_OPTION: i32 = 5;

pub const STOP_OPTION: i32 = 0;

pub const STOP_ALL: i32 = 0;
pub const STOP_THIS_SCRIPT: i32 = 1;
pub const STOP_OTHER_SCRIPTS: i32 = 2;

impl BlockSection for ControlBlocks {
    fn name(&self) -> &'static str {
        "Control"
    }

    fn register_blocks(&self, engine: &mut Engine) {
        let name = self.name();
        engine.add_compile_function(name, "control_forever", compile_forever);
        engine.add_compile_function(name, "control_repeat", compile_repeat);
        engine.add_compile_function(name, "control_repeat_until", compile_repeat_until);
        engine.add_compile_function(name, "control_wait_until", compile_wait_until);
        engine.add_compile_function(name, "control_if", compile_if);
        engine.add_compile_function(name, "control_if_else", compile_if_else);
        engine.add_compile_function(name, "control_wait", compile_wait);
        engine.add_compile_function(name, "control_stop", compile_stop);
        engine.add_compile_function(name, "control_create_clone_of", compile_create_clone_of);
        engine.add_compile_function(name, "control_delete_this_clone", compile_delete_this_clone);
        engine.add_hat_block(name, "control_start_as_clone");

        engine.add_input(name, "TIMES", TIMES);
        engine.add_input(name, "CONDITION", CONDITION);
        engine.add_input(name, "SUBSTACK", SUBSTACK);
        engine.add_input(name, "SUBSTACK2", SUBSTACK2);
        engine.add_input(name, "DURATION", DURATION);
        engine.add_input(name, "CLONE_OPTION", CLONE_OPTION);

        engine.add_field(name, "STOP_OPTION", STOP_OPTION);
        engine.add_field_value(name, "all", STOP_ALL);
        engine.add_field_value(name, "this script", STOP_THIS_SCRIPT);
        engine.add_field_value(name, "other scripts in sprite", STOP_OTHER_SCRIPTS);
        engine.add_field_value(name, "other scripts in stage", STOP_OTHER_SCRIPTS);
    }
}

pub fn compile_forever(compiler: &mut Compiler) {
    compiler.break_atomic_script();
    compiler.add_instruction(Opcode::ForeverLoop);
    let substack = compiler.input_block(SUBSTACK);
    compiler.move_to_substack(substack, SubstackKind::Loop);
}

pub fn compile_repeat(compiler: &mut Compiler) {
    compiler.add_input(TIMES);
    compiler.break_atomic_script();
    compiler.add_instruction(Opcode::RepeatLoop);
    let substack = compiler.input_block(SUBSTACK);
    compiler.move_to_substack(substack, SubstackKind::Loop);
}

pub fn compile_repeat_until(compiler: &mut Compiler) {
    compiler.add_instruction(Opcode::UntilLoop);
    compiler.add_input(CONDITION);
    compiler.break_atomic_script();
    compiler.add_instruction(Opcode::BeginUntilLoop);
    let substack = compiler.input_block(SUBSTACK);
    compiler.move_to_substack(substack, SubstackKind::Loop);
}

/// An until loop with an empty, yielding body.
pub fn compile_wait_until(compiler: &mut Compiler) {
    compiler.add_instruction(Opcode::UntilLoop);
    compiler.add_input(CONDITION);
    compiler.add_instruction(Opcode::BeginUntilLoop);
    compiler.add_instruction(Opcode::BreakAtomic);
    compiler.add_instruction(Opcode::LoopEnd);
}

pub fn compile_if(compiler: &mut Compiler) {
    compiler.add_input(CONDITION);
    compiler.add_instruction(Opcode::If);
    let substack = compiler.input_block(SUBSTACK);
    compiler.move_to_substack(substack, SubstackKind::IfStatement);
}

pub fn compile_if_else(compiler: &mut Compiler) {
    compiler.add_input(CONDITION);
    compiler.add_instruction(Opcode::If);
    let substack = compiler.input_block(SUBSTACK);
    let substack2 = compiler.input_block(SUBSTACK2);
    compiler.move_to_substack2(substack, substack2, SubstackKind::IfStatement);
}

pub fn compile_wait(compiler: &mut Compiler) {
    compiler.add_input(DURATION);
    compiler.add_function_call(wait);
}

pub fn compile_stop(compiler: &mut Compiler) {
    let option = compiler.field(STOP_OPTION).map(|f| f.special_value_id);
    match option {
        Some(STOP_ALL) => compiler.add_function_call(stop_all),
        Some(STOP_THIS_SCRIPT) => compiler.add_function_call(stop_this_script),
        Some(STOP_OTHER_SCRIPTS) => compiler.add_function_call(stop_other_scripts),
        _ => warn!("control_stop with unknown stop option"),
    }
}

pub fn compile_create_clone_of(compiler: &mut Compiler) {
    match compiler.dropdown_value(CLONE_OPTION) {
        Some(value) => {
            let index = compiler.add_constant(value);
            compiler.add_instruction_arg(Opcode::Const, index);
        }
        None => compiler.add_input(CLONE_OPTION),
    }
    compiler.add_function_call(create_clone);
}

pub fn compile_delete_this_clone(compiler: &mut Compiler) {
    compiler.add_function_call(delete_this_clone);
}

/// Samples the clock on every resume until the deadline passes; the
/// duration input stays on the stack while waiting.
pub fn wait(vm: &mut Vm) -> u32 {
    match vm.state.wait_deadline {
        None => {
            let seconds = vm.input(0, 1).to_f64().max(0.0);
            let deadline = vm.engine.clock.now() + Duration::from_secs_f64(seconds);
            vm.state.wait_deadline = Some(deadline);
            vm.suspend();
            0
        }
        Some(deadline) => {
            if vm.engine.clock.now() < deadline {
                vm.suspend();
                0
            } else {
                vm.state.wait_deadline = None;
                1
            }
        }
    }
}

pub fn stop_all(vm: &mut Vm) -> u32 {
    vm.engine.stop_all();
    vm.stop_script();
    0
}

pub fn stop_this_script(vm: &mut Vm) -> u32 {
    vm.stop_script();
    0
}

pub fn stop_other_scripts(vm: &mut Vm) -> u32 {
    let target = vm.target;
    let runner = vm.runner_id;
    vm.engine.stop_other_scripts_in_target(target, runner);
    0
}

pub fn create_clone(vm: &mut Vm) -> u32 {
    let which = vm.input(0, 1).to_string();
    let source = if which == "_myself_" {
        Some(vm.target)
    } else {
        vm.find_target_by_name(&which)
    };
    if let Some(source) = source {
        vm.create_clone_of(source);
    }
    1
}

pub fn delete_this_clone(vm: &mut Vm) -> u32 {
    vm.delete_this_clone();
    0
}
