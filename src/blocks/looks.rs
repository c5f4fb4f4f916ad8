use crate::compiler::Compiler;
use crate::engine::{reinsert_sprite, sprite_count, Engine};
use crate::section::BlockSection;
use crate::value::{is_valid_number, Value};
use crate::vm::{Opcode, Vm};

pub struct LooksBlocks;

pub const CHANGE: i32 = 0;
pub const SIZE: i32 = 1;
pub const COSTUME: i32 = 2;
pub const VALUE: i32 = 3;
pub const NUM: i32 = 4;

pub const EFFECT: i32 = 0;
pub const NUMBER_NAME: i32 = 1;
pub const FRONT_BACK: i32 = 2;
pub const FORWARD_BACKWARD: i32 = 3;

impl BlockSection for LooksBlocks {
    fn name(&self) -> &'static str {
        "Looks"
    }

    fn register_blocks(&self, engine: &mut Engine) {
        let name = self.name();
        engine.add_compile_function(name, "looks_show", compile_show);
        engine.add_compile_function(name, "looks_hide", compile_hide);
        engine.add_compile_function(name, "looks_changesizeby", compile_change_size_by);
        engine.add_compile_function(name, "looks_setsizeto", compile_set_size_to);
        engine.add_compile_function(name, "looks_size", compile_size);
        engine.add_compile_function(name, "looks_switchcostumeto", compile_switch_costume_to);
        engine.add_compile_function(name, "looks_nextcostume", compile_next_costume);
        engine.add_compile_function(name, "looks_costumenumbername", compile_costume_number_name);
        engine.add_compile_function(name, "looks_changeeffectby", compile_change_effect_by);
        engine.add_compile_function(name, "looks_seteffectto", compile_set_effect_to);
        engine.add_compile_function(name, "looks_cleargraphiceffects", compile_clear_graphic_effects);
        engine.add_compile_function(name, "looks_gotofrontback", compile_go_to_front_back);
        engine.add_compile_function(
            name,
            "looks_goforwardbackwardlayers",
            compile_go_forward_backward_layers,
        );

        engine.add_input(name, "CHANGE", CHANGE);
        engine.add_input(name, "SIZE", SIZE);
        engine.add_input(name, "COSTUME", COSTUME);
        engine.add_input(name, "VALUE", VALUE);
        engine.add_input(name, "NUM", NUM);

        engine.add_field(name, "EFFECT", EFFECT);
        engine.add_field(name, "NUMBER_NAME", NUMBER_NAME);
        engine.add_field(name, "FRONT_BACK", FRONT_BACK);
        engine.add_field(name, "FORWARD_BACKWARD", FORWARD_BACKWARD);
    }
}

pub fn compile_show(compiler: &mut Compiler) {
    compiler.add_function_call(show);
}

pub fn compile_hide(compiler: &mut Compiler) {
    compiler.add_function_call(hide);
}

pub fn compile_change_size_by(compiler: &mut Compiler) {
    compiler.add_input(CHANGE);
    compiler.add_function_call(change_size_by);
}

pub fn compile_set_size_to(compiler: &mut Compiler) {
    compiler.add_input(SIZE);
    compiler.add_function_call(set_size_to);
}

pub fn compile_size(compiler: &mut Compiler) {
    compiler.add_function_call(size);
}

pub fn compile_switch_costume_to(compiler: &mut Compiler) {
    match compiler.dropdown_value(COSTUME) {
        Some(value) => {
            let index = compiler.add_constant(value);
            compiler.add_instruction_arg(Opcode::Const, index);
        }
        None => compiler.add_input(COSTUME),
    }
    compiler.add_function_call(switch_costume_to);
}

pub fn compile_next_costume(compiler: &mut Compiler) {
    compiler.add_function_call(next_costume);
}

pub fn compile_costume_number_name(compiler: &mut Compiler) {
    let which = compiler
        .field(NUMBER_NAME)
        .map(|f| f.value.clone())
        .unwrap_or_else(|| Value::from("number"));
    let index = compiler.add_constant(which);
    compiler.add_instruction_arg(Opcode::Const, index);
    compiler.add_function_call(costume_number_name);
}

pub fn compile_change_effect_by(compiler: &mut Compiler) {
    let effect = effect_name(compiler);
    let index = compiler.add_constant(Value::String(effect));
    compiler.add_instruction_arg(Opcode::Const, index);
    compiler.add_input(VALUE);
    compiler.add_function_call(change_effect_by);
}

pub fn compile_set_effect_to(compiler: &mut Compiler) {
    let effect = effect_name(compiler);
    let index = compiler.add_constant(Value::String(effect));
    compiler.add_instruction_arg(Opcode::Const, index);
    compiler.add_input(VALUE);
    compiler.add_function_call(set_effect_to);
}

pub fn compile_clear_graphic_effects(compiler: &mut Compiler) {
    compiler.add_function_call(clear_graphic_effects);
}

pub fn compile_go_to_front_back(compiler: &mut Compiler) {
    let which = compiler
        .field(FRONT_BACK)
        .map(|f| f.value.to_string())
        .unwrap_or_default();
    if which == "back" {
        compiler.add_function_call(go_to_back);
    } else {
        compiler.add_function_call(go_to_front);
    }
}

pub fn compile_go_forward_backward_layers(compiler: &mut Compiler) {
    compiler.add_input(NUM);
    let which = compiler
        .field(FORWARD_BACKWARD)
        .map(|f| f.value.to_string())
        .unwrap_or_default();
    if which == "backward" {
        compiler.add_function_call(go_backward_layers);
    } else {
        compiler.add_function_call(go_forward_layers);
    }
}

fn effect_name(compiler: &Compiler) -> String {
    compiler
        .field(EFFECT)
        .map(|f| f.value.to_string().to_lowercase())
        .unwrap_or_default()
}

pub fn show(vm: &mut Vm) -> u32 {
    vm.target_mut().set_visible(true);
    vm.engine.request_redraw();
    0
}

pub fn hide(vm: &mut Vm) -> u32 {
    vm.target_mut().set_visible(false);
    vm.engine.request_redraw();
    0
}

pub fn change_size_by(vm: &mut Vm) -> u32 {
    let delta = vm.input(0, 1).to_f64();
    let size = vm.target().sprite().map(|s| s.size).unwrap_or(100.0);
    vm.target_mut().set_size(size + delta);
    vm.engine.request_redraw();
    1
}

pub fn set_size_to(vm: &mut Vm) -> u32 {
    let size = vm.input(0, 1).to_f64();
    vm.target_mut().set_size(size);
    vm.engine.request_redraw();
    1
}

pub fn size(vm: &mut Vm) -> u32 {
    let size = vm.target().sprite().map(|s| s.size).unwrap_or(100.0);
    vm.add_return_value(Value::from(size));
    0
}

/// Names take precedence; a numeric value is a 1-based index wrapped into
/// range. Costumes are read through the data source so clones resolve
/// against their root's table.
pub fn switch_costume_to(vm: &mut Vm) -> u32 {
    let which = vm.input(0, 1).clone();
    let source = vm.data_source();
    let count = vm.targets[source].costumes.len();
    if count == 0 {
        return 1;
    }
    let name = which.to_string();
    let index = match vm.targets[source].find_costume(&name) {
        Some(index) => Some(index),
        None => {
            if which.is_number() || is_valid_number(&name) {
                let index = which.to_f64().round() as i64 - 1;
                Some(index.rem_euclid(count as i64) as usize)
            } else {
                None
            }
        }
    };
    if let Some(index) = index {
        apply_costume(vm, index);
        vm.engine.request_redraw();
    }
    1
}

pub fn next_costume(vm: &mut Vm) -> u32 {
    let source = vm.data_source();
    let count = vm.targets[source].costumes.len();
    if count == 0 {
        return 0;
    }
    let current = vm.target().costume_index.unwrap_or(0);
    apply_costume(vm, (current + 1) % count);
    vm.engine.request_redraw();
    0
}

pub fn costume_number_name(vm: &mut Vm) -> u32 {
    let which = vm.input(0, 1).to_string();
    let source = vm.data_source();
    let current = vm.target().costume_index;
    let value = if which == "name" {
        current
            .and_then(|i| vm.targets[source].costumes.get(i))
            .map(|c| Value::String(c.name.clone()))
            .unwrap_or_default()
    } else {
        Value::Integer(current.map(|i| i as i64 + 1).unwrap_or(0))
    };
    vm.replace_return_value(value, 1);
    0
}

fn apply_costume(vm: &mut Vm, index: usize) {
    if vm.target().data_source.is_none() {
        vm.target_mut().set_costume_index(index);
        return;
    }
    // clones keep their own current costume over the shared table
    let source = vm.data_source();
    if index >= vm.targets[source].costumes.len() {
        return;
    }
    let target = vm.target_mut();
    target.costume_index = Some(index);
    if let Some(sprite) = target.sprite_mut() {
        if let Some(iface) = sprite.interface.as_mut() {
            iface.on_costume_changed(index);
        }
    }
}

pub fn change_effect_by(vm: &mut Vm) -> u32 {
    let effect = vm.input(0, 2).to_string();
    let delta = vm.input(1, 2).to_f64();
    let current = vm.target().graphics_effect(&effect);
    vm.target_mut().set_graphics_effect(&effect, current + delta);
    vm.engine.request_redraw();
    2
}

pub fn set_effect_to(vm: &mut Vm) -> u32 {
    let effect = vm.input(0, 2).to_string();
    let value = vm.input(1, 2).to_f64();
    vm.target_mut().set_graphics_effect(&effect, value);
    vm.engine.request_redraw();
    2
}

pub fn clear_graphic_effects(vm: &mut Vm) -> u32 {
    vm.target_mut().clear_graphics_effects();
    vm.engine.request_redraw();
    0
}

pub fn go_to_front(vm: &mut Vm) -> u32 {
    let count = sprite_count(vm.targets) as i32;
    let target = vm.target;
    reinsert_sprite(vm.targets, target, count);
    0
}

pub fn go_to_back(vm: &mut Vm) -> u32 {
    let target = vm.target;
    reinsert_sprite(vm.targets, target, 1);
    0
}

pub fn go_forward_layers(vm: &mut Vm) -> u32 {
    let layers = vm.input(0, 1).to_i64() as i32;
    let target = vm.target;
    let position = vm.targets[target].layer_order + layers;
    reinsert_sprite(vm.targets, target, position);
    1
}

pub fn go_backward_layers(vm: &mut Vm) -> u32 {
    let layers = vm.input(0, 1).to_i64() as i32;
    let target = vm.target;
    let position = vm.targets[target].layer_order - layers;
    reinsert_sprite(vm.targets, target, position);
    1
}
