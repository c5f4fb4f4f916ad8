use crate::compiler::Compiler;
use crate::engine::Engine;
use crate::section::BlockSection;
use crate::target::RotationStyle;
use crate::value::Value;
use crate::vm::Vm;

pub struct MotionBlocks;

pub const X: i32 = 0;
pub const Y: i32 = 1;
pub const DX: i32 = 2;
pub const DY: i32 = 3;
pub const STEPS: i32 = 4;
pub const DEGREES: i32 = 5;
pub const DIRECTION: i32 = 6;

pub const STYLE: i32 = 0;

impl BlockSection for MotionBlocks {
    fn name(&self) -> &'static str {
        "Motion"
    }

    fn register_blocks(&self, engine: &mut Engine) {
        let name = self.name();
        engine.add_compile_function(name, "motion_gotoxy", compile_go_to_xy);
        engine.add_compile_function(name, "motion_setx", compile_set_x);
        engine.add_compile_function(name, "motion_changexby", compile_change_x_by);
        engine.add_compile_function(name, "motion_sety", compile_set_y);
        engine.add_compile_function(name, "motion_changeyby", compile_change_y_by);
        engine.add_compile_function(name, "motion_movesteps", compile_move_steps);
        engine.add_compile_function(name, "motion_turnright", compile_turn_right);
        engine.add_compile_function(name, "motion_turnleft", compile_turn_left);
        engine.add_compile_function(name, "motion_pointindirection", compile_point_in_direction);
        engine.add_compile_function(name, "motion_setrotationstyle", compile_set_rotation_style);
        engine.add_compile_function(name, "motion_xposition", compile_x_position);
        engine.add_compile_function(name, "motion_yposition", compile_y_position);
        engine.add_compile_function(name, "motion_direction", compile_direction);

        engine.add_input(name, "X", X);
        engine.add_input(name, "Y", Y);
        engine.add_input(name, "DX", DX);
        engine.add_input(name, "DY", DY);
        engine.add_input(name, "STEPS", STEPS);
        engine.add_input(name, "DEGREES", DEGREES);
        engine.add_input(name, "DIRECTION", DIRECTION);

        engine.add_field(name, "STYLE", STYLE);
    }
}

pub fn compile_go_to_xy(compiler: &mut Compiler) {
    compiler.add_input(X);
    compiler.add_input(Y);
    compiler.break_atomic_script();
    compiler.add_function_call(go_to_xy);
}

pub fn compile_set_x(compiler: &mut Compiler) {
    compiler.add_input(X);
    compiler.break_atomic_script();
    compiler.add_function_call(set_x);
}

pub fn compile_change_x_by(compiler: &mut Compiler) {
    compiler.add_input(DX);
    compiler.break_atomic_script();
    compiler.add_function_call(change_x_by);
}

pub fn compile_set_y(compiler: &mut Compiler) {
    compiler.add_input(Y);
    compiler.break_atomic_script();
    compiler.add_function_call(set_y);
}

pub fn compile_change_y_by(compiler: &mut Compiler) {
    compiler.add_input(DY);
    compiler.break_atomic_script();
    compiler.add_function_call(change_y_by);
}

pub fn compile_move_steps(compiler: &mut Compiler) {
    compiler.add_input(STEPS);
    compiler.break_atomic_script();
    compiler.add_function_call(move_steps);
}

pub fn compile_turn_right(compiler: &mut Compiler) {
    compiler.add_input(DEGREES);
    compiler.add_function_call(turn_right);
}

pub fn compile_turn_left(compiler: &mut Compiler) {
    compiler.add_input(DEGREES);
    compiler.add_function_call(turn_left);
}

pub fn compile_point_in_direction(compiler: &mut Compiler) {
    compiler.add_input(DIRECTION);
    compiler.add_function_call(point_in_direction);
}

pub fn compile_set_rotation_style(compiler: &mut Compiler) {
    let style = compiler
        .field(STYLE)
        .map(|f| f.value.clone())
        .unwrap_or_default();
    let index = compiler.add_constant(style);
    compiler.add_instruction_arg(crate::vm::Opcode::Const, index);
    compiler.add_function_call(set_rotation_style);
}

pub fn compile_x_position(compiler: &mut Compiler) {
    compiler.add_function_call(x_position);
}

pub fn compile_y_position(compiler: &mut Compiler) {
    compiler.add_function_call(y_position);
}

pub fn compile_direction(compiler: &mut Compiler) {
    compiler.add_function_call(direction);
}

/// Clamps a position into the stage rectangle when sprite fencing is on.
fn fenced(vm: &Vm, x: f64, y: f64) -> (f64, f64) {
    if !vm.engine.sprite_fencing {
        return (x, y);
    }
    let half_width = vm.engine.stage_width as f64 / 2.0;
    let half_height = vm.engine.stage_height as f64 / 2.0;
    (
        x.clamp(-half_width, half_width),
        y.clamp(-half_height, half_height),
    )
}

fn place(vm: &mut Vm, x: f64, y: f64) {
    let (x, y) = fenced(vm, x, y);
    vm.target_mut().set_x(x);
    vm.target_mut().set_y(y);
    vm.engine.request_redraw();
}

pub fn go_to_xy(vm: &mut Vm) -> u32 {
    let x = vm.input(0, 2).to_f64();
    let y = vm.input(1, 2).to_f64();
    place(vm, x, y);
    2
}

pub fn set_x(vm: &mut Vm) -> u32 {
    let x = vm.input(0, 1).to_f64();
    let y = vm.target().sprite().map(|s| s.y).unwrap_or(0.0);
    place(vm, x, y);
    1
}

pub fn change_x_by(vm: &mut Vm) -> u32 {
    let dx = vm.input(0, 1).to_f64();
    let (x, y) = vm
        .target()
        .sprite()
        .map(|s| (s.x, s.y))
        .unwrap_or((0.0, 0.0));
    place(vm, x + dx, y);
    1
}

pub fn set_y(vm: &mut Vm) -> u32 {
    let y = vm.input(0, 1).to_f64();
    let x = vm.target().sprite().map(|s| s.x).unwrap_or(0.0);
    place(vm, x, y);
    1
}

pub fn change_y_by(vm: &mut Vm) -> u32 {
    let dy = vm.input(0, 1).to_f64();
    let (x, y) = vm
        .target()
        .sprite()
        .map(|s| (s.x, s.y))
        .unwrap_or((0.0, 0.0));
    place(vm, x, y + dy);
    1
}

pub fn move_steps(vm: &mut Vm) -> u32 {
    let steps = vm.input(0, 1).to_f64();
    let Some((x, y, direction)) = vm.target().sprite().map(|s| (s.x, s.y, s.direction)) else {
        return 1;
    };
    let radians = direction.to_radians();
    place(vm, x + steps * radians.sin(), y + steps * radians.cos());
    1
}

pub fn turn_right(vm: &mut Vm) -> u32 {
    let degrees = vm.input(0, 1).to_f64();
    let direction = vm.target().sprite().map(|s| s.direction).unwrap_or(90.0);
    vm.target_mut().set_direction(direction + degrees);
    vm.engine.request_redraw();
    1
}

pub fn turn_left(vm: &mut Vm) -> u32 {
    let degrees = vm.input(0, 1).to_f64();
    let direction = vm.target().sprite().map(|s| s.direction).unwrap_or(90.0);
    vm.target_mut().set_direction(direction - degrees);
    vm.engine.request_redraw();
    1
}

pub fn point_in_direction(vm: &mut Vm) -> u32 {
    let direction = vm.input(0, 1).to_f64();
    vm.target_mut().set_direction(direction);
    vm.engine.request_redraw();
    1
}

pub fn set_rotation_style(vm: &mut Vm) -> u32 {
    let style = vm.input(0, 1).to_string();
    if let Some(style) = RotationStyle::parse(&style) {
        vm.target_mut().set_rotation_style(style);
    }
    1
}

pub fn x_position(vm: &mut Vm) -> u32 {
    let x = vm.target().sprite().map(|s| s.x).unwrap_or(0.0);
    vm.add_return_value(Value::from(x));
    0
}

pub fn y_position(vm: &mut Vm) -> u32 {
    let y = vm.target().sprite().map(|s| s.y).unwrap_or(0.0);
    vm.add_return_value(Value::from(y));
    0
}

pub fn direction(vm: &mut Vm) -> u32 {
    let direction = vm.target().sprite().map(|s| s.direction).unwrap_or(90.0);
    vm.add_return_value(Value::from(direction));
    0
}
