use log::warn;

use crate::compiler::Compiler;
use crate::engine::Engine;
use crate::section::BlockSection;
use crate::value::Value;
use crate::vm::{Opcode, Vm};

pub struct OperatorBlocks;

pub const NUM1: i32 = 0;
pub const NUM2: i32 = 1;
pub const OPERAND1: i32 = 2;
pub const OPERAND2: i32 = 3;
pub const OPERAND: i32 = 4;
pub const STRING1: i32 = 5;
pub const STRING2: i32 = 6;
pub const STRING: i32 = 7;
pub const LETTER: i32 = 8;
pub const NUM: i32 = 9;

pub const OPERATOR: i32 = 0;

impl BlockSection for OperatorBlocks {
    fn name(&self) -> &'static str {
        "Operators"
    }

    fn register_blocks(&self, engine: &mut Engine) {
        let name = self.name();
        engine.add_compile_function(name, "operator_add", compile_add);
        engine.add_compile_function(name, "operator_subtract", compile_subtract);
        engine.add_compile_function(name, "operator_multiply", compile_multiply);
        engine.add_compile_function(name, "operator_divide", compile_divide);
        engine.add_compile_function(name, "operator_mod", compile_mod);
        engine.add_compile_function(name, "operator_lt", compile_lt);
        engine.add_compile_function(name, "operator_equals", compile_equals);
        engine.add_compile_function(name, "operator_gt", compile_gt);
        engine.add_compile_function(name, "operator_and", compile_and);
        engine.add_compile_function(name, "operator_or", compile_or);
        engine.add_compile_function(name, "operator_not", compile_not);
        engine.add_compile_function(name, "operator_join", compile_join);
        engine.add_compile_function(name, "operator_letter_of", compile_letter_of);
        engine.add_compile_function(name, "operator_length", compile_length);
        engine.add_compile_function(name, "operator_contains", compile_contains);
        engine.add_compile_function(name, "operator_round", compile_round);
        engine.add_compile_function(name, "operator_mathop", compile_mathop);

        engine.add_input(name, "NUM1", NUM1);
        engine.add_input(name, "NUM2", NUM2);
        engine.add_input(name, "OPERAND1", OPERAND1);
        engine.add_input(name, "OPERAND2", OPERAND2);
        engine.add_input(name, "OPERAND", OPERAND);
        engine.add_input(name, "STRING1", STRING1);
        engine.add_input(name, "STRING2", STRING2);
        engine.add_input(name, "STRING", STRING);
        engine.add_input(name, "LETTER", LETTER);
        engine.add_input(name, "NUM", NUM);

        engine.add_field(name, "OPERATOR", OPERATOR);
    }
}

fn compile_binary_num(compiler: &mut Compiler, f: fn(&mut Vm) -> u32) {
    compiler.add_input(NUM1);
    compiler.add_input(NUM2);
    compiler.add_function_call(f);
}

fn compile_binary_operand(compiler: &mut Compiler, f: fn(&mut Vm) -> u32) {
    compiler.add_input(OPERAND1);
    compiler.add_input(OPERAND2);
    compiler.add_function_call(f);
}

pub fn compile_add(compiler: &mut Compiler) {
    compile_binary_num(compiler, add);
}

pub fn compile_subtract(compiler: &mut Compiler) {
    compile_binary_num(compiler, subtract);
}

pub fn compile_multiply(compiler: &mut Compiler) {
    compile_binary_num(compiler, multiply);
}

pub fn compile_divide(compiler: &mut Compiler) {
    compile_binary_num(compiler, divide);
}

pub fn compile_mod(compiler: &mut Compiler) {
    compile_binary_num(compiler, modulo);
}

pub fn compile_lt(compiler: &mut Compiler) {
    compile_binary_operand(compiler, less_than);
}

pub fn compile_equals(compiler: &mut Compiler) {
    compile_binary_operand(compiler, equals);
}

pub fn compile_gt(compiler: &mut Compiler) {
    compile_binary_operand(compiler, greater_than);
}

pub fn compile_and(compiler: &mut Compiler) {
    compile_binary_operand(compiler, and);
}

pub fn compile_or(compiler: &mut Compiler) {
    compile_binary_operand(compiler, or);
}

pub fn compile_not(compiler: &mut Compiler) {
    compiler.add_input(OPERAND);
    compiler.add_function_call(not);
}

pub fn compile_join(compiler: &mut Compiler) {
    compiler.add_input(STRING1);
    compiler.add_input(STRING2);
    compiler.add_function_call(join);
}

pub fn compile_letter_of(compiler: &mut Compiler) {
    compiler.add_input(LETTER);
    compiler.add_input(STRING);
    compiler.add_function_call(letter_of);
}

pub fn compile_length(compiler: &mut Compiler) {
    compiler.add_input(STRING);
    compiler.add_function_call(length);
}

pub fn compile_contains(compiler: &mut Compiler) {
    compiler.add_input(STRING1);
    compiler.add_input(STRING2);
    compiler.add_function_call(contains);
}

pub fn compile_round(compiler: &mut Compiler) {
    compiler.add_input(NUM);
    compiler.add_function_call(round);
}

pub fn compile_mathop(compiler: &mut Compiler) {
    compiler.add_input(NUM);
    let operator = compiler
        .field(OPERATOR)
        .map(|f| f.value.clone())
        .unwrap_or_default();
    let index = compiler.add_constant(operator);
    compiler.add_instruction_arg(Opcode::Const, index);
    compiler.add_function_call(math_op);
}

pub fn add(vm: &mut Vm) -> u32 {
    let result = vm.input(0, 2) + vm.input(1, 2);
    vm.replace_return_value(result, 2);
    1
}

pub fn subtract(vm: &mut Vm) -> u32 {
    let result = vm.input(0, 2) - vm.input(1, 2);
    vm.replace_return_value(result, 2);
    1
}

pub fn multiply(vm: &mut Vm) -> u32 {
    let result = vm.input(0, 2) * vm.input(1, 2);
    vm.replace_return_value(result, 2);
    1
}

pub fn divide(vm: &mut Vm) -> u32 {
    let result = vm.input(0, 2) / vm.input(1, 2);
    vm.replace_return_value(result, 2);
    1
}

pub fn modulo(vm: &mut Vm) -> u32 {
    let result = vm.input(0, 2) % vm.input(1, 2);
    vm.replace_return_value(result, 2);
    1
}

pub fn less_than(vm: &mut Vm) -> u32 {
    let result = vm.input(0, 2) < vm.input(1, 2);
    vm.replace_return_value(Value::Bool(result), 2);
    1
}

pub fn equals(vm: &mut Vm) -> u32 {
    let result = vm.input(0, 2) == vm.input(1, 2);
    vm.replace_return_value(Value::Bool(result), 2);
    1
}

pub fn greater_than(vm: &mut Vm) -> u32 {
    let result = vm.input(0, 2) > vm.input(1, 2);
    vm.replace_return_value(Value::Bool(result), 2);
    1
}

pub fn and(vm: &mut Vm) -> u32 {
    let result = vm.input(0, 2).to_bool() && vm.input(1, 2).to_bool();
    vm.replace_return_value(Value::Bool(result), 2);
    1
}

pub fn or(vm: &mut Vm) -> u32 {
    let result = vm.input(0, 2).to_bool() || vm.input(1, 2).to_bool();
    vm.replace_return_value(Value::Bool(result), 2);
    1
}

pub fn not(vm: &mut Vm) -> u32 {
    let result = !vm.input(0, 1).to_bool();
    vm.replace_return_value(Value::Bool(result), 1);
    0
}

pub fn join(vm: &mut Vm) -> u32 {
    let result = format!("{}{}", vm.input(0, 2), vm.input(1, 2));
    vm.replace_return_value(Value::String(result), 2);
    1
}

pub fn letter_of(vm: &mut Vm) -> u32 {
    let index = vm.input(0, 2).to_i64();
    let string = vm.input(1, 2).to_string();
    let letter = if index >= 1 {
        string
            .chars()
            .nth(index as usize - 1)
            .map(|c| c.to_string())
            .unwrap_or_default()
    } else {
        String::new()
    };
    vm.replace_return_value(Value::String(letter), 2);
    1
}

pub fn length(vm: &mut Vm) -> u32 {
    let length = vm.input(0, 1).to_string().chars().count();
    vm.replace_return_value(Value::Integer(length as i64), 1);
    0
}

pub fn contains(vm: &mut Vm) -> u32 {
    let haystack = vm.input(0, 2).to_string().to_lowercase();
    let needle = vm.input(1, 2).to_string().to_lowercase();
    vm.replace_return_value(Value::Bool(haystack.contains(&needle)), 2);
    1
}

/// Scratch rounds halves up (towards positive infinity).
pub fn round(vm: &mut Vm) -> u32 {
    let result = (vm.input(0, 1).to_f64() + 0.5).floor();
    vm.replace_return_value(Value::from(result), 1);
    0
}

pub fn math_op(vm: &mut Vm) -> u32 {
    let num = vm.input(0, 2).to_f64();
    let operator = vm.input(1, 2).to_string();
    let result = match operator.as_str() {
        "abs" => num.abs(),
        "floor" => num.floor(),
        "ceiling" => num.ceil(),
        "sqrt" => num.sqrt(),
        "sin" => num.to_radians().sin(),
        "cos" => num.to_radians().cos(),
        "tan" => num.to_radians().tan(),
        "asin" => num.asin().to_degrees(),
        "acos" => num.acos().to_degrees(),
        "atan" => num.atan().to_degrees(),
        "ln" => num.ln(),
        "log" => num.log10(),
        "e ^" => num.exp(),
        "10 ^" => 10f64.powf(num),
        other => {
            warn!("unknown math operator '{other}'");
            0.0
        }
    };
    vm.replace_return_value(Value::from(result), 2);
    1
}
