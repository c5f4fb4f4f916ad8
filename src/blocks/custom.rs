use log::warn;

use crate::compiler::Compiler;
use crate::engine::Engine;
use crate::section::BlockSection;
use crate::value::strings_equal;
use crate::vm::Opcode;

pub struct CustomBlocks;

pub const VALUE: i32 = 0;

impl BlockSection for CustomBlocks {
    fn name(&self) -> &'static str {
        "Custom blocks"
    }

    fn register_blocks(&self, engine: &mut Engine) {
        let name = self.name();
        engine.add_compile_function(name, "procedures_definition", compile_definition);
        engine.add_compile_function(name, "procedures_prototype", compile_prototype);
        engine.add_compile_function(name, "procedures_call", compile_call);
        engine.add_compile_function(
            name,
            "argument_reporter_string_number",
            compile_argument_reporter,
        );
        engine.add_compile_function(name, "argument_reporter_boolean", compile_argument_reporter);

        engine.add_field(name, "VALUE", VALUE);
    }
}

/// The definition root marks the procedure entry; a warp prototype makes
/// the whole body run without screen refresh.
pub fn compile_definition(compiler: &mut Compiler) {
    compiler.add_instruction(Opcode::DefProcedure);
    let prototype = compiler
        .block()
        .find_input("custom_block")
        .and_then(|i| compiler.block().inputs[i].value_block)
        .and_then(|p| compiler.block_at(p).mutation.clone());
    match prototype {
        Some(prototype) => {
            if prototype.warp {
                compiler.warp();
            }
            compiler.set_procedure_prototype(Some(prototype));
        }
        None => warn!("procedure definition without a prototype"),
    }
}

pub fn compile_prototype(_: &mut Compiler) {}

/// Collects arguments into the call frame, then dispatches. The call-site
/// inputs are keyed by argument id.
pub fn compile_call(compiler: &mut Compiler) {
    let Some(mutation) = compiler.block().mutation.clone() else {
        warn!("procedure call without mutation data");
        return;
    };
    if !compiler.has_procedure(&mutation.proccode) {
        warn!("could not find custom block '{}'", mutation.proccode);
        return;
    }
    compiler.add_instruction(Opcode::InitProcedure);
    for argument_id in &mutation.argument_ids {
        compiler.add_input_named(argument_id);
        compiler.add_instruction(Opcode::AddArg);
    }
    let index = compiler.procedure_index(&mutation.proccode);
    compiler.add_instruction_arg(Opcode::CallProcedure, index);
}

pub fn compile_argument_reporter(compiler: &mut Compiler) {
    let name = compiler
        .field(VALUE)
        .map(|f| f.value.to_string())
        .unwrap_or_default();
    let index = compiler.procedure_prototype().and_then(|prototype| {
        prototype
            .argument_names
            .iter()
            .position(|arg| strings_equal(arg, &name))
    });
    match index {
        Some(index) => compiler.add_instruction_arg(Opcode::ReadArg, index as u32),
        None => {
            if compiler.procedure_prototype().is_some() {
                warn!("could not find argument '{name}'");
            }
            compiler.add_instruction(Opcode::Null);
        }
    }
}
