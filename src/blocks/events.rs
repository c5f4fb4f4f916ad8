use crate::compiler::Compiler;
use crate::engine::Engine;
use crate::section::BlockSection;
use crate::value::strings_equal;
use crate::vm::Vm;

pub struct EventBlocks;

pub const BROADCAST_INPUT: i32 = 0;

impl BlockSection for EventBlocks {
    fn name(&self) -> &'static str {
        "Events"
    }

    fn register_blocks(&self, engine: &mut Engine) {
        let name = self.name();
        engine.add_hat_block(name, "event_whenflagclicked");
        engine.add_hat_block(name, "event_whenbroadcastreceived");
        engine.add_hat_block(name, "event_whenkeypressed");
        engine.add_compile_function(name, "event_broadcast", compile_broadcast);
        engine.add_input(name, "BROADCAST_INPUT", BROADCAST_INPUT);
    }
}

pub fn compile_broadcast(compiler: &mut Compiler) {
    compiler.add_input(BROADCAST_INPUT);
    compiler.add_function_call(broadcast);
}

/// The input is either a resolved broadcast index (static menu) or a
/// computed name.
pub fn broadcast(vm: &mut Vm) -> u32 {
    let which = vm.input(0, 1).clone();
    let index = if which.is_number() {
        let index = which.to_i64();
        (0..vm.broadcasts.len() as i64)
            .contains(&index)
            .then_some(index as usize)
    } else {
        let name = which.to_string();
        vm.broadcasts
            .iter()
            .position(|b| strings_equal(&b.name, &name))
    };
    if let Some(index) = index {
        vm.engine.broadcast(index);
    }
    1
}
