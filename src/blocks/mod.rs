//! The standard block sections. Each section registers its compile
//! functions and numeric input/field ids against the engine; the runtime
//! primitives live next to them.

pub mod control;
pub mod custom;
pub mod data;
pub mod events;
pub mod looks;
pub mod motion;
pub mod operators;

use crate::engine::Engine;

pub fn register_default_sections(engine: &mut Engine) {
    engine.register_section(Box::new(events::EventBlocks));
    engine.register_section(Box::new(control::ControlBlocks));
    engine.register_section(Box::new(motion::MotionBlocks));
    engine.register_section(Box::new(looks::LooksBlocks));
    engine.register_section(Box::new(operators::OperatorBlocks));
    engine.register_section(Box::new(data::DataBlocks));
    engine.register_section(Box::new(custom::CustomBlocks));
}
