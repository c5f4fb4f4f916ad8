use std::collections::HashMap;

use derivative::Derivative;
use serde::Deserialize;

use crate::block::Block;
use crate::costume::{Costume, Sound};
use crate::data::{List, Variable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RotationStyle {
    #[serde(rename = "all around")]
    AllAround,
    #[serde(rename = "left-right")]
    LeftRight,
    #[serde(rename = "don't rotate")]
    DoNotRotate,
}

impl RotationStyle {
    pub fn parse(s: &str) -> Option<RotationStyle> {
        match s {
            "all around" => Some(RotationStyle::AllAround),
            "left-right" => Some(RotationStyle::LeftRight),
            "don't rotate" => Some(RotationStyle::DoNotRotate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RotationStyle::AllAround => "all around",
            RotationStyle::LeftRight => "left-right",
            RotationStyle::DoNotRotate => "don't rotate",
        }
    }
}

/// Renderer-facing callbacks, fired from the sprite setters. This is the
/// only coupling between the runtime core and the embedder's renderer.
pub trait SpriteInterface {
    fn on_visible_changed(&mut self, _visible: bool) {}
    fn on_x_changed(&mut self, _x: f64) {}
    fn on_y_changed(&mut self, _y: f64) {}
    fn on_size_changed(&mut self, _size: f64) {}
    fn on_direction_changed(&mut self, _direction: f64) {}
    fn on_rotation_style_changed(&mut self, _style: RotationStyle) {}
    fn on_costume_changed(&mut self, _index: usize) {}
    fn on_cloned(&mut self, _clone: usize) {}
}

#[derive(Debug, Clone, Default)]
pub struct StageDetails {
    pub tempo: f64,
    pub video_transparency: f64,
    pub video_state: String,
    pub text_to_speech_language: Option<String>,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct SpriteDetails {
    pub visible: bool,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub direction: f64,
    pub draggable: bool,
    pub rotation_style: RotationStyle,
    /// Graphics effect name -> value. Zero-valued entries are evicted on
    /// write, so absence means "no effect".
    pub effects: HashMap<String, f64>,
    pub clone_parent: Option<usize>,
    pub clone_root: Option<usize>,
    pub children: Vec<usize>,
    #[derivative(Debug = "ignore")]
    pub interface: Option<Box<dyn SpriteInterface>>,
}

impl Default for SpriteDetails {
    fn default() -> Self {
        SpriteDetails {
            visible: true,
            x: 0.0,
            y: 0.0,
            size: 100.0,
            direction: 90.0,
            draggable: false,
            rotation_style: RotationStyle::AllAround,
            effects: HashMap::new(),
            clone_parent: None,
            clone_root: None,
            children: Vec::new(),
            interface: None,
        }
    }
}

#[derive(Debug)]
pub enum TargetKind {
    Stage(StageDetails),
    Sprite(SpriteDetails),
}

/// A stage or sprite with its data tables. Clones keep `data_source`
/// pointing at their root so blocks, costumes and sounds are shared while
/// variables and lists stay private copies.
#[derive(Debug)]
pub struct Target {
    pub name: String,
    pub variables: Vec<Variable>,
    pub lists: Vec<List>,
    pub blocks: Vec<Block>,
    pub costumes: Vec<Costume>,
    pub sounds: Vec<Sound>,
    pub costume_index: Option<usize>,
    pub layer_order: i32,
    pub volume: f64,
    pub data_source: Option<usize>,
    pub kind: TargetKind,
    /// Cleared when a clone is deleted; dead slots stay in the arena so
    /// indices remain stable.
    pub alive: bool,
}

impl Target {
    pub fn new_stage() -> Self {
        Target::with_kind(TargetKind::Stage(StageDetails::default()))
    }

    pub fn new_sprite(name: impl Into<String>) -> Self {
        let mut target = Target::with_kind(TargetKind::Sprite(SpriteDetails::default()));
        target.name = name.into();
        target.layer_order = 1;
        target
    }

    fn with_kind(kind: TargetKind) -> Self {
        Target {
            name: String::new(),
            variables: Vec::new(),
            lists: Vec::new(),
            blocks: Vec::new(),
            costumes: Vec::new(),
            sounds: Vec::new(),
            costume_index: None,
            layer_order: 0,
            volume: 100.0,
            data_source: None,
            kind,
            alive: true,
        }
    }

    pub fn is_stage(&self) -> bool {
        matches!(self.kind, TargetKind::Stage(_))
    }

    pub fn is_clone(&self) -> bool {
        self.sprite()
            .map(|sprite| sprite.clone_parent.is_some())
            .unwrap_or(false)
    }

    pub fn sprite(&self) -> Option<&SpriteDetails> {
        match &self.kind {
            TargetKind::Sprite(sprite) => Some(sprite),
            TargetKind::Stage(_) => None,
        }
    }

    pub fn sprite_mut(&mut self) -> Option<&mut SpriteDetails> {
        match &mut self.kind {
            TargetKind::Sprite(sprite) => Some(sprite),
            TargetKind::Stage(_) => None,
        }
    }

    pub fn stage_details(&self) -> Option<&StageDetails> {
        match &self.kind {
            TargetKind::Stage(stage) => Some(stage),
            TargetKind::Sprite(_) => None,
        }
    }

    /// Adds a variable, returning its index. An existing variable with the
    /// same id keeps its slot.
    pub fn add_variable(&mut self, variable: Variable) -> usize {
        if let Some(index) = self.find_variable_by_id(&variable.id) {
            return index;
        }
        self.variables.push(variable);
        self.variables.len() - 1
    }

    pub fn find_variable(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }

    pub fn find_variable_by_id(&self, id: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.id == id)
    }

    pub fn add_list(&mut self, list: List) -> usize {
        if let Some(index) = self.find_list_by_id(&list.id) {
            return index;
        }
        self.lists.push(list);
        self.lists.len() - 1
    }

    pub fn find_list(&self, name: &str) -> Option<usize> {
        self.lists.iter().position(|l| l.name == name)
    }

    pub fn find_list_by_id(&self, id: &str) -> Option<usize> {
        self.lists.iter().position(|l| l.id == id)
    }

    /// Adds a block, returning its index. Refused on clones (the block
    /// table belongs to the data source).
    pub fn add_block(&mut self, block: Block) -> Option<usize> {
        if self.data_source.is_some() {
            return None;
        }
        if let Some(index) = self.find_block(&block.id) {
            return Some(index);
        }
        self.blocks.push(block);
        Some(self.blocks.len() - 1)
    }

    pub fn find_block(&self, id: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    pub fn block_at(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn add_costume(&mut self, costume: Costume) -> Option<usize> {
        if self.data_source.is_some() {
            return None;
        }
        self.costumes.push(costume);
        if self.costume_index.is_none() {
            self.costume_index = Some(self.costumes.len() - 1);
        }
        Some(self.costumes.len() - 1)
    }

    pub fn find_costume(&self, name: &str) -> Option<usize> {
        self.costumes.iter().position(|c| c.name == name)
    }

    pub fn add_sound(&mut self, sound: Sound) -> Option<usize> {
        if self.data_source.is_some() {
            return None;
        }
        self.sounds.push(sound);
        Some(self.sounds.len() - 1)
    }

    pub fn find_sound(&self, name: &str) -> Option<usize> {
        self.sounds.iter().position(|s| s.name == name)
    }

    pub fn current_costume(&self) -> Option<&Costume> {
        self.costumes.get(self.costume_index?)
    }

    /// Switches the costume; out-of-range indices are ignored.
    pub fn set_costume_index(&mut self, index: usize) {
        if index >= self.costumes.len() {
            return;
        }
        self.costume_index = Some(index);
        if let Some(sprite) = self.sprite_mut() {
            if let Some(iface) = sprite.interface.as_mut() {
                iface.on_costume_changed(index);
            }
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        if let Some(sprite) = self.sprite_mut() {
            sprite.visible = visible;
            if let Some(iface) = sprite.interface.as_mut() {
                iface.on_visible_changed(visible);
            }
        }
    }

    pub fn set_x(&mut self, x: f64) {
        if let Some(sprite) = self.sprite_mut() {
            sprite.x = x;
            if let Some(iface) = sprite.interface.as_mut() {
                iface.on_x_changed(x);
            }
        }
    }

    pub fn set_y(&mut self, y: f64) {
        if let Some(sprite) = self.sprite_mut() {
            sprite.y = y;
            if let Some(iface) = sprite.interface.as_mut() {
                iface.on_y_changed(y);
            }
        }
    }

    pub fn set_size(&mut self, size: f64) {
        if let Some(sprite) = self.sprite_mut() {
            sprite.size = size;
            if let Some(iface) = sprite.interface.as_mut() {
                iface.on_size_changed(size);
            }
        }
    }

    pub fn set_direction(&mut self, direction: f64) {
        if let Some(sprite) = self.sprite_mut() {
            sprite.direction = wrap_direction(direction);
            let wrapped = sprite.direction;
            if let Some(iface) = sprite.interface.as_mut() {
                iface.on_direction_changed(wrapped);
            }
        }
    }

    pub fn set_rotation_style(&mut self, style: RotationStyle) {
        if let Some(sprite) = self.sprite_mut() {
            sprite.rotation_style = style;
            if let Some(iface) = sprite.interface.as_mut() {
                iface.on_rotation_style_changed(style);
            }
        }
    }

    pub fn set_draggable(&mut self, draggable: bool) {
        if let Some(sprite) = self.sprite_mut() {
            sprite.draggable = draggable;
        }
    }

    pub fn graphics_effect(&self, name: &str) -> f64 {
        self.sprite()
            .and_then(|sprite| sprite.effects.get(name).copied())
            .unwrap_or(0.0)
    }

    /// Writing zero removes the entry, so the effects map never holds
    /// zero-valued keys.
    pub fn set_graphics_effect(&mut self, name: &str, value: f64) {
        if let Some(sprite) = self.sprite_mut() {
            if value == 0.0 {
                sprite.effects.remove(name);
            } else {
                sprite.effects.insert(name.to_owned(), value);
            }
        }
    }

    pub fn clear_graphics_effects(&mut self) {
        if let Some(sprite) = self.sprite_mut() {
            sprite.effects.clear();
        }
    }
}

/// Canonicalises a direction into (-180, 180].
pub fn wrap_direction(direction: f64) -> f64 {
    let wrapped = direction.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}
