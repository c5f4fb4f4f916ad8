use std::collections::BTreeMap;

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

use crate::block::{Block, BlockPrototype};
use crate::costume::{Costume, Sound};
use crate::data::{Broadcast, List, Variable};
use crate::input::{Field, Input, InputKind, InputValue};
use crate::target::{RotationStyle, Target, TargetKind};
use crate::value::Value;

#[derive(Debug, Deserialize)]
pub struct JsonProject {
    pub targets: Vec<JsonTarget>,
    #[serde(default)]
    pub extensions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonTarget {
    #[serde(default)]
    pub is_stage: bool,
    pub name: String,
    #[serde(default)]
    pub variables: BTreeMap<String, JsonVariable>,
    #[serde(default)]
    pub lists: BTreeMap<String, JsonList>,
    #[serde(default)]
    pub broadcasts: BTreeMap<String, String>,
    #[serde(default)]
    pub blocks: BTreeMap<String, JsonBlockEntry>,
    #[serde(default)]
    pub current_costume: i64,
    #[serde(default)]
    pub costumes: Vec<Costume>,
    #[serde(default)]
    pub sounds: Vec<Sound>,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub layer_order: i32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "default_size")]
    pub size: f64,
    #[serde(default = "default_direction")]
    pub direction: f64,
    #[serde(default)]
    pub draggable: bool,
    #[serde(default = "default_rotation_style")]
    pub rotation_style: String,
    #[serde(default)]
    pub tempo: f64,
    #[serde(default)]
    pub video_transparency: f64,
    #[serde(default)]
    pub video_state: Option<String>,
    #[serde(default)]
    pub text_to_speech_language: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_volume() -> f64 {
    100.0
}

fn default_size() -> f64 {
    100.0
}

fn default_direction() -> f64 {
    90.0
}

fn default_rotation_style() -> String {
    "all around".to_owned()
}

/// `[name, value]`, with an optional cloud flag we ignore.
#[derive(Debug)]
pub struct JsonVariable {
    pub name: String,
    pub value: Value,
}

impl<'de> Deserialize<'de> for JsonVariable {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let parts = Vec::<JsonValue>::deserialize(de)?;
        Ok(JsonVariable {
            name: json_string(parts.first()),
            value: value_from_json(parts.get(1)),
        })
    }
}

/// `[name, [items...]]`.
#[derive(Debug)]
pub struct JsonList {
    pub name: String,
    pub items: Vec<Value>,
}

impl<'de> Deserialize<'de> for JsonList {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let parts = Vec::<JsonValue>::deserialize(de)?;
        let items = match parts.get(1) {
            Some(JsonValue::Array(items)) => {
                items.iter().map(|item| value_from_json(Some(item))).collect()
            }
            _ => Vec::new(),
        };
        Ok(JsonList {
            name: json_string(parts.first()),
            items,
        })
    }
}

/// A block entry is either a real block object or the bare array form used
/// for variable/list reporters dragged to the top level.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum JsonBlockEntry {
    Block(JsonBlock),
    TopLevelReporter(Vec<JsonValue>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonBlock {
    pub opcode: String,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, JsonInput>,
    #[serde(default)]
    pub fields: BTreeMap<String, JsonField>,
    #[serde(default)]
    pub shadow: bool,
    #[serde(default)]
    pub top_level: bool,
    #[serde(default)]
    pub mutation: Option<JsonMutation>,
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct JsonInput(pub Vec<JsonValue>);

#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct JsonField(pub Vec<JsonValue>);

#[derive(Debug, Deserialize)]
pub struct JsonMutation {
    #[serde(default)]
    pub proccode: String,
    #[serde(default, deserialize_with = "parse_embedded_json")]
    pub argumentids: Vec<String>,
    #[serde(default, deserialize_with = "parse_embedded_json")]
    pub argumentnames: Vec<String>,
    #[serde(default, deserialize_with = "parse_loose_bool")]
    pub warp: bool,
}

/// Mutation lists come as JSON arrays embedded in strings.
fn parse_embedded_json<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let raw = String::deserialize(de)?;
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}

/// `warp` is sometimes a bool, sometimes "true"/"false".
fn parse_loose_bool<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Bool(bool),
        String(String),
    }
    Ok(match Loose::deserialize(de)? {
        Loose::Bool(b) => b,
        Loose::String(s) => s == "true",
    })
}

fn json_string(value: Option<&JsonValue>) -> String {
    match value {
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn value_from_json(value: Option<&JsonValue>) -> Value {
    match value {
        Some(JsonValue::Bool(b)) => Value::Bool(*b),
        Some(JsonValue::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::from(n.as_f64().unwrap_or(0.0))
            }
        }
        Some(JsonValue::String(s)) => Value::String(s.clone()),
        _ => Value::default(),
    }
}

enum InputElement {
    BlockId(String),
    Value(InputValue),
    Empty,
}

/// One element of an input array: a block id, or a `[type, value, (id)]`
/// literal descriptor.
fn input_element(value: Option<&JsonValue>) -> InputElement {
    match value {
        Some(JsonValue::String(id)) => InputElement::BlockId(id.clone()),
        Some(JsonValue::Array(parts)) => {
            let code = parts
                .first()
                .and_then(|c| c.as_i64())
                .unwrap_or(0);
            match code {
                4..=10 => InputElement::Value(InputValue::Literal(value_from_json(parts.get(1)))),
                11 => InputElement::Value(InputValue::Broadcast {
                    name: json_string(parts.get(1)),
                    id: json_string(parts.get(2)),
                    resolved: None,
                }),
                12 => InputElement::Value(InputValue::Variable {
                    name: json_string(parts.get(1)),
                    id: json_string(parts.get(2)),
                    resolved: None,
                }),
                13 => InputElement::Value(InputValue::List {
                    name: json_string(parts.get(1)),
                    id: json_string(parts.get(2)),
                    resolved: None,
                }),
                other => {
                    warn!("unknown input value type {other}");
                    InputElement::Empty
                }
            }
        }
        _ => InputElement::Empty,
    }
}

fn convert_input(name: &str, parts: &[JsonValue]) -> Input {
    let kind = match parts.first().and_then(|k| k.as_i64()) {
        Some(2) => InputKind::NoShadow,
        Some(3) => InputKind::ObscuredShadow,
        _ => InputKind::Shadow,
    };
    let mut input = Input::new(name, kind);
    match input_element(parts.get(1)) {
        InputElement::BlockId(id) => input.value_block_id = Some(id),
        InputElement::Value(value) => input.primary_value = value,
        InputElement::Empty => {}
    }
    if let InputElement::Value(value) = input_element(parts.get(2)) {
        input.secondary_value = value;
    }
    input
}

fn convert_field(name: &str, parts: &[JsonValue]) -> Field {
    let mut field = Field::new(name, value_from_json(parts.first()));
    field.value_id = match parts.get(1) {
        Some(JsonValue::String(id)) => Some(id.clone()),
        _ => None,
    };
    field
}

fn convert_block(id: &str, json: JsonBlock) -> Block {
    let mut block = Block::new(id, json.opcode);
    block.next_id = json.next;
    block.parent_id = json.parent;
    block.shadow = json.shadow;
    block.top_level = json.top_level;
    for (name, JsonInput(parts)) in &json.inputs {
        block.add_input(convert_input(name, parts));
    }
    for (name, JsonField(parts)) in &json.fields {
        block.add_field(convert_field(name, parts));
    }
    if let Some(mutation) = json.mutation {
        block.mutation = Some(BlockPrototype {
            proccode: mutation.proccode,
            argument_ids: mutation.argumentids,
            argument_names: mutation.argumentnames,
            warp: mutation.warp,
        });
    }
    block
}

/// `[12, name, id, x, y]` (variable) or `[13, name, id, x, y]` (list).
fn convert_top_level_reporter(id: &str, parts: &[JsonValue]) -> Option<Block> {
    let code = parts.first().and_then(|c| c.as_i64())?;
    let (opcode, field_name) = match code {
        12 => ("data_variable", "VARIABLE"),
        13 => ("data_listcontents", "LIST"),
        other => {
            warn!("unknown top level reporter type {other}");
            return None;
        }
    };
    let mut block = Block::new(id, opcode);
    block.top_level = true;
    block.is_top_level_reporter = true;
    let mut field = Field::new(field_name, Value::String(json_string(parts.get(1))));
    field.value_id = match parts.get(2) {
        Some(JsonValue::String(entity)) => Some(entity.clone()),
        _ => None,
    };
    block.add_field(field);
    Some(block)
}

/// Converts the parsed project model into engine entities.
pub fn build_project(json: JsonProject) -> (Vec<Target>, Vec<Broadcast>) {
    let mut broadcasts: Vec<Broadcast> = Vec::new();
    for target in &json.targets {
        for (id, name) in &target.broadcasts {
            if !broadcasts.iter().any(|b| b.id == *id) {
                broadcasts.push(Broadcast::new(id.clone(), name.clone()));
            }
        }
    }

    let mut targets = Vec::new();
    for json_target in json.targets {
        let mut target = if json_target.is_stage {
            Target::new_stage()
        } else {
            Target::new_sprite(json_target.name.clone())
        };
        target.name = json_target.name;
        target.layer_order = json_target.layer_order;
        target.volume = json_target.volume;

        if let TargetKind::Stage(stage) = &mut target.kind {
            stage.tempo = json_target.tempo;
            stage.video_transparency = json_target.video_transparency;
            stage.video_state = json_target.video_state.unwrap_or_default();
            stage.text_to_speech_language = json_target.text_to_speech_language;
        }

        for (id, variable) in json_target.variables {
            target.add_variable(Variable::new(id, variable.name, variable.value));
        }
        for (id, list) in json_target.lists {
            let mut entry = List::new(id, list.name);
            entry.items = list.items;
            target.add_list(entry);
        }

        target.costumes = json_target.costumes;
        target.sounds = json_target.sounds;
        target.costume_index = if target.costumes.is_empty() {
            None
        } else {
            Some((json_target.current_costume.max(0) as usize).min(target.costumes.len() - 1))
        };

        if let Some(sprite) = target.sprite_mut() {
            sprite.visible = json_target.visible;
            sprite.x = json_target.x;
            sprite.y = json_target.y;
            sprite.size = json_target.size;
            sprite.direction = json_target.direction;
            sprite.draggable = json_target.draggable;
            sprite.rotation_style = RotationStyle::parse(&json_target.rotation_style)
                .unwrap_or(RotationStyle::AllAround);
        }

        for (id, entry) in json_target.blocks {
            match entry {
                JsonBlockEntry::Block(block) => {
                    target.add_block(convert_block(&id, block));
                }
                JsonBlockEntry::TopLevelReporter(parts) => {
                    if let Some(block) = convert_top_level_reporter(&id, &parts) {
                        target.add_block(block);
                    }
                }
            }
        }

        targets.push(target);
    }
    (targets, broadcasts)
}
