mod common;

use common::*;
use ferrophorus::blocks::looks;
use ferrophorus::{Block, BlockPrototype, Broadcast, Opcode, Target, Value, Variable};

/// A `looks_show` under a green flag compiles to `[START, EXEC, f_show,
/// HALT]` with no constants, and running it makes the sprite visible with
/// an empty register stack.
#[test]
fn show_script() {
    let mut sprite = Target::new_sprite("Sprite1");
    sprite.sprite_mut().unwrap().visible = false;
    chain(
        &mut sprite,
        vec![
            Block::new("flag", "event_whenflagclicked"),
            Block::new("show", "looks_show"),
        ],
    );
    let mut engine = build_engine(vec![Target::new_stage(), sprite], vec![]);

    let show_index = engine.function_index(looks::show);
    let script = &engine.scripts()[0];
    assert_eq!(
        script.bytecode,
        vec![
            Opcode::Start as u32,
            Opcode::Exec as u32,
            show_index,
            Opcode::Halt as u32,
        ]
    );
    assert!(script.program.const_values.is_empty());

    engine.run();
    let sprite = engine.find_target("Sprite1").unwrap();
    assert!(engine.target_at(sprite).unwrap().sprite().unwrap().visible);
}

/// `looks_changesizeby 10.05` on a sprite of size 1.308.
#[test]
fn change_size_arithmetic() {
    let mut sprite = Target::new_sprite("Sprite1");
    sprite.sprite_mut().unwrap().size = 1.308;
    let mut change = Block::new("change", "looks_changesizeby");
    change.add_input(value_input("CHANGE", 10.05));
    chain(
        &mut sprite,
        vec![Block::new("flag", "event_whenflagclicked"), change],
    );
    let mut engine = build_engine(vec![Target::new_stage(), sprite], vec![]);

    let change_index = engine.function_index(looks::change_size_by);
    let script = &engine.scripts()[0];
    assert_eq!(
        script.bytecode,
        vec![
            Opcode::Start as u32,
            Opcode::Const as u32,
            0,
            Opcode::Exec as u32,
            change_index,
            Opcode::Halt as u32,
        ]
    );
    assert_eq!(script.program.const_values, vec![Value::from(10.05)]);

    engine.run();
    let index = engine.find_target("Sprite1").unwrap();
    let size = engine.target_at(index).unwrap().sprite().unwrap().size;
    assert_eq!(size, 1.308 + 10.05);
    assert!((size - 11.358).abs() < 1e-9);
}

/// Compiling the same tree twice yields identical bytecode and pools.
#[test]
fn compilation_is_deterministic() {
    let build = || {
        let mut sprite = Target::new_sprite("Sprite1");
        let mut change = Block::new("change", "looks_changesizeby");
        change.add_input(value_input("CHANGE", 10.05));
        let mut again = Block::new("again", "looks_changesizeby");
        again.add_input(value_input("CHANGE", 10.05));
        chain(
            &mut sprite,
            vec![
                Block::new("flag", "event_whenflagclicked"),
                change,
                again,
                Block::new("show", "looks_show"),
            ],
        );
        build_engine(vec![Target::new_stage(), sprite], vec![])
    };
    let first = build();
    let second = build();
    assert_eq!(first.scripts()[0].bytecode, second.scripts()[0].bytecode);
    assert_eq!(
        first.scripts()[0].program.const_values,
        second.scripts()[0].program.const_values
    );
    // distinct input slots do not share constant pool entries
    assert_eq!(first.scripts()[0].program.const_values.len(), 2);
}

fn clone_project() -> Vec<Target> {
    let stage = stage_with_vars(&[("countid", "count")]);

    let mut sprite = Target::new_sprite("Sprite1");

    // flag: count = 0, then try to create 600 clones
    let mut reset = Block::new("reset", "data_setvariableto");
    reset.add_field(entity_field("VARIABLE", "count", "countid"));
    reset.add_input(value_input("VALUE", 0));
    let mut repeat = Block::new("repeat", "control_repeat");
    repeat.add_input(value_input("TIMES", 600));
    repeat.add_input(block_input("SUBSTACK", "create"));
    let mut create = Block::new("create", "control_create_clone_of");
    create.add_input(menu_input("CLONE_OPTION", "menu"));
    create.parent_id = Some("repeat".to_owned());
    sprite.add_block(menu_block(
        "menu",
        "control_create_clone_of_menu",
        "CLONE_OPTION",
        "_myself_",
    ));
    sprite.add_block(create);
    chain(
        &mut sprite,
        vec![Block::new("flag", "event_whenflagclicked"), reset, repeat],
    );

    // every clone bumps the counter once
    let mut bump = Block::new("bump", "data_changevariableby");
    bump.add_field(entity_field("VARIABLE", "count", "countid"));
    bump.add_input(value_input("VALUE", 1));
    chain(
        &mut sprite,
        vec![Block::new("cloned", "control_start_as_clone"), bump],
    );

    vec![stage, sprite]
}

/// The clone budget is exact, -1 means unlimited, and `stop` deletes every
/// clone.
#[test]
fn clone_limit() {
    let mut engine = build_engine(clone_project(), vec![]);
    assert_eq!(engine.clone_limit(), 300);
    assert_eq!(engine.clone_count(), 0);

    engine.run();
    assert_eq!(stage_var(&engine, "count"), Value::Integer(300));
    assert_eq!(engine.clone_count(), 300);

    engine.set_clone_limit(475);
    engine.run();
    assert_eq!(stage_var(&engine, "count"), Value::Integer(475));
    assert_eq!(engine.clone_count(), 475);

    engine.set_clone_limit(0);
    engine.run();
    assert_eq!(stage_var(&engine, "count"), Value::Integer(0));
    assert_eq!(engine.clone_count(), 0);

    engine.set_clone_limit(-1);
    engine.run();
    assert!(stage_var(&engine, "count").to_i64() > 500);
    assert!(engine.clone_count() > 500);

    engine.stop();
    assert_eq!(engine.clone_count(), 0);
}

/// Clones copy variables by value and share position state at birth.
#[test]
fn clones_inherit_state() {
    let mut sprite = Target::new_sprite("Sprite1");
    sprite.add_variable(Variable::new("local", "mine", Value::Integer(5)));
    {
        let details = sprite.sprite_mut().unwrap();
        details.x = 12.0;
        details.y = -7.0;
        details.size = 150.0;
        details.direction = 45.0;
    }
    let mut create = Block::new("create", "control_create_clone_of");
    create.add_input(menu_input("CLONE_OPTION", "menu"));
    sprite.add_block(menu_block(
        "menu",
        "control_create_clone_of_menu",
        "CLONE_OPTION",
        "_myself_",
    ));
    chain(
        &mut sprite,
        vec![Block::new("flag", "event_whenflagclicked"), create],
    );
    let mut engine = build_engine(vec![Target::new_stage(), sprite], vec![]);
    engine.run();

    assert_eq!(engine.clone_count(), 1);
    let clone = engine
        .targets()
        .iter()
        .find(|t| t.is_clone())
        .expect("clone exists");
    let details = clone.sprite().unwrap();
    assert_eq!(details.x, 12.0);
    assert_eq!(details.y, -7.0);
    assert_eq!(details.size, 150.0);
    assert_eq!(details.direction, 45.0);
    assert_eq!(clone.variables[0].value, Value::Integer(5));
    assert!(clone.blocks.is_empty());
    assert_eq!(clone.data_source, engine.find_target("Sprite1"));

    // the clone sits directly behind its parent
    let parent = engine.target_at(engine.find_target("Sprite1").unwrap()).unwrap();
    let clone_layer = clone.layer_order;
    assert_eq!(parent.layer_order, clone_layer + 1);
}

/// Key hats fire for keys held at start; `any` aggregates.
#[test]
fn when_key_pressed() {
    let stage = stage_with_vars(&[("sid", "space_pressed"), ("aid", "any_pressed")]);
    let mut sprite = Target::new_sprite("Sprite1");

    let mut space_hat = Block::new("spacehat", "event_whenkeypressed");
    space_hat.add_field(field("KEY_OPTION", "space"));
    let mut bump_space = Block::new("bumpspace", "data_changevariableby");
    bump_space.add_field(entity_field("VARIABLE", "space_pressed", "sid"));
    bump_space.add_input(value_input("VALUE", 1));
    chain(&mut sprite, vec![space_hat, bump_space]);

    let mut any_hat = Block::new("anyhat", "event_whenkeypressed");
    any_hat.add_field(field("KEY_OPTION", "any"));
    let mut bump_any = Block::new("bumpany", "data_changevariableby");
    bump_any.add_field(entity_field("VARIABLE", "any_pressed", "aid"));
    bump_any.add_input(value_input("VALUE", 1));
    chain(&mut sprite, vec![any_hat, bump_any]);

    let mut engine = build_engine(vec![stage, sprite], vec![]);

    engine.run();
    assert_eq!(stage_var(&engine, "space_pressed"), Value::Integer(0));
    assert_eq!(stage_var(&engine, "any_pressed"), Value::Integer(0));

    engine.set_key_state("space", true);
    engine.run();
    assert_eq!(stage_var(&engine, "space_pressed"), Value::Integer(1));
    assert_eq!(stage_var(&engine, "any_pressed"), Value::Integer(1));

    engine.set_key_state("space", false);
    engine.run();
    assert_eq!(stage_var(&engine, "space_pressed"), Value::Integer(1));
    assert_eq!(stage_var(&engine, "any_pressed"), Value::Integer(1));

    engine.set_key_state("x", true);
    engine.run();
    assert_eq!(stage_var(&engine, "space_pressed"), Value::Integer(1));
    assert_eq!(stage_var(&engine, "any_pressed"), Value::Integer(2));
}

fn broadcast_receiver(
    sprite: &mut Target,
    hat_id: &str,
    broadcast_display: &str,
    broadcast_id: &str,
    body: Vec<Block>,
) {
    let mut hat = Block::new(hat_id, "event_whenbroadcastreceived");
    hat.add_field(entity_field(
        "BROADCAST_OPTION",
        broadcast_display,
        broadcast_id,
    ));
    let mut blocks = vec![hat];
    blocks.extend(body);
    chain(sprite, blocks);
}

fn broadcast_block(id: &str, broadcast_name: &str) -> Block {
    let mut send = Block::new(id, "event_broadcast");
    let mut input = ferrophorus::Input::new("BROADCAST_INPUT", ferrophorus::InputKind::Shadow);
    input.primary_value = ferrophorus::InputValue::Broadcast {
        name: broadcast_name.to_owned(),
        id: String::new(),
        resolved: None,
    };
    send.add_input(input);
    send
}

/// A script broadcasting its own hat terminates and both markers end up
/// truthy.
#[test]
fn broadcast_self_call_terminates() {
    let stage = stage_with_vars(&[("i", "i"), ("p1", "passed1"), ("p2", "passed2")]);
    let mut sprite = Target::new_sprite("Sprite1");

    let mut mark1 = Block::new("mark1", "data_setvariableto");
    mark1.add_field(entity_field("VARIABLE", "passed1", "p1"));
    mark1.add_input(value_input("VALUE", true));
    chain(
        &mut sprite,
        vec![
            Block::new("flag", "event_whenflagclicked"),
            broadcast_block("send", "msg"),
            mark1,
        ],
    );

    // receiver: re-broadcast itself until i reaches 3, then mark passed2
    let mut cond = Block::new("cond", "operator_lt");
    cond.add_input(variable_input("OPERAND1", "i"));
    cond.add_input(value_input("OPERAND2", 3));
    let mut branch = Block::new("branch", "control_if_else");
    branch.add_input(block_input("CONDITION", "cond"));
    branch.add_input(block_input("SUBSTACK", "bump"));
    branch.add_input(block_input("SUBSTACK2", "mark2"));
    let mut bump = Block::new("bump", "data_changevariableby");
    bump.add_field(entity_field("VARIABLE", "i", "i"));
    bump.add_input(value_input("VALUE", 1));
    bump.next_id = Some("resend".to_owned());
    bump.parent_id = Some("branch".to_owned());
    let mut resend = broadcast_block("resend", "msg");
    resend.parent_id = Some("bump".to_owned());
    let mut mark2 = Block::new("mark2", "data_setvariableto");
    mark2.add_field(entity_field("VARIABLE", "passed2", "p2"));
    mark2.add_input(value_input("VALUE", true));
    mark2.parent_id = Some("branch".to_owned());

    sprite.add_block(cond);
    sprite.add_block(bump);
    sprite.add_block(resend);
    sprite.add_block(mark2);
    broadcast_receiver(&mut sprite, "recv", "msg", "msgid", vec![branch]);

    let mut engine = build_engine(
        vec![stage, sprite],
        vec![Broadcast::new("msgid", "msg")],
    );
    engine.run();

    assert!(stage_var(&engine, "passed1").to_bool());
    assert!(stage_var(&engine, "passed2").to_bool());
    assert_eq!(stage_var(&engine, "i"), Value::Integer(3));
}

/// Re-broadcasting while the receiver is still running restarts it in
/// place instead of spawning a second runner.
#[test]
fn broadcast_restarts_running_receiver() {
    let stage = stage_with_vars(&[("s", "started"), ("f", "finished")]);
    let mut sprite = Target::new_sprite("Sprite1");

    // sender: broadcast, idle three frames, broadcast again
    let mut idle = Block::new("idle", "control_repeat");
    idle.add_input(value_input("TIMES", 3));
    chain(
        &mut sprite,
        vec![
            Block::new("flag", "event_whenflagclicked"),
            broadcast_block("send1", "go"),
            idle,
            broadcast_block("send2", "go"),
        ],
    );

    // receiver: mark started, spin ten frames, mark finished
    let mut mark_started = Block::new("markstarted", "data_changevariableby");
    mark_started.add_field(entity_field("VARIABLE", "started", "s"));
    mark_started.add_input(value_input("VALUE", 1));
    let mut spin = Block::new("spin", "control_repeat");
    spin.add_input(value_input("TIMES", 10));
    let mut mark_finished = Block::new("markfinished", "data_changevariableby");
    mark_finished.add_field(entity_field("VARIABLE", "finished", "f"));
    mark_finished.add_input(value_input("VALUE", 1));
    let mut hat = Block::new("recv", "event_whenbroadcastreceived");
    hat.add_field(entity_field("BROADCAST_OPTION", "go", "goid"));
    chain(
        &mut sprite,
        vec![hat, mark_started, spin, mark_finished],
    );

    let mut engine = build_engine(
        vec![stage, sprite],
        vec![Broadcast::new("goid", "go")],
    );
    engine.run();

    assert_eq!(stage_var(&engine, "started"), Value::Integer(2));
    assert_eq!(stage_var(&engine, "finished"), Value::Integer(1));
}

/// stop this script / stop other scripts in sprite / stop all.
#[test]
fn stop_semantics() {
    let stage = stage_with_vars(&[("i", "i"), ("j", "j"), ("k", "k")]);
    let mut sprite = Target::new_sprite("Sprite1");

    // script A: count five frames, stop the other scripts, mark k
    let mut count = Block::new("count", "control_repeat");
    count.add_input(value_input("TIMES", 5));
    count.add_input(block_input("SUBSTACK", "bumpi"));
    let mut bump_i = Block::new("bumpi", "data_changevariableby");
    bump_i.add_field(entity_field("VARIABLE", "i", "i"));
    bump_i.add_input(value_input("VALUE", 1));
    bump_i.parent_id = Some("count".to_owned());
    sprite.add_block(bump_i);
    let mut stop_other = Block::new("stopother", "control_stop");
    stop_other.add_field(field("STOP_OPTION", "other scripts in sprite"));
    let mut mark_k = Block::new("markk", "data_changevariableby");
    mark_k.add_field(entity_field("VARIABLE", "k", "k"));
    mark_k.add_input(value_input("VALUE", 1));
    chain(
        &mut sprite,
        vec![
            Block::new("flagA", "event_whenflagclicked"),
            count,
            stop_other,
            mark_k,
        ],
    );

    // script B: count forever; it is stopped by A
    let mut forever = Block::new("forever", "control_forever");
    forever.add_input(block_input("SUBSTACK", "bumpj"));
    let mut bump_j = Block::new("bumpj", "data_changevariableby");
    bump_j.add_field(entity_field("VARIABLE", "j", "j"));
    bump_j.add_input(value_input("VALUE", 1));
    bump_j.parent_id = Some("forever".to_owned());
    sprite.add_block(bump_j);
    chain(
        &mut sprite,
        vec![Block::new("flagB", "event_whenflagclicked"), forever],
    );

    let mut engine = build_engine(vec![stage, sprite], vec![]);
    engine.run();

    assert_eq!(stage_var(&engine, "i"), Value::Integer(5));
    assert_eq!(stage_var(&engine, "j"), Value::Integer(5));
    assert_eq!(stage_var(&engine, "k"), Value::Integer(1));
}

#[test]
fn stop_this_script_halts_midway() {
    let stage = stage_with_vars(&[("i", "i")]);
    let mut sprite = Target::new_sprite("Sprite1");

    let mut bump = Block::new("bump", "data_changevariableby");
    bump.add_field(entity_field("VARIABLE", "i", "i"));
    bump.add_input(value_input("VALUE", 1));
    let mut stop = Block::new("stop", "control_stop");
    stop.add_field(field("STOP_OPTION", "this script"));
    let mut unreachable = Block::new("unreachable", "data_changevariableby");
    unreachable.add_field(entity_field("VARIABLE", "i", "i"));
    unreachable.add_input(value_input("VALUE", 100));
    chain(
        &mut sprite,
        vec![
            Block::new("flag", "event_whenflagclicked"),
            bump,
            stop,
            unreachable,
        ],
    );

    let mut engine = build_engine(vec![stage, sprite], vec![]);
    engine.run();
    assert_eq!(stage_var(&engine, "i"), Value::Integer(1));
}

#[test]
fn stop_all_halts_every_script() {
    let stage = stage_with_vars(&[("i", "i")]);
    let mut sprite = Target::new_sprite("Sprite1");

    // loop that stops everything once i reaches 11
    let mut forever = Block::new("forever", "control_forever");
    forever.add_input(block_input("SUBSTACK", "bump"));
    let mut bump = Block::new("bump", "data_changevariableby");
    bump.add_field(entity_field("VARIABLE", "i", "i"));
    bump.add_input(value_input("VALUE", 1));
    bump.parent_id = Some("forever".to_owned());
    bump.next_id = Some("check".to_owned());
    let mut cond = Block::new("cond", "operator_equals");
    cond.add_input(variable_input("OPERAND1", "i"));
    cond.add_input(value_input("OPERAND2", 11));
    let mut check = Block::new("check", "control_if");
    check.add_input(block_input("CONDITION", "cond"));
    check.add_input(block_input("SUBSTACK", "stopall"));
    check.parent_id = Some("bump".to_owned());
    let mut stop_all = Block::new("stopall", "control_stop");
    stop_all.add_field(field("STOP_OPTION", "all"));
    stop_all.parent_id = Some("check".to_owned());
    sprite.add_block(bump);
    sprite.add_block(cond);
    sprite.add_block(check);
    sprite.add_block(stop_all);
    chain(
        &mut sprite,
        vec![Block::new("flag", "event_whenflagclicked"), forever],
    );

    let mut engine = build_engine(vec![stage, sprite], vec![]);
    engine.run();
    assert_eq!(stage_var(&engine, "i"), Value::Integer(11));
}

/// Custom blocks: arguments flow through READ_ARG, recursion works, warp
/// runs without yielding.
#[test]
fn custom_block_recursion() {
    let stage = stage_with_vars(&[("t", "total")]);
    let mut sprite = Target::new_sprite("Sprite1");

    // definition of "countdown %n": if n > 0 { total += 1; countdown(n - 1) }
    let mut definition = Block::new("def", "procedures_definition");
    definition.top_level = true;
    definition.add_input(block_input("custom_block", "proto"));
    definition.next_id = Some("ifpos".to_owned());
    let mut proto = Block::new("proto", "procedures_prototype");
    proto.shadow = true;
    proto.mutation = Some(BlockPrototype {
        proccode: "countdown %n".to_owned(),
        argument_ids: vec!["argn".to_owned()],
        argument_names: vec!["n".to_owned()],
        warp: true,
    });

    let mut arg_n = Block::new("argn1", "argument_reporter_string_number");
    arg_n.add_field(field("VALUE", "n"));
    let mut positive = Block::new("positive", "operator_gt");
    positive.add_input(block_input("OPERAND1", "argn1"));
    positive.add_input(value_input("OPERAND2", 0));

    let mut ifpos = Block::new("ifpos", "control_if");
    ifpos.add_input(block_input("CONDITION", "positive"));
    ifpos.add_input(block_input("SUBSTACK", "bump"));
    ifpos.parent_id = Some("def".to_owned());

    let mut bump = Block::new("bump", "data_changevariableby");
    bump.add_field(entity_field("VARIABLE", "total", "t"));
    bump.add_input(value_input("VALUE", 1));
    bump.parent_id = Some("ifpos".to_owned());
    bump.next_id = Some("recurse".to_owned());

    let mut arg_n2 = Block::new("argn2", "argument_reporter_string_number");
    arg_n2.add_field(field("VALUE", "n"));
    let mut minus_one = Block::new("minusone", "operator_subtract");
    minus_one.add_input(block_input("NUM1", "argn2"));
    minus_one.add_input(value_input("NUM2", 1));

    let mut recurse = Block::new("recurse", "procedures_call");
    recurse.mutation = Some(BlockPrototype {
        proccode: "countdown %n".to_owned(),
        argument_ids: vec!["argn".to_owned()],
        argument_names: vec![],
        warp: false,
    });
    recurse.add_input(block_input("argn", "minusone"));
    recurse.parent_id = Some("bump".to_owned());

    sprite.add_block(definition);
    sprite.add_block(proto);
    sprite.add_block(arg_n);
    sprite.add_block(positive);
    sprite.add_block(ifpos);
    sprite.add_block(bump);
    sprite.add_block(arg_n2);
    sprite.add_block(minus_one);
    sprite.add_block(recurse);

    // flag: countdown(5)
    let mut call = Block::new("call", "procedures_call");
    call.mutation = Some(BlockPrototype {
        proccode: "countdown %n".to_owned(),
        argument_ids: vec!["argn".to_owned()],
        argument_names: vec![],
        warp: false,
    });
    call.add_input(value_input("argn", 5));
    chain(
        &mut sprite,
        vec![Block::new("flag", "event_whenflagclicked"), call],
    );

    let mut engine = build_engine(vec![stage, sprite], vec![]);
    engine.run();
    assert_eq!(stage_var(&engine, "total"), Value::Integer(5));
}

/// A call to an undefined custom block lowers to nothing and the script
/// continues.
#[test]
fn missing_procedure_is_not_fatal() {
    let stage = stage_with_vars(&[("i", "i")]);
    let mut sprite = Target::new_sprite("Sprite1");
    let mut call = Block::new("call", "procedures_call");
    call.mutation = Some(BlockPrototype {
        proccode: "ghost %s".to_owned(),
        argument_ids: vec!["a".to_owned()],
        argument_names: vec![],
        warp: false,
    });
    call.add_input(value_input("a", 1));
    let mut bump = Block::new("bump", "data_changevariableby");
    bump.add_field(entity_field("VARIABLE", "i", "i"));
    bump.add_input(value_input("VALUE", 1));
    chain(
        &mut sprite,
        vec![Block::new("flag", "event_whenflagclicked"), call, bump],
    );

    let mut engine = build_engine(vec![stage, sprite], vec![]);
    engine.run();
    assert_eq!(stage_var(&engine, "i"), Value::Integer(1));
}

/// `control_wait` samples the injected clock across frames.
#[test]
fn wait_block_uses_the_clock() {
    let stage = stage_with_vars(&[("a", "before"), ("b", "after")]);
    let mut sprite = Target::new_sprite("Sprite1");

    let mut before = Block::new("before", "data_setvariableto");
    before.add_field(entity_field("VARIABLE", "before", "a"));
    before.add_input(value_input("VALUE", 1));
    let mut wait = Block::new("wait", "control_wait");
    wait.add_input(value_input("DURATION", 0.5));
    let mut after = Block::new("after", "data_setvariableto");
    after.add_field(entity_field("VARIABLE", "after", "b"));
    after.add_input(value_input("VALUE", 1));
    chain(
        &mut sprite,
        vec![
            Block::new("flag", "event_whenflagclicked"),
            before,
            wait,
            after,
        ],
    );

    let mut engine = build_engine(vec![stage, sprite], vec![]);
    engine.run();
    assert_eq!(stage_var(&engine, "before"), Value::Integer(1));
    assert_eq!(stage_var(&engine, "after"), Value::Integer(1));
}

/// repeat-until loops re-evaluate their condition each iteration.
#[test]
fn repeat_until_loop() {
    let stage = stage_with_vars(&[("i", "i")]);
    let mut sprite = Target::new_sprite("Sprite1");

    let mut cond = Block::new("cond", "operator_equals");
    cond.add_input(variable_input("OPERAND1", "i"));
    cond.add_input(value_input("OPERAND2", 4));
    let mut until = Block::new("until", "control_repeat_until");
    until.add_input(block_input("CONDITION", "cond"));
    until.add_input(block_input("SUBSTACK", "bump"));
    let mut bump = Block::new("bump", "data_changevariableby");
    bump.add_field(entity_field("VARIABLE", "i", "i"));
    bump.add_input(value_input("VALUE", 1));
    bump.parent_id = Some("until".to_owned());
    sprite.add_block(cond);
    sprite.add_block(bump);
    chain(
        &mut sprite,
        vec![Block::new("flag", "event_whenflagclicked"), until],
    );

    let mut engine = build_engine(vec![stage, sprite], vec![]);
    engine.run();
    assert_eq!(stage_var(&engine, "i"), Value::Integer(4));
}

/// List operations, 1-based indexing and the joined reporter form.
#[test]
fn list_operations() {
    let mut stage = stage_with_vars(&[("n", "picked"), ("len", "len"), ("pos", "pos")]);
    stage.add_list(ferrophorus::List::new("lid", "log"));
    let mut sprite = Target::new_sprite("Sprite1");

    let list_field = || entity_field("LIST", "log", "lid");

    let mut add1 = Block::new("add1", "data_addtolist");
    add1.add_field(list_field());
    add1.add_input(value_input("ITEM", "alpha"));
    let mut add2 = Block::new("add2", "data_addtolist");
    add2.add_field(list_field());
    add2.add_input(value_input("ITEM", "beta"));
    let mut add3 = Block::new("add3", "data_addtolist");
    add3.add_field(list_field());
    add3.add_input(value_input("ITEM", "gamma"));
    let mut replace = Block::new("replace", "data_replaceitemoflist");
    replace.add_field(list_field());
    replace.add_input(value_input("INDEX", 2));
    replace.add_input(value_input("ITEM", "BETA"));
    let mut remove = Block::new("remove", "data_deleteoflist");
    remove.add_field(list_field());
    remove.add_input(value_input("INDEX", 1));

    let mut item = Block::new("item", "data_itemoflist");
    item.add_field(list_field());
    item.add_input(value_input("INDEX", 1));
    let mut set_picked = Block::new("setpicked", "data_setvariableto");
    set_picked.add_field(entity_field("VARIABLE", "picked", "n"));
    set_picked.add_input(block_input("VALUE", "item"));
    sprite.add_block(item);

    let mut length = Block::new("length", "data_lengthoflist");
    length.add_field(list_field());
    let mut set_len = Block::new("setlen", "data_setvariableto");
    set_len.add_field(entity_field("VARIABLE", "len", "len"));
    set_len.add_input(block_input("VALUE", "length"));
    sprite.add_block(length);

    let mut index_of = Block::new("indexof", "data_itemnumoflist");
    index_of.add_field(list_field());
    index_of.add_input(value_input("ITEM", "gamma"));
    let mut set_pos = Block::new("setpos", "data_setvariableto");
    set_pos.add_field(entity_field("VARIABLE", "pos", "pos"));
    set_pos.add_input(block_input("VALUE", "indexof"));
    sprite.add_block(index_of);

    chain(
        &mut sprite,
        vec![
            Block::new("flag", "event_whenflagclicked"),
            add1,
            add2,
            add3,
            replace,
            remove,
            set_picked,
            set_len,
            set_pos,
        ],
    );

    let mut engine = build_engine(vec![stage, sprite], vec![]);
    engine.run();

    assert_eq!(stage_var(&engine, "picked"), Value::from("BETA"));
    assert_eq!(stage_var(&engine, "len"), Value::Integer(2));
    assert_eq!(stage_var(&engine, "pos"), Value::Integer(2));
    let stage = engine.stage().unwrap();
    let list = &stage.lists[0].items;
    assert_eq!(list, &vec![Value::from("BETA"), Value::from("gamma")]);
}

/// A completed script re-run from scratch produces the same effects.
#[test]
fn rerun_matches_fresh_run() {
    let stage = stage_with_vars(&[("i", "i")]);
    let mut sprite = Target::new_sprite("Sprite1");
    let mut set = Block::new("set", "data_setvariableto");
    set.add_field(entity_field("VARIABLE", "i", "i"));
    set.add_input(value_input("VALUE", 0));
    let mut repeat = Block::new("repeat", "control_repeat");
    repeat.add_input(value_input("TIMES", 7));
    repeat.add_input(block_input("SUBSTACK", "bump"));
    let mut bump = Block::new("bump", "data_changevariableby");
    bump.add_field(entity_field("VARIABLE", "i", "i"));
    bump.add_input(value_input("VALUE", 1));
    bump.parent_id = Some("repeat".to_owned());
    sprite.add_block(bump);
    chain(
        &mut sprite,
        vec![Block::new("flag", "event_whenflagclicked"), set, repeat],
    );

    let mut engine = build_engine(vec![stage, sprite], vec![]);
    engine.run();
    let first = stage_var(&engine, "i");
    engine.run();
    let second = stage_var(&engine, "i");
    assert_eq!(first, Value::Integer(7));
    assert_eq!(first, second);
}

/// Motion with fencing: positions clamp to the stage rectangle.
#[test]
fn sprite_fencing_clamps_motion() {
    let mut sprite = Target::new_sprite("Sprite1");
    let mut go = Block::new("go", "motion_gotoxy");
    go.add_input(value_input("X", 10_000));
    go.add_input(value_input("Y", -10_000));
    chain(
        &mut sprite,
        vec![Block::new("flag", "event_whenflagclicked"), go],
    );

    let mut engine = build_engine(vec![Target::new_stage(), sprite], vec![]);
    engine.run();
    let index = engine.find_target("Sprite1").unwrap();
    let details = engine.target_at(index).unwrap().sprite().unwrap();
    assert_eq!(details.x, 240.0);
    assert_eq!(details.y, -180.0);
}

#[test]
fn operators_compose() {
    let stage = stage_with_vars(&[("r", "result")]);
    let mut sprite = Target::new_sprite("Sprite1");

    // result = (2 + 3) * 4
    let mut sum = Block::new("sum", "operator_add");
    sum.add_input(value_input("NUM1", 2));
    sum.add_input(value_input("NUM2", 3));
    let mut product = Block::new("product", "operator_multiply");
    product.add_input(block_input("NUM1", "sum"));
    product.add_input(value_input("NUM2", 4));
    let mut set = Block::new("set", "data_setvariableto");
    set.add_field(entity_field("VARIABLE", "result", "r"));
    set.add_input(block_input("VALUE", "product"));
    sprite.add_block(sum);
    sprite.add_block(product);
    chain(
        &mut sprite,
        vec![Block::new("flag", "event_whenflagclicked"), set],
    );

    let mut engine = build_engine(vec![stage, sprite], vec![]);
    engine.run();
    assert_eq!(stage_var(&engine, "result"), Value::Integer(20));
}
