use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use parley_engine::{HistoryQuery, Interpreter, InterpreterConfig, SessionKey, TaskStatus};
use parley_types::{ArgValue, CommandDescriptor, DeclaredType, DispatchFailure, ParameterDescriptor, RAW_STRATEGY};
use serde_json::{Value, json};

const WAIT: Duration = Duration::from_secs(5);

fn toggle() -> CommandDescriptor {
    CommandDescriptor::command("toggle", |args| Ok(json!({ "on": args.bool(0)?, "rest": args.opt_str(1)? })))
        .param(ParameterDescriptor::flag("on", DeclaredType::Bool))
        .param(ParameterDescriptor::flag("label", DeclaredType::Str).short('l'))
}

fn echo() -> CommandDescriptor {
    CommandDescriptor::command("echo", |args| {
        let text = args.str(1)?;
        args.console(0)?.println(text);
        Ok(Value::Null)
    })
    .strategy(RAW_STRATEGY)
    .param(ParameterDescriptor::positional("out", DeclaredType::console()))
    .param(ParameterDescriptor::positional("text", DeclaredType::Str))
}

fn nap() -> CommandDescriptor {
    CommandDescriptor::command("nap", |args| {
        args.console(0)?.println(args.str(2)?);
        let millis = u64::try_from(args.int(1)?)?;
        thread::sleep(Duration::from_millis(millis));
        Ok(Value::Null)
    })
    .param(ParameterDescriptor::new(DeclaredType::console()))
    .param(ParameterDescriptor::positional("millis", DeclaredType::Int))
    .param(ParameterDescriptor::positional("label", DeclaredType::Str))
}

fn interpreter() -> Interpreter {
    let builder = Interpreter::builder(InterpreterConfig::default().with_worker_threads(2));
    let sessions = builder.sessions();
    builder
        .register(toggle())
        .register(echo())
        .register(nap())
        .register(
            CommandDescriptor::command("set", move |args| {
                sessions.current().set_variable(args.str(0)?, json!(args.str(1)?));
                Ok(Value::Null)
            })
            .param(ParameterDescriptor::positional("name", DeclaredType::Str))
            .param(ParameterDescriptor::positional("value", DeclaredType::Str).joint()),
        )
        .register(
            CommandDescriptor::command("add", |args| Ok(json!(args.int(0)? + args.int(1)?)))
                .param(ParameterDescriptor::positional("left", DeclaredType::Int))
                .param(ParameterDescriptor::positional("right", DeclaredType::Int)),
        )
        .register(CommandDescriptor::command("fail", |_| Err(anyhow!("disk full").context("writing report"))))
        .register(CommandDescriptor::command("explode", |_| panic!("kaboom")))
        .build()
        .expect("interpreter builds")
}

#[test]
fn placeholders_are_substituted_before_parsing() {
    let interpreter = interpreter();
    interpreter.session().set_variable("x", json!("--on"));

    let substituted = interpreter.execute("toggle ${x}").expect("record");
    let literal = interpreter.execute("toggle --on").expect("record");

    assert!(substituted.success);
    assert_eq!(substituted.result, literal.result);
    assert_eq!(substituted.raw_args, "--on");
    assert_eq!(substituted.result["on"], json!(true));
}

#[test]
fn variable_can_supply_a_whole_flag_and_value() {
    let interpreter = interpreter();
    interpreter.execute("set flags plain").expect("record");
    assert_eq!(interpreter.session().variable("flags"), Some(json!("plain")));
    interpreter.session().set_variable("flags", json!("-l release"));
    let record = interpreter.execute("toggle ${flags}").expect("record");
    assert_eq!(record.result, json!({"on": false, "rest": "release"}));
}

#[test]
fn explicit_sessions_are_isolated() {
    let interpreter = interpreter();

    let alpha = interpreter.create_explicit("alpha");
    interpreter.execute("set color red");
    let beta_record = interpreter.execute_as(&SessionKey::named("beta"), "set color blue");
    assert!(beta_record.is_some());

    assert_eq!(interpreter.session().variable("color"), Some(json!("red")));
    let beta = interpreter.sessions().get(&SessionKey::named("beta")).expect("beta session");
    assert_eq!(beta.variable("color"), Some(json!("blue")));

    let alpha_context = Arc::clone(alpha.session());
    alpha.dispose();
    assert_eq!(beta.variable("color"), Some(json!("blue")));
    let registered = interpreter.sessions().get(&SessionKey::named("alpha")).expect("alpha stays registered");
    assert!(Arc::ptr_eq(&registered, &alpha_context));
    assert_eq!(registered.variable("color"), None);
    assert_eq!(registered.history_len(), 0);
}

#[test]
fn threads_have_separate_histories() {
    let interpreter = interpreter();
    let barrier = Arc::new(Barrier::new(2));
    let workers: Vec<_> = (0..2)
        .map(|index| {
            let interpreter = interpreter.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..=index {
                    interpreter.execute("add 1 1");
                }
                interpreter.session().history_len()
            })
        })
        .collect();
    let mut lengths: Vec<usize> = workers.into_iter().map(|worker| worker.join().unwrap()).collect();
    lengths.sort_unstable();
    assert_eq!(lengths, vec![1, 2]);
    assert_eq!(interpreter.session().history_len(), 0);
}

#[test]
fn parse_failures_skip_the_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let interpreter = Interpreter::builder(InterpreterConfig::default())
        .register(
            CommandDescriptor::command("greet", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            })
            .param(ParameterDescriptor::flag("name", DeclaredType::Str).required()),
        )
        .build()
        .expect("interpreter builds");

    let record = interpreter.execute("greet").expect("record");
    assert!(!record.success);
    assert_eq!(record.failure.as_ref().map(DispatchFailure::kind), Some("lack-required"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(interpreter.session().history_len(), 1);
}

#[test]
fn backfill_with_missing_second_value_fails() {
    let interpreter = interpreter();
    assert_eq!(interpreter.execute("add 7 5").expect("record").result, json!(12));
    let record = interpreter.execute("add 7").expect("record");
    assert_eq!(record.failure.as_ref().map(DispatchFailure::kind), Some("incomplete-command"));
}

#[test]
fn filters_short_circuit_dispatch() {
    let interpreter = Interpreter::builder(InterpreterConfig::default())
        .register(CommandDescriptor::command("deploy", |_| Ok(json!("deployed"))))
        .register(
            CommandDescriptor::filter("freeze", "deploys are frozen", |request| Ok(!request.raw_args.contains("prod")))
                .applies_to("deploy"),
        )
        .build()
        .expect("interpreter builds");

    assert_eq!(interpreter.execute("deploy staging").expect("record").result, json!("deployed"));
    let rejected = interpreter.execute("deploy prod").expect("record");
    assert_eq!(
        rejected.failure,
        Some(DispatchFailure::filter_rejection("freeze", "deploys are frozen"))
    );
    assert_eq!(interpreter.render(&rejected), "rejected by filter freeze: deploys are frozen");
}

#[test]
fn handler_errors_and_panics_become_failed_records() {
    let interpreter = interpreter();

    let failed = interpreter.execute("fail").expect("record");
    assert_eq!(failed.failure.as_ref().map(DispatchFailure::kind), Some("handler-failure"));
    assert_eq!(interpreter.render(&failed), "fail failed: writing report");

    let panicked = interpreter.execute("explode").expect("record");
    assert!(!panicked.success);
    assert!(interpreter.render(&panicked).contains("kaboom"));

    // The interpreter keeps working afterwards.
    assert!(interpreter.execute("add 1 2").expect("record").success);
}

#[test]
fn failure_detail_is_opt_in() {
    let interpreter = Interpreter::builder(InterpreterConfig::default().with_failure_detail(true))
        .register(CommandDescriptor::command("fail", |_| Err(anyhow!("disk full").context("writing report"))))
        .build()
        .expect("interpreter builds");
    let record = interpreter.execute("fail").expect("record");
    let rendered = interpreter.render(&record);
    assert!(rendered.starts_with("fail failed: writing report\n"), "{rendered}");
    assert!(rendered.contains("disk full"), "{rendered}");
}

#[test]
fn unknown_commands_and_blank_lines() {
    let interpreter = interpreter();
    let record = interpreter.execute("nope").expect("record");
    assert!(record.success);
    assert_eq!(record.result, Value::Null);
    assert!(interpreter.execute("   ").is_none());
    assert_eq!(interpreter.session().history_len(), 1);
}

#[test]
fn invoke_bypasses_parsing() {
    let interpreter = interpreter();
    let record = interpreter.invoke("add", vec![ArgValue::Int(40), ArgValue::Int(2)]);
    assert_eq!(record.result, json!(42));
    assert_eq!(record.raw_args, "40 2");

    let mismatch = interpreter.invoke("add", vec![ArgValue::from("forty")]);
    assert_eq!(mismatch.failure.as_ref().map(DispatchFailure::kind), Some("handler-failure"));
}

#[test]
fn history_query_projects_fields() {
    let interpreter = interpreter();
    interpreter.execute("add 1 2");
    interpreter.execute("toggle");
    interpreter.execute("add 3 4");

    let rows = interpreter.session().query(&HistoryQuery::new().command("add").field("raw_args").field("result"));
    assert_eq!(rows, vec![json!({"raw_args": "3 4", "result": 7}), json!({"raw_args": "1 2", "result": 3})]);
}

#[test]
fn background_output_is_captured_per_task() {
    let interpreter = interpreter();
    let handle = interpreter.submit("greeting", "echo hello from the pool").expect("submitted");
    let record = handle.wait(WAIT).expect("task finishes");

    assert!(record.success);
    assert_eq!(handle.status(), TaskStatus::Done);
    assert_eq!(interpreter.show_output("greeting", -1), Some(vec!["hello from the pool".to_string()]));
    // Dispatched under the submitter's session.
    assert_eq!(interpreter.session().last_record().map(|record| record.command), Some("echo".to_string()));
}

#[test]
fn resubmitting_a_name_retires_the_first_task() {
    let interpreter = interpreter();
    let first = interpreter.submit("job", "echo first").expect("submitted");
    first.wait(WAIT).expect("first finishes");
    let second = interpreter.submit("job", "echo second").expect("submitted");
    second.wait(WAIT).expect("second finishes");

    let tasks = interpreter.list_tasks();
    let live: Vec<_> = tasks.iter().filter(|task| task.live).collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].generation, second.generation());
    assert_eq!(interpreter.show_output("job", -1), Some(vec!["second".to_string()]));

    let retired = interpreter.session().tasks().retired("job");
    assert_eq!(retired.len(), 1);
    assert_eq!(retired[0].output().lines(), vec!["first"]);

    assert_eq!(interpreter.clear_tasks(true), 2);
    assert!(interpreter.list_tasks().is_empty());
}

#[test]
fn resubmitting_a_running_task_keeps_one_live_handle() {
    let interpreter = interpreter();
    let first = interpreter.submit("job", "nap 300 first").expect("submitted");
    let second = interpreter.submit("job", "nap 10 second").expect("submitted");

    let live: Vec<_> = interpreter.list_tasks().into_iter().filter(|task| task.live).collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].generation, second.generation());
    let current = interpreter.session().tasks().get("job").expect("live task");
    assert!(Arc::ptr_eq(&current, &second));

    assert!(first.wait(WAIT).expect("first finishes").success);
    assert!(second.wait(WAIT).expect("second finishes").success);

    let retired = interpreter.session().tasks().retired("job");
    assert_eq!(retired.len(), 1);
    assert!(Arc::ptr_eq(&retired[0], &first));
    assert_eq!(retired[0].output().lines(), vec!["first"]);
    assert_eq!(interpreter.show_output("job", -1), Some(vec!["second".to_string()]));
}

#[test]
fn disposal_keeps_the_session_seen_by_a_running_task() {
    let interpreter = interpreter();
    let guard = interpreter.create_explicit("batch");
    let context = Arc::clone(guard.session());
    let task = interpreter.submit("slow", "nap 100 working").expect("submitted");
    guard.dispose();

    task.wait(WAIT).expect("task finishes");
    let registered = interpreter.sessions().get(&SessionKey::named("batch")).expect("batch stays registered");
    assert!(Arc::ptr_eq(&registered, &context));
    assert_eq!(registered.last_record().map(|record| record.command), Some("nap".to_string()));
}

#[test]
fn weak_handle_does_not_keep_the_interpreter_alive() {
    let interpreter = interpreter();
    let weak = interpreter.downgrade();
    let upgraded = weak.upgrade().expect("interpreter alive");
    assert_eq!(upgraded.execute("add 1 2").map(|record| record.result), Some(json!(3)));
    drop(upgraded);

    interpreter.shutdown();
    drop(interpreter);
    assert!(weak.upgrade().is_none());
}

#[test]
fn shutdown_runs_destroy_once_and_stops_submissions() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&destroyed);
    let interpreter = Interpreter::builder(InterpreterConfig::default())
        .register(echo())
        .register(CommandDescriptor::destroy("flush", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .build()
        .expect("interpreter builds");

    assert!(interpreter.shutdown().is_empty());
    assert!(interpreter.shutdown().is_empty());
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert!(interpreter.submit("late", "echo too late").is_err());
}
