//! Built-in commands of the `parley` shell.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use parley_engine::{HistoryQuery, Interpreter, InterpreterConfig, SessionManager, WeakInterpreter};
use parley_registry::CommandRegistry;
use parley_types::{
    COLLECTION_STRATEGY, CommandDescriptor, DeclaredType, POSITIONAL_STRATEGY, ParameterDescriptor, RAW_STRATEGY,
};
use serde_json::{Value, json};
use tracing::debug;

/// A built interpreter plus the shell's exit flag.
pub struct Shell {
    pub interpreter: Interpreter,
    exit: Arc<AtomicBool>,
}

impl Shell {
    pub fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }
}

/// Builds the interpreter with the shell's command set.
pub fn build(config: InterpreterConfig) -> Result<Shell> {
    let exit = Arc::new(AtomicBool::new(false));
    // Commands that drive the interpreter itself resolve it lazily, through a
    // weak handle so the registry does not keep its own interpreter alive.
    let handle: Arc<OnceLock<WeakInterpreter>> = Arc::new(OnceLock::new());

    let builder = Interpreter::builder(config);
    let sessions = builder.sessions();
    let mut builder = builder;
    for descriptor in io_commands()
        .into_iter()
        .chain(session_commands(&sessions))
        .chain(task_commands(&handle))
        .chain(shell_commands(&handle, &exit))
    {
        builder = builder.register(descriptor);
    }

    let interpreter = builder.build().context("starting the task runner")?;
    let _ = handle.set(interpreter.downgrade());
    Ok(Shell { interpreter, exit })
}

fn interpreter(handle: &OnceLock<WeakInterpreter>) -> Result<Interpreter> {
    handle
        .get()
        .and_then(WeakInterpreter::upgrade)
        .ok_or_else(|| anyhow!("interpreter is not running"))
}

fn io_commands() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor::command("echo", |args| {
            let console = args.console(0)?;
            console.println(args.str(1)?);
            Ok(Value::Null)
        })
        .category("io")
        .strategy(RAW_STRATEGY)
        .description("Print the rest of the line")
        .param(ParameterDescriptor::new(DeclaredType::console()))
        .param(ParameterDescriptor::positional("text", DeclaredType::Str)),
        CommandDescriptor::command("add", |args| {
            let (left, right) = (args.int(0)?, args.int(1)?);
            let sum = left.checked_add(right).ok_or_else(|| anyhow!("{left} + {right} overflows"))?;
            Ok(json!(sum))
        })
        .category("math")
        .strategy(POSITIONAL_STRATEGY)
        .description("Add two integers")
        .param(ParameterDescriptor::positional("left", DeclaredType::Int).required())
        .param(ParameterDescriptor::positional("right", DeclaredType::Int).required()),
        CommandDescriptor::command("sum", |args| {
            let total: f64 = args.list(0)?.iter().filter_map(|value| value.as_float()).sum();
            Ok(json!(total))
        })
        .category("math")
        .strategy(COLLECTION_STRATEGY)
        .description("Sum a list such as [1, 2.5, 3]")
        .param(ParameterDescriptor::positional("values", DeclaredType::list(DeclaredType::Float)).required()),
        CommandDescriptor::command("sleep", |args| {
            let millis = u64::try_from(args.int(0)?).map_err(|_| anyhow!("duration must not be negative"))?;
            std::thread::sleep(Duration::from_millis(millis));
            Ok(Value::Null)
        })
        .category("io")
        .description("Block for the given number of milliseconds")
        .param(ParameterDescriptor::positional("millis", DeclaredType::Int).default_value("1000")),
    ]
}

fn session_commands(sessions: &Arc<SessionManager>) -> Vec<CommandDescriptor> {
    let setter = Arc::clone(sessions);
    let getter = Arc::clone(sessions);
    let lister = Arc::clone(sessions);
    let history = Arc::clone(sessions);

    vec![
        CommandDescriptor::command("set", move |args| {
            let name = args.str(0)?;
            let text = args.str(1)?;
            // JSON literals keep their type, anything else is stored as text.
            let value = serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
            setter.current().set_variable(name, value);
            Ok(Value::Null)
        })
        .category("session")
        .description("Store a session variable for ${name} placeholders")
        .param(ParameterDescriptor::positional("name", DeclaredType::Str).required())
        .param(ParameterDescriptor::positional("value", DeclaredType::Str).joint().required()),
        CommandDescriptor::command("get", move |args| {
            let name = args.str(0)?;
            getter.current().variable(name).ok_or_else(|| anyhow!("no variable named {name}"))
        })
        .category("session")
        .param(ParameterDescriptor::positional("name", DeclaredType::Str).required()),
        CommandDescriptor::command("vars", move |_| {
            let variables: serde_json::Map<String, Value> = lister.current().variables().into_iter().collect();
            Ok(Value::Object(variables))
        })
        .category("session")
        .description("List session variables"),
        CommandDescriptor::command("recent", move |args| {
            let mut query = HistoryQuery::new().limit(usize::try_from(args.int(1)?).unwrap_or(0));
            if let Some(command) = args.opt_str(0)? {
                query = query.command(command);
            }
            if let Ok(fields) = args.list(2) {
                for field in fields.iter().filter_map(|field| field.as_str()) {
                    query = query.field(field);
                }
            }
            Ok(Value::Array(history.current().query(&query)))
        })
        .category("session")
        .description("Show recent invocations, newest first")
        .param(ParameterDescriptor::flag("command", DeclaredType::Str).short('c'))
        .param(ParameterDescriptor::flag("limit", DeclaredType::Int).short('n').default_value("10"))
        .param(ParameterDescriptor::flag("fields", DeclaredType::list(DeclaredType::Str)).short('f')),
    ]
}

fn task_commands(handle: &Arc<OnceLock<WeakInterpreter>>) -> Vec<CommandDescriptor> {
    let submitter = Arc::clone(handle);
    let lister = Arc::clone(handle);
    let reader = Arc::clone(handle);

    vec![
        CommandDescriptor::command("bg", move |args| {
            let text = args.str(0)?.trim();
            let (name, line) = text
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("usage: bg <task> <command line>"))?;
            let task = interpreter(&submitter)?.submit(name, line.trim())?;
            debug!(task = task.name(), generation = task.generation(), "submitted");
            Ok(json!({ "task": task.name(), "generation": task.generation() }))
        })
        .category("tasks")
        .strategy(RAW_STRATEGY)
        .description("Run a command line as a named background task")
        .param(ParameterDescriptor::positional("line", DeclaredType::Str)),
        CommandDescriptor::command("tasks", move |args| {
            let interpreter = interpreter(&lister)?;
            if args.bool(0)? || args.bool(1)? {
                let removed = interpreter.clear_tasks(args.bool(1)?);
                return Ok(json!({ "removed": removed }));
            }
            Ok(serde_json::to_value(interpreter.list_tasks())?)
        })
        .category("tasks")
        .description("List tasks, or clear them with --clear / --done")
        .param(ParameterDescriptor::flag("clear", DeclaredType::Bool))
        .param(ParameterDescriptor::flag("done", DeclaredType::Bool).short('d')),
        CommandDescriptor::command("log", move |args| {
            let name = args.str(0)?;
            let lines = interpreter(&reader)?
                .show_output(name, args.int(1)?)
                .ok_or_else(|| anyhow!("no task named {name}"))?;
            Ok(Value::String(lines.join("\n")))
        })
        .alias("output")
        .category("tasks")
        .description("Show captured task output; a negative count shows everything")
        .param(ParameterDescriptor::positional("task", DeclaredType::Str).required())
        .param(ParameterDescriptor::flag("lines", DeclaredType::Int).short('n').default_value("-1")),
    ]
}

fn shell_commands(handle: &Arc<OnceLock<WeakInterpreter>>, exit: &Arc<AtomicBool>) -> Vec<CommandDescriptor> {
    let stop = Arc::clone(exit);
    let lister = Arc::clone(handle);

    vec![
        CommandDescriptor::command("help", move |_| Ok(describe(interpreter(&lister)?.registry())))
            .alias("?")
            .category("shell")
            .description("List commands by category"),
        CommandDescriptor::command("exit", move |_| {
            stop.store(true, Ordering::SeqCst);
            Ok(Value::Null)
        })
        .alias("quit")
        .category("shell"),
        CommandDescriptor::init("banner", || {
            debug!("parley shell ready");
            Ok(())
        }),
    ]
}

fn describe(registry: &CommandRegistry) -> Value {
    let mut categories: IndexMap<String, Vec<Value>> = IndexMap::new();
    for command in registry.commands() {
        let usage: Vec<String> = command
            .parameters
            .iter()
            .filter(|parameter| !matches!(parameter.declared_type, DeclaredType::Ambient(_)))
            .map(|parameter| parameter.label())
            .collect();
        categories.entry(command.category.clone()).or_default().push(json!({
            "name": command.name,
            "aliases": command.aliases,
            "usage": usage.join(" "),
            "description": command.description,
        }));
    }
    categories.sort_keys();
    json!(categories)
}
