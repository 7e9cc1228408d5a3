use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use student_registry_client::{
    EmptyReason, Listing, SortOrder, StudentListController, StudentsClient, DEFAULT_SERVER_URL,
    DEFAULT_TIMEOUT,
};
use student_registry_core::StudentPayload;

#[derive(Debug, Parser)]
#[command(name = "students")]
#[command(about = "Terminal front end for the student registry service")]
struct Cli {
    #[arg(long, env = "STUDENT_REGISTRY_SERVER", default_value = DEFAULT_SERVER_URL)]
    server: String,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List students, optionally filtered by name and sorted.
    List(ListArgs),
    /// Show one student.
    Show { id: String },
    /// Add a student.
    Add(AddArgs),
    /// Replace a student's fields; omitted flags keep the current value.
    Edit(EditArgs),
    /// Delete a student.
    Delete { id: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrderArg {
    Asc,
    Desc,
}

impl From<OrderArg> for SortOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Asc => SortOrder::Asc,
            OrderArg::Desc => SortOrder::Desc,
        }
    }
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long, default_value = "")]
    search: String,
    #[arg(long, value_enum, default_value_t = OrderArg::Asc)]
    order: OrderArg,
}

#[derive(Debug, Args)]
struct AddArgs {
    #[arg(long)]
    name: String,
    #[arg(long, allow_negative_numbers = true)]
    age: i64,
    #[arg(long = "class")]
    class_name: String,
}

#[derive(Debug, Args)]
struct EditArgs {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long, allow_negative_numbers = true)]
    age: Option<i64>,
    #[arg(long = "class")]
    class_name: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = StudentsClient::new(&cli.server, Duration::from_secs(cli.timeout_secs));
    let mut controller = StudentListController::new(client);

    let (value, code) = match run(cli.command, &mut controller) {
        Ok(value) => (value, ExitCode::SUCCESS),
        Err(err) => (json!({ "error": format!("{err:#}") }), ExitCode::FAILURE),
    };
    match serde_json::to_string_pretty(&value) {
        Ok(body) => println!("{body}"),
        Err(err) => {
            eprintln!("failed to render output: {err}");
            return ExitCode::FAILURE;
        }
    }
    code
}

fn run(command: Command, controller: &mut StudentListController) -> Result<Value> {
    match command {
        Command::List(args) => run_list(&args, controller),
        Command::Show { id } => to_json(&controller.fetch(&id)?),
        Command::Add(args) => {
            let draft = StudentPayload::new(args.name, args.age, args.class_name);
            controller.load().context("failed to load students")?;
            to_json(&controller.create(&draft)?)
        }
        Command::Edit(args) => run_edit(args, controller),
        Command::Delete { id } => {
            controller.load().context("failed to load students")?;
            to_json(&controller.delete(&id)?)
        }
    }
}

fn run_list(args: &ListArgs, controller: &mut StudentListController) -> Result<Value> {
    controller.load().context("failed to load students")?;
    let view = controller.view_mut();
    view.set_search_term(args.search.as_str());
    view.set_sort_order(args.order.into());

    let view = controller.view();
    let (students, empty) = match view.listing() {
        Listing::Rows(rows) => (to_json(&rows)?, Value::Null),
        Listing::Empty(EmptyReason::NoStudents) => (json!([]), json!("no_students")),
        Listing::Empty(EmptyReason::NoMatches) => (json!([]), json!("no_matches")),
        Listing::Loading | Listing::Failed(_) => {
            anyhow::bail!("student list is not ready")
        }
    };
    Ok(json!({
        "search": view.search_term(),
        "order": view.sort_order().as_str(),
        "visible_count": view.visible_count(),
        "total_count": view.total_count(),
        "empty": empty,
        "students": students,
    }))
}

fn run_edit(args: EditArgs, controller: &mut StudentListController) -> Result<Value> {
    controller.load().context("failed to load students")?;
    let current = controller.fetch(&args.id)?;
    let draft = StudentPayload::new(
        args.name.unwrap_or(current.name),
        args.age.unwrap_or_else(|| i64::from(current.age)),
        args.class_name.unwrap_or(current.class_name),
    );
    to_json(&controller.update(&args.id, &draft)?)
}

fn to_json<T>(value: &T) -> Result<Value>
where
    T: serde::Serialize,
{
    serde_json::to_value(value).context("failed to serialize output")
}
