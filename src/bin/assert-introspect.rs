use std::io::Write as _;

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};

use assert_introspect::pipeline::{rewrite, CollectDiagnostics};
use assert_introspect::report::fail_and_abort;
use assert_introspect::{CType, MapEnv, Outcome, ReportStyle, Scope, Value};

#[derive(Parser, Debug)]
#[command(name = "assert-introspect", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a C-style condition and, if it is false, print the
    /// introspection report and abort like a failed assert.
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// The condition, e.g. 'n == 5 && m < 2'.
    expr: String,

    /// Bind an int variable, NAME=VALUE. Repeatable.
    #[arg(long = "int", value_name = "NAME=VALUE")]
    ints: Vec<String>,

    /// Bind a char* variable to a string, NAME=TEXT. Repeatable.
    #[arg(long = "str", value_name = "NAME=TEXT")]
    strs: Vec<String>,

    /// Bind a char* variable to NULL. Repeatable.
    #[arg(long = "null", value_name = "NAME")]
    nulls: Vec<String>,

    /// Bind an unmodelled lvalue (member access, subscript) to an int
    /// value, TEXT=VALUE. Repeatable.
    #[arg(long = "opaque", value_name = "TEXT=VALUE")]
    opaques: Vec<String>,

    /// Color the report so each subexpression lines up across the
    /// symbolic form, the value form and the list.
    #[arg(long, default_value_t = false)]
    color: bool,

    /// Emit the failure report as JSON and exit 1 instead of aborting.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Check(args) => cmd_check(args),
    }
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let mut scope = Scope::new();
    let mut env = MapEnv::new();

    for binding in &args.ints {
        let (name, value) = split_binding(binding)?;
        let value: i64 = value
            .parse()
            .with_context(|| format!("parse int binding '{binding}'"))?;
        scope = scope.declare_var(name, CType::int());
        env = env.with_int(name, value);
    }
    for binding in &args.strs {
        let (name, text) = split_binding(binding)?;
        scope = scope.declare_var(name, CType::char_ptr());
        env = env.with_str(name, text);
    }
    for name in &args.nulls {
        scope = scope.declare_var(name, CType::char_ptr());
        env = env.with_null(name);
    }
    for binding in &args.opaques {
        let (text, value) = split_binding(binding)?;
        let value: i64 = value
            .parse()
            .with_context(|| format!("parse opaque binding '{binding}'"))?;
        scope = scope.declare_opaque(text, CType::int());
        env = env.with_opaque(text, Value::int(value));
    }

    let expr = assert_introspect::parse_condition(&args.expr, &scope)?;
    let mut diagnostics = CollectDiagnostics::default();
    let Some(site) = rewrite(&args.expr, &expr, &mut diagnostics) else {
        for message in &diagnostics.messages {
            eprintln!("{message}");
        }
        bail!("condition was not rewritten");
    };

    let style = ReportStyle { color: args.color };
    match site.evaluate(&mut env, style)? {
        Outcome::Passed => {
            println!("assertion passed");
            Ok(())
        }
        Outcome::Failed(report) => {
            if args.json {
                let mut stdout = std::io::stdout().lock();
                serde_json::to_writer_pretty(&mut stdout, &report)
                    .context("serialize failure report")?;
                writeln!(stdout)?;
                std::process::exit(1);
            }
            fail_and_abort(&report)
        }
    }
}

fn split_binding(binding: &str) -> anyhow::Result<(&str, &str)> {
    binding
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("binding '{binding}' is not NAME=VALUE"))
}
