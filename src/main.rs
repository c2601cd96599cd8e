use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use protein::interp::Interpreter;
use protein::loader;
use protein::schema::default_schema;
use protein::serializer;

fn usage() -> ! {
    eprintln!("Usage: protein <run|check> <input.yaml> [--format yaml|json|toml|python] [--out <file>] [--validate]");
    std::process::exit(2);
}

struct Args {
    command: String,
    input: PathBuf,
    format: String,
    out: Option<PathBuf>,
    validate: bool,
}

fn parse_args() -> Args {
    let mut it = env::args().skip(1);
    let command = it.next().unwrap_or_else(|| usage());
    let input = it.next().map(PathBuf::from).unwrap_or_else(|| usage());
    let mut format = "yaml".to_string();
    let mut out = None;
    let mut validate = command == "check";
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--format" => format = it.next().unwrap_or_else(|| usage()),
            "--out" => out = Some(PathBuf::from(it.next().unwrap_or_else(|| usage()))),
            "--validate" => validate = true,
            _ => usage(),
        }
    }
    Args {
        command,
        input,
        format,
        out,
        validate,
    }
}

fn run() -> Result<(), protein::error::ErrorSet> {
    env_logger::init();
    let args = parse_args();

    let source = std::fs::read_to_string(&args.input)
        .map_err(|e| protein::kinded_err!(protein::error::Kind::LoadError, "{e}"))?;
    let doc = loader::load(&source)?;

    if args.validate {
        default_schema().validate_first(&doc)?;
    }

    if args.command == "check" {
        println!("ok");
        return Ok(());
    }

    let source_dir = args
        .input
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut interpreter = Interpreter::new(source_dir);
    let result = interpreter.process_node(&doc)?;
    let tree = result.map(|s| s.value).unwrap_or(protein::node::Node::Null);
    let text = serializer::serialize(&tree, &args.format)?;

    match args.out {
        Some(path) => std::fs::write(&path, text)
            .map_err(|e| protein::kinded_err!(protein::error::Kind::LoadError, "{e}"))?,
        None => println!("{text}"),
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(errors) => {
            let content = std::fs::read(env::args().nth(2).unwrap_or_default()).unwrap_or_default();
            for report in errors.report(&content) {
                eprintln!("{report}");
            }
            ExitCode::FAILURE
        }
    }
}
