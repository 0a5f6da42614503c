use std::path::PathBuf;

use ehindex::{
    process_from_stdin, run_repl, setup_index, DEFAULT_INDEX_DIR, DEFAULT_INDEX_NAME,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

struct Args {
    is_repl: bool,
    dir: PathBuf,
    name: String,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        is_repl: false,
        dir: PathBuf::from(DEFAULT_INDEX_DIR),
        name: DEFAULT_INDEX_NAME.to_string(),
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--repl" => args.is_repl = true,
            "--dir" => args.dir = iter.next().ok_or("--dir needs a path")?.into(),
            "--name" => args.name = iter.next().ok_or("--name needs a value")?,
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{}", err);
            eprintln!("usage: ehindex [--repl] [--dir <path>] [--name <name>]");
            std::process::exit(2);
        }
    };

    let result = match setup_index(&args.dir, &args.name).await {
        Ok(index) if args.is_repl => run_repl(index).await,
        Ok(index) => process_from_stdin(index).await,
        Err(err) => Err(err),
    };

    // stdin is read on a blocking thread that would keep the runtime alive
    if let Err(err) = result {
        tracing::error!(error = %err, "ehindex failed");
        std::process::exit(1);
    }
    std::process::exit(0);
}
