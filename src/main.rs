use anyhow::{Context, Result};
use clap::Parser;
use fdtrail::cli::{Cli, OutputFormat};
use fdtrail::filter::SyscallFilter;
use fdtrail::layout::EventLayout;
use fdtrail::replay::{replay_file, ReplayConfig};
use fdtrail::report::{dump_state, Report};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let layout = match &args.layout {
        Some(path) => EventLayout::from_toml(path)?,
        None => EventLayout::lttng(),
    };

    let filter = if let Some(expr) = &args.filter {
        SyscallFilter::from_expr(expr)?
    } else {
        SyscallFilter::all()
    };

    let config = ReplayConfig { layout, filter };
    let outcome = replay_file(&args.trace, &config)
        .with_context(|| format!("Cannot replay {}", args.trace.display()))?;

    let time = args.at.or(outcome.end_time).unwrap_or(0);
    let report = Report::build(&outcome.state, &outcome.stats, time);

    match args.format {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Text => print!("{}", report.to_text()),
    }

    if args.dump {
        println!();
        print!("{}", dump_state(&outcome.state, time));
    }

    Ok(())
}
