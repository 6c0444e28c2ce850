use crate::cli::{Cli, Commands, DiagsArgs};
use crate::config::DiagsConfig;
use crate::diags::{self, DiagsError, DiagsSummary};
use crate::progress::{ProgressConfig, ProgressDriver};
use crate::report::{self, Report};
use crate::schema::{EventCollector, EventType};
use color_eyre::eyre::Result;
use std::io::{self, IsTerminal, Write};

pub fn execute(cli: Cli) -> Result<()> {
    let progress = ProgressDriver::new(ProgressConfig {
        mode: cli.progress,
        is_tty: io::stderr().is_terminal(),
    });
    let mut events = EventCollector::new();
    events.set_listener(progress.listener());

    // Record command start
    events.event(EventType::CommandStart);

    let report = match &cli.command {
        Commands::Diags(args) => {
            let result = run_diags(args, &mut events);
            progress.finish();
            events.set_listener(None);
            report::render(result, cli.format, events)
        }
    };

    emit(&report)?;

    // Exit with the failure class's code
    if !report.is_success() {
        std::process::exit(report.exit_code);
    }
    Ok(())
}

fn run_diags(args: &DiagsArgs, events: &mut EventCollector) -> Result<DiagsSummary, DiagsError> {
    let config = DiagsConfig::load(args.into())?;
    let (collector, uploader) = diags::build(&config)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| DiagsError::Unexpected(format!("failed to start async runtime: {err}")))?;

    runtime.block_on(diags::run_until(
        &collector,
        &uploader,
        events,
        diags::interrupted(),
    ))
}

fn emit(report: &Report) -> Result<()> {
    let stderr = io::stderr();
    let mut stderr = stderr.lock();
    for line in &report.stderr {
        writeln!(stderr, "{line}")?;
    }

    if let Some(out) = &report.stdout {
        let stdout = io::stdout();
        let mut stdout = stdout.lock();
        writeln!(stdout, "{out}")?;
        stdout.flush()?;
    }
    Ok(())
}
