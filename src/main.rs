use clap::Parser;
use pipespawn::{cli, logging, Command, Completed, Pipeline, Runnable, StreamMode};
use std::io::Write;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    logging::init();

    let args: Vec<&str> = cli.args.iter().map(String::as_str).collect();
    if cli.template.contains('|') {
        let mut pipeline = Pipeline::new(&cli.template, &args)?;
        if cli.lines {
            pipeline = pipeline.stdout(StreamMode::Interact)?;
        } else if cli.capture || cli.json {
            pipeline = pipeline.stdout(StreamMode::Capture)?;
        }
        if cli.capture_stderr || cli.json {
            pipeline = pipeline.stderr(StreamMode::Capture)?;
        }
        execute(pipeline, &cli)
    } else {
        let mut command = Command::new(&cli.template, &args);
        if cli.lines {
            command = command.stdout(StreamMode::Interact)?;
        } else if cli.capture || cli.json {
            command = command.stdout(StreamMode::Capture)?;
        }
        if cli.capture_stderr || cli.json {
            command = command.stderr(StreamMode::Capture)?;
        }
        execute(command, &cli)
    }
}

fn execute<R: Runnable>(mut runnable: R, cli: &cli::Cli) -> anyhow::Result<()> {
    let input = cli.input.as_deref().map(str::as_bytes);
    if cli.lines {
        for line in runnable.iterate(input)? {
            println!("{}", line?);
        }
        return Ok(());
    }

    let timeout = cli.timeout_secs.map(Duration::from_secs);
    let done = runnable.run(input, timeout)?;
    if cli.check {
        done.check()?;
    }
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&Report::from(&done))?);
        return Ok(());
    }
    if let Some(stdout) = &done.stdout {
        std::io::stdout().write_all(stdout)?;
    }
    if let Some(stderr) = &done.stderr {
        std::io::stderr().write_all(stderr)?;
    }
    if !done.success() {
        log::warn!("{:?} exited with {}", done.argv, done.status);
        std::process::exit(done.code().unwrap_or(1));
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct Report {
    argv: Vec<String>,
    code: Option<i32>,
    signal: Option<i32>,
    stdout: Option<String>,
    stderr: Option<String>,
}

impl From<&Completed> for Report {
    fn from(done: &Completed) -> Report {
        use std::os::unix::process::ExitStatusExt;
        Report {
            argv: done.argv.clone(),
            code: done.code(),
            signal: done.status.signal(),
            stdout: done
                .stdout
                .as_ref()
                .map(|buf| String::from_utf8_lossy(buf).into_owned()),
            stderr: done
                .stderr
                .as_ref()
                .map(|buf| String::from_utf8_lossy(buf).into_owned()),
        }
    }
}
