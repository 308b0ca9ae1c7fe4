use clap::Parser;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Run a command or pipeline with explicit stream redirection"
)]
pub struct Cli {
    /// Command template; `|` separates pipeline stages, `%s` marks a
    /// positional placeholder.
    pub template: String,

    /// Values substituted for `%s` placeholders, left to right.
    pub args: Vec<String>,

    /// Capture stdout instead of inheriting it; printed after exit.
    #[arg(long)]
    pub capture: bool,

    /// Capture stderr as well.
    #[arg(long)]
    pub capture_stderr: bool,

    /// Write this string to the first stage's stdin, then close it.
    #[arg(long)]
    pub input: Option<String>,

    /// Fail if the process has not exited after this many seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Stream output line by line and fail fast on a nonzero exit.
    #[arg(long)]
    pub lines: bool,

    /// Error out on a nonzero exit or a signal death.
    #[arg(long)]
    pub check: bool,

    /// Print the completion record as JSON instead of raw output.
    #[arg(long)]
    pub json: bool,
}
