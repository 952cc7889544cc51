use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use sieveform::ast::Script;
use sieveform::config::settings::{self, Settings};
use sieveform::store::script_io;
use sieveform::{
    declared_capabilities, generate, logging, parse_with, required_capabilities, Diagnostic,
};

/// Parse, check and reformat SIEVE mail filtering scripts.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Log filter directive, e.g. `debug` or `sieveform=trace`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Settings file to use instead of the per-user one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the AST of a script as JSON.
    Parse {
        /// Script to read, `-` for stdin.
        file: PathBuf,
        /// Leave source locations out of the output.
        #[arg(long)]
        no_locations: bool,
    },
    /// Rewrite a script in canonical form.
    Format {
        file: PathBuf,
        #[command(flatten)]
        layout: Layout,
        /// Exit non-zero if the file is not already canonical; write nothing.
        #[arg(long)]
        check: bool,
        /// Write here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Report the first error in each script.
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Produce SIEVE source from a JSON AST.
    Generate {
        file: PathBuf,
        #[command(flatten)]
        layout: Layout,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List capabilities a script uses and which of them it forgot to require.
    Requires { file: PathBuf },
    /// Show the settings file location and effective settings.
    Config {
        /// Write a default settings file if none exists yet.
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args)]
struct Layout {
    /// Spaces per nesting level.
    #[arg(long)]
    indent: Option<usize>,
    /// Emit CRLF line endings.
    #[arg(long)]
    crlf: bool,
}

impl Layout {
    fn apply(&self, settings: &Settings) -> sieveform::GeneratorOptions {
        let mut options = settings.generator_options();
        if let Some(width) = self.indent {
            options.indent = " ".repeat(width);
        }
        if self.crlf {
            options.newline = "\r\n".to_string();
        }
        options
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => settings::load_settings_from(path),
        None => settings::load_settings(),
    };
    logging::init_logging(cli.log_level.as_deref(), &settings.log_level);

    match &cli.command {
        Commands::Parse { file, no_locations } => cmd_parse(file, *no_locations, &settings),
        Commands::Format { file, layout, check, output } => {
            cmd_format(file, layout, *check, output.as_deref(), &settings)
        }
        Commands::Check { files } => cmd_check(files, &settings),
        Commands::Generate { file, layout, output } => {
            cmd_generate(file, layout, output.as_deref(), &settings)
        }
        Commands::Requires { file } => cmd_requires(file, &settings),
        Commands::Config { init } => cmd_config(cli.config.as_deref(), *init, &settings),
    }
}

/// Parse `file`, printing a rendered diagnostic to stderr on failure.
fn load_and_parse(file: &Path, settings: &Settings, locations: bool) -> Result<Option<Script>> {
    let source = read_input(file)?;
    let options = sieveform::ParseOptions { locations, ..settings.parse_options() };
    match parse_with(&source, &options) {
        Ok(script) => Ok(Some(script)),
        Err(diag) => {
            report(&diag, &source, file);
            Ok(None)
        }
    }
}

fn read_input(file: &Path) -> Result<String> {
    script_io::load_script(file).with_context(|| format!("reading {}", file.display()))
}

fn report(diag: &Diagnostic, source: &str, file: &Path) {
    eprintln!("{}", diag.render(source, &script_io::display_name(file)));
}

fn with_trailing_newline(mut text: String, newline: &str) -> String {
    if !text.is_empty() {
        text.push_str(newline);
    }
    text
}

fn cmd_parse(file: &Path, no_locations: bool, settings: &Settings) -> Result<ExitCode> {
    let Some(script) = load_and_parse(file, settings, !no_locations)? else {
        return Ok(ExitCode::FAILURE);
    };
    let json = serde_json::to_string_pretty(&script)?;
    println!("{json}");
    Ok(ExitCode::SUCCESS)
}

fn cmd_format(
    file: &Path,
    layout: &Layout,
    check: bool,
    output: Option<&Path>,
    settings: &Settings,
) -> Result<ExitCode> {
    let source = read_input(file)?;
    let script = match parse_with(&source, &settings.parse_options()) {
        Ok(script) => script,
        Err(diag) => {
            report(&diag, &source, file);
            return Ok(ExitCode::FAILURE);
        }
    };
    let options = layout.apply(settings);
    let formatted = with_trailing_newline(generate(&script, &options), &options.newline);
    if check {
        if formatted == source {
            return Ok(ExitCode::SUCCESS);
        }
        eprintln!("{} is not canonically formatted", script_io::display_name(file));
        return Ok(ExitCode::FAILURE);
    }
    script_io::save_script(output, &formatted).context("writing formatted script")?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_check(files: &[PathBuf], settings: &Settings) -> Result<ExitCode> {
    let mut failed = 0usize;
    for file in files {
        if load_and_parse(file, settings, true)?.is_none() {
            failed += 1;
        }
    }
    if failed > 0 {
        eprintln!("{failed} of {} script(s) failed to parse", files.len());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_generate(
    file: &Path,
    layout: &Layout,
    output: Option<&Path>,
    settings: &Settings,
) -> Result<ExitCode> {
    let json = read_input(file)?;
    let script: Script = serde_json::from_str(&json).context("decoding JSON AST")?;
    let options = layout.apply(settings);
    let text = with_trailing_newline(generate(&script, &options), &options.newline);
    script_io::save_script(output, &text).context("writing generated script")?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_requires(file: &Path, settings: &Settings) -> Result<ExitCode> {
    let Some(script) = load_and_parse(file, settings, false)? else {
        return Ok(ExitCode::FAILURE);
    };
    let declared = declared_capabilities(&script);
    let mut missing = false;
    for cap in required_capabilities(&script) {
        if declared.contains(&cap) {
            println!("{cap}");
        } else {
            println!("{cap} (not required)");
            missing = true;
        }
    }
    Ok(if missing { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn cmd_config(explicit: Option<&Path>, init: bool, settings: &Settings) -> Result<ExitCode> {
    let path = explicit.map(Path::to_path_buf).or_else(settings::settings_path);
    match &path {
        Some(path) => println!("settings file: {}", path.display()),
        None => println!("settings file: (no config directory)"),
    }
    if init {
        let Some(path) = &path else {
            anyhow::bail!("no config directory to write settings into");
        };
        let written = settings::init_settings(path)
            .with_context(|| format!("writing {}", path.display()))?;
        if !written {
            println!("settings file already exists; left unchanged");
        }
    }
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(ExitCode::SUCCESS)
}
