use clap::Parser;
use mdlive::{CapabilitySet, Document, EvalOptions};
use miette::{IntoDiagnostic, miette};
use std::io::{self, BufWriter, IsTerminal, Read, Write};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Default)]
#[command(name = "mdlive")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To evaluate the fragments of a document:\n\
    mdlive README.md\n\n\
    ## To read from stdin with a 500ms limit per fragment:\n\
    cat README.md | mdlive --time-limit 0.5\n\n\
    ## To render without evaluating:\n\
    mdlive --no-eval README.md")]
#[command(
    about = "mdlive runs the eval fragments of a markdown document in a sandbox and renders the result.",
    long_about = None
)]
pub struct Cli {
    #[clap(flatten)]
    eval: EvalArgs,

    #[clap(flatten)]
    output: OutputArgs,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Markdown file to read; stdin when omitted
    file: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Html,
    Json,
    Text,
}

#[derive(Clone, Debug, clap::Args)]
struct EvalArgs {
    /// Time limit per fragment, in seconds
    #[arg(short = 't', long, default_value_t = mdlive::DEFAULT_TIME_LIMIT.as_secs_f64())]
    time_limit: f64,

    /// Memory quota per document, in bytes
    #[arg(short = 'm', long, default_value_t = mdlive::DEFAULT_MEMORY_LIMIT)]
    memory_limit: usize,

    /// Do not grant the host module to fragments
    #[arg(long, default_value_t = false)]
    no_host: bool,

    /// Render the document without evaluating fragments
    #[arg(long, default_value_t = false)]
    no_eval: bool,
}

impl Default for EvalArgs {
    fn default() -> Self {
        Self {
            time_limit: mdlive::DEFAULT_TIME_LIMIT.as_secs_f64(),
            memory_limit: mdlive::DEFAULT_MEMORY_LIMIT,
            no_host: false,
            no_eval: false,
        }
    }
}

#[derive(Clone, Debug, clap::Args, Default)]
struct OutputArgs {
    /// Set output format
    #[arg(short = 'F', long, value_enum, default_value_t)]
    output_format: OutputFormat,

    /// Write the result to a file instead of stdout
    #[arg(short = 'o', long)]
    output_file: Option<PathBuf>,
}

impl Cli {
    pub fn run(&self) -> miette::Result<()> {
        self.init_logging();

        let options = self.eval_options()?;
        let content = self.read_content()?;
        tracing::debug!(bytes = content.len(), no_eval = self.eval.no_eval, "input read");
        let document = content.parse::<Document>().into_diagnostic()?;

        let document = if self.eval.no_eval {
            document
        } else {
            mdlive::transform(document, &options)?
        };

        self.print(&document)
    }

    fn init_logging(&self) {
        let level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    }

    fn eval_options(&self) -> miette::Result<EvalOptions> {
        let time_limit = Duration::try_from_secs_f64(self.eval.time_limit)
            .map_err(|e| miette!("Invalid time limit {}: {}", self.eval.time_limit, e))?;
        let capabilities = if self.eval.no_host {
            CapabilitySet::none()
        } else {
            CapabilitySet::default()
        };

        EvalOptions::new(time_limit)
            .and_then(|options| options.with_memory_limit(self.eval.memory_limit))
            .map(|options| options.with_capabilities(capabilities))
            .into_diagnostic()
    }

    fn read_content(&self) -> miette::Result<String> {
        match &self.file {
            Some(file) => fs::read_to_string(file)
                .map_err(|e| miette!("Failed to read {}: {}", file.display(), e)),
            None => {
                if io::stdin().is_terminal() {
                    return Ok(String::new());
                }

                let mut input = String::new();
                io::stdin().read_to_string(&mut input).into_diagnostic()?;
                Ok(input)
            }
        }
    }

    fn render(&self, document: &Document) -> miette::Result<String> {
        match self.output.output_format {
            OutputFormat::Html => Ok(document.to_html()),
            OutputFormat::Json => document.to_json().into_diagnostic(),
            OutputFormat::Text => Ok(document.to_text()),
        }
    }

    fn print(&self, document: &Document) -> miette::Result<()> {
        let rendered = self.render(document)?;
        let stdout = io::stdout();
        let mut handle: Box<dyn Write> = if let Some(output_file) = &self.output.output_file {
            let file = fs::File::create(output_file).into_diagnostic()?;
            Box::new(BufWriter::new(file))
        } else {
            Box::new(BufWriter::new(stdout.lock()))
        };

        writeln!(handle, "{}", rendered).into_diagnostic()?;
        handle.flush().into_diagnostic()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use scopeguard::defer;
    use std::{fs::File, path::PathBuf};

    use super::*;

    fn create_file(name: &str, content: &str) -> PathBuf {
        let temp_file_path = std::env::temp_dir().join(name);
        let mut file = File::create(&temp_file_path).expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");

        temp_file_path
    }

    fn cli(eval: EvalArgs) -> Cli {
        Cli {
            eval,
            ..Cli::default()
        }
    }

    #[test]
    fn test_default_options() {
        let options = cli(EvalArgs::default()).eval_options().unwrap();

        assert_eq!(options, EvalOptions::default());
    }

    #[rstest]
    #[case::zero(0.0)]
    #[case::negative(-1.0)]
    #[case::nan(f64::NAN)]
    fn test_invalid_time_limit(#[case] time_limit: f64) {
        let cli = cli(EvalArgs {
            time_limit,
            ..EvalArgs::default()
        });

        assert!(cli.eval_options().is_err());
    }

    #[test]
    fn test_no_host_withholds_capabilities() {
        let cli = cli(EvalArgs {
            no_host: true,
            ..EvalArgs::default()
        });

        assert_eq!(
            cli.eval_options().unwrap().capabilities(),
            &CapabilitySet::none()
        );
    }

    #[test]
    fn test_run_writes_output_file() {
        let input = create_file("mdlive_cli_input.md", "# Title\n");
        let output = std::env::temp_dir().join("mdlive_cli_output.html");
        let input_clone = input.clone();
        let output_clone = output.clone();

        defer! {
            if input_clone.exists() {
                std::fs::remove_file(&input_clone).expect("Failed to delete temp file");
            }
            if output_clone.exists() {
                std::fs::remove_file(&output_clone).expect("Failed to delete temp file");
            }
        }

        let cli = Cli {
            output: OutputArgs {
                output_file: Some(output.clone()),
                ..OutputArgs::default()
            },
            file: Some(input),
            ..Cli::default()
        };

        assert!(cli.run().is_ok());
        assert_eq!(fs::read_to_string(&output).unwrap(), "<h1>Title</h1>\n");
    }
}
