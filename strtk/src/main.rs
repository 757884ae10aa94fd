use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use piecewise::SentencePieceModel;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::exit;
use strtensor::{
    DecomposedStrings, OperatorConfig, PackMode, PackedStrings, SentencepieceTokenizer,
    StringConverter, StringTensor, TensorSpec, TokenizerOptions, WireFormat,
};
use tracing::*;
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    globals: Globals,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Globals {
    /// Read settings from a JSON config file.  Command line options take precedence.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Turn debugging information on
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    debug: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack newline separated strings into a packed string tensor
    Pack {
        /// File of strings, one per line, or `-` for stdin
        input: PathBuf,

        /// Write the packed tensor here instead of to stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print every string in a packed string tensor on its own line
    Unpack {
        /// Packed string tensor file, or `-` for stdin
        input: PathBuf,
    },

    /// Tokenize sentences and print the sparse token ids as JSON
    Tokenize {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        options: TokenizerArgs,

        /// The input is a packed string tensor rather than one sentence per line
        #[arg(long)]
        packed: bool,

        /// Sentences, or `-` for stdin
        input: PathBuf,
    },

    /// Describe a SentencePiece model
    Inspect {
        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// SentencePiece `.model` file
    #[arg(short, long, value_name = "FILE", env = "STRTK_MODEL")]
    model: Option<PathBuf>,
}

#[derive(Args)]
struct TokenizerArgs {
    /// Sample from this many of the best segmentations; 0 or 1 always picks the best one
    #[arg(long, allow_negative_numbers = true)]
    nbest_size: Option<i32>,

    /// Sampling smoothing, or the dropout probability for BPE models
    #[arg(long)]
    alpha: Option<f32>,

    /// Start each sequence with the beginning of sentence id
    #[arg(long)]
    add_bos: bool,

    /// End each sequence with the end of sentence id
    #[arg(long)]
    add_eos: bool,

    /// Accepted for compatibility; has no effect
    #[arg(long)]
    reverse: bool,
}

/// Settings that can come from the `--config` file
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct ToolConfig {
    model: Option<PathBuf>,
    tokenizer: TokenizerOptions,
    pack_mode: PackMode,
}

impl ToolConfig {
    fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file '{}'", path.display()))?;
        debug!(?config, "Loaded config from {}", path.display());
        Ok(config)
    }

    fn model_path(&self, args: &ModelArgs) -> anyhow::Result<PathBuf> {
        args.model
            .clone()
            .or_else(|| self.model.clone())
            .context("No model given; use --model, STRTK_MODEL, or the config file")
    }

    fn tokenizer_options(&self, args: &TokenizerArgs) -> TokenizerOptions {
        let mut options = self.tokenizer.clone();
        if let Some(nbest_size) = args.nbest_size {
            options.nbest_size = nbest_size;
        }
        if let Some(alpha) = args.alpha {
            options.alpha = alpha;
        }
        options.add_bos |= args.add_bos;
        options.add_eos |= args.add_eos;
        options.reverse |= args.reverse;
        options
    }
}

/// Summary printed by `inspect`
#[derive(Serialize)]
struct ModelSummary {
    kind: String,
    pieces: usize,
    byte_fallback: bool,
    unk_id: u32,
    bos_id: Option<u32>,
    eos_id: Option<u32>,
    pad_id: Option<u32>,
}

impl Commands {
    fn execute(self, globals: &Globals) -> anyhow::Result<()> {
        use Commands::*;

        let config = ToolConfig::load(globals.config.as_deref())?;
        let converter = StringConverter::new(config.pack_mode);
        let mut stdout = std::io::stdout().lock();

        match self {
            Pack { input, output } => {
                let packed = pack(&converter, &read_input(&input)?)?;
                match output {
                    Some(path) => std::fs::write(&path, packed.as_bytes())
                        .with_context(|| format!("Failed to write '{}'", path.display()))?,
                    None => stdout.write_all(packed.as_bytes())?,
                }
                info!(batch_size = packed.batch_size(), "Packed strings");
            }
            Unpack { input } => {
                unpack(&converter, read_input(&input)?, &mut stdout)?;
            }
            Tokenize {
                model,
                options,
                packed,
                input,
            } => {
                let model_path = config.model_path(&model)?;
                let model_bytes = std::fs::read(&model_path).with_context(|| {
                    format!("Failed to read model file '{}'", model_path.display())
                })?;

                tokenize(
                    &model_bytes,
                    config.tokenizer_options(&options),
                    config.pack_mode,
                    packed,
                    read_input(&input)?,
                    &mut stdout,
                )?;
            }
            Inspect { model } => {
                let model = SentencePieceModel::open(config.model_path(&model)?)?;
                inspect(&model, &mut stdout)?;
            }
        }

        stdout.flush()?;
        Ok(())
    }
}

/// Read a whole input file, with `-` meaning stdin
fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if path == Path::new("-") {
        std::io::stdin().lock().read_to_end(&mut bytes)?;
    } else {
        bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read input file '{}'", path.display()))?;
    }
    Ok(bytes)
}

/// Split text into lines.  A final newline ends the last line rather than starting an empty one.
fn lines(input: &[u8]) -> Vec<&[u8]> {
    let input = input.strip_suffix(b"\n").unwrap_or(input);
    if input.is_empty() {
        return Vec::new();
    }

    input
        .split(|&byte| byte == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect()
}

fn pack(converter: &StringConverter, input: &[u8]) -> anyhow::Result<PackedStrings> {
    let strings = DecomposedStrings::from_strings(lines(input))?;
    Ok(converter.pack(&strings)?)
}

fn unpack(converter: &StringConverter, input: Vec<u8>, out: &mut impl Write) -> anyhow::Result<()> {
    let tensor = StringTensor::from(PackedStrings::from_bytes(input)?);
    for string in converter.unpack(&tensor)?.iter() {
        out.write_all(String::from_utf8_lossy(string).as_bytes())?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn tokenize(
    model_bytes: &[u8],
    options: TokenizerOptions,
    pack_mode: PackMode,
    packed: bool,
    input: Vec<u8>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let (wire_format, tensor) = if packed {
        (
            WireFormat::Packed,
            StringTensor::from(PackedStrings::from_bytes(input)?),
        )
    } else {
        (
            WireFormat::Decomposed,
            StringTensor::from(DecomposedStrings::from_strings(lines(&input))?),
        )
    };

    let inputs = wire_format
        .inputs()
        .iter()
        .map(|&(_, element)| TensorSpec::vector(element))
        .collect::<Vec<_>>();
    let operator = SentencepieceTokenizer::new(
        &inputs,
        model_bytes,
        options,
        OperatorConfig {
            wire_format,
            pack_mode,
        },
    )?;

    let sparse = operator.evaluate(&tensor)?;
    debug!(
        batch_size = tensor.len(),
        tokens = sparse.len(),
        "Tokenized input"
    );

    serde_json::to_writer_pretty(&mut *out, &sparse)?;
    out.write_all(b"\n")?;
    Ok(())
}

fn inspect(model: &SentencePieceModel, out: &mut impl Write) -> anyhow::Result<()> {
    let summary = ModelSummary {
        kind: model.kind().to_string(),
        pieces: model.len(),
        byte_fallback: model.byte_fallback(),
        unk_id: model.unk_id(),
        bos_id: model.bos_id(),
        eos_id: model.eos_id(),
        pad_id: model.pad_id(),
    };

    serde_json::to_writer_pretty(&mut *out, &summary)?;
    out.write_all(b"\n")?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let default_log_directive = match cli.globals.debug {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    // Logs go to stderr so they never mix with packed or JSON output on stdout
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_log_directive.into())
                .from_env_lossy(),
        )
        .json()
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    if let Err(e) = cli.command.execute(&cli.globals) {
        error!("{:#}", e);
        exit(1);
    } else {
        debug!("command executed successfully");
    }
}
