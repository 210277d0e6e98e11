use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use prompt_session::presets::Preset;
use prompt_session::storage::settings::{default_config_path, load_config, save_config};
use prompt_session::{ModelSource, PromptSession, SamplingOverrides, SessionConfig};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PresetArg {
    Llama2Chat,
    Llama2Demo,
    TextToSql,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Llama2Chat => Preset::Llama2Chat,
            PresetArg::Llama2Demo => Preset::Llama2Demo,
            PresetArg::TextToSql => Preset::TextToSql,
        }
    }
}

#[derive(Parser)]
#[command(name = "prompt-session")]
#[command(about = "Run a prompt template against a local GGUF model")]
#[command(version)]
struct Cli {
    /// Session config file (JSON). Defaults to the data dir's session.json
    #[arg(short = 'C', long, conflicts_with = "preset")]
    config: Option<PathBuf>,

    /// Use a built-in prompt preset instead of a config file
    #[arg(short, long, value_enum)]
    preset: Option<PresetArg>,

    /// Model path, `hf:user/repo/file.gguf`, or a huggingface.co URL
    #[arg(short, long)]
    model: Option<String>,

    #[arg(long)]
    max_tokens: Option<u32>,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long)]
    top_p: Option<f32>,

    #[arg(long)]
    top_k: Option<u32>,

    #[arg(long)]
    repeat_penalty: Option<f32>,

    #[arg(long)]
    seed: Option<u32>,

    /// Print the rendered prompt before the completion (`--echo` or `--echo=false`)
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    echo: Option<bool>,

    /// Stop sequence (repeatable)
    #[arg(long)]
    stop: Vec<String>,

    /// Layers to offload to the GPU
    #[arg(long)]
    gpu_layers: Option<u32>,

    #[arg(long)]
    threads: Option<u32>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Set log level (off, error, warn, info, debug, trace); RUST_LOG wins if set
    #[arg(short = 'l', long, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Text to substitute into the template. Reads stdin line by line if empty
    input: Vec<String>,
}

impl Cli {
    fn overrides(&self) -> SamplingOverrides {
        SamplingOverrides {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            repeat_penalty: self.repeat_penalty,
            echo: self.echo,
            seed: self.seed,
            stop: (!self.stop.is_empty()).then(|| self.stop.clone()),
        }
    }

    fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let model = self
            .model
            .as_deref()
            .map(ModelSource::parse)
            .transpose()
            .map_err(anyhow::Error::msg)?;

        let mut config = if let Some(preset) = self.preset {
            let preset = Preset::from(preset);
            let source = model.unwrap_or_else(|| preset.default_source());
            preset.config(source)
        } else {
            let path = match &self.config {
                Some(path) => path.clone(),
                None => default_config_path()?,
            };
            if !path.exists() {
                bail!(
                    "No session config at {}; pass --config <file> or --preset <name>",
                    path.display()
                );
            }
            let mut config = load_config(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if let Some(source) = model {
                config.source = source;
            }
            config
        };

        config.sampling = config.sampling.with_overrides(&self.overrides())?;
        if let Some(layers) = self.gpu_layers {
            config.load.n_gpu_layers = layers;
        }
        if let Some(threads) = self.threads {
            config.load.n_threads = threads;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level: LevelFilter = cli.log_level.into();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.session_config()?;

    if let Some(path) = &cli.save_config {
        config.validate()?;
        save_config(path, &config)?;
        println!("Saved configuration to {}", path.display());
        return Ok(());
    }

    let session = PromptSession::load(&config).await?;
    tracing::info!("Session ready: {}", session.model_info().name());

    if !cli.input.is_empty() {
        let input = cli.input.join(" ");
        let output = tokio::task::block_in_place(|| session.generate(&input))?;
        println!("{}", output);
        return Ok(());
    }

    // One independent generation per stdin line
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match tokio::task::block_in_place(|| session.generate(input)) {
            Ok(output) => println!("{}", output),
            Err(e) => eprintln!("error: {}", e),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("prompt-session").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_echo_flag() {
        let cli = parse(&["--preset", "text-to-sql", "--echo", "users over 30"]);
        assert_eq!(cli.echo, Some(true));
        assert_eq!(cli.input, vec!["users over 30".to_string()]);

        let cli = parse(&["--preset", "llama2-chat", "--echo=false", "hi"]);
        assert_eq!(cli.echo, Some(false));

        let cli = parse(&["--preset", "llama2-chat", "hi"]);
        assert_eq!(cli.echo, None);
    }

    #[test]
    fn test_overrides_apply_to_preset() {
        let cli = parse(&[
            "--preset",
            "llama2-demo",
            "--model",
            "models/chat.gguf",
            "--echo",
            "--max-tokens",
            "32",
            "--stop",
            "USER:",
        ]);
        let config = cli.session_config().unwrap();
        assert_eq!(config.source, ModelSource::local("models/chat.gguf"));
        assert!(config.sampling.echo);
        assert_eq!(config.sampling.max_tokens, 32);
        assert_eq!(config.sampling.temperature, 0.5);
        assert_eq!(config.sampling.stop, vec!["USER:".to_string()]);
    }

    #[test]
    fn test_config_conflicts_with_preset() {
        let args = ["prompt-session", "--config", "a.json", "--preset", "text-to-sql"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
