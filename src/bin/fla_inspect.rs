// src/bin/fla_inspect.rs
use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use fla_models::hgrn2::{HGRN2ForCausalLM, HGRN2Model};
use fla_models::{
    AutoConfig, AutoModel, AutoModelForCausalLM, AutoRegistry, ModelHead, PreTrainedModel,
    PretrainedConfig,
};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Inspect architectures known to the model auto-registry", long_about = None)]
struct CliArgs {
    /// Log registry activity (overridden by RUST_LOG)
    #[clap(long, short)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered model types
    List,
    /// Resolve a config.json and build the matching model
    Show {
        /// Path to a config.json file
        #[clap(long, value_parser, conflicts_with = "model_dir", required_unless_present = "model_dir")]
        config: Option<PathBuf>,
        /// Model directory containing config.json
        #[clap(long, value_parser)]
        model_dir: Option<PathBuf>,
        #[clap(long, value_enum, default_value_t = Head::CausalLm)]
        head: Head,
        /// Also print the resolved configuration as JSON
        #[clap(long)]
        print_config: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Head {
    Base,
    CausalLm,
}

impl From<Head> for ModelHead {
    fn from(head: Head) -> Self {
        match head {
            Head::Base => ModelHead::Base,
            Head::CausalLm => ModelHead::CausalLm,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn describe(model: &dyn PreTrainedModel) {
    println!("model:      {}", model.type_name());
    println!("head:       {}", model.head());

    let base = match model.downcast_ref::<HGRN2ForCausalLM>() {
        Some(lm) => {
            let (vocab, hidden) = lm.lm_head_shape();
            println!("lm_head:    {} x {} (tied: {})", vocab, hidden, lm.ties_word_embeddings());
            Some(lm.base_model())
        }
        None => model.downcast_ref::<HGRN2Model>(),
    };

    if let Some(base) = base {
        let (vocab, hidden) = base.embedding_shape();
        println!("embeddings: {} x {}", vocab, hidden);
        println!("mlp width:  {}", base.intermediate_size());
        println!("layers:     {}", base.num_layers());
        for (idx, layer) in base.layers().iter().enumerate() {
            println!("  [{:>3}] {:?}", idx, layer);
        }
    }
}

fn run(args: CliArgs) -> Result<(), Box<dyn Error>> {
    let registry = AutoRegistry::with_builtin_models()?;

    match args.command {
        Command::List => {
            for model_type in registry.model_types() {
                let binding = registry
                    .resolve_config(&model_type)
                    .ok_or_else(|| format!("'{}' vanished from the registry", model_type))?;
                println!("{}\t{}", model_type, binding.type_name());
            }
        }
        Command::Show { config, model_dir, head, print_config } => {
            let config: Box<dyn PretrainedConfig> = match (config, model_dir) {
                (Some(path), _) => AutoConfig::from_file(&registry, path)?,
                (None, Some(dir)) => AutoConfig::from_pretrained(&registry, dir)?,
                (None, None) => return Err("either --config or --model-dir is required".into()),
            };
            println!("model_type: {}", config.model_type());
            println!("config:     {}", config.type_name());
            if print_config {
                println!("{}", serde_json::to_string_pretty(&config.to_json_value()?)?);
            }

            let model = match ModelHead::from(head) {
                ModelHead::Base => AutoModel::from_config(&registry, config.as_ref())?,
                ModelHead::CausalLm => AutoModelForCausalLM::from_config(&registry, config.as_ref())?,
            };
            describe(model.as_ref());
        }
    }
    Ok(())
}

fn main() {
    let args = CliArgs::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Application error: {}", e);
        let mut current_err: Option<&(dyn Error + 'static)> = e.source();
        while let Some(source) = current_err {
            eprintln!("Caused by: {}", source);
            current_err = source.source();
        }
        std::process::exit(1);
    }
}
