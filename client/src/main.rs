mod audio;
mod player;
mod repl;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use scene_engine::{
    CredentialProvider, GeminiClient, KeyStore, PipelineSettings, SceneError, SceneServices, ScenePipeline,
    Studio,
};
use shared::{AspectRatio, Config, Document, DocumentField, MediaArtifact, Patch, ReferenceImage, Voice};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::repl::Repl;

#[derive(Parser)]
#[command(name = "scene-client")]
#[command(about = "Compose short narrated video scenes")]
struct Args {
    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive editor (default)
    Studio,
    /// Generate one scene and write the results to disk
    Generate(GenerateArgs),
}

#[derive(clap::Args)]
struct GenerateArgs {
    #[arg(short, long, default_value = "")]
    prompt: String,

    #[arg(short, long, default_value = "")]
    dialogue: String,

    /// Reference image to animate
    #[arg(short, long)]
    image: Option<PathBuf>,

    #[arg(long, default_value_t = Voice::Kore)]
    voice: Voice,

    #[arg(short, long, default_value = "16:9")]
    aspect: AspectRatio,

    /// Directory the voiceover and video are written to
    #[arg(short, long, default_value = ".")]
    out: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path.clone())?,
        None => Config::load()?,
    };
    let keys = Arc::new(KeyStore::from_env(&config.api.key_env));

    // Capture and playback handles are not Send, so everything runs on one thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    runtime.block_on(async move {
        match args.command.unwrap_or(Command::Studio) {
            Command::Studio => Repl::new(config, keys).run().await,
            Command::Generate(generate) => generate_once(config, keys, generate).await,
        }
    })
}

async fn generate_once(config: Config, keys: Arc<KeyStore>, args: GenerateArgs) -> Result<()> {
    let image = match &args.image {
        Some(path) => {
            let data = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
            Some(ReferenceImage::from_bytes(data)?)
        }
        None => None,
    };

    let document = [
        DocumentField::Prompt(args.prompt),
        DocumentField::Dialogue(args.dialogue),
        DocumentField::Voice(args.voice),
        DocumentField::AspectRatio(args.aspect),
        DocumentField::Image(image),
    ]
    .into_iter()
    .fold(Document::default(), |doc, field| doc.with_field(field));

    let key = keys.current().ok_or(SceneError::MissingCredential)?;
    let client = GeminiClient::new(&config.api, key)?;
    let pipeline = ScenePipeline::new(
        SceneServices::from_client(Arc::new(client)),
        PipelineSettings::from_config(&config.generation),
    );

    let studio = Studio::new(document);
    studio.set_has_key(true);

    let mut statuses = studio.subscribe_status();
    let printer = tokio::spawn(async move {
        while statuses.changed().await.is_ok() {
            let status = statuses.borrow_and_update().clone();
            eprintln!("{}", status);
        }
    });

    let outcome = studio.generate(&pipeline).await;
    printer.abort();
    eprintln!("{}", studio.status());
    let outcome = outcome?;
    info!("Generated scene after {} status checks", outcome.poll_attempts);

    std::fs::create_dir_all(&args.out).with_context(|| format!("Failed to create {:?}", args.out))?;
    let artifacts = studio.artifacts();
    if let Some(audio) = &artifacts.audio {
        write_artifact(&args.out, "voiceover", audio)?;
    }
    if let Some(video) = &artifacts.video {
        write_artifact(&args.out, "scene", video)?;
    }
    Ok(())
}

fn write_artifact(dir: &Path, stem: &str, artifact: &MediaArtifact) -> Result<()> {
    let path = dir.join(format!("{}.{}", stem, artifact.extension()));
    std::fs::write(&path, &artifact.data).with_context(|| format!("Failed to write {:?}", path))?;
    println!("{}", path.display());
    Ok(())
}
