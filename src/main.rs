/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */
mod album_model;
mod album_name;
mod album_props;
mod album_service;
mod config;
mod error;
mod glob_matcher;
mod immich_client;
mod inheritance;
mod path_filter;
mod plan;
mod reconciler;
mod synchronizer;
mod tokens;

use album_model::{ShareRole, SortOrder, Visibility};
use album_name::LevelsSpec;
use anyhow::{Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, error::ErrorKind};
use config::{
    Configuration, DEFAULT_API_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, DEFAULT_FETCH_CHUNK_SIZE, RunMode,
    SyncMode, ThumbnailChoice, UpdatePropsMode,
};
use const_format::concatcp;
use dotenvy::dotenv;
use immich_client::ImmichClient;
use plan::handle_plan_req;
use synchronizer::{ENV_IS_DOCKER, Synchronizer};
use tokens::{ApiKeyType, get_api_key, mask_api_key};

const ENV_API_URL: &str = "IMMICH_API_URL";
const ENV_API_KEY: &str = "IMMICH_API_KEY";
const ENV_ROOT_PATH: &str = "IMMICH_ROOT_PATH";
const ENV_UNATTENDED: &str = "UNATTENDED";
const ENV_DELETE_CONFIRM: &str = "DELETE_CONFIRM";

macro_rules! fill_server_args_from_env {
    ($a:expr) => {
        if $a.api_url.is_none() {
            $a.api_url = std::env::var(ENV_API_URL).ok();
        }
        if $a.api_key.is_empty() {
            $a.api_key = std::env::var(ENV_API_KEY).ok().into_iter().collect();
        }
    };
}

macro_rules! fill_run_args_from_env {
    ($a:expr) => {
        fill_server_args_from_env!($a.server);
        if $a.album.root_path.is_empty() {
            $a.album.root_path = std::env::var(ENV_ROOT_PATH).ok().into_iter().collect();
        }
    };
}

// CLI Definitions
static LONG_ABOUT: &str = concatcp!(
    r#"
Creates and populates Immich albums from the folder structure of external libraries.

Optional environment variables:
"#,
    ENV_API_URL,
    " - Can be used instead of --api-url\n",
    ENV_API_KEY,
    " - Can be used instead of --api-key\n",
    ENV_ROOT_PATH,
    " - Can be used instead of --root-path\n",
    ENV_UNATTENDED,
    " - Set to 1 instead of passing --unattended\n",
    ENV_DELETE_CONFIRM,
    " - Set to 1 instead of passing --delete-confirm\n",
    ENV_IS_DOCKER,
    " - Set when running in a container, never waits for user input\n",
    "A .env file can be created in the working directory that contains these as well.\n"
);

#[derive(Debug, Parser)]
#[command(name = "immich-folder-albums")]
#[command(about = "Creates Immich albums from folder names", long_about = Some(LONG_ABOUT))]
struct Cli {
    /// Log level: error, warn, info, debug or trace. RUST_LOG takes precedence.
    #[arg(long, default_value = "info")]
    log_level: log::LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Creates albums from the folder structure and adds the assets to them
    #[command(arg_required_else_help = true)]
    Create(CreateArgs),

    /// Deletes the albums this tool would create
    #[command(arg_required_else_help = true)]
    Cleanup(CleanupArgs),

    /// Deletes ALL albums on the server
    #[command(arg_required_else_help = true)]
    DeleteAll(DeleteAllArgs),

    /// Lists the albums that would be created, without changing anything
    #[command(arg_required_else_help = true)]
    Plan(PlanArgs),
}

#[derive(Debug, Args)]
pub(crate) struct CreateArgs {
    #[command(flatten)]
    pub(crate) run: RunArgs,

    /// Do not ask for confirmation before creating albums
    #[arg(short = 'u', long)]
    pub(crate) unattended: bool,

    /// 1 deletes empty albums after the run, 2 also removes offline assets first
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub(crate) sync_mode: u8,

    /// 0 sets properties on new albums only, 1 on every touched album, 2 also syncs sharing
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub(crate) update_album_props_mode: u8,
}

#[derive(Debug, Args)]
pub(crate) struct CleanupArgs {
    #[command(flatten)]
    pub(crate) run: RunArgs,

    /// Actually delete the albums instead of listing them
    #[arg(long)]
    pub(crate) delete_confirm: bool,
}

#[derive(Debug, Args)]
pub(crate) struct DeleteAllArgs {
    #[command(flatten)]
    pub(crate) server: ServerArgs,

    /// Actually delete the albums instead of listing them
    #[arg(long)]
    pub(crate) delete_confirm: bool,

    /// Visibility to set on the assets of deleted albums
    #[arg(long, value_enum)]
    pub(crate) visibility: Option<Visibility>,
}

#[derive(Debug, Args)]
pub(crate) struct PlanArgs {
    #[command(flatten)]
    pub(crate) run: RunArgs,

    /// Outputs the albums as JSON
    #[arg(short = 'j', long)]
    pub(crate) use_json_output: bool,
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[command(flatten)]
    pub(crate) server: ServerArgs,

    #[command(flatten)]
    pub(crate) album: AlbumArgs,

    #[command(flatten)]
    pub(crate) properties: PropertyArgs,
}

#[derive(Debug, Args)]
pub(crate) struct ServerArgs {
    /// Immich API URL, e.g. https://photos.example.com/api
    #[arg(long)]
    pub(crate) api_url: Option<String>,

    /// API key, may be repeated to run for several users
    #[arg(short = 'k', long)]
    pub(crate) api_key: Vec<String>,

    /// Whether --api-key is the key itself or a file containing it
    #[arg(long, value_enum, default_value_t = ApiKeyType::Literal)]
    pub(crate) api_key_type: ApiKeyType,

    /// Number of assets added to an album per request
    #[arg(short = 'C', long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub(crate) chunk_size: usize,

    /// Number of assets fetched per search request, at most 1000
    #[arg(short = 'H', long, default_value_t = DEFAULT_FETCH_CHUNK_SIZE)]
    pub(crate) fetch_chunk_size: usize,

    /// Timeout of API requests in seconds
    #[arg(long, default_value_t = DEFAULT_API_TIMEOUT_SECS)]
    pub(crate) api_timeout: u64,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub(crate) insecure: bool,
}

#[derive(Debug, Args)]
pub(crate) struct AlbumArgs {
    /// Root path of an external library as seen by the server, may be repeated
    #[arg(short = 'r', long)]
    pub(crate) root_path: Vec<String>,

    /// Number of folder levels used for the album name. Negative counts from the
    /// leaf, "start,end" selects a range.
    #[arg(long, default_value = "1", allow_hyphen_values = true)]
    pub(crate) album_levels: LevelsSpec,

    /// Separator between the folder names of multi level album names
    #[arg(long, default_value = " ")]
    pub(crate) album_separator: String,

    /// Regex and optional replacement applied to every album name, may be repeated
    #[arg(long, num_args = 1..=2, value_names = ["PATTERN", "REPLACEMENT"])]
    pub(crate) album_name_post_regex: Vec<Vec<String>>,

    /// Glob pattern or plain name of paths to ignore, may be repeated
    #[arg(short = 'i', long)]
    pub(crate) ignore: Vec<String>,

    /// Glob pattern or plain name of paths to consider exclusively, may be repeated
    #[arg(short = 'f', long)]
    pub(crate) path_filter: Vec<String>,

    /// Reads album properties from .albumprops files in the asset folders
    #[arg(long)]
    pub(crate) read_album_properties: bool,

    /// Also considers assets that are already part of an album
    #[arg(long)]
    pub(crate) find_assets_in_albums: bool,

    /// Also considers archived assets
    #[arg(long)]
    pub(crate) find_archived_assets: bool,
}

#[derive(Debug, Args)]
pub(crate) struct PropertyArgs {
    /// User to share new albums with as "user" or "user=role", may be repeated
    #[arg(short = 'x', long)]
    pub(crate) share_with: Vec<String>,

    /// Role for --share-with entries without an explicit role
    #[arg(long, value_enum, default_value_t = ShareRole::Viewer)]
    pub(crate) share_role: ShareRole,

    /// Sort order of album assets
    #[arg(long, value_enum)]
    pub(crate) album_order: Option<SortOrder>,

    /// Visibility to set on assets added to albums
    #[arg(long, value_enum)]
    pub(crate) visibility: Option<Visibility>,

    /// How the album thumbnail is picked
    #[arg(long, value_enum)]
    pub(crate) set_album_thumbnail: Option<ThumbnailChoice>,

    /// Enables comments and likes on albums
    #[arg(long, conflicts_with = "comments_and_likes_disabled")]
    pub(crate) comments_and_likes_enabled: bool,

    /// Disables comments and likes on albums
    #[arg(long)]
    pub(crate) comments_and_likes_disabled: bool,
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        )
    })
}

fn missing_argument(message: &str) -> ! {
    let mut cmd = Cli::command();
    cmd.error(ErrorKind::MissingRequiredArgument, message).exit()
}

// One configuration per API key
fn build_configurations(
    mode: RunMode,
    server: &ServerArgs,
    customize: impl Fn(Configuration) -> Result<Configuration>,
) -> Result<Vec<Configuration>> {
    let api_url = server
        .api_url
        .clone()
        .unwrap_or_else(|| missing_argument("--api-url or IMMICH_API_URL must be set"));
    if server.api_key.is_empty() {
        missing_argument("--api-key or IMMICH_API_KEY must be set");
    }

    server
        .api_key
        .iter()
        .map(|source| {
            let api_key = get_api_key(source, server.api_key_type)?;
            customize(Configuration::new(mode, &api_url, &api_key)?.with_server_args(server)?)
        })
        .collect()
}

fn with_run_args(config: Configuration, run: &RunArgs) -> Result<Configuration> {
    config
        .with_album_args(&run.album)?
        .with_property_args(&run.properties)
}

async fn run_configuration(config: &Configuration, plan_json: Option<bool>) -> Result<()> {
    let client = ImmichClient::connect(config).await?;
    match plan_json {
        Some(use_json_output) => handle_plan_req(config, &client, use_json_output).await,
        None => Synchronizer::new(config, &client).run().await,
    }
}

async fn run_configurations(configs: Vec<Configuration>, plan_json: Option<bool>) -> Result<()> {
    let mut failures = 0;
    for (idx, config) in configs.iter().enumerate() {
        let key = if log::log_enabled!(log::Level::Debug) {
            config.api_key.clone()
        } else {
            mask_api_key(&config.api_key)
        };
        log::info!("Processing API key #{}: {}", idx + 1, key);
        config.log_debug();

        if let Err(err) = run_configuration(config, plan_json).await {
            log::error!("Fatal error while processing API key {}: {:#}", key, err);
            failures += 1;
        }
    }

    if failures > 0 {
        return Err(anyhow!("{} of {} runs failed", failures, configs.len()));
    }
    Ok(())
}

async fn handle_cli_arg(args: Cli) -> Result<()> {
    match args.command {
        Commands::Create(mut create_args) => {
            fill_run_args_from_env!(create_args.run);
            let unattended = create_args.unattended || env_flag(ENV_UNATTENDED);
            let sync_mode = SyncMode::try_from(create_args.sync_mode)?;
            let update_mode = UpdatePropsMode::try_from(create_args.update_album_props_mode)?;
            let configs = build_configurations(RunMode::Create, &create_args.run.server, |config| {
                let mut config = with_run_args(config, &create_args.run)?.with_unattended(unattended);
                config.sync_mode = sync_mode;
                config.update_album_props_mode = update_mode;
                Ok(config)
            })?;
            run_configurations(configs, None).await?;
        }
        Commands::Cleanup(mut cleanup_args) => {
            fill_run_args_from_env!(cleanup_args.run);
            let delete_confirm = cleanup_args.delete_confirm || env_flag(ENV_DELETE_CONFIRM);
            let configs = build_configurations(RunMode::Cleanup, &cleanup_args.run.server, |config| {
                let mut config = with_run_args(config, &cleanup_args.run)?;
                config.delete_confirm = delete_confirm;
                Ok(config)
            })?;
            run_configurations(configs, None).await?;
        }
        Commands::DeleteAll(mut delete_args) => {
            fill_server_args_from_env!(delete_args.server);
            let delete_confirm = delete_args.delete_confirm || env_flag(ENV_DELETE_CONFIRM);
            let configs = build_configurations(RunMode::DeleteAll, &delete_args.server, |mut config| {
                config.delete_confirm = delete_confirm;
                config.visibility = delete_args.visibility;
                Ok(config)
            })?;
            run_configurations(configs, None).await?;
        }
        Commands::Plan(mut plan_args) => {
            fill_run_args_from_env!(plan_args.run);
            let configs = build_configurations(RunMode::Plan, &plan_args.run.server, |config| {
                with_run_args(config, &plan_args.run)
            })?;
            run_configurations(configs, Some(plan_args.use_json_output)).await?;
        }
    };
    Ok(())
}

// CLI tool for creating albums from folder names
#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.log_level.as_str()),
    )
    .init();
    log::debug!("+++ immich-folder-albums");

    handle_cli_arg(args).await?;

    log::debug!("--- immich-folder-albums");
    Ok(())
}
