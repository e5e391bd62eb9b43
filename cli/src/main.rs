use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use churn_alert::error::ClientError;
use churn_alert::net::api;
use churn_alert::net::transport::{Payload, ReqwestTransport, RequestBody, TransportError};
use churn_alert::net::types::{
    ChurnFeatures, LoginRequest, PasswordChange, Profile, ProfileUpdate, RegisterRequest, Role,
};
use churn_alert::{ApiGateway, ClientConfig, FileTokenStore, RequestOptions, SessionController};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{}", .0.user_message())]
    Client(#[from] ClientError),
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
    #[error("not signed in; run `churn-cli login` first")]
    NotSignedIn,
    #[error("this command requires an ADMIN account")]
    NotAdmin,
    #[error("could not read {}: {source}", .path.display())]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("invalid HTTP method `{0}`")]
    InvalidMethod(String),
    #[error("invalid header `{0}`; expected `Name: value`")]
    InvalidHeader(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl CliError {
    /// Machine-readable code printed alongside the message.
    fn code(&self) -> &'static str {
        match self {
            Self::Client(e) => e.error_code(),
            Self::Transport(_) => "E_TRANSPORT",
            Self::NotSignedIn => "E_NOT_SIGNED_IN",
            Self::NotAdmin => "E_FORBIDDEN",
            Self::ReadFile { .. } => "E_READ_FILE",
            Self::InvalidMethod(_) | Self::InvalidHeader(_) => "E_USAGE",
            Self::InvalidJson(_) => "E_INVALID_JSON",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "churn-cli", about = "Churn Alert terminal client")]
struct Cli {
    /// Backend base URL; overrides `CHURN_API_URL`.
    #[arg(long)]
    base_url: Option<String>,

    /// Directory holding the token file; overrides `CHURN_STATE_DIR`.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and keep the token in the state directory.
    Login(LoginArgs),
    /// Create an account.
    Register(RegisterArgs),
    /// Forget the stored token.
    Logout,
    /// Show the signed-in user.
    Whoami,
    Profile(ProfileCommand),
    Users(UsersCommand),
    /// Score one customer.
    Predict(PredictArgs),
    /// Score every row of a CSV file.
    Batch {
        file: PathBuf,
    },
    Stats,
    TopRisk,
    /// Delete all stored predictions.
    Clear,
    /// Send an arbitrary request and print the raw answer.
    Request(RequestArgs),
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[arg(long)]
    email: String,

    #[arg(long, env = "CHURN_PASSWORD")]
    password: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum RoleArg {
    User,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::User => Role::User,
            RoleArg::Admin => Role::Admin,
        }
    }
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    email: String,

    #[arg(long)]
    password: String,

    #[arg(long)]
    full_name: String,

    #[arg(long, value_enum, default_value_t = RoleArg::User)]
    role: RoleArg,
}

impl RegisterArgs {
    fn into_request(self) -> RegisterRequest {
        RegisterRequest {
            email: self.email,
            password: self.password,
            full_name: self.full_name,
            role: self.role.into(),
        }
    }
}

#[derive(Args, Debug)]
struct ProfileCommand {
    #[command(subcommand)]
    command: ProfileSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProfileSubcommand {
    /// Change name and/or email; omitted fields keep their current value.
    Update {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    Password {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },
}

#[derive(Args, Debug)]
struct UsersCommand {
    #[command(subcommand)]
    command: UsersSubcommand,
}

#[derive(Subcommand, Debug)]
enum UsersSubcommand {
    List,
    Delete { id: i64 },
    Create(RegisterArgs),
}

#[derive(Args, Debug, Default)]
struct PredictArgs {
    #[arg(long, help = "JSON file with customer attributes; defaults fill anything omitted here")]
    input: Option<PathBuf>,

    #[arg(long)]
    tenure: Option<u32>,

    #[arg(long)]
    monthly_charges: Option<f64>,

    #[arg(long)]
    total_charges: Option<f64>,

    #[arg(long)]
    contract: Option<String>,

    #[arg(long)]
    internet_service: Option<String>,
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// Path relative to the base URL, e.g. `/churn/stats`.
    path: String,

    #[arg(long, short = 'X', default_value = "GET")]
    method: String,

    #[arg(long, short = 'd', help = "JSON request body")]
    data: Option<String>,

    #[arg(long = "header", short = 'H', help = "Extra header as `Name: value`; repeatable")]
    headers: Vec<String>,
}

struct CliContext {
    config: ClientConfig,
    store: Arc<FileTokenStore>,
    transport: Arc<ReqwestTransport>,
}

impl CliContext {
    fn new(config: ClientConfig) -> Result<Self, CliError> {
        let store = Arc::new(FileTokenStore::in_dir(&config.state_dir));
        let transport = Arc::new(ReqwestTransport::new()?);
        Ok(Self { config, store, transport })
    }

    fn gateway(&self) -> ApiGateway {
        ApiGateway::from_config(&self.config, self.store.clone(), self.transport.clone())
    }

    fn controller(&self) -> SessionController {
        SessionController::new(self.gateway())
    }

    /// Restore the stored session, failing when nobody is signed in.
    async fn signed_in(&self) -> Result<SessionController, CliError> {
        let mut ctl = self.controller();
        if ctl.boot().await.authenticated {
            Ok(ctl)
        } else {
            Err(CliError::NotSignedIn)
        }
    }

    async fn admin(&self) -> Result<SessionController, CliError> {
        let ctl = self.signed_in().await?;
        if ctl.session().user.as_ref().is_some_and(Profile::is_admin) {
            Ok(ctl)
        } else {
            Err(CliError::NotAdmin)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "no .env file loaded");
    }

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(code = e.code(), error = ?e, "command failed");
            eprintln!("error [{}]: {e}", e.code());
            ExitCode::FAILURE
        }
    }
}

/// Environment first (`CHURN_API_URL`, `CHURN_STATE_DIR`), then flags.
fn resolve_config(base_url: Option<String>, state_dir: Option<PathBuf>) -> ClientConfig {
    let env = ClientConfig::from_env();
    ClientConfig::new(base_url.unwrap_or(env.api_url), state_dir.unwrap_or(env.state_dir))
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = CliContext::new(resolve_config(cli.base_url, cli.state_dir))?;

    match cli.command {
        Command::Login(args) => run_login(&ctx, args).await,
        Command::Register(args) => print_json(&api::register(&ctx.gateway(), &args.into_request()).await?),
        Command::Logout => {
            ctx.controller().logout();
            println!("signed out");
            Ok(())
        }
        Command::Whoami => run_whoami(&ctx).await,
        Command::Profile(profile) => run_profile(&ctx, profile).await,
        Command::Users(users) => run_users(&ctx, users).await,
        Command::Predict(args) => {
            let features = load_features(&args)?;
            print_json(&api::predict(&ctx.gateway(), &features).await?)
        }
        Command::Batch { file } => run_batch(&ctx, &file).await,
        Command::Stats => print_json(&api::stats(&ctx.gateway()).await?),
        Command::TopRisk => print_json(&api::top_risk(&ctx.gateway()).await?),
        Command::Clear => {
            api::clear_predictions(&ctx.gateway()).await?;
            println!("predictions cleared");
            Ok(())
        }
        Command::Request(args) => run_request(&ctx, args).await,
    }
}

async fn run_login(ctx: &CliContext, args: LoginArgs) -> Result<(), CliError> {
    let mut ctl = ctx.controller();
    ctl.launch();
    ctl.submit_login(&LoginRequest { email: args.email, password: args.password })
        .await?;
    match &ctl.session().user {
        Some(user) => println!("signed in as {} <{}>", user.full_name, user.email),
        None => println!("signed in (profile unavailable)"),
    }
    Ok(())
}

async fn run_whoami(ctx: &CliContext) -> Result<(), CliError> {
    let ctl = ctx.signed_in().await?;
    match &ctl.session().user {
        Some(user) => print_json(&serde_json::to_value(user)?),
        None => Err(CliError::NotSignedIn),
    }
}

async fn run_profile(ctx: &CliContext, profile: ProfileCommand) -> Result<(), CliError> {
    let mut ctl = ctx.signed_in().await?;
    match profile.command {
        ProfileSubcommand::Update { full_name, email } => {
            let current = ctl.session().user.clone().ok_or(CliError::NotSignedIn)?;
            let update = ProfileUpdate {
                full_name: full_name.unwrap_or(current.full_name),
                email: email.unwrap_or(current.email),
            };
            ctl.update_profile(&update).await?;
            match &ctl.session().user {
                Some(user) => print_json(&serde_json::to_value(user)?),
                None => Err(CliError::NotSignedIn),
            }
        }
        ProfileSubcommand::Password { current, new } => {
            let change = PasswordChange { current_password: current, new_password: new };
            api::change_password(ctl.gateway(), &change).await?;
            println!("password changed");
            Ok(())
        }
    }
}

async fn run_users(ctx: &CliContext, users: UsersCommand) -> Result<(), CliError> {
    let ctl = ctx.admin().await?;
    match users.command {
        UsersSubcommand::List => {
            let all = api::list_users(ctl.gateway()).await?;
            print_json(&serde_json::to_value(all)?)
        }
        UsersSubcommand::Delete { id } => {
            api::delete_user(ctl.gateway(), id).await?;
            println!("user {id} deleted");
            Ok(())
        }
        UsersSubcommand::Create(args) => print_json(&api::create_user(ctl.gateway(), &args.into_request()).await?),
    }
}

async fn run_batch(ctx: &CliContext, file: &Path) -> Result<(), CliError> {
    let bytes = fs::read(file).map_err(|source| CliError::ReadFile { path: file.to_path_buf(), source })?;
    let file_name = file
        .file_name()
        .map_or_else(|| "upload.csv".to_owned(), |name| name.to_string_lossy().into_owned());
    print_json(&api::predict_batch_csv(&ctx.gateway(), &file_name, bytes).await?)
}

async fn run_request(ctx: &CliContext, args: RequestArgs) -> Result<(), CliError> {
    let method = parse_method(&args.method)?;
    let body = match args.data {
        Some(raw) => RequestBody::Json(serde_json::from_str(&raw)?),
        None => RequestBody::Empty,
    };
    let mut options = RequestOptions { method, body, headers: Vec::new() };
    for raw in &args.headers {
        let (name, value) = split_header(raw)?;
        options = options.with_header(name, value);
    }

    let resp = ctx.gateway().request(&args.path, options).await?;
    eprintln!("HTTP {}", resp.status);
    match resp.payload()? {
        Payload::Json(value) => print_json(&value),
        Payload::Text(text) => {
            println!("{text}");
            Ok(())
        }
    }
}

fn load_features(args: &PredictArgs) -> Result<ChurnFeatures, CliError> {
    let mut features = match &args.input {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|source| CliError::ReadFile { path: path.clone(), source })?;
            serde_json::from_str(&raw)?
        }
        None => ChurnFeatures::default(),
    };
    if let Some(tenure) = args.tenure {
        features.tenure = tenure;
    }
    if let Some(monthly) = args.monthly_charges {
        features.monthly_charges = monthly;
    }
    if let Some(total) = args.total_charges {
        features.total_charges = total;
    }
    if let Some(contract) = &args.contract {
        features.contract.clone_from(contract);
    }
    if let Some(internet) = &args.internet_service {
        features.internet_service.clone_from(internet);
    }
    Ok(features)
}

fn parse_method(raw: &str) -> Result<reqwest::Method, CliError> {
    reqwest::Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(raw.to_owned()))
}

fn split_header(raw: &str) -> Result<(String, String), CliError> {
    raw.split_once(':')
        .map(|(name, value)| (name.trim().to_owned(), value.trim().to_owned()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| CliError::InvalidHeader(raw.to_owned()))
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
