//! Biocaching CLI - command-line access to the Biocaching API
//!
//! Commands:
//! - login / logout / status: manage the persisted session
//! - observation / observations / nearby: fetch normalized observations
//! - upload / delete: manage your own observations
//! - terms / settings / language: account housekeeping
//! - normalize: normalize a saved API response offline

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use biocaching::config::DEFAULT_ENDPOINT;
use biocaching::normalizer::ObservationNormalizer;
use biocaching::schema::{ObservationPayload, ResponseParser};
use biocaching::types::{NewObservation, PictureUpload, DEFAULT_LANGUAGE};
use biocaching::{
    Biocaching, ClientConfig, ClientError, FileStore, HttpTransport, NormalizationError,
    StorageError, UserId, SDK_VERSION,
};

type Client = Biocaching<HttpTransport, FileStore>;

/// Biocaching - species observations from the command line
#[derive(Parser)]
#[command(name = "biocaching")]
#[command(version = SDK_VERSION)]
#[command(about = "Client for the Biocaching observation API", long_about = None)]
struct Cli {
    #[command(flatten)]
    globals: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// API key issued by Biocaching
    #[arg(long, env = "BIOCACHING_API_KEY", global = true)]
    api_key: Option<String>,

    /// API root
    #[arg(long, env = "BIOCACHING_ENDPOINT", default_value = DEFAULT_ENDPOINT, global = true)]
    endpoint: String,

    /// Language seeded on first run (ISO 639-2)
    #[arg(long, default_value = DEFAULT_LANGUAGE, global = true)]
    language: String,

    /// Session file (defaults to the platform data directory)
    #[arg(long, env = "BIOCACHING_STORE", global = true)]
    store: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Api(ApiCommand),

    /// Normalize a saved observation or search response
    Normalize {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Treat likes by this user as "liked by me"
        #[arg(long)]
        user_id: Option<u64>,

        /// Only report malformed records
        #[arg(long)]
        validate: bool,
    },
}

/// Commands that talk to the API
#[derive(Subcommand)]
enum ApiCommand {
    /// Sign in and persist the session
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "BIOCACHING_PASSWORD")]
        password: String,
    },

    /// Show the persisted session
    Status,

    /// Forget the signed-in user
    Logout,

    /// Set the preferred language for taxon names
    Language {
        /// ISO 639-2 code, e.g. "nob"
        code: String,
    },

    /// Fetch one observation
    Observation { id: u64 },

    /// List observations
    Observations {
        /// Observations to skip
        #[arg(long, default_value = "0")]
        from: u32,

        /// Page size
        #[arg(long, default_value = "20")]
        size: u32,

        /// Only observations by this user
        #[arg(long)]
        user: Option<u64>,
    },

    /// List observations around a point
    Nearby {
        /// Radius in meters
        #[arg(long)]
        distance: f64,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Upload a new observation
    Upload {
        /// Photo file
        #[arg(long)]
        picture: PathBuf,

        #[arg(long)]
        taxon: u64,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// RFC 3339 timestamp (defaults to now)
        #[arg(long)]
        observed_at: Option<String>,
    },

    /// Delete one of your observations
    Delete { id: u64 },

    /// Show the terms of use
    Terms {
        /// Only report whether they are accepted
        #[arg(long, conflicts_with = "accept")]
        status: bool,

        /// Accept the terms
        #[arg(long)]
        accept: bool,
    },

    /// Show account settings
    Settings,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliFailure> {
    match cli.command {
        Commands::Normalize {
            input,
            user_id,
            validate,
        } => cmd_normalize(&input, user_id.map(UserId), &cli.globals.language, validate),
        Commands::Api(command) => {
            let mut client = connect(&cli.globals)?;
            cmd_api(&mut client, command).await
        }
    }
}

async fn cmd_api(client: &mut Client, command: ApiCommand) -> Result<(), CliFailure> {
    match command {
        ApiCommand::Login { email, password } => {
            let session = client.login(&email, &password).await?;
            print_json(&session)
        }
        ApiCommand::Status => print_json(&StatusReport {
            authorized: client.is_authorized(),
            store: client.sessions().store().path().to_path_buf(),
            session: client.session().clone(),
        }),
        ApiCommand::Logout => {
            client.logout()?;
            print_json(&client.restore_session())
        }
        ApiCommand::Language { code } => {
            client.set_language(&code)?;
            print_json(client.session())
        }
        ApiCommand::Observation { id } => print_json(&client.observation(id).await?),
        ApiCommand::Observations { from, size, user } => {
            let observations = match user {
                Some(user) => client.observations_by_user(UserId(user), from, size).await?,
                None => client.observations(from, size).await?,
            };
            print_json(&observations)
        }
        ApiCommand::Nearby { distance, lat, lon } => {
            print_json(&client.observations_by_distance(distance, lat, lon).await?)
        }
        ApiCommand::Upload {
            picture,
            taxon,
            lat,
            lon,
            observed_at,
        } => {
            let observation = NewObservation {
                picture: PictureUpload::from_path(&picture)?,
                taxon_id: taxon,
                observed_at: parse_observed_at(observed_at.as_deref())?,
                latitude: lat,
                longitude: lon,
            };
            print_json(&client.upload_observation(&observation).await?)
        }
        ApiCommand::Delete { id } => print_json(&client.delete_observation(id).await?),
        ApiCommand::Terms { status, accept } => {
            if status {
                print_json(&serde_json::json!({ "accepted": client.terms_status().await? }))
            } else if accept {
                print_json(&client.accept_terms().await?)
            } else {
                println!("{}", client.terms().await?);
                Ok(())
            }
        }
        ApiCommand::Settings => print_json(&client.user_settings().await?),
    }
}

fn connect(globals: &GlobalArgs) -> Result<Client, CliFailure> {
    let api_key = globals.api_key.clone().ok_or(CliFailure::MissingApiKey)?;
    let config = ClientConfig::new(api_key)
        .with_endpoint(globals.endpoint.clone())
        .with_language(globals.language.clone());
    let store = match &globals.store {
        Some(path) => FileStore::open(path)?,
        None => FileStore::open_default()?,
    };
    Ok(Biocaching::new(config, HttpTransport::new(), store)?)
}

fn cmd_normalize(
    input: &Path,
    user_id: Option<UserId>,
    language: &str,
    validate: bool,
) -> Result<(), CliFailure> {
    // Read input
    let input_data = if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(CliFailure::InteractiveStdin);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let normalizer = ObservationNormalizer::new(user_id, language);
    let payload = ResponseParser::parse_payload(&input_data)?;

    if validate {
        let (total, issues) = match &payload {
            ObservationPayload::Single(response) => (
                1,
                normalizer.validate_batch([&response.observation], &response.users),
            ),
            ObservationPayload::Search(response) => (
                response.hits.len(),
                normalizer.validate_batch(response.records(), &response.users),
            ),
        };
        let report = ValidationReport {
            total_records: total,
            invalid_records: issues.len(),
            errors: issues
                .iter()
                .map(|issue| ValidationErrorDetail {
                    index: issue.index,
                    id: issue.id,
                    error: issue.error.to_string(),
                })
                .collect(),
        };
        print_json(&report)?;
        return match report.invalid_records {
            0 => Ok(()),
            n => Err(CliFailure::ValidationFailed(n)),
        };
    }

    match payload {
        ObservationPayload::Single(response) => {
            print_json(&normalizer.normalize(&response.observation, &response.users)?)
        }
        ObservationPayload::Search(response) => {
            print_json(&normalizer.normalize_batch(response.records(), &response.users)?)
        }
    }
}

fn parse_observed_at(value: Option<&str>) -> Result<DateTime<Utc>, CliFailure> {
    match value {
        None => Ok(Utc::now()),
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| CliFailure::InvalidTimestamp(text.to_string())),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliFailure> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    authorized: bool,
    store: PathBuf,
    session: biocaching::Session,
}

#[derive(Serialize)]
struct ValidationReport {
    total_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    index: usize,
    id: u64,
    error: String,
}

// Error handling

#[derive(Debug)]
enum CliFailure {
    Io(io::Error),
    Json(serde_json::Error),
    Client(ClientError),
    Normalization(NormalizationError),
    Storage(StorageError),
    MissingApiKey,
    InteractiveStdin,
    InvalidTimestamp(String),
    ValidationFailed(usize),
}

impl From<io::Error> for CliFailure {
    fn from(e: io::Error) -> Self {
        CliFailure::Io(e)
    }
}

impl From<serde_json::Error> for CliFailure {
    fn from(e: serde_json::Error) -> Self {
        CliFailure::Json(e)
    }
}

impl From<ClientError> for CliFailure {
    fn from(e: ClientError) -> Self {
        CliFailure::Client(e)
    }
}

impl From<NormalizationError> for CliFailure {
    fn from(e: NormalizationError) -> Self {
        CliFailure::Normalization(e)
    }
}

impl From<StorageError> for CliFailure {
    fn from(e: StorageError) -> Self {
        CliFailure::Storage(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CliFailure> for CliError {
    fn from(e: CliFailure) -> Self {
        match e {
            CliFailure::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CliFailure::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Input must be a saved observation or search response".to_string()),
            },
            CliFailure::Client(ClientError::NotAuthorized) => CliError {
                code: "NOT_AUTHORIZED".to_string(),
                message: "Not logged in".to_string(),
                hint: Some("Run 'biocaching login' first".to_string()),
            },
            CliFailure::Client(ClientError::LoginRejected(body)) => CliError {
                code: "LOGIN_REJECTED".to_string(),
                message: body.to_string(),
                hint: Some("Check email and password".to_string()),
            },
            CliFailure::Client(ClientError::Normalization(e)) | CliFailure::Normalization(e) => {
                CliError {
                    code: "NORMALIZATION_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some("Run 'biocaching normalize --validate' on the response".to_string()),
                }
            }
            CliFailure::Client(ClientError::Transport(e)) => CliError {
                code: "TRANSPORT_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check network access and --endpoint".to_string()),
            },
            CliFailure::Client(e) => CliError {
                code: "CLIENT_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            CliFailure::Storage(e) => CliError {
                code: "STORAGE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check or remove the session file (--store)".to_string()),
            },
            CliFailure::MissingApiKey => CliError {
                code: "MISSING_API_KEY".to_string(),
                message: "No API key configured".to_string(),
                hint: Some("Pass --api-key or set BIOCACHING_API_KEY".to_string()),
            },
            CliFailure::InteractiveStdin => CliError {
                code: "NO_INPUT".to_string(),
                message: "stdin is a terminal".to_string(),
                hint: Some("Pipe a saved response or pass --input <file>".to_string()),
            },
            CliFailure::InvalidTimestamp(value) => CliError {
                code: "INVALID_TIMESTAMP".to_string(),
                message: format!("Invalid --observed-at value: {}", value),
                hint: Some("Use RFC 3339, e.g. 2016-05-02T10:15:00Z".to_string()),
            },
            CliFailure::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed normalization", count),
                hint: Some("Fix or drop the reported records".to_string()),
            },
        }
    }
}
