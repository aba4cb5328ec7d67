//! CLI commands

use anyhow::{Context as _, Result, anyhow};
use clap::{Args, Subcommand};
use ledger_core::{
    CategoryFilters, CreateCategoryRequest, CreateTransactionRequest, LoginRequest,
    TransactionFilters, TransactionKind, UpdateCategoryRequest, UpdateTransactionRequest,
};
use ledger_http::{ApiClient, Attachment};
use ledger_session::{
    DASHBOARD_ROUTE, FileStore, Navigator, Session, SessionState, redirect_if_authenticated,
    require_auth,
};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::LedgerConfig;

/// File in the data directory holding the persisted session
pub const SESSION_FILE: &str = "session.json";

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and persist the session
    Login {
        #[arg(long, env = "LEDGER_EMAIL")]
        email: String,

        #[arg(long, env = "LEDGER_PASSWORD", hide_env_values = true)]
        password: String,

        /// Sign in again even if a session is active
        #[arg(long)]
        force: bool,
    },

    /// End the session and forget its tokens
    Logout,

    /// Show the state of the persisted session
    Status,

    /// Manage categories
    Categories {
        #[command(subcommand)]
        command: CategoryCommands,
    },

    /// Manage transactions
    Transactions {
        #[command(subcommand)]
        command: TransactionCommands,
    },

    /// Read the public transaction feed (no sign-in needed)
    Public {
        #[command(subcommand)]
        command: PublicCommands,
    },
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// List categories
    List(CategoryFilterArgs),

    /// Show one category
    Get { id: String },

    /// Create a category
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        active: bool,
    },

    /// Change fields of a category
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        active: Option<bool>,
    },

    /// Delete a category
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum TransactionCommands {
    /// List transactions
    List(TransactionFilterArgs),

    /// Show one transaction
    Get { id: String },

    /// Record a transaction, optionally with a receipt file
    Create {
        #[arg(long)]
        amount: f64,

        /// Date of the transaction, e.g. 2024-03-01
        #[arg(long)]
        date: String,

        /// income or expense
        #[arg(long = "type")]
        kind: TransactionKind,

        #[arg(long)]
        category: String,

        #[arg(long)]
        description: Option<String>,

        /// URL of an already stored proof
        #[arg(long)]
        proof: Option<String>,

        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        active: bool,

        /// Receipt to upload with the transaction
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Change fields of a transaction
    Update {
        id: String,

        #[arg(long)]
        amount: Option<f64>,

        #[arg(long)]
        date: Option<String>,

        #[arg(long = "type")]
        kind: Option<TransactionKind>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        proof: Option<String>,

        #[arg(long)]
        active: Option<bool>,
    },

    /// Delete a transaction
    Delete { id: String },

    /// Attach a receipt to a transaction
    UploadProof { id: String, file: PathBuf },

    /// Remove the receipt stored at `image_url`
    DeleteProof { id: String, image_url: String },
}

#[derive(Subcommand)]
pub enum PublicCommands {
    /// List public transactions
    List(TransactionFilterArgs),

    /// Show one public transaction
    Get { id: String },

    /// Total income and expense
    Summary,
}

#[derive(Args)]
pub struct CategoryFilterArgs {
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    active: Option<bool>,

    #[arg(long)]
    page: Option<u32>,

    #[arg(long)]
    limit: Option<u32>,
}

impl From<CategoryFilterArgs> for CategoryFilters {
    fn from(args: CategoryFilterArgs) -> Self {
        Self {
            name: args.name,
            description: args.description,
            active: args.active,
            page: args.page,
            limit: args.limit,
        }
    }
}

#[derive(Args)]
pub struct TransactionFilterArgs {
    #[arg(long)]
    amount: Option<String>,

    #[arg(long)]
    date: Option<String>,

    #[arg(long = "type")]
    kind: Option<TransactionKind>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    active: Option<bool>,

    #[arg(long)]
    created_at: Option<String>,

    #[arg(long)]
    category: Option<String>,

    #[arg(long)]
    page: Option<u32>,

    #[arg(long)]
    limit: Option<u32>,
}

impl From<TransactionFilterArgs> for TransactionFilters {
    fn from(args: TransactionFilterArgs) -> Self {
        Self {
            amount: args.amount,
            date: args.date,
            kind: args.kind,
            description: args.description,
            active: args.active,
            created_at: args.created_at,
            category: args.category,
            page: args.page,
            limit: args.limit,
        }
    }
}

/// Tells the user to sign in again once the session ends
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, route: &str) {
        info!(route, "Session ended, run `ledger login` to sign in again");
    }
}

/// Session plus the clients bound to it
pub struct Context {
    session: Session,
    public: ApiClient,
    api: ApiClient,
}

impl Context {
    /// Build the session under `data_dir`, restoring it from disk when `restore` is set
    pub async fn open(config: &LedgerConfig, data_dir: &Path, restore: bool) -> Result<Self> {
        let public = config.api_client()?;
        let store = Arc::new(FileStore::new(data_dir.join(SESSION_FILE)));
        let session = Session::builder(store, Arc::new(public.clone()))
            .navigator(Arc::new(ConsoleNavigator))
            .config(config.session_config())
            .build();

        if restore {
            session
                .init()
                .await
                .context("Failed to restore persisted session")?;
        }

        let api = public.with_credentials(Arc::new(session.clone()));
        Ok(Self {
            session,
            public,
            api,
        })
    }

    /// Client for authenticated calls; fails early when signed out
    fn authenticated(&self) -> Result<&ApiClient> {
        require_auth(&self.session)
            .map_err(|redirect| anyhow!("Not signed in ({redirect}), run `ledger login`"))?;
        Ok(&self.api)
    }
}

impl Commands {
    /// Logout and forced login replace whatever is on disk without reading it
    const fn restores_session(&self) -> bool {
        !matches!(self, Self::Logout | Self::Login { force: true, .. })
    }

    pub async fn execute(self, config: &LedgerConfig, data_dir: &Path) -> Result<()> {
        let ctx = Context::open(config, data_dir, self.restores_session()).await?;

        match self {
            Self::Login {
                email,
                password,
                force,
            } => login(&ctx, email, password, force).await,
            Self::Logout => {
                ctx.session.logout().await?;
                print_json(&json!({ "message": "Signed out" }))
            }
            Self::Status => print_json(&status(&ctx.session)),
            Self::Categories { command } => command.execute(ctx.authenticated()?).await,
            Self::Transactions { command } => command.execute(ctx.authenticated()?).await,
            Self::Public { command } => command.execute(&ctx.public).await,
        }
    }
}

async fn login(ctx: &Context, email: String, password: String, force: bool) -> Result<()> {
    if !force && redirect_if_authenticated(&ctx.session, DASHBOARD_ROUTE).is_err() {
        return print_json(&json!({ "message": "Already signed in" }));
    }

    let response = ctx.public.login(&LoginRequest { email, password }).await?;
    let tokens = response
        .token_pair()
        .context("Login response did not contain both tokens")?;
    ctx.session
        .login(&tokens.access_token, &tokens.refresh_token)
        .await?;

    print_json(&json!({
        "message": response.message.unwrap_or_else(|| "Signed in".to_string()),
        "authenticated": true,
    }))
}

fn status(session: &Session) -> serde_json::Value {
    let authenticated = session.check_auth();
    let state: SessionState = session.state();
    json!({
        "authenticated": authenticated,
        "token_expiry": state.token_expiry(),
        "user": state.user(),
    })
}

impl CategoryCommands {
    pub async fn execute(self, api: &ApiClient) -> Result<()> {
        match self {
            Self::List(filters) => print_json(&api.get_categories(&filters.into()).await?),
            Self::Get { id } => print_json(&api.get_category(&id).await?),
            Self::Create {
                name,
                description,
                active,
            } => {
                let request = CreateCategoryRequest {
                    name,
                    description,
                    active,
                };
                print_json(&api.create_category(&request).await?)
            }
            Self::Update {
                id,
                name,
                description,
                active,
            } => {
                let request = UpdateCategoryRequest {
                    name,
                    description,
                    active,
                };
                print_json(&api.update_category(&id, &request).await?)
            }
            Self::Delete { id } => print_json(&api.delete_category(&id).await?),
        }
    }
}

impl TransactionCommands {
    pub async fn execute(self, api: &ApiClient) -> Result<()> {
        match self {
            Self::List(filters) => print_json(&api.get_transactions(&filters.into()).await?),
            Self::Get { id } => print_json(&api.get_transaction(&id).await?),
            Self::Create {
                amount,
                date,
                kind,
                category,
                description,
                proof,
                active,
                file,
            } => {
                let request = CreateTransactionRequest {
                    amount,
                    date,
                    kind,
                    description,
                    category,
                    proof,
                    active,
                };
                let created = match file {
                    Some(path) => {
                        let attachment = read_attachment(&path).await?;
                        api.create_transaction_with_file(&request, attachment)
                            .await?
                    }
                    None => api.create_transaction(&request).await?,
                };
                print_json(&created)
            }
            Self::Update {
                id,
                amount,
                date,
                kind,
                category,
                description,
                proof,
                active,
            } => {
                let request = UpdateTransactionRequest {
                    amount,
                    date,
                    kind,
                    description,
                    category,
                    proof,
                    active,
                };
                print_json(&api.update_transaction(&id, &request).await?)
            }
            Self::Delete { id } => print_json(&api.delete_transaction(&id).await?),
            Self::UploadProof { id, file } => {
                let attachment = read_attachment(&file).await?;
                print_json(&api.upload_proof(&id, attachment).await?)
            }
            Self::DeleteProof { id, image_url } => {
                print_json(&api.delete_proof(&id, &image_url).await?)
            }
        }
    }
}

impl PublicCommands {
    pub async fn execute(self, api: &ApiClient) -> Result<()> {
        match self {
            Self::List(filters) => {
                print_json(&api.get_public_transactions(&filters.into()).await?)
            }
            Self::Get { id } => print_json(&api.get_public_transaction(&id).await?),
            Self::Summary => print_json(&api.get_public_transaction_summary().await?),
        }
    }
}

async fn read_attachment(path: &Path) -> Result<Attachment> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map_or_else(|| "upload".to_string(), |name| name.to_string_lossy().into_owned());

    let attachment = Attachment::new(file_name, bytes);
    Ok(match content_type(path) {
        Some(mime) => attachment.with_content_type(mime),
        None => attachment,
    })
}

fn content_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
