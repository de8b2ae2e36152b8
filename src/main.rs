use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use forum_client::chat::{ChatSnapshot, ConnectionStatus, SessionError, spawn_chat_session};
use forum_client::config::{ClientConfig, ConfigError};
use forum_client::net::api::{ApiClient, ApiError, HistorySource};
use forum_client::net::socket::WsConnector;
use forum_client::net::types::{ChatDraft, ChatMessage, Credentials, NewComment, NewPost, Role, WireId};
use forum_client::state::auth::AuthSession;
use forum_client::state::store::{FileStore, StoreError};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("not signed in; run `forum-client signin <username>` first")]
    NotSignedIn,
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("terminal io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "forum-client", about = "Forum and chat client")]
struct Cli {
    /// Where the signed-in session is kept.
    #[arg(long, env = "FORUM_SESSION_FILE")]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account.
    Signup {
        username: String,
        #[arg(long, env = "FORUM_PASSWORD")]
        password: String,
        #[arg(long, default_value = "user")]
        role: Role,
    },
    /// Sign in and persist the session.
    Signin {
        username: String,
        #[arg(long, env = "FORUM_PASSWORD")]
        password: String,
    },
    /// Forget the stored session.
    Logout,
    /// Show the stored session.
    Whoami,
    /// Print chat history.
    History,
    /// Interactive chat: stdin lines are sent, messages and status are printed.
    Chat {
        /// Display name attached to outgoing messages.
        #[arg(long)]
        username: Option<String>,
    },
    Posts(PostsCommand),
    Comments(CommentsCommand),
}

#[derive(Args, Debug)]
struct PostsCommand {
    #[command(subcommand)]
    command: PostsSubcommand,
}

#[derive(Subcommand, Debug)]
enum PostsSubcommand {
    List,
    Show {
        post_id: i64,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    Update {
        post_id: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    Delete {
        post_id: i64,
    },
}

#[derive(Args, Debug)]
struct CommentsCommand {
    #[command(subcommand)]
    command: CommentsSubcommand,
}

#[derive(Subcommand, Debug)]
enum CommentsSubcommand {
    List {
        post_id: i64,
    },
    Create {
        post_id: i64,
        #[arg(long)]
        content: String,
        #[arg(long)]
        parent_id: Option<i64>,
    },
    Delete {
        comment_id: i64,
    },
    Like {
        comment_id: i64,
    },
}

struct Context {
    config: ClientConfig,
    api: ApiClient,
    store: FileStore,
}

impl Context {
    fn session(&self) -> Result<AuthSession, CliError> {
        AuthSession::load(&self.store)?.ok_or(CliError::NotSignedIn)
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(path) = cli.session_file {
        config.session_file = path;
    }
    let api = ApiClient::new(config.endpoints.clone(), config.http_timeout)?;
    let store = FileStore::new(&config.session_file);
    let ctx = Context { config, api, store };

    match cli.command {
        Command::Signup { username, password, role } => {
            let created = ctx.api.signup(&Credentials { username, password, role: Some(role) }).await?;
            println!("created user #{}", created.id);
            Ok(())
        }
        Command::Signin { username, password } => {
            let tokens = ctx.api.signin(&username, &password).await?;
            let session = AuthSession::from_signin(tokens, &username);
            session.save(&ctx.store)?;
            tracing::info!(path = %ctx.store.path().display(), "session saved");
            println!("signed in as {}", session.username.as_deref().unwrap_or(&username));
            Ok(())
        }
        Command::Logout => {
            AuthSession::clear(&ctx.store)?;
            println!("signed out");
            Ok(())
        }
        Command::Whoami => {
            match AuthSession::load(&ctx.store)? {
                Some(session) => println!(
                    "{} (id {}, role {})",
                    session.username.as_deref().unwrap_or("unknown"),
                    session.user_id.map_or_else(|| "?".to_owned(), |id| id.to_string()),
                    session.role.map_or("?", Role::as_str),
                ),
                None => println!("not signed in"),
            }
            Ok(())
        }
        Command::History => {
            let session = ctx.session()?;
            let url = ctx.config.endpoints.history_url();
            for message in ctx.api.fetch_history(&url, &session.access_token).await? {
                println!("{}", render_message(&message));
            }
            Ok(())
        }
        Command::Chat { username } => run_chat(&ctx, username).await,
        Command::Posts(posts) => run_posts(&ctx, posts).await,
        Command::Comments(comments) => run_comments(&ctx, comments).await,
    }
}

async fn run_posts(ctx: &Context, posts: PostsCommand) -> Result<(), CliError> {
    match posts.command {
        PostsSubcommand::List => print_json(&ctx.api.list_posts().await?),
        PostsSubcommand::Show { post_id } => print_json(&ctx.api.get_post(post_id).await?),
        PostsSubcommand::Create { title, content } => {
            let token = ctx.session()?.access_token;
            print_json(&ctx.api.create_post(&token, &NewPost { title, content }).await?)
        }
        PostsSubcommand::Update { post_id, title, content } => {
            let token = ctx.session()?.access_token;
            ctx.api.update_post(&token, post_id, &NewPost { title, content }).await?;
            println!("updated post #{post_id}");
            Ok(())
        }
        PostsSubcommand::Delete { post_id } => {
            let token = ctx.session()?.access_token;
            ctx.api.delete_post(&token, post_id).await?;
            println!("deleted post #{post_id}");
            Ok(())
        }
    }
}

async fn run_comments(ctx: &Context, comments: CommentsCommand) -> Result<(), CliError> {
    match comments.command {
        CommentsSubcommand::List { post_id } => print_json(&ctx.api.list_comments(post_id).await?),
        CommentsSubcommand::Create { post_id, content, parent_id } => {
            let token = ctx.session()?.access_token;
            print_json(&ctx.api.create_comment(&token, post_id, &NewComment { content, parent_id }).await?)
        }
        CommentsSubcommand::Delete { comment_id } => {
            let token = ctx.session()?.access_token;
            ctx.api.delete_comment(&token, comment_id).await?;
            println!("deleted comment #{comment_id}");
            Ok(())
        }
        CommentsSubcommand::Like { comment_id } => {
            let token = ctx.session()?.access_token;
            let like = ctx.api.like_comment(&token, comment_id).await?;
            println!("comment #{} has {} likes (liked: {})", like.comment_id, like.likes, like.is_liked);
            Ok(())
        }
    }
}

// =============================================================================
// CHAT
// =============================================================================

async fn run_chat(ctx: &Context, username: Option<String>) -> Result<(), CliError> {
    let session = ctx.session()?;
    let display = username.or(session.username);
    let history: Arc<dyn HistorySource> = Arc::new(ctx.api.clone());
    let handle = spawn_chat_session(ctx.config.session, Arc::new(WsConnector), history);
    handle.configure(
        ctx.config.endpoints.chat_ws.clone(),
        ctx.config.endpoints.history_url(),
        Some(session.access_token),
    );
    eprintln!("type a message and press enter; /retry reloads history, /quit exits");

    let mut updates = handle.subscribe();
    let mut view = ChatView::default();
    view.render(&updates.borrow_and_update());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                view.render(&snapshot);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "" => {}
                    "/quit" => break,
                    "/retry" => handle.retry(),
                    text => handle.send(ChatDraft {
                        kind: Some("message".to_owned()),
                        message: text.to_owned(),
                        username: display.clone(),
                    }),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await;
    Ok(())
}

/// Terminal rendering of successive snapshots: only what changed is printed.
#[derive(Debug, Default)]
struct ChatView {
    /// Ids of the messages already on screen, in order.
    printed: Vec<WireId>,
    status: Option<ConnectionStatus>,
    error: Option<SessionError>,
}

impl ChatView {
    fn render(&mut self, snapshot: &ChatSnapshot) {
        for line in self.diff(snapshot) {
            match line {
                ViewLine::Message(text) => println!("{text}"),
                ViewLine::Notice(text) => eprintln!("{text}"),
            }
        }
    }

    fn diff(&mut self, snapshot: &ChatSnapshot) -> Vec<ViewLine> {
        let mut lines = Vec::new();
        if self.status != Some(snapshot.status) {
            self.status = Some(snapshot.status);
            let queued = if snapshot.queued > 0 { format!(", {} queued", snapshot.queued) } else { String::new() };
            lines.push(ViewLine::Notice(format!("-- {}{queued}", snapshot.status)));
        }
        if self.error != snapshot.error {
            self.error.clone_from(&snapshot.error);
            if let Some(error) = &snapshot.error {
                lines.push(ViewLine::Notice(format!("-- error: {error}")));
            }
        }
        // Only a log that extends what is on screen prints incrementally.
        // Anything else means history replaced it; print it again from the top.
        let extends = snapshot.messages.len() >= self.printed.len()
            && snapshot.messages.iter().zip(&self.printed).all(|(message, id)| message.id == *id);
        if !extends {
            self.printed.clear();
        }
        for message in &snapshot.messages[self.printed.len()..] {
            lines.push(ViewLine::Message(render_message(message)));
            self.printed.push(message.id.clone());
        }
        lines
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ViewLine {
    Message(String),
    Notice(String),
}

fn render_message(message: &ChatMessage) -> String {
    match &message.timestamp {
        Some(ts) => format!("[{ts}] {}: {}", message.display_author(), message.message),
        None => format!("{}: {}", message.display_author(), message.message),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
