mod args;
mod prompt;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use enostr::{NoteId, Pubkey, RelayPool, WebsocketConnector};
use notefeed::{
    AmountPrompt, Config, Error, Feed, FeedUpdate, HyperHttpClient, LocalSigner, NwcWallet,
    RenderedPost, ZapTarget, Zapper,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::args::Args;
use crate::prompt::{FixedPrompt, PrintObserver, StdinPrompt};

#[tokio::main]
async fn main() -> ExitCode {
    notefeed::install_crypto();

    let args: Vec<String> = std::env::args().collect();

    // Skip the first argument, which is the program name.
    let (args, unrecognized_args) = Args::parse(args.get(1..).unwrap_or_default());

    let mut config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("failed to load config {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    args.apply(&mut config);

    // keep the file writer alive until we exit
    let _guard = setup_logging(config.log_dir.as_deref());

    for problem in &args.problems {
        error!("{problem}");
    }

    for arg in &unrecognized_args {
        warn!("unrecognized argument '{arg}'");
    }

    let res = match &args.zap {
        Some(note) => zap(note, &args, &config).await,
        None => follow(&config).await,
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("notefeed=info,enostr=info"));

    let Some(log_dir) = log_dir else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        return None;
    };

    use tracing_appender::{
        non_blocking,
        rolling::{RollingFileAppender, Rotation},
    };
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        log_dir,
        format!("notefeed-{}.log", env!("CARGO_PKG_VERSION")),
    );
    let (non_blocking_writer, guard) = non_blocking(file_appender);

    // stdout carries the feed itself
    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_writer);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Some(guard)
}

fn relay_pool(config: &Config) -> RelayPool {
    let mut pool = RelayPool::new(Arc::new(WebsocketConnector::new()));
    pool.connect_timeout(config.timeouts.relay_connect());
    pool.add_urls(config.relay_urls().iter().map(|url| url.as_str()));
    pool
}

async fn follow(config: &Config) -> Result<(), Error> {
    let authors = config.authors();
    let pool = relay_pool(config);
    let mut feed = Feed::open(&pool, &authors, config.feed_limit).await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            update = feed.next() => match update {
                Some(FeedUpdate::Post(post)) => print_post(&post),
                Some(FeedUpdate::EndOfStored { relay }) => info!("caught up with {relay}"),
                None => {
                    warn!("lost every relay");
                    break;
                }
            }
        }
    }

    feed.close().await;
    Ok(())
}

fn print_post(post: &RenderedPost) {
    let author = post.author.to_bech().unwrap_or_else(|| post.author.hex());
    let id = post.id.to_bech().unwrap_or_else(|| post.id.hex());

    println!("{author} at {}", post.created_at);
    println!("  {}", post.body_html);
    for image in &post.images {
        println!("  [image] {image}");
    }
    println!("  {id}");
    println!();
}

async fn zap(note: &str, args: &Args, config: &Config) -> Result<(), Error> {
    let note_id = NoteId::parse(note)?;
    let Some(author) = &args.author else {
        return Err(Error::Config("--zap needs --author".to_owned()));
    };
    let author = Pubkey::parse(author)?;

    let prompt: Arc<dyn AmountPrompt> = match args.amount {
        Some(sats) => Arc::new(FixedPrompt(sats)),
        None => Arc::new(StdinPrompt),
    };

    let pool = relay_pool(config);
    let mut zapper = Zapper::new(&pool, Arc::new(HyperHttpClient::new()), prompt)
        .observer(Arc::new(PrintObserver))
        .timeouts((&config.timeouts).into())
        .default_zap_sats(config.default_zap_sats);

    if let Some(nsec) = &args.nsec {
        zapper = zapper.signer(Arc::new(LocalSigner::parse(nsec)?));
    }

    if let Some(uri) = &config.nwc_uri {
        zapper = zapper.wallet(Arc::new(NwcWallet::new(uri.clone())?));
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let attempt = zapper
        .zap(ZapTarget::new(note_id, author), &args.comment, cancel)
        .await;

    match attempt.error() {
        Some(err) => Err(err.clone().into()),
        None => Ok(()),
    }
}
