use clap::{ArgAction, Parser, Subcommand};
use gallery_state::config::{self, ViewerConfig};
use gallery_state::manifest::HttpStore;
use gallery_state::output::{self, TextRenderer, TextViewer};
use gallery_state::prefetch::HttpWarmer;
use gallery_state::session::{History, Session};
use gallery_state::url_state::UrlState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "gallery-state")]
#[command(about = "Load, filter and link views of a manifest-driven photo gallery")]
#[command(long_about = "\
Load, filter and link views of a manifest-driven photo gallery

Every folder of a published gallery carries a manifest (.metadata.json by
default) listing its images and subfolders. This tool loads a page the way
the browser does, applies the view state encoded in its URL, and prints
what would be shown.

View state in the URL:

  https://gallery.example/Travel/?recursive=true&pid=3#animals%7Cbirds,plants
                                  │               │     └ selected tags
                                  │               └ open viewer at item 3
                                  └ include every subfolder

Pages may be http(s) URLs, file:// URLs, or local directory paths.

Run 'gallery-state gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file (TOML). Stock defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging: -v for debug, -vv for trace. RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Which page to load and how.
#[derive(clap::Args, Clone)]
struct ViewArgs {
    /// Page URL (http, https, file) or local gallery directory
    page: String,

    /// Include every descendant folder
    #[arg(long)]
    recursive: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Load a page and print the shown images
    Show {
        #[command(flatten)]
        view: ViewArgs,

        /// Select tags (comma-separated), added to those in the URL
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Open the viewer at this 1-based position
        #[arg(long)]
        pid: Option<usize>,
    },
    /// Load a page and print its tag tree
    Tags(ViewArgs),
    /// Print a stock config file with all options documented
    GenConfig,
}

/// Reports every address bar rewrite in the log.
struct LoggedHistory;

impl History for LoggedHistory {
    fn replace_state(&mut self, url: &Url) {
        tracing::debug!(url = %url, "location replaced");
    }
}

type CliSession = Session<HttpStore, HttpWarmer>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Show { view, tags, pid } => {
            let config = config::load_config(cli.config.as_deref())?;
            let location = view_location(&view, tags, pid)?;
            let mut session = open_session(&config, location)?
                .with_renderer(TextRenderer)
                .with_viewer(TextViewer);
            session.on_load().await?;
            println!();
            println!("Location: {}", session.location());
        }
        Command::Tags(view) => {
            let config = config::load_config(cli.config.as_deref())?;
            let location = view_location(&view, Vec::new(), None)?;
            let mut session = open_session(&config, location)?;
            session.on_load().await?;
            output::print_tag_tree(
                &session.tag_tree(),
                &session.state().selected_tags,
                &config.tag_delimiter,
            );
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "gallery_state=info",
        1 => "gallery_state=debug",
        _ => "gallery_state=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_session(
    config: &ViewerConfig,
    location: Url,
) -> Result<CliSession, Box<dyn std::error::Error>> {
    let store = HttpStore::new(&config.http)?;
    let warmer = HttpWarmer::new(store.client().clone());
    let session = Session::new(config.clone(), location, Arc::new(store), Arc::new(warmer))?
        .with_history(LoggedHistory);
    Ok(session)
}

/// The page URL with command-line flags applied on top of its own state.
fn view_location(
    view: &ViewArgs,
    tags: Vec<String>,
    pid: Option<usize>,
) -> Result<Url, Box<dyn std::error::Error>> {
    let page = resolve_page(&view.page)?;
    let mut state = UrlState::from_url(&page);
    state.tags.extend(tags.into_iter().filter(|t| !t.is_empty()));
    state.recursive |= view.recursive;
    if let Some(pid) = pid {
        state.open_index = pid.checked_sub(1);
    }
    Ok(state.apply(&page))
}

/// Accept a URL, or a local path turned into a `file://` URL.
fn resolve_page(page: &str) -> Result<Url, Box<dyn std::error::Error>> {
    if let Ok(url) = Url::parse(page) {
        // A single letter is a Windows drive, not a scheme.
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }
    let path = std::fs::canonicalize(Path::new(page))?;
    let url = if path.is_dir() {
        Url::from_directory_path(&path)
    } else {
        Url::from_file_path(&path)
    }
    .map_err(|()| format!("cannot turn {} into a file URL", path.display()))?;
    Ok(url)
}
