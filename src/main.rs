// src/main.rs

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rewrite_resolver::index::INDEX_FILE;
use rewrite_resolver::virtual_content::{EngineModule, VirtualId};
use rewrite_resolver::{AppRegistry, CompatAddons, FsFallback, Host, ModuleRequest, Resolution, RewrittenPackageIndex};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "rewrite-resolver")]
#[command(author, version, about = "Rewrite legacy addons and resolve modules against the result", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite the app's legacy addons and write resolver.json
    Rewrite {
        /// App root
        #[arg(short, long, default_value = ".")]
        app: PathBuf,
    },
    /// Print the rewritten package index
    Index {
        /// App root
        #[arg(short, long, default_value = ".")]
        app: PathBuf,
    },
    /// Resolve a specifier as if imported from a file
    Resolve {
        /// Module specifier
        specifier: String,
        /// Importing file
        #[arg(short, long)]
        from: PathBuf,
        /// App root
        #[arg(short, long, default_value = ".")]
        app: PathBuf,
    },
    /// Print the content of a virtual module
    Virtual {
        /// Full virtual id, or an engine module name such as `vendor.js`
        id: String,
        /// App root
        #[arg(short, long, default_value = ".")]
        app: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let apps = AppRegistry::new();

    match cli.command {
        Some(Commands::Rewrite { app }) => {
            let ctx = apps
                .register(&app)
                .with_context(|| format!("Failed to open app at {}", app.display()))?;
            let mut stage = CompatAddons::new(Arc::clone(&ctx));
            let report = stage.build().context("Rewrite failed")?;
            info!("Rewrote {} legacy packages", report.legacy_packages);
            println!(
                "Rewrote {} legacy packages into {}",
                report.legacy_packages,
                ctx.rewritten_dir().display()
            );
            println!(
                "  {} written, {} removed, {} unchanged",
                report.sync.written, report.sync.removed, report.sync.unchanged
            );
            if report.config_written {
                println!("  Updated {}", ctx.resolver_config_file().display());
            }
            Ok(())
        }
        Some(Commands::Index { app }) => {
            let ctx = apps.register(&app)?;
            let path = ctx.rewritten_dir().join(INDEX_FILE);
            let index = RewrittenPackageIndex::load(&path)
                .with_context(|| format!("No rewritten index at {} (run `rewrite` first)", path.display()))?;
            print!("{}", index.to_json()?);
            Ok(())
        }
        Some(Commands::Resolve { specifier, from, app }) => {
            let ctx = apps.register(&app)?;
            let resolver = ctx.loader().resolver().context("Failed to load resolver")?;
            let fallback = FsFallback::new(resolver.config().resolvable_extensions.clone());
            let from = std::path::absolute(&from)?;
            match resolver.resolve(&ModuleRequest::new(specifier, from), &fallback)? {
                Resolution::Found(module) => println!("found {}", module.id),
                Resolution::Ignored(module) => println!("ignored {}", module.id),
                Resolution::NotFound(failure) => println!(
                    "not_found {} from {}: {}",
                    failure.specifier,
                    failure.from_file.display(),
                    failure.message
                ),
            }
            Ok(())
        }
        Some(Commands::Virtual { id, app }) => {
            let ctx = apps.register(&app)?;
            let id = if VirtualId::decode(&id).is_some() {
                id
            } else {
                let Some(module) = EngineModule::from_virtual_name(&id) else {
                    bail!("Unknown virtual module: {}", id);
                };
                VirtualId::engine(ctx.root(), module)
            };
            let host = Host::new(Arc::clone(ctx.loader()));
            print!("{}", host.load_virtual(&id)?);
            for watch in host.watches().watches(&id).unwrap_or_default() {
                eprintln!("watch {}", watch.display());
            }
            Ok(())
        }
        None => {
            println!("rewrite-resolver: use --help for usage");
            Ok(())
        }
    }
}
