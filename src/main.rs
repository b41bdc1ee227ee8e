// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Crop Manager: Local Crop-Leaf Scanner & Farm Inventory
//!
//! Command-line front end over the store and the classifier service.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crop_manager::classifier::Readiness;
use crop_manager::config::AppConfig;
use crop_manager::knowledge::{self, strip_glyph};
use crop_manager::store::{Category, JsonStore, Quantity};
use crop_manager::{CropError, CropManager, Result, Session};

const APP_NAME: &str = "Crop Manager Pro";

/// Crop Manager CLI - Local Crop-Leaf Scanner & Farm Inventory
#[derive(Parser, Debug)]
#[command(name = "crop-manager")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version = "3.1.0")]
#[command(about = "Scan crop leaves for disease and track farm inventory", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Credentials for commands that act on one user's data
#[derive(Args, Debug)]
struct Credentials {
    /// Username
    #[arg(short, long)]
    user: String,

    /// Password
    #[arg(short, long)]
    password: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a config file and an initial store
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Create a new account
    Register {
        /// Username
        username: String,

        /// Password
        #[arg(short, long)]
        password: String,
    },

    /// Print the care report for a classifier label
    Report {
        /// Raw label, e.g. Tomato___Late_blight
        label: String,

        /// Confidence (0.0-1.0)
        #[arg(default_value = "1.0")]
        confidence: f64,
    },

    /// Classify a leaf photo and record the result
    Scan {
        /// Image file
        image: PathBuf,

        #[command(flatten)]
        auth: Credentials,
    },

    /// Farm inventory
    Inventory {
        #[command(flatten)]
        auth: Credentials,

        #[command(subcommand)]
        action: InventoryCommands,
    },

    /// Scan history
    History {
        #[command(flatten)]
        auth: Credentials,

        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },

    /// Show store and classifier status
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum InventoryCommands {
    /// Add an item
    Add {
        /// Item name
        name: String,

        /// Category
        #[arg(long, default_value = "Plant", value_parser = Category::CHOICES)]
        category: String,

        /// Quantity as you would write it
        #[arg(long, default_value = "")]
        qty: String,

        /// Free-form notes
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// List items, newest first
    List,

    /// Delete an item by id
    Delete {
        /// Item id
        id: String,
    },

    /// Item counts per category
    Stats,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("{} v3.1.0", APP_NAME);

    // Load configuration
    let config = AppConfig::load(&cli.config)?;
    let json = cli.format == "json";

    match cli.command {
        Commands::Init { dir, force } => run_init(dir, force),
        Commands::Register { username, password } => run_register(&config, &username, &password),
        Commands::Report { label, confidence } => run_report(&label, confidence, json),
        Commands::Scan { image, auth } => run_scan(&config, &image, &auth, json, cli.quiet).await,
        Commands::Inventory { auth, action } => run_inventory(&config, &auth, action, json),
        Commands::History { auth, count } => run_history(&config, &auth, count, json),
        Commands::Status => run_status(&config).await,
        Commands::Config { action } => run_config_command(&config, action, &cli.config),
    }
}

/// Open the store and sign in
fn sign_in(config: &AppConfig, auth: &Credentials) -> Result<Session> {
    CropManager::new(config)?
        .login(&auth.user, &auth.password)
        .ok_or_else(|| CropError::Auth(auth.user.clone()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_register(config: &AppConfig, username: &str, password: &str) -> Result<()> {
    let outcome = CropManager::new(config)?.register(username, password);
    if outcome.is_ok() {
        println!("Registered '{}'", username);
        Ok(())
    } else {
        Err(CropError::Store(outcome.message().to_string()))
    }
}

fn run_report(label: &str, confidence: f64, json: bool) -> Result<()> {
    let report = knowledge::generate_report(label, confidence);
    if json {
        print_json(&report)
    } else {
        println!("{}\n\n{}", report.title, report.details);
        Ok(())
    }
}

/// Warm up the classifier, classify one image and log the scan
async fn run_scan(config: &AppConfig, image: &Path, auth: &Credentials, json: bool, quiet: bool) -> Result<()> {
    if !image.is_file() {
        return Err(CropError::FileSystem(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a file", image.display()),
        )));
    }

    let manager = CropManager::new(config)?;
    let session = manager
        .login(&auth.user, &auth.password)
        .ok_or_else(|| CropError::Auth(auth.user.clone()))?;

    let mut progress = manager.classifier().subscribe();
    let warm_up = manager.classifier().spawn_warm_up();

    loop {
        let state = progress.borrow_and_update().clone();
        if !quiet {
            eprintln!("[{:>3.0}%] {}", state.progress() * 100.0, state.message());
        }
        if state.is_settled() || progress.changed().await.is_err() {
            break;
        }
    }
    // The outcome is already on the readiness channel
    drop(warm_up);

    match session.scan(image).await {
        Some(report) if json => print_json(&report),
        Some(report) => {
            println!("{}\n\n{}", report.title, report.details);
            Ok(())
        }
        None => {
            println!("❌ Analysis Failed.");
            Err(CropError::Inference(format!("no report for {}", image.display())))
        }
    }
}

fn run_inventory(config: &AppConfig, auth: &Credentials, action: InventoryCommands, json: bool) -> Result<()> {
    let session = sign_in(config, auth)?;

    match action {
        InventoryCommands::Add { name, category, qty, notes } => {
            check_item_name(&name)?;
            let id = session
                .add_item(&name, Category::from(category.as_str()), Quantity::from(qty.as_str()), &notes)
                .ok_or_else(|| CropError::Store("item was not saved".to_string()))?;
            println!("Added {} ({})", name, id);
        }
        InventoryCommands::List => {
            let items = session.inventory();
            if json {
                return print_json(&items);
            }
            println!("Farm Inventory ({} items):", items.len());
            for item in &items {
                println!(
                    "  {}  {:<10} {:<24} {:>8}  {}  {}",
                    item.id, item.category, item.name, item.qty, item.date, item.notes
                );
            }
        }
        InventoryCommands::Delete { id } => {
            session.delete_item(&id);
            println!("Deleted {}", id);
        }
        InventoryCommands::Stats => {
            let stats = session.stats();
            if json {
                return print_json(&stats);
            }
            for (category, count) in stats.entries() {
                println!("  {:<6} {}", category, count);
            }
        }
    }

    Ok(())
}

/// Only an empty name is refused; whitespace is kept as typed
fn check_item_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CropError::Store("item name must not be empty".to_string()));
    }
    Ok(())
}

fn run_history(config: &AppConfig, auth: &Credentials, count: usize, json: bool) -> Result<()> {
    let session = sign_in(config, auth)?;
    let mut entries = session.history();
    entries.truncate(count);

    if json {
        return print_json(&entries);
    }

    println!("Scan Logs ({} entries):", entries.len());
    for entry in &entries {
        println!(
            "  {}  {:<8}  {}  ({})",
            entry.date,
            entry.status,
            strip_glyph(&entry.result),
            entry.file
        );
    }
    Ok(())
}

/// Run status check
async fn run_status(config: &AppConfig) -> Result<()> {
    println!("{} v3.1.0 Status", APP_NAME);
    println!("==========================");

    let store = JsonStore::new(&config.store.path);
    match store.load() {
        Ok(doc) => println!("Store ({}): {} users", config.store.path, doc.users.len()),
        Err(e) => println!("Store ({}): Error - {}", config.store.path, e),
    }

    let manager = CropManager::new(config)?;
    let classifier = manager.classifier();
    info!("Checking classifier '{}'", classifier.backend_name());
    match classifier.warm_up().await {
        Ok(()) => println!("Classifier ({}): Ready", classifier.backend_name()),
        Err(e) => println!("Classifier ({}): Error - {}", classifier.backend_name(), e),
    }
    if let Readiness::Failed(reason) = classifier.readiness() {
        debug!("Classifier failure: {}", reason);
    }

    println!("\nConfiguration:");
    println!("  Model server: {}", config.classifier.url);
    println!("  Model: {}", config.classifier.model);
    println!("  Labels: {}", config.classifier.labels_path);

    Ok(())
}

/// Run config commands
fn run_config_command(config: &AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            print_json(config)?;
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Store: {}", config.store.path);
            println!("  Model: {} at {}", config.classifier.model, config.classifier.url);
        }
    }

    Ok(())
}

/// Initialize a new Crop Manager directory
fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config.json");

    if config_path.exists() && !force {
        return Err(CropError::Config(
            "config.json already exists. Use --force to overwrite".to_string()
        ));
    }

    std::fs::create_dir_all(&target)?;

    let mut config = AppConfig::default();
    config.store.path = target.join("user_data.json").to_string_lossy().to_string();
    config.classifier.labels_path = target.join("classes.txt").to_string_lossy().to_string();
    config.save(&config_path)?;

    JsonStore::open(&config.store.path);

    println!("{} initialized in {:?}", APP_NAME, target);
    println!("\nCreated:");
    println!("  - config.json");
    println!("  - user_data.json (default account admin/admin)");
    println!("\nNext steps:");
    println!("  1. Put your label list in classes.txt");
    println!("  2. Serve the model: tensorflow_model_server --rest_api_port=8501 --model_name=my_model");
    println!("  3. Scan: crop-manager scan leaf.jpg -u admin -p admin");

    Ok(())
}
