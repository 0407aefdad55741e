//! RepairBay cart CLI - drive the cart from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Local cart under .repairbay/ (default backend)
//! rb-cart products
//! rb-cart add battery-pixel-7
//! rb-cart decrease battery-pixel-7
//! rb-cart show
//!
//! # Server cart
//! CART_BACKEND=remote CART_API_BASE_URL=https://repairbay.example rb-cart show
//! ```
//!
//! # Commands
//!
//! - `show` - Print the cart, or one surface's markup with `--html`
//! - `products` - List products (local backend)
//! - `add`, `remove`, `increase`, `decrease`, `clear` - Change the cart
//! - `checkout` - Place an order (local backend)
//! - `orders` - List past orders (local backend)

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand, ValueEnum};
use repairbay_cart::{CartConfig, Surface};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::checkout::CheckoutForm;
use commands::{CartSession, CommandError};

#[derive(Parser)]
#[command(name = "rb-cart")]
#[command(author, version, about = "RepairBay cart CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cart
    Show {
        /// Print a surface's rendered markup instead
        #[arg(long, value_enum)]
        html: Option<SurfaceArg>,
    },
    /// List available products
    Products,
    /// Add a product to the cart
    Add {
        product_id: String,

        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Remove a line from the cart
    Remove { item_id: String },
    /// Increase a line's quantity by one
    Increase { item_id: String },
    /// Decrease a line's quantity by one (removes it at 1)
    Decrease { item_id: String },
    /// Empty the cart
    Clear,
    /// Place an order from the cart
    Checkout {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        phone: String,

        /// Payment method (`card`, `cash_on_pickup`)
        #[arg(long, default_value = "card")]
        payment: String,

        /// Device and fault description
        #[arg(long)]
        notes: Option<String>,
    },
    /// List past orders
    Orders,
}

#[derive(Clone, Copy, ValueEnum)]
enum SurfaceArg {
    Badge,
    MiniCart,
    Table,
    Totals,
}

impl From<SurfaceArg> for Surface {
    fn from(arg: SurfaceArg) -> Self {
        match arg {
            SurfaceArg::Badge => Self::Badge,
            SurfaceArg::MiniCart => Self::MiniCart,
            SurfaceArg::Table => Self::CartTable,
            SurfaceArg::Totals => Self::Totals,
        }
    }
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CartConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Configuration is needed before Sentry, and Sentry before tracing
    let config = CartConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "repairbay_cart=info,repairbay_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &CartConfig) -> Result<(), CommandError> {
    let session = CartSession::open(config).await?;

    let result = match cli.command {
        Commands::Show { html } => {
            commands::cart::show(&session, html.map(Surface::from));
            Ok(())
        }
        Commands::Products => {
            commands::cart::products(&session);
            Ok(())
        }
        Commands::Add {
            product_id,
            quantity,
        } => commands::cart::add(&session, &product_id, quantity).await,
        Commands::Remove { item_id } => {
            commands::cart::item_action(&session, "remove", &item_id).await
        }
        Commands::Increase { item_id } => {
            commands::cart::item_action(&session, "increase", &item_id).await
        }
        Commands::Decrease { item_id } => {
            commands::cart::item_action(&session, "decrease", &item_id).await
        }
        Commands::Clear => commands::cart::clear(&session).await,
        Commands::Checkout {
            name,
            email,
            phone,
            payment,
            notes,
        } => {
            let form = CheckoutForm {
                name: &name,
                email: &email,
                phone: &phone,
                payment: &payment,
                notes: notes.as_deref(),
            };
            commands::checkout::place(&session, &form).await
        }
        Commands::Orders => commands::checkout::list(&session).await,
    };

    session.close();
    result
}
